use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::{DistRef, FileMeta, ProjectRef, VersionRef};
use crate::error::DepotError;

/// Read-only view of the remote depot plus raw byte fetches. Listings are
/// requested fresh on every call; nothing is cached across runs.
pub trait CatalogClient: Send + Sync {
    fn list_projects(&self) -> Result<Vec<ProjectRef>, DepotError>;
    fn list_distributions(&self, project: &ProjectRef) -> Result<Vec<DistRef>, DepotError>;
    fn list_versions(&self, distribution: &DistRef) -> Result<Vec<VersionRef>, DepotError>;
    fn list_files(&self, version: &VersionRef) -> Result<Vec<FileMeta>, DepotError>;
    fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, DepotError>;
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Default)]
pub struct HttpCatalogOptions {
    pub credentials: Option<Credentials>,
    pub proxy_http: Option<String>,
    pub proxy_https: Option<String>,
}

#[derive(Clone)]
pub struct HttpCatalogClient {
    client: Client,
    base_url: String,
}

impl HttpCatalogClient {
    pub fn new(base_url: &str, options: HttpCatalogOptions) -> Result<Self, DepotError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("depot-mirror/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| DepotError::CatalogHttp(err.to_string()))?,
        );

        let mut builder = Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .timeout(Duration::from_secs(60));
        if let Some(proxy) = &options.proxy_http {
            builder = builder.proxy(
                reqwest::Proxy::http(proxy)
                    .map_err(|err| DepotError::CatalogHttp(err.to_string()))?,
            );
        }
        if let Some(proxy) = &options.proxy_https {
            builder = builder.proxy(
                reqwest::Proxy::https(proxy)
                    .map_err(|err| DepotError::CatalogHttp(err.to_string()))?,
            );
        }
        let client = builder
            .build()
            .map_err(|err| DepotError::CatalogHttp(err.to_string()))?;

        let catalog = Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        };
        if let Some(credentials) = &options.credentials {
            catalog.login(credentials)?;
        }
        Ok(catalog)
    }

    fn login(&self, credentials: &Credentials) -> Result<(), DepotError> {
        let url = format!("{}/login", self.base_url);
        let response = self.send_with_retries(|| {
            self.client.post(&url).form(&[
                ("user", credentials.user.as_str()),
                ("password", credentials.password.as_str()),
            ])
        })?;
        Self::handle_status(response)?;
        Ok(())
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, DepotError> {
        let response = self.send_with_retries(|| self.client.get(url))?;
        let response = Self::handle_status(response)?;
        response
            .json()
            .map_err(|err| DepotError::CatalogHttp(err.to_string()))
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, DepotError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "catalog request failed".to_string());
        Err(DepotError::CatalogStatus { status, message })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, DepotError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(DepotError::CatalogHttp(err.to_string()));
                }
            }
        }
    }
}

impl CatalogClient for HttpCatalogClient {
    fn list_projects(&self) -> Result<Vec<ProjectRef>, DepotError> {
        let url = format!("{}/projects", self.base_url);
        let projects: Vec<ProjectRef> = self.get_json(&url)?;
        Ok(dedup_by_name(projects, |project| &project.name))
    }

    fn list_distributions(&self, project: &ProjectRef) -> Result<Vec<DistRef>, DepotError> {
        let distributions: Vec<DistRef> = self.get_json(&project.url)?;
        Ok(dedup_by_name(distributions, |dist| &dist.name))
    }

    fn list_versions(&self, distribution: &DistRef) -> Result<Vec<VersionRef>, DepotError> {
        let versions: Vec<VersionRef> = self.get_json(&distribution.url)?;
        Ok(dedup_by_name(versions, |version| &version.name))
    }

    fn list_files(&self, version: &VersionRef) -> Result<Vec<FileMeta>, DepotError> {
        let files: Vec<FileMeta> = self.get_json(&version.url)?;
        Ok(dedup_by_name(files, |file| &file.name))
    }

    fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, DepotError> {
        let response = self.send_with_retries(|| self.client.get(url).timeout(timeout))?;
        let response = Self::handle_status(response)?;
        let bytes = response
            .bytes()
            .map_err(|err| DepotError::CatalogHttp(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

// Listing pages may carry several links to the same entry; the first wins.
fn dedup_by_name<T, F>(items: Vec<T>, name: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(name(item).to_string()))
        .collect()
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_first_occurrence() {
        let items = vec![
            ProjectRef {
                name: "ACG-8".to_string(),
                url: "https://depot.example/projects/1".to_string(),
            },
            ProjectRef {
                name: "ACG-9".to_string(),
                url: "https://depot.example/projects/2".to_string(),
            },
            ProjectRef {
                name: "ACG-8".to_string(),
                url: "https://depot.example/projects/1?alt".to_string(),
            },
        ];
        let deduped = dedup_by_name(items, |project| &project.name);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].url, "https://depot.example/projects/1");
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(403));
    }
}
