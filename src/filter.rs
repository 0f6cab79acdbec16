use crate::catalog::CatalogClient;
use crate::config::FilterRule;
use crate::domain::{MatchEntry, MatchSet, Pattern};
use crate::error::DepotError;

/// Applies one rule to the full catalog tree. A subtree is pruned as soon as
/// its own level fails the corresponding test, so deeper levels are never
/// listed for excluded ancestors. An empty catalog yields an empty set.
pub fn filter(catalog: &dyn CatalogClient, rule: &FilterRule) -> Result<MatchSet, DepotError> {
    let mut entries = Vec::new();

    for project in catalog.list_projects()? {
        if !passes(&rule.projects, &project.name) {
            continue;
        }
        for distribution in catalog.list_distributions(&project)? {
            if !passes(&rule.distributions, &distribution.name) {
                continue;
            }
            for version in catalog.list_versions(&distribution)? {
                if !passes(&rule.versions, &version.name) {
                    continue;
                }
                for file in catalog.list_files(&version)? {
                    if !passes(&rule.files, &file.name) {
                        continue;
                    }
                    entries.push(MatchEntry {
                        project: project.name.clone(),
                        distribution: distribution.name.clone(),
                        version: version.name.clone(),
                        file,
                    });
                }
            }
        }
    }

    Ok(MatchSet { entries })
}

// Absent pattern is the neutral element: everything passes.
fn passes(pattern: &Option<Pattern>, name: &str) -> bool {
    pattern.as_ref().map(|p| p.matches(name)).unwrap_or(true)
}
