pub mod app;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod filter;
pub mod fs_util;
pub mod output;
pub mod report;
