pub mod admin;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod ingest;
pub mod pipeline;
pub mod query;
pub mod storage;
pub mod types;
pub mod useragent;
pub mod visitor;
