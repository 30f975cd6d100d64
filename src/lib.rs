pub mod api;
pub mod config;
pub mod db;
pub mod drafting;
pub mod error;
pub mod fetcher;
pub mod ingest;
pub mod merge;
pub mod scorer;
pub mod types;
