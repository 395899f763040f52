pub mod analysis;
pub mod api;
pub mod cache;
pub mod concurrent_fetcher;
pub mod data_collector;
pub mod facts;
pub mod models;
pub mod report;
pub mod scoring;
pub mod technical;
