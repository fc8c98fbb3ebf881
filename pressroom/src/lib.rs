// Library interface for the pressroom modules
// This allows tests and the binaries to import them

pub mod agents;
pub mod coordinator;
pub mod ingestion;
pub mod llm;
pub mod monitor;
pub mod pipeline;
pub mod scraping;
pub mod search;
pub mod server;
pub mod storage;
pub mod types;
