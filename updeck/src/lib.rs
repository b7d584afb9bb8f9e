// Library interface for updeck modules
// This allows tests and the binary to import modules

pub mod deck;
pub mod generator;
pub mod ingestion;
pub mod pptx;
pub mod purge;
pub mod server;
pub mod storage;
