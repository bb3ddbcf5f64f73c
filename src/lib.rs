pub mod anchor;
pub mod config;
pub mod error;
pub mod migrate;
pub mod server;
pub mod sidecar;
pub mod state;
pub mod status;
pub mod storage;
