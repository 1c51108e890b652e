pub mod account;
pub mod address;
pub mod amount;
pub mod cache;
pub mod cfg;
pub mod error;
pub mod jsonrpc;
pub mod network;
pub mod orchestrator;
pub mod schema;
pub mod signer;
pub mod time;
pub mod wallet;

pub use error::Error;
