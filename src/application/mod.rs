// Application layer: the ledger service and the primitives it coordinates.

mod config;
mod service;
mod user_lock;

pub mod error;

pub use config::*;
pub use error::*;
pub use service::*;
pub use user_lock::*;
