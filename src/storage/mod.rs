mod balance_store;
mod history_log;

pub use balance_store::*;
pub use history_log::*;
