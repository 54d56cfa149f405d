mod balance;
mod history;
mod points;
mod replay;

pub use balance::*;
pub use history::*;
pub use points::*;
pub use replay::*;
