//! API request handlers

mod communities;
mod events;
mod health;
mod mappings;

pub use communities::*;
pub use events::*;
pub use health::*;
pub use mappings::*;
