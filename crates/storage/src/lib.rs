#![forbid(unsafe_code)]

mod config;
mod source;
mod store;

pub use config::*;
pub use source::*;
pub use store::*;
