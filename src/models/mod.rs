//! Data models

mod case;
mod user;

pub use case::*;
pub use user::*;
