pub mod config;
pub mod error;
pub mod line;
pub mod model;
pub mod time;

pub use error::{Result, TallyError};
