pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod model;
pub mod output;
pub mod scan;
pub mod stats;
pub mod util;

pub use error::{PulseError, Result};
