pub mod log;
pub mod parser;
pub mod repo;

pub use log::LogSource;
pub use parser::{CancelToken, CommitParser, CommitStream, ScanOutcome};
pub use repo::GitRepo;
