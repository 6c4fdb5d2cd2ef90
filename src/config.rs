use crate::error::{PulseError, Result};
use crate::stats::AliasMap;
use crate::util::DisplayZone;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_AUTHORS: usize = 20;
pub const DEFAULT_MAX_FILES: usize = 30;
pub const DEFAULT_ROLLING_WINDOW: usize = 7;

/// Settings for one scan session.
#[derive(Debug, Clone)]
pub struct Config {
    /// Repositories to scan, in order. Empty means the current directory.
    pub repo_paths: Vec<PathBuf>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub zone: DisplayZone,
    pub aliases: Option<AliasMap>,
    pub max_authors: usize,
    pub max_files: usize,
    /// Days in the timeline rolling average.
    pub rolling_window: usize,
    pub show_progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_paths: Vec::new(),
            since: None,
            until: None,
            zone: DisplayZone::Local,
            aliases: None,
            max_authors: DEFAULT_MAX_AUTHORS,
            max_files: DEFAULT_MAX_FILES,
            rolling_window: DEFAULT_ROLLING_WINDOW,
            show_progress: true,
        }
    }
}

impl Config {
    pub fn repositories(&self) -> Vec<PathBuf> {
        if self.repo_paths.is_empty() {
            vec![PathBuf::from(".")]
        } else {
            self.repo_paths.clone()
        }
    }

    /// Label for the combined statistics of every configured repository.
    pub fn label(&self) -> String {
        self.repositories()
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Reads a JSON object of `alias email -> primary email`.
pub fn load_alias_file(path: &Path) -> Result<AliasMap> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| PulseError::InvalidAliasMap(format!("{}: {e}", path.display())))?;
    AliasMap::from_json(&text)
        .map_err(|e| PulseError::InvalidAliasMap(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.max_authors, 20);
        assert_eq!(config.max_files, 30);
        assert_eq!(config.rolling_window, 7);
        assert_eq!(config.zone, DisplayZone::Local);
        assert_eq!(config.repositories(), vec![PathBuf::from(".")]);
    }

    #[test]
    fn loads_alias_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"a@x.com": "a@x.com", "b@x.com": "a@x.com"}}"#).unwrap();
        let map = load_alias_file(file.path()).unwrap();
        assert_eq!(map.aliases().count(), 1);
    }

    #[test]
    fn rejects_bad_alias_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"b@x.com": "a@x.com"}}"#).unwrap();
        assert!(matches!(
            load_alias_file(file.path()),
            Err(PulseError::InvalidAliasMap(_))
        ));
        assert!(load_alias_file(Path::new("/definitely/missing.json")).is_err());
    }
}
