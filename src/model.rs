use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const SCHEMA_VERSION: u32 = 1;

/// Commit author identity. The email is the stable key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

/// One numstat line of a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub additions: u32,
    pub deletions: u32,
    pub is_binary: bool,
}

/// A single parsed log record. Built only once its header is complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub hash: String,
    pub short_hash: String,
    pub author: Author,
    pub author_date: DateTime<FixedOffset>,
    pub subject: String,
    pub file_changes: Vec<FileChange>,
    pub is_merge: bool,
    pub pr_number: Option<u32>,
    pub merge_branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanProgress {
    pub commits_parsed: usize,
    pub current_hash: String,
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DateRange {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new() -> Self {
        Self { since: None, until: None }
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        if let Some(since) = self.since {
            if timestamp < &since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if timestamp > &until {
                return false;
            }
        }
        true
    }
}

impl Default for DateRange {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorStats {
    pub name: String,
    pub email: String,
    pub commits: u32,
    pub additions: u64,
    pub deletions: u64,
    pub files_touched: HashMap<String, u32>,
    pub first_commit: DateTime<FixedOffset>,
    pub last_commit: DateTime<FixedOffset>,
    #[serde(skip)]
    pub(crate) seq: usize,
}

impl AuthorStats {
    pub fn new(author: &Author, seen_at: DateTime<FixedOffset>, seq: usize) -> Self {
        Self {
            name: author.name.clone(),
            email: author.email.clone(),
            commits: 0,
            additions: 0,
            deletions: 0,
            files_touched: HashMap::new(),
            first_commit: seen_at,
            last_commit: seen_at,
            seq,
        }
    }

    pub fn net(&self) -> i64 {
        self.additions as i64 - self.deletions as i64
    }

    pub(crate) fn record_seen(&mut self, at: DateTime<FixedOffset>) {
        if at < self.first_commit {
            self.first_commit = at;
        }
        if at > self.last_commit {
            self.last_commit = at;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileStats {
    pub path: String,
    pub additions: u64,
    pub deletions: u64,
    /// additions + deletions
    pub total_changes: u64,
    /// Number of distinct commits that changed this file.
    pub touch_count: u32,
    /// author email -> commits touching this file
    pub authors: HashMap<String, u32>,
    #[serde(skip)]
    pub(crate) seq: usize,
}

impl FileStats {
    pub fn new(path: String, seq: usize) -> Self {
        Self {
            path,
            additions: 0,
            deletions: 0,
            total_changes: 0,
            touch_count: 0,
            authors: HashMap::new(),
            seq,
        }
    }

    pub fn author_count(&self) -> usize {
        self.authors.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirAuthorStats {
    pub name: String,
    pub email: String,
    pub commits: u32,
    pub changes: u64,
    /// Percentage of the directory's changed lines. Only meaningful after finalize.
    pub share: f64,
    #[serde(skip)]
    pub(crate) seq: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirStats {
    pub path: String,
    pub total_changes: u64,
    pub touch_count: u32,
    pub authors: HashMap<String, DirAuthorStats>,
    #[serde(skip)]
    pub(crate) seq: usize,
}

impl DirStats {
    pub fn new(path: String, seq: usize) -> Self {
        Self {
            path,
            total_changes: 0,
            touch_count: 0,
            authors: HashMap::new(),
            seq,
        }
    }

    pub(crate) fn recompute_shares(&mut self) {
        if self.total_changes == 0 {
            return;
        }
        let total = self.total_changes as f64;
        for author in self.authors.values_mut() {
            author.share = author.changes as f64 / total * 100.0;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrAuthorStats {
    pub name: String,
    pub email: String,
    pub merge_count: u32,
    pub total_changes: u64,
    pub pr_numbers: Vec<u32>,
    #[serde(skip)]
    pub(crate) seq: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeRecord {
    pub pr_number: Option<u32>,
    pub merged_by: String,
    pub merged_by_email: String,
    pub merged_at: DateTime<FixedOffset>,
    pub branch: Option<String>,
    pub subject: String,
    pub additions: u64,
    pub deletions: u64,
    pub files_count: usize,
}

impl MergeRecord {
    pub fn size(&self) -> u64 {
        self.additions + self.deletions
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrStats {
    pub total_merges: u32,
    /// Merges whose subject carried a PR number.
    pub total_prs: u32,
    pub merges_by_author: HashMap<String, PrAuthorStats>,
    pub merges: Vec<MergeRecord>,
    pub daily_merges: BTreeMap<NaiveDate, u32>,
}

/// Everything the aggregator has accumulated for one scan session.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoStats {
    pub path: String,
    pub range: DateRange,
    pub total_commits: u32,
    pub total_authors: u32,
    pub authors: HashMap<String, AuthorStats>,
    pub files: HashMap<String, FileStats>,
    pub dirs: HashMap<String, DirStats>,
    pub daily_activity: BTreeMap<NaiveDate, u32>,
    /// Monday-indexed weekday x hour.
    pub hourly_matrix: [[u32; 24]; 7],
    pub total_additions: u64,
    pub total_deletions: u64,
    pub codebase_size: Option<u64>,
    pub pr: PrStats,
    pub finalized: bool,
}

impl RepoStats {
    pub fn new(path: impl Into<String>, range: DateRange) -> Self {
        Self {
            path: path.into(),
            range,
            total_commits: 0,
            total_authors: 0,
            authors: HashMap::new(),
            files: HashMap::new(),
            dirs: HashMap::new(),
            daily_activity: BTreeMap::new(),
            hourly_matrix: [[0; 24]; 7],
            total_additions: 0,
            total_deletions: 0,
            codebase_size: None,
            pr: PrStats::default(),
            finalized: false,
        }
    }
}
