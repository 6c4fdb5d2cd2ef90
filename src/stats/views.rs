//! Read-only projections over [`RepoStats`].
//!
//! Every view returns freshly allocated, owned rows. Sorts are stable with
//! ties kept in first-seen order, in both directions.

use crate::model::{AuthorStats, DirAuthorStats, DirStats, FileStats, MergeRecord, PrAuthorStats, RepoStats};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

impl SortDirection {
    pub fn ascending(ascending: bool) -> Self {
        if ascending {
            SortDirection::Ascending
        } else {
            SortDirection::Descending
        }
    }

    fn apply(self, ord: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    }
}

/// Leaderboard sort keys; unknown keys fall back to `Commits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeaderboardSort {
    Name,
    #[default]
    Commits,
    Additions,
    Deletions,
    Net,
}

impl LeaderboardSort {
    pub fn from_key(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => LeaderboardSort::Name,
            "commits" => LeaderboardSort::Commits,
            "additions" => LeaderboardSort::Additions,
            "deletions" => LeaderboardSort::Deletions,
            "net" => LeaderboardSort::Net,
            _ => LeaderboardSort::default(),
        }
    }

    fn compare(self, a: &AuthorStats, b: &AuthorStats) -> Ordering {
        match self {
            LeaderboardSort::Name => a.name.cmp(&b.name),
            LeaderboardSort::Commits => a.commits.cmp(&b.commits),
            LeaderboardSort::Additions => a.additions.cmp(&b.additions),
            LeaderboardSort::Deletions => a.deletions.cmp(&b.deletions),
            LeaderboardSort::Net => a.net().cmp(&b.net()),
        }
    }
}

/// File sort keys; unknown keys fall back to `Changes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileSort {
    Path,
    #[default]
    Changes,
    Touches,
    Authors,
}

impl FileSort {
    pub fn from_key(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().as_str() {
            "path" => FileSort::Path,
            "changes" => FileSort::Changes,
            "touches" => FileSort::Touches,
            "authors" => FileSort::Authors,
            _ => FileSort::default(),
        }
    }

    fn compare(self, a: &FileStats, b: &FileStats) -> Ordering {
        match self {
            FileSort::Path => a.path.cmp(&b.path),
            FileSort::Changes => a.total_changes.cmp(&b.total_changes),
            FileSort::Touches => a.touch_count.cmp(&b.touch_count),
            FileSort::Authors => a.author_count().cmp(&b.author_count()),
        }
    }
}

/// Directory sort keys; unknown keys fall back to `Changes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OwnershipSort {
    Path,
    #[default]
    Changes,
    Touches,
    Authors,
}

impl OwnershipSort {
    pub fn from_key(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().as_str() {
            "path" => OwnershipSort::Path,
            "changes" => OwnershipSort::Changes,
            "touches" => OwnershipSort::Touches,
            "authors" => OwnershipSort::Authors,
            _ => OwnershipSort::default(),
        }
    }

    fn compare(self, a: &DirStats, b: &DirStats) -> Ordering {
        match self {
            OwnershipSort::Path => a.path.cmp(&b.path),
            OwnershipSort::Changes => a.total_changes.cmp(&b.total_changes),
            OwnershipSort::Touches => a.touch_count.cmp(&b.touch_count),
            OwnershipSort::Authors => a.authors.len().cmp(&b.authors.len()),
        }
    }
}

/// PR author sort keys; unknown keys fall back to `Merges`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrAuthorSort {
    Name,
    #[default]
    Merges,
    Changes,
}

impl PrAuthorSort {
    pub fn from_key(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => PrAuthorSort::Name,
            "merges" => PrAuthorSort::Merges,
            "changes" => PrAuthorSort::Changes,
            _ => PrAuthorSort::default(),
        }
    }

    fn compare(self, a: &PrAuthorStats, b: &PrAuthorStats) -> Ordering {
        match self {
            PrAuthorSort::Name => a.name.cmp(&b.name),
            PrAuthorSort::Merges => a.merge_count.cmp(&b.merge_count),
            PrAuthorSort::Changes => a.total_changes.cmp(&b.total_changes),
        }
    }
}

/// Merge record sort keys; unknown keys fall back to `Date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeSort {
    #[default]
    Date,
    Size,
    Files,
}

impl MergeSort {
    pub fn from_key(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().as_str() {
            "date" => MergeSort::Date,
            "size" => MergeSort::Size,
            "files" => MergeSort::Files,
            _ => MergeSort::default(),
        }
    }

    fn compare(self, a: &MergeRecord, b: &MergeRecord) -> Ordering {
        match self {
            MergeSort::Date => a.merged_at.cmp(&b.merged_at),
            MergeSort::Size => a.size().cmp(&b.size()),
            MergeSort::Files => a.files_count.cmp(&b.files_count),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotspotFile {
    pub path: String,
    pub churn_score: f64,
    pub touch_score: f64,
    pub author_score: f64,
    pub risk_score: f64,
    pub author_count: usize,
    pub changes: u64,
    pub touch_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Concentration {
    #[serde(rename = "single owner")]
    SingleOwner,
    #[serde(rename = "concentrated")]
    Concentrated,
    #[serde(rename = "shared")]
    Shared,
    #[serde(rename = "collaborative")]
    Collaborative,
    #[serde(rename = "distributed")]
    Distributed,
}

impl Concentration {
    pub fn classify(top_share: f64, author_count: usize) -> Self {
        if top_share >= 80.0 {
            Concentration::SingleOwner
        } else if top_share >= 60.0 {
            Concentration::Concentrated
        } else if author_count <= 2 {
            Concentration::Shared
        } else if top_share >= 40.0 {
            Concentration::Collaborative
        } else {
            Concentration::Distributed
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Concentration::SingleOwner => "single owner",
            Concentration::Concentrated => "concentrated",
            Concentration::Shared => "shared",
            Concentration::Collaborative => "collaborative",
            Concentration::Distributed => "distributed",
        }
    }
}

impl fmt::Display for Concentration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Share at or above which an author counts towards the bus factor.
pub const BUS_FACTOR_SHARE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnershipDetail {
    pub path: String,
    pub total_changes: u64,
    pub touch_count: u32,
    /// Ranked by share, highest first.
    pub authors: Vec<DirAuthorStats>,
    pub concentration: Concentration,
    pub bus_factor: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimelineData {
    pub labels: Vec<NaiveDate>,
    pub values: Vec<u32>,
    pub rolling_avg: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapData {
    /// Monday-indexed weekday x hour.
    pub matrix: [[u32; 24]; 7],
    pub max_value: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub total_commits: u32,
    pub total_authors: u32,
    pub total_additions: u64,
    pub total_deletions: u64,
    pub total_changes: u64,
    pub files_modified: usize,
    pub total_merges: u32,
    pub total_prs: u32,
    pub codebase_size: Option<u64>,
    /// Changed lines as a percentage of the current codebase size.
    pub refactored_percent: Option<f64>,
}

/// Most similar identities listed next to an author.
pub const SIMILAR_AUTHOR_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileTouch {
    pub path: String,
    pub commits: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorDetail {
    pub name: String,
    pub email: String,
    pub commits: u32,
    pub additions: u64,
    pub deletions: u64,
    pub net: i64,
    pub files_count: usize,
    pub first_commit: DateTime<FixedOffset>,
    pub last_commit: DateTime<FixedOffset>,
    /// Most frequently touched files, by commit count then path.
    pub top_files: Vec<FileTouch>,
    /// Likely duplicate identities worth merging.
    pub similar: Vec<AuthorStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrSummary {
    pub total_merges: u32,
    pub total_prs: u32,
    pub contributors: usize,
    /// Mean changed lines per merge, rounded down.
    pub avg_size: u64,
    /// Earliest of the days with the most merges.
    pub busiest_day: Option<NaiveDate>,
    pub busiest_day_merges: u32,
}

fn sorted<T, C>(mut rows: Vec<T>, direction: SortDirection, compare: C) -> Vec<T>
where
    C: Fn(&T, &T) -> Ordering,
{
    rows.sort_by(|a, b| direction.apply(compare(a, b)));
    rows
}

fn truncated<T>(mut rows: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(n) = limit.filter(|&n| n > 0) {
        rows.truncate(n);
    }
    rows
}

impl RepoStats {
    pub fn leaderboard(&self, sort: LeaderboardSort, direction: SortDirection) -> Vec<AuthorStats> {
        let mut rows: Vec<AuthorStats> = self.authors.values().cloned().collect();
        rows.sort_by_key(|a| a.seq);
        sorted(rows, direction, |a, b| sort.compare(a, b))
    }

    pub fn top_files(&self, sort: FileSort, direction: SortDirection, limit: Option<usize>) -> Vec<FileStats> {
        let mut rows: Vec<FileStats> = self.files.values().cloned().collect();
        rows.sort_by_key(|f| f.seq);
        truncated(sorted(rows, direction, |a, b| sort.compare(a, b)), limit)
    }

    /// Multi-author files ranked by a blend of churn, touch frequency and
    /// author diversity. Scores are normalised against the maxima over all
    /// files, so `risk_score` stays within 0..=100.
    pub fn hotspots(&self, limit: Option<usize>) -> Vec<HotspotFile> {
        let max_changes = self.files.values().map(|f| f.total_changes).max().unwrap_or(0).max(1) as f64;
        let max_touches = self.files.values().map(|f| f.touch_count).max().unwrap_or(0).max(1) as f64;
        let total_authors = self.total_authors.max(1) as f64;

        let mut candidates: Vec<&FileStats> =
            self.files.values().filter(|f| f.author_count() >= 2).collect();
        candidates.sort_by_key(|f| f.seq);

        let rows: Vec<HotspotFile> = candidates
            .into_iter()
            .map(|f| {
                let author_count = f.author_count();
                let churn_score = f.total_changes as f64 / max_changes;
                let touch_score = f.touch_count as f64 / max_touches;
                let author_score = (author_count as f64 / total_authors).min(1.0);
                let risk_score = 100.0 * (0.4 * churn_score + 0.3 * touch_score + 0.3 * author_score);
                HotspotFile {
                    path: f.path.clone(),
                    churn_score,
                    touch_score,
                    author_score,
                    risk_score,
                    author_count,
                    changes: f.total_changes,
                    touch_count: f.touch_count,
                }
            })
            .collect();

        truncated(
            sorted(rows, SortDirection::Descending, |a, b| a.risk_score.total_cmp(&b.risk_score)),
            limit,
        )
    }

    pub fn ownership(&self, sort: OwnershipSort, direction: SortDirection) -> Vec<DirStats> {
        let mut rows: Vec<DirStats> = self.dirs.values().cloned().collect();
        rows.sort_by_key(|d| d.seq);
        sorted(rows, direction, |a, b| sort.compare(a, b))
    }

    pub fn ownership_detail(&self, path: &str) -> Option<OwnershipDetail> {
        let dir = self.dirs.get(path)?;

        let mut authors: Vec<DirAuthorStats> = dir.authors.values().cloned().collect();
        authors.sort_by_key(|a| a.seq);
        let authors = sorted(authors, SortDirection::Descending, |a, b| a.share.total_cmp(&b.share));

        let top_share = authors.first().map(|a| a.share).unwrap_or(0.0);
        let bus_factor = authors.iter().filter(|a| a.share >= BUS_FACTOR_SHARE).count();

        Some(OwnershipDetail {
            path: dir.path.clone(),
            total_changes: dir.total_changes,
            touch_count: dir.touch_count,
            concentration: Concentration::classify(top_share, authors.len()),
            bus_factor,
            authors,
        })
    }

    /// Daily commit counts from the first to the last active day, gaps
    /// filled with zero, plus a trailing rolling average.
    pub fn timeline(&self, window: usize) -> TimelineData {
        dense_series(&self.daily_activity, window)
    }

    /// Same shape as [`RepoStats::timeline`] over merge commits only.
    pub fn merge_timeline(&self, window: usize) -> TimelineData {
        dense_series(&self.pr.daily_merges, window)
    }

    pub fn heatmap(&self) -> HeatmapData {
        let max_value = self.hourly_matrix.iter().flatten().copied().max().unwrap_or(0);
        HeatmapData {
            matrix: self.hourly_matrix,
            max_value,
        }
    }

    pub fn pr_leaderboard(&self, sort: PrAuthorSort, direction: SortDirection) -> Vec<PrAuthorStats> {
        let mut rows: Vec<PrAuthorStats> = self.pr.merges_by_author.values().cloned().collect();
        rows.sort_by_key(|a| a.seq);
        sorted(rows, direction, |a, b| sort.compare(a, b))
    }

    pub fn merge_list(&self, sort: MergeSort, direction: SortDirection, limit: Option<usize>) -> Vec<MergeRecord> {
        truncated(
            sorted(self.pr.merges.clone(), direction, |a, b| sort.compare(a, b)),
            limit,
        )
    }

    pub fn summary(&self) -> SummaryStats {
        let total_changes = self.total_additions + self.total_deletions;
        let refactored_percent = self
            .codebase_size
            .filter(|&size| size > 0)
            .map(|size| total_changes as f64 / size as f64 * 100.0);

        SummaryStats {
            total_commits: self.total_commits,
            total_authors: self.total_authors,
            total_additions: self.total_additions,
            total_deletions: self.total_deletions,
            total_changes,
            files_modified: self.files.len(),
            total_merges: self.pr.total_merges,
            total_prs: self.pr.total_prs,
            codebase_size: self.codebase_size,
            refactored_percent,
        }
    }
}

fn dense_series(days: &BTreeMap<NaiveDate, u32>, window: usize) -> TimelineData {
    let (Some(first), Some(last)) = (days.keys().next(), days.keys().next_back()) else {
        return TimelineData::default();
    };

    let mut labels = Vec::new();
    let mut values = Vec::new();
    let mut day = *first;
    while day <= *last {
        labels.push(day);
        values.push(days.get(&day).copied().unwrap_or(0));
        day += Duration::days(1);
    }

    let window = window.max(1);
    let mut rolling_avg = Vec::with_capacity(values.len());
    let mut running = 0u64;
    for (i, &value) in values.iter().enumerate() {
        running += value as u64;
        if i >= window {
            running -= values[i - window] as u64;
        }
        let span = window.min(i + 1);
        rolling_avg.push(running as f64 / span as f64);
    }

    TimelineData {
        labels,
        values,
        rolling_avg,
    }
}

impl RepoStats {
    /// Other identities that probably belong to the same person: the
    /// lowercased names share their first three characters (or are equal
    /// when shorter), or the email local parts match. Highest commit
    /// counts first, at most [`SIMILAR_AUTHOR_LIMIT`].
    pub fn similar_authors(&self, email: &str) -> Vec<AuthorStats> {
        let Some(target) = self.authors.get(email) else {
            return Vec::new();
        };
        let name = target.name.to_lowercase();
        let local = email_local_part(&target.email);

        let mut rows: Vec<AuthorStats> = self
            .authors
            .values()
            .filter(|a| a.email != target.email)
            .filter(|a| {
                names_alike(&name, &a.name.to_lowercase())
                    || (!local.is_empty() && email_local_part(&a.email) == local)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.seq);
        truncated(
            sorted(rows, SortDirection::Descending, |a, b| a.commits.cmp(&b.commits)),
            Some(SIMILAR_AUTHOR_LIMIT),
        )
    }

    pub fn author_detail(&self, email: &str, top_files: usize) -> Option<AuthorDetail> {
        let author = self.authors.get(email)?;

        let mut files: Vec<FileTouch> = author
            .files_touched
            .iter()
            .map(|(path, &commits)| FileTouch {
                path: path.clone(),
                commits,
            })
            .collect();
        files.sort_by(|a, b| b.commits.cmp(&a.commits).then_with(|| a.path.cmp(&b.path)));

        Some(AuthorDetail {
            name: author.name.clone(),
            email: author.email.clone(),
            commits: author.commits,
            additions: author.additions,
            deletions: author.deletions,
            net: author.net(),
            files_count: author.files_touched.len(),
            first_commit: author.first_commit,
            last_commit: author.last_commit,
            top_files: truncated(files, Some(top_files)),
            similar: self.similar_authors(email),
        })
    }

    pub fn pr_summary(&self) -> PrSummary {
        let pr = &self.pr;
        let total_size: u64 = pr.merges.iter().map(|m| m.size()).sum();
        let avg_size = if pr.total_merges > 0 {
            total_size / pr.total_merges as u64
        } else {
            0
        };

        let mut busiest: Option<(NaiveDate, u32)> = None;
        for (&day, &count) in &pr.daily_merges {
            if busiest.map_or(true, |(_, best)| count > best) {
                busiest = Some((day, count));
            }
        }

        PrSummary {
            total_merges: pr.total_merges,
            total_prs: pr.total_prs,
            contributors: pr.merges_by_author.len(),
            avg_size,
            busiest_day: busiest.map(|(day, _)| day),
            busiest_day_merges: busiest.map_or(0, |(_, count)| count),
        }
    }
}

fn email_local_part(email: &str) -> &str {
    email.split_once('@').map_or(email, |(local, _)| local)
}

fn names_alike(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a.chars().count() >= 3 && b.chars().count() >= 3 {
        a.chars().take(3).eq(b.chars().take(3))
    } else {
        a == b
    }
}
