use crate::model::{
    AuthorStats, Commit, DateRange, DirAuthorStats, DirStats, FileStats, MergeRecord,
    PrAuthorStats, RepoStats,
};
use crate::util::{top_dir, DisplayZone};
use std::collections::hash_map::Entry;
use std::collections::HashSet;

/// Folds a commit stream into [`RepoStats`].
///
/// One aggregator is one scan session; it is not meant to be shared between
/// concurrent writers. Binary file changes count towards the commit but are
/// kept out of every line sum and touch count.
pub struct Aggregator {
    stats: RepoStats,
    zone: DisplayZone,
    next_seq: usize,
}

impl Aggregator {
    pub fn new(path: impl Into<String>, range: DateRange, zone: DisplayZone) -> Self {
        Self {
            stats: RepoStats::new(path, range),
            zone,
            next_seq: 0,
        }
    }

    pub fn set_range(&mut self, range: DateRange) {
        self.stats.range = range;
    }

    /// Adds one commit. Each commit must be observed at most once.
    pub fn observe(&mut self, commit: &Commit) {
        let zone = self.zone;
        let seq = &mut self.next_seq;
        let stats = &mut self.stats;

        stats.total_commits += 1;

        let day = zone.day_of(&commit.author_date);
        let (weekday, hour) = zone.weekday_hour(&commit.author_date);
        *stats.daily_activity.entry(day).or_insert(0) += 1;
        stats.hourly_matrix[weekday][hour] += 1;

        let email = &commit.author.email;
        let author = match stats.authors.entry(email.clone()) {
            Entry::Occupied(o) => o.into_mut(),
            Entry::Vacant(v) => {
                stats.total_authors += 1;
                v.insert(AuthorStats::new(&commit.author, commit.author_date, bump(seq)))
            }
        };
        author.commits += 1;
        author.record_seen(commit.author_date);

        let mut seen_files: HashSet<&str> = HashSet::new();
        let mut seen_dirs: HashSet<&str> = HashSet::new();

        for change in commit.file_changes.iter().filter(|c| !c.is_binary) {
            let added = change.additions as u64;
            let deleted = change.deletions as u64;
            let path = change.path.as_str();
            let first_touch = seen_files.insert(path);

            author.additions += added;
            author.deletions += deleted;
            if first_touch {
                *author.files_touched.entry(path.to_string()).or_insert(0) += 1;
            }
            stats.total_additions += added;
            stats.total_deletions += deleted;

            let file = stats
                .files
                .entry(path.to_string())
                .or_insert_with(|| FileStats::new(path.to_string(), bump(seq)));
            file.additions += added;
            file.deletions += deleted;
            file.total_changes += added + deleted;
            if first_touch {
                file.touch_count += 1;
                *file.authors.entry(email.clone()).or_insert(0) += 1;
            }

            let dir_key = top_dir(path);
            let dir = stats
                .dirs
                .entry(dir_key.to_string())
                .or_insert_with(|| DirStats::new(dir_key.to_string(), bump(seq)));
            dir.total_changes += added + deleted;
            if first_touch {
                dir.touch_count += 1;
            }

            let dir_author = dir.authors.entry(email.clone()).or_insert_with(|| DirAuthorStats {
                name: commit.author.name.clone(),
                email: email.clone(),
                commits: 0,
                changes: 0,
                share: 0.0,
                seq: bump(seq),
            });
            dir_author.changes += added + deleted;
            if seen_dirs.insert(dir_key) {
                dir_author.commits += 1;
            }
        }

        if commit.is_merge {
            self.observe_merge(commit);
        }
    }

    fn observe_merge(&mut self, commit: &Commit) {
        let day = self.zone.day_of(&commit.author_date);
        let seq = &mut self.next_seq;
        let pr = &mut self.stats.pr;

        pr.total_merges += 1;
        *pr.daily_merges.entry(day).or_insert(0) += 1;

        let (additions, deletions) = commit
            .file_changes
            .iter()
            .filter(|c| !c.is_binary)
            .fold((0u64, 0u64), |(a, d), c| (a + c.additions as u64, d + c.deletions as u64));

        let author = pr
            .merges_by_author
            .entry(commit.author.email.clone())
            .or_insert_with(|| PrAuthorStats {
                name: commit.author.name.clone(),
                email: commit.author.email.clone(),
                merge_count: 0,
                total_changes: 0,
                pr_numbers: Vec::new(),
                seq: bump(seq),
            });
        author.merge_count += 1;
        author.total_changes += additions + deletions;
        if let Some(number) = commit.pr_number {
            author.pr_numbers.push(number);
            pr.total_prs += 1;
        }

        pr.merges.push(MergeRecord {
            pr_number: commit.pr_number,
            merged_by: commit.author.name.clone(),
            merged_by_email: commit.author.email.clone(),
            merged_at: commit.author_date,
            branch: commit.merge_branch.clone(),
            subject: commit.subject.clone(),
            additions,
            deletions,
            files_count: commit.file_changes.len(),
        });
    }

    pub fn add_codebase_size(&mut self, lines: u64) {
        self.stats.codebase_size = Some(self.stats.codebase_size.unwrap_or(0) + lines);
    }

    /// Computes directory ownership shares. Shares read before the first
    /// call are meaningless.
    pub fn finalize(&mut self) -> &RepoStats {
        for dir in self.stats.dirs.values_mut() {
            dir.recompute_shares();
        }
        self.stats.finalized = true;
        &self.stats
    }

    pub fn into_stats(mut self) -> RepoStats {
        if !self.stats.finalized {
            self.finalize();
        }
        self.stats
    }
}

fn bump(seq: &mut usize) -> usize {
    let current = *seq;
    *seq += 1;
    current
}
