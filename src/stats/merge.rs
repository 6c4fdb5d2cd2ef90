use crate::error::{PulseError, Result};
use crate::model::RepoStats;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Validated alias -> primary email mapping.
///
/// Flat rather than a tree: every value must itself be a key that maps to
/// itself, so each alias resolves to its primary in one step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasMap {
    entries: BTreeMap<String, String>,
}

impl AliasMap {
    pub fn new<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let entries: BTreeMap<String, String> = entries.into_iter().collect();
        for (alias, primary) in &entries {
            match entries.get(primary) {
                Some(target) if target == primary => {}
                Some(target) => {
                    return Err(PulseError::InvalidAliasMap(format!(
                        "{alias} maps to {primary}, which is itself an alias of {target}"
                    )))
                }
                None => {
                    return Err(PulseError::InvalidAliasMap(format!(
                        "{alias} maps to {primary}, which does not map to itself"
                    )))
                }
            }
        }
        Ok(Self { entries })
    }

    /// Builds a map folding `aliases` into `primary`.
    pub fn group<S: Into<String>>(primary: S, aliases: impl IntoIterator<Item = S>) -> Result<Self> {
        let primary = primary.into();
        let mut entries = vec![(primary.clone(), primary.clone())];
        entries.extend(aliases.into_iter().map(|alias| (alias.into(), primary.clone())));
        Self::new(entries)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let raw: BTreeMap<String, String> = serde_json::from_str(text)?;
        Self::new(raw)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (alias, primary) pairs, primaries excluded.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter(|(alias, primary)| alias != primary)
            .map(|(alias, primary)| (alias.as_str(), primary.as_str()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub merged: Vec<String>,
    /// Aliases left alone because either side had no author record.
    pub skipped: Vec<String>,
}

impl RepoStats {
    /// Folds every alias identity into its primary across authors, files,
    /// directories and merge statistics.
    ///
    /// Each alias is applied whole or not at all. Re-applying a map that has
    /// already been applied changes nothing.
    pub fn apply_identity_merge(&mut self, map: &AliasMap) -> MergeReport {
        let mut report = MergeReport::default();
        let mut touched_dirs: HashSet<String> = HashSet::new();

        for (alias, primary) in map.aliases() {
            if !self.authors.contains_key(primary) {
                debug!(alias, primary, "primary identity not present, skipping");
                report.skipped.push(alias.to_string());
                continue;
            }
            let Some(alias_stats) = self.authors.remove(alias) else {
                debug!(alias, primary, "alias identity not present, skipping");
                report.skipped.push(alias.to_string());
                continue;
            };
            let Some(target) = self.authors.get_mut(primary) else {
                warn!(alias, primary, "primary identity vanished during merge");
                self.authors.insert(alias.to_string(), alias_stats);
                report.skipped.push(alias.to_string());
                continue;
            };

            target.commits += alias_stats.commits;
            target.additions += alias_stats.additions;
            target.deletions += alias_stats.deletions;
            for (file, count) in alias_stats.files_touched {
                *target.files_touched.entry(file).or_insert(0) += count;
            }
            target.record_seen(alias_stats.first_commit);
            target.record_seen(alias_stats.last_commit);
            let primary_name = target.name.clone();
            self.total_authors = self.total_authors.saturating_sub(1);

            for file in self.files.values_mut() {
                if let Some(count) = file.authors.remove(alias) {
                    *file.authors.entry(primary.to_string()).or_insert(0) += count;
                }
            }

            for dir in self.dirs.values_mut() {
                let Some(mut record) = dir.authors.remove(alias) else {
                    continue;
                };
                match dir.authors.get_mut(primary) {
                    Some(existing) => {
                        existing.commits += record.commits;
                        existing.changes += record.changes;
                    }
                    None => {
                        record.email = primary.to_string();
                        record.name.clone_from(&primary_name);
                        dir.authors.insert(primary.to_string(), record);
                    }
                }
                touched_dirs.insert(dir.path.clone());
            }

            self.merge_pr_identity(alias, primary, &primary_name);
            report.merged.push(alias.to_string());
        }

        if self.finalized {
            for path in &touched_dirs {
                if let Some(dir) = self.dirs.get_mut(path) {
                    dir.recompute_shares();
                }
            }
        }

        if !report.merged.is_empty() {
            debug!(merged = report.merged.len(), skipped = report.skipped.len(), "identity merge applied");
        }
        report
    }

    fn merge_pr_identity(&mut self, alias: &str, primary: &str, primary_name: &str) {
        let pr = &mut self.pr;
        if let Some(mut record) = pr.merges_by_author.remove(alias) {
            match pr.merges_by_author.get_mut(primary) {
                Some(existing) => {
                    existing.merge_count += record.merge_count;
                    existing.total_changes += record.total_changes;
                    existing.pr_numbers.append(&mut record.pr_numbers);
                }
                None => {
                    record.email = primary.to_string();
                    record.name = primary_name.to_string();
                    pr.merges_by_author.insert(primary.to_string(), record);
                }
            }
        }

        for merge in pr.merges.iter_mut().filter(|m| m.merged_by_email == alias) {
            merge.merged_by_email = primary.to_string();
            merge.merged_by = primary_name.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Commit, DateRange};
    use crate::stats::fixtures::{change, commit, merge_commit};
    use crate::stats::{Aggregator, LeaderboardSort, SortDirection};
    use crate::util::DisplayZone;
    use pretty_assertions::assert_eq;

    fn build(commits: &[Commit]) -> RepoStats {
        let mut agg = Aggregator::new("repo", DateRange::new(), DisplayZone::Utc);
        for c in commits {
            agg.observe(c);
        }
        agg.into_stats()
    }

    fn jo_twice() -> RepoStats {
        build(&[
            commit("Jo", "a@x.com", "2024-01-02T10:00:00Z", vec![change("main.go", 10, 0)]),
            commit("Jo", "b@x.com", "2024-01-01T10:00:00Z", vec![change("main.go", 5, 2)]),
            commit("Ann", "c@x.com", "2024-01-03T10:00:00Z", vec![change("lib/other.go", 1, 1)]),
        ])
    }

    #[test]
    fn validates_primaries() {
        assert!(AliasMap::group("a@x.com", ["b@x.com"]).is_ok());

        let missing = AliasMap::new([("b@x.com".to_string(), "a@x.com".to_string())]);
        assert!(matches!(missing, Err(PulseError::InvalidAliasMap(_))));

        let chained = AliasMap::new([
            ("a@x.com".to_string(), "a@x.com".to_string()),
            ("b@x.com".to_string(), "a@x.com".to_string()),
            ("c@x.com".to_string(), "b@x.com".to_string()),
        ]);
        assert!(matches!(chained, Err(PulseError::InvalidAliasMap(_))));
    }

    #[test]
    fn parses_json_maps() {
        let map = AliasMap::from_json(r#"{"a@x.com": "a@x.com", "b@x.com": "a@x.com"}"#).unwrap();
        let pairs: Vec<(&str, &str)> = map.aliases().collect();
        assert_eq!(pairs, vec![("b@x.com", "a@x.com")]);
        assert!(AliasMap::from_json("[1, 2]").is_err());
    }

    #[test]
    fn merging_duplicate_identity() {
        let mut stats = jo_twice();
        assert_eq!(stats.hotspots(None).len(), 1);

        let report = stats.apply_identity_merge(&AliasMap::group("a@x.com", ["b@x.com"]).unwrap());
        assert_eq!(report.merged, vec!["b@x.com"]);
        assert_eq!(stats.total_authors, 2);

        let board = stats.leaderboard(LeaderboardSort::Commits, SortDirection::Descending);
        let jo = &board[0];
        assert_eq!((jo.name.as_str(), jo.commits, jo.additions, jo.deletions), ("Jo", 2, 15, 2));
        assert_eq!(jo.first_commit.to_rfc3339(), "2024-01-01T10:00:00+00:00");
        assert_eq!(jo.last_commit.to_rfc3339(), "2024-01-02T10:00:00+00:00");
        assert_eq!(jo.files_touched["main.go"], 2);

        assert_eq!(stats.files["main.go"].authors.len(), 1);
        assert_eq!(stats.files["main.go"].authors["a@x.com"], 2);
        assert!(stats.hotspots(None).is_empty());

        let root = &stats.dirs["."];
        assert_eq!(root.authors.len(), 1);
        assert_eq!(root.authors["a@x.com"].commits, 2);
        assert_eq!(root.authors["a@x.com"].changes, 17);
        assert!((root.authors["a@x.com"].share - 100.0).abs() < 1e-9);
    }

    #[test]
    fn merging_is_idempotent() {
        let map = AliasMap::group("a@x.com", ["b@x.com"]).unwrap();
        let mut once = jo_twice();
        once.apply_identity_merge(&map);
        let mut twice = once.clone();
        let report = twice.apply_identity_merge(&map);

        assert_eq!(once, twice);
        assert!(report.merged.is_empty());
        assert_eq!(report.skipped, vec!["b@x.com"]);
    }

    #[test]
    fn skips_aliases_without_records() {
        let mut stats = jo_twice();
        let before = stats.clone();
        let report = stats.apply_identity_merge(&AliasMap::group("nobody@x.com", ["b@x.com"]).unwrap());
        assert_eq!(report.skipped, vec!["b@x.com"]);
        assert_eq!(stats, before);
    }

    #[test]
    fn commit_totals_survive_merge() {
        let mut stats = build(&[
            commit("Jo", "a@x.com", "2024-01-01T10:00:00Z", vec![change("src/a.rs", 3, 0)]),
            commit("Jo", "b@x.com", "2024-01-02T10:00:00Z", vec![change("src/b.rs", 1, 0)]),
            commit("Jo", "j@y.org", "2024-01-03T10:00:00Z", vec![change("src/c.rs", 2, 0)]),
            commit("Ann", "c@x.com", "2024-01-04T10:00:00Z", vec![change("src/a.rs", 4, 0)]),
        ]);
        let commits_before: u32 = stats.authors.values().map(|a| a.commits).sum();

        let report = stats.apply_identity_merge(&AliasMap::group("a@x.com", ["b@x.com", "j@y.org"]).unwrap());
        assert_eq!(report.merged.len(), 2);
        assert_eq!(stats.total_authors, 2);
        let commits_after: u32 = stats.authors.values().map(|a| a.commits).sum();
        assert_eq!(commits_before, commits_after);

        let src = &stats.dirs["src"];
        let sum: f64 = src.authors.values().map(|a| a.share).sum();
        assert!((sum - 100.0).abs() < 1e-9);
        assert!((src.authors["a@x.com"].share - 60.0).abs() < 1e-9);
    }

    #[test]
    fn renames_directory_record_when_primary_absent() {
        let mut stats = build(&[
            commit("Jo", "a@x.com", "2024-01-01T10:00:00Z", vec![change("docs/a.md", 3, 0)]),
            commit("Jo (laptop)", "b@x.com", "2024-01-02T10:00:00Z", vec![change("src/b.rs", 1, 0)]),
        ]);
        stats.apply_identity_merge(&AliasMap::group("a@x.com", ["b@x.com"]).unwrap());

        let record = &stats.dirs["src"].authors["a@x.com"];
        assert_eq!(record.email, "a@x.com");
        assert_eq!(record.name, "Jo");
        assert!(!stats.dirs["src"].authors.contains_key("b@x.com"));
    }

    #[test]
    fn merges_pr_statistics() {
        let mut stats = build(&[
            merge_commit("Jo", "a@x.com", "2024-01-01T10:00:00Z", "Merge pull request #1 from a/b", Some(1), Some("a/b"), vec![]),
            merge_commit("Jo", "b@x.com", "2024-01-02T10:00:00Z", "Merge pull request #2 from a/c", Some(2), Some("a/c"), vec![]),
        ]);
        stats.apply_identity_merge(&AliasMap::group("a@x.com", ["b@x.com"]).unwrap());

        assert_eq!(stats.pr.merges_by_author.len(), 1);
        let jo = &stats.pr.merges_by_author["a@x.com"];
        assert_eq!(jo.merge_count, 2);
        assert_eq!(jo.pr_numbers, vec![1, 2]);
        assert!(stats.pr.merges.iter().all(|m| m.merged_by_email == "a@x.com"));
    }
}
