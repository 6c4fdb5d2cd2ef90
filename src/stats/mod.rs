pub mod aggregate;
pub mod merge;
pub mod views;

pub use aggregate::Aggregator;
pub use merge::{AliasMap, MergeReport};
pub use views::{
    AuthorDetail, Concentration, FileSort, FileTouch, HeatmapData, HotspotFile, LeaderboardSort, MergeSort,
    OwnershipDetail, OwnershipSort, PrAuthorSort, PrSummary, SortDirection, SummaryStats, TimelineData,
    SIMILAR_AUTHOR_LIMIT,
};

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::model::{Author, Commit, FileChange};
    use chrono::DateTime;

    pub fn change(path: &str, additions: u32, deletions: u32) -> FileChange {
        FileChange {
            path: path.to_string(),
            additions,
            deletions,
            is_binary: false,
        }
    }

    pub fn binary(path: &str) -> FileChange {
        FileChange {
            path: path.to_string(),
            additions: 0,
            deletions: 0,
            is_binary: true,
        }
    }

    pub fn commit(name: &str, email: &str, date: &str, changes: Vec<FileChange>) -> Commit {
        let author_date = DateTime::parse_from_rfc3339(date).unwrap();
        Commit {
            hash: format!("{:040x}", author_date.timestamp()),
            short_hash: format!("{:07x}", author_date.timestamp() & 0xfff_ffff),
            author: Author {
                name: name.to_string(),
                email: email.to_string(),
            },
            author_date,
            subject: "change".to_string(),
            file_changes: changes,
            is_merge: false,
            pr_number: None,
            merge_branch: None,
        }
    }

    pub fn merge_commit(
        name: &str,
        email: &str,
        date: &str,
        subject: &str,
        pr_number: Option<u32>,
        branch: Option<&str>,
        changes: Vec<FileChange>,
    ) -> Commit {
        Commit {
            subject: subject.to_string(),
            is_merge: true,
            pr_number,
            merge_branch: branch.map(str::to_string),
            ..commit(name, email, date, changes)
        }
    }
}
