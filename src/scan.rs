//! Scan session: one producer thread per repository running `git log`
//! through the parser, and the calling thread folding commits into a
//! single [`Aggregator`].

use crate::config::Config;
use crate::error::{PulseError, Result};
use crate::git::{GitRepo, LogSource, ScanOutcome};
use crate::model::{Commit, DateRange, RepoStats, ScanProgress};
use crate::stats::{Aggregator, MergeReport};
use crossbeam_channel::bounded;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{debug, info, warn};

pub use crate::git::CancelToken;

const CHANNEL_CAPACITY: usize = 1024;

enum Message {
    Commit(Commit),
    Progress(ScanProgress),
}

#[derive(Debug, Clone)]
pub struct ProgressUpdate<'a> {
    pub repo: &'a Path,
    /// Commits expected in range, when history could be walked up front.
    pub estimate: Option<usize>,
    pub progress: ScanProgress,
}

#[derive(Debug)]
pub enum RepoOutcome {
    Scanned(ScanOutcome),
    Failed(PulseError),
    /// Not started because the session was cancelled first.
    Skipped,
}

#[derive(Debug)]
pub struct RepoScan {
    pub path: PathBuf,
    pub outcome: RepoOutcome,
}

#[derive(Debug)]
pub struct ScanReport {
    pub stats: RepoStats,
    pub repos: Vec<RepoScan>,
    pub cancelled: bool,
    pub merge: Option<MergeReport>,
}

impl ScanReport {
    pub fn failures(&self) -> impl Iterator<Item = (&Path, &PulseError)> {
        self.repos.iter().filter_map(|r| match &r.outcome {
            RepoOutcome::Failed(e) => Some((r.path.as_path(), e)),
            _ => None,
        })
    }

    pub fn all_failed(&self) -> bool {
        !self.repos.is_empty() && self.repos.iter().all(|r| matches!(r.outcome, RepoOutcome::Failed(_)))
    }
}

/// Scans every configured repository in order into one set of statistics.
///
/// A repository that fails is recorded and the next one is scanned.
/// Cancellation stops the current repository; later ones are skipped.
/// Configured aliases are applied once all repositories are in.
pub fn scan_repositories<F>(config: &Config, cancel: &CancelToken, mut on_progress: F) -> ScanReport
where
    F: FnMut(ProgressUpdate<'_>),
{
    let mut aggregator = Aggregator::new(config.label(), DateRange::new(), config.zone);
    let mut range_set = false;
    let mut repos = Vec::new();

    for path in config.repositories() {
        if cancel.is_cancelled() {
            debug!(repo = %path.display(), "scan cancelled, skipping repository");
            repos.push(RepoScan {
                path,
                outcome: RepoOutcome::Skipped,
            });
            continue;
        }

        let outcome = match scan_one(&path, config, cancel, &mut aggregator, &mut range_set, &mut on_progress) {
            Ok(outcome) => RepoOutcome::Scanned(outcome),
            Err(e) => {
                warn!(repo = %path.display(), error = %e, "repository scan failed");
                RepoOutcome::Failed(e)
            }
        };
        repos.push(RepoScan { path, outcome });
    }

    let mut stats = aggregator.into_stats();
    let merge = config.aliases.as_ref().filter(|a| !a.is_empty()).map(|aliases| {
        let report = stats.apply_identity_merge(aliases);
        for alias in &report.skipped {
            warn!(alias = %alias, "alias not applied");
        }
        report
    });

    ScanReport {
        stats,
        repos,
        cancelled: cancel.is_cancelled(),
        merge,
    }
}

fn scan_one<F>(
    path: &Path,
    config: &Config,
    cancel: &CancelToken,
    aggregator: &mut Aggregator,
    range_set: &mut bool,
    on_progress: &mut F,
) -> Result<ScanOutcome>
where
    F: FnMut(ProgressUpdate<'_>),
{
    let repo = GitRepo::open(Some(path))?;
    let range = repo.resolve_range(config.since.as_deref(), config.until.as_deref())?;
    if !*range_set {
        aggregator.set_range(range.clone());
        *range_set = true;
    }

    let estimate = match repo.estimate_commit_count(&range) {
        Ok(n) => Some(n),
        Err(e) => {
            debug!(repo = %path.display(), error = %e, "no commit estimate");
            None
        }
    };

    let source = LogSource::new(repo.path(), range);
    let (tx, rx) = bounded::<Message>(CHANNEL_CAPACITY);

    let joined = thread::scope(|scope| {
        let producer = scope.spawn(|| {
            let progress_tx = tx.clone();
            let commit_tx = tx;
            source.scan(
                cancel,
                |p| {
                    let _ = progress_tx.send(Message::Progress(p));
                },
                |c| {
                    let _ = commit_tx.send(Message::Commit(c));
                },
            )
        });

        for message in rx {
            match message {
                Message::Commit(commit) => aggregator.observe(&commit),
                Message::Progress(progress) => on_progress(ProgressUpdate {
                    repo: path,
                    estimate,
                    progress,
                }),
            }
        }

        producer.join()
    });

    let outcome = joined.map_err(|_| PulseError::source_unavailable(path.display().to_string(), "log reader panicked"))??;

    if !outcome.is_cancelled() {
        match source.codebase_size() {
            Ok(lines) => aggregator.add_codebase_size(lines),
            Err(e) => debug!(repo = %path.display(), error = %e, "codebase size unavailable"),
        }
    } else {
        info!(repo = %path.display(), commits = outcome.commits(), "scan cancelled");
    }

    Ok(outcome)
}

/// Terminal progress for a scan session, drawn on stderr.
pub struct ScanProgressBar {
    bar: ProgressBar,
    current: Option<PathBuf>,
}

impl ScanProgressBar {
    pub fn new(enabled: bool) -> Self {
        let bar = if enabled { ProgressBar::new_spinner() } else { ProgressBar::hidden() };
        Self { bar, current: None }
    }

    pub fn update(&mut self, update: &ProgressUpdate<'_>) {
        if self.current.as_deref() != Some(update.repo) {
            self.current = Some(update.repo.to_path_buf());
            self.restyle(update.estimate);
            self.bar.set_message(update.repo.display().to_string());
        }
        if update.progress.done {
            return;
        }
        self.bar.set_position(update.progress.commits_parsed as u64);
    }

    fn restyle(&self, estimate: Option<usize>) {
        match estimate {
            Some(total) => {
                self.bar.set_length(total as u64);
                self.bar.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len} commits")
                        .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
            }
            None => {
                self.bar.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.green} {msg} {pos} commits")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
            }
        }
        self.bar.set_position(0);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
