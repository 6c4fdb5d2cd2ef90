use crate::config::{load_alias_file, Config};
use crate::model::RepoStats;
use crate::output;
use crate::scan::{scan_repositories, CancelToken, ScanProgressBar};
use crate::stats::{
    FileSort, LeaderboardSort, MergeSort, OwnershipDetail, OwnershipSort, PrAuthorSort, PrSummary, SortDirection,
};
use crate::util::DisplayZone;
use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser)]
#[command(name = "gitpulse")]
#[command(about = "Git history statistics: leaderboards, hotspots, ownership and activity patterns")]
#[command(version)]
pub struct Cli {
    #[clap(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone)]
pub struct CommonArgs {
    #[arg(long, help = "Path to git repository (repeat to combine several)")]
    pub repo: Vec<PathBuf>,

    #[arg(long, help = "Only commits after this date (RFC3339, YYYY-MM-DD, '2 weeks ago', 90d or a commit)")]
    pub since: Option<String>,

    #[arg(long, help = "Only commits before this date (RFC3339, YYYY-MM-DD, '2 weeks ago', 90d or a commit)")]
    pub until: Option<String>,

    #[arg(long, help = "Zone for day and hour buckets: local, utc or an offset like +05:30", default_value = "local")]
    pub tz: String,

    #[arg(long, help = "JSON file mapping alias emails to their primary email")]
    pub aliases: Option<PathBuf>,

    #[arg(long, help = "Disable the progress bar")]
    pub no_progress: bool,
}

impl CommonArgs {
    pub fn to_config(&self) -> Result<Config> {
        let zone: DisplayZone = self.tz.parse().context("Failed to parse --tz")?;
        let aliases = self
            .aliases
            .as_deref()
            .map(load_alias_file)
            .transpose()
            .context("Failed to load alias file")?;

        Ok(Config {
            repo_paths: self.repo.clone(),
            since: self.since.clone(),
            until: self.until.clone(),
            zone,
            aliases,
            show_progress: !self.no_progress,
            ..Config::default()
        })
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Totals for the scanned history
    Summary {
        #[arg(long, help = "Output as JSON")]
        json: bool,
    },
    /// Authors ranked by activity
    Leaderboard {
        #[arg(long, help = "Sort by name, commits, additions, deletions or net", default_value = "commits")]
        sort: String,

        #[arg(long, help = "Sort ascending")]
        asc: bool,

        #[arg(long, help = "Number of authors to show")]
        limit: Option<usize>,

        #[arg(long, help = "Output as JSON")]
        json: bool,
    },
    /// Most changed files
    Files {
        #[arg(long, help = "Sort by path, changes, touches or authors", default_value = "changes")]
        sort: String,

        #[arg(long, help = "Sort ascending")]
        asc: bool,

        #[arg(long, help = "Number of files to show")]
        limit: Option<usize>,

        #[arg(long, help = "Output as JSON")]
        json: bool,
    },
    /// One author's totals, most touched files and likely aliases
    Author {
        #[arg(help = "Author email")]
        email: String,

        #[arg(long, help = "Number of files to show")]
        files: Option<usize>,

        #[arg(long, help = "Output as JSON")]
        json: bool,
    },
    /// Files with several authors and high churn
    Hotspots {
        #[arg(long, help = "Number of files to show")]
        limit: Option<usize>,

        #[arg(long, help = "Output as JSON")]
        json: bool,
    },
    /// Who owns each top-level directory
    Ownership {
        #[arg(long, help = "Sort by path, changes, touches or authors", default_value = "changes")]
        sort: String,

        #[arg(long, help = "Sort ascending")]
        asc: bool,

        #[arg(help = "Show the author breakdown of one directory")]
        dir: Option<String>,

        #[arg(long, help = "Output as JSON")]
        json: bool,
    },
    /// Commits per day with a rolling average
    Timeline {
        #[arg(long, help = "Rolling average window in days")]
        window: Option<usize>,

        #[arg(long, help = "Count merge commits only")]
        merges: bool,

        #[arg(long, help = "Output as JSON")]
        json: bool,
    },
    /// Commits by weekday and hour
    Heatmap {
        #[arg(long, help = "Output as JSON")]
        json: bool,
    },
    /// Merge and pull request statistics
    Prs {
        #[arg(long, help = "Sort mergers by name, merges or changes", default_value = "merges")]
        sort: String,

        #[arg(long, help = "Sort merges by date, size or files", default_value = "date")]
        merge_sort: String,

        #[arg(long, help = "Sort ascending")]
        asc: bool,

        #[arg(long, help = "Number of merges to list")]
        limit: Option<usize>,

        #[arg(long, help = "Output as JSON")]
        json: bool,
    },
}

impl Commands {
    fn json(&self) -> bool {
        match self {
            Commands::Summary { json }
            | Commands::Leaderboard { json, .. }
            | Commands::Files { json, .. }
            | Commands::Author { json, .. }
            | Commands::Hotspots { json, .. }
            | Commands::Ownership { json, .. }
            | Commands::Timeline { json, .. }
            | Commands::Heatmap { json }
            | Commands::Prs { json, .. } => *json,
        }
    }
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn execute(self) -> Result<()> {
        let config = self.common.to_config()?;
        let cancel = CancelToken::new();
        let on_interrupt = cancel.clone();
        if let Err(e) = ctrlc::set_handler(move || on_interrupt.cancel()) {
            debug!(error = %e, "could not install Ctrl-C handler");
        }

        let mut bar = ScanProgressBar::new(config.show_progress && !self.command.json());
        let report = scan_repositories(&config, &cancel, |update| bar.update(&update));
        bar.finish();

        output::report_scan_problems(&report);
        if report.all_failed() {
            let reason = report
                .failures()
                .next()
                .map(|(_, e)| e.to_string())
                .unwrap_or_default();
            return Err(anyhow!("No repository could be scanned: {reason}"));
        }

        render(self.command, &report.stats, &config)
    }
}

fn emit<T: Serialize>(json: bool, view: &str, stats: &RepoStats, rows: &T, table: impl FnOnce() -> Result<()>) -> Result<()> {
    if json {
        output::output_json(view, stats, rows)
    } else {
        table()
    }
}

fn render(command: Commands, stats: &RepoStats, config: &Config) -> Result<()> {
    match command {
        Commands::Summary { json } => {
            let summary = stats.summary();
            emit(json, "summary", stats, &summary, || output::output_summary(&summary, stats))
        }
        Commands::Leaderboard { sort, asc, limit, json } => {
            let limit = limit.unwrap_or(config.max_authors);
            let rows = stats.leaderboard(LeaderboardSort::from_key(&sort), SortDirection::ascending(asc));
            let top: Vec<_> = rows.iter().take(limit).collect();
            emit(json, "leaderboard", stats, &top, || output::output_leaderboard(&rows, limit))
        }
        Commands::Files { sort, asc, limit, json } => {
            let rows = stats.top_files(
                FileSort::from_key(&sort),
                SortDirection::ascending(asc),
                Some(limit.unwrap_or(config.max_files)),
            );
            emit(json, "files", stats, &rows, || output::output_files(&rows))
        }
        Commands::Author { email, files, json } => {
            let detail = stats
                .author_detail(&email, files.unwrap_or(config.max_files))
                .ok_or_else(|| anyhow!("No commits recorded for author '{email}'"))?;
            emit(json, "author", stats, &detail, || output::output_author_detail(&detail))
        }
        Commands::Hotspots { limit, json } => {
            let rows = stats.hotspots(Some(limit.unwrap_or(config.max_files)));
            emit(json, "hotspots", stats, &rows, || output::output_hotspots(&rows))
        }
        Commands::Ownership { dir: Some(dir), json, .. } => {
            let detail = stats
                .ownership_detail(&dir)
                .ok_or_else(|| anyhow!("No changes recorded under directory '{dir}'"))?;
            emit(json, "ownership", stats, &detail, || output::output_ownership_detail(&detail))
        }
        Commands::Ownership { sort, asc, dir: None, json } => {
            let rows: Vec<OwnershipDetail> = stats
                .ownership(OwnershipSort::from_key(&sort), SortDirection::ascending(asc))
                .iter()
                .filter_map(|d| stats.ownership_detail(&d.path))
                .collect();
            emit(json, "ownership", stats, &rows, || output::output_ownership(&rows))
        }
        Commands::Timeline { window, merges, json } => {
            let window = window.unwrap_or(config.rolling_window);
            let (title, timeline) = if merges {
                ("Merges per Day", stats.merge_timeline(window))
            } else {
                ("Commits per Day", stats.timeline(window))
            };
            emit(json, "timeline", stats, &timeline, || output::output_timeline(title, &timeline))
        }
        Commands::Heatmap { json } => {
            let heatmap = stats.heatmap();
            emit(json, "heatmap", stats, &heatmap, || output::output_heatmap(&heatmap))
        }
        Commands::Prs { sort, merge_sort, asc, limit, json } => {
            let direction = SortDirection::ascending(asc);
            let authors = stats.pr_leaderboard(PrAuthorSort::from_key(&sort), direction);
            let merges = stats.merge_list(
                MergeSort::from_key(&merge_sort),
                direction,
                Some(limit.unwrap_or(config.max_files)),
            );
            let report = PrReport {
                summary: stats.pr_summary(),
                authors: &authors,
                merges: &merges,
            };
            emit(json, "prs", stats, &report, || output::output_prs(&report.summary, &authors, &merges))
        }
    }
}

#[derive(Serialize)]
struct PrReport<'a> {
    #[serde(flatten)]
    summary: PrSummary,
    authors: &'a [crate::model::PrAuthorStats],
    merges: &'a [crate::model::MergeRecord],
}
