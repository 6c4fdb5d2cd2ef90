use crate::model::{AuthorStats, FileStats, MergeRecord, PrAuthorStats, RepoStats, SCHEMA_VERSION};
use crate::scan::{RepoOutcome, ScanReport};
use crate::stats::{AuthorDetail, HeatmapData, HotspotFile, OwnershipDetail, PrSummary, SummaryStats, TimelineData};
use anyhow::Result;
use chrono::{DateTime, Utc};
use console::style;
use serde::Serialize;

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    version: u32,
    generated_at: DateTime<Utc>,
    repository_path: &'a str,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    view: &'a str,
    data: &'a T,
}

pub fn output_json<T: Serialize>(view: &str, stats: &RepoStats, data: &T) -> Result<()> {
    let output = Envelope {
        version: SCHEMA_VERSION,
        generated_at: Utc::now(),
        repository_path: &stats.path,
        since: stats.range.since,
        until: stats.range.until,
        view,
        data,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Reports failed or cancelled repositories on stderr.
pub fn report_scan_problems(report: &ScanReport) {
    for (path, err) in report.failures() {
        eprintln!("{} {}: {}", style("warning:").yellow().bold(), path.display(), err);
    }
    let skipped = report
        .repos
        .iter()
        .filter(|r| matches!(r.outcome, RepoOutcome::Skipped))
        .count();
    if report.cancelled {
        eprintln!(
            "{} scan cancelled, results are partial ({} repositories skipped)",
            style("warning:").yellow().bold(),
            skipped
        );
    }
}

pub fn output_summary(summary: &SummaryStats, stats: &RepoStats) -> Result<()> {
    println!("{}", style(format!("Repository: {}", stats.path)).bold());
    if let Some(since) = stats.range.since {
        println!("Since: {}", since.format("%Y-%m-%d"));
    }
    if let Some(until) = stats.range.until {
        println!("Until: {}", until.format("%Y-%m-%d"));
    }
    println!("{}", "─".repeat(40));
    println!("{:<22} {:>12}", "Commits", summary.total_commits);
    println!("{:<22} {:>12}", "Authors", summary.total_authors);
    println!("{:<22} {:>12}", "Files modified", summary.files_modified);
    println!("{:<22} {:>12}", "Lines added", style(summary.total_additions).green());
    println!("{:<22} {:>12}", "Lines deleted", style(summary.total_deletions).red());
    println!("{:<22} {:>12}", "Lines changed", summary.total_changes);
    println!("{:<22} {:>12}", "Merges", summary.total_merges);
    println!("{:<22} {:>12}", "Pull requests", summary.total_prs);
    if let Some(size) = summary.codebase_size {
        println!("{:<22} {:>12}", "Codebase lines", size);
    }
    if let Some(pct) = summary.refactored_percent {
        println!("{:<22} {:>11.1}%", "Refactored", pct);
    }
    Ok(())
}

pub fn output_leaderboard(authors: &[AuthorStats], limit: usize) -> Result<()> {
    if authors.is_empty() {
        println!("No data to display");
        return Ok(());
    }
    println!(
        "{:<4} {:<28} {:<32} {:>8} {:>9} {:>9} {:>9}",
        style("#").bold(),
        style("Author").bold(),
        style("Email").bold(),
        style("Commits").bold(),
        style("Added").bold(),
        style("Deleted").bold(),
        style("Net").bold()
    );
    println!("{}", "─".repeat(105));
    for (i, a) in authors.iter().take(limit).enumerate() {
        println!(
            "{:<4} {:<28} {:<32} {:>8} {:>9} {:>9} {:>9}",
            i + 1,
            clip(&a.name, 28),
            clip(&a.email, 32),
            a.commits,
            style(a.additions).green(),
            style(a.deletions).red(),
            a.net()
        );
    }
    if authors.len() > limit {
        println!("\n... and {} more authors", authors.len() - limit);
    }
    Ok(())
}

pub fn output_files(files: &[FileStats]) -> Result<()> {
    if files.is_empty() {
        println!("No data to display");
        return Ok(());
    }
    println!(
        "{:<50} {:>8} {:>8} {:>8} {:>8} {:>8}",
        style("Path").bold(),
        style("Added").bold(),
        style("Deleted").bold(),
        style("Total").bold(),
        style("Commits").bold(),
        style("Authors").bold()
    );
    println!("{}", "─".repeat(95));
    for f in files {
        println!(
            "{:<50} {:>8} {:>8} {:>8} {:>8} {:>8}",
            clip(&f.path, 50),
            f.additions,
            f.deletions,
            f.total_changes,
            f.touch_count,
            f.author_count()
        );
    }
    Ok(())
}

pub fn output_hotspots(hotspots: &[HotspotFile]) -> Result<()> {
    if hotspots.is_empty() {
        println!("No files with more than one author");
        return Ok(());
    }
    println!(
        "{:<50} {:>7} {:>8} {:>8} {:>8}",
        style("Path").bold(),
        style("Risk").bold(),
        style("Changes").bold(),
        style("Commits").bold(),
        style("Authors").bold()
    );
    println!("{}", "─".repeat(85));
    for h in hotspots {
        let risk = format!("{:.1}", h.risk_score);
        let risk = if h.risk_score >= 70.0 {
            style(risk).red().bold()
        } else if h.risk_score >= 40.0 {
            style(risk).yellow()
        } else {
            style(risk).green()
        };
        println!(
            "{:<50} {:>7} {:>8} {:>8} {:>8}",
            clip(&h.path, 50),
            risk,
            h.changes,
            h.touch_count,
            h.author_count
        );
    }
    Ok(())
}

pub fn output_ownership(dirs: &[OwnershipDetail]) -> Result<()> {
    if dirs.is_empty() {
        println!("No data to display");
        return Ok(());
    }
    println!(
        "{:<30} {:>9} {:>8} {:>8} {:<28} {:>7} {:<14}",
        style("Directory").bold(),
        style("Changes").bold(),
        style("Touches").bold(),
        style("Authors").bold(),
        style("Top owner").bold(),
        style("Share").bold(),
        style("Ownership").bold()
    );
    println!("{}", "─".repeat(112));
    for d in dirs {
        let (owner, share) = d
            .authors
            .first()
            .map(|a| (a.name.as_str(), a.share))
            .unwrap_or(("-", 0.0));
        println!(
            "{:<30} {:>9} {:>8} {:>8} {:<28} {:>6.1}% {:<14}",
            clip(&d.path, 30),
            d.total_changes,
            d.touch_count,
            d.authors.len(),
            clip(owner, 28),
            share,
            d.concentration
        );
    }
    Ok(())
}

pub fn output_ownership_detail(detail: &OwnershipDetail) -> Result<()> {
    println!("{}", style(format!("Directory: {}", detail.path)).bold());
    println!(
        "Changes: {}  Touches: {}  Ownership: {}  Bus factor: {}",
        detail.total_changes, detail.touch_count, detail.concentration, detail.bus_factor
    );
    println!("{}", "─".repeat(80));
    for a in &detail.authors {
        let filled = (a.share / 100.0 * 30.0).round() as usize;
        println!(
            "{:<28} {:>6.1}% {:<30} {:>6} commits",
            clip(&a.name, 28),
            a.share,
            style("█".repeat(filled)).cyan(),
            a.commits
        );
    }
    Ok(())
}

pub fn output_author_detail(detail: &AuthorDetail) -> Result<()> {
    println!("{}", style(format!("{} <{}>", detail.name, detail.email)).bold());
    println!("{}", "─".repeat(80));
    println!("Commits:       {}", style(detail.commits).cyan());
    println!(
        "Lines:         {} / {} (net {:+})",
        style(format!("+{}", detail.additions)).green(),
        style(format!("-{}", detail.deletions)).red(),
        detail.net
    );
    println!("Files touched: {}", detail.files_count);
    println!("First commit:  {}", detail.first_commit.format("%Y-%m-%d %H:%M"));
    println!("Last commit:   {}", detail.last_commit.format("%Y-%m-%d %H:%M"));

    if !detail.top_files.is_empty() {
        println!("\n{}", style("Most touched files").bold());
        for f in &detail.top_files {
            println!("  {:<60} {:>5} commits", clip(&f.path, 60), f.commits);
        }
    }

    if !detail.similar.is_empty() {
        println!("\n{}", style("Possible aliases").bold());
        for a in &detail.similar {
            println!("  {:<28} {:<32} {:>5} commits", clip(&a.name, 28), clip(&a.email, 32), a.commits);
        }
    }
    Ok(())
}

pub fn output_timeline(title: &str, timeline: &TimelineData) -> Result<()> {
    if timeline.labels.is_empty() {
        println!("No data to display");
        return Ok(());
    }
    let max = timeline.values.iter().copied().max().unwrap_or(0).max(1);

    println!("{}", style(title).bold());
    println!("{}", "─".repeat(70));
    for ((day, value), avg) in timeline.labels.iter().zip(&timeline.values).zip(&timeline.rolling_avg) {
        let filled = (*value as f64 / max as f64 * 40.0).round() as usize;
        println!(
            "{} {:>4} {:<40} avg {:>6.2}",
            day,
            value,
            style("▇".repeat(filled)).green(),
            avg
        );
    }
    Ok(())
}

pub fn output_heatmap(heatmap: &HeatmapData) -> Result<()> {
    if heatmap.max_value == 0 {
        println!("No data to display");
        return Ok(());
    }

    println!("{}", style("Commit Activity by Weekday and Hour").bold());
    print!("    ");
    for hour in 0..24 {
        print!("{hour:>3}");
    }
    println!();

    for (day, row) in heatmap.matrix.iter().enumerate() {
        print!("{} ", WEEKDAYS[day]);
        for &count in row {
            let intensity = ((count as f64 / heatmap.max_value as f64) * 4.0).ceil() as u32;
            let cell = match intensity {
                0 => "  ·",
                1 => "  ░",
                2 => "  ▒",
                3 => "  ▓",
                _ => "  █",
            };
            print!("{}", style(cell).green());
        }
        println!();
    }

    println!("\n{}", style("Legend").bold());
    println!("  {} commits intensity (max {})", style("·░▒▓█").green(), heatmap.max_value);
    Ok(())
}

pub fn output_prs(summary: &PrSummary, authors: &[PrAuthorStats], merges: &[MergeRecord]) -> Result<()> {
    if authors.is_empty() {
        println!("No merge commits found");
        return Ok(());
    }

    println!(
        "Merges: {}  PRs: {}  Contributors: {}  Avg size: {} lines",
        style(summary.total_merges).cyan(),
        style(summary.total_prs).cyan(),
        summary.contributors,
        summary.avg_size
    );
    if let Some(day) = summary.busiest_day {
        println!("Busiest day: {day} ({} merges)", summary.busiest_day_merges);
    }
    println!();

    println!(
        "{:<28} {:<32} {:>7} {:>9} {:>5}",
        style("Merged by").bold(),
        style("Email").bold(),
        style("Merges").bold(),
        style("Changes").bold(),
        style("PRs").bold()
    );
    println!("{}", "─".repeat(85));
    for a in authors {
        println!(
            "{:<28} {:<32} {:>7} {:>9} {:>5}",
            clip(&a.name, 28),
            clip(&a.email, 32),
            a.merge_count,
            a.total_changes,
            a.pr_numbers.len()
        );
    }

    if merges.is_empty() {
        return Ok(());
    }
    println!("\n{}", style("Merges").bold());
    println!("{}", "─".repeat(85));
    for m in merges {
        let pr = m.pr_number.map(|n| format!("#{n}")).unwrap_or_else(|| "-".to_string());
        println!(
            "{} {:>6} {:<30} {:<20} {:>7} lines {:>4} files",
            m.merged_at.format("%Y-%m-%d"),
            style(pr).cyan(),
            clip(m.branch.as_deref().unwrap_or("-"), 30),
            clip(&m.merged_by, 20),
            m.size(),
            m.files_count
        );
    }
    Ok(())
}

fn clip(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let kept: String = s.chars().take(width.saturating_sub(1)).collect();
    format!("{kept}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_keeps_short_text() {
        assert_eq!(clip("src/main.rs", 20), "src/main.rs");
        assert_eq!(clip("abcdef", 4), "abc…");
        assert_eq!(clip("ééééé", 3), "éé…");
    }
}
