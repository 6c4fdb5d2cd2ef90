use chrono::{DateTime, Duration};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gitpulse::git::CommitParser;
use gitpulse::model::{Author, Commit, DateRange, FileChange};
use gitpulse::stats::{Aggregator, LeaderboardSort, SortDirection};
use gitpulse::util::DisplayZone;

fn synthetic_commits(count: usize) -> Vec<Commit> {
    let start = DateTime::parse_from_rfc3339("2024-01-01T09:00:00+02:00").unwrap();
    (0..count)
        .map(|i| {
            let author = i % 17;
            Commit {
                hash: format!("{i:040x}"),
                short_hash: format!("{i:07x}"),
                author: Author {
                    name: format!("Author {author}"),
                    email: format!("author{author}@example.com"),
                },
                author_date: start + Duration::minutes(i as i64 * 37),
                subject: "change".to_string(),
                file_changes: (0..4)
                    .map(|f| FileChange {
                        path: format!("dir{}/file{}.rs", (i + f) % 9, (i * 7 + f) % 120),
                        additions: (i % 50) as u32,
                        deletions: (f * 3) as u32,
                        is_binary: false,
                    })
                    .collect(),
                is_merge: false,
                pr_number: None,
                merge_branch: None,
            }
        })
        .collect()
}

fn synthetic_log(count: usize) -> String {
    let mut log = String::new();
    for i in 0..count {
        log.push_str(&format!(
            "COMMIT_START\n{i:040x}\n{i:07x}\nAuthor {a}\nauthor{a}@example.com\n2024-01-01T09:00:00+02:00\n{i:040x}\nchange\nCOMMIT_END\n",
            a = i % 17
        ));
        for f in 0..4 {
            log.push_str(&format!("{}\t{}\tdir{}/file{}.rs\n", i % 50, f, f, i % 120));
        }
    }
    log
}

fn bench_aggregate(c: &mut Criterion) {
    let commits = synthetic_commits(10_000);
    c.bench_function("aggregate_10k_commits", |b| {
        b.iter(|| {
            let mut agg = Aggregator::new("bench", DateRange::new(), DisplayZone::Utc);
            for commit in &commits {
                agg.observe(commit);
            }
            black_box(agg.into_stats())
        })
    });

    let mut agg = Aggregator::new("bench", DateRange::new(), DisplayZone::Utc);
    for commit in &commits {
        agg.observe(commit);
    }
    let stats = agg.into_stats();
    c.bench_function("views_10k_commits", |b| {
        b.iter(|| {
            black_box(stats.leaderboard(LeaderboardSort::Commits, SortDirection::Descending));
            black_box(stats.hotspots(Some(30)));
            black_box(stats.timeline(7));
        })
    });
}

fn bench_parse(c: &mut Criterion) {
    let log = synthetic_log(10_000);
    c.bench_function("parse_10k_records", |b| {
        b.iter(|| {
            let mut parser = CommitParser::new();
            let mut n = 0usize;
            for line in log.lines() {
                if parser.feed(line).is_some() {
                    n += 1;
                }
            }
            if parser.finish().is_some() {
                n += 1;
            }
            black_box(n)
        })
    });
}

criterion_group!(benches, bench_aggregate, bench_parse);
criterion_main!(benches);
