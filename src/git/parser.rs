use crate::model::{Author, Commit, FileChange, ScanProgress};
use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

pub const COMMIT_START: &str = "COMMIT_START";
pub const COMMIT_END: &str = "COMMIT_END";

/// `git log --format` producing one sentinel-delimited record per commit:
/// full hash, short hash, author name, author email, ISO author date,
/// parent hashes, subject.
pub const LOG_FORMAT: &str = "COMMIT_START%n%H%n%h%n%an%n%ae%n%aI%n%P%n%s%nCOMMIT_END";

const HEADER_LINES: usize = 7;

static PR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bmerge pull request #(\d+)(?: from ([^\s'\x22]+))?").unwrap());
static BRANCH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bmerge (?:remote-tracking )?branch '?([^'\x22\s]+)").unwrap());
static RENAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^}]* => ([^}]*)\}").unwrap());

/// Cooperative stop flag shared between a scan and whoever wants to end it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a scan of one log stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed { commits: usize },
    Cancelled { commits: usize },
}

impl ScanOutcome {
    pub fn commits(&self) -> usize {
        match *self {
            ScanOutcome::Completed { commits } | ScanOutcome::Cancelled { commits } => commits,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScanOutcome::Cancelled { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Before the first start sentinel.
    Idle,
    Header,
    Numstat,
}

/// Line-fed state machine turning sentinel-delimited log output into commits.
///
/// A record is only turned into a [`Commit`] once its end sentinel has been
/// seen with a complete header; it is handed out when the next start
/// sentinel arrives or on [`CommitParser::finish`].
#[derive(Debug)]
pub struct CommitParser {
    state: State,
    header: Vec<String>,
    pending: Option<Commit>,
}

impl Default for CommitParser {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitParser {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            header: Vec::with_capacity(HEADER_LINES),
            pending: None,
        }
    }

    /// Feeds one line (without its terminator). Returns the previous commit
    /// when this line starts a new record.
    pub fn feed(&mut self, line: &str) -> Option<Commit> {
        if line == COMMIT_START {
            let done = self.pending.take();
            self.header.clear();
            self.state = State::Header;
            return done;
        }

        match self.state {
            State::Idle => {}
            State::Header if line == COMMIT_END => {
                self.pending = build_commit(&self.header);
                self.header.clear();
                self.state = State::Numstat;
            }
            State::Header => self.header.push(line.to_string()),
            State::Numstat => {
                if line.trim().is_empty() {
                    return None;
                }
                match (parse_numstat(line), self.pending.as_mut()) {
                    (Some(change), Some(commit)) => commit.file_changes.push(change),
                    (None, _) => debug!(line, "skipping malformed numstat line"),
                    _ => {}
                }
            }
        }
        None
    }

    /// End of input: emits the last complete record, if any. A record whose
    /// header never reached its end sentinel is discarded.
    pub fn finish(&mut self) -> Option<Commit> {
        self.header.clear();
        self.state = State::Idle;
        self.pending.take()
    }
}

fn build_commit(header: &[String]) -> Option<Commit> {
    if header.len() != HEADER_LINES {
        debug!(lines = header.len(), "dropping record with incomplete header");
        return None;
    }

    let author_date = match DateTime::parse_from_rfc3339(header[4].trim()) {
        Ok(dt) => dt,
        Err(e) => {
            debug!(hash = %header[0], date = %header[4], "dropping record with bad date: {e}");
            return None;
        }
    };

    let is_merge = header[5].split_whitespace().count() >= 2;
    let subject = header[6].clone();
    let (pr_number, merge_branch) = if is_merge {
        parse_merge_subject(&subject)
    } else {
        (None, None)
    };

    Some(Commit {
        hash: header[0].clone(),
        short_hash: header[1].clone(),
        author: Author {
            name: header[2].clone(),
            email: header[3].clone(),
        },
        author_date,
        subject,
        file_changes: Vec::new(),
        is_merge,
        pr_number,
        merge_branch,
    })
}

/// Extracts the PR number and merged branch from a merge subject such as
/// `Merge pull request #42 from team/feature-x` or `Merge branch 'dev'`.
pub fn parse_merge_subject(subject: &str) -> (Option<u32>, Option<String>) {
    if let Some(caps) = PR_RE.captures(subject) {
        let number = caps.get(1).and_then(|m| m.as_str().parse().ok());
        let branch = caps.get(2).map(|m| m.as_str().to_string());
        return (number, branch);
    }
    let branch = BRANCH_RE
        .captures(subject)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());
    (None, branch)
}

/// Parses `additions\tdeletions\tpath`, or `-\t-\tpath` for binary files.
/// Anything that is not exactly three tab-separated fields is rejected.
pub fn parse_numstat(line: &str) -> Option<FileChange> {
    let mut parts = line.split('\t');
    let (added, deleted, raw_path) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let path = normalize_path(raw_path)?;

    if added == "-" || deleted == "-" {
        return Some(FileChange {
            path,
            additions: 0,
            deletions: 0,
            is_binary: true,
        });
    }

    Some(FileChange {
        path,
        additions: added.trim().parse().ok()?,
        deletions: deleted.trim().parse().ok()?,
        is_binary: false,
    })
}

/// Normalizes git rename notations to the destination path:
///   "src/{old => new}/file.rs" → "src/new/file.rs"
///   "old-name => new-name"     → "new-name"
fn normalize_path(raw: &str) -> Option<String> {
    if raw.contains('{') && raw.contains("=>") {
        let result = RENAME_RE.replace(raw, "$1").replace("//", "/");
        let result = result.trim().trim_start_matches('/');
        return if result.contains('{') || result.is_empty() {
            None
        } else {
            Some(result.to_string())
        };
    }
    if raw.contains(" => ") {
        return raw.split(" => ").last().map(|s| s.trim().to_string());
    }
    let t = raw.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// Finite, non-restartable iterator of commits over a line-oriented reader.
///
/// Cancellation is checked before each line is read. Once cancelled the
/// record in progress is dropped and the iterator ends.
pub struct CommitStream<R> {
    reader: R,
    parser: CommitParser,
    cancel: Option<CancelToken>,
    buf: Vec<u8>,
    cancelled: bool,
    finished: bool,
}

impl<R: BufRead> CommitStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            parser: CommitParser::new(),
            cancel: None,
            buf: Vec::new(),
            cancelled: false,
            finished: false,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
            self.buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

impl<R: BufRead> Iterator for CommitStream<R> {
    type Item = io::Result<Commit>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                self.cancelled = true;
                self.finished = true;
                return None;
            }
            match self.read_line() {
                Ok(Some(line)) => {
                    if let Some(commit) = self.parser.feed(&line) {
                        return Some(Ok(commit));
                    }
                }
                Ok(None) => {
                    self.finished = true;
                    return self.parser.finish().map(Ok);
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Pumps a commit stream into the handlers, reporting progress after every
/// commit and exactly one terminal `done` event, whatever the ending.
pub fn drive<R, P, C>(
    mut stream: CommitStream<R>,
    mut on_progress: P,
    mut on_commit: C,
) -> io::Result<ScanOutcome>
where
    R: BufRead,
    P: FnMut(ScanProgress),
    C: FnMut(Commit),
{
    let mut count = 0usize;
    let mut last_hash = String::new();

    for next in stream.by_ref() {
        let commit = match next {
            Ok(commit) => commit,
            Err(e) => {
                on_progress(ScanProgress {
                    commits_parsed: count,
                    current_hash: last_hash,
                    done: true,
                });
                return Err(e);
            }
        };
        count += 1;
        last_hash.clone_from(&commit.short_hash);
        on_commit(commit);
        on_progress(ScanProgress {
            commits_parsed: count,
            current_hash: last_hash.clone(),
            done: false,
        });
    }

    on_progress(ScanProgress {
        commits_parsed: count,
        current_hash: last_hash,
        done: true,
    });

    if stream.was_cancelled() {
        Ok(ScanOutcome::Cancelled { commits: count })
    } else {
        Ok(ScanOutcome::Completed { commits: count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn record(hash: &str, email: &str, parents: &str, subject: &str, numstat: &[&str]) -> String {
        let mut out = format!(
            "{COMMIT_START}\n{hash}\n{}\nJo\n{email}\n2024-03-04T10:15:00+01:00\n{parents}\n{subject}\n{COMMIT_END}\n\n",
            &hash[..7]
        );
        for line in numstat {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    fn parse_all(input: &str) -> Vec<Commit> {
        CommitStream::new(Cursor::new(input.to_string()))
            .collect::<io::Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn parses_records_in_order_including_last() {
        let input = [
            record("aaaaaaaaaa", "a@x.com", "p1", "first", &["10\t0\tmain.go", "-\t-\tlogo.png"]),
            record("bbbbbbbbbb", "b@x.com", "p2", "second", &[]),
            record("cccccccccc", "c@x.com", "p3", "third", &["1\t1\tsrc/lib.rs"]),
        ]
        .concat();

        let commits = parse_all(&input);
        assert_eq!(commits.len(), 3);
        assert_eq!(commits[0].hash, "aaaaaaaaaa");
        assert_eq!(commits[0].short_hash, "aaaaaaa");
        assert_eq!(
            commits[0].file_changes,
            vec![
                FileChange { path: "main.go".into(), additions: 10, deletions: 0, is_binary: false },
                FileChange { path: "logo.png".into(), additions: 0, deletions: 0, is_binary: true },
            ]
        );
        assert!(commits[1].file_changes.is_empty());
        assert_eq!(commits[2].subject, "third");
        assert_eq!(commits[2].file_changes.len(), 1);
    }

    #[test]
    fn skips_malformed_numstat_lines() {
        let input = record(
            "aaaaaaaaaa",
            "a@x.com",
            "p1",
            "msg",
            &["3\t4", "1\t2\tok.rs", "x\ty\tz\tw", "nope"],
        );
        let commits = parse_all(&input);
        assert_eq!(commits[0].file_changes.len(), 1);
        assert_eq!(commits[0].file_changes[0].path, "ok.rs");
    }

    #[test]
    fn detects_pull_request_merges() {
        let input = record(
            "aaaaaaaaaa",
            "a@x.com",
            "p1 p2",
            "Merge pull request #42 from team/feature-x",
            &[],
        );
        let commit = &parse_all(&input)[0];
        assert!(commit.is_merge);
        assert_eq!(commit.pr_number, Some(42));
        assert_eq!(commit.merge_branch.as_deref(), Some("team/feature-x"));
    }

    #[test]
    fn merge_subject_patterns() {
        assert_eq!(
            parse_merge_subject("Merge branch 'release' into main"),
            (None, Some("release".to_string()))
        );
        assert_eq!(
            parse_merge_subject("merge pull request #7 from me/fix"),
            (Some(7), Some("me/fix".to_string()))
        );
        assert_eq!(parse_merge_subject("Update readme"), (None, None));
    }

    #[test]
    fn non_merge_subject_is_not_mined() {
        let input = record("aaaaaaaaaa", "a@x.com", "p1", "Merge branch 'x'", &[]);
        let commit = &parse_all(&input)[0];
        assert!(!commit.is_merge);
        assert_eq!(commit.merge_branch, None);
    }

    #[test]
    fn truncated_record_is_dropped() {
        let mut input = record("aaaaaaaaaa", "a@x.com", "p1", "one", &["1\t0\ta.rs"]);
        input.push_str("COMMIT_START\nbbbbbbbbbb\nbbbbbbb\nJo\n");
        let commits = parse_all(&input);
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].hash, "aaaaaaaaaa");
    }

    #[test]
    fn normalizes_renames() {
        let change = parse_numstat("2\t1\tsrc/{old => new}/file.rs").unwrap();
        assert_eq!(change.path, "src/new/file.rs");
        let change = parse_numstat("0\t0\told.rs => new.rs").unwrap();
        assert_eq!(change.path, "new.rs");
        let change = parse_numstat("1\t0\t{ => lib}/mod.rs").unwrap();
        assert_eq!(change.path, "lib/mod.rs");
    }

    #[test]
    fn drive_reports_progress_and_one_done() {
        let input = [
            record("aaaaaaaaaa", "a@x.com", "p", "a", &[]),
            record("bbbbbbbbbb", "b@x.com", "p", "b", &[]),
        ]
        .concat();
        let mut events = Vec::new();
        let mut seen = Vec::new();
        let outcome = drive(
            CommitStream::new(Cursor::new(input)),
            |p| events.push(p),
            |c| seen.push(c.short_hash),
        )
        .unwrap();

        assert_eq!(outcome, ScanOutcome::Completed { commits: 2 });
        assert_eq!(seen, vec!["aaaaaaa", "bbbbbbb"]);
        let counts: Vec<usize> = events.iter().map(|p| p.commits_parsed).collect();
        assert_eq!(counts, vec![1, 2, 2]);
        assert_eq!(events.iter().filter(|p| p.done).count(), 1);
        assert!(events.last().unwrap().done);
    }

    #[test]
    fn cancellation_is_a_distinct_outcome() {
        let input = [
            record("aaaaaaaaaa", "a@x.com", "p", "a", &[]),
            record("bbbbbbbbbb", "b@x.com", "p", "b", &[]),
        ]
        .concat();
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let mut seen = 0;
        let outcome = drive(
            CommitStream::new(Cursor::new(input)).with_cancel(cancel),
            |_| {},
            |_| {
                seen += 1;
                trigger.cancel();
            },
        )
        .unwrap();

        assert!(outcome.is_cancelled());
        assert_eq!(seen, 1);
        assert_eq!(outcome.commits(), 1);
    }
}
