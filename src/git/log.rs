use super::parser::{drive, CancelToken, CommitStream, ScanOutcome, LOG_FORMAT};
use crate::error::{PulseError, Result};
use crate::model::{Commit, DateRange, ScanProgress};
use chrono::SecondsFormat;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use tracing::{debug, info};

/// Runs `git log --numstat` for one repository and streams its records
/// through the commit parser.
#[derive(Debug, Clone)]
pub struct LogSource {
    repo_path: PathBuf,
    range: DateRange,
}

impl LogSource {
    pub fn new(repo_path: impl Into<PathBuf>, range: DateRange) -> Self {
        Self {
            repo_path: repo_path.into(),
            range,
        }
    }

    fn repo_label(&self) -> String {
        self.repo_path.display().to_string()
    }

    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "log".into(),
            format!("--format={LOG_FORMAT}"),
            "--numstat".into(),
        ];
        if let Some(since) = self.range.since {
            args.push(format!("--since={}", since.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        if let Some(until) = self.range.until {
            args.push(format!("--until={}", until.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        args
    }

    fn spawn(&self) -> Result<Child> {
        Command::new("git")
            .args(self.args())
            .current_dir(&self.repo_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PulseError::source_unavailable(self.repo_label(), format!("failed to run git: {e}")))
    }

    /// Streams every commit to `on_commit` in log order.
    ///
    /// Commits already handed out stay valid when the git process later
    /// fails; the failure is reported as [`PulseError::SourceUnavailable`].
    pub fn scan<P, C>(&self, cancel: &CancelToken, on_progress: P, on_commit: C) -> Result<ScanOutcome>
    where
        P: FnMut(ScanProgress),
        C: FnMut(Commit),
    {
        let mut child = self.spawn()?;
        let label = self.repo_label();

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PulseError::source_unavailable(&label, "failed to capture git stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| PulseError::source_unavailable(&label, "failed to capture git stderr"))?;

        let stderr_reader = thread::spawn(move || {
            let mut stderr_text = String::new();
            let mut reader = BufReader::new(stderr);
            let _ = reader.read_to_string(&mut stderr_text);
            stderr_text
        });

        let stream = CommitStream::new(BufReader::new(stdout)).with_cancel(cancel.clone());
        let outcome = drive(stream, on_progress, on_commit);

        if !matches!(outcome, Ok(ScanOutcome::Completed { .. })) {
            debug!(repo = %label, "stopping git before end of output");
            let _ = child.kill();
        }

        let status = child
            .wait()
            .map_err(|e| PulseError::source_unavailable(&label, format!("failed to wait for git: {e}")))?;
        let stderr_text = stderr_reader.join().unwrap_or_default();

        let outcome = outcome
            .map_err(|e| PulseError::source_unavailable(&label, format!("failed reading git output: {e}")))?;

        if outcome.is_cancelled() {
            return Ok(outcome);
        }
        if !status.success() {
            return Err(PulseError::source_unavailable(
                label,
                format!("git log failed ({status}): {}", stderr_text.trim()),
            ));
        }

        info!(repo = %label, commits = outcome.commits(), "log scan complete");
        Ok(outcome)
    }

    /// Total line count of tracked files, best effort.
    pub fn codebase_size(&self) -> Result<u64> {
        let output = Command::new("git")
            .args(["ls-files", "-z"])
            .current_dir(&self.repo_path)
            .output()
            .map_err(|e| PulseError::source_unavailable(self.repo_label(), format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PulseError::source_unavailable(
                self.repo_label(),
                format!("git ls-files failed: {}", stderr.trim()),
            ));
        }

        let mut total = 0u64;
        for name in output.stdout.split(|&b| b == 0).filter(|n| !n.is_empty()) {
            let rel = String::from_utf8_lossy(name);
            let Ok(file) = std::fs::File::open(self.repo_path.join(rel.as_ref())) else {
                continue;
            };
            total += count_lines(BufReader::new(file));
        }
        Ok(total)
    }
}

fn count_lines<R: BufRead>(mut reader: R) -> u64 {
    let mut lines = 0u64;
    let mut buf = Vec::new();
    while let Ok(n) = reader.read_until(b'\n', &mut buf) {
        if n == 0 {
            break;
        }
        lines += 1;
        buf.clear();
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::io::Cursor;

    #[test]
    fn args_carry_window() {
        let range = DateRange::new()
            .with_since(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .with_until(Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap());
        let args = LogSource::new(".", range).args();
        assert_eq!(args[0], "log");
        assert!(args.contains(&"--numstat".to_string()));
        assert!(args.contains(&"--since=2024-01-01T00:00:00Z".to_string()));
        assert!(args.contains(&"--until=2024-06-30T12:00:00Z".to_string()));
    }

    #[test]
    fn counts_lines_without_trailing_newline() {
        assert_eq!(count_lines(Cursor::new("a\nb\nc")), 3);
        assert_eq!(count_lines(Cursor::new("a\n")), 1);
        assert_eq!(count_lines(Cursor::new("")), 0);
    }
}
