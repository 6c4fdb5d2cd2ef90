use crate::error::{PulseError, Result};
use crate::model::DateRange;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use gix::{discover, ObjectId, Repository};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct GitRepo {
    repo: Repository,
    path: PathBuf,
}

impl GitRepo {
    /// Open a repository at `path`, or current dir if `None`
    pub fn open<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let repo_path = match path {
            Some(p) => p.as_ref().to_path_buf(),
            None => std::env::current_dir()?,
        };

        let repo = discover(&repo_path)
            .map_err(|e| PulseError::NotARepository(format!("{}: {e}", repo_path.display())))?;
        let path = repo.workdir().unwrap_or_else(|| repo.path()).to_path_buf();

        Ok(Self { repo, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn resolve_range(&self, since: Option<&str>, until: Option<&str>) -> Result<DateRange> {
        resolve_range_with(since, until, |input| self.parse_commit_or_date(input))
    }

    fn parse_commit_or_date(&self, input: &str) -> Result<DateTime<Utc>> {
        if let Some(dt) = parse_date(input) {
            return Ok(dt);
        }

        // Fallback to Git ref
        let id = self
            .repo
            .rev_parse_single(input)
            .map_err(|e| PulseError::Parse(format!("Invalid commit or date '{input}': {e}")))?;

        let commit = id
            .object()?
            .try_into_commit()
            .map_err(|_| PulseError::Parse(format!("Not a commit: {input}")))?;

        let secs = commit.time()?.seconds;
        DateTime::<Utc>::from_timestamp(secs, 0)
            .ok_or_else(|| PulseError::InvalidDate(format!("Invalid timestamp: {secs}")))
    }

    /// Number of commits reachable from HEAD inside `range`. Used to size
    /// progress bars only.
    pub fn estimate_commit_count(&self, range: &DateRange) -> Result<usize> {
        let mut head = self.repo.head()?;
        let head_commit = head.peel_to_commit_in_place()?;

        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut stack: Vec<ObjectId> = vec![head_commit.id];
        let mut count = 0usize;

        while let Some(commit_id) = stack.pop() {
            if !seen.insert(commit_id) {
                continue;
            }

            let commit = self.repo.find_commit(commit_id)?;
            let secs = commit.time()?.seconds;
            if DateTime::from_timestamp(secs, 0).is_some_and(|ts| range.contains(&ts)) {
                count += 1;
            }

            let parents: Vec<ObjectId> = commit.parent_ids().map(|id| id.into()).collect();
            stack.extend(parents);
        }

        Ok(count)
    }
}

/// Builds a range from optional bounds, rejecting `since` after `until`.
pub fn resolve_range_with<F>(since: Option<&str>, until: Option<&str>, mut parse: F) -> Result<DateRange>
where
    F: FnMut(&str) -> Result<DateTime<Utc>>,
{
    let since_dt = since.map(&mut parse).transpose()?;
    let until_dt = until.map(&mut parse).transpose()?;

    if let (Some(s), Some(u)) = (since_dt, until_dt) {
        if s > u {
            return Err(PulseError::InvalidDate(format!(
                "Invalid range: since ({s}) is after until ({u})"
            )));
        }
    }

    let mut range = DateRange::new();
    if let Some(s) = since_dt {
        range = range.with_since(s);
    }
    if let Some(u) = until_dt {
        range = range.with_until(u);
    }
    Ok(range)
}

/// RFC 3339, `YYYY-MM-DD`, `N days/weeks/months ago` or a humantime
/// duration such as `90d` meaning that long before now.
pub fn parse_date(input: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(datetime) = date.and_hms_opt(0, 0, 0) {
            return Some(Utc.from_utc_datetime(&datetime));
        }
    }

    let duration = parse_natural_duration(input)
        .or_else(|| humantime::parse_duration(input.trim().trim_start_matches('-')).ok())?;
    let span = chrono::Duration::from_std(duration).ok()?;
    Utc::now().checked_sub_signed(span)
}

fn parse_natural_duration(input: &str) -> Option<Duration> {
    let input = input.trim().to_lowercase();
    let rest = input.strip_suffix(" ago")?;
    let (count, unit) = rest.trim().split_once(' ')?;
    let n: u64 = count.trim().parse().ok()?;

    let unit_secs = match unit.trim().trim_end_matches('s') {
        "hour" => 3600,
        "day" => 86400,
        "week" => 7 * 86400,
        "month" => 30 * 86400,
        "year" => 365 * 86400,
        _ => return None,
    };
    n.checked_mul(unit_secs).map(Duration::from_secs)
}
