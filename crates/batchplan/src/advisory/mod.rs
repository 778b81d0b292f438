//! Queue wait-time statistics for the on-premises back end.
//!
//! An external polling job periodically captures the scheduler's queue
//! status as text; this module turns such a capture into per-architecture
//! wait statistics that operators (or the allocation layer) can consult
//! before submitting. A snapshot is immutable once built; refreshing means
//! building a new snapshot and swapping it in, so concurrent readers never
//! observe a half-updated one.

use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDateTime;

use crate::Map;
use crate::common::ranking::TopNRanking;

/// One observation from the queue-status feed: a job of some priority class
/// waited this long on the given architecture.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueStatusRecord {
    pub timestamp: NaiveDateTime,
    pub architecture: String,
    pub priority_class: String,
    pub wait: Duration,
}

/// Parses one queue-status line:
/// `<timestamp> <architecture> <priority-class> <wait-seconds>`.
pub fn parse_queue_status_record(line: &str) -> anyhow::Result<QueueStatusRecord> {
    let mut fields = line.split_whitespace();
    let mut next_field = |name: &str| {
        fields
            .next()
            .ok_or_else(|| anyhow::anyhow!("Missing {name} field"))
    };

    let timestamp = NaiveDateTime::parse_from_str(next_field("timestamp")?, "%Y-%m-%dT%H:%M:%S")
        .context("Cannot parse timestamp")?;
    let architecture = next_field("architecture")?.to_string();
    let priority_class = next_field("priority class")?.to_string();
    let wait_seconds: u64 = next_field("wait seconds")?
        .parse()
        .context("Cannot parse wait seconds")?;

    Ok(QueueStatusRecord {
        timestamp,
        architecture,
        priority_class,
        wait: Duration::from_secs(wait_seconds),
    })
}

/// Parses a whole queue-status capture. Blank lines and `#` comments are
/// ignored; malformed lines are skipped with a warning, since the feed comes
/// from an intermittently unreliable external command.
pub fn parse_queue_status(input: &str) -> Vec<QueueStatusRecord> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match parse_queue_status_record(line) {
            Ok(record) => Some(record),
            Err(error) => {
                log::warn!("Skipping malformed queue-status line {line:?}: {error:#}");
                None
            }
        })
        .collect()
}

/// Wait statistics for one `(architecture, priority class)` pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueSnapshotStat {
    /// Observed waits, sorted ascending.
    waits: Vec<Duration>,
}

impl QueueSnapshotStat {
    pub fn count(&self) -> usize {
        self.waits.len()
    }

    pub fn total_wait(&self) -> Duration {
        self.waits.iter().sum()
    }

    pub fn mean_wait(&self) -> Duration {
        if self.waits.is_empty() {
            return Duration::ZERO;
        }
        self.total_wait() / self.waits.len() as u32
    }

    /// Nearest-rank percentile; `percentile` is in (0, 100].
    pub fn percentile_wait(&self, percentile: f64) -> Duration {
        if self.waits.is_empty() {
            return Duration::ZERO;
        }
        let rank = (percentile / 100.0 * self.waits.len() as f64).ceil() as usize;
        self.waits[rank.clamp(1, self.waits.len()) - 1]
    }

    /// Ratio of the mean observed wait to the given baseline.
    pub fn expansion_factor(&self, baseline: Duration) -> f64 {
        self.mean_wait().as_secs_f64() / baseline.as_secs_f64()
    }
}

/// Immutable snapshot of queue wait statistics, keyed by
/// `(architecture, priority class)`.
pub struct QueueTimeAdvisory {
    baseline_wait: Duration,
    stats: Map<(String, String), QueueSnapshotStat>,
}

impl QueueTimeAdvisory {
    pub fn from_records(
        records: impl IntoIterator<Item = QueueStatusRecord>,
        baseline_wait: Duration,
    ) -> Self {
        let mut stats: Map<(String, String), QueueSnapshotStat> = Map::new();
        for record in records {
            stats
                .entry((record.architecture, record.priority_class))
                .or_default()
                .waits
                .push(record.wait);
        }
        for stat in stats.values_mut() {
            stat.waits.sort_unstable();
        }
        Self {
            baseline_wait,
            stats,
        }
    }

    pub fn parse_report(input: &str, baseline_wait: Duration) -> Self {
        Self::from_records(parse_queue_status(input), baseline_wait)
    }

    pub fn baseline_wait(&self) -> Duration {
        self.baseline_wait
    }

    pub fn stat(&self, architecture: &str, priority_class: &str) -> Option<&QueueSnapshotStat> {
        self.stats
            .get(&(architecture.to_string(), priority_class.to_string()))
    }

    fn architecture_stats<'a>(
        &'a self,
        architecture: &'a str,
    ) -> impl Iterator<Item = &'a QueueSnapshotStat> {
        self.stats
            .iter()
            .filter(move |((arch, _), _)| arch.as_str() == architecture)
            .map(|(_, stat)| stat)
    }

    /// Total observed queued wait for the architecture, in hours, across all
    /// priority classes. `NaN` when the architecture was never observed.
    pub fn backlog(&self, architecture: &str) -> f64 {
        let mut seen = false;
        let mut total = Duration::ZERO;
        for stat in self.architecture_stats(architecture) {
            seen = true;
            total += stat.total_wait();
        }
        if seen {
            total.as_secs_f64() / 3600.0
        } else {
            f64::NAN
        }
    }

    /// Observation-weighted expansion factor for the architecture across all
    /// priority classes. `NaN` when the architecture was never observed.
    pub fn expansion_factor(&self, architecture: &str) -> f64 {
        let mut count = 0usize;
        let mut total = Duration::ZERO;
        for stat in self.architecture_stats(architecture) {
            count += stat.count();
            total += stat.total_wait();
        }
        if count == 0 {
            return f64::NAN;
        }
        total.as_secs_f64() / count as f64 / self.baseline_wait.as_secs_f64()
    }

    /// The `n` worst mean waits in hours, best (longest) first, labelled
    /// `architecture/priority-class`.
    pub fn worst_waits(&self, n: usize) -> Vec<(f64, String)> {
        let mut ranking = TopNRanking::new(n);
        for ((architecture, priority_class), stat) in &self.stats {
            ranking.add(
                stat.mean_wait().as_secs_f64() / 3600.0,
                format!("{architecture}/{priority_class}"),
            );
        }
        ranking.into_descending().collect()
    }
}
