use std::fmt;
use std::time::Duration;

use newswire_core::{AutomationConfig, PendingId, PublishReceipt, ScheduleSkip, Timestamp};
use tokio::time::Instant;

/// Why an article was dropped before composing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Already in the ledger.
    Duplicate,
    /// Already waiting in the pending queue.
    AlreadyQueued,
    /// Turned down by a human earlier.
    Rejected,
    BelowThreshold { score: u8, min_score: u8 },
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscardReason::Duplicate => f.write_str("already published"),
            DiscardReason::AlreadyQueued => f.write_str("already queued"),
            DiscardReason::Rejected => f.write_str("previously rejected"),
            DiscardReason::BelowThreshold { score, min_score } => {
                write!(f, "score {score} below {min_score}")
            }
        }
    }
}

/// Where a single article ended up after a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArticleOutcome {
    Discarded(DiscardReason),
    Published(PublishReceipt),
    Queued(PendingId),
    Failed(String),
}

/// What happens to a composed post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Publish,
    Queue,
}

impl Route {
    pub fn for_config(config: &AutomationConfig) -> Self {
        if config.posts_automatically() {
            Route::Publish
        } else {
            Route::Queue
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub found: usize,
    pub published: usize,
    pub queued: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &ArticleOutcome) {
        match outcome {
            ArticleOutcome::Discarded(_) => self.skipped += 1,
            ArticleOutcome::Published(_) => self.published += 1,
            ArticleOutcome::Queued(_) => self.queued += 1,
            ArticleOutcome::Failed(_) => self.failed += 1,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} found, {} published, {} queued, {} skipped, {} failed",
            self.found, self.published, self.queued, self.skipped, self.failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another batch was still in progress.
    AlreadyRunning,
    Schedule(ScheduleSkip),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyRunning => f.write_str("a batch is already running"),
            SkipReason::Schedule(skip) => skip.fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Completed(RunSummary),
    Skipped(SkipReason),
}

/// Scheduler bookkeeping across batches. Not persisted.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    pub last_run: Option<Timestamp>,
    pub runs: u64,
    pub last_summary: Option<RunSummary>,
}

impl RunState {
    pub fn finish(&mut self, now: Timestamp, summary: RunSummary) {
        self.last_run = Some(now);
        self.runs += 1;
        self.last_summary = Some(summary);
    }
}

/// Forces the posting mode for one process, without touching stored
/// settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModeOverride {
    /// Publish directly.
    Auto,
    /// Queue everything for approval.
    Manual,
}

impl ModeOverride {
    pub fn apply(self, config: &mut AutomationConfig) {
        let auto = self == ModeOverride::Auto;
        config.auto_post_enabled = auto;
        config.require_manual_approval = !auto;
    }
}

/// Keeps consecutive external calls at least `min_gap` apart.
#[derive(Debug)]
pub struct RateLimiter {
    min_gap: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_gap: Duration) -> Self {
        Self {
            min_gap,
            last: None,
        }
    }

    /// Wait until the next call is allowed, then claim the slot.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last {
            tokio::time::sleep_until(last + self.min_gap).await;
        }
        self.last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_each_outcome() {
        let mut summary = RunSummary {
            found: 4,
            ..RunSummary::default()
        };
        for outcome in [
            ArticleOutcome::Discarded(DiscardReason::Duplicate),
            ArticleOutcome::Queued(PendingId::from(1)),
            ArticleOutcome::Failed("boom".into()),
            ArticleOutcome::Published(PublishReceipt {
                id: "1".into(),
                url: "https://x.com/i/web/status/1".into(),
            }),
        ] {
            summary.record(&outcome);
        }
        assert_eq!(
            summary.to_string(),
            "4 found, 1 published, 1 queued, 1 skipped, 1 failed"
        );
    }

    #[test]
    fn mode_override_picks_route() {
        let mut config = AutomationConfig::default();
        assert_eq!(Route::for_config(&config), Route::Queue);

        ModeOverride::Auto.apply(&mut config);
        assert_eq!(Route::for_config(&config), Route::Publish);

        ModeOverride::Manual.apply(&mut config);
        assert_eq!(Route::for_config(&config), Route::Queue);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn rate_limiter_spaces_calls() {
        let mut limiter = RateLimiter::new(Duration::from_secs(2));
        let start = Instant::now();

        limiter.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.wait().await;
        assert!(Duration::from_secs(2) <= start.elapsed());
    }
}
