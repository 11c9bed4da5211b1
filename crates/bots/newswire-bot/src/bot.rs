use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use backon::Retryable as _;
use newswire_core::{
    Article, AutomationConfig, ComposedPost, PendingEntry, PendingId, PublishReceipt, ScoreResult,
    Timestamp,
};
use newswire_db::{Database, DbError, LEDGER_RETENTION_DAYS, RecordOutcome};
use newswire_util_error::FmtCompact as _;
use rand::SeedableRng as _;
use rand::rngs::StdRng;
use snafu::{ResultExt as _, Snafu};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::composer::compose;
use crate::lifecycle::{
    ArticleOutcome, BatchOutcome, DiscardReason, ModeOverride, RateLimiter, Route, RunState,
    RunSummary, SkipReason,
};
use crate::notifier::{NoopNotifier, Notifier};
use crate::publisher::{PublishError, Publisher};
use crate::scorer::{Evaluator, Scorer};
use crate::source::ArticleSource;

const LOG_TARGET: &str = "newswire_bot::bot";

/// Attempts at recording a publication after the first one failed.
const LEDGER_WRITE_RETRIES: usize = 5;

#[derive(Debug, Snafu)]
pub enum BotError {
    #[snafu(display("Database error"))]
    Database { source: DbError },
    #[snafu(display("Publishing failed"))]
    Publish { source: PublishError },
    #[snafu(display(
        "Post {external_post_id} ({external_post_url}) is live but could not be recorded"
    ))]
    LedgerWrite {
        external_post_id: String,
        external_post_url: String,
        source: DbError,
    },
}

pub type BotResult<T> = std::result::Result<T, BotError>;

/// Cleared when dropped, so an aborted batch never blocks the next one.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs batches: fetch, filter, score, compose, then publish or queue.
pub struct Bot {
    db: Arc<Database>,
    source: Box<dyn ArticleSource>,
    evaluator: Evaluator,
    publisher: Arc<dyn Publisher>,
    notifier: Arc<dyn Notifier>,
    rng: Mutex<StdRng>,
    mode: Option<ModeOverride>,
    running: AtomicBool,
}

#[bon::bon]
impl Bot {
    #[builder(finish_fn(name = "build"))]
    pub fn new(
        db: Arc<Database>,
        source: Box<dyn ArticleSource>,
        scorer: Arc<dyn Scorer>,
        publisher: Arc<dyn Publisher>,
        #[builder(default = Arc::new(NoopNotifier) as Arc<dyn Notifier>)] notifier: Arc<dyn Notifier>,
        #[builder(default = StdRng::from_os_rng())] rng: StdRng,
        mode: Option<ModeOverride>,
    ) -> Self {
        Self {
            db,
            source,
            evaluator: Evaluator::new(scorer),
            publisher,
            notifier,
            rng: Mutex::new(rng),
            mode,
            running: AtomicBool::new(false),
        }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// Stored settings with the process-level mode override applied.
    pub async fn effective_config(&self) -> BotResult<AutomationConfig> {
        let mut config = self.db.load_config().await.context(DatabaseSnafu)?;
        if let Some(mode) = self.mode {
            mode.apply(&mut config);
        }
        Ok(config)
    }

    /// Process one batch of articles.
    ///
    /// Returns [`BatchOutcome::Skipped`] if another batch is in progress or
    /// the schedule does not allow a run at `now`. Per-article failures are
    /// counted in the summary; only store failures abort the batch.
    pub async fn run_batch(&self, state: &mut RunState, now: Timestamp) -> BotResult<BatchOutcome> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            warn!(target: LOG_TARGET, "Previous batch still running, skipping");
            return Ok(BatchOutcome::Skipped(SkipReason::AlreadyRunning));
        };

        let config = self.effective_config().await?;
        if let Some(skip) = config.schedule_gate(now) {
            info!(target: LOG_TARGET, reason = %skip, "Not running batch");
            return Ok(BatchOutcome::Skipped(SkipReason::Schedule(skip)));
        }

        self.db
            .compact_ledger(LEDGER_RETENTION_DAYS, now)
            .await
            .context(DatabaseSnafu)?;

        let candidates = match self.source.fetch_candidates().await {
            Ok(candidates) => candidates,
            Err(err) => {
                error!(
                    target: LOG_TARGET,
                    source = %self.source.name(),
                    err = %err.fmt_compact(),
                    "Failed to fetch articles"
                );
                vec![]
            }
        };

        let mut summary = RunSummary {
            found: candidates.len(),
            ..RunSummary::default()
        };

        let mut fresh = vec![];
        let mut seen = HashSet::new();
        for article in candidates {
            let discard = if self.db.is_duplicate(&article).await.context(DatabaseSnafu)? {
                Some(DiscardReason::Duplicate)
            } else if self.db.is_queued(&article).await.context(DatabaseSnafu)? {
                Some(DiscardReason::AlreadyQueued)
            } else if self.db.is_rejected(&article).await.context(DatabaseSnafu)? {
                Some(DiscardReason::Rejected)
            } else if !seen.insert(article.content_hash()) {
                Some(DiscardReason::Duplicate)
            } else {
                None
            };

            match discard {
                Some(reason) => {
                    debug!(target: LOG_TARGET, title = %article.title(), %reason, "Discarding article");
                    summary.record(&ArticleOutcome::Discarded(reason));
                }
                None => fresh.push(article),
            }
        }

        let max = usize::try_from(config.max_articles_per_run).unwrap_or(usize::MAX);
        if max < fresh.len() {
            info!(
                target: LOG_TARGET,
                fresh = fresh.len(),
                max,
                "Limiting batch to the newest articles"
            );
            fresh.truncate(max);
        }

        let mut limiter = RateLimiter::new(config.rate_limit());
        let mut notifications = vec![];
        for article in fresh {
            let outcome = self
                .process_article(article, &config, &mut limiter, &mut notifications, now)
                .await?;
            summary.record(&outcome);
        }

        for res in futures::future::join_all(notifications).await {
            if let Err(err) = res {
                warn!(target: LOG_TARGET, err = %err.fmt_compact(), "Notification task failed");
            }
        }

        state.finish(now, summary);
        info!(target: LOG_TARGET, %summary, "Batch complete");
        Ok(BatchOutcome::Completed(summary))
    }

    async fn process_article(
        &self,
        article: Article,
        config: &AutomationConfig,
        limiter: &mut RateLimiter,
        notifications: &mut Vec<JoinHandle<()>>,
        now: Timestamp,
    ) -> BotResult<ArticleOutcome> {
        limiter.wait().await;
        let (importance, source) = self.evaluator.importance(&article).await;
        if importance.get() < config.min_score {
            let reason = DiscardReason::BelowThreshold {
                score: importance.get(),
                min_score: config.min_score,
            };
            info!(target: LOG_TARGET, title = %article.title(), %reason, "Discarding article");
            return Ok(ArticleOutcome::Discarded(reason));
        }

        limiter.wait().await;
        let audience = self.evaluator.audience(&article).await;
        limiter.wait().await;
        let summary = self.evaluator.summary(&article).await;
        let score = ScoreResult {
            importance,
            audience,
            summary,
            source,
        };

        let post = {
            let mut rng = self.rng.lock().await;
            compose(&article, &score, &mut *rng)
        };
        debug!(
            target: LOG_TARGET,
            title = %article.title(),
            tier = %post.tier,
            text = %post.final_text,
            "Composed post"
        );

        match Route::for_config(config) {
            Route::Queue => {
                let id = self
                    .db
                    .enqueue_pending(article, post, score.importance, now)
                    .await
                    .context(DatabaseSnafu)?;
                Ok(ArticleOutcome::Queued(id))
            }
            Route::Publish => {
                limiter.wait().await;
                let receipt = match self.publisher.publish(&post.final_text).await {
                    Ok(receipt) => receipt,
                    Err(err) => {
                        warn!(
                            target: LOG_TARGET,
                            title = %article.title(),
                            err = %err.fmt_compact(),
                            "Failed to publish"
                        );
                        return Ok(ArticleOutcome::Failed(err.to_string()));
                    }
                };

                self.record_publication(&article, &receipt, None, now)
                    .await?;
                if config.telegram_notifications {
                    notifications.push(self.spawn_notification(&article, &post, &receipt));
                }
                Ok(ArticleOutcome::Published(receipt))
            }
        }
    }

    /// Record a publication, retrying store failures.
    ///
    /// The post is already live at this point, so giving up is reported
    /// with its external id for manual reconciliation.
    async fn record_publication(
        &self,
        article: &Article,
        receipt: &PublishReceipt,
        pending_id: Option<PendingId>,
        posted_at: Timestamp,
    ) -> BotResult<RecordOutcome> {
        let outcome = (|| async {
            self.db
                .record_publication(article, receipt, pending_id, posted_at)
                .await
        })
        .retry(
            backon::ExponentialBuilder::default()
                .with_min_delay(Duration::from_millis(100))
                .with_max_times(LEDGER_WRITE_RETRIES)
                .with_jitter(),
        )
        .when(|err| !matches!(err, DbError::PendingNotFound { .. }))
        .notify(|err, _| {
            warn!(
                target: LOG_TARGET,
                id = %receipt.id,
                err = %err.fmt_compact(),
                "Failed to record publication, retrying"
            );
        })
        .await
        .context(LedgerWriteSnafu {
            external_post_id: receipt.id.clone(),
            external_post_url: receipt.url.clone(),
        })?;

        if let RecordOutcome::AlreadyRecorded(existing) = &outcome {
            warn!(
                target: LOG_TARGET,
                id = %receipt.id,
                existing_id = %existing.external_post_id,
                "Article was already in the ledger"
            );
        }
        Ok(outcome)
    }

    fn spawn_notification(
        &self,
        article: &Article,
        post: &ComposedPost,
        receipt: &PublishReceipt,
    ) -> JoinHandle<()> {
        let notifier = self.notifier.clone();
        let text = post.final_text.clone();
        let link = receipt.url.clone();
        let title = article.title().to_owned();
        tokio::spawn(async move {
            if let Err(err) = notifier.notify(&text, &link, &title).await {
                warn!(target: LOG_TARGET, err = %err.fmt_compact(), "Failed to send notification");
            }
        })
    }

    /// Publish a pending entry and mark it `Posted`.
    ///
    /// If publishing fails the entry stays pending.
    pub async fn approve(&self, id: PendingId, now: Timestamp) -> BotResult<PublishReceipt> {
        let config = self.effective_config().await?;
        let entry: PendingEntry = self
            .db
            .get_pending_for_decision(id)
            .await
            .context(DatabaseSnafu)?;

        let receipt = self
            .publisher
            .publish(&entry.post.final_text)
            .await
            .context(PublishSnafu)?;

        self.record_publication(&entry.article, &receipt, Some(id), now)
            .await?;
        info!(target: LOG_TARGET, pending_id = %id, url = %receipt.url, "Approved and published");

        if config.telegram_notifications {
            if let Err(err) = self
                .spawn_notification(&entry.article, &entry.post, &receipt)
                .await
            {
                warn!(target: LOG_TARGET, err = %err.fmt_compact(), "Notification task failed");
            }
        }
        Ok(receipt)
    }

    pub async fn reject(&self, id: PendingId, now: Timestamp) -> BotResult<PendingEntry> {
        self.db.reject_pending(id, now).await.context(DatabaseSnafu)
    }

    /// Run batches every `check_interval_hours` while `auto_mode` is on.
    ///
    /// Settings are re-read each cycle. Returns only on a failure that
    /// leaves the ledger behind the network.
    pub async fn run_scheduler(&self, state: &mut RunState) -> BotResult<()> {
        loop {
            let config = self.effective_config().await?;

            if config.auto_mode {
                match self.run_batch(state, Timestamp::now()).await {
                    Ok(_) => {}
                    Err(err @ BotError::LedgerWrite { .. }) => return Err(err),
                    Err(err) => {
                        error!(target: LOG_TARGET, err = %err.fmt_compact(), "Batch failed");
                    }
                }
            } else {
                debug!(target: LOG_TARGET, "Auto mode is off, idling");
            }

            let interval = config.check_interval();
            info!(
                target: LOG_TARGET,
                next_run_in_mins = interval.as_secs() / 60,
                "Waiting for next cycle"
            );
            tokio::time::sleep(interval).await;
        }
    }
}
