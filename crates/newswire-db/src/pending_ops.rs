use newswire_core::{
    Article, ComposedPost, Importance, LedgerEntry, PendingEntry, PendingId, PendingStatus,
    PublishReceipt, Timestamp,
};
use redb_bincode::{ReadableTable as _, WriteTransaction};
use snafu::{OptionExt as _, ensure};
use tracing::{debug, info, warn};

use crate::ledger_ops::RecordOutcome;
use crate::{
    Database, DbResult, InvalidTransitionSnafu, LOG_TARGET, PendingNotFoundSnafu, pending,
    pending_hashes, pending_seq, rejected_hashes,
};

impl Database {
    /// Put a composed post in the pending queue.
    ///
    /// If an entry for the same article is already pending its id is
    /// returned instead of adding another one.
    pub async fn enqueue_pending(
        &self,
        article: Article,
        post: ComposedPost,
        score: Importance,
        now: Timestamp,
    ) -> DbResult<PendingId> {
        self.write_with(|tx| {
            let mut pending_table = tx.open_table(&pending::TABLE)?;
            let mut hashes_table = tx.open_table(&pending_hashes::TABLE)?;

            let content_hash = article.content_hash();
            if let Some(existing) = hashes_table.get(&content_hash)?.map(|g| g.value()) {
                debug!(
                    target: LOG_TARGET,
                    pending_id = %existing,
                    %content_hash,
                    "Article already pending"
                );
                return Ok(existing);
            }

            let mut seq_table = tx.open_table(&pending_seq::TABLE)?;
            let id = PendingId::from(seq_table.get(&())?.map(|g| g.value()).unwrap_or(1));
            seq_table.insert(&(), &(id.get() + 1))?;

            pending_table.insert(&id, &PendingEntry::new(article, post, score.get(), now))?;
            hashes_table.insert(&content_hash, &id)?;

            info!(
                target: LOG_TARGET,
                pending_id = %id,
                %content_hash,
                score = score.get(),
                "Queued post for approval"
            );
            Ok(id)
        })
        .await
    }

    /// Whether an entry for `article` is waiting for a decision.
    pub async fn is_queued(&self, article: &Article) -> DbResult<bool> {
        self.read_with(|tx| {
            let hashes_table = tx.open_table(&pending_hashes::TABLE)?;
            Ok(hashes_table.get(&article.content_hash())?.is_some())
        })
        .await
    }

    /// Whether an entry for `article` was rejected.
    pub async fn is_rejected(&self, article: &Article) -> DbResult<bool> {
        self.read_with(|tx| {
            let rejected_table = tx.open_table(&rejected_hashes::TABLE)?;
            Ok(rejected_table.get(&article.content_hash())?.is_some())
        })
        .await
    }

    pub async fn get_pending(&self, id: PendingId) -> DbResult<Option<PendingEntry>> {
        self.read_with(|tx| {
            let pending_table = tx.open_table(&pending::TABLE)?;
            Ok(pending_table.get(&id)?.map(|g| g.value()))
        })
        .await
    }

    /// The entry `id`, which must still be pending.
    pub async fn get_pending_for_decision(&self, id: PendingId) -> DbResult<PendingEntry> {
        let entry = self
            .get_pending(id)
            .await?
            .context(PendingNotFoundSnafu { id })?;
        ensure!(
            entry.is_pending(),
            InvalidTransitionSnafu {
                id,
                status: entry.status,
            }
        );
        Ok(entry)
    }

    /// Entries still waiting for a decision, oldest first.
    pub async fn list_pending(&self) -> DbResult<Vec<(PendingId, PendingEntry)>> {
        Ok(self
            .list_all_pending()
            .await?
            .into_iter()
            .filter(|(_, entry)| entry.is_pending())
            .collect())
    }

    /// Every entry in the queue, whatever its status, oldest first.
    pub async fn list_all_pending(&self) -> DbResult<Vec<(PendingId, PendingEntry)>> {
        self.read_with(|tx| {
            let pending_table = tx.open_table(&pending::TABLE)?;

            let mut entries = vec![];
            for record in pending_table.range(..)? {
                let (k, v) = record?;
                entries.push((k.value(), v.value()));
            }
            Ok(entries)
        })
        .await
    }

    /// Move a pending entry to `Rejected`. Terminal.
    pub async fn reject_pending(&self, id: PendingId, now: Timestamp) -> DbResult<PendingEntry> {
        let entry = self
            .write_with(|tx| {
                let mut pending_table = tx.open_table(&pending::TABLE)?;

                let mut entry = pending_table
                    .get(&id)?
                    .map(|g| g.value())
                    .context(PendingNotFoundSnafu { id })?;
                ensure!(
                    entry.is_pending(),
                    InvalidTransitionSnafu {
                        id,
                        status: entry.status,
                    }
                );

                entry.status = PendingStatus::Rejected;
                entry.decided_at = Some(now);
                pending_table.insert(&id, &entry)?;
                let content_hash = entry.article.content_hash();
                tx.open_table(&pending_hashes::TABLE)?.remove(&content_hash)?;
                tx.open_table(&rejected_hashes::TABLE)?
                    .insert(&content_hash, &id)?;

                Ok(entry)
            })
            .await?;

        info!(target: LOG_TARGET, pending_id = %id, "Rejected pending post");
        Ok(entry)
    }

    /// Remove every entry that was not posted. Returns how many were removed.
    ///
    /// Rejections are forgotten too, so those articles may be queued again.
    pub async fn clear_pending(&self) -> DbResult<usize> {
        let removed = self
            .write_with(|tx| {
                let mut pending_table = tx.open_table(&pending::TABLE)?;
                let mut hashes_table = tx.open_table(&pending_hashes::TABLE)?;

                let mut to_remove = vec![];
                for record in pending_table.range(..)? {
                    let (k, v) = record?;
                    let entry = v.value();
                    if entry.status != PendingStatus::Posted {
                        to_remove.push((k.value(), entry.article.content_hash()));
                    }
                }

                for (id, content_hash) in &to_remove {
                    pending_table.remove(id)?;
                    hashes_table.remove(content_hash)?;
                }
                Self::clear_table_tx(&mut tx.open_table(&rejected_hashes::TABLE)?)?;

                Ok(to_remove.len())
            })
            .await?;

        info!(target: LOG_TARGET, removed, "Cleared pending queue");
        Ok(removed)
    }

    /// Record a successful publication.
    ///
    /// Appends `article` to the ledger and, for an approved queue entry,
    /// marks it `Posted` with the receipt. Both happen in the same
    /// transaction, so either both are visible or neither is.
    pub async fn record_publication(
        &self,
        article: &Article,
        receipt: &PublishReceipt,
        pending_id: Option<PendingId>,
        posted_at: Timestamp,
    ) -> DbResult<RecordOutcome> {
        let ledger_entry = LedgerEntry::new(article, receipt, posted_at);
        self.write_with(|tx| {
            if let Some(id) = pending_id {
                Self::mark_posted_tx(id, receipt, posted_at, tx)?;
            }
            Self::record_published_tx(ledger_entry, tx)
        })
        .await
    }

    fn mark_posted_tx(
        id: PendingId,
        receipt: &PublishReceipt,
        posted_at: Timestamp,
        tx: &WriteTransaction,
    ) -> DbResult<()> {
        let mut pending_table = tx.open_table(&pending::TABLE)?;

        let mut entry = pending_table
            .get(&id)?
            .map(|g| g.value())
            .context(PendingNotFoundSnafu { id })?;

        if !entry.is_pending() {
            // The post is already out, so the record has to say so.
            warn!(
                target: LOG_TARGET,
                pending_id = %id,
                status = %entry.status,
                "Published entry was no longer pending"
            );
        }

        entry.status = PendingStatus::Posted;
        entry.receipt = Some(receipt.clone());
        entry.decided_at = Some(posted_at);
        pending_table.insert(&id, &entry)?;
        let content_hash = entry.article.content_hash();
        tx.open_table(&pending_hashes::TABLE)?.remove(&content_hash)?;
        tx.open_table(&rejected_hashes::TABLE)?.remove(&content_hash)?;

        Ok(())
    }
}
