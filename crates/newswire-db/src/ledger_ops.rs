use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use newswire_core::{Article, ContentHash, LedgerEntry, PublishReceipt, SECS_PER_DAY, Timestamp};
use redb_bincode::{ReadableTable as _, WriteTransaction};
use tracing::{debug, info};

use crate::dedup::url_key;
use crate::{Database, DbResult, LOG_TARGET, ledger, ledger_hashes, ledger_seq, ledger_urls};

/// How long published articles are remembered for duplicate detection.
pub const LEDGER_RETENTION_DAYS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Appended(LedgerEntry),
    /// The content hash was already in the ledger; nothing was written.
    AlreadyRecorded(LedgerEntry),
}

impl RecordOutcome {
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            RecordOutcome::Appended(entry) | RecordOutcome::AlreadyRecorded(entry) => entry,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompactionReport {
    pub kept: usize,
    pub removed: usize,
}

impl Database {
    /// Whether `article` was already published, by normalized URL or by
    /// content hash.
    pub async fn is_duplicate(&self, article: &Article) -> DbResult<bool> {
        self.read_with(|tx| {
            let urls_table = tx.open_table(&ledger_urls::TABLE)?;
            let hashes_table = tx.open_table(&ledger_hashes::TABLE)?;

            Self::is_duplicate_tx(
                article.url(),
                article.content_hash(),
                &urls_table,
                &hashes_table,
            )
        })
        .await
    }

    pub(crate) fn is_duplicate_tx(
        url: &str,
        content_hash: ContentHash,
        urls_table: &impl ledger_urls::ReadableTable,
        hashes_table: &impl ledger_hashes::ReadableTable,
    ) -> DbResult<bool> {
        Ok(hashes_table.get(&content_hash)?.is_some() || urls_table.get(&url_key(url))?.is_some())
    }

    /// Append a ledger entry for a published article.
    ///
    /// At most one entry is kept per content hash: recording a hash that is
    /// already present returns the existing entry and writes nothing.
    pub async fn record_published(
        &self,
        article: &Article,
        receipt: &PublishReceipt,
        posted_at: Timestamp,
    ) -> DbResult<RecordOutcome> {
        let entry = LedgerEntry::new(article, receipt, posted_at);
        self.write_with(|tx| Self::record_published_tx(entry, tx))
            .await
    }

    pub(crate) fn record_published_tx(
        entry: LedgerEntry,
        tx: &WriteTransaction,
    ) -> DbResult<RecordOutcome> {
        let mut ledger_table = tx.open_table(&ledger::TABLE)?;
        let mut hashes_table = tx.open_table(&ledger_hashes::TABLE)?;

        if let Some(seq) = hashes_table.get(&entry.content_hash)?.map(|g| g.value()) {
            if let Some(existing) = ledger_table.get(&seq)?.map(|g| g.value()) {
                debug!(
                    target: LOG_TARGET,
                    content_hash = %entry.content_hash,
                    seq,
                    "Article already in ledger"
                );
                return Ok(RecordOutcome::AlreadyRecorded(existing));
            }
        }

        let mut seq_table = tx.open_table(&ledger_seq::TABLE)?;
        let seq = seq_table.get(&())?.map(|g| g.value()).unwrap_or_default();
        seq_table.insert(&(), &(seq + 1))?;

        ledger_table.insert(&seq, &entry)?;
        hashes_table.insert(&entry.content_hash, &seq)?;
        tx.open_table(&ledger_urls::TABLE)?
            .insert(&url_key(&entry.url), &seq)?;

        debug!(
            target: LOG_TARGET,
            content_hash = %entry.content_hash,
            seq,
            external_post_id = %entry.external_post_id,
            "Appended ledger entry"
        );
        Ok(RecordOutcome::Appended(entry))
    }

    /// Drop entries older than `retention_days` and collapse repeated hashes.
    ///
    /// Of several in-window entries with the same hash the earliest
    /// `posted_at` (then the earliest appended) survives. The URL and hash
    /// indexes are rebuilt from the surviving entries.
    pub async fn compact_ledger(
        &self,
        retention_days: u64,
        now: Timestamp,
    ) -> DbResult<CompactionReport> {
        let cutoff = now - retention_days.saturating_mul(SECS_PER_DAY);

        let report = self
            .write_with(|tx| {
                let mut ledger_table = tx.open_table(&ledger::TABLE)?;

                let mut total = 0;
                let mut kept: BTreeMap<ContentHash, (u64, LedgerEntry)> = BTreeMap::new();
                for record in ledger_table.range(..)? {
                    let (k, v) = record?;
                    total += 1;
                    let (seq, entry) = (k.value(), v.value());
                    if entry.posted_at < cutoff {
                        continue;
                    }
                    match kept.entry(entry.content_hash) {
                        Entry::Vacant(e) => {
                            e.insert((seq, entry));
                        }
                        Entry::Occupied(mut e) => {
                            let (cur_seq, cur) = e.get();
                            if (entry.posted_at, seq) < (cur.posted_at, *cur_seq) {
                                e.insert((seq, entry));
                            }
                        }
                    }
                }

                let report = CompactionReport {
                    kept: kept.len(),
                    removed: total - kept.len(),
                };
                if report.removed == 0 {
                    return Ok(report);
                }

                let mut urls_table = tx.open_table(&ledger_urls::TABLE)?;
                let mut hashes_table = tx.open_table(&ledger_hashes::TABLE)?;
                Self::clear_table_tx(&mut ledger_table)?;
                Self::clear_table_tx(&mut urls_table)?;
                Self::clear_table_tx(&mut hashes_table)?;

                for (hash, (seq, entry)) in kept {
                    urls_table.insert(&url_key(&entry.url), &seq)?;
                    hashes_table.insert(&hash, &seq)?;
                    ledger_table.insert(&seq, &entry)?;
                }

                Ok(report)
            })
            .await?;

        if report.removed != 0 {
            info!(
                target: LOG_TARGET,
                kept = report.kept,
                removed = report.removed,
                retention_days,
                "Compacted ledger"
            );
        }
        Ok(report)
    }

    /// Most recently appended entries first.
    pub async fn list_ledger(&self, limit: usize) -> DbResult<Vec<LedgerEntry>> {
        self.read_with(|tx| {
            let ledger_table = tx.open_table(&ledger::TABLE)?;

            let mut entries = vec![];
            for record in ledger_table.range(..)?.rev().take(limit) {
                let (_, v) = record?;
                entries.push(v.value());
            }
            Ok(entries)
        })
        .await
    }

    pub async fn ledger_count(&self) -> DbResult<usize> {
        self.read_with(|tx| {
            let ledger_table = tx.open_table(&ledger::TABLE)?;
            Ok(Self::keys_tx(&ledger_table)?.len())
        })
        .await
    }

    /// Number of entries posted within the last `days` before `now`.
    pub async fn recent_ledger_count(&self, days: u64, now: Timestamp) -> DbResult<usize> {
        let since = now - days.saturating_mul(SECS_PER_DAY);
        self.read_with(|tx| {
            let ledger_table = tx.open_table(&ledger::TABLE)?;

            let mut count = 0;
            for record in ledger_table.range(..)? {
                let (_, v) = record?;
                if since <= v.value().posted_at {
                    count += 1;
                }
            }
            Ok(count)
        })
        .await
    }
}
