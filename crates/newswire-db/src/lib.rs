pub mod dedup;
mod ledger_ops;
mod pending_ops;
mod table_ops;
mod tables;

#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::result;

use newswire_core::{AutomationConfig, ConfigFieldError, PendingId, PendingStatus, Timestamp};
use redb_bincode::{ReadTransaction, ReadableTable as _, WriteTransaction};
use snafu::{Location, ResultExt as _, Snafu};
use tokio::task::JoinError;
use tracing::{debug, info, instrument};

pub use self::ledger_ops::{CompactionReport, LEDGER_RETENTION_DAYS, RecordOutcome};
pub use self::tables::*;

const LOG_TARGET: &str = "newswire::db";

/// Schema version written by this code.
const DB_VER: u64 = 1;

#[derive(Debug, Snafu)]
pub enum DbError {
    Database {
        source: redb::DatabaseError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(transparent)]
    Table {
        source: redb::TableError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(transparent)]
    Storage {
        source: redb::StorageError,
        #[snafu(implicit)]
        location: Location,
    },
    Transaction {
        source: redb::TransactionError,
        #[snafu(implicit)]
        location: Location,
    },
    Commit {
        source: redb::CommitError,
        #[snafu(implicit)]
        location: Location,
    },
    DbVersionTooHigh {
        db_ver: u64,
        code_ver: u64,
        #[snafu(implicit)]
        location: Location,
    },
    Join {
        source: JoinError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(visibility(pub(crate)))]
    #[snafu(display("Pending entry {id} not found"))]
    PendingNotFound {
        id: PendingId,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(visibility(pub(crate)))]
    #[snafu(display("Pending entry {id} is already {status}"))]
    InvalidTransition {
        id: PendingId,
        status: PendingStatus,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Invalid configuration: {}", format_field_errors(errors)))]
    InvalidConfig { errors: Vec<ConfigFieldError> },
}
pub type DbResult<T> = result::Result<T, DbError>;

fn format_field_errors(errors: &[ConfigFieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Counters over the stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataStats {
    pub ledger_entries: usize,
    pub posted_last_7_days: usize,
    pub pending: usize,
    pub posted: usize,
    pub rejected: usize,
}

/// The single-writer store behind the ledger, the pending queue and the
/// settings.
///
/// Every mutation runs in one redb write transaction; redb serializes write
/// transactions, so multi-table updates are atomic and never interleave.
#[derive(Debug)]
pub struct Database {
    inner: redb_bincode::Database,
}

impl Database {
    #[instrument(skip_all)]
    pub async fn open(path: impl Into<PathBuf>) -> DbResult<Database> {
        let path = path.into();
        debug!(target: LOG_TARGET, path = %path.display(), "Opening database");
        let inner = tokio::task::spawn_blocking(move || redb_bincode::Database::create(path))
            .await
            .context(JoinSnafu)?
            .context(DatabaseSnafu)?;

        Self::write_with_inner(&inner, |tx| {
            Self::init_tables_tx(tx)?;
            Self::handle_db_ver_tx(tx)?;
            Ok(())
        })
        .await?;

        Ok(Self { inner })
    }

    pub async fn write_with_inner<T>(
        inner: &redb_bincode::Database,
        f: impl FnOnce(&'_ WriteTransaction) -> DbResult<T>,
    ) -> DbResult<T> {
        tokio::task::block_in_place(|| {
            let dbtx = inner.begin_write().context(TransactionSnafu)?;
            let res = f(&dbtx)?;

            dbtx.commit().context(CommitSnafu)?;

            Ok(res)
        })
    }

    /// Run `f` in a write transaction, committing only if it returns `Ok`.
    pub async fn write_with<T>(
        &self,
        f: impl FnOnce(&'_ WriteTransaction) -> DbResult<T>,
    ) -> DbResult<T> {
        Self::write_with_inner(&self.inner, f).await
    }

    pub async fn read_with<T>(
        &self,
        f: impl FnOnce(&'_ ReadTransaction) -> DbResult<T>,
    ) -> DbResult<T> {
        tokio::task::block_in_place(|| {
            let dbtx = self.inner.begin_read().context(TransactionSnafu)?;

            f(&dbtx)
        })
    }

    fn init_tables_tx(tx: &WriteTransaction) -> DbResult<()> {
        tx.open_table(&db_version::TABLE)?;
        tx.open_table(&settings::TABLE)?;

        tx.open_table(&ledger::TABLE)?;
        tx.open_table(&ledger_seq::TABLE)?;
        tx.open_table(&ledger_urls::TABLE)?;
        tx.open_table(&ledger_hashes::TABLE)?;

        tx.open_table(&pending::TABLE)?;
        tx.open_table(&pending_seq::TABLE)?;
        tx.open_table(&pending_hashes::TABLE)?;
        tx.open_table(&rejected_hashes::TABLE)?;
        Ok(())
    }

    fn handle_db_ver_tx(tx: &WriteTransaction) -> DbResult<()> {
        let mut table_db_ver = tx.open_table(&db_version::TABLE)?;

        let Some(cur_db_ver) = table_db_ver.get(&())?.map(|g| g.value()) else {
            info!(target: LOG_TARGET, "Initializing new database");
            table_db_ver.insert(&(), &DB_VER)?;
            return Ok(());
        };

        if DB_VER < cur_db_ver {
            return DbVersionTooHighSnafu {
                db_ver: cur_db_ver,
                code_ver: DB_VER,
            }
            .fail();
        }

        debug!(target: LOG_TARGET, db_ver = cur_db_ver, "Db version");
        Ok(())
    }

    /// Stored automation settings, or the defaults if none were saved yet.
    pub async fn load_config(&self) -> DbResult<AutomationConfig> {
        self.read_with(|tx| {
            let table = tx.open_table(&settings::TABLE)?;
            Ok(table.get(&())?.map(|g| g.value()).unwrap_or_default())
        })
        .await
    }

    /// Validate and persist `config`, stamping `last_updated`.
    ///
    /// Invalid settings are rejected with every field-level problem; the
    /// stored settings are left untouched.
    pub async fn save_config(
        &self,
        mut config: AutomationConfig,
        now: Timestamp,
    ) -> DbResult<AutomationConfig> {
        if let Err(errors) = config.validate() {
            return InvalidConfigSnafu { errors }.fail();
        }
        config.last_updated = Some(now);

        self.write_with(|tx| {
            let mut table = tx.open_table(&settings::TABLE)?;
            table.insert(&(), &config)?;
            Ok(())
        })
        .await?;

        info!(target: LOG_TARGET, "Saved automation settings");
        Ok(config)
    }

    pub async fn stats(&self, now: Timestamp) -> DbResult<DataStats> {
        self.read_with(|tx| {
            let ledger_table = tx.open_table(&ledger::TABLE)?;
            let pending_table = tx.open_table(&pending::TABLE)?;

            let mut stats = DataStats::default();
            let week_ago = now - 7 * newswire_core::SECS_PER_DAY;

            for record in ledger_table.range(..)? {
                let (_, entry) = record?;
                stats.ledger_entries += 1;
                if week_ago <= entry.value().posted_at {
                    stats.posted_last_7_days += 1;
                }
            }

            for record in pending_table.range(..)? {
                let (_, entry) = record?;
                match entry.value().status {
                    PendingStatus::Pending => stats.pending += 1,
                    PendingStatus::Posted => stats.posted += 1,
                    PendingStatus::Rejected => stats.rejected += 1,
                }
            }

            Ok(stats)
        })
        .await
    }

    /// Forget all published and pending articles. Settings are kept, and
    /// pending ids keep counting up.
    pub async fn reset(&self) -> DbResult<DataStats> {
        let stats = self.stats(Timestamp::now()).await?;

        self.write_with(|tx| {
            Self::clear_table_tx(&mut tx.open_table(&ledger::TABLE)?)?;
            Self::clear_table_tx(&mut tx.open_table(&ledger_urls::TABLE)?)?;
            Self::clear_table_tx(&mut tx.open_table(&ledger_hashes::TABLE)?)?;
            Self::clear_table_tx(&mut tx.open_table(&pending::TABLE)?)?;
            Self::clear_table_tx(&mut tx.open_table(&pending_hashes::TABLE)?)?;
            Self::clear_table_tx(&mut tx.open_table(&rejected_hashes::TABLE)?)?;
            Ok(())
        })
        .await?;

        info!(
            target: LOG_TARGET,
            ledger_entries = stats.ledger_entries,
            pending_entries = stats.pending + stats.posted + stats.rejected,
            "Reset all data"
        );
        Ok(stats)
    }
}
