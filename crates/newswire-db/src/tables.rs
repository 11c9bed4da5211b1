use newswire_core::{AutomationConfig, ContentHash, LedgerEntry, PendingEntry, PendingId};

#[macro_export]
macro_rules! def_table {
    ($(#[$outer:meta])*
        $name:ident : $k:ty => $v:ty) => {
        #[allow(unused)]
        $(#[$outer])*
        pub mod $name {
            use super::*;
            pub type Key = $k;
            pub type Value = $v;
            pub type Definition<'a> = redb_bincode::TableDefinition<'a, Key, Value>;
            pub trait ReadableTable: redb_bincode::ReadableTable<Key, Value> {}
            impl<RT> ReadableTable for RT where RT: redb_bincode::ReadableTable<Key, Value> {}
            pub type Table<'a> = redb_bincode::Table<'a, Key, Value>;
            pub const TABLE: Definition = redb_bincode::TableDefinition::new(stringify!($name));
        }
    };
}

def_table! {
    /// Tracks database/schema version
    db_version: () => u64
}

def_table! {
    /// Persistent [`AutomationConfig`], single row
    settings: () => AutomationConfig
}

def_table! {
    /// Published articles, keyed by append sequence number
    ledger: u64 => LedgerEntry
}

def_table! {
    /// Next free key of [`ledger`]
    ledger_seq: () => u64
}

def_table! {
    /// Normalized URL of every ledger entry -> its sequence number
    ledger_urls: String => u64
}

def_table! {
    /// Content hash of every ledger entry -> its sequence number
    ledger_hashes: ContentHash => u64
}

def_table! {
    /// Pending queue, keyed by id (which also gives insertion order)
    pending: PendingId => PendingEntry
}

def_table! {
    /// Next free [`PendingId`]
    ///
    /// Kept separately from [`pending`], so ids are not reused after the queue
    /// is cleared.
    pending_seq: () => u64
}

def_table! {
    /// Content hash -> id of the entry holding it, while that entry is still
    /// pending
    pending_hashes: ContentHash => PendingId
}

def_table! {
    /// Content hash -> id of the rejected entry holding it
    ///
    /// Keeps rejected articles from being queued again while they stay on
    /// the source listing.
    rejected_hashes: ContentHash => PendingId
}
