use crate::{Database, DbResult};

impl Database {
    /// Remove every row of `table`.
    pub(crate) fn clear_table_tx<K, V>(table: &mut redb_bincode::Table<'_, K, V>) -> DbResult<usize>
    where
        K: bincode::Decode<()> + bincode::Encode,
        V: bincode::Decode<()> + bincode::Encode,
    {
        let keys = Self::keys_tx(&*table)?;
        for key in &keys {
            table.remove(key)?;
        }
        Ok(keys.len())
    }

    pub(crate) fn keys_tx<K, V>(table: &impl redb_bincode::ReadableTable<K, V>) -> DbResult<Vec<K>>
    where
        K: bincode::Decode<()> + bincode::Encode,
        V: bincode::Decode<()> + bincode::Encode,
    {
        let mut keys = vec![];
        for record in table.range(..)? {
            let (k, _) = record?;
            keys.push(k.value());
        }
        Ok(keys)
    }
}
