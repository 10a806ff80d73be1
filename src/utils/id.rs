use crate::CacheError;
use crate::Result;

/// Build a chunk id as `<table>_<created_at_ms>_<random suffix>`.
pub(crate) fn chunk_id(
    table: &str,
    created_at: u64,
) -> String {
    format!("{}_{}_{}", table, created_at, nanoid::nanoid!())
}

/// Generate a key for a registered resolve handler
pub(crate) fn handler_key() -> String {
    nanoid::nanoid!()
}

/// Table names end up in chunk ids, which the disk backend uses as file names.
pub(crate) fn validate_table(table: &str) -> Result<()> {
    if table.is_empty() || table.contains(['/', '\\']) || table == "." || table == ".." {
        return Err(CacheError::InvalidTable(table.to_string()).into());
    }
    Ok(())
}
