//! Differential updates of child rows.
//!
//! A cache record's collections live in child tables keyed by the parent
//! row id. Saving a record rewrites only the rows that actually changed:
//! unchanged elements keep their rows, and an unchanged collection issues
//! no statements at all.

use std::collections::BTreeSet;
use std::ops::AddAssign;

use rusqlite::types::FromSql;
use rusqlite::{params, Connection, ToSql};

/// A child table holding one collection per parent row.
///
/// Every child table has a `parent_id` column referencing the parent and a
/// `value` column. List tables also carry an `idx` column with the
/// element's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildTable {
    /// SQL table name.
    pub name: &'static str,
}

impl ChildTable {
    /// Describes the table named `name`.
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }
}

/// The number of child rows a save touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    /// Rows deleted.
    pub deleted: usize,
    /// Rows inserted.
    pub inserted: usize,
}

impl WriteStats {
    /// True when nothing was written.
    pub fn is_empty(&self) -> bool {
        self.deleted == 0 && self.inserted == 0
    }
}

impl AddAssign for WriteStats {
    fn add_assign(&mut self, rhs: Self) {
        self.deleted += rhs.deleted;
        self.inserted += rhs.inserted;
    }
}

/// Brings the set stored under `parent_id` from `old` to `new`.
///
/// Deletes exactly `old - new` and inserts exactly `new - old`. `old` must
/// be what is currently stored.
pub fn update_set<T: ToSql + Ord>(
    conn: &Connection,
    table: ChildTable,
    parent_id: i64,
    old: &BTreeSet<T>,
    new: &BTreeSet<T>,
) -> rusqlite::Result<WriteStats> {
    let mut stats = WriteStats::default();
    if old == new {
        return Ok(stats);
    }

    let mut delete = conn.prepare_cached(&format!(
        "DELETE FROM {} WHERE parent_id = ?1 AND value = ?2",
        table.name
    ))?;
    for value in old.difference(new) {
        stats.deleted += delete.execute(params![parent_id, value])?;
    }

    let mut insert = conn.prepare_cached(&format!(
        "INSERT INTO {} (parent_id, value) VALUES (?1, ?2)",
        table.name
    ))?;
    for value in new.difference(old) {
        stats.inserted += insert.execute(params![parent_id, value])?;
    }
    Ok(stats)
}

/// Brings the list stored under `parent_id` from `old` to `new`.
///
/// The diff runs over `(index, value)` pairs: an element that keeps both
/// its position and its value is left alone. Rows are deleted by index
/// before any insert, so the `(parent_id, idx)` uniqueness constraint holds
/// throughout.
pub fn update_list<T: ToSql + Ord>(
    conn: &Connection,
    table: ChildTable,
    parent_id: i64,
    old: &[T],
    new: &[T],
) -> rusqlite::Result<WriteStats> {
    let mut stats = WriteStats::default();
    if old == new {
        return Ok(stats);
    }

    let old_pairs: BTreeSet<(i64, &T)> = indexed(old).collect();
    let new_pairs: BTreeSet<(i64, &T)> = indexed(new).collect();

    let mut delete = conn.prepare_cached(&format!(
        "DELETE FROM {} WHERE parent_id = ?1 AND idx = ?2",
        table.name
    ))?;
    for (idx, _) in old_pairs.difference(&new_pairs) {
        stats.deleted += delete.execute(params![parent_id, idx])?;
    }

    let mut insert = conn.prepare_cached(&format!(
        "INSERT INTO {} (parent_id, idx, value) VALUES (?1, ?2, ?3)",
        table.name
    ))?;
    for (idx, value) in new_pairs.difference(&old_pairs) {
        stats.inserted += insert.execute(params![parent_id, idx, value])?;
    }
    Ok(stats)
}

/// Reads the set stored under `parent_id`.
pub fn load_set<T: FromSql + Ord>(
    conn: &Connection,
    table: ChildTable,
    parent_id: i64,
) -> rusqlite::Result<BTreeSet<T>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT value FROM {} WHERE parent_id = ?1",
        table.name
    ))?;
    let rows = stmt.query_map(params![parent_id], |row| row.get(0))?;
    rows.collect()
}

/// Reads the list stored under `parent_id`, in index order.
pub fn load_list<T: FromSql>(
    conn: &Connection,
    table: ChildTable,
    parent_id: i64,
) -> rusqlite::Result<Vec<T>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT value FROM {} WHERE parent_id = ?1 ORDER BY idx",
        table.name
    ))?;
    let rows = stmt.query_map(params![parent_id], |row| row.get(0))?;
    rows.collect()
}

fn indexed<T>(items: &[T]) -> impl Iterator<Item = (i64, &T)> {
    (0i64..).zip(items)
}
