//! The context upgrade actions run against.

use std::sync::Arc;

use quarry_core::{Record, Result, Schema, TableDescriptor, Value};
use quarry_migrations::UpgradeContext;
use rusqlite::Connection;

use crate::rows;

/// The connection being upgraded, inside the transaction that covers the whole plan.
///
/// Migration actions receive it mutably; every statement they run commits or
/// rolls back together with the recorded schema version.
pub struct MigrationContext {
    conn: Connection,
    schema: Arc<Schema>,
}

impl std::fmt::Debug for MigrationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationContext")
            .field("tables", &self.schema.tables().len())
            .finish_non_exhaustive()
    }
}

impl MigrationContext {
    pub(crate) fn new(conn: Connection, schema: Arc<Schema>) -> Self {
        Self { conn, schema }
    }

    pub(crate) fn into_connection(self) -> Connection {
        self.conn
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Run one or more parameterless statements.
    pub fn execute(&self, sql: &str) -> Result<()> {
        rows::execute_batch(&self.conn, sql)
    }

    /// Run one statement with positional parameters.
    pub fn execute_with(&self, sql: &str, params: &[Value]) -> Result<usize> {
        rows::execute(&self.conn, sql, params)
    }

    /// Column names currently stored for `table`; empty if it does not exist.
    pub fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        rows::stored_columns(&self.conn, table)
    }

    pub fn create_table<T: Record>(&self) -> Result<()> {
        rows::create_table(&self.conn, self.schema.table::<T>()?)
    }

    /// Rebuild `T`'s table from its descriptor, keeping columns that survive.
    pub fn recreate_table<T: Record>(&self) -> Result<()> {
        rows::recreate_table(&self.conn, self.schema.table::<T>()?)
    }

    /// Insert a record, e.g. to seed data introduced by this version.
    pub fn insert<T: Record>(&self, record: &mut T) -> Result<usize> {
        rows::insert(&self.conn, self.schema.table::<T>()?, record, false)
    }

    fn each_table(
        &self,
        apply: impl Fn(&Connection, &TableDescriptor) -> Result<()>,
    ) -> Result<()> {
        self.schema
            .tables()
            .iter()
            .try_for_each(|table| apply(&self.conn, table))
    }
}

impl UpgradeContext for MigrationContext {
    fn create_all(&mut self) -> Result<()> {
        self.each_table(rows::create_table)
    }

    fn recreate_all(&mut self) -> Result<()> {
        self.each_table(rows::recreate_table)
    }

    fn set_version(&mut self, version: u32) -> Result<()> {
        rows::execute_batch(&self.conn, &format!("PRAGMA user_version = {version}"))
    }
}
