//! SQLite connection bound to a wired [`Schema`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use quarry::{Database, DatabaseConfig, Record, TableBuilder};
//!
//! #[derive(Default)]
//! struct Note {
//!     id: i64,
//!     body: String,
//! }
//!
//! impl Record for Note {
//!     fn describe(t: &mut TableBuilder<'_, Self>) {
//!         t.column("Id", |n| &n.id, |n, v| n.id = v);
//!         t.column("Body", |n| &n.body, |n, v| n.body = v);
//!     }
//! }
//!
//! fn main() -> quarry::Result<()> {
//!     let config = DatabaseConfig::default();
//!     let mut schema = config.schema_builder();
//!     schema.register::<Note>()?;
//!     let schema = Arc::new(schema.build()?);
//!
//!     let db = Database::open_in_memory(schema, &config.migrations.migrations(), &config)?;
//!     let mut note = Note { body: "hello".into(), ..Note::default() };
//!     db.insert(&mut note)?;
//!     assert_eq!(db.get::<Note, _>(&note.id)?.body, "hello");
//!     Ok(())
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use quarry_core::{
    QuarryError, Record, Result, Schema, TableDescriptor, Value, quarry_trace_tx, sql,
};
use quarry_migrations::Migrations;
use rusqlite::Connection;

use crate::config::DatabaseConfig;
use crate::upgrade::MigrationContext;
use crate::{relations, rows};

/// An open database whose tables follow `schema`.
pub struct Database {
    conn: Connection,
    schema: Arc<Schema>,
    foreign_keys: bool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.conn.path())
            .field("tables", &self.schema.tables().len())
            .field("foreign_keys", &self.foreign_keys)
            .finish()
    }
}

impl Database {
    /// Open (or create) the database file at `path` and bring it to the target version.
    pub fn open(
        path: impl AsRef<Path>,
        schema: Arc<Schema>,
        migrations: &Migrations<MigrationContext>,
        config: &DatabaseConfig,
    ) -> Result<Self> {
        Self::from_connection(Connection::open(path)?, schema, migrations, config)
    }

    pub fn open_in_memory(
        schema: Arc<Schema>,
        migrations: &Migrations<MigrationContext>,
        config: &DatabaseConfig,
    ) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, schema, migrations, config)
    }

    /// Apply connection settings, then resolve and run the upgrade plan.
    ///
    /// The whole plan runs in one transaction; if any step fails nothing is
    /// kept, the stored version is unchanged and the open fails.
    pub fn from_connection(
        conn: Connection,
        schema: Arc<Schema>,
        migrations: &Migrations<MigrationContext>,
        config: &DatabaseConfig,
    ) -> Result<Self> {
        conn.busy_timeout(config.busy_timeout())?;
        let current = read_version(&conn)?;
        let plan = migrations.resolve(current)?;

        let conn = if plan.is_empty() {
            conn
        } else {
            // Foreign key enforcement cannot change inside a transaction.
            rows::execute_batch(&conn, "PRAGMA foreign_keys = OFF")?;
            let mut context = MigrationContext::new(conn, Arc::clone(&schema));
            rows::execute_batch(context.connection(), "BEGIN")?;
            quarry_trace_tx!("begin");
            match migrations.execute(&plan, &mut context) {
                Ok(_) => {
                    rows::execute_batch(context.connection(), "COMMIT")?;
                    quarry_trace_tx!("commit");
                }
                Err(e) => {
                    match context.connection().execute_batch("ROLLBACK") {
                        Ok(()) => {
                            quarry_trace_tx!("rollback");
                        }
                        Err(failed) => {
                            quarry_trace_tx!("rollback_failed", failed);
                        }
                    }
                    return Err(e);
                }
            }
            context.into_connection()
        };

        let db = Self {
            conn,
            schema,
            foreign_keys: config.foreign_keys,
        };
        db.apply_foreign_keys()?;
        Ok(db)
    }

    fn apply_foreign_keys(&self) -> Result<()> {
        let pragma = if self.foreign_keys {
            "PRAGMA foreign_keys = ON"
        } else {
            "PRAGMA foreign_keys = OFF"
        };
        rows::execute_batch(&self.conn, pragma)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The schema version stored in the database.
    pub fn schema_version(&self) -> Result<u32> {
        read_version(&self.conn)
    }

    /// Run `f` in a transaction, committing on success and rolling back on error.
    pub fn transaction<R>(&self, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        let tx = self.conn.unchecked_transaction()?;
        quarry_trace_tx!("begin");
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                quarry_trace_tx!("commit");
                Ok(value)
            }
            Err(e) => {
                match tx.rollback() {
                    Ok(()) => {
                        quarry_trace_tx!("rollback");
                    }
                    Err(failed) => {
                        quarry_trace_tx!("rollback_failed", failed);
                    }
                }
                Err(e)
            }
        }
    }

    /// Create every table and index that does not exist yet.
    pub fn create_tables(&self) -> Result<()> {
        self.transaction(|conn| {
            self.schema
                .tables()
                .iter()
                .try_for_each(|table| rows::create_table(conn, table))
        })
    }

    /// Rebuild every table from its descriptor, keeping columns that survive.
    pub fn recreate_tables(&self) -> Result<()> {
        rows::execute_batch(&self.conn, "PRAGMA foreign_keys = OFF")?;
        let result = self.transaction(|conn| {
            self.schema
                .tables()
                .iter()
                .try_for_each(|table| rows::recreate_table(conn, table))
        });
        self.apply_foreign_keys()?;
        result
    }

    fn table<T: Record>(&self) -> Result<&TableDescriptor> {
        self.schema.table::<T>()
    }

    fn key_value<K: Send + Sync + 'static>(&self, key: &K) -> Result<Value> {
        self.schema.registry().resolve::<K>()?.encode(Some(key))
    }

    /// Insert `record`. Many-to-many fields are not written; see [`Database::update`].
    pub fn insert<T: Record>(&self, record: &mut T) -> Result<usize> {
        rows::insert(&self.conn, self.table::<T>()?, record, false)
    }

    /// Insert `record`, replacing any row with the same key or unique value.
    pub fn insert_or_replace<T: Record>(&self, record: &mut T) -> Result<usize> {
        rows::insert(&self.conn, self.table::<T>()?, record, true)
    }

    /// Insert every record in one transaction.
    pub fn insert_all<T: Record>(&self, records: &mut [T]) -> Result<usize> {
        let table = self.table::<T>()?;
        self.transaction(|conn| {
            let mut count = 0;
            for record in records.iter_mut() {
                count += rows::insert(conn, table, record, false)?;
            }
            Ok(count)
        })
    }

    /// Update the row keyed by `record`'s primary key, then resync its
    /// many-to-many fields, in one transaction.
    pub fn update<T: Record>(&self, record: &T) -> Result<usize> {
        let table = self.table::<T>()?;
        self.transaction(|conn| {
            let count = rows::update(conn, table, record)?;
            relations::write(conn, &self.schema, table, record)?;
            Ok(count)
        })
    }

    pub fn delete<T: Record>(&self, record: &T) -> Result<usize> {
        rows::delete(&self.conn, self.table::<T>()?, record)
    }

    pub fn delete_by_key<T: Record, K: Send + Sync + 'static>(&self, key: &K) -> Result<usize> {
        rows::delete_by_key(&self.conn, self.table::<T>()?, self.key_value(key)?)
    }

    /// The record keyed by `key`, or `NotFound`.
    pub fn get<T: Record, K: Send + Sync + 'static>(&self, key: &K) -> Result<T> {
        self.find::<T, K>(key)?.ok_or(QuarryError::NotFound)
    }

    /// The record keyed by `key`, if any.
    ///
    /// On a table without a primary key the key is ignored and an arbitrary
    /// row is returned.
    pub fn find<T: Record, K: Send + Sync + 'static>(&self, key: &K) -> Result<Option<T>> {
        rows::find::<T>(&self.conn, self.table::<T>()?, self.key_value(key)?)
    }

    pub fn all<T: Record>(&self) -> Result<Vec<T>> {
        let table = self.table::<T>()?;
        rows::query_records(&self.conn, table, &sql::select_all_sql(table), &[])
    }

    /// Some row of `T`'s table; no particular one.
    pub fn first<T: Record>(&self) -> Result<Option<T>> {
        let table = self.table::<T>()?;
        let sql = format!("{} LIMIT 1", sql::select_all_sql(table));
        let found = rows::query_records(&self.conn, table, &sql, &[])?;
        Ok(found.into_iter().next())
    }

    /// Fill `record`'s many-to-many fields from the junction tables.
    pub fn read_relationships<T: Record>(&self, record: &mut T) -> Result<()> {
        relations::read(&self.conn, &self.schema, self.table::<T>()?, record)
    }

    /// Rewrite the junction rows for `record`'s many-to-many fields.
    pub fn write_relationships<T: Record>(&self, record: &T) -> Result<()> {
        let table = self.table::<T>()?;
        self.transaction(|conn| relations::write(conn, &self.schema, table, record))
    }
}

fn read_version(conn: &Connection) -> Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(version).map_err(|_| {
        QuarryError::Migration(format!("stored schema version {version} is out of range"))
    })
}
