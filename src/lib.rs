//! # Quarry
//!
//! Maps Rust record types onto SQLite tables and keeps the stored schema at
//! the version the application expects.
//!
//! Records describe their persisted fields through [`Record::describe`]. The
//! described tables are collected by a [`SchemaBuilder`], whose
//! [`build`](SchemaBuilder::build) step resolves foreign keys and many-to-many
//! relationships in any registration order. A [`Database`] opened against the
//! resulting [`Schema`] reads the stored schema version, plans an upgrade with
//! [`Migrations::resolve`] and runs it in a single transaction.
//!
//! ```no_run
//! use std::sync::Arc;
//! use quarry::{Database, DatabaseConfig, MigrationContext, Record, TableBuilder};
//!
//! #[derive(Default)]
//! struct Tag {
//!     id: i64,
//!     label: String,
//! }
//!
//! impl Record for Tag {
//!     fn describe(t: &mut TableBuilder<'_, Self>) {
//!         t.column("Id", |r| &r.id, |r, v| r.id = v);
//!         t.column("Label", |r| &r.label, |r, v| r.label = v).unique();
//!     }
//! }
//!
//! # fn main() -> quarry::Result<()> {
//! let config = DatabaseConfig::parse("[migrations]\ntarget_version = 2").expect("config");
//! let mut schema = config.schema_builder();
//! schema.register::<Tag>()?;
//!
//! let mut migrations = config.migrations.migrations::<MigrationContext>();
//! migrations.register(1, 2, |ctx| ctx.recreate_table::<Tag>())?;
//!
//! let db = Database::open("tags.db", Arc::new(schema.build()?), &migrations, &config)?;
//! db.insert(&mut Tag { label: "rust".into(), ..Tag::default() })?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! | Feature   | Default | Effect                                              |
//! |-----------|---------|-----------------------------------------------------|
//! | `tracing` | yes     | statement, transaction and migration events         |

pub mod config;
pub mod database;
mod relations;
mod rows;
pub mod upgrade;

pub use config::{ConfigError, DatabaseConfig, MigrationsConfig};
pub use database::Database;
pub use upgrade::MigrationContext;

pub use quarry_core::{
    ColumnDescriptor, ColumnRef, ColumnSpec, EnumStorage, ForeignKey, IndexSpec,
    ManyToManyDescriptor, MappingOptions, QuarryError, Record, ReferentialAction, RelationSpec,
    RelationWiring, Result, Schema, SchemaBuilder, SqlEnum, TableBuilder, TableDescriptor, TableId,
    TypeConversion, TypeKey, TypeRegistry, Value, default_table_name, register_enums, sql,
};
pub use quarry_migrations::{Migration, MigrationPlan, Migrations, PlanStep, UpgradeContext};
