//! Schema version migrations for quarry.
//!
//! An application registers hand-written upgrades between schema versions and
//! a target version. [`Migrations::resolve`] turns the version stored in the
//! database into a [`MigrationPlan`]; [`Migrations::execute`] runs it against an
//! [`UpgradeContext`] supplied by the storage layer.
//!
//! ```ignore
//! let mut migrations = Migrations::new(3);
//! migrations
//!     .register(1, 2, |ctx| {
//!         ctx.execute("ALTER TABLE \"Note\" ADD COLUMN \"Pinned\" INTEGER NOT NULL DEFAULT 0")
//!     })?
//!     .register(2, 3, |ctx| ctx.recreate_table::<Note>())?;
//!
//! let plan = migrations.resolve(stored_version)?;
//! ```
//!
//! Resolution is pure; nothing here touches a database.

pub mod migrator;
pub mod plan;

pub use migrator::{Migration, Migrations, UpgradeAction, UpgradeContext};
pub use plan::{MigrationPlan, PlanStep};
