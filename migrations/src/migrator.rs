//! Registered migrations and the resolver that turns a stored schema version
//! into an upgrade plan.

use quarry_core::{QuarryError, Result, quarry_trace_migration};

use crate::plan::{MigrationPlan, PlanStep};

/// Upgrade action run against the context the caller executes plans with.
pub type UpgradeAction<C> = Box<dyn Fn(&mut C) -> Result<()> + Send + Sync>;

/// A hand-written upgrade from `start_version` to `end_version`.
pub struct Migration<C> {
    pub start_version: u32,
    pub end_version: u32,
    action: UpgradeAction<C>,
}

impl<C> Migration<C> {
    pub fn apply(&self, context: &mut C) -> Result<()> {
        (self.action)(context)
    }
}

impl<C> std::fmt::Debug for Migration<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("start_version", &self.start_version)
            .field("end_version", &self.end_version)
            .finish_non_exhaustive()
    }
}

/// What executing a plan needs from the storage side.
///
/// Implementations run inside the transaction that brackets the whole plan.
pub trait UpgradeContext {
    /// Create every table from its current descriptor.
    fn create_all(&mut self) -> Result<()>;

    /// Rebuild every table from its current descriptor, keeping surviving columns.
    fn recreate_all(&mut self) -> Result<()>;

    /// Persist the schema version reached so far.
    fn set_version(&mut self, version: u32) -> Result<()>;
}

/// Migrations keyed by the version they start from, plus the target version.
pub struct Migrations<C> {
    target_version: u32,
    allow_recreate_fallback: bool,
    migrations: Vec<Migration<C>>,
}

impl<C> std::fmt::Debug for Migrations<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrations")
            .field("target_version", &self.target_version)
            .field("allow_recreate_fallback", &self.allow_recreate_fallback)
            .field("migrations", &self.migrations)
            .finish()
    }
}

impl<C> Migrations<C> {
    pub fn new(target_version: u32) -> Self {
        Self {
            target_version,
            allow_recreate_fallback: true,
            migrations: Vec::new(),
        }
    }

    pub fn target_version(&self) -> u32 {
        self.target_version
    }

    /// Allow rebuilding every table when no migration covers a stored version.
    pub fn allow_recreate_fallback(&mut self, allow: bool) -> &mut Self {
        self.allow_recreate_fallback = allow;
        self
    }

    pub fn recreate_fallback_allowed(&self) -> bool {
        self.allow_recreate_fallback
    }

    /// Register an upgrade from `start_version` to `end_version`.
    pub fn register<F>(
        &mut self,
        start_version: u32,
        end_version: u32,
        action: F,
    ) -> Result<&mut Self>
    where
        F: Fn(&mut C) -> Result<()> + Send + Sync + 'static,
    {
        if end_version <= start_version {
            return Err(QuarryError::configuration(format!(
                "migration {start_version} -> {end_version} does not move forward"
            )));
        }
        if end_version > self.target_version {
            return Err(QuarryError::configuration(format!(
                "migration {start_version} -> {end_version} ends past target version {}",
                self.target_version
            )));
        }
        self.migrations.push(Migration {
            start_version,
            end_version,
            action: Box::new(action),
        });
        Ok(self)
    }

    /// Registered migrations, in registration order.
    pub fn migrations(&self) -> &[Migration<C>] {
        &self.migrations
    }

    /// Plan the upgrade from `current_version` to the target version.
    ///
    /// Version 0 means no schema exists and yields a single create step. From
    /// any other version the walk takes, at each version, the migration that
    /// reaches furthest (the earliest registered among equals). A version no
    /// migration starts from ends the plan with a rebuild of every table, or
    /// fails when that fallback is disabled.
    pub fn resolve(&self, current_version: u32) -> Result<MigrationPlan> {
        let target = self.target_version;
        if target == 0 {
            return Err(QuarryError::Migration(
                "target version must be at least 1".to_string(),
            ));
        }
        if current_version == 0 {
            return Ok(MigrationPlan::new(vec![PlanStep::CreateAll {
                end_version: target,
            }]));
        }
        if current_version > target {
            return Err(QuarryError::Migration(format!(
                "database is at version {current_version}, newer than target version {target}"
            )));
        }

        let mut steps = Vec::new();
        let mut version = current_version;
        while version < target {
            let next = self
                .migrations
                .iter()
                .enumerate()
                .filter(|(_, m)| m.start_version == version)
                .fold(None::<(usize, &Migration<C>)>, |best, (index, m)| match best {
                    Some((_, b)) if b.end_version >= m.end_version => best,
                    _ => Some((index, m)),
                });

            match next {
                Some((index, migration)) => {
                    steps.push(PlanStep::Run {
                        migration: index,
                        start_version: version,
                        end_version: migration.end_version,
                    });
                    version = migration.end_version;
                }
                None if self.allow_recreate_fallback => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        from = version,
                        to = target,
                        "quarry.migration: no migration registered, recreating all tables"
                    );
                    steps.push(PlanStep::RecreateAll {
                        start_version: version,
                        end_version: target,
                    });
                    break;
                }
                None => {
                    return Err(QuarryError::Migration(format!(
                        "no migration registered from version {version} to reach {target}, \
                         and the recreate fallback is disabled"
                    )));
                }
            }
        }
        Ok(MigrationPlan::new(steps))
    }
}

impl<C: UpgradeContext> Migrations<C> {
    /// Run `plan` against `context`, recording each step's end version as it
    /// completes. Returns the version reached.
    ///
    /// The caller brackets this in a transaction; an error leaves it to roll back.
    pub fn execute(&self, plan: &MigrationPlan, context: &mut C) -> Result<Option<u32>> {
        for step in plan {
            quarry_trace_migration!(step.kind(), step.start_version(), step.end_version());
            match *step {
                PlanStep::CreateAll { .. } => context.create_all()?,
                PlanStep::RecreateAll { .. } => context.recreate_all()?,
                PlanStep::Run { migration, .. } => {
                    let migration = self.migrations.get(migration).ok_or_else(|| {
                        QuarryError::Migration(format!(
                            "plan refers to unknown migration #{migration}"
                        ))
                    })?;
                    migration.apply(context)?;
                }
            }
            context.set_version(step.end_version())?;
        }
        Ok(plan.final_version())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Journal {
        events: Vec<String>,
    }

    impl UpgradeContext for Journal {
        fn create_all(&mut self) -> Result<()> {
            self.events.push("create".into());
            Ok(())
        }

        fn recreate_all(&mut self) -> Result<()> {
            self.events.push("recreate".into());
            Ok(())
        }

        fn set_version(&mut self, version: u32) -> Result<()> {
            self.events.push(format!("version {version}"));
            Ok(())
        }
    }

    fn note(label: &'static str) -> impl Fn(&mut Journal) -> Result<()> + Send + Sync + 'static {
        move |journal: &mut Journal| {
            journal.events.push(label.to_string());
            Ok(())
        }
    }

    fn chain() -> Migrations<Journal> {
        let mut migrations = Migrations::new(3);
        migrations
            .register(1, 2, note("1->2"))
            .unwrap()
            .register(2, 3, note("2->3"))
            .unwrap();
        migrations
    }

    fn ends(plan: &MigrationPlan) -> Vec<u32> {
        plan.iter().map(PlanStep::end_version).collect()
    }

    #[test]
    fn walks_registered_chain() {
        let plan = chain().resolve(1).unwrap();
        assert_eq!(ends(&plan), [2, 3]);
        assert!(!plan.uses_recreate_fallback());
    }

    #[test]
    fn fresh_database_creates_everything() {
        let plan = chain().resolve(0).unwrap();
        assert_eq!(plan.steps(), [PlanStep::CreateAll { end_version: 3 }]);
    }

    #[test]
    fn current_version_needs_nothing() {
        assert!(chain().resolve(3).unwrap().is_empty());
    }

    #[test]
    fn uncovered_version_falls_back_to_recreate() {
        let mut migrations = Migrations::<Journal>::new(3);
        migrations.register(2, 3, note("2->3")).unwrap();
        let plan = migrations.resolve(1).unwrap();
        assert_eq!(
            plan.steps(),
            [PlanStep::RecreateAll {
                start_version: 1,
                end_version: 3
            }]
        );

        migrations.allow_recreate_fallback(false);
        assert!(matches!(
            migrations.resolve(1),
            Err(QuarryError::Migration(_))
        ));
    }

    #[test]
    fn gap_after_a_partial_chain_recreates() {
        let mut migrations = Migrations::<Journal>::new(3);
        migrations.register(1, 2, note("1->2")).unwrap();
        let plan = migrations.resolve(2).unwrap();
        assert_eq!(plan.len(), 1);
        assert!(plan.uses_recreate_fallback());

        let plan = migrations.resolve(1).unwrap();
        assert_eq!(
            plan.iter().map(PlanStep::kind).collect::<Vec<_>>(),
            ["run", "recreate"]
        );
        assert_eq!(plan.final_version(), Some(3));
    }

    #[test]
    fn largest_jump_wins_and_ties_keep_registration_order() {
        let mut migrations = Migrations::<Journal>::new(4);
        migrations
            .register(1, 2, note("a"))
            .unwrap()
            .register(1, 4, note("b"))
            .unwrap()
            .register(1, 4, note("c"))
            .unwrap();
        let plan = migrations.resolve(1).unwrap();
        assert_eq!(
            plan.steps(),
            [PlanStep::Run {
                migration: 1,
                start_version: 1,
                end_version: 4
            }]
        );
    }

    #[test]
    fn downgrade_is_rejected() {
        assert!(matches!(chain().resolve(9), Err(QuarryError::Migration(_))));
    }

    #[test]
    fn registration_checks_versions() {
        let mut migrations = Migrations::<Journal>::new(3);
        assert!(migrations.register(2, 2, note("x")).is_err());
        assert!(migrations.register(2, 4, note("x")).is_err());
        assert!(migrations.migrations().is_empty());
    }

    #[test]
    fn execute_records_each_version() {
        let migrations = chain();
        let mut journal = Journal::default();
        let plan = migrations.resolve(1).unwrap();
        assert_eq!(migrations.execute(&plan, &mut journal).unwrap(), Some(3));
        assert_eq!(journal.events, ["1->2", "version 2", "2->3", "version 3"]);

        let mut fresh = Journal::default();
        let plan = migrations.resolve(0).unwrap();
        migrations.execute(&plan, &mut fresh).unwrap();
        assert_eq!(fresh.events, ["create", "version 3"]);
    }
}
