//! Resolved upgrade plans.

/// One step of an upgrade, each followed by recording its end version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanStep {
    /// Fresh database: create every table from its descriptor.
    CreateAll { end_version: u32 },
    /// Run the registered migration at `migration` (registration order).
    Run {
        migration: usize,
        start_version: u32,
        end_version: u32,
    },
    /// No registered migration starts at `start_version`: rebuild every table.
    RecreateAll { start_version: u32, end_version: u32 },
}

impl PlanStep {
    pub fn start_version(&self) -> u32 {
        match *self {
            PlanStep::CreateAll { .. } => 0,
            PlanStep::Run { start_version, .. } | PlanStep::RecreateAll { start_version, .. } => {
                start_version
            }
        }
    }

    pub fn end_version(&self) -> u32 {
        match *self {
            PlanStep::CreateAll { end_version }
            | PlanStep::Run { end_version, .. }
            | PlanStep::RecreateAll { end_version, .. } => end_version,
        }
    }

    /// Short name used in tracing events.
    pub fn kind(&self) -> &'static str {
        match self {
            PlanStep::CreateAll { .. } => "create",
            PlanStep::Run { .. } => "run",
            PlanStep::RecreateAll { .. } => "recreate",
        }
    }
}

/// Steps to apply in order, inside one transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationPlan {
    steps: Vec<PlanStep>,
}

impl MigrationPlan {
    pub(crate) fn new(steps: Vec<PlanStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// An empty plan means the database is already at the target version.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlanStep> {
        self.steps.iter()
    }

    /// Version recorded once every step has run.
    pub fn final_version(&self) -> Option<u32> {
        self.steps.last().map(PlanStep::end_version)
    }

    /// Whether the plan ends by rebuilding every table.
    pub fn uses_recreate_fallback(&self) -> bool {
        matches!(self.steps.last(), Some(PlanStep::RecreateAll { .. }))
    }
}

impl<'a> IntoIterator for &'a MigrationPlan {
    type Item = &'a PlanStep;
    type IntoIter = std::slice::Iter<'a, PlanStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}
