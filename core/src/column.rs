//! Column descriptors: one persisted field of a record type.

use std::any::Any;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::Result;
use crate::registry::TypeKey;
use crate::value::{ParamSink, RowSource, Value};

pub(crate) type Getter = Arc<dyn Fn(&dyn Any) -> Result<Value> + Send + Sync>;
pub(crate) type Setter = Arc<dyn Fn(&mut dyn Any, &Value) -> Result<()> + Send + Sync>;
pub(crate) type IdentityFn = Arc<dyn Fn(&mut dyn Any) -> Result<bool> + Send + Sync>;

/// Foreign key referential action
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Default, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    /// No action (default)
    #[default]
    NoAction,
    /// Restrict deletion
    Restrict,
    /// Cascade changes
    Cascade,
    /// Set to NULL
    SetNull,
    /// Set to default value
    SetDefault,
}

impl ReferentialAction {
    /// Get the SQL representation
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// One index a column participates in.
///
/// Columns sharing an index name form a composite index ordered by `order`.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct IndexSpec {
    pub name: Option<String>,
    pub order: i32,
    pub unique: bool,
}

/// Handle to a column inside a wired [`Schema`](crate::Schema).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnRef {
    pub table: crate::TableId,
    pub column: usize,
    pub table_name: String,
    pub column_name: String,
}

/// Declared foreign key; `target` is filled in by the wiring pass.
#[derive(Clone, Debug)]
pub struct ForeignKey {
    pub(crate) target_type: TypeKey,
    pub(crate) target_field: Option<String>,
    pub(crate) action: Option<ReferentialAction>,
    pub(crate) target: Option<ColumnRef>,
}

impl ForeignKey {
    pub fn target_type(&self) -> TypeKey {
        self.target_type
    }

    /// Field named explicitly as the target, if any
    pub fn target_field(&self) -> Option<&str> {
        self.target_field.as_deref()
    }

    pub fn action(&self) -> Option<ReferentialAction> {
        self.action
    }

    /// The resolved target column; always set on columns reached through a `Schema`.
    pub fn target(&self) -> Option<&ColumnRef> {
        self.target.as_ref()
    }
}

/// Metadata and accessors for one persisted field.
#[derive(Clone)]
pub struct ColumnDescriptor {
    pub(crate) name: String,
    pub(crate) field: String,
    pub(crate) value_type: TypeKey,
    pub(crate) sql_type: String,
    pub(crate) primary_key: bool,
    pub(crate) auto_increment: bool,
    pub(crate) auto_identity: bool,
    pub(crate) nullable: bool,
    pub(crate) max_length: Option<u32>,
    pub(crate) collation: Option<String>,
    pub(crate) default: Option<String>,
    pub(crate) indexes: SmallVec<[IndexSpec; 1]>,
    pub(crate) foreign_key: Option<ForeignKey>,
    pub(crate) get: Getter,
    pub(crate) set: Setter,
    pub(crate) identity: Option<IdentityFn>,
}

impl std::fmt::Debug for ColumnDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnDescriptor")
            .field("name", &self.name)
            .field("field", &self.field)
            .field("value_type", &self.value_type.name())
            .field("sql_type", &self.sql_type)
            .field("primary_key", &self.primary_key)
            .field("auto_increment", &self.auto_increment)
            .field("auto_identity", &self.auto_identity)
            .field("nullable", &self.nullable)
            .field("indexes", &self.indexes)
            .field("foreign_key", &self.foreign_key)
            .finish()
    }
}

impl ColumnDescriptor {
    /// Storage name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the declaring field
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn value_type(&self) -> TypeKey {
        self.value_type
    }

    pub fn sql_type(&self) -> &str {
        &self.sql_type
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_auto_increment(&self) -> bool {
        self.auto_increment
    }

    /// Identifier synthesized client-side before insert.
    pub fn is_auto_identity(&self) -> bool {
        self.auto_identity
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn max_length(&self) -> Option<u32> {
        self.max_length
    }

    pub fn collation(&self) -> Option<&str> {
        self.collation.as_deref()
    }

    /// Default value literal, unquoted
    pub fn default_value(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    pub fn foreign_key(&self) -> Option<&ForeignKey> {
        self.foreign_key.as_ref()
    }

    pub fn cascade_action(&self) -> Option<ReferentialAction> {
        self.foreign_key.as_ref().and_then(|fk| fk.action)
    }

    /// Encode this column's field of `record`.
    pub fn value_of(&self, record: &dyn Any) -> Result<Value> {
        (self.get)(record)
    }

    /// Decode `value` into this column's field of `record`.
    pub fn assign(&self, record: &mut dyn Any, value: &Value) -> Result<()> {
        (self.set)(record, value)
    }

    /// Read column `index` of `row` into `record`.
    pub fn read(&self, record: &mut dyn Any, row: &dyn RowSource, index: usize) -> Result<()> {
        let value = row.column_value(index)?;
        self.assign(record, &value)
    }

    /// Bind this column's field of `record` as parameter `index`.
    pub fn write(&self, record: &dyn Any, stmt: &mut dyn ParamSink, index: usize) -> Result<()> {
        stmt.bind_value(index, self.value_of(record)?)
    }

    /// Give `record` a fresh identifier if this is an identity column whose
    /// value is still unset. Returns whether one was assigned.
    pub fn ensure_identity(&self, record: &mut dyn Any) -> Result<bool> {
        match (&self.identity, self.auto_identity) {
            (Some(identity), true) => identity(record),
            _ => Ok(false),
        }
    }
}
