//! Table descriptors and the typed builder records use to describe themselves.
//!
//! A record type implements [`Record`] and declares its persisted fields through a
//! [`TableBuilder`]. Fields declared directly on the record come first, fields of
//! inherited bases follow, and the first declaration of a field name wins.

use std::any::{Any, TypeId};
use std::sync::Arc;

use hashbrown::HashSet;
use smallvec::SmallVec;
use uuid::Uuid;

use crate::column::{
    ColumnDescriptor, ForeignKey, Getter, IdentityFn, IndexSpec, ReferentialAction, Setter,
};
use crate::error::{QuarryError, Result};
use crate::options::MappingOptions;
use crate::registry::{TypeKey, TypeRegistry};
use crate::sql;
use crate::value::Value;

/// A Rust type persisted as rows of one table.
pub trait Record: Default + Send + Sync + 'static {
    fn describe(table: &mut TableBuilder<'_, Self>);
}

/// Position of a table inside a [`Schema`](crate::Schema).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub(crate) usize);

impl TableId {
    pub fn index(self) -> usize {
        self.0
    }
}

type TypedGetter<T> = Arc<dyn Fn(&T) -> Result<Value> + Send + Sync>;
type TypedSetter<T> = Arc<dyn Fn(&mut T, &Value) -> Result<()> + Send + Sync>;
type TypedIdentity<T> = Arc<dyn Fn(&mut T) -> bool + Send + Sync>;
type TypedSeqGetter<T> = Arc<dyn Fn(&T) -> Result<Vec<Value>> + Send + Sync>;
type TypedSeqSetter<T> = Arc<dyn Fn(&mut T, Vec<Value>) -> Result<()> + Send + Sync>;
type SeqGetter = Arc<dyn Fn(&dyn Any) -> Result<Vec<Value>> + Send + Sync>;
type SeqSetter = Arc<dyn Fn(&mut dyn Any, Vec<Value>) -> Result<()> + Send + Sync>;

/// Declaration order: inheritance depth first, then position.
type Rank = (u32, u32);

// =============================================================================
// Column declarations
// =============================================================================

/// A field declaration being built; see [`TableBuilder::column`].
pub struct ColumnSpec<T> {
    rank: Rank,
    field: String,
    name: Option<String>,
    value_type: TypeKey,
    sql_type: String,
    nullable: bool,
    primary_key: bool,
    auto_increment: bool,
    max_length: Option<u32>,
    collation: Option<String>,
    default: Option<String>,
    indexes: SmallVec<[IndexSpec; 1]>,
    references: Option<(TypeKey, Option<String>)>,
    action: Option<ReferentialAction>,
    ignored: bool,
    get: TypedGetter<T>,
    set: TypedSetter<T>,
    identity: Option<TypedIdentity<T>>,
}

impl<T: 'static> ColumnSpec<T> {
    /// Store the field under a different column name.
    pub fn named(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    pub fn primary_key(&mut self) -> &mut Self {
        self.primary_key = true;
        self
    }

    /// Database-assigned counter, or a client-generated identifier for `Uuid` fields.
    pub fn auto_increment(&mut self) -> &mut Self {
        self.auto_increment = true;
        self
    }

    pub fn max_length(&mut self, length: u32) -> &mut Self {
        self.max_length = Some(length);
        self
    }

    pub fn collate(&mut self, collation: impl Into<String>) -> &mut Self {
        self.collation = Some(collation.into());
        self
    }

    /// Default literal; quoted when the DDL is generated.
    pub fn default_value(&mut self, literal: impl Into<String>) -> &mut Self {
        self.default = Some(literal.into());
        self
    }

    pub fn indexed(&mut self) -> &mut Self {
        self.indexes.push(IndexSpec::default());
        self
    }

    pub fn unique(&mut self) -> &mut Self {
        self.indexes.push(IndexSpec {
            unique: true,
            ..IndexSpec::default()
        });
        self
    }

    /// Join a named (possibly composite) index at position `order`.
    pub fn indexed_as(&mut self, name: impl Into<String>, order: i32, unique: bool) -> &mut Self {
        self.indexes.push(IndexSpec {
            name: Some(name.into()),
            order,
            unique,
        });
        self
    }

    /// Reference the primary key of `R`'s table.
    pub fn references<R: Record>(&mut self) -> &mut Self {
        self.references = Some((TypeKey::of::<R>(), None));
        self
    }

    /// Reference a specific field of `R`'s table instead of its primary key.
    pub fn references_field<R: Record>(&mut self, field: impl Into<String>) -> &mut Self {
        self.references = Some((TypeKey::of::<R>(), Some(field.into())));
        self
    }

    /// ON DELETE and ON UPDATE action for the foreign key.
    pub fn on_cascade(&mut self, action: ReferentialAction) -> &mut Self {
        self.action = Some(action);
        self
    }

    /// Keep the field out of the table; also hides a base field of the same name.
    pub fn ignore(&mut self) -> &mut Self {
        self.ignored = true;
        self
    }

    fn project<U: 'static>(
        self,
        depth: u32,
        seq_offset: u32,
        project: Arc<dyn Fn(&U) -> &T + Send + Sync>,
        project_mut: Arc<dyn Fn(&mut U) -> &mut T + Send + Sync>,
    ) -> ColumnSpec<U> {
        let get = self.get;
        let set = self.set;
        let identity = self.identity;
        let (p, pm) = (Arc::clone(&project), Arc::clone(&project_mut));
        ColumnSpec {
            rank: (self.rank.0 + depth, self.rank.1 + seq_offset),
            field: self.field,
            name: self.name,
            value_type: self.value_type,
            sql_type: self.sql_type,
            nullable: self.nullable,
            primary_key: self.primary_key,
            auto_increment: self.auto_increment,
            max_length: self.max_length,
            collation: self.collation,
            default: self.default,
            indexes: self.indexes,
            references: self.references,
            action: self.action,
            ignored: self.ignored,
            get: Arc::new(move |record: &U| get(p(record))),
            set: Arc::new(move |record: &mut U, value: &Value| set(pm(record), value)),
            identity: identity.map(|identity| {
                let pm = Arc::clone(&project_mut);
                Arc::new(move |record: &mut U| identity(pm(record))) as TypedIdentity<U>
            }),
        }
    }
}

// =============================================================================
// Many-to-many declarations
// =============================================================================

/// A many-to-many field declaration; see [`TableBuilder::many_to_many`].
pub struct RelationSpec<T> {
    rank: Rank,
    field: String,
    element: TypeKey,
    target: Option<TypeKey>,
    junction: Option<TypeKey>,
    this_key: Option<String>,
    other_key: Option<String>,
    order: Option<String>,
    get: TypedSeqGetter<T>,
    set: TypedSeqSetter<T>,
}

impl<T: 'static> RelationSpec<T> {
    /// The related record type whose identifiers the field holds.
    pub fn target<R: Record>(&mut self) -> &mut Self {
        self.target = Some(TypeKey::of::<R>());
        self
    }

    /// The junction record type whose rows realize the relationship.
    pub fn through<J: Record>(&mut self) -> &mut Self {
        self.junction = Some(TypeKey::of::<J>());
        self
    }

    /// Junction fields holding this record's key and the related key.
    pub fn keys(
        &mut self,
        this_field: impl Into<String>,
        other_field: impl Into<String>,
    ) -> &mut Self {
        self.this_key = Some(this_field.into());
        self.other_key = Some(other_field.into());
        self
    }

    /// Junction field preserving the order of the identifier sequence.
    pub fn ordered_by(&mut self, field: impl Into<String>) -> &mut Self {
        self.order = Some(field.into());
        self
    }

    fn project<U: 'static>(
        self,
        depth: u32,
        seq_offset: u32,
        project: Arc<dyn Fn(&U) -> &T + Send + Sync>,
        project_mut: Arc<dyn Fn(&mut U) -> &mut T + Send + Sync>,
    ) -> RelationSpec<U> {
        let get = self.get;
        let set = self.set;
        RelationSpec {
            rank: (self.rank.0 + depth, self.rank.1 + seq_offset),
            field: self.field,
            element: self.element,
            target: self.target,
            junction: self.junction,
            this_key: self.this_key,
            other_key: self.other_key,
            order: self.order,
            get: Arc::new(move |record: &U| get(project(record))),
            set: Arc::new(move |record: &mut U, ids: Vec<Value>| {
                set(project_mut(record), ids)
            }),
        }
    }
}

// =============================================================================
// Table builder
// =============================================================================

/// Collects the field declarations of one record type.
pub struct TableBuilder<'r, T> {
    registry: &'r TypeRegistry,
    options: &'r MappingOptions,
    name: Option<String>,
    without_rowid: bool,
    columns: Vec<ColumnSpec<T>>,
    relations: Vec<RelationSpec<T>>,
    ignored: Vec<(Rank, String)>,
    next_seq: u32,
    errors: Vec<QuarryError>,
}

impl<'r, T: Record> TableBuilder<'r, T> {
    pub(crate) fn new(registry: &'r TypeRegistry, options: &'r MappingOptions) -> Self {
        Self {
            registry,
            options,
            name: None,
            without_rowid: false,
            columns: Vec::new(),
            relations: Vec::new(),
            ignored: Vec::new(),
            next_seq: 0,
            errors: Vec::new(),
        }
    }

    pub fn options(&self) -> &MappingOptions {
        self.options
    }

    /// Override the table name.
    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    pub fn without_rowid(&mut self) -> &mut Self {
        self.without_rowid = true;
        self
    }

    fn next_rank(&mut self) -> Rank {
        let rank = (0, self.next_seq);
        self.next_seq += 1;
        rank
    }

    /// Declare a non-null field of type `V`.
    pub fn column<V, G, S>(&mut self, field: &str, get: G, set: S) -> &mut ColumnSpec<T>
    where
        V: Send + Sync + 'static,
        G: Fn(&T) -> &V + Send + Sync + 'static,
        S: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let get = Arc::new(get);
        let set = Arc::new(set);
        let accessors = self.registry.resolve::<V>().map(|conversion| {
            let (g, s) = (Arc::clone(&get), Arc::clone(&set));
            let sql_type = conversion.sql_type().to_string();
            let encode = conversion.clone();
            let owner = field.to_string();
            let getter: TypedGetter<T> = Arc::new(move |record: &T| encode.encode(Some(g(record))));
            let setter: TypedSetter<T> = Arc::new(move |record: &mut T, value: &Value| {
                match conversion.decode(value)? {
                    Some(v) => {
                        s(record, v);
                        Ok(())
                    }
                    None => Err(QuarryError::conversion(format!(
                        "NULL read into non-null field `{owner}`"
                    ))),
                }
            });
            (sql_type, getter, setter)
        });

        let identity = if TypeId::of::<V>() == TypeId::of::<Uuid>() {
            Some(Arc::new(move |record: &mut T| {
                let unset = (get(&*record) as &dyn Any)
                    .downcast_ref::<Uuid>()
                    .is_some_and(|id| id.is_nil());
                unset && assign_fresh_uuid(|fresh: V| set(record, fresh))
            }) as TypedIdentity<T>)
        } else {
            None
        };

        self.push_column::<V>(field, false, accessors, identity)
    }

    /// Declare a nullable field of type `Option<V>`.
    pub fn nullable<V, G, S>(&mut self, field: &str, get: G, set: S) -> &mut ColumnSpec<T>
    where
        V: Send + Sync + 'static,
        G: Fn(&T) -> &Option<V> + Send + Sync + 'static,
        S: Fn(&mut T, Option<V>) + Send + Sync + 'static,
    {
        let get = Arc::new(get);
        let set = Arc::new(set);
        let accessors = self.registry.resolve::<V>().map(|conversion| {
            let (g, s) = (Arc::clone(&get), Arc::clone(&set));
            let sql_type = conversion.sql_type().to_string();
            let encode = conversion.clone();
            let getter: TypedGetter<T> =
                Arc::new(move |record: &T| encode.encode(g(record).as_ref()));
            let setter: TypedSetter<T> = Arc::new(move |record: &mut T, value: &Value| {
                s(record, conversion.decode(value)?);
                Ok(())
            });
            (sql_type, getter, setter)
        });

        let identity = if TypeId::of::<V>() == TypeId::of::<Uuid>() {
            Some(Arc::new(move |record: &mut T| {
                let unset = match get(&*record) {
                    Some(id) => (id as &dyn Any)
                        .downcast_ref::<Uuid>()
                        .is_some_and(|id| id.is_nil()),
                    None => true,
                };
                unset && assign_fresh_uuid(|fresh: V| set(record, Some(fresh)))
            }) as TypedIdentity<T>)
        } else {
            None
        };

        self.push_column::<V>(field, true, accessors, identity)
    }

    fn push_column<V: 'static>(
        &mut self,
        field: &str,
        nullable: bool,
        accessors: Result<(String, TypedGetter<T>, TypedSetter<T>)>,
        identity: Option<TypedIdentity<T>>,
    ) -> &mut ColumnSpec<T> {
        let (sql_type, get, set) = match accessors {
            Ok(accessors) => accessors,
            Err(err) => {
                self.errors.push(err);
                let name = std::any::type_name::<V>();
                let get: TypedGetter<T> =
                    Arc::new(move |_: &T| Err(QuarryError::UnknownType(name.to_string())));
                let set: TypedSetter<T> = Arc::new(move |_: &mut T, _: &Value| {
                    Err(QuarryError::UnknownType(name.to_string()))
                });
                (String::new(), get, set)
            }
        };
        let rank = self.next_rank();
        self.columns.push(ColumnSpec {
            rank,
            field: field.to_string(),
            name: None,
            value_type: TypeKey::of::<V>(),
            sql_type,
            nullable,
            primary_key: false,
            auto_increment: false,
            max_length: None,
            collation: None,
            default: None,
            indexes: SmallVec::new(),
            references: None,
            action: None,
            ignored: false,
            get,
            set,
            identity,
        });
        let last = self.columns.len() - 1;
        &mut self.columns[last]
    }

    /// Exclude a field, including one inherited from a base.
    pub fn ignore(&mut self, field: &str) -> &mut Self {
        let rank = self.next_rank();
        self.ignored.push((rank, field.to_string()));
        self
    }

    /// Declare a field holding the ordered identifiers of related records.
    pub fn many_to_many<K, G, S>(&mut self, field: &str, get: G, set: S) -> &mut RelationSpec<T>
    where
        K: Send + Sync + 'static,
        G: Fn(&T) -> &Vec<K> + Send + Sync + 'static,
        S: Fn(&mut T, Vec<K>) + Send + Sync + 'static,
    {
        let owner = field.to_string();
        let accessors = self.registry.resolve::<K>().map(move |conversion| {
            let encode = conversion.clone();
            let getter: TypedSeqGetter<T> = Arc::new(move |record: &T| {
                get(record)
                    .iter()
                    .map(|id| encode.encode(Some(id)))
                    .collect::<Result<Vec<Value>>>()
            });
            let setter: TypedSeqSetter<T> = Arc::new(move |record: &mut T, ids: Vec<Value>| {
                let decoded = ids
                    .iter()
                    .map(|id| {
                        conversion.decode(id)?.ok_or_else(|| {
                            QuarryError::conversion(format!(
                                "NULL identifier in relationship `{owner}`"
                            ))
                        })
                    })
                    .collect::<Result<Vec<K>>>()?;
                set(record, decoded);
                Ok(())
            });
            (getter, setter)
        });
        let (get, set) = match accessors {
            Ok(accessors) => accessors,
            Err(err) => {
                self.errors.push(err);
                let name = std::any::type_name::<K>();
                let getter: TypedSeqGetter<T> =
                    Arc::new(move |_: &T| Err(QuarryError::UnknownType(name.to_string())));
                let setter: TypedSeqSetter<T> = Arc::new(move |_: &mut T, _: Vec<Value>| {
                    Err(QuarryError::UnknownType(name.to_string()))
                });
                (getter, setter)
            }
        };
        let rank = self.next_rank();
        self.relations.push(RelationSpec {
            rank,
            field: field.to_string(),
            element: TypeKey::of::<K>(),
            target: None,
            junction: None,
            this_key: None,
            other_key: None,
            order: None,
            get,
            set,
        });
        let last = self.relations.len() - 1;
        &mut self.relations[last]
    }

    /// Append the fields of an embedded base record after this record's own.
    pub fn inherit<B, P, M>(&mut self, project: P, project_mut: M) -> &mut Self
    where
        B: Record,
        P: Fn(&T) -> &B + Send + Sync + 'static,
        M: Fn(&mut T) -> &mut B + Send + Sync + 'static,
    {
        let mut base = TableBuilder::<B>::new(self.registry, self.options);
        B::describe(&mut base);
        self.errors.append(&mut base.errors);

        let project: Arc<dyn Fn(&T) -> &B + Send + Sync> = Arc::new(project);
        let project_mut: Arc<dyn Fn(&mut T) -> &mut B + Send + Sync> = Arc::new(project_mut);
        let offset = self.next_seq;
        self.next_seq += base.next_seq;

        for spec in base.columns {
            let spec = spec.project(1, offset, Arc::clone(&project), Arc::clone(&project_mut));
            self.columns.push(spec);
        }
        for spec in base.relations {
            let spec = spec.project(1, offset, Arc::clone(&project), Arc::clone(&project_mut));
            self.relations.push(spec);
        }
        for ((depth, seq), field) in base.ignored {
            self.ignored.push(((depth + 1, seq + offset), field));
        }
        self
    }

    pub(crate) fn finish(self, id: TableId) -> Result<TableDescriptor> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }
        let options = self.options;
        let table_name = self.name.unwrap_or_else(default_table_name::<T>);

        enum Slot<T> {
            Column(ColumnSpec<T>),
            Relation(RelationSpec<T>),
            Ignored,
        }

        let mut slots: Vec<(Rank, String, Slot<T>)> = Vec::new();
        for spec in self.columns {
            let (rank, field) = (spec.rank, spec.field.clone());
            let slot = if spec.ignored {
                Slot::Ignored
            } else {
                Slot::Column(spec)
            };
            slots.push((rank, field, slot));
        }
        for spec in self.relations {
            slots.push((spec.rank, spec.field.clone(), Slot::Relation(spec)));
        }
        for (rank, field) in self.ignored {
            slots.push((rank, field, Slot::Ignored));
        }
        slots.sort_by_key(|(rank, _, _)| *rank);

        let mut seen = HashSet::new();
        let mut specs = Vec::new();
        let mut relation_specs = Vec::new();
        for (_, field, slot) in slots {
            if !seen.insert(field) {
                continue;
            }
            match slot {
                Slot::Column(spec) => specs.push(spec),
                Slot::Relation(spec) => relation_specs.push(spec),
                Slot::Ignored => {}
            }
        }

        let explicit_key = specs.iter().any(|spec| spec.primary_key);
        let mut columns = Vec::with_capacity(specs.len());
        let mut storage_names = HashSet::new();
        for spec in specs {
            let column = build_column(spec, options, explicit_key, &table_name)?;
            if !storage_names.insert(column.name.to_ascii_lowercase()) {
                return Err(QuarryError::configuration(format!(
                    "table `{table_name}` maps two fields to column `{}`",
                    column.name
                )));
            }
            columns.push(column);
        }

        let mut keys = columns.iter().enumerate().filter(|(_, c)| c.primary_key);
        let primary_key = keys.next().map(|(i, _)| i);
        if keys.next().is_some() {
            return Err(QuarryError::configuration(format!(
                "table `{table_name}` declares more than one primary key"
            )));
        }
        if columns.is_empty() {
            return Err(QuarryError::configuration(format!(
                "table `{table_name}` has no persisted columns"
            )));
        }
        if self.without_rowid && columns.iter().any(|c| c.auto_increment) {
            return Err(QuarryError::configuration(format!(
                "table `{table_name}` is WITHOUT ROWID and cannot use AUTOINCREMENT"
            )));
        }
        if self.without_rowid && primary_key.is_none() {
            return Err(QuarryError::configuration(format!(
                "table `{table_name}` is WITHOUT ROWID but has no primary key"
            )));
        }

        let relationships = relation_specs
            .into_iter()
            .map(|spec| build_relation(spec, options, &table_name))
            .collect::<Result<Vec<_>>>()?;

        let insert_columns = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.auto_increment)
            .map(|(i, _)| i)
            .collect();

        let mut table = TableDescriptor {
            id,
            name: table_name,
            record_type: TypeKey::of::<T>(),
            columns,
            primary_key,
            insert_columns,
            relationships,
            without_rowid: self.without_rowid,
            instantiate: instantiate::<T>,
            create_sql: String::new(),
            primary_key_select_sql: String::new(),
        };
        table.primary_key_select_sql = sql::primary_key_select_sql(&table);
        Ok(table)
    }
}

fn assign_fresh_uuid<V: 'static>(assign: impl FnOnce(V)) -> bool {
    match (Box::new(Uuid::new_v4()) as Box<dyn Any>).downcast::<V>() {
        Ok(fresh) => {
            assign(*fresh);
            true
        }
        Err(_) => false,
    }
}

fn instantiate<T: Record>() -> Box<dyn Any> {
    Box::new(T::default())
}

fn downcast_ref<T: 'static>(record: &dyn Any) -> Result<&T> {
    record.downcast_ref::<T>().ok_or(QuarryError::TypeMismatch {
        expected: std::any::type_name::<T>(),
    })
}

fn downcast_mut<T: 'static>(record: &mut dyn Any) -> Result<&mut T> {
    record.downcast_mut::<T>().ok_or(QuarryError::TypeMismatch {
        expected: std::any::type_name::<T>(),
    })
}

fn is_valid_collation(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn build_column<T: 'static>(
    spec: ColumnSpec<T>,
    options: &MappingOptions,
    explicit_key: bool,
    table: &str,
) -> Result<ColumnDescriptor> {
    let name = spec.name.clone().unwrap_or_else(|| spec.field.clone());
    let primary_key =
        spec.primary_key || (!explicit_key && options.is_conventional_key(&spec.field));

    if primary_key && spec.nullable {
        return Err(QuarryError::configuration(format!(
            "primary key `{table}.{}` cannot be nullable",
            spec.field
        )));
    }

    let integer = spec.sql_type.eq_ignore_ascii_case("INTEGER");
    let identifier = spec.value_type.is::<Uuid>();
    let implicit_counter =
        primary_key && options.implicit_auto_increment && (integer || identifier);
    let wants_counter = spec.auto_increment || implicit_counter;
    let auto_identity = wants_counter && identifier;
    let auto_increment = wants_counter && !identifier;

    if auto_increment && !primary_key {
        return Err(QuarryError::configuration(format!(
            "auto-increment column `{table}.{}` must be the primary key",
            spec.field
        )));
    }
    if auto_increment && !integer {
        return Err(QuarryError::configuration(format!(
            "auto-increment column `{table}.{}` must have type INTEGER, not {}",
            spec.field, spec.sql_type
        )));
    }
    if let Some(collation) = &spec.collation
        && !is_valid_collation(collation)
    {
        return Err(QuarryError::configuration(format!(
            "invalid collation `{collation}` on `{table}.{}`",
            spec.field
        )));
    }

    let sql_type = match spec.max_length {
        Some(length) if spec.sql_type.eq_ignore_ascii_case("TEXT") => format!("VARCHAR({length})"),
        _ => spec.sql_type.clone(),
    };

    let mut indexes = spec.indexes;
    if indexes.is_empty()
        && options.implicit_index
        && !primary_key
        && options.is_conventional_foreign_key(&name)
    {
        indexes.push(IndexSpec::default());
    }

    let foreign_key = spec.references.map(|(target_type, target_field)| ForeignKey {
        target_type,
        target_field,
        action: spec.action,
        target: None,
    });

    let get = spec.get;
    let set = spec.set;
    let getter: Getter = Arc::new(move |record: &dyn Any| get(downcast_ref::<T>(record)?));
    let setter: Setter = Arc::new(move |record: &mut dyn Any, value: &Value| {
        set(downcast_mut::<T>(record)?, value)
    });
    let identity: Option<IdentityFn> = spec.identity.map(|identity| {
        Arc::new(move |record: &mut dyn Any| {
            Ok(identity(downcast_mut::<T>(record)?))
        }) as IdentityFn
    });

    Ok(ColumnDescriptor {
        name,
        field: spec.field,
        value_type: spec.value_type,
        sql_type,
        primary_key,
        auto_increment,
        auto_identity,
        nullable: spec.nullable,
        max_length: spec.max_length,
        collation: spec.collation,
        default: spec.default,
        indexes,
        foreign_key,
        get: getter,
        set: setter,
        identity,
    })
}

fn build_relation<T: 'static>(
    spec: RelationSpec<T>,
    options: &MappingOptions,
    table: &str,
) -> Result<ManyToManyDescriptor> {
    let (Some(target), Some(junction)) = (spec.target, spec.junction) else {
        return Err(QuarryError::configuration(format!(
            "many-to-many field `{table}.{}` needs both a target and a junction type",
            spec.field
        )));
    };
    let suffix = &options.foreign_key_suffix;
    let this_key_field = spec
        .this_key
        .unwrap_or_else(|| format!("{}{suffix}", bare_type_name(std::any::type_name::<T>())));
    let other_key_field = spec
        .other_key
        .unwrap_or_else(|| format!("{}{suffix}", bare_type_name(target.name())));

    let get = spec.get;
    let set = spec.set;
    Ok(ManyToManyDescriptor {
        field: spec.field,
        target,
        junction,
        element: spec.element,
        this_key_field,
        other_key_field,
        order_field: spec.order,
        wiring: None,
        get: Arc::new(move |record: &dyn Any| get(downcast_ref::<T>(record)?)),
        set: Arc::new(move |record: &mut dyn Any, ids: Vec<Value>| {
            set(downcast_mut::<T>(record)?, ids)
        }),
    })
}

/// Default table name: the bare type name, with generic arguments concatenated.
///
/// `app::model::Page<app::model::Note>` becomes `PageNote`.
pub fn default_table_name<T: 'static>() -> String {
    bare_type_name(std::any::type_name::<T>())
}

fn bare_type_name(full: &str) -> String {
    full.split(|c: char| matches!(c, '<' | '>' | ',' | '(' | ')' | '[' | ']' | ';' | '&' | ' '))
        .filter(|segment| !segment.is_empty())
        .filter_map(|segment| segment.rsplit("::").next())
        .filter(|segment| !segment.is_empty() && *segment != "mut" && *segment != "dyn")
        .collect()
}

// =============================================================================
// Descriptors
// =============================================================================

/// Resolved targets of a many-to-many relationship, set by the wiring pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationWiring {
    pub target_table: TableId,
    pub target_table_name: String,
    pub junction_table: TableId,
    pub this_key: usize,
    pub other_key: usize,
    pub order: Option<usize>,
}

/// A field holding identifiers of related records, persisted through a junction table.
#[derive(Clone)]
pub struct ManyToManyDescriptor {
    pub(crate) field: String,
    pub(crate) target: TypeKey,
    pub(crate) junction: TypeKey,
    pub(crate) element: TypeKey,
    pub(crate) this_key_field: String,
    pub(crate) other_key_field: String,
    pub(crate) order_field: Option<String>,
    pub(crate) wiring: Option<RelationWiring>,
    get: SeqGetter,
    set: SeqSetter,
}

impl std::fmt::Debug for ManyToManyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManyToManyDescriptor")
            .field("field", &self.field)
            .field("target", &self.target.name())
            .field("junction", &self.junction.name())
            .field("this_key_field", &self.this_key_field)
            .field("other_key_field", &self.other_key_field)
            .field("order_field", &self.order_field)
            .field("wiring", &self.wiring)
            .finish()
    }
}

impl ManyToManyDescriptor {
    /// The owning field
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn target_type(&self) -> TypeKey {
        self.target
    }

    pub fn junction_type(&self) -> TypeKey {
        self.junction
    }

    /// Type of the identifiers held by the owning field
    pub fn element_type(&self) -> TypeKey {
        self.element
    }

    pub fn this_key_field(&self) -> &str {
        &self.this_key_field
    }

    pub fn other_key_field(&self) -> &str {
        &self.other_key_field
    }

    pub fn order_field(&self) -> Option<&str> {
        self.order_field.as_deref()
    }

    /// Wired targets; only unset on a descriptor that never went through a `Schema`.
    pub fn wiring(&self) -> Result<&RelationWiring> {
        self.wiring.as_ref().ok_or_else(|| {
            QuarryError::configuration(format!("relationship `{}` used before wiring", self.field))
        })
    }

    /// Encoded identifiers currently held by `record`, in order.
    pub fn identifiers(&self, record: &dyn Any) -> Result<Vec<Value>> {
        (self.get)(record)
    }

    pub fn assign_identifiers(&self, record: &mut dyn Any, ids: Vec<Value>) -> Result<()> {
        (self.set)(record, ids)
    }
}

/// Schema of one record type's table.
#[derive(Clone)]
pub struct TableDescriptor {
    pub(crate) id: TableId,
    pub(crate) name: String,
    pub(crate) record_type: TypeKey,
    pub(crate) columns: Vec<ColumnDescriptor>,
    pub(crate) primary_key: Option<usize>,
    pub(crate) insert_columns: Vec<usize>,
    pub(crate) relationships: Vec<ManyToManyDescriptor>,
    pub(crate) without_rowid: bool,
    pub(crate) instantiate: fn() -> Box<dyn Any>,
    pub(crate) create_sql: String,
    pub(crate) primary_key_select_sql: String,
}

impl std::fmt::Debug for TableDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableDescriptor")
            .field("name", &self.name)
            .field("record_type", &self.record_type.name())
            .field("columns", &self.columns)
            .field("primary_key", &self.primary_key)
            .field("relationships", &self.relationships)
            .field("without_rowid", &self.without_rowid)
            .finish()
    }
}

impl TableDescriptor {
    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_type(&self) -> TypeKey {
        self.record_type
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&ColumnDescriptor> {
        self.columns.get(index)
    }

    pub fn column_index_by_field(&self, field: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.field == field)
    }

    pub fn column_by_field(&self, field: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.field == field)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn primary_key(&self) -> Option<&ColumnDescriptor> {
        self.primary_key.and_then(|i| self.columns.get(i))
    }

    pub fn primary_key_index(&self) -> Option<usize> {
        self.primary_key
    }

    /// Columns bound by INSERT: every column except auto-increment ones.
    pub fn insert_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.insert_columns
            .iter()
            .filter_map(|&i| self.columns.get(i))
    }

    pub fn relationships(&self) -> &[ManyToManyDescriptor] {
        &self.relationships
    }

    pub fn is_without_rowid(&self) -> bool {
        self.without_rowid
    }

    /// CREATE TABLE statement, computed once the table is wired.
    pub fn create_sql(&self) -> &str {
        &self.create_sql
    }

    /// Lookup by primary key, or a single arbitrary row for key-less tables.
    pub fn primary_key_select_sql(&self) -> &str {
        &self.primary_key_select_sql
    }

    /// A default-constructed record of this table's type.
    pub fn instantiate(&self) -> Box<dyn Any> {
        (self.instantiate)()
    }
}
