//! Build-then-wire schema arena.
//!
//! Tables are described one record type at a time by [`SchemaBuilder::register`];
//! foreign keys and many-to-many relationships may point at types registered
//! later, so they are resolved in a single pass by [`SchemaBuilder::build`].

use std::any::TypeId;

use hashbrown::HashMap;

use crate::column::{ColumnDescriptor, ColumnRef, ForeignKey};
use crate::error::{QuarryError, Result};
use crate::options::MappingOptions;
use crate::registry::{TypeKey, TypeRegistry};
use crate::sql;
use crate::table::{
    ManyToManyDescriptor, Record, RelationWiring, TableBuilder, TableDescriptor, TableId,
};

/// Collects table descriptors before wiring.
#[derive(Debug)]
pub struct SchemaBuilder {
    registry: TypeRegistry,
    options: MappingOptions,
    tables: Vec<TableDescriptor>,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new(TypeRegistry::new(), MappingOptions::default())
    }
}

impl SchemaBuilder {
    pub fn new(registry: TypeRegistry, options: MappingOptions) -> Self {
        Self {
            registry,
            options,
            tables: Vec::new(),
        }
    }

    /// Conversions registered here are visible to every table registered afterwards.
    pub fn registry_mut(&mut self) -> &mut TypeRegistry {
        &mut self.registry
    }

    pub fn options(&self) -> &MappingOptions {
        &self.options
    }

    /// Describe `T` and add its table.
    pub fn register<T: Record>(&mut self) -> Result<&mut Self> {
        if self.tables.iter().any(|t| t.record_type.is::<T>()) {
            return Err(QuarryError::configuration(format!(
                "record type `{}` is registered twice",
                std::any::type_name::<T>()
            )));
        }
        let id = TableId(self.tables.len());
        let mut builder = TableBuilder::<T>::new(&self.registry, &self.options);
        T::describe(&mut builder);
        let table = builder.finish(id)?;
        self.tables.push(table);
        Ok(self)
    }

    /// Resolve every foreign key and relationship, producing an immutable schema.
    pub fn build(self) -> Result<Schema> {
        let SchemaBuilder {
            registry,
            options,
            mut tables,
        } = self;

        let mut names: HashMap<String, &'static str> = HashMap::new();
        for table in &tables {
            if let Some(previous) =
                names.insert(table.name.to_ascii_lowercase(), table.record_type.name())
            {
                return Err(QuarryError::configuration(format!(
                    "table name `{}` is used by both `{previous}` and `{}`",
                    table.name,
                    table.record_type.name()
                )));
            }
        }

        let by_type: HashMap<TypeId, TableId> =
            tables.iter().map(|t| (t.record_type.id(), t.id)).collect();

        let mut column_targets = Vec::new();
        let mut relation_wirings = Vec::new();
        for table in &tables {
            for (index, column) in table.columns.iter().enumerate() {
                if let Some(fk) = &column.foreign_key {
                    let target = resolve_reference(&tables, &by_type, table, column, fk)?;
                    column_targets.push((table.id, index, target));
                }
            }
            for (index, relation) in table.relationships.iter().enumerate() {
                let wiring = resolve_relation(&tables, &by_type, table, relation)?;
                relation_wirings.push((table.id, index, wiring));
            }
        }

        for (table, column, target) in column_targets {
            if let Some(fk) = tables[table.0].columns[column].foreign_key.as_mut() {
                fk.target = Some(target);
            }
        }
        let relationship_count = relation_wirings.len();
        for (table, relation, wiring) in relation_wirings {
            tables[table.0].relationships[relation].wiring = Some(wiring);
        }

        let create: Vec<String> = tables.iter().map(sql::create_table_sql).collect();
        for (table, create_sql) in tables.iter_mut().zip(create) {
            table.create_sql = create_sql;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            tables = tables.len(),
            relationships = relationship_count,
            "quarry.schema.wired"
        );
        #[cfg(not(feature = "tracing"))]
        let _ = relationship_count;

        Ok(Schema {
            registry,
            options,
            tables,
            by_type,
        })
    }
}

fn lookup<'t>(
    tables: &'t [TableDescriptor],
    by_type: &HashMap<TypeId, TableId>,
    key: TypeKey,
) -> Option<&'t TableDescriptor> {
    by_type.get(&key.id()).and_then(|id| tables.get(id.0))
}

fn resolve_reference(
    tables: &[TableDescriptor],
    by_type: &HashMap<TypeId, TableId>,
    table: &TableDescriptor,
    column: &ColumnDescriptor,
    fk: &ForeignKey,
) -> Result<ColumnRef> {
    let target = lookup(tables, by_type, fk.target_type).ok_or_else(|| {
        QuarryError::configuration(format!(
            "`{}.{}` references `{}`, which is not registered",
            table.name,
            column.name,
            fk.target_type.name()
        ))
    })?;
    let index = match &fk.target_field {
        Some(field) => target.column_index_by_field(field).ok_or_else(|| {
            QuarryError::configuration(format!(
                "`{}.{}` references missing field `{}.{field}`",
                table.name, column.name, target.name
            ))
        })?,
        None => target.primary_key.ok_or_else(|| {
            QuarryError::configuration(format!(
                "`{}.{}` references `{}`, which has no primary key; name a target field",
                table.name, column.name, target.name
            ))
        })?,
    };
    Ok(ColumnRef {
        table: target.id,
        column: index,
        table_name: target.name.clone(),
        column_name: target.columns[index].name.clone(),
    })
}

fn resolve_relation(
    tables: &[TableDescriptor],
    by_type: &HashMap<TypeId, TableId>,
    table: &TableDescriptor,
    relation: &ManyToManyDescriptor,
) -> Result<RelationWiring> {
    let missing = |what: &str, key: TypeKey| {
        QuarryError::configuration(format!(
            "relationship `{}.{}` names {what} `{}`, which is not registered",
            table.name,
            relation.field,
            key.name()
        ))
    };
    let target = lookup(tables, by_type, relation.target)
        .ok_or_else(|| missing("target", relation.target))?;
    let junction = lookup(tables, by_type, relation.junction)
        .ok_or_else(|| missing("junction", relation.junction))?;
    let owner_key = table.primary_key().ok_or_else(|| {
        QuarryError::configuration(format!(
            "relationship `{}.{}` needs a primary key on `{}`",
            table.name, relation.field, table.name
        ))
    })?;

    let field_on_junction = |field: &str| {
        junction.column_index_by_field(field).ok_or_else(|| {
            QuarryError::configuration(format!(
                "junction `{}` has no field `{field}` for relationship `{}.{}`",
                junction.name, table.name, relation.field
            ))
        })
    };
    let this_key = field_on_junction(&relation.this_key_field)?;
    let other_key = field_on_junction(&relation.other_key_field)?;
    let order = relation
        .order_field
        .as_deref()
        .map(field_on_junction)
        .transpose()?;

    if junction.columns[this_key].value_type != owner_key.value_type {
        return Err(QuarryError::configuration(format!(
            "junction field `{}.{}` holds `{}` but `{}` is keyed by `{}`",
            junction.name,
            relation.this_key_field,
            junction.columns[this_key].value_type.name(),
            table.name,
            owner_key.value_type.name()
        )));
    }
    if junction.columns[other_key].value_type != relation.element {
        return Err(QuarryError::configuration(format!(
            "junction field `{}.{}` holds `{}` but `{}.{}` holds `{}`",
            junction.name,
            relation.other_key_field,
            junction.columns[other_key].value_type.name(),
            table.name,
            relation.field,
            relation.element.name()
        )));
    }

    Ok(RelationWiring {
        target_table: target.id,
        target_table_name: target.name.clone(),
        junction_table: junction.id,
        this_key,
        other_key,
        order,
    })
}

/// A wired, immutable set of table descriptors.
///
/// Safe to share across threads; nothing in it changes after [`SchemaBuilder::build`].
#[derive(Debug)]
pub struct Schema {
    registry: TypeRegistry,
    options: MappingOptions,
    tables: Vec<TableDescriptor>,
    by_type: HashMap<TypeId, TableId>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn options(&self) -> &MappingOptions {
        &self.options
    }

    /// Tables in registration order.
    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn table<T: Record>(&self) -> Result<&TableDescriptor> {
        self.table_descriptor_for(TypeKey::of::<T>())
    }

    pub fn table_descriptor_for(&self, key: TypeKey) -> Result<&TableDescriptor> {
        lookup(&self.tables, &self.by_type, key).ok_or_else(|| {
            QuarryError::configuration(format!("record type `{}` is not registered", key.name()))
        })
    }

    pub fn table_by_id(&self, id: TableId) -> Option<&TableDescriptor> {
        self.tables.get(id.0)
    }

    pub fn table_by_name(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// The table and column a foreign key points at.
    pub fn column_target(&self, fk: &ForeignKey) -> Option<(&TableDescriptor, &ColumnDescriptor)> {
        let target = fk.target.as_ref()?;
        let table = self.tables.get(target.table.0)?;
        Some((table, table.columns.get(target.column)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ReferentialAction;

    #[derive(Default)]
    struct Author {
        id: i64,
        handle: String,
    }

    impl Record for Author {
        fn describe(t: &mut TableBuilder<'_, Self>) {
            t.column("Id", |r| &r.id, |r, v| r.id = v);
            t.column("Handle", |r| &r.handle, |r, v| r.handle = v).unique();
        }
    }

    #[derive(Default)]
    struct Post {
        id: i64,
        author_id: i64,
        author_handle: String,
    }

    impl Record for Post {
        fn describe(t: &mut TableBuilder<'_, Self>) {
            t.column("Id", |r| &r.id, |r, v| r.id = v);
            t.column("AuthorId", |r| &r.author_id, |r, v| r.author_id = v)
                .references::<Author>()
                .on_cascade(ReferentialAction::Cascade);
            t.column("AuthorHandle", |r| &r.author_handle, |r, v| r.author_handle = v)
                .references_field::<Author>("Handle");
        }
    }

    #[test]
    fn foreign_keys_resolve_in_any_registration_order() {
        let mut builder = Schema::builder();
        builder
            .register::<Post>()
            .unwrap()
            .register::<Author>()
            .unwrap();
        let schema = builder.build().unwrap();

        let post = schema.table::<Post>().unwrap();
        let by_key = post.column_by_field("AuthorId").unwrap().foreign_key().unwrap();
        let (table, column) = schema.column_target(by_key).unwrap();
        assert_eq!(table.name(), "Author");
        assert_eq!(column.name(), "Id");

        let by_field = post.column_by_field("AuthorHandle").unwrap().foreign_key().unwrap();
        assert_eq!(by_field.target().unwrap().column_name, "Handle");
        assert!(
            post.create_sql()
                .contains("REFERENCES \"Author\" (\"Id\") ON DELETE CASCADE ON UPDATE CASCADE")
        );
    }

    #[test]
    fn unregistered_reference_target_is_a_configuration_error() {
        let mut builder = Schema::builder();
        builder.register::<Post>().unwrap();
        assert!(matches!(
            builder.build(),
            Err(QuarryError::Configuration(_))
        ));
    }

    #[derive(Default)]
    struct Keyless {
        label: String,
    }

    impl Record for Keyless {
        fn describe(t: &mut TableBuilder<'_, Self>) {
            t.column("Label", |r| &r.label, |r, v| r.label = v);
        }
    }

    #[derive(Default)]
    struct Pointer {
        id: i64,
        target: String,
    }

    impl Record for Pointer {
        fn describe(t: &mut TableBuilder<'_, Self>) {
            t.column("Id", |r| &r.id, |r, v| r.id = v);
            t.column("Target", |r| &r.target, |r, v| r.target = v).references::<Keyless>();
        }
    }

    #[test]
    fn reference_to_keyless_table_needs_a_field() {
        let mut builder = Schema::builder();
        builder
            .register::<Keyless>()
            .unwrap()
            .register::<Pointer>()
            .unwrap();
        let err = builder.build().unwrap_err();
        assert!(err.to_string().contains("no primary key"));
    }

    #[test]
    fn registering_a_type_twice_fails() {
        let mut builder = Schema::builder();
        builder.register::<Author>().unwrap();
        assert!(matches!(
            builder.register::<Author>(),
            Err(QuarryError::Configuration(_))
        ));
    }

    #[derive(Default)]
    struct Shadow {
        id: i64,
    }

    impl Record for Shadow {
        fn describe(t: &mut TableBuilder<'_, Self>) {
            t.name("author");
            t.column("Id", |r| &r.id, |r, v| r.id = v);
        }
    }

    #[test]
    fn duplicate_table_names_are_rejected() {
        let mut builder = Schema::builder();
        builder
            .register::<Author>()
            .unwrap()
            .register::<Shadow>()
            .unwrap();
        assert!(matches!(
            builder.build(),
            Err(QuarryError::Configuration(_))
        ));
    }
}
