//! Many-to-many fields persisted through junction tables.

use std::any::Any;

use quarry_core::{
    ColumnDescriptor, ManyToManyDescriptor, QuarryError, RelationWiring, Result, Schema,
    TableDescriptor, Value, sql,
};
use rusqlite::Connection;

use crate::rows;

struct Junction<'s> {
    table: &'s TableDescriptor,
    wiring: &'s RelationWiring,
}

impl<'s> Junction<'s> {
    fn resolve(schema: &'s Schema, relation: &'s ManyToManyDescriptor) -> Result<Self> {
        let wiring = relation.wiring()?;
        let table = schema.table_by_id(wiring.junction_table).ok_or_else(|| {
            QuarryError::configuration(format!(
                "junction table for `{}` is not part of this schema",
                relation.field()
            ))
        })?;
        Ok(Self { table, wiring })
    }

    fn column(&self, index: usize) -> Result<&'s ColumnDescriptor> {
        self.table.column(index).ok_or_else(|| {
            QuarryError::configuration(format!(
                "junction `{}` has no column #{index}",
                self.table.name()
            ))
        })
    }
}

fn owner_key(table: &TableDescriptor, record: &dyn Any) -> Result<Option<Value>> {
    if table.relationships().is_empty() {
        return Ok(None);
    }
    let pk = table.primary_key().ok_or_else(|| {
        QuarryError::configuration(format!(
            "`{}` has relationships but no primary key",
            table.name()
        ))
    })?;
    pk.value_of(record).map(Some)
}

/// Fill every many-to-many field of `record` from its junction rows.
pub(crate) fn read(
    conn: &Connection,
    schema: &Schema,
    table: &TableDescriptor,
    record: &mut dyn Any,
) -> Result<()> {
    let Some(owner) = owner_key(table, &*record)? else {
        return Ok(());
    };
    for relation in table.relationships() {
        let junction = Junction::resolve(schema, relation)?;
        let select = sql::junction_select_sql(junction.table, junction.wiring);
        let ids = rows::query_values(conn, &select, std::slice::from_ref(&owner))?
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect();
        relation.assign_identifiers(record, ids)?;
    }
    Ok(())
}

/// Replace the junction rows of every many-to-many field of `record` so they
/// match the field's current identifiers, in order.
pub(crate) fn write(
    conn: &Connection,
    schema: &Schema,
    table: &TableDescriptor,
    record: &dyn Any,
) -> Result<()> {
    let Some(owner) = owner_key(table, record)? else {
        return Ok(());
    };
    for relation in table.relationships() {
        let junction = Junction::resolve(schema, relation)?;
        let this_key = junction.column(junction.wiring.this_key)?;
        let other_key = junction.column(junction.wiring.other_key)?;
        let order = junction
            .wiring
            .order
            .map(|i| junction.column(i))
            .transpose()?;

        let ids = relation.identifiers(record)?;
        rows::execute(
            conn,
            &sql::junction_delete_sql(junction.table, junction.wiring),
            std::slice::from_ref(&owner),
        )?;

        for (position, id) in ids.iter().enumerate() {
            let mut row = junction.table.instantiate();
            this_key.assign(&mut *row, &owner)?;
            other_key.assign(&mut *row, id)?;
            if let Some(order) = order {
                order.assign(&mut *row, &Value::Integer(position as i64))?;
            }
            rows::insert(conn, junction.table, &mut *row, false)?;
        }
    }
    Ok(())
}
