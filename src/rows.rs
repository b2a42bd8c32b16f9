//! Statement execution shared by [`Database`](crate::Database) and upgrade contexts.
//!
//! Everything here takes a plain `&Connection`, so it runs the same inside or
//! outside a transaction.

use std::any::Any;

use quarry_core::{
    ColumnDescriptor, ParamSink, QuarryError, Record, Result, RowSource, TableDescriptor, Value,
    quarry_trace_query, sql,
};
use rusqlite::Connection;

/// Run `sql` with positional parameters.
pub(crate) fn execute(conn: &Connection, sql: &str, params: &[Value]) -> Result<usize> {
    quarry_trace_query!(sql, params.len());
    let mut stmt = conn.prepare_cached(sql)?;
    for (index, value) in params.iter().enumerate() {
        stmt.bind_value(index, value.clone())?;
    }
    Ok(stmt.raw_execute()?)
}

/// Run a parameterless batch (DDL, pragmas).
pub(crate) fn execute_batch(conn: &Connection, sql: &str) -> Result<()> {
    quarry_trace_query!(sql, 0);
    conn.execute_batch(sql)?;
    Ok(())
}

/// Rows of `sql` decoded column by column into fresh values.
pub(crate) fn query_values(
    conn: &Connection,
    sql: &str,
    params: &[Value],
) -> Result<Vec<Vec<Value>>> {
    quarry_trace_query!(sql, params.len());
    let mut stmt = conn.prepare_cached(sql)?;
    for (index, value) in params.iter().enumerate() {
        stmt.bind_value(index, value.clone())?;
    }
    let width = stmt.column_count();
    let mut rows = stmt.raw_query();
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let values = (0..width)
            .map(|i| row.column_value(i))
            .collect::<Result<Vec<_>>>()?;
        out.push(values);
    }
    Ok(out)
}

/// Records of `table` selected by `sql`, whose result columns must follow the
/// table's column order.
pub(crate) fn query_records<T: Record>(
    conn: &Connection,
    table: &TableDescriptor,
    sql: &str,
    params: &[Value],
) -> Result<Vec<T>> {
    quarry_trace_query!(sql, params.len());
    let mut stmt = conn.prepare_cached(sql)?;
    for (index, value) in params.iter().enumerate() {
        stmt.bind_value(index, value.clone())?;
    }
    let mut rows = stmt.raw_query();
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = T::default();
        for (index, column) in table.columns().iter().enumerate() {
            column.read(&mut record, row, index)?;
        }
        out.push(record);
    }
    Ok(out)
}

/// Insert one record, assigning a generated identity first and writing the
/// engine's row id back into an auto-increment key afterwards.
pub(crate) fn insert(
    conn: &Connection,
    table: &TableDescriptor,
    record: &mut dyn Any,
    or_replace: bool,
) -> Result<usize> {
    for column in table.columns() {
        column.ensure_identity(record)?;
    }

    let columns: Vec<&ColumnDescriptor> = if or_replace {
        table.columns().iter().collect()
    } else {
        table.insert_columns().collect()
    };
    let sql = sql::insert_sql(table, or_replace);
    quarry_trace_query!(sql, columns.len());

    let mut stmt = conn.prepare_cached(&sql)?;
    for (index, column) in columns.iter().enumerate() {
        column.write(&*record, &mut *stmt, index)?;
    }
    let count = stmt.raw_execute()?;

    if let Some(pk) = table.primary_key()
        && pk.is_auto_increment()
    {
        pk.assign(record, &Value::Integer(conn.last_insert_rowid()))?;
    }
    Ok(count)
}

fn require_key<'t>(table: &'t TableDescriptor, operation: &str) -> Result<&'t ColumnDescriptor> {
    table.primary_key().ok_or_else(|| {
        QuarryError::configuration(format!(
            "cannot {operation} rows of `{}`: it has no primary key",
            table.name()
        ))
    })
}

/// Update every non-key column of the row keyed by `record`'s primary key.
pub(crate) fn update(
    conn: &Connection,
    table: &TableDescriptor,
    record: &dyn Any,
) -> Result<usize> {
    let pk = require_key(table, "update")?;
    let Some(sql) = sql::update_sql(table) else {
        return Ok(0);
    };
    let mut params = table
        .columns()
        .iter()
        .filter(|c| !c.is_primary_key())
        .map(|c| c.value_of(record))
        .collect::<Result<Vec<_>>>()?;
    params.push(pk.value_of(record)?);
    execute(conn, &sql, &params)
}

pub(crate) fn delete_by_key(
    conn: &Connection,
    table: &TableDescriptor,
    key: Value,
) -> Result<usize> {
    require_key(table, "delete")?;
    match sql::delete_sql(table) {
        Some(sql) => execute(conn, &sql, &[key]),
        None => Ok(0),
    }
}

pub(crate) fn delete(
    conn: &Connection,
    table: &TableDescriptor,
    record: &dyn Any,
) -> Result<usize> {
    let key = require_key(table, "delete")?.value_of(record)?;
    delete_by_key(conn, table, key)
}

/// The row keyed by `key`; on a table without a primary key, an arbitrary row.
pub(crate) fn find<T: Record>(
    conn: &Connection,
    table: &TableDescriptor,
    key: Value,
) -> Result<Option<T>> {
    let params = if table.primary_key().is_some() {
        vec![key]
    } else {
        Vec::new()
    };
    let found = query_records::<T>(conn, table, table.primary_key_select_sql(), &params)?;
    Ok(found.into_iter().next())
}

/// Column names of `table` as stored on disk; empty when the table does not exist.
pub(crate) fn stored_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    query_values(
        conn,
        "SELECT name FROM pragma_table_info(?)",
        &[Value::Text(table.to_string())],
    )?
    .into_iter()
    .map(|row| match row.into_iter().next() {
        Some(Value::Text(name)) => Ok(name),
        other => Err(QuarryError::conversion(format!(
            "unexpected table_info name {other:?}"
        ))),
    })
    .collect()
}

/// Create `table` and its indexes if missing.
pub(crate) fn create_table(conn: &Connection, table: &TableDescriptor) -> Result<()> {
    execute_batch(conn, table.create_sql())?;
    for statement in sql::create_index_sql(table) {
        execute_batch(conn, &statement)?;
    }
    Ok(())
}

/// Rebuild `table` from its descriptor, keeping surviving columns.
pub(crate) fn recreate_table(conn: &Connection, table: &TableDescriptor) -> Result<()> {
    let existing = stored_columns(conn, table.name())?;
    for statement in sql::recreate_table_sql(table, &existing) {
        execute_batch(conn, &statement)?;
    }
    Ok(())
}
