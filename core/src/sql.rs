//! Deterministic SQL text for wired table descriptors.
//!
//! Identifiers are always double-quoted and values are always bound as `?`
//! parameters; the only literals ever embedded are column defaults, which are
//! quoted and escaped.

use crate::column::ColumnDescriptor;
use crate::table::{RelationWiring, TableDescriptor};

/// Quote an identifier, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('"');
    for c in name.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Quote a string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// The SQL type a column is declared with.
pub fn sql_type_for(column: &ColumnDescriptor) -> &str {
    column.sql_type()
}

fn column_list<'a>(columns: impl IntoIterator<Item = &'a ColumnDescriptor>) -> String {
    columns
        .into_iter()
        .map(|c| quote_identifier(c.name()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// One column definition inside CREATE TABLE.
///
/// The SQL type is written bare (`VARCHAR(36)`, not `"VARCHAR(36)"`) so SQLite
/// derives the column affinity from it, and the default is a single-quoted
/// string literal since a double-quoted token would be read as an identifier.
pub fn column_declaration(column: &ColumnDescriptor) -> String {
    let mut decl = format!("{} {}", quote_identifier(column.name()), column.sql_type());
    if column.is_primary_key() {
        decl.push_str(" PRIMARY KEY");
        if column.is_auto_increment() {
            decl.push_str(" AUTOINCREMENT");
        }
    }
    if !column.is_nullable() {
        decl.push_str(" NOT NULL");
    }
    if let Some(collation) = column.collation() {
        decl.push_str(" COLLATE ");
        decl.push_str(collation);
    }
    if let Some(target) = column.foreign_key().and_then(|fk| fk.target()) {
        decl.push_str(&format!(
            " REFERENCES {} ({})",
            quote_identifier(&target.table_name),
            quote_identifier(&target.column_name)
        ));
        if let Some(action) = column.cascade_action() {
            let action = action.as_sql();
            decl.push_str(&format!(" ON DELETE {action} ON UPDATE {action}"));
        }
    }
    if let Some(default) = column.default_value() {
        decl.push_str(" DEFAULT ");
        decl.push_str(&quote_literal(default));
    }
    decl
}

fn create_table_named(table: &TableDescriptor, name: &str) -> String {
    let columns = table
        .columns()
        .iter()
        .map(column_declaration)
        .collect::<Vec<_>>()
        .join(", ");
    let mut sql = format!("CREATE TABLE IF NOT EXISTS {} ({columns})", quote_identifier(name));
    if table.is_without_rowid() {
        sql.push_str(" WITHOUT ROWID");
    }
    sql
}

pub fn create_table_sql(table: &TableDescriptor) -> String {
    create_table_named(table, table.name())
}

/// CREATE INDEX statements, one per index name.
///
/// Columns sharing a name form a composite index ordered by their declared
/// order; unnamed indexes are called `<table>_<column>`.
pub fn create_index_sql(table: &TableDescriptor) -> Vec<String> {
    struct Group<'t> {
        name: String,
        unique: bool,
        columns: Vec<(i32, &'t str)>,
    }

    let mut groups: Vec<Group<'_>> = Vec::new();
    for column in table.columns() {
        for index in column.indexes() {
            let name = index
                .name
                .clone()
                .unwrap_or_else(|| format!("{}_{}", table.name(), column.name()));
            match groups.iter_mut().find(|g| g.name == name) {
                Some(group) => {
                    group.unique |= index.unique;
                    group.columns.push((index.order, column.name()));
                }
                None => groups.push(Group {
                    name,
                    unique: index.unique,
                    columns: vec![(index.order, column.name())],
                }),
            }
        }
    }

    groups
        .into_iter()
        .map(|mut group| {
            group.columns.sort_by_key(|(order, _)| *order);
            let columns = group
                .columns
                .iter()
                .map(|(_, name)| quote_identifier(name))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "CREATE {}INDEX IF NOT EXISTS {} ON {} ({columns})",
                if group.unique { "UNIQUE " } else { "" },
                quote_identifier(&group.name),
                quote_identifier(table.name())
            )
        })
        .collect()
}

pub fn drop_table_sql(table: &TableDescriptor) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_identifier(table.name()))
}

/// Name of the scratch table used while rebuilding `table`.
pub fn recreate_scratch_name(table: &TableDescriptor) -> String {
    format!("__quarry_tmp_{}", table.name())
}

/// Literal a new NOT NULL column without a default is filled with when
/// existing rows are copied, picked by the declared type's affinity.
pub fn zero_literal(sql_type: &str) -> &'static str {
    let ty = sql_type.to_ascii_uppercase();
    if ty.contains("INT") {
        "0"
    } else if ty.contains("CHAR") || ty.contains("CLOB") || ty.contains("TEXT") {
        "''"
    } else if ty.is_empty() || ty.contains("BLOB") {
        "x''"
    } else if ty.contains("REAL") || ty.contains("FLOA") || ty.contains("DOUB") {
        "0.0"
    } else {
        "0"
    }
}

/// Rebuild `table` from its descriptor, keeping data in columns that survive.
///
/// `existing_columns` are the column names currently on disk; when empty the
/// table is simply created. Otherwise the rows are copied through a scratch
/// table: create scratch, copy shared columns, drop the old table, create the
/// new one, copy back, drop scratch. Index statements follow.
///
/// Added columns take their DEFAULT, or NULL when nullable. Added NOT NULL
/// columns without a default get [`zero_literal`] for their type.
pub fn recreate_table_sql(table: &TableDescriptor, existing_columns: &[String]) -> Vec<String> {
    let mut statements = Vec::new();
    if existing_columns.is_empty() {
        statements.push(create_table_sql(table));
        statements.extend(create_index_sql(table));
        return statements;
    }

    let exists = |c: &ColumnDescriptor| {
        existing_columns
            .iter()
            .any(|e| e.eq_ignore_ascii_case(c.name()))
    };
    let shared: Vec<&ColumnDescriptor> = table.columns().iter().filter(|c| exists(*c)).collect();
    let filled: Vec<&ColumnDescriptor> = table
        .columns()
        .iter()
        .filter(|c| {
            !exists(*c) && !c.is_nullable() && !c.is_auto_increment() && c.default_value().is_none()
        })
        .collect();

    let scratch_name = recreate_scratch_name(table);
    let scratch = quote_identifier(&scratch_name);
    let target = quote_identifier(table.name());
    let copied = column_list(shared.iter().chain(&filled).copied());
    let selected = shared
        .iter()
        .map(|c| quote_identifier(c.name()))
        .chain(filled.iter().map(|c| zero_literal(c.sql_type()).into()))
        .collect::<Vec<_>>()
        .join(", ");

    statements.push(create_table_named(table, &scratch_name));
    if !shared.is_empty() {
        statements.push(format!(
            "INSERT INTO {scratch} ({copied}) SELECT {selected} FROM {target}"
        ));
    }
    statements.push(format!("DROP TABLE {target}"));
    statements.push(create_table_sql(table));
    if !shared.is_empty() {
        statements.push(format!(
            "INSERT INTO {target} ({copied}) SELECT {copied} FROM {scratch}"
        ));
    }
    statements.push(format!("DROP TABLE {scratch}"));
    statements.extend(create_index_sql(table));
    statements
}

/// Lookup by primary key; without one, a single arbitrary row.
pub fn primary_key_select_sql(table: &TableDescriptor) -> String {
    let columns = column_list(table.columns());
    let name = quote_identifier(table.name());
    match table.primary_key() {
        Some(pk) => format!(
            "SELECT {columns} FROM {name} WHERE {} = ?",
            quote_identifier(pk.name())
        ),
        None => format!("SELECT {columns} FROM {name} LIMIT 1"),
    }
}

pub fn select_all_sql(table: &TableDescriptor) -> String {
    format!(
        "SELECT {} FROM {}",
        column_list(table.columns()),
        quote_identifier(table.name())
    )
}

/// INSERT binding the insert columns, or every column for OR REPLACE.
///
/// Parameters follow [`TableDescriptor::insert_columns`] (or `columns` when
/// replacing).
pub fn insert_sql(table: &TableDescriptor, or_replace: bool) -> String {
    let verb = if or_replace {
        "INSERT OR REPLACE"
    } else {
        "INSERT"
    };
    let name = quote_identifier(table.name());
    let columns: Vec<&ColumnDescriptor> = if or_replace {
        table.columns().iter().collect()
    } else {
        table.insert_columns().collect()
    };
    if columns.is_empty() {
        return format!("{verb} INTO {name} DEFAULT VALUES");
    }
    format!(
        "{verb} INTO {name} ({}) VALUES ({})",
        column_list(columns.iter().copied()),
        placeholders(columns.len())
    )
}

/// UPDATE of every non-key column, keyed by the primary key (bound last).
///
/// `None` when the table has no primary key or nothing besides it.
pub fn update_sql(table: &TableDescriptor) -> Option<String> {
    let pk = table.primary_key()?;
    let assignments = table
        .columns()
        .iter()
        .filter(|c| !c.is_primary_key())
        .map(|c| format!("{} = ?", quote_identifier(c.name())))
        .collect::<Vec<_>>();
    if assignments.is_empty() {
        return None;
    }
    Some(format!(
        "UPDATE {} SET {} WHERE {} = ?",
        quote_identifier(table.name()),
        assignments.join(", "),
        quote_identifier(pk.name())
    ))
}

pub fn delete_sql(table: &TableDescriptor) -> Option<String> {
    let pk = table.primary_key()?;
    Some(format!(
        "DELETE FROM {} WHERE {} = ?",
        quote_identifier(table.name()),
        quote_identifier(pk.name())
    ))
}

fn junction_column(junction: &TableDescriptor, index: usize) -> String {
    junction
        .column(index)
        .map(|c| quote_identifier(c.name()))
        .unwrap_or_default()
}

/// Related identifiers for one owner, in stored order when an order column exists.
pub fn junction_select_sql(junction: &TableDescriptor, wiring: &RelationWiring) -> String {
    let mut sql = format!(
        "SELECT {} FROM {} WHERE {} = ?",
        junction_column(junction, wiring.other_key),
        quote_identifier(junction.name()),
        junction_column(junction, wiring.this_key)
    );
    if let Some(order) = wiring.order {
        sql.push_str(&format!(" ORDER BY {}", junction_column(junction, order)));
    }
    sql
}

pub fn junction_delete_sql(junction: &TableDescriptor, wiring: &RelationWiring) -> String {
    format!(
        "DELETE FROM {} WHERE {} = ?",
        quote_identifier(junction.name()),
        junction_column(junction, wiring.this_key)
    )
}

/// Junction rows are ordinary records of the junction table.
pub fn junction_insert_sql(junction: &TableDescriptor) -> String {
    insert_sql(junction, false)
}
