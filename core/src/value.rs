//! Owned on-disk value type and the cursor/statement seams conversions use.

use crate::error::{QuarryError, Result};

/// A column value in one of SQLite's storage classes.
#[derive(Debug, Clone, PartialEq, PartialOrd, Default)]
pub enum Value {
    /// NULL value
    #[default]
    Null,
    /// Integer value (i64)
    Integer(i64),
    /// Real value (f64)
    Real(f64),
    /// Text value
    Text(String),
    /// Blob value
    Blob(Vec<u8>),
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Storage class name, used in conversion errors.
    pub const fn storage_class(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Integer(_) => "INTEGER",
            Value::Real(_) => "REAL",
            Value::Text(_) => "TEXT",
            Value::Blob(_) => "BLOB",
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Blob(b) => {
                let hex: String = b.iter().map(|b| format!("{b:02x}")).collect();
                write!(f, "x'{hex}'")
            }
        }
    }
}

/// A positioned row the engine has stepped to.
///
/// Column indexes are zero-based.
pub trait RowSource {
    fn column_value(&self, index: usize) -> Result<Value>;
}

/// A prepared statement awaiting parameters.
///
/// Parameter indexes are zero-based; engine adapters translate as needed.
pub trait ParamSink {
    fn bind_value(&mut self, index: usize, value: Value) -> Result<()>;
}

impl RowSource for Vec<Value> {
    fn column_value(&self, index: usize) -> Result<Value> {
        self.get(index)
            .cloned()
            .ok_or_else(|| QuarryError::conversion(format!("column index {index} out of range")))
    }
}

impl ParamSink for Vec<Value> {
    fn bind_value(&mut self, index: usize, value: Value) -> Result<()> {
        if self.len() <= index {
            self.resize(index + 1, Value::Null);
        }
        self[index] = value;
        Ok(())
    }
}

//------------------------------------------------------------------------------
// Storage engine bindings
//------------------------------------------------------------------------------

#[cfg(feature = "rusqlite")]
impl rusqlite::ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::{ToSqlOutput, ValueRef};
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(r) => ToSqlOutput::Borrowed(ValueRef::Real(*r)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

#[cfg(feature = "rusqlite")]
impl rusqlite::types::FromSql for Value {
    fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
        Value::try_from(value)
            .map_err(|e| rusqlite::types::FromSqlError::Other(Box::new(e)))
    }
}

#[cfg(feature = "rusqlite")]
impl TryFrom<rusqlite::types::ValueRef<'_>> for Value {
    type Error = QuarryError;

    fn try_from(value: rusqlite::types::ValueRef<'_>) -> Result<Self> {
        use rusqlite::types::ValueRef;
        Ok(match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(r) => Value::Real(r),
            ValueRef::Text(items) => match std::str::from_utf8(items) {
                Ok(text) => Value::Text(text.to_owned()),
                Err(e) => return Err(QuarryError::conversion(format!("TEXT is not UTF-8: {e}"))),
            },
            ValueRef::Blob(items) => Value::Blob(items.to_vec()),
        })
    }
}

#[cfg(feature = "rusqlite")]
impl RowSource for rusqlite::Row<'_> {
    fn column_value(&self, index: usize) -> Result<Value> {
        Value::try_from(self.get_ref(index)?)
    }
}

#[cfg(feature = "rusqlite")]
impl ParamSink for rusqlite::Statement<'_> {
    fn bind_value(&mut self, index: usize, value: Value) -> Result<()> {
        self.raw_bind_parameter(index + 1, value)?;
        Ok(())
    }
}
