//! Record-to-table mapping core: type conversions, table descriptors,
//! relationship wiring and SQL generation.
//!
//! Nothing in this crate performs I/O. The `rusqlite` feature adds bindings
//! between [`Value`] and the engine's rows, parameters and errors.

pub mod column;
pub mod error;
pub mod options;
pub mod registry;
pub mod schema;
pub mod sql;
pub mod table;
pub mod tracing;
pub mod value;

pub use column::{ColumnDescriptor, ColumnRef, ForeignKey, IndexSpec, ReferentialAction};
pub use error::{QuarryError, Result};
pub use options::MappingOptions;
pub use registry::{EnumStorage, SqlEnum, TypeConversion, TypeKey, TypeRegistry};
pub use schema::{Schema, SchemaBuilder};
pub use table::{
    ColumnSpec, ManyToManyDescriptor, Record, RelationSpec, RelationWiring, TableBuilder,
    TableDescriptor, TableId, default_table_name,
};
pub use value::{ParamSink, RowSource, Value};
