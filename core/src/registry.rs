//! Type registry: maps Rust value types to a SQL type name plus a reader and writer.
//!
//! Readers and writers only ever see non-NULL values. [`TypeConversion::read`] and
//! [`TypeConversion::write`] wrap them so that a NULL column becomes `None` and
//! `None` is written as NULL.

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::sync::Arc;

use hashbrown::HashMap;
use uuid::Uuid;

use crate::error::{QuarryError, Result};
use crate::value::{ParamSink, RowSource, Value};

/// Identity of a Rust type, compared by `TypeId` and carrying its name for messages.
#[derive(Clone, Copy, Debug)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl std::hash::Hash for TypeKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

type Reader<V> = Arc<dyn Fn(&Value) -> Result<V> + Send + Sync>;
type Writer<V> = Arc<dyn Fn(&V) -> Result<Value> + Send + Sync>;

/// Conversion between a value type `V` and its on-disk encoding.
pub struct TypeConversion<V> {
    sql_type: Cow<'static, str>,
    reader: Reader<V>,
    writer: Writer<V>,
}

impl<V> Clone for TypeConversion<V> {
    fn clone(&self) -> Self {
        Self {
            sql_type: self.sql_type.clone(),
            reader: Arc::clone(&self.reader),
            writer: Arc::clone(&self.writer),
        }
    }
}

impl<V> std::fmt::Debug for TypeConversion<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeConversion")
            .field("sql_type", &self.sql_type)
            .field("type", &std::any::type_name::<V>())
            .finish()
    }
}

impl<V> TypeConversion<V> {
    pub fn sql_type(&self) -> &str {
        &self.sql_type
    }

    /// Decode an owned value; NULL yields `None`.
    pub fn decode(&self, value: &Value) -> Result<Option<V>> {
        if value.is_null() {
            return Ok(None);
        }
        (self.reader)(value).map(Some)
    }

    /// Encode a value; `None` yields NULL.
    pub fn encode(&self, value: Option<&V>) -> Result<Value> {
        match value {
            Some(value) => (self.writer)(value),
            None => Ok(Value::Null),
        }
    }

    pub fn read(&self, row: &dyn RowSource, index: usize) -> Result<Option<V>> {
        self.decode(&row.column_value(index)?)
    }

    pub fn write(&self, stmt: &mut dyn ParamSink, index: usize, value: Option<&V>) -> Result<()> {
        stmt.bind_value(index, self.encode(value)?)
    }
}

struct Registered {
    key: TypeKey,
    sql_type: Cow<'static, str>,
    conversion: Arc<dyn Any + Send + Sync>,
}

/// Registry of value conversions for one database configuration.
///
/// Registration takes `&mut self`; once the registry is handed to a
/// [`SchemaBuilder`](crate::SchemaBuilder) it is only read.
pub struct TypeRegistry {
    conversions: HashMap<TypeId, Registered>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut entries: Vec<_> = self
            .conversions
            .values()
            .map(|r| (r.key.name(), r.sql_type.as_ref()))
            .collect();
        entries.sort();
        f.debug_map().entries(entries).finish()
    }
}

impl TypeRegistry {
    /// A registry seeded with the built-in scalar conversions.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_builtins();
        registry
    }

    /// A registry with no conversions at all.
    pub fn empty() -> Self {
        Self {
            conversions: HashMap::new(),
        }
    }

    /// Register (or replace) the conversion for `V`.
    pub fn register<V, R, W>(
        &mut self,
        sql_type: impl Into<Cow<'static, str>>,
        reader: R,
        writer: W,
    ) -> &mut Self
    where
        V: Send + Sync + 'static,
        R: Fn(&Value) -> Result<V> + Send + Sync + 'static,
        W: Fn(&V) -> Result<Value> + Send + Sync + 'static,
    {
        let sql_type = sql_type.into();
        let conversion = TypeConversion::<V> {
            sql_type: sql_type.clone(),
            reader: Arc::new(reader),
            writer: Arc::new(writer),
        };
        self.conversions.insert(
            TypeId::of::<V>(),
            Registered {
                key: TypeKey::of::<V>(),
                sql_type,
                conversion: Arc::new(conversion),
            },
        );
        self
    }

    /// Look up the conversion for `V`; never guesses.
    pub fn resolve<V: 'static>(&self) -> Result<TypeConversion<V>> {
        self.conversions
            .get(&TypeId::of::<V>())
            .and_then(|r| r.conversion.downcast_ref::<TypeConversion<V>>())
            .cloned()
            .ok_or_else(|| QuarryError::UnknownType(std::any::type_name::<V>().to_string()))
    }

    pub fn sql_type_for<V: 'static>(&self) -> Result<&str> {
        self.sql_type_of(TypeKey::of::<V>())
    }

    pub fn sql_type_of(&self, key: TypeKey) -> Result<&str> {
        self.conversions
            .get(&key.id())
            .map(|r| r.sql_type.as_ref())
            .ok_or_else(|| QuarryError::UnknownType(key.name().to_string()))
    }

    pub fn contains<V: 'static>(&self) -> bool {
        self.conversions.contains_key(&TypeId::of::<V>())
    }

    /// Register an enum stored either by discriminant or by label.
    pub fn register_enum<E: SqlEnum>(&mut self, storage: EnumStorage) -> &mut Self {
        match storage {
            EnumStorage::Integer => self.register::<E, _, _>(
                "INTEGER",
                |value| enum_from_discriminant::<E>(integer(value)?),
                |variant| Ok(Value::Integer(variant.discriminant())),
            ),
            EnumStorage::Text => self.register::<E, _, _>(
                "VARCHAR",
                read_text_enum::<E>,
                |variant| Ok(Value::Text(variant.label().to_string())),
            ),
        }
    }

    fn register_builtins(&mut self) {
        macro_rules! narrow_integer {
            ($($ty:ty),+) => {$(
                self.register::<$ty, _, _>(
                    "INTEGER",
                    |value| {
                        let wide = integer(value)?;
                        <$ty>::try_from(wide).map_err(|_| {
                            QuarryError::conversion(format!(
                                "{wide} does not fit in {}",
                                stringify!($ty)
                            ))
                        })
                    },
                    |v| Ok(Value::Integer(i64::from(*v))),
                );
            )+};
        }
        narrow_integer!(i8, i16, i32, u8, u16, u32);

        self.register::<i64, _, _>("INTEGER", integer, |v| Ok(Value::Integer(*v)));
        // u64 and usize keep their bit pattern in the signed column.
        self.register::<u64, _, _>(
            "INTEGER",
            |value| Ok(integer(value)? as u64),
            |v| Ok(Value::Integer(*v as i64)),
        );
        self.register::<isize, _, _>(
            "INTEGER",
            |value| Ok(integer(value)? as isize),
            |v| Ok(Value::Integer(*v as i64)),
        );
        self.register::<usize, _, _>(
            "INTEGER",
            |value| Ok(integer(value)? as usize),
            |v| Ok(Value::Integer(*v as i64)),
        );
        self.register::<bool, _, _>(
            "INTEGER",
            |value| Ok(integer(value)? != 0),
            |v| Ok(Value::Integer(i64::from(*v))),
        );
        self.register::<f64, _, _>("REAL", real, |v| Ok(Value::Real(*v)));
        self.register::<f32, _, _>(
            "REAL",
            |value| Ok(real(value)? as f32),
            |v| Ok(Value::Real(f64::from(*v))),
        );
        self.register::<String, _, _>(
            "TEXT",
            |value| match value {
                Value::Text(s) => Ok(s.clone()),
                other => Err(mismatch("String", other)),
            },
            |v| Ok(Value::Text(v.clone())),
        );
        self.register::<Vec<u8>, _, _>(
            "BLOB",
            |value| match value {
                Value::Blob(b) => Ok(b.clone()),
                Value::Text(s) => Ok(s.as_bytes().to_vec()),
                other => Err(mismatch("Vec<u8>", other)),
            },
            |v| Ok(Value::Blob(v.clone())),
        );
        self.register::<Uuid, _, _>(
            "VARCHAR(36)",
            |value| match value {
                Value::Text(s) => Uuid::parse_str(s)
                    .map_err(|e| QuarryError::conversion(format!("invalid uuid `{s}`: {e}"))),
                Value::Blob(b) => Uuid::from_slice(b)
                    .map_err(|e| QuarryError::conversion(format!("invalid uuid blob: {e}"))),
                other => Err(mismatch("Uuid", other)),
            },
            |v| Ok(Value::Text(v.hyphenated().to_string())),
        );
    }
}

/// How an enum is encoded on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnumStorage {
    /// Stored as its discriminant
    Integer,
    /// Stored as its label; integers are still accepted on read
    Text,
}

/// A fieldless enum that can be stored by discriminant or by label.
pub trait SqlEnum: Copy + Send + Sync + 'static {
    const VARIANTS: &'static [Self];

    fn label(self) -> &'static str;

    fn discriminant(self) -> i64;
}

/// Register several enums with the same storage in one call.
///
/// ```ignore
/// register_enums!(registry, EnumStorage::Text => [Color, Shape]);
/// ```
#[macro_export]
macro_rules! register_enums {
    ($registry:expr, $storage:expr => [$($ty:ty),+ $(,)?]) => {{
        let storage = $storage;
        $( $registry.register_enum::<$ty>(storage); )+
    }};
}

fn enum_from_discriminant<E: SqlEnum>(discriminant: i64) -> Result<E> {
    E::VARIANTS
        .iter()
        .copied()
        .find(|v| v.discriminant() == discriminant)
        .ok_or_else(|| {
            QuarryError::conversion(format!(
                "{discriminant} is not a variant of {}",
                std::any::type_name::<E>()
            ))
        })
}

fn read_text_enum<E: SqlEnum>(value: &Value) -> Result<E> {
    match value {
        Value::Text(label) => {
            if let Some(variant) = E::VARIANTS.iter().copied().find(|v| v.label() == label) {
                return Ok(variant);
            }
            match label.trim().parse::<i64>() {
                Ok(discriminant) => enum_from_discriminant(discriminant),
                Err(_) => Err(QuarryError::conversion(format!(
                    "`{label}` is not a variant of {}",
                    std::any::type_name::<E>()
                ))),
            }
        }
        Value::Integer(discriminant) => enum_from_discriminant(*discriminant),
        other => Err(mismatch(std::any::type_name::<E>(), other)),
    }
}

fn integer(value: &Value) -> Result<i64> {
    match value {
        Value::Integer(i) => Ok(*i),
        other => Err(mismatch("integer", other)),
    }
}

fn real(value: &Value) -> Result<f64> {
    match value {
        Value::Real(r) => Ok(*r),
        Value::Integer(i) => Ok(*i as f64),
        other => Err(mismatch("real", other)),
    }
}

fn mismatch(target: &str, value: &Value) -> QuarryError {
    QuarryError::conversion(format!(
        "cannot read {} as {target}",
        value.storage_class()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq)]
    enum Color {
        Red = 1,
        Green = 2,
    }

    impl SqlEnum for Color {
        const VARIANTS: &'static [Self] = &[Color::Red, Color::Green];

        fn label(self) -> &'static str {
            match self {
                Color::Red => "Red",
                Color::Green => "Green",
            }
        }

        fn discriminant(self) -> i64 {
            self as i64
        }
    }

    fn round_trip<V: Clone + PartialEq + std::fmt::Debug + 'static>(
        registry: &TypeRegistry,
        value: V,
    ) {
        let conversion = registry.resolve::<V>().unwrap();
        let mut params: Vec<Value> = Vec::new();
        conversion.write(&mut params, 0, Some(&value)).unwrap();
        conversion.write(&mut params, 1, None).unwrap();
        assert_eq!(conversion.read(&params, 0).unwrap(), Some(value));
        assert_eq!(conversion.read(&params, 1).unwrap(), None);
    }

    #[test]
    fn builtins_round_trip_including_null() {
        let registry = TypeRegistry::new();
        round_trip(&registry, -8i8);
        round_trip(&registry, -16i16);
        round_trip(&registry, i32::MIN);
        round_trip(&registry, i64::MAX);
        round_trip(&registry, 200u8);
        round_trip(&registry, 60_000u16);
        round_trip(&registry, u32::MAX);
        round_trip(&registry, u64::MAX);
        round_trip(&registry, -3isize);
        round_trip(&registry, 9usize);
        round_trip(&registry, true);
        round_trip(&registry, 1.5f32);
        round_trip(&registry, -2.25f64);
        round_trip(&registry, String::from("quarry"));
        round_trip(&registry, vec![0u8, 1, 255]);
        round_trip(&registry, Uuid::new_v4());
    }

    #[test]
    fn narrowing_overflow_is_a_conversion_error() {
        let registry = TypeRegistry::new();
        let conversion = registry.resolve::<u8>().unwrap();
        let row = vec![Value::Integer(300)];
        assert!(matches!(
            conversion.read(&row, 0),
            Err(QuarryError::Conversion(_))
        ));
    }

    #[test]
    fn unknown_type_is_never_guessed() {
        struct Opaque;
        let registry = TypeRegistry::new();
        assert!(matches!(
            registry.resolve::<Opaque>(),
            Err(QuarryError::UnknownType(name)) if name.contains("Opaque")
        ));
        assert!(TypeRegistry::empty().resolve::<i32>().is_err());
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = TypeRegistry::new();
        registry.register::<bool, _, _>(
            "TEXT",
            |value| Ok(matches!(value, Value::Text(s) if s == "yes")),
            |v| Ok(Value::Text(if *v { "yes" } else { "no" }.to_string())),
        );
        let conversion = registry.resolve::<bool>().unwrap();
        assert_eq!(conversion.sql_type(), "TEXT");
        assert_eq!(
            conversion.encode(Some(&true)).unwrap(),
            Value::Text("yes".into())
        );
        assert_eq!(registry.sql_type_for::<bool>().unwrap(), "TEXT");
    }

    #[test]
    fn text_enum_accepts_label_or_integer() {
        let mut registry = TypeRegistry::new();
        registry.register_enum::<Color>(EnumStorage::Text);
        let conversion = registry.resolve::<Color>().unwrap();

        assert_eq!(
            conversion.encode(Some(&Color::Green)).unwrap(),
            Value::Text("Green".into())
        );
        assert_eq!(
            conversion.decode(&Value::Text("Red".into())).unwrap(),
            Some(Color::Red)
        );
        assert_eq!(
            conversion.decode(&Value::Integer(2)).unwrap(),
            Some(Color::Green)
        );
        assert_eq!(
            conversion.decode(&Value::Text("1".into())).unwrap(),
            Some(Color::Red)
        );
        assert!(conversion.decode(&Value::Text("Blue".into())).is_err());
    }

    #[test]
    fn integer_enum_uses_discriminant() {
        let mut registry = TypeRegistry::new();
        register_enums!(registry, EnumStorage::Integer => [Color]);
        let conversion = registry.resolve::<Color>().unwrap();
        assert_eq!(conversion.sql_type(), "INTEGER");
        assert_eq!(
            conversion.encode(Some(&Color::Red)).unwrap(),
            Value::Integer(1)
        );
        assert!(conversion.decode(&Value::Integer(9)).is_err());
    }
}
