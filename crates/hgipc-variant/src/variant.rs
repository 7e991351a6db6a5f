use std::fmt;

/// A value exchanged with the hub.
///
/// `Struct` keeps its entries in insertion order and allows any variant as a
/// key; the hub mostly uses string keys, occasionally integers. Equality is
/// structural and order-sensitive, with `Float` following IEEE-754 rules
/// (`NaN != NaN`).
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Variant {
    #[default]
    Void,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<Variant>),
    Struct(Vec<(Variant, Variant)>),
}

/// The kind of a [`Variant`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantKind {
    Void,
    Bool,
    Integer,
    Float,
    String,
    Binary,
    Array,
    Struct,
}

impl VariantKind {
    /// Lower-case name used in error messages and diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            VariantKind::Void => "void",
            VariantKind::Bool => "boolean",
            VariantKind::Integer => "integer",
            VariantKind::Float => "float",
            VariantKind::String => "string",
            VariantKind::Binary => "binary",
            VariantKind::Array => "array",
            VariantKind::Struct => "struct",
        }
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Variant {
    /// Build a binary blob.
    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Variant::Binary(bytes.into())
    }

    /// Build an array from anything convertible into variants.
    pub fn array<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Variant>,
    {
        Variant::Array(items.into_iter().map(Into::into).collect())
    }

    /// Build a struct from key/value pairs, keeping their order.
    pub fn structure<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Variant>,
        V: Into<Variant>,
    {
        Variant::Struct(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn kind(&self) -> VariantKind {
        match self {
            Variant::Void => VariantKind::Void,
            Variant::Bool(_) => VariantKind::Bool,
            Variant::Integer(_) => VariantKind::Integer,
            Variant::Float(_) => VariantKind::Float,
            Variant::String(_) => VariantKind::String,
            Variant::Binary(_) => VariantKind::Binary,
            Variant::Array(_) => VariantKind::Array,
            Variant::Struct(_) => VariantKind::Struct,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Variant::Void)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Variant::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Float value; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Variant::Float(value) => Some(*value),
            Variant::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Variant::Binary(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Variant]> {
        match self {
            Variant::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&[(Variant, Variant)]> {
        match self {
            Variant::Struct(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up the first struct entry whose key is the string `key`.
    ///
    /// Returns `None` for non-struct variants.
    pub fn get(&self, key: &str) -> Option<&Variant> {
        self.as_struct()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Bool(value)
    }
}

impl From<i64> for Variant {
    fn from(value: i64) -> Self {
        Variant::Integer(value)
    }
}

impl From<i32> for Variant {
    fn from(value: i32) -> Self {
        Variant::Integer(i64::from(value))
    }
}

impl From<u32> for Variant {
    fn from(value: u32) -> Self {
        Variant::Integer(i64::from(value))
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Variant::Float(value)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::String(value.to_string())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::String(value)
    }
}

impl From<Vec<Variant>> for Variant {
    fn from(items: Vec<Variant>) -> Self {
        Variant::Array(items)
    }
}

impl From<()> for Variant {
    fn from(_: ()) -> Self {
        Variant::Void
    }
}

impl<T: Into<Variant>> From<Option<T>> for Variant {
    fn from(value: Option<T>) -> Self {
        value.map_or(Variant::Void, Into::into)
    }
}
