use crate::variant::VariantKind;

/// Errors raised when translating between native Rust values and variants.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    /// A native value has no variant representation.
    #[error("cannot convert value of type {type_name} to a variant: {reason}")]
    Unsupported {
        type_name: &'static str,
        reason: String,
    },

    /// An unsigned integer does not fit the signed 64-bit variant integer.
    #[error("integer {value} does not fit a 64-bit signed variant integer")]
    IntegerOutOfRange { value: u64 },

    /// A variant holds a different kind than the caller asked for.
    #[error("expected {expected} variant, found {found}")]
    Mismatch {
        expected: VariantKind,
        found: VariantKind,
    },

    /// A variant could not be deserialized into the requested native type.
    #[error("cannot convert variant into {type_name}: {reason}")]
    Deserialize {
        type_name: &'static str,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, ConversionError>;
