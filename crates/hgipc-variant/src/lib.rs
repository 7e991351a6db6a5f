//! Dynamically-typed values exchanged with the hub.
//!
//! Everything that crosses the IPC socket is a [`Variant`]: a closed,
//! recursive value type covering void, booleans, 64-bit integers and floats,
//! strings, binary blobs, arrays and ordered key/value structs. Variants are
//! plain owned data; the binary wire codec lives in `hgipc-frame`.

pub mod convert;
pub mod error;
pub mod variant;

pub use error::{ConversionError, Result};
pub use variant::{Variant, VariantKind};
