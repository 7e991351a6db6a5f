//! Typed wrappers for common hub methods.
//!
//! Everything here is a thin layer over [`Client::call`]; methods the
//! wrappers do not cover are reachable through `call` directly.

use hgipc_variant::{ConversionError, Variant, VariantKind};

use crate::client::Client;
use crate::error::Result;

impl Client {
    /// Read a system variable. Unknown variables come back as `Void`.
    pub fn get_system_variable(&self, name: &str) -> Result<Variant> {
        self.call("getSystemVariable", vec![Variant::from(name)])
    }

    /// Create or overwrite a system variable.
    pub fn set_system_variable(&self, name: &str, value: impl Into<Variant>) -> Result<()> {
        self.call(
            "setSystemVariable",
            vec![Variant::from(name), value.into()],
        )?;
        Ok(())
    }

    pub fn delete_system_variable(&self, name: &str) -> Result<()> {
        self.call("deleteSystemVariable", vec![Variant::from(name)])?;
        Ok(())
    }

    /// All system variables as `(name, value)` pairs, in hub order.
    pub fn get_all_system_variables(&self) -> Result<Vec<(String, Variant)>> {
        let value = self.call("getAllSystemVariables", Vec::new())?;
        let entries = match value {
            Variant::Struct(entries) => entries,
            other => return Err(mismatch(VariantKind::Struct, &other)),
        };
        entries
            .into_iter()
            .map(|(key, value)| match key {
                Variant::String(name) => Ok((name, value)),
                other => Err(mismatch(VariantKind::String, &other)),
            })
            .collect()
    }

    /// Ids of all devices known to the hub.
    pub fn list_device_ids(&self) -> Result<Vec<u64>> {
        let value = self.call(
            "listDevices",
            vec![Variant::Bool(false), Variant::array(["ID"])],
        )?;
        let devices = match value {
            Variant::Array(devices) => devices,
            other => return Err(mismatch(VariantKind::Array, &other)),
        };
        devices
            .iter()
            .map(|device| {
                let id = device
                    .get("ID")
                    .ok_or_else(|| mismatch(VariantKind::Struct, device))?;
                id.as_i64()
                    .and_then(|id| u64::try_from(id).ok())
                    .ok_or_else(|| mismatch(VariantKind::Integer, id))
            })
            .collect()
    }

    /// Current hub log level.
    pub fn log_level(&self) -> Result<i64> {
        integer(self.call("logLevel", Vec::new())?)
    }

    /// Change the hub log level; returns the level now in effect.
    pub fn set_log_level(&self, level: i64) -> Result<i64> {
        integer(self.call("logLevel", vec![Variant::Integer(level)])?)
    }
}

fn integer(value: Variant) -> Result<i64> {
    Ok(i64::try_from(value)?)
}

fn mismatch(expected: VariantKind, found: &Variant) -> crate::Error {
    ConversionError::Mismatch {
        expected,
        found: found.kind(),
    }
    .into()
}
