//! Typed accessors over a [`RemoteProxy`].
//!
//! The remote side speaks untyped JSON values; this bridge turns them into
//! Rust types at the call site and reports a
//! [`CameraError::UnexpectedType`] instead of silently defaulting.
//! Writes go out as-is, except booleans which are always sent as JSON `true`
//! or `false`.

use crate::error::{CameraError, CameraResult};
use crate::proxy::RemoteProxy;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Value types that can be read from a remote property.
pub trait FromRemote: Sized {
    /// Type name used in coercion errors.
    const EXPECTED: &'static str;

    /// Convert a remote value, returning `None` if it has the wrong shape.
    fn from_remote(value: &Value) -> Option<Self>;
}

impl FromRemote for f64 {
    const EXPECTED: &'static str = "number";

    fn from_remote(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromRemote for i64 {
    const EXPECTED: &'static str = "integer";

    fn from_remote(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FromRemote for u32 {
    const EXPECTED: &'static str = "unsigned integer";

    fn from_remote(value: &Value) -> Option<Self> {
        value.as_u64().and_then(|v| u32::try_from(v).ok())
    }
}

impl FromRemote for bool {
    const EXPECTED: &'static str = "boolean";

    fn from_remote(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromRemote for String {
    const EXPECTED: &'static str = "string";

    fn from_remote(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromRemote for Option<String> {
    const EXPECTED: &'static str = "string or null";

    fn from_remote(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            Value::String(s) => Some(Some(s.clone())),
            _ => None,
        }
    }
}

impl FromRemote for Vec<String> {
    const EXPECTED: &'static str = "list of strings";

    fn from_remote(value: &Value) -> Option<Self> {
        value
            .as_array()?
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }
}

/// Durations travel as float seconds.
impl FromRemote for Duration {
    const EXPECTED: &'static str = "non-negative number of seconds";

    fn from_remote(value: &Value) -> Option<Self> {
        value
            .as_f64()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

/// Coerce `value` read from `property` into `T`.
pub fn coerce<T: FromRemote>(property: &str, value: Value) -> CameraResult<T> {
    T::from_remote(&value).ok_or_else(|| CameraError::UnexpectedType {
        property: property.to_string(),
        expected: T::EXPECTED,
        value: value.to_string(),
    })
}

/// Typed get/set on top of a shared proxy.
#[derive(Clone)]
pub struct RemoteAttributes {
    proxy: Arc<dyn RemoteProxy>,
}

impl RemoteAttributes {
    /// Wrap a proxy.
    pub fn new(proxy: Arc<dyn RemoteProxy>) -> Self {
        Self { proxy }
    }

    /// Proxy the bridge reads through.
    pub fn proxy(&self) -> &Arc<dyn RemoteProxy> {
        &self.proxy
    }

    /// Read a property via the remote `get` method.
    pub async fn get<T: FromRemote>(&self, name: &str) -> CameraResult<T> {
        let value = self.proxy.get(name).await?;
        coerce(name, value)
    }

    /// Read a plain remote attribute.
    pub async fn attribute<T: FromRemote>(&self, name: &str) -> CameraResult<T> {
        let value = self.proxy.attribute(name).await?;
        coerce(name, value)
    }

    /// Write a numeric property.
    pub async fn set_f64(&self, name: &str, value: f64) -> CameraResult<()> {
        self.proxy.set(name, Value::from(value)).await?;
        Ok(())
    }

    /// Write a boolean property.
    pub async fn set_bool(&self, name: &str, value: bool) -> CameraResult<()> {
        self.proxy.set(name, Value::Bool(value)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_numbers() {
        assert_eq!(coerce::<f64>("egain", json!(1.25)).unwrap(), 1.25);
        assert_eq!(coerce::<f64>("temperature", json!(-10)).unwrap(), -10.0);
        assert_eq!(coerce::<u32>("bit_depth", json!(16)).unwrap(), 16);
        assert!(coerce::<u32>("bit_depth", json!(-1)).is_err());
    }

    #[test]
    fn test_coerce_reports_property_and_value() {
        let err = coerce::<bool>("is_ready", json!("yes")).unwrap_err();
        assert_eq!(
            err,
            CameraError::UnexpectedType {
                property: "is_ready".into(),
                expected: "boolean",
                value: "\"yes\"".into(),
            }
        );
    }

    #[test]
    fn test_coerce_duration_and_optional_string() {
        assert_eq!(
            coerce::<Duration>("readout_time", json!(2.5)).unwrap(),
            Duration::from_millis(2500)
        );
        assert!(coerce::<Duration>("readout_time", json!(-1.0)).is_err());

        assert_eq!(coerce::<Option<String>>("filter_type", json!(null)).unwrap(), None);
        assert_eq!(
            coerce::<Option<String>>("filter_type", json!("RGGB")).unwrap(),
            Some("RGGB".to_string())
        );
    }

    #[test]
    fn test_coerce_string_list() {
        assert_eq!(
            coerce::<Vec<String>>("filter_names", json!(["g", "r"])).unwrap(),
            vec!["g".to_string(), "r".to_string()]
        );
        assert!(coerce::<Vec<String>>("filter_names", json!(["g", 1])).is_err());
    }
}
