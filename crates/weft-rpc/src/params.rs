//! Opaque call parameters, decoded only once the target method is known.

use serde::de::DeserializeOwned;
use serde_json::value::RawValue;

use crate::errors::RpcError;

/// Raw `params` of a call, kept as unparsed JSON text.
#[derive(Clone, Debug, Default)]
pub struct Params(Option<Box<RawValue>>);

impl Params {
    /// No params were sent.
    pub fn none() -> Self {
        Self(None)
    }

    /// Wrap params captured during envelope decoding.
    pub fn from_raw(raw: Option<Box<RawValue>>) -> Self {
        Self(raw)
    }

    /// Build params from any serializable value (in-process callers, tests).
    pub fn from_value<T: serde::Serialize>(value: &T) -> Result<Self, RpcError> {
        serde_json::value::to_raw_value(value)
            .map(|raw| Self(Some(raw)))
            .map_err(|e| RpcError::serialization(&e))
    }

    /// Whether the call carried params.
    pub fn is_present(&self) -> bool {
        self.0.is_some()
    }

    /// The raw JSON text, if present.
    pub fn raw(&self) -> Option<&str> {
        self.0.as_deref().map(RawValue::get)
    }

    /// Decode into the method's parameter type.
    ///
    /// Absent params decode as JSON `null`, so `Option<T>` and `()` accept
    /// calls without params.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, RpcError> {
        let text = self.raw().unwrap_or("null");
        serde_json::from_str(text).map_err(|e| RpcError::InvalidParams {
            message: e.to_string(),
        })
    }

    /// Decode into the method's parameter type, rejecting absent params.
    pub fn require<T: DeserializeOwned>(&self) -> Result<T, RpcError> {
        if !self.is_present() {
            return Err(RpcError::invalid_params("params are required"));
        }
        self.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct AddArgs {
        a: i64,
        b: i64,
    }

    #[test]
    fn parse_struct() {
        let params = Params::from_value(&json!({"a": 2, "b": 3})).unwrap();
        let args: AddArgs = params.parse().unwrap();
        assert_eq!(args, AddArgs { a: 2, b: 3 });
    }

    #[test]
    fn parse_wrong_shape_is_invalid_params() {
        let params = Params::from_value(&json!("not an object")).unwrap();
        let err = params.parse::<AddArgs>().unwrap_err();
        assert_matches!(err, RpcError::InvalidParams { .. });
    }

    #[test]
    fn absent_params_parse_as_null() {
        let params = Params::none();
        assert!(!params.is_present());
        let value: Option<AddArgs> = params.parse().unwrap();
        assert!(value.is_none());
        params.parse::<()>().unwrap();
    }

    #[test]
    fn require_rejects_absent_params() {
        let err = Params::none().require::<String>().unwrap_err();
        assert_matches!(err, RpcError::InvalidParams { .. });
    }

    #[test]
    fn require_accepts_present_params() {
        let params = Params::from_value(&"sports").unwrap();
        let topic: String = params.require().unwrap();
        assert_eq!(topic, "sports");
    }

    #[test]
    fn raw_text_is_preserved() {
        let raw = RawValue::from_string(r#"{"x": [1, 2]}"#.to_owned()).unwrap();
        let params = Params::from_raw(Some(raw));
        assert_eq!(params.raw(), Some(r#"{"x": [1, 2]}"#));
    }
}
