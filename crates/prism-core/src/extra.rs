use indexmap::IndexMap;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Provider-only parameters carried alongside the standard ones
///
/// Lookups are typed and fail soft: a value of the wrong type is logged and
/// treated as absent instead of failing the conversion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtraParams(IndexMap<String, Value>);

impl ExtraParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Untyped access
    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Deserialize the value under `key` into `T`
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.0.get(key)?;

        match T::deserialize(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                tracing::debug!(key, error = %e, "ignoring extension parameter with unexpected type");
                None
            }
        }
    }

    /// Integer lookup that also accepts whole-number floats and numeric strings
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        let value = self.0.get(key)?;
        let parsed = match value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(whole_f64_to_i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };

        if parsed.is_none() {
            tracing::debug!(key, "ignoring non-integer extension parameter");
        }
        parsed
    }

    /// Float lookup that also accepts integers and numeric strings
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        let value = self.0.get(key)?;
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };

        if parsed.is_none() {
            tracing::debug!(key, "ignoring non-numeric extension parameter");
        }
        parsed
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.0.get(key)? {
            Value::String(s) => Some(s),
            _ => {
                tracing::debug!(key, "ignoring non-string extension parameter");
                None
            }
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn whole_f64_to_i64(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15).then_some(f as i64)
}

impl FromIterator<(String, Value)> for ExtraParams {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn params() -> ExtraParams {
        serde_json::from_value(json!({
            "top_k": 40,
            "num_ctx": 4096.0,
            "mirostat_tau": "5.0",
            "keep_alive": "5m",
            "repeat_penalty": "high",
            "stop_tokens": ["</s>"],
        }))
        .unwrap()
    }

    #[test]
    fn typed_lookup_present() {
        let params = params();
        assert_eq!(params.get_i64("top_k"), Some(40));
        assert_eq!(params.get_i64("num_ctx"), Some(4096));
        assert_eq!(params.get_f64("mirostat_tau"), Some(5.0));
        assert_eq!(params.get_str("keep_alive"), Some("5m"));
        assert_eq!(params.get::<Vec<String>>("stop_tokens"), Some(vec!["</s>".to_owned()]));
    }

    #[test]
    fn wrong_type_is_ignored() {
        let params = params();
        assert_eq!(params.get_f64("repeat_penalty"), None);
        assert_eq!(params.get_str("top_k"), None);
        assert_eq!(params.get::<u32>("keep_alive"), None);
        assert!(params.contains("repeat_penalty"));
    }

    #[test]
    fn absent_is_none() {
        assert_eq!(params().get_i64("seed"), None);
        assert!(ExtraParams::new().is_empty());
    }

    #[test]
    fn fractional_float_is_not_an_integer() {
        let mut params = ExtraParams::new();
        params.insert("num_gpu", 1.5);
        assert_eq!(params.get_i64("num_gpu"), None);
    }
}
