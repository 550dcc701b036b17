//! yaml tree to canonical document
//!
//! Yaml allows any value as a mapping key (`1: one`, `true: yes`, `[a, b]: c`), json schema validation and strict
//! decoding only accept string keys. [normalize] rewrites every mapping key into its string form and keeps scalar
//! values typed, so `atomic: true` stays a boolean.
//!
//! Two keys that stringify identically (`1` and `"1"`) collapse into one entry; the later one wins.
use crate::error::LoadError;
use serde_json::Value as JsonValue;
use serde_yaml::Value as YamlValue;

pub fn normalize(value: YamlValue) -> Result<JsonValue, LoadError> {
    Ok(match value {
        YamlValue::Null => JsonValue::Null,
        YamlValue::Bool(bool) => JsonValue::Bool(bool),
        YamlValue::Number(number) => JsonValue::Number(canonical_number(&number)?),
        YamlValue::String(string) => JsonValue::String(string),
        YamlValue::Sequence(sequence) => JsonValue::Array(
            sequence
                .into_iter()
                .map(normalize)
                .collect::<Result<_, LoadError>>()?,
        ),
        YamlValue::Mapping(mapping) => JsonValue::Object(
            mapping
                .into_iter()
                .map(|(key, value)| Ok((key_string(&key), normalize(value)?)))
                .collect::<Result<_, LoadError>>()?,
        ),
        // directives are resolved before normalizing, any tag left is meaningless here
        YamlValue::Tagged(tagged) => normalize(tagged.value)?,
    })
}

fn canonical_number(number: &serde_yaml::Number) -> Result<serde_json::Number, LoadError> {
    if let Some(int) = number.as_i64() {
        return Ok(int.into());
    }
    if let Some(uint) = number.as_u64() {
        return Ok(uint.into());
    }

    number
        .as_f64()
        .and_then(serde_json::Number::from_f64)
        .ok_or_else(|| LoadError::NonFiniteNumber {
            value: number.to_string(),
        })
}

fn key_string(key: &YamlValue) -> String {
    match key {
        YamlValue::String(string) => string.clone(),
        YamlValue::Number(number) => number.to_string(),
        YamlValue::Bool(bool) => bool.to_string(),
        YamlValue::Null => "null".to_string(),
        YamlValue::Tagged(tagged) => key_string(&tagged.value),
        YamlValue::Sequence(_) | YamlValue::Mapping(_) => serde_yaml::to_string(key)
            .map(|rendered| rendered.trim_end().to_string())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn normalized(source: &str) -> JsonValue {
        normalize(serde_yaml::from_str(source).unwrap()).unwrap()
    }

    #[test]
    fn keys_become_strings() {
        let value = normalized(
            r#"
            1: one
            true: yes
            ~: nothing
            nested:
              - 2.5: float
            "#,
        );

        assert_eq!(
            value,
            json!({
                "1": "one",
                "true": "yes",
                "null": "nothing",
                "nested": [{"2.5": "float"}]
            })
        );
    }

    #[test]
    fn scalars_keep_their_type() {
        let value = normalized("atomic: true\nreplicas: 3\nratio: 0.5\nname: \"3\"\nempty:\n");

        assert_eq!(
            value,
            json!({"atomic": true, "replicas": 3, "ratio": 0.5, "name": "3", "empty": null})
        );
    }

    #[test]
    fn key_order_is_kept() {
        let value = normalized("zeta: 1\nalpha: 2\nmid: 3\n");
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn infinity_is_rejected() {
        let error = normalize(serde_yaml::from_str("limit: .inf").unwrap()).unwrap_err();
        assert!(matches!(error, LoadError::NonFiniteNumber { .. }));
    }
}
