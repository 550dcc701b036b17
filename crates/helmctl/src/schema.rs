//! manifest schema: defaults and validation
//!
//! The embedded [DEFAULT_SCHEMA] describes the manifest format. A schema file can replace it (json or yaml).
//!
//! Validation happens on the canonical document (see [crate::normalize]) after defaults were applied.
use crate::error::{LoadError, SchemaIssue};
use serde_json::Value as JsonValue;
use std::path::Path;

/// Nested `$ref`s are followed at most this many times
const MAX_REF_HOPS: usize = 16;

pub const DEFAULT_SCHEMA: &str = r##"{
    "$schema": "http://json-schema.org/draft-07/schema#",
    "title": "helmctl_config",
    "type": "object",
    "default": {},

    "definitions": {
        "repository": {
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "url": {"type": "string"},
                "user": {"type": "string"},
                "password": {"type": "string"},
                "includePath": {"type": "string"}
            },
            "additionalProperties": false,
            "required": ["name", "url"]
        },

        "value": {
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "value": {"oneOf": [
                    {"type": "string"},
                    {"type": "number"},
                    {"type": "boolean"}
                ]},
                "type": {"type": "string"},
                "includePath": {"type": "string"}
            },
            "additionalProperties": false,
            "required": ["name", "value"]
        },

        "valueFile": {
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "decrypt": {"type": "boolean", "default": false},
                "includePath": {"type": "string"}
            },
            "additionalProperties": false,
            "required": ["name"]
        },

        "release": {
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "chart": {"type": "string"},
                "version": {"type": "string"},
                "namespace": {"type": "string"},
                "beforeScripts": {"type": "array", "items": {"type": "string"}},
                "afterScripts": {"type": "array", "items": {"type": "string"}},
                "atomic": {"type": "boolean"},
                "repository": {"$ref": "#/definitions/repository"},
                "values": {"type": "array", "items": {"$ref": "#/definitions/value"}},
                "valueFiles": {"type": "array", "items": {"$ref": "#/definitions/valueFile"}},
                "includePath": {"type": "string"}
            },
            "additionalProperties": false,
            "required": ["name", "chart"]
        },

        "releaseOverride": {
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "chart": {"type": "string"},
                "version": {"type": "string"},
                "include": {"type": "string"},
                "namespace": {"type": "string"},
                "beforeScripts": {"type": "array", "items": {"type": "string"}},
                "afterScripts": {"type": "array", "items": {"type": "string"}},
                "atomic": {"type": "boolean"},
                "repository": {"$ref": "#/definitions/repository"},
                "values": {"type": "array", "items": {"$ref": "#/definitions/value"}},
                "valueFiles": {"type": "array", "items": {"$ref": "#/definitions/valueFile"}},
                "includePath": {"type": "string"}
            },
            "additionalProperties": false
        },

        "targets": {
            "type": "object",
            "patternProperties": {
                "^.*$": {
                    "type": "array",
                    "items": {"$ref": "#/definitions/component"}
                }
            },
            "properties": {},
            "additionalProperties": false
        },

        "component": {
            "oneOf": [
                {"type": "string"},
                {"$ref": "#/definitions/releaseOverride"}
            ]
        }
    },

    "properties": {
        "version": {
            "type": "string"
        },

        "spec": {
            "type": "object",
            "properties": {
                "repositories": {
                    "type": "array",
                    "items": {"$ref": "#/definitions/repository"}
                },

                "releases": {
                    "type": "array",
                    "items": {"$ref": "#/definitions/release"}
                },

                "installs": {
                    "type": "object",
                    "properties": {
                        "environments": {"$ref": "#/definitions/targets"},
                        "projects": {"$ref": "#/definitions/targets"},
                        "includePath": {"type": "string"}
                    },
                    "additionalProperties": false
                },

                "includePath": {"type": "string"}
            },
            "required": ["releases", "installs"],
            "additionalProperties": false
        }
    },

    "required": ["version", "spec"],
    "additionalProperties": false
}"##;

/// A compiled schema
pub struct Schema {
    document: JsonValue,
    compiled: jsonschema::Validator,
}

impl Schema {
    pub fn embedded() -> Result<Self, LoadError> {
        let document = serde_json::from_str(DEFAULT_SCHEMA).map_err(|e| LoadError::InvalidSchema {
            origin: "(embedded)".into(),
            message: e.to_string(),
        })?;

        Self::compile(document, "(embedded)")
    }

    /// Reads a json or yaml schema file
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let source = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_owned(),
            source,
        })?;

        // yaml is a superset of json
        let document: JsonValue =
            serde_yaml::from_str(&source).map_err(|source| LoadError::Parse {
                path: path.to_owned(),
                source,
            })?;

        Self::compile(document, &path.display().to_string())
    }

    /// Uses the schema file when it exists, otherwise the embedded schema
    pub fn load(path: Option<&Path>) -> Result<Self, LoadError> {
        match path {
            Some(path) if path.exists() => {
                tracing::debug!(path = %path.display(), "parsing schema from file");
                Self::from_file(path)
            }
            Some(path) => {
                tracing::debug!(path = %path.display(), "schema file not found, using embedded schema");
                Self::embedded()
            }
            None => {
                tracing::debug!("using embedded schema");
                Self::embedded()
            }
        }
    }

    fn compile(document: JsonValue, origin: &str) -> Result<Self, LoadError> {
        let compiled =
            jsonschema::validator_for(&document).map_err(|e| LoadError::InvalidSchema {
                origin: origin.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self { document, compiled })
    }

    pub fn document(&self) -> &JsonValue {
        &self.document
    }

    /// Inserts the `default` of every schema property that is missing from `instance`
    pub fn apply_defaults(&self, instance: &mut JsonValue) {
        self.apply_defaults_at(&self.document, instance);
    }

    fn apply_defaults_at(&self, schema: &JsonValue, instance: &mut JsonValue) {
        let schema = self.dereference(schema);

        if instance.is_null() {
            if let Some(default) = schema.get("default") {
                *instance = default.clone();
            }
        }

        match instance {
            JsonValue::Object(object) => {
                if let Some(JsonValue::Object(properties)) = schema.get("properties") {
                    for (key, property) in properties {
                        let property = self.dereference(property);
                        if !object.contains_key(key) {
                            let Some(default) = property.get("default") else {
                                continue;
                            };
                            object.insert(key.clone(), default.clone());
                        }
                        if let Some(value) = object.get_mut(key) {
                            self.apply_defaults_at(property, value);
                        }
                    }
                }

                if let Some(JsonValue::Object(patterns)) = schema.get("patternProperties") {
                    for (pattern, property) in patterns {
                        let Ok(regex) = regex::Regex::new(pattern) else {
                            tracing::warn!(%pattern, "invalid pattern in schema, defaults not applied");
                            continue;
                        };
                        for (key, value) in object.iter_mut() {
                            if regex.is_match(key) {
                                self.apply_defaults_at(property, value);
                            }
                        }
                    }
                }
            }
            JsonValue::Array(elements) => {
                if let Some(items) = schema.get("items") {
                    for element in elements {
                        self.apply_defaults_at(items, element);
                    }
                }
            }
            _ => return,
        }

        // the first object alternative describes object instances
        if instance.is_object() {
            let alternatives = schema
                .get("oneOf")
                .or_else(|| schema.get("anyOf"))
                .and_then(JsonValue::as_array);
            let object_alternative = alternatives.into_iter().flatten().find(|alternative| {
                let alternative = self.dereference(alternative);
                alternative.get("type").and_then(JsonValue::as_str) == Some("object")
            });
            if let Some(alternative) = object_alternative {
                self.apply_defaults_at(alternative, instance);
            }
        }
    }

    /// Follows local `$ref`s (`#/definitions/...`)
    fn dereference<'s>(&'s self, mut schema: &'s JsonValue) -> &'s JsonValue {
        for _ in 0..MAX_REF_HOPS {
            let Some(reference) = schema.get("$ref").and_then(JsonValue::as_str) else {
                break;
            };
            let Some(target) = reference
                .strip_prefix('#')
                .and_then(|pointer| self.document.pointer(pointer))
            else {
                tracing::warn!(%reference, "unresolvable schema reference");
                break;
            };
            schema = target;
        }

        schema
    }

    /// Collects every violation of `instance`
    pub fn validate(&self, instance: &JsonValue) -> Result<(), LoadError> {
        let issues: Vec<SchemaIssue> = self
            .compiled
            .iter_errors(instance)
            .map(|error| {
                let path = error.instance_path.to_string();
                SchemaIssue {
                    path: if path.is_empty() {
                        "(root)".to_string()
                    } else {
                        path
                    },
                    message: error.to_string(),
                }
            })
            .collect();

        if issues.is_empty() {
            return Ok(());
        }

        Err(LoadError::SchemaViolation { issues })
    }
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn violations(instance: JsonValue) -> Vec<SchemaIssue> {
        match Schema::embedded().unwrap().validate(&instance) {
            Err(LoadError::SchemaViolation { issues }) => issues,
            other => panic!("expected a violation, got {other:?}"),
        }
    }

    #[test]
    fn embedded_schema_accepts_a_manifest() {
        let schema = Schema::embedded().unwrap();
        let instance = json!({
            "version": "1",
            "spec": {
                "releases": [{"name": "web", "chart": "stable/web", "atomic": true}],
                "installs": {
                    "environments": {
                        "dev": ["web", {"name": "web", "namespace": "custom"}]
                    }
                }
            }
        });

        schema.validate(&instance).unwrap();
    }

    #[test]
    fn release_requires_chart() {
        let issues = violations(json!({
            "version": "1",
            "spec": {"releases": [{"name": "web"}], "installs": {}}
        }));

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "/spec/releases/0");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let issues = violations(json!({
            "version": "1",
            "kind": "helmctl",
            "spec": {"releases": [], "installs": {}}
        }));
        assert_eq!(issues[0].path, "(root)");

        let issues = violations(json!({
            "version": "1",
            "spec": {"releases": [{"name": "web", "chart": "c", "replicas": 2}], "installs": {}}
        }));
        assert_eq!(issues[0].path, "/spec/releases/0");
    }

    #[test]
    fn overrides_do_not_need_a_chart() {
        let schema = Schema::embedded().unwrap();
        let instance = json!({
            "version": "1",
            "spec": {
                "releases": [],
                "installs": {"projects": {"shop": [{"name": "web", "include": "x"}]}}
            }
        });

        schema.validate(&instance).unwrap();
    }

    #[test]
    fn defaults_reach_nested_records() {
        let schema = Schema::embedded().unwrap();
        let mut instance = json!({
            "version": "1",
            "spec": {
                "releases": [{"name": "web", "chart": "c", "valueFiles": [{"name": "a.yaml"}]}],
                "installs": {
                    "environments": {
                        "dev": ["web", {"name": "web", "valueFiles": [{"name": "b.yaml", "decrypt": true}, {"name": "c.yaml"}]}]
                    }
                }
            }
        });

        schema.apply_defaults(&mut instance);

        assert_eq!(
            instance["spec"]["releases"][0]["valueFiles"][0],
            json!({"name": "a.yaml", "decrypt": false})
        );
        let overrides = &instance["spec"]["installs"]["environments"]["dev"][1]["valueFiles"];
        assert_eq!(overrides[0]["decrypt"], json!(true));
        assert_eq!(overrides[1]["decrypt"], json!(false));
        assert_eq!(instance["spec"]["installs"]["environments"]["dev"][0], json!("web"));
    }

    #[test]
    fn empty_document_gets_root_default() {
        let schema = Schema::embedded().unwrap();
        let mut instance = JsonValue::Null;

        schema.apply_defaults(&mut instance);
        assert_eq!(instance, json!({}));
    }

    #[test]
    fn schema_file_replaces_embedded_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.yaml");
        std::fs::write(
            &path,
            "type: object\nrequired: [version]\nproperties:\n  version:\n    type: string\n",
        )
        .unwrap();

        let schema = Schema::load(Some(&path)).unwrap();
        schema.validate(&json!({"version": "1", "anything": true})).unwrap();
        assert!(schema.validate(&json!({})).is_err());

        let fallback = Schema::load(Some(&dir.path().join("missing.json"))).unwrap();
        assert!(fallback.validate(&json!({"version": "1", "anything": true})).is_err());
    }
}
