//! repositories, releases and their values
use crate::context::LoadContext;
use crate::error::LoadError;
use serde::{Deserialize, Serialize, Serializer};
use std::path::PathBuf;

/// A helm chart repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Repository {
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(
        skip_serializing_if = "String::is_empty",
        serialize_with = "serialize_masked"
    )]
    pub password: String,
}

impl Repository {
    /// The sentinel used for releases without a repository
    pub fn is_empty(&self) -> bool {
        self == &Repository::default()
    }

    /// Repository url with user and password embedded, when both are set
    pub fn url_with_credentials(&self) -> Result<url::Url, url::ParseError> {
        let mut url = url::Url::parse(&self.url)?;
        if url.host_str().unwrap_or_default().is_empty() {
            return Err(url::ParseError::EmptyHost);
        }

        if !self.user.is_empty() && !self.password.is_empty() {
            url.set_username(&self.user)
                .map_err(|_| url::ParseError::EmptyHost)?;
            url.set_password(Some(&self.password))
                .map_err(|_| url::ParseError::EmptyHost)?;
        }

        Ok(url)
    }

    fn merged_with(&self, overlay: &Repository) -> Repository {
        let mut merged = self.clone();
        override_string(&mut merged.name, &overlay.name);
        override_string(&mut merged.url, &overlay.url);
        override_string(&mut merged.user, &overlay.user);
        override_string(&mut merged.password, &overlay.password);
        merged
    }
}

fn serialize_masked<S: Serializer>(_value: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str("********")
}

/// A helm value, passed as `--set name=value` (or `--set-string` for `type: string`)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Value {
    pub name: String,
    pub value: Scalar,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Value {
    pub fn key_value_pair(&self) -> String {
        format!("{}={}", self.name, self.value)
    }

    pub fn is_string(&self) -> bool {
        self.kind.as_deref() == Some("string")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Boolean(bool),
    Number(serde_json::Number),
    String(String),
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Boolean(value) => value.fmt(f),
            Scalar::Number(value) => value.fmt(f),
            Scalar::String(value) => f.write_str(value),
        }
    }
}

/// A helm value file, passed as `-f name`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueFile {
    pub name: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decrypt: Option<bool>,
}

impl ValueFile {
    /// Whether the file has to go through the secret decryptor first
    pub fn needs_decryption(&self) -> bool {
        self.decrypt.unwrap_or(false)
    }
}

/// A helm release
///
/// The same shape describes base releases and target overrides. In an override every field is optional; empty
/// strings, `None` and empty lists mean "not set".
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Release {
    pub name: String,
    pub chart: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub version: String,
    pub namespace: String,
    pub before_scripts: Vec<PathBuf>,
    pub after_scripts: Vec<PathBuf>,
    pub atomic: Option<bool>,
    pub repository: Option<Repository>,
    pub values: Vec<Value>,
    pub value_files: Vec<ValueFile>,

    /// Set by `!include`: path of the file that declared this release, relative to the root document's directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_path: Option<PathBuf>,
}

impl Release {
    pub fn is_atomic(&self) -> bool {
        self.atomic.unwrap_or(false)
    }

    /// The release's repository unless it is the empty sentinel
    pub fn declared_repository(&self) -> Option<&Repository> {
        self.repository.as_ref().filter(|repository| !repository.is_empty())
    }

    /// Rewrites script and value file paths relative to the file that declared them
    pub(crate) fn resolve_paths(&mut self, context: &LoadContext) {
        let include_path = self.include_path.as_deref();

        for script in self
            .before_scripts
            .iter_mut()
            .chain(self.after_scripts.iter_mut())
        {
            *script = context.resolve_path(include_path, script);
        }

        for value_file in &mut self.value_files {
            value_file.name = context.resolve_path(include_path, &value_file.name);
        }
    }

    /// Checks that all scripts and value files exist
    pub(crate) fn check_files(&self) -> Result<(), LoadError> {
        let value_files = self.value_files.iter().map(|value_file| &value_file.name);

        for path in self
            .before_scripts
            .iter()
            .chain(&self.after_scripts)
            .chain(value_files)
        {
            if let Err(source) = std::fs::metadata(path) {
                return Err(LoadError::ScriptNotFound {
                    release: self.name.clone(),
                    path: path.clone(),
                    source,
                });
            }
        }

        Ok(())
    }

    pub fn apply_defaults(&mut self) {
        if self.namespace.is_empty() {
            self.namespace = self.name.clone();
        }
        self.atomic.get_or_insert(false);
        self.repository.get_or_insert_with(Repository::default);
        for value_file in &mut self.value_files {
            value_file.decrypt.get_or_insert(false);
        }
    }

    /// Overlays `overlay` onto a copy of this release
    ///
    /// Fields set in the overlay win, its scripts, values and value files are appended after the base entries.
    /// The name and include path of the base are kept.
    pub fn merged_with(&self, overlay: &Release) -> Release {
        let mut merged = self.clone();

        override_string(&mut merged.chart, &overlay.chart);
        override_string(&mut merged.version, &overlay.version);
        override_string(&mut merged.namespace, &overlay.namespace);

        if overlay.atomic.is_some() {
            merged.atomic = overlay.atomic;
        }

        merged.repository = match (merged.repository.take(), &overlay.repository) {
            (Some(base), Some(overlay)) => Some(base.merged_with(overlay)),
            (None, Some(overlay)) => Some(overlay.clone()),
            (base, None) => base,
        };

        merged
            .before_scripts
            .extend(overlay.before_scripts.iter().cloned());
        merged
            .after_scripts
            .extend(overlay.after_scripts.iter().cloned());
        merged.values.extend(overlay.values.iter().cloned());
        merged
            .value_files
            .extend(overlay.value_files.iter().cloned());

        merged
    }
}

fn override_string(target: &mut String, overlay: &str) {
    if !overlay.is_empty() {
        *target = overlay.to_string();
    }
}
