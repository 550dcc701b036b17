//! a loaded manifest and the queries resolving releases for targets
use crate::context::LoadContext;
use crate::directive::{DirectiveResolver, INCLUDE_PATH_KEY};
use crate::error::{LoadError, ResolveError};
use crate::normalize::normalize;
use crate::release::{Release, Repository};
use crate::schema::Schema;
use crate::target::{Component, Installs, TargetKind};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Schema file replacing the embedded schema. Ignored when the file does not exist.
    pub schema: Option<PathBuf>,

    /// Unset environment variables resolve to an empty string (used for dry runs)
    pub permissive: bool,
}

/// A fully loaded and validated manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Config {
    repositories: Vec<Repository>,
    releases: Vec<Release>,
    installs: Installs,
}

impl Config {
    /// Loads a manifest file
    ///
    /// Runs directive resolution, normalization, schema defaults and validation and finally [Config::decode].
    #[tracing::instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path, options: &LoadOptions) -> Result<Self, LoadError> {
        let context = LoadContext::for_file(path, options.permissive);
        let schema = Schema::load(options.schema.as_deref())?;

        let document = DirectiveResolver::new(&context).resolve_file(path)?;
        let mut document = normalize(document)?;
        drop_target_include_paths(&mut document);
        schema.apply_defaults(&mut document);
        schema.validate(&document)?;

        let config = Self::decode(document, &context)?;
        tracing::info!(
            repositories = config.repositories.len(),
            releases = config.releases.len(),
            "config loaded"
        );

        Ok(config)
    }

    /// Decodes a canonical, validated document
    pub fn decode(document: JsonValue, context: &LoadContext) -> Result<Self, LoadError> {
        let JsonValue::Object(mut root) = document else {
            return Err(invalid_document("document is not a mapping"));
        };
        let Some(JsonValue::Object(mut spec)) = root.remove("spec") else {
            return Err(invalid_document("spec is not a mapping"));
        };

        let repositories: Vec<Repository> = match spec.remove("repositories") {
            Some(raw) => decode_list(raw, "repositories")?,
            None => vec![],
        };
        if let Some(name) = first_duplicate(repositories.iter().map(|r| r.name.as_str())) {
            return Err(LoadError::DuplicateRepository { name });
        }

        let mut releases: Vec<Release> = match spec.remove("releases") {
            Some(raw) => decode_list(raw, "releases")?,
            None => vec![],
        };
        if let Some(name) = first_duplicate(releases.iter().map(|r| r.name.as_str())) {
            return Err(LoadError::DuplicateRelease { name });
        }

        let installs = match spec.remove("installs") {
            Some(JsonValue::Object(raw)) => decode_installs(raw, context)?,
            Some(JsonValue::Null) | None => Installs::default(),
            Some(_) => return Err(invalid_document("spec.installs is not a mapping")),
        };
        installs.validate()?;

        for release in &mut releases {
            release.resolve_paths(context);
            release.check_files()?;
            release.apply_defaults();
        }

        let config = Self {
            repositories,
            releases,
            installs,
        };
        config.check_references()?;

        Ok(config)
    }

    /// Every component must name a declared release
    fn check_references(&self) -> Result<(), LoadError> {
        for (kind, target, component) in self.installs.components() {
            if self.release(component.name()).is_err() {
                return Err(LoadError::UnknownReleaseReference {
                    kind,
                    target: target.to_string(),
                    release: component.name().to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn repositories(&self) -> &[Repository] {
        &self.repositories
    }

    /// Base releases in declaration order, with defaults applied
    pub fn releases(&self) -> &[Release] {
        &self.releases
    }

    pub fn installs(&self) -> &Installs {
        &self.installs
    }

    pub fn environments(&self) -> impl Iterator<Item = &str> {
        self.installs.environments.keys().map(String::as_str)
    }

    pub fn projects(&self) -> impl Iterator<Item = &str> {
        self.installs.projects.keys().map(String::as_str)
    }

    pub fn targets(&self, kind: TargetKind) -> impl Iterator<Item = &str> {
        self.installs.targets(kind).keys().map(String::as_str)
    }

    /// The base release, without any override
    pub fn release(&self, name: &str) -> Result<&Release, ResolveError> {
        self.releases
            .iter()
            .find(|release| release.name == name)
            .ok_or_else(|| ResolveError::ReleaseNotFound {
                name: name.to_string(),
            })
    }

    /// A release as installed into one target
    pub fn target_release(
        &self,
        name: &str,
        target: &str,
        kind: TargetKind,
    ) -> Result<Release, ResolveError> {
        let base = self.release(name)?;
        let component = self
            .installs
            .target(kind, target)
            .and_then(|components| components.iter().find(|c| c.name() == name))
            .ok_or_else(|| ResolveError::ReleaseNotFoundForTarget {
                name: name.to_string(),
                kind,
                target: target.to_string(),
            })?;

        Ok(resolve(base, component))
    }

    /// All releases installed into one target, in release declaration order
    pub fn target_releases(
        &self,
        target: &str,
        kind: TargetKind,
    ) -> Result<Vec<Release>, ResolveError> {
        let components = self.installs.target(kind, target).ok_or_else(|| {
            ResolveError::UnknownTarget {
                target: target.to_string(),
                kind,
            }
        })?;

        let by_name: HashMap<&str, &Component> = components
            .iter()
            .map(|component| (component.name(), component))
            .collect();

        Ok(self
            .releases
            .iter()
            .filter_map(|base| {
                by_name
                    .get(base.name.as_str())
                    .map(|component| resolve(base, component))
            })
            .collect())
    }
}

/// Merges a component's override onto its base release
fn resolve(base: &Release, component: &Component) -> Release {
    let mut release = base.merged_with(&component.override_values());
    release.apply_defaults();

    tracing::trace!(release = %release.name, ?release, "resolved");
    release
}

fn decode_list<T: serde::de::DeserializeOwned>(
    raw: JsonValue,
    what: &str,
) -> Result<Vec<T>, LoadError> {
    if raw.is_null() {
        return Ok(vec![]);
    }

    serde_json::from_value(raw).map_err(|source| LoadError::Decode {
        what: what.to_string(),
        source,
    })
}

fn decode_installs(
    mut raw: Map<String, JsonValue>,
    context: &LoadContext,
) -> Result<Installs, LoadError> {
    let mut installs = Installs::default();

    for kind in TargetKind::ALL {
        let targets = match raw.remove(kind.as_str()) {
            Some(JsonValue::Object(targets)) => targets,
            Some(JsonValue::Null) | None => continue,
            Some(_) => {
                return Err(invalid_document(&format!(
                    "spec.installs.{kind} is not a mapping"
                )))
            }
        };

        for (target, entries) in targets {
            let entries = match entries {
                JsonValue::Array(entries) => entries,
                JsonValue::Null => vec![],
                _ => {
                    return Err(invalid_document(&format!(
                        "spec.installs.{kind}.{target} is not a list"
                    )))
                }
            };

            let mut components = Vec::with_capacity(entries.len());
            for entry in entries {
                if let Some(component) = Component::from_raw(entry, kind, &target, context)? {
                    components.push(component);
                }
            }

            tracing::debug!(%kind, %target, components = components.len(), "target decoded");
            installs.targets_mut(kind).insert(target, components);
        }
    }

    Ok(installs)
}

fn first_duplicate<'a>(names: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Some(name.to_string());
        }
    }

    None
}

/// An included target map carries an `includePath` key that would read as a target name
fn drop_target_include_paths(document: &mut JsonValue) {
    for kind in TargetKind::ALL {
        let pointer = format!("/spec/installs/{kind}");
        if let Some(JsonValue::Object(targets)) = document.pointer_mut(&pointer) {
            targets.shift_remove(INCLUDE_PATH_KEY);
        }
    }
}

fn invalid_document(message: &str) -> LoadError {
    LoadError::InvalidDocument {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::release::Value;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn context() -> LoadContext {
        LoadContext::new(PathBuf::new(), false)
    }

    fn decode(document: JsonValue) -> Result<Config, LoadError> {
        Config::decode(document, &context())
    }

    fn value(name: &str, value: JsonValue) -> Value {
        serde_json::from_value(json!({"name": name, "value": value})).unwrap()
    }

    fn manifest() -> Config {
        decode(json!({
            "version": "1",
            "spec": {
                "repositories": [{"name": "stable", "url": "https://charts.example.com"}],
                "releases": [
                    {"name": "web", "chart": "stable/web", "values": [{"name": "replicas", "value": 1}]},
                    {"name": "api", "chart": "stable/api", "atomic": true},
                    {"name": "jobs", "chart": "stable/jobs"}
                ],
                "installs": {
                    "environments": {
                        "dev": [
                            "api",
                            {"name": "web", "namespace": "custom", "values": [{"name": "debug", "value": true}]}
                        ],
                        "prod": ["web"]
                    },
                    "projects": {
                        "shop": ["jobs", {"name": "api", "atomic": false, "version": "2.0.0"}]
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn releases_keep_declaration_order() {
        let config = manifest();

        let names: Vec<_> = config.releases().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["web", "api", "jobs"]);
        assert_eq!(config.repositories().len(), 1);
        assert_eq!(config.environments().collect::<Vec<_>>(), vec!["dev", "prod"]);
        assert_eq!(config.projects().collect::<Vec<_>>(), vec!["shop"]);
    }

    #[test]
    fn missing_repositories_are_empty() {
        let config = decode(json!({
            "version": "1",
            "spec": {"releases": [{"name": "web", "chart": "c"}], "installs": {}}
        }))
        .unwrap();

        assert!(config.repositories().is_empty());
    }

    #[test]
    fn duplicate_release_fails() {
        let error = decode(json!({
            "version": "1",
            "spec": {
                "releases": [{"name": "web", "chart": "a"}, {"name": "web", "chart": "b"}],
                "installs": {}
            }
        }))
        .unwrap_err();

        assert!(matches!(error, LoadError::DuplicateRelease { name } if name == "web"));
    }

    #[test]
    fn duplicate_repository_fails() {
        let error = decode(json!({
            "version": "1",
            "spec": {
                "repositories": [
                    {"name": "stable", "url": "https://a.example.com"},
                    {"name": "stable", "url": "https://b.example.com"}
                ],
                "releases": [],
                "installs": {}
            }
        }))
        .unwrap_err();

        assert!(matches!(error, LoadError::DuplicateRepository { name } if name == "stable"));
    }

    #[test]
    fn dangling_reference_fails() {
        let error = decode(json!({
            "version": "1",
            "spec": {
                "releases": [{"name": "web", "chart": "c"}],
                "installs": {"environments": {"development": ["test-release"]}}
            }
        }))
        .unwrap_err();

        assert_eq!(
            error.to_string(),
            "environment development: release test-release not found"
        );
    }

    #[test]
    fn nameless_components_are_skipped() {
        let config = decode(json!({
            "version": "1",
            "spec": {
                "releases": [{"name": "web", "chart": "c"}],
                "installs": {"environments": {"dev": ["web", {"namespace": "custom"}]}}
            }
        }))
        .unwrap();

        assert_eq!(config.installs().target(TargetKind::Environments, "dev").unwrap().len(), 1);
    }

    #[test]
    fn release_without_override_gets_defaults() {
        let config = manifest();

        let release = config
            .target_release("web", "prod", TargetKind::Environments)
            .unwrap();

        assert_eq!(release.namespace, "web");
        assert_eq!(release.atomic, Some(false));
        assert_eq!(release.repository, Some(Repository::default()));
        assert_eq!(release.values, vec![value("replicas", json!(1))]);
        assert!(release.before_scripts.is_empty());
        assert_eq!(&release, config.release("web").unwrap());
    }

    #[test]
    fn override_wins_and_values_append() {
        let config = manifest();
        let base = config.release("web").unwrap().clone();

        let release = config
            .target_release("web", "dev", TargetKind::Environments)
            .unwrap();

        assert_eq!(release.namespace, "custom");
        assert_eq!(release.values.len(), base.values.len() + 1);
        assert_eq!(
            release.values,
            vec![value("replicas", json!(1)), value("debug", json!(true))]
        );
        assert_eq!(config.release("web").unwrap(), &base);
    }

    #[test]
    fn override_can_switch_atomic_off() {
        let config = manifest();

        let release = config
            .target_release("api", "shop", TargetKind::Projects)
            .unwrap();

        assert_eq!(release.atomic, Some(false));
        assert_eq!(release.version, "2.0.0");
        assert!(config.release("api").unwrap().is_atomic());
    }

    #[test]
    fn resolution_errors() {
        let config = manifest();

        assert_eq!(
            config.target_release("missing", "dev", TargetKind::Environments),
            Err(ResolveError::ReleaseNotFound {
                name: "missing".into()
            })
        );
        assert_eq!(
            config.target_release("jobs", "dev", TargetKind::Environments),
            Err(ResolveError::ReleaseNotFoundForTarget {
                name: "jobs".into(),
                kind: TargetKind::Environments,
                target: "dev".into()
            })
        );
        assert_eq!(
            config.target_releases("unknown-target", TargetKind::Projects),
            Err(ResolveError::UnknownTarget {
                target: "unknown-target".into(),
                kind: TargetKind::Projects
            })
        );
    }

    #[test]
    fn target_releases_follow_release_order() {
        let config = manifest();

        let releases = config
            .target_releases("dev", TargetKind::Environments)
            .unwrap();

        let names: Vec<_> = releases.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["web", "api"]);
        assert_eq!(releases[0].namespace, "custom");
    }

    #[test]
    fn repeated_resolution_is_stable() {
        let config = manifest();

        let first = config
            .target_releases("dev", TargetKind::Environments)
            .unwrap();
        let other = config
            .target_releases("prod", TargetKind::Environments)
            .unwrap();
        let second = config
            .target_releases("dev", TargetKind::Environments)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(other[0].values.len(), 1);
    }

    #[test]
    fn targets_can_be_empty() {
        let config = decode(json!({
            "version": "1",
            "spec": {
                "releases": [{"name": "web", "chart": "c"}],
                "installs": {"environments": {"empty": []}}
            }
        }))
        .unwrap();

        assert_eq!(
            config.target_releases("empty", TargetKind::Environments),
            Ok(vec![])
        );
    }
}
