//! environments, projects and the releases installed into them
use crate::context::LoadContext;
use crate::error::LoadError;
use crate::release::Release;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::borrow::Cow;

/// The two kinds of deployment targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Environments,
    Projects,
}

impl TargetKind {
    pub const ALL: [TargetKind; 2] = [TargetKind::Environments, TargetKind::Projects];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Environments => "environments",
            TargetKind::Projects => "projects",
        }
    }

    pub fn singular(&self) -> &'static str {
        match self {
            TargetKind::Environments => "environment",
            TargetKind::Projects => "project",
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A release bound to a target
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Component {
    /// Just the release name, installed as declared
    Simple(String),
    /// Release name plus fields overriding the release for this target
    Complex(Release),
}

pub type Environment = Component;
pub type Project = Component;

impl Component {
    /// Builds a component from one entry of a target's list
    ///
    /// A string is a [Component::Simple], an object a [Component::Complex]. Objects without a `name` are logged and
    /// skipped (`Ok(None)`).
    pub fn from_raw(
        entry: JsonValue,
        kind: TargetKind,
        target: &str,
        context: &LoadContext,
    ) -> Result<Option<Self>, LoadError> {
        match entry {
            JsonValue::String(name) => Ok(Some(Component::Simple(name))),
            JsonValue::Object(fields) => {
                let name = fields
                    .get("name")
                    .and_then(JsonValue::as_str)
                    .map(str::to_string);
                let Some(name) = name else {
                    tracing::error!(
                        %kind,
                        %target,
                        entry = %JsonValue::Object(fields),
                        "cannot find name for component, skipping"
                    );
                    return Ok(None);
                };

                let mut component = Component::Complex(Release {
                    name,
                    ..Default::default()
                });
                component.apply_override(fields, context)?;

                Ok(Some(component))
            }
            entry => Err(LoadError::InvalidComponent {
                kind,
                target: target.to_string(),
                entry: entry.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Component::Simple(name) => name,
            Component::Complex(release) => &release.name,
        }
    }

    /// Fields to merge onto the base release. Empty for [Component::Simple].
    pub fn override_values(&self) -> Cow<'_, Release> {
        match self {
            Component::Simple(name) => Cow::Owned(Release {
                name: name.clone(),
                ..Default::default()
            }),
            Component::Complex(release) => Cow::Borrowed(release),
        }
    }

    /// Decodes `fields` as the override of a [Component::Complex]
    ///
    /// Paths are resolved against the declaring file and must exist. A [Component::Simple] ignores the call.
    pub fn apply_override(
        &mut self,
        fields: serde_json::Map<String, JsonValue>,
        context: &LoadContext,
    ) -> Result<(), LoadError> {
        let Component::Complex(release) = self else {
            return Ok(());
        };

        let mut decoded: Release =
            serde_json::from_value(JsonValue::Object(fields)).map_err(|source| {
                LoadError::Decode {
                    what: format!("override of release {}", release.name),
                    source,
                }
            })?;
        decoded.name = std::mem::take(&mut release.name);
        decoded.resolve_paths(context);
        decoded.check_files()?;

        *release = decoded;
        Ok(())
    }
}

/// Targets of both kinds, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Installs {
    pub environments: IndexMap<String, Vec<Environment>>,
    pub projects: IndexMap<String, Vec<Project>>,
}

impl Installs {
    pub fn targets(&self, kind: TargetKind) -> &IndexMap<String, Vec<Component>> {
        match kind {
            TargetKind::Environments => &self.environments,
            TargetKind::Projects => &self.projects,
        }
    }

    pub fn targets_mut(&mut self, kind: TargetKind) -> &mut IndexMap<String, Vec<Component>> {
        match kind {
            TargetKind::Environments => &mut self.environments,
            TargetKind::Projects => &mut self.projects,
        }
    }

    pub fn target(&self, kind: TargetKind, name: &str) -> Option<&[Component]> {
        self.targets(kind).get(name).map(Vec::as_slice)
    }

    /// All components with their target, environments first
    pub fn components(&self) -> impl Iterator<Item = (TargetKind, &str, &Component)> {
        TargetKind::ALL.into_iter().flat_map(move |kind| {
            self.targets(kind).iter().flat_map(move |(target, components)| {
                components
                    .iter()
                    .map(move |component| (kind, target.as_str(), component))
            })
        })
    }

    /// Checks that no target lists a release twice
    pub fn validate(&self) -> Result<(), LoadError> {
        for kind in TargetKind::ALL {
            for (target, components) in self.targets(kind) {
                let mut seen = std::collections::HashSet::new();
                for component in components {
                    if !seen.insert(component.name()) {
                        return Err(LoadError::DuplicateComponent {
                            kind,
                            target: target.clone(),
                            component: component.name().to_string(),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}
