//! inline directives resolved while parsing
//!
//! A directive is a yaml tag on a scalar node:
//! - `!env NAME` is replaced by the value of environment variable `NAME`
//! - `!include path` is replaced by the parsed content of `path`, relative to the root document's directory
//!
//! Included files are resolved with the same rules. Every mapping that an include produces (or every mapping element
//! of an included sequence) gets an extra [INCLUDE_PATH_KEY] entry holding the include path.
//!
//! Unknown tags are dropped and their value kept.
use crate::context::LoadContext;
use crate::error::LoadError;
use crate::visit::{TryVisitMut, VisitTaggedMut};
use serde_yaml::value::{Tag, TaggedValue};
use serde_yaml::Value;
use std::path::{Path, PathBuf};

/// Key injected into included mappings
pub const INCLUDE_PATH_KEY: &str = "includePath";

/// Includes nested deeper than this fail
pub const MAX_INCLUDE_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Env,
    Include,
}

impl Directive {
    fn from_tag(tag: &Tag) -> Option<Self> {
        if *tag == "env" {
            Some(Directive::Env)
        } else if *tag == "include" {
            Some(Directive::Include)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Directive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Directive::Env => f.write_str("!env"),
            Directive::Include => f.write_str("!include"),
        }
    }
}

/// Rewrites all directives of a document into literal values
pub struct DirectiveResolver<'c> {
    context: &'c LoadContext,

    /// Text of the document currently being walked, used to find the line of a failing directive
    source: String,

    /// Canonical paths of the files being resolved, outermost first
    include_chain: Vec<PathBuf>,
}

impl<'c> DirectiveResolver<'c> {
    pub fn new(context: &'c LoadContext) -> Self {
        Self {
            context,
            source: String::new(),
            include_chain: vec![],
        }
    }

    /// Reads, parses and resolves a file
    #[tracing::instrument(level = "debug", skip(self, path), fields(path = %path.display()))]
    pub fn resolve_file(&mut self, path: &Path) -> Result<Value, LoadError> {
        let canonical = path.canonicalize().map_err(|source| LoadError::Io {
            path: path.to_owned(),
            source,
        })?;
        let source = std::fs::read_to_string(&canonical).map_err(|source| LoadError::Io {
            path: path.to_owned(),
            source,
        })?;

        self.include_chain.push(canonical);
        let resolved = self.resolve_str(&source, path);
        self.include_chain.pop();

        resolved
    }

    /// Parses and resolves a document
    ///
    /// `origin` only names the document in errors.
    pub fn resolve_str(&mut self, source: &str, origin: &Path) -> Result<Value, LoadError> {
        let mut document: Value =
            serde_yaml::from_str(source).map_err(|source| LoadError::Parse {
                path: origin.to_owned(),
                source,
            })?;

        let outer_source = std::mem::replace(&mut self.source, source.to_owned());
        let resolved = document.visit_tagged_mut::<LoadError>(self);
        self.source = outer_source;

        resolved.map(|_| document)
    }

    fn resolve_env(&self, value: Value) -> Result<Value, LoadError> {
        let name = self.scalar_argument(Directive::Env, value)?;

        if let Some(value) = lookup_env(&name) {
            return Ok(Value::String(value));
        }

        if self.context.permissive() {
            tracing::warn!(%name, "env variable is not set, using an empty string");
            return Ok(Value::String(String::new()));
        }

        Err(LoadError::UnresolvedEnvVar {
            line: self.locate(Directive::Env, &name),
            name,
        })
    }

    fn resolve_include(&mut self, value: Value) -> Result<Value, LoadError> {
        let include_path = self.scalar_argument(Directive::Include, value)?;
        let line = self.locate(Directive::Include, &include_path);
        let path = self.context.root_dir().join(&include_path);

        let include_failed = |cause: LoadError| LoadError::IncludeFailed {
            path: PathBuf::from(&include_path),
            line,
            cause: Box::new(cause),
        };

        let canonical = path.canonicalize().map_err(|source| {
            include_failed(LoadError::Io {
                path: path.clone(),
                source,
            })
        })?;

        if self.include_chain.contains(&canonical) {
            return Err(LoadError::IncludeCycle {
                path: PathBuf::from(&include_path),
                chain: self.include_chain.clone(),
            });
        }

        if self.include_chain.len() > MAX_INCLUDE_DEPTH {
            return Err(LoadError::IncludeDepthExceeded {
                path: PathBuf::from(&include_path),
                depth: MAX_INCLUDE_DEPTH,
            });
        }

        tracing::debug!(path = %include_path, "including file");
        let mut fragment = self.resolve_file(&path).map_err(include_failed)?;
        inject_include_path(&mut fragment, &include_path);

        Ok(fragment)
    }

    fn scalar_argument(&self, directive: Directive, value: Value) -> Result<String, LoadError> {
        match value {
            Value::String(string) => Ok(string),
            Value::Number(number) => Ok(number.to_string()),
            Value::Bool(bool) => Ok(bool.to_string()),
            _ => Err(LoadError::DirectiveOnNonScalar {
                directive,
                line: self.locate_tag(directive),
            }),
        }
    }

    /// Line (1-based) of the first `<directive> <argument>` in the current document
    fn locate(&self, directive: Directive, argument: &str) -> Option<usize> {
        let marker = directive.to_string();
        self.source
            .lines()
            .position(|line| {
                line.split_once(marker.as_str()).is_some_and(|(_, rest)| {
                    let rest = rest.split(" #").next().unwrap_or_default().trim();
                    rest.trim_matches(|c| c == '"' || c == '\'') == argument
                })
            })
            .map(|index| index + 1)
    }

    /// Line (1-based) of the first occurrence of a directive's tag in the current document
    fn locate_tag(&self, directive: Directive) -> Option<usize> {
        let marker = directive.to_string();
        self.source
            .lines()
            .position(|line| {
                line.split_once(marker.as_str())
                    .is_some_and(|(_, rest)| rest.is_empty() || rest.starts_with(char::is_whitespace))
            })
            .map(|index| index + 1)
    }
}

impl TryVisitMut<Value, LoadError> for DirectiveResolver<'_> {
    fn try_visit_mut(&mut self, node: &mut Value) -> Result<(), LoadError> {
        let TaggedValue { tag, value } = match std::mem::replace(node, Value::Null) {
            Value::Tagged(tagged) => *tagged,
            other => {
                *node = other;
                return Ok(());
            }
        };

        *node = match Directive::from_tag(&tag) {
            Some(Directive::Env) => self.resolve_env(value)?,
            Some(Directive::Include) => self.resolve_include(value)?,
            None => {
                tracing::warn!(%tag, "ignoring unknown tag");
                let mut value = value;
                value.visit_tagged_mut::<LoadError>(self)?;
                value
            }
        };

        Ok(())
    }
}

fn lookup_env(name: &str) -> Option<String> {
    if name.is_empty() || name.contains(['=', '\0']) {
        return None;
    }

    std::env::var_os(name).map(|value| value.to_string_lossy().into_owned())
}

fn inject_include_path(fragment: &mut Value, include_path: &str) {
    match fragment {
        Value::Mapping(mapping) => {
            if !mapping.contains_key(INCLUDE_PATH_KEY) {
                mapping.insert(INCLUDE_PATH_KEY.into(), include_path.into());
            }
        }
        Value::Sequence(sequence) => {
            for element in sequence {
                if let Value::Mapping(_) = element {
                    inject_include_path(element, include_path);
                }
            }
        }
        _ => {}
    }
}
