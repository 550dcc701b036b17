//! # helmctl - helm releases per environment and project
//!
//! `helmctl` reads a single manifest describing helm repositories, releases and where those releases are installed,
//! and resolves it into fully merged release definitions. Running helm is left to a deployment executor (see
//! [install]).
//!
//! ## Introduction for developers
//!
//! Read this to understand how a manifest becomes a list of releases.
//!
//! ### The manifest
//!
//! ```yaml
//! version: "1"
//! spec:
//!   repositories:
//!     - name: stable
//!       url: https://charts.example.com
//!       password: !env CHARTS_PASSWORD
//!   releases:
//!     - name: ingress
//!       chart: stable/ingress
//!       values:
//!         - name: replicas
//!           value: 1
//!     - !include releases/metrics.yaml
//!   installs:
//!     environments:
//!       development:
//!         - ingress
//!       production:
//!         - name: ingress
//!           namespace: edge
//!           values:
//!             - name: replicas
//!               value: 3
//!     projects:
//!       shop:
//!         - metrics
//! ```
//!
//! Releases are declared once. `installs` lists the targets, either `environments` or `projects` (see
//! [target::TargetKind]). Each target holds components: a bare release name or a record that overrides fields of the
//! release for that target only.
//!
//! ### Loading
//!
//! see [config::Config::load]
//!
//! 1. The root file is parsed with [serde_yaml] and every tagged node is rewritten by
//!    [directive::DirectiveResolver]. `!env NAME` becomes the value of an environment variable, `!include path` is
//!    replaced by the parsed (and itself resolved) file. Included mappings get an extra `includePath` key so that
//!    relative paths declared inside them resolve against the included file.
//! 2. [normalize::normalize] turns the yaml tree into a string keyed [serde_json::Value].
//! 3. [schema::Schema] fills in defaults and validates the document. The schema is closed: unknown keys are rejected.
//! 4. [config::Config] decodes the document into [release::Repository], [release::Release] and
//!    [target::Installs], then checks names for duplicates, resolves script and value file paths against their
//!    declaring file, and ensures every referenced file and release exists.
//!
//! All settings of a load (root directory, permissive env lookup) travel in a [context::LoadContext], so several
//! manifests can be loaded side by side.
//!
//! ### Resolving
//!
//! [config::Config::target_release] merges a component's override onto its base release with
//! [release::Release::merged_with]:
//!
//! | **field**                      | **merge**                          |
//! |--------------------------------|------------------------------------|
//! | chart, version, namespace      | override wins when set             |
//! | atomic                         | override wins when set             |
//! | repository                     | per field, override wins when set  |
//! | scripts, values, value files   | override entries appended to base  |
//!
//! The merge returns a new release. Base releases are never modified after loading, so resolving the same release
//! again yields the same result.
//!
pub mod config;
pub mod context;
pub mod directive;
pub mod error;
pub mod install;
pub mod normalize;
pub mod release;
pub mod schema;
pub mod target;
mod visit;
