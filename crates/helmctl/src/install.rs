//! installing resolved releases through external collaborators
//!
//! The [Installer] only orchestrates. Talking to helm, the cluster, the secret store or the shell is left to the
//! [DeploymentExecutor], [RepositoryRegistrar], [NamespaceEnsurer], [SecretDecryptor] and [ScriptRunner]
//! implementations handed to it.
use crate::config::Config;
use crate::error::ResolveError;
use crate::release::{Release, Repository};
use crate::target::TargetKind;
use std::path::{Path, PathBuf};

/// A failed collaborator call with whatever the process printed
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, derive_new::new)]
#[error("{message}: {output}")]
pub struct ExecutionFailure {
    pub message: String,
    pub output: String,
}

/// Installs or upgrades a release, returning the captured output
pub trait DeploymentExecutor {
    fn deploy(
        &mut self,
        release: &Release,
        options: &ExecutionOptions,
    ) -> Result<String, ExecutionFailure>;
}

/// Makes a chart repository known to the deployment tool
pub trait RepositoryRegistrar {
    fn add_repository(&mut self, name: &str, url: &url::Url) -> Result<(), ExecutionFailure>;
}

/// Creates the namespace when it is missing. Must not change anything on `dry_run`.
pub trait NamespaceEnsurer {
    fn ensure_namespace(&mut self, namespace: &str, dry_run: bool) -> Result<(), ExecutionFailure>;
}

/// Returns the plain content of an encrypted value file
pub trait SecretDecryptor {
    fn decrypt(&mut self, path: &Path) -> Result<Vec<u8>, ExecutionFailure>;
}

pub trait ScriptRunner {
    fn run(&mut self, script: &Path) -> Result<String, ExecutionFailure>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    pub dry_run: bool,
    /// Show what would change instead of installing
    pub diff: bool,
    pub skip_repositories: bool,
    pub skip_scripts: bool,
    /// Run scripts even on `dry_run`
    pub with_scripts: bool,
    /// Deployment tool binary
    pub binary: PathBuf,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            diff: false,
            skip_repositories: false,
            skip_scripts: false,
            with_scripts: false,
            binary: PathBuf::from("helm"),
        }
    }
}

impl ExecutionOptions {
    /// Arguments for the deployment tool installing `release`
    pub fn args(&self, release: &Release) -> Vec<String> {
        let mut args: Vec<String> = if self.diff {
            vec!["diff".into(), "upgrade".into(), "--allow-unreleased".into()]
        } else {
            vec!["upgrade".into(), "-i".into()]
        };
        args.extend([
            release.name.clone(),
            "--namespace".into(),
            release.namespace.clone(),
        ]);

        if !release.version.is_empty() {
            args.extend(["--version".into(), release.version.clone()]);
        }
        if release.is_atomic() {
            args.push("--atomic".into());
        }

        for value_file in &release.value_files {
            args.extend(["-f".into(), value_file.name.display().to_string()]);
        }

        for value in &release.values {
            let flag = if value.is_string() {
                "--set-string"
            } else {
                "--set"
            };
            args.extend([flag.into(), value.key_value_pair()]);
        }

        if self.dry_run && !self.diff {
            args.push("--dry-run".into());
        }

        args.push(release.chart.clone());
        args
    }

    fn skip_scripts_reason(&self) -> Option<&'static str> {
        if self.dry_run && !self.with_scripts {
            Some("dry run")
        } else if self.skip_scripts {
            Some("skip scripts")
        } else {
            None
        }
    }
}

/// Which releases of a target to install
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseSelector {
    One(String),
    All,
}

impl From<&str> for ReleaseSelector {
    fn from(name: &str) -> Self {
        match name {
            "all" => ReleaseSelector::All,
            name => ReleaseSelector::One(name.to_string()),
        }
    }
}

/// The collaborator call that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Repository,
    Script,
    Decrypt,
    Namespace,
    Deploy,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Step::Repository => "adding repository",
            Step::Script => "running script",
            Step::Decrypt => "decrypting value file",
            Step::Namespace => "ensuring namespace",
            Step::Deploy => "deploying release",
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InstallError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("invalid url of repository {name}, <scheme>://<host> format required")]
    InvalidRepositoryUrl {
        name: String,
        #[source]
        source: url::ParseError,
    },
    #[error("{step} failed for {subject}")]
    Collaborator {
        step: Step,
        subject: String,
        #[source]
        source: ExecutionFailure,
    },
    #[error("failed to write {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Output of one installed release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseOutput {
    pub release: String,
    pub output: String,
}

/// What an [Installer::install] run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub releases: Vec<ReleaseOutput>,
}

impl InstallReport {
    /// One block per release, in install order
    pub fn render(&self) -> String {
        let mut rendered = String::new();
        for ReleaseOutput { release, output } in &self.releases {
            let output = output.trim_end();
            if output.is_empty() {
                rendered.push_str(&format!("Release {release}: no changes\n"));
            } else {
                let output = output.replace('\n', "\n\t");
                rendered.push_str(&format!("Release {release}:\n\t{output}\n"));
            }
        }
        rendered
    }
}

pub struct Installer<'c> {
    config: &'c Config,
    options: ExecutionOptions,
    executor: Box<dyn DeploymentExecutor + 'c>,
    registrar: Box<dyn RepositoryRegistrar + 'c>,
    namespaces: Box<dyn NamespaceEnsurer + 'c>,
    decryptor: Box<dyn SecretDecryptor + 'c>,
    scripts: Box<dyn ScriptRunner + 'c>,
}

impl<'c> Installer<'c> {
    pub fn new(
        config: &'c Config,
        options: ExecutionOptions,
        executor: impl DeploymentExecutor + 'c,
        registrar: impl RepositoryRegistrar + 'c,
        namespaces: impl NamespaceEnsurer + 'c,
        decryptor: impl SecretDecryptor + 'c,
        scripts: impl ScriptRunner + 'c,
    ) -> Self {
        Self {
            config,
            options,
            executor: Box::new(executor),
            registrar: Box::new(registrar),
            namespaces: Box::new(namespaces),
            decryptor: Box::new(decryptor),
            scripts: Box::new(scripts),
        }
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// Installs the selected releases of a target
    ///
    /// Releases are resolved before anything is touched, so an unknown release or target fails without side
    /// effects. The first failing step stops the run.
    #[tracing::instrument(level = "info", skip(self, selector))]
    pub fn install(
        &mut self,
        selector: &ReleaseSelector,
        target: &str,
        kind: TargetKind,
    ) -> Result<InstallReport, InstallError> {
        let releases = match selector {
            ReleaseSelector::One(name) => vec![self.config.target_release(name, target, kind)?],
            ReleaseSelector::All => self.config.target_releases(target, kind)?,
        };

        let config = self.config;
        for repository in config.repositories() {
            self.add_repository(repository)?;
        }

        let mut report = InstallReport::default();
        for release in releases {
            let output = self.install_release(release)?;
            report.releases.push(output);
        }

        if self.options.diff {
            tracing::info!("diff:\n{}", report.render());
        }

        Ok(report)
    }

    #[tracing::instrument(level = "info", skip_all, fields(release = %release.name))]
    fn install_release(&mut self, mut release: Release) -> Result<ReleaseOutput, InstallError> {
        tracing::info!("installing release");
        self.run_scripts(&release.name, &release.before_scripts)?;

        if let Some(repository) = release.declared_repository() {
            self.add_repository(repository)?;
        }

        self.decrypt_value_files(&mut release)?;

        self.namespaces
            .ensure_namespace(&release.namespace, self.options.dry_run)
            .map_err(|source| collaborator(Step::Namespace, &release.name, source))?;

        tracing::info!(
            "executing {} {}",
            self.options.binary.display(),
            self.options.args(&release).join(" ")
        );
        let output = self
            .executor
            .deploy(&release, &self.options)
            .map_err(|source| collaborator(Step::Deploy, &release.name, source))?;
        if !self.options.diff {
            tracing::info!("{output}");
        }

        self.run_scripts(&release.name, &release.after_scripts)?;
        tracing::info!("release installed");

        Ok(ReleaseOutput {
            release: release.name,
            output,
        })
    }

    fn add_repository(&mut self, repository: &Repository) -> Result<(), InstallError> {
        if self.options.skip_repositories {
            tracing::info!(repository = %repository.name, "skipping repository, repositories are skipped");
            return Ok(());
        }

        let url = repository.url_with_credentials().map_err(|source| {
            InstallError::InvalidRepositoryUrl {
                name: repository.name.clone(),
                source,
            }
        })?;

        tracing::info!(repository = %repository.name, "adding repository");
        self.registrar
            .add_repository(&repository.name, &url)
            .map_err(|source| collaborator(Step::Repository, &repository.name, source))
    }

    fn run_scripts(&mut self, release: &str, scripts: &[PathBuf]) -> Result<(), InstallError> {
        for script in scripts {
            if let Some(reason) = self.options.skip_scripts_reason() {
                tracing::info!(script = %script.display(), reason, "skipping script");
                continue;
            }

            tracing::info!(script = %script.display(), "running script");
            let output = self
                .scripts
                .run(script)
                .map_err(|source| collaborator(Step::Script, release, source))?;
            tracing::debug!(script = %script.display(), "{output}");
        }

        Ok(())
    }

    /// Writes decrypted copies next to flagged value files and points the release at them
    fn decrypt_value_files(&mut self, release: &mut Release) -> Result<(), InstallError> {
        for value_file in &mut release.value_files {
            if !value_file.needs_decryption() {
                continue;
            }

            tracing::info!(file = %value_file.name.display(), "decrypting value file");
            let content = self
                .decryptor
                .decrypt(&value_file.name)
                .map_err(|source| collaborator(Step::Decrypt, &release.name, source))?;

            let decrypted = decrypted_path(&value_file.name);
            std::fs::write(&decrypted, content).map_err(|source| InstallError::Io {
                path: decrypted.clone(),
                source,
            })?;
            value_file.name = decrypted;
        }

        Ok(())
    }
}

fn collaborator(step: Step, subject: &str, source: ExecutionFailure) -> InstallError {
    InstallError::Collaborator {
        step,
        subject: subject.to_string(),
        source,
    }
}

/// `secrets.yaml` -> `secrets.decr.yaml`
fn decrypted_path(path: &Path) -> PathBuf {
    match path.extension() {
        Some(extension) => path.with_extension(format!("decr.{}", extension.to_string_lossy())),
        None => path.with_extension("decr"),
    }
}
