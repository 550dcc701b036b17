mod cli;

use helmctl::config::{Config, LoadOptions};
use helmctl::release::Release;
use helmctl::target::TargetKind;
use indexmap::IndexMap;
use serde::Serialize;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_env("HELMCTL_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if cli.dry_run {
        tracing::info!("dry run mode is enabled");
    }

    let command_result = match &cli.command {
        cli::Command::Validate => validate(&cli).map(|_| ()),
        cli::Command::Plan(plan_cli) => plan(&cli, plan_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

fn validate(cli: &cli::Cli) -> anyhow::Result<Config> {
    tracing::info!(file = %cli.file.display(), "loading config");

    let options = LoadOptions {
        schema: cli.schema.clone(),
        permissive: cli.dry_run,
    };
    let config = Config::load(&cli.file, &options)?;

    tracing::info!("config is valid");
    Ok(config)
}

/// Resolved releases grouped by target
#[derive(Serialize, Default)]
struct Plan<'c> {
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<&'c Config>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    environments: IndexMap<String, Vec<Release>>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    projects: IndexMap<String, Vec<Release>>,
}

impl Plan<'_> {
    fn targets_mut(&mut self, kind: TargetKind) -> &mut IndexMap<String, Vec<Release>> {
        match kind {
            TargetKind::Environments => &mut self.environments,
            TargetKind::Projects => &mut self.projects,
        }
    }
}

pub fn plan(cli: &cli::Cli, plan_cli: &cli::PlanCommand) -> anyhow::Result<()> {
    let config = validate(cli)?;

    let mut plan = Plan {
        config: plan_cli.config.then_some(&config),
        ..Default::default()
    };

    let target = match (&plan_cli.environment, &plan_cli.project) {
        (Some(environment), _) => Some((environment, TargetKind::Environments)),
        (None, Some(project)) => Some((project, TargetKind::Projects)),
        (None, None) => None,
    };

    match (target, &plan_cli.release) {
        (Some((target, kind)), Some(release)) => {
            let release = config.target_release(release, target, kind)?;
            plan.targets_mut(kind).insert(target.clone(), vec![release]);
        }
        (Some((target, kind)), None) => {
            let releases = config.target_releases(target, kind)?;
            plan.targets_mut(kind).insert(target.clone(), releases);
        }
        (None, Some(_)) => anyhow::bail!("--release requires --environment or --project"),
        (None, None) => {
            for kind in TargetKind::ALL {
                for target in config.targets(kind) {
                    match config.target_releases(target, kind) {
                        Ok(releases) => {
                            plan.targets_mut(kind).insert(target.to_string(), releases);
                        }
                        Err(error) => tracing::error!(%kind, %target, "{error}"),
                    }
                }
            }
        }
    }

    output(&plan_cli.output, &plan)
}

fn output(output: &cli::OutputArgs, value: &impl Serialize) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
    };

    Ok(())
}
