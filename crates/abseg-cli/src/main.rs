//! `abseg` command-line front end
//!
//! Loads an experiment configuration, refuses to start on configuration
//! errors, and runs simulated requests through the request hook.

use abseg_core::{
    CacheGroup, ExperimentRegistry, QueryParams, RegistryConfig, RequestKind,
    RequestScope, Resolution, SegmentKey, VisitorId,
};
use anyhow::{anyhow, bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("check", args)) => check(args),
        Some(("resolve", args)) => resolve(args),
        _ => Ok(()),
    }
}

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .short('c')
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Path to the TOML experiment configuration")
}

fn cli() -> Command {
    Command::new("abseg")
        .version(abseg_core::VERSION)
        .about("Two-segment experiment assignment for segmented page caches")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("check")
                .about("Validate a configuration and list its experiments")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("resolve")
                .about("Resolve every experiment for one simulated request")
                .arg(config_arg())
                .arg(
                    Arg::new("visitor")
                        .long("visitor")
                        .required(true)
                        .help("Visitor identity"),
                )
                .arg(
                    Arg::new("param")
                        .long("param")
                        .action(ArgAction::Append)
                        .value_parser(parse_pair)
                        .help("Request parameter as name=value (repeatable)"),
                )
                .arg(
                    Arg::new("member")
                        .long("member")
                        .action(ArgAction::Append)
                        .value_parser(parse_pair)
                        .help("Recorded membership as group=segment (repeatable)"),
                )
                .arg(
                    Arg::new("kind")
                        .long("kind")
                        .default_value("front-end")
                        .value_parser(value_parser!(RequestKind))
                        .help("Request kind: front-end, admin, cron, ajax or rest"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got `{raw}`")),
    }
}

fn load(args: &ArgMatches) -> Result<ExperimentRegistry> {
    let path = args
        .get_one::<PathBuf>("config")
        .ok_or_else(|| anyhow!("--config is required"))?;
    let config = RegistryConfig::load(path)
        .with_context(|| format!("loading {}", path.display()))?;
    let registry =
        ExperimentRegistry::from_config(&config).context("invalid experiment configuration")?;
    tracing::debug!(
        path = %path.display(),
        experiments = registry.len(),
        "configuration loaded"
    );
    Ok(registry)
}

fn check(args: &ArgMatches) -> Result<()> {
    let registry = load(args)?;

    println!("{} experiment(s)", registry.len());
    for experiment in registry.experiments() {
        let segments = experiment.segments();
        println!(
            "  {}: {} / {} ({})",
            experiment.cache_group(),
            segments.key(abseg_core::Segment::A),
            segments.key(abseg_core::Segment::B),
            experiment.strategy().name()
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct Entry<'a> {
    group: &'a CacheGroup,
    #[serde(flatten)]
    resolution: &'a Resolution,
}

#[derive(Serialize)]
struct Report<'a> {
    visitor: &'a VisitorId,
    kind: RequestKind,
    resolutions: Vec<Entry<'a>>,
}

fn resolve(args: &ArgMatches) -> Result<()> {
    let registry = load(args)?;

    let visitor = VisitorId::new(
        args.get_one::<String>("visitor")
            .ok_or_else(|| anyhow!("--visitor is required"))?
            .as_str(),
    );
    let kind = args
        .get_one::<RequestKind>("kind")
        .copied()
        .unwrap_or_default();
    let params: QueryParams = args
        .get_many::<(String, String)>("param")
        .into_iter()
        .flatten()
        .cloned()
        .collect();

    let service = registry.orchestrator().service();
    for (group, segment) in args
        .get_many::<(String, String)>("member")
        .into_iter()
        .flatten()
    {
        let group = CacheGroup::new(group.as_str())?;
        let Some(segment) = SegmentKey::new(segment.as_str()) else {
            bail!("empty segment for recorded membership of `{group}`");
        };
        service.set_group_for_user(&visitor, &group, &segment);
    }

    let mut scope = RequestScope::new(visitor.clone())
        .with_kind(kind)
        .with_params(params);
    let resolutions = registry.init_request(&mut scope);

    if args.get_flag("json") {
        let report = Report {
            visitor: &visitor,
            kind,
            resolutions: resolutions
                .iter()
                .map(|(group, resolution)| Entry { group, resolution })
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if resolutions.is_empty() {
        println!("{} request: no experiments resolved", kind.as_str());
    } else {
        for (group, resolution) in &resolutions {
            println!(
                "{group}\t{}\t{}",
                resolution.segment,
                resolution.source.as_str()
            );
        }
    }
    Ok(())
}
