//! `gxc-watch` command-line tool

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use gxc_watch::WatchConfig;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod simulate;

use simulate::SimulationOptions;

fn cli() -> Command {
    Command::new("gxc-watch")
        .version(gxc_watch::VERSION)
        .about("Live, debounced windows over cached collection contents")
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("simulate")
                .about("Run a simulated session: sync job, updates and one watch")
                .arg(
                    Arg::new("items")
                        .long("items")
                        .default_value("200")
                        .value_parser(value_parser!(u32))
                        .help("Number of elements in the simulated collection"),
                )
                .arg(
                    Arg::new("page-size")
                        .long("page-size")
                        .value_parser(value_parser!(u32))
                        .help("Items per page (overrides the config file)"),
                )
                .arg(
                    Arg::new("debounce-ms")
                        .long("debounce-ms")
                        .value_parser(value_parser!(u64))
                        .help("Debounce period in milliseconds (overrides the config file)"),
                )
                .arg(
                    Arg::new("targets")
                        .long("targets")
                        .value_delimiter(',')
                        .default_value("0")
                        .value_parser(value_parser!(u32))
                        .help("Element indices to scroll to, in order"),
                )
                .arg(
                    Arg::new("updates")
                        .long("updates")
                        .default_value("20")
                        .value_parser(value_parser!(usize))
                        .help("Number of item state changes made by the background job"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Watch configuration file (TOML)"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print pages as JSON lines"),
                ),
        )
        .subcommand(Command::new("config").about("Print the default watch configuration as TOML"))
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    result.context("failed to initialise logging")
}

fn simulation_options(args: &ArgMatches) -> anyhow::Result<SimulationOptions> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => WatchConfig::from_path(path)?,
        None => WatchConfig::default(),
    };
    if let Some(&page_size) = args.get_one::<u32>("page-size") {
        config.page_size = page_size;
    }
    if let Some(&debounce_ms) = args.get_one::<u64>("debounce-ms") {
        config = config.with_debounce(Duration::from_millis(debounce_ms));
    }
    config.validate()?;

    Ok(SimulationOptions {
        items: args.get_one::<u32>("items").copied().unwrap_or(200),
        targets: args
            .get_many::<u32>("targets")
            .map(|targets| targets.copied().collect())
            .unwrap_or_default(),
        updates: args.get_one::<usize>("updates").copied().unwrap_or(20),
        json: args.get_flag("json"),
        config,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"))?;

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let options = simulation_options(args)?;
            let json = options.json;
            let report = simulate::run(options).await?;

            if !json {
                let stats = report.stats;
                println!();
                println!("Session Report:");
                println!("  Pages: {}", report.pages);
                println!("  Targets: {} ({} duplicate)", stats.targets_received, stats.duplicate_targets);
                println!("  Triggers Coalesced: {}", stats.triggers_coalesced);
                println!("  Changes Ignored: {}", stats.changes_ignored);
                println!("  Failed Reads: {}", stats.reads_failed);
            }
        }
        Some(("config", _)) => {
            print!("{}", WatchConfig::default().to_toml_string()?);
        }
        _ => {}
    }
    Ok(())
}
