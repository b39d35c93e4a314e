use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use lensgrid::config::Config;
use lensgrid::error::RectifyResult;
use std::process;
use tracing::{error, info, warn};

mod cmd;
mod reports;

#[derive(Parser, Debug)]
#[command(author, version, about = "Microlens array grid detection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON file with search and evolution parameters
    #[arg(global = true, long = "config-file")]
    config_file: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Detect(cmd::detect::DetectArgs),
    Optics(cmd::optics::OpticsArgs),
}

fn resolve_config(
    cli_config: &Config,
    path: Option<&str>,
    matches: Option<&clap::ArgMatches>,
) -> RectifyResult<Config> {
    let Some(path) = path else {
        cli_config.validate()?;
        return Ok(cli_config.clone());
    };

    info!("⚖️  Loading parameters from: {}", path);
    let mut config = Config::load_from_file(path)?;
    match matches {
        Some(m) => config.merge_from_cli(cli_config, m),
        None => warn!("⚠️  Could not read command line overrides, using file values only."),
    }
    config.validate()?;
    Ok(config)
}

fn main() {
    tracing_subscriber::fmt::init();

    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    let result = match cli.command {
        Commands::Detect(args) => resolve_config(
            &args.config,
            cli.config_file.as_deref(),
            matches.subcommand_matches("detect"),
        )
        .and_then(|config| cmd::detect::run(args, config)),
        Commands::Optics(args) => cmd::optics::run(args),
    };

    if let Err(e) = result {
        error!("❌ {}", e);
        process::exit(1);
    }
}
