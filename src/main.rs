//! autobuild - build orchestration for autotools projects
//!
//! CLI entry point that dispatches to subcommands.

use autobuild::cli::{commands, Cli, Commands};
use autobuild::config::ConfigManager;
use autobuild::error::AutobuildResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> AutobuildResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    // 0 = warn (progress only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("autobuild=warn"),
        1 => EnvFilter::new("autobuild=info"),
        _ => EnvFilter::new("autobuild=debug"),
    };

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .init();
    }

    autobuild::ui::init_theme();

    match cli.command {
        Commands::Build(args) => commands::build(args, &cli.project, &config).await,
        Commands::Install => commands::install(&cli.project, &config).await,
        Commands::Flags(args) => commands::flags(args, &cli.project, &config).await,
        Commands::Targets(args) => commands::targets(args, &cli.project, &config).await,
        Commands::Settings(args) => commands::settings(args).await,
        Commands::Config(args) => commands::config(args, &config_manager, &config).await,
    }
}
