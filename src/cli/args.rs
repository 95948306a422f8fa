//! CLI argument definitions using clap derive

use crate::builder::BuildFlags;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// autobuild - build orchestration for autotools projects
///
/// Bootstraps, configures and builds projects out of tree, and answers
/// compiler flag and target queries from cached make metadata.
#[derive(Parser, Debug)]
#[command(name = "autobuild")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "AUTOBUILD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub project: ProjectArgs,
}

/// Selects the project and build configuration to operate on
#[derive(Args, Debug, Clone, Default)]
pub struct ProjectArgs {
    /// Project directory (defaults to the current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Build configuration id from autobuild.toml
    #[arg(short = 'C', long = "configuration", global = true, env = "AUTOBUILD_CONFIGURATION")]
    pub configuration: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bootstrap, configure and build the project
    Build(BuildArgs),

    /// Build and install the project
    Install,

    /// Print the compiler flags used for a source file
    Flags(FlagsArgs),

    /// List installable build targets
    Targets(TargetsArgs),

    /// Show editor settings for a file from .editorconfig
    Settings(SettingsArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the build command
#[derive(Parser, Debug, Default)]
pub struct BuildArgs {
    /// Regenerate the configure script even if it exists
    #[arg(long)]
    pub force_bootstrap: bool,

    /// Run `make clean` before building
    #[arg(long)]
    pub clean: bool,

    /// Stop after configuring
    #[arg(long)]
    pub no_build: bool,

    /// Skip the configure stage
    #[arg(long)]
    pub no_configure: bool,
}

impl BuildArgs {
    pub fn flags(&self) -> BuildFlags {
        let mut flags = BuildFlags::empty();
        flags.set(BuildFlags::FORCE_BOOTSTRAP, self.force_bootstrap);
        flags.set(BuildFlags::FORCE_CLEAN, self.clean);
        flags.set(BuildFlags::NO_BUILD, self.no_build);
        flags.set(BuildFlags::NO_CONFIGURE, self.no_configure);
        flags
    }
}

/// Arguments for the flags command
#[derive(Parser, Debug)]
pub struct FlagsArgs {
    /// Source file, relative to the current directory
    pub file: PathBuf,

    /// Print a JSON array instead of one flag per line
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the targets command
#[derive(Parser, Debug)]
pub struct TargetsArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the settings command
#[derive(Parser, Debug)]
pub struct SettingsArgs {
    /// File to resolve settings for
    pub file: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}
