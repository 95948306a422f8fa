//! Flags command - compiler flags for a source file

use super::{absolute, cancel_on_ctrl_c, Workspace};
use crate::builder::Builder;
use crate::cli::args::{FlagsArgs, ProjectArgs};
use crate::config::Config;
use crate::error::AutobuildResult;
use crate::ui::{TaskSpinner, UiContext};

/// Execute the flags command
pub async fn execute(args: FlagsArgs, project: &ProjectArgs, config: &Config) -> AutobuildResult<()> {
    let ctx = UiContext::detect();
    let workspace = Workspace::open(project, config).await?;
    let file = absolute(&args.file)?;

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Loading build flags for {}", args.file.display()));

    let result = workspace
        .builder
        .build_flags(&file, &cancel_on_ctrl_c())
        .await;
    workspace.manager.shutdown();

    let flags = match result {
        Ok(flags) => {
            spinner.stop(&format!("{} flags", flags.len()));
            flags
        }
        Err(e) => {
            spinner.stop_error("Failed to load build flags");
            return Err(e);
        }
    };

    if args.json {
        println!("{}", serde_json::to_string(&flags)?);
    } else {
        for flag in flags {
            println!("{}", flag);
        }
    }
    Ok(())
}
