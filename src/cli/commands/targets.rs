//! Targets command - installable build products

use super::{cancel_on_ctrl_c, Workspace};
use crate::builder::Builder;
use crate::cli::args::{ProjectArgs, TargetsArgs};
use crate::config::Config;
use crate::error::AutobuildResult;
use crate::makecache::{BuildTarget, TargetKind};
use crate::ui::{TaskSpinner, UiContext};
use console::style;

/// Execute the targets command
pub async fn execute(args: TargetsArgs, project: &ProjectArgs, config: &Config) -> AutobuildResult<()> {
    let ctx = UiContext::detect();
    let workspace = Workspace::open(project, config).await?;

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start("Loading build targets");

    let result = workspace.builder.build_targets(&cancel_on_ctrl_c()).await;
    workspace.manager.shutdown();

    let targets = match result {
        Ok(targets) => {
            spinner.stop(&format!("{} targets", targets.len()));
            targets
        }
        Err(e) => {
            spinner.stop_error("Failed to load build targets");
            return Err(e);
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&targets)?);
        return Ok(());
    }

    if targets.is_empty() {
        println!("{}", style("No installable targets").dim());
        return Ok(());
    }

    let width = targets.iter().map(|t| t.name.len()).max().unwrap_or(0);
    for target in &targets {
        println!("{}", format_target(target, width));
    }
    Ok(())
}

fn format_target(target: &BuildTarget, width: usize) -> String {
    let kind = match target.kind {
        TargetKind::Program => "program",
        TargetKind::Library => "library",
        TargetKind::Script => "script",
    };
    let install = target
        .install_directory
        .as_ref()
        .map(|dir| dir.display().to_string())
        .unwrap_or_else(|| "-".to_string());
    format!("{:<width$}  {:<7}  {}", target.name, kind, install, width = width)
}
