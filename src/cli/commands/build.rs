//! Build and install commands

use super::{cancel_on_ctrl_c, Workspace};
use crate::builder::{BuildRequest, Builder, TaskOutcome};
use crate::cli::args::{BuildArgs, ProjectArgs};
use crate::config::Config;
use crate::error::AutobuildResult;
use crate::ui::{self, BuildProgress, UiContext};

/// Execute the build command
pub async fn execute(args: BuildArgs, project: &ProjectArgs, config: &Config) -> AutobuildResult<()> {
    let workspace = Workspace::open(project, config).await?;
    let request = workspace.builder.build(args.flags(), cancel_on_ctrl_c());
    let result = drive(&workspace, request).await;
    workspace.manager.shutdown();
    result
}

/// Execute the install command
pub async fn install(project: &ProjectArgs, config: &Config) -> AutobuildResult<()> {
    let workspace = Workspace::open(project, config).await?;
    let request = workspace.builder.install(cancel_on_ctrl_c());
    let result = drive(&workspace, request).await;
    workspace.manager.shutdown();
    result
}

/// Follow a running request until it finishes, mirroring its progress
async fn drive(workspace: &Workspace, request: BuildRequest) -> AutobuildResult<()> {
    let ctx = UiContext::detect();
    let configuration = workspace.builder.configuration();

    ui::intro(
        &ctx,
        &format!(
            "{} ({}, {})",
            workspace.context().project_id,
            configuration.id(),
            workspace.manager.build_system().name()
        ),
    );
    ui::step_info(
        &ctx,
        &format!("Working in {}", request.task().directory().display()),
    );

    let mut state = request.task().subscribe();
    let mut progress = BuildProgress::new(&ctx, request.task().mode().as_str());

    let finished = request.finish();
    tokio::pin!(finished);

    let result = loop {
        tokio::select! {
            result = &mut finished => break result,
            changed = state.changed() => {
                if changed.is_err() {
                    break (&mut finished).await;
                }
                let snapshot = state.borrow_and_update().clone();
                if let Some(ref stage) = snapshot.stage {
                    progress.set_stage(stage);
                }
                if let Some(ref line) = snapshot.last_line {
                    progress.on_line(line);
                }
            }
        }
    };
    progress.finish();

    let task = result?;
    match task.outcome() {
        Some(TaskOutcome::Succeeded) => {
            ui::outro_success(&ctx, &task.mode());
        }
        _ => ui::outro_warn(&ctx, &task.mode()),
    }
    Ok(())
}
