//! UI module for consistent CLI output
//!
//! Uses `cliclack` for styled interactive output with automatic fallback to
//! plain text in CI and when output is piped.
//!
//! # Example
//!
//! ```rust,ignore
//! use autobuild::ui::{self, BuildProgress, UiContext};
//!
//! let ctx = UiContext::detect();
//! ui::intro(&ctx, "calc (debug)");
//!
//! let mut progress = BuildProgress::new(&ctx, "Building");
//! progress.set_stage("Configure");
//! progress.on_line("Making all in src");
//! progress.finish();
//!
//! ui::outro_success(&ctx, "Build successful");
//! ```

mod context;
mod output;
mod progress;
mod theme;

pub use context::UiContext;
pub use output::{
    intro, key_value, outro_success, outro_warn, remark, step_info, step_ok_detail,
    step_warn_hint,
};
pub use progress::{BuildProgress, TaskSpinner};
pub use theme::{init_theme, AutobuildTheme};
