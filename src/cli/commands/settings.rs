//! Settings command - editor settings resolved from .editorconfig

use super::absolute;
use crate::cli::args::SettingsArgs;
use crate::error::AutobuildResult;
use crate::settings::{self, EditorconfigSource, FileSettings, IndentStyle, NewlineType};
use crate::ui::{self, UiContext};

/// Execute the settings command
pub async fn execute(args: SettingsArgs) -> AutobuildResult<()> {
    let ctx = UiContext::detect();
    let file = absolute(&args.file)?;

    let resolved = match settings::load(&EditorconfigSource::new(), &file).await {
        Ok(resolved) => Some(resolved),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e),
    };

    if args.json {
        let resolved = resolved.unwrap_or_default();
        println!("{}", serde_json::to_string_pretty(&resolved)?);
        return Ok(());
    }

    let Some(resolved) = resolved else {
        ui::remark(
            &ctx,
            &format!("No .editorconfig applies to {}", args.file.display()),
        );
        return Ok(());
    };

    let rows = rows(&resolved);
    if rows.is_empty() {
        ui::remark(&ctx, "No settings apply, editor defaults are used");
    }
    for (key, value) in rows {
        ui::key_value(&ctx, key, &value);
    }
    Ok(())
}

/// Settings that are set, in display order
fn rows(settings: &FileSettings) -> Vec<(&'static str, String)> {
    let mut rows = Vec::new();
    if let Some(style) = settings.indent_style {
        let style = match style {
            IndentStyle::Tabs => "tabs",
            IndentStyle::Spaces => "spaces",
        };
        rows.push(("indent_style", style.to_string()));
    }
    if let Some(width) = settings.indent_width {
        rows.push(("indent_width", width.to_string()));
    }
    if let Some(width) = settings.tab_width {
        rows.push(("tab_width", width.to_string()));
    }
    if let Some(trim) = settings.trim_trailing_whitespace {
        rows.push(("trim_trailing_whitespace", trim.to_string()));
    }
    if let Some(insert) = settings.insert_trailing_newline {
        rows.push(("insert_trailing_newline", insert.to_string()));
    }
    if let Some(ref encoding) = settings.encoding {
        rows.push(("encoding", encoding.clone()));
    }
    if let Some(position) = settings.right_margin_position {
        rows.push(("right_margin_position", position.to_string()));
    }
    if let Some(show) = settings.show_right_margin {
        rows.push(("show_right_margin", show.to_string()));
    }
    if let Some(newline) = settings.newline_type {
        let newline = match newline {
            NewlineType::Lf => "lf",
            NewlineType::Cr => "cr",
            NewlineType::CrLf => "crlf",
        };
        rows.push(("newline_type", newline.to_string()));
    }
    rows
}
