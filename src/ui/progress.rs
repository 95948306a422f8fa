//! Progress indicators with CI fallback

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// A task spinner with CI fallback.
///
/// Plain mode writes to stderr so machine-readable stdout stays clean.
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            eprintln!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else if self.interactive {
            eprintln!("{} {}", style("✓").green(), message);
        } else {
            eprintln!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else if self.interactive {
            eprintln!("{} {}", style("✗").red(), message);
        } else {
            eprintln!("{} {}", style("[FAIL]").red(), message);
        }
    }
}

/// Progress display for a build pipeline.
///
/// Shows the running stage and the latest interesting make line in an
/// indicatif spinner, or prints stage changes and directory recursion as
/// plain text in CI.
pub struct BuildProgress {
    bar: Option<ProgressBar>,
    stage: Option<String>,
    compiled: u64,
}

impl BuildProgress {
    pub fn new(ctx: &UiContext, label: &str) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new_spinner();
            let template = ProgressStyle::with_template(
                "  {spinner:.cyan} {prefix:.bold}  {pos:.dim} {msg:.dim}  {elapsed:.dim}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
            bar.set_style(template.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            Some(bar)
        } else {
            println!("{}...", label);
            None
        };
        Self {
            bar,
            stage: None,
            compiled: 0,
        }
    }

    /// Note the pipeline stage, ignoring repeats
    pub fn set_stage(&mut self, stage: &str) {
        if self.stage.as_deref() == Some(stage) {
            return;
        }
        self.stage = Some(stage.to_string());
        match self.bar {
            Some(ref bar) => bar.set_prefix(stage.to_string()),
            None => println!("  {} {}", style("==>").cyan(), stage),
        }
    }

    /// Process one line of toolchain output
    pub fn on_line(&mut self, line: &str) {
        match parse_make_line(line) {
            Some(MakeLine::Entering(dir)) => match self.bar {
                Some(ref bar) => bar.set_message(format!("in {}", dir)),
                None => println!("      {}", style(format!("in {}", dir)).dim()),
            },
            Some(MakeLine::Step { tool, output }) => {
                self.compiled += 1;
                if let Some(ref bar) = self.bar {
                    bar.set_position(self.compiled);
                    bar.set_message(format!("{} {}", tool, output));
                }
            }
            None => {}
        }
    }

    /// Number of compile and link steps seen
    pub fn steps(&self) -> u64 {
        self.compiled
    }

    /// Finish and clear the progress bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

/// Interesting lines of make output
#[derive(Debug, PartialEq, Eq)]
enum MakeLine<'a> {
    /// Recursion into a subdirectory
    Entering(&'a str),
    /// An automake silent-rules step such as `  CC       main.o`
    Step { tool: &'a str, output: &'a str },
}

const SILENT_RULE_TOOLS: &[&str] = &[
    "CC", "CXX", "CCLD", "CXXLD", "AR", "RANLIB", "GEN", "LEX", "YACC",
];

fn parse_make_line(line: &str) -> Option<MakeLine<'_>> {
    let trimmed = line.trim();

    if let Some(rest) = trimmed.strip_prefix("Making ") {
        let (_, dir) = rest.split_once(" in ")?;
        return Some(MakeLine::Entering(dir.trim()));
    }

    if let Some(start) = trimmed.find("Entering directory ") {
        let dir = trimmed[start + "Entering directory ".len()..]
            .trim_matches(|c| matches!(c, '\'' | '`' | '"'));
        return Some(MakeLine::Entering(dir));
    }

    let (tool, output) = trimmed.split_once(char::is_whitespace)?;
    if SILENT_RULE_TOOLS.contains(&tool) {
        let output = output.trim();
        if !output.is_empty() && !output.contains(char::is_whitespace) {
            return Some(MakeLine::Step { tool, output });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spinner_non_interactive() {
        let ctx = UiContext::non_interactive();
        let mut spinner = TaskSpinner::new(&ctx);
        spinner.start("Loading build flags");
        spinner.stop("Done");
    }

    #[test]
    fn parse_recursion_lines() {
        assert_eq!(
            parse_make_line("Making all in src"),
            Some(MakeLine::Entering("src"))
        );
        assert_eq!(
            parse_make_line("Making install in po"),
            Some(MakeLine::Entering("po"))
        );
        assert_eq!(
            parse_make_line("make[1]: Entering directory '/build/calc/src'"),
            Some(MakeLine::Entering("/build/calc/src"))
        );
    }

    #[test]
    fn parse_silent_rule_lines() {
        assert_eq!(
            parse_make_line("  CC       calc-main.o"),
            Some(MakeLine::Step {
                tool: "CC",
                output: "calc-main.o"
            })
        );
        assert_eq!(
            parse_make_line("  CCLD     calc"),
            Some(MakeLine::Step {
                tool: "CCLD",
                output: "calc"
            })
        );
    }

    #[test]
    fn parse_ignores_other_lines() {
        assert_eq!(parse_make_line(""), None);
        assert_eq!(parse_make_line("checking for gcc... gcc"), None);
        assert_eq!(
            parse_make_line("gcc -DHAVE_CONFIG_H -I. -g -O2 -c -o main.o main.c"),
            None
        );
        assert_eq!(parse_make_line("CC is not set"), None);
    }

    #[test]
    fn build_progress_non_interactive() {
        let ctx = UiContext::non_interactive();
        let mut progress = BuildProgress::new(&ctx, "calc");
        progress.set_stage("Configure");
        progress.set_stage("Build");
        progress.on_line("Making all in src");
        progress.on_line("  CC       main.o");
        progress.on_line("  CCLD     calc");
        progress.on_line("libtool: link: gcc -o calc main.o");
        assert_eq!(progress.steps(), 2);
        progress.finish();
    }
}
