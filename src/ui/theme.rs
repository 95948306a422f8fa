//! Theme for cliclack output

use cliclack::ThemeState;
use console::Style;

/// Cyan-accented theme used by every command
#[derive(Debug, Clone, Default)]
pub struct AutobuildTheme;

impl cliclack::Theme for AutobuildTheme {
    fn bar_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Active => Style::new().cyan(),
            ThemeState::Error(_) => Style::new().red(),
            ThemeState::Cancel => Style::new().dim(),
            ThemeState::Submit => Style::new().cyan().dim(),
        }
    }

    fn state_symbol_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Active => Style::new().cyan(),
            ThemeState::Error(_) => Style::new().red(),
            ThemeState::Cancel => Style::new().dim(),
            ThemeState::Submit => Style::new().green(),
        }
    }
}

/// Initialize the global theme
pub fn init_theme() {
    cliclack::set_theme(AutobuildTheme);
}

#[cfg(test)]
mod tests {
    use super::*;
    use cliclack::Theme;

    #[test]
    fn error_state_is_red() {
        let theme = AutobuildTheme;
        let error = theme.bar_color(&ThemeState::Error(String::new()));
        assert_eq!(
            error.apply_to("x").to_string(),
            Style::new().red().apply_to("x").to_string()
        );
    }
}
