//! Per-file editor settings read from key/value sources
//!
//! A [`SettingsSource`] yields raw key/value pairs for a file; the pairs
//! are mapped onto [`FileSettings`]:
//!
//! | Key                        | Effect                                   |
//! |----------------------------|------------------------------------------|
//! | `indent_size`              | indent width                             |
//! | `tab_width`                | tab width                                |
//! | `trim_trailing_whitespace` | trim trailing whitespace                 |
//! | `insert_final_newline`     | insert trailing newline                  |
//! | `charset`                  | encoding                                 |
//! | `max_line_length`          | right margin position, shows the margin  |
//! | `end_of_line`              | `cr`, `crlf`, anything else is LF        |
//! | `indent_style`             | `tab` for tabs, anything else is spaces  |

mod editorconfig;

pub use editorconfig::EditorconfigSource;

use crate::error::AutobuildResult;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

/// Line ending style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NewlineType {
    Lf,
    Cr,
    CrLf,
}

/// Indentation character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndentStyle {
    Tabs,
    Spaces,
}

/// Editor settings for one file. `None` leaves the editor default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileSettings {
    pub indent_width: Option<u32>,
    pub tab_width: Option<u32>,
    pub trim_trailing_whitespace: Option<bool>,
    pub insert_trailing_newline: Option<bool>,
    pub encoding: Option<String>,
    pub right_margin_position: Option<u32>,
    pub show_right_margin: Option<bool>,
    pub newline_type: Option<NewlineType>,
    pub indent_style: Option<IndentStyle>,
}

impl FileSettings {
    /// Settings resulting from applying every pair in order
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut settings = Self::default();
        for (key, value) in pairs {
            settings.apply(key, value);
        }
        settings
    }

    /// Apply one key/value pair.
    ///
    /// Returns whether the key is recognized; unrecognized keys are ignored.
    pub fn apply(&mut self, key: &str, value: &str) -> bool {
        match key {
            "indent_size" => {
                if let Some(width) = parse(key, value) {
                    self.set_indent_width(width);
                }
            }
            "tab_width" => {
                if let Some(width) = parse(key, value) {
                    self.set_tab_width(width);
                }
            }
            "trim_trailing_whitespace" => {
                if let Some(trim) = parse(key, value) {
                    self.set_trim_trailing_whitespace(trim);
                }
            }
            "insert_final_newline" => {
                if let Some(insert) = parse(key, value) {
                    self.set_insert_trailing_newline(insert);
                }
            }
            "charset" => self.set_encoding(value),
            "max_line_length" => {
                if let Some(position) = parse(key, value) {
                    self.set_right_margin_position(position);
                    self.set_show_right_margin(true);
                }
            }
            "end_of_line" => self.set_newline_type(match value {
                "cr" => NewlineType::Cr,
                "crlf" => NewlineType::CrLf,
                _ => NewlineType::Lf,
            }),
            "indent_style" => self.set_indent_style(match value {
                "tab" => IndentStyle::Tabs,
                _ => IndentStyle::Spaces,
            }),
            _ => {
                debug!("Ignoring unknown setting {}", key);
                return false;
            }
        }
        true
    }

    pub fn set_indent_width(&mut self, width: u32) {
        self.indent_width = Some(width);
    }

    pub fn set_tab_width(&mut self, width: u32) {
        self.tab_width = Some(width);
    }

    pub fn set_trim_trailing_whitespace(&mut self, trim: bool) {
        self.trim_trailing_whitespace = Some(trim);
    }

    pub fn set_insert_trailing_newline(&mut self, insert: bool) {
        self.insert_trailing_newline = Some(insert);
    }

    pub fn set_encoding(&mut self, encoding: impl Into<String>) {
        self.encoding = Some(encoding.into());
    }

    pub fn set_right_margin_position(&mut self, position: u32) {
        self.right_margin_position = Some(position);
    }

    pub fn set_show_right_margin(&mut self, show: bool) {
        self.show_right_margin = Some(show);
    }

    pub fn set_newline_type(&mut self, newline_type: NewlineType) {
        self.newline_type = Some(newline_type);
    }

    pub fn set_indent_style(&mut self, style: IndentStyle) {
        self.indent_style = Some(style);
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Option<T> {
    let parsed = value.parse().ok();
    if parsed.is_none() {
        warn!("Ignoring {} = {}: unexpected value", key, value);
    }
    parsed
}

/// Something that knows key/value settings for files
#[async_trait]
pub trait SettingsSource: Send + Sync {
    /// Human-readable source name
    fn name(&self) -> &'static str;

    /// Raw settings applying to `file`.
    ///
    /// Fails with [`crate::error::AutobuildError::NotFound`] when the source
    /// has nothing for the file.
    async fn read(&self, file: &Path) -> AutobuildResult<BTreeMap<String, String>>;
}

/// Resolve the settings of `file` from `source`
pub async fn load(source: &dyn SettingsSource, file: &Path) -> AutobuildResult<FileSettings> {
    let pairs = source.read(file).await?;
    debug!("{} settings for {}: {:?}", source.name(), file.display(), pairs);
    Ok(FileSettings::from_pairs(
        pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tabs_and_margin() {
        let settings = FileSettings::from_pairs([("indent_style", "tab"), ("max_line_length", "100")]);
        assert_eq!(settings.indent_style, Some(IndentStyle::Tabs));
        assert_eq!(settings.right_margin_position, Some(100));
        assert_eq!(settings.show_right_margin, Some(true));
    }

    #[test]
    fn every_key_is_mapped() {
        let settings = FileSettings::from_pairs([
            ("indent_size", "4"),
            ("tab_width", "8"),
            ("trim_trailing_whitespace", "true"),
            ("insert_final_newline", "false"),
            ("charset", "utf-8"),
            ("end_of_line", "crlf"),
            ("indent_style", "space"),
        ]);
        assert_eq!(
            settings,
            FileSettings {
                indent_width: Some(4),
                tab_width: Some(8),
                trim_trailing_whitespace: Some(true),
                insert_trailing_newline: Some(false),
                encoding: Some("utf-8".to_string()),
                right_margin_position: None,
                show_right_margin: None,
                newline_type: Some(NewlineType::CrLf),
                indent_style: Some(IndentStyle::Spaces),
            }
        );
    }

    #[test]
    fn newline_fallback_is_lf() {
        let mut settings = FileSettings::default();
        settings.apply("end_of_line", "cr");
        assert_eq!(settings.newline_type, Some(NewlineType::Cr));
        settings.apply("end_of_line", "lf");
        assert_eq!(settings.newline_type, Some(NewlineType::Lf));
        settings.apply("end_of_line", "whatever");
        assert_eq!(settings.newline_type, Some(NewlineType::Lf));
    }

    #[test]
    fn unknown_keys_and_bad_values_are_ignored() {
        let mut settings = FileSettings::default();
        assert!(!settings.apply("spelling_language", "en"));
        assert!(settings.apply("indent_size", "tab"));
        assert!(settings.apply("max_line_length", "off"));
        assert_eq!(settings, FileSettings::default());
    }
}
