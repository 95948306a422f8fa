//! `.editorconfig` settings source

use super::SettingsSource;
use crate::error::{AutobuildError, AutobuildResult};
use async_trait::async_trait;
use globset::{GlobBuilder, GlobMatcher};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

const EDITORCONFIG_FILE_NAME: &str = ".editorconfig";

/// Reads `.editorconfig` files next to and above a file
#[derive(Debug, Default, Clone)]
pub struct EditorconfigSource {
    ceiling: Option<PathBuf>,
}

impl EditorconfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the upward walk at `dir`, after reading its `.editorconfig`
    pub fn with_ceiling(dir: impl Into<PathBuf>) -> Self {
        Self {
            ceiling: Some(dir.into()),
        }
    }
}

#[async_trait]
impl SettingsSource for EditorconfigSource {
    fn name(&self) -> &'static str {
        "editorconfig"
    }

    async fn read(&self, file: &Path) -> AutobuildResult<BTreeMap<String, String>> {
        let file = file.to_path_buf();
        let ceiling = self.ceiling.clone();
        tokio::task::spawn_blocking(move || read_blocking(&file, ceiling.as_deref()))
            .await
            .map_err(|e| AutobuildError::Internal(format!("editorconfig reader failed: {}", e)))?
    }
}

/// One `[glob]` section
#[derive(Debug)]
struct Section {
    matcher: GlobMatcher,
    properties: Vec<(String, String)>,
}

/// A parsed `.editorconfig` file
#[derive(Debug)]
struct EditorconfigFile {
    root: bool,
    sections: Vec<Section>,
}

/// Collect the properties for `file`.
///
/// Files are applied from the outermost (a `root = true` file, the
/// `ceiling` directory or the filesystem root) inward, so closer files and
/// later sections win.
fn read_blocking(file: &Path, ceiling: Option<&Path>) -> AutobuildResult<BTreeMap<String, String>> {
    let mut found = Vec::new();

    for dir in file.ancestors().skip(1) {
        let path = dir.join(EDITORCONFIG_FILE_NAME);
        let at_ceiling = ceiling == Some(dir);
        if !path.is_file() {
            if at_ceiling {
                break;
            }
            continue;
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| AutobuildError::io(format!("reading {}", path.display()), e))?;
        let parsed = parse(&path, &content)?;
        let root = parsed.root;
        found.push((dir.to_path_buf(), parsed));
        if root || at_ceiling {
            break;
        }
    }

    if found.is_empty() {
        return Err(AutobuildError::NotFound(
            file.parent()
                .map(|dir| dir.join(EDITORCONFIG_FILE_NAME))
                .unwrap_or_else(|| PathBuf::from(EDITORCONFIG_FILE_NAME)),
        ));
    }

    let mut properties = BTreeMap::new();
    for (dir, config) in found.iter().rev() {
        let Ok(relative) = file.strip_prefix(dir) else {
            continue;
        };
        for section in &config.sections {
            if section.matcher.is_match(relative) {
                for (key, value) in &section.properties {
                    properties.insert(key.clone(), value.clone());
                }
            }
        }
    }

    debug!(
        "{} editorconfig files apply to {}",
        found.len(),
        file.display()
    );
    Ok(properties)
}

fn parse(path: &Path, content: &str) -> AutobuildResult<EditorconfigFile> {
    let mut config = EditorconfigFile {
        root: false,
        sections: Vec::new(),
    };

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(pattern) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            config.sections.push(Section {
                matcher: section_matcher(path, pattern)?,
                properties: Vec::new(),
            });
            continue;
        }

        let Some((key, value)) = line.split_once(['=', ':']) else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim().to_lowercase();

        match config.sections.last_mut() {
            Some(section) => section.properties.push((key, value)),
            None if key == "root" => config.root = value == "true",
            None => {}
        }
    }

    Ok(config)
}

/// Compile an editorconfig section glob.
///
/// Patterns without a slash match the file name at any depth; others are
/// anchored at the directory holding the `.editorconfig`.
fn section_matcher(path: &Path, pattern: &str) -> AutobuildResult<GlobMatcher> {
    let glob = if pattern.contains('/') {
        pattern.trim_start_matches('/').to_string()
    } else {
        format!("**/{}", pattern)
    };

    GlobBuilder::new(&glob)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|source| AutobuildError::Glob {
            path: path.to_path_buf(),
            source,
        })
}
