//! Build metadata extracted from generated Makefiles
//!
//! A [`Makecache`] is an immutable snapshot of the variables make knows for
//! a configured build tree. It answers which compiler flags apply to a
//! source file and which targets the tree builds and installs.

mod parse;

pub use parse::{shell_split, MakeDatabase};

use crate::builder::process::capture_stdout;
use crate::error::{AutobuildError, AutobuildResult};
use crate::project::{ProcessSpec, Runtime};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Kind of product an automake primary declares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Program,
    Library,
    Script,
}

/// An installable build product
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildTarget {
    /// Product name as written in the Makefile
    pub name: String,
    /// Where `make install` puts it
    pub install_directory: Option<PathBuf>,
    pub kind: TargetKind,
}

/// Source language, selecting the C or C++ flag variables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Language {
    C,
    Cxx,
}

impl Language {
    fn of(file: &Path) -> Self {
        match file.extension().and_then(|e| e.to_str()) {
            Some("cc" | "cpp" | "cxx" | "c++" | "C" | "hh" | "hpp" | "hxx") => Language::Cxx,
            _ => Language::C,
        }
    }

    fn flags_suffix(self) -> &'static str {
        match self {
            Language::C => "CFLAGS",
            Language::Cxx => "CXXFLAGS",
        }
    }
}

fn primary_variable() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:(?:nobase|dist|nodist)_)*([A-Za-z0-9]+)_(PROGRAMS|LTLIBRARIES|LIBRARIES|SCRIPTS)$")
            .unwrap_or_else(|e| unreachable!("invalid primary regex: {e}"))
    })
}

/// Variables of one directory of the build tree
#[derive(Debug)]
struct DirectoryCache {
    /// Build directory holding the Makefile
    build_dir: PathBuf,
    /// Matching source directory
    source_dir: PathBuf,
    database: MakeDatabase,
}

/// Parsed, queryable snapshot of a configured build tree
#[derive(Debug)]
pub struct Makecache {
    makefile: PathBuf,
    directories: Vec<DirectoryCache>,
}

impl Makecache {
    /// Extract the make database of `makefile` and every `SUBDIRS` entry
    /// below it, running make through `runtime`.
    pub async fn new_for_makefile(
        runtime: Arc<dyn Runtime>,
        make: &str,
        makefile: &Path,
        env: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> AutobuildResult<Self> {
        if !makefile.is_file() {
            return Err(AutobuildError::NotFound(makefile.to_path_buf()));
        }
        let build_dir = makefile
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| AutobuildError::NotFound(makefile.to_path_buf()))?;

        let mut directories = Vec::new();
        let mut pending = vec![build_dir];
        let mut seen = HashSet::new();

        while let Some(dir) = pending.pop() {
            if !seen.insert(dir.clone()) {
                continue;
            }

            let database = load_database(runtime.as_ref(), make, &dir, env, cancel).await?;
            let source_dir = source_directory(&dir, &database);

            for subdir in database.get("SUBDIRS").split_whitespace() {
                if subdir == "." {
                    continue;
                }
                let child = normalize(&dir.join(subdir));
                if child.join("Makefile").is_file() {
                    pending.push(child);
                } else {
                    debug!("Skipping {} without Makefile", child.display());
                }
            }

            directories.push(DirectoryCache {
                build_dir: dir,
                source_dir,
                database,
            });
        }

        info!(
            "Loaded make database for {} ({} directories)",
            makefile.display(),
            directories.len()
        );

        Ok(Self {
            makefile: makefile.to_path_buf(),
            directories,
        })
    }

    /// Build a cache from already parsed databases, keyed by build directory.
    ///
    /// The first entry is the top-level directory.
    pub fn from_databases(
        makefile: PathBuf,
        databases: Vec<(PathBuf, MakeDatabase)>,
    ) -> Self {
        let directories = databases
            .into_iter()
            .map(|(build_dir, database)| DirectoryCache {
                source_dir: source_directory(&build_dir, &database),
                build_dir,
                database,
            })
            .collect();
        Self {
            makefile,
            directories,
        }
    }

    /// Top-level Makefile this snapshot was taken from
    pub fn makefile(&self) -> &Path {
        &self.makefile
    }

    /// Compiler flags for `file`, in the order the automake `COMPILE`
    /// rule passes them.
    ///
    /// Per-target `<target>_CPPFLAGS`/`<target>_CFLAGS` replace the `AM_`
    /// variants when the file is listed in `<target>_SOURCES`. Files that
    /// no directory knows get no flags.
    pub fn build_flags(&self, file: &Path) -> Vec<String> {
        let Some(dir) = self.directory_for(file) else {
            debug!("No Makefile covers {}", file.display());
            return Vec::new();
        };

        let db = &dir.database;
        let language = Language::of(file);
        let flags = language.flags_suffix();
        let target = owning_target(dir, file);

        let per_target = |suffix: &str| -> String {
            target
                .as_deref()
                .map(|canon| format!("{}_{}", canon, suffix))
                .filter(|name| db.contains(name))
                .unwrap_or_else(|| format!("AM_{}", suffix))
        };

        let line = [
            "DEFS".to_string(),
            "DEFAULT_INCLUDES".to_string(),
            "INCLUDES".to_string(),
            per_target("CPPFLAGS"),
            "CPPFLAGS".to_string(),
            per_target(flags),
            flags.to_string(),
        ]
        .iter()
        .map(|name| db.get(name))
        .collect::<Vec<_>>()
        .join(" ");

        shell_split(&line)
    }

    /// Installable targets across the whole tree.
    ///
    /// `noinst_` and `check_` products are skipped.
    pub fn build_targets(&self) -> Vec<BuildTarget> {
        let mut targets = Vec::new();

        for dir in &self.directories {
            let db = &dir.database;
            let mut names: Vec<&str> = db.names().collect();
            names.sort_unstable();

            for name in names {
                let Some(caps) = primary_variable().captures(name) else {
                    continue;
                };
                let location = &caps[1];
                if matches!(location, "noinst" | "check" | "EXTRA") {
                    continue;
                }
                let kind = match &caps[2] {
                    "PROGRAMS" => TargetKind::Program,
                    "SCRIPTS" => TargetKind::Script,
                    _ => TargetKind::Library,
                };

                let install_directory = Some(db.get(&format!("{}dir", location)))
                    .filter(|d| !d.is_empty())
                    .map(PathBuf::from);
                if install_directory.is_none() {
                    warn!("No install directory for {} in {}", name, dir.build_dir.display());
                }

                for product in db.get(name).split_whitespace() {
                    targets.push(BuildTarget {
                        name: product.to_string(),
                        install_directory: install_directory.clone(),
                        kind,
                    });
                }
            }
        }

        targets
    }

    /// Deepest directory whose source tree contains `file`
    fn directory_for(&self, file: &Path) -> Option<&DirectoryCache> {
        self.directories
            .iter()
            .filter(|dir| file.starts_with(&dir.source_dir))
            .max_by_key(|dir| dir.source_dir.components().count())
    }
}

/// Canonical automake name of the target listing `file` in its sources
fn owning_target(dir: &DirectoryCache, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(&dir.source_dir).ok()?;
    let db = &dir.database;

    let mut names: Vec<&str> = db
        .names()
        .filter(|name| name.ends_with("_SOURCES") && !name.starts_with("EXTRA_"))
        .collect();
    names.sort_unstable();

    names.into_iter().find_map(|name| {
        let listed = db
            .get(name)
            .split_whitespace()
            .any(|source| normalize(Path::new(source)) == relative);
        listed.then(|| {
            let canon = name.trim_end_matches("_SOURCES");
            canon
                .strip_prefix("nodist_")
                .or_else(|| canon.strip_prefix("dist_"))
                .unwrap_or(canon)
                .to_string()
        })
    })
}

/// Absolute source directory of a build directory
fn source_directory(build_dir: &Path, db: &MakeDatabase) -> PathBuf {
    let abs_srcdir = db.get("abs_srcdir");
    if !abs_srcdir.is_empty() {
        return normalize(Path::new(&abs_srcdir));
    }
    let srcdir = db.get("srcdir");
    if srcdir.is_empty() {
        build_dir.to_path_buf()
    } else {
        normalize(&build_dir.join(srcdir))
    }
}

/// Resolve `.` and `..` lexically
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

async fn load_database(
    runtime: &dyn Runtime,
    make: &str,
    dir: &Path,
    env: &BTreeMap<String, String>,
    cancel: &CancellationToken,
) -> AutobuildResult<MakeDatabase> {
    let spec = ProcessSpec::new(make, dir)
        .args(["-p", "-n", "-s", "-f", "Makefile"])
        .envs(env)
        .env("LANG", "C");

    let (status, stdout) = capture_stdout(runtime, "Makecache", &spec, cancel).await?;

    // make exits non-zero when the dry run hits a failing recipe, the
    // database is still printed
    if !status.success() && !stdout.contains("# Make data base") {
        return Err(AutobuildError::ProcessFailed {
            stage: "Makecache".to_string(),
            command: spec.display(),
            code: status.code().unwrap_or(-1),
            output: String::new(),
        });
    }

    Ok(MakeDatabase::parse(&stdout))
}
