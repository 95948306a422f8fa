//! autobuild - build orchestration for autotools projects
//!
//! Runs bootstrap, configure and make for a project's build
//! configurations, and serves compiler flags and install targets from
//! make metadata cached per configuration.

pub mod builder;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod makecache;
pub mod project;
pub mod settings;
pub mod ui;

pub use error::{AutobuildError, AutobuildResult};
