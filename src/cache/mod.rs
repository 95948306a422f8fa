//! In-memory caching of expensive asynchronous results
//!
//! | Lookup state | Behavior |
//! |--------------|----------|
//! | Live entry | Returned immediately |
//! | Expired or missing | One population starts, callers join it |
//! | Population failed | Error shared with joined callers, nothing stored |

pub mod task_cache;

pub use task_cache::{Completion, TaskCache, DEFAULT_TTL};
