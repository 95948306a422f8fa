//! Single-flight, time-boxed memoization of asynchronous computations
//!
//! A [`TaskCache`] maps keys to shared values that are expensive to produce.
//! Values are created by a populate callback the cache owner supplies at
//! construction. While a population for a key is running, every other
//! lookup of that key joins it instead of starting a second one, and all of
//! them observe the same value or the same error.
//!
//! Entries expire `ttl` after they were stored; a `ttl` too large to add to
//! the current instant never expires. Expiry is checked lazily at lookup,
//! and stale entries are swept whenever a new value is stored.

use crate::error::{AutobuildError, AutobuildResult};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default lifetime of a cached value
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

type Outcome<V> = Result<Arc<V>, Arc<AutobuildError>>;
type Pending<V> = Shared<BoxFuture<'static, Outcome<V>>>;
type PopulateFn<K, V> = dyn Fn(TaskCache<K, V>, K, Completion<K, V>) + Send + Sync;

/// Thread-safe key/value cache with TTL and single-flight population
pub struct TaskCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    inner: Arc<Inner<K, V>>,
}

struct Inner<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    name: String,
    ttl: Duration,
    populate: Box<PopulateFn<K, V>>,
    shutdown: CancellationToken,
    state: Mutex<State<K, V>>,
}

struct State<K, V> {
    entries: HashMap<K, Entry<V>>,
    in_flight: HashMap<K, InFlight<V>>,
    next_generation: u64,
}

struct Entry<V> {
    value: Arc<V>,
    /// `None` never expires
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

struct InFlight<V> {
    generation: u64,
    pending: Pending<V>,
}

impl<K, V> Clone for TaskCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> fmt::Debug for TaskCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCache")
            .field("name", &self.inner.name)
            .field("ttl", &self.inner.ttl)
            .finish_non_exhaustive()
    }
}

impl<K, V> TaskCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Create a cache whose values live for `ttl`.
    ///
    /// `populate` is invoked once per cache miss with the cache itself, the
    /// missing key and a [`Completion`] that must eventually receive the
    /// computed value or an error. The callback runs on the caller's thread
    /// and is expected to spawn its work rather than block.
    pub fn new<F>(name: impl Into<String>, ttl: Duration, populate: F) -> Self
    where
        F: Fn(TaskCache<K, V>, K, Completion<K, V>) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                ttl,
                populate: Box::new(populate),
                shutdown: CancellationToken::new(),
                state: Mutex::new(State {
                    entries: HashMap::new(),
                    in_flight: HashMap::new(),
                    next_generation: 0,
                }),
            }),
        }
    }

    /// Name used in logs and errors
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Lifetime applied to every stored value
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Look up `key`, populating it on a miss.
    ///
    /// A live entry is returned as-is unless `force` is set. If a population
    /// for the key is already running the call joins it. Cancelling `cancel`
    /// only abandons this caller's wait; the population keeps running for
    /// the other joined callers.
    pub async fn get(
        &self,
        key: &K,
        force: bool,
        cancel: &CancellationToken,
    ) -> AutobuildResult<Arc<V>> {
        let mut start = None;

        let pending = {
            let mut state = self.state();
            let now = Instant::now();

            if let Some(entry) = state.entries.get(key) {
                if !force && entry.is_live(now) {
                    debug!("{} cache hit", self.inner.name);
                    return Ok(Arc::clone(&entry.value));
                }
                state.entries.remove(key);
            }

            match state.in_flight.get(key) {
                Some(flight) => {
                    debug!("{} cache joining in-flight population", self.inner.name);
                    flight.pending.clone()
                }
                None => {
                    let generation = state.next_generation;
                    state.next_generation += 1;

                    let (sender, receiver) = oneshot::channel();
                    let name = self.inner.name.clone();
                    let pending = receiver
                        .map(move |received| {
                            received.unwrap_or_else(|_| {
                                Err(Arc::new(AutobuildError::PopulationAbandoned(name)))
                            })
                        })
                        .boxed()
                        .shared();

                    state.in_flight.insert(
                        key.clone(),
                        InFlight {
                            generation,
                            pending: pending.clone(),
                        },
                    );

                    start = Some(Completion {
                        cache: self.clone(),
                        key: key.clone(),
                        generation,
                        sender: Some(sender),
                        cancel: self.inner.shutdown.child_token(),
                    });
                    pending
                }
            }
        };

        if let Some(completion) = start {
            debug!("{} cache miss, populating", self.inner.name);
            (self.inner.populate)(self.clone(), key.clone(), completion);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AutobuildError::Cancelled),
            outcome = pending => outcome.map_err(|source| AutobuildError::PopulationFailed {
                cache: self.inner.name.clone(),
                source,
            }),
        }
    }

    /// Remove the stored value for `key`, regardless of its age.
    ///
    /// A population already in flight is detached: its joined callers still
    /// receive its result, but the result is not stored, and the next lookup
    /// starts a fresh population. Returns whether anything was dropped.
    pub fn evict(&self, key: &K) -> bool {
        let mut state = self.state();
        let removed = state.entries.remove(key).is_some();
        let detached = state.in_flight.remove(key).is_some();
        if removed || detached {
            debug!(
                "{} cache evicted entry (in-flight population detached: {})",
                self.inner.name, detached
            );
        }
        removed || detached
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut state = self.state();
        Self::purge_locked(&mut state, Instant::now())
    }

    /// Number of stored values, including ones that expired but were not
    /// swept yet
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    /// Whether no values are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a population for `key` is currently running
    pub fn is_populating(&self, key: &K) -> bool {
        self.state().in_flight.contains_key(key)
    }

    /// Cancel running populations and drop all stored values.
    ///
    /// Callers joined to a cancelled population receive its error. The
    /// cache stays usable afterwards only for lookups of new generations;
    /// populations started later see an already-cancelled token.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let mut state = self.state();
        let in_flight = state.in_flight.len();
        state.in_flight.clear();
        state.entries.clear();
        debug!(
            "{} cache shut down ({} populations cancelled)",
            self.inner.name, in_flight
        );
    }

    fn finish(&self, key: &K, generation: u64, outcome: &Outcome<V>) {
        let mut state = self.state();

        let current = state
            .in_flight
            .get(key)
            .is_some_and(|flight| flight.generation == generation);
        if !current {
            // Evicted or shut down while populating; the value is stale.
            return;
        }
        state.in_flight.remove(key);

        if let Ok(value) = outcome {
            let now = Instant::now();
            Self::purge_locked(&mut state, now);
            state.entries.insert(
                key.clone(),
                Entry {
                    value: Arc::clone(value),
                    expires_at: now.checked_add(self.inner.ttl),
                },
            );
        }
    }

    fn purge_locked(state: &mut State<K, V>, now: Instant) -> usize {
        let before = state.entries.len();
        state.entries.retain(|_, entry| entry.is_live(now));
        before - state.entries.len()
    }

    fn state(&self) -> MutexGuard<'_, State<K, V>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle through which a populate callback delivers its result.
///
/// Dropping the handle without completing it fails every joined caller
/// with [`AutobuildError::PopulationAbandoned`].
pub struct Completion<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    cache: TaskCache<K, V>,
    key: K,
    generation: u64,
    sender: Option<oneshot::Sender<Outcome<V>>>,
    cancel: CancellationToken,
}

impl<K, V> Completion<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Token cancelled when the owning cache shuts down
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Deliver the population result to every joined caller
    pub fn complete(mut self, result: AutobuildResult<V>) {
        let outcome = result.map(Arc::new).map_err(Arc::new);
        self.resolve(outcome);
    }

    fn resolve(&mut self, outcome: Outcome<V>) {
        let Some(sender) = self.sender.take() else {
            return;
        };
        self.cache.finish(&self.key, self.generation, &outcome);
        // Every waiter may have given up already.
        let _ = sender.send(outcome);
    }
}

impl<K, V> Drop for Completion<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn drop(&mut self) {
        if self.sender.is_some() {
            let name = self.cache.name().to_string();
            self.resolve(Err(Arc::new(AutobuildError::PopulationAbandoned(name))));
        }
    }
}
