// mvnkit: Dependency resolution and effective-model engine for Maven-style builds.
// Copyright (C) 2024 International Digital Economy Academy
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//
// For inquiries, you can contact us via e-mail at jichuruanjian@idea.edu.cn.

//! Memoization of expensive requests.
//!
//! Requests are memoized by value. Each request declares how long its
//! outcome may be kept:
//!
//! - [`CacheRetention::Disabled`]: never kept.
//! - [`CacheRetention::RequestScoped`]: kept in a [`RequestScope`], which a
//!   top-level call creates and drops when it returns.
//! - [`CacheRetention::SessionScoped`]: kept in the [`RequestCache`] itself.
//! - [`CacheRetention::Persistent`]: like session scoped, and also loaded from
//!   and saved to a [`CacheStore`] when one is configured.
//!
//! Failures are kept like successes, except transient ones, which never
//! outlive the request scope they happened in.
//!
//! At most one computation runs per key at a time. A caller finding the key
//! in flight waits for the outcome instead of computing it again. No lock is
//! held while computing.

pub mod store;

use std::{
    collections::HashMap,
    fmt::Debug,
    hash::Hash,
    sync::atomic::{AtomicU64, Ordering},
};

use indexmap::IndexSet;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

pub use store::{CacheStore, FileCacheStore, MemoryCacheStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheRetention {
    Disabled,
    RequestScoped,
    SessionScoped,
    Persistent,
}

impl CacheRetention {
    fn index(self) -> usize {
        match self {
            CacheRetention::Disabled => 0,
            CacheRetention::RequestScoped => 1,
            CacheRetention::SessionScoped => 2,
            CacheRetention::Persistent => 3,
        }
    }
}

pub trait CachedError {
    /// Whether a later attempt may succeed.
    fn is_transient(&self) -> bool;
}

pub trait Request: Clone + Eq + Hash + Debug + Send + Sync {
    type Response: Clone + Debug + Send + Sync + Serialize + DeserializeOwned;
    type Error: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + CachedError;

    fn retention(&self) -> CacheRetention;

    /// Stable text naming this request across processes. Requests without
    /// one are never written to a store.
    fn persistent_key(&self) -> Option<String> {
        None
    }
}

pub type Outcome<Q> = Result<<Q as Request>::Response, <Q as Request>::Error>;

fn is_transient_failure<Q: Request>(outcome: &Outcome<Q>) -> bool {
    matches!(outcome, Err(e) if e.is_transient())
}

/// The form outcomes take in a [`CacheStore`].
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "value", rename_all = "kebab-case")]
pub enum StoredEntry<R, E> {
    Success(R),
    Failure(E),
}

enum Slot<Q: Request> {
    InFlight,
    Ready(Outcome<Q>),
}

enum Claim<'a, Q: Request> {
    Hit(Outcome<Q>),
    Claimed(InFlight<'a, Q>),
}

/// A slot map. An absent key is empty.
struct Slots<Q: Request> {
    map: Mutex<HashMap<Q, Slot<Q>>>,
    changed: Condvar,
}

impl<Q: Request> Default for Slots<Q> {
    fn default() -> Self {
        Slots {
            map: Mutex::new(HashMap::new()),
            changed: Condvar::new(),
        }
    }
}

impl<Q: Request> Slots<Q> {
    fn peek(&self, req: &Q) -> Option<Outcome<Q>> {
        match self.map.lock().get(req) {
            Some(Slot::Ready(outcome)) => Some(outcome.clone()),
            _ => None,
        }
    }

    fn put(&self, req: Q, outcome: Outcome<Q>) {
        self.map.lock().insert(req, Slot::Ready(outcome));
        self.changed.notify_all();
    }

    /// Returns the ready outcome, or claims the key for the caller. Waits
    /// while another caller holds the claim.
    fn claim(&self, req: &Q) -> Claim<'_, Q> {
        let mut map = self.map.lock();
        loop {
            match map.get(req) {
                Some(Slot::Ready(outcome)) => return Claim::Hit(outcome.clone()),
                Some(Slot::InFlight) => self.changed.wait(&mut map),
                None => break,
            }
        }
        map.insert(req.clone(), Slot::InFlight);
        Claim::Claimed(InFlight {
            slots: self,
            key: Some(req.clone()),
        })
    }

    /// Like [`Slots::claim`] for several distinct keys at once. Waits until
    /// none of them is in flight, then claims all empty ones together, so a
    /// caller never waits while holding claims of this map.
    fn claim_all<'q>(&self, reqs: &[&'q Q]) -> Vec<(&'q Q, Claim<'_, Q>)> {
        let mut map = self.map.lock();
        while reqs
            .iter()
            .any(|r| matches!(map.get(*r), Some(Slot::InFlight)))
        {
            self.changed.wait(&mut map);
        }
        reqs.iter()
            .map(|req| {
                let claim = match map.get(*req) {
                    Some(Slot::Ready(outcome)) => Claim::Hit(outcome.clone()),
                    _ => {
                        map.insert((*req).clone(), Slot::InFlight);
                        Claim::Claimed(InFlight {
                            slots: self,
                            key: Some((*req).clone()),
                        })
                    }
                };
                (*req, claim)
            })
            .collect()
    }
}

/// A claimed key. Dropping it without [`InFlight::finish`] empties the slot
/// again, e.g. when the computation panics.
struct InFlight<'a, Q: Request> {
    slots: &'a Slots<Q>,
    key: Option<Q>,
}

impl<Q: Request> InFlight<'_, Q> {
    fn finish(mut self, outcome: &Outcome<Q>, keep: bool) {
        if let Some(key) = self.key.take() {
            let mut map = self.slots.map.lock();
            if keep {
                map.insert(key, Slot::Ready(outcome.clone()));
            } else {
                map.remove(&key);
            }
            drop(map);
            self.slots.changed.notify_all();
        }
    }
}

impl<Q: Request> Drop for InFlight<'_, Q> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.slots.map.lock().remove(&key);
            self.slots.changed.notify_all();
        }
    }
}

/// Storage for request-scoped outcomes. Create one per top-level call.
pub struct RequestScope<Q: Request> {
    slots: Slots<Q>,
}

impl<Q: Request> RequestScope<Q> {
    pub fn new() -> Self {
        RequestScope {
            slots: Slots::default(),
        }
    }
}

impl<Q: Request> Default for RequestScope<Q> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct RetentionCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    cached_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetentionStats {
    pub hits: u64,
    pub misses: u64,
    pub cached_failures: u64,
}

/// Counters of one cache, per retention.
#[derive(Debug, Default)]
pub struct CacheStats {
    counters: [RetentionCounters; 4],
    store_loads: AtomicU64,
    store_saves: AtomicU64,
}

impl CacheStats {
    pub fn get(&self, retention: CacheRetention) -> RetentionStats {
        let c = &self.counters[retention.index()];
        RetentionStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            cached_failures: c.cached_failures.load(Ordering::Relaxed),
        }
    }

    /// Outcomes found in the persistent store.
    pub fn store_loads(&self) -> u64 {
        self.store_loads.load(Ordering::Relaxed)
    }

    /// Outcomes written to the persistent store.
    pub fn store_saves(&self) -> u64 {
        self.store_saves.load(Ordering::Relaxed)
    }

    fn hit(&self, retention: CacheRetention) {
        self.counters[retention.index()]
            .hits
            .fetch_add(1, Ordering::Relaxed);
    }

    fn miss(&self, retention: CacheRetention) {
        self.counters[retention.index()]
            .misses
            .fetch_add(1, Ordering::Relaxed);
    }

    fn failure_kept(&self, retention: CacheRetention) {
        self.counters[retention.index()]
            .cached_failures
            .fetch_add(1, Ordering::Relaxed);
    }
}

/// What happened to one position of a batch.
#[derive(Debug, Clone)]
pub enum BatchOutcome<R, E> {
    Success(R),
    Failure(E),
    /// The batch computation returned fewer results than requests.
    Missing,
}

/// Some positions of a batch failed. Successful positions are kept.
#[derive(Debug, Clone)]
pub struct BatchRequestError<Q: Request> {
    pub outcomes: Vec<BatchOutcome<Q::Response, Q::Error>>,
}

impl<Q: Request> BatchRequestError<Q> {
    pub fn failed_positions(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .enumerate()
            .filter(|(_, o)| !matches!(o, BatchOutcome::Success(_)))
            .map(|(i, _)| i)
            .collect()
    }
}

impl<Q: Request> std::fmt::Display for BatchRequestError<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} of {} requests failed at positions {:?}",
            self.failed_positions().len(),
            self.outcomes.len(),
            self.failed_positions()
        )
    }
}

impl<Q: Request> std::error::Error for BatchRequestError<Q> {}

/// The session-wide cache, optionally backed by a persistent store.
pub struct RequestCache<Q: Request> {
    session: Slots<Q>,
    store: Option<Box<dyn CacheStore>>,
    stats: CacheStats,
}

impl<Q: Request> Default for RequestCache<Q> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q: Request> RequestCache<Q> {
    pub fn new() -> Self {
        RequestCache {
            session: Slots::default(),
            store: None,
            stats: CacheStats::default(),
        }
    }

    pub fn with_store(store: impl CacheStore + 'static) -> Self {
        RequestCache {
            store: Some(Box::new(store)),
            ..Self::new()
        }
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Forgets every session outcome. Stored entries are kept.
    pub fn clear_session(&self) {
        self.session.map.lock().retain(|_, slot| matches!(slot, Slot::InFlight));
    }

    fn load(&self, req: &Q) -> Option<Outcome<Q>> {
        let store = self.store.as_ref()?;
        let key = req.persistent_key()?;
        let text = match store.load(&key) {
            Ok(Some(text)) => text,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("Failed to load cache entry `{}`: {:#}", key, e);
                return None;
            }
        };
        match serde_json::from_str::<StoredEntry<Q::Response, Q::Error>>(&text) {
            Ok(StoredEntry::Success(r)) => Some(Ok(r)),
            Ok(StoredEntry::Failure(e)) => Some(Err(e)),
            Err(e) => {
                log::warn!("Ignoring unreadable cache entry `{}`: {}", key, e);
                None
            }
        }
    }

    fn save(&self, req: &Q, outcome: &Outcome<Q>) {
        let (Some(store), Some(key)) = (self.store.as_ref(), req.persistent_key()) else {
            return;
        };
        let entry = match outcome {
            Ok(r) => StoredEntry::Success(r),
            Err(e) => StoredEntry::Failure(e),
        };
        let result = serde_json::to_string(&entry)
            .map_err(anyhow::Error::from)
            .and_then(|text| store.store(&key, &text));
        match result {
            Ok(()) => {
                self.stats.store_saves.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => log::warn!("Failed to save cache entry `{}`: {:#}", key, e),
        }
    }

    /// Computes `req` through the store when persistent.
    fn compute_with_store<F>(&self, req: &Q, compute: F) -> (Outcome<Q>, bool)
    where
        F: FnOnce(&Q) -> Outcome<Q>,
    {
        if req.retention() == CacheRetention::Persistent
            && let Some(stored) = self.load(req)
        {
            self.stats.store_loads.fetch_add(1, Ordering::Relaxed);
            return (stored, true);
        }
        let outcome = compute(req);
        if req.retention() == CacheRetention::Persistent && !is_transient_failure::<Q>(&outcome) {
            self.save(req, &outcome);
        }
        (outcome, false)
    }

    /// Decides whether an outcome may stay in `retention`'s slot map, and
    /// keeps transient failures in the scope instead.
    fn settle(
        &self,
        scope: &RequestScope<Q>,
        req: &Q,
        retention: CacheRetention,
        outcome: &Outcome<Q>,
    ) -> bool {
        let transient = is_transient_failure::<Q>(outcome);
        let keep = retention == CacheRetention::RequestScoped || !transient;
        if transient && retention != CacheRetention::RequestScoped {
            scope.slots.put(req.clone(), outcome.clone());
        }
        if keep && outcome.is_err() {
            self.stats.failure_kept(retention);
        }
        keep
    }

    fn slots_for<'s>(&'s self, scope: &'s RequestScope<Q>, retention: CacheRetention) -> &'s Slots<Q> {
        match retention {
            CacheRetention::RequestScoped => &scope.slots,
            _ => &self.session,
        }
    }

    /// Returns the outcome of `req`, running `compute` only when no usable
    /// outcome is cached.
    pub fn request<F>(&self, scope: &RequestScope<Q>, req: &Q, compute: F) -> Outcome<Q>
    where
        F: FnOnce(&Q) -> Outcome<Q>,
    {
        let retention = req.retention();
        if retention == CacheRetention::Disabled {
            self.stats.miss(retention);
            return compute(req);
        }
        if retention != CacheRetention::RequestScoped
            && let Some(outcome) = scope.slots.peek(req)
        {
            self.stats.hit(retention);
            return outcome;
        }

        match self.slots_for(scope, retention).claim(req) {
            Claim::Hit(outcome) => {
                self.stats.hit(retention);
                outcome
            }
            Claim::Claimed(in_flight) => {
                let (outcome, loaded) = self.compute_with_store(req, compute);
                if loaded {
                    self.stats.hit(retention);
                } else {
                    self.stats.miss(retention);
                }
                let keep = self.settle(scope, req, retention, &outcome);
                in_flight.finish(&outcome, keep);
                outcome
            }
        }
    }

    /// Batch form of [`RequestCache::request`].
    ///
    /// Cached positions are reused and everything else is passed to one
    /// `batch` call, whose results must line up with its input. The returned
    /// responses line up with `reqs`.
    pub fn requests<F>(
        &self,
        scope: &RequestScope<Q>,
        reqs: &[Q],
        batch: F,
    ) -> Result<Vec<Q::Response>, BatchRequestError<Q>>
    where
        F: FnOnce(&[Q]) -> Vec<Outcome<Q>>,
    {
        let unique: IndexSet<&Q> = reqs.iter().collect();

        let mut resolved: HashMap<&Q, Outcome<Q>> = HashMap::new();
        let mut pending: Vec<(&Q, Option<InFlight<'_, Q>>)> = Vec::new();

        let mut scoped = Vec::new();
        let mut session = Vec::new();
        for &req in &unique {
            let retention = req.retention();
            match retention {
                CacheRetention::Disabled => pending.push((req, None)),
                CacheRetention::RequestScoped => scoped.push(req),
                _ => match scope.slots.peek(req) {
                    Some(outcome) => {
                        self.stats.hit(retention);
                        resolved.insert(req, outcome);
                    }
                    None => session.push(req),
                },
            }
        }

        // the scope map is always claimed before the session map
        for (slots, group) in [(&scope.slots, scoped), (&self.session, session)] {
            for (req, claim) in slots.claim_all(&group) {
                match claim {
                    Claim::Hit(outcome) => {
                        self.stats.hit(req.retention());
                        resolved.insert(req, outcome);
                    }
                    Claim::Claimed(in_flight) => {
                        if req.retention() == CacheRetention::Persistent
                            && let Some(stored) = self.load(req)
                        {
                            self.stats.store_loads.fetch_add(1, Ordering::Relaxed);
                            self.stats.hit(req.retention());
                            let keep = self.settle(scope, req, req.retention(), &stored);
                            in_flight.finish(&stored, keep);
                            resolved.insert(req, stored);
                        } else {
                            pending.push((req, Some(in_flight)));
                        }
                    }
                }
            }
        }

        if !pending.is_empty() {
            let inputs: Vec<Q> = pending.iter().map(|(req, _)| (*req).clone()).collect();
            log::debug!("Computing {} of {} requests in one batch", inputs.len(), reqs.len());
            let mut results = batch(&inputs).into_iter();
            for (req, in_flight) in pending {
                let retention = req.retention();
                let Some(outcome) = results.next() else {
                    // dropping the claim empties the slot
                    continue;
                };
                self.stats.miss(retention);
                if let Some(in_flight) = in_flight {
                    if retention == CacheRetention::Persistent && !is_transient_failure::<Q>(&outcome) {
                        self.save(req, &outcome);
                    }
                    let keep = self.settle(scope, req, retention, &outcome);
                    in_flight.finish(&outcome, keep);
                }
                resolved.insert(req, outcome);
            }
        }

        let outcomes: Vec<BatchOutcome<Q::Response, Q::Error>> = reqs
            .iter()
            .map(|req| match resolved.get(req) {
                Some(Ok(r)) => BatchOutcome::Success(r.clone()),
                Some(Err(e)) => BatchOutcome::Failure(e.clone()),
                None => BatchOutcome::Missing,
            })
            .collect();
        if outcomes.iter().all(|o| matches!(o, BatchOutcome::Success(_))) {
            Ok(outcomes
                .into_iter()
                .filter_map(|o| match o {
                    BatchOutcome::Success(r) => Some(r),
                    _ => None,
                })
                .collect())
        } else {
            Err(BatchRequestError { outcomes })
        }
    }
}
