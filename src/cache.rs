//! A time-bounded in-process mirror of the [`FlagStore`].
//!
//! [`FlagCache`] serves flag lookups with bounded staleness. Every lookup first checks the age of
//! the last full load; once it reaches the configured TTL, the lookup triggers a new full load
//! before answering. Concurrent lookups that find the cache stale share a single in-flight load
//! instead of each querying the store.
//!
//! Entries are keyed by `(organization_id, flag_key)`, never by flag key alone, so organizations
//! that use the same key never observe each other's flags.
use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Condvar, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Instant,
};

use chrono::{DateTime, Utc};

use crate::{CacheConfig, Error, Flag, FlagStore, Result};

type CacheKey = (String, String);

fn cache_key(organization_id: &str, flag_key: &str) -> CacheKey {
    (organization_id.to_owned(), flag_key.to_owned())
}

/// Thread-safe flag cache in front of a [`FlagStore`].
///
/// Cached flags are shared as `Arc<Flag>` snapshots. The cache never mutates a cached flag, it
/// only replaces whole entries.
pub struct FlagCache {
    store: Arc<dyn FlagStore>,
    config: CacheConfig,
    state: RwLock<CacheState>,
    /// Holds the load currently in progress, if any. Late arrivals wait on it instead of
    /// starting their own.
    in_flight: Mutex<Option<Arc<InFlightLoad>>>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, Arc<Flag>>,
    /// `None` until the first successful full load, and again after `invalidate()`.
    last_refresh: Option<Refresh>,
    /// Bumped by every `set`, `delete` and `invalidate`.
    generation: u64,
    /// Generation of the last `invalidate()`.
    invalidated_at: u64,
    /// Write-path changes a full load started before them must not undo. `None` records a
    /// delete. Entries are dropped once a load that started after them has been applied.
    writes: HashMap<CacheKey, (u64, Option<Arc<Flag>>)>,
}

struct Refresh {
    at: Instant,
    wall_clock: DateTime<Utc>,
}

impl CacheState {
    fn record_write(&mut self, key: CacheKey, flag: Option<Arc<Flag>>) -> Option<Arc<Flag>> {
        self.generation += 1;
        self.writes.insert(key.clone(), (self.generation, flag.clone()));
        match flag {
            Some(flag) => self.entries.insert(key, flag),
            None => self.entries.remove(&key),
        }
    }

    fn is_stale(&self, config: &CacheConfig) -> bool {
        match &self.last_refresh {
            Some(refresh) => refresh.at.elapsed() >= config.ttl,
            None => true,
        }
    }
}

/// Result slot for one full load, shared between the caller running it and everyone waiting.
#[derive(Default)]
struct InFlightLoad {
    result: Mutex<Option<Result<()>>>,
    done: Condvar,
}

impl InFlightLoad {
    fn complete(&self, result: Result<()>) {
        *self.result.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
        self.done.notify_all();
    }

    /// Block waiting for the load to finish.
    fn wait(&self) -> Result<()> {
        let mut lock = self.result.lock().map_err(|_| Error::Poisoned)?;
        loop {
            match &*lock {
                Some(result) => return result.clone(),
                None => {
                    lock = self.done.wait(lock).map_err(|_| Error::Poisoned)?;
                }
            }
        }
    }
}

impl FlagCache {
    /// Create an empty cache in front of `store`, using default configuration.
    ///
    /// Nothing is loaded until the first lookup.
    pub fn new(store: Arc<dyn FlagStore>) -> FlagCache {
        FlagCache::with_config(store, CacheConfig::default())
    }

    /// Create an empty cache in front of `store`.
    pub fn with_config(store: Arc<dyn FlagStore>, config: CacheConfig) -> FlagCache {
        FlagCache {
            store,
            config,
            state: RwLock::new(CacheState::default()),
            in_flight: Mutex::new(None),
        }
    }

    /// Look up a flag.
    ///
    /// If the last full load is older than the TTL, this first waits for a (shared) reload. A
    /// key missing from the cache is fetched from the store on its own and backfilled, without a
    /// full reload. `Ok(None)` means the flag does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails while the cache has never been loaded, or if the
    /// point query for a missing key fails. A failed reload of an already-loaded cache is logged
    /// and the stale entries keep serving.
    pub fn get(&self, organization_id: &str, flag_key: &str) -> Result<Option<Arc<Flag>>> {
        self.ensure_fresh()?;

        let key = cache_key(organization_id, flag_key);
        if let Some(flag) = self.read()?.entries.get(&key) {
            return Ok(Some(Arc::clone(flag)));
        }

        let Some(flag) = self.store.find_one(organization_id, flag_key)? else {
            return Ok(None);
        };

        log::debug!(target: "flagwise", organization_id, flag_key; "backfilling cache entry");
        let flag = Arc::new(flag);
        self.write()?.entries.insert(key, Arc::clone(&flag));
        Ok(Some(flag))
    }

    /// Insert or overwrite a cache entry. Called after a successful store write so the change is
    /// visible before the next reload.
    pub fn set(&self, organization_id: &str, flag_key: &str, flag: Flag) -> Result<()> {
        let flag = Arc::new(flag);
        self.write()?
            .record_write(cache_key(organization_id, flag_key), Some(flag));
        Ok(())
    }

    /// Remove a cache entry, returning whether it was present.
    pub fn delete(&self, organization_id: &str, flag_key: &str) -> Result<bool> {
        let removed = self
            .write()?
            .record_write(cache_key(organization_id, flag_key), None);
        Ok(removed.is_some())
    }

    /// Drop every entry and forget the last load, so the next lookup reloads from the store.
    pub fn invalidate(&self) -> Result<()> {
        let mut state = self.write()?;
        let generation = state.generation + 1;
        *state = CacheState {
            generation,
            invalidated_at: generation,
            ..CacheState::default()
        };
        drop(state);
        log::debug!(target: "flagwise", "cache invalidated");
        Ok(())
    }

    /// Replace the whole cache with a snapshot of every flag in the store.
    ///
    /// On failure the current entries are left untouched. `set` and `delete` calls made while the
    /// store is being read are kept on top of the snapshot. If the cache is invalidated while the
    /// store is being read, the snapshot is discarded and the cache stays unloaded.
    pub fn load_all(&self) -> Result<()> {
        log::debug!(target: "flagwise", "loading all flags");
        let started_at = self.read()?.generation;
        let flags = self.store.find_all().inspect_err(|err| {
            log::warn!(target: "flagwise", "failed to load flags: {:?}", err);
        })?;

        // Building the new map before requesting the lock to minimize lock span.
        let mut entries: HashMap<CacheKey, Arc<Flag>> = flags
            .into_iter()
            .map(|flag| (cache_key(&flag.organization_id, &flag.key), Arc::new(flag)))
            .collect();

        let mut state = self.write()?;
        if state.invalidated_at > started_at {
            log::debug!(target: "flagwise", "cache invalidated during load, discarding snapshot");
            return Ok(());
        }
        for (key, (generation, flag)) in &state.writes {
            if *generation > started_at {
                match flag {
                    Some(flag) => entries.insert(key.clone(), Arc::clone(flag)),
                    None => entries.remove(key),
                };
            }
        }
        state.writes.retain(|_, (generation, _)| *generation > started_at);
        let count = entries.len();
        state.entries = entries;
        state.last_refresh = Some(Refresh {
            at: Instant::now(),
            wall_clock: Utc::now(),
        });
        drop(state);

        log::debug!(target: "flagwise", entries = count; "loaded all flags");
        Ok(())
    }

    /// Run [`load_all`](FlagCache::load_all), coalescing concurrent calls.
    ///
    /// If a load is already running, this waits for it and returns its result instead of
    /// starting another one.
    pub fn refresh(&self) -> Result<()> {
        self.coalesced_load(false)
    }

    /// Like [`refresh`](FlagCache::refresh), but skips the load if the cache became fresh while
    /// waiting to lead it.
    fn refresh_if_stale(&self) -> Result<()> {
        self.coalesced_load(true)
    }

    fn coalesced_load(&self, only_if_stale: bool) -> Result<()> {
        let (load, is_leader) = {
            let mut slot = self.in_flight.lock().map_err(|_| Error::Poisoned)?;
            match slot.clone() {
                Some(load) => (load, false),
                None => {
                    let load = Arc::new(InFlightLoad::default());
                    *slot = Some(Arc::clone(&load));
                    (load, true)
                }
            }
        };

        if !is_leader {
            return load.wait();
        }

        // Waiters must be released even if the store panics.
        let result = catch_unwind(AssertUnwindSafe(|| {
            if only_if_stale && !self.read()?.is_stale(&self.config) {
                return Ok(());
            }
            self.load_all()
        }))
        .unwrap_or(Err(Error::RefreshPanicked));

        // Clear the slot before publishing, so callers arriving after completion start a new load.
        *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner) = None;
        load.complete(result.clone());
        result
    }

    /// Number of cached flags.
    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Time of the last successful full load. `None` if the cache has not been loaded since it
    /// was created or invalidated.
    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last_refresh
            .as_ref()
            .map(|refresh| refresh.wall_clock)
    }

    fn ensure_fresh(&self) -> Result<()> {
        let (is_stale, was_loaded) = {
            let state = self.read()?;
            (state.is_stale(&self.config), state.last_refresh.is_some())
        };
        if !is_stale {
            return Ok(());
        }

        match self.refresh_if_stale() {
            Ok(()) => Ok(()),
            Err(err) if was_loaded => {
                log::warn!(target: "flagwise", "serving stale flags after failed reload: {:?}", err);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, CacheState>> {
        self.state.read().map_err(|_| Error::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, CacheState>> {
        self.state.write().map_err(|_| Error::Poisoned)
    }
}
