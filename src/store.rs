//! The boundary to durable flag storage.
use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use crate::{Error, Flag, Result};

/// Durable source of truth for flag documents, keyed by organization and flag key.
///
/// Only [`FlagCache`](crate::FlagCache) reads from the store. Implementations report a missing
/// flag as `Ok(None)` and reserve `Err` for the store being unable to answer.
pub trait FlagStore: Send + Sync {
    /// Fetch a single flag.
    fn find_one(&self, organization_id: &str, flag_key: &str) -> Result<Option<Flag>>;

    /// Fetch every flag of every organization.
    fn find_all(&self) -> Result<Vec<Flag>>;
}

/// A [`FlagStore`] kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryFlagStore {
    flags: RwLock<HashMap<(String, String), Flag>>,
}

impl InMemoryFlagStore {
    pub fn new() -> InMemoryFlagStore {
        InMemoryFlagStore::default()
    }

    /// Build a store from a JSON array of flag documents.
    pub fn from_json(json: &str) -> Result<InMemoryFlagStore> {
        let flags: Vec<Flag> = serde_json::from_str(json)?;
        let store = InMemoryFlagStore::new();
        for flag in flags {
            store.insert(flag);
        }
        Ok(store)
    }

    /// Insert or replace a flag, returning the previous document.
    pub fn insert(&self, flag: Flag) -> Option<Flag> {
        let key = (flag.organization_id.clone(), flag.key.clone());
        self.flags
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, flag)
    }

    /// Remove a flag, returning it if it was present.
    pub fn remove(&self, organization_id: &str, flag_key: &str) -> Option<Flag> {
        self.flags
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(organization_id.to_owned(), flag_key.to_owned()))
    }
}

impl FlagStore for InMemoryFlagStore {
    fn find_one(&self, organization_id: &str, flag_key: &str) -> Result<Option<Flag>> {
        let flags = self.flags.read().map_err(|_| Error::Poisoned)?;
        Ok(flags
            .get(&(organization_id.to_owned(), flag_key.to_owned()))
            .cloned())
    }

    fn find_all(&self) -> Result<Vec<Flag>> {
        let flags = self.flags.read().map_err(|_| Error::Poisoned)?;
        Ok(flags.values().cloned().collect())
    }
}
