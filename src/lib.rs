//! Deterministic feature flag evaluation with a time-bounded in-process flag cache.
//!
//! # Overview
//!
//! A [`Flag`] belongs to one organization and carries one [`EnvironmentConfig`] per
//! [`Environment`]. Evaluating a flag turns that configuration plus a caller-supplied
//! [`EvaluationContext`] into an on/off decision and a machine-readable [`Reason`].
//!
//! The crate is organized as a few building blocks:
//!
//! - [`eval`] is the evaluation engine. Its functions are pure: they read only their arguments, so
//!   they can be called from any number of threads without synchronization.
//! - [`FlagStore`] is the boundary to durable storage. Implement it for your database;
//!   [`InMemoryFlagStore`] is provided for tests and embedding.
//! - [`FlagCache`] mirrors the store in memory with a bounded staleness window
//!   ([`CacheConfig::ttl`]). Concurrent lookups that find the cache stale share one reload.
//! - [`EvaluationService`] ties the two together for an authenticated [`Caller`] and never fails:
//!   anything that goes wrong evaluates to disabled.
//!
//! ```
//! # use std::{collections::HashMap, sync::Arc};
//! # use flagwise::*;
//! let store = InMemoryFlagStore::from_json(r#"[
//!     {
//!         "organizationId": "org-1",
//!         "key": "new-checkout",
//!         "name": "New checkout",
//!         "environments": { "production": { "enabled": true } }
//!     }
//! ]"#)?;
//! let service = EvaluationService::new(Arc::new(FlagCache::new(Arc::new(store))));
//!
//! let caller = Caller::new("org-1", Environment::Production);
//! let context = HashMap::from([("userId".to_owned(), ContextValue::from("user-1"))]);
//! let evaluation = service.evaluate(&caller, "new-checkout", &context);
//! assert!(evaluation.enabled);
//! assert_eq!(evaluation.metadata.reason, Reason::FlagEnabled);
//! # Ok::<(), flagwise::Error>(())
//! ```
//!
//! # Error Handling
//!
//! Evaluation never returns errors. [`FlagCache`] returns [`Error`] when the store fails and there
//! is no cached data to fall back on; [`EvaluationService`] reports those as
//! [`Reason::EvaluationError`].
//!
//! # Logging
//!
//! The crate uses the [`log`](https://docs.rs/log/latest/log/) crate with target `flagwise` and
//! structured key-values. Consider integrating a `log`-compatible logger implementation for better
//! visibility into cache reloads and evaluation decisions.

#![warn(rustdoc::missing_crate_level_docs)]

pub mod eval;

mod cache;
mod config;
mod context;
mod error;
mod flag;
mod rules;
mod service;
mod sharder;
mod store;

pub use cache::FlagCache;
pub use config::CacheConfig;
pub use context::{ContextValue, EvaluationContext, USER_ID};
pub use error::{Error, Result};
pub use eval::{EvaluationResult, Reason};
pub use flag::{Environment, EnvironmentConfig, Flag, Operand, Phase, Value};
pub use rules::{context_rules_match, ContextRule, Operator};
pub use service::{Caller, EvaluationMetadata, EvaluationService, FlagEvaluation};
pub use sharder::{bucket, bucket_with, Md5Sharder, Sharder, TOTAL_BUCKETS};
pub use store::{FlagStore, InMemoryFlagStore};
