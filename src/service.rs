use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    eval::{self, EvaluationResult, Reason},
    flag::{Environment, Phase},
    EvaluationContext, Flag, FlagCache, Result,
};

/// An already-authenticated caller: the organization and environment its credential resolves
/// to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub organization_id: String,
    pub environment: Environment,
}

impl Caller {
    pub fn new(organization_id: impl Into<String>, environment: Environment) -> Caller {
        Caller {
            organization_id: organization_id.into(),
            environment,
        }
    }
}

/// Externally visible answer for one flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagEvaluation {
    pub flag_key: String,
    pub enabled: bool,
    pub metadata: EvaluationMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationMetadata {
    pub reason: Reason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_phase: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<u32>,
}

impl FlagEvaluation {
    fn new(flag_key: &str, result: EvaluationResult) -> FlagEvaluation {
        FlagEvaluation {
            flag_key: flag_key.to_owned(),
            enabled: result.enabled,
            metadata: EvaluationMetadata {
                reason: result.reason,
                matched_phase: result.matched_phase,
                bucket: result.bucket,
            },
        }
    }
}

/// Evaluates flags for callers, reading flags through a [`FlagCache`].
///
/// The service always produces an answer. Missing flags and environments evaluate to disabled
/// with a matching [`Reason`], and store failures evaluate to disabled with
/// [`Reason::EvaluationError`].
///
/// # Examples
/// ```
/// # use std::{collections::HashMap, sync::Arc};
/// # use flagwise::{Caller, Environment, EvaluationService, FlagCache, InMemoryFlagStore, Reason};
/// let store = Arc::new(InMemoryFlagStore::new());
/// let service = EvaluationService::new(Arc::new(FlagCache::new(store)));
///
/// let caller = Caller::new("org-1", Environment::Production);
/// let evaluation = service.evaluate(&caller, "new-checkout", &HashMap::new());
/// assert!(!evaluation.enabled);
/// assert_eq!(evaluation.metadata.reason, Reason::FlagNotFound);
/// ```
pub struct EvaluationService {
    cache: Arc<FlagCache>,
}

impl EvaluationService {
    pub fn new(cache: Arc<FlagCache>) -> EvaluationService {
        EvaluationService { cache }
    }

    pub fn cache(&self) -> &FlagCache {
        &self.cache
    }

    /// Evaluate `flag_key` for `caller` and `context`.
    pub fn evaluate(
        &self,
        caller: &Caller,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> FlagEvaluation {
        self.evaluate_at(caller, flag_key, context, Utc::now())
    }

    /// Evaluate `flag_key` for `caller` and `context` at the instant `now`.
    pub fn evaluate_at(
        &self,
        caller: &Caller,
        flag_key: &str,
        context: &EvaluationContext,
        now: DateTime<Utc>,
    ) -> FlagEvaluation {
        let result = match self.cache.get(&caller.organization_id, flag_key) {
            Ok(Some(flag)) => match flag.environment(caller.environment) {
                Some(config) => eval::evaluate_at(flag_key, config, context, now),
                None => EvaluationResult::disabled(Reason::EnvironmentNotConfigured),
            },
            Ok(None) => EvaluationResult::disabled(Reason::FlagNotFound),
            Err(err) => {
                log::warn!(target: "flagwise",
                           organization_id = caller.organization_id.as_str(),
                           flag_key;
                           "error occurred while loading a flag: {:?}", err);
                EvaluationResult::disabled(Reason::EvaluationError)
            }
        };

        log::trace!(target: "flagwise",
                    organization_id = caller.organization_id.as_str(),
                    environment:display = caller.environment,
                    flag_key,
                    enabled = result.enabled,
                    reason:display = result.reason;
                    "evaluated a flag");

        FlagEvaluation::new(flag_key, result)
    }

    /// Evaluate several flags against the same context. Results are in the order of `flag_keys`.
    pub fn evaluate_all<'a>(
        &self,
        caller: &Caller,
        flag_keys: impl IntoIterator<Item = &'a str>,
        context: &EvaluationContext,
    ) -> Vec<FlagEvaluation> {
        let now = Utc::now();
        flag_keys
            .into_iter()
            .map(|flag_key| self.evaluate_at(caller, flag_key, context, now))
            .collect()
    }

    /// Notify the service that `flag` was created or updated in the store.
    pub fn flag_saved(&self, flag: Flag) -> Result<()> {
        let organization_id = flag.organization_id.clone();
        let flag_key = flag.key.clone();
        self.cache.set(&organization_id, &flag_key, flag)
    }

    /// Notify the service that a flag was deleted from the store. Returns whether it was cached.
    pub fn flag_deleted(&self, organization_id: &str, flag_key: &str) -> Result<bool> {
        self.cache.delete(organization_id, flag_key)
    }
}
