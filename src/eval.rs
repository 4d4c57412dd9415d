//! The evaluation engine: a pure function from one environment's configuration and a context to
//! a decision.
//!
//! Evaluation is a linear chain of gates, each of which may short-circuit:
//!
//! 1. kill switch ([`Reason::FlagDisabled`]),
//! 2. phase selection ([`Reason::NoActivePhase`]),
//! 3. context rules ([`Reason::ContextRulesNotMatched`]),
//! 4. percentage bucketing, only when a phase is active ([`Reason::MissingUserId`],
//!    [`Reason::PercentageMatched`], [`Reason::PercentageNotMatched`]),
//! 5. otherwise [`Reason::FlagEnabled`].
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    context::USER_ID,
    flag::{EnvironmentConfig, Phase},
    rules::context_rules_match,
    sharder::{bucket_with, Md5Sharder, Sharder},
    EvaluationContext,
};

/// Machine-readable explanation attached to every evaluation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// No flag with this key exists for the organization.
    FlagNotFound,
    /// The flag exists but has no configuration for the caller's environment.
    EnvironmentNotConfigured,
    /// The environment's kill switch is off.
    FlagDisabled,
    /// Phases are configured, but none of them covers the current instant.
    NoActivePhase,
    /// A targeted field is missing from the context or fails one of its operators.
    ContextRulesNotMatched,
    /// A partial rollout is active, but the context has no `userId` to bucket by.
    MissingUserId,
    PercentageMatched,
    PercentageNotMatched,
    /// Enabled with no phases configured.
    FlagEnabled,
    /// The flag could not be loaded. Evaluation fails safe to disabled.
    EvaluationError,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::FlagNotFound => "flag_not_found",
            Reason::EnvironmentNotConfigured => "environment_not_configured",
            Reason::FlagDisabled => "flag_disabled",
            Reason::NoActivePhase => "no_active_phase",
            Reason::ContextRulesNotMatched => "context_rules_not_matched",
            Reason::MissingUserId => "missing_user_id",
            Reason::PercentageMatched => "percentage_matched",
            Reason::PercentageNotMatched => "percentage_not_matched",
            Reason::FlagEnabled => "flag_enabled",
            Reason::EvaluationError => "evaluation_error",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating one environment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub enabled: bool,
    pub reason: Reason,
    /// The phase whose percentage was checked. Only set for percentage outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_phase: Option<Phase>,
    /// The subject's bucket in `[0, 100)`. Only set when a bucket was computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<u32>,
}

impl EvaluationResult {
    /// A disabled result with no phase or bucket.
    pub fn disabled(reason: Reason) -> EvaluationResult {
        EvaluationResult {
            enabled: false,
            reason,
            matched_phase: None,
            bucket: None,
        }
    }

    fn enabled(reason: Reason) -> EvaluationResult {
        EvaluationResult {
            enabled: true,
            ..EvaluationResult::disabled(reason)
        }
    }
}

/// Evaluate `config` for `context` at the current instant.
pub fn evaluate(
    flag_key: &str,
    config: &EnvironmentConfig,
    context: &EvaluationContext,
) -> EvaluationResult {
    evaluate_at(flag_key, config, context, Utc::now())
}

/// Evaluate `config` for `context` at the instant `now`.
pub fn evaluate_at(
    flag_key: &str,
    config: &EnvironmentConfig,
    context: &EvaluationContext,
    now: DateTime<Utc>,
) -> EvaluationResult {
    evaluate_with_sharder(flag_key, config, context, now, &Md5Sharder)
}

/// Evaluate `config` for `context` at the instant `now`, bucketing with `sharder`.
pub fn evaluate_with_sharder(
    flag_key: &str,
    config: &EnvironmentConfig,
    context: &EvaluationContext,
    now: DateTime<Utc>,
    sharder: &impl Sharder,
) -> EvaluationResult {
    if !config.enabled {
        return EvaluationResult::disabled(Reason::FlagDisabled);
    }

    // No phases at all is an implicit, always active 100% rollout.
    let phase = if config.phases.is_empty() {
        None
    } else {
        let Some(phase) = config.active_phase(now) else {
            return EvaluationResult::disabled(Reason::NoActivePhase);
        };
        Some(phase)
    };

    if !context_rules_match(&config.context_rules, context) {
        return EvaluationResult::disabled(Reason::ContextRulesNotMatched);
    }

    let Some(phase) = phase else {
        return EvaluationResult::enabled(Reason::FlagEnabled);
    };

    let percentage = phase.percentage();
    let bucket = match context.get(USER_ID) {
        Some(user_id) => Some(bucket_with(sharder, &user_id.to_string(), flag_key)),
        // Every bucket passes a full rollout, so it needs no user id.
        None if percentage >= 100 => None,
        None => return EvaluationResult::disabled(Reason::MissingUserId),
    };

    let matched = bucket.map_or(true, |bucket| bucket < percentage);
    EvaluationResult {
        enabled: matched,
        reason: if matched {
            Reason::PercentageMatched
        } else {
            Reason::PercentageNotMatched
        },
        matched_phase: Some(phase.clone()),
        bucket,
    }
}
