//! Flag documents as they come out of the flag store.
use std::{collections::HashMap, fmt};

use chrono::{DateTime, Utc};
use derive_more::From;
use serde::{Deserialize, Deserializer, Serialize};

use crate::rules::ContextRule;

/// A feature flag owned by one organization, with one configuration per environment.
///
/// `(organization_id, key)` identifies a flag. Two organizations may use the same key
/// independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    pub organization_id: String,
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub environments: HashMap<Environment, EnvironmentConfig>,
}

impl Flag {
    /// Configuration for `environment`, if the flag has one.
    pub fn environment(&self, environment: Environment) -> Option<&EnvironmentConfig> {
        self.environments.get(&environment)
    }
}

/// The fixed set of environments. The environment is derived from the caller's credential, not
/// sent by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub const ALL: [Environment; 3] = [
        Environment::Development,
        Environment::Staging,
        Environment::Production,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-environment flag configuration.
///
/// Empty and absent (or `null`) `phases` are equivalent and mean an unconditional rollout. The
/// same holds for `contextRules`, which then applies no targeting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfig {
    /// Kill switch. When `false`, nothing else is inspected.
    pub enabled: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub phases: Vec<Phase>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub context_rules: HashMap<String, ContextRule>,
}

impl EnvironmentConfig {
    /// First phase whose interval contains `now`.
    ///
    /// Phases are expected not to overlap. If they do, the first one in list order wins.
    pub fn active_phase(&self, now: DateTime<Utc>) -> Option<&Phase> {
        self.phases.iter().find(|phase| phase.is_active_at(now))
    }
}

/// A percentage rollout step active over `[start_date, end_date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    pub start_date: DateTime<Utc>,
    /// `None` means the phase never ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    pub percentage: u32,
}

impl Phase {
    /// Return `true` if `now` falls within the phase. Start is inclusive, end is exclusive.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        let started = self.start_date <= now;
        let ended = matches!(self.end_date, Some(end) if end <= now);
        started && !ended
    }

    /// Rollout percentage, capped at 100.
    pub fn percentage(&self) -> u32 {
        self.percentage.min(100)
    }
}

/// A scalar operand in a context rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, From)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Number(f64),
    String(String),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

/// Operand of a single operator: a scalar for `eq`/`gt`/..., an array for `oneOf`/`notOneOf`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Multiple(Vec<Value>),
    Single(Value),
}

impl<T: Into<Value>> From<T> for Operand {
    fn from(value: T) -> Self {
        Self::Single(value.into())
    }
}
impl<T: Into<Value>> From<Vec<T>> for Operand {
    fn from(value: Vec<T>) -> Self {
        Self::Multiple(value.into_iter().map(Into::into).collect())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
