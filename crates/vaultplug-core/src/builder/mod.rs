//! Policy construction from validated form input.
//!
//! `build` maps a set of user-entered form values, a plugin's recipe
//! specification, and the plugin's pricing tiers into one fully-populated
//! [`Policy`] message. Construction is pure: the build time is an explicit
//! argument, nothing is read from ambient state, and the same inputs always
//! produce the same policy.
//!
//! # Invariants
//!
//! - [INV-BLD-001] Every parameter the selected resource declares as
//!   required is covered by a constraint, or the build fails.
//! - [INV-BLD-002] Configuration keys not declared by the specification are
//!   rejected, never passed through.
//! - [INV-BLD-003] The assembled policy passes [`validate`] before it is
//!   returned; a policy that would fail its own invariants is never handed
//!   to the serializer.

pub mod pricing;
pub mod recipe;

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, SecondsFormat, TimeZone, Utc};
use serde_json::Value;
use thiserror::Error;

use self::pricing::{PricingTier, fee_policy_for_tier};
use self::recipe::RecipeSchema;
use crate::schema::registry::{self, UnsupportedSchemaVersion};
use crate::schema::{
    Constraint, ConstraintType, ConstraintValue, Effect, ParameterConstraint, Policy, Rule,
    Schedule, ScheduleFrequency, Timestamp,
};

/// Form key holding the selected supported-resource index.
pub const FORM_KEY_RESOURCE: &str = "supportedResource";
/// Form key enabling scheduled execution.
pub const FORM_KEY_SCHEDULE_ENABLED: &str = "scheduleEnabled";
/// Form key holding the selected schedule frequency label.
pub const FORM_KEY_SCHEDULE_FREQUENCY: &str = "scheduleFrequency";
/// Form key holding an explicit schedule start date (RFC 3339).
pub const FORM_KEY_SCHEDULE_START: &str = "scheduleStartDate";
/// Form key for the "start of next calendar month" shortcut.
pub const FORM_KEY_SCHEDULE_NEXT_MONTH: &str = "scheduleStartNextMonth";
/// Form key holding the nested configuration object.
pub const FORM_KEY_CONFIGURATION: &str = "configuration";
/// Form key holding the per-window transaction cap.
pub const FORM_KEY_MAX_TXS: &str = "maxTxsPerWindow";
/// Form key holding the rate-limit window length in seconds.
pub const FORM_KEY_RATE_LIMIT_WINDOW: &str = "rateLimitWindow";

/// User-entered form values, keyed by field name.
///
/// Values arrive as collaborator JSON and have already passed form-level
/// required-field validation; the builder still re-checks everything it
/// consumes, fail-closed.
#[derive(Debug, Clone, Default)]
pub struct FormValues(BTreeMap<String, Value>);

impl FormValues {
    /// Creates an empty set of form values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a form value, replacing any previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style insertion.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns the value for `key` as a string, stringifying scalar JSON
    /// values the way a form serializes them.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Returns the value for `key` as an index, accepting both numeric and
    /// numeric-string form encodings.
    #[must_use]
    pub fn get_index(&self, key: &str) -> Option<usize> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Returns the value for `key` as a `u32`, when present and in range.
    #[must_use]
    pub fn get_u32(&self, key: &str) -> Option<u32> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Returns whether `key` holds a truthy flag (`true` or `"true"`).
    #[must_use]
    pub fn get_bool(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s == "true",
            _ => false,
        }
    }

    /// Returns the nested configuration object, when present.
    #[must_use]
    pub fn configuration(&self) -> Option<&serde_json::Map<String, Value>> {
        match self.0.get(FORM_KEY_CONFIGURATION) {
            Some(Value::Object(map)) => Some(map),
            _ => None,
        }
    }
}

impl FromIterator<(String, Value)> for FormValues {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Errors from policy construction.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuildError {
    /// A required form value is missing. Recoverable; surfaced to the user
    /// for correction.
    #[error("missing required parameter value: {parameter_name}")]
    MissingParameter {
        /// The missing parameter's name.
        parameter_name: String,
    },

    /// The selected resource index does not exist on the specification.
    #[error("selected resource index {index} is out of range ({available} resources available)")]
    ResourceIndexOutOfRange {
        /// The selected index.
        index: usize,
        /// How many resources the specification declares.
        available: usize,
    },

    /// The specification declares a schema version this client cannot
    /// build against.
    #[error(transparent)]
    UnsupportedSchemaVersion(#[from] UnsupportedSchemaVersion),

    /// A date-time form value could not be parsed as RFC 3339.
    #[error("invalid date-time value for {field}: {value}")]
    InvalidDateTime {
        /// The offending form field.
        field: String,
        /// The value that failed to parse.
        value: String,
    },

    /// A configuration key is not declared by the specification.
    #[error("unknown configuration key: {name}")]
    UnknownConfigurationKey {
        /// The undeclared key.
        name: String,
    },

    /// A declared-required configuration property has no value.
    #[error("missing required configuration value: {name}")]
    MissingConfiguration {
        /// The missing property name.
        name: String,
    },

    /// The selected schedule frequency is not one the plugin supports.
    #[error("unsupported schedule frequency: {label}")]
    UnsupportedScheduleFrequency {
        /// The rejected label.
        label: String,
    },

    /// A parameter capability's first supported constraint type is unknown
    /// to this client.
    #[error("parameter {parameter_name} declares a constraint type this client does not support")]
    UnsupportedConstraintType {
        /// The parameter whose capability could not be honored.
        parameter_name: String,
    },

    /// The assembled policy has no rules.
    #[error("policy has no rules")]
    EmptyRules,

    /// A rule references a resource the plugin does not advertise.
    #[error("rule resource {resource} is not advertised by the plugin")]
    UnadvertisedResource {
        /// The unadvertised resource path.
        resource: String,
    },

    /// A constraint's value variant disagrees with its declared type.
    #[error("constraint for parameter {parameter_name} has inconsistent type and value tag")]
    InconsistentConstraint {
        /// The parameter with the inconsistent constraint.
        parameter_name: String,
    },

    /// A fee policy carries a negative amount.
    #[error("fee amount {amount} is negative")]
    NegativeFeeAmount {
        /// The offending amount.
        amount: i64,
    },
}

/// Builds a policy from form values, a recipe specification, and pricing
/// tiers.
///
/// `built_at` is the build timestamp used for fee start dates and default
/// schedule starts; callers pass `Utc::now()` in production and a fixed
/// instant in tests.
///
/// The policy's `id` is the specification's plugin id: it identifies the
/// policy *template*, while the stored record carries its own
/// client-generated id.
///
/// # Errors
///
/// Returns a [`BuildError`] describing the first violated requirement; see
/// the variant docs for recoverability.
pub fn build(
    form: &FormValues,
    spec: &RecipeSchema,
    pricing: &[PricingTier],
    built_at: DateTime<Utc>,
) -> Result<Policy, BuildError> {
    registry::ensure_supported(spec.schema_version)?;

    let index = form
        .get_index(FORM_KEY_RESOURCE)
        .ok_or_else(|| BuildError::MissingParameter {
            parameter_name: FORM_KEY_RESOURCE.to_string(),
        })?;
    let resource =
        spec.supported_resources
            .get(index)
            .ok_or(BuildError::ResourceIndexOutOfRange {
                index,
                available: spec.supported_resources.len(),
            })?;

    let denomination = if resource.resource_path.is_ethereum() {
        "wei"
    } else {
        ""
    };

    let mut parameter_constraints = Vec::with_capacity(resource.parameter_capabilities.len());
    for capability in &resource.parameter_capabilities {
        let Some(value) = form.get_str(&capability.parameter_name) else {
            if capability.required {
                return Err(BuildError::MissingParameter {
                    parameter_name: capability.parameter_name.clone(),
                });
            }
            continue;
        };
        parameter_constraints.push(ParameterConstraint {
            parameter_name: capability.parameter_name.clone(),
            constraint: Some(Constraint {
                constraint_type: capability.primary_type() as i32,
                required: capability.required,
                denominated_in: denomination.to_string(),
                period: String::new(),
                value: Some(ConstraintValue::FixedValue(value)),
            }),
        });
    }

    let resource_path = resource.resource_path.full_path();
    let rule = Rule {
        id: format!("{}-rule-0", spec.plugin_id),
        resource: resource_path.clone(),
        effect: Effect::Allow as i32,
        description: format!("allow {resource_path}"),
        parameter_constraints,
        constraints: BTreeMap::new(),
    };

    let fee_policies = pricing
        .iter()
        .enumerate()
        .map(|(i, tier)| fee_policy_for_tier(&spec.plugin_id, i, tier, built_at))
        .collect();

    let configuration = build_configuration(form, spec)?;
    let schedule = build_schedule(form, spec, built_at)?;

    let policy = Policy {
        id: spec.plugin_id.clone(),
        plugin_id: spec.plugin_id.clone(),
        plugin_name: spec.plugin_name.clone(),
        plugin_version: spec.plugin_version,
        author: spec.author.clone(),
        description: spec.description.clone(),
        rules: vec![rule],
        fee_policies,
        max_txs_per_window: form.get_u32(FORM_KEY_MAX_TXS),
        rate_limit_window: form.get_u32(FORM_KEY_RATE_LIMIT_WINDOW),
        configuration,
        schedule,
    };

    validate(&policy, spec)?;
    Ok(policy)
}

/// Populates the configuration mapping from the nested `configuration`
/// form object, restricted to declared properties (INV-BLD-002).
fn build_configuration(
    form: &FormValues,
    spec: &RecipeSchema,
) -> Result<BTreeMap<String, String>, BuildError> {
    let mut configuration = BTreeMap::new();
    let Some(config_schema) = &spec.configuration else {
        return Ok(configuration);
    };

    if let Some(entries) = form.configuration() {
        for (key, value) in entries {
            let Some(property) = config_schema.properties.get(key) else {
                return Err(BuildError::UnknownConfigurationKey { name: key.clone() });
            };
            let raw = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null | Value::Array(_) | Value::Object(_) => continue,
            };
            let stored = if property.is_date_time() {
                normalize_date_time(key, &raw)?
            } else {
                raw
            };
            configuration.insert(key.clone(), stored);
        }
    }

    for name in &config_schema.required {
        if !configuration.contains_key(name) {
            return Err(BuildError::MissingConfiguration { name: name.clone() });
        }
    }
    Ok(configuration)
}

/// Populates the schedule when the plugin supports scheduling and the user
/// opted in.
fn build_schedule(
    form: &FormValues,
    spec: &RecipeSchema,
    built_at: DateTime<Utc>,
) -> Result<Option<Schedule>, BuildError> {
    let Some(capability) = &spec.scheduling else {
        return Ok(None);
    };
    if !capability.supports_scheduling || !form.get_bool(FORM_KEY_SCHEDULE_ENABLED) {
        return Ok(None);
    }

    let label = form
        .get_str(FORM_KEY_SCHEDULE_FREQUENCY)
        .ok_or_else(|| BuildError::MissingParameter {
            parameter_name: FORM_KEY_SCHEDULE_FREQUENCY.to_string(),
        })?;
    let frequency = ScheduleFrequency::from_label(&label)
        .ok_or_else(|| BuildError::UnsupportedScheduleFrequency {
            label: label.clone(),
        })?;
    if !capability.supported_frequencies.is_empty()
        && !capability.supported_frequencies.iter().any(|f| f == &label)
    {
        return Err(BuildError::UnsupportedScheduleFrequency { label });
    }

    let start_time = if let Some(raw) = form.get_str(FORM_KEY_SCHEDULE_START) {
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| BuildError::InvalidDateTime {
                field: FORM_KEY_SCHEDULE_START.to_string(),
                value: raw,
            })?
    } else if form.get_bool(FORM_KEY_SCHEDULE_NEXT_MONTH) {
        start_of_next_month(built_at)
    } else {
        built_at
    };

    Ok(Some(Schedule {
        frequency: frequency as i32,
        interval: 0,
        max_executions: 0,
        start_time: Some(Timestamp::from_datetime(start_time)),
    }))
}

/// Formats a `date-time` configuration value as strict UTC RFC 3339.
fn normalize_date_time(field: &str, raw: &str) -> Result<String, BuildError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| {
            dt.with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Secs, true)
        })
        .map_err(|_| BuildError::InvalidDateTime {
            field: field.to_string(),
            value: raw.to_string(),
        })
}

/// Midnight UTC on the first day of the month after `now`.
fn start_of_next_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    // The first of a month at midnight is always a valid UTC instant.
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Checks the assembled policy against its own invariants and the
/// specification's advertised surface (INV-BLD-003).
///
/// # Errors
///
/// Returns the first violation found; the builder never returns a policy
/// that fails this pass.
pub fn validate(policy: &Policy, spec: &RecipeSchema) -> Result<(), BuildError> {
    if policy.rules.is_empty() {
        return Err(BuildError::EmptyRules);
    }

    for rule in &policy.rules {
        let advertised = spec
            .supported_resources
            .iter()
            .any(|r| r.resource_path.full_path() == rule.resource);
        if !advertised {
            return Err(BuildError::UnadvertisedResource {
                resource: rule.resource.clone(),
            });
        }

        for pc in &rule.parameter_constraints {
            let Some(constraint) = &pc.constraint else {
                return Err(BuildError::InconsistentConstraint {
                    parameter_name: pc.parameter_name.clone(),
                });
            };
            if constraint.constraint_type() == ConstraintType::Unspecified {
                return Err(BuildError::UnsupportedConstraintType {
                    parameter_name: pc.parameter_name.clone(),
                });
            }
            if !constraint.value_tag_consistent() {
                return Err(BuildError::InconsistentConstraint {
                    parameter_name: pc.parameter_name.clone(),
                });
            }
        }
    }

    for fee in &policy.fee_policies {
        if fee.amount < 0 {
            return Err(BuildError::NegativeFeeAmount { amount: fee.amount });
        }
    }
    Ok(())
}
