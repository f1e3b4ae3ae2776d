//! Message shapes for the policy wire format.
//!
//! This module is the single source of truth for every message and enum that
//! participates in the policy encoding protocol, together with the numeric
//! field tags that fix the canonical serialization order. The messages are
//! hand-written `prost` structs rather than generated from `.proto` files so
//! that the tag assignments live next to the types they govern.
//!
//! # Schema Overview
//!
//! ```text
//! Policy
//!   rules: [Rule]
//!     parameter_constraints: [ParameterConstraint]
//!       constraint: Constraint
//!         value: oneof { fixed | min | max | range | whitelist }
//!   fee_policies: [FeePolicy]
//!   configuration: map<string, string>
//!   schedule: Schedule (optional)
//! ```
//!
//! # Tag Stability
//!
//! Field tags are part of the wire contract. A signature is computed over
//! data derived from the canonical encoding, so renumbering a field is a
//! breaking protocol change and requires a new schema version in
//! [`registry`]. Tags may be retired but never reused.
//!
//! # Invariants
//!
//! - [INV-SCH-001] Enum zero values are always `Unspecified`.
//! - [INV-SCH-002] A constraint's value variant must agree with its declared
//!   type (e.g. `Fixed` carries `FixedValue`); see
//!   [`Constraint::value_tag_consistent`].
//! - [INV-SCH-003] The `configuration` map is a `BTreeMap` so map entries
//!   encode in key order regardless of insertion order.

pub mod registry;

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use prost::{Enumeration, Message, Oneof};

/// The root policy message: one automation authorization a user grants to a
/// plugin.
///
/// `id` identifies the policy *template* (the plugin's schema-declared id),
/// not the stored record; the record's own id lives on
/// [`crate::record::PluginPolicyRecord`].
#[derive(Clone, PartialEq, Message)]
pub struct Policy {
    /// Policy template identifier (the plugin's declared id).
    #[prost(string, tag = "1")]
    pub id: String,

    /// Marketplace plugin identifier.
    #[prost(string, tag = "2")]
    pub plugin_id: String,

    /// Human-readable plugin name.
    #[prost(string, tag = "3")]
    pub plugin_name: String,

    /// Plugin semantic version, as a single integer.
    #[prost(int32, tag = "4")]
    pub plugin_version: i32,

    /// Plugin author.
    #[prost(string, tag = "5")]
    pub author: String,

    /// Human-readable description of what this policy authorizes.
    #[prost(string, tag = "6")]
    pub description: String,

    /// Ordered authorization grants. Non-empty for any policy that
    /// authorizes an action.
    #[prost(message, repeated, tag = "7")]
    pub rules: Vec<Rule>,

    /// Ordered billing terms, one per plugin pricing tier.
    #[prost(message, repeated, tag = "8")]
    pub fee_policies: Vec<FeePolicy>,

    /// Maximum transactions per rate-limit window, when the plugin is
    /// rate-limited.
    #[prost(uint32, optional, tag = "9")]
    pub max_txs_per_window: Option<u32>,

    /// Rate-limit window length in seconds.
    #[prost(uint32, optional, tag = "10")]
    pub rate_limit_window: Option<u32>,

    /// Plugin-defined configuration properties. Keyed by the property names
    /// the plugin's recipe specification declares.
    #[prost(btree_map = "string, string", tag = "11")]
    pub configuration: BTreeMap<String, String>,

    /// Recurring-execution directive, when the plugin supports scheduling
    /// and the user opted in.
    #[prost(message, optional, tag = "12")]
    pub schedule: Option<Schedule>,
}

/// One authorization grant: an effect on a resource, bounded by parameter
/// constraints.
#[derive(Clone, PartialEq, Message)]
pub struct Rule {
    /// Rule identifier, unique within the policy.
    #[prost(string, tag = "1")]
    pub id: String,

    /// Dot-delimited resource path: `chain.protocol.function`.
    #[prost(string, tag = "2")]
    pub resource: String,

    /// Whether this rule allows or denies the resource.
    #[prost(enumeration = "Effect", tag = "3")]
    pub effect: i32,

    /// Human-readable description of the grant.
    #[prost(string, tag = "4")]
    pub description: String,

    /// Constraints on every parameter the resource's capability declares.
    #[prost(message, repeated, tag = "5")]
    pub parameter_constraints: Vec<ParameterConstraint>,

    /// Reserved extension mapping; always empty in current usage.
    #[prost(btree_map = "string, string", tag = "6")]
    pub constraints: BTreeMap<String, String>,
}

/// Binds one named parameter to a [`Constraint`].
#[derive(Clone, PartialEq, Message)]
pub struct ParameterConstraint {
    /// The parameter name as declared by the resource capability.
    #[prost(string, tag = "1")]
    pub parameter_name: String,

    /// The constraint on the parameter's value.
    #[prost(message, optional, tag = "2")]
    pub constraint: Option<Constraint>,
}

/// Describes the permitted value(s) for a parameter.
#[derive(Clone, PartialEq, Message)]
pub struct Constraint {
    /// The kind of constraint.
    #[prost(enumeration = "ConstraintType", tag = "1")]
    pub constraint_type: i32,

    /// Whether the parameter must be supplied at execution time.
    #[prost(bool, tag = "2")]
    pub required: bool,

    /// Unit label for the constrained value (e.g. `"wei"`); empty when not
    /// applicable.
    #[prost(string, tag = "3")]
    pub denominated_in: String,

    /// Period label, used with [`ConstraintType::MaxPerPeriod`].
    #[prost(string, tag = "4")]
    pub period: String,

    /// The constrained value. Exactly one variant is set; the variant tag is
    /// significant and must survive round-trip.
    #[prost(oneof = "ConstraintValue", tags = "5, 6, 7, 8, 9")]
    pub value: Option<ConstraintValue>,
}

/// Tagged union of constraint values. The wire tag of the active variant is
/// part of the policy's meaning and is preserved by the canonical codec.
#[derive(Clone, PartialEq, Oneof)]
pub enum ConstraintValue {
    /// The parameter must equal this exact value.
    #[prost(string, tag = "5")]
    FixedValue(String),

    /// Lower bound (inclusive), as a decimal string.
    #[prost(string, tag = "6")]
    MinValue(String),

    /// Upper bound (inclusive), as a decimal string.
    #[prost(string, tag = "7")]
    MaxValue(String),

    /// Inclusive range of permitted values.
    #[prost(message, tag = "8")]
    RangeValue(RangeValue),

    /// Explicit whitelist of permitted values.
    #[prost(message, tag = "9")]
    WhitelistValue(WhitelistValue),
}

/// Inclusive range bounds, as decimal strings.
#[derive(Clone, PartialEq, Message)]
pub struct RangeValue {
    /// Lower bound (inclusive).
    #[prost(string, tag = "1")]
    pub min: String,

    /// Upper bound (inclusive).
    #[prost(string, tag = "2")]
    pub max: String,
}

/// Explicit list of permitted values.
#[derive(Clone, PartialEq, Message)]
pub struct WhitelistValue {
    /// The permitted values, in declaration order.
    #[prost(string, repeated, tag = "1")]
    pub values: Vec<String>,
}

/// One billing term attached to the policy. Synthesized from a plugin
/// pricing tier at build time; immutable thereafter.
#[derive(Clone, PartialEq, Message)]
pub struct FeePolicy {
    /// Fee policy identifier.
    #[prost(string, tag = "1")]
    pub id: String,

    /// Amount in the smallest currency unit (e.g. micro-dollars). Full
    /// 64-bit range.
    #[prost(int64, tag = "2")]
    pub amount: i64,

    /// Human-readable description of the billing term.
    #[prost(string, tag = "3")]
    pub description: String,

    /// Billing cadence for recurring fees.
    #[prost(enumeration = "BillingFrequency", tag = "4")]
    pub frequency: i32,

    /// How the fee is charged.
    #[prost(enumeration = "FeeType", tag = "5")]
    pub fee_type: i32,

    /// When billing begins (UTC).
    #[prost(message, optional, tag = "6")]
    pub start_date: Option<Timestamp>,
}

/// Optional recurring-execution directive.
#[derive(Clone, PartialEq, Message)]
pub struct Schedule {
    /// How often the policy executes.
    #[prost(enumeration = "ScheduleFrequency", tag = "1")]
    pub frequency: i32,

    /// Reserved; always 0 in current usage.
    #[prost(int32, tag = "2")]
    pub interval: i32,

    /// Reserved; always 0 in current usage.
    #[prost(int32, tag = "3")]
    pub max_executions: i32,

    /// First execution time (UTC).
    #[prost(message, optional, tag = "4")]
    pub start_time: Option<Timestamp>,
}

/// A point in time as seconds + nanos since the Unix epoch, UTC.
///
/// Wire-compatible with the well-known protobuf timestamp.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Message)]
pub struct Timestamp {
    /// Seconds since the Unix epoch.
    #[prost(int64, tag = "1")]
    pub seconds: i64,

    /// Sub-second nanoseconds, in `0..1_000_000_000`.
    #[prost(int32, tag = "2")]
    pub nanos: i32,
}

impl Timestamp {
    /// Converts a UTC datetime into a wire timestamp.
    #[must_use]
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self {
            seconds: dt.timestamp(),
            // timestamp_subsec_nanos() < 2_000_000_000, and values >= 1e9
            // only occur on leap seconds, which chrono folds away for Utc.
            nanos: (dt.timestamp_subsec_nanos() % 1_000_000_000) as i32,
        }
    }

    /// Converts back to a UTC datetime, if the fields are in range.
    #[must_use]
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        let nanos = u32::try_from(self.nanos).ok()?;
        Utc.timestamp_opt(self.seconds, nanos).single()
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Whether a rule allows or denies its resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum Effect {
    /// Not set.
    Unspecified = 0,
    /// The rule permits the resource.
    Allow = 1,
    /// The rule forbids the resource.
    Deny = 2,
}

impl Effect {
    /// Returns the display label for this effect.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of constraint placed on a parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum ConstraintType {
    /// Not set.
    Unspecified = 0,
    /// The parameter must equal a fixed value.
    Fixed = 1,
    /// The parameter must be at least a minimum value.
    Min = 2,
    /// The parameter must be at most a maximum value.
    Max = 3,
    /// The parameter must fall within an inclusive range.
    Range = 4,
    /// The parameter is rate-limited per period.
    MaxPerPeriod = 5,
    /// The parameter must be one of an explicit set of values.
    Whitelist = 6,
}

impl ConstraintType {
    /// Returns the display label for this constraint type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Fixed => "fixed",
            Self::Min => "min",
            Self::Max => "max",
            Self::Range => "range",
            Self::MaxPerPeriod => "max_per_period",
            Self::Whitelist => "whitelist",
        }
    }
}

impl std::fmt::Display for ConstraintType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing cadence for a fee policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum BillingFrequency {
    /// Not set, or an unrecognized server-supplied label.
    Unspecified = 0,
    /// Billed every day.
    Daily = 1,
    /// Billed every week.
    Weekly = 2,
    /// Billed every two weeks.
    Biweekly = 3,
    /// Billed every month.
    Monthly = 4,
}

impl BillingFrequency {
    /// Maps a marketplace pricing label to its enum code.
    ///
    /// The lookup is an exact literal match; unknown labels return `None`
    /// and callers fall back to [`Self::Unspecified`], since pricing data is
    /// server-supplied and may evolve ahead of this client.
    #[must_use]
    pub fn from_pricing_label(label: &str) -> Option<Self> {
        match label {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "biweekly" => Some(Self::Biweekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }

    /// Returns the display label for this frequency.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Biweekly => "biweekly",
            Self::Monthly => "monthly",
        }
    }
}

impl std::fmt::Display for BillingFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a fee is charged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum FeeType {
    /// Not set, or an unrecognized server-supplied label.
    Unspecified = 0,
    /// Charged once at install time.
    Once = 1,
    /// Charged on the billing cadence.
    Recurring = 2,
    /// Charged per executed transaction.
    Transaction = 3,
}

impl FeeType {
    /// Maps a marketplace pricing label to its enum code.
    ///
    /// Exact literal match; unknown labels return `None` (see
    /// [`BillingFrequency::from_pricing_label`]).
    #[must_use]
    pub fn from_pricing_label(label: &str) -> Option<Self> {
        match label {
            "once" => Some(Self::Once),
            "recurring" => Some(Self::Recurring),
            "per-tx" => Some(Self::Transaction),
            _ => None,
        }
    }

    /// Returns the display label for this fee type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Once => "once",
            Self::Recurring => "recurring",
            Self::Transaction => "per-tx",
        }
    }
}

impl std::fmt::Display for FeeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How often a scheduled policy executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum ScheduleFrequency {
    /// Not set.
    Unspecified = 0,
    /// Every hour.
    Hourly = 1,
    /// Every day.
    Daily = 2,
    /// Every week.
    Weekly = 3,
    /// Every two weeks.
    Biweekly = 4,
    /// Every month.
    Monthly = 5,
}

impl ScheduleFrequency {
    /// Maps a form-selected frequency label to its enum code.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "hourly" => Some(Self::Hourly),
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "biweekly" => Some(Self::Biweekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }

    /// Returns the display label for this frequency.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Biweekly => "biweekly",
            Self::Monthly => "monthly",
        }
    }
}

impl std::fmt::Display for ScheduleFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Value-tag consistency
// =============================================================================

impl ConstraintValue {
    /// Returns the field name of the active variant, as it appears on the
    /// wire contract.
    #[must_use]
    pub const fn tag_name(&self) -> &'static str {
        match self {
            Self::FixedValue(_) => "fixed_value",
            Self::MinValue(_) => "min_value",
            Self::MaxValue(_) => "max_value",
            Self::RangeValue(_) => "range_value",
            Self::WhitelistValue(_) => "whitelist_value",
        }
    }
}

impl Constraint {
    /// Checks that the active value variant agrees with the declared
    /// constraint type (INV-SCH-002).
    ///
    /// `MaxPerPeriod` carries a fixed value plus the `period` label, so it
    /// expects the `fixed_value` variant. `Unspecified` places no
    /// expectation on the variant.
    #[must_use]
    pub fn value_tag_consistent(&self) -> bool {
        let expected = match self.constraint_type() {
            ConstraintType::Unspecified => return true,
            ConstraintType::Fixed | ConstraintType::MaxPerPeriod => "fixed_value",
            ConstraintType::Min => "min_value",
            ConstraintType::Max => "max_value",
            ConstraintType::Range => "range_value",
            ConstraintType::Whitelist => "whitelist_value",
        };
        self.value
            .as_ref()
            .is_some_and(|value| value.tag_name() == expected)
    }
}
