//! Round-trip checking and display projection of stored policies.
//!
//! A stored record carries only the base64 recipe; rendering a policy's
//! parameter and fee tables must not require the original form state. This
//! module strict-decodes the recipe back into structured data for display,
//! and reconstructs the exact four signing inputs so a deletion or update
//! can re-derive the same signing message that was originally signed.
//!
//! A decode failure on a stored record is a data-integrity event: it means
//! corruption or a schema/version mismatch, and is surfaced as
//! [`ViewError::Integrity`], never conflated with a "not found" outcome.

use chrono::{DateTime, Utc};
use serde::Serialize;

use thiserror::Error;

use crate::codec::{self, CodecError};
use crate::envelope::{self, EnvelopeError};
use crate::record::{DeletePolicyRequest, PluginPolicyRecord};
use crate::schema::{
    BillingFrequency, Constraint, ConstraintType, ConstraintValue, Effect, FeeType, Policy,
    ScheduleFrequency, Timestamp,
};

/// Errors from round-trip checking.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ViewError {
    /// The stored recipe failed to decode: corruption or a schema/version
    /// mismatch. Surfaced as a distinct "corrupted policy" state.
    #[error("stored recipe failed integrity decode: {0}")]
    Integrity(#[from] CodecError),

    /// A stored timestamp cannot be represented as a datetime.
    #[error("stored timestamp is out of range: seconds={seconds}, nanos={nanos}")]
    InvalidTimestamp {
        /// The stored seconds.
        seconds: i64,
        /// The stored nanos.
        nanos: i32,
    },

    /// The record has no signature on file; a mutating operation cannot be
    /// authorized.
    #[error("record has no signature on file")]
    MissingSignature,

    /// Re-deriving the signing message failed.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

/// Human-readable projection of one stored policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyView {
    /// Policy template id.
    pub policy_id: String,
    /// Plugin identifier.
    pub plugin_id: String,
    /// Plugin display name.
    pub plugin_name: String,
    /// Plugin version.
    pub plugin_version: i32,
    /// Rule tables.
    pub rules: Vec<RuleView>,
    /// Fee tables.
    pub fees: Vec<FeeView>,
    /// Schedule, when the policy is scheduled.
    pub schedule: Option<ScheduleView>,
    /// Configuration entries, in key order.
    pub configuration: Vec<(String, String)>,
}

/// One rule row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleView {
    /// Resource path the rule covers.
    pub resource: String,
    /// Effect label (`"allow"` / `"deny"`).
    pub effect: String,
    /// Parameter rows.
    pub parameters: Vec<ParameterView>,
}

/// One parameter-constraint row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterView {
    /// Parameter name.
    pub name: String,
    /// Constraint type label.
    pub constraint_type: String,
    /// Whether the parameter is required.
    pub required: bool,
    /// Unit label; empty when not applicable.
    pub denominated_in: String,
    /// Rendered constraint value.
    pub value: String,
}

/// One fee row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeView {
    /// Amount in the smallest currency unit.
    pub amount: i64,
    /// Frequency label.
    pub frequency: String,
    /// Fee type label.
    pub fee_type: String,
    /// Billing start, UTC.
    pub start_date: Option<DateTime<Utc>>,
}

/// Schedule row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleView {
    /// Frequency label.
    pub frequency: String,
    /// First execution, UTC.
    pub start_time: Option<DateTime<Utc>>,
}

/// The four signing inputs reconstructed from a stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningInputs {
    /// Base64 recipe.
    pub recipe: String,
    /// Vault public key.
    pub public_key: String,
    /// Stored policy version.
    pub policy_version: u32,
    /// Plugin version string.
    pub plugin_version: String,
}

impl SigningInputs {
    /// Re-derives the signing message these inputs bind.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidSignatureInput`] if a stored field
    /// contains the reserved delimiter.
    pub fn derive_message(&self) -> Result<String, EnvelopeError> {
        envelope::derive_signing_message(
            &self.recipe,
            &self.public_key,
            self.policy_version,
            &self.plugin_version,
        )
    }
}

/// Strict-decodes a stored recipe into its display projection.
///
/// # Errors
///
/// Returns [`ViewError::Integrity`] when the recipe is not a canonical
/// policy encoding, and [`ViewError::InvalidTimestamp`] for stored
/// timestamps outside the representable range.
pub fn decode_for_display(recipe: &str) -> Result<PolicyView, ViewError> {
    let policy = codec::decode_from_transport(recipe)?;
    project(&policy)
}

/// Projects a decoded policy into its display shape.
fn project(policy: &Policy) -> Result<PolicyView, ViewError> {
    let rules = policy
        .rules
        .iter()
        .map(|rule| RuleView {
            resource: rule.resource.clone(),
            effect: effect_label(rule.effect),
            parameters: rule
                .parameter_constraints
                .iter()
                .map(|pc| ParameterView {
                    name: pc.parameter_name.clone(),
                    constraint_type: pc
                        .constraint
                        .as_ref()
                        .map_or_else(|| "unspecified".to_string(), |c| type_label(c.constraint_type)),
                    required: pc.constraint.as_ref().is_some_and(|c| c.required),
                    denominated_in: pc
                        .constraint
                        .as_ref()
                        .map(|c| c.denominated_in.clone())
                        .unwrap_or_default(),
                    value: pc
                        .constraint
                        .as_ref()
                        .map(render_value)
                        .unwrap_or_default(),
                })
                .collect(),
        })
        .collect();

    let mut fees = Vec::with_capacity(policy.fee_policies.len());
    for fee in &policy.fee_policies {
        fees.push(FeeView {
            amount: fee.amount,
            frequency: frequency_label(fee.frequency),
            fee_type: fee_type_label(fee.fee_type),
            start_date: resolve_timestamp(fee.start_date)?,
        });
    }

    let schedule = match &policy.schedule {
        Some(schedule) => Some(ScheduleView {
            frequency: schedule_frequency_label(schedule.frequency),
            start_time: resolve_timestamp(schedule.start_time)?,
        }),
        None => None,
    };

    Ok(PolicyView {
        policy_id: policy.id.clone(),
        plugin_id: policy.plugin_id.clone(),
        plugin_name: policy.plugin_name.clone(),
        plugin_version: policy.plugin_version,
        rules,
        fees,
        schedule,
        configuration: policy
            .configuration
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    })
}

fn resolve_timestamp(ts: Option<Timestamp>) -> Result<Option<DateTime<Utc>>, ViewError> {
    match ts {
        None => Ok(None),
        Some(ts) => ts
            .to_datetime()
            .map(Some)
            .ok_or(ViewError::InvalidTimestamp {
                seconds: ts.seconds,
                nanos: ts.nanos,
            }),
    }
}

fn render_value(constraint: &Constraint) -> String {
    match &constraint.value {
        None => String::new(),
        Some(ConstraintValue::FixedValue(v)) => v.clone(),
        Some(ConstraintValue::MinValue(v)) => format!(">= {v}"),
        Some(ConstraintValue::MaxValue(v)) => format!("<= {v}"),
        Some(ConstraintValue::RangeValue(r)) => format!("{}..{}", r.min, r.max),
        Some(ConstraintValue::WhitelistValue(w)) => w.values.join(", "),
    }
}

fn effect_label(code: i32) -> String {
    Effect::try_from(code).map_or_else(|_| format!("unknown({code})"), |e| e.as_str().to_string())
}

fn type_label(code: i32) -> String {
    ConstraintType::try_from(code)
        .map_or_else(|_| format!("unknown({code})"), |t| t.as_str().to_string())
}

fn frequency_label(code: i32) -> String {
    BillingFrequency::try_from(code)
        .map_or_else(|_| format!("unknown({code})"), |f| f.as_str().to_string())
}

fn fee_type_label(code: i32) -> String {
    FeeType::try_from(code).map_or_else(|_| format!("unknown({code})"), |t| t.as_str().to_string())
}

fn schedule_frequency_label(code: i32) -> String {
    ScheduleFrequency::try_from(code)
        .map_or_else(|_| format!("unknown({code})"), |f| f.as_str().to_string())
}

/// Reconstructs the four signing inputs from a stored record, checking
/// recipe integrity first.
///
/// # Errors
///
/// Returns [`ViewError::Integrity`] when the stored recipe does not
/// strict-decode; the inputs of a corrupt record must not be re-signed.
pub fn signing_inputs(record: &PluginPolicyRecord) -> Result<SigningInputs, ViewError> {
    // Integrity gate: the recipe must still be a canonical policy encoding
    // before its bytes are trusted as a signing input.
    codec::decode_from_transport(&record.recipe)?;
    Ok(SigningInputs {
        recipe: record.recipe.clone(),
        public_key: record.public_key.clone(),
        policy_version: record.policy_version,
        plugin_version: record.plugin_version.clone(),
    })
}

/// Authorizes a deletion: confirms the stored recipe's integrity, re-derives
/// the signing message, and returns the delete request carrying the
/// signature on file.
///
/// Trust is ultimately adjudicated server-side; this only guarantees the
/// client reproduces the same message deterministically.
///
/// # Errors
///
/// Returns [`ViewError::MissingSignature`] for unsigned records, and
/// propagates integrity and envelope failures.
pub fn authorize_deletion(record: &PluginPolicyRecord) -> Result<DeletePolicyRequest, ViewError> {
    let signature = record
        .signature
        .clone()
        .ok_or(ViewError::MissingSignature)?;
    let inputs = signing_inputs(record)?;
    // The derived message is discarded here; deriving it proves the stored
    // fields still produce an unambiguous message for the backend to check.
    inputs.derive_message()?;
    Ok(DeletePolicyRequest {
        id: record.id.clone(),
        signature,
    })
}
