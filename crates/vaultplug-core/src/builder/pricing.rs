//! Pricing tier mapping.
//!
//! The marketplace serves each plugin's pricing as an ordered list of tiers
//! with free-text `frequency` and `type` labels. One [`FeePolicy`] is
//! synthesized per tier at build time. Label mapping is an exact literal
//! lookup; labels this client does not know map to `Unspecified` rather
//! than failing, since pricing data is server-supplied and may evolve ahead
//! of deployed clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::{BillingFrequency, FeePolicy, FeeType, Timestamp};

/// One pricing tier, as served by the marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PricingTier {
    /// Tier identifier, when the marketplace assigns one.
    #[serde(default)]
    pub id: Option<String>,

    /// Amount in the smallest currency unit (e.g. micro-dollars).
    pub amount: i64,

    /// Billing cadence label (`"daily"`, `"weekly"`, `"biweekly"`,
    /// `"monthly"`).
    #[serde(default)]
    pub frequency: String,

    /// Charge model label (`"once"`, `"recurring"`, `"per-tx"`).
    #[serde(rename = "type")]
    pub kind: String,

    /// Optional tier description.
    #[serde(default)]
    pub description: String,
}

/// Synthesizes the fee policy for one pricing tier.
///
/// `start_date` is the build time for every synthesized fee. Tiers without
/// a marketplace id get a deterministic `"<plugin-id>-fee-<index>"` id so
/// that building is pure.
#[must_use]
pub fn fee_policy_for_tier(
    plugin_id: &str,
    index: usize,
    tier: &PricingTier,
    built_at: DateTime<Utc>,
) -> FeePolicy {
    let frequency = BillingFrequency::from_pricing_label(&tier.frequency).unwrap_or_else(|| {
        if !tier.frequency.is_empty() {
            tracing::warn!(
                label = %tier.frequency,
                plugin_id,
                "unknown pricing frequency label, mapping to unspecified"
            );
        }
        BillingFrequency::Unspecified
    });
    let fee_type = FeeType::from_pricing_label(&tier.kind).unwrap_or_else(|| {
        if !tier.kind.is_empty() {
            tracing::warn!(
                label = %tier.kind,
                plugin_id,
                "unknown pricing type label, mapping to unspecified"
            );
        }
        FeeType::Unspecified
    });

    FeePolicy {
        id: tier
            .id
            .clone()
            .unwrap_or_else(|| format!("{plugin_id}-fee-{index}")),
        amount: tier.amount,
        description: tier.description.clone(),
        frequency: frequency as i32,
        fee_type: fee_type as i32,
        start_date: Some(Timestamp::from_datetime(built_at)),
    }
}
