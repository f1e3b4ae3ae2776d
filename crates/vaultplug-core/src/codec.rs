//! Canonical policy serialization.
//!
//! Encoding must be deterministic: two structurally-equal [`Policy`] values
//! always produce byte-identical output, because the signing envelope covers
//! data derived from the transport form of this encoding. Determinism comes
//! from two properties of the schema:
//!
//! - prost encodes fields in ascending tag order, and the tag assignments in
//!   [`crate::schema`] are fixed;
//! - the only map fields are `BTreeMap`s, so map entries encode in key order
//!   regardless of how the host populated them.
//!
//! # Strict decoding
//!
//! `decode` enforces a canonical fixpoint: the decoded message is re-encoded
//! and must reproduce the input bytes exactly. Unknown fields, non-minimal
//! varints, and out-of-order fields are all rejected as
//! [`CodecError::NonCanonical`]. Rejecting unknown fields (rather than
//! preserving them) means a recipe that decodes here is guaranteed to
//! re-derive the same signing message that was originally signed; a recipe
//! carrying fields this client cannot see could otherwise be re-signed with
//! silently different meaning.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use prost::Message;
use thiserror::Error;

use crate::schema::Policy;

/// Errors from canonical encode/decode operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// The bytes are not a valid policy message.
    #[error("recipe decode failed: {0}")]
    Decode(#[from] prost::DecodeError),

    /// The bytes decode but are not the canonical encoding of the decoded
    /// message.
    #[error(
        "recipe is not in canonical form: input was {input_len} bytes, \
         canonical re-encoding is {reencoded_len} bytes"
    )]
    NonCanonical {
        /// Length of the supplied bytes.
        input_len: usize,
        /// Length of the canonical re-encoding.
        reencoded_len: usize,
    },

    /// The transport string is not valid base64.
    #[error("recipe transport decode failed: {0}")]
    Transport(#[from] base64::DecodeError),
}

/// Encodes a policy into its canonical byte sequence.
#[must_use]
pub fn encode(policy: &Policy) -> Vec<u8> {
    policy.encode_to_vec()
}

/// Decodes a canonical byte sequence back into a policy.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed bytes and
/// [`CodecError::NonCanonical`] for bytes that decode but are not the
/// canonical encoding of the result (unknown fields, reordered fields,
/// non-minimal varints).
pub fn decode(bytes: &[u8]) -> Result<Policy, CodecError> {
    let policy = Policy::decode(bytes)?;
    let reencoded = encode(&policy);
    if reencoded != bytes {
        tracing::debug!(
            input_len = bytes.len(),
            reencoded_len = reencoded.len(),
            "rejecting non-canonical recipe bytes"
        );
        return Err(CodecError::NonCanonical {
            input_len: bytes.len(),
            reencoded_len: reencoded.len(),
        });
    }
    Ok(policy)
}

/// Encodes canonical bytes into the base64 transport form (RFC 4648,
/// standard alphabet, padded).
#[must_use]
pub fn to_transport(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decodes the base64 transport form back into canonical bytes.
///
/// # Errors
///
/// Returns [`CodecError::Transport`] if the string is not valid standard
/// base64.
pub fn from_transport(recipe: &str) -> Result<Vec<u8>, CodecError> {
    Ok(BASE64.decode(recipe)?)
}

/// Convenience composition: encode a policy straight to its transport form.
#[must_use]
pub fn encode_to_transport(policy: &Policy) -> String {
    to_transport(&encode(policy))
}

/// Convenience composition: strict-decode a policy from its transport form.
///
/// # Errors
///
/// Propagates any [`CodecError`] from the transport or canonical layer.
pub fn decode_from_transport(recipe: &str) -> Result<Policy, CodecError> {
    decode(&from_transport(recipe)?)
}


// =============================================================================
// Property tests: round-trip and determinism laws
// =============================================================================

#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;
    use crate::schema::{
        Constraint, ConstraintValue, FeePolicy, ParameterConstraint, RangeValue, Rule, Schedule,
        Timestamp, WhitelistValue,
    };

    fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (0i64..=4_102_444_800i64, 0i32..1_000_000_000i32)
            .prop_map(|(seconds, nanos)| Timestamp { seconds, nanos })
    }

    fn arb_value() -> impl Strategy<Value = ConstraintValue> {
        prop_oneof![
            "[a-z0-9]{0,12}".prop_map(ConstraintValue::FixedValue),
            "[0-9]{1,12}".prop_map(ConstraintValue::MinValue),
            "[0-9]{1,12}".prop_map(ConstraintValue::MaxValue),
            ("[0-9]{1,6}", "[0-9]{1,6}").prop_map(|(min, max)| {
                ConstraintValue::RangeValue(RangeValue { min, max })
            }),
            proptest::collection::vec("[a-zA-Z0-9]{1,8}", 0..4).prop_map(|values| {
                ConstraintValue::WhitelistValue(WhitelistValue { values })
            }),
        ]
    }

    fn arb_constraint() -> impl Strategy<Value = Constraint> {
        (
            0i32..=6,
            any::<bool>(),
            "[a-z]{0,5}",
            "[a-z]{0,5}",
            proptest::option::of(arb_value()),
        )
            .prop_map(
                |(constraint_type, required, denominated_in, period, value)| Constraint {
                    constraint_type,
                    required,
                    denominated_in,
                    period,
                    value,
                },
            )
    }

    fn arb_rule() -> impl Strategy<Value = Rule> {
        (
            "[a-z0-9-]{1,10}",
            "[a-z]{2,8}\\.[a-z]{2,8}\\.[a-z]{2,8}",
            0i32..=2,
            "[a-zA-Z ]{0,20}",
            proptest::collection::vec(
                ("[a-z]{1,10}", arb_constraint()).prop_map(|(parameter_name, constraint)| {
                    ParameterConstraint {
                        parameter_name,
                        constraint: Some(constraint),
                    }
                }),
                0..3,
            ),
        )
            .prop_map(|(id, resource, effect, description, parameter_constraints)| Rule {
                id,
                resource,
                effect,
                description,
                parameter_constraints,
                constraints: Default::default(),
            })
    }

    fn arb_fee_policy() -> impl Strategy<Value = FeePolicy> {
        (
            "[a-z0-9-]{1,12}",
            any::<i64>(),
            "[a-zA-Z ]{0,16}",
            0i32..=4,
            0i32..=3,
            proptest::option::of(arb_timestamp()),
        )
            .prop_map(
                |(id, amount, description, frequency, fee_type, start_date)| FeePolicy {
                    id,
                    amount,
                    description,
                    frequency,
                    fee_type,
                    start_date,
                },
            )
    }

    fn arb_schedule() -> impl Strategy<Value = Schedule> {
        (0i32..=5, proptest::option::of(arb_timestamp())).prop_map(|(frequency, start_time)| {
            Schedule {
                frequency,
                interval: 0,
                max_executions: 0,
                start_time,
            }
        })
    }

    fn arb_policy() -> impl Strategy<Value = Policy> {
        (
            (
                "[a-z0-9-]{1,16}",
                "[a-z0-9-]{1,16}",
                "[a-zA-Z ]{0,16}",
                0i32..1000,
                "[a-zA-Z ]{0,12}",
                "[a-zA-Z ]{0,24}",
            ),
            proptest::collection::vec(arb_rule(), 0..3),
            proptest::collection::vec(arb_fee_policy(), 0..3),
            proptest::option::of(any::<u32>()),
            proptest::option::of(any::<u32>()),
            proptest::collection::btree_map("[a-z]{1,8}", "[a-zA-Z0-9:. -]{0,16}", 0..4),
            proptest::option::of(arb_schedule()),
        )
            .prop_map(
                |(
                    (id, plugin_id, plugin_name, plugin_version, author, description),
                    rules,
                    fee_policies,
                    max_txs_per_window,
                    rate_limit_window,
                    configuration,
                    schedule,
                )| Policy {
                    id,
                    plugin_id,
                    plugin_name,
                    plugin_version,
                    author,
                    description,
                    rules,
                    fee_policies,
                    max_txs_per_window,
                    rate_limit_window,
                    configuration,
                    schedule,
                },
            )
    }

    proptest! {
        #[test]
        fn encode_decode_roundtrip(policy in arb_policy()) {
            let decoded = decode(&encode(&policy)).unwrap();
            prop_assert_eq!(decoded, policy);
        }

        #[test]
        fn encoding_is_deterministic(policy in arb_policy()) {
            prop_assert_eq!(encode(&policy), encode(&policy.clone()));
        }

        #[test]
        fn transport_roundtrip(policy in arb_policy()) {
            let recipe = encode_to_transport(&policy);
            let decoded = decode_from_transport(&recipe).unwrap();
            prop_assert_eq!(decoded, policy);
        }

        #[test]
        fn value_tag_survives_roundtrip(constraint in arb_constraint()) {
            let policy = Policy {
                rules: vec![Rule {
                    id: "r".to_string(),
                    parameter_constraints: vec![ParameterConstraint {
                        parameter_name: "p".to_string(),
                        constraint: Some(constraint.clone()),
                    }],
                    ..Rule::default()
                }],
                ..Policy::default()
            };
            let decoded = decode(&encode(&policy)).unwrap();
            let roundtripped = decoded.rules[0].parameter_constraints[0]
                .constraint
                .as_ref()
                .unwrap();
            let original_tag = constraint.value.as_ref().map(ConstraintValue::tag_name);
            let decoded_tag = roundtripped.value.as_ref().map(ConstraintValue::tag_name);
            prop_assert_eq!(original_tag, decoded_tag);
        }
    }
}
