//! End-to-end integration tests for the policy authorization flow.
//!
//! Exercises the complete pipeline in both directions:
//!
//! ```text
//! form values + recipe spec + pricing
//!     |
//!     v
//! builder::build -> codec::encode_to_transport -> envelope::sign_record
//!     |
//!     v
//! PluginPolicyRecord -> PolicyStore
//!     |
//!     v
//! view::decode_for_display / view::authorize_deletion (reverse flow)
//! ```
//!
//! Properties verified:
//!
//! - The built policy matches the documented single-rule scenario exactly
//! - The recipe round-trips losslessly through the transport form
//! - The signing message binds the four inputs in fixed order
//! - Updates are delete + recreate with a strictly increasing version
//! - Deletion is only authorized for records whose recipe still decodes

use std::sync::Mutex;

use chrono::{TimeZone, Utc};

use async_trait::async_trait;
use vaultplug_core::builder::pricing::PricingTier;
use vaultplug_core::builder::recipe::RecipeSchema;
use vaultplug_core::builder::{self, FORM_KEY_RESOURCE, FormValues};
use vaultplug_core::schema::{ConstraintType, ConstraintValue, Effect, FeeType};
use vaultplug_core::{
    DeletePolicyRequest, PluginPolicyRecord, PolicySigner, PolicyStore, SigningContext,
    SigningError, TransportError, codec, derive_signing_message, envelope, view,
};

// ============================================================================
// Test collaborators
// ============================================================================

/// Deterministic stand-in for the wallet extension.
struct StubSigner;

#[async_trait]
impl PolicySigner for StubSigner {
    async fn sign_message(&self, message: &str, account: &str) -> Result<String, SigningError> {
        // Opaque but deterministic, so tests can assert which message was
        // signed without any real key material.
        Ok(format!("signed({account}):{}", message.len()))
    }
}

/// In-memory storage backend recording what the core sends it.
#[derive(Default)]
struct MemoryStore {
    created: Mutex<Vec<PluginPolicyRecord>>,
    deleted: Mutex<Vec<DeletePolicyRequest>>,
}

#[async_trait]
impl PolicyStore for MemoryStore {
    async fn create(&self, record: &PluginPolicyRecord) -> Result<(), TransportError> {
        self.created.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn delete(&self, request: &DeletePolicyRequest) -> Result<(), TransportError> {
        self.deleted.lock().unwrap().push(request.clone());
        Ok(())
    }
}

fn dca_spec() -> RecipeSchema {
    serde_json::from_value(serde_json::json!({
        "pluginId": "dca-plugin",
        "pluginName": "DCA",
        "pluginVersion": 1,
        "schemaVersion": 1,
        "supportedResources": [{
            "resourcePath": {
                "chainId": "ethereum",
                "protocolId": "uniswap",
                "functionId": "swap"
            },
            "parameterCapabilities": [{
                "parameterName": "amount",
                "supportedTypes": [ConstraintType::Fixed as i32],
                "required": true
            }]
        }]
    }))
    .expect("specification fixture deserializes")
}

fn once_pricing() -> Vec<PricingTier> {
    serde_json::from_value(serde_json::json!([
        { "amount": 500_000_000u64, "type": "once" }
    ]))
    .expect("pricing fixture deserializes")
}

fn signing_context() -> SigningContext {
    SigningContext {
        address: "0xvault".to_string(),
        public_key: "pub1".to_string(),
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn create_flow_builds_signs_and_stores_a_policy() {
    let built_at = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
    let form = FormValues::new()
        .with(FORM_KEY_RESOURCE, 0)
        .with("amount", "100");

    // Build: one rule, one constraint, one fee.
    let policy = builder::build(&form, &dca_spec(), &once_pricing(), built_at).unwrap();
    assert_eq!(policy.rules.len(), 1);
    let rule = &policy.rules[0];
    assert_eq!(rule.effect(), Effect::Allow);
    let constraint = rule.parameter_constraints[0].constraint.as_ref().unwrap();
    assert_eq!(constraint.constraint_type(), ConstraintType::Fixed);
    assert_eq!(constraint.denominated_in, "wei");
    assert_eq!(
        constraint.value,
        Some(ConstraintValue::FixedValue("100".to_string()))
    );
    assert_eq!(policy.fee_policies[0].fee_type(), FeeType::Once);
    assert_eq!(policy.fee_policies[0].amount, 500_000_000);

    // Encode: the recipe round-trips losslessly.
    let recipe = codec::encode_to_transport(&policy);
    assert_eq!(codec::decode_from_transport(&recipe).unwrap(), policy);

    // Sign: the envelope binds recipe, key, and versions.
    let context = signing_context();
    let record = PluginPolicyRecord::new(&context, "dca-plugin", "1", recipe.clone());
    let signed = envelope::sign_record(&record, &context, &StubSigner)
        .await
        .unwrap();
    let expected_message = derive_signing_message(&recipe, "pub1", 0, "1").unwrap();
    assert_eq!(
        signed.signature.as_deref(),
        Some(format!("signed(0xvault):{}", expected_message.len()).as_str())
    );

    // Store: the backend receives the signed record as-is.
    let store = MemoryStore::default();
    store.create(&signed).await.unwrap();
    let created = store.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].policy_version, 0);
    assert!(created[0].signature.is_some());
}

#[tokio::test]
async fn stored_records_render_without_the_original_form_state() {
    let built_at = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
    let form = FormValues::new()
        .with(FORM_KEY_RESOURCE, 0)
        .with("amount", "100");
    let policy = builder::build(&form, &dca_spec(), &once_pricing(), built_at).unwrap();
    let recipe = codec::encode_to_transport(&policy);

    let display = view::decode_for_display(&recipe).unwrap();
    assert_eq!(display.plugin_id, "dca-plugin");
    assert_eq!(display.rules[0].resource, "ethereum.uniswap.swap");
    assert_eq!(display.rules[0].parameters[0].name, "amount");
    assert_eq!(display.rules[0].parameters[0].value, "100");
    assert_eq!(display.rules[0].parameters[0].denominated_in, "wei");
    assert_eq!(display.fees[0].amount, 500_000_000);
    assert_eq!(display.fees[0].fee_type, "once");
    assert_eq!(
        display.fees[0].start_date,
        Some(built_at)
    );
}

#[tokio::test]
async fn update_flow_is_delete_plus_recreate_with_incremented_version() {
    let context = signing_context();
    let built_at = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();

    let form_v0 = FormValues::new()
        .with(FORM_KEY_RESOURCE, 0)
        .with("amount", "100");
    let policy_v0 = builder::build(&form_v0, &dca_spec(), &once_pricing(), built_at).unwrap();
    let record_v0 = PluginPolicyRecord::new(
        &context,
        "dca-plugin",
        "1",
        codec::encode_to_transport(&policy_v0),
    );
    let signed_v0 = envelope::sign_record(&record_v0, &context, &StubSigner)
        .await
        .unwrap();

    // The user changes the amount; a fresh policy is built, never mutated.
    let form_v1 = FormValues::new()
        .with(FORM_KEY_RESOURCE, 0)
        .with("amount", "250");
    let policy_v1 = builder::build(&form_v1, &dca_spec(), &once_pricing(), built_at).unwrap();
    let record_v1 = signed_v0.successor(codec::encode_to_transport(&policy_v1));

    assert_eq!(record_v1.policy_version, signed_v0.policy_version + 1);
    assert!(record_v1.signature.is_none());
    assert!(envelope::needs_resign(&signed_v0, &record_v1));

    // The new version signs a different message than the old one.
    let signed_v1 = envelope::sign_record(&record_v1, &context, &StubSigner)
        .await
        .unwrap();
    let inputs_v0 = view::signing_inputs(&signed_v0).unwrap();
    let inputs_v1 = view::signing_inputs(&signed_v1).unwrap();
    assert_ne!(
        inputs_v0.derive_message().unwrap(),
        inputs_v1.derive_message().unwrap()
    );

    // Deleting the old record presents its on-file signature.
    let store = MemoryStore::default();
    let delete = view::authorize_deletion(&signed_v0).unwrap();
    store.delete(&delete).await.unwrap();
    store.create(&signed_v1).await.unwrap();

    assert_eq!(store.deleted.lock().unwrap()[0].id, signed_v0.id);
    assert_eq!(store.created.lock().unwrap()[0].policy_version, 1);
}

#[tokio::test]
async fn corrupted_stored_recipes_cannot_authorize_deletion() {
    let context = signing_context();
    let mut record = PluginPolicyRecord::new(&context, "dca-plugin", "1", "AAAA");
    record.signature = Some("0xsig".to_string());

    let err = view::authorize_deletion(&record).unwrap_err();
    assert!(matches!(err, view::ViewError::Integrity(_)));
}

#[tokio::test]
async fn signing_failures_keep_the_record_unsigned() {
    struct RefusingSigner;

    #[async_trait]
    impl PolicySigner for RefusingSigner {
        async fn sign_message(
            &self,
            _message: &str,
            _account: &str,
        ) -> Result<String, SigningError> {
            Err(SigningError::Rejected {
                reason: "hardware wallet said no".to_string(),
            })
        }
    }

    let context = signing_context();
    let record = PluginPolicyRecord::new(&context, "dca-plugin", "1", "cmVjaXBl");
    let err = envelope::sign_record(&record, &context, &RefusingSigner)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        envelope::SignPolicyError::Signing(SigningError::Rejected { .. })
    ));
    // The original record is untouched; nothing was half-signed.
    assert!(record.signature.is_none());
}
