//! vaultplug-core - Policy Encoding & Authorization Protocol
//!
//! This crate implements the core protocol by which a user-configured
//! automation policy is assembled into a canonical binary message, bound to
//! a cryptographic signature, and round-tripped losslessly for display and
//! audit. It is the security-critical heart of the vaultplug marketplace
//! client: a malformed or ambiguous encoding could let a signed policy be
//! reinterpreted to authorize different actions on a custodial vault.
//!
//! # Pipeline
//!
//! ```text
//! form values + recipe spec + pricing
//!     |
//!     v
//! builder::build -> schema::Policy -> codec::encode -> base64 recipe
//!     |
//!     v
//! envelope::derive_signing_message -> external signer
//!     |
//!     v
//! signed PluginPolicyRecord -> storage backend
//! ```
//!
//! The reverse flow decodes a stored record for display and re-derives the
//! same signing message to authorize deletion or update ([`view`]).
//!
//! # Modules
//!
//! - [`schema`]: message shapes, enums, and the stable field tags that fix
//!   the canonical serialization order
//! - [`builder`]: form input + recipe specification + pricing → [`schema::Policy`]
//! - [`codec`]: deterministic binary encoding and base64 transport form
//! - [`envelope`]: signing-message derivation and the external signer seam
//! - [`view`]: round-trip checking, display projection, deletion
//!   authorization
//! - [`record`]: the stored record shape and the storage collaborator seam
//!
//! # Concurrency
//!
//! Every operation is synchronous pure computation except the external
//! signer call, which is the only suspension point. There is no shared
//! mutable state; all calls are independent and reentrant. Callers own
//! submission ordering: a record's `policy_version` must only ever
//! increase, and concurrent double-submission must be prevented at the
//! call site.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use vaultplug_core::builder::{self, FormValues, FORM_KEY_RESOURCE};
//! use vaultplug_core::builder::pricing::PricingTier;
//! use vaultplug_core::builder::recipe::RecipeSchema;
//! use vaultplug_core::codec;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let spec: RecipeSchema = serde_json::from_str(
//!     r#"{
//!         "pluginId": "dca-plugin",
//!         "pluginName": "DCA",
//!         "pluginVersion": 1,
//!         "supportedResources": [{
//!             "resourcePath": {
//!                 "chainId": "ethereum",
//!                 "protocolId": "uniswap",
//!                 "functionId": "swap"
//!             },
//!             "parameterCapabilities": [{
//!                 "parameterName": "amount",
//!                 "supportedTypes": [1],
//!                 "required": true
//!             }]
//!         }]
//!     }"#,
//! )?;
//! let pricing = vec![PricingTier {
//!     id: None,
//!     amount: 500_000_000,
//!     frequency: String::new(),
//!     kind: "once".to_string(),
//!     description: String::new(),
//! }];
//! let form = FormValues::new()
//!     .with(FORM_KEY_RESOURCE, 0)
//!     .with("amount", "100");
//!
//! let policy = builder::build(&form, &spec, &pricing, Utc::now())?;
//! let recipe = codec::encode_to_transport(&policy);
//! assert_eq!(codec::decode_from_transport(&recipe)?, policy);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod codec;
pub mod envelope;
pub mod record;
pub mod schema;
pub mod view;

pub use builder::{BuildError, FormValues, build};
pub use codec::{CodecError, decode, decode_from_transport, encode, encode_to_transport};
pub use envelope::{
    EnvelopeError, PolicySigner, SIGNING_DELIMITER, SignPolicyError, SigningContext, SigningError,
    derive_signing_message, sign_record,
};
pub use record::{DeletePolicyRequest, PluginPolicyRecord, PolicyStore, TransportError};
pub use schema::Policy;
pub use schema::registry::UnsupportedSchemaVersion;
pub use view::{PolicyView, SigningInputs, ViewError, authorize_deletion, decode_for_display};
