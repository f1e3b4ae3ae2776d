//! Signing envelope derivation.
//!
//! A policy signature does not cover the raw recipe bytes; it covers a
//! delimiter-joined message derived from exactly four fields, in a fixed
//! order:
//!
//! ```text
//! recipe *#* publicKey *#* policyVersion *#* pluginVersion
//! ```
//!
//! The delimiter is not escaped, so a field value containing `*#*` could
//! make two different tuples serialize to the same signing message and
//! defeat the signature's binding guarantee. Derivation therefore rejects
//! any input containing the delimiter instead of truncating or escaping it.
//!
//! The signature itself is produced by an external wallet collaborator via
//! [`PolicySigner`]; this module never interprets or verifies signature
//! bytes. Verification is the backend's job.

use async_trait::async_trait;
use thiserror::Error;

use crate::record::PluginPolicyRecord;

/// The reserved three-character delimiter joining the signing fields.
pub const SIGNING_DELIMITER: &str = "*#*";

/// Errors from signing-message derivation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum EnvelopeError {
    /// A signing field contains the reserved delimiter. Fatal: the joined
    /// message would be ambiguous.
    #[error("policy signature input {field} contains the reserved delimiter \"*#*\"")]
    InvalidSignatureInput {
        /// Which of the four fields was rejected.
        field: &'static str,
    },
}

/// Errors reported by the external signer collaborator.
///
/// `Cancelled` and `Rejected` are distinct, recoverable outcomes: the user
/// dismissed the prompt or refused it, and may retry. They must not be
/// collapsed into a generic failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SigningError {
    /// The user dismissed the signing prompt.
    #[error("signing was cancelled by the user")]
    Cancelled,

    /// The signer refused to sign.
    #[error("signing was rejected: {reason}")]
    Rejected {
        /// The collaborator-supplied reason.
        reason: String,
    },

    /// The signer collaborator could not be reached.
    #[error("signer transport failure: {message}")]
    Transport {
        /// The collaborator-supplied failure description.
        message: String,
    },
}

/// Errors from the compound sign-a-record operation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SignPolicyError {
    /// Deriving the signing message failed.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// The external signer failed.
    #[error(transparent)]
    Signing(#[from] SigningError),
}

/// Explicit signing context: the vault account under which policies are
/// created.
///
/// Passed into every signing call rather than read from ambient state, so
/// the core stays reentrant and testable without global setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningContext {
    /// The account address presented to the wallet for signing.
    pub address: String,

    /// The vault public key acting as the account identifier on records.
    pub public_key: String,
}

/// External signer collaborator (wallet/extension).
///
/// The call may suspend indefinitely while the user considers a prompt;
/// callers apply their own timeout policy. Implementations report
/// cancellation and rejection distinctly via [`SigningError`].
#[async_trait]
pub trait PolicySigner: Send + Sync {
    /// Signs a UTF-8 message under the given account, returning an opaque
    /// signature string.
    async fn sign_message(&self, message: &str, account: &str) -> Result<String, SigningError>;
}

/// Derives the signing message from the four policy fields.
///
/// Joins exactly `recipe`, `public_key`, `policy_version`, and
/// `plugin_version`, in that order, with [`SIGNING_DELIMITER`].
///
/// # Errors
///
/// Returns [`EnvelopeError::InvalidSignatureInput`] if any field contains
/// the delimiter. The numeric `policy_version` cannot, but it is validated
/// in its string form like the rest so the rule has no exceptions.
pub fn derive_signing_message(
    recipe: &str,
    public_key: &str,
    policy_version: u32,
    plugin_version: &str,
) -> Result<String, EnvelopeError> {
    let version = policy_version.to_string();
    let fields: [(&'static str, &str); 4] = [
        ("recipe", recipe),
        ("publicKey", public_key),
        ("policyVersion", &version),
        ("pluginVersion", plugin_version),
    ];
    for (name, value) in fields {
        if value.contains(SIGNING_DELIMITER) {
            tracing::warn!(field = name, "signing input contains the reserved delimiter");
            return Err(EnvelopeError::InvalidSignatureInput { field: name });
        }
    }
    Ok([recipe, public_key, &version, plugin_version].join(SIGNING_DELIMITER))
}

/// Whether a mutated record needs a fresh signature.
///
/// True when any of the four signing inputs differs; signatures are never
/// reused across `policy_version` values.
#[must_use]
pub fn needs_resign(current: &PluginPolicyRecord, next: &PluginPolicyRecord) -> bool {
    current.recipe != next.recipe
        || current.public_key != next.public_key
        || current.policy_version != next.policy_version
        || current.plugin_version != next.plugin_version
}

/// Derives the signing message for a record, obtains a signature from the
/// external signer, and returns the record with the signature attached.
///
/// # Errors
///
/// Returns [`SignPolicyError::Envelope`] if derivation fails and
/// [`SignPolicyError::Signing`] for signer-reported outcomes, preserving
/// the cancelled/rejected distinction.
pub async fn sign_record(
    record: &PluginPolicyRecord,
    context: &SigningContext,
    signer: &dyn PolicySigner,
) -> Result<PluginPolicyRecord, SignPolicyError> {
    let message = derive_signing_message(
        &record.recipe,
        &record.public_key,
        record.policy_version,
        &record.plugin_version,
    )?;
    tracing::debug!(
        policy_id = %record.id,
        policy_version = record.policy_version,
        "requesting policy signature"
    );
    let signature = signer.sign_message(&message, &context.address).await?;
    let mut signed = record.clone();
    signed.signature = Some(signature);
    Ok(signed)
}
