//! Plugin policy records: the transport/storage shape wrapping a serialized
//! policy.
//!
//! A record is created once per user+plugin install. Records are never
//! mutated in place: an update is modeled as delete + recreate with
//! `policy_version` incremented, so a given record's version only ever
//! increases. The verifier backend is the source of truth for record id
//! uniqueness and `active` status; the client is the source of truth for
//! the recipe bytes at creation time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::envelope::SigningContext;

/// A stored plugin policy, as exchanged with the storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginPolicyRecord {
    /// Record identifier, generated client-side.
    pub id: String,

    /// The vault public key acting as the account identifier.
    pub public_key: String,

    /// Marketplace plugin identifier.
    pub plugin_id: String,

    /// Plugin version string, one of the four signing inputs.
    pub plugin_version: String,

    /// Policy version. Starts at 0 and only ever increases; each mutating
    /// update re-signs under the incremented version.
    pub policy_version: u32,

    /// Whether the policy is active. Uninstall may soft-delete by clearing
    /// this instead of removing the record.
    pub active: bool,

    /// Base64 transport form of the canonical policy encoding.
    pub recipe: String,

    /// Signature over the derived signing message; absent until signed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl PluginPolicyRecord {
    /// Creates a fresh, unsigned record at `policy_version` 0.
    #[must_use]
    pub fn new(
        context: &SigningContext,
        plugin_id: impl Into<String>,
        plugin_version: impl Into<String>,
        recipe: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            public_key: context.public_key.clone(),
            plugin_id: plugin_id.into(),
            plugin_version: plugin_version.into(),
            policy_version: 0,
            active: true,
            recipe: recipe.into(),
            signature: None,
        }
    }

    /// The `policy_version` the next stored state must carry.
    ///
    /// Callers invoke the signing envelope with this value, never the
    /// current one: a signature always binds the *next* stored state.
    #[must_use]
    pub const fn next_version(&self) -> u32 {
        self.policy_version + 1
    }

    /// Produces the unsigned successor record for an update: same identity,
    /// new recipe, incremented version, previous signature discarded.
    #[must_use]
    pub fn successor(&self, recipe: impl Into<String>) -> Self {
        Self {
            policy_version: self.next_version(),
            recipe: recipe.into(),
            signature: None,
            ..self.clone()
        }
    }
}

/// Deletion request: proof of ownership is the signature on file for the
/// currently stored `policy_version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePolicyRequest {
    /// The record to delete.
    pub id: String,

    /// The valid signature on file.
    pub signature: String,
}

/// Network/storage collaborator failure.
///
/// Recoverable via retry at the caller's discretion. This core never
/// retries internally: a retried signing operation must not silently
/// re-sign with stale inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("storage transport failure: {message}")]
pub struct TransportError {
    /// Collaborator-supplied failure description.
    pub message: String,
}

/// Storage backend collaborator.
///
/// Accepts a full signed record on create; requires only the record id and
/// the on-file signature on delete.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Persists a newly signed record.
    async fn create(&self, record: &PluginPolicyRecord) -> Result<(), TransportError>;

    /// Deletes a record, authorized by its on-file signature.
    async fn delete(&self, request: &DeletePolicyRequest) -> Result<(), TransportError>;
}
