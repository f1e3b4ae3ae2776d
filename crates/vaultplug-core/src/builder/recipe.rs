//! Recipe specification input types.
//!
//! A recipe specification is the plugin-provided schema describing which
//! resources, parameters, scheduling, and configuration the plugin supports.
//! It is fetched from the marketplace and deserialized here at the builder
//! boundary. All structs deny unknown fields: a specification this client
//! cannot fully interpret must fail loudly rather than be partially honored.

use serde::{Deserialize, Serialize};

use crate::schema::ConstraintType;

/// A plugin's recipe specification, as served by the marketplace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecipeSchema {
    /// Marketplace plugin identifier. Also the policy template id.
    pub plugin_id: String,

    /// Human-readable plugin name.
    pub plugin_name: String,

    /// Plugin semantic version, as a single integer.
    pub plugin_version: i32,

    /// Policy schema version this specification was authored against.
    /// Absent on older marketplace entries, which predate versioning.
    #[serde(default)]
    pub schema_version: u32,

    /// Author attribution, shown on the policy.
    #[serde(default)]
    pub author: String,

    /// Description of what the plugin automates.
    #[serde(default)]
    pub description: String,

    /// Client requirements (advisory; not enforced by this core).
    #[serde(default)]
    pub requirements: Option<RecipeRequirements>,

    /// The resources the plugin may be granted, in declaration order. The
    /// user selects one by index.
    pub supported_resources: Vec<ResourceCapability>,

    /// Scheduling support, when the plugin can run on a schedule.
    #[serde(default)]
    pub scheduling: Option<SchedulingCapability>,

    /// Declared configuration properties, when the plugin takes
    /// configuration.
    #[serde(default)]
    pub configuration: Option<ConfigurationSchema>,
}

/// Advisory client requirements declared by the plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecipeRequirements {
    /// Minimum client version the plugin expects.
    #[serde(default)]
    pub min_client_version: Option<String>,

    /// Chains the plugin operates on.
    #[serde(default)]
    pub supported_chains: Vec<String>,
}

/// One resource the plugin may be granted, with its parameter capabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResourceCapability {
    /// The resource being granted.
    pub resource_path: ResourcePath,

    /// The parameters the resource's function takes.
    #[serde(default)]
    pub parameter_capabilities: Vec<ParameterCapability>,
}

/// A dot-delimited resource path: `chain.protocol.function`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResourcePath {
    /// Chain identifier (e.g. `"ethereum"`).
    pub chain_id: String,

    /// Protocol identifier (e.g. `"uniswap"`).
    pub protocol_id: String,

    /// Function identifier (e.g. `"swap"`).
    pub function_id: String,

    /// Pre-joined full path, when the marketplace supplies one.
    #[serde(default)]
    pub full: String,
}

impl ResourcePath {
    /// Returns the full dot-delimited path, deriving it from the components
    /// when the marketplace did not supply one.
    #[must_use]
    pub fn full_path(&self) -> String {
        if self.full.is_empty() {
            format!("{}.{}.{}", self.chain_id, self.protocol_id, self.function_id)
        } else {
            self.full.clone()
        }
    }

    /// Whether this resource lives on the Ethereum chain
    /// (case-insensitive).
    #[must_use]
    pub fn is_ethereum(&self) -> bool {
        self.chain_id.eq_ignore_ascii_case("ethereum")
    }
}

/// One parameter of a resource's function, with the constraint types the
/// plugin supports for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ParameterCapability {
    /// The parameter name.
    pub parameter_name: String,

    /// Supported constraint types as enum codes, in priority order. The
    /// builder uses the first entry. Plugins currently always declare
    /// `Fixed` first; a capability declaring only `Min`/`Range` would need
    /// the builder's value construction generalized (the post-build
    /// validation pass catches that combination today).
    pub supported_types: Vec<i32>,

    /// Whether the policy must constrain this parameter.
    pub required: bool,
}

impl ParameterCapability {
    /// Returns the capability's first supported constraint type, falling
    /// back to `Unspecified` for codes this client does not know.
    #[must_use]
    pub fn primary_type(&self) -> ConstraintType {
        self.supported_types
            .first()
            .and_then(|code| ConstraintType::try_from(*code).ok())
            .unwrap_or(ConstraintType::Unspecified)
    }
}

/// Scheduling support declared by the plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SchedulingCapability {
    /// Whether the plugin supports scheduled execution at all.
    pub supports_scheduling: bool,

    /// Frequency labels the plugin accepts (e.g. `"daily"`).
    #[serde(default)]
    pub supported_frequencies: Vec<String>,

    /// Upper bound on scheduled executions; 0 means unbounded.
    #[serde(default)]
    pub max_scheduled_executions: i32,
}

/// Declared configuration properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigurationSchema {
    /// Property name → declaration.
    #[serde(default)]
    pub properties: std::collections::BTreeMap<String, ConfigurationProperty>,

    /// Names of properties the user must supply.
    #[serde(default)]
    pub required: Vec<String>,
}

/// One declared configuration property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigurationProperty {
    /// JSON-schema-style type name (`"string"`, `"number"`, ...).
    #[serde(rename = "type", default)]
    pub property_type: String,

    /// JSON-schema-style format hint. `"date-time"` values are normalized
    /// to strict UTC RFC 3339 by the builder.
    #[serde(default)]
    pub format: Option<String>,
}

impl ConfigurationProperty {
    /// Whether this property's values are date-times needing UTC
    /// normalization.
    #[must_use]
    pub fn is_date_time(&self) -> bool {
        self.format.as_deref() == Some("date-time")
    }
}
