use std::fmt;

use serde::{Deserialize, Serialize};

/// The rule governing how newly loaded rows interact with existing destination rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Insert all rows, leaving existing rows untouched.
    ///
    /// Repeated runs against the same table accumulate duplicate item ids; the bronze
    /// layer accepts this and leaves deduplication to downstream consumers.
    Append,
    /// Truncate the destination contents before inserting.
    Replace,
    /// Abort if the destination already has rows.
    FailIfExists,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self::Append
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConflictPolicy::Append => "append",
            ConflictPolicy::Replace => "replace",
            ConflictPolicy::FailIfExists => "fail_if_exists",
        };
        f.write_str(name)
    }
}

fn default_schema_name() -> String {
    "bronze".to_string()
}

/// Run-level settings shared by every source pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    /// Destination schema the bronze tables live in.
    #[serde(default = "default_schema_name")]
    pub schema_name: String,
    /// Conflict policy applied by the load stage.
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            schema_name: default_schema_name(),
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_policy_deserializes_snake_case() {
        let policy: ConflictPolicy = serde_json::from_str("\"fail_if_exists\"").unwrap();
        assert_eq!(policy, ConflictPolicy::FailIfExists);
    }

    #[test]
    fn pipeline_settings_default_to_bronze_append() {
        let settings: PipelineSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.schema_name, "bronze");
        assert_eq!(settings.conflict_policy, ConflictPolicy::Append);
    }
}
