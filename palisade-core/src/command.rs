//! Commands handed to user-defined handlers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A command is opaque to the store: the executor passes it verbatim to the
/// handler and appends whatever events the handler produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Command type (e.g., "EnrollStudent").
    #[serde(rename = "type")]
    pub command_type: String,
    /// JSON payload.
    pub data: serde_json::Value,
    /// Free-form metadata (trace ids, actor, ...).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Command {
    /// Create a command with empty metadata.
    pub fn new(command_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self { command_type: command_type.into(), data, metadata: HashMap::new() }
    }

    /// Attach a metadata entry (builder style).
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_builder() {
        let cmd = Command::new("EnrollStudent", json!({"student_id": "s1"}))
            .with_metadata("trace_id", "t-1");

        assert_eq!(cmd.command_type, "EnrollStudent");
        assert_eq!(cmd.metadata.get("trace_id").map(String::as_str), Some("t-1"));
    }

    #[test]
    fn test_command_serialization_round_trip() {
        let cmd = Command::new("DefineCourse", json!({"capacity": 2}));
        let json = serde_json::to_string(&cmd).unwrap();
        let parsed: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, cmd);
    }
}
