//! JSON output types for CLI commands.
//!
//! Every JSON response is wrapped in a schema-versioned envelope with an
//! execution id, so downstream tooling can parse output stably and
//! correlate runs.

use serde::{Deserialize, Serialize};

/// Current JSON output schema version
pub const SEXTANT_JSON_SCHEMA_VERSION: &str = "1.0.0";

/// Wrapper for all JSON responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse<T> {
    /// Schema version for parsing stability
    pub schema_version: String,
    /// Unique execution ID for this run
    pub execution_id: String,
    /// Response data
    pub data: T,
    /// Whether the response is partial (e.g., truncated)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<bool>,
}

impl<T> JsonResponse<T> {
    pub fn new(data: T, execution_id: &str) -> Self {
        JsonResponse {
            schema_version: SEXTANT_JSON_SCHEMA_VERSION.to_string(),
            execution_id: execution_id.to_string(),
            data,
            partial: None,
        }
    }

    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = Some(partial);
        self
    }
}

/// Response for the query command: the DSL input plus the typed result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub result: serde_json::Value,
}

/// Response for `docs status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocsStatusResponse {
    pub dirty_folders: Vec<String>,
    pub dirty_modules: Vec<String>,
    pub project_dirty: bool,
    pub generation_order: Vec<Vec<String>>,
}

/// Response for errors in JSON mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error category/type
    pub error: String,
    /// Human-readable error message
    pub message: String,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output with schema versioning
    Json,
}

impl OutputFormat {
    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "human" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

/// Generate a unique execution ID for this run
///
/// Uses timestamp + process ID for uniqueness.
pub fn generate_execution_id() -> String {
    use std::process;
    use std::time::{SystemTime, UNIX_EPOCH};

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let pid = process::id();

    format!("{timestamp:x}-{pid:x}")
}

/// Output JSON to stdout
pub fn output_json<T: Serialize>(data: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(data)?;
    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_response_serialization() {
        let response = JsonResponse::new(
            QueryResponse {
                query: "def X".to_string(),
                result: serde_json::json!({"type": "not_found", "query": "X"}),
            },
            "test-exec-123",
        );

        let json = serde_json::to_string(&response).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["schema_version"], SEXTANT_JSON_SCHEMA_VERSION);
        assert_eq!(parsed["execution_id"], "test-exec-123");
        assert_eq!(parsed["data"]["result"]["type"], "not_found");
    }

    #[test]
    fn test_execution_id_format() {
        let id = generate_execution_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 2, "Execution ID should have 2 parts: {id}");
        assert!(usize::from_str_radix(parts[0], 16).is_ok());
        assert!(usize::from_str_radix(parts[1], 16).is_ok());
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("text"), Some(OutputFormat::Text));
        assert_eq!(OutputFormat::parse("human"), Some(OutputFormat::Text));
        assert_eq!(OutputFormat::parse("invalid"), None);
    }

    #[test]
    fn test_partial_flag() {
        let response = JsonResponse::new(42u32, "x").with_partial(true);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["partial"], true);
    }
}
