//! JSON output module for CLI commands
//!
//! Provides schema-versioned response types for all subcommands.

pub mod command;

pub use command::{
    generate_execution_id, output_json, DocsStatusResponse, ErrorResponse, JsonResponse,
    OutputFormat, QueryResponse, SEXTANT_JSON_SCHEMA_VERSION,
};
