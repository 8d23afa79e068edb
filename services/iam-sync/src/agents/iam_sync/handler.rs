//! Invocation handlers
//!
//! Each job runs as a single-shot handler taking an opaque event plus an
//! invocation context and returning `{statusCode, body}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use super::exporter::RolePolicyExporter;
use super::importer::RolePolicyImporter;
use super::providers::{IdentityService, ObjectStore};
use super::types::{ExportConfig, ImportConfig};

pub const EXPORT_SUCCESS: &str = "CSV file created and uploaded to S3";
pub const IMPORT_SUCCESS: &str = "Roles and policies processed successfully";
pub const IMPORT_FAILURE: &str = "Failed to process all roles and policies";

/// Metadata about one invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationContext {
    pub request_id: String,
    pub invoked_at: DateTime<Utc>,
}

impl InvocationContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            invoked_at: Utc::now(),
        }
    }
}

impl Default for InvocationContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Result returned to the invoker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// JSON-encoded message
    pub body: String,
}

impl HandlerResponse {
    pub fn ok(message: &str) -> Self {
        Self::with_status(200, message)
    }

    pub fn failed(message: &str) -> Self {
        Self::with_status(500, message)
    }

    fn with_status(status_code: u16, message: &str) -> Self {
        Self {
            status_code,
            body: serde_json::Value::String(message.to_string()).to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Export every role's policies to the configured object
pub async fn export_handler(
    event: &serde_json::Value,
    context: &InvocationContext,
    identity: &dyn IdentityService,
    store: &dyn ObjectStore,
    config: ExportConfig,
) -> HandlerResponse {
    info!(request_id = %context.request_id, event = %event, "Export invoked");

    if let Err(e) = config.validate() {
        error!(request_id = %context.request_id, error = %e, "Invalid export configuration");
        return HandlerResponse::failed(&format!("Failed to export roles and policies: {}", e));
    }

    let exporter = RolePolicyExporter::new(identity, store, config);
    match exporter.export().await {
        Ok(_) => HandlerResponse::ok(EXPORT_SUCCESS),
        Err(e) => {
            error!(request_id = %context.request_id, error = %e, "Export failed");
            HandlerResponse::failed(&format!("Failed to export roles and policies: {}", e))
        }
    }
}

/// Reconcile the configured interchange file into the account
pub async fn import_handler(
    event: &serde_json::Value,
    context: &InvocationContext,
    identity: &dyn IdentityService,
    store: &dyn ObjectStore,
    config: ImportConfig,
) -> HandlerResponse {
    info!(request_id = %context.request_id, event = %event, "Import invoked");

    if let Err(e) = config.validate() {
        error!(request_id = %context.request_id, error = %e, "Invalid import configuration");
        return HandlerResponse::failed(IMPORT_FAILURE);
    }

    let mut importer = RolePolicyImporter::new(identity, store, config);
    match importer.import().await {
        Ok(report) if report.success => HandlerResponse::ok(IMPORT_SUCCESS),
        Ok(_) => HandlerResponse::failed(IMPORT_FAILURE),
        Err(e) => {
            error!(request_id = %context.request_id, error = %e, "Import failed");
            HandlerResponse::failed(IMPORT_FAILURE)
        }
    }
}
