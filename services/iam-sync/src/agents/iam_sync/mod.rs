//! IAM Role Policy Sync Agent
//!
//! Moves IAM role/policy configuration between an AWS account and a CSV
//! interchange file in S3.
//!
//! ## Jobs
//!
//! - **Export**: list every role, flatten its attached (AWS- and
//!   customer-managed) and inline policies into rows, upload the CSV.
//! - **Import**: read the CSV back and reconcile each row, creating missing
//!   roles and customer-managed policies, attaching managed policies and
//!   putting inline policies. Failures are tracked per row and folded into a
//!   single success/failure result.
//!
//! ## Example Usage
//!
//! ```ignore
//! use iam_role_sync::iam_sync::{
//!     export_handler, load_aws_config, AwsIdentityService, ExportConfig, InvocationContext,
//!     S3ObjectStore,
//! };
//!
//! let sdk_config = load_aws_config(None).await;
//! let identity = AwsIdentityService::new(&sdk_config);
//! let store = S3ObjectStore::new(&sdk_config);
//!
//! let response = export_handler(
//!     &serde_json::json!({}),
//!     &InvocationContext::new(),
//!     &identity,
//!     &store,
//!     ExportConfig::new("iam-exports", "iam_roles_policies.csv"),
//! )
//! .await;
//! ```

mod types;
mod providers;
mod interchange;
mod exporter;
mod importer;
mod handler;
#[cfg(test)]
mod fakes;

pub use exporter::RolePolicyExporter;
pub use handler::{
    export_handler, import_handler, HandlerResponse, InvocationContext, EXPORT_SUCCESS,
    IMPORT_FAILURE, IMPORT_SUCCESS,
};
pub use importer::{RolePolicyImporter, RowOutcome};
pub use interchange::{read_rows, write_rows, HEADER};
pub use providers::{load_aws_config, AwsIdentityService, IdentityService, ObjectStore, S3ObjectStore};
pub use types::{
    aws_managed_policy_arn, customer_managed_policy_arn, service_trust_policy, AttachedPolicy,
    ConfigError, ExportConfig, ExportSummary, IdentityError, ImportConfig, ImportReport,
    PolicyKind, PolicyRow, SyncError, AWS_MANAGED_POLICY_PREFIX, DEFAULT_TRUST_SERVICE,
};
