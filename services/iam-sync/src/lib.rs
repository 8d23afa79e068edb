//! IAM Role Sync Library
//!
//! Export IAM role and policy configuration to a CSV file in S3 and
//! reconcile it back into an account.

pub mod agents;

pub use agents::iam_sync;
pub use agents::{RolePolicyExporter, RolePolicyImporter};
