//! Agent modules for IAM role sync
//!
//! - `iam_sync`: export IAM roles/policies to S3 and reconcile them back

pub mod iam_sync;

pub use iam_sync::{RolePolicyExporter, RolePolicyImporter};
