//! IAM Sync Types
//!
//! Core types for representing policy rows, run configuration and errors.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// ARN prefix shared by every AWS-managed policy
pub const AWS_MANAGED_POLICY_PREFIX: &str = "arn:aws:iam::aws:policy";

/// Default service principal trusted by roles the importer creates
pub const DEFAULT_TRUST_SERVICE: &str = "ec2.amazonaws.com";

/// Kind of policy carried by an interchange row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    AwsManaged,
    CustomerManaged,
    Inline,
    /// Unrecognized label, kept verbatim for diagnostics
    Invalid(String),
}

impl PolicyKind {
    /// Parse a `PolicyType` cell.
    ///
    /// Labels are matched after trimming, lowercasing and turning spaces or
    /// hyphens into underscores, so `AWS Managed`, `aws-managed` and
    /// `aws_managed` are all the same kind.
    pub fn parse(label: &str) -> Self {
        let normalized: String = label
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();

        match normalized.as_str() {
            "aws_managed" => PolicyKind::AwsManaged,
            "customer_managed" => PolicyKind::CustomerManaged,
            "inline" | "inline_policy" => PolicyKind::Inline,
            _ => PolicyKind::Invalid(label.to_string()),
        }
    }

    /// Classify an attached policy by its ARN
    pub fn from_policy_arn(arn: &str) -> Self {
        if arn.starts_with(AWS_MANAGED_POLICY_PREFIX) {
            PolicyKind::AwsManaged
        } else {
            PolicyKind::CustomerManaged
        }
    }

    /// Label written to the `PolicyType` column
    pub fn label(&self) -> &str {
        match self {
            PolicyKind::AwsManaged => "AWS Managed",
            PolicyKind::CustomerManaged => "Customer Managed",
            PolicyKind::Inline => "Inline Policy",
            PolicyKind::Invalid(raw) => raw,
        }
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// ARN of an AWS-managed policy
pub fn aws_managed_policy_arn(policy_name: &str) -> String {
    format!("{}/{}", AWS_MANAGED_POLICY_PREFIX, policy_name)
}

/// ARN of a customer-managed policy in the given account
pub fn customer_managed_policy_arn(account_id: &str, policy_name: &str) -> String {
    format!("arn:aws:iam::{}:policy/{}", account_id, policy_name)
}

/// One row of the interchange file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRow {
    #[serde(rename = "RoleName")]
    pub role_name: String,
    #[serde(rename = "PolicyName")]
    pub policy_name: String,
    #[serde(rename = "PolicyType")]
    pub policy_type: String,
    /// JSON text, empty for AWS-managed policies
    #[serde(rename = "PolicyDocument")]
    pub policy_document: String,
}

impl PolicyRow {
    pub fn new(
        role_name: impl Into<String>,
        policy_name: impl Into<String>,
        kind: &PolicyKind,
        policy_document: impl Into<String>,
    ) -> Self {
        Self {
            role_name: role_name.into(),
            policy_name: policy_name.into(),
            policy_type: kind.label().to_string(),
            policy_document: policy_document.into(),
        }
    }

    pub fn kind(&self) -> PolicyKind {
        PolicyKind::parse(&self.policy_type)
    }
}

/// A policy attached to a role, as listed by the identity service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedPolicy {
    pub policy_name: String,
    pub policy_arn: String,
}

/// Configuration for the exporter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Destination bucket
    pub bucket: String,
    /// Destination object key
    pub key: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            key: "iam_roles_policies.csv".to_string(),
        }
    }
}

impl ExportConfig {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_location(&self.bucket, &self.key)
    }
}

fn validate_location(bucket: &str, key: &str) -> Result<(), ConfigError> {
    if bucket.trim().is_empty() {
        return Err(ConfigError::Missing("bucket".to_string()));
    }
    if key.trim().is_empty() {
        return Err(ConfigError::Missing("key".to_string()));
    }
    Ok(())
}

/// Configuration for the importer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Source bucket
    pub bucket: String,
    /// Source object key
    pub key: String,
    /// Assume-role policy document for roles the importer creates
    pub trust_policy: serde_json::Value,
    /// Created roles get the description `"<prefix> <role name>"`
    pub role_description_prefix: String,
    /// Treat any customer-managed create failure other than "already exists"
    /// as a run failure
    pub strict_policy_create: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            key: "iam_roles_policies.csv".to_string(),
            trust_policy: service_trust_policy(DEFAULT_TRUST_SERVICE),
            role_description_prefix: "Role created by iam-role-sync for".to_string(),
            strict_policy_create: false,
        }
    }
}

impl ImportConfig {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            ..Default::default()
        }
    }

    /// Trust a single service principal (e.g. `lambda.amazonaws.com`)
    pub fn with_trust_service(mut self, service: &str) -> Self {
        self.trust_policy = service_trust_policy(service);
        self
    }

    /// Load the trust policy from a JSON file
    pub fn with_trust_policy_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::TrustPolicyFile {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;
        let document: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| ConfigError::TrustPolicyFile {
                path: path.display().to_string(),
                detail: e.to_string(),
            })?;

        if !document.is_object() {
            return Err(ConfigError::TrustPolicyFile {
                path: path.display().to_string(),
                detail: "trust policy must be a JSON object".to_string(),
            });
        }

        self.trust_policy = document;
        Ok(self)
    }

    pub fn with_strict_policy_create(mut self, strict: bool) -> Self {
        self.strict_policy_create = strict;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_location(&self.bucket, &self.key)
    }

    pub fn role_description(&self, role_name: &str) -> String {
        format!("{} {}", self.role_description_prefix, role_name)
    }
}

/// Assume-role policy trusting one service principal
pub fn service_trust_policy(service: &str) -> serde_json::Value {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Principal": { "Service": service },
                "Action": "sts:AssumeRole"
            }
        ]
    })
}

/// Summary of a finished export
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportSummary {
    pub roles_scanned: usize,
    pub rows_written: usize,
    pub bytes_uploaded: usize,
    pub destination: String,
}

/// Counters for one importer run
///
/// Only the aggregate flag decides the run's result; the counters feed the
/// summary log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportReport {
    pub success: bool,
    pub rows_read: usize,
    pub rows_reconciled: usize,
    pub rows_skipped: usize,
    pub rows_failed: usize,
    pub roles_created: usize,
    pub policies_created: usize,
    pub policies_attached: usize,
    pub inline_policies_put: usize,
}

impl Default for ImportReport {
    fn default() -> Self {
        Self {
            success: true,
            rows_read: 0,
            rows_reconciled: 0,
            rows_skipped: 0,
            rows_failed: 0,
            roles_created: 0,
            policies_created: 0,
            policies_attached: 0,
            inline_policies_put: 0,
        }
    }
}

/// Errors reported by the identity service, closed over the cases the
/// importer reacts to
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Identity service error: {0}")]
    Service(String),
}

/// Errors that abort a whole export or import run
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Object storage error: {0}")]
    Storage(String),

    #[error("Interchange file error: {0}")]
    Interchange(String),
}

impl From<csv::Error> for SyncError {
    fn from(err: csv::Error) -> Self {
        SyncError::Interchange(err.to_string())
    }
}

/// Configuration problems detected before a run starts
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid trust policy file {path}: {detail}")]
    TrustPolicyFile { path: String, detail: String },

    #[error("Missing setting: {0}")]
    Missing(String),
}
