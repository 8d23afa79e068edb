//! Role Policy Exporter
//!
//! Walks every role in the account, flattens attached and inline policies
//! into interchange rows and uploads the CSV.

use tracing::{debug, info};

use super::interchange;
use super::providers::{IdentityService, ObjectStore};
use super::types::{ExportConfig, ExportSummary, PolicyKind, PolicyRow, SyncError};

/// Exports live role/policy state to object storage
pub struct RolePolicyExporter<'a> {
    identity: &'a dyn IdentityService,
    store: &'a dyn ObjectStore,
    config: ExportConfig,
}

impl<'a> RolePolicyExporter<'a> {
    pub fn new(
        identity: &'a dyn IdentityService,
        store: &'a dyn ObjectStore,
        config: ExportConfig,
    ) -> Self {
        Self {
            identity,
            store,
            config,
        }
    }

    /// Collect rows for every role, in listing order.
    ///
    /// Fails on the first error from the identity service.
    pub async fn collect_rows(&self) -> Result<(usize, Vec<PolicyRow>), SyncError> {
        let roles = self.identity.list_roles().await?;
        info!(count = roles.len(), "Discovered roles");

        let mut rows = Vec::new();
        for role_name in &roles {
            rows.extend(self.rows_for_role(role_name).await?);
        }

        Ok((roles.len(), rows))
    }

    async fn rows_for_role(&self, role_name: &str) -> Result<Vec<PolicyRow>, SyncError> {
        let attached = self.identity.list_attached_role_policies(role_name).await?;
        let inline = self.identity.list_role_policy_names(role_name).await?;

        debug!(
            role = %role_name,
            attached = attached.len(),
            inline = inline.len(),
            "Collecting role policies"
        );

        let mut rows = Vec::with_capacity(attached.len() + inline.len());

        for policy in attached {
            let kind = PolicyKind::from_policy_arn(&policy.policy_arn);
            let document = match kind {
                PolicyKind::CustomerManaged => {
                    let version = self
                        .identity
                        .get_policy_default_version(&policy.policy_arn)
                        .await?;
                    let document = self
                        .identity
                        .get_policy_version_document(&policy.policy_arn, &version)
                        .await?;
                    to_json_text(&document)?
                }
                _ => String::new(),
            };

            rows.push(PolicyRow::new(role_name, policy.policy_name, &kind, document));
        }

        for policy_name in inline {
            let document = self
                .identity
                .get_role_policy_document(role_name, &policy_name)
                .await?;
            rows.push(PolicyRow::new(
                role_name,
                policy_name,
                &PolicyKind::Inline,
                to_json_text(&document)?,
            ));
        }

        Ok(rows)
    }

    /// Run a full export and upload the file
    pub async fn export(&self) -> Result<ExportSummary, SyncError> {
        info!(
            bucket = %self.config.bucket,
            key = %self.config.key,
            "Starting role policy export"
        );

        let (roles_scanned, rows) = self.collect_rows().await?;
        let body = interchange::write_rows(&rows)?;
        let bytes_uploaded = body.len();

        self.store
            .put_object(&self.config.bucket, &self.config.key, body)
            .await?;

        let summary = ExportSummary {
            roles_scanned,
            rows_written: rows.len(),
            bytes_uploaded,
            destination: format!("s3://{}/{}", self.config.bucket, self.config.key),
        };

        info!(
            roles = summary.roles_scanned,
            rows = summary.rows_written,
            bytes = summary.bytes_uploaded,
            destination = %summary.destination,
            "Role policy export complete"
        );

        Ok(summary)
    }
}

fn to_json_text(document: &serde_json::Value) -> Result<String, SyncError> {
    serde_json::to_string(document).map_err(|e| SyncError::Interchange(e.to_string()))
}
