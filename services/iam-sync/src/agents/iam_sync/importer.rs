//! Role Policy Importer
//!
//! Reads the interchange file and reconciles every row against live IAM
//! state. Rows are processed in file order and never abort the run; the
//! outcome is a single aggregate flag, with per-row detail only in the logs.

use tracing::{debug, error, info, warn};

use super::interchange;
use super::providers::{IdentityService, ObjectStore};
use super::types::{
    aws_managed_policy_arn, customer_managed_policy_arn, IdentityError, ImportConfig,
    ImportReport, PolicyKind, PolicyRow, SyncError,
};

/// What happened to a single row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Reconciled,
    /// Row ignored without affecting the aggregate flag
    Skipped,
    Failed,
}

/// Reconciles interchange rows into the live account
pub struct RolePolicyImporter<'a> {
    identity: &'a dyn IdentityService,
    store: &'a dyn ObjectStore,
    config: ImportConfig,
    /// Caller account, resolved on first use
    account_id: Option<String>,
}

impl<'a> RolePolicyImporter<'a> {
    pub fn new(
        identity: &'a dyn IdentityService,
        store: &'a dyn ObjectStore,
        config: ImportConfig,
    ) -> Self {
        Self {
            identity,
            store,
            config,
            account_id: None,
        }
    }

    /// Fetch the interchange file and reconcile it.
    ///
    /// Errors are returned only when the file itself cannot be read or
    /// parsed; per-row failures end up in the report.
    pub async fn import(&mut self) -> Result<ImportReport, SyncError> {
        info!(
            bucket = %self.config.bucket,
            key = %self.config.key,
            strict = self.config.strict_policy_create,
            "Starting role policy import"
        );

        let content = self
            .store
            .get_object(&self.config.bucket, &self.config.key)
            .await?;
        let rows = interchange::read_rows(&content)?;

        Ok(self.reconcile(&rows).await)
    }

    /// Reconcile rows in order
    pub async fn reconcile(&mut self, rows: &[PolicyRow]) -> ImportReport {
        let mut report = ImportReport {
            rows_read: rows.len(),
            ..Default::default()
        };

        for row in rows {
            match self.reconcile_row(row, &mut report).await {
                RowOutcome::Reconciled => report.rows_reconciled += 1,
                RowOutcome::Skipped => report.rows_skipped += 1,
                RowOutcome::Failed => {
                    report.rows_failed += 1;
                    report.success = false;
                }
            }
        }

        info!(
            success = report.success,
            rows = report.rows_read,
            reconciled = report.rows_reconciled,
            skipped = report.rows_skipped,
            failed = report.rows_failed,
            roles_created = report.roles_created,
            policies_created = report.policies_created,
            policies_attached = report.policies_attached,
            inline_policies_put = report.inline_policies_put,
            "Role policy import complete"
        );

        report
    }

    async fn reconcile_row(&mut self, row: &PolicyRow, report: &mut ImportReport) -> RowOutcome {
        let role = row.role_name.as_str();
        let policy = row.policy_name.as_str();
        let kind = row.kind();

        let plan = match plan_row(&kind, &row.policy_document) {
            Ok(plan) => plan,
            Err(RowSkip::Blank) => {
                warn!(role = %role, policy = %policy, "Policy document is empty, skipping row");
                return RowOutcome::Skipped;
            }
            Err(RowSkip::Malformed(e)) => {
                warn!(
                    role = %role,
                    policy = %policy,
                    error = %e,
                    "Invalid JSON in policy document, skipping row"
                );
                return RowOutcome::Skipped;
            }
        };

        debug!(role = %role, policy = %policy, kind = %kind, "Processing row");

        if !self.ensure_role(role, report).await {
            return RowOutcome::Failed;
        }

        let mut failed = false;

        let policy_arn = match plan {
            RowPlan::AttachManaged => Some(aws_managed_policy_arn(policy)),
            RowPlan::CreateAndAttach(document) => {
                match self.ensure_customer_policy(policy, &document, report).await {
                    CustomerPolicy::Ready(arn) => Some(arn),
                    CustomerPolicy::CreateFailed(arn) => {
                        failed |= self.config.strict_policy_create;
                        Some(arn)
                    }
                    CustomerPolicy::Unresolved => {
                        failed = true;
                        None
                    }
                }
            }
            RowPlan::PutInline(document) => {
                match self.identity.put_role_policy(role, policy, &document).await {
                    Ok(()) => {
                        info!(role = %role, policy = %policy, "Inline policy added to role");
                        report.inline_policies_put += 1;
                    }
                    Err(e) => {
                        error!(
                            role = %role,
                            policy = %policy,
                            error = %e,
                            "Failed to add inline policy"
                        );
                        failed = true;
                    }
                }
                None
            }
            RowPlan::Invalid(label) => {
                error!(role = %role, policy = %policy, policy_type = %label, "Invalid policy type");
                failed = true;
                None
            }
        };

        if let Some(arn) = policy_arn {
            if self.attach(role, policy, &arn).await {
                report.policies_attached += 1;
            } else {
                failed = true;
            }
        }

        if failed {
            RowOutcome::Failed
        } else {
            RowOutcome::Reconciled
        }
    }

    /// Make sure the role exists, creating it with the configured trust
    /// policy when it does not
    async fn ensure_role(&self, role: &str, report: &mut ImportReport) -> bool {
        match self.identity.get_role(role).await {
            Ok(()) => {
                debug!(role = %role, "Role exists");
                true
            }
            Err(IdentityError::NotFound(_)) => {
                info!(role = %role, "Role does not exist, creating");
                let description = self.config.role_description(role);
                match self
                    .identity
                    .create_role(role, &self.config.trust_policy, &description)
                    .await
                {
                    Ok(()) => {
                        info!(role = %role, "Role created");
                        report.roles_created += 1;
                        true
                    }
                    Err(e) => {
                        error!(role = %role, error = %e, "Failed to create role");
                        false
                    }
                }
            }
            Err(e) => {
                error!(role = %role, error = %e, "Failed to look up role");
                false
            }
        }
    }

    async fn ensure_customer_policy(
        &mut self,
        policy: &str,
        document: &serde_json::Value,
        report: &mut ImportReport,
    ) -> CustomerPolicy {
        let account_id = match self.account_id().await {
            Ok(id) => id,
            Err(e) => {
                error!(policy = %policy, error = %e, "Failed to resolve caller account");
                return CustomerPolicy::Unresolved;
            }
        };
        let arn = customer_managed_policy_arn(&account_id, policy);

        match self.identity.create_policy(policy, document).await {
            Ok(()) => {
                info!(policy = %policy, arn = %arn, "Customer managed policy created");
                report.policies_created += 1;
                CustomerPolicy::Ready(arn)
            }
            Err(IdentityError::AlreadyExists(_)) => {
                info!(policy = %policy, "Policy already exists");
                CustomerPolicy::Ready(arn)
            }
            Err(e) => {
                if self.config.strict_policy_create {
                    error!(policy = %policy, error = %e, "Failed to create customer managed policy");
                } else {
                    warn!(policy = %policy, error = %e, "Failed to create customer managed policy");
                }
                CustomerPolicy::CreateFailed(arn)
            }
        }
    }

    async fn account_id(&mut self) -> Result<String, IdentityError> {
        if let Some(id) = &self.account_id {
            return Ok(id.clone());
        }
        let id = self.identity.caller_account_id().await?;
        debug!(account = %id, "Resolved caller account");
        self.account_id = Some(id.clone());
        Ok(id)
    }

    async fn attach(&self, role: &str, policy: &str, arn: &str) -> bool {
        match self.identity.attach_role_policy(role, arn).await {
            Ok(()) => {
                info!(role = %role, policy = %policy, "Policy attached to role");
                true
            }
            Err(IdentityError::NotFound(detail)) => {
                error!(
                    role = %role,
                    policy = %policy,
                    arn = %arn,
                    error = %detail,
                    "Role does not exist"
                );
                false
            }
            Err(IdentityError::LimitExceeded(_)) => {
                error!(
                    role = %role,
                    policy = %policy,
                    "Failed to attach policy: limit exceeded"
                );
                false
            }
            Err(e) => {
                error!(role = %role, policy = %policy, error = %e, "Failed to attach policy");
                false
            }
        }
    }
}

enum CustomerPolicy {
    Ready(String),
    /// Create failed for a reason other than "already exists"
    CreateFailed(String),
    /// Account id unknown, no ARN to attach
    Unresolved,
}

/// Action a row resolves to once its document has been checked
enum RowPlan {
    /// AWS-managed policy, document ignored
    AttachManaged,
    CreateAndAttach(serde_json::Value),
    PutInline(serde_json::Value),
    Invalid(String),
}

enum RowSkip {
    Blank,
    Malformed(serde_json::Error),
}

fn plan_row(kind: &PolicyKind, raw: &str) -> Result<RowPlan, RowSkip> {
    let raw = raw.trim();
    if raw.is_empty() {
        return match kind {
            PolicyKind::AwsManaged => Ok(RowPlan::AttachManaged),
            _ => Err(RowSkip::Blank),
        };
    }

    let document: serde_json::Value = serde_json::from_str(raw).map_err(RowSkip::Malformed)?;
    Ok(match kind {
        PolicyKind::AwsManaged => RowPlan::AttachManaged,
        PolicyKind::CustomerManaged => RowPlan::CreateAndAttach(document),
        PolicyKind::Inline => RowPlan::PutInline(document),
        PolicyKind::Invalid(label) => RowPlan::Invalid(label.clone()),
    })
}
