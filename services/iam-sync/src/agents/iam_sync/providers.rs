//! Cloud Service Adapters
//!
//! Trait-based abstractions over the identity service (IAM + STS) and the
//! object store (S3) holding the interchange file, with AWS SDK
//! implementations.

use async_trait::async_trait;
use aws_sdk_iam::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, info};

use super::types::{AttachedPolicy, IdentityError, SyncError};

/// Operations the exporter and importer need from the identity service
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Names of every role in the account, in listing order
    async fn list_roles(&self) -> Result<Vec<String>, IdentityError>;

    async fn list_attached_role_policies(
        &self,
        role_name: &str,
    ) -> Result<Vec<AttachedPolicy>, IdentityError>;

    /// Names of the inline policies embedded in a role
    async fn list_role_policy_names(&self, role_name: &str) -> Result<Vec<String>, IdentityError>;

    async fn get_policy_default_version(&self, policy_arn: &str) -> Result<String, IdentityError>;

    async fn get_policy_version_document(
        &self,
        policy_arn: &str,
        version_id: &str,
    ) -> Result<serde_json::Value, IdentityError>;

    async fn get_role_policy_document(
        &self,
        role_name: &str,
        policy_name: &str,
    ) -> Result<serde_json::Value, IdentityError>;

    /// Succeeds when the role exists, `NotFound` otherwise
    async fn get_role(&self, role_name: &str) -> Result<(), IdentityError>;

    async fn create_role(
        &self,
        role_name: &str,
        trust_policy: &serde_json::Value,
        description: &str,
    ) -> Result<(), IdentityError>;

    async fn create_policy(
        &self,
        policy_name: &str,
        document: &serde_json::Value,
    ) -> Result<(), IdentityError>;

    /// Create or replace an inline policy
    async fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &serde_json::Value,
    ) -> Result<(), IdentityError>;

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str)
        -> Result<(), IdentityError>;

    /// Account id of the credentials in use
    async fn caller_account_id(&self) -> Result<String, IdentityError>;
}

/// Object storage holding the interchange file
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, SyncError>;

    /// Write the object, replacing any existing one
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), SyncError>;
}

/// Load the shared AWS SDK configuration, optionally pinning a region
pub async fn load_aws_config(region: Option<String>) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(aws_config::Region::new(region));
    }
    loader.load().await
}

/// Map an SDK error onto the identity error taxonomy by its service error code
fn classify<E, R>(err: SdkError<E, R>, what: &str) -> IdentityError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().map(str::to_string);
    let detail = format!("{}: {}", what, DisplayErrorContext(&err));

    match code.as_deref() {
        Some("NoSuchEntity") => IdentityError::NotFound(detail),
        Some("EntityAlreadyExists") => IdentityError::AlreadyExists(detail),
        Some("LimitExceeded") => IdentityError::LimitExceeded(detail),
        Some("MalformedPolicyDocument") | Some("InvalidInput") => {
            IdentityError::MalformedInput(detail)
        }
        _ => IdentityError::Service(detail),
    }
}

/// IAM returns policy documents URL-encoded
fn decode_policy_document(encoded: &str, what: &str) -> Result<serde_json::Value, IdentityError> {
    let decoded = urlencoding::decode(encoded)
        .map_err(|e| IdentityError::MalformedInput(format!("{}: {}", what, e)))?;

    serde_json::from_str(&decoded)
        .map_err(|e| IdentityError::MalformedInput(format!("{}: {}", what, e)))
}

fn encode_document(document: &serde_json::Value) -> Result<String, IdentityError> {
    serde_json::to_string(document).map_err(|e| IdentityError::MalformedInput(e.to_string()))
}

/// AWS IAM/STS backed identity service
pub struct AwsIdentityService {
    iam: aws_sdk_iam::Client,
    sts: aws_sdk_sts::Client,
}

impl AwsIdentityService {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        info!("AWS identity service initialized");

        Self {
            iam: aws_sdk_iam::Client::new(sdk_config),
            sts: aws_sdk_sts::Client::new(sdk_config),
        }
    }

    /// Wrap already-configured clients
    pub fn from_clients(iam: aws_sdk_iam::Client, sts: aws_sdk_sts::Client) -> Self {
        Self { iam, sts }
    }
}

#[async_trait]
impl IdentityService for AwsIdentityService {
    async fn list_roles(&self) -> Result<Vec<String>, IdentityError> {
        let mut roles = Vec::new();
        let mut pages = self.iam.list_roles().into_paginator().send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| classify(e, "list roles"))?;
            roles.extend(page.roles().iter().map(|r| r.role_name().to_string()));
        }

        debug!(count = roles.len(), "Listed roles");
        Ok(roles)
    }

    async fn list_attached_role_policies(
        &self,
        role_name: &str,
    ) -> Result<Vec<AttachedPolicy>, IdentityError> {
        let mut policies = Vec::new();
        let mut pages = self
            .iam
            .list_attached_role_policies()
            .role_name(role_name)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                classify(e, &format!("list attached policies of {}", role_name))
            })?;

            for policy in page.attached_policies() {
                let (Some(name), Some(arn)) = (policy.policy_name(), policy.policy_arn()) else {
                    continue;
                };
                policies.push(AttachedPolicy {
                    policy_name: name.to_string(),
                    policy_arn: arn.to_string(),
                });
            }
        }

        Ok(policies)
    }

    async fn list_role_policy_names(&self, role_name: &str) -> Result<Vec<String>, IdentityError> {
        let mut names = Vec::new();
        let mut pages = self
            .iam
            .list_role_policies()
            .role_name(role_name)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page
                .map_err(|e| classify(e, &format!("list inline policies of {}", role_name)))?;
            names.extend(page.policy_names().iter().cloned());
        }

        Ok(names)
    }

    async fn get_policy_default_version(&self, policy_arn: &str) -> Result<String, IdentityError> {
        let output = self
            .iam
            .get_policy()
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| classify(e, &format!("get policy {}", policy_arn)))?;

        output
            .policy()
            .and_then(|p| p.default_version_id())
            .map(str::to_string)
            .ok_or_else(|| {
                IdentityError::Service(format!("policy {} has no default version", policy_arn))
            })
    }

    async fn get_policy_version_document(
        &self,
        policy_arn: &str,
        version_id: &str,
    ) -> Result<serde_json::Value, IdentityError> {
        let what = format!("get policy version {} of {}", version_id, policy_arn);
        let output = self
            .iam
            .get_policy_version()
            .policy_arn(policy_arn)
            .version_id(version_id)
            .send()
            .await
            .map_err(|e| classify(e, &what))?;

        let encoded = output
            .policy_version()
            .and_then(|v| v.document())
            .ok_or_else(|| IdentityError::Service(format!("{}: no document", what)))?;

        decode_policy_document(encoded, &what)
    }

    async fn get_role_policy_document(
        &self,
        role_name: &str,
        policy_name: &str,
    ) -> Result<serde_json::Value, IdentityError> {
        let what = format!("get inline policy {} of {}", policy_name, role_name);
        let output = self
            .iam
            .get_role_policy()
            .role_name(role_name)
            .policy_name(policy_name)
            .send()
            .await
            .map_err(|e| classify(e, &what))?;

        decode_policy_document(output.policy_document(), &what)
    }

    async fn get_role(&self, role_name: &str) -> Result<(), IdentityError> {
        self.iam
            .get_role()
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| classify(e, &format!("get role {}", role_name)))?;
        Ok(())
    }

    async fn create_role(
        &self,
        role_name: &str,
        trust_policy: &serde_json::Value,
        description: &str,
    ) -> Result<(), IdentityError> {
        self.iam
            .create_role()
            .role_name(role_name)
            .assume_role_policy_document(encode_document(trust_policy)?)
            .description(description)
            .send()
            .await
            .map_err(|e| classify(e, &format!("create role {}", role_name)))?;
        Ok(())
    }

    async fn create_policy(
        &self,
        policy_name: &str,
        document: &serde_json::Value,
    ) -> Result<(), IdentityError> {
        self.iam
            .create_policy()
            .policy_name(policy_name)
            .policy_document(encode_document(document)?)
            .send()
            .await
            .map_err(|e| classify(e, &format!("create policy {}", policy_name)))?;
        Ok(())
    }

    async fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &serde_json::Value,
    ) -> Result<(), IdentityError> {
        self.iam
            .put_role_policy()
            .role_name(role_name)
            .policy_name(policy_name)
            .policy_document(encode_document(document)?)
            .send()
            .await
            .map_err(|e| {
                classify(e, &format!("put inline policy {} on {}", policy_name, role_name))
            })?;
        Ok(())
    }

    async fn attach_role_policy(
        &self,
        role_name: &str,
        policy_arn: &str,
    ) -> Result<(), IdentityError> {
        self.iam
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| classify(e, &format!("attach {} to {}", policy_arn, role_name)))?;
        Ok(())
    }

    async fn caller_account_id(&self) -> Result<String, IdentityError> {
        let output = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| {
                IdentityError::Service(format!("get caller identity: {}", DisplayErrorContext(&e)))
            })?;

        output
            .account()
            .map(str::to_string)
            .ok_or_else(|| IdentityError::Service("caller identity has no account".to_string()))
    }
}

/// S3 backed object store
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, SyncError> {
        debug!(bucket = %bucket, key = %key, "Fetching object");

        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                SyncError::Storage(format!(
                    "get s3://{}/{}: {}",
                    bucket,
                    key,
                    aws_sdk_s3::error::DisplayErrorContext(&e)
                ))
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| SyncError::Storage(format!("read s3://{}/{}: {}", bucket, key, e)))?;

        Ok(body.into_bytes().to_vec())
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), SyncError> {
        debug!(bucket = %bucket, key = %key, bytes = body.len(), "Uploading object");

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type("text/csv")
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                SyncError::Storage(format!(
                    "put s3://{}/{}: {}",
                    bucket,
                    key,
                    aws_sdk_s3::error::DisplayErrorContext(&e)
                ))
            })?;

        Ok(())
    }
}
