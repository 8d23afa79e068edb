//! In-memory identity service and object store for tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::providers::{IdentityService, ObjectStore};
use super::types::{
    customer_managed_policy_arn, AttachedPolicy, IdentityError, SyncError,
    AWS_MANAGED_POLICY_PREFIX,
};

/// Managed policies per role, same as the IAM default quota
const MANAGED_POLICIES_PER_ROLE: usize = 10;

#[derive(Debug, Clone)]
pub struct FakeRole {
    pub trust_policy: serde_json::Value,
    pub description: String,
    pub attached: Vec<String>,
    pub inline: Vec<(String, serde_json::Value)>,
}

#[derive(Default)]
struct State {
    roles: Vec<String>,
    role_data: HashMap<String, FakeRole>,
    /// Customer-managed policies by ARN
    policies: HashMap<String, serde_json::Value>,
    failures: HashMap<&'static str, IdentityError>,
    calls: Vec<String>,
}

pub struct FakeIdentityService {
    account_id: String,
    state: Mutex<State>,
}

impl FakeIdentityService {
    pub fn new(account_id: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            state: Mutex::new(State::default()),
        }
    }

    pub fn add_role(&self, role_name: &str) {
        let mut state = self.state.lock().unwrap();
        state.roles.push(role_name.to_string());
        state.role_data.insert(
            role_name.to_string(),
            FakeRole {
                trust_policy: serde_json::json!({}),
                description: String::new(),
                attached: Vec::new(),
                inline: Vec::new(),
            },
        );
    }

    pub fn add_customer_policy(&self, policy_name: &str, document: serde_json::Value) {
        let arn = customer_managed_policy_arn(&self.account_id, policy_name);
        self.state.lock().unwrap().policies.insert(arn, document);
    }

    pub fn attach_existing(&self, role_name: &str, policy_arn: &str) {
        let mut state = self.state.lock().unwrap();
        let role = state.role_data.get_mut(role_name).expect("unknown role");
        role.attached.push(policy_arn.to_string());
    }

    pub fn add_inline(&self, role_name: &str, policy_name: &str, document: serde_json::Value) {
        let mut state = self.state.lock().unwrap();
        let role = state.role_data.get_mut(role_name).expect("unknown role");
        role.inline.push((policy_name.to_string(), document));
    }

    /// Make every call of `operation` fail with `err`
    pub fn fail_on(&self, operation: &'static str, err: IdentityError) {
        self.state.lock().unwrap().failures.insert(operation, err);
    }

    pub fn role(&self, role_name: &str) -> Option<FakeRole> {
        self.state.lock().unwrap().role_data.get(role_name).cloned()
    }

    pub fn role_names(&self) -> Vec<String> {
        self.state.lock().unwrap().roles.clone()
    }

    pub fn customer_policy(&self, policy_name: &str) -> Option<serde_json::Value> {
        let arn = customer_managed_policy_arn(&self.account_id, policy_name);
        self.state.lock().unwrap().policies.get(&arn).cloned()
    }

    /// Operations invoked so far, formatted as `op:target`
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, operation: &'static str, target: &str) -> Result<(), IdentityError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("{}:{}", operation, target));
        match state.failures.get(operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

fn policy_name_from_arn(arn: &str) -> String {
    arn.rsplit('/').next().unwrap_or(arn).to_string()
}

#[async_trait]
impl IdentityService for FakeIdentityService {
    async fn list_roles(&self) -> Result<Vec<String>, IdentityError> {
        self.record("list_roles", "*")?;
        Ok(self.role_names())
    }

    async fn list_attached_role_policies(
        &self,
        role_name: &str,
    ) -> Result<Vec<AttachedPolicy>, IdentityError> {
        self.record("list_attached_role_policies", role_name)?;
        let role = self
            .role(role_name)
            .ok_or_else(|| IdentityError::NotFound(role_name.to_string()))?;

        Ok(role
            .attached
            .iter()
            .map(|arn| AttachedPolicy {
                policy_name: policy_name_from_arn(arn),
                policy_arn: arn.clone(),
            })
            .collect())
    }

    async fn list_role_policy_names(&self, role_name: &str) -> Result<Vec<String>, IdentityError> {
        self.record("list_role_policy_names", role_name)?;
        let role = self
            .role(role_name)
            .ok_or_else(|| IdentityError::NotFound(role_name.to_string()))?;

        Ok(role.inline.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn get_policy_default_version(&self, policy_arn: &str) -> Result<String, IdentityError> {
        self.record("get_policy_default_version", policy_arn)?;
        if self.state.lock().unwrap().policies.contains_key(policy_arn) {
            Ok("v1".to_string())
        } else {
            Err(IdentityError::NotFound(policy_arn.to_string()))
        }
    }

    async fn get_policy_version_document(
        &self,
        policy_arn: &str,
        version_id: &str,
    ) -> Result<serde_json::Value, IdentityError> {
        self.record("get_policy_version_document", policy_arn)?;
        if version_id != "v1" {
            return Err(IdentityError::NotFound(format!("{}@{}", policy_arn, version_id)));
        }
        self.state
            .lock()
            .unwrap()
            .policies
            .get(policy_arn)
            .cloned()
            .ok_or_else(|| IdentityError::NotFound(policy_arn.to_string()))
    }

    async fn get_role_policy_document(
        &self,
        role_name: &str,
        policy_name: &str,
    ) -> Result<serde_json::Value, IdentityError> {
        self.record("get_role_policy_document", role_name)?;
        self.role(role_name)
            .and_then(|role| {
                role.inline
                    .into_iter()
                    .find(|(name, _)| name == policy_name)
                    .map(|(_, document)| document)
            })
            .ok_or_else(|| IdentityError::NotFound(format!("{}/{}", role_name, policy_name)))
    }

    async fn get_role(&self, role_name: &str) -> Result<(), IdentityError> {
        self.record("get_role", role_name)?;
        match self.role(role_name) {
            Some(_) => Ok(()),
            None => Err(IdentityError::NotFound(role_name.to_string())),
        }
    }

    async fn create_role(
        &self,
        role_name: &str,
        trust_policy: &serde_json::Value,
        description: &str,
    ) -> Result<(), IdentityError> {
        self.record("create_role", role_name)?;
        let mut state = self.state.lock().unwrap();
        if state.role_data.contains_key(role_name) {
            return Err(IdentityError::AlreadyExists(role_name.to_string()));
        }
        state.roles.push(role_name.to_string());
        state.role_data.insert(
            role_name.to_string(),
            FakeRole {
                trust_policy: trust_policy.clone(),
                description: description.to_string(),
                attached: Vec::new(),
                inline: Vec::new(),
            },
        );
        Ok(())
    }

    async fn create_policy(
        &self,
        policy_name: &str,
        document: &serde_json::Value,
    ) -> Result<(), IdentityError> {
        self.record("create_policy", policy_name)?;
        let arn = customer_managed_policy_arn(&self.account_id, policy_name);
        let mut state = self.state.lock().unwrap();
        if state.policies.contains_key(&arn) {
            return Err(IdentityError::AlreadyExists(arn));
        }
        state.policies.insert(arn, document.clone());
        Ok(())
    }

    async fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &serde_json::Value,
    ) -> Result<(), IdentityError> {
        self.record("put_role_policy", role_name)?;
        let mut state = self.state.lock().unwrap();
        let role = state
            .role_data
            .get_mut(role_name)
            .ok_or_else(|| IdentityError::NotFound(role_name.to_string()))?;

        match role.inline.iter_mut().find(|(name, _)| name == policy_name) {
            Some((_, existing)) => *existing = document.clone(),
            None => role.inline.push((policy_name.to_string(), document.clone())),
        }
        Ok(())
    }

    async fn attach_role_policy(
        &self,
        role_name: &str,
        policy_arn: &str,
    ) -> Result<(), IdentityError> {
        self.record("attach_role_policy", policy_arn)?;
        let mut state = self.state.lock().unwrap();
        let policy_exists =
            policy_arn.starts_with(AWS_MANAGED_POLICY_PREFIX) || state.policies.contains_key(policy_arn);
        if !policy_exists {
            return Err(IdentityError::NotFound(policy_arn.to_string()));
        }

        let role = state
            .role_data
            .get_mut(role_name)
            .ok_or_else(|| IdentityError::NotFound(role_name.to_string()))?;

        if role.attached.iter().any(|arn| arn == policy_arn) {
            return Ok(());
        }
        if role.attached.len() >= MANAGED_POLICIES_PER_ROLE {
            return Err(IdentityError::LimitExceeded(role_name.to_string()));
        }
        role.attached.push(policy_arn.to_string());
        Ok(())
    }

    async fn caller_account_id(&self) -> Result<String, IdentityError> {
        self.record("caller_account_id", "*")?;
        Ok(self.account_id.clone())
    }
}

#[derive(Default)]
pub struct FakeObjectStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl FakeObjectStore {
    pub fn insert(&self, bucket: &str, key: &str, body: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), body);
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, SyncError> {
        self.object(bucket, key)
            .ok_or_else(|| SyncError::Storage(format!("NoSuchKey: s3://{}/{}", bucket, key)))
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), SyncError> {
        self.insert(bucket, key, body);
        Ok(())
    }
}
