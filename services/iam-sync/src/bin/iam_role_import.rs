//! IAM Role Import - Standalone Binary
//!
//! Reads the CSV written by `iam-role-export` from S3 and reconciles it into
//! the current account: missing roles and customer-managed policies are
//! created, managed policies attached and inline policies put.
//!
//! ## Usage
//!
//! ```bash
//! iam-role-import --bucket iam-exports --key iam_roles_policies.csv
//!
//! # Roles created for Lambda instead of EC2
//! iam-role-import --bucket iam-exports --trust-service lambda.amazonaws.com
//!
//! # Fail the run when a customer-managed policy cannot be created
//! iam-role-import --bucket iam-exports --strict-policy-create
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use iam_role_sync::iam_sync::{
    import_handler, load_aws_config, AwsIdentityService, ImportConfig, InvocationContext,
    S3ObjectStore, DEFAULT_TRUST_SERVICE,
};

/// IAM Role Import - Reconcile IAM roles and policies from an S3 CSV
#[derive(Parser, Debug)]
#[command(name = "iam-role-import", version, about)]
struct Args {
    /// Source bucket
    #[arg(long, env = "IAM_SYNC_BUCKET")]
    bucket: String,

    /// Source object key
    #[arg(long, default_value = "iam_roles_policies.csv", env = "IAM_SYNC_KEY")]
    key: String,

    /// AWS region (defaults to the SDK's region resolution)
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Service principal trusted by roles the import creates
    #[arg(long, default_value = DEFAULT_TRUST_SERVICE, env = "IAM_SYNC_TRUST_SERVICE")]
    trust_service: String,

    /// Trust policy document for created roles (overrides --trust-service)
    #[arg(long, env = "IAM_SYNC_TRUST_POLICY_FILE")]
    trust_policy_file: Option<PathBuf>,

    /// Fail the run when a customer-managed policy cannot be created
    #[arg(long, default_value = "false", env = "IAM_SYNC_STRICT_POLICY_CREATE")]
    strict_policy_create: bool,

    /// Invocation event as JSON
    #[arg(long, default_value = "{}")]
    event: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let args = Args::parse();
    let event: serde_json::Value =
        serde_json::from_str(&args.event).context("Invalid --event JSON")?;
    let context = InvocationContext::new();

    let mut config = ImportConfig::new(&args.bucket, &args.key)
        .with_trust_service(&args.trust_service)
        .with_strict_policy_create(args.strict_policy_create);
    if let Some(path) = &args.trust_policy_file {
        config = config
            .with_trust_policy_file(path)
            .context("Failed to load trust policy")?;
    }

    info!(
        request_id = %context.request_id,
        bucket = %args.bucket,
        key = %args.key,
        strict = args.strict_policy_create,
        "Starting IAM Role Import"
    );

    let sdk_config = load_aws_config(args.region.clone()).await;
    let identity = AwsIdentityService::new(&sdk_config);
    let store = S3ObjectStore::new(&sdk_config);

    let response = import_handler(&event, &context, &identity, &store, config).await;

    println!(
        "{}",
        serde_json::to_string(&response).context("Failed to serialize response")?
    );

    if !response.is_success() {
        std::process::exit(1);
    }

    Ok(())
}
