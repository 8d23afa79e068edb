//! IAM Role Export - Standalone Binary
//!
//! Lists every IAM role with its attached and inline policies and uploads
//! them as a CSV file to S3.
//!
//! ## Usage
//!
//! ```bash
//! iam-role-export --bucket iam-exports --key iam_roles_policies.csv
//!
//! # Same, configured from the environment
//! IAM_SYNC_BUCKET=iam-exports iam-role-export
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use iam_role_sync::iam_sync::{
    export_handler, load_aws_config, AwsIdentityService, ExportConfig, InvocationContext,
    S3ObjectStore,
};

/// IAM Role Export - Write IAM roles and policies to S3 as CSV
#[derive(Parser, Debug)]
#[command(name = "iam-role-export", version, about)]
struct Args {
    /// Destination bucket
    #[arg(long, env = "IAM_SYNC_BUCKET")]
    bucket: String,

    /// Destination object key
    #[arg(long, default_value = "iam_roles_policies.csv", env = "IAM_SYNC_KEY")]
    key: String,

    /// AWS region (defaults to the SDK's region resolution)
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

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

    info!(
        request_id = %context.request_id,
        bucket = %args.bucket,
        key = %args.key,
        "Starting IAM Role Export"
    );

    let sdk_config = load_aws_config(args.region.clone()).await;
    let identity = AwsIdentityService::new(&sdk_config);
    let store = S3ObjectStore::new(&sdk_config);

    let response = export_handler(
        &event,
        &context,
        &identity,
        &store,
        ExportConfig::new(args.bucket, args.key),
    )
    .await;

    println!(
        "{}",
        serde_json::to_string(&response).context("Failed to serialize response")?
    );

    if !response.is_success() {
        std::process::exit(1);
    }

    Ok(())
}
