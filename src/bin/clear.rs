use std::time::Duration;

use bucketclear::{
    clear::{clear_bucket, ClearOptions, ClearResult, DEFAULT_CONCURRENCY},
    cli::CredentialArgs,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Deletes every object in an S3-compatible bucket.
#[derive(Debug, Parser)]
struct Args {
    #[command(flatten)]
    creds: CredentialArgs,

    /// Maximum number of delete requests in flight.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Stop submitting deletes after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Print the result as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let creds = args.creds.credentials()?;
    info!("clearing {} at {}", creds.bucket(), creds.endpoint());

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, waiting for in-flight deletes");
                cancel.cancel();
            }
        });
    }
    if let Some(secs) = args.timeout_secs {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!("deadline of {}s reached, waiting for in-flight deletes", secs);
            cancel.cancel();
        });
    }

    let outcome = clear_bucket(&creds, ClearOptions::with_concurrency(args.concurrency), cancel).await;
    let reported = match &outcome {
        Ok(result) => Some(result),
        Err(err) => err.partial(),
    };
    if let Some(result) = reported {
        report(result, args.json)?;
    }
    outcome?;
    Ok(())
}

fn report(result: &ClearResult, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        println!(
            "deleted {} object(s), {} failed",
            result.deleted,
            result.failures.len()
        );
    }
    Ok(())
}
