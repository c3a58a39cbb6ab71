use bucketclear::{cli::CredentialArgs, store::S3Store};
use clap::Parser;
use rand::{rngs::SmallRng, RngCore, SeedableRng};
use tracing::{debug, info};

/// Fills a bucket with random objects, e.g. to try out `bucketclear`.
#[derive(Debug, Parser)]
struct Opt {
    #[command(flatten)]
    creds: CredentialArgs,

    #[arg(long, default_value = "")]
    prefix: String,

    #[arg(long)]
    num_records: usize,

    #[arg(long, default_value_t = 1024)]
    record_size: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opt = Opt::parse();
    let creds = opt.creds.credentials()?;
    let store = S3Store::connect(&creds).await?;

    let mut prng = SmallRng::seed_from_u64(opt.seed);
    for _ in 0..opt.num_records {
        let mut data = vec![0; opt.record_size];
        prng.fill_bytes(&mut data);
        let digest = ring::digest::digest(&ring::digest::SHA256, &data);
        let key = format!("{}{}", opt.prefix, hex::encode(digest.as_ref()));
        debug!("putting {}", key);
        store.put_object(creds.bucket(), &key, data).await?;
    }
    info!("wrote {} object(s) to {}", opt.num_records, creds.bucket());

    Ok(())
}
