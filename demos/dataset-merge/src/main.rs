use clap::Parser;

use nodelink::dataset::{DatasetError, OperationalDataset};
use nodelink::reconcile::{Decision, reconcile};

use tracing::{error, info};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Active dataset of the border router, as a hex string.
    #[arg(long)]
    local: String,

    /// External dataset to merge, as a hex string.
    #[arg(long)]
    external: String,
}

fn parse(name: &str, hex: &str) -> Result<OperationalDataset, DatasetError> {
    OperationalDataset::from_hex(hex).inspect_err(|e| error!("Invalid {name} dataset: {e}"))
}

fn main() {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt().init();

    let cli = Cli::parse();

    let (Ok(local), Ok(external)) = (
        parse("local", &cli.local),
        parse("external", &cli.external),
    ) else {
        std::process::exit(1);
    };

    let decision = reconcile(&local, &external);
    match decision {
        Decision::AdoptExternal { .. } => info!("The external dataset replaces the local one"),
        Decision::KeepLocalBumpExternal { delta, .. } => info!(
            "The local dataset is newer, the external timestamp is advanced by {:?}",
            delta.as_duration()
        ),
    }

    let pending = decision.resolve(&external);
    if let Some(timestamp) = pending.active_timestamp() {
        info!("Pending active timestamp: {timestamp}");
    }
    info!("Commit delay: {:?}", decision.commit_delay());

    println!("{}", pending.to_hex());
}
