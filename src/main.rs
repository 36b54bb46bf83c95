use anyhow::Context;
use contman::{logging, run_receipt, DockerManager, Receipt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let path = std::env::args()
        .nth(1)
        .context("usage: contman <receipt.json>")?;
    let receipt = Receipt::from_json_file(&path)
        .with_context(|| format!("Failed to load receipt from {}", path))?;

    let manager = DockerManager::connect()
        .await
        .context("Failed to connect to Docker daemon")?;
    log::info!("Running {} in {}", receipt.cmd, receipt.image);

    run_receipt(&manager, &receipt)
        .await
        .context("Failed to run receipt")?;

    log::info!("Receipt completed");
    Ok(())
}
