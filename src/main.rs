//! carousel-driver - batch actions over a remote carousel with resumable checkpoints

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    carousel_driver_cli::cli::app::run().await
}
