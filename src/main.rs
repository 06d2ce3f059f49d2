use anyhow::Result;
use depth_distributor::run::run;

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}
