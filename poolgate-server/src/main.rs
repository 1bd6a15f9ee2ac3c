//! Poolgate Server
//!
//! Main entry point for the Poolgate load balancing service

use poolgate_server::start_server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    start_server().await?;
    Ok(())
}
