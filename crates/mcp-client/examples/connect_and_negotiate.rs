//! Connects to a MUCK, negotiates one package, and issues a call.
//!
//! Usage:
//!   cargo run --example connect_and_negotiate -- <host> <port>

use mcp_client::{PackageRequest, Session};
use mcp_transport::TransportConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_string());
    let port: u16 = args
        .next()
        .map(|p| p.parse())
        .transpose()?
        .unwrap_or(4201);

    let config = TransportConfig::new(host, port);
    let mut session = Session::connect(&config).await?;
    tracing::info!(auth = session.auth(), catalog_size = session.catalog().len(), "handshake complete");

    session
        .negotiate(vec![PackageRequest::Name("org-fuzzball-help".to_string())])
        .await?;

    let outcome = session.process().await?;
    tracing::info!(unrecognized = outcome.unrecognized.len(), "drained buffered input");

    session.quit().await?;
    Ok(())
}
