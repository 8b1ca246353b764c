//! Haberdasher demo server.
//!
//! Serves `MakeHat` (unary) and `MakeHats` (server streaming). Sizes above
//! half the maximum run out of felt after two hats, ending the stream with
//! an error trailer.
//!
//! Run with: cargo run --bin haberdasher-server
//! Then: cargo run --bin haberdasher-client

use tracing_subscriber::EnvFilter;
use twirp_stream_examples::{SERVICE, haberdasher_router, server_addr};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = server_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    println!("=== Haberdasher ===");
    println!("Server listening on http://{}", addr);
    println!();
    println!("  - MakeHat (unary):             POST /twirp/{SERVICE}/MakeHat");
    println!("  - MakeHats (server streaming): POST /twirp/{SERVICE}/MakeHats");

    axum::serve(listener, haberdasher_router()).await?;
    Ok(())
}
