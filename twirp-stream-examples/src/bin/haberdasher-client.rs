//! Haberdasher demo client.
//!
//! Exercises a unary call, a server stream that completes, a server stream
//! that ends in an error trailer, and a raw call whose payloads are printed
//! as bytes.
//!
//! Usage:
//!   # First, start the server in another terminal:
//!   cargo run --bin haberdasher-server
//!
//!   # Then run the client (defaults to http://localhost:8080):
//!   cargo run --bin haberdasher-client
//!
//!   # Or specify a custom server URL:
//!   cargo run --bin haberdasher-client -- http://localhost:3000

use std::env;

use futures::StreamExt;
use prost::Message;
use twirp_stream_client::{CallRequest, TwirpClient, hex_bytes, print_bytes};
use twirp_stream_examples::{Hat, SERVICE, Size};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    // Command line, then SERVER_URL, then default
    let base_url = env::args()
        .nth(1)
        .or_else(|| env::var("SERVER_URL").ok())
        .unwrap_or_else(|| "http://localhost:8080".to_string());

    println!("=== Haberdasher Client ===");
    println!("Server URL: {}", base_url);
    println!();

    let client = TwirpClient::new(&base_url)?;
    let make_hat = format!("{SERVICE}/MakeHat");
    let make_hats = format!("{SERVICE}/MakeHats");

    println!("MakeHat (unary)...");
    let hat = client
        .call_unary::<Size, Hat>(&make_hat, &Size { inches: 12 })
        .await?
        .into_inner();
    println!("  {} {} ({} inches)", hat.color, hat.name, hat.inches);
    println!();

    println!("MakeHats (server streaming)...");
    let mut hats = client
        .call_server_stream::<Size, Hat>(&make_hats, &Size { inches: 8 })
        .await?
        .into_inner();
    while let Some(hat) = hats.next().await {
        let hat = hat?;
        println!("  {}: {}", hat.name, hat.color);
    }
    println!();

    println!("MakeHats with a size that runs out of felt...");
    let mut hats = client
        .call_server_stream::<Size, Hat>(&make_hats, &Size { inches: 30 })
        .await?
        .into_inner();
    while let Some(result) = hats.next().await {
        match result {
            Ok(hat) => println!("  {}: {}", hat.name, hat.color),
            Err(e) => println!("  stream ended with error: {e}"),
        }
    }
    println!();

    println!("MakeHat with an invalid size...");
    match client
        .call_unary::<Size, Hat>(&make_hat, &Size { inches: 0 })
        .await
    {
        Ok(response) => println!("  unexpected hat: {:?}", response.into_inner()),
        Err(e) => println!("  {} ({}): {:?}", e.code(), e.message(), e.metadata()),
    }
    println!();

    println!("MakeHats (raw payloads)...");
    let payload = Size { inches: 4 }.encode_to_vec();
    let request = CallRequest::server_stream(client.url_for(&make_hats), payload);
    let mut payloads = client.call(request).await?.into_inner();
    while let Some(payload) = payloads.next().await {
        let payload = payload?;
        println!("  text: {}", print_bytes(&payload));
        println!("  hex:  {}", hex_bytes(&payload));
    }

    Ok(())
}
