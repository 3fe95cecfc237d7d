//! Sightline - command line tap on the vision backend's live feed.
//!
//! Prints every "metrics" and "predictions" event as one JSON line on stdout
//! until interrupted.

use std::sync::Arc;

use anyhow::Context;
use serde_json::{json, Value};
use sightline_client::{logging, ClientConfig, ConnectionManager, TracingErrorDisplay};

fn print_event(event: &str, data: Value) {
    println!("{}", json!({ "event": event, "data": data }));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let config = ClientConfig::from_env();
    config
        .websocket_url()
        .with_context(|| format!("invalid SIGHTLINE_SERVER_URL '{}'", config.server_url))?;

    let manager = Arc::new(ConnectionManager::with_socket_io(
        config,
        Arc::new(TracingErrorDisplay),
    ));

    let context = manager.context();
    context
        .on_metrics()
        .set(|data| print_event("metrics", data));
    context
        .on_predictions()
        .set(|data| print_event("predictions", data));

    let scope = manager.mount();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    scope.unmount();
    Ok(())
}
