//! Logging demonstration
//!
//! Shows what engine output looks like in each format, including the
//! `adapter` span every adapter call runs in.
//!
//! Run with:
//! ```bash
//! cargo run -p core-runtime --example logging_demo -- json
//! cargo run -p core-runtime --example logging_demo -- compact "logging_demo=trace"
//! ```

use std::env;

use bridge_traits::Configuration;
use core_runtime::logging::{
    describe_configuration, init_logging, LogFormat, LogLevel, LoggingConfig,
};
use tracing::{debug, info, info_span, warn, Instrument};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    let format = match args.get(1).map(|arg| arg.parse::<LogFormat>()) {
        Some(Ok(format)) => format,
        Some(Err(e)) => {
            eprintln!("{}", e);
            return;
        }
        None => LogFormat::Pretty,
    };

    // The default filter only covers the workspace crates
    let filter = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| "logging_demo=debug".to_string());
    let config = LoggingConfig::default()
        .with_format(format)
        .with_level(LogLevel::Debug)
        .with_filter(filter);

    if let Err(e) = init_logging(config) {
        eprintln!("Failed to initialize logging: {}", e);
        return;
    }

    let source = Configuration::new()
        .with("rootDirectory", "/srv/content")
        .with("password", "hunter2");
    info!(
        configuration = %describe_configuration(&source),
        "Starting adapter for content source [local-mirror]"
    );

    let span = info_span!("adapter", source_id = 1, adapter_type = "disk");
    simulated_phase().instrument(span).await;

    info!("Demo finished");
}

async fn simulated_phase() {
    debug!("Getting currently known list of content source packages...");
    warn!("Ignoring exception while trying to stream package bits, will retry 3 more times before stopping");
    info!("Content source package metadata synchronized: new=[2], updated=[0], deleted=[0]");
}
