//! imgprep: download, preprocess and label product images listed in CSV
//! manifests.

mod commands;
mod settings;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `IMGPREP_LOG` wins over `RUST_LOG`; without either, log at info.
fn env_filter() -> EnvFilter {
    std::env::var("IMGPREP_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    commands::run().await
}
