use clap::Parser;
use collabtex_server::{serve, DEFAULT_PORT};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// `server [port]`; the only CLI surface the core exposes.
#[derive(Parser)]
struct Args {
    /// TCP port to listen on. Defaults to 4444.
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{}=info", env!("CARGO_CRATE_NAME")).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let port = args.port.unwrap_or(DEFAULT_PORT);

    if let Err(e) = serve(port).await {
        tracing::error!("server exited: {e:#}");
        std::process::exit(1);
    }
}
