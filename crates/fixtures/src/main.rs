use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "vizcheck-fixtures")]
#[command(about = "Serve the demo pages for browser tests")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "VIZCHECK_FIXTURES_ADDR", default_value = "127.0.0.1:4173")]
    addr: SocketAddr,

    /// Directory containing the demo pages
    #[arg(long, env = "VIZCHECK_FIXTURES_ROOT", default_value = "demos")]
    root: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    vizcheck_fixtures::serve(args.addr, &args.root).await
}
