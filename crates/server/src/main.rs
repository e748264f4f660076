use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "garden-layout-server",
    about = "Local companion API for the garden layout creator"
)]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "GLC_ADDR", default_value = "127.0.0.1:39334")]
    addr: SocketAddr,
    /// Layout database; defaults to ~/.garden-layout/layouts.db.
    #[arg(long, env = "GLC_DB")]
    db: Option<PathBuf>,
    /// Log filter, used when RUST_LOG is unset.
    #[arg(long, env = "GLC_LOG", default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db_path = args.db.unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".garden-layout")
            .join("layouts.db")
    });

    tracing::info!(db = %db_path.display(), "starting garden layout server");
    garden_layout_server::serve(args.addr, db_path).await
}
