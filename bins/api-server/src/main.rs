mod peerdb;

use axum::routing;
use axum::Json;
use axum::Router;
use clap::{Args, Parser, Subcommand};
use cosmos_peers_db::connect_db;
use peerdb::{rest_router, AppState};
use std::net::SocketAddr;
use tracing::info;

#[derive(Parser)]
#[command(author, version)]
#[command(
    about = "Cosmos peers api server",
    long_about = "It serves the crawled peers and their country and isp statistics to the dashboard"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start serving the peers database
    StartApiServer(ApiOpts),
}

#[derive(Args)]
struct ApiOpts {
    #[arg(long)]
    /// Read peers from the SQLite db at this path. This is useful for local testing because you don't have to setup a centralized database.
    sql_db: Option<String>,
    #[arg(long, conflicts_with = "sql_db")]
    /// Read peers from PostgreSQL, configured through the POSTGRES_USERNAME, POSTGRES_PASS, IP_ADDR and DB_NAME variables.
    postgres_db: bool,
    #[arg(long, default_value = "127.0.0.1:3030")]
    /// Address the server listens on.
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::StartApiServer(opts) => start_api_server(opts).await,
    }
}

async fn start_api_server(opts: ApiOpts) -> eyre::Result<()> {
    let store = connect_db(opts.sql_db.as_deref(), opts.postgres_db).await?;
    let app = Router::new()
        .route("/", routing::get(handler))
        .merge(rest_router())
        .with_state(AppState::new(store));

    info!("Server started, listening on {}", opts.listen);

    axum::Server::bind(&opts.listen)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down api server");
        })
        .await?;

    Ok(())
}

#[derive(serde::Serialize)]
struct Message {
    message: String,
}

async fn handler() -> Json<Message> {
    Json(Message {
        message: "Cosmos peers api server".to_string(),
    })
}
