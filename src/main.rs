use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::info;

use labworksd::config::Config;
use labworksd::media::{spawn_static_server, ImageStore};
use labworksd::server::{AppCtx, ConnectionRegistry, LabServer};

/// Lab assessment server: delivers quizzes to students over the LAN and
/// records passing results.
#[derive(Parser)]
#[command(name = "labworksd", version, about)]
struct Cli {
    /// Bind address for both servers
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Assessment protocol port
    #[arg(long, default_value_t = 9999)]
    port: u16,

    /// Static media (images) port
    #[arg(long, default_value_t = 8080)]
    static_port: u16,

    /// Host name clients should use in image URLs
    #[arg(long, default_value = "localhost")]
    static_host: String,

    /// Directory holding the database and the images
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = Config::with_data_dir(&cli.data_dir);
    config.host = cli.host;
    config.port = cli.port;
    config.static_port = cli.static_port;
    config.static_host = cli.static_host;

    // Create the schema up front so a misconfigured data dir fails here,
    // not on the first client.
    let _ = labworksd::db::open_db(&config.db_path)?;

    let image_store = ImageStore::new(&config.images_dir, config.image_base_url())?;
    let static_server = spawn_static_server(&config.images_dir, &config.host, config.static_port)?;
    info!("images served from {}", static_server.addr());

    let ctx = Arc::new(AppCtx {
        db_path: config.db_path.clone(),
        image_store,
        registry: ConnectionRegistry::new(),
    });
    let server = LabServer::bind((config.host.as_str(), config.port), ctx)?;
    server.run()
}
