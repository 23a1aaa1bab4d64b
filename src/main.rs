//! folio-rs entry point.

use clap::Parser;
use folio_rs::{
    config::{Cli, Command, Config},
    db::Database,
    server,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    match cli.command {
        Some(Command::Init { force }) => cmd_init(force),
        Some(Command::Scan { library }) => cmd_scan(config, library).await,
        Some(Command::Serve { bind, library }) => cmd_serve(config, bind, library).await,
        None => cmd_serve(config, None, None).await,
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "folio_rs=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn open_database(config: &Config) -> anyhow::Result<Database> {
    if let Some(parent) = config.database.path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Database::open(&config.database.path)?)
}

/// Initialize config and database.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    let config = Config::default();
    open_database(&config)?;
    println!("Initialized database: {}", config.database.path.display());

    println!("\nEdit config.toml to point [library] root at your documents.");
    println!("Then run: folio-rs scan");

    Ok(())
}

/// Run one reconciliation pass and print the report.
async fn cmd_scan(mut config: Config, library: Option<PathBuf>) -> anyhow::Result<()> {
    if let Some(root) = library {
        config.library.root = root;
    }

    init_tracing();

    let db = open_database(&config)?;
    let state = server::AppState::new(config, db);

    let report = tokio::task::spawn_blocking(move || state.scan()).await??;
    let Some(report) = report else {
        anyhow::bail!("Another scan is already running");
    };

    println!("{}", report);
    for issue in &report.issues {
        let stage = issue
            .stage
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<7} {:<11} {}{}: {}",
            issue.action,
            stage,
            issue.path,
            if issue.applied { "" } else { " (not applied)" },
            issue.message
        );
    }

    Ok(())
}

/// Start the server.
async fn cmd_serve(
    mut config: Config,
    bind: Option<std::net::SocketAddr>,
    library: Option<PathBuf>,
) -> anyhow::Result<()> {
    if let Some(addr) = bind {
        config.server.bind = addr;
    }
    if let Some(root) = library {
        config.library.root = root;
    }

    init_tracing();

    let db = open_database(&config)?;

    tracing::info!(
        bind = %config.server.bind,
        database = %config.database.path.display(),
        library = %config.library.root.display(),
        "Starting folio-rs server"
    );

    let state = server::AppState::new(config.clone(), db);

    // Catalog from the last run is served while this pass runs
    tracing::info!("Starting background library scan...");
    state.start_background_scan();

    if config.scan.interval_seconds > 0 {
        server::spawn_periodic_scan(
            state.clone(),
            Duration::from_secs(config.scan.interval_seconds),
        );
    }

    let app = server::create_router(state);

    let listener = TcpListener::bind(config.server.bind).await?;
    tracing::info!(address = %config.server.bind, "Server listening (background scan in progress)");

    axum::serve(listener, app).await?;

    Ok(())
}
