// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! OpsDeck: customer inventory and operations console
//!
//! Serves the inventory editor, playbook runner, cron, Docker, backup and
//! log endpoints over HTTP(S). The same binary doubles as a command-line
//! client for a running server.

mod api;
mod auth;
mod backup;
mod client;
mod config;
mod cron;
mod docker;
mod error;
mod inventory;
mod logs;
mod monitoring;
mod playbook;
mod sizes;
mod view;

use actix_web::{web, App, HttpServer};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use client::InventoryClient;
use config::AppConfig;
use inventory::VarMap;

/// OpsDeck: customer inventory and operations console
#[derive(Parser)]
#[command(name = "opsdeck", version, about)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value = "5000")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Configuration file
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// TLS certificate file (PEM); serves HTTPS when given with --tls-key
    #[arg(long)]
    tls_cert: Option<String>,

    /// TLS private key file (PEM)
    #[arg(long)]
    tls_key: Option<String>,

    /// Directory of static web assets
    #[arg(long)]
    web_dir: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args)]
struct Remote {
    /// Server to talk to
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    server: String,

    /// API key, if the server requires one
    #[arg(long)]
    api_key: Option<String>,

    #[arg(long, default_value = "X-API-Key")]
    api_key_header: String,
}

#[derive(Subcommand)]
enum Command {
    /// List customers on a running server
    Customers {
        #[command(flatten)]
        remote: Remote,
    },
    /// Print the effective variables of a customer
    Show {
        id: String,
        #[command(flatten)]
        remote: Remote,
    },
    /// Set some of a customer's variables with key=value pairs
    Save {
        id: String,
        #[arg(required = true)]
        vars: Vec<String>,
        #[command(flatten)]
        remote: Remote,
    },
    /// Start the playbook for a customer
    Run {
        id: String,
        #[arg(long)]
        tags: Option<String>,
        #[command(flatten)]
        remote: Remote,
    },
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in ["opsdeck=info", "actix_web=info"] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    if let Some(command) = cli.command {
        return run_client(command).await;
    }

    let config = match AppConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Cannot load configuration {}: {}", cli.config.display(), e);
            std::process::exit(1);
        }
    };

    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    info!("");
    info!("  OpsDeck v{}", env!("CARGO_PKG_VERSION"));
    info!("  ──────────────────────────────────");
    info!("  Host:       {}", hostname);
    info!("  Inventory:  {}", config.inventory_file().display());
    info!("  Playbook:   {}", config.playbook_file().display());
    info!("  API key:    {}", if config.auth_enabled() { "required" } else { "disabled" });
    if config.sample_fallback {
        info!("  Fallback:   sample data when backends are unavailable");
    }
    info!("");

    let state = web::Data::new(api::AppState::new(config));

    // Background: reap finished playbook processes
    let reaper = state.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(10)).await;
            let running = reaper.runner.reap();
            if running > 0 {
                debug!("{} playbook runs in progress", running);
            }
        }
    });

    let web_dir = cli.web_dir.clone().or_else(find_web_dir);
    match &web_dir {
        Some(dir) => info!("  Web UI:     {}", dir),
        None => info!("  Web UI:     not found, serving API only"),
    }

    let tls_config = match (&cli.tls_cert, &cli.tls_key) {
        (Some(cert), Some(key)) => match build_tls(cert, key) {
            Ok(builder) => Some(builder),
            Err(e) => {
                warn!("TLS setup failed ({}), falling back to HTTP", e);
                None
            }
        },
        (Some(_), None) | (None, Some(_)) => {
            warn!("Both --tls-cert and --tls-key are needed for HTTPS, using HTTP");
            None
        }
        (None, None) => None,
    };

    let server = HttpServer::new(move || {
        let web_dir = web_dir.clone();
        App::new()
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().limit(4 * 1024 * 1024))
            .configure(api::configure)
            .configure(move |cfg| {
                if let Some(dir) = &web_dir {
                    cfg.service(actix_files::Files::new("/", dir).index_file("index.html"));
                }
            })
    })
    .workers(4);

    match tls_config {
        Some(tls) => {
            info!("  Listening:  https://{}:{}", cli.bind, cli.port);
            server.bind_openssl(format!("{}:{}", cli.bind, cli.port), tls)?.run().await
        }
        None => {
            info!("  Listening:  http://{}:{}", cli.bind, cli.port);
            server.bind(format!("{}:{}", cli.bind, cli.port))?.run().await
        }
    }
}

fn build_tls(cert: &str, key: &str) -> Result<openssl::ssl::SslAcceptorBuilder, openssl::error::ErrorStack> {
    use openssl::ssl::{SslAcceptor, SslFiletype, SslMethod};
    let mut builder = SslAcceptor::mozilla_intermediate(SslMethod::tls())?;
    builder.set_private_key_file(key, SslFiletype::PEM)?;
    builder.set_certificate_chain_file(cert)?;
    builder.check_private_key()?;
    Ok(builder)
}

/// Find the web UI directory
fn find_web_dir() -> Option<String> {
    let candidates = ["web", "/opt/opsdeck/web", "/usr/share/opsdeck/web"];
    candidates
        .iter()
        .find(|dir| Path::new(dir).join("index.html").exists())
        .map(|dir| dir.to_string())
}

fn connect(remote: &Remote) -> InventoryClient {
    let client = InventoryClient::new(&remote.server);
    match &remote.api_key {
        Some(key) => client.with_api_key(&remote.api_key_header, key),
        None => client,
    }
}

async fn run_client(command: Command) -> std::io::Result<()> {
    let outcome = match command {
        Command::Customers { remote } => list_customers(&remote).await,
        Command::Show { id, remote } => show_customer(&remote, &id).await,
        Command::Save { id, vars, remote } => save_customer(&remote, &id, &vars).await,
        Command::Run { id, tags, remote } => start_run(&remote, &id, tags.as_deref()).await,
    };
    outcome.map_err(|e| std::io::Error::other(e.to_string()))
}

async fn list_customers(remote: &Remote) -> error::Result<()> {
    let mut client = connect(remote);
    client.load_inventory().await?;
    let customers = client.customers();
    for (id, summary) in &customers {
        println!("{:<20} {:<30} {}", id, summary.name, summary.state);
    }
    println!("{} customers", customers.len());
    Ok(())
}

async fn show_customer(remote: &Remote, id: &str) -> error::Result<()> {
    let mut client = connect(remote);
    if !client.load_inventory().await?.has_customer(id) {
        return Err(error::OpsError::not_found("Customer", id));
    }
    for (key, value) in client.customer_vars(id) {
        println!("{} = {}", key, value);
    }
    Ok(())
}

async fn save_customer(remote: &Remote, id: &str, assignments: &[String]) -> error::Result<()> {
    let mut vars = VarMap::new();
    for arg in assignments {
        let (key, value) = client::parse_assignment(arg)?;
        vars.insert(key, value);
    }
    let mut client = connect(remote);
    let ack = client.update_customer_vars(id, vars).await?;
    println!("{}", ack.message.unwrap_or(ack.status));
    Ok(())
}

async fn start_run(remote: &Remote, id: &str, tags: Option<&str>) -> error::Result<()> {
    let client = connect(remote);
    let ack = client.run_playbook(id, &VarMap::new(), tags).await?;
    match ack.run_id {
        Some(run_id) => println!("Run {} started for {}", run_id, id),
        None => println!("{}", ack.message.unwrap_or_else(|| "Run accepted".to_string())),
    }
    Ok(())
}
