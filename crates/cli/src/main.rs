//! watchman-watch
//!
//! Connects to the file watching daemon and either lists watched roots or
//! subscribes to a directory and prints every change it reports.

mod cli;
mod config;

use clap::Parser;
use cli::{Cli, Command};
use color_eyre::eyre::{Report, Result, WrapErr, bail};
use config::Config;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use watchman_client::{ChangeNotification, Client, File};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref())?
        .with_socket(cli.socket.clone())
        .with_log_level(cli.log_level.clone());

    init_logging(&config.client.log_level)?;

    let client = connect(&config).await?;
    println!("version: {}\n", client.version());

    match cli.command {
        Command::List => cmd_list(&client).await,
        Command::Watch {
            dir,
            name,
            show_fresh,
        } => {
            let config = config.with_subscription(name);
            cmd_watch(&client, &config, dir, show_fresh).await
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

async fn connect(config: &Config) -> Result<Client> {
    print!("Connecting to Watchman... ");
    let _ = std::io::stdout().flush();
    match Client::connect_with(config.client_config()).await {
        Ok(client) => {
            println!("SUCCESS");
            Ok(client)
        }
        Err(e) => {
            println!("FAILURE");
            Err(Report::new(e).wrap_err("failed to connect to daemon"))
        }
    }
}

async fn cmd_list(client: &Client) -> Result<()> {
    let roots = client.list_watches().await?;
    println!("Watches:");
    for root in roots {
        println!("   {}", root.display());
    }
    Ok(())
}

async fn cmd_watch(
    client: &Client,
    config: &Config,
    dir: Option<PathBuf>,
    show_fresh: bool,
) -> Result<()> {
    let dir = resolve_dir(dir)?;
    println!("Watching: {}\n", dir.display());

    let Some(mut notifications) = client.take_notifications() else {
        bail!("notification stream already taken");
    };

    let watch = client.add_watch(&dir).await?;
    let _subscription = watch.subscribe(&config.watch.subscription).await?;

    tracing::info!(
        subscription = %config.watch.subscription,
        root = %watch.root().display(),
        "Waiting for changes"
    );

    loop {
        tokio::select! {
            item = notifications.recv() => match item {
                Some(Ok(cn)) => {
                    if show_fresh || !cn.is_fresh_instance {
                        print!("{}", render(cn));
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Skipping undecodable notification");
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C");
                client.close().await;
                return Ok(());
            }
        }
    }

    match client.terminal_error() {
        Some(e) if e.is_fatal() && !matches!(e, watchman_client::Error::Closed) => {
            Err(Report::new(e).wrap_err("connection to daemon lost"))
        }
        _ => Ok(()),
    }
}

/// Absolute, symlink-free form of the requested directory.
fn resolve_dir(dir: Option<PathBuf>) -> Result<PathBuf> {
    let dir = match dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    std::fs::canonicalize(&dir).wrap_err_with(|| format!("cannot resolve {}", dir.display()))
}

/// Format one notification, files sorted by type then name.
fn render(cn: ChangeNotification) -> String {
    let mut out = format!("Update: (clock={:?})\n", cn.clock);
    let mut files = cn.files;
    files.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));
    for file in &files {
        out.push_str(&render_file(file));
        out.push('\n');
    }
    out.push('\n');
    out
}

fn render_file(file: &File) -> String {
    if file.is_dir() {
        format!("  {:>9}  {}/", file.change, file.name)
    } else if let Some(target) = file.target.as_deref().filter(|_| file.is_symlink()) {
        format!("  {:>9}  {} -> {}", file.change, file.name, target)
    } else {
        format!("  {:>9}  {}", file.change, file.name)
    }
}
