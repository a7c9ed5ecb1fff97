//! DUET client entry point.
//!
//! ```text
//! duet-client --config client.toml [report|refresh|log|selection [ID|--clear]|reset]
//! ```

use color_eyre::eyre::{eyre, Result, WrapErr};
use duet_client::{ClientConfig, ClientSession};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

enum Command {
    Report,
    Refresh,
    Log,
    ShowSelection,
    SetSelection(Option<String>),
    Reset,
}

fn parse_command() -> Result<Command> {
    let mut positional = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            args.next();
            continue;
        }
        positional.push(arg);
    }

    match positional.first().map(String::as_str) {
        None | Some("report") => Ok(Command::Report),
        Some("refresh") => Ok(Command::Refresh),
        Some("log") => Ok(Command::Log),
        Some("selection") => match positional.get(1).map(String::as_str) {
            None => Ok(Command::ShowSelection),
            Some("--clear") => Ok(Command::SetSelection(None)),
            Some(id) => Ok(Command::SetSelection(Some(id.to_string()))),
        },
        Some("reset") => Ok(Command::Reset),
        Some(other) => Err(eyre!("unknown command: {}", other)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let command = parse_command()?;
    let config = ClientConfig::load().wrap_err("loading client configuration")?;
    let session = ClientSession::start(&config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let persist_loop = session.persister().spawn_persist_loop(
        session.cache(),
        config.persistence.persist_interval(),
        shutdown_rx,
    );

    let is_reset = matches!(command, Command::Reset);
    let result = run(&session, command).await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = persist_loop.await {
        tracing::warn!(error = %e, "Persist loop ended abnormally");
    }
    if is_reset {
        // The final flush must not bring the snapshot back.
        session.persister().remove();
    }
    result
}

async fn run(session: &ClientSession, command: Command) -> Result<()> {
    match command {
        Command::Report => {
            if let Some(cached) = session.cached_report() {
                println!(
                    "cached: {} records (tier: {})",
                    cached.total_records.unwrap_or(0),
                    session.snapshot_tier()
                );
            }
            let report = session.fetch_report().await?;
            match (report.ok, report.has_file) {
                (true, Some(true)) => {
                    let sources = report.sources.unwrap_or_default();
                    println!(
                        "latest: {} records (report134: {}, report151: {})",
                        report.total_records.unwrap_or(0),
                        sources.report134_count,
                        sources.report151_count
                    );
                    if let Some(file) = report.file {
                        println!(
                            "file: {} ({} bytes, updated {})",
                            file.name, file.size, file.universal_last_update
                        );
                    }
                }
                (true, _) => println!("no combined report has been cached yet"),
                (false, _) => {
                    return Err(eyre!(
                        "cache read failed: {}",
                        report.reason.unwrap_or_else(|| "unknown".to_string())
                    ))
                }
            }
        }
        Command::Refresh => {
            let response = session.refresh().await?;
            println!("{}", response.message);
            if !response.success {
                if let Some(kind) = response.error {
                    return Err(eyre!("refresh failed [{}]", kind));
                }
            }
        }
        Command::Log => {
            for line in session.run_log().await?.log {
                println!("{}", line);
            }
        }
        Command::ShowSelection => {
            let selection = session.active_selection().await?;
            println!("{}", selection.as_deref().unwrap_or("(none)"));
        }
        Command::SetSelection(id) => {
            let selection = session.set_active_selection(id.as_deref()).await?;
            println!("{}", selection.as_deref().unwrap_or("(none)"));
        }
        Command::Reset => {
            session.reset();
            println!("local cache cleared");
        }
    }
    Ok(())
}
