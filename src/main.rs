//! Captive Portal Auto-Login - Main Entry Point

use std::{path::Path, sync::Arc};

use clap::Parser;
use portal_autologin::{
    AutoLoginAgent,
    backend::{CredentialStore, KeyringStore, SystemBackend, lookup_credentials},
    config::{CliArgs, ConfigStore, Settings},
    events::WakeBus,
    manual_login,
};
use secrecy::SecretString;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE_PREFIX: &str = "portal-autologin.log";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Initialize tracing; the guard flushes the log file on exit
    let _guard = init_tracing(args.log_dir.as_deref());
    info!(
        config = ?args.config,
        watcher = !args.no_watcher,
        "Starting portal auto-login"
    );

    let store = match &args.config {
        Some(path) => ConfigStore::new(path),
        None => ConfigStore::default_location()?,
    };

    if args.write_default_config {
        return write_default_config(&store);
    }

    let credentials = Arc::new(KeyringStore::new());
    if args.set_password {
        return set_password(&store, credentials.as_ref(), args.password.as_deref());
    }

    let backend = Arc::new(SystemBackend::new()?);
    info!("Probing connectivity via {}", backend.probe_url());

    if args.login_once {
        let settings = store.load();
        let creds = lookup_credentials(&credentials, &settings.username).await;
        let result = manual_login(backend, &settings, creds.as_ref()).await;
        println!("{}", result);
        return if result.is_success() {
            Ok(())
        } else {
            Err(result.to_string().into())
        };
    }

    // Wake bus and optional platform watcher
    let bus = WakeBus::new();
    if !args.no_watcher && !bus.start_watcher() {
        info!("Network watcher not available, polling only");
    }

    let agent = AutoLoginAgent::new(backend, credentials, store, bus.clone());
    agent.start().await?;
    notify_ready();
    info!("Service started successfully");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully");
        }
        _ = shutdown_signal() => {
            info!("Received SIGTERM, shutting down gracefully");
        }
    }

    info!("Shutting down...");
    agent.stop().await?;
    bus.shutdown();
    Ok(())
}

fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,portal_autologin=debug".into()),
        )
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}

fn write_default_config(store: &ConfigStore) -> Result<(), Box<dyn std::error::Error>> {
    if store.path().exists() {
        info!("Config already exists at {}", store.path().display());
        return Ok(());
    }

    store.save(&Settings::default())?;
    info!("Wrote default config to {}", store.path().display());
    Ok(())
}

fn set_password(
    store: &ConfigStore,
    credentials: &impl CredentialStore,
    password: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = store.load();
    if settings.username.is_empty() {
        return Err(format!("No username configured in {}", store.path().display()).into());
    }

    let Some(password) = password.filter(|p| !p.is_empty()) else {
        return Err("No password given, set PORTAL_AUTOLOGIN_PASSWORD or pass --password".into());
    };

    credentials.set_password(&settings.username, &SecretString::from(password))?;
    info!("Stored password for {}", settings.username);
    Ok(())
}

#[cfg(feature = "systemd")]
fn notify_ready() {
    if let Err(e) = sd_notify::notify(false, &[sd_notify::NotifyState::Ready]) {
        warn!("Failed to notify systemd: {}", e);
    }
}

#[cfg(not(feature = "systemd"))]
fn notify_ready() {}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    // On non-Unix platforms, just wait forever
    std::future::pending::<()>().await
}
