//! EaseCI plugin runtime - Main entry point

mod builtin;

use anyhow::Context;
use clap::{Parser, Subcommand};
use easeci_core::{
    artifact_file_name, ContractType, Error, EventType, ExtensionManager, PluginManifest,
    PluginsSettings,
};
use easeci_foundation::PLUGINS_FILE;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// EaseCI plugins - resolve, download, load, and run declared plugins
#[derive(Parser, Debug)]
#[command(name = "easeci-plugins")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to plugins.yml
    #[arg(short, long, default_value = PLUGINS_FILE)]
    plugins_file: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Boot declared plugins and keep them running until Ctrl-C (default)
    Run,
    /// Resolve declared plugins against the plugin directories without loading them
    Check,
    /// Ask the registry whether a newer version exists (all declared plugins by default)
    UpdateCheck {
        name: Option<String>,
        version: Option<String>,
    },
    /// List plugin config descriptors (UUID bindings)
    List,
    /// Build a plugin artifact from a manifest description
    Pack {
        #[arg(long)]
        name: String,
        #[arg(long)]
        version: String,
        /// standalone | extension
        #[arg(long)]
        contract: String,
        /// Entry point the factory resolves
        #[arg(long)]
        entry: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Output directory (defaults to the first plugin directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let settings = load_settings(&args.plugins_file)?;

    match args.command.unwrap_or(Command::Run) {
        Command::Pack {
            name,
            version,
            contract,
            entry,
            description,
            out,
        } => {
            let out = out.unwrap_or_else(|| settings.download_dir().to_path_buf());
            pack_cmd(&name, &version, &contract, &entry, &description, &out)
        }
        command => {
            let manager = ExtensionManager::builder(settings)
                .factory(Arc::new(builtin::factory()))
                .build()
                .await
                .map_err(describe)?;

            match command {
                Command::Check => check_cmd(&manager).await,
                Command::UpdateCheck { name, version } => {
                    update_check_cmd(&manager, name, version).await
                }
                Command::List => list_cmd(&manager).await,
                _ => {
                    let critical = run_cmd(&manager).await?;
                    if critical {
                        std::process::exit(1);
                    }
                    Ok(())
                }
            }
        }
    }
}

/// plugins.yml 로드 - 파일이 없으면 기본 설정
fn load_settings(path: &Path) -> anyhow::Result<PluginsSettings> {
    if path.exists() {
        return PluginsSettings::load(path)
            .with_context(|| format!("Failed to load {}", path.display()));
    }
    warn!(
        "{} not found, using default plugin directory {}",
        path.display(),
        PluginsSettings::default_plugin_dir().display()
    );
    Ok(PluginsSettings::new(PluginsSettings::default_plugin_dir()))
}

fn describe(e: Error) -> anyhow::Error {
    if e.is_user_facing() {
        anyhow::anyhow!("{}", e)
    } else {
        anyhow::Error::new(e).context("EaseCI plugin runtime failed")
    }
}

// ============================================================================
// run
// ============================================================================

/// 부팅 후 Ctrl-C 또는 critical 이벤트까지 대기. critical로 끝나면 true
async fn run_cmd(manager: &ExtensionManager) -> anyhow::Result<bool> {
    let mut critical_events = manager.events().subscribe();

    let mut report = manager.enable_extensions().await;
    println!("{}", report.summary());

    for (plugin, result) in report.wait_downloads().await {
        match result {
            Ok(response) => {
                for message in &response.messages {
                    println!("  [{}] {}", plugin.short_name(), message);
                }
            }
            Err(e) => {
                let hint = if e.is_retryable() { " (retry later)" } else { "" };
                println!("  [{}] download pipeline failed: {}{}", plugin.short_name(), e, hint);
            }
        }
    }

    let started = manager.start_loaded().await.map_err(describe)?;
    for message in &started.messages {
        println!("  {}", message);
    }
    print_state(manager).await?;

    let critical = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Shutdown requested");
            false
        }
        _ = wait_critical(&mut critical_events) => {
            error!("Critical plugin system failure, shutting down");
            true
        }
    };

    let stopped = manager.stop_all().await.map_err(describe)?;
    for message in &stopped.messages {
        println!("  {}", message);
    }
    Ok(critical)
}

async fn wait_critical(events: &mut tokio::sync::broadcast::Receiver<easeci_core::PluginEvent>) {
    loop {
        match events.recv().await {
            Ok(event) if event.event_type == EventType::CriticalFailure => {
                error!("[{}] {}", event.plugin, event.data);
                return;
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!("Missed {} plugin events", skipped),
            Err(RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

async fn print_state(manager: &ExtensionManager) -> anyhow::Result<()> {
    let mut state = serde_json::Map::new();
    for contract in ContractType::ALL {
        state.insert(
            contract.to_string(),
            serde_json::to_value(manager.state(contract).await)?,
        );
    }
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

// ============================================================================
// check / update-check / list
// ============================================================================

async fn check_cmd(manager: &ExtensionManager) -> anyhow::Result<()> {
    let (resolved, unresolved) = manager.resolve().await;

    let mut resolved: Vec<String> = resolved.iter().map(ToString::to_string).collect();
    resolved.sort();
    let mut unresolved: Vec<String> = unresolved.iter().map(|p| p.short_name()).collect();
    unresolved.sort();

    println!("\nResolved ({})", resolved.len());
    for line in &resolved {
        println!("  {}", line);
    }
    println!("\nUnresolved ({})", unresolved.len());
    for line in &unresolved {
        println!("  {}", line);
    }
    println!();
    Ok(())
}

async fn update_check_cmd(
    manager: &ExtensionManager,
    name: Option<String>,
    version: Option<String>,
) -> anyhow::Result<()> {
    let targets: Vec<(String, String)> = match (name, version) {
        (Some(name), Some(version)) => vec![(name, version)],
        (Some(name), None) => {
            let declared = manager
                .settings()
                .declared
                .iter()
                .find(|d| d.name == name)
                .with_context(|| format!("Plugin {} is not declared, pass a version", name))?;
            vec![(name, declared.version.clone())]
        }
        _ => manager
            .settings()
            .declared
            .iter()
            .map(|d| (d.name.clone(), d.version.clone()))
            .collect(),
    };

    for (name, version) in targets {
        match manager.check_for_update(&name, &version).await {
            Ok(check) => println!("{}", serde_json::to_string(&check)?),
            Err(e) => println!("{}:{} - {}", name, version, e),
        }
    }
    Ok(())
}

async fn list_cmd(manager: &ExtensionManager) -> anyhow::Result<()> {
    let descriptors = manager.config().list().await;
    if descriptors.is_empty() {
        println!("No plugin config descriptors in {}", manager.config().path().display());
        return Ok(());
    }

    println!("{:<38} {:<11} {:<24} {:<10} {:<7}", "UUID", "Contract", "Name", "Version", "Enabled");
    println!("{}", "-".repeat(94));
    for (contract, descriptor) in descriptors {
        println!(
            "{:<38} {:<11} {:<24} {:<10} {:<7}",
            descriptor.uuid, contract, descriptor.name, descriptor.version, descriptor.enabled
        );
    }
    Ok(())
}

// ============================================================================
// pack
// ============================================================================

fn pack_cmd(
    name: &str,
    version: &str,
    contract: &str,
    entry: &str,
    description: &str,
    out: &Path,
) -> anyhow::Result<()> {
    let contract: ContractType = contract.parse().map_err(describe)?;
    let manifest = PluginManifest::new(name, version, contract, entry).with_description(description);
    let bytes = manifest.pack(&[]).map_err(describe)?;

    std::fs::create_dir_all(out).with_context(|| format!("Failed to create {}", out.display()))?;
    let path = out.join(artifact_file_name(name, version));
    std::fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Packed {}", path.display());
    Ok(())
}
