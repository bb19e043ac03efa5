//! vaultlink - bridge a host application to a vault-CLI backend.
//!
//! Spawns the vault CLI as a local API server, manages the lock state
//! machine, and tags vault items with back-references.

mod config;
mod prompt;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vaultlink_core::{
    ApiClient, AuthState, ExecutableInstaller, HttpUpdateChannel, MarkerConfig, ProcessHandle,
    ProgressReporter, ReconciliationEngine, SessionController, SessionOptions, VaultApi,
};

/// vaultlink - vault-CLI session controller and item tagger
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the vault's authentication status
    Status,
    /// Log in and pre-authenticate the local server
    Login,
    /// Log out and clean up the local server data
    Logout,
    /// Tag every vault item with its back-reference, resolving one item
    Tag {
        /// Item id to resolve after the pass
        item_id: String,
    },
    /// Fetch a single item as JSON
    Get { item_id: String },
    /// Print the current TOTP code for an item
    Totp { item_id: String },
    /// Check for a newer vault CLI build and install it
    Update,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vaultlink=info".parse()?))
        .init();

    let config = config::Config::load(args.config)?;

    // The update path must not hold a session: a running server pins the
    // binary we are about to overwrite.
    if matches!(args.command, Command::Update) {
        return run_update(&config);
    }

    let api = ApiClient::new(config.serve_port)?;
    let server = ProcessHandle::new(&config.cli_path, &config.app_data_dir, config.serve_port);
    let mut session = SessionController::new(
        api,
        server,
        Box::new(prompt::TerminalPrompt),
        SessionOptions {
            app_data_dir: config.app_data_dir.clone(),
            auto_lock: config.auto_lock,
        },
    );

    match args.command {
        Command::Status => {
            let status = session.status();
            println!("State:  {}", state_label(status.state));
            if let Some(email) = &status.user_email {
                println!("User:   {email}");
            }
            if let Some(server_url) = &status.server_url {
                println!("Server: {server_url}");
            }
            if let Some(last_sync) = &status.last_sync {
                println!("Synced: {last_sync}");
            }
        }
        Command::Login => {
            let status = session.login().context("login failed")?;
            match status.user_email {
                Some(email) => println!("Logged in as {email}."),
                None => println!("Logged in."),
            }
        }
        Command::Logout => {
            session.logout();
            println!("Logged out.");
        }
        Command::Tag { item_id } => {
            let engine = ReconciliationEngine::new(MarkerConfig {
                scheme: config.marker_scheme.clone(),
                field_name: config.marker_field.clone(),
            });
            let mut progress = ConsoleProgress::default();
            let outcome = engine
                .tag_all_items(&mut session, &item_id, &mut progress)
                .context("tagging pass failed")?;
            println!("{} item(s) updated.", outcome.changed);
            match outcome.matched {
                Some(item) => println!("Resolved '{}' to item \"{}\".", item_id, item.name),
                None => println!("No item with id '{item_id}'."),
            }
        }
        Command::Get { item_id } => {
            let item = session
                .run_with_unlocked_vault(|api| api.item(&item_id))
                .context("item fetch failed")?;
            match item {
                Some(item) => println!("{}", serde_json::to_string_pretty(&item)?),
                None => println!("No item with id '{item_id}'."),
            }
        }
        Command::Totp { item_id } => {
            let code = session
                .run_with_unlocked_vault(|api| api.totp(&item_id))
                .context("TOTP fetch failed")?;
            match code {
                Some(code) => println!("{code}"),
                None => println!("No TOTP available for '{item_id}'."),
            }
        }
        Command::Update => unreachable!("handled before the session is built"),
    }

    Ok(())
}

fn run_update(config: &config::Config) -> Result<()> {
    let manifest_url = config
        .update_manifest_url
        .as_deref()
        .context("no update_manifest_url configured")?;

    let channel = HttpUpdateChannel::new(manifest_url)?;
    let mut handle = ProcessHandle::new(&config.cli_path, &config.app_data_dir, config.serve_port);

    match handle.check_for_update(&channel)? {
        Some(location) => {
            println!("Updating vault CLI to {}...", location.version);
            let mut progress = ConsoleProgress::default();
            handle.apply_update(&location, &channel, &ExecutableInstaller, &mut progress)?;
            println!("Vault CLI updated.");
        }
        None => println!("Vault CLI is up to date."),
    }
    Ok(())
}

fn state_label(state: AuthState) -> &'static str {
    match state {
        AuthState::Unauthenticated => "unauthenticated",
        AuthState::Locked => "locked",
        AuthState::Unlocked => "unlocked",
    }
}

/// Progress reporter logging coarse percentage steps.
#[derive(Default)]
struct ConsoleProgress {
    last_percent: u64,
}

impl ProgressReporter for ConsoleProgress {
    fn report(&mut self, fraction: f64) {
        let percent = (fraction.clamp(0.0, 1.0) * 100.0).round() as u64;
        if percent >= self.last_percent + 10 || (percent == 100 && self.last_percent < 100) {
            self.last_percent = percent;
            tracing::info!("progress: {percent}%");
        }
    }
}
