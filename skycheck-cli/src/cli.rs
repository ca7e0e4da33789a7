use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use inquire::{InquireError, Password, PasswordDisplayMode, Text};
use skycheck_core::{Config, WeatherSearchController, client_from_config};
use tracing::debug;

use crate::render::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "skycheck", version, about = "Current weather for any city")]
pub struct Cli {
    /// Log debug output to stderr (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the weatherapi.com API key.
    Configure,

    /// Show current weather for a city.
    Show {
        /// City name, e.g. "São Paulo".
        city: String,
    },

    /// Look up cities one after another until Esc or Ctrl-C.
    Interactive,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Show { city } => show(city).await,
            Command::Interactive => interactive().await,
        }
    }
}

fn configure() -> anyhow::Result<()> {
    let mut config = Config::load_file()?;

    let api_key = Password::new("weatherapi.com API key:")
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Masked)
        .prompt()
        .context("Failed to read API key")?;

    let api_key = api_key.trim();
    if api_key.is_empty() {
        bail!("API key must not be empty");
    }

    config.set_api_key(api_key.to_string());
    config.save()?;

    println!("Saved API key to {}", Config::config_file_path()?.display());
    Ok(())
}

fn controller_from_config() -> anyhow::Result<WeatherSearchController> {
    let config = Config::load()?;
    let client = client_from_config(&config)?;
    debug!(base_url = %config.base_url, policy = ?config.race_policy, "Weather client ready");

    Ok(WeatherSearchController::with_policy(Arc::new(client), config.race_policy))
}

async fn show(city: String) -> anyhow::Result<()> {
    let controller = controller_from_config()?;

    let Some(handle) = controller.search(city) else {
        bail!("City name must not be empty");
    };
    handle.await.context("Weather search task failed")?;

    println!("{}", render(&controller.state()));
    Ok(())
}

async fn interactive() -> anyhow::Result<()> {
    let controller = controller_from_config()?;
    let mut updates = controller.subscribe();

    loop {
        let input = tokio::task::spawn_blocking(|| Text::new("City:").prompt())
            .await
            .context("Prompt task failed")?;

        let city = match input {
            Ok(city) => city,
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => break,
            Err(err) => return Err(err).context("Failed to read city"),
        };

        controller.set_query(city);
        if controller.trigger_search().is_none() {
            continue;
        }

        println!("{}", render(&updates.borrow_and_update()));
        let settled = updates
            .wait_for(|state| !state.is_loading)
            .await
            .context("Search state closed")?
            .clone();
        println!("{}", render(&settled));
    }

    Ok(())
}
