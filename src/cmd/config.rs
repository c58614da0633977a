//! Configuration view and validation commands for `storyforge config`.

use anyhow::{Context, Result};

use super::super::ConfigCommands;
use storyforge::config::{StoryforgeConfig, StoryforgeToml};

pub fn cmd_config(config: &StoryforgeConfig, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Storyforge Configuration");
            println!("========================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No storyforge.toml found at {}", config_path.display());
                println!("Using default configuration.");
            }
            println!();

            let rendered = toml::to_string_pretty(&config.toml)
                .context("Failed to render configuration")?;
            for line in rendered.lines() {
                println!("  {}", line);
            }
            println!();

            println!("Effective values (with env/CLI overrides):");
            println!("  data_dir = \"{}\"", config.data_dir.display());
            println!("  db_path = \"{}\"", config.db_path().display());
            println!("  lock_dir = \"{}\"", config.lock_dir().display());
            println!("  max_iterations = {}", config.max_iterations());
            println!("  log_filter = \"{}\"", config.log_filter());
            println!();

            if !config_path.exists() {
                println!("Run 'storyforge config init' to create a storyforge.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let warnings = config.validate();
            if warnings.is_empty() {
                if config_path.exists() {
                    println!("Configuration is valid.");
                } else {
                    println!("No storyforge.toml found. Using defaults (valid).");
                }
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!(
                    "storyforge.toml already exists at {}",
                    config_path.display()
                );
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&config.data_dir).with_context(|| {
                format!(
                    "Failed to create data directory: {}",
                    config.data_dir.display()
                )
            })?;
            StoryforgeToml::default().save(&config_path)?;

            println!("Created storyforge.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [storage] db_file, lock_dir");
            println!("  - [workflow] max_iterations, default_mode");
            println!("  - [request] defaults for new requests");
            println!();
        }
    }

    Ok(())
}
