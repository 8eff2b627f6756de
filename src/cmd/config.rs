//! Configuration view and validation commands: `deep-research config`.

use anyhow::Result;
use std::path::{Path, PathBuf};

use super::super::ConfigCommands;

pub fn cmd_config(config_path: Option<&Path>, command: Option<ConfigCommands>) -> Result<()> {
    use deep_research::config::{CONFIG_FILE_NAME, Config, ResearchToml};

    let target = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));

    match command {
        None | Some(ConfigCommands::Show) => {
            let config = Config::load(config_path)?;

            println!();
            println!("Research Configuration");
            println!("======================");
            println!();
            match &config.source {
                Some(path) => println!("Config file: {}", path.display()),
                None => {
                    println!("No {} found. Using defaults.", CONFIG_FILE_NAME);
                    println!("Run 'deep-research config init' to create one.");
                }
            }
            println!();
            println!("Effective values (with env overrides):");
            println!();
            print!("{}", toml::to_string_pretty(&config.toml)?);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let config = Config::load(config_path)?;
            if config.source.is_none() {
                println!("No {} found. Checking defaults.", CONFIG_FILE_NAME);
            }
            let warnings = config.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init { force }) => {
            if target.exists() && !force {
                println!("{} already exists at {}", CONFIG_FILE_NAME, target.display());
                println!("Pass --force to overwrite it.");
                return Ok(());
            }

            if let Some(parent) = target.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                std::fs::create_dir_all(parent)?;
            }

            ResearchToml::default().save(&target)?;

            println!("Created {} at {}", CONFIG_FILE_NAME, target.display());
            println!();
            println!("You can now customize:");
            println!("  - [workflow] max_attempts, chapter_concurrency, workspace_dir");
            println!("  - [llm] backend, command, model");
            println!("  - [research] and [search] for web-grounded chapters");
            println!();
        }
    }

    Ok(())
}
