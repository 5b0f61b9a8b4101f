//! Configuration view and validation commands: `draftsync config`.

use anyhow::Result;

use draftsync::config::{DraftsyncConfig, DraftsyncToml};

use super::super::ConfigCommands;

pub fn cmd_config(config: &DraftsyncConfig, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("draftsync Configuration");
            println!("=======================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No draftsync.toml found at {}", config_path.display());
                println!("Using defaults. Run 'draftsync init' to create one.");
            }
            println!();
            println!("Effective values (with env/CLI overrides):");
            println!();
            print_toml(&config.toml);
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No draftsync.toml found. Using defaults (valid).");
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
    }

    Ok(())
}

fn print_toml(toml: &DraftsyncToml) {
    println!("[remote]");
    match &toml.remote.base_url {
        Some(url) => println!("  base_url = \"{}\"", url),
        None => println!("  base_url = (unset)"),
    }
    println!("  token_env = \"{}\"", toml.remote.token_env);
    println!("  timeout_secs = {}", toml.remote.timeout_secs);
    println!();

    println!("[autosave]");
    println!("  enabled = {}", toml.autosave.enabled);
    println!("  debounce_secs = {}", toml.autosave.debounce_secs);
    println!("  ceiling_secs = {}", toml.autosave.ceiling_secs);
    println!();

    println!("[validation]");
    println!("  min_title_len = {}", toml.validation.min_title_len);
    println!("  min_description_len = {}", toml.validation.min_description_len);
    println!();

    println!("[session]");
    match &toml.session.user_email {
        Some(email) => println!("  user_email = \"{}\"", email),
        None => println!("  user_email = (unset)"),
    }
    println!();
}
