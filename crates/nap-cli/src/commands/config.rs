//! `nap config`: the global config file.

use std::process::ExitCode;

use clap::{ArgGroup, Subcommand};
use nap_control::ControlError;
use nap_core::validation::validate_domain;

use super::{load_config, state_dir};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Update publishing settings
    #[command(group(ArgGroup::new("toggle").args(["enable", "disable"])))]
    Setup {
        /// Base domain for published apps, e.g. example.com
        #[arg(long)]
        base_domain: Option<String>,
        /// Contact email for Let's Encrypt
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        enable: bool,
        #[arg(long)]
        disable: bool,
    },
    /// Print the config file
    Show,
}

pub fn run(command: ConfigCommand) -> anyhow::Result<ExitCode> {
    let dir = state_dir()?;
    let mut config = load_config(&dir)?;
    match command {
        ConfigCommand::Setup { base_domain, email, enable, disable } => {
            if let Some(domain) = base_domain {
                validate_domain(&domain).map_err(ControlError::from)?;
                config.publishing.base_domain = domain;
            }
            if let Some(email) = email {
                if !email.contains('@') {
                    return Err(ControlError::Validation(format!("invalid email '{email}'")).into());
                }
                config.publishing.email = email;
            }
            if enable {
                config.publishing.enabled = true;
            }
            if disable {
                config.publishing.enabled = false;
            }
            if config.publishing.enabled {
                config.validate_publishing().map_err(ControlError::from)?;
            }
            config.save(&dir.config_file()).map_err(ControlError::from)?;
            println!("✓ Saved {}", dir.config_file().display());
        }
        ConfigCommand::Show => {
            print!("{}", config.to_toml_string().map_err(ControlError::from)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}
