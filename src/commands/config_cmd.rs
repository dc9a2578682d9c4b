use activity_sync_core::auth::mask_token;
use clap::{Args, Subcommand};
use std::fs;
use std::io::Write;

use super::OutputFormat;
use crate::config::Config;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

const DEFAULT_CONFIG: &str = r#"# act configuration

# Base URL of the activities API
api_url: http://localhost:5000/api

# Seconds to wait for each API request (default: no limit)
# timeout_secs: 30

# Print a hint to view the record after create/update
navigate_on_persist: true
"#;

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("api_url: {}", config.api_url.value);
                        println!("  source: {}", config.api_url.source);
                        println!();

                        match config.timeout_secs.value {
                            Some(secs) => println!("timeout_secs: {}", secs),
                            None => println!("timeout_secs: none"),
                        }
                        println!("  source: {}", config.timeout_secs.source);
                        println!();

                        println!("navigate_on_persist: {}", config.navigate_on_persist.value);
                        println!("  source: {}", config.navigate_on_persist.source);
                        println!();

                        match &config.auth.token {
                            Some(token) => println!("auth: logged in (token {})", mask_token(token)),
                            None => println!("auth: not logged in"),
                        }
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = config.writable_path();

                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'act config show' to view current configuration.");
                    return Ok(());
                }

                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let mut file = fs::File::create(&config_path)?;
                file.write_all(DEFAULT_CONFIG.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}
