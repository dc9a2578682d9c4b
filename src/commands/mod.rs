mod activity;
mod auth;
mod config_cmd;

use clap::ValueEnum;

pub use activity::ActivityCommand;
pub use auth::{logout, LoginCommand};
pub use config_cmd::ConfigCommand;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
