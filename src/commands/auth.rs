//! Login and logout.
//!
//! `act login` exchanges credentials for a bearer token and stores it under
//! the `auth` section of the config file. `act logout` removes the token.

use activity_sync_core::auth::mask_token;
use activity_sync_core::{AuthClient, Credentials, User};
use clap::Args;
use serde_yaml::{Mapping, Value};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::Config;

/// Errors that can occur while persisting the session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to access config file '{}': {1}", .0.display())]
    Io(PathBuf, io::Error),

    #[error("Failed to parse config file '{}': {1}", .0.display())]
    Yaml(PathBuf, serde_yaml::Error),

    #[error("Invalid config format in '{}'", .0.display())]
    Format(PathBuf),
}

#[derive(Args)]
pub struct LoginCommand {
    /// Account email (defaults to the last one used)
    #[arg(long)]
    email: Option<String>,

    /// Password (prompted when omitted)
    #[arg(long)]
    password: Option<String>,
}

impl LoginCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let email = match self.email.as_ref().or(config.auth.email.as_ref()) {
            Some(email) => email.clone(),
            None => prompt("Email: ")?,
        };
        let password = match &self.password {
            Some(password) => password.clone(),
            None => prompt("Password: ")?,
        };

        let client = AuthClient::new(config.api_url.value.clone());
        let user = client.login(&Credentials::new(&email, password)).await?;

        let config_path = config.writable_path();
        save_session(&email, &user, &config_path)?;
        tracing::info!("stored token in {}", config_path.display());

        println!(
            "Logged in as {} ({}), token {}",
            user.display_name,
            user.user_name,
            mask_token(&user.token)
        );
        Ok(())
    }
}

/// Remove the stored token from config
pub fn logout(config: &Config) -> Result<(), SessionError> {
    let config_path = config.writable_path();

    if !config_path.exists() {
        println!("Already logged out (no config file).");
        return Ok(());
    }

    clear_session(&config_path)?;
    println!("Logged out.");
    Ok(())
}

fn prompt(label: &str) -> io::Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn read_yaml(path: &Path) -> Result<Value, SessionError> {
    if !path.exists() {
        return Ok(Value::Mapping(Mapping::new()));
    }
    let contents =
        std::fs::read_to_string(path).map_err(|e| SessionError::Io(path.to_path_buf(), e))?;
    if contents.trim().is_empty() {
        return Ok(Value::Mapping(Mapping::new()));
    }
    serde_yaml::from_str(&contents).map_err(|e| SessionError::Yaml(path.to_path_buf(), e))
}

fn write_yaml(path: &Path, yaml: &Value) -> Result<(), SessionError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SessionError::Io(path.to_path_buf(), e))?;
    }
    let contents =
        serde_yaml::to_string(yaml).map_err(|e| SessionError::Yaml(path.to_path_buf(), e))?;
    std::fs::write(path, contents).map_err(|e| SessionError::Io(path.to_path_buf(), e))
}

/// Writes `auth.email` and `auth.token`, keeping every other key.
fn save_session(email: &str, user: &User, path: &Path) -> Result<(), SessionError> {
    let mut yaml = read_yaml(path)?;
    let mapping = yaml
        .as_mapping_mut()
        .ok_or_else(|| SessionError::Format(path.to_path_buf()))?;

    let auth_key = Value::String("auth".to_string());
    if !matches!(mapping.get(&auth_key), Some(Value::Mapping(_))) {
        mapping.insert(auth_key.clone(), Value::Mapping(Mapping::new()));
    }

    if let Some(auth) = mapping.get_mut(&auth_key).and_then(Value::as_mapping_mut) {
        auth.insert(
            Value::String("email".to_string()),
            Value::String(email.to_string()),
        );
        auth.insert(
            Value::String("token".to_string()),
            Value::String(user.token.clone()),
        );
    }

    write_yaml(path, &yaml)
}

/// Removes `auth.token`; the email is kept for the next login.
fn clear_session(path: &Path) -> Result<(), SessionError> {
    let mut yaml = read_yaml(path)?;

    if let Some(auth) = yaml
        .as_mapping_mut()
        .and_then(|m| m.get_mut(Value::String("auth".to_string())))
        .and_then(Value::as_mapping_mut)
    {
        auth.remove(Value::String("token".to_string()));
    }

    write_yaml(path, &yaml)
}
