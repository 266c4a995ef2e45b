//! Config command - inspect configuration.

use anyhow::Result;
use clap::{Args, Subcommand};
use symsrv_store::{Settings, SettingsStore, default_cache_dir, default_config_dir};

use super::token_store;
use crate::output::JsonFormatter;
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration.
    Show,

    /// Show configuration paths.
    Path,
}

/// Runs the config command.
pub fn run(args: &ConfigArgs, store: &SettingsStore, cli: &Cli) -> Result<ExitCode> {
    match &args.action {
        ConfigAction::Show => show_config(store, cli)?,
        ConfigAction::Path => show_paths(store, cli)?,
    }
    Ok(ExitCode::Success)
}

/// Settings with the client secret masked.
fn redacted(settings: &Settings) -> Settings {
    let mut settings = settings.clone();
    if !settings.oauth.client_secret.is_empty() {
        settings.oauth.client_secret = "********".to_string();
    }
    settings
}

fn show_config(store: &SettingsStore, cli: &Cli) -> Result<()> {
    let settings = redacted(store.get());

    match cli.format {
        OutputFormat::Text => {
            let or_unset = |value: &str| {
                if value.is_empty() {
                    "(not set)".to_string()
                } else {
                    value.to_string()
                }
            };
            println!("symsrv Configuration");
            println!("{}", "─".repeat(40));
            println!();
            println!("Bucket:          {}", or_unset(&settings.bucket));
            println!("Storage host:    {}", settings.storage_host);
            println!(
                "Symbol cache:    {}",
                settings
                    .symbol_cache_path
                    .as_ref()
                    .map_or_else(|| "(disabled)".to_string(), |p| p.display().to_string())
            );
            println!("Client ID:       {}", or_unset(&settings.oauth.client_id));
            println!("Client secret:   {}", or_unset(&settings.oauth.client_secret));
            println!("Auth server:     {}", settings.oauth.auth_server);
            println!("Token server:    {}", settings.oauth.token_server);
            println!("Scope:           {}", settings.oauth.scope);
            println!("Refresh margin:  {}s", settings.refresh_margin_secs);
            println!("Request timeout: {}s", settings.request_timeout_secs);
            println!("Log level:       {}", settings.log_level);
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format(&settings)?);
        }
    }

    Ok(())
}

fn show_paths(store: &SettingsStore, cli: &Cli) -> Result<()> {
    let config_dir = default_config_dir();
    let token_path = token_store(cli).path().to_path_buf();
    let suggested_cache = default_cache_dir();

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration Paths");
            println!("{}", "─".repeat(40));
            println!();
            println!("Config dir:      {}", config_dir.display());
            println!("Settings file:   {}", store.path().display());
            println!("Refresh token:   {}", token_path.display());
            println!("Suggested cache: {}", suggested_cache.display());
        }
        OutputFormat::Json => {
            let paths = serde_json::json!({
                "config_dir": config_dir.display().to_string(),
                "settings_file": store.path().display().to_string(),
                "refresh_token": token_path.display().to_string(),
                "suggested_cache": suggested_cache.display().to_string(),
            });
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format(&paths)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_masks_secret() {
        let mut settings = Settings::default();
        settings.oauth.client_secret = "hunter2".to_string();
        assert_eq!(redacted(&settings).oauth.client_secret, "********");

        settings.oauth.client_secret.clear();
        assert!(redacted(&settings).oauth.client_secret.is_empty());
    }
}
