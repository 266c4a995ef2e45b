//! Auth commands - obtain and store credentials.

use anyhow::{Context, Result};
use clap::Args;
use symsrv_core::{ServerState, SymbolServer};
use symsrv_server::{Authenticator, OAuthConfig};
use symsrv_store::Settings;
use tracing::info;

use super::{authenticate, connect, connector, token_store};
use crate::output::JsonFormatter;
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the auth command.
#[derive(Args)]
pub struct AuthArgs {
    /// Authorization code from the page at `symsrv auth-url`.
    pub code: String,

    /// Discard stored credentials before exchanging the code.
    #[arg(long)]
    pub force: bool,
}

/// Prints the authorization URL.
pub fn run_url(settings: &Settings, cli: &Cli) -> Result<ExitCode> {
    if settings.oauth.client_id.is_empty() {
        anyhow::bail!("No OAuth client_id configured (see `symsrv config path`)");
    }
    let authenticator = Authenticator::new(
        OAuthConfig::from(&settings.oauth),
        connector(settings),
        token_store(cli),
    );
    let url = authenticator.authorization_url();

    match cli.format {
        OutputFormat::Text => {
            println!("Visit this URL, sign in, and copy the code shown:");
            println!();
            println!("  {url}");
            println!();
            println!("Then run: symsrv auth <code>");
        }
        OutputFormat::Json => {
            let output = serde_json::json!({ "url": url });
            println!("{}", JsonFormatter::new(cli.pretty).format(&output)?);
        }
    }
    Ok(ExitCode::Success)
}

/// Exchanges an authorization code and persists the refresh token.
pub async fn run(args: &AuthArgs, settings: &Settings, cli: &Cli) -> Result<ExitCode> {
    let store = token_store(cli);
    if args.force {
        store
            .clear()
            .await
            .context("Failed to remove stored credentials")?;
        info!(path = %store.path().display(), "Removed stored credentials");
    }

    let server = connect(settings, cli).await?;
    if server.state() == ServerState::Ready {
        if !cli.quiet {
            println!("Already authenticated (use --force to replace the stored credentials)");
        }
        return Ok(ExitCode::Success);
    }

    authenticate(server.as_ref(), &args.code)
        .await
        .context("Authentication failed")?;

    match cli.format {
        OutputFormat::Text => {
            if !cli.quiet {
                println!("Authenticated. Credentials stored in {}", store.path().display());
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "authenticated": true,
                "tokenPath": store.path().display().to_string(),
            });
            println!("{}", JsonFormatter::new(cli.pretty).format(&output)?);
        }
    }
    Ok(ExitCode::Success)
}
