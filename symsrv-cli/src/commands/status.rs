//! Status command - server state, counters, and the error log.

use anyhow::Result;
use symsrv_store::Settings;

use super::{connect, session};
use crate::output::{JsonFormatter, StatusOutput, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Runs the status command.
pub async fn run(settings: &Settings, cli: &Cli) -> Result<ExitCode> {
    let server = connect(settings, cli).await?;
    let status = session(&server).status();
    let output = StatusOutput::from(&status);

    match cli.format {
        OutputFormat::Text => println!("{}", TextFormatter::new(!cli.no_color).format_status(&output)),
        OutputFormat::Json => println!("{}", JsonFormatter::new(cli.pretty).format(&output)?),
    }

    if output.state.is_ready() {
        Ok(ExitCode::Success)
    } else {
        Ok(ExitCode::AuthRequired)
    }
}
