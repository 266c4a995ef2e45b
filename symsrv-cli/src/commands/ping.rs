//! Ping command - blocking reachability probe of the storage host.

use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use symsrv_fetch::{Method, ReqwestConnector, Transport};
use symsrv_store::Settings;
use tracing::debug;

use crate::output::JsonFormatter;
use crate::{Cli, ExitCode, OutputFormat};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PingOutput {
    url: String,
    status: u16,
    elapsed_ms: u64,
}

/// URL probed for `storage_host`.
pub fn probe_url(storage_host: &str) -> String {
    let host = storage_host.trim_end_matches('/');
    if host.contains("://") {
        format!("{host}/")
    } else {
        format!("https://{host}/")
    }
}

/// Sends one HEAD request on the calling thread, outside any runtime.
fn ping_blocking(url: &str, timeout: Duration) -> Result<PingOutput> {
    let mut transport = Transport::new(Rc::new(ReqwestConnector::with_timeout(timeout)))?;
    transport.set_url(url).set_method(Method::Head);

    let started = Instant::now();
    let response = transport
        .perform_blocking()
        .with_context(|| format!("Storage host unreachable: {url}"))?;
    let elapsed = started.elapsed();
    debug!(status = response.status, "Ping response");

    Ok(PingOutput {
        url: url.to_string(),
        status: response.status,
        elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
    })
}

/// Runs the ping command.
///
/// Any HTTP status counts as reachable; only transport failures are errors.
pub async fn run(settings: &Settings, cli: &Cli) -> Result<ExitCode> {
    let url = probe_url(&settings.storage_host);
    let timeout = Duration::from_secs(settings.request_timeout_secs);

    // The blocking transport builds its own runtime, so it must run off this one.
    let output = tokio::task::spawn_blocking(move || ping_blocking(&url, timeout))
        .await
        .context("Ping task failed")??;

    match cli.format {
        OutputFormat::Text => {
            if !cli.quiet {
                println!(
                    "{} responded with HTTP {} in {} ms",
                    output.url, output.status, output.elapsed_ms
                );
            }
        }
        OutputFormat::Json => println!("{}", JsonFormatter::new(cli.pretty).format(&output)?),
    }
    Ok(ExitCode::Success)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_url() {
        assert_eq!(probe_url("storage.googleapis.com"), "https://storage.googleapis.com/");
        assert_eq!(probe_url("http://127.0.0.1:8080/"), "http://127.0.0.1:8080/");
    }

    #[test]
    fn test_ping_unreachable_host() {
        let err = ping_blocking("http://127.0.0.1:9/", Duration::from_secs(2)).unwrap_err();
        assert!(err.to_string().contains("unreachable"));
    }
}
