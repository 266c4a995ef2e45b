//! Fetch and check commands.

use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use futures::future::join_all;
use symsrv_core::{DownloadObserver, FetchRequest, FetchResult, FileType};
use symsrv_fetch::RetryStrategy;
use symsrv_server::DownloadSession;
use symsrv_store::Settings;
use tracing::{info, warn};

use super::{check_one, connect_ready, fetch_one, session};
use crate::output::{CheckOutput, FetchOutput, JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the check command.
#[derive(Args)]
pub struct CheckArgs {
    /// Hex build IDs.
    #[arg(required = true)]
    pub build_ids: Vec<String>,

    /// Check the binary instead of its debug info.
    #[arg(long, short)]
    pub binary: bool,
}

/// Arguments for the fetch command.
#[derive(Args)]
pub struct FetchArgs {
    /// Hex build IDs.
    #[arg(required = true)]
    pub build_ids: Vec<String>,

    /// Fetch the binary instead of its debug info.
    #[arg(long, short)]
    pub binary: bool,

    /// Retries after a transient failure (network errors, 5xx).
    #[arg(long, short, default_value = "0")]
    pub retries: u32,

    /// Seconds before the first retry; doubles on each further retry.
    #[arg(long, default_value = "1")]
    pub retry_delay: u64,
}

fn requests(build_ids: &[String], binary: bool) -> Vec<FetchRequest> {
    let file_type = if binary {
        FileType::Binary
    } else {
        FileType::DebugInfo
    };
    build_ids
        .iter()
        .map(|id| FetchRequest::new(id.clone(), file_type))
        .collect()
}

// ============================================================================
// Progress
// ============================================================================

/// Reports batch start and end on stderr.
struct Progress {
    quiet: bool,
}

impl DownloadObserver for Progress {
    fn on_downloads_started(&self) {
        if !self.quiet {
            eprintln!("Downloading...");
        }
    }

    fn on_downloads_stopped(&self, num_succeeded: usize, num_failed: usize) {
        info!(num_succeeded, num_failed, "Downloads finished");
        if !self.quiet {
            eprintln!("Done: {num_succeeded} succeeded, {num_failed} failed");
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Fetches `request`, retrying as `strategy` advises. Returns the final
/// result and the number of attempts made.
pub async fn fetch_with_retry(
    session: &DownloadSession,
    request: FetchRequest,
    strategy: &RetryStrategy,
) -> (FetchResult, u32) {
    let mut attempt = 1;
    loop {
        let result = fetch_one(session, request.clone()).await;
        match &result {
            Err(e) if strategy.should_retry(attempt, e) => {
                let delay = strategy.delay_for_attempt(attempt);
                warn!(
                    request = %request,
                    error = %e,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Retrying fetch"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            _ => return (result, attempt),
        }
    }
}

/// Runs the fetch command.
pub async fn run(args: &FetchArgs, settings: &Settings, cli: &Cli) -> Result<ExitCode> {
    let server = connect_ready(settings, cli).await?;
    let session = session(&server).with_observer(Rc::new(Progress { quiet: cli.quiet }));
    let strategy = RetryStrategy::new(args.retries.saturating_add(1))
        .with_base_delay(Duration::from_secs(args.retry_delay));

    let requests = requests(&args.build_ids, args.binary);
    let results = join_all(
        requests
            .iter()
            .map(|request| fetch_with_retry(&session, request.clone(), &strategy)),
    )
    .await;

    let outputs: Vec<FetchOutput> = requests
        .iter()
        .zip(&results)
        .map(|(request, (result, attempts))| FetchOutput::new(request, result, *attempts))
        .collect();

    match cli.format {
        OutputFormat::Text => println!("{}", TextFormatter::new(!cli.no_color).format_fetch(&outputs)),
        OutputFormat::Json => println!("{}", JsonFormatter::new(cli.pretty).format_list(&outputs)?),
    }

    if outputs.iter().all(FetchOutput::has_file) {
        Ok(ExitCode::Success)
    } else {
        Ok(ExitCode::Incomplete)
    }
}

/// Runs the check command.
pub async fn run_check(args: &CheckArgs, settings: &Settings, cli: &Cli) -> Result<ExitCode> {
    let server = connect_ready(settings, cli).await?;
    let session = session(&server);

    let requests = requests(&args.build_ids, args.binary);
    let results = join_all(
        requests
            .iter()
            .map(|request| check_one(&session, request.clone())),
    )
    .await;

    let outputs: Vec<CheckOutput> = requests
        .iter()
        .zip(&results)
        .map(|(request, result)| CheckOutput::new(request, result))
        .collect();

    match cli.format {
        OutputFormat::Text => println!("{}", TextFormatter::new(!cli.no_color).format_check(&outputs)),
        OutputFormat::Json => println!("{}", JsonFormatter::new(cli.pretty).format_list(&outputs)?),
    }

    if outputs.iter().all(|o| o.available) {
        Ok(ExitCode::Success)
    } else {
        Ok(ExitCode::Incomplete)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use symsrv_core::SymbolError;
    use symsrv_fetch::SymbolCache;
    use symsrv_server::MockSymbolServer;
    use tokio::task::LocalSet;

    #[test]
    fn test_requests_file_type() {
        let ids = vec!["abc".to_string(), "def".to_string()];
        assert!(requests(&ids, false).iter().all(|r| r.file_type == FileType::DebugInfo));
        assert!(requests(&ids, true).iter().all(|r| r.file_type == FileType::Binary));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_on_terminal_error() {
        LocalSet::new()
            .run_until(async {
                let server = Rc::new(MockSymbolServer::new("syms"));
                let session = DownloadSession::new(server.clone(), SymbolCache::disabled());
                let strategy = RetryStrategy::new(3);

                let (result, attempts) =
                    fetch_with_retry(&session, FetchRequest::binary("abcdef"), &strategy).await;
                assert!(matches!(result, Err(SymbolError::NotFound(_))));
                assert_eq!(attempts, 1);
                assert_eq!(server.fetches().len(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts_transient_errors() {
        LocalSet::new()
            .run_until(async {
                let server = Rc::new(MockSymbolServer::new("syms"));
                server.set_result(
                    "abcdef",
                    FileType::Binary,
                    Err(SymbolError::UnexpectedResponse(503)),
                );
                let session = DownloadSession::new(server.clone(), SymbolCache::disabled());
                let strategy = RetryStrategy::new(3);

                let (result, attempts) =
                    fetch_with_retry(&session, FetchRequest::binary("abcdef"), &strategy).await;
                assert_eq!(result, Err(SymbolError::UnexpectedResponse(503)));
                assert_eq!(attempts, 3);
                assert_eq!(server.fetches().len(), 3);
            })
            .await;
    }
}
