//! `flowsmith generate` - client for a running server

use crate::cli::output::{format_error, format_json, format_success};
use crate::cli::GenerateArgs;
use crate::client::{ConnectionQualityMonitor, ConnectivitySource, GenerateClient, HttpTransport};
use crate::config::{FlowsmithConfig, RetryConfig};
use std::sync::Arc;

/// Retry settings from the config file when present, defaults otherwise,
/// with `--max-retries` and `--timeout` applied last.
pub fn retry_settings(args: &GenerateArgs) -> Result<RetryConfig, Box<dyn std::error::Error>> {
    let mut retry = if args.config.exists() {
        FlowsmithConfig::load(Some(&args.config))?.retry
    } else {
        RetryConfig::default()
    };
    if let Some(max_retries) = args.max_retries {
        retry.max_retries = max_retries;
    }
    if let Some(timeout) = args.timeout {
        retry.deadline_seconds = timeout;
    }
    Ok(retry)
}

/// Build a client for `args.server`.
///
/// A one-shot CLI has no platform connectivity feed, so the monitor starts
/// online with the quality implied by `--slow`.
pub fn build_client(args: &GenerateArgs, retry: &RetryConfig) -> GenerateClient {
    let source = ConnectivitySource::new();
    let quality = if args.slow { "slow" } else { "unknown" };
    let (monitor, subscription) = ConnectionQualityMonitor::start(&source, true, quality);
    // No events will ever arrive; the listener is not needed.
    drop(subscription);

    GenerateClient::new(
        args.server.clone(),
        Arc::new(HttpTransport::default()),
        monitor,
    )
    .with_retries(retry.max_retries, retry.base_delay(), retry.max_delay())
    .with_min_deadline(retry.deadline())
}

/// Handle `flowsmith generate`
pub async fn run_generate(args: GenerateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let retry = retry_settings(&args)?;
    let client = build_client(&args, &retry);
    let result = client.generate(&args.prompt).await;

    if args.json {
        println!("{}", format_json(&result)?);
    } else {
        match &result {
            Ok(response) => println!("{}", format_success(&args.server, response)),
            Err(info) => eprintln!("{}", format_error(info)),
        }
    }

    match result {
        Ok(_) => Ok(()),
        Err(info) => Err(info.message.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn args(max_retries: Option<u32>, slow: bool, config: PathBuf) -> GenerateArgs {
        GenerateArgs {
            prompt: "draw a login flow".to_string(),
            server: "http://localhost:3000".to_string(),
            json: false,
            max_retries,
            slow,
            timeout: None,
            config,
        }
    }

    #[test]
    fn test_retry_settings_default_without_file() {
        let retry = retry_settings(&args(None, false, PathBuf::from("missing.toml"))).unwrap();
        assert_eq!(retry.max_retries, 2);
    }

    #[test]
    fn test_retry_settings_flag_overrides_file() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "[retry]\nmax_retries = 4\nbase_delay_ms = 50").unwrap();

        let from_file = retry_settings(&args(None, false, temp.path().to_path_buf())).unwrap();
        assert_eq!(from_file.max_retries, 4);
        assert_eq!(from_file.base_delay(), Duration::from_millis(50));

        let flagged = retry_settings(&args(Some(0), false, temp.path().to_path_buf())).unwrap();
        assert_eq!(flagged.max_retries, 0);
    }

    #[tokio::test]
    async fn test_slow_flag_lengthens_deadline() {
        let retry = RetryConfig {
            deadline_seconds: 0,
            ..RetryConfig::default()
        };
        let normal = build_client(&args(None, false, PathBuf::from("x")), &retry);
        let slow = build_client(&args(None, true, PathBuf::from("x")), &retry);
        assert!(slow.policy().deadline > normal.policy().deadline);
    }

    #[tokio::test]
    async fn test_default_client_waits_past_server_ceiling() {
        let retry = retry_settings(&args(None, false, PathBuf::from("missing.toml"))).unwrap();
        let client = build_client(&args(None, false, PathBuf::from("missing.toml")), &retry);
        let server = crate::config::ServerConfig::default();
        assert!(client.policy().deadline > server.request_timeout());
    }

    #[test]
    fn test_timeout_flag_overrides_deadline() {
        let mut flagged = args(None, false, PathBuf::from("missing.toml"));
        flagged.timeout = Some(45);
        let retry = retry_settings(&flagged).unwrap();
        assert_eq!(retry.deadline(), Duration::from_secs(45));
    }
}
