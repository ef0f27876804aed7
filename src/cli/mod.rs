//! Command line interface.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::debug;

use crate::config::{Config, ConfigError, Settings};
use crate::crypto::GpgEncryptor;
use crate::harvest::{Harvest, HarvestReport};
use crate::portal::SessionClient;
use crate::report::{ConsoleReporter, Reporter};
use crate::upload::{BoxClient, BOX_UPLOAD_URL};

#[derive(Parser, Debug)]
#[command(name = "paycheck")]
#[command(about = "Harvest payslips from the portal, encrypt them and ship them to Box")]
#[command(version)]
pub struct Cli {
    /// Create an encrypted version of every document
    #[arg(short = 'c', long)]
    pub encrypt: bool,

    /// Upload the encrypted files to Box
    #[arg(short = 'u', long, requires = "encrypt")]
    pub upload: bool,

    /// Config file (defaults to ~/.config/paycheck/config.json)
    #[arg(long, env = "PAYCHECK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Maximum documents processed at once per stage (default: no limit)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_concurrency: Option<u32>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Parse arguments and run a harvest with console output.
///
/// Exits with status 1 on a fatal error, which the console has already shown.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Err(e) = execute(cli, Arc::new(ConsoleReporter)).await {
        debug!("Run aborted: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

/// Run a harvest for already parsed arguments.
///
/// Every returned error has been passed to `reporter` exactly once: setup
/// failures here, the rest by [`Harvest::run`].
pub async fn execute(cli: Cli, reporter: Arc<dyn Reporter>) -> anyhow::Result<HarvestReport> {
    let (settings, harvest, client) = match setup(&cli, &reporter).await {
        Ok(parts) => parts,
        Err(e) => {
            reporter.error(&format!("{:#}", e));
            return Err(e);
        }
    };

    let report = harvest
        .run(client, &settings.username, &settings.password)
        .await?;
    Ok(report)
}

async fn setup(
    cli: &Cli,
    reporter: &Arc<dyn Reporter>,
) -> anyhow::Result<(Settings, Harvest, SessionClient)> {
    let settings = Config::load(cli.config.as_deref())
        .await?
        .into_settings()?;
    settings.audit(reporter.as_ref())?;
    debug!(repository = ?settings.repository, tmp_dir = ?settings.tmp_dir, "Resolved settings");

    let harvest = build_harvest(cli, &settings, Arc::clone(reporter))?;

    let client = SessionClient::with_user_agent(
        &settings.base_url,
        &settings.endpoint,
        settings.request_timeout,
        settings.user_agent.as_deref(),
    )
    .context("Failed to create portal client")?;

    Ok((settings, harvest, client))
}

fn build_harvest(
    cli: &Cli,
    settings: &Settings,
    reporter: Arc<dyn Reporter>,
) -> anyhow::Result<Harvest> {
    let max_concurrency = cli
        .max_concurrency
        .map(|n| n as usize)
        .or(settings.max_concurrency);

    let mut harvest = Harvest::new(&settings.repository, &settings.tmp_dir, reporter)
        .with_max_concurrency(max_concurrency);

    if cli.encrypt {
        let encryptor = GpgEncryptor::new(&settings.public_key)
            .context("Encryption requested but not available")?;
        harvest = harvest.with_encryptor(Arc::new(encryptor));
    }

    if cli.upload {
        if !settings.has_upload_target() {
            return Err(ConfigError::Missing("box_token/box_target_id").into());
        }
        let base_url = settings.box_upload_url.as_deref().unwrap_or(BOX_UPLOAD_URL);
        let uploader =
            BoxClient::with_base_url(&settings.box_token, base_url, settings.request_timeout)
                .context("Failed to create upload client")?;
        harvest = harvest.with_uploader(Arc::new(uploader), &settings.box_target_id);
    }

    Ok(harvest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::fmt;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Errors(Mutex<Vec<String>>);

    impl Reporter for Errors {
        fn processing(&self, _: &str) {}
        fn ok(&self, _: &str) {}
        fn nok(&self, _: &str) {}
        fn warning(&self, _: &str) {}
        fn error(&self, error: &dyn fmt::Display) {
            self.0.lock().unwrap().push(error.to_string());
        }
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from(["paycheck", "-c", "-u", "--max-concurrency", "8"]).unwrap();
        assert!(cli.encrypt);
        assert!(cli.upload);
        assert_eq!(cli.max_concurrency, Some(8));
    }

    #[test]
    fn test_upload_requires_encrypt() {
        assert!(Cli::try_parse_from(["paycheck", "-u"]).is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(Cli::try_parse_from(["paycheck", "--max-concurrency", "0"]).is_err());
    }

    #[tokio::test]
    async fn test_setup_failure_reported_once() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        let cli = Cli::try_parse_from(["paycheck", "--config", missing.to_str().unwrap()]).unwrap();

        let errors = Arc::new(Errors::default());
        let result = execute(cli, errors.clone()).await;

        assert!(result.is_err());
        let lines = errors.0.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("absent.json"));
    }
}
