use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use listok_client::{OAuthCredentials, PageSettings, RetryPolicy, DEFAULT_BASE_URL};

use crate::context::ExclusionList;
use crate::report::FormulaLocale;

/// Report configuration loaded from environment variables.
/// Secrets plus tuning knobs; the report window comes from the command line.
#[derive(Debug, Clone)]
pub struct Config {
    // CRM
    pub base_url: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Holds the current refresh token across runs. Read before
    /// `refresh_token` and rewritten when the CRM rotates it.
    pub token_file: Option<PathBuf>,

    // Pipeline
    pub concurrency: usize,
    pub page_size: usize,
    pub inter_page_delay: Duration,
    pub max_retries: u32,
    pub excluded_passes: Option<Vec<String>>,
    pub locale: FormulaLocale,

    // Output
    pub sheets_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.log_keys();
        Ok(config)
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            base_url: var("LISTOK_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            access_token: var("LISTOK_ACCESS_TOKEN"),
            refresh_token: var("LISTOK_REFRESH_TOKEN"),
            client_id: var("LISTOK_CLIENT_ID"),
            client_secret: var("LISTOK_CLIENT_SECRET"),
            token_file: var("LISTOK_TOKEN_FILE").map(PathBuf::from),
            concurrency: parse_or(var("REPORT_CONCURRENCY"), "REPORT_CONCURRENCY", 1)?,
            page_size: parse_or(var("REPORT_PAGE_SIZE"), "REPORT_PAGE_SIZE", 50)?,
            inter_page_delay: Duration::from_millis(parse_or(
                var("REPORT_INTER_PAGE_DELAY_MS"),
                "REPORT_INTER_PAGE_DELAY_MS",
                500,
            )?),
            max_retries: parse_or(var("REPORT_MAX_RETRIES"), "REPORT_MAX_RETRIES", 3)?,
            excluded_passes: var("REPORT_EXCLUDED_PASSES").map(|raw| {
                raw.split('|')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            }),
            locale: match var("REPORT_LOCALE") {
                Some(raw) => raw.parse().map_err(anyhow::Error::msg)?,
                None => FormulaLocale::default(),
            },
            sheets_token: var("GOOGLE_SHEETS_TOKEN"),
        };

        if config.concurrency == 0 {
            bail!("REPORT_CONCURRENCY must be at least 1");
        }
        if config.page_size == 0 {
            bail!("REPORT_PAGE_SIZE must be at least 1");
        }
        if config.max_retries == 0 {
            bail!("REPORT_MAX_RETRIES must be at least 1");
        }
        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().with_max_attempts(self.max_retries)
    }

    pub fn page_settings(&self) -> PageSettings {
        PageSettings {
            page_size: self.page_size,
            inter_page_delay: self.inter_page_delay,
        }
    }

    /// Configured exclusions, or the built-in trial/void pass names.
    pub fn exclusions(&self) -> ExclusionList {
        match &self.excluded_passes {
            Some(names) => ExclusionList::new(names.iter().cloned()),
            None => ExclusionList::default(),
        }
    }

    /// Client credentials, when both halves are set.
    pub fn oauth_credentials(&self) -> Option<OAuthCredentials> {
        Some(OAuthCredentials {
            client_id: self.client_id.clone()?,
            client_secret: self.client_secret.clone()?,
        })
    }

    fn log_keys(&self) {
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) => preview(v),
                None => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  LISTOK_BASE_URL: {}", self.base_url);
        tracing::info!("  LISTOK_ACCESS_TOKEN: {}", preview_opt(&self.access_token));
        tracing::info!("  LISTOK_REFRESH_TOKEN: {}", preview_opt(&self.refresh_token));
        tracing::info!("  LISTOK_CLIENT_ID: {}", preview_opt(&self.client_id));
        match &self.token_file {
            Some(path) => tracing::info!("  LISTOK_TOKEN_FILE: {}", path.display()),
            None => tracing::info!("  LISTOK_TOKEN_FILE: <not set>"),
        }
        tracing::info!("  GOOGLE_SHEETS_TOKEN: {}", preview_opt(&self.sheets_token));
        tracing::info!(
            concurrency = self.concurrency,
            page_size = self.page_size,
            max_retries = self.max_retries,
            excluded_passes = self.exclusions().len(),
            "  Pipeline settings"
        );
    }
}

/// First few characters and the length. Safe to log for secrets.
pub fn preview(val: &str) -> String {
    // too short to show any of it
    if val.len() <= 10 {
        return format!("({} chars)", val.len());
    }
    match val.get(..5) {
        Some(head) => format!("{}...({} chars)", head, val.len()),
        None => format!("({} chars)", val.len()),
    }
}

fn parse_or<N>(raw: Option<String>, key: &str, default: N) -> Result<N>
where
    N: std::str::FromStr,
    N::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got {raw:?}")),
        None => Ok(default),
    }
}
