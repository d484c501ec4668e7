use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use funnel_report::config::preview;
use funnel_report::{
    Config, CsvFileSink, JsonSink, RefreshingToken, ReportRun, ReportSettings, ReportSink,
    ReportWindow, SheetsSink, StaticToken, TokenFile, TokenProvider,
};
use listok_client::{ListokClient, OAuthClient, ReqwestTransport, RetryingClient};

const OAUTH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SinkKind {
    Csv,
    Json,
    Sheets,
}

/// Build the per-source lead funnel report for a date range.
#[derive(Debug, Parser)]
#[command(name = "funnel-report", version)]
struct Args {
    /// First day of the report window (YYYY-MM-DD or a full timestamp).
    #[arg(long)]
    start: String,

    /// Last day of the report window. A bare date covers the whole day.
    #[arg(long)]
    end: String,

    #[arg(long, value_enum, default_value = "csv")]
    sink: SinkKind,

    /// File path (csv/json, `-` for stdout with json) or spreadsheet id.
    #[arg(long, default_value = "report.csv")]
    target: String,

    /// Override REPORT_CONCURRENCY.
    #[arg(long)]
    concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("funnel_report=info".parse()?)
                .add_directive("listok_client=info".parse()?),
        )
        .init();

    let args = Args::parse();
    info!("Funnel report starting...");

    let config = Config::from_env()?;
    let window = ReportWindow::parse(&args.start, &args.end)?;

    let crm = ListokClient::new(
        &config.base_url,
        config.retry_policy(),
        config.page_settings(),
    )?;
    let credentials = CrmCredentials::from_config(&config).await?;
    let sink = report_sink(args.sink, &config)?;

    let settings = ReportSettings {
        concurrency: args.concurrency.unwrap_or(config.concurrency).max(1),
        locale: config.locale,
        ..Default::default()
    };

    let outcome = ReportRun::new(&crm, settings)
        .publish(
            credentials.provider(),
            sink.as_ref(),
            &args.target,
            window,
            config.exclusions(),
        )
        .await;
    // the grant spends the old refresh token even when the run fails
    credentials.keep_rotation(&config).await;
    let summary = outcome?;

    info!(
        contacts_fetched = summary.contacts_fetched,
        contacts_in_window = summary.contacts_in_window,
        leads = summary.leads_counted,
        enrichment_failures = summary.enrichment_failures,
        rows = summary.rows,
        "Funnel report complete"
    );
    Ok(())
}

enum CrmCredentials {
    Static(StaticToken),
    Refreshing(RefreshingToken<ReqwestTransport>),
}

impl CrmCredentials {
    /// A refresh grant when a refresh token and the client credentials are
    /// configured, otherwise the pre-issued access token. A token in
    /// LISTOK_TOKEN_FILE wins over LISTOK_REFRESH_TOKEN.
    async fn from_config(config: &Config) -> Result<Self> {
        let stored = match &config.token_file {
            Some(path) => TokenFile::new(path).load().await?,
            None => None,
        };
        if let (Some(refresh_token), Some(credentials)) = (
            stored.or_else(|| config.refresh_token.clone()),
            config.oauth_credentials(),
        ) {
            let http =
                RetryingClient::new(ReqwestTransport::new(OAUTH_TIMEOUT)?, config.retry_policy());
            let oauth = OAuthClient::new(http, &config.base_url, credentials);
            info!("Using refresh token grant for CRM access");
            return Ok(Self::Refreshing(RefreshingToken::new(oauth, refresh_token)));
        }
        match &config.access_token {
            Some(token) => Ok(Self::Static(StaticToken::new(token.clone()))),
            None => bail!(
                "No CRM credentials: set LISTOK_ACCESS_TOKEN, or LISTOK_REFRESH_TOKEN with \
                 LISTOK_CLIENT_ID and LISTOK_CLIENT_SECRET"
            ),
        }
    }

    fn provider(&self) -> &dyn TokenProvider {
        match self {
            Self::Static(token) => token,
            Self::Refreshing(token) => token,
        }
    }

    /// Save a rotated refresh token, or tell the operator the configured
    /// one is spent. Never logs the token itself.
    async fn keep_rotation(&self, config: &Config) {
        let Self::Refreshing(provider) = self else {
            return;
        };
        match &config.token_file {
            Some(path) => {
                if let Err(e) = provider.save_rotation(&TokenFile::new(path)).await {
                    error!(
                        path = %path.display(),
                        error = ?e,
                        "Failed to save rotated refresh token, the next run needs a fresh one"
                    );
                }
            }
            None => {
                if let Some(rotated) = provider.rotated_refresh_token().await {
                    warn!(
                        token = %preview(&rotated),
                        "CRM rotated the refresh token and LISTOK_TOKEN_FILE is not set. \
                         LISTOK_REFRESH_TOKEN is now spent; set LISTOK_TOKEN_FILE to keep \
                         rotated tokens between runs"
                    );
                }
            }
        }
    }
}

fn report_sink(kind: SinkKind, config: &Config) -> Result<Box<dyn ReportSink>> {
    Ok(match kind {
        SinkKind::Csv => Box::new(CsvFileSink),
        SinkKind::Json => Box::new(JsonSink),
        SinkKind::Sheets => {
            let token = config
                .sheets_token
                .clone()
                .context("GOOGLE_SHEETS_TOKEN is required for the sheets sink")?;
            Box::new(SheetsSink::new(token))
        }
    })
}
