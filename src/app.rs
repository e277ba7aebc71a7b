use crate::cli::Args;
use crate::config::Config;
use crate::document::DocumentAccessor;
use crate::document::chrome::ChromeDocument;
use crate::error::ScrapeError;
use crate::materialize::materialize_all;
use crate::probe::ChartProbe;
use crate::report::Report;
use crate::session::Session;
use crate::sink::OutputSink;
use crate::utils::fmt_duration;
use crate::walker::Walker;
use anyhow::Context;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, info_span, Instrument};

/// Main application struct: configuration plus the report destination.
pub struct App {
    config: Config,
    sink: OutputSink,
}

impl App {
    /// Load configuration, letting CLI flags override file and environment values.
    pub fn new(args: &Args) -> Result<Self, anyhow::Error> {
        let mut config = Config::load(&args.config).context("Failed to load config")?;
        if args.headless {
            config.browser.headless = true;
        }
        if let Some(output) = &args.output {
            config.output = Some(output.clone());
        }
        let sink = OutputSink::from_path(config.output.clone());
        Ok(Self { config, sink })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one extraction against a fresh browser and write the report.
    pub async fn run(self) -> ExitCode {
        let start = Instant::now();
        let doc = match ChromeDocument::launch(&self.config.browser, self.config.timeouts.global) {
            Ok(doc) => doc,
            Err(e) => return fatal(&ScrapeError::Browser(e)),
        };

        let session = Session::new(doc, self.config);
        match run_session(session).await {
            Ok(report) => {
                info!(
                    institutes = report.len(),
                    duration = fmt_duration(start.elapsed()),
                    "Extraction complete"
                );
                self.sink.write_or_fallback(&report);
                ExitCode::SUCCESS
            }
            Err(e) => fatal(&e),
        }
    }
}

/// Run the pipeline over `session`, then close it whether or not the run succeeded.
pub async fn run_session<D: DocumentAccessor>(session: Session<D>) -> Result<Report, ScrapeError> {
    let result = extract(&session).await;
    session.close().await;
    result
}

/// The full pipeline over an open session. Any error here is fatal to the run.
pub async fn extract<D: DocumentAccessor>(session: &Session<D>) -> Result<Report, ScrapeError> {
    let config = session.config();
    let timeouts = &config.timeouts;

    session
        .open(&config.target_url, timeouts.global)
        .instrument(info_span!("open"))
        .await?;
    session
        .dismiss_interstitial(timeouts.interstitial)
        .instrument(info_span!("interstitial"))
        .await;
    session
        .isolate_category(&config.category.disable_all, &config.category.checkbox)
        .instrument(info_span!("isolate_category", category = config.category.label.as_str()))
        .await?;
    materialize_all(session, &config.selectors.all_rows, timeouts.global)
        .instrument(info_span!("materialize"))
        .await?;

    let probe = ChartProbe::new(session);
    let records = Walker::new(session, &probe)
        .walk_institutes()
        .instrument(info_span!("walk"))
        .await?;

    Ok(Report::build(records))
}

fn fatal(e: &ScrapeError) -> ExitCode {
    error!(stage = e.stage().as_str(), error = ?e, "Extraction aborted: {e}");
    ExitCode::FAILURE
}
