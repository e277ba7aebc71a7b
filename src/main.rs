use clap::Parser;
use rankprobe::app::App;
use rankprobe::cli::Args;
use rankprobe::logging::setup_logging;
use std::process::ExitCode;
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    let app = match App::new(&args) {
        Ok(app) => app,
        Err(e) => {
            // Logging is not configured yet, so this goes straight to stderr.
            eprintln!("rankprobe: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(app.config(), args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_SHORT"),
        target = app.config().target_url.as_str(),
        category = app.config().category.label.as_str(),
        "starting rankprobe"
    );

    app.run().await
}
