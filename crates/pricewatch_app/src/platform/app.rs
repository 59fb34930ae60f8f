use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use pricewatch_core::{RendererKind, TrackerConfig};
use pricewatch_engine::{
    Browser, ChromiumBrowser, FetchSettings, HttpBrowser, PricePipeline, Scheduler,
};
use pricewatch_logging::{watch_info, watch_warn, LogDestination};
use tokio::sync::watch;

use super::config::{load_config, CONFIG_FILENAME};

const LOG_FILENAME: &str = "pricewatch.log";

pub async fn run_app() -> anyhow::Result<()> {
    pricewatch_logging::initialize(LogDestination::Both, Path::new(LOG_FILENAME));

    let config = load_config(Path::new(CONFIG_FILENAME));
    let browser = build_browser(&config);
    let pipeline = Arc::new(
        PricePipeline::new(&config, browser).context("invalid tracker configuration")?,
    );
    watch_info!(
        "Tracking {} quotes into {:?}, daily at {}",
        pipeline.registry().len(),
        pipeline.store().path(),
        config.schedule.at
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            watch_warn!("Could not listen for Ctrl-C: {}", err);
            // Dropping the sender would stop the scheduler.
            std::future::pending::<()>().await;
        }
        watch_info!("Ctrl-C received; shutting down");
        let _ = shutdown_tx.send(true);
    });

    let scheduler = Scheduler::new(config.schedule, config.run_on_start);
    let job = move || {
        let pipeline = Arc::clone(&pipeline);
        async move {
            let report = pipeline.run().await?;
            watch_info!(
                "Run for {} stored {}/{} prices ({} rows in workbook)",
                report.date,
                report.snapshot.len(),
                pipeline.registry().len(),
                report.store.total_rows
            );
            Ok::<(), pricewatch_engine::PipelineError>(())
        }
    };
    scheduler.run(job, shutdown_rx).await;
    Ok(())
}

fn build_browser(config: &TrackerConfig) -> Arc<dyn Browser> {
    let settings = FetchSettings::from(&config.browser);
    match config.browser.renderer {
        RendererKind::Chromium => Arc::new(ChromiumBrowser::new(&config.browser, settings)),
        RendererKind::Http => Arc::new(HttpBrowser::new(settings)),
    }
}
