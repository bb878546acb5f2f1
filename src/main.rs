#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    run().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("funnel-etl was built without the `cli` feature");
    std::process::exit(1);
}

#[cfg(feature = "cli")]
async fn run() -> anyhow::Result<()> {
    use clap::Parser;
    use funnel_etl::adapters::http::{HttpLookupApi, HttpReportApi};
    use funnel_etl::adapters::storage::LocalStorage;
    use funnel_etl::adapters::time::{SystemClock, TokioSleeper};
    use funnel_etl::config::{CliConfig, ReportConfig};
    use funnel_etl::core::report::Enrichment;
    use funnel_etl::domain::ports::Clock;
    use funnel_etl::utils::{logger, monitor::SystemMonitor, validation::Validate};
    use funnel_etl::{BatchCpfResolver, FunnelReportEngine, SnapshotExporter};
    use std::sync::Arc;

    let cli = CliConfig::parse();

    logger::init_cli_logger(cli.verbose);

    tracing::info!("Starting funnel-etl");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let config = ReportConfig::from_file(&cli.config)?;
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        return Err(e.into());
    }

    let monitor = SystemMonitor::new(cli.monitor);
    if monitor.is_enabled() {
        tracing::info!("🔍 System monitoring enabled");
    }

    let clock = SystemClock;
    let range = cli.resolve_range(clock.now())?;

    let api = HttpReportApi::new(
        config.sources.message_status.spec(),
        config.sources.access_event.spec(),
        config.sources.proposal.spec(),
    );

    let mut engine = FunnelReportEngine::new(api, clock, config.page_cap(), config.funnel_settings())
        .with_min_window(config.min_window());

    if let Some(enrichment) = &config.enrichment {
        tracing::info!("🔍 Enrichment lookup enabled: {}", enrichment.endpoint);
        let resolver = BatchCpfResolver::new(
            Arc::new(HttpLookupApi::new(enrichment.spec())),
            Arc::new(TokioSleeper),
        )
        .with_sequential_threshold(enrichment.sequential_threshold())
        .with_partitions(enrichment.partitions())
        .with_retry(enrichment.retry_attempts(), enrichment.retry_delay())
        .with_query_delay(enrichment.query_delay());

        engine = engine.with_enrichment(Enrichment {
            resolver,
            filters: enrichment.filters.clone().unwrap_or_default(),
        });
    }

    let snapshot = engine.run(range).await;
    monitor.log_stats("Snapshot built");

    let output_path = cli
        .output_path
        .clone()
        .unwrap_or_else(|| config.output_path().to_string());
    let exporter = SnapshotExporter::new(LocalStorage::new(output_path.clone()), output_path);
    let saved = exporter.export(&snapshot).await?;

    tracing::info!("✅ Funnel snapshot completed");
    println!("✅ Funnel snapshot completed");
    println!("📁 Output saved to: {}", saved);
    monitor.log_final_stats();

    Ok(())
}
