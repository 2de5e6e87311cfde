//! Wiring for the `run`, `history`, and `health` commands.

use anyhow::{Context, Result};
use auto_trade_bot_orchestrator::{classify, Collaborators, Notifier, Orchestrator, StalenessMonitor};
use auto_trade_core::traits::{LedgerStore, NotificationChannel};
use auto_trade_core::ConfigLoader;
use auto_trade_decision_openai::OpenAiDecisionClient;
use auto_trade_exchange_upbit::{UpbitClient, UpbitCredentials};
use auto_trade_ledger::LedgerDatabase;
use auto_trade_news_serpapi::SerpApiNewsClient;
use auto_trade_notify_slack::SlackNotifier;
use auto_trade_web_api::ApiServer;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;

/// Runs the full engine: per-asset schedulers, staleness monitor, web API,
/// and a graceful SIGINT/SIGTERM shutdown path.
pub async fn run_engine(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load_from(config_path).context("failed to load configuration")?;

    let ledger = Arc::new(
        LedgerDatabase::new(&config.database.url, config.database.max_connections).await?,
    );

    // Missing exchange or decision credentials are fatal here, once, at
    // startup; not per cycle.
    let credentials = UpbitCredentials::from_env()?;
    let exchange = Arc::new(UpbitClient::with_credentials(&config.exchange, credentials));
    let decision = Arc::new(OpenAiDecisionClient::from_env(&config.decision, &config.engine)?);

    let news = SerpApiNewsClient::from_env(&config.news)
        .map(|client| Arc::new(client) as Arc<dyn auto_trade_core::traits::NewsProvider>);

    let channel =
        SlackNotifier::from_env(&config.slack).map(|n| Arc::new(n) as Arc<dyn NotificationChannel>);
    let (notifier, notifier_worker) = Notifier::spawn(channel);

    let orchestrator = Arc::new(Orchestrator::new(
        Collaborators {
            exchange,
            decision,
            news,
            ledger: ledger.clone(),
        },
        config.engine.clone(),
        notifier.clone(),
        config.news.limit,
    ));

    let admitted = orchestrator.admit(&config.assets).await?;
    anyhow::ensure!(!admitted.is_empty(), "no valid assets configured");
    tracing::info!(assets = ?admitted, "admitted assets");

    let monitor = StalenessMonitor::new(
        ledger.clone(),
        admitted,
        config.engine.monitor.clone(),
        notifier.clone(),
    );
    let health = monitor.health();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor_task = tokio::spawn(monitor.run(shutdown_rx));

    let ledger_store: Arc<dyn LedgerStore> = ledger;
    let server = ApiServer::new(orchestrator.clone(), ledger_store, health);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.serve(&addr).await {
            tracing::error!(error = %e, "web API server exited");
        }
    });

    orchestrator.start_all().await?;
    tracing::info!("trading engine running");

    wait_for_shutdown_signal().await;
    tracing::info!("shutting down: letting in-flight cycles finish their step");

    orchestrator.shutdown_all().await?;
    let _ = shutdown_tx.send(true);
    let _ = monitor_task.await;
    server_task.abort();
    let _ = server_task.await;

    // The delivery worker exits once every Notifier clone is gone.
    drop(orchestrator);
    drop(notifier);
    if let Some(worker) = notifier_worker {
        let _ = worker.await;
    }

    tracing::info!("shutdown complete");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received Ctrl+C, initiating graceful shutdown");
    }
}

/// Prints recent ledger records for one asset, newest first.
pub async fn print_history(config_path: &str, asset_id: &str, limit: u32) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    let ledger =
        LedgerDatabase::new(&config.database.url, config.database.max_connections).await?;

    let records = ledger.read_recent(asset_id, limit).await?;
    if records.is_empty() {
        println!("no records for {asset_id}");
        return Ok(());
    }

    for record in records {
        println!(
            "{}  {:<4} {:>8}  {:<8}  {}",
            record.cycle_ts.format("%Y-%m-%d %H:%M:%S"),
            record.decision.action.to_string().to_uppercase(),
            record.decision.magnitude,
            record.result.status,
            record.decision.rationale,
        );
    }

    Ok(())
}

/// Classifies every configured asset's ledger age, the same computation the
/// staleness monitor runs.
pub async fn print_health(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    let ledger =
        LedgerDatabase::new(&config.database.url, config.database.max_connections).await?;

    let now = Utc::now();
    for asset in &config.assets {
        match ledger.last_timestamp(&asset.asset_id).await? {
            Some(last) => {
                let hours = (now - last).num_seconds() as f64 / 3600.0;
                let freshness = classify(hours, &config.engine.monitor);
                println!(
                    "{:<6} {:?}  last record {:.1}h ago ({})",
                    asset.asset_id,
                    freshness,
                    hours,
                    last.format("%Y-%m-%d %H:%M:%S"),
                );
            }
            None => println!("{:<6} no records", asset.asset_id),
        }
    }

    Ok(())
}
