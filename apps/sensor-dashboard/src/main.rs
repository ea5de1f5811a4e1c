use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use sensor_dashboard::chart::ChartRenderer;
use sensor_dashboard::services::aggregator::SensorAggregator;
use sensor_dashboard::services::device_status_ingest::DeviceStatusIngestService;
use sensor_dashboard::services::devices::InMemoryDeviceStore;
use sensor_dashboard::services::mqtt::MqttDispatcher;
use sensor_dashboard::store::{MemoryStore, SampleStore, TimescaleStore};
use sensor_dashboard::{cli, config, db, openapi, routes, state, static_assets};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

async fn bind_listener(addr: &str) -> Result<TcpListener> {
    match TcpListener::bind(addr).await {
        Ok(listener) => Ok(listener),
        Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Failed to bind sensor-dashboard listener on {addr}: port already in use. Stop the other service using this port or re-run with --port to choose another port.",
            );
        }
        Err(err) => {
            Err(err).with_context(|| format!("failed to bind sensor-dashboard listener on {addr}"))
        }
    }
}

async fn build_store(config: &config::DashboardConfig) -> Result<Arc<dyn SampleStore>> {
    if config.demo_mode {
        tracing::info!("demo mode: serving seeded in-memory readings");
        return Ok(Arc::new(
            MemoryStore::seeded_demo(config.measurement.clone(), Utc::now()).await,
        ));
    }
    match config.database_url.as_deref() {
        Some(url) => {
            let pool = db::connect_lazy_with_timeout(url, config.query_timeout)?;
            Ok(Arc::new(TimescaleStore::new(
                pool,
                config.measurement.clone(),
                config.query_timeout,
            )))
        }
        None => {
            tracing::warn!(
                "DASHBOARD_DATABASE_URL is not set; sensor endpoints will report the store as unreachable"
            );
            Ok(Arc::new(MemoryStore::unreachable(config.measurement.clone())))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    if args.print_openapi {
        println!(
            "{}",
            serde_json::to_string_pretty(&openapi::openapi_json())?
        );
        return Ok(());
    }

    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = config::DashboardConfig::from_env(args.static_root)?;
    tracing::info!(
        measurement = %config.measurement,
        join_policy = %config.join_policy,
        production = config.production,
        "starting sensor-dashboard"
    );

    let store = build_store(&config).await?;
    let cancel = CancellationToken::new();
    let (mqtt, _mqtt_task) = MqttDispatcher::new(
        &config.mqtt_client_id,
        &config.mqtt_host,
        config.mqtt_port,
        config.mqtt_username.as_deref(),
        config.mqtt_password.as_deref(),
        cancel.clone(),
    )?;
    let dispatcher = Arc::new(mqtt);
    let devices = Arc::new(InMemoryDeviceStore::new());

    let state = state::AppState {
        config: config.clone(),
        aggregator: SensorAggregator::new(store, config.join_policy),
        devices: devices.clone(),
        dispatcher: dispatcher.clone(),
        renderer: ChartRenderer::default(),
    };

    if let Err(err) = DeviceStatusIngestService::new(dispatcher, devices)
        .start(cancel.clone())
        .await
    {
        tracing::warn!("failed to start device status ingest: {err:#}");
    }

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(20)
            .burst_size(60)
            .methods(vec![
                axum::http::Method::POST,
                axum::http::Method::PUT,
                axum::http::Method::DELETE,
            ])
            .use_headers()
            .finish()
            .context("failed to build rate limiter config")?,
    );

    let governor_limiter = governor_conf.limiter().clone();
    std::thread::spawn(move || loop {
        std::thread::sleep(std::time::Duration::from_secs(60));
        governor_limiter.retain_recent();
    });

    let app = routes::router(state)
        .layer(GovernorLayer::new(governor_conf))
        .fallback_service(static_assets::service(config.static_root.clone())?);
    let addr = format!("{}:{}", args.host, args.port);
    let listener = bind_listener(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    cancel.cancel();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
