// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use cdi_operator::{
    cluster::KubeClusterApi,
    config::{Cli, FactoryArgs},
    constants::{METRICS_SERVER_BIND_ADDRESS, TOKIO_WORKER_THREADS},
    context::Context,
    metrics, watches,
};
use clap::Parser;
use kube::Client;
use std::sync::Arc;
use tracing::{debug, error, info};

fn main() -> Result<()> {
    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("cdi-operator")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

fn init_logging() {
    // Respects RUST_LOG, defaulting to INFO.
    // RUST_LOG_FORMAT=json switches to JSON lines.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting CDI operator");

    let mut args = FactoryArgs::from_env()?;
    args.cert_poll_interval = cli.cert_poll_interval;
    debug!(
        namespace = %args.namespace,
        operator_version = %args.operator_version,
        deploy_cluster_resources = args.deploy_cluster_resources,
        cert_poll_interval = ?args.cert_poll_interval,
        "Loaded operator configuration"
    );

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let kinds = watches::probe_kinds(&KubeClusterApi::new(client.clone())).await?;
    let ctx = Arc::new(Context::new(client.clone(), args, kinds));

    if cli.disable_metrics {
        info!("Metrics server disabled");
        return watches::run_controller(client, ctx).await;
    }

    // The controller should never exit; if either task does, exit the process.
    tokio::select! {
        result = watches::run_controller(client, ctx) => {
            if let Err(e) = &result {
                error!("CRITICAL: CDI controller exited unexpectedly: {:?}", e);
            }
            result
        }
        result = serve_metrics(cli.metrics_port) => {
            error!("CRITICAL: metrics server exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("metrics server exited unexpectedly without error")
        }
    }
}

async fn serve_metrics(port: u16) -> Result<()> {
    let addr = format!("{METRICS_SERVER_BIND_ADDRESS}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind metrics server to {addr}"))?;
    info!(address = %addr, "Serving metrics and health probes");
    axum::serve(listener, metrics::router()).await?;
    Ok(())
}
