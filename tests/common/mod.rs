// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

// Common test utilities for integration tests

use cdi_operator::crd::{Phase, CDI};
use kube::{
    api::{Api, DeleteParams, PostParams},
    client::Client,
};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Get a Kubernetes client or skip the test if not in a cluster
pub async fn get_kube_client_or_skip() -> Option<Client> {
    match Client::try_default().await {
        Ok(client) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test: not running in Kubernetes cluster: {e}");
            None
        }
    }
}

/// Create a `CDI` resource, tolerating one that already exists
pub async fn create_cdi(client: &Client, cdi: &CDI) -> Result<(), Box<dyn std::error::Error>> {
    let api: Api<CDI> = Api::all(client.clone());
    match api.create(&PostParams::default(), cdi).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 409 => {
            println!("CDI already exists");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

/// Delete a `CDI` resource, tolerating one that is already gone
pub async fn delete_cdi(client: &Client, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let api: Api<CDI> = Api::all(client.clone());
    match api.delete(name, &DeleteParams::foreground()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(Box::new(e)),
    }
}

/// Poll until the `CDI` resource reports `phase`, or `timeout` elapses
pub async fn wait_for_phase(client: &Client, name: &str, phase: Phase, timeout: Duration) -> bool {
    let api: Api<CDI> = Api::all(client.clone());
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(Some(cdi)) = api.get_opt(name).await {
            if cdi.phase() == Some(phase) {
                return true;
            }
        }
        sleep(Duration::from_secs(2)).await;
    }
    false
}

/// Poll until the `CDI` resource is gone, or `timeout` elapses
pub async fn wait_for_deletion(client: &Client, name: &str, timeout: Duration) -> bool {
    let api: Api<CDI> = Api::all(client.clone());
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if matches!(api.get_opt(name).await, Ok(None)) {
            return true;
        }
        sleep(Duration::from_secs(2)).await;
    }
    false
}
