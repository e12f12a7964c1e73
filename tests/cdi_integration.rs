// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Integration tests against a cluster running the operator.
//!
//! The operator must already be deployed with its CRD installed.
//!
//! Run with: cargo test --test cdi_integration -- --ignored

mod common;

use cdi_operator::constants::{CONTROLLER_DEPLOYMENT_NAME, DEFAULT_INSTALL_NAMESPACE, OWNERSHIP_CONFIGMAP_NAME};
use cdi_operator::crd::{CDISpec, Phase, CDI};
use common::{create_cdi, delete_cdi, get_kube_client_or_skip, wait_for_deletion, wait_for_phase};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::Api;
use std::time::Duration;

const CDI_NAME: &str = "cdi";
const DEPLOY_TIMEOUT: Duration = Duration::from_secs(600);

#[tokio::test]
#[ignore = "requires a cluster running the operator"]
async fn test_install_and_uninstall() {
    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };

    create_cdi(&client, &CDI::new(CDI_NAME, CDISpec::default()))
        .await
        .expect("create CDI");
    assert!(
        wait_for_phase(&client, CDI_NAME, Phase::Deployed, DEPLOY_TIMEOUT).await,
        "CDI did not reach Deployed"
    );

    let deployments: Api<Deployment> = Api::namespaced(client.clone(), DEFAULT_INSTALL_NAMESPACE);
    assert!(deployments
        .get_opt(CONTROLLER_DEPLOYMENT_NAME)
        .await
        .expect("get controller deployment")
        .is_some());

    let configmaps: Api<ConfigMap> = Api::namespaced(client.clone(), DEFAULT_INSTALL_NAMESPACE);
    let owner = configmaps
        .get(OWNERSHIP_CONFIGMAP_NAME)
        .await
        .expect("ownership configmap");
    assert_eq!(
        owner.metadata.owner_references.unwrap_or_default()[0].kind,
        "CDI"
    );

    delete_cdi(&client, CDI_NAME).await.expect("delete CDI");
    assert!(
        wait_for_deletion(&client, CDI_NAME, DEPLOY_TIMEOUT).await,
        "CDI was not removed"
    );
    assert!(deployments
        .get_opt(CONTROLLER_DEPLOYMENT_NAME)
        .await
        .expect("get controller deployment")
        .is_none());
}

#[tokio::test]
#[ignore = "requires a cluster running the operator"]
async fn test_second_cdi_is_rejected() {
    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };

    create_cdi(&client, &CDI::new(CDI_NAME, CDISpec::default()))
        .await
        .expect("create CDI");
    assert!(wait_for_phase(&client, CDI_NAME, Phase::Deployed, DEPLOY_TIMEOUT).await);

    create_cdi(&client, &CDI::new("cdi-second", CDISpec::default()))
        .await
        .expect("create second CDI");
    assert!(
        wait_for_phase(&client, "cdi-second", Phase::Error, Duration::from_secs(60)).await,
        "second CDI was not rejected"
    );

    delete_cdi(&client, "cdi-second").await.expect("delete second CDI");
    delete_cdi(&client, CDI_NAME).await.expect("delete CDI");
    assert!(wait_for_deletion(&client, CDI_NAME, DEPLOY_TIMEOUT).await);
}
