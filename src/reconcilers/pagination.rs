// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Pagination helpers for Kubernetes API list operations.
//!
//! Sweeps list every dependant kind of the installation, and the uninstall guard
//! lists `DataVolume`s across all namespaces. Both go through
//! [`list_all_paginated`] so large clusters are read in bounded pages.

use crate::constants::KUBE_LIST_PAGE_SIZE;
use crate::reconcilers::retry::retry_api_call;
use kube::{api::ListParams, Api};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// List all resources with automatic pagination.
///
/// Works for typed resources and for `DynamicObject` alike. Each page request is
/// retried on transient errors.
///
/// # Example
///
/// ```no_run
/// use kube::{api::{ApiResource, DynamicObject, ListParams}, Api, Client};
/// use k8s_openapi::api::apps::v1::Deployment;
/// use cdi_operator::reconcilers::pagination::list_all_paginated;
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = Client::try_default().await?;
/// let ar = ApiResource::erase::<Deployment>(&());
/// let api: Api<DynamicObject> = Api::all_with(client, &ar);
///
/// let selector = ListParams::default().labels("operator.cdi.kubevirt.io/createVersion");
/// let deployments = list_all_paginated(&api, selector).await?;
/// println!("Found {} deployments", deployments.len());
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns the Kubernetes API error of the first page that fails.
pub async fn list_all_paginated<K>(
    api: &Api<K>,
    mut list_params: ListParams,
) -> Result<Vec<K>, kube::Error>
where
    K: Clone + DeserializeOwned + Debug,
{
    list_params.limit = Some(KUBE_LIST_PAGE_SIZE);

    let mut all_items = Vec::new();
    let mut page_count = 0;

    loop {
        page_count += 1;
        let params = list_params.clone();
        let result = retry_api_call(|| api.list(&params), "list page").await?;

        let item_count = result.items.len();
        all_items.extend(result.items);

        debug!(
            page = page_count,
            items_in_page = item_count,
            total_items = all_items.len(),
            "Fetched page from Kubernetes API"
        );

        match result.metadata.continue_ {
            Some(token) if !token.is_empty() => list_params.continue_token = Some(token),
            _ => break,
        }
    }

    Ok(all_items)
}

#[cfg(test)]
#[path = "pagination_tests.rs"]
mod pagination_tests;
