// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Namespaced resources of the CDI components.
//!
//! Four groups live in the install namespace: the API server, the controller,
//! the upload proxy and the import cron job. Each group brings its service
//! account, RBAC and, where it runs a workload, a `Service` and `Deployment`.

use super::builder::{
    config_map, container, deployment, env_from_label, env_value, role, role_binding, service,
    service_account, to_dynamic, policy_rule,
};
use crate::config::FactoryArgs;
use crate::constants::{
    APISERVER_NAME, APISERVER_PORT, APISERVER_SERVICE_NAME, CA_BUNDLE_KEY, CONFIG_SPEC_CONFIGMAP_NAME,
    CONFIG_SPEC_KEY, CONTROLLER_CONTAINER_NAME, CONTROLLER_DEPLOYMENT_NAME,
    CONTROLLER_SERVICE_ACCOUNT_NAME, CRONJOB_SERVICE_ACCOUNT_NAME, DEFAULT_REPLICAS,
    INSECURE_REGISTRIES_CONFIGMAP_NAME, SCC_NAME, SERVICE_PORT, TLS_CERT_KEY, TLS_KEY_KEY, UPLOADPROXY_NAME,
    UPLOADPROXY_PORT,
};
use crate::crd::CDIConfigSpec;
use crate::errors::Result;
use crate::labels::{CDI_LABEL, K8S_PART_OF, K8S_VERSION, SCC_ANNOTATION};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    ConfigMapKeySelector, ConfigMapVolumeSource, Container, EnvVar, EnvVarSource, ExecAction,
    HTTPGetAction, KeyToPath, Probe, ResourceRequirements, SecretKeySelector, SecretVolumeSource,
    Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::DynamicObject;
use std::collections::BTreeMap;

/// Env var through which workloads learn the `part-of` label of their installer
pub const INSTALLER_PART_OF_ENV: &str = "INSTALLER_PART_OF_LABEL";

/// Env var through which workloads learn the `version` label of their installer
pub const INSTALLER_VERSION_ENV: &str = "INSTALLER_VERSION_LABEL";

/// Selector label of the controller pods
const CONTROLLER_MATCH_KEY: &str = "app";
const CONTROLLER_MATCH_VALUE: &str = "containerized-data-importer";

/// Secret holding the key pair the API server signs upload tokens with
const API_SIGNING_KEY_SECRET: &str = "cdi-api-signing-key";
const TOKEN_KEY_DIR: &str = "/var/run/cdi/token/keys";
const HEALTHZ_PATH: &str = "/healthz";
/// Default file mode of projected secret and `ConfigMap` volumes
const DEFAULT_VOLUME_MODE: i32 = 0o644;

/// Every namespaced resource, in a stable order.
///
/// # Errors
///
/// Returns [`crate::errors::OperatorError::Serialization`] when an object fails
/// to convert or the config spec cannot be encoded.
pub fn resources(args: &FactoryArgs, config: Option<&CDIConfigSpec>) -> Result<Vec<DynamicObject>> {
    let mut objects = apiserver_resources(args)?;
    objects.extend(controller_resources(args)?);
    objects.extend(uploadproxy_resources(args)?);
    objects.extend(cronjob_resources(args)?);
    objects.extend(config_resources(args, config)?);
    Ok(objects)
}

fn installer_env() -> Vec<EnvVar> {
    vec![
        env_from_label(INSTALLER_PART_OF_ENV, K8S_PART_OF),
        env_from_label(INSTALLER_VERSION_ENV, K8S_VERSION),
    ]
}

fn https_probe(port: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(HEALTHZ_PATH.to_string()),
            port: IntOrString::Int(port),
            scheme: Some("HTTPS".to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(2),
        period_seconds: Some(5),
        failure_threshold: Some(3),
        success_threshold: Some(1),
        timeout_seconds: Some(1),
        ..Default::default()
    }
}

fn small_requests() -> ResourceRequirements {
    ResourceRequirements {
        requests: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity("10m".to_string())),
            ("memory".to_string(), Quantity("150Mi".to_string())),
        ])),
        ..Default::default()
    }
}

fn key_to_path(keys: &[&str]) -> Option<Vec<KeyToPath>> {
    Some(
        keys.iter()
            .map(|k| KeyToPath {
                key: (*k).to_string(),
                path: (*k).to_string(),
                ..Default::default()
            })
            .collect(),
    )
}

fn secret_volume(volume: &str, secret: &str, keys: &[&str]) -> Volume {
    Volume {
        name: volume.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret.to_string()),
            items: key_to_path(keys),
            default_mode: Some(DEFAULT_VOLUME_MODE),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn config_map_volume(volume: &str, config_map: &str) -> Volume {
    Volume {
        name: volume.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map.to_string(),
            items: key_to_path(&[CA_BUNDLE_KEY]),
            default_mode: Some(DEFAULT_VOLUME_MODE),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn mount(volume: &str, path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: volume.to_string(),
        mount_path: path.to_string(),
        read_only: read_only.then_some(true),
        ..Default::default()
    }
}

fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn config_map_env(name: &str, config_map: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            config_map_key_ref: Some(ConfigMapKeySelector {
                name: config_map.to_string(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn with_container(mut deploy: Deployment, args: &FactoryArgs, container: Container) -> Deployment {
    if let Some(pod) = deploy
        .spec
        .as_mut()
        .and_then(|s| s.template.spec.as_mut())
    {
        pod.priority_class_name.clone_from(&args.priority_class_name);
        pod.containers = vec![container];
    }
    deploy
}

fn set_volumes(deploy: &mut Deployment, volumes: Vec<Volume>) {
    if let Some(pod) = deploy
        .spec
        .as_mut()
        .and_then(|s| s.template.spec.as_mut())
    {
        pod.volumes = Some(volumes);
    }
}

fn apiserver_resources(args: &FactoryArgs) -> Result<Vec<DynamicObject>> {
    let ns = args.namespace.as_str();
    let rules = vec![policy_rule(&[""], &["secrets", "configmaps"], &["*"])];

    let mut c = container(
        APISERVER_NAME,
        &args.apiserver_image,
        &args.verbosity,
        &args.pull_policy,
    );
    c.env = Some(installer_env());
    c.readiness_probe = Some(https_probe(APISERVER_PORT));
    c.volume_mounts = Some(vec![
        mount("ca-bundle", "/var/run/certs/cdi-apiserver-signer-bundle", true),
        mount("server-cert", "/var/run/certs/cdi-apiserver-server-cert", true),
    ]);
    c.resources = Some(small_requests());

    let mut deploy = with_container(
        deployment(
            APISERVER_NAME,
            ns,
            CDI_LABEL,
            APISERVER_NAME,
            APISERVER_NAME,
            DEFAULT_REPLICAS,
            args.infra_node_placement.as_ref(),
        ),
        args,
        c,
    );
    set_volumes(
        &mut deploy,
        vec![
            config_map_volume("ca-bundle", "cdi-apiserver-signer-bundle"),
            secret_volume(
                "server-cert",
                "cdi-apiserver-server-cert",
                &[TLS_CERT_KEY, TLS_KEY_KEY],
            ),
        ],
    );

    Ok(vec![
        to_dynamic(&service_account(APISERVER_NAME, ns))?,
        to_dynamic(&role_binding(APISERVER_NAME, APISERVER_NAME, APISERVER_NAME, ns))?,
        to_dynamic(&role(APISERVER_NAME, ns, rules))?,
        to_dynamic(&service(
            APISERVER_SERVICE_NAME,
            ns,
            CDI_LABEL,
            APISERVER_NAME,
            SERVICE_PORT,
            APISERVER_PORT,
        ))?,
        to_dynamic(&deploy)?,
    ])
}

fn controller_resources(args: &FactoryArgs) -> Result<Vec<DynamicObject>> {
    let ns = args.namespace.as_str();
    let rules = vec![
        policy_rule(&[""], &["configmaps"], &["*"]),
        policy_rule(&[""], &["secrets"], &["get", "list", "watch"]),
    ];

    let mut env = vec![
        env_value("IMPORTER_IMAGE", &args.importer_image),
        env_value("CLONER_IMAGE", &args.cloner_image),
        env_value("UPLOADSERVER_IMAGE", &args.uploadserver_image),
        env_value("UPLOADPROXY_SERVICE", UPLOADPROXY_NAME),
        env_value("PULL_POLICY", &args.pull_policy),
    ];
    env.extend(installer_env());

    let mut c = container(
        CONTROLLER_CONTAINER_NAME,
        &args.controller_image,
        &args.verbosity,
        &args.pull_policy,
    );
    c.env = Some(env);
    c.readiness_probe = Some(Probe {
        exec: Some(ExecAction {
            command: Some(vec!["cat".to_string(), "/tmp/ready".to_string()]),
        }),
        initial_delay_seconds: Some(2),
        period_seconds: Some(5),
        failure_threshold: Some(3),
        success_threshold: Some(1),
        timeout_seconds: Some(1),
        ..Default::default()
    });
    c.volume_mounts = Some(vec![
        mount(API_SIGNING_KEY_SECRET, TOKEN_KEY_DIR, false),
        mount("uploadserver-ca-cert", "/var/run/certs/cdi-uploadserver-signer", false),
        mount(
            "uploadserver-client-ca-cert",
            "/var/run/certs/cdi-uploadserver-client-signer",
            false,
        ),
        mount(
            "uploadserver-ca-bundle",
            "/var/run/ca-bundle/cdi-uploadserver-signer-bundle",
            false,
        ),
        mount(
            "uploadserver-client-ca-bundle",
            "/var/run/ca-bundle/cdi-uploadserver-client-signer-bundle",
            false,
        ),
    ]);
    c.resources = Some(small_requests());

    let mut deploy = with_container(
        deployment(
            CONTROLLER_DEPLOYMENT_NAME,
            ns,
            CONTROLLER_MATCH_KEY,
            CONTROLLER_MATCH_VALUE,
            CONTROLLER_SERVICE_ACCOUNT_NAME,
            DEFAULT_REPLICAS,
            args.infra_node_placement.as_ref(),
        ),
        args,
        c,
    );
    set_volumes(
        &mut deploy,
        vec![
            secret_volume(API_SIGNING_KEY_SECRET, API_SIGNING_KEY_SECRET, &["id_rsa.pub", "id_rsa"]),
            secret_volume(
                "uploadserver-ca-cert",
                "cdi-uploadserver-signer",
                &[TLS_CERT_KEY, TLS_KEY_KEY],
            ),
            secret_volume(
                "uploadserver-client-ca-cert",
                "cdi-uploadserver-client-signer",
                &[TLS_CERT_KEY, TLS_KEY_KEY],
            ),
            config_map_volume("uploadserver-ca-bundle", "cdi-uploadserver-signer-bundle"),
            config_map_volume(
                "uploadserver-client-ca-bundle",
                "cdi-uploadserver-client-signer-bundle",
            ),
        ],
    );

    let mut sa = service_account(CONTROLLER_SERVICE_ACCOUNT_NAME, ns);
    sa.metadata.annotations = Some(BTreeMap::from([(
        SCC_ANNOTATION.to_string(),
        serde_json::to_string(&[SCC_NAME])?,
    )]));

    Ok(vec![
        to_dynamic(&sa)?,
        to_dynamic(&role_binding(
            CONTROLLER_DEPLOYMENT_NAME,
            CONTROLLER_DEPLOYMENT_NAME,
            CONTROLLER_SERVICE_ACCOUNT_NAME,
            ns,
        ))?,
        to_dynamic(&role(CONTROLLER_DEPLOYMENT_NAME, ns, rules))?,
        to_dynamic(&deploy)?,
        to_dynamic(&config_map(INSECURE_REGISTRIES_CONFIGMAP_NAME, ns, None))?,
    ])
}

fn uploadproxy_resources(args: &FactoryArgs) -> Result<Vec<DynamicObject>> {
    let ns = args.namespace.as_str();

    let mut c = container(
        UPLOADPROXY_NAME,
        &args.uploadproxy_image,
        &args.verbosity,
        &args.pull_policy,
    );
    let mut env = vec![
        secret_env("APISERVER_PUBLIC_KEY", API_SIGNING_KEY_SECRET, "id_rsa.pub"),
        secret_env("UPLOAD_SERVER_CLIENT_KEY", "cdi-uploadserver-client-cert", TLS_KEY_KEY),
        secret_env("UPLOAD_SERVER_CLIENT_CERT", "cdi-uploadserver-client-cert", TLS_CERT_KEY),
        config_map_env(
            "UPLOAD_SERVER_CA_CERT",
            "cdi-uploadserver-signer-bundle",
            CA_BUNDLE_KEY,
        ),
        secret_env("SERVICE_TLS_KEY", "cdi-uploadproxy-server-cert", TLS_KEY_KEY),
        secret_env("SERVICE_TLS_CERT", "cdi-uploadproxy-server-cert", TLS_CERT_KEY),
    ];
    env.extend(installer_env());
    c.env = Some(env);
    c.readiness_probe = Some(Probe {
        failure_threshold: None,
        success_threshold: None,
        timeout_seconds: None,
        ..https_probe(UPLOADPROXY_PORT)
    });
    c.resources = Some(small_requests());

    let deploy = with_container(
        deployment(
            UPLOADPROXY_NAME,
            ns,
            CDI_LABEL,
            UPLOADPROXY_NAME,
            UPLOADPROXY_NAME,
            DEFAULT_REPLICAS,
            args.infra_node_placement.as_ref(),
        ),
        args,
        c,
    );

    Ok(vec![
        to_dynamic(&service_account(UPLOADPROXY_NAME, ns))?,
        to_dynamic(&service(
            UPLOADPROXY_NAME,
            ns,
            CDI_LABEL,
            UPLOADPROXY_NAME,
            SERVICE_PORT,
            UPLOADPROXY_PORT,
        ))?,
        to_dynamic(&deploy)?,
    ])
}

fn cronjob_resources(args: &FactoryArgs) -> Result<Vec<DynamicObject>> {
    let ns = args.namespace.as_str();
    let rules = vec![policy_rule(
        &[crate::constants::API_GROUP],
        &["dataimportcrons"],
        &["get", "list", "update"],
    )];
    Ok(vec![
        to_dynamic(&service_account(CRONJOB_SERVICE_ACCOUNT_NAME, ns))?,
        to_dynamic(&role_binding(
            CRONJOB_SERVICE_ACCOUNT_NAME,
            CRONJOB_SERVICE_ACCOUNT_NAME,
            CRONJOB_SERVICE_ACCOUNT_NAME,
            ns,
        ))?,
        to_dynamic(&role(CRONJOB_SERVICE_ACCOUNT_NAME, ns, rules))?,
    ])
}

/// `ConfigMap` publishing `spec.config` to the controller workload.
fn config_resources(args: &FactoryArgs, config: Option<&CDIConfigSpec>) -> Result<Vec<DynamicObject>> {
    let encoded = match config {
        Some(config) => serde_json::to_string(config)?,
        None => "{}".to_string(),
    };
    let data = BTreeMap::from([(CONFIG_SPEC_KEY.to_string(), encoded)]);
    Ok(vec![to_dynamic(&config_map(
        CONFIG_SPEC_CONFIGMAP_NAME,
        &args.namespace,
        Some(data),
    ))?])
}

#[cfg(test)]
#[path = "namespaced_tests.rs"]
mod namespaced_tests;
