// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CRD YAML Generator
//!
//! Renders the `CDI` CustomResourceDefinition from the Rust types in
//! src/crd.rs, so deploy/crds/ never drifts from the code.
//!
//! Usage:
//!   cargo run --bin crdgen [OUTPUT_DIR]
//!
//! The output directory defaults to deploy/crds/.

use cdi_operator::crd::CDI;
use kube::CustomResourceExt;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

const COPYRIGHT_HEADER: &str = "# Copyright (c) 2025 Erick Bourgeois, firestoned
# SPDX-License-Identifier: MIT
#
# This file is AUTO-GENERATED from src/crd.rs
# DO NOT EDIT MANUALLY - Run `cargo run --bin crdgen` to regenerate
#
";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output_dir = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("deploy/crds"), PathBuf::from);

    fs::create_dir_all(&output_dir)?;

    println!("Generating CRD YAML from src/crd.rs...");
    generate_crd::<CDI>("cdis.crd.yaml", &output_dir)?;
    println!("✓ Successfully generated CRD YAML in {}", output_dir.display());

    Ok(())
}

fn generate_crd<T>(filename: &str, output_dir: &Path) -> Result<(), Box<dyn std::error::Error>>
where
    T: CustomResourceExt,
{
    let mut crd_json: Value = serde_json::to_value(T::crd())?;

    // v1alpha1 is still served for clients that predate v1beta1; v1beta1 is stored.
    if let Some(versions) = crd_json["spec"]["versions"].as_array_mut() {
        if let Some(v1beta1) = versions.first_mut() {
            v1beta1["storage"] = Value::Bool(true);
            v1beta1["served"] = Value::Bool(true);

            let mut v1alpha1 = v1beta1.clone();
            v1alpha1["name"] = Value::String("v1alpha1".to_string());
            v1alpha1["storage"] = Value::Bool(false);
            v1alpha1["deprecated"] = Value::Bool(true);
            v1alpha1["deprecationWarning"] = Value::String(
                "cdi.kubevirt.io/v1alpha1 is deprecated. Use cdi.kubevirt.io/v1beta1 instead."
                    .to_string(),
            );
            versions.insert(0, v1alpha1);
        }
    }

    let yaml = serde_yaml::to_string(&crd_json)?;
    let output_path = output_dir.join(filename);
    fs::write(&output_path, format!("{COPYRIGHT_HEADER}{yaml}"))?;

    println!("  ✓ Generated {filename}");
    Ok(())
}
