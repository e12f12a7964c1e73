// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `crds.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use kube::ResourceExt;

    #[test]
    fn test_workload_crds_are_opaque() {
        let crds = resources().unwrap();
        assert_eq!(crds.len(), 6);
        for crd in &crds {
            let version = &crd.data["spec"]["versions"][0];
            assert_eq!(version["name"], "v1beta1");
            assert_eq!(version["storage"], true);
            assert_eq!(
                version["schema"]["openAPIV3Schema"]["x-kubernetes-preserve-unknown-fields"],
                true
            );
            assert!(crd.name_any().ends_with(".cdi.kubevirt.io"));
        }
    }

    #[test]
    fn test_datavolume_crd_names_and_scope() {
        let crds = resources().unwrap();
        let dv = crds
            .iter()
            .find(|c| c.name_any() == "datavolumes.cdi.kubevirt.io")
            .unwrap();
        assert_eq!(dv.data["spec"]["scope"], "Namespaced");
        assert_eq!(dv.data["spec"]["names"]["shortNames"][0], "dv");

        let config = crds
            .iter()
            .find(|c| c.name_any() == "cdiconfigs.cdi.kubevirt.io")
            .unwrap();
        assert_eq!(config.data["spec"]["scope"], "Cluster");
        assert!(config.data["spec"]["names"].get("shortNames").is_none());
    }
}
