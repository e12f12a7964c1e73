// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for context.rs

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::certs::rotation::FakeRotation;
    use crate::cluster::fake::FakeClusterApi;
    use crate::events::RecordingEventPublisher;
    use crate::kinds::KIND_ROUTE;

    #[test]
    fn test_with_parts_wires_default_hooks() {
        let ctx = Context::with_parts(
            Arc::new(FakeClusterApi::new()),
            KindRegistry::new().with_present([KIND_ROUTE]),
            Arc::new(RecordingEventPublisher::default()),
            FactoryArgs::for_tests(),
            Arc::new(FakeRotation::default()),
        );

        assert_eq!(ctx.hooks.len(), callbacks::registry().len());
        assert!(ctx.kinds.is_available(KIND_ROUTE));
        assert_eq!(ctx.args.namespace, "cdi");
    }

    #[test]
    fn test_clone_shares_dependencies() {
        let ctx = Context::with_parts(
            Arc::new(FakeClusterApi::new()),
            KindRegistry::new(),
            Arc::new(RecordingEventPublisher::default()),
            FactoryArgs::for_tests(),
            Arc::new(FakeRotation::default()),
        );
        let other = ctx.clone();
        assert!(Arc::ptr_eq(&ctx.hooks, &other.hooks));
        assert!(Arc::ptr_eq(&ctx.cluster, &other.cluster));
    }
}
