//! Lookup of exactly one collaborating instance

use crate::error::{EngineError, Result};
use crate::kind::ResourceKind;
use crate::runtime::{ServiceIndex, ServiceRef};
use std::sync::Arc;

/// Resolves references by (kind, name) through the runtime's index
#[derive(Clone)]
pub struct ServiceResolver {
    index: Arc<dyn ServiceIndex>,
}

impl ServiceResolver {
    pub fn new(index: Arc<dyn ServiceIndex>) -> Self {
        Self { index }
    }

    /// Find the single instance of `kind` called `name`
    ///
    /// Zero or several matches are both an error; nothing is guessed.
    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, kind: ResourceKind, name: &str) -> Result<Arc<dyn ServiceRef>> {
        let mut found = self.index.find(kind, name).await;
        if found.len() != 1 {
            tracing::debug!(count = found.len(), "Reference did not resolve to one instance");
            return Err(EngineError::Resolution {
                kind,
                name: name.to_string(),
                count: found.len(),
            });
        }
        Ok(found.remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Task, TaskOutcome};
    use async_trait::async_trait;

    struct Named(ResourceKind, String);

    impl ServiceRef for Named {
        fn kind(&self) -> ResourceKind {
            self.0
        }

        fn name(&self) -> &str {
            &self.1
        }

        fn schedule(&self, _action: &str, _args: serde_json::Value) -> Task {
            Task::finished(TaskOutcome::ok(serde_json::Value::Null))
        }
    }

    /// Index that may hold several instances under the same name
    struct ListIndex(Vec<Arc<dyn ServiceRef>>);

    #[async_trait]
    impl ServiceIndex for ListIndex {
        async fn find(&self, kind: ResourceKind, name: &str) -> Vec<Arc<dyn ServiceRef>> {
            self.0
                .iter()
                .filter(|s| s.kind() == kind && s.name() == name)
                .cloned()
                .collect()
        }
    }

    fn resolver(entries: &[(ResourceKind, &str)]) -> ServiceResolver {
        let services = entries
            .iter()
            .map(|(kind, name)| Arc::new(Named(*kind, name.to_string())) as Arc<dyn ServiceRef>)
            .collect();
        ServiceResolver::new(Arc::new(ListIndex(services)))
    }

    #[tokio::test]
    async fn test_resolves_single_match() {
        let resolver = resolver(&[
            (ResourceKind::Account, "acc1"),
            (ResourceKind::VirtualDatacenter, "acc1"),
        ]);
        let found = resolver.resolve(ResourceKind::Account, "acc1").await.unwrap();
        assert_eq!(found.kind(), ResourceKind::Account);
        assert_eq!(found.name(), "acc1");
    }

    #[tokio::test]
    async fn test_zero_matches() {
        let resolver = resolver(&[(ResourceKind::Account, "acc1")]);
        let err = resolver
            .resolve(ResourceKind::Account, "missing")
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("required exactly one"));
        assert_eq!(
            err.to_string(),
            "found 0 services with name \"missing\", required exactly one"
        );
    }

    #[tokio::test]
    async fn test_two_matches() {
        let resolver = resolver(&[
            (ResourceKind::Machine, "vm1"),
            (ResourceKind::Machine, "vm1"),
        ]);
        let err = resolver
            .resolve(ResourceKind::Machine, "vm1")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Resolution { count: 2, .. }));
        assert!(err.to_string().contains("required exactly one"));
    }
}
