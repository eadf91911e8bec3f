//! Generic lifecycle of a resource instance
//!
//! [`Resource`] runs the validate/install/update/uninstall contract shared by
//! every kind. A [`Driver`] fills in what differs between kinds: the spec
//! type, validation rules, how the remote object is created and deleted, and
//! any extra actions.
//!
//! ```text
//!  Uninstalled ──install──▶ Installing ──ok──▶ Installed
//!       ▲                       │ error             │
//!       │                       ▼                   │ uninstall
//!       └──────────────── Uninstalling ◀────────────┘
//! ```

use crate::context::{ACTION_GET_INFO, EngineContext};
use crate::error::{EngineError, Result};
use crate::kind::ResourceKind;
use crate::runtime::parse_args;
use crate::state::{
    CATEGORY_ACTIONS, InstanceRecord, KEY_INSTALL, LifecycleState, LifecycleStatus, StateStore,
    VALUE_OK,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::sleep;

pub const ACTION_VALIDATE: &str = "validate";
pub const ACTION_INSTALL: &str = "install";
pub const ACTION_UNINSTALL: &str = "uninstall";
pub const ACTION_UPDATE: &str = "update";

/// What a driver operation gets to work with
pub struct Scope<'a, S> {
    pub name: &'a str,
    pub spec: &'a mut S,
    pub ctx: &'a EngineContext,
}

/// Kind-specific part of a resource
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    const KIND: ResourceKind;

    type Spec: Serialize + DeserializeOwned + Clone + Send + Sync;

    /// Partial change accepted by `update`; absent fields are left alone
    type Update: DeserializeOwned + Send;

    /// Check required fields and cross-field constraints without remote calls
    fn validate(&self, name: &str, spec: &Self::Spec) -> Result<()>;

    /// Get or create the remote object and copy its identifiers into the spec
    ///
    /// Runs again from the start after a failed attempt, so it must tolerate
    /// objects left behind by the previous one.
    async fn install(&self, scope: &mut Scope<'_, Self::Spec>) -> Result<()>;

    /// Delete the remote object, tolerating that it is already gone
    async fn uninstall(&self, scope: &mut Scope<'_, Self::Spec>) -> Result<()>;

    /// Apply `changes`; returns whether anything changed
    async fn update(
        &self,
        scope: &mut Scope<'_, Self::Spec>,
        changes: Self::Update,
    ) -> Result<bool>;

    /// Read-only projection of the spec plus freshly fetched remote data
    async fn info(&self, scope: &Scope<'_, Self::Spec>) -> Result<serde_json::Value>;

    /// Names of the kind-specific actions
    fn actions(&self) -> &'static [&'static str] {
        &[]
    }

    /// Run a kind-specific action listed in [`actions`](Self::actions)
    async fn action(
        &self,
        scope: &mut Scope<'_, Self::Spec>,
        action: &str,
        _args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        Err(EngineError::UnknownAction {
            kind: Self::KIND,
            name: scope.name.to_string(),
            action: action.to_string(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct InstallArgs {
    #[serde(default)]
    force: bool,
}

/// One resource instance: its spec, its lifecycle state and its driver
pub struct Resource<D: Driver> {
    driver: D,
    name: String,
    spec: D::Spec,
    state: LifecycleState,
    status: LifecycleStatus,
    ctx: Arc<EngineContext>,
    store: Arc<dyn StateStore>,
}

impl<D: Driver> Resource<D> {
    pub fn new(
        driver: D,
        name: impl Into<String>,
        spec: D::Spec,
        ctx: Arc<EngineContext>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            driver,
            name: name.into(),
            spec,
            state: LifecycleState::new(),
            status: LifecycleStatus::Uninstalled,
            ctx,
            store,
        }
    }

    /// Like [`new`](Self::new), picking up the persisted spec and state if
    /// the store holds a record for this instance
    pub async fn restore(
        driver: D,
        name: impl Into<String>,
        spec: D::Spec,
        ctx: Arc<EngineContext>,
        store: Arc<dyn StateStore>,
    ) -> Result<Self> {
        let mut resource = Self::new(driver, name, spec, ctx, store);
        if let Some(record) = resource.store.load(D::KIND, &resource.name).await? {
            resource.spec = serde_json::from_value(record.spec)?;
            resource.state = record.state;
            resource.status = LifecycleStatus::from_state(&resource.state);
            tracing::debug!(kind = %D::KIND, name = %resource.name, status = %resource.status, "Restored instance");
        }
        Ok(resource)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &D::Spec {
        &self.spec
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub fn status(&self) -> LifecycleStatus {
        self.status
    }

    pub fn is_installed(&self) -> bool {
        self.state.is_installed()
    }

    fn scope(&mut self) -> (&D, Scope<'_, D::Spec>) {
        (
            &self.driver,
            Scope {
                name: &self.name,
                spec: &mut self.spec,
                ctx: &self.ctx,
            },
        )
    }

    fn require_installed(&self) -> Result<()> {
        self.state
            .check(CATEGORY_ACTIONS, KEY_INSTALL, VALUE_OK)
            .map_err(|_| {
                EngineError::State(format!(
                    "{} \"{}\" is not installed",
                    D::KIND,
                    self.name
                ))
            })
    }

    async fn persist(&self) -> Result<()> {
        let record = InstanceRecord::new(
            D::KIND,
            &self.name,
            serde_json::to_value(&self.spec)?,
            self.state.clone(),
        );
        self.store.save(&record).await
    }

    pub fn validate(&self) -> Result<()> {
        self.driver.validate(&self.name, &self.spec)
    }

    async fn install_once(&mut self) -> Result<()> {
        self.validate()?;
        let (driver, mut scope) = self.scope();
        driver.install(&mut scope).await
    }

    /// Converge the remote object; a no-op once installed unless `force`
    #[tracing::instrument(skip(self), fields(kind = %D::KIND, name = %self.name))]
    pub async fn install(&mut self, force: bool) -> Result<()> {
        if self.state.is_installed() && !force {
            tracing::debug!("Already installed");
            return Ok(());
        }

        self.status = LifecycleStatus::Installing;
        let retry = self.ctx.retry().clone();
        let mut attempt = 1;
        loop {
            match self.install_once().await {
                Ok(()) => break,
                Err(err) => match retry.backoff(attempt, &err) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            max_attempts = retry.max_attempts,
                            delay_secs = delay.as_secs_f64(),
                            error = %err,
                            "Install attempt failed, retrying"
                        );
                        sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        self.status = LifecycleStatus::from_state(&self.state);
                        return Err(err);
                    }
                },
            }
        }

        self.state.mark_installed();
        self.persist().await?;
        self.status = LifecycleStatus::Installed;
        tracing::info!(attempts = attempt, "Installed");
        Ok(())
    }

    /// Delete the remote object; a no-op when never installed
    #[tracing::instrument(skip(self), fields(kind = %D::KIND, name = %self.name))]
    pub async fn uninstall(&mut self) -> Result<()> {
        if !self.state.is_installed() {
            tracing::debug!("Not installed, nothing to remove");
            return Ok(());
        }

        self.status = LifecycleStatus::Uninstalling;
        let (driver, mut scope) = self.scope();
        if let Err(err) = driver.uninstall(&mut scope).await {
            self.status = LifecycleStatus::Installed;
            return Err(err);
        }

        self.state.clear_installed();
        self.persist().await?;
        self.status = LifecycleStatus::Uninstalled;
        tracing::info!("Uninstalled");
        Ok(())
    }

    /// Merge a partial change; returns whether anything changed remotely
    #[tracing::instrument(skip(self, changes), fields(kind = %D::KIND, name = %self.name))]
    pub async fn update(&mut self, changes: serde_json::Value) -> Result<bool> {
        self.require_installed()?;
        let changes: D::Update = parse_args(ACTION_UPDATE, changes)?;
        let (driver, mut scope) = self.scope();
        let changed = driver.update(&mut scope, changes).await?;
        if changed {
            self.persist().await?;
            tracing::info!("Updated");
        }
        Ok(changed)
    }

    pub async fn get_info(&mut self) -> Result<serde_json::Value> {
        self.require_installed()?;
        let (driver, scope) = self.scope();
        driver.info(&scope).await
    }

    /// Dispatch an action by name
    pub async fn execute(
        &mut self,
        action: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        match action {
            ACTION_VALIDATE => {
                self.validate()?;
                Ok(serde_json::Value::Null)
            }
            ACTION_INSTALL => {
                let args: InstallArgs = parse_args(action, args)?;
                self.install(args.force).await?;
                Ok(serde_json::Value::Null)
            }
            ACTION_UNINSTALL => {
                self.uninstall().await?;
                Ok(serde_json::Value::Null)
            }
            ACTION_UPDATE => Ok(serde_json::Value::Bool(self.update(args).await?)),
            ACTION_GET_INFO => self.get_info().await,
            other if self.driver.actions().contains(&other) => {
                self.require_installed()?;
                tracing::debug!(kind = %D::KIND, name = %self.name, action = other, "Running action");
                let (driver, mut scope) = self.scope();
                let result = driver.action(&mut scope, other, args).await?;
                self.persist().await?;
                Ok(result)
            }
            other => Err(EngineError::UnknownAction {
                kind: D::KIND,
                name: self.name.clone(),
                action: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::runtime::{ServiceIndex, ServiceRef};
    use crate::state::MemoryStateStore;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;
    use vdcflow_cloud::InMemoryCloud;
    use vdcflow_config::RetryScope;

    struct EmptyIndex;

    #[async_trait]
    impl ServiceIndex for EmptyIndex {
        async fn find(&self, _kind: ResourceKind, _name: &str) -> Vec<Arc<dyn ServiceRef>> {
            Vec::new()
        }
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct CounterSpec {
        label: String,
        remote_id: Option<u64>,
    }

    #[derive(Deserialize)]
    struct CounterUpdate {
        label: Option<String>,
    }

    /// Driver whose install fails a configurable number of times
    #[derive(Default)]
    struct CounterDriver {
        failures: AtomicU32,
        installs: AtomicU32,
        uninstalls: AtomicU32,
        attempted_at: std::sync::Mutex<Vec<Instant>>,
    }

    #[async_trait]
    impl Driver for CounterDriver {
        const KIND: ResourceKind = ResourceKind::SshKey;
        type Spec = CounterSpec;
        type Update = CounterUpdate;

        fn validate(&self, _name: &str, spec: &CounterSpec) -> Result<()> {
            if spec.label.is_empty() {
                return Err(EngineError::validation("label", "must not be empty"));
            }
            Ok(())
        }

        async fn install(&self, scope: &mut Scope<'_, CounterSpec>) -> Result<()> {
            let attempt = self.installs.fetch_add(1, Ordering::SeqCst) + 1;
            self.attempted_at.lock().unwrap().push(Instant::now());
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(EngineError::Runtime(format!(
                    "control plane busy (attempt {})",
                    attempt
                )));
            }
            scope.spec.remote_id = Some(42);
            Ok(())
        }

        async fn uninstall(&self, scope: &mut Scope<'_, CounterSpec>) -> Result<()> {
            self.uninstalls.fetch_add(1, Ordering::SeqCst);
            scope.spec.remote_id = None;
            Ok(())
        }

        async fn update(
            &self,
            scope: &mut Scope<'_, CounterSpec>,
            changes: CounterUpdate,
        ) -> Result<bool> {
            match changes.label {
                Some(label) if label != scope.spec.label => {
                    scope.spec.label = label;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn info(&self, scope: &Scope<'_, CounterSpec>) -> Result<serde_json::Value> {
            Ok(serde_json::to_value(&*scope.spec)?)
        }
    }

    fn context(retry: RetryPolicy) -> Arc<EngineContext> {
        let cloud = Arc::new(InMemoryCloud::new());
        Arc::new(EngineContext::new(Arc::new(EmptyIndex), cloud.connector()).with_retry(retry))
    }

    fn resource_with(
        driver: CounterDriver,
        label: &str,
        ctx: Arc<EngineContext>,
        store: Arc<MemoryStateStore>,
    ) -> Resource<CounterDriver> {
        Resource::new(
            driver,
            "key1",
            CounterSpec {
                label: label.to_string(),
                remote_id: None,
            },
            ctx,
            store,
        )
    }

    fn resource(
        driver: CounterDriver,
        label: &str,
        store: Arc<MemoryStateStore>,
    ) -> Resource<CounterDriver> {
        resource_with(driver, label, context(RetryPolicy::default()), store)
    }

    #[tokio::test]
    async fn test_install_is_idempotent() {
        let store = Arc::new(MemoryStateStore::new());
        let mut res = resource(CounterDriver::default(), "a", store.clone());

        res.install(false).await.unwrap();
        res.install(false).await.unwrap();

        assert_eq!(res.driver.installs.load(Ordering::SeqCst), 1);
        assert!(res.is_installed());
        assert_eq!(res.status(), LifecycleStatus::Installed);
        assert_eq!(res.spec().remote_id, Some(42));
        assert_eq!(store.len(), 1);

        res.install(true).await.unwrap();
        assert_eq!(res.driver.installs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_retries_with_backoff() {
        let driver = CounterDriver {
            failures: AtomicU32::new(2),
            ..Default::default()
        };
        let mut res = resource(driver, "a", Arc::new(MemoryStateStore::new()));
        let started = Instant::now();

        res.install(false).await.unwrap();

        assert_eq!(res.driver.installs.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_succeeds_on_fifth_attempt() {
        let driver = CounterDriver {
            failures: AtomicU32::new(4),
            ..Default::default()
        };
        let mut res = resource(driver, "a", Arc::new(MemoryStateStore::new()));

        res.install(false).await.unwrap();

        assert!(res.is_installed());
        let attempted_at = res.driver.attempted_at.lock().unwrap().clone();
        let gaps: Vec<u64> = attempted_at
            .windows(2)
            .map(|w| (w[1] - w[0]).as_secs())
            .collect();
        assert_eq!(gaps, vec![3, 6, 12, 24]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_gives_up_without_marking_installed() {
        let driver = CounterDriver {
            failures: AtomicU32::new(10),
            ..Default::default()
        };
        let store = Arc::new(MemoryStateStore::new());
        let mut res = resource(driver, "a", store.clone());

        let started = Instant::now();
        let err = res.install(false).await.unwrap_err();

        assert!(matches!(err, EngineError::Runtime(_)));
        assert_eq!(err.to_string(), "control plane busy (attempt 5)");
        assert_eq!(res.driver.installs.load(Ordering::SeqCst), 5);
        // 3 + 6 + 12 + 24, no sleep after the fifth attempt
        assert_eq!(started.elapsed(), Duration::from_secs(45));
        assert!(!res.is_installed());
        assert_eq!(res.status(), LifecycleStatus::Uninstalled);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_failure_retry_follows_scope() {
        let mut res = resource(CounterDriver::default(), "", Arc::new(MemoryStateStore::new()));
        let started = Instant::now();
        let err = res.install(false).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
        assert_eq!(res.driver.installs.load(Ordering::SeqCst), 0);
        // Default scope retries everything: 3 + 6 + 12 + 24
        assert_eq!(started.elapsed(), Duration::from_secs(45));

        let transient_only = RetryPolicy {
            scope: RetryScope::Transient,
            ..RetryPolicy::default()
        };
        let mut res = resource_with(
            CounterDriver::default(),
            "",
            context(transient_only),
            Arc::new(MemoryStateStore::new()),
        );
        let started = Instant::now();
        assert!(res.install(false).await.is_err());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_update_requires_install() {
        let mut res = resource(CounterDriver::default(), "a", Arc::new(MemoryStateStore::new()));

        let err = res.update(serde_json::json!({"label": "b"})).await.unwrap_err();
        assert!(matches!(err, EngineError::State(_)));
        assert!(res.get_info().await.is_err());

        res.install(false).await.unwrap();
        assert!(res.update(serde_json::json!({"label": "b"})).await.unwrap());
        assert!(!res.update(serde_json::json!({"label": "b"})).await.unwrap());
        assert!(!res.update(serde_json::json!({})).await.unwrap());
        assert_eq!(res.get_info().await.unwrap()["label"], "b");
    }

    #[tokio::test]
    async fn test_uninstall_clears_flag() {
        let store = Arc::new(MemoryStateStore::new());
        let mut res = resource(CounterDriver::default(), "a", store.clone());

        // Never installed: nothing to do
        res.uninstall().await.unwrap();
        assert_eq!(res.driver.uninstalls.load(Ordering::SeqCst), 0);

        res.install(false).await.unwrap();
        res.uninstall().await.unwrap();
        assert_eq!(res.driver.uninstalls.load(Ordering::SeqCst), 1);
        assert!(!res.is_installed());
        assert_eq!(res.spec().remote_id, None);

        let record = store.load(ResourceKind::SshKey, "key1").await.unwrap().unwrap();
        assert!(!record.state.is_installed());
    }

    #[tokio::test]
    async fn test_restore_picks_up_persisted_record() {
        let store = Arc::new(MemoryStateStore::new());
        let mut res = resource(CounterDriver::default(), "a", store.clone());
        res.install(false).await.unwrap();

        let ctx = Arc::clone(&res.ctx);
        let restored = Resource::restore(
            CounterDriver::default(),
            "key1",
            CounterSpec::default(),
            ctx,
            store,
        )
        .await
        .unwrap();

        assert!(restored.is_installed());
        assert_eq!(restored.spec().remote_id, Some(42));
        assert_eq!(restored.spec().label, "a");
    }

    #[tokio::test]
    async fn test_execute_dispatch() {
        let mut res = resource(CounterDriver::default(), "a", Arc::new(MemoryStateStore::new()));

        res.execute("validate", serde_json::Value::Null).await.unwrap();
        res.execute("install", serde_json::json!({"force": false}))
            .await
            .unwrap();
        let info = res.execute("get_info", serde_json::Value::Null).await.unwrap();
        assert_eq!(info["remote_id"], 42);

        let err = res
            .execute("reboot", serde_json::Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown action \"reboot\" for sshkey \"key1\"");
    }
}
