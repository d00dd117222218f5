//! Registry Tests
//!
//! Admission, dependency ordering, lifecycle supervision and teardown of the
//! plugin registry, driven through the public API only.
//!
//! Run: cargo nextest run --test registry_tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use plugwire::client::{ClientError, HttpRequest, RequestInterceptor};
use plugwire::events::names;
use plugwire::plugin::{
    ErrorCode, HealthStatus, Plugin, PluginConfig, PluginContext, PluginDependency, PluginError,
    PluginErrorKind, PluginHealth, PluginHooks, PluginMetadata, PluginResult, PluginState,
    PluginType,
};
use plugwire::registry::{PluginRegistry, RegistryConfig};
use plugwire::validation::ConfigSchema;
use serde_json::json;

// =============================================================================
// Fixtures
// =============================================================================

type Journal = Arc<Mutex<Vec<String>>>;

fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum StartBehavior {
    #[default]
    Succeed,
    Fail,
    Hang,
}

/// Records every lifecycle call as `"<id>:<stage>"`.
struct Tracked {
    metadata: PluginMetadata,
    journal: Journal,
    start: StartBehavior,
    intercept: bool,
}

impl Tracked {
    fn new(id: &str, journal: &Journal) -> Self {
        Self {
            metadata: PluginMetadata::new(id, format!("{} plugin", id), "1.0.0"),
            journal: Arc::clone(journal),
            start: StartBehavior::Succeed,
            intercept: false,
        }
    }

    fn depends_on(mut self, id: &str) -> Self {
        self.metadata = self
            .metadata
            .with_dependency(PluginDependency::required(id, "^1.0.0"));
        self
    }

    fn version(mut self, version: &str) -> Self {
        self.metadata.version = version.to_string();
        self
    }

    fn start_behavior(mut self, behavior: StartBehavior) -> Self {
        self.start = behavior;
        self
    }

    fn with_interceptor(mut self) -> Self {
        self.intercept = true;
        self
    }

    fn record(&self, stage: &str) {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.metadata.id, stage));
    }

    fn arc(self) -> Arc<dyn Plugin> {
        Arc::new(self)
    }
}

struct TagRequests(String);

#[async_trait]
impl RequestInterceptor for TagRequests {
    async fn intercept(&self, request: HttpRequest) -> Result<HttpRequest, ClientError> {
        Ok(request.header("x-tracked", self.0.clone()))
    }
}

#[async_trait]
impl Plugin for Tracked {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn init(&self, _ctx: &PluginContext) -> PluginResult<()> {
        self.record("init");
        Ok(())
    }

    async fn start(&self, ctx: &PluginContext) -> PluginResult<()> {
        self.record("start");
        match self.start {
            StartBehavior::Succeed => Ok(()),
            StartBehavior::Fail => Err(PluginError::hook(ctx.plugin_id(), "refused to start")),
            StartBehavior::Hang => std::future::pending().await,
        }
    }

    async fn stop(&self, _ctx: &PluginContext) -> PluginResult<()> {
        self.record("stop");
        Ok(())
    }

    async fn destroy(&self, _ctx: &PluginContext) -> PluginResult<()> {
        self.record("destroy");
        Ok(())
    }

    fn intercept_request(&self) -> Option<Arc<dyn RequestInterceptor>> {
        self.intercept
            .then(|| Arc::new(TagRequests(self.metadata.id.clone())) as Arc<dyn RequestInterceptor>)
    }
}

fn registry() -> Arc<PluginRegistry> {
    PluginRegistry::new(RegistryConfig::new())
}

/// Counts deliveries of `event` on the registry bus.
fn count_events(registry: &PluginRegistry, event: &str) -> Arc<AtomicUsize> {
    let counter = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&counter);
    registry.events().on(event, move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    counter
}

// =============================================================================
// Dependency ordering
// =============================================================================

mod ordering_tests {
    use super::*;

    #[tokio::test]
    async fn test_load_order_is_independent_of_registration_order() {
        let log = journal();
        let plugins = || {
            vec![
                Tracked::new("app", &log).depends_on("auth").depends_on("cache"),
                Tracked::new("auth", &log).depends_on("core"),
                Tracked::new("cache", &log).depends_on("core"),
                Tracked::new("core", &log),
                Tracked::new("audit", &log),
            ]
        };

        let forward = registry();
        for plugin in plugins() {
            forward.register(plugin.arc()).await.unwrap();
        }
        let backward = registry();
        for plugin in plugins().into_iter().rev() {
            backward.register(plugin.arc()).await.unwrap();
        }

        let expected = vec!["audit", "core", "auth", "cache", "app"];
        assert_eq!(forward.load_order().unwrap(), expected);
        assert_eq!(backward.load_order().unwrap(), expected);
        assert_eq!(forward.load_order().unwrap(), forward.load_order().unwrap());
    }

    #[tokio::test]
    async fn test_cycle_registration_is_rejected_and_rolled_back() {
        let log = journal();
        let registry = registry();
        registry
            .register(Tracked::new("A", &log).depends_on("B").arc())
            .await
            .unwrap();

        let graph_before = registry.dependency_graph().adjacency();
        let err = registry
            .register(Tracked::new("B", &log).depends_on("A").arc())
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::CircularDependency);
        assert_eq!(err.kind, PluginErrorKind::Dependency);
        assert!(!registry.has("B"));
        assert!(registry.has("A"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.dependency_graph().adjacency(), graph_before);
        assert_eq!(registry.load_order().unwrap(), vec!["A"]);
        assert!(entries(&log).is_empty());
    }

    #[tokio::test]
    async fn test_cycle_error_names_every_node_in_the_cycle() {
        let log = journal();
        let registry = registry();
        registry
            .register(Tracked::new("a", &log).depends_on("b").arc())
            .await
            .unwrap();
        registry
            .register(Tracked::new("b", &log).depends_on("c").arc())
            .await
            .unwrap();

        let err = registry
            .register(Tracked::new("c", &log).depends_on("a").arc())
            .await
            .unwrap_err();

        let context = err.context.unwrap();
        assert_eq!(context["cycle"], json!(["c", "a", "b", "c"]));
        assert_eq!(context["unresolved"], json!(["a", "b", "c"]));
        assert!(err.message.contains("c -> a -> b -> c"));
    }

    #[tokio::test]
    async fn test_unregister_then_register_reproduces_order() {
        let log = journal();
        let registry = registry();
        registry.register(Tracked::new("core", &log).arc()).await.unwrap();
        registry
            .register(Tracked::new("auth", &log).depends_on("core").arc())
            .await
            .unwrap();
        registry
            .register(Tracked::new("app", &log).depends_on("auth").arc())
            .await
            .unwrap();
        let before = registry.load_order().unwrap();

        assert!(registry.unregister("auth").await.unwrap());
        assert!(!registry.has("auth"));
        registry
            .register(Tracked::new("auth", &log).depends_on("core").arc())
            .await
            .unwrap();

        assert_eq!(registry.load_order().unwrap(), before);
        assert_eq!(before, vec!["core", "auth", "app"]);
    }

    #[tokio::test]
    async fn test_a_then_b_start_order() {
        let log = journal();
        let registry = registry();
        registry.register(Tracked::new("A", &log).arc()).await.unwrap();
        registry
            .register(Tracked::new("B", &log).depends_on("A").arc())
            .await
            .unwrap();
        assert_eq!(registry.load_order().unwrap(), vec!["A", "B"]);

        registry.start("B").await.unwrap();

        assert_eq!(registry.state("A"), Some(PluginState::Started));
        assert_eq!(registry.state("B"), Some(PluginState::Started));
        assert_eq!(
            entries(&log),
            vec!["A:init", "A:start", "B:init", "B:start"]
        );
    }

    #[tokio::test]
    async fn test_stop_all_stops_dependents_first() {
        let log = journal();
        let registry = registry();
        registry.register(Tracked::new("A", &log).arc()).await.unwrap();
        registry
            .register(Tracked::new("B", &log).depends_on("A").arc())
            .await
            .unwrap();
        registry.start_all().await.unwrap();
        log.lock().unwrap().clear();

        registry.stop_all().await.unwrap();
        assert_eq!(entries(&log), vec!["B:stop", "A:stop"]);
        assert_eq!(registry.plugins_by_state(PluginState::Stopped), vec!["A", "B"]);
    }
}

// =============================================================================
// Admission
// =============================================================================

mod admission_tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_id_never_reaches_the_registry() {
        let log = journal();
        let registry = registry();
        let registered = count_events(&registry, names::PLUGIN_REGISTERED);

        for id in ["bad id", "slash/id", "", "semi;colon"] {
            let err = registry
                .register(Tracked::new(id, &log).arc())
                .await
                .unwrap_err();
            assert_eq!(err.code, ErrorCode::ValidationFailed, "id {:?}", id);
            assert_eq!(err.kind, PluginErrorKind::Validation);
            assert!(!registry.has(id));
        }

        registry.events().flush().await;
        assert!(registry.is_empty());
        assert!(registry.dependency_graph().is_empty());
        assert_eq!(registered.load(Ordering::SeqCst), 0);
        assert_eq!(registry.metrics().counter("plugins.registered").get(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_id_is_a_configuration_error() {
        let log = journal();
        let registry = registry();
        registry.register(Tracked::new("dup", &log).arc()).await.unwrap();
        registry.start("dup").await.unwrap();

        let err = registry
            .register(Tracked::new("dup", &log).version("2.0.0").arc())
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::PluginAlreadyRegistered);
        assert_eq!(err.kind, PluginErrorKind::Configuration);
        assert_eq!(registry.get("dup").unwrap().metadata().version, "1.0.0");
        assert_eq!(registry.state("dup"), Some(PluginState::Started));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_registry_full() {
        let log = journal();
        let registry = PluginRegistry::new(RegistryConfig::new().max_plugins(1));
        registry.register(Tracked::new("one", &log).arc()).await.unwrap();

        let err = registry
            .register(Tracked::new("two", &log).arc())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RegistryFull);
        assert!(!registry.has("two"));
    }

    #[tokio::test]
    async fn test_incompatible_dependency_version() {
        let log = journal();
        let registry = registry();
        registry
            .register(Tracked::new("core", &log).version("2.1.0").arc())
            .await
            .unwrap();

        let err = registry
            .register(Tracked::new("app", &log).depends_on("core").arc())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::IncompatibleDependency);
        assert_eq!(err.context.unwrap()["found"], "2.1.0");
        assert!(!registry.has("app"));
    }

    #[tokio::test]
    async fn test_late_dependency_must_satisfy_existing_constraints() {
        let log = journal();
        let registry = registry();
        registry
            .register(Tracked::new("app", &log).depends_on("core").arc())
            .await
            .unwrap();

        let err = registry
            .register(Tracked::new("core", &log).version("3.0.0").arc())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::IncompatibleDependency);
        assert!(!registry.has("core"));
    }

    #[tokio::test]
    async fn test_strict_dependencies_reject_missing_at_registration() {
        let log = journal();
        let registry = PluginRegistry::new(RegistryConfig::new().strict_dependencies(true));

        let err = registry
            .register(Tracked::new("app", &log).depends_on("db").arc())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingDependency);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_auto_start_on_register() {
        let log = journal();
        let registry = PluginRegistry::new(RegistryConfig::new().auto_start(true));
        registry.register(Tracked::new("eager", &log).arc()).await.unwrap();
        assert_eq!(registry.state("eager"), Some(PluginState::Started));

        registry
            .register_with_config(Tracked::new("lazy", &log).arc(), PluginConfig::disabled())
            .await
            .unwrap();
        assert_eq!(registry.state("lazy"), Some(PluginState::Uninitialized));
    }

    #[tokio::test]
    async fn test_auto_start_waits_for_missing_dependency() {
        let log = journal();
        let registry = PluginRegistry::new(RegistryConfig::new().auto_start(true));

        registry
            .register(Tracked::new("app", &log).depends_on("db").arc())
            .await
            .unwrap();
        assert!(registry.has("app"));
        assert_eq!(registry.state("app"), Some(PluginState::Uninitialized));
        assert!(registry.last_error("app").is_none());
        assert!(entries(&log).is_empty());

        registry.register(Tracked::new("db", &log).arc()).await.unwrap();
        assert_eq!(registry.state("db"), Some(PluginState::Started));

        registry.start("app").await.unwrap();
        assert_eq!(
            entries(&log),
            vec!["db:init", "db:start", "app:init", "app:start"]
        );
    }

    #[tokio::test]
    async fn test_auto_start_waits_for_transitive_dependency() {
        let log = journal();
        let registry = PluginRegistry::new(RegistryConfig::new().auto_start(true));

        registry
            .register(Tracked::new("api", &log).depends_on("db").arc())
            .await
            .unwrap();
        registry
            .register(Tracked::new("app", &log).depends_on("api").arc())
            .await
            .unwrap();

        assert_eq!(registry.state("api"), Some(PluginState::Uninitialized));
        assert_eq!(registry.state("app"), Some(PluginState::Uninitialized));
        assert!(entries(&log).is_empty());
    }

    #[tokio::test]
    async fn test_cycle_rejected_under_auto_start() {
        let log = journal();
        let registry = PluginRegistry::new(RegistryConfig::new().auto_start(true));

        registry
            .register(Tracked::new("A", &log).depends_on("B").arc())
            .await
            .unwrap();
        let err = registry
            .register(Tracked::new("B", &log).depends_on("A").arc())
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::CircularDependency);
        assert!(registry.has("A"));
        assert!(!registry.has("B"));
    }

    #[tokio::test]
    async fn test_auto_start_failure_keeps_registration() {
        let log = journal();
        let registry = PluginRegistry::new(RegistryConfig::new().auto_start(true));

        registry
            .register(
                Tracked::new("broken", &log)
                    .start_behavior(StartBehavior::Fail)
                    .arc(),
            )
            .await
            .unwrap();

        assert!(registry.has("broken"));
        assert_eq!(registry.state("broken"), Some(PluginState::Error));
        let last = registry.last_error("broken").unwrap();
        assert_eq!(last.code, ErrorCode::StartFailed);

        let err = registry
            .register(Tracked::new("broken", &log).arc())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PluginAlreadyRegistered);
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_dependency_fails_before_any_hook() {
        let log = journal();
        let registry = registry();
        registry
            .register(Tracked::new("app", &log).depends_on("db").arc())
            .await
            .unwrap();

        let err = registry.start("app").await.unwrap_err();

        assert_eq!(err.code, ErrorCode::MissingDependency);
        assert_eq!(err.kind, PluginErrorKind::Dependency);
        assert!(entries(&log).is_empty());
        assert_eq!(registry.state("app"), Some(PluginState::Uninitialized));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_start_times_out_into_error() {
        let log = journal();
        let registry = PluginRegistry::new(
            RegistryConfig::new().startup_timeout(Duration::from_millis(200)),
        );
        let errors = count_events(&registry, names::PLUGIN_ERROR);
        registry
            .register(
                Tracked::new("stuck", &log)
                    .start_behavior(StartBehavior::Hang)
                    .arc(),
            )
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        let err = registry.start("stuck").await.unwrap_err();

        assert_eq!(err.code, ErrorCode::HookTimeout);
        assert_eq!(err.kind, PluginErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_millis(250));
        assert_eq!(registry.state("stuck"), Some(PluginState::Error));
        assert_eq!(
            registry.last_error("stuck").map(|e| e.code),
            Some(ErrorCode::HookTimeout)
        );
        assert!(
            registry
                .context("stuck")
                .unwrap()
                .cancellation_token()
                .is_cancelled()
        );

        registry.events().flush().await;
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(registry.metrics().counter("hooks.timeouts").get(), 1);
    }

    #[tokio::test]
    async fn test_failed_start_reports_start_failed() {
        let log = journal();
        let registry = registry();
        registry
            .register(
                Tracked::new("broken", &log)
                    .start_behavior(StartBehavior::Fail)
                    .arc(),
            )
            .await
            .unwrap();

        let err = registry.start("broken").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::StartFailed);
        assert_eq!(registry.state("broken"), Some(PluginState::Error));

        let health = registry.health("broken").await.unwrap();
        assert_eq!(health.status, HealthStatus::Unhealthy);

        // errored plugins can only be torn down
        assert!(registry.unregister("broken").await.unwrap());
        assert!(entries(&log).contains(&"broken:destroy".to_string()));
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_restart_cycles() {
        let log = journal();
        let registry = registry();
        let restarted = count_events(&registry, names::PLUGIN_RESTARTED);
        registry.register(Tracked::new("p", &log).arc()).await.unwrap();

        registry.start("p").await.unwrap();
        registry.start("p").await.unwrap();
        registry.restart("p").await.unwrap();

        assert_eq!(registry.state("p"), Some(PluginState::Started));
        assert_eq!(entries(&log), vec!["p:init", "p:start", "p:stop", "p:start"]);
        registry.events().flush().await;
        assert_eq!(restarted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disable_stops_and_blocks_start() {
        let log = journal();
        let registry = registry();
        registry.register(Tracked::new("p", &log).arc()).await.unwrap();
        registry.start("p").await.unwrap();

        registry.disable("p").await.unwrap();
        assert_eq!(registry.state("p"), Some(PluginState::Stopped));
        assert!(!registry.plugin_config("p").unwrap().enabled);

        let err = registry.start("p").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::PluginDisabled);

        registry.enable("p").await.unwrap();
        assert_eq!(registry.state("p"), Some(PluginState::Stopped));
        registry.start("p").await.unwrap();
        assert_eq!(registry.state("p"), Some(PluginState::Started));
    }

    #[tokio::test]
    async fn test_enable_auto_starts_when_registry_does() {
        let log = journal();
        let registry = PluginRegistry::new(RegistryConfig::new().auto_start(true));
        registry
            .register_with_config(Tracked::new("p", &log).arc(), PluginConfig::disabled())
            .await
            .unwrap();
        assert_eq!(registry.state("p"), Some(PluginState::Uninitialized));

        registry.enable("p").await.unwrap();
        assert_eq!(registry.state("p"), Some(PluginState::Started));
    }

    #[tokio::test]
    async fn test_interceptors_follow_started_state() {
        let log = journal();
        let registry = registry();
        registry
            .register(Tracked::new("tagger", &log).with_interceptor().arc())
            .await
            .unwrap();
        let chains = registry.http_client().interceptors();

        assert!(chains.request.is_empty());
        registry.start("tagger").await.unwrap();
        assert_eq!(chains.request.len(), 1);
        registry.stop("tagger").await.unwrap();
        assert!(chains.request.is_empty());
        registry.start("tagger").await.unwrap();
        assert_eq!(chains.request.len(), 1);
        registry.unregister("tagger").await.unwrap();
        assert!(chains.request.is_empty());
    }

    #[tokio::test]
    async fn test_state_changes_are_emitted_and_mirrored() {
        let log = journal();
        let registry = registry();
        let transitions = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&transitions);
        registry.events().on(names::PLUGIN_STATE_CHANGED, move |event| {
            sink.lock()
                .unwrap()
                .push(event.payload["to"].as_str().unwrap_or_default().to_string());
        });
        let mirrored = count_events(&registry, "plugin:p:started");

        registry.register(Tracked::new("p", &log).arc()).await.unwrap();
        registry.start("p").await.unwrap();
        registry.events().flush().await;

        assert_eq!(
            *transitions.lock().unwrap(),
            vec!["initializing", "initialized", "starting", "started"]
        );
        assert_eq!(mirrored.load(Ordering::SeqCst), 1);
    }
}

// =============================================================================
// Hooks and configuration
// =============================================================================

mod config_tests {
    use super::*;

    /// Integer `level` in 0..=5; level 3 is refused by the plugin itself, and
    /// the hooks veto any change while `locked` is set.
    struct Tunable {
        metadata: PluginMetadata,
        applied: Arc<Mutex<Vec<u64>>>,
        hooks: Gate,
    }

    struct Gate {
        journal: Journal,
    }

    impl Tunable {
        fn new(journal: &Journal) -> Self {
            Self {
                metadata: PluginMetadata::new("tunable", "Tunable", "1.0.0")
                    .with_type(PluginType::Transform),
                applied: Arc::new(Mutex::new(Vec::new())),
                hooks: Gate {
                    journal: Arc::clone(journal),
                },
            }
        }
    }

    #[async_trait]
    impl PluginHooks for Gate {
        async fn before_start(&self, _ctx: &PluginContext) -> PluginResult<()> {
            self.journal.lock().unwrap().push("before_start".into());
            Ok(())
        }

        async fn after_start(&self, _ctx: &PluginContext) -> PluginResult<()> {
            self.journal.lock().unwrap().push("after_start".into());
            Ok(())
        }

        async fn on_config_change(
            &self,
            old: &PluginConfig,
            _new: &PluginConfig,
            ctx: &PluginContext,
        ) -> PluginResult<()> {
            if old.get_bool("locked") == Some(true) {
                return Err(PluginError::hook(ctx.plugin_id(), "configuration is locked"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Plugin for Tunable {
        fn metadata(&self) -> &PluginMetadata {
            &self.metadata
        }

        fn default_config(&self) -> PluginConfig {
            PluginConfig::new().with("level", 1)
        }

        fn config_schema(&self) -> Option<ConfigSchema> {
            Some(
                ConfigSchema::object()
                    .property(
                        "level",
                        ConfigSchema::integer().with_range(Some(0.0), Some(5.0)),
                    )
                    .property("locked", ConfigSchema::boolean())
                    .require("level"),
            )
        }

        fn hooks(&self) -> Option<&dyn PluginHooks> {
            Some(&self.hooks)
        }

        async fn start(&self, _ctx: &PluginContext) -> PluginResult<()> {
            self.hooks.journal.lock().unwrap().push("start".into());
            Ok(())
        }

        async fn health(&self, ctx: &PluginContext) -> Option<PluginHealth> {
            let level = ctx.config().get_u64("level").unwrap_or(0);
            Some(if level >= 4 {
                PluginHealth::degraded("running hot")
            } else {
                PluginHealth::healthy()
            })
        }

        fn validate_config(&self, config: &PluginConfig) -> Result<(), String> {
            match config.get_u64("level") {
                Some(3) => Err("level 3 is reserved".into()),
                _ => Ok(()),
            }
        }

        async fn update_config(
            &self,
            config: &PluginConfig,
            _ctx: &PluginContext,
        ) -> PluginResult<()> {
            if let Some(level) = config.get_u64("level") {
                self.applied.lock().unwrap().push(level);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_hooks_wrap_start() {
        let log = journal();
        let registry = registry();
        registry.register(Arc::new(Tunable::new(&log))).await.unwrap();
        registry.start("tunable").await.unwrap();
        assert_eq!(entries(&log), vec!["before_start", "start", "after_start"]);
    }

    #[tokio::test]
    async fn test_update_config_merges_and_emits() {
        let log = journal();
        let registry = registry();
        let plugin = Arc::new(Tunable::new(&log));
        let applied = Arc::clone(&plugin.applied);
        registry.register(plugin).await.unwrap();

        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&changes);
        registry.events().on(names::PLUGIN_CONFIG_CHANGED, move |event| {
            sink.lock().unwrap().push(event.payload.clone());
        });

        let stored = registry
            .update_config("tunable", json!({ "level": 4 }))
            .await
            .unwrap();
        assert_eq!(stored.get_u64("level"), Some(4));
        assert_eq!(
            registry.plugin_config("tunable").unwrap().get_u64("level"),
            Some(4)
        );
        assert_eq!(
            registry
                .context("tunable")
                .unwrap()
                .config()
                .get_u64("level"),
            Some(4)
        );
        assert_eq!(*applied.lock().unwrap(), vec![4]);

        registry.events().flush().await;
        let changes = changes.lock().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0]["old"]["level"], 1);
        assert_eq!(changes[0]["new"]["level"], 4);
    }

    #[tokio::test]
    async fn test_update_config_rejections_leave_config_untouched() {
        let log = journal();
        let registry = registry();
        registry.register(Arc::new(Tunable::new(&log))).await.unwrap();

        let schema = registry
            .update_config("tunable", json!({ "level": 9 }))
            .await
            .unwrap_err();
        assert_eq!(schema.code, ErrorCode::ValidationFailed);

        let rejected = registry
            .update_config("tunable", json!({ "level": 3 }))
            .await
            .unwrap_err();
        assert_eq!(rejected.code, ErrorCode::ConfigRejected);
        assert_eq!(rejected.kind, PluginErrorKind::Validation);

        registry
            .update_config("tunable", json!({ "locked": true }))
            .await
            .unwrap();
        let vetoed = registry
            .update_config("tunable", json!({ "level": 2 }))
            .await
            .unwrap_err();
        assert_eq!(vetoed.code, ErrorCode::HookFailed);

        let config = registry.plugin_config("tunable").unwrap();
        assert_eq!(config.get_u64("level"), Some(1));
        assert_eq!(registry.state("tunable"), Some(PluginState::Uninitialized));
    }

    #[tokio::test]
    async fn test_health_reported_by_plugin_while_started() {
        let log = journal();
        let registry = registry();
        registry.register(Arc::new(Tunable::new(&log))).await.unwrap();

        let idle = registry.health("tunable").await.unwrap();
        assert_eq!(idle.status, HealthStatus::Degraded);

        registry.start("tunable").await.unwrap();
        assert_eq!(
            registry.health("tunable").await.unwrap().status,
            HealthStatus::Healthy
        );

        registry
            .update_config("tunable", json!({ "level": 5 }))
            .await
            .unwrap();
        let report = registry.health_report().await;
        assert_eq!(report["tunable"].status, HealthStatus::Degraded);

        let err = registry.health("ghost").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::PluginNotFound);
    }
}

// =============================================================================
// Stats and teardown
// =============================================================================

mod teardown_tests {
    use super::*;

    #[tokio::test]
    async fn test_stats_snapshot() {
        let log = journal();
        let registry = registry();
        registry.register(Tracked::new("core", &log).arc()).await.unwrap();
        registry
            .register(Tracked::new("app", &log).depends_on("core").arc())
            .await
            .unwrap();
        registry
            .register_with_config(Tracked::new("idle", &log).arc(), PluginConfig::disabled())
            .await
            .unwrap();
        registry.start("app").await.unwrap();

        let stats = registry.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.enabled, 2);
        assert_eq!(stats.disabled, 1);
        assert_eq!(stats.count_in_state("started"), 2);
        assert_eq!(stats.count_in_state("uninitialized"), 1);
        assert_eq!(stats.by_type["custom"], 3);
        assert_eq!(stats.load_order, vec!["core", "app", "idle"]);
        assert_eq!(stats.dependencies["app"], vec!["core"]);
        assert_eq!(stats.health.healthy, 2);
        assert_eq!(stats.health.degraded, 1);

        let exported = serde_json::to_value(&stats).unwrap();
        assert_eq!(exported["total"], 3);
    }

    #[tokio::test]
    async fn test_unregister_tears_down_and_reports() {
        let log = journal();
        let registry = registry();
        let unregistered = count_events(&registry, names::PLUGIN_UNREGISTERED);
        registry.register(Tracked::new("p", &log).arc()).await.unwrap();
        registry.start("p").await.unwrap();
        registry
            .context("p")
            .unwrap()
            .cache
            .set("token", json!("abc"), None);

        assert!(registry.unregister("p").await.unwrap());
        assert!(!registry.unregister("p").await.unwrap());

        assert_eq!(entries(&log), vec!["p:init", "p:start", "p:stop", "p:destroy"]);
        assert!(registry.cache().is_empty());
        registry.events().flush().await;
        assert_eq!(unregistered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent() {
        let log = journal();
        let registry = registry();
        let unregistered = count_events(&registry, names::PLUGIN_UNREGISTERED);
        let stopped = count_events(&registry, names::PLUGIN_STOPPED);
        let disposed = count_events(&registry, names::REGISTRY_DISPOSED);

        registry.register(Tracked::new("A", &log).arc()).await.unwrap();
        registry
            .register(Tracked::new("B", &log).depends_on("A").arc())
            .await
            .unwrap();
        registry.start_all().await.unwrap();

        registry.dispose().await;
        registry.dispose().await;
        registry.events().flush().await;

        assert!(registry.is_disposed());
        assert!(registry.is_empty());
        assert_eq!(unregistered.load(Ordering::SeqCst), 2);
        assert_eq!(stopped.load(Ordering::SeqCst), 2);
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert_eq!(
            entries(&log),
            vec![
                "A:init", "A:start", "B:init", "B:start", "B:stop", "A:stop", "B:destroy",
                "A:destroy"
            ]
        );

        let err = registry
            .register(Tracked::new("late", &log).arc())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RegistryDisposed);
        assert_eq!(
            registry.start("A").await.unwrap_err().code,
            ErrorCode::RegistryDisposed
        );
    }

    #[tokio::test]
    async fn test_context_does_not_keep_registry_alive() {
        let log = journal();
        let registry = registry();
        registry.register(Tracked::new("p", &log).arc()).await.unwrap();
        let ctx = registry.context("p").unwrap();
        assert!(ctx.registry().is_some());

        drop(registry);
        assert!(ctx.registry().is_none());
    }
}
