use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use futures::future::BoxFuture;
use serde_json::{Value, json};

use super::config::RegistryConfig;
use super::entry::PluginEntry;
use super::lifecycle::{HookBudget, HookRunner};
use super::stats::RegistryStats;
use crate::cache::CacheStore;
use crate::client::HttpClient;
use crate::events::{EventEmitter, names};
use crate::graph::DependencyGraph;
use crate::observability::{MetricsRegistry, PluginLogger};
use crate::plugin::{
    ErrorCode, HealthStatus, Plugin, PluginConfig, PluginContext, PluginError, PluginHealth,
    PluginMetadata, PluginResult, PluginState, PluginType,
};
use crate::validation::{ValidationReport, Validator, version_satisfies};

/// Loads, orders and supervises plugins.
///
/// Always held in an `Arc` (see [`PluginRegistry::new`]) so that plugin
/// contexts can keep a weak link back to it. Operations on different plugins
/// run concurrently; operations on the same plugin are serialized, and
/// register/unregister/dispose are serialized against each other.
pub struct PluginRegistry {
    config: RegistryConfig,
    validator: Validator,
    entries: dashmap::DashMap<String, Arc<PluginEntry>>,
    graph: RwLock<DependencyGraph>,
    structure: tokio::sync::Mutex<()>,
    disposed: AtomicBool,
    runner: HookRunner,
    events: EventEmitter,
    logger: PluginLogger,
    metrics: MetricsRegistry,
    cache: CacheStore,
    http: HttpClient,
    this: Weak<PluginRegistry>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.ids())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

/// Shared services a registry hands (scoped) to its plugins.
pub(crate) struct Services {
    pub(crate) events: EventEmitter,
    pub(crate) logger: PluginLogger,
    pub(crate) metrics: MetricsRegistry,
    pub(crate) cache: CacheStore,
    pub(crate) http: HttpClient,
}

impl PluginRegistry {
    /// Registry with default services.
    pub fn new(config: RegistryConfig) -> Arc<Self> {
        super::RegistryBuilder::new().config(config).build()
    }

    pub fn builder() -> super::RegistryBuilder {
        super::RegistryBuilder::new()
    }

    pub(crate) fn from_parts(
        config: RegistryConfig,
        validator: Validator,
        services: Services,
    ) -> Arc<Self> {
        let runner = HookRunner::new(
            config.hook_timeout,
            config.startup_timeout,
            config.shutdown_timeout,
            config.enforce_timeouts,
            services.metrics.clone(),
        );
        Arc::new_cyclic(|this| Self {
            config,
            validator,
            entries: dashmap::DashMap::new(),
            graph: RwLock::new(DependencyGraph::new()),
            structure: tokio::sync::Mutex::new(()),
            disposed: AtomicBool::new(false),
            runner,
            events: services.events,
            logger: services.logger,
            metrics: services.metrics,
            cache: services.cache,
            http: services.http,
            this: this.clone(),
        })
    }

    // ---- registration ----------------------------------------------------

    /// Registers `plugin` with its [`Plugin::default_config`].
    pub async fn register(&self, plugin: Arc<dyn Plugin>) -> PluginResult<ValidationReport> {
        let config = plugin.default_config();
        self.register_with_config(plugin, config).await
    }

    /// Validates and admits `plugin`, then starts it if the registry
    /// auto-starts and `config.enabled` is set.
    ///
    /// A rejected registration leaves the registry exactly as it was.
    /// Auto-start waits while a required dependency is unregistered, and an
    /// auto-start failure is reported through [`last_error`](Self::last_error)
    /// rather than the returned result.
    pub async fn register_with_config(
        &self,
        plugin: Arc<dyn Plugin>,
        config: PluginConfig,
    ) -> PluginResult<ValidationReport> {
        let id = plugin.metadata().id.clone();
        let report = {
            let _structure = self.structure.lock().await;
            self.ensure_live(&id)?;

            if self.entries.contains_key(&id) {
                return Err(PluginError::configuration(
                    &id,
                    ErrorCode::PluginAlreadyRegistered,
                    format!("plugin '{}' is already registered", id),
                ));
            }
            if self.entries.len() >= self.config.max_plugins {
                return Err(PluginError::runtime(
                    &id,
                    ErrorCode::RegistryFull,
                    format!("registry is full ({} plugins)", self.config.max_plugins),
                ));
            }

            let report = self.validator.validate_plugin(plugin.as_ref(), &config)?;
            self.check_dependency_versions(plugin.metadata())?;
            let graph = self.graph_with(plugin.metadata())?;

            *self.graph_mut() = graph;
            let context = PluginContext::new(
                &id,
                &self.logger,
                &self.metrics,
                &self.cache,
                &self.events,
                self.http.clone(),
                self.this.clone(),
                config,
            );
            let entry = Arc::new(PluginEntry::new(plugin, context));
            self.entries.insert(id.clone(), Arc::clone(&entry));

            self.metrics.increment("plugins.registered");
            self.metrics
                .set_gauge("plugins.active", self.entries.len() as i64);
            tracing::info!(
                plugin = %id,
                version = %entry.metadata().version,
                plugin_type = entry.metadata().plugin_type.as_str(),
                "Plugin registered"
            );
            self.emit(
                &entry,
                names::PLUGIN_REGISTERED,
                json!({
                    "id": id,
                    "version": entry.metadata().version,
                    "type": entry.metadata().plugin_type,
                }),
            );
            report
        };

        let Some(entry) = self.entry(&id) else {
            return Ok(report);
        };
        if !self.config.auto_start || !entry.config().enabled {
            return Ok(report);
        }
        if let Some(missing) = self.unregistered_dependency(&id) {
            tracing::debug!(
                plugin = %id,
                dependency = %missing,
                "Auto-start deferred until dependencies are registered"
            );
            return Ok(report);
        }
        // the plugin stays registered; the failure lives in `last_error`
        if let Err(e) = self.start(&id).await {
            entry.record_error(&e);
            tracing::warn!(plugin = %id, error = %e, "Auto-start failed");
        }
        Ok(report)
    }

    /// Stops and destroys `id`, then forgets it.
    ///
    /// Returns `false` when no such plugin is registered. Teardown failures
    /// are logged and recorded but never keep the plugin registered.
    pub async fn unregister(&self, id: &str) -> PluginResult<bool> {
        let _structure = self.structure.lock().await;
        self.ensure_live(id)?;

        let Some(entry) = self.entry(id) else {
            return Ok(false);
        };
        let _op = entry.op_lock.lock().await;

        let started_dependents: Vec<String> = self
            .graph()
            .dependents(id)
            .into_iter()
            .filter(|d| self.state(d) == Some(PluginState::Started))
            .collect();
        if !started_dependents.is_empty() {
            tracing::warn!(
                plugin = %id,
                dependents = ?started_dependents,
                "Unregistering a plugin that running plugins depend on"
            );
        }

        if entry.state() == PluginState::Started
            && let Err(e) = self.stop_entry(&entry).await
        {
            tracing::warn!(plugin = %id, error = %e, "Stop failed during unregister");
        }
        if entry.state() != PluginState::Destroyed
            && let Err(e) = self.destroy_entry(&entry).await
        {
            tracing::warn!(plugin = %id, error = %e, "Destroy failed during unregister");
        }

        self.entries.remove(id);
        self.graph_mut().remove_plugin(id);
        entry.context.cache.clear();
        self.metrics
            .set_gauge("plugins.active", self.entries.len() as i64);

        tracing::info!(plugin = %id, "Plugin unregistered");
        self.emit(&entry, names::PLUGIN_UNREGISTERED, json!({ "id": id }));
        Ok(true)
    }

    /// Existing plugins' constraints on `metadata`, and `metadata`'s
    /// constraints on existing plugins.
    fn check_dependency_versions(&self, metadata: &PluginMetadata) -> PluginResult<()> {
        let id = metadata.id.as_str();

        for dependency in &metadata.dependencies {
            match self.entry(&dependency.id) {
                Some(existing) => {
                    let found = existing.metadata().version.as_str();
                    if !version_satisfies(&dependency.version, found) {
                        if dependency.optional {
                            tracing::warn!(
                                plugin = %id,
                                dependency = %dependency.id,
                                required = %dependency.version,
                                found,
                                "Optional dependency version is incompatible"
                            );
                            continue;
                        }
                        return Err(PluginError::dependency(
                            id,
                            ErrorCode::IncompatibleDependency,
                            format!(
                                "requires '{}' {} but {} is registered",
                                dependency.id, dependency.version, found
                            ),
                        )
                        .with_context(json!({
                            "dependency": dependency.id,
                            "required": dependency.version,
                            "found": found,
                        })));
                    }
                }
                None if dependency.optional => {}
                None if self.config.strict_dependencies => {
                    return Err(PluginError::dependency(
                        id,
                        ErrorCode::MissingDependency,
                        format!("required dependency '{}' is not registered", dependency.id),
                    )
                    .with_context(json!({ "dependency": dependency.id })));
                }
                None => {
                    tracing::debug!(
                        plugin = %id,
                        dependency = %dependency.id,
                        "Dependency not registered yet; checked again on start"
                    );
                }
            }
        }

        for dependency in &metadata.peer_dependencies {
            if let Some(existing) = self.entry(&dependency.id)
                && !version_satisfies(&dependency.version, &existing.metadata().version)
            {
                tracing::warn!(
                    plugin = %id,
                    peer = %dependency.id,
                    required = %dependency.version,
                    found = %existing.metadata().version,
                    "Peer dependency version is incompatible"
                );
            }
        }

        for existing in self.entries.iter() {
            let dependent = existing.value();
            for dependency in &dependent.metadata().dependencies {
                if dependency.id == id
                    && !dependency.optional
                    && !version_satisfies(&dependency.version, &metadata.version)
                {
                    return Err(PluginError::dependency(
                        id,
                        ErrorCode::IncompatibleDependency,
                        format!(
                            "'{}' requires '{}' {} but this is {}",
                            dependent.id(),
                            id,
                            dependency.version,
                            metadata.version
                        ),
                    )
                    .with_context(json!({
                        "dependent": dependent.id(),
                        "required": dependency.version,
                        "found": metadata.version,
                    })));
                }
            }
        }

        Ok(())
    }

    /// The graph as it would be with `metadata` added; the live graph is
    /// untouched, so a rejected candidate needs no rollback.
    fn graph_with(&self, metadata: &PluginMetadata) -> PluginResult<DependencyGraph> {
        let id = metadata.id.as_str();
        let mut candidate = self.graph().clone();

        let dependencies: Vec<&str> = metadata
            .dependencies
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        candidate.add_plugin(id, &dependencies);

        // restore edges from plugins that declared `id` before it existed
        for existing in self.entries.iter() {
            if existing
                .metadata()
                .dependencies
                .iter()
                .any(|d| d.id == id)
            {
                candidate.add_plugin(existing.key(), &[id]);
            }
        }

        if candidate.has_circular_dependency(id) {
            // the graph was acyclic before, so any cycle runs through `id`
            let cycle = candidate
                .dependencies(id)
                .iter()
                .find_map(|dependency| candidate.dependency_path(dependency, id))
                .map(|path| std::iter::once(id.to_string()).chain(path).collect())
                .unwrap_or_else(|| vec![id.to_string()]);
            let involved = match candidate.load_order() {
                Err(e) => e
                    .context
                    .and_then(|c| c.get("unresolved").cloned())
                    .unwrap_or(Value::Null),
                Ok(_) => Value::Null,
            };
            return Err(PluginError::dependency(
                id,
                ErrorCode::CircularDependency,
                format!("registering '{}' would create a cycle: {}", id, cycle.join(" -> ")),
            )
            .with_context(json!({ "cycle": cycle, "unresolved": involved })));
        }

        Ok(candidate)
    }

    // ---- lifecycle -------------------------------------------------------

    /// Initializes `id` (and its required dependencies, dependencies first).
    pub async fn initialize(&self, id: &str) -> PluginResult<()> {
        self.initialize_boxed(id).await
    }

    fn initialize_boxed<'a>(&'a self, id: &'a str) -> BoxFuture<'a, PluginResult<()>> {
        Box::pin(async move {
            self.ensure_live(id)?;
            let entry = self.entry(id).ok_or_else(|| PluginError::not_found(id))?;
            self.ensure_dependencies_registered(&entry)?;

            for dependency in entry.metadata().required_dependency_ids() {
                self.initialize_boxed(dependency).await?;
            }

            let _op = entry.op_lock.lock().await;
            match entry.state() {
                PluginState::Uninitialized | PluginState::Error | PluginState::Destroyed => {
                    self.initialize_entry(&entry).await
                }
                _ => Ok(()),
            }
        })
    }

    /// Starts `id`, starting its required dependencies first.
    ///
    /// No-op if already started. Fails with `PLUGIN_DISABLED` for a disabled
    /// plugin and with `MISSING_DEPENDENCY` before any hook runs if a
    /// required dependency is not registered.
    pub async fn start(&self, id: &str) -> PluginResult<()> {
        self.start_boxed(id).await
    }

    fn start_boxed<'a>(&'a self, id: &'a str) -> BoxFuture<'a, PluginResult<()>> {
        Box::pin(async move {
            self.ensure_live(id)?;
            let entry = self.entry(id).ok_or_else(|| PluginError::not_found(id))?;

            if entry.state() == PluginState::Started {
                return Ok(());
            }
            if !entry.config().enabled {
                return Err(PluginError::runtime(
                    id,
                    ErrorCode::PluginDisabled,
                    format!("plugin '{}' is disabled", id),
                ));
            }
            self.ensure_dependencies_registered(&entry)?;

            for dependency in entry.metadata().required_dependency_ids() {
                self.start_boxed(dependency).await?;
            }

            let _op = entry.op_lock.lock().await;
            match entry.state() {
                PluginState::Started => return Ok(()),
                PluginState::Uninitialized => self.initialize_entry(&entry).await?,
                _ => {}
            }
            self.start_entry(&entry).await
        })
    }

    /// Stops `id` if it is started; otherwise a no-op.
    pub async fn stop(&self, id: &str) -> PluginResult<()> {
        self.ensure_live(id)?;
        let entry = self.entry(id).ok_or_else(|| PluginError::not_found(id))?;
        let _op = entry.op_lock.lock().await;
        if entry.state() != PluginState::Started {
            return Ok(());
        }
        self.stop_entry(&entry).await
    }

    pub async fn restart(&self, id: &str) -> PluginResult<()> {
        self.stop(id).await?;
        self.start(id).await?;
        if let Some(entry) = self.entry(id) {
            self.emit(&entry, names::PLUGIN_RESTARTED, json!({ "id": id }));
        }
        Ok(())
    }

    /// Sets `config.enabled`; starts the plugin when the registry auto-starts.
    pub async fn enable(&self, id: &str) -> PluginResult<()> {
        self.ensure_live(id)?;
        let entry = self.entry(id).ok_or_else(|| PluginError::not_found(id))?;
        {
            let _op = entry.op_lock.lock().await;
            if !entry.set_enabled(true) {
                tracing::info!(plugin = %id, "Plugin enabled");
                self.emit(&entry, names::PLUGIN_ENABLED, json!({ "id": id }));
            }
        }
        if self.config.auto_start && entry.state() != PluginState::Started {
            self.start(id).await?;
        }
        Ok(())
    }

    /// Stops the plugin if started, then clears `config.enabled`.
    pub async fn disable(&self, id: &str) -> PluginResult<()> {
        self.ensure_live(id)?;
        let entry = self.entry(id).ok_or_else(|| PluginError::not_found(id))?;
        let _op = entry.op_lock.lock().await;
        if entry.state() == PluginState::Started {
            self.stop_entry(&entry).await?;
        }
        if entry.set_enabled(false) {
            tracing::info!(plugin = %id, "Plugin disabled");
            self.emit(&entry, names::PLUGIN_DISABLED, json!({ "id": id }));
        }
        Ok(())
    }

    /// Shallow-merges `partial` into the plugin's config.
    ///
    /// The merged config must satisfy the plugin's schema, its own
    /// `validate_config`, and any `on_config_change` hook before the plugin's
    /// `update_config` applies it. Returns the stored config.
    pub async fn update_config(&self, id: &str, partial: Value) -> PluginResult<PluginConfig> {
        self.ensure_live(id)?;
        let entry = self.entry(id).ok_or_else(|| PluginError::not_found(id))?;
        let _op = entry.op_lock.lock().await;

        let old = entry.config();
        let new = old.merged(&partial);

        if let Some(schema) = entry.plugin.config_schema() {
            self.validator.validate_config(id, &schema, &new)?;
        }
        if let Err(reason) = entry.plugin.validate_config(&new) {
            return Err(PluginError::config_rejected(
                id,
                format!("configuration rejected: {}", reason),
            ));
        }

        let ctx = &entry.context;
        let applied = async {
            if let Some(hooks) = entry.plugin.hooks() {
                self.runner
                    .run(
                        ctx,
                        "on_config_change",
                        HookBudget::Hook,
                        hooks.on_config_change(&old, &new, ctx),
                    )
                    .await?;
            }
            self.runner
                .run(
                    ctx,
                    "update_config",
                    HookBudget::Hook,
                    entry.plugin.update_config(&new, ctx),
                )
                .await
        }
        .await;

        if let Err(e) = applied {
            if e.is_timeout() {
                return Err(self.fail(&entry, e).await);
            }
            entry.record_error(&e);
            return Err(e);
        }

        entry.set_config(new.clone());
        tracing::info!(plugin = %id, "Plugin configuration updated");
        self.emit(
            &entry,
            names::PLUGIN_CONFIG_CHANGED,
            json!({ "id": id, "old": old.to_value(), "new": new.to_value() }),
        );
        Ok(new)
    }

    /// Health reported by the plugin while started, else derived from state.
    pub async fn health(&self, id: &str) -> PluginResult<PluginHealth> {
        self.ensure_live(id)?;
        let entry = self.entry(id).ok_or_else(|| PluginError::not_found(id))?;
        let _op = entry.op_lock.lock().await;

        let state = entry.state();
        let enabled = entry.config().enabled;
        if state != PluginState::Started {
            return Ok(PluginHealth::from_state(state, enabled));
        }

        let ctx = &entry.context;
        let reported = self
            .runner
            .run(ctx, "health", HookBudget::Hook, async {
                Ok(entry.plugin.health(ctx).await)
            })
            .await;

        match reported {
            Ok(Some(health)) => Ok(health),
            Ok(None) => Ok(PluginHealth::from_state(state, enabled)),
            Err(e) => Err(self.fail(&entry, e).await),
        }
    }

    /// Health of every plugin, keyed by id.
    pub async fn health_report(&self) -> BTreeMap<String, PluginHealth> {
        let mut report = BTreeMap::new();
        for id in self.ids() {
            let health = match self.health(&id).await {
                Ok(health) => health,
                Err(e) => PluginHealth::unhealthy(e.message),
            };
            report.insert(id, health);
        }
        report
    }

    /// Starts every enabled plugin in load order.
    pub async fn start_all(&self) -> PluginResult<()> {
        for id in self.load_order()? {
            let enabled = self.entry(&id).is_some_and(|e| e.config().enabled);
            if enabled {
                self.start(&id).await?;
            }
        }
        Ok(())
    }

    /// Stops every started plugin, dependents before dependencies.
    pub async fn stop_all(&self) -> PluginResult<()> {
        for id in self.load_order()?.into_iter().rev() {
            self.stop(&id).await?;
        }
        Ok(())
    }

    /// Tears everything down. Idempotent.
    ///
    /// Plugins are stopped dependents-first, then destroyed; hook failures
    /// are logged. Afterwards every mutating call fails with
    /// `REGISTRY_DISPOSED`.
    pub async fn dispose(&self) {
        let _structure = self.structure.lock().await;
        if self.disposed.load(Ordering::Acquire) {
            return;
        }

        let mut order = self.load_order().unwrap_or_else(|_| self.ids());
        order.reverse();

        for id in &order {
            let Some(entry) = self.entry(id) else { continue };
            let _op = entry.op_lock.lock().await;
            if entry.state() == PluginState::Started
                && let Err(e) = self.stop_entry(&entry).await
            {
                tracing::warn!(plugin = %id, error = %e, "Stop failed during dispose");
            }
        }

        for id in &order {
            let Some(entry) = self.entry(id) else { continue };
            let _op = entry.op_lock.lock().await;
            if entry.state() != PluginState::Destroyed
                && let Err(e) = self.destroy_entry(&entry).await
            {
                tracing::warn!(plugin = %id, error = %e, "Destroy failed during dispose");
            }
            self.emit(&entry, names::PLUGIN_UNREGISTERED, json!({ "id": id }));
        }

        self.entries.clear();
        self.graph_mut().clear();
        self.cache.dispose();
        self.metrics.dispose();
        self.disposed.store(true, Ordering::Release);

        tracing::info!(plugins = order.len(), "Registry disposed");
        self.events
            .emit(names::REGISTRY_DISPOSED, json!({ "plugins": order.len() }));
        self.events.flush().await;
    }

    // ---- lifecycle steps (caller holds the plugin's op lock) -------------

    async fn initialize_entry(&self, entry: &PluginEntry) -> PluginResult<()> {
        self.transition(entry, PluginState::Initializing)?;
        let ctx = &entry.context;
        let plugin = &entry.plugin;

        let result: PluginResult<()> = async {
            if let Some(hooks) = plugin.hooks() {
                self.runner
                    .run(ctx, "before_init", HookBudget::Hook, hooks.before_init(ctx))
                    .await?;
            }
            self.runner
                .run(ctx, "init", HookBudget::Startup, plugin.init(ctx))
                .await?;
            if let Some(hooks) = plugin.hooks() {
                self.runner
                    .run(ctx, "after_init", HookBudget::Hook, hooks.after_init(ctx))
                    .await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.transition(entry, PluginState::Initialized)?;
                tracing::debug!(plugin = %entry.id(), "Plugin initialized");
                self.emit(entry, names::PLUGIN_INITIALIZED, json!({ "id": entry.id() }));
                Ok(())
            }
            Err(e) => Err(self.fail(entry, e.in_phase(ErrorCode::InitFailed)).await),
        }
    }

    async fn start_entry(&self, entry: &PluginEntry) -> PluginResult<()> {
        entry.context.renew_cancellation();
        self.transition(entry, PluginState::Starting)?;
        let ctx = &entry.context;
        let plugin = &entry.plugin;

        let result: PluginResult<()> = async {
            if let Some(hooks) = plugin.hooks() {
                self.runner
                    .run(ctx, "before_start", HookBudget::Hook, hooks.before_start(ctx))
                    .await?;
            }
            self.runner
                .run(ctx, "start", HookBudget::Startup, plugin.start(ctx))
                .await?;
            self.install_interceptors(entry);
            if let Some(hooks) = plugin.hooks() {
                self.runner
                    .run(ctx, "after_start", HookBudget::Hook, hooks.after_start(ctx))
                    .await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.transition(entry, PluginState::Started)?;
                self.metrics.increment("plugins.started");
                tracing::info!(plugin = %entry.id(), "Plugin started");
                self.emit(entry, names::PLUGIN_STARTED, json!({ "id": entry.id() }));
                Ok(())
            }
            Err(e) => {
                self.eject_interceptors(entry);
                Err(self.fail(entry, e.in_phase(ErrorCode::StartFailed)).await)
            }
        }
    }

    async fn stop_entry(&self, entry: &PluginEntry) -> PluginResult<()> {
        self.transition(entry, PluginState::Stopping)?;
        let ctx = &entry.context;
        let plugin = &entry.plugin;

        let result: PluginResult<()> = async {
            if let Some(hooks) = plugin.hooks() {
                self.runner
                    .run(ctx, "before_stop", HookBudget::Hook, hooks.before_stop(ctx))
                    .await?;
            }
            self.eject_interceptors(entry);
            self.runner
                .run(ctx, "stop", HookBudget::Shutdown, plugin.stop(ctx))
                .await?;
            if let Some(hooks) = plugin.hooks() {
                self.runner
                    .run(ctx, "after_stop", HookBudget::Hook, hooks.after_stop(ctx))
                    .await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.transition(entry, PluginState::Stopped)?;
                tracing::info!(plugin = %entry.id(), "Plugin stopped");
                self.emit(entry, names::PLUGIN_STOPPED, json!({ "id": entry.id() }));
                Ok(())
            }
            Err(e) => {
                self.eject_interceptors(entry);
                Err(self.fail(entry, e.in_phase(ErrorCode::StopFailed)).await)
            }
        }
    }

    /// Runs the destroy hooks and moves to `destroyed` whatever they return.
    async fn destroy_entry(&self, entry: &PluginEntry) -> PluginResult<()> {
        let ctx = &entry.context;
        let plugin = &entry.plugin;

        let result: PluginResult<()> = async {
            if let Some(hooks) = plugin.hooks() {
                self.runner
                    .run(ctx, "before_destroy", HookBudget::Hook, hooks.before_destroy(ctx))
                    .await?;
            }
            self.runner
                .run(ctx, "destroy", HookBudget::Shutdown, plugin.destroy(ctx))
                .await?;
            if let Some(hooks) = plugin.hooks() {
                self.runner
                    .run(ctx, "after_destroy", HookBudget::Hook, hooks.after_destroy(ctx))
                    .await?;
            }
            Ok(())
        }
        .await
        .map_err(|e: PluginError| e.in_phase(ErrorCode::DestroyFailed));

        if let Err(e) = &result {
            entry.record_error(e);
            self.metrics.increment("plugins.errors");
            self.emit(entry, names::PLUGIN_ERROR, error_payload(e));
        }

        self.eject_interceptors(entry);
        self.transition(entry, PluginState::Destroyed)?;
        ctx.cancel();
        tracing::debug!(plugin = %entry.id(), "Plugin destroyed");
        self.emit(entry, names::PLUGIN_DESTROYED, json!({ "id": entry.id() }));
        result
    }

    /// Moves the plugin to `error`, records and reports `error`, and hands it
    /// back for the caller to return.
    async fn fail(&self, entry: &PluginEntry, error: PluginError) -> PluginError {
        if entry.state().can_transition_to(PluginState::Error)
            && let Err(e) = self.transition(entry, PluginState::Error)
        {
            tracing::warn!(plugin = %entry.id(), error = %e, "Could not enter error state");
        }
        entry.record_error(&error);
        self.metrics.increment("plugins.errors");
        tracing::error!(
            plugin = %entry.id(),
            code = %error.code,
            error = %error,
            "Plugin failed"
        );
        self.emit(entry, names::PLUGIN_ERROR, error_payload(&error));

        if let Some(hooks) = entry.plugin.hooks() {
            let ctx = &entry.context;
            if let Err(e) = self
                .runner
                .run(ctx, "on_error", HookBudget::Hook, hooks.on_error(&error, ctx))
                .await
            {
                tracing::warn!(plugin = %entry.id(), error = %e, "on_error hook failed");
            }
        }
        error
    }

    fn transition(&self, entry: &PluginEntry, next: PluginState) -> PluginResult<PluginState> {
        let from = entry.transition(next)?;
        tracing::debug!(plugin = %entry.id(), from = %from, to = %next, "State transition");
        self.emit(
            entry,
            names::PLUGIN_STATE_CHANGED,
            json!({ "id": entry.id(), "from": from, "to": next }),
        );
        Ok(from)
    }

    fn install_interceptors(&self, entry: &PluginEntry) {
        let chains = self.http.interceptors();
        let mut handles = Vec::new();
        if let Some(interceptor) = entry.plugin.intercept_request() {
            handles.push(chains.install_request(interceptor));
        }
        if let Some(interceptor) = entry.plugin.intercept_response() {
            handles.push(chains.install_response(interceptor));
        }
        if let Some(interceptor) = entry.plugin.intercept_error() {
            handles.push(chains.install_error(interceptor));
        }
        if !handles.is_empty() {
            tracing::debug!(plugin = %entry.id(), count = handles.len(), "Interceptors installed");
        }
        entry.add_interceptors(handles);
    }

    fn eject_interceptors(&self, entry: &PluginEntry) {
        for handle in entry.take_interceptors() {
            self.http.interceptors().eject(handle);
        }
    }

    /// First required dependency of `id`, direct or transitive, that is not
    /// registered.
    fn unregistered_dependency(&self, id: &str) -> Option<String> {
        let mut pending = vec![id.to_string()];
        let mut seen = HashSet::new();
        while let Some(current) = pending.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let Some(entry) = self.entry(&current) else {
                return Some(current);
            };
            pending.extend(
                entry
                    .metadata()
                    .required_dependency_ids()
                    .map(str::to_string),
            );
        }
        None
    }

    fn ensure_dependencies_registered(&self, entry: &PluginEntry) -> PluginResult<()> {
        let missing: Vec<&str> = entry
            .metadata()
            .required_dependency_ids()
            .filter(|dep| !self.entries.contains_key(*dep))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(PluginError::dependency(
            entry.id(),
            ErrorCode::MissingDependency,
            format!("required dependencies not registered: {}", missing.join(", ")),
        )
        .with_context(json!({ "missing": missing })))
    }

    /// Emits on the registry bus and mirrors onto the plugin's own emitter.
    fn emit(&self, entry: &PluginEntry, event: &str, payload: Value) {
        self.events.emit(event, payload.clone());
        let local = event.strip_prefix("plugin:").unwrap_or(event);
        entry.context.events.emit(local, payload);
    }

    fn ensure_live(&self, id: &str) -> PluginResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(PluginError::disposed(id));
        }
        Ok(())
    }

    fn entry(&self, id: &str) -> Option<Arc<PluginEntry>> {
        self.entries.get(id).map(|e| Arc::clone(e.value()))
    }

    fn graph(&self) -> RwLockReadGuard<'_, DependencyGraph> {
        self.graph.read().unwrap_or_else(|e| e.into_inner())
    }

    fn graph_mut(&self) -> RwLockWriteGuard<'_, DependencyGraph> {
        self.graph.write().unwrap_or_else(|e| e.into_inner())
    }

    // ---- queries ---------------------------------------------------------

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn has(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Plugin>> {
        self.entries.get(id).map(|e| Arc::clone(&e.plugin))
    }

    pub fn state(&self, id: &str) -> Option<PluginState> {
        self.entries.get(id).map(|e| e.state())
    }

    pub fn plugin_config(&self, id: &str) -> Option<PluginConfig> {
        self.entries.get(id).map(|e| e.config())
    }

    pub fn context(&self, id: &str) -> Option<PluginContext> {
        self.entries.get(id).map(|e| e.context.clone())
    }

    /// The error that last moved `id` to `error` or failed a config change.
    pub fn last_error(&self, id: &str) -> Option<PluginError> {
        self.entries.get(id).and_then(|e| e.last_error())
    }

    pub fn registered_at(&self, id: &str) -> Option<chrono::DateTime<chrono::Utc>> {
        self.entries.get(id).map(|e| e.registered_at)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Registered ids, dependencies before dependents, ties broken
    /// lexicographically.
    pub fn load_order(&self) -> PluginResult<Vec<String>> {
        let order = self.graph().load_order()?;
        Ok(order.into_iter().filter(|id| self.has(id)).collect())
    }

    /// Snapshot of the dependency graph, including declared but not yet
    /// registered dependencies.
    pub fn dependency_graph(&self) -> DependencyGraph {
        self.graph().clone()
    }

    pub fn plugins_by_type(&self, plugin_type: PluginType) -> Vec<String> {
        self.ids_where(|e| e.metadata().plugin_type == plugin_type)
    }

    pub fn plugins_by_state(&self, state: PluginState) -> Vec<String> {
        self.ids_where(|e| e.state() == state)
    }

    fn ids_where(&self, predicate: impl Fn(&PluginEntry) -> bool) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .iter()
            .filter(|e| predicate(e.value()))
            .map(|e| e.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn http_client(&self) -> &HttpClient {
        &self.http
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn logger(&self) -> &PluginLogger {
        &self.logger
    }

    /// Counts and structure at this instant; health is derived from state.
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        let registered: HashSet<String> = self.entries.iter().map(|e| e.key().clone()).collect();

        for entry in self.entries.iter() {
            let entry = entry.value();
            let metadata = entry.metadata();
            let state = entry.state();
            let enabled = entry.config().enabled;

            stats.total += 1;
            if enabled {
                stats.enabled += 1;
            } else {
                stats.disabled += 1;
            }
            *stats.by_state.entry(state.as_str().to_string()).or_default() += 1;
            *stats
                .by_type
                .entry(metadata.plugin_type.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_priority
                .entry(metadata.priority.as_str().to_string())
                .or_default() += 1;

            match PluginHealth::from_state(state, enabled).status {
                HealthStatus::Healthy => stats.health.healthy += 1,
                HealthStatus::Degraded => stats.health.degraded += 1,
                HealthStatus::Unhealthy => stats.health.unhealthy += 1,
            }
        }

        stats.load_order = self.load_order().unwrap_or_default();
        stats.dependencies = self
            .graph()
            .adjacency()
            .into_iter()
            .filter(|(id, _)| registered.contains(id))
            .collect();
        stats
    }
}

fn error_payload(error: &PluginError) -> Value {
    json!({
        "id": error.plugin_id,
        "code": error.code,
        "kind": error.kind,
        "message": error.message,
        "context": error.context,
    })
}
