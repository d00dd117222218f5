use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};

use crate::client::InterceptorHandle;
use crate::plugin::{
    LifecycleStateMachine, Plugin, PluginConfig, PluginContext, PluginError, PluginMetadata,
    PluginResult, PluginState,
};

/// Registry-owned record for one plugin.
pub(crate) struct PluginEntry {
    pub(crate) plugin: Arc<dyn Plugin>,
    pub(crate) context: PluginContext,
    lifecycle: RwLock<LifecycleStateMachine>,
    last_error: RwLock<Option<PluginError>>,
    interceptors: Mutex<Vec<InterceptorHandle>>,
    /// Serializes lifecycle operations on this plugin.
    pub(crate) op_lock: tokio::sync::Mutex<()>,
    pub(crate) registered_at: DateTime<Utc>,
}

impl PluginEntry {
    pub(crate) fn new(plugin: Arc<dyn Plugin>, context: PluginContext) -> Self {
        Self {
            plugin,
            context,
            lifecycle: RwLock::new(LifecycleStateMachine::new()),
            last_error: RwLock::new(None),
            interceptors: Mutex::new(Vec::new()),
            op_lock: tokio::sync::Mutex::new(()),
            registered_at: Utc::now(),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.plugin.metadata().id
    }

    pub(crate) fn metadata(&self) -> &PluginMetadata {
        self.plugin.metadata()
    }

    pub(crate) fn state(&self) -> PluginState {
        self.lifecycle
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .current()
    }

    pub(crate) fn transition(&self, next: PluginState) -> PluginResult<PluginState> {
        self.lifecycle
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .transition(self.id(), next)
    }

    /// Held in the context so the plugin reads the same value.
    pub(crate) fn config(&self) -> PluginConfig {
        self.context.config()
    }

    pub(crate) fn set_config(&self, config: PluginConfig) {
        self.context.set_config(config);
    }

    pub(crate) fn set_enabled(&self, enabled: bool) -> bool {
        self.context.set_enabled(enabled)
    }

    pub(crate) fn last_error(&self) -> Option<PluginError> {
        self.last_error.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn record_error(&self, error: &PluginError) {
        *self.last_error.write().unwrap_or_else(|e| e.into_inner()) = Some(error.clone());
    }

    pub(crate) fn add_interceptors(&self, handles: Vec<InterceptorHandle>) {
        self.interceptors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(handles);
    }

    pub(crate) fn take_interceptors(&self) -> Vec<InterceptorHandle> {
        std::mem::take(&mut *self.interceptors.lock().unwrap_or_else(|e| e.into_inner()))
    }
}
