//! Namespaced event bus used by the registry and handed to every plugin.
//!
//! Registry events are emitted on the root emitter and mirrored on each
//! plugin's scoped emitter (`plugin:<id>:<event>`).

mod emitter;

pub use emitter::{DEFAULT_MAX_LISTENERS, Event, EventEmitter, ListenerId};

/// Event names emitted by the registry.
pub mod names {
    pub const PLUGIN_REGISTERED: &str = "plugin:registered";
    pub const PLUGIN_UNREGISTERED: &str = "plugin:unregistered";
    pub const PLUGIN_STATE_CHANGED: &str = "plugin:state-changed";
    pub const PLUGIN_INITIALIZED: &str = "plugin:initialized";
    pub const PLUGIN_STARTED: &str = "plugin:started";
    pub const PLUGIN_STOPPED: &str = "plugin:stopped";
    pub const PLUGIN_DESTROYED: &str = "plugin:destroyed";
    pub const PLUGIN_ERROR: &str = "plugin:error";
    pub const PLUGIN_ENABLED: &str = "plugin:enabled";
    pub const PLUGIN_DISABLED: &str = "plugin:disabled";
    pub const PLUGIN_RESTARTED: &str = "plugin:restarted";
    pub const PLUGIN_CONFIG_CHANGED: &str = "plugin:config-changed";
    pub const REGISTRY_DISPOSED: &str = "registry:disposed";
}
