//! Timeout-bounded hook execution.

use std::future::Future;
use std::time::Duration;

use tracing::Instrument;

use crate::observability::{HookSpan, MetricsRegistry};
use crate::plugin::{PluginContext, PluginResult};

/// Which registry timeout bounds a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HookBudget {
    /// `before_*`/`after_*`, config and health hooks.
    Hook,
    /// `init` and `start`.
    Startup,
    /// `stop` and `destroy`.
    Shutdown,
}

#[derive(Clone)]
pub(crate) struct HookRunner {
    hook_timeout: Duration,
    startup_timeout: Duration,
    shutdown_timeout: Duration,
    enforce: bool,
    metrics: MetricsRegistry,
}

impl HookRunner {
    pub(crate) fn new(
        hook_timeout: Duration,
        startup_timeout: Duration,
        shutdown_timeout: Duration,
        enforce: bool,
        metrics: MetricsRegistry,
    ) -> Self {
        Self {
            hook_timeout,
            startup_timeout,
            shutdown_timeout,
            enforce,
            metrics,
        }
    }

    fn limit(&self, budget: HookBudget) -> Option<Duration> {
        if !self.enforce {
            return None;
        }
        Some(match budget {
            HookBudget::Hook => self.hook_timeout,
            HookBudget::Startup => self.startup_timeout,
            HookBudget::Shutdown => self.shutdown_timeout,
        })
    }

    /// Races `hook` against its budget.
    ///
    /// On timeout the hook future is dropped, the plugin's cancellation token
    /// is cancelled and a `HOOK_TIMEOUT` error is returned.
    pub(crate) async fn run<T, F>(
        &self,
        ctx: &PluginContext,
        phase: &str,
        budget: HookBudget,
        hook: F,
    ) -> PluginResult<T>
    where
        F: Future<Output = PluginResult<T>>,
    {
        let span = HookSpan::new(ctx.plugin_id(), phase);
        let hook = hook.instrument(span.span().clone());

        let result = match self.limit(budget) {
            Some(limit) => {
                tokio::select! {
                    result = hook => result,
                    _ = tokio::time::sleep(limit) => {
                        ctx.cancel();
                        self.metrics.increment("hooks.timeouts");
                        tracing::warn!(
                            plugin = %ctx.plugin_id(),
                            phase,
                            timeout_ms = limit.as_millis() as u64,
                            "Plugin hook timed out"
                        );
                        Err(crate::plugin::PluginError::timeout(ctx.plugin_id(), phase, limit))
                    }
                }
            }
            None => hook.await,
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) if e.is_timeout() => "timeout",
            Err(_) => "error",
        };
        let elapsed_ms = span.finish(outcome);
        self.metrics.observe("hooks.duration_ms", elapsed_ms);

        result
    }
}
