//! Structured spans around plugin lifecycle hooks.

use std::time::Instant;

use tracing::{Level, Span, field, span};

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub service_name: Option<String>,
    pub enabled: bool,
    pub level: TracingLevel,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingLevel {
    #[default]
    Info,
    Debug,
    Trace,
}

impl TracingLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TracingLevel::Info => "info",
            TracingLevel::Debug => "debug",
            TracingLevel::Trace => "trace",
        }
    }
}

impl TracingConfig {
    pub fn new() -> Self {
        Self {
            service_name: None,
            enabled: true,
            level: TracingLevel::Info,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    pub fn with_level(mut self, level: TracingLevel) -> Self {
        self.level = level;
        self
    }
}

/// Span covering one hook invocation; records its duration and outcome.
pub struct HookSpan {
    span: Span,
    start: Instant,
}

impl HookSpan {
    pub fn new(plugin_id: &str, phase: &str) -> Self {
        let span = span!(
            Level::DEBUG,
            "plugin.hook",
            plugin = plugin_id,
            phase = phase,
            outcome = field::Empty,
            duration_ms = field::Empty,
        );
        Self {
            span,
            start: Instant::now(),
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Closes the span and returns the elapsed time in milliseconds.
    pub fn finish(self, outcome: &str) -> f64 {
        let elapsed = self.start.elapsed().as_secs_f64() * 1000.0;
        self.span.record("outcome", outcome);
        self.span.record("duration_ms", elapsed as u64);
        elapsed
    }
}
