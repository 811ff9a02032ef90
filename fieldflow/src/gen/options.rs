//! Generation options and per-call overrides.

use std::sync::Arc;

use crate::chat::{Memory, ModelConfig};

/// Default outer step budget (tool-call rounds).
pub const DEFAULT_MAX_STEPS: usize = 10;

/// Default inner retry budget (validation/assertion fix-ups per step).
pub const DEFAULT_MAX_RETRIES: usize = 15;

/// Options fixed at generator construction.
#[derive(Debug, Clone)]
pub struct GenOptions {
    /// Outer step budget.
    pub max_steps: usize,
    /// Inner retry budget per step.
    pub max_retries: usize,
    /// Strict mode: every required field needs an explicit prefix.
    pub strict: bool,
    /// Prefer incremental delivery when the service supports it.
    pub stream: bool,
    /// Stop condition: the outer loop ends once this tool has executed.
    pub stop_tool: Option<String>,
    /// Sampling configuration overrides for every call.
    pub model_config: ModelConfig,
}

impl Default for GenOptions {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            max_retries: DEFAULT_MAX_RETRIES,
            strict: false,
            stream: true,
            stop_tool: None,
            model_config: ModelConfig::default(),
        }
    }
}

impl GenOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the step budget.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Sets the retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Enables strict mode.
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Sets the streaming preference.
    #[must_use]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Sets the stop tool.
    #[must_use]
    pub fn with_stop_tool(mut self, name: impl Into<String>) -> Self {
        self.stop_tool = Some(name.into());
        self
    }

    /// Sets the model config.
    #[must_use]
    pub fn with_model_config(mut self, config: ModelConfig) -> Self {
        self.model_config = config;
        self
    }
}

/// Per-call overrides for one `forward` invocation. Unset fields fall back
/// to the generator's [`GenOptions`].
#[derive(Default, Clone)]
pub struct ForwardOptions {
    /// Step budget override.
    pub max_steps: Option<usize>,
    /// Retry budget override.
    pub max_retries: Option<usize>,
    /// Strict mode override.
    pub strict: Option<bool>,
    /// Streaming preference override.
    pub stream: Option<bool>,
    /// Stop tool override.
    pub stop_tool: Option<String>,
    /// Sampling configuration override.
    pub model_config: Option<ModelConfig>,
    /// Conversation memory to use instead of a fresh one. Must not be
    /// shared with a concurrently running generation.
    pub memory: Option<Arc<dyn Memory>>,
}

impl ForwardOptions {
    /// Creates empty overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the step budget.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    /// Overrides the retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Overrides strict mode.
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    /// Overrides the streaming preference.
    #[must_use]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Overrides the stop tool.
    #[must_use]
    pub fn with_stop_tool(mut self, name: impl Into<String>) -> Self {
        self.stop_tool = Some(name.into());
        self
    }

    /// Overrides the model config.
    #[must_use]
    pub fn with_model_config(mut self, config: ModelConfig) -> Self {
        self.model_config = Some(config);
        self
    }

    /// Supplies the conversation memory.
    #[must_use]
    pub fn with_memory(mut self, memory: Arc<dyn Memory>) -> Self {
        self.memory = Some(memory);
        self
    }
}

impl std::fmt::Debug for ForwardOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardOptions")
            .field("max_steps", &self.max_steps)
            .field("max_retries", &self.max_retries)
            .field("strict", &self.strict)
            .field("stream", &self.stream)
            .field("stop_tool", &self.stop_tool)
            .field("has_memory", &self.memory.is_some())
            .finish_non_exhaustive()
    }
}
