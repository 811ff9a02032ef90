//! Development-time tracing setup and generation span attributes.

use serde::Serialize;
use std::collections::HashMap;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the tracing subscriber for development logging.
///
/// Reads `RUST_LOG`; falls back to `warn` when unset. Output goes to
/// stderr in compact format. Safe to call once per process.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

/// Attributes describing one generation, for span enrichment and export.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateSpanAttributes {
    /// Rendered signature of the generation.
    pub signature: String,
    /// Names of the tools visible to the model.
    pub tools: Vec<String>,
    /// Current step, when known.
    pub step: Option<usize>,
    /// Current retry within the step, when known.
    pub retry: Option<usize>,
}

impl GenerateSpanAttributes {
    /// Creates attributes for a signature.
    #[must_use]
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            ..Self::default()
        }
    }

    /// Sets the visible tool names.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    /// Sets the step counter.
    #[must_use]
    pub fn with_step(mut self, step: usize) -> Self {
        self.step = Some(step);
        self
    }

    /// Sets the retry counter.
    #[must_use]
    pub fn with_retry(mut self, retry: usize) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Flattens into exporter-friendly attributes.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, String> {
        let mut attributes = HashMap::new();
        attributes.insert("generate.signature".to_string(), self.signature.clone());
        attributes.insert("generate.tools".to_string(), self.tools.join(","));
        if let Some(step) = self.step {
            attributes.insert("generate.step".to_string(), step.to_string());
        }
        if let Some(retry) = self.retry {
            attributes.insert("generate.retry".to_string(), retry.to_string());
        }
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_to_attributes() {
        let attributes = GenerateSpanAttributes::new("aa -> bb")
            .with_tools(vec!["search".to_string()])
            .with_step(2)
            .with_retry(1)
            .to_attributes();

        assert_eq!(attributes["generate.signature"], "aa -> bb");
        assert_eq!(attributes["generate.tools"], "search");
        assert_eq!(attributes["generate.step"], "2");
        assert_eq!(attributes["generate.retry"], "1");
    }
}
