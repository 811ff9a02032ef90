//! Tool registration and invocation.
//!
//! The controller only consumes tool *results*: calls requested by the
//! model are executed here, sequentially and to completion, and their
//! results are appended to the conversation as function turns. Handler
//! failures and unknown tools become error-text results the model can react
//! to; they do not abort the generation.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::chat::{FunctionCall, Memory, ToolSpec, Turn};

/// An executable tool supplied by the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Executes the tool with its parsed JSON arguments.
    async fn call(&self, args: serde_json::Value) -> anyhow::Result<serde_json::Value>;
}

/// A tool's model-visible definition.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    /// Tool name, as the model will call it.
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Creates a definition.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

struct RegisteredTool {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

/// Concurrent registry of executable tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: DashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool under its definition's name.
    pub fn register(&self, definition: ToolDefinition, handler: Arc<dyn ToolHandler>) {
        self.tools.insert(
            definition.name.clone(),
            RegisteredTool {
                definition,
                handler,
            },
        );
    }

    /// Whether a tool with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// The number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Model-visible specs for every registered tool.
    #[must_use]
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|entry| ToolSpec {
                name: entry.definition.name.clone(),
                description: entry.definition.description.clone(),
                parameters: entry.definition.parameters.clone(),
            })
            .collect()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.tools.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}

/// Executes the model's tool calls in order, appending a function-result
/// turn per call, and returns the lowercased names of the tools that ran.
///
/// Each call is awaited to completion before the next begins, preserving a
/// total order between tool effects and the conversation turns that record
/// them.
pub async fn process_calls(
    registry: &ToolRegistry,
    calls: &[FunctionCall],
    memory: &dyn Memory,
) -> HashSet<String> {
    let mut executed = HashSet::new();

    for call in calls {
        let result = execute_call(registry, call).await;
        if result.executed {
            executed.insert(call.name.to_lowercase());
        }
        memory.add(Turn::Function {
            id: call.id.clone(),
            name: call.name.clone(),
            result: result.text,
        });
    }

    executed
}

struct CallOutcome {
    text: String,
    executed: bool,
}

async fn execute_call(registry: &ToolRegistry, call: &FunctionCall) -> CallOutcome {
    let Some(entry) = registry.tools.get(&call.name) else {
        warn!(tool = %call.name, "unknown tool requested");
        return CallOutcome {
            text: format!("Error: unknown tool '{}'", call.name),
            executed: false,
        };
    };

    let args = if call.args.trim().is_empty() {
        Ok(serde_json::Value::Object(serde_json::Map::new()))
    } else {
        serde_json::from_str::<serde_json::Value>(&call.args)
    };
    let args = match args {
        Ok(args) => args,
        Err(e) => {
            warn!(tool = %call.name, error = %e, "malformed tool arguments");
            return CallOutcome {
                text: format!("Error: malformed arguments for '{}': {e}", call.name),
                executed: false,
            };
        }
    };

    let handler = Arc::clone(&entry.handler);
    drop(entry);

    debug!(tool = %call.name, "executing tool call");
    match handler.call(args).await {
        Ok(value) => CallOutcome {
            text: serde_json::to_string(&value).unwrap_or_default(),
            executed: true,
        },
        Err(e) => {
            warn!(tool = %call.name, error = %e, "tool execution failed");
            CallOutcome {
                text: format!("Error executing tool '{}': {e}", call.name),
                executed: false,
            }
        }
    }
}
