use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentError, Result};

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// JSON schema of the arguments object, advertised to the model.
    fn parameters(&self) -> Option<Value> {
        None
    }

    async fn call(&self, input: Value) -> Result<Value>;
}

/// Static description of a tool, sent to the model as a function schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    pub parameters: Option<Value>,
}

/// A named set of tools. Toolkits are registries that get merged into the
/// agent's registry.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Merge another toolkit into this one. Later registrations win on name clashes.
    pub fn extend(&mut self, other: ToolRegistry) {
        self.tools.extend(other.tools);
    }

    pub fn with(mut self, other: ToolRegistry) -> Self {
        self.extend(other);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn describe(&self) -> Vec<ToolDescription> {
        self.tools
            .values()
            .map(|tool| ToolDescription {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    pub async fn call(&self, name: &str, input: Value) -> Result<Value> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;
        tool.call(input).await.map_err(|err| match err {
            AgentError::ToolInvocation { .. } => err,
            other => AgentError::tool(name, other),
        })
    }
}

/// Decode a tool's JSON arguments into a typed struct.
pub fn parse_args<T: DeserializeOwned>(tool: &str, input: Value) -> Result<T> {
    // Models occasionally send `null` for tools without parameters.
    let input = if input.is_null() {
        Value::Object(Default::default())
    } else {
        input
    };
    serde_json::from_value(input)
        .map_err(|err| AgentError::Protocol(format!("invalid arguments for `{tool}`: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct First;
    struct Second;

    #[async_trait]
    impl Tool for First {
        fn name(&self) -> &str {
            "a_first"
        }

        fn description(&self) -> &str {
            "First tool"
        }

        async fn call(&self, input: Value) -> Result<Value> {
            Ok(input)
        }
    }

    #[async_trait]
    impl Tool for Second {
        fn name(&self) -> &str {
            "second"
        }

        fn description(&self) -> &str {
            "Second tool"
        }

        async fn call(&self, _input: Value) -> Result<Value> {
            Err(AgentError::Protocol("boom".into()))
        }
    }

    #[tokio::test]
    async fn returns_sorted_descriptions() {
        let mut registry = ToolRegistry::new();
        registry.register(Second);
        registry.register(First);

        let names: Vec<String> = registry.describe().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["a_first", "second"]);
    }

    #[tokio::test]
    async fn merges_toolkits() {
        let mut left = ToolRegistry::new();
        left.register(First);
        let mut right = ToolRegistry::new();
        right.register(Second);

        let merged = left.with(right);
        assert_eq!(merged.names(), vec!["a_first", "second"]);
    }

    #[tokio::test]
    async fn wraps_tool_failures_with_tool_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Second);

        let err = registry.call("second", json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolInvocation { ref name, .. } if name == "second"));

        let missing = registry.call("nope", json!({})).await.unwrap_err();
        assert!(matches!(missing, AgentError::ToolNotFound(_)));
    }

    #[test]
    fn parse_args_treats_null_as_empty_object() {
        #[derive(Deserialize)]
        struct Args {
            #[serde(default)]
            feedback: Option<String>,
        }

        let args: Args = parse_args("review_email", Value::Null).unwrap();
        assert!(args.feedback.is_none());
    }
}
