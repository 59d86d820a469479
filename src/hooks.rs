use async_trait::async_trait;

use crate::error::Result;
use crate::llm::ModelCompletion;
use crate::message::{Message, ToolCall, ToolResult};

/// Observes an agent run. Every method defaults to a no-op; returning an
/// error aborts the run.
#[async_trait]
pub trait AgentHook: Send + Sync {
    async fn before_model(&self, _messages: &[Message]) -> Result<()> {
        Ok(())
    }

    async fn after_model(&self, _completion: &ModelCompletion) -> Result<()> {
        Ok(())
    }

    async fn before_tool_call(&self, _call: &ToolCall) -> Result<()> {
        Ok(())
    }

    async fn after_tool_result(&self, _result: &ToolResult) -> Result<()> {
        Ok(())
    }
}
