//! Building blocks for the agent course exercises.
//!
//! The crate provides a small agent runtime with:
//! - A language model abstraction (`LanguageModel`) with a Groq client.
//! - A tool interface (`Tool` and `ToolRegistry`) and the exercise toolkits.
//! - An `Agent` that loops between the model and tools, with session
//!   history, user memories and knowledge retrieval.
//! - Knowledge bases over HuggingFace embeddings and pgvector.
//! - Workflows of agent and function steps.

mod agent;
pub mod config;
mod error;
mod hooks;
pub mod knowledge;
mod llm;
mod memory;
mod message;
pub mod repl;
mod storage;
pub mod telemetry;
mod tool;
mod toolkit;
pub mod tools;
pub mod workflow;

pub use agent::{Agent, RunOutput};
pub use config::{CourseConfig, DatabaseConfig, EmbedderConfig, ModelConfig};
pub use error::{AgentError, Result};
pub use hooks::AgentHook;
pub use knowledge::{
    Document, Embedder, HashingEmbedder, HuggingFaceEmbedder, InMemoryVectorStore, Knowledge,
    ScoredDocument, TextChunker, VectorStore,
};
#[cfg(feature = "persistence")]
pub use knowledge::PgVector;
pub use llm::{GroqClient, LanguageModel, ModelCompletion, StubModel};
pub use memory::{ConversationMemory, MemoryManager, RunRecord, UserMemory};
pub use message::{Message, Role, ToolCall, ToolResult};
pub use repl::{ChatLoop, ToolCallPrinter};
#[cfg(feature = "persistence")]
pub use storage::{connect_pool, PostgresDb};
pub use storage::{AgentDb, InMemoryDb, SessionStore, UserMemoryStore};
pub use tool::{parse_args, Tool, ToolDescription, ToolRegistry};
pub use toolkit::utility_toolkit;
pub use workflow::{AgentTask, FunctionTask, Workflow, WorkflowContext, WorkflowNode, WorkflowTask};
