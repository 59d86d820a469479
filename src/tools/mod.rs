//! Tools module - provides the toolkits the exercises hand to their agents.
//!
//! - Calculator: expression evaluation and random numbers
//! - DuckDuckGo: Web search
//! - Knowledge: knowledge base search and agentic RAG routing
//! - Email workflow: draft, review, approve and send
//! - YouTube: captions and video metadata

pub mod calculator;
pub mod duckduckgo;
pub mod email_workflow;
pub mod knowledge;
pub mod youtube;

pub use calculator::math_toolkit;
pub use duckduckgo::{duckduckgo_toolkit, DuckDuckGoConfig, SearchResult};
pub use email_workflow::{email_workflow_toolkit, EmailDraft, EmailWorkflow, WorkflowState};
pub use knowledge::{agentic_rag_toolkit, KnowledgeSearchTool};
pub use youtube::{extract_video_id, youtube_toolkit, TranscriptFetcher, YouTubeConfig};
