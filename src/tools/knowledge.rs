//! Knowledge search tools.
//!
//! `search_knowledge_base` is what an agent with `search_knowledge` enabled
//! exposes; the agentic RAG toolkit routes between an HR handbook and the
//! technical documentation.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::Result;
use crate::knowledge::Knowledge;
use crate::tool::{parse_args, Tool, ToolRegistry};

#[derive(Deserialize)]
struct QueryArgs {
    query: String,
}

fn query_parameters(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": { "type": "string", "description": description }
        },
        "required": ["query"]
    })
}

/// Searches a knowledge base and returns the matching chunks as JSON.
pub struct KnowledgeSearchTool {
    knowledge: Arc<Knowledge>,
}

impl KnowledgeSearchTool {
    pub fn new(knowledge: Arc<Knowledge>) -> Self {
        Self { knowledge }
    }
}

#[async_trait]
impl Tool for KnowledgeSearchTool {
    fn name(&self) -> &str {
        "search_knowledge_base"
    }

    fn description(&self) -> &str {
        "Search the knowledge base for information relevant to a query. \
         Use this before answering questions about the loaded documents."
    }

    fn parameters(&self) -> Option<Value> {
        Some(query_parameters("The query to search for"))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let args: QueryArgs = parse_args(self.name(), input)?;
        let hits = self.knowledge.search(&args.query, None).await?;
        if hits.is_empty() {
            return Ok(json!("No documents found"));
        }

        let docs: Vec<Value> = hits
            .into_iter()
            .map(|hit| {
                json!({
                    "name": hit.document.name,
                    "content": hit.document.content,
                    "meta_data": hit.document.metadata,
                    "score": hit.score,
                })
            })
            .collect();
        Ok(Value::Array(docs))
    }
}

const ROUTED_RESULTS: usize = 3;

/// `search_hr_policies` and `search_technical_docs` over two knowledge bases.
/// A missing base is reported to the model rather than failing the run.
pub fn agentic_rag_toolkit(
    hr_policies: Option<Arc<Knowledge>>,
    technical_docs: Option<Arc<Knowledge>>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(RoutedSearchTool {
        name: "search_hr_policies",
        description: "Search HR policies and the company handbook (benefits, leave, remote work, reviews).",
        query_hint: "Search query related to HR policies, benefits, work policies",
        heading: "HR Policy Information",
        unavailable: "No HR knowledge base available",
        not_found: "No relevant HR policy information found for this query.",
        error_prefix: "Error searching HR policies",
        knowledge: hr_policies,
    });
    registry.register(RoutedSearchTool {
        name: "search_technical_docs",
        description: "Search technical documentation and API references.",
        query_hint: "Search query related to APIs, technical implementation, database schema",
        heading: "Technical Documentation",
        unavailable: "No technical knowledge base available",
        not_found: "No relevant technical documentation found for this query.",
        error_prefix: "Error searching technical docs",
        knowledge: technical_docs,
    });
    registry
}

struct RoutedSearchTool {
    name: &'static str,
    description: &'static str,
    query_hint: &'static str,
    heading: &'static str,
    unavailable: &'static str,
    not_found: &'static str,
    error_prefix: &'static str,
    knowledge: Option<Arc<Knowledge>>,
}

#[async_trait]
impl Tool for RoutedSearchTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters(&self) -> Option<Value> {
        Some(query_parameters(self.query_hint))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let args: QueryArgs = parse_args(self.name, input)?;
        let Some(knowledge) = &self.knowledge else {
            return Ok(json!(self.unavailable));
        };

        match knowledge.search(&args.query, Some(ROUTED_RESULTS)).await {
            Ok(hits) if hits.is_empty() => Ok(json!(self.not_found)),
            Ok(hits) => {
                let context = hits
                    .iter()
                    .map(|hit| hit.document.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                Ok(Value::String(format!("{}:\n{context}", self.heading)))
            }
            Err(err) => {
                warn!(tool = self.name, error = %err, "knowledge search failed");
                Ok(Value::String(format!("{}: {err}", self.error_prefix)))
            }
        }
    }
}
