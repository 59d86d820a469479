//! Exercise 6: the model routes questions across two knowledge bases and
//! falls back to web search.

use std::sync::Arc;

use agent_course::tools::{agentic_rag_toolkit, duckduckgo_toolkit, DuckDuckGoConfig};
use agent_course::{Agent, ChatLoop, Knowledge, ToolCallPrinter};
use agent_course_exercises::{banner, hints, sample_data, Course, KnowledgeLoader};
use anyhow::bail;
use serde_json::json;

const COLLECTIONS: [(&str, &str); 2] = [
    ("company_handbook.txt", "hr_policies"),
    ("technical_docs.txt", "technical_docs"),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let course = Course::init()?;

    banner(
        "🤖 Exercise 6: Agentic RAG",
        &["Setting up intelligent multi-document RAG system..."],
    );

    let loader = course.knowledge_loader().await?;
    let mut bases = Vec::new();
    for (file, collection) in COLLECTIONS {
        bases.push(load_collection(&loader, file, collection).await);
    }
    let loaded = bases.iter().flatten().count();
    if loaded == 0 {
        println!("❌ No knowledge bases available. Check sample documents.");
        bail!("no knowledge bases could be loaded");
    }
    println!("\n✅ Loaded {loaded} knowledge bases");
    println!("🧠 Agent can intelligently search across different document types!\n");

    let technical_docs = bases.pop().flatten();
    let hr_policies = bases.pop().flatten();
    let primary = hr_policies.clone().or_else(|| technical_docs.clone());

    let mut agent = Agent::new(course.model(1200)?)
        .with_description(
            "You are an intelligent assistant for ACME Corporation with access to \
             company knowledge including HR policies and technical documentation. \
             Use your knowledge base to answer questions about company policies, procedures, \
             technical documentation, and other company information.\n\n\
             If you can't find information in the knowledge base, you can also search the web.",
        )
        .with_instructions([
            "Use search_hr_policies for benefits, leave, remote work and other HR topics.",
            "Use search_technical_docs for APIs, rate limits, webhooks and the database schema.",
            "Questions spanning both areas may need several searches.",
        ])
        .with_tools(agentic_rag_toolkit(hr_policies, technical_docs))
        .with_tools(duckduckgo_toolkit(DuckDuckGoConfig::default()))
        .with_read_tool_call_history(true)
        .with_hook(Arc::new(ToolCallPrinter))
        .with_markdown(true);
    if let Some(knowledge) = primary {
        agent = agent.with_knowledge(knowledge).with_search_knowledge(true);
    }

    hints(
        "💡 Agentic RAG features:",
        &[
            "🎯 Intelligent routing to appropriate knowledge base",
            "🔄 Multi-step retrieval for complex questions",
            "📚 Search across HR policies and technical docs",
            "🌐 Fallback to web search for missing information",
        ],
    );
    hints(
        "🎮 Try these complex questions:",
        &[
            "💼 'How do I set up a new employee with API access?'",
            "🔧 'What's our remote work policy and how do I configure VPN API calls?'",
            "📊 'I need the performance review schedule and user management API details'",
        ],
    );

    ChatLoop::new(&mut agent)
        .with_prompt("Question")
        .with_reply_label("Intelligent Assistant")
        .run()
        .await?;
    Ok(())
}

/// A collection that fails to load is reported and skipped.
async fn load_collection(
    loader: &KnowledgeLoader,
    file: &str,
    collection: &str,
) -> Option<Arc<Knowledge>> {
    let path = sample_data(file).ok()?;
    println!("📚 Loading {}...", path.display());
    let result = loader
        .load_file(
            collection,
            &format!("Knowledge base for {collection}"),
            &format!("agentic_rag_hf_{collection}"),
            &path,
            json!({ "source": path.display().to_string(), "type": collection }),
        )
        .await;
    match result {
        Ok(knowledge) => {
            println!("✅ Loaded {collection}: Content processed");
            Some(knowledge)
        }
        Err(err) => {
            println!("❌ Error loading {}: {err:#}", path.display());
            None
        }
    }
}
