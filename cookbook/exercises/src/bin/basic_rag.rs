//! Exercise 5: retrieval-augmented answers over the company handbook.

use std::sync::Arc;

use agent_course::{Agent, ChatLoop, ToolCallPrinter};
use agent_course_exercises::{banner, hints, sample_data, Course};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let course = Course::init()?;

    banner(
        "📚 Exercise 5: Basic RAG",
        &[
            "This agent can answer questions about the company handbook!",
            "Loading document and creating embeddings...",
        ],
    );

    let path = sample_data("company_handbook.txt")?;
    println!("📚 Setting up knowledge base...");
    let loader = course.knowledge_loader().await?;
    let handbook = loader
        .load_file(
            "company_handbook",
            "Company policies and procedures",
            "basic_rag_demo",
            &path,
            json!({ "source": path.display().to_string(), "type": "handbook" }),
        )
        .await?;
    println!("✅ Loaded document: {}", path.display());

    println!("\n🤖 Agent ready! Ask questions about ACME Corporation policies.");
    println!("Type 'exit' to quit.\n");

    let mut agent = Agent::new(course.model(1000)?)
        .with_description(
            "You are a helpful HR assistant for ACME Corporation. \
             Use the company handbook information to answer employee questions accurately. \
             If information isn't in the handbook, say so clearly.",
        )
        .with_knowledge(handbook)
        .with_search_knowledge(true)
        .with_read_tool_call_history(true)
        .with_hook(Arc::new(ToolCallPrinter))
        .with_markdown(true);

    hints(
        "💡 Try asking about:",
        &[
            "🕐 Working hours and remote work policy",
            "🏥 Health insurance and benefits",
            "💻 IT equipment and security policies",
            "📈 Performance reviews and career development",
            "📞 Contact information",
        ],
    );

    ChatLoop::new(&mut agent)
        .with_prompt("Employee Question")
        .with_reply_label("HR Assistant")
        .run()
        .await?;
    Ok(())
}
