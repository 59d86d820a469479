//! classify → fetch → summarize over the course documents.
//!
//! Each request runs through three agents: a classifier, a researcher with
//! the knowledge search tools, and a writer. The executed steps are printed
//! after every answer.

use std::sync::Arc;

use agent_course::tools::agentic_rag_toolkit;
use agent_course::workflow::{triage_workflow, WorkflowContext};
use agent_course::{Agent, ToolCallPrinter};
use agent_course_exercises::{banner, sample_data, Course};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::warn;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let course = Course::init()?;

    banner(
        "🗂️ Triage Workflow",
        &[
            "Requests are classified, researched in the company documents and summarized.",
            "Type 'exit' to quit.",
        ],
    );

    let loader = course.knowledge_loader().await?;
    let handbook = sample_data("company_handbook.txt")?;
    let tech = sample_data("technical_docs.txt")?;
    let hr_policies = loader
        .load_file(
            "hr_policies",
            "Knowledge base for hr_policies",
            "agentic_rag_hf_hr_policies",
            &handbook,
            json!({ "source": handbook.display().to_string(), "type": "hr_policies" }),
        )
        .await?;
    let technical_docs = loader
        .load_file(
            "technical_docs",
            "Knowledge base for technical_docs",
            "agentic_rag_hf_technical_docs",
            &tech,
            json!({ "source": tech.display().to_string(), "type": "technical_docs" }),
        )
        .await?;

    let classifier = Agent::new(course.model(20)?)
        .with_description("You label incoming requests for ACME Corporation.")
        .with_instructions([
            "Reply with exactly one word: hr, technical or general.",
            "hr: benefits, leave, remote work, reviews and other employee policies.",
            "technical: APIs, rate limits, webhooks, databases and deployments.",
        ]);
    let researcher = Agent::new(course.model(1000)?)
        .with_description("You research ACME Corporation's internal documents.")
        .with_instructions(["Search before answering and report only facts found in the documents."])
        .with_tools(agentic_rag_toolkit(Some(hr_policies), Some(technical_docs)))
        .with_hook(Arc::new(ToolCallPrinter));
    let writer = Agent::new(course.model(800)?)
        .with_description("You write short, accurate answers for ACME Corporation employees.")
        .with_markdown(true);

    let workflow = triage_workflow(
        Arc::new(Mutex::new(classifier)),
        Arc::new(Mutex::new(researcher)),
        Arc::new(Mutex::new(writer)),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"Request: ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            println!("\nGoodbye! 👋");
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input.to_lowercase().as_str(), "exit" | "quit" | "q") {
            println!("Goodbye! 👋");
            break;
        }

        let mut ctx = WorkflowContext::with_input(input);
        match workflow.run(&mut ctx).await {
            Ok(answer) => {
                let answer = answer.as_str().map(str::to_string).unwrap_or_else(|| answer.to_string());
                println!("\nCategory: {}", ctx.get_str("category").unwrap_or("unknown"));
                println!("\nAnswer:\n{}\n", answer.trim());
            }
            Err(err) => {
                warn!(error = %err, "triage failed");
                println!("Error: {err}\n");
            }
        }
        println!("Steps: {}\n", ctx.logs.join(" → "));
    }
    Ok(())
}
