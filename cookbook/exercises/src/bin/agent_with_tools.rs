//! Exercise 1: web search through tool calls.

use std::sync::Arc;

use agent_course::tools::{duckduckgo_toolkit, DuckDuckGoConfig};
use agent_course::{Agent, ChatLoop, ToolCallPrinter};
use agent_course_exercises::{banner, Course};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let course = Course::init()?;

    banner(
        "🔍 Exercise 1: Agent with Web Search Tools",
        &[
            "This agent can search the web for current information!",
            "Try asking about recent news, current events, or specific facts.",
            "Type 'exit' to quit.",
        ],
    );

    let mut agent = Agent::new(course.model(800)?)
        .with_description(
            "You are an enthusiastic research assistant with access to web search. \
             When users ask for current information, recent news, or specific facts, \
             use your search tools to find accurate, up-to-date information.",
        )
        .with_tools(duckduckgo_toolkit(DuckDuckGoConfig::default()))
        .with_hook(Arc::new(ToolCallPrinter))
        .with_markdown(true);

    println!("💡 Pro tip: The agent will automatically decide when to search the web!");
    println!("Watch for tool calls when you ask for current information.\n");

    ChatLoop::new(&mut agent).run().await?;
    Ok(())
}
