//! Exercise 2: custom math and utility toolkits.

use std::sync::Arc;

use agent_course::tools::math_toolkit;
use agent_course::{utility_toolkit, Agent, ChatLoop, ToolCallPrinter};
use agent_course_exercises::{banner, hints, Course};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let course = Course::init()?;

    banner(
        "🔧 Exercise 2: Custom Tools",
        &[
            "This agent has custom math and utility tools!",
            "Try calculations, random numbers, time, or text analysis.",
            "Type 'exit' to quit.",
        ],
    );

    let mut agent = Agent::new(course.model(600)?)
        .with_description(
            "You are a helpful assistant with mathematical and utility tools. \
             You can perform calculations, generate random numbers, tell time, and analyze text. \
             When users ask for calculations or utilities, use your available tools.",
        )
        .with_tools(math_toolkit())
        .with_tools(utility_toolkit())
        .with_hook(Arc::new(ToolCallPrinter))
        .with_markdown(true);

    hints(
        "💡 Available capabilities:",
        &[
            "📊 Math: calculations, random numbers",
            "🛠️  Utilities: current time, text analysis",
        ],
    );

    ChatLoop::new(&mut agent).run().await?;
    Ok(())
}
