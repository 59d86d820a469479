//! Exercise 0: the simplest agent, a plain conversation with the model.

use agent_course::{Agent, ChatLoop};
use agent_course_exercises::{banner, Course};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let course = Course::init()?;

    banner(
        "🤖 Exercise 0: Hello Agent",
        &[
            "This is the simplest possible agent - just an LLM conversation.",
            "Type 'exit' to quit.",
        ],
    );

    let mut agent = Agent::new(course.model(500)?)
        .with_description("You are a helpful and friendly AI assistant.")
        .with_markdown(true);

    ChatLoop::new(&mut agent).run().await?;
    Ok(())
}
