//! Exercise 3: short-term conversation memory within one session.

use std::sync::Arc;

use agent_course::tools::{duckduckgo_toolkit, DuckDuckGoConfig};
use agent_course::{Agent, ChatLoop, ToolCallPrinter};
use agent_course_exercises::{banner, hints, Course};

const USER_ID: &str = "workshop_student";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let course = Course::init()?;

    banner(
        "🧠 Exercise 3: Agent with Memory",
        &[
            "This agent remembers our conversation!",
            "Try referring to things you mentioned earlier.",
            "Type 'exit' to quit.",
        ],
    );

    let db = course.database_or_in_memory().await;

    let mut agent = Agent::new(course.model(800)?)
        .with_description(
            "You are a helpful assistant with a good memory. \
             You remember what users tell you during our conversation and can \
             refer back to previous topics, preferences, and information.",
        )
        .with_tools(duckduckgo_toolkit(DuckDuckGoConfig::default()))
        .with_db(db)
        .with_user_id(USER_ID)
        .with_history(5)
        .with_hook(Arc::new(ToolCallPrinter))
        .with_markdown(true);

    hints(
        "💡 Memory features:",
        &[
            "🔄 Remembers last 5 conversation exchanges",
            "📝 Can refer to things you mentioned earlier",
            "🎯 Maintains context throughout the session",
        ],
    );
    hints(
        "🎮 Try this:",
        &[
            "1. Tell the agent your name and favorite hobby",
            "2. Ask about something unrelated",
            "3. Later, ask 'What's my name?' or 'What do I like?'",
        ],
    );

    ChatLoop::new(&mut agent).run().await?;
    Ok(())
}
