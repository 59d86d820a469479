//! Exercise 4: long-term user memories and chat history in PostgreSQL.

use std::sync::Arc;

use agent_course::tools::{duckduckgo_toolkit, DuckDuckGoConfig};
use agent_course::{Agent, ChatLoop, ToolCallPrinter};
use agent_course_exercises::{banner, hints, Course};
use clap::Parser;

const USER_ID: &str = "workshop_student";

/// Persistent Memory Agent
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Continue an existing session (use the session ID from previous run)
    #[arg(long)]
    session_id: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let course = Course::init()?;

    banner("💾 Exercise 4: Persistent Memory", &[]);

    let db = match course.database().await {
        Ok(db) => {
            println!("✅ Database connection successful!");
            db
        }
        Err(err) => {
            println!("❌ Database connection failed: {err:#}");
            hints(
                "\n🔧 Setup required:",
                &[
                    "1. Make sure PostgreSQL with pgvector is running",
                    "2. Set DATABASE_URL if it is not at postgres://ai:ai@localhost:5532/ai",
                    "3. Verify database is accessible at localhost:5532",
                ],
            );
            return Err(err);
        }
    };

    println!("This agent remembers you across different sessions!");
    println!("Your memories are stored permanently in PostgreSQL.");
    println!("Type 'mem' to see stored memories, 'exit' to quit.\n");

    let mut agent = Agent::new(course.model(800)?)
        .with_description(
            "You are a helpful assistant with excellent long-term memory. \
             You remember important information about users across different conversations \
             and can build upon previous interactions.",
        )
        .with_db(db)
        .with_user_id(USER_ID)
        .with_user_memories(true)
        .with_read_chat_history(true)
        .with_history(10)
        .with_tools(duckduckgo_toolkit(DuckDuckGoConfig::default()))
        .with_hook(Arc::new(ToolCallPrinter))
        .with_markdown(true);

    match args.session_id {
        Some(session_id) => {
            agent = agent.with_session_id(session_id);
            println!("📝 Continuing session: {}...", short_id(agent.session_id()));
        }
        None => println!("📝 New session: {}...", short_id(agent.session_id())),
    }
    println!("   (full id: {})", agent.session_id());

    hints(
        "💡 Persistent memory features:",
        &[
            "💾 Memories stored permanently in database",
            "🔄 Continues conversations across sessions",
            "👤 Remembers user-specific information",
            "📜 Maintains chat history",
        ],
    );
    hints(
        "🎮 Commands:",
        &[
            "'mem' or 'memories' - Show stored memories",
            "'exit', 'quit', 'q' - Exit the program",
        ],
    );

    ChatLoop::new(&mut agent)
        .with_memory_command(true)
        .with_farewell("Goodbye! Your memories are saved. 👋")
        .run()
        .await?;
    Ok(())
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
