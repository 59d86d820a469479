//! Terminal chat loop shared by the exercise binaries.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::warn;

use crate::agent::Agent;
use crate::error::Result;
use crate::hooks::AgentHook;
use crate::llm::LanguageModel;
use crate::message::{render_output, ToolCall, ToolResult};

const EXIT_COMMANDS: [&str; 3] = ["exit", "quit", "q"];
const MEMORY_COMMANDS: [&str; 2] = ["mem", "memories"];
const PREVIEW_CHARS: usize = 160;

/// Reads lines, sends each one to the agent and prints the reply. Errors
/// of a single turn are printed and the loop continues.
pub struct ChatLoop<'a, M: LanguageModel + ?Sized> {
    agent: &'a mut Agent<M>,
    prompt: String,
    reply_label: String,
    farewell: String,
    memory_command: bool,
}

impl<'a, M: LanguageModel + ?Sized> ChatLoop<'a, M> {
    pub fn new(agent: &'a mut Agent<M>) -> Self {
        Self {
            agent,
            prompt: "You".to_string(),
            reply_label: "Agent".to_string(),
            farewell: "Goodbye! 👋".to_string(),
            memory_command: false,
        }
    }

    /// Label printed before user input, e.g. `Question`.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_reply_label(mut self, label: impl Into<String>) -> Self {
        self.reply_label = label.into();
        self
    }

    pub fn with_farewell(mut self, farewell: impl Into<String>) -> Self {
        self.farewell = farewell.into();
        self
    }

    /// Enable `mem`/`memories`, which lists what the agent remembers about the user.
    pub fn with_memory_command(mut self, enabled: bool) -> Self {
        self.memory_command = enabled;
        self
    }

    /// Run on the process stdin/stdout until an exit command or end of input.
    pub async fn run(self) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.run_with(stdin, stdout).await
    }

    pub async fn run_with<R, W>(self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        loop {
            writer.write_all(format!("{}: ", self.prompt).as_bytes()).await?;
            writer.flush().await?;

            let Some(line) = lines.next_line().await? else {
                writer.write_all(format!("\n{}\n", self.farewell).as_bytes()).await?;
                break;
            };
            let input = line.trim();
            if input.is_empty() {
                continue;
            }
            let lowered = input.to_lowercase();
            if EXIT_COMMANDS.contains(&lowered.as_str()) {
                writer.write_all(format!("{}\n", self.farewell).as_bytes()).await?;
                break;
            }

            if self.memory_command && MEMORY_COMMANDS.contains(&lowered.as_str()) {
                let text = match self.agent.user_memories().await {
                    Ok(memories) if memories.is_empty() => "🧠 No memories stored yet.\n".to_string(),
                    Ok(memories) => {
                        let mut text = String::from("🧠 What I remember about you:\n");
                        for memory in memories {
                            text.push_str(&format!("  - {}\n", memory.memory));
                        }
                        text
                    }
                    Err(err) => format!("Error: {err}\n"),
                };
                writer.write_all(format!("\n{text}\n").as_bytes()).await?;
                continue;
            }

            let text = match self.agent.respond(input).await {
                Ok(reply) => format!("\n{}:\n{}\n\n", self.reply_label, reply.trim()),
                Err(err) => {
                    warn!(error = %err, "turn failed");
                    format!("Error: {err}\n\n")
                }
            };
            writer.write_all(text.as_bytes()).await?;
        }
        writer.flush().await?;
        Ok(())
    }
}

/// Prints tool calls and a preview of their results as they happen.
#[derive(Default)]
pub struct ToolCallPrinter;

#[async_trait]
impl AgentHook for ToolCallPrinter {
    async fn before_tool_call(&self, call: &ToolCall) -> Result<()> {
        println!("  🔧 {}({})", call.name, call.arguments);
        Ok(())
    }

    async fn after_tool_result(&self, result: &ToolResult) -> Result<()> {
        println!("  ↳ {}", preview(&render_output(&result.output)));
        Ok(())
    }
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::llm::StubModel;
    use crate::memory::UserMemory;
    use crate::storage::{InMemoryDb, UserMemoryStore};

    fn respond(content: &str) -> String {
        serde_json::json!({ "action": "respond", "content": content }).to_string()
    }

    #[tokio::test]
    async fn answers_until_exit_and_skips_blank_lines() {
        let model = StubModel::new(vec![respond("Hi there"), respond("Fine")]);
        let mut agent = Agent::new(model.clone());

        let input: &[u8] = b"hello\n\n   \nhow are you?\nquit\nignored\n";
        let mut output = Vec::new();
        ChatLoop::new(&mut agent).run_with(input, &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("Agent:\nHi there"));
        assert!(text.contains("Agent:\nFine"));
        assert!(text.ends_with("Goodbye! 👋\n"));
        assert_eq!(model.requests().len(), 2);
    }

    #[tokio::test]
    async fn errors_are_printed_and_the_loop_continues() {
        let model = StubModel::new(vec![respond("recovered")]);
        let mut agent = Agent::new(model);

        // The scripted model has one answer; the second turn fails.
        let input: &[u8] = b"first\nsecond\nexit\n";
        let mut output = Vec::new();
        ChatLoop::new(&mut agent).run_with(input, &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("recovered"));
        assert!(text.contains("Error: language model error: StubModel ran out of scripted responses"));
    }

    #[tokio::test]
    async fn memory_command_lists_user_memories() {
        let db = Arc::new(InMemoryDb::new());
        db.add_memory(&UserMemory::new("alex", "The user's name is Alex."))
            .await
            .unwrap();
        let model = StubModel::new(vec![]);
        let mut agent = Agent::new(model)
            .with_user_id("alex")
            .with_db(db)
            .with_user_memories(true);

        let input: &[u8] = b"MEM\nq\n";
        let mut output = Vec::new();
        ChatLoop::new(&mut agent)
            .with_memory_command(true)
            .with_farewell("Goodbye! Your memories are saved. 👋")
            .run_with(input, &mut output)
            .await
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("  - The user's name is Alex."));
        assert!(text.ends_with("Goodbye! Your memories are saved. 👋\n"));
    }

    #[test]
    fn preview_truncates_long_output() {
        let long = "word ".repeat(100);
        let short = preview(&long);
        assert!(short.ends_with('…'));
        assert_eq!(short.chars().count(), PREVIEW_CHARS + 1);
    }
}
