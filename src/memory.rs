use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::llm::LanguageModel;
use crate::message::{Message, Role, ToolCall};

/// One completed exchange: the user input and everything the agent added
/// while answering it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn new(session_id: impl Into<String>, user_id: Option<String>, messages: Vec<Message>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            session_id: session_id.into(),
            user_id,
            messages,
            created_at: Utc::now(),
        }
    }

    pub fn input(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    pub fn reply(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && m.tool_calls.is_empty())
            .map(|m| m.content.as_str())
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> + '_ {
        self.messages.iter().flat_map(|m| m.tool_calls.iter())
    }
}

/// In-process transcript of a session, grouped by run.
#[derive(Default, Clone, Debug)]
pub struct ConversationMemory {
    runs: Vec<RunRecord>,
}

impl ConversationMemory {
    pub fn with_runs(runs: Vec<RunRecord>) -> Self {
        Self { runs }
    }

    pub fn push_run(&mut self, run: RunRecord) {
        self.runs.push(run);
    }

    pub fn runs(&self) -> &[RunRecord] {
        &self.runs
    }

    /// The most recent `n` runs, oldest first.
    pub fn last_runs(&self, n: usize) -> &[RunRecord] {
        let start = self.runs.len().saturating_sub(n);
        &self.runs[start..]
    }

    /// Messages of the last `n` runs, flattened in chronological order.
    pub fn history_messages(&self, n: usize) -> Vec<Message> {
        self.last_runs(n)
            .iter()
            .flat_map(|run| run.messages.iter().cloned())
            .collect()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Message> + '_ {
        self.runs.iter().flat_map(|run| run.messages.iter())
    }

    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.runs.iter().flat_map(|run| run.tool_calls()).collect()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// A durable fact about a user, kept across sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMemory {
    pub id: Uuid,
    pub user_id: String,
    pub memory: String,
    pub created_at: DateTime<Utc>,
}

impl UserMemory {
    pub fn new(user_id: impl Into<String>, memory: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            memory: memory.into(),
            created_at: Utc::now(),
        }
    }
}

/// Two memories are the same fact when they match ignoring case and surrounding whitespace.
pub fn same_memory(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

const MEMORY_MANAGER_PROMPT: &str = "You are a memory manager. From the user's latest message, \
extract durable facts worth remembering about the user (name, job, preferences, interests, \
plans, possessions). Write each fact as one short third-person sentence such as \
\"The user's name is Alex.\". Do not repeat facts that are already known. \
Answer with a JSON array of strings only, and [] when there is nothing new.";

/// Asks the model which facts in a user message deserve to become memories.
pub struct MemoryManager<M: LanguageModel + ?Sized> {
    model: Arc<M>,
}

impl<M: LanguageModel + ?Sized> MemoryManager<M> {
    pub fn new(model: Arc<M>) -> Self {
        Self { model }
    }

    pub async fn extract(&self, user_input: &str, known: &[UserMemory]) -> Result<Vec<String>> {
        let mut system = MEMORY_MANAGER_PROMPT.to_string();
        if !known.is_empty() {
            system.push_str("\n\nAlready known:\n");
            for memory in known {
                system.push_str("- ");
                system.push_str(&memory.memory);
                system.push('\n');
            }
        }
        let messages = vec![Message::system(system), Message::user(user_input)];
        let completion = self.model.complete_chat(&messages, &[]).await?;
        let raw = completion.content.unwrap_or_default();

        let extracted = parse_memory_list(&raw).unwrap_or_else(|| {
            warn!(response = %raw, "memory manager returned an unreadable answer");
            Vec::new()
        });

        let mut fresh: Vec<String> = Vec::new();
        for fact in extracted {
            let fact = fact.trim().to_string();
            if fact.is_empty()
                || known.iter().any(|m| same_memory(&m.memory, &fact))
                || fresh.iter().any(|f| same_memory(f, &fact))
            {
                continue;
            }
            fresh.push(fact);
        }
        Ok(fresh)
    }
}

/// Pull the first JSON string array out of a model answer, tolerating prose around it.
fn parse_memory_list(raw: &str) -> Option<Vec<String>> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::StubModel;

    fn run(input: &str, reply: &str) -> RunRecord {
        RunRecord::new(
            "s1",
            None,
            vec![Message::user(input), Message::assistant(reply)],
        )
    }

    #[test]
    fn windows_history_by_run() {
        let mut memory = ConversationMemory::default();
        for i in 0..4 {
            memory.push_run(run(&format!("q{i}"), &format!("a{i}")));
        }

        let history = memory.history_messages(2);
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q2", "a2", "q3", "a3"]);
        assert_eq!(memory.last_runs(10).len(), 4);
        assert!(memory.history_messages(0).is_empty());
    }

    #[test]
    fn run_record_exposes_input_and_reply() {
        let record = run("my name is Alex", "Nice to meet you, Alex!");
        assert_eq!(record.input(), Some("my name is Alex"));
        assert_eq!(record.reply(), Some("Nice to meet you, Alex!"));
    }

    #[test]
    fn parses_lists_wrapped_in_prose() {
        let parsed = parse_memory_list("Sure! [\"The user's name is Alex.\"] hope that helps");
        assert_eq!(parsed.unwrap(), vec!["The user's name is Alex."]);
        assert!(parse_memory_list("nothing here").is_none());
    }

    #[tokio::test]
    async fn extract_skips_known_and_duplicate_facts() {
        let model = StubModel::new(vec![
            r#"["The user's name is Alex.", "the user's name is alex.", "The user drives a Tesla."]"#
                .into(),
        ]);
        let manager = MemoryManager::new(model.clone());
        let known = vec![UserMemory::new("u1", "The user drives a Tesla.")];

        let fresh = manager
            .extract("I'm Alex and I drive a Tesla", &known)
            .await
            .unwrap();

        assert_eq!(fresh, vec!["The user's name is Alex."]);
        let sent = &model.requests()[0];
        assert!(sent[0].content.contains("Already known"));
    }
}
