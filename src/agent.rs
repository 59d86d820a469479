use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::hooks::AgentHook;
use crate::knowledge::Knowledge;
use crate::llm::LanguageModel;
use crate::memory::{ConversationMemory, MemoryManager, RunRecord, UserMemory};
use crate::message::{Message, Role, ToolCall};
use crate::storage::AgentDb;
use crate::tool::{parse_args, ToolDescription, ToolRegistry};
use crate::tools::KnowledgeSearchTool;

const CHAT_HISTORY_TOOL: &str = "get_chat_history";
const TOOL_CALL_HISTORY_TOOL: &str = "get_tool_call_history";
const DEFAULT_USER_ID: &str = "default";
const MARKDOWN_INSTRUCTION: &str = "Use markdown to format your answers.";

fn default_num_calls() -> usize {
    3
}

/// Result of one agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub run_id: Uuid,
    pub session_id: String,
    pub content: String,
    /// Tool calls the model made during the run, in order.
    pub tool_calls: Vec<ToolCall>,
    /// Every message the run added, from the user input to the final reply.
    pub messages: Vec<Message>,
}

/// An agent that alternates between the language model and registered tools,
/// optionally backed by a session/memory database and a knowledge base.
pub struct Agent<M: LanguageModel + ?Sized> {
    model: Arc<M>,
    description: Option<String>,
    instructions: Vec<String>,
    markdown: bool,
    tools: ToolRegistry,
    hooks: Vec<Arc<dyn AgentHook>>,
    max_steps: usize,

    session_id: String,
    user_id: Option<String>,
    memory: ConversationMemory,
    history_loaded: bool,
    db: Option<Arc<dyn AgentDb>>,
    add_history_to_context: bool,
    num_history_runs: usize,
    read_chat_history: bool,
    read_tool_call_history: bool,
    enable_user_memories: bool,

    knowledge: Option<Arc<Knowledge>>,
    search_knowledge: bool,
    add_knowledge_to_context: bool,
}

impl<M: LanguageModel + ?Sized> Agent<M> {
    pub fn new(model: Arc<M>) -> Self {
        Self {
            model,
            description: None,
            instructions: Vec::new(),
            markdown: false,
            tools: ToolRegistry::new(),
            hooks: Vec::new(),
            max_steps: 10,
            session_id: Uuid::new_v4().to_string(),
            user_id: None,
            memory: ConversationMemory::default(),
            history_loaded: false,
            db: None,
            add_history_to_context: false,
            num_history_runs: 3,
            read_chat_history: false,
            read_tool_call_history: false,
            enable_user_memories: false,
            knowledge: None,
            search_knowledge: false,
            add_knowledge_to_context: false,
        }
    }

    /// Leading text of the system prompt.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_instructions<I, S>(mut self, instructions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instructions.extend(instructions.into_iter().map(Into::into));
        self
    }

    pub fn with_markdown(mut self, markdown: bool) -> Self {
        self.markdown = markdown;
        self
    }

    /// Add a toolkit. Can be called repeatedly; later tools win on name clashes.
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn AgentHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Upper bound on model calls per run.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self.memory = ConversationMemory::default();
        self.history_loaded = false;
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Store runs and user memories in `db`. Without one, history lives only
    /// in this process.
    pub fn with_db(mut self, db: Arc<dyn AgentDb>) -> Self {
        self.db = Some(db);
        self.history_loaded = false;
        self
    }

    /// Send the last `num_runs` runs of this session with every request.
    pub fn with_history(mut self, num_runs: usize) -> Self {
        self.add_history_to_context = true;
        self.num_history_runs = num_runs;
        self
    }

    pub fn with_read_chat_history(mut self, enabled: bool) -> Self {
        self.read_chat_history = enabled;
        self
    }

    pub fn with_read_tool_call_history(mut self, enabled: bool) -> Self {
        self.read_tool_call_history = enabled;
        self
    }

    /// Extract facts about the user after each run and add them to the
    /// system prompt of later runs. Requires a database.
    pub fn with_user_memories(mut self, enabled: bool) -> Self {
        self.enable_user_memories = enabled;
        self
    }

    pub fn with_knowledge(mut self, knowledge: Arc<Knowledge>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    /// Expose the knowledge base as the `search_knowledge_base` tool.
    pub fn with_search_knowledge(mut self, enabled: bool) -> Self {
        self.search_knowledge = enabled;
        self
    }

    /// Retrieve references for every input and add them to the system prompt.
    pub fn with_knowledge_in_context(mut self, enabled: bool) -> Self {
        self.add_knowledge_to_context = enabled;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Switch to a fresh session. Returns the new session id.
    pub fn new_session(&mut self) -> String {
        self.session_id = Uuid::new_v4().to_string();
        self.memory = ConversationMemory::default();
        self.history_loaded = false;
        self.session_id.clone()
    }

    fn memory_user(&self) -> &str {
        self.user_id.as_deref().unwrap_or(DEFAULT_USER_ID)
    }

    /// Memories stored for this agent's user.
    pub async fn user_memories(&self) -> Result<Vec<UserMemory>> {
        match &self.db {
            Some(db) => db.user_memories(self.memory_user()).await,
            None => Ok(Vec::new()),
        }
    }

    /// Load the stored runs of the current session once.
    async fn hydrate_history(&mut self) -> Result<()> {
        if self.history_loaded {
            return Ok(());
        }
        if let Some(db) = &self.db {
            let runs = db.load_runs(&self.session_id, None).await?;
            debug!(session_id = %self.session_id, runs = runs.len(), "loaded session history");
            self.memory = ConversationMemory::with_runs(runs);
        }
        self.history_loaded = true;
        Ok(())
    }

    fn effective_tools(&self) -> ToolRegistry {
        let mut tools = self.tools.clone();
        if self.search_knowledge {
            if let Some(knowledge) = &self.knowledge {
                tools.register(KnowledgeSearchTool::new(knowledge.clone()));
            }
        }
        tools
    }

    fn tool_descriptions(&self, tools: &ToolRegistry) -> Vec<ToolDescription> {
        let mut descriptions = tools.describe();
        if self.read_chat_history {
            descriptions.push(ToolDescription {
                name: CHAT_HISTORY_TOOL.into(),
                description: "Get the chat history of this session as a JSON list of messages, \
                              oldest first. Use when the user asks about earlier turns."
                    .into(),
                parameters: Some(json!({
                    "type": "object",
                    "properties": {
                        "num_chats": { "type": "integer", "description": "Number of most recent messages to return" }
                    }
                })),
            });
        }
        if self.read_tool_call_history {
            descriptions.push(ToolDescription {
                name: TOOL_CALL_HISTORY_TOOL.into(),
                description: "Get the tool calls made in this session, most recent first.".into(),
                parameters: Some(json!({
                    "type": "object",
                    "properties": {
                        "num_calls": { "type": "integer", "description": "Number of most recent calls to return (default 3)" }
                    }
                })),
            });
        }
        descriptions
    }

    async fn system_prompt(&self, input: &str, memories: &[UserMemory]) -> Result<String> {
        let mut sections: Vec<String> = Vec::new();
        if let Some(description) = &self.description {
            sections.push(description.trim().to_string());
        }

        let mut instructions = self.instructions.clone();
        if self.search_knowledge && self.knowledge.is_some() {
            instructions.push(
                "Search your knowledge base with `search_knowledge_base` before answering \
                 questions it may cover."
                    .into(),
            );
        }
        if self.markdown {
            instructions.push(MARKDOWN_INSTRUCTION.into());
        }
        if !instructions.is_empty() {
            let lines: Vec<String> = instructions.iter().map(|i| format!("- {i}")).collect();
            sections.push(format!("<instructions>\n{}\n</instructions>", lines.join("\n")));
        }

        if !memories.is_empty() {
            let lines: Vec<String> = memories.iter().map(|m| format!("- {}", m.memory)).collect();
            sections.push(format!(
                "You have access to memories from previous interactions with the user:\n\
                 <memories_from_previous_interactions>\n{}\n</memories_from_previous_interactions>\n\
                 Use them to personalise your answers; the user may correct them.",
                lines.join("\n")
            ));
        }

        if self.add_knowledge_to_context {
            if let Some(knowledge) = &self.knowledge {
                let hits = knowledge.search(input, None).await?;
                if !hits.is_empty() {
                    let refs: Vec<String> = hits
                        .iter()
                        .map(|hit| format!("[{}] {}", hit.document.name, hit.document.content))
                        .collect();
                    sections.push(format!(
                        "Use the following references from the knowledge base if they help answer:\n\
                         <references>\n{}\n</references>",
                        refs.join("\n\n")
                    ));
                }
            }
        }

        Ok(sections.join("\n\n"))
    }

    async fn execute_tool(&self, tools: &ToolRegistry, call: &ToolCall) -> Value {
        let result = match call.name.as_str() {
            CHAT_HISTORY_TOOL if self.read_chat_history => self.chat_history(call.arguments.clone()),
            TOOL_CALL_HISTORY_TOOL if self.read_tool_call_history => {
                self.tool_call_history(call.arguments.clone())
            }
            _ => tools.call(&call.name, call.arguments.clone()).await,
        };

        match result {
            Ok(output) => output,
            Err(err) => {
                warn!(tool = %call.name, error = %err, "tool call failed");
                Value::String(format!("Error: {err}"))
            }
        }
    }

    fn chat_history(&self, arguments: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            #[serde(default)]
            num_chats: Option<usize>,
        }
        let args: Args = parse_args(CHAT_HISTORY_TOOL, arguments)?;

        let chats: Vec<Value> = self
            .memory
            .iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant) && m.tool_calls.is_empty())
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();
        let skip = args
            .num_chats
            .map_or(0, |n| chats.len().saturating_sub(n));
        Ok(Value::Array(chats.into_iter().skip(skip).collect()))
    }

    fn tool_call_history(&self, arguments: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            #[serde(default = "default_num_calls")]
            num_calls: usize,
        }
        let args: Args = parse_args(TOOL_CALL_HISTORY_TOOL, arguments)?;

        let calls: Vec<Value> = self
            .memory
            .tool_calls()
            .into_iter()
            .rev()
            .take(args.num_calls)
            .map(|call| json!({ "name": call.name, "arguments": call.arguments }))
            .collect();
        Ok(Value::Array(calls))
    }

    /// Run one exchange with the agent. Returns the final assistant reply.
    pub async fn respond(&mut self, user_input: impl Into<String>) -> Result<String> {
        Ok(self.run(user_input).await?.content)
    }

    /// Run one exchange: build the request, loop over tool calls until the
    /// model answers, then persist the run and update user memories.
    pub async fn run(&mut self, user_input: impl Into<String>) -> Result<RunOutput> {
        let input = user_input.into();
        self.hydrate_history().await?;

        let known_memories = if self.enable_user_memories {
            self.user_memories().await?
        } else {
            Vec::new()
        };

        let tools = self.effective_tools();
        let descriptions = self.tool_descriptions(&tools);

        let mut context = Vec::new();
        let system = self.system_prompt(&input, &known_memories).await?;
        if !system.is_empty() {
            context.push(Message::system(system));
        }
        if self.add_history_to_context {
            context.extend(self.memory.history_messages(self.num_history_runs));
        }

        let mut run_messages = vec![Message::user(input.clone())];
        let mut tool_calls = Vec::new();

        for step in 0..self.max_steps {
            let request: Vec<Message> = context.iter().chain(run_messages.iter()).cloned().collect();
            for hook in &self.hooks {
                hook.before_model(&request).await?;
            }
            debug!(session_id = %self.session_id, step, messages = request.len(), "calling model");
            let completion = self.model.complete_chat(&request, &descriptions).await?;
            for hook in &self.hooks {
                hook.after_model(&completion).await?;
            }

            if completion.tool_calls.is_empty() {
                let content = completion.content.unwrap_or_default();
                run_messages.push(Message::assistant(content.clone()));
                let record = RunRecord::new(self.session_id.clone(), self.user_id.clone(), run_messages);
                return self.finish_run(record, content, tool_calls, &input, &known_memories).await;
            }

            run_messages.push(Message::assistant_tool_calls(
                completion.content.clone(),
                completion.tool_calls.clone(),
            ));
            for call in completion.tool_calls {
                for hook in &self.hooks {
                    hook.before_tool_call(&call).await?;
                }
                debug!(tool = %call.name, "executing tool");
                let output = self.execute_tool(&tools, &call).await;
                let message = Message::tool(call.name.clone(), output, call.id.clone());
                if let Some(result) = &message.tool_result {
                    for hook in &self.hooks {
                        hook.after_tool_result(result).await?;
                    }
                }
                run_messages.push(message);
                tool_calls.push(call);
            }
        }

        Err(AgentError::Protocol(format!(
            "agent reached the limit of {} model calls without returning a response",
            self.max_steps
        )))
    }

    async fn finish_run(
        &mut self,
        record: RunRecord,
        content: String,
        tool_calls: Vec<ToolCall>,
        input: &str,
        known_memories: &[UserMemory],
    ) -> Result<RunOutput> {
        if let Some(db) = &self.db {
            db.save_run(&record).await?;
        }
        info!(
            session_id = %record.session_id,
            run_id = %record.run_id,
            tool_calls = tool_calls.len(),
            "run completed"
        );

        let output = RunOutput {
            run_id: record.run_id,
            session_id: record.session_id.clone(),
            content,
            tool_calls,
            messages: record.messages.clone(),
        };
        self.memory.push_run(record);

        if self.enable_user_memories {
            if let Err(err) = self.update_user_memories(input, known_memories).await {
                warn!(error = %err, "failed to update user memories");
            }
        }
        Ok(output)
    }

    async fn update_user_memories(&self, input: &str, known: &[UserMemory]) -> Result<()> {
        let Some(db) = &self.db else {
            return Ok(());
        };
        let manager = MemoryManager::new(self.model.clone());
        let user_id = self.memory_user();
        for fact in manager.extract(input, known).await? {
            if db.add_memory(&UserMemory::new(user_id, fact.as_str())).await? {
                info!(user_id, memory = %fact, "stored user memory");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::llm::StubModel;
    use crate::storage::{InMemoryDb, SessionStore};
    use crate::tool::Tool;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes the `text` field back"
        }

        async fn call(&self, input: Value) -> Result<Value> {
            Ok(input)
        }
    }

    fn echo_tools() -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(EchoTool);
        tools
    }

    #[tokio::test]
    async fn returns_llm_response_without_tools() {
        let model = StubModel::new(vec![r#"{"action":"respond","content":"Hello!"}"#.into()]);
        let mut agent = Agent::new(model);

        let reply = agent.respond("hi").await.unwrap();

        assert_eq!(reply, "Hello!");
        assert_eq!(agent.memory().len(), 1);
        assert_eq!(agent.memory().runs()[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn executes_tool_then_replies() {
        let model = StubModel::new(vec![
            r#"{"action":"call_tool","name":"echo","arguments":{"text":"ping"}}"#.into(),
            r#"{"action":"respond","content":"Echoed your request."}"#.into(),
        ]);
        let mut agent = Agent::new(model.clone()).with_tools(echo_tools());

        let output = agent.run("say ping").await.unwrap();

        assert_eq!(output.content, "Echoed your request.");
        assert_eq!(output.tool_calls.len(), 1);
        assert_eq!(output.messages.len(), 4);

        let second_request = &model.requests()[1];
        let tool_message = second_request.last().unwrap();
        assert_eq!(tool_message.role, Role::Tool);
        assert_eq!(tool_message.content, r#"{"text":"ping"}"#);
        assert_eq!(
            tool_message.tool_result.as_ref().unwrap().tool_call_id.as_deref(),
            Some("call_1")
        );
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_to_the_model() {
        let model = StubModel::new(vec![
            r#"{"action":"call_tool","name":"missing","arguments":{}}"#.into(),
            r#"{"action":"respond","content":"Sorry, that failed."}"#.into(),
        ]);
        let mut agent = Agent::new(model.clone());

        let reply = agent.respond("do it").await.unwrap();

        assert_eq!(reply, "Sorry, that failed.");
        let tool_message = model.requests()[1].last().cloned().unwrap();
        assert_eq!(tool_message.content, "Error: tool `missing` not found");
    }

    #[tokio::test]
    async fn step_limit_is_an_error_and_nothing_is_persisted() {
        let call = r#"{"action":"call_tool","name":"echo","arguments":{}}"#.to_string();
        let model = StubModel::new(vec![call.clone(), call]);
        let db = Arc::new(InMemoryDb::new());
        let mut agent = Agent::new(model)
            .with_tools(echo_tools())
            .with_db(db.clone())
            .with_max_steps(2);

        let err = agent.respond("loop").await.unwrap_err();
        assert!(matches!(err, AgentError::Protocol(_)));
        assert!(agent.memory().is_empty());
        assert!(db.load_runs(agent.session_id(), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_is_limited_to_recent_runs() {
        let model = StubModel::new(vec![
            r#"{"action":"respond","content":"one"}"#.into(),
            r#"{"action":"respond","content":"two"}"#.into(),
            r#"{"action":"respond","content":"three"}"#.into(),
        ]);
        let mut agent = Agent::new(model.clone()).with_history(1);

        agent.respond("first").await.unwrap();
        agent.respond("second").await.unwrap();
        agent.respond("third").await.unwrap();

        let contents: Vec<String> = model.requests()[2].iter().map(|m| m.content.clone()).collect();
        assert_eq!(contents, vec!["second", "two", "third"]);
    }

    #[tokio::test]
    async fn system_prompt_carries_description_and_markdown() {
        let model = StubModel::new(vec![r#"{"action":"respond","content":"ok"}"#.into()]);
        let mut agent = Agent::new(model.clone())
            .with_description("You are a helpful assistant.")
            .with_instructions(["Be brief."])
            .with_markdown(true);

        agent.respond("hello").await.unwrap();

        let system = &model.requests()[0][0];
        assert_eq!(system.role, Role::System);
        assert!(system.content.starts_with("You are a helpful assistant."));
        assert!(system.content.contains("- Be brief."));
        assert!(system.content.contains(MARKDOWN_INSTRUCTION));
    }

    #[tokio::test]
    async fn history_tools_answer_from_the_session() {
        let model = StubModel::new(vec![
            r#"{"action":"call_tool","name":"echo","arguments":{"text":"a"}}"#.into(),
            r#"{"action":"respond","content":"done"}"#.into(),
            r#"{"action":"call_tool","name":"get_tool_call_history","arguments":{}}"#.into(),
            r#"{"action":"call_tool","name":"get_chat_history","arguments":{"num_chats":2}}"#.into(),
            r#"{"action":"respond","content":"you called echo"}"#.into(),
        ]);
        let mut agent = Agent::new(model.clone())
            .with_tools(echo_tools())
            .with_read_chat_history(true)
            .with_read_tool_call_history(true);

        agent.respond("call echo").await.unwrap();
        agent.respond("what did you call?").await.unwrap();

        let last = model.requests().last().cloned().unwrap();
        let n = last.len();
        let calls: Value = serde_json::from_str(&last[n - 3].content).unwrap();
        assert_eq!(calls, json!([{ "name": "echo", "arguments": { "text": "a" } }]));
        let chats: Value = serde_json::from_str(&last[n - 1].content).unwrap();
        assert_eq!(
            chats,
            json!([
                { "role": "user", "content": "call echo" },
                { "role": "assistant", "content": "done" }
            ])
        );
    }
}
