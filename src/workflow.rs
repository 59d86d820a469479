use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::info;

use crate::agent::Agent;
use crate::error::{AgentError, Result};
use crate::llm::LanguageModel;

/// Shared state threaded through a workflow execution.
#[derive(Debug, Clone, Default)]
pub struct WorkflowContext {
    pub state: Map<String, Value>,
    /// Names of the steps that ran, in execution order.
    pub logs: Vec<String>,
}

impl WorkflowContext {
    /// A context whose `input` key holds the request being processed.
    pub fn with_input(input: impl Into<String>) -> Self {
        let mut ctx = Self::default();
        ctx.insert("input", Value::String(input.into()));
        ctx
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.state.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Replace `{key}` placeholders with string values from the state.
    /// Unknown keys are left as written.
    pub fn render(&self, template: &str) -> String {
        let mut out = template.to_string();
        for (key, value) in &self.state {
            let placeholder = format!("{{{key}}}");
            if out.contains(&placeholder) {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out = out.replace(&placeholder, &text);
            }
        }
        out
    }
}

#[async_trait]
pub trait WorkflowTask: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &mut WorkflowContext) -> Result<Value>;
}

type TaskFuture<'a> = Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>>;

/// Wrap a plain async function as a workflow task.
pub struct FunctionTask<F>
where
    F: for<'a> Fn(&'a mut WorkflowContext) -> TaskFuture<'a> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FunctionTask<F>
where
    F: for<'a> Fn(&'a mut WorkflowContext) -> TaskFuture<'a> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> WorkflowTask for FunctionTask<F>
where
    F: for<'a> Fn(&'a mut WorkflowContext) -> TaskFuture<'a> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &mut WorkflowContext) -> Result<Value> {
        (self.func)(ctx).await
    }
}

/// Task that renders a prompt from the context, asks an agent, and stores
/// the reply under a key.
pub struct AgentTask<M: LanguageModel + ?Sized> {
    name: String,
    agent: Arc<Mutex<Agent<M>>>,
    prompt_template: String,
    store_under: String,
}

impl<M: LanguageModel + ?Sized> AgentTask<M> {
    pub fn new(
        name: impl Into<String>,
        agent: Arc<Mutex<Agent<M>>>,
        prompt_template: impl Into<String>,
        store_under: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            agent,
            prompt_template: prompt_template.into(),
            store_under: store_under.into(),
        }
    }
}

#[async_trait]
impl<M: LanguageModel + ?Sized + 'static> WorkflowTask for AgentTask<M> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &mut WorkflowContext) -> Result<Value> {
        let prompt = ctx.render(&self.prompt_template);
        let mut agent = self.agent.lock().await;
        let reply = agent.respond(prompt).await?;
        let value = Value::String(reply);
        ctx.insert(self.store_under.clone(), value.clone());
        Ok(value)
    }
}

pub type Condition = Arc<dyn Fn(&WorkflowContext) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum WorkflowNode {
    Task(Arc<dyn WorkflowTask>),
    Sequence(Vec<WorkflowNode>),
    Conditional {
        condition: Condition,
        then_branch: Box<WorkflowNode>,
        else_branch: Option<Box<WorkflowNode>>,
    },
}

impl WorkflowNode {
    pub fn task(task: impl WorkflowTask + 'static) -> Self {
        WorkflowNode::Task(Arc::new(task))
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a mut WorkflowContext,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>> {
        Box::pin(async move {
            match self {
                WorkflowNode::Task(task) => {
                    info!(step = task.name(), "workflow step");
                    ctx.logs.push(task.name().to_string());
                    task.run(ctx).await
                }
                WorkflowNode::Sequence(steps) => {
                    let mut last = Value::Null;
                    for step in steps {
                        last = step.execute(ctx).await?;
                    }
                    Ok(last)
                }
                WorkflowNode::Conditional {
                    condition,
                    then_branch,
                    else_branch,
                } => {
                    if condition(ctx) {
                        then_branch.execute(ctx).await
                    } else if let Some(other) = else_branch {
                        other.execute(ctx).await
                    } else {
                        Ok(Value::Null)
                    }
                }
            }
        })
    }
}

#[derive(Clone)]
pub struct Workflow {
    pub name: String,
    pub root: WorkflowNode,
}

impl Workflow {
    pub fn new(name: impl Into<String>, root: WorkflowNode) -> Self {
        Self {
            name: name.into(),
            root,
        }
    }

    pub async fn run(&self, ctx: &mut WorkflowContext) -> Result<Value> {
        info!(workflow = %self.name, "workflow started");
        let result = self.root.execute(ctx).await;
        info!(workflow = %self.name, steps = ctx.logs.len(), ok = result.is_ok(), "workflow finished");
        result
    }
}

pub const TRIAGE_CATEGORIES: [&str; 3] = ["hr", "technical", "general"];

/// Map a classifier reply onto one of [`TRIAGE_CATEGORIES`].
pub fn normalize_category(reply: &str) -> &'static str {
    let reply = reply.to_lowercase();
    let words: Vec<&str> = reply
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let mentions = |candidates: &[&str]| words.iter().any(|w| candidates.contains(w));

    if mentions(&["technical", "tech"]) {
        "technical"
    } else if mentions(&["hr", "policy", "policies"]) || reply.contains("human resources") {
        "hr"
    } else {
        "general"
    }
}

/// classify → fetch → summarize.
///
/// The classifier labels the request, the researcher gathers findings with
/// its knowledge search tools (skipped for general requests), and the writer
/// turns the findings into the final answer stored under `answer`.
pub fn triage_workflow<M: LanguageModel + ?Sized + 'static>(
    classifier: Arc<Mutex<Agent<M>>>,
    researcher: Arc<Mutex<Agent<M>>>,
    writer: Arc<Mutex<Agent<M>>>,
) -> Workflow {
    let classify = WorkflowNode::task(AgentTask::new(
        "classify",
        classifier,
        "Classify this request as exactly one word: hr, technical or general.\n\nRequest: {input}",
        "classification",
    ));

    let normalize = WorkflowNode::task(FunctionTask::new(
        "route",
        |ctx: &mut WorkflowContext| {
            Box::pin(async move {
                let raw = ctx.get_str("classification").ok_or_else(|| {
                    AgentError::Workflow("classification missing from context".into())
                })?;
                let category = normalize_category(raw);
                ctx.insert("category", json!(category));
                Ok(json!(category))
            })
        },
    ));

    let fetch = WorkflowNode::task(AgentTask::new(
        "fetch",
        researcher,
        "Find the company information needed to answer this {category} request. \
         Use your search tools and report the relevant facts.\n\nRequest: {input}",
        "findings",
    ));

    let no_fetch = WorkflowNode::task(FunctionTask::new(
        "skip_fetch",
        |ctx: &mut WorkflowContext| {
            Box::pin(async move {
                let findings = json!("No internal documents are needed for this request.");
                ctx.insert("findings", findings.clone());
                Ok(findings)
            })
        },
    ));

    let needs_documents: Condition =
        Arc::new(|ctx: &WorkflowContext| ctx.get_str("category") != Some("general"));

    let summarize = WorkflowNode::task(AgentTask::new(
        "summarize",
        writer,
        "Answer the request using the findings. Be concise.\n\n\
         Request: {input}\nCategory: {category}\nFindings:\n{findings}",
        "answer",
    ));

    Workflow::new(
        "triage",
        WorkflowNode::Sequence(vec![
            classify,
            normalize,
            WorkflowNode::Conditional {
                condition: needs_documents,
                then_branch: Box::new(fetch),
                else_branch: Some(Box::new(no_fetch)),
            },
            summarize,
        ]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::StubModel;

    fn respond(content: &str) -> String {
        json!({ "action": "respond", "content": content }).to_string()
    }

    fn agent(replies: &[&str]) -> (Arc<StubModel>, Arc<Mutex<Agent<StubModel>>>) {
        let model = StubModel::new(replies.iter().map(|r| respond(r)).collect());
        let agent = Arc::new(Mutex::new(Agent::new(model.clone())));
        (model, agent)
    }

    #[tokio::test]
    async fn executes_sequence_and_logs_steps() {
        let task_a = FunctionTask::new("a", |ctx: &mut WorkflowContext| {
            Box::pin(async move {
                ctx.insert("a", json!(1));
                Ok(json!("done"))
            })
        });
        let task_b = FunctionTask::new("b", |ctx: &mut WorkflowContext| {
            Box::pin(async move {
                let current = ctx.get("a").and_then(|v| v.as_i64()).unwrap_or(0);
                ctx.insert("b", json!(current + 1));
                Ok(json!("b"))
            })
        });

        let flow = Workflow::new(
            "demo",
            WorkflowNode::Sequence(vec![WorkflowNode::task(task_a), WorkflowNode::task(task_b)]),
        );

        let mut ctx = WorkflowContext::default();
        let result = flow.run(&mut ctx).await.unwrap();
        assert_eq!(result, json!("b"));
        assert_eq!(ctx.get("b").unwrap(), &json!(2));
        assert_eq!(ctx.logs, vec!["a", "b"]);
    }

    #[test]
    fn renders_placeholders_from_state() {
        let mut ctx = WorkflowContext::with_input("reset my password");
        ctx.insert("count", json!(2));
        assert_eq!(
            ctx.render("{input} ({count}) {missing}"),
            "reset my password (2) {missing}"
        );
    }

    #[test]
    fn normalizes_categories() {
        assert_eq!(normalize_category("Technical"), "technical");
        assert_eq!(normalize_category("hr."), "hr");
        assert_eq!(normalize_category("It is general"), "general");
    }

    #[tokio::test]
    async fn triage_runs_the_same_steps_for_the_same_input() {
        for _ in 0..2 {
            let (_, classifier) = agent(&["technical"]);
            let (researcher_model, researcher) = agent(&["The user API allows 100 requests per minute."]);
            let (writer_model, writer) = agent(&["You can make 100 requests per minute."]);

            let flow = triage_workflow(classifier, researcher, writer);
            let mut ctx = WorkflowContext::with_input("What is the API rate limit?");
            let answer = flow.run(&mut ctx).await.unwrap();

            assert_eq!(answer, json!("You can make 100 requests per minute."));
            assert_eq!(ctx.logs, vec!["classify", "route", "fetch", "summarize"]);
            assert!(researcher_model.requests()[0]
                .last()
                .unwrap()
                .content
                .contains("technical request"));
            assert!(writer_model.requests()[0]
                .last()
                .unwrap()
                .content
                .contains("100 requests per minute"));
        }
    }

    #[tokio::test]
    async fn general_requests_skip_the_fetch_step() {
        let (_, classifier) = agent(&["general"]);
        let (researcher_model, researcher) = agent(&[]);
        let (_, writer) = agent(&["Hello!"]);

        let flow = triage_workflow(classifier, researcher, writer);
        let mut ctx = WorkflowContext::with_input("hi there");
        flow.run(&mut ctx).await.unwrap();

        assert_eq!(ctx.logs, vec!["classify", "route", "skip_fetch", "summarize"]);
        assert!(researcher_model.requests().is_empty());
    }
}
