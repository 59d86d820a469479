//! Email workflow toolkit: draft → review → approve → send.
//!
//! All five tools share one [`EmailWorkflow`]; each call validates the
//! current state before moving it forward.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::Result;
use crate::tool::{parse_args, Tool, ToolRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    Draft,
    Review,
    Approved,
    Sent,
    /// Reserved for workflows that close after sending.
    Completed,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Draft => "draft",
            WorkflowState::Review => "review",
            WorkflowState::Approved => "approved",
            WorkflowState::Sent => "sent",
            WorkflowState::Completed => "completed",
        }
    }

    fn next_step(&self) -> &'static str {
        match self {
            WorkflowState::Draft => "🔍 Next: Review the email",
            WorkflowState::Review => "✅ Next: Approve or reject the email",
            WorkflowState::Approved => "📧 Next: Send the email",
            WorkflowState::Sent => "🎉 Workflow completed!",
            WorkflowState::Completed => "Unknown next step",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailDraft {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub purpose: String,
}

/// The state machine behind the toolkit. Methods return the text shown to
/// the model; invalid transitions are replies, not errors.
#[derive(Debug, Clone)]
pub struct EmailWorkflow {
    state: WorkflowState,
    draft: Option<EmailDraft>,
}

impl Default for EmailWorkflow {
    fn default() -> Self {
        Self {
            state: WorkflowState::Draft,
            draft: None,
        }
    }
}

impl EmailWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn draft(&self) -> Option<&EmailDraft> {
        self.draft.as_ref()
    }

    pub fn draft_email(&mut self, recipient: &str, subject: &str, purpose: &str) -> String {
        let body = compose_body(recipient, subject, purpose);
        let reply = format!(
            "📝 Email draft created:\n\nTo: {recipient}\nSubject: {subject}\n\n{body}\n\n✅ Status: {}",
            WorkflowState::Draft
        );
        self.draft = Some(EmailDraft {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body,
            purpose: purpose.to_string(),
        });
        self.state = WorkflowState::Draft;
        info!(recipient, purpose, "email drafted");
        reply
    }

    pub fn review_email(&mut self, feedback: Option<&str>) -> String {
        let Some(draft) = &self.draft else {
            return "❌ No email draft to review. Please create a draft first.".into();
        };

        let mut points = Vec::new();
        let subject_len = draft.subject.chars().count();
        if subject_len < 5 {
            points.push("📧 Subject line seems too short".to_string());
        } else if subject_len > 50 {
            points.push("📧 Subject line might be too long".to_string());
        }

        if draft.body.chars().count() < 50 {
            points.push("📝 Email body seems very brief".to_string());
        } else if !draft.body.contains("ACME Corporation") {
            points.push("🏢 Consider adding company branding".to_string());
        }

        if let Some(feedback) = feedback.filter(|f| !f.trim().is_empty()) {
            points.push(format!("💭 Human feedback: {feedback}"));
        }
        if points.is_empty() {
            points.push("✅ Email looks good, ready for approval".to_string());
        }

        self.state = WorkflowState::Review;
        let summary = points
            .iter()
            .map(|point| format!("• {point}"))
            .collect::<Vec<_>>()
            .join("\n");
        format!("🔍 Email Review Complete:\n\n{summary}\n\n✅ Status: {}", self.state)
    }

    pub fn approve_email(&mut self, approved: bool) -> String {
        let Some(draft) = &self.draft else {
            return "❌ No email draft to approve.".into();
        };
        if self.state != WorkflowState::Review {
            return "❌ Email must be reviewed before approval.".into();
        }

        if approved {
            self.state = WorkflowState::Approved;
            format!(
                "✅ Email approved for sending!\n\n📧 Ready to send to: {}\n✅ Status: {}",
                draft.recipient, self.state
            )
        } else {
            self.state = WorkflowState::Draft;
            format!(
                "❌ Email rejected. Please revise the draft.\n✅ Status: {}",
                self.state
            )
        }
    }

    pub fn send_email(&mut self) -> String {
        let Some(draft) = &self.draft else {
            return "❌ No email draft to send.".into();
        };
        if self.state != WorkflowState::Approved {
            return "❌ Email must be approved before sending.".into();
        }

        self.state = WorkflowState::Sent;
        info!(recipient = %draft.recipient, "email sent");
        format!(
            "📧 Email sent successfully!\n\nTo: {}\nSubject: {}\nTime: Just now\n\n✅ Status: {}\n\n🎉 Workflow completed successfully!",
            draft.recipient, draft.subject, self.state
        )
    }

    pub fn status(&self) -> String {
        let Some(draft) = &self.draft else {
            return "📋 Workflow Status: No active workflow\n\n🚀 Next: Create an email draft".into();
        };
        format!(
            "📋 Current Workflow Status: {}\n\n📧 Email Details:\n• To: {}\n• Subject: {}\n• Purpose: {}\n\n{}",
            self.state.as_str().to_uppercase(),
            draft.recipient,
            draft.subject,
            draft.purpose,
            self.state.next_step()
        )
    }
}

fn compose_body(recipient: &str, subject: &str, purpose: &str) -> String {
    match purpose.to_lowercase().as_str() {
        "follow-up" => format!(
            "Dear {recipient},\n\n\
             I hope this email finds you well. I wanted to follow up on our recent conversation regarding {subject}.\n\n\
             Please let me know if you have any questions or if there's anything I can help clarify.\n\n\
             Best regards,\nACME Corporation"
        ),
        "proposal" => format!(
            "Dear {recipient},\n\n\
             Thank you for your interest in ACME Corporation's services. I'm pleased to present our proposal for {subject}.\n\n\
             We believe our solution can provide significant value to your organization. I'd be happy to schedule a call to discuss the details.\n\n\
             Best regards,\nACME Corporation"
        ),
        "support" => format!(
            "Dear {recipient},\n\n\
             Thank you for contacting ACME Corporation support regarding {subject}.\n\n\
             We've reviewed your request and are working on a solution. I'll keep you updated on our progress.\n\n\
             If you have any urgent concerns, please don't hesitate to reach out.\n\n\
             Best regards,\nACME Support Team"
        ),
        _ => format!(
            "Dear {recipient},\n\n\
             Thank you for your message regarding {subject}.\n\n\
             I'll get back to you with more information shortly.\n\n\
             Best regards,\nACME Corporation"
        ),
    }
}

/// Build the toolkit over a shared workflow. Pass the same handle to
/// inspect the state from outside the agent.
pub fn email_workflow_toolkit(workflow: Arc<Mutex<EmailWorkflow>>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(DraftEmailTool(workflow.clone()));
    registry.register(ReviewEmailTool(workflow.clone()));
    registry.register(ApproveEmailTool(workflow.clone()));
    registry.register(SendEmailTool(workflow.clone()));
    registry.register(WorkflowStatusTool(workflow));
    registry
}

struct DraftEmailTool(Arc<Mutex<EmailWorkflow>>);

#[derive(Deserialize)]
struct DraftArgs {
    recipient: String,
    subject: String,
    purpose: String,
}

#[async_trait]
impl Tool for DraftEmailTool {
    fn name(&self) -> &str {
        "draft_email"
    }

    fn description(&self) -> &str {
        "Create an email draft based on purpose and recipient."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "recipient": { "type": "string", "description": "Email recipient (customer, colleague, vendor)" },
                "subject": { "type": "string", "description": "Email subject line" },
                "purpose": { "type": "string", "description": "Purpose of the email (follow-up, proposal, support, etc.)" }
            },
            "required": ["recipient", "subject", "purpose"]
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let args: DraftArgs = parse_args(self.name(), input)?;
        let mut workflow = self.0.lock().await;
        Ok(Value::String(workflow.draft_email(
            &args.recipient,
            &args.subject,
            &args.purpose,
        )))
    }
}

struct ReviewEmailTool(Arc<Mutex<EmailWorkflow>>);

#[derive(Deserialize)]
struct ReviewArgs {
    #[serde(default)]
    feedback: Option<String>,
}

#[async_trait]
impl Tool for ReviewEmailTool {
    fn name(&self) -> &str {
        "review_email"
    }

    fn description(&self) -> &str {
        "Review the email draft and provide feedback."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "feedback": { "type": "string", "description": "Optional feedback for improvements" }
            }
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let args: ReviewArgs = parse_args(self.name(), input)?;
        let mut workflow = self.0.lock().await;
        Ok(Value::String(workflow.review_email(args.feedback.as_deref())))
    }
}

struct ApproveEmailTool(Arc<Mutex<EmailWorkflow>>);

#[derive(Deserialize)]
struct ApproveArgs {
    #[serde(default = "approve_by_default")]
    approved: bool,
}

fn approve_by_default() -> bool {
    true
}

#[async_trait]
impl Tool for ApproveEmailTool {
    fn name(&self) -> &str {
        "approve_email"
    }

    fn description(&self) -> &str {
        "Approve or reject the reviewed email for sending."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "approved": { "type": "boolean", "description": "Whether to approve the email (default true)" }
            }
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let args: ApproveArgs = parse_args(self.name(), input)?;
        let mut workflow = self.0.lock().await;
        Ok(Value::String(workflow.approve_email(args.approved)))
    }
}

struct SendEmailTool(Arc<Mutex<EmailWorkflow>>);

#[async_trait]
impl Tool for SendEmailTool {
    fn name(&self) -> &str {
        "send_email"
    }

    fn description(&self) -> &str {
        "Send the approved email."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({ "type": "object", "properties": {} }))
    }

    async fn call(&self, _input: Value) -> Result<Value> {
        let mut workflow = self.0.lock().await;
        Ok(Value::String(workflow.send_email()))
    }
}

struct WorkflowStatusTool(Arc<Mutex<EmailWorkflow>>);

#[async_trait]
impl Tool for WorkflowStatusTool {
    fn name(&self) -> &str {
        "get_workflow_status"
    }

    fn description(&self) -> &str {
        "Get current workflow status and next steps."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({ "type": "object", "properties": {} }))
    }

    async fn call(&self, _input: Value) -> Result<Value> {
        let workflow = self.0.lock().await;
        Ok(Value::String(workflow.status()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enforces_draft_review_approve_send() {
        let mut wf = EmailWorkflow::new();
        assert_eq!(wf.send_email(), "❌ No email draft to send.");
        assert_eq!(wf.approve_email(true), "❌ No email draft to approve.");

        wf.draft_email("john@customer.com", "our recent meeting", "follow-up");
        assert_eq!(wf.state(), WorkflowState::Draft);
        assert_eq!(wf.send_email(), "❌ Email must be approved before sending.");
        assert_eq!(wf.approve_email(true), "❌ Email must be reviewed before approval.");

        let review = wf.review_email(None);
        assert!(review.contains("✅ Email looks good, ready for approval"));
        assert_eq!(wf.state(), WorkflowState::Review);

        assert!(wf.approve_email(true).starts_with("✅ Email approved for sending!"));
        assert_eq!(wf.state(), WorkflowState::Approved);

        let sent = wf.send_email();
        assert!(sent.contains("To: john@customer.com"));
        assert_eq!(wf.state(), WorkflowState::Sent);
        assert!(wf.status().ends_with("🎉 Workflow completed!"));
    }

    #[test]
    fn rejection_returns_to_draft() {
        let mut wf = EmailWorkflow::new();
        wf.draft_email("mike@company.com", "login issue", "support");
        wf.review_email(Some("needs more technical details"));
        assert!(wf.approve_email(false).starts_with("❌ Email rejected."));
        assert_eq!(wf.state(), WorkflowState::Draft);
        assert!(wf.draft().unwrap().body.ends_with("ACME Support Team"));
    }

    #[test]
    fn review_flags_short_subject_and_feedback() {
        let mut wf = EmailWorkflow::new();
        wf.draft_email("a@b.c", "Hi", "unknown");
        let review = wf.review_email(Some("be friendlier"));
        assert!(review.contains("• 📧 Subject line seems too short"));
        assert!(review.contains("• 💭 Human feedback: be friendlier"));
        assert!(!review.contains("ready for approval"));
    }

    #[test]
    fn purpose_matching_ignores_case() {
        let mut wf = EmailWorkflow::new();
        wf.draft_email("mike@company.com", "login issue", "Support");
        let body = &wf.draft().unwrap().body;
        assert!(body.contains("Thank you for contacting ACME Corporation support"));
        assert!(!wf.review_email(None).contains("🏢 Consider adding company branding"));
    }

    #[tokio::test]
    async fn toolkit_shares_state_between_tools() {
        let workflow = Arc::new(Mutex::new(EmailWorkflow::new()));
        let tools = email_workflow_toolkit(workflow.clone());

        tools
            .call(
                "draft_email",
                json!({"recipient": "sarah@startup.com", "subject": "AI consulting", "purpose": "proposal"}),
            )
            .await
            .unwrap();
        tools.call("review_email", json!({})).await.unwrap();
        tools.call("approve_email", Value::Null).await.unwrap();
        tools.call("send_email", json!({})).await.unwrap();

        assert_eq!(workflow.lock().await.state(), WorkflowState::Sent);
        let status = tools.call("get_workflow_status", json!({})).await.unwrap();
        assert!(status.as_str().unwrap().starts_with("📋 Current Workflow Status: SENT"));
    }
}
