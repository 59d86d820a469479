//! Exercise 7: a tool-driven email workflow, draft → review → approve → send.

use std::sync::Arc;

use agent_course::tools::{email_workflow_toolkit, EmailWorkflow};
use agent_course::{Agent, ChatLoop, ToolCallPrinter};
use agent_course_exercises::{banner, hints, Course};
use tokio::sync::Mutex;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let course = Course::init()?;

    banner(
        "📋 Exercise 7: Workflow Agent",
        &[
            "This agent manages multi-step email workflows!",
            "Draft → Review → Approve → Send",
            "Type 'exit' to quit.",
        ],
    );

    let workflow = Arc::new(Mutex::new(EmailWorkflow::new()));

    let mut agent = Agent::new(course.model(1000)?)
        .with_description(
            "You are a workflow automation assistant that helps manage \
             email workflows. You can draft emails, review them, get approval, and send them.",
        )
        .with_instructions([
            "Always follow the proper workflow order:",
            "1. Draft email (draft_email)",
            "2. Review email (review_email)",
            "3. Approve email (approve_email)",
            "4. Send email (send_email)",
            "Use get_workflow_status to check current progress.",
        ])
        .with_tools(email_workflow_toolkit(workflow))
        .with_hook(Arc::new(ToolCallPrinter))
        .with_markdown(true);

    hints(
        "💡 Workflow commands:",
        &[
            "📝 'Draft an email to [recipient] about [subject]'",
            "🔍 'Review the email'",
            "✅ 'Approve the email' or 'Reject the email'",
            "📧 'Send the email'",
            "📋 'What's the workflow status?'",
        ],
    );
    hints(
        "🎮 Try this workflow:",
        &[
            "1. 'Draft a follow-up email to john@customer.com about our recent meeting'",
            "2. 'Review the email'",
            "3. 'Approve the email'",
            "4. 'Send the email'",
        ],
    );

    ChatLoop::new(&mut agent)
        .with_prompt("Workflow Command")
        .with_reply_label("Workflow Agent")
        .run()
        .await?;
    Ok(())
}
