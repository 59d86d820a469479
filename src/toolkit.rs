use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Result;
use crate::tool::{parse_args, Tool, ToolRegistry};

/// `current_time` and `text_stats`.
pub fn utility_toolkit() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(CurrentTimeTool);
    registry.register(TextStatsTool);
    registry
}

struct CurrentTimeTool;

#[derive(Deserialize)]
struct CurrentTimeArgs {
    #[serde(default = "default_timezone")]
    timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "timezone": {
                    "type": "string",
                    "description": "Timezone label (currently only UTC is supported)"
                }
            }
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let args: CurrentTimeArgs = parse_args(self.name(), input)?;
        // The label is echoed back; the clock is always the host's local time.
        let now = chrono::Local::now();
        Ok(Value::String(format!(
            "Current time ({}): {}",
            args.timezone,
            now.format("%Y-%m-%d %H:%M:%S")
        )))
    }
}

struct TextStatsTool;

#[derive(Deserialize)]
struct TextStatsArgs {
    text: String,
}

#[async_trait]
impl Tool for TextStatsTool {
    fn name(&self) -> &str {
        "text_stats"
    }

    fn description(&self) -> &str {
        "Analyze text and report character, word and sentence counts."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Text to analyze" }
            },
            "required": ["text"]
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let args: TextStatsArgs = parse_args(self.name(), input)?;
        Ok(Value::String(text_stats(&args.text)))
    }
}

pub fn text_stats(text: &str) -> String {
    let words = text.split_whitespace().count();
    if words == 0 {
        return "Error: text contains no words to analyze".into();
    }

    let characters = text.chars().count();
    let characters_no_spaces = text.chars().filter(|c| *c != ' ').count();
    let sentences = text.split('.').filter(|s| !s.trim().is_empty()).count();
    let average = characters_no_spaces as f64 / words as f64;

    format!(
        "Text Analysis:\n\
         - Characters: {characters}\n\
         - Characters (no spaces): {characters_no_spaces}\n\
         - Words: {words}\n\
         - Sentences: {sentences}\n\
         - Average word length: {average:.1} characters"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_the_pangram() {
        let stats = text_stats("The quick brown fox jumps over the lazy dog");
        assert!(stats.contains("- Characters: 43"));
        assert!(stats.contains("- Characters (no spaces): 35"));
        assert!(stats.contains("- Words: 9"));
        assert!(stats.contains("- Sentences: 1"));
        assert!(stats.contains("- Average word length: 3.9 characters"));
    }

    #[test]
    fn empty_text_is_reported() {
        assert!(text_stats("   ").starts_with("Error:"));
    }

    #[tokio::test]
    async fn current_time_defaults_to_utc_label() {
        let registry = utility_toolkit();
        let out = registry.call("current_time", Value::Null).await.unwrap();
        assert!(out.as_str().unwrap().starts_with("Current time (UTC): "));
    }
}
