//! Bonus: ask questions about a YouTube video's transcript.

use std::sync::Arc;

use agent_course::tools::{extract_video_id, youtube_toolkit, TranscriptFetcher, YouTubeConfig};
use agent_course::{Agent, ChatLoop, ToolCallPrinter};
use agent_course_exercises::{banner, prompt_line, Course};
use anyhow::{bail, Context};
use clap::Parser;
use serde_json::json;
use tokio::io::BufReader;

/// YouTube transcript Q&A
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Video URL or 11-character id; prompted for when omitted
    #[arg(long)]
    url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let course = Course::init()?;

    banner(
        "🎬 Bonus: YouTube Q&A",
        &[
            "Load a video's transcript and ask questions about it.",
            "Type 'exit' to quit.",
        ],
    );

    let mut stdin = BufReader::new(tokio::io::stdin());
    let url = match args.url {
        Some(url) => url,
        None => match prompt_line(&mut stdin, &mut tokio::io::stdout(), "YouTube URL").await? {
            Some(url) => url,
            None => bail!("no video URL given"),
        },
    };
    let Some(video_id) = extract_video_id(&url) else {
        bail!("could not find a video id in `{url}`");
    };

    let fetcher = TranscriptFetcher::new(YouTubeConfig::default())?;
    println!("📥 Fetching transcript for {video_id}...");
    let Some(transcript) = fetcher
        .transcript(&video_id)
        .await
        .context("failed fetching the transcript")?
    else {
        println!("❌ No captions are available for this video.");
        bail!("video {video_id} has no captions");
    };

    let title = match fetcher.video_data(&url).await {
        Ok(data) => data
            .get("title")
            .and_then(|title| title.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| video_id.clone()),
        Err(_) => video_id.clone(),
    };

    let loader = course.knowledge_loader().await?;
    let knowledge = loader
        .open(
            "youtube_transcripts",
            "Transcripts of YouTube videos",
            "youtube_transcripts",
        )
        .await?;
    let inserted = knowledge
        .add_text(
            &title,
            &transcript,
            json!({ "source": url, "type": "youtube_transcript", "video_id": video_id }),
        )
        .await?;
    println!("✅ Loaded \"{title}\" ({inserted} new chunks)\n");

    let mut agent = Agent::new(course.model(1000)?)
        .with_description(format!(
            "You answer questions about the YouTube video \"{title}\" using its transcript."
        ))
        .with_instructions([
            "Search the transcript before answering.",
            "If the transcript does not cover the question, say so.",
        ])
        .with_knowledge(Arc::new(knowledge))
        .with_search_knowledge(true)
        .with_tools(youtube_toolkit(YouTubeConfig::default())?)
        .with_hook(Arc::new(ToolCallPrinter))
        .with_markdown(true);

    ChatLoop::new(&mut agent)
        .with_prompt("Question")
        .with_reply_label("Video Assistant")
        .run_with(stdin, tokio::io::stdout())
        .await?;
    Ok(())
}
