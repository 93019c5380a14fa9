use clap::Parser;
use std::path::PathBuf;

use ytnote::ThumbnailQuality;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Markdown,
}

#[derive(Parser)]
#[command(
    name = "ytnote",
    about = "Turn a YouTube video into a summary note",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    /// YouTube video URL (reads from stdin if omitted)
    pub url: Option<String>,

    /// Summarize the video via LLM
    #[arg(short, long)]
    pub summarize: bool,

    /// Summarize by handing the video URL to the model instead of the transcript
    #[arg(long, requires = "summarize")]
    pub multimodal: bool,

    /// Fetch title, description and tags instead of the transcript
    #[arg(short, long)]
    pub metadata: bool,

    /// Output format: markdown (default), text, json
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Preferred caption language
    #[arg(short, long)]
    pub lang: Option<String>,

    /// Thumbnail resolution used in the note
    #[arg(short, long, value_enum, default_value_t = ThumbnailQuality::High)]
    pub thumbnail: ThumbnailQuality,

    /// Write output to file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// LLM model for summarization
    #[arg(long)]
    pub model: Option<String>,

    /// Remove all cached transcripts, metadata and summaries, then exit
    #[arg(long)]
    pub purge_cache: bool,

    /// Show extraction details
    #[arg(short, long)]
    pub verbose: bool,
}
