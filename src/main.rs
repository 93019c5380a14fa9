use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use eyre::{Result, bail};
use log::{debug, info};

use ytnote::cache::{Clock, ExpiringCache, SystemClock};
use ytnote::config::Config;
use ytnote::error::ServiceError;
use ytnote::output::{self, Note};
use ytnote::queue::{HttpFetcher, RequestQueue};
use ytnote::service::{VideoData, VideoDataService};
use ytnote::store::{FileStore, KeyValueStore};
use ytnote::summarize::{LlmSummarizer, SummaryService};

mod cli;

use cli::{Cli, OutputFormat};

const DEFAULT_LANG: &str = "en";
const DEFAULT_MODEL: &str = "claude-sonnet-4-6";

fn setup_logging() -> Result<()> {
    let log_dir = log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_file = log_dir.join("ytnote.log");

    let target = Box::new(std::fs::OpenOptions::new().create(true).append(true).open(&log_file)?);

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized: {}", log_file.display());
    Ok(())
}

fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ytnote")
        .join("logs")
}

fn build_after_help() -> String {
    format!(
        "\nCONFIG:\n  {}\n\nCACHE:\n  {}\n\nLogs are written to: {}",
        ytnote::config::config_path().display(),
        ytnote::store::default_cache_dir().display(),
        log_dir().join("ytnote.log").display()
    )
}

fn parse_format(name: &str) -> Option<OutputFormat> {
    match name.to_ascii_lowercase().as_str() {
        "text" => Some(OutputFormat::Text),
        "json" => Some(OutputFormat::Json),
        "markdown" | "md" => Some(OutputFormat::Markdown),
        _ => None,
    }
}

/// Retry an async operation with exponential backoff. Service errors that
/// cannot succeed on a second attempt are returned immediately.
async fn retry<F, Fut, T>(max_attempts: u32, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                attempt += 1;
                let permanent = e.downcast_ref::<ServiceError>().is_some_and(|se| !se.is_retryable());
                if permanent || attempt >= max_attempts {
                    return Err(e);
                }
                let delay = Duration::from_millis(500 * 2u64.pow(attempt - 1));
                debug!("Attempt {attempt} failed: {e}, retrying in {delay:?}");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging()?;

    let after_help = build_after_help();
    let cmd = <Cli as clap::CommandFactory>::command().after_help(after_help);
    let matches = cmd.get_matches();
    let cli = <Cli as clap::FromArgMatches>::from_arg_matches(&matches)?;

    // Load config file (non-fatal if missing/invalid)
    let config = Config::load().unwrap_or_default();

    // CLI flags take priority over config
    let lang = cli
        .lang
        .clone()
        .or_else(|| config.default_lang.clone())
        .unwrap_or_else(|| DEFAULT_LANG.to_string());
    let model = cli
        .model
        .clone()
        .or_else(|| config.default_model.clone())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let format = cli
        .format
        .or_else(|| config.default_format.as_deref().and_then(parse_format))
        .unwrap_or(OutputFormat::Markdown);

    if cli.verbose {
        let config_path = ytnote::config::config_path();
        if config_path.exists() {
            eprintln!("Config: {}", config_path.display());
        }
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::default());
    let video_cache: Arc<ExpiringCache<VideoData>> =
        Arc::new(ExpiringCache::load(config.video_cache(), clock.clone(), store.clone()));
    let summary_cache: Arc<ExpiringCache<String>> =
        Arc::new(ExpiringCache::load(config.summary_cache(), clock, store));

    if cli.purge_cache {
        video_cache.purge_all();
        summary_cache.purge_all();
        eprintln!("Cache cleared");
        return Ok(());
    }

    let cleanup_timers = [video_cache.spawn_cleanup_timer(), summary_cache.spawn_cleanup_timer()];

    let client = reqwest::Client::new();
    let queue = RequestQueue::new(Arc::new(HttpFetcher::new(client.clone())));
    let videos = Arc::new(VideoDataService::new(queue, video_cache.clone()));
    let summaries = SummaryService::new(
        videos.clone(),
        Arc::new(LlmSummarizer::new(client, model)),
        summary_cache.clone(),
    );

    // Collect URLs: from arg or stdin
    let urls = if let Some(ref url) = cli.url {
        vec![url.clone()]
    } else {
        let stdin = io::stdin();
        stdin.lock().lines().collect::<Result<Vec<_>, _>>()?
    };

    if urls.is_empty() {
        bail!("no URL provided\n\nUsage: ytnote <URL>\n       echo <URL> | ytnote");
    }

    let outcome: Result<Vec<String>> = async {
        let mut rendered_notes = Vec::new();
        for url in &urls {
            let url = url.trim();
            if url.is_empty() {
                continue;
            }
            if !ytnote::is_youtube_url(url) {
                bail!("not a YouTube URL: {url}\n\nSupported formats:\n  https://www.youtube.com/watch?v=ID\n  https://youtu.be/ID\n  https://www.youtube.com/embed/ID\n  https://www.youtube.com/shorts/ID");
            }

            let mut note = if cli.metadata {
                let metadata = retry(3, || {
                    let videos = &videos;
                    async move { videos.fetch_video_metadata(url).await.map_err(eyre::Report::from) }
                })
                .await?;
                Note::from_metadata(metadata, cli.thumbnail)
            } else {
                let transcript = retry(3, || {
                    let videos = &videos;
                    let lang = &lang;
                    async move { videos.fetch_transcript(url, lang).await.map_err(eyre::Report::from) }
                })
                .await?;
                if cli.verbose {
                    eprintln!(
                        "Video: {} ({})\nChannel: {}\nLines: {}",
                        transcript.title,
                        transcript.video_id,
                        transcript.author,
                        transcript.lines.len(),
                    );
                }
                Note::from_transcript(transcript, cli.thumbnail)
            };

            if cli.summarize {
                let summary = if cli.multimodal {
                    summaries.summarize_multimodal(url).await?
                } else {
                    summaries.summarize(url, &lang).await?
                };
                if cli.verbose {
                    eprintln!("Summary source: {:?}", summary.source);
                }
                note.summary = Some(summary.text);
            }

            rendered_notes.push(match format {
                OutputFormat::Text => output::render_text(&note),
                OutputFormat::Json => output::render_json(&note),
                OutputFormat::Markdown => output::render_markdown(&note),
            });
        }
        Ok::<_, eyre::Report>(rendered_notes)
    }
    .await;

    // persist whatever was fetched, even if a later video failed
    for timer in cleanup_timers {
        timer.abort();
    }
    video_cache.flush();
    summary_cache.flush();

    let rendered = outcome?.join("\n\n");
    if let Some(ref path) = cli.output {
        std::fs::write(path, &rendered)?;
        if cli.verbose {
            eprintln!("Output written to: {}", path.display());
        }
    } else {
        println!("{rendered}");
    }

    Ok(())
}
