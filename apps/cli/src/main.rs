use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Parser, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use svodka_core::{
    DEFAULT_SUBJECT, DeliveryStatus, DigestGenerator, Provider, ResendMailer, RunConfig,
    SearchClient, SvodkaError, TranscriptClient, TranscriptStatus, config::DEFAULT_LIMIT,
    config::preferred_languages_for, deliver, load_subscriptions, save_digest, save_transcripts,
};

/// CLI wrapper for Provider enum (needed for clap ValueEnum)
#[derive(Clone, Default, ValueEnum)]
enum CliProvider {
    #[default]
    Openai,
    Grok,
    Gemini,
}

impl From<CliProvider> for Provider {
    fn from(cli: CliProvider) -> Self {
        match cli {
            CliProvider::Openai => Provider::Openai,
            CliProvider::Grok => Provider::Grok,
            CliProvider::Gemini => Provider::Gemini,
        }
    }
}

#[derive(Parser)]
#[command(name = "svodka")]
#[command(
    about = "Search YouTube by keyword, fetch transcripts, and email an AI-generated newsletter digest"
)]
struct Cli {
    /// Search keyword
    keyword: Option<String>,

    /// Subscription file with {"email", "keyword"} entries; runs the
    /// pipeline once per entry
    #[arg(short, long, conflicts_with = "keyword")]
    subscriptions: Option<PathBuf>,

    /// Maximum number of videos to process
    #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
    limit: usize,

    /// Preferred transcript language
    #[arg(short = 'L', long, default_value = "en")]
    lang: String,

    /// AI provider for digest generation
    #[arg(short, long, default_value = "openai")]
    provider: CliProvider,

    /// Model override (defaults to the provider's model)
    #[arg(short, long)]
    model: Option<String>,

    /// Digest recipient; repeat for multiple
    #[arg(short, long = "recipient")]
    recipients: Vec<String>,

    /// Email subject line
    #[arg(long, default_value = DEFAULT_SUBJECT)]
    subject: String,

    /// Directory for transcripts.json and digest.md
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", secs / 60.0, secs % 60.0)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(
            |_| format!("svodka={log_level},svodka_core={log_level}"),
        )))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let provider: Provider = cli.provider.clone().into();

    // Validate API key early
    if let Err(e) = provider.validate_api_key() {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    tokio::fs::create_dir_all(&cli.output_dir).await?;

    println!(
        "\n{}  {}\n",
        style("svodka").cyan().bold(),
        style("Newsletter Digest").dim()
    );

    let base = RunConfig {
        keyword: String::new(),
        limit: cli.limit,
        preferred_languages: preferred_languages_for(&cli.lang),
        provider,
        model: cli.model.clone(),
        subject: cli.subject.clone(),
        recipients: cli.recipients.clone(),
        output_dir: cli.output_dir.clone(),
    };

    match (&cli.keyword, &cli.subscriptions) {
        (Some(keyword), None) => {
            let config = RunConfig {
                keyword: keyword.clone(),
                ..base
            };
            run_entry(&config).await?;
        }
        (None, Some(path)) => {
            let subscriptions = load_subscriptions(path)?;
            let total = subscriptions.len();
            for (idx, subscription) in subscriptions.iter().enumerate() {
                println!("{}", style("─".repeat(60)).dim());
                println!(
                    "{} entry {}/{}: \"{}\" for {}",
                    style("==").cyan().bold(),
                    idx + 1,
                    total,
                    subscription.keyword,
                    subscription.email
                );
                let config = RunConfig {
                    keyword: subscription.keyword.clone(),
                    recipients: vec![subscription.email.clone()],
                    ..base.clone()
                };
                // One bad entry must not sink the rest
                if let Err(e) = run_entry(&config).await {
                    eprintln!("{} {}", style("Error:").red().bold(), e);
                }
            }
        }
        _ => {
            eprintln!(
                "{} provide a search keyword or --subscriptions <file>",
                style("Error:").red().bold()
            );
            std::process::exit(2);
        }
    }

    Ok(())
}

async fn run_entry(config: &RunConfig) -> Result<()> {
    let total_start = Instant::now();

    // Step 1: Search
    let step_start = Instant::now();
    let spinner = create_spinner(&format!("Searching videos for \"{}\"...", config.keyword));
    let search = SearchClient::new()?;
    let candidates = search.search(&config.keyword, config.limit).await?;
    spinner.finish_with_message(format!(
        "{} Found {} video(s) {}",
        style("✓").green().bold(),
        candidates.len(),
        style(format!("[{}]", format_duration(step_start.elapsed()))).dim()
    ));

    if candidates.is_empty() {
        println!(
            "{} No videos found, nothing to process",
            style("!").yellow().bold()
        );
        return Ok(());
    }

    // Step 2: Transcripts, one candidate at a time in search order
    let step_start = Instant::now();
    let transcripts = TranscriptClient::new()?;
    let bar = ProgressBar::new(candidates.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{bar:30.cyan} {pos}/{len} {msg}")
            .unwrap(),
    );
    let mut records = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        bar.set_message(candidate.title.clone());
        records.push(
            transcripts
                .fetch(candidate, &config.preferred_languages)
                .await,
        );
        bar.inc(1);
    }
    bar.finish_and_clear();

    let ok_count = records.iter().filter(|r| r.is_ok()).count();
    println!(
        "{} Fetched {}/{} transcript(s) {}",
        style("✓").green().bold(),
        ok_count,
        records.len(),
        style(format!("[{}]", format_duration(step_start.elapsed()))).dim()
    );
    for record in records.iter().filter(|r| !r.is_ok()) {
        let note = match record.status {
            TranscriptStatus::Disabled => "transcripts disabled".to_string(),
            TranscriptStatus::Unavailable => "no transcript".to_string(),
            TranscriptStatus::Error => record.error.clone().unwrap_or_default(),
            TranscriptStatus::Ok => unreachable!(),
        };
        println!(
            "  {} {} {}",
            style("-").yellow(),
            record.video.title,
            style(format!("({note})")).dim()
        );
    }

    // Step 3: Persist raw transcripts before anything can still fail
    let transcripts_path = config.transcripts_path();
    save_transcripts(&records, &transcripts_path).await?;
    println!(
        "{} Transcripts saved: {}",
        style("✓").green().bold(),
        style(transcripts_path.display()).cyan()
    );

    // Step 4: Generate digest
    let step_start = Instant::now();
    let generator = DigestGenerator::new(config.provider.clone(), config.model.clone())?;
    let spinner = create_spinner(&format!(
        "Generating digest with {}...",
        config.provider.name()
    ));
    let digest = match generator.generate(&records, &config.subject).await {
        Ok(digest) => {
            spinner.finish_with_message(format!(
                "{} Digest generated ({}) {}",
                style("✓").green().bold(),
                config.provider.name(),
                style(format!("[{}]", format_duration(step_start.elapsed()))).dim()
            ));
            digest
        }
        Err(SvodkaError::NoContent) => {
            spinner.finish_with_message(format!(
                "{} No usable transcripts, skipping digest",
                style("!").yellow().bold()
            ));
            return Ok(());
        }
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e.into());
        }
    };

    let digest_path = config.digest_path();
    save_digest(&digest, &digest_path).await?;
    println!(
        "{} Digest saved: {}",
        style("✓").green().bold(),
        style(digest_path.display()).cyan()
    );

    // Step 5: Delivery (optional; a failure here is reported, not fatal)
    let mailer = ResendMailer::from_env();
    let result = deliver(&digest, &config.recipients, mailer.as_ref()).await;
    match result.status {
        DeliveryStatus::Sent => {
            println!(
                "{} Email sent: {}",
                style("✓").green().bold(),
                style(&result.detail).dim()
            );
        }
        DeliveryStatus::Skipped => {
            println!(
                "{} Email skipped: {}",
                style("-").yellow().bold(),
                style(&result.detail).dim()
            );
        }
        DeliveryStatus::Failed => {
            eprintln!(
                "{} Email failed: {}",
                style("✗").red().bold(),
                result.detail
            );
            for failure in &result.failures {
                eprintln!("  {} {}: {}", style("-").red(), failure.recipient, failure.reason);
            }
        }
    }

    println!(
        "\n{} {}",
        style("Total time:").dim(),
        style(format_duration(total_start.elapsed())).cyan().bold()
    );

    Ok(())
}
