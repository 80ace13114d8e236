use std::{sync::Arc, time::Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use kaption_core::{
    CheckpointTimeline, Config, JsonFileStore, KaptionApi, LanguageLevel, LessonStore,
    RealtimeVoiceChannel, UserProfile, format_checkpoint_line, format_timestamp, load_lessons,
    session::{cached_lessons, history_lessons},
    voice::{
        HttpSignaling, LoopbackConnector, LoopbackSignaling, SessionTokenRequest, Signaling,
        VoiceChannelConfig, VoiceStyle, WebSocketConnector,
    },
};
use tracing_subscriber::EnvFilter;

mod session;
mod ui;

/// CLI wrapper for LanguageLevel (needed for clap ValueEnum)
#[derive(Clone, Copy, Default, ValueEnum)]
enum CliLevel {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl From<CliLevel> for LanguageLevel {
    fn from(cli: CliLevel) -> Self {
        match cli {
            CliLevel::Beginner => LanguageLevel::Beginner,
            CliLevel::Intermediate => LanguageLevel::Intermediate,
            CliLevel::Advanced => LanguageLevel::Advanced,
        }
    }
}

#[derive(Parser)]
#[command(name = "kaption")]
#[command(about = "Analyze a video for cultural checkpoints and study them with a voice tutor")]
struct Cli {
    /// Lesson service base URL (overrides KAPTION_API_BASE)
    #[arg(long, global = true)]
    api_base: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a video and fetch a lesson for every checkpoint
    Analyze {
        /// Video URL
        url: String,

        /// Familiarity with the culture, 1 to 5
        #[arg(short, long, default_value_t = 3)]
        familiarity: u8,

        #[arg(short, long, value_enum, default_value = "intermediate")]
        level: CliLevel,

        /// Comma-separated interests used to tailor lessons
        #[arg(short, long, value_delimiter = ',')]
        interests: Vec<String>,
    },
    /// List checkpoints of the last analyzed video
    Checkpoints {
        /// Only show checkpoints reached at this playback time (seconds)
        #[arg(long)]
        at: Option<f64>,
    },
    /// Study one checkpoint: recap, think, quiz
    Session {
        /// Checkpoint number as shown by `checkpoints`
        #[arg(default_value_t = 1)]
        number: usize,

        /// Tutor voice
        #[arg(long)]
        voice: Option<String>,

        /// Study a video from `history` instead of the last analyzed one
        #[arg(long)]
        video: Option<String>,

        /// Offline practice: a canned local tutor replaces the realtime model
        #[arg(long)]
        offline: bool,
    },
    /// Previously analyzed videos
    History {
        #[command(subcommand)]
        action: Option<HistoryAction>,
    },
    /// Check that the lesson service is up
    Health,
    /// Request an ephemeral realtime token from the lesson service
    VoiceToken,
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List analyzed videos, newest first
    List,
    /// Show the checkpoints of one video
    Show { video_id: String },
    /// Forget one video
    Delete { video_id: String },
}

/// Where the tutor's side of a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TutorMode {
    Realtime,
    Offline,
}

impl TutorMode {
    fn from_flag(offline: bool) -> Self {
        if offline { Self::Offline } else { Self::Realtime }
    }

    fn label(self) -> &'static str {
        match self {
            TutorMode::Realtime => "Deep dive",
            TutorMode::Offline => "Deep dive (offline tutor, canned replies)",
        }
    }
}

fn tutor_channel(config: &Config, mode: TutorMode) -> RealtimeVoiceChannel {
    let voice = config.voice_channel();
    match mode {
        TutorMode::Realtime => realtime_channel(config, voice),
        TutorMode::Offline => RealtimeVoiceChannel::new(
            voice,
            Arc::new(LoopbackSignaling::new()),
            Arc::new(LoopbackConnector::default()),
        ),
    }
}

fn realtime_channel(config: &Config, voice: VoiceChannelConfig) -> RealtimeVoiceChannel {
    RealtimeVoiceChannel::new(
        voice,
        Arc::new(HttpSignaling::new(&config.api_base, &config.realtime_url)),
        Arc::new(WebSocketConnector::new(&config.realtime_url)),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(api_base) = cli.api_base {
        config = config.with_api_base(api_base);
    }

    let result = match cli.command {
        Command::Analyze {
            url,
            familiarity,
            level,
            interests,
        } => {
            let profile = UserProfile::new(familiarity, level.into(), interests);
            analyze(&config, &url, &profile).await
        }
        Command::Checkpoints { at } => checkpoints(&config, at).await,
        Command::Session {
            number,
            voice,
            video,
            offline,
        } => study(&config, number, voice, video, TutorMode::from_flag(offline)).await,
        Command::History { action } => history(&config, action.unwrap_or(HistoryAction::List)).await,
        Command::Health => health(&config).await,
        Command::VoiceToken => voice_token(&config).await,
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

fn lesson_store(config: &Config) -> LessonStore<JsonFileStore> {
    LessonStore::new(JsonFileStore::new(&config.store_dir))
}

async fn analyze(config: &Config, url: &str, profile: &UserProfile) -> Result<()> {
    ui::header("Cultural checkpoints");
    let api = KaptionApi::new(&config.api_base);
    let store = lesson_store(config);

    let started = Instant::now();
    let spinner = ui::create_spinner("Analyzing video and preparing lessons...");
    let plan = match load_lessons(&api, &store, url, profile).await {
        Ok(plan) => plan,
        Err(e) => {
            spinner.finish_with_message(ui::failed("Analysis failed"));
            return Err(e.into());
        }
    };
    spinner.finish_with_message(ui::done(format!(
        "{}: {} checkpoints {}",
        plan.analysis.video_info.title,
        plan.analysis.checkpoints.len(),
        style(format!("[{}]", ui::format_duration(started.elapsed()))).dim()
    )));

    ui::rule();
    for (i, checkpoint) in plan.analysis.checkpoints.iter().enumerate() {
        println!("{:>3}. {}", i + 1, format_checkpoint_line(checkpoint));
    }
    println!(
        "\n{} {}",
        style("Saved:").dim(),
        style(store.inner().dir().display()).cyan()
    );
    Ok(())
}

async fn checkpoints(config: &Config, at: Option<f64>) -> Result<()> {
    let store = lesson_store(config);
    let Some(plan) = cached_lessons(&store).await? else {
        bail!("nothing analyzed yet, run `kaption analyze <url>` first");
    };

    let timeline = CheckpointTimeline::revealed_at(plan.analysis.checkpoints.clone(), at);
    if timeline.is_progressive()
        && let Some(at) = at
    {
        println!("{} {}", style("At").dim(), format_timestamp(at));
    }

    println!("{}", style(&plan.analysis.video_info.title).cyan().bold());
    ui::rule();
    for checkpoint in timeline.visible() {
        let number = plan
            .analysis
            .checkpoints
            .iter()
            .position(|c| c.element_id() == checkpoint.element_id())
            .map_or(0, |i| i + 1);
        println!("{:>3}. {}", number, format_checkpoint_line(checkpoint));
    }
    Ok(())
}

async fn study(
    config: &Config,
    number: usize,
    voice: Option<String>,
    video: Option<String>,
    mode: TutorMode,
) -> Result<()> {
    let store = lesson_store(config);
    let plan = match &video {
        Some(video_id) => history_lessons(&store, video_id)
            .await?
            .with_context(|| format!("no lessons saved for {video_id}, see `kaption history`"))?,
        None => cached_lessons(&store)
            .await?
            .context("nothing analyzed yet, run `kaption analyze <url>` first")?,
    };
    let (checkpoint, item) = number
        .checked_sub(1)
        .and_then(|i| plan.lesson(i))
        .with_context(|| format!("no lesson for checkpoint {} (have {})", number, plan.len()))?;

    ui::header(mode.label());
    if mode == TutorMode::Offline {
        println!("{}", style("Offline: the tutor's replies are canned, nothing is sent to the model.").yellow());
    }
    let channel = Arc::new(tutor_channel(config, mode));
    session::run(channel, checkpoint.clone(), item.clone(), voice).await
}

async fn history(config: &Config, action: HistoryAction) -> Result<()> {
    let store = lesson_store(config);
    match action {
        HistoryAction::List => {
            let records = store.history().await?;
            if records.is_empty() {
                println!("{}", style("No videos analyzed yet").dim());
                return Ok(());
            }
            for record in records {
                println!(
                    "{}  {}  {}",
                    style(&record.video_id).cyan(),
                    record.title(),
                    style(record.updated_at.format("%Y-%m-%d %H:%M")).dim()
                );
            }
        }
        HistoryAction::Show { video_id } => {
            let record = store
                .history_entry(&video_id)
                .await?
                .with_context(|| format!("{video_id} is not in history"))?;
            println!("{}", style(record.title()).cyan().bold());
            println!("{} {}", style("URL").dim(), record.url);
            println!(
                "{} {}",
                style("Analyzed").dim(),
                record.created_at.format("%Y-%m-%d %H:%M")
            );
            let lessons = record.deep_dive_result.as_ref().map_or(0, |d| d.items.len());
            println!("{} {}", style("Lessons").dim(), lessons);
            ui::rule();
            for (i, checkpoint) in record.analysis_result.checkpoints.iter().enumerate() {
                println!("{:>3}. {}", i + 1, format_checkpoint_line(checkpoint));
            }
        }
        HistoryAction::Delete { video_id } => {
            if store.delete_from_history(&video_id).await? {
                println!("{}", ui::done(format!("Removed {video_id}")));
            } else {
                bail!("{video_id} is not in history");
            }
        }
    }
    Ok(())
}

async fn health(config: &Config) -> Result<()> {
    let api = KaptionApi::new(&config.api_base);
    let status = api.health().await?;
    if status.is_healthy() {
        println!("{}", ui::done(format!("{} is {}", api.api_base(), status.status)));
    } else {
        println!("{}", ui::failed(format!("{} is {}", api.api_base(), status.status)));
    }
    let mut details: Vec<_> = status.details.iter().collect();
    details.sort();
    for (name, value) in details {
        println!("  {} {}", style(format!("{name}:")).dim(), value);
    }
    Ok(())
}

async fn voice_token(config: &Config) -> Result<()> {
    let signaling = HttpSignaling::new(&config.api_base, &config.realtime_url);
    let request = SessionTokenRequest::new(&config.realtime_model, &VoiceStyle::default());
    let token = signaling.session_token(&request).await?;

    let shown: String = token.chars().take(8).collect();
    println!(
        "{}",
        ui::done(format!("token {}… for {} ({})", shown, request.model, request.voice))
    );
    Ok(())
}
