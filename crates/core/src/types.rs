use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::quiz::QuizItem;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub main: String,
    #[serde(default)]
    pub tip: String,
}

/// A timestamped point of cultural or contextual interest in a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub timestamp_seconds: f64,
    #[serde(default)]
    pub timestamp_formatted: String,
    pub trigger_keyword: String,
    #[serde(default)]
    pub segment_stt: String,
    #[serde(default)]
    pub scene_description: String,
    pub context_title: String,
    pub explanation: Explanation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_interests: Option<Vec<String>>,
}

impl Checkpoint {
    /// Individual keywords of a compound trigger such as `"눈치/nunchi"`.
    pub fn trigger_keywords(&self) -> Vec<&str> {
        self.trigger_keyword
            .split('/')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .collect()
    }

    /// Stable identifier for this checkpoint within one analysis.
    pub fn element_id(&self) -> String {
        format!(
            "checkpoint-{}-{}",
            self.timestamp_seconds, self.trigger_keyword
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecapDetailed {
    #[serde(default)]
    pub summary_main: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recap {
    #[serde(default)]
    pub detailed: RecapDetailed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThinkPrompt {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub guiding_questions: Vec<String>,
    #[serde(default)]
    pub example_keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timebox_seconds: Option<u32>,
}

/// Think-pair-share block of a lesson.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tps {
    #[serde(default)]
    pub think: ThinkPrompt,
}

/// Lesson payload for one checkpoint, as returned by the deep-dive batch API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeepDiveItem {
    #[serde(default)]
    pub recap: Recap,
    #[serde(default)]
    pub tps: Tps,
    #[serde(default)]
    pub quizzes: Vec<QuizItem>,
}

impl DeepDiveItem {
    pub fn recap_summary(&self) -> &str {
        self.recap.detailed.summary_main.trim()
    }

    pub fn think(&self) -> &ThinkPrompt {
        &self.tps.think
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LanguageLevel {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Familiarity with the culture, 1 to 5.
    pub familiarity: u8,
    pub language_level: LanguageLevel,
    #[serde(default)]
    pub interests: Vec<String>,
}

impl UserProfile {
    pub fn new(familiarity: u8, language_level: LanguageLevel, interests: Vec<String>) -> Self {
        Self {
            familiarity: familiarity.clamp(1, 5),
            language_level,
            interests,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub title: String,
    pub total_duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub video_info: VideoInfo,
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
    #[serde(default)]
    pub analysis_id: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_status() -> String {
    "success".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeepDiveBatchResponse {
    #[serde(default)]
    pub items: Vec<DeepDiveItem>,
}

/// Playback position of the watched video.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub current_time: f64,
    pub paused: bool,
    pub playback_rate: f64,
    pub duration: f64,
}

impl PlaybackState {
    /// Replaces non-finite readings the way the page inspector reports them.
    pub fn normalized(self) -> Self {
        let finite = |n: f64| if n.is_finite() { n } else { 0.0 };
        let rate = finite(self.playback_rate);
        Self {
            current_time: finite(self.current_time),
            paused: self.paused,
            playback_rate: if rate == 0.0 { 1.0 } else { rate },
            duration: finite(self.duration),
        }
    }
}

/// Metadata of the video open in the watched tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentVideoInfo {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub meta_title: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(flatten)]
    pub playback: PlaybackState,
}

/// Identifier a video is filed under in the analysis history: the `v`
/// query parameter or the short-link path, else the URL itself.
pub fn video_id_from_url(url: &str) -> String {
    let Ok(parsed) = reqwest::Url::parse(url.trim()) else {
        return url.trim().to_string();
    };
    if let Some((_, id)) = parsed.query_pairs().find(|(k, v)| k == "v" && !v.is_empty()) {
        return id.into_owned();
    }
    if parsed.host_str() == Some("youtu.be")
        && let Some(id) = parsed.path_segments().and_then(|mut s| s.next())
        && !id.is_empty()
    {
        return id.to_string();
    }
    url.trim().to_string()
}

/// One analyzed video in the history, newest first in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoAnalysisRecord {
    pub video_id: String,
    pub url: String,
    pub analysis_result: AnalyzeResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_dive_result: Option<DeepDiveBatchResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoAnalysisRecord {
    pub fn title(&self) -> &str {
        &self.analysis_result.video_info.title
    }
}
