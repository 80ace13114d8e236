use std::sync::Arc;

use tokio::{sync::broadcast, task::JoinHandle};
use tracing::info;

use crate::{
    Result,
    api::KaptionApi,
    session::{DeepDiveSession, SessionHandle, SessionWorker},
    storage::{KeyValueStore, LessonStore},
    types::{AnalyzeResponse, Checkpoint, DeepDiveBatchResponse, DeepDiveItem, UserProfile},
    voice::{RealtimeVoiceChannel, StyleUpdate},
};

/// Applies the persona and starts the handshake without waiting for it.
///
/// Call this from the user's gesture, before any content fetch, so the
/// connection is warming while lessons load.
pub async fn bootstrap_voice(
    channel: Arc<RealtimeVoiceChannel>,
    style: StyleUpdate,
) -> JoinHandle<bool> {
    channel.set_style(style).await;
    tokio::spawn(async move { channel.prewarm().await })
}

/// Analysis of one video and the lesson of each of its checkpoints.
#[derive(Debug, Clone)]
pub struct LessonPlan {
    pub analysis: AnalyzeResponse,
    pub lessons: DeepDiveBatchResponse,
}

impl LessonPlan {
    /// Checkpoint and lesson at `index`; lessons come back in checkpoint order.
    pub fn lesson(&self, index: usize) -> Option<(&Checkpoint, &DeepDiveItem)> {
        let checkpoint = self.analysis.checkpoints.get(index)?;
        let item = self.lessons.items.get(index)?;
        Some((checkpoint, item))
    }

    pub fn len(&self) -> usize {
        self.analysis
            .checkpoints
            .len()
            .min(self.lessons.items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Analyzes a video, fetches its lessons and remembers both, also in the history.
pub async fn load_lessons<S: KeyValueStore>(
    api: &KaptionApi,
    store: &LessonStore<S>,
    youtube_url: &str,
    profile: &UserProfile,
) -> Result<LessonPlan> {
    store.save_user_profile(profile).await?;

    let analysis = api.analyze(youtube_url, profile).await?;
    store.save_last_analysis(&analysis).await?;

    let lessons = api.deep_dive_batch(profile, &analysis.checkpoints).await?;
    store.save_last_deep_dive(&lessons).await?;
    store
        .save_to_history(youtube_url, &analysis, Some(&lessons))
        .await?;

    info!(
        title = %analysis.video_info.title,
        lessons = lessons.items.len(),
        "lessons loaded"
    );
    Ok(LessonPlan { analysis, lessons })
}

/// The plan from the previous run, if both halves were stored.
pub async fn cached_lessons<S: KeyValueStore>(store: &LessonStore<S>) -> Result<Option<LessonPlan>> {
    let (Some(analysis), Some(lessons)) = (store.last_analysis().await?, store.last_deep_dive().await?)
    else {
        return Ok(None);
    };
    Ok(Some(LessonPlan { analysis, lessons }))
}

/// The plan filed in the history for `video_id`, if its lessons were fetched.
pub async fn history_lessons<S: KeyValueStore>(
    store: &LessonStore<S>,
    video_id: &str,
) -> Result<Option<LessonPlan>> {
    let Some(record) = store.history_entry(video_id).await? else {
        return Ok(None);
    };
    Ok(record.deep_dive_result.map(|lessons| LessonPlan {
        analysis: record.analysis_result,
        lessons,
    }))
}

/// Runs a session for one lesson, narrated by `channel`.
pub fn start_session(
    channel: Arc<RealtimeVoiceChannel>,
    checkpoint: Checkpoint,
    item: DeepDiveItem,
    shutdown: broadcast::Receiver<()>,
) -> (SessionHandle, JoinHandle<()>) {
    let bus = channel.bus().clone();
    let session = DeepDiveSession::new(checkpoint, item, channel);
    SessionWorker::spawn(session, &bus, shutdown)
}
