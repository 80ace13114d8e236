use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::debug;

use crate::{
    error::StorageError,
    types::{
        AnalyzeResponse, CurrentVideoInfo, DeepDiveBatchResponse, UserProfile,
        VideoAnalysisRecord, video_id_from_url,
    },
};

pub const USER_PROFILE_KEY: &str = "userProfile";
pub const LAST_ANALYSIS_KEY: &str = "lastAnalysisResult";
pub const LAST_DEEP_DIVE_KEY: &str = "lastDeepDiveResult";
pub const CURRENT_VIDEO_KEY: &str = "currentVideoInfo";
pub const WAS_VIDEO_PLAYING_KEY: &str = "wasVideoPlaying";
pub const HISTORY_INDEX_KEY: &str = "videoAnalysisList";
const HISTORY_ENTRY_PREFIX: &str = "videoAnalysis_";

fn history_key(video_id: &str) -> String {
    format!("{HISTORY_ENTRY_PREFIX}{video_id}")
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// One pretty-printed JSON file per key.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StorageError::Decode {
                    key: key.to_string(),
                    source,
                }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;

        let path = self.path_for(key);
        let staged = path.with_extension("json.tmp");
        let raw = serde_json::to_string_pretty(&value)?;
        tokio::fs::write(&staged, raw)
            .await
            .map_err(|e| io_error(&staged, e))?;
        tokio::fs::rename(&staged, &path)
            .await
            .map_err(|e| io_error(&path, e))?;

        debug!(key, path = %path.display(), "stored");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.entries.lock().expect("MemoryStore poisoned").get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.entries
            .lock()
            .expect("MemoryStore poisoned")
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().expect("MemoryStore poisoned").remove(key);
        Ok(())
    }
}

/// Typed access to the records the app persists between runs.
pub struct LessonStore<S> {
    store: S,
}

impl<S: KeyValueStore> LessonStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let Some(value) = self.store.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|source| StorageError::Decode {
                key: key.to_string(),
                source,
            })
    }

    async fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        self.store.set(key, serde_json::to_value(value)?).await
    }

    pub async fn user_profile(&self) -> Result<Option<UserProfile>, StorageError> {
        self.load(USER_PROFILE_KEY).await
    }

    pub async fn save_user_profile(&self, profile: &UserProfile) -> Result<(), StorageError> {
        self.save(USER_PROFILE_KEY, profile).await
    }

    pub async fn last_analysis(&self) -> Result<Option<AnalyzeResponse>, StorageError> {
        self.load(LAST_ANALYSIS_KEY).await
    }

    pub async fn save_last_analysis(&self, analysis: &AnalyzeResponse) -> Result<(), StorageError> {
        self.save(LAST_ANALYSIS_KEY, analysis).await
    }

    pub async fn last_deep_dive(&self) -> Result<Option<DeepDiveBatchResponse>, StorageError> {
        self.load(LAST_DEEP_DIVE_KEY).await
    }

    pub async fn save_last_deep_dive(
        &self,
        batch: &DeepDiveBatchResponse,
    ) -> Result<(), StorageError> {
        self.save(LAST_DEEP_DIVE_KEY, batch).await
    }

    pub async fn current_video(&self) -> Result<Option<CurrentVideoInfo>, StorageError> {
        self.load(CURRENT_VIDEO_KEY).await
    }

    pub async fn save_current_video(&self, info: &CurrentVideoInfo) -> Result<(), StorageError> {
        self.save(CURRENT_VIDEO_KEY, info).await
    }

    /// Whether the video was playing when the panel paused it.
    pub async fn was_video_playing(&self) -> Result<bool, StorageError> {
        Ok(self.load(WAS_VIDEO_PLAYING_KEY).await?.unwrap_or(false))
    }

    pub async fn save_was_video_playing(&self, playing: bool) -> Result<(), StorageError> {
        self.save(WAS_VIDEO_PLAYING_KEY, &playing).await
    }

    pub async fn clear_was_video_playing(&self) -> Result<(), StorageError> {
        self.store.remove(WAS_VIDEO_PLAYING_KEY).await
    }

    /// Files an analysis under its video id.
    ///
    /// A video already in the history is updated in place and keeps its
    /// position and creation time; a new one goes to the front.
    pub async fn save_to_history(
        &self,
        url: &str,
        analysis: &AnalyzeResponse,
        deep_dive: Option<&DeepDiveBatchResponse>,
    ) -> Result<VideoAnalysisRecord, StorageError> {
        let video_id = video_id_from_url(url);
        let now = Utc::now();
        let mut index = self.history().await?;

        let existing = index.iter().position(|r| r.video_id == video_id);
        let record = VideoAnalysisRecord {
            video_id: video_id.clone(),
            url: url.trim().to_string(),
            analysis_result: analysis.clone(),
            deep_dive_result: deep_dive.cloned(),
            created_at: existing.map_or(now, |i| index[i].created_at),
            updated_at: now,
        };

        self.save(&history_key(&video_id), &record).await?;
        match existing {
            Some(i) => index[i] = record.clone(),
            None => index.insert(0, record.clone()),
        }
        self.save(HISTORY_INDEX_KEY, &index).await?;

        debug!(video_id = %video_id, entries = index.len(), "analysis filed in history");
        Ok(record)
    }

    /// Every analyzed video, newest first.
    pub async fn history(&self) -> Result<Vec<VideoAnalysisRecord>, StorageError> {
        Ok(self.load(HISTORY_INDEX_KEY).await?.unwrap_or_default())
    }

    pub async fn history_entry(
        &self,
        video_id: &str,
    ) -> Result<Option<VideoAnalysisRecord>, StorageError> {
        self.load(&history_key(video_id)).await
    }

    /// Removes a video from the history. Returns whether it was listed.
    pub async fn delete_from_history(&self, video_id: &str) -> Result<bool, StorageError> {
        self.store.remove(&history_key(video_id)).await?;

        let mut index = self.history().await?;
        let before = index.len();
        index.retain(|r| r.video_id != video_id);
        if index.len() == before {
            return Ok(false);
        }
        self.save(HISTORY_INDEX_KEY, &index).await?;
        Ok(true)
    }

    /// Drops the cached analysis and lessons, keeping the profile.
    pub async fn clear_results(&self) -> Result<(), StorageError> {
        self.store.remove(LAST_ANALYSIS_KEY).await?;
        self.store.remove(LAST_DEEP_DIVE_KEY).await
    }
}
