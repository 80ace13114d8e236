pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod format;
pub mod queues;
pub mod quiz;
pub mod routes;
pub mod session;
pub mod storage;
pub mod timeline;
pub mod types;
pub mod voice;

pub use api::{HealthStatus, KaptionApi};
pub use config::Config;
pub use error::{ApiError, KaptionError, Result, StorageError, VoiceChannelError};
pub use events::{EventBus, Inbox, Subscription, VoiceEvent, VoiceEventKind};
pub use format::{format_checkpoint_line, format_quiz, format_timestamp};
pub use quiz::{QuizAttempt, QuizItem, resolve_correct_index};
pub use session::{
    DeepDiveSession, LessonPlan, SessionCommand, SessionError, SessionHandle, SessionState,
    SessionWorker, Stage, bootstrap_voice, load_lessons, start_session,
};
pub use storage::{JsonFileStore, KeyValueStore, LessonStore, MemoryStore};
pub use timeline::CheckpointTimeline;
pub use types::{
    AnalyzeResponse, Checkpoint, DeepDiveBatchResponse, DeepDiveItem, LanguageLevel, UserProfile,
    VideoAnalysisRecord, video_id_from_url,
};
pub use voice::{HttpSignaling, Narrator, RealtimeVoiceChannel, StyleUpdate, VoiceStyle};
