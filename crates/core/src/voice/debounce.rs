use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_SPEAK_DEBOUNCE: Duration = Duration::from_millis(1200);

/// Suppresses repeats of the exact same text inside a short window.
#[derive(Debug)]
pub struct SpeakDebouncer {
    window: Duration,
    last: Option<(String, Instant)>,
}

impl SpeakDebouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Returns `true` when `text` repeats the last utterance within the window.
    /// Otherwise records `text` as the last utterance.
    pub fn should_skip(&mut self, text: &str, now: Instant) -> bool {
        if let Some((last_text, at)) = &self.last
            && last_text == text
            && now.saturating_duration_since(*at) < self.window
        {
            return true;
        }

        self.last = Some((text.to_string(), now));
        false
    }
}

impl Default for SpeakDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_SPEAK_DEBOUNCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn repeats_inside_window_are_skipped() {
        let mut debouncer = SpeakDebouncer::default();
        let start = Instant::now();

        assert!(!debouncer.should_skip("Hello", start));
        assert!(debouncer.should_skip("Hello", start + Duration::from_millis(500)));
        assert!(!debouncer.should_skip("Hello", start + Duration::from_millis(1300)));
    }

    #[tokio::test(start_paused = true)]
    async fn different_text_is_never_skipped() {
        let mut debouncer = SpeakDebouncer::default();
        let now = Instant::now();

        assert!(!debouncer.should_skip("Hello", now));
        assert!(!debouncer.should_skip("Bye", now));
        assert!(!debouncer.should_skip("Hello", now));
    }
}
