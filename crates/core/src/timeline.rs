use crate::types::Checkpoint;

/// Playback may report a time slightly before the checkpoint it is sitting on.
const REVEAL_TOLERANCE_SECONDS: f64 = 0.05;

/// Checkpoints of one video, revealed progressively as playback passes them.
#[derive(Debug, Clone)]
pub struct CheckpointTimeline {
    checkpoints: Vec<Checkpoint>,
    progressive: bool,
    visible_until: Option<usize>,
}

impl CheckpointTimeline {
    pub fn new(mut checkpoints: Vec<Checkpoint>) -> Self {
        checkpoints.sort_by(|a, b| a.timestamp_seconds.total_cmp(&b.timestamp_seconds));
        Self {
            checkpoints,
            progressive: true,
            visible_until: None,
        }
    }

    /// Timeline revealed up to `time`, or fully revealed without one.
    pub fn revealed_at(checkpoints: Vec<Checkpoint>, time: Option<f64>) -> Self {
        let mut timeline = Self::new(checkpoints);
        match time {
            Some(time) => {
                timeline.advance(time);
            }
            None => timeline.set_progressive(false),
        }
        timeline
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn is_progressive(&self) -> bool {
        self.progressive
    }

    /// Switching progressive reveal off shows every checkpoint.
    pub fn set_progressive(&mut self, progressive: bool) {
        self.progressive = progressive;
    }

    /// Index of the last checkpoint at or before `time`.
    pub fn last_reached(&self, time: f64) -> Option<usize> {
        if !time.is_finite() {
            return None;
        }
        let reached = self
            .checkpoints
            .partition_point(|c| c.timestamp_seconds <= time + REVEAL_TOLERANCE_SECONDS);
        reached.checked_sub(1)
    }

    /// Feeds a playback reading. Returns the newly revealed checkpoints, if any.
    pub fn advance(&mut self, time: f64) -> &[Checkpoint] {
        let Some(reached) = self.last_reached(time) else {
            return &[];
        };
        let start = match self.visible_until {
            Some(current) if reached <= current => return &[],
            Some(current) => current + 1,
            None => 0,
        };
        self.visible_until = Some(reached);
        &self.checkpoints[start..=reached]
    }

    pub fn visible(&self) -> &[Checkpoint] {
        if !self.progressive {
            return &self.checkpoints;
        }
        match self.visible_until {
            Some(last) => &self.checkpoints[..=last],
            None => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn checkpoint(at: f64, keyword: &str) -> Checkpoint {
        serde_json::from_value(json!({
            "timestamp_seconds": at,
            "trigger_keyword": keyword,
            "context_title": keyword,
            "explanation": {"summary": "", "main": "", "tip": ""}
        }))
        .unwrap()
    }

    fn timeline() -> CheckpointTimeline {
        CheckpointTimeline::new(vec![
            checkpoint(90.0, "jeong"),
            checkpoint(10.0, "nunchi"),
            checkpoint(45.5, "hoobae"),
        ])
    }

    #[test]
    fn checkpoints_are_sorted_by_time() {
        let keywords: Vec<_> = timeline()
            .checkpoints()
            .iter()
            .map(|c| c.trigger_keyword.clone())
            .collect();

        assert_eq!(keywords, vec!["nunchi", "hoobae", "jeong"]);
    }

    #[test]
    fn reveal_tolerates_slightly_early_readings() {
        let t = timeline();

        assert_eq!(t.last_reached(9.9), None);
        assert_eq!(t.last_reached(9.96), Some(0));
        assert_eq!(t.last_reached(60.0), Some(1));
        assert_eq!(t.last_reached(f64::NAN), None);
    }

    #[test]
    fn visible_range_never_shrinks() {
        let mut t = timeline();

        assert_eq!(t.advance(50.0).len(), 2);
        assert!(t.advance(5.0).is_empty());
        assert_eq!(t.visible().len(), 2);

        let newly = t.advance(95.0);
        assert_eq!(newly.len(), 1);
        assert_eq!(newly[0].trigger_keyword, "jeong");
        assert_eq!(t.visible().len(), 3);
    }

    #[test]
    fn disabling_progressive_shows_everything() {
        let mut t = timeline();
        assert!(t.visible().is_empty());

        t.set_progressive(false);

        assert_eq!(t.visible().len(), 3);
    }

    #[test]
    fn revealed_without_a_time_lists_everything() {
        let all = CheckpointTimeline::revealed_at(timeline().checkpoints().to_vec(), None);
        assert!(!all.is_progressive());
        assert_eq!(all.visible().len(), 3);

        let early = CheckpointTimeline::revealed_at(timeline().checkpoints().to_vec(), Some(50.0));
        assert!(early.is_progressive());
        assert_eq!(early.visible().len(), 2);
    }
}
