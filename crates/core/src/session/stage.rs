use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Recap,
    Think,
    Quiz,
    Done,
}

impl Stage {
    /// Stage that follows once this one is finished.
    pub fn next(self) -> Stage {
        match self {
            Stage::Recap => Stage::Think,
            Stage::Think => Stage::Quiz,
            Stage::Quiz | Stage::Done => Stage::Done,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Recap => "recap",
            Stage::Think => "think",
            Stage::Quiz => "quiz",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a stage relates to its entry narration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagePolicy {
    /// The stage cannot progress until its narration has played.
    /// Undeliverable narration therefore advances immediately.
    pub blocks_on_narration: bool,
    /// The end of the entry narration moves on to the next stage.
    pub auto_advance_on_narration_end: bool,
}

/// Policies of the narrated stages. Quiz and done have no entry narration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePolicies {
    pub recap: StagePolicy,
    pub think: StagePolicy,
}

impl Default for StagePolicies {
    fn default() -> Self {
        Self {
            recap: StagePolicy {
                blocks_on_narration: true,
                auto_advance_on_narration_end: true,
            },
            think: StagePolicy::default(),
        }
    }
}

impl StagePolicies {
    pub fn for_stage(&self, stage: Stage) -> StagePolicy {
        match stage {
            Stage::Recap => self.recap,
            Stage::Think => self.think,
            Stage::Quiz | Stage::Done => StagePolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_move_forward() {
        assert_eq!(Stage::Recap.next(), Stage::Think);
        assert_eq!(Stage::Think.next(), Stage::Quiz);
        assert_eq!(Stage::Done.next(), Stage::Done);
    }

    #[test]
    fn only_recap_is_driven_by_narration_by_default() {
        let policies = StagePolicies::default();

        assert!(policies.for_stage(Stage::Recap).auto_advance_on_narration_end);
        assert_eq!(policies.for_stage(Stage::Think), StagePolicy::default());
        assert_eq!(policies.for_stage(Stage::Quiz), StagePolicy::default());
    }
}
