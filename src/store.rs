//! The progress store: lesson graph, statistics and preferences behind one
//! write-through persistence boundary.
//!
//! Every mutating call applies its whole state transition in memory and then
//! saves the complete blob once. A failed save never rolls the in-memory state
//! back; the store keeps running on what it has and reports the failure through
//! [`ProgressStore::storage_warning`] until a later save succeeds.

use chrono::{TimeZone, Utc};
use std::io::Write;

use crate::clock::Clock;
use crate::config::Preferences;
use crate::error::Result;
use crate::lessons::{CustomLesson, Exercise, LessonGraph, Unlocks};
use crate::session::SessionResult;
use crate::stats::{Achievement, DayEntry, StatisticsState, StatsSummary};
use crate::storage::{MemoryStorage, PersistedState, Storage};

pub struct ProgressStore {
    state: PersistedState,
    seed: LessonGraph,
    storage: Box<dyn Storage>,
    clock: Box<dyn Clock>,
    current: Option<(String, String)>,
    storage_warning: Option<String>,
}

impl std::fmt::Debug for ProgressStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressStore")
            .field("state", &self.state)
            .field("current", &self.current)
            .field("storage_warning", &self.storage_warning)
            .finish_non_exhaustive()
    }
}

impl ProgressStore {
    /// Loads the saved blob, falling back to seeded defaults when there is
    /// none or it cannot be read.
    pub fn open(storage: Box<dyn Storage>, clock: Box<dyn Clock>) -> Result<Self> {
        let seed = LessonGraph::seeded()?;
        let mut storage_warning = None;

        let state = match storage.load() {
            Ok(Some(state)) => state,
            Ok(None) => {
                tracing::info!("no saved progress, starting fresh");
                PersistedState::initial(seed.clone())
            }
            Err(err) => {
                tracing::warn!(error = %err, "saved progress unreadable, starting fresh");
                storage_warning = Some(format!("saved progress could not be read: {err}"));
                PersistedState::initial(seed.clone())
            }
        };

        Ok(Self {
            state,
            seed,
            storage,
            clock,
            current: None,
            storage_warning,
        })
    }

    pub fn in_memory(clock: Box<dyn Clock>) -> Result<Self> {
        Self::open(Box::new(MemoryStorage::new()), clock)
    }

    pub fn lessons(&self) -> &LessonGraph {
        &self.state.lessons
    }

    pub fn statistics(&self) -> &StatisticsState {
        &self.state.statistics
    }

    pub fn preferences(&self) -> &Preferences {
        &self.state.preferences
    }

    pub fn custom_lessons(&self) -> &[CustomLesson] {
        &self.state.custom_lessons
    }

    pub fn storage_warning(&self) -> Option<&str> {
        self.storage_warning.as_deref()
    }

    /// Completes a lesson exercise and folds its result into the statistics.
    /// Unknown ids leave everything untouched and return `None`.
    pub fn record_session(
        &mut self,
        category_id: &str,
        exercise_id: &str,
        result: &SessionResult,
    ) -> Option<Unlocks> {
        let Some(unlocks) = self.state.lessons.complete_exercise(category_id, exercise_id) else {
            tracing::debug!(category_id, exercise_id, "ignoring result for unknown exercise");
            return None;
        };

        let today = self.clock.today();
        self.state.statistics.exercises_completed += 1;
        self.state.statistics.record(result, today);

        tracing::info!(
            category_id,
            exercise_id,
            wpm = result.wpm,
            accuracy = result.accuracy,
            progress = unlocks.progress,
            "exercise completed"
        );
        if let Some(next) = &unlocks.next_category {
            tracing::info!(category = %next, "category unlocked");
        }

        self.persist();
        Some(unlocks)
    }

    /// Folds a free-practice result into the statistics only.
    pub fn record_practice(&mut self, result: &SessionResult) {
        let today = self.clock.today();
        self.state.statistics.record(result, today);
        tracing::info!(wpm = result.wpm, accuracy = result.accuracy, "practice recorded");
        self.persist();
    }

    pub fn recent_stats(&self, days: usize) -> Vec<DayEntry> {
        self.state.statistics.recent(days, self.clock.today())
    }

    pub fn summary(&self) -> StatsSummary {
        self.state.statistics.summary(self.clock.today())
    }

    pub fn achievements(&self) -> Vec<Achievement> {
        self.state.statistics.achievements()
    }

    pub fn export_daily_csv<W: Write>(&self, writer: W) -> Result<()> {
        self.state.statistics.write_daily_csv(writer)
    }

    /// Back to the seeded curriculum and empty statistics. Preferences stay.
    pub fn reset_progress(&mut self) {
        let preferences = self.state.preferences.clone();
        self.state = PersistedState::initial(self.seed.clone());
        self.state.preferences = preferences;
        self.current = None;
        tracing::info!("progress reset");
        self.persist();
    }

    /// Selects the exercise the user is about to practice. Locked or unknown
    /// exercises are refused.
    pub fn start_exercise(&mut self, category_id: &str, exercise_id: &str) -> Option<&Exercise> {
        let unlocked = self
            .state
            .lessons
            .exercise(category_id, exercise_id)
            .is_some_and(|e| e.unlocked);
        if !unlocked {
            tracing::debug!(category_id, exercise_id, "exercise missing or locked");
            return None;
        }
        self.current = Some((category_id.to_string(), exercise_id.to_string()));
        self.state.lessons.exercise(category_id, exercise_id)
    }

    pub fn current_exercise(&self) -> Option<(&str, &str)> {
        self.current
            .as_ref()
            .map(|(c, e)| (c.as_str(), e.as_str()))
    }

    pub fn first_unlocked_exercise(&self, category_id: &str) -> Option<&Exercise> {
        self.state.lessons.first_unlocked_exercise(category_id)
    }

    pub fn create_custom_lesson(&mut self, title: &str, text: &str) -> CustomLesson {
        let created_at = i64::try_from(self.clock.now_ms())
            .ok()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);
        let lesson = CustomLesson::new(title, text, created_at, &self.state.custom_lessons);
        self.state.custom_lessons.push(lesson.clone());
        tracing::info!(id = %lesson.id, "custom lesson created");
        self.persist();
        lesson
    }

    pub fn custom_lesson(&self, id: &str) -> Option<&CustomLesson> {
        self.state.custom_lessons.iter().find(|l| l.id == id)
    }

    pub fn remove_custom_lesson(&mut self, id: &str) -> bool {
        let before = self.state.custom_lessons.len();
        self.state.custom_lessons.retain(|l| l.id != id);
        let removed = self.state.custom_lessons.len() != before;
        if removed {
            self.persist();
        }
        removed
    }

    pub fn set_preference(&mut self, key: &str, value: &str) -> Result<()> {
        self.state.preferences.set(key, value)?;
        self.persist();
        Ok(())
    }

    fn persist(&mut self) {
        match self.storage.save(&self.state) {
            Ok(()) => self.storage_warning = None,
            Err(err) => {
                tracing::warn!(error = %err, "could not save progress, keeping it in memory");
                self.storage_warning = Some(format!("progress is not being saved: {err}"));
            }
        }
    }
}
