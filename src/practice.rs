use crate::lessons::Unlocks;
use crate::runtime::TickSchedule;
use crate::session::{KeystrokeOutcome, Millis, Session, SessionResult};
use crate::store::ProgressStore;
use crate::typing_policy::TypingPolicy;

/// What a finished attempt is credited to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PracticeTarget {
    Lesson {
        category_id: String,
        exercise_id: String,
    },
    Free {
        label: String,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PracticeOptions {
    pub policy: TypingPolicy,
    /// Overrides the exercise's own limit when set; `Some(0)` disables it.
    pub time_limit_secs: Option<u64>,
}

/// One practice screen: the live session, its timer, and where the result goes.
#[derive(Debug)]
pub struct PracticeController {
    session: Session,
    schedule: TickSchedule,
    target: PracticeTarget,
    unlocks: Option<Unlocks>,
}

impl PracticeController {
    /// Starts an unlocked lesson exercise; `None` when it is missing or locked.
    pub fn for_exercise(
        store: &mut ProgressStore,
        category_id: &str,
        exercise_id: &str,
        options: PracticeOptions,
    ) -> Option<Self> {
        let exercise = store.start_exercise(category_id, exercise_id)?;
        let limit = options.time_limit_secs.or(exercise.time_limit_secs);
        let session = Session::new(exercise.text.as_str(), limit).with_policy(options.policy);

        Some(Self::new(
            session,
            PracticeTarget::Lesson {
                category_id: category_id.to_string(),
                exercise_id: exercise_id.to_string(),
            },
        ))
    }

    pub fn free(label: &str, text: &str, options: PracticeOptions) -> Self {
        let session = Session::new(text, options.time_limit_secs).with_policy(options.policy);
        Self::new(
            session,
            PracticeTarget::Free {
                label: label.to_string(),
            },
        )
    }

    fn new(session: Session, target: PracticeTarget) -> Self {
        Self {
            session,
            schedule: TickSchedule::new(),
            target,
            unlocks: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn target(&self) -> &PracticeTarget {
        &self.target
    }

    /// Unlocks produced by the last recorded lesson completion.
    pub fn unlocks(&self) -> Option<&Unlocks> {
        self.unlocks.as_ref()
    }

    pub fn timer_armed(&self) -> bool {
        self.schedule.is_armed()
    }

    pub fn key(&mut self, c: char, now: Millis, store: &mut ProgressStore) -> KeystrokeOutcome {
        let was_started = self.session.has_started();
        let outcome = self.session.submit_keystroke(c, now);

        if !was_started && self.session.has_started() && self.session.is_timed() {
            self.schedule.arm(self.session.generation());
        }
        if let KeystrokeOutcome::Finished(result) = &outcome {
            self.complete(result, store);
        }
        outcome
    }

    /// Delivers a timer tick. Ticks for a superseded attempt are dropped.
    pub fn tick(&mut self, now: Millis, store: &mut ProgressStore) -> Option<SessionResult> {
        if !self.schedule.fires_for(self.session.generation()) {
            return None;
        }
        let result = self.session.tick(now)?;
        self.complete(&result, store);
        Some(result)
    }

    /// Abandons the current attempt without crediting it and starts over.
    pub fn restart(&mut self) {
        self.schedule.cancel();
        if self.session.has_started() && !self.session.has_finished() {
            tracing::debug!("discarding unfinished attempt");
        }
        self.session.reset();
        self.unlocks = None;
    }

    fn complete(&mut self, result: &SessionResult, store: &mut ProgressStore) {
        self.schedule.cancel();
        self.unlocks = match &self.target {
            PracticeTarget::Lesson {
                category_id,
                exercise_id,
            } => store.record_session(category_id, exercise_id, result),
            PracticeTarget::Free { .. } => {
                store.record_practice(result);
                None
            }
        };
    }
}
