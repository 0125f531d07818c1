use crate::typing_policy::{is_practice_char, TypingPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Milliseconds on whatever monotonic-enough clock the host uses.
pub type Millis = u64;

const CHARS_PER_WORD: f64 = 5.0;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// The fixed text a session asks the user to reproduce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetText {
    chars: Vec<char>,
}

impl TargetText {
    pub fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn char_at(&self, idx: usize) -> Option<char> {
        self.chars.get(idx).copied()
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    /// Number of whitespace-separated words touched by the first `n` characters.
    pub fn words_in_prefix(&self, n: usize) -> usize {
        let end = n.min(self.chars.len());
        let mut words = 0;
        let mut in_word = false;
        for c in &self.chars[..end] {
            if c.is_whitespace() {
                in_word = false;
            } else if !in_word {
                in_word = true;
                words += 1;
            }
        }
        words
    }
}

impl From<&str> for TargetText {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for TargetText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.chars.iter().try_for_each(|c| write!(f, "{c}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mistake {
    pub index: usize,
    pub expected: char,
    pub actual: char,
}

/// Mutable state of one typing attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub cursor: usize,
    pub started_at: Option<Millis>,
    pub finished_at: Option<Millis>,
    pub mistakes: Vec<Mistake>,
    /// 0 means unlimited
    pub time_limit_secs: u64,
    pub last_key: Option<char>,
}

impl SessionState {
    pub fn new(time_limit_secs: u64) -> Self {
        Self {
            time_limit_secs,
            ..Self::default()
        }
    }

    pub fn has_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn has_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Positions with at least one recorded mismatch.
    fn mistyped_positions(&self) -> HashSet<usize> {
        self.mistakes.iter().map(|m| m.index).collect()
    }

    /// Accuracy over the positions the cursor has already passed.
    fn accuracy(&self) -> u32 {
        let cursor = self.cursor;
        let mistyped = self
            .mistyped_positions()
            .into_iter()
            .filter(|&idx| idx < cursor)
            .count();
        accuracy(cursor, mistyped)
    }

    fn elapsed_secs(&self, now: Millis) -> f64 {
        self.started_at
            .map(|start| now.saturating_sub(start) as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Completion {
    EndOfText,
    TimeLimit,
}

/// Final numbers for a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
    pub wpm: u32,
    pub accuracy: u32,
    pub elapsed_seconds: f64,
    pub mistake_count: usize,
    pub characters_typed: usize,
    pub words_typed: usize,
    pub completion: Completion,
    pub mistakes: Vec<Mistake>,
}

impl SessionResult {
    pub fn time_spent_minutes(&self) -> f64 {
        self.elapsed_seconds / 60.0
    }
}

/// Point-in-time estimate emitted after every evaluated keystroke.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub progress_percent: f64,
    pub running_wpm: u32,
    pub running_accuracy: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeystrokeOutcome {
    /// Not part of the practice alphabet, or the session is already over.
    Ignored,
    Advanced(Progress),
    Mistake(Progress),
    Finished(SessionResult),
}

/// How the renderer should paint one target character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharState {
    Untyped,
    Current,
    Correct,
    Incorrect,
}

/// Standard 5-characters-per-word speed; zero elapsed time yields zero.
pub fn words_per_minute(characters: usize, elapsed_secs: f64) -> u32 {
    if elapsed_secs <= 0.0 {
        return 0;
    }
    ((characters as f64 / CHARS_PER_WORD) / (elapsed_secs / 60.0)).round() as u32
}

/// Share of typed positions that were hit without a mismatch. `mistyped` counts
/// positions, not keystrokes, and must not exceed `characters`.
pub fn accuracy(characters: usize, mistyped: usize) -> u32 {
    if characters == 0 {
        return 100;
    }
    let clean = characters.saturating_sub(mistyped) as f64;
    ((clean / characters as f64) * 100.0).round() as u32
}

type ProgressListener = Box<dyn FnMut(&Progress)>;

/// Evaluates keystrokes against one [`TargetText`].
pub struct Session {
    target: TargetText,
    state: SessionState,
    policy: TypingPolicy,
    generation: u64,
    result: Option<SessionResult>,
    listener: Option<ProgressListener>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("target", &self.target)
            .field("state", &self.state)
            .field("policy", &self.policy)
            .field("generation", &self.generation)
            .field("result", &self.result)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

impl Session {
    pub fn new(target: impl Into<TargetText>, time_limit_secs: Option<u64>) -> Self {
        Self {
            target: target.into(),
            state: SessionState::new(time_limit_secs.unwrap_or(0)),
            policy: TypingPolicy::default(),
            generation: next_generation(),
            result: None,
            listener: None,
        }
    }

    pub fn with_policy(mut self, policy: TypingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Registers a callback fired after every evaluated keystroke.
    pub fn on_progress(mut self, listener: impl FnMut(&Progress) + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn target(&self) -> &TargetText {
        &self.target
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn policy(&self) -> TypingPolicy {
        self.policy
    }

    /// Changes on every reset so timers armed for an older attempt can tell.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn result(&self) -> Option<&SessionResult> {
        self.result.as_ref()
    }

    pub fn has_started(&self) -> bool {
        self.state.has_started()
    }

    pub fn has_finished(&self) -> bool {
        self.state.has_finished()
    }

    pub fn is_timed(&self) -> bool {
        self.state.time_limit_secs > 0
    }

    pub fn submit_keystroke(&mut self, c: char, timestamp: Millis) -> KeystrokeOutcome {
        if self.has_finished() || !is_practice_char(c) {
            return KeystrokeOutcome::Ignored;
        }
        if let Some(result) = self.tick(timestamp) {
            return KeystrokeOutcome::Finished(result);
        }
        if self.state.started_at.is_none() {
            self.state.started_at = Some(timestamp);
        }
        self.state.last_key = Some(c);

        let Some(expected) = self.target.char_at(self.state.cursor) else {
            // empty target: the first keystroke completes it
            return KeystrokeOutcome::Finished(self.finish(timestamp, Completion::EndOfText));
        };

        let matched = c == expected;
        if !matched {
            self.state.mistakes.push(Mistake {
                index: self.state.cursor,
                expected,
                actual: c,
            });
        }
        if matched || self.policy.advances_on_mismatch() {
            self.state.cursor += 1;
        }

        let progress = self.progress_at(timestamp);
        self.notify(&progress);

        if self.state.cursor == self.target.len() {
            KeystrokeOutcome::Finished(self.finish(timestamp, Completion::EndOfText))
        } else if matched {
            KeystrokeOutcome::Advanced(progress)
        } else {
            KeystrokeOutcome::Mistake(progress)
        }
    }

    /// Timer hook for time-limited sessions. Returns the result when this
    /// tick is the one that ends the session.
    pub fn tick(&mut self, now: Millis) -> Option<SessionResult> {
        if !self.is_timed() || !self.has_started() || self.has_finished() {
            return None;
        }
        match self.remaining_seconds(now) {
            Some(remaining) if remaining <= 0.0 => Some(self.finish(now, Completion::TimeLimit)),
            _ => None,
        }
    }

    /// Seconds left on the clock; the full limit before typing starts.
    pub fn remaining_seconds(&self, now: Millis) -> Option<f64> {
        if !self.is_timed() {
            return None;
        }
        let limit = self.state.time_limit_secs as f64;
        let end = self.state.finished_at.unwrap_or(now);
        Some((limit - self.state.elapsed_secs(end)).max(0.0))
    }

    /// Fresh attempt at the same text; any in-flight result is discarded.
    pub fn reset(&mut self) {
        self.state = SessionState::new(self.state.time_limit_secs);
        self.result = None;
        self.generation = next_generation();
    }

    pub fn progress_at(&self, now: Millis) -> Progress {
        let cursor = self.state.cursor;
        let progress_percent = if self.target.is_empty() {
            100.0
        } else {
            cursor as f64 / self.target.len() as f64 * 100.0
        };
        Progress {
            progress_percent,
            running_wpm: words_per_minute(cursor, self.state.elapsed_secs(now)),
            running_accuracy: self.state.accuracy(),
        }
    }

    /// Most recently pressed practice key.
    pub fn active_key(&self) -> Option<char> {
        self.state.last_key
    }

    /// Next expected character, absent once the session is over.
    pub fn target_key(&self) -> Option<char> {
        if self.has_finished() {
            return None;
        }
        self.target.char_at(self.state.cursor)
    }

    pub fn char_states(&self) -> Vec<CharState> {
        let missed = self.state.mistyped_positions();
        let cursor = self.state.cursor;
        let finished = self.has_finished();

        (0..self.target.len())
            .map(|idx| {
                if idx < cursor {
                    if missed.contains(&idx) {
                        CharState::Incorrect
                    } else {
                        CharState::Correct
                    }
                } else if idx == cursor && !finished {
                    CharState::Current
                } else {
                    CharState::Untyped
                }
            })
            .collect()
    }

    fn finish(&mut self, now: Millis, completion: Completion) -> SessionResult {
        self.state.finished_at = Some(now);
        let cursor = self.state.cursor;
        let elapsed_seconds = self.state.elapsed_secs(now);
        let result = SessionResult {
            wpm: words_per_minute(cursor, elapsed_seconds),
            accuracy: self.state.accuracy(),
            elapsed_seconds,
            mistake_count: self.state.mistyped_positions().len(),
            characters_typed: cursor,
            words_typed: self.target.words_in_prefix(cursor),
            completion,
            mistakes: self.state.mistakes.clone(),
        };
        tracing::debug!(
            wpm = result.wpm,
            accuracy = result.accuracy,
            ?completion,
            "session finished"
        );
        self.result = Some(result.clone());
        result
    }

    fn notify(&mut self, progress: &Progress) {
        if let Some(listener) = self.listener.as_mut() {
            listener(progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_target_text_words_in_prefix() {
        let t = TargetText::new("dad sad  fad");
        assert_eq!(t.words_in_prefix(0), 0);
        assert_eq!(t.words_in_prefix(1), 1);
        assert_eq!(t.words_in_prefix(4), 1);
        assert_eq!(t.words_in_prefix(5), 2);
        assert_eq!(t.words_in_prefix(100), 3);
        assert_eq!(t.to_string(), "dad sad  fad");
    }

    #[test]
    fn test_new_session_is_idle() {
        let s = Session::new("hello", None);
        assert_eq!(s.state().cursor, 0);
        assert!(!s.has_started());
        assert!(!s.has_finished());
        assert_eq!(s.target_key(), Some('h'));
        assert_eq!(s.active_key(), None);
        assert_eq!(s.remaining_seconds(0), None);
    }

    #[test]
    fn test_clock_starts_on_first_accepted_key() {
        let mut s = Session::new("abc", None);
        assert_eq!(s.submit_keystroke('\t', 100), KeystrokeOutcome::Ignored);
        assert!(!s.has_started());

        s.submit_keystroke('a', 250);
        assert_eq!(s.state().started_at, Some(250));
    }

    #[test]
    fn test_mismatch_is_recorded_and_cursor_holds() {
        let mut s = Session::new("abc", None);
        assert_matches!(s.submit_keystroke('x', 0), KeystrokeOutcome::Mistake(_));
        assert_eq!(s.state().cursor, 0);
        assert_eq!(
            s.state().mistakes,
            vec![Mistake {
                index: 0,
                expected: 'a',
                actual: 'x'
            }]
        );
        assert_eq!(s.target_key(), Some('a'));
        assert_eq!(s.active_key(), Some('x'));
    }

    #[test]
    fn test_cursor_is_monotonic_and_steps_by_one() {
        let mut s = Session::new("the cat", None);
        let keys = ['t', 'q', 'h', 'e', 'e', ' ', 'z', 'c', 'a', 't'];
        let mut last = 0;
        for (i, k) in keys.iter().enumerate() {
            let before = s.state().cursor;
            let before_mistakes = s.state().mistakes.len();
            let outcome = s.submit_keystroke(*k, i as u64 * 100);
            let after = s.state().cursor;
            assert!(after >= last);
            match outcome {
                KeystrokeOutcome::Mistake(_) => {
                    assert_eq!(after, before);
                    assert_eq!(s.state().mistakes.len(), before_mistakes + 1);
                }
                KeystrokeOutcome::Advanced(_) | KeystrokeOutcome::Finished(_) => {
                    assert_eq!(after, before + 1);
                }
                KeystrokeOutcome::Ignored => assert_eq!(after, before),
            }
            last = after;
        }
        assert!(s.has_finished());
    }

    #[test]
    fn test_completion_with_one_mistake() {
        let mut s = Session::new("ab", None);
        let mut cursors = vec![s.state().cursor];

        s.submit_keystroke('a', 0);
        cursors.push(s.state().cursor);
        s.submit_keystroke('x', 20_000);
        cursors.push(s.state().cursor);
        s.submit_keystroke('a', 40_000);
        cursors.push(s.state().cursor);
        let outcome = s.submit_keystroke('b', 60_000);
        cursors.push(s.state().cursor);

        assert_eq!(cursors, vec![0, 1, 1, 1, 2]);
        let result = assert_matches!(outcome, KeystrokeOutcome::Finished(r) => r);
        assert_eq!(result.mistake_count, 1);
        assert_eq!(result.characters_typed, 2);
        assert_eq!(result.accuracy, 50);
        assert_eq!(result.wpm, 0);
        assert_eq!(result.elapsed_seconds, 60.0);
        assert_eq!(result.completion, Completion::EndOfText);
        assert_eq!(s.state().finished_at, Some(60_000));
        assert_eq!(s.result(), Some(&result));
    }

    #[test]
    fn test_finished_session_ignores_input() {
        let mut s = Session::new("a", None);
        assert_matches!(s.submit_keystroke('a', 0), KeystrokeOutcome::Finished(_));
        assert_eq!(s.submit_keystroke('a', 10), KeystrokeOutcome::Ignored);
        assert_eq!(s.submit_keystroke('z', 10), KeystrokeOutcome::Ignored);
        assert!(s.state().mistakes.is_empty());
        assert_eq!(s.target_key(), None);
    }

    #[test]
    fn test_perfect_run_has_full_accuracy() {
        let mut s = Session::new("hello world", None);
        let mut result = None;
        for (i, c) in "hello world".chars().enumerate() {
            if let KeystrokeOutcome::Finished(r) = s.submit_keystroke(c, i as u64 * 200) {
                result = Some(r);
            }
        }
        let result = result.unwrap();
        assert_eq!(result.accuracy, 100);
        assert_eq!(result.words_typed, 2);
        // 11 chars in 2s: (11/5) / (2/60) = 66
        assert_eq!(result.wpm, 66);
    }

    #[test]
    fn test_accuracy_formula() {
        assert_eq!(accuracy(0, 0), 100);
        assert_eq!(accuracy(2, 2), 0);
        assert_eq!(accuracy(4, 1), 75);
        assert_eq!(accuracy(3, 1), 67);
    }

    #[test]
    fn test_repeated_misses_at_one_position_count_once() {
        let mut s = Session::new("ab", None);
        s.submit_keystroke('x', 0);
        s.submit_keystroke('y', 10);
        s.submit_keystroke('z', 20);
        s.submit_keystroke('a', 30);
        s.submit_keystroke('q', 40);
        s.submit_keystroke('q', 50);
        assert_eq!(s.progress_at(50).running_accuracy, 0);

        let result = assert_matches!(s.submit_keystroke('b', 60), KeystrokeOutcome::Finished(r) => r);
        assert_eq!(s.state().mistakes.len(), 5);
        assert_eq!(result.mistakes.len(), 5);
        assert_eq!(result.mistake_count, 2);
        assert_eq!(result.accuracy, 0);
    }

    #[test]
    fn test_running_accuracy_covers_passed_positions() {
        let mut s = Session::new("abcd", None);
        s.submit_keystroke('a', 0);
        s.submit_keystroke('x', 10);
        s.submit_keystroke('x', 20);
        assert_eq!(s.progress_at(20).running_accuracy, 100);
        s.submit_keystroke('b', 30);
        assert_eq!(s.progress_at(30).running_accuracy, 50);
        s.submit_keystroke('c', 40);
        assert_eq!(s.progress_at(40).running_accuracy, 67);
    }

    #[test]
    fn test_wpm_zero_elapsed() {
        assert_eq!(words_per_minute(25, 0.0), 0);
        assert_eq!(words_per_minute(25, 60.0), 5);
    }

    #[test]
    fn test_tick_ignored_without_limit_or_before_start() {
        let mut untimed = Session::new("abc", None);
        untimed.submit_keystroke('a', 0);
        assert_eq!(untimed.tick(1_000_000), None);

        let mut timed = Session::new("abc", Some(5));
        assert_eq!(timed.tick(1_000_000), None);
        assert!(!timed.has_finished());
        assert_eq!(timed.remaining_seconds(1_000_000), Some(5.0));
    }

    #[test]
    fn test_time_limit_finishes_with_partial_cursor() {
        let mut s = Session::new("abcdef", Some(3));
        s.submit_keystroke('a', 1_000);
        s.submit_keystroke('b', 1_500);
        assert_eq!(s.tick(2_000), None);
        assert_eq!(s.remaining_seconds(2_500), Some(1.5));

        let result = s.tick(4_000).expect("limit reached");
        assert_eq!(result.completion, Completion::TimeLimit);
        assert_eq!(result.characters_typed, 2);
        assert_eq!(result.elapsed_seconds, 3.0);
        assert_eq!(s.state().finished_at, Some(4_000));
        assert_eq!(s.tick(5_000), None);
        assert_eq!(s.remaining_seconds(9_000), Some(0.0));
    }

    #[test]
    fn test_late_keystroke_expires_session() {
        let mut s = Session::new("abcdef", Some(1));
        s.submit_keystroke('a', 0);
        let outcome = s.submit_keystroke('b', 1_200);
        let result = assert_matches!(outcome, KeystrokeOutcome::Finished(r) => r);
        assert_eq!(result.completion, Completion::TimeLimit);
        assert_eq!(result.characters_typed, 1);
    }

    #[test]
    fn test_reset_restores_fresh_state() {
        let mut s = Session::new("ab", Some(30));
        let first_generation = s.generation();
        s.submit_keystroke('x', 0);
        s.submit_keystroke('a', 10);
        s.reset();

        assert_eq!(s.state(), &SessionState::new(30));
        assert!(s.result().is_none());
        assert_ne!(s.generation(), first_generation);
    }

    #[test]
    fn test_type_past_errors_advances() {
        let mut s = Session::new("abc", None).with_policy(TypingPolicy::TypePastErrors);
        assert_matches!(s.submit_keystroke('x', 0), KeystrokeOutcome::Mistake(_));
        assert_eq!(s.state().cursor, 1);
        s.submit_keystroke('b', 100);
        let result = assert_matches!(s.submit_keystroke('c', 200), KeystrokeOutcome::Finished(r) => r);
        assert_eq!(result.mistake_count, 1);
        assert_eq!(result.accuracy, 67);
    }

    #[test]
    fn test_char_states_projection() {
        let mut s = Session::new("abcd", None);
        s.submit_keystroke('a', 0);
        s.submit_keystroke('q', 10);
        s.submit_keystroke('b', 20);

        assert_eq!(
            s.char_states(),
            vec![
                CharState::Correct,
                CharState::Incorrect,
                CharState::Current,
                CharState::Untyped
            ]
        );
    }

    #[test]
    fn test_progress_listener_sees_every_evaluated_key() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut s = Session::new("abcd", None).on_progress(move |p| sink.borrow_mut().push(*p));

        s.submit_keystroke('a', 0);
        s.submit_keystroke('\u{1b}', 5);
        s.submit_keystroke('z', 30_000);
        s.submit_keystroke('b', 60_000);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].progress_percent, 25.0);
        assert_eq!(seen[1].running_accuracy, 100);
        assert_eq!(seen[2].progress_percent, 50.0);
        assert_eq!(seen[2].running_accuracy, 50);
        assert_eq!(seen[2].running_wpm, 0);
    }

    #[test]
    fn test_empty_target_finishes_on_first_key() {
        let mut s = Session::new("", None);
        let result = assert_matches!(s.submit_keystroke('a', 0), KeystrokeOutcome::Finished(r) => r);
        assert_eq!(result.characters_typed, 0);
        assert_eq!(result.accuracy, 100);
    }
}
