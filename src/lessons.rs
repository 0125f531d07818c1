use chrono::{DateTime, Utc};
use include_dir::{include_dir, Dir};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::util::percent;

static CONTENT_DIR: Dir = include_dir!("src/content");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub id: String,
    pub title: String,
    pub description: String,
    pub text: String,
    pub completed: bool,
    pub unlocked: bool,
    /// Keys the exercise drills; may name non-character keys like "Shift".
    #[serde(default)]
    pub target_keys: Vec<String>,
    #[serde(default, rename = "timeLimit", skip_serializing_if = "Option::is_none")]
    pub time_limit_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonCategory {
    pub id: String,
    pub title: String,
    pub description: String,
    pub progress: u32,
    pub unlocked: bool,
    pub exercises: Vec<Exercise>,
}

impl LessonCategory {
    pub fn completed_count(&self) -> usize {
        self.exercises.iter().filter(|e| e.completed).count()
    }

    pub fn exercise_index(&self, exercise_id: &str) -> Option<usize> {
        self.exercises.iter().position(|e| e.id == exercise_id)
    }
}

/// What a completion changed, for logging and the results screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Unlocks {
    pub progress: u32,
    pub next_exercise: Option<String>,
    pub next_category: Option<String>,
}

/// Lesson categories in their fixed unlock order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LessonGraph {
    categories: Vec<LessonCategory>,
}

impl LessonGraph {
    pub fn new(categories: Vec<LessonCategory>) -> Self {
        Self { categories }
    }

    /// The built-in curriculum with only the first steps unlocked.
    pub fn seeded() -> Result<Self> {
        let categories = serde_json::from_str(content_file("lessons.json")?)?;
        Ok(Self { categories })
    }

    pub fn categories(&self) -> &[LessonCategory] {
        &self.categories
    }

    pub fn category(&self, category_id: &str) -> Option<&LessonCategory> {
        self.categories.iter().find(|c| c.id == category_id)
    }

    pub fn exercise(&self, category_id: &str, exercise_id: &str) -> Option<&Exercise> {
        self.category(category_id)?
            .exercises
            .iter()
            .find(|e| e.id == exercise_id)
    }

    pub fn first_unlocked_exercise(&self, category_id: &str) -> Option<&Exercise> {
        self.category(category_id)?
            .exercises
            .iter()
            .find(|e| e.unlocked)
    }

    /// Marks an exercise done and walks the unlock chain. `None` when either
    /// id is unknown, in which case nothing changes.
    pub fn complete_exercise(&mut self, category_id: &str, exercise_id: &str) -> Option<Unlocks> {
        let cat_idx = self.categories.iter().position(|c| c.id == category_id)?;
        let category = &mut self.categories[cat_idx];
        let ex_idx = category.exercise_index(exercise_id)?;

        let mut unlocks = Unlocks::default();
        category.exercises[ex_idx].completed = true;

        if let Some(next) = category.exercises.get_mut(ex_idx + 1) {
            if !next.unlocked {
                next.unlocked = true;
                unlocks.next_exercise = Some(next.id.clone());
            }
        }

        category.progress = percent(category.completed_count(), category.exercises.len());
        unlocks.progress = category.progress;

        if category.progress == 100 {
            if let Some(next_category) = self.categories.get_mut(cat_idx + 1) {
                next_category.unlocked = true;
                if let Some(first) = next_category.exercises.first_mut() {
                    first.unlocked = true;
                }
                unlocks.next_category = Some(next_category.id.clone());
            }
        }

        Some(unlocks)
    }
}

/// A user-authored practice text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomLesson {
    pub id: String,
    pub title: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl CustomLesson {
    /// Builds a lesson with a `custom-<millis>` id unique within `existing`.
    pub fn new(title: &str, text: &str, created_at: DateTime<Utc>, existing: &[CustomLesson]) -> Self {
        let base = format!("custom-{}", created_at.timestamp_millis());
        let mut id = base.clone();
        let mut n = 2;
        while existing.iter().any(|l| l.id == id) {
            id = format!("{base}-{n}");
            n += 1;
        }
        Self {
            id,
            title: title.to_string(),
            text: text.to_string(),
            created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PracticeMode {
    Paragraph,
    Code,
    Quotes,
}

/// Free-practice text for `mode`, cycling through the built-in texts.
pub fn practice_text(mode: PracticeMode, index: usize) -> Result<String> {
    let texts: BTreeMap<String, Vec<String>> =
        serde_json::from_str(content_file("practice.json")?)?;
    let key = mode.to_string();
    let pool = texts
        .get(&key)
        .filter(|pool| !pool.is_empty())
        .ok_or_else(|| Error::Content(format!("no practice texts for {key}")))?;
    Ok(pool[index % pool.len()].clone())
}

fn content_file(name: &str) -> Result<&'static str> {
    CONTENT_DIR
        .get_file(name)
        .and_then(|f| f.contents_utf8())
        .ok_or_else(|| Error::Content(format!("missing embedded file {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typing_policy::is_practice_char;
    use chrono::TimeZone;

    fn seeded() -> LessonGraph {
        LessonGraph::seeded().unwrap()
    }

    #[test]
    fn seeded_graph_unlocks_only_the_start() {
        let graph = seeded();
        let ids: Vec<&str> = graph.categories().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["beginner", "intermediate", "advanced"]);

        let beginner = graph.category("beginner").unwrap();
        assert!(beginner.unlocked);
        assert_eq!(beginner.progress, 0);
        assert!(beginner.exercises[0].unlocked);
        assert!(!beginner.exercises[1].unlocked);
        assert!(!graph.category("intermediate").unwrap().unlocked);
        assert_eq!(
            graph.exercise("advanced", "speed-drill").unwrap().time_limit_secs,
            Some(60)
        );
    }

    #[test]
    fn seeded_texts_are_typeable() {
        for category in seeded().categories() {
            for exercise in &category.exercises {
                assert!(
                    exercise.text.chars().all(is_practice_char),
                    "{} has untypeable characters",
                    exercise.id
                );
            }
        }
    }

    #[test]
    fn completing_unlocks_next_exercise() {
        let mut graph = seeded();
        let unlocks = graph.complete_exercise("beginner", "home-row").unwrap();

        assert_eq!(unlocks.progress, 25);
        assert_eq!(unlocks.next_exercise.as_deref(), Some("home-row-words"));
        assert_eq!(unlocks.next_category, None);
        assert!(graph.exercise("beginner", "home-row").unwrap().completed);
        assert!(graph.exercise("beginner", "home-row-words").unwrap().unlocked);
        assert!(!graph.exercise("beginner", "top-row").unwrap().unlocked);
    }

    #[test]
    fn finishing_category_unlocks_only_next_category() {
        let mut graph = seeded();
        for id in ["home-row", "home-row-words", "top-row"] {
            let unlocks = graph.complete_exercise("beginner", id).unwrap();
            assert_eq!(unlocks.next_category, None);
        }
        let unlocks = graph.complete_exercise("beginner", "bottom-row").unwrap();

        assert_eq!(unlocks.progress, 100);
        assert_eq!(unlocks.next_category.as_deref(), Some("intermediate"));
        let intermediate = graph.category("intermediate").unwrap();
        assert!(intermediate.unlocked);
        assert!(intermediate.exercises[0].unlocked);
        assert!(!intermediate.exercises[1].unlocked);

        let advanced = graph.category("advanced").unwrap();
        assert!(!advanced.unlocked);
    }

    #[test]
    fn completing_last_category_is_fine() {
        let mut graph = seeded();
        for id in ["speed-drill", "code-javascript", "prose"] {
            graph.complete_exercise("advanced", id).unwrap();
        }
        assert_eq!(graph.category("advanced").unwrap().progress, 100);
    }

    #[test]
    fn unknown_ids_change_nothing() {
        let mut graph = seeded();
        let before = graph.clone();
        assert_eq!(graph.complete_exercise("expert", "home-row"), None);
        assert_eq!(graph.complete_exercise("beginner", "nope"), None);
        assert_eq!(graph, before);
    }

    #[test]
    fn progress_rounds() {
        let mut graph = seeded();
        graph.complete_exercise("intermediate", "numbers").unwrap();
        assert_eq!(graph.category("intermediate").unwrap().progress, 33);
        graph.complete_exercise("intermediate", "punctuation").unwrap();
        assert_eq!(graph.category("intermediate").unwrap().progress, 67);
    }

    #[test]
    fn first_unlocked_exercise_lookup() {
        let graph = seeded();
        assert_eq!(
            graph.first_unlocked_exercise("beginner").map(|e| e.id.as_str()),
            Some("home-row")
        );
        assert!(graph.first_unlocked_exercise("missing").is_none());
    }

    #[test]
    fn custom_lesson_ids_stay_unique() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let first = CustomLesson::new("Mine", "abc", at, &[]);
        let second = CustomLesson::new("Mine too", "def", at, std::slice::from_ref(&first));
        assert_eq!(first.id, "custom-1700000000000");
        assert_eq!(second.id, "custom-1700000000000-2");
    }

    #[test]
    fn practice_texts_cycle() {
        let first = practice_text(PracticeMode::Quotes, 0).unwrap();
        let wrapped = practice_text(PracticeMode::Quotes, 6).unwrap();
        assert_eq!(first, wrapped);
        assert!(practice_text(PracticeMode::Quotes, 4).unwrap().contains("greatest glory"));
        assert!(practice_text(PracticeMode::Code, 1).unwrap().contains("function Counter()"));
        assert!(practice_text(PracticeMode::Code, 2).unwrap().contains("static createAnonymous()"));
    }

    #[test]
    fn practice_texts_are_typeable() {
        use clap::ValueEnum;

        for mode in PracticeMode::value_variants() {
            for index in 0..6 {
                let text = practice_text(*mode, index).unwrap();
                assert!(!text.is_empty());
                assert!(
                    text.chars().all(is_practice_char),
                    "{mode} text {index} has untypeable characters"
                );
                assert!(
                    text.lines().all(|line| line == line.trim_end()),
                    "{mode} text {index} has trailing whitespace"
                );
            }
        }
    }
}
