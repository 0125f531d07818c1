use chrono::{Days, NaiveDate};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;

use crate::error::Result;
use crate::session::SessionResult;
use crate::util::{mean, running_mean};

const SPEED_DEMON_WPM: u32 = 80;
const DEDICATION_STREAK_DAYS: u32 = 7;

/// Best-of-day numbers plus accumulated practice time for one calendar day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStat {
    pub wpm: u32,
    pub accuracy: u32,
    /// minutes
    pub time_spent: f64,
    #[serde(default)]
    pub sessions: u32,
}

/// One row of [`StatisticsState::recent`]: a day, zero-filled when nothing was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayEntry {
    pub date: NaiveDate,
    pub wpm: u32,
    pub accuracy: u32,
    pub time_spent: f64,
}

/// Aggregate practice statistics, persisted across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatisticsState {
    pub total_practice_time_minutes: f64,
    pub total_characters_typed: u64,
    pub total_words_typed: u64,
    #[serde(rename = "averageWPM")]
    pub average_wpm: f64,
    pub average_accuracy: f64,
    #[serde(rename = "bestWPM")]
    pub best_wpm: u32,
    pub best_accuracy: u32,
    pub daily_stats: BTreeMap<NaiveDate, DailyStat>,
    pub practice_streak: u32,
    pub longest_streak: u32,
    pub last_practice_date: Option<NaiveDate>,
    pub sessions_recorded: u64,
    pub exercises_completed: u64,
    pub total_mistakes: u64,
    pub mistakes_by_key: BTreeMap<char, u64>,
}

impl StatisticsState {
    /// Folds one finished session into the aggregates.
    ///
    /// Averages are a running mean over recorded sessions, not over days.
    pub fn record(&mut self, result: &SessionResult, today: NaiveDate) {
        let minutes = result.time_spent_minutes();

        self.total_practice_time_minutes += minutes;
        self.total_characters_typed += result.characters_typed as u64;
        self.total_words_typed += result.words_typed as u64;

        self.sessions_recorded += 1;
        let n = self.sessions_recorded;
        self.average_wpm = running_mean(self.average_wpm, n, result.wpm as f64);
        self.average_accuracy = running_mean(self.average_accuracy, n, result.accuracy as f64);

        self.best_wpm = self.best_wpm.max(result.wpm);
        self.best_accuracy = self.best_accuracy.max(result.accuracy);

        for mistake in &result.mistakes {
            *self.mistakes_by_key.entry(mistake.expected).or_insert(0) += 1;
        }
        self.total_mistakes += result.mistakes.len() as u64;

        self.update_streak(today);

        let day = self.daily_stats.entry(today).or_default();
        day.wpm = day.wpm.max(result.wpm);
        day.accuracy = day.accuracy.max(result.accuracy);
        day.time_spent += minutes;
        day.sessions += 1;
    }

    fn update_streak(&mut self, today: NaiveDate) {
        let yesterday = today.pred_opt();
        match self.last_practice_date {
            Some(last) if Some(last) == yesterday => self.practice_streak += 1,
            Some(last) if last == today => {}
            _ => self.practice_streak = 1,
        }
        self.longest_streak = self.longest_streak.max(self.practice_streak);
        self.last_practice_date = Some(today);
    }

    /// Exactly `days` entries, oldest first, ending with `today`. The window
    /// stops short at the earliest representable date.
    pub fn recent(&self, days: usize, today: NaiveDate) -> Vec<DayEntry> {
        let representable = today
            .signed_duration_since(NaiveDate::MIN)
            .num_days()
            .saturating_add(1);
        let days = days.min(usize::try_from(representable).unwrap_or(usize::MAX));
        (0..days)
            .rev()
            .filter_map(|back| today.checked_sub_days(Days::new(back as u64)))
            .map(|date| {
                let day = self.daily_stats.get(&date).copied().unwrap_or_default();
                DayEntry {
                    date,
                    wpm: day.wpm,
                    accuracy: day.accuracy,
                    time_spent: day.time_spent,
                }
            })
            .collect()
    }

    pub fn summary(&self, today: NaiveDate) -> StatsSummary {
        StatsSummary {
            average_wpm: self.average_wpm.round() as u32,
            average_accuracy: self.average_accuracy.round() as u32,
            best_wpm: self.best_wpm,
            best_accuracy: self.best_accuracy,
            practice_hours: (self.total_practice_time_minutes / 60.0).round() as u32,
            practice_streak: self.practice_streak,
            longest_streak: self.longest_streak,
            sessions: self.sessions_recorded,
            exercises_completed: self.exercises_completed,
            speed_change: self.speed_change(today),
        }
    }

    /// Mean best-of-day WPM over the last week minus the week before,
    /// counting only days with practice. `None` when either week is empty.
    fn speed_change(&self, today: NaiveDate) -> Option<f64> {
        let fortnight = self.recent(14, today);
        let (previous, current) = fortnight.split_at(7);
        let practiced = |days: &[DayEntry]| {
            days.iter()
                .filter(|d| d.time_spent > 0.0 || d.wpm > 0)
                .map(|d| d.wpm as f64)
                .collect::<Vec<f64>>()
        };
        Some(mean(&practiced(current))? - mean(&practiced(previous))?)
    }

    pub fn achievements(&self) -> Vec<Achievement> {
        [
            (AchievementKind::SpeedDemon, self.best_wpm >= SPEED_DEMON_WPM),
            (AchievementKind::PerfectAccuracy, self.best_accuracy == 100),
            (
                AchievementKind::Dedication,
                self.practice_streak >= DEDICATION_STREAK_DAYS,
            ),
        ]
        .into_iter()
        .map(|(kind, completed)| Achievement { kind, completed })
        .collect()
    }

    /// Keys mistyped most often, most frequent first; ties by key.
    pub fn most_missed_keys(&self, limit: usize) -> Vec<(char, u64)> {
        self.mistakes_by_key
            .iter()
            .map(|(k, v)| (*k, *v))
            .sorted_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)))
            .take(limit)
            .collect()
    }

    /// One row per recorded day; the header is written even with no rows.
    pub fn write_daily_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        csv.write_record(["date", "wpm", "accuracy", "time_spent_minutes", "sessions"])?;
        for (date, day) in &self.daily_stats {
            csv.serialize(DailyCsvRow {
                date: date.format("%Y-%m-%d").to_string(),
                wpm: day.wpm,
                accuracy: day.accuracy,
                time_spent_minutes: format!("{:.2}", day.time_spent),
                sessions: day.sessions,
            })?;
        }
        csv.flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct DailyCsvRow {
    date: String,
    wpm: u32,
    accuracy: u32,
    time_spent_minutes: String,
    sessions: u32,
}

/// Dashboard headline numbers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub average_wpm: u32,
    pub average_accuracy: u32,
    pub best_wpm: u32,
    pub best_accuracy: u32,
    pub practice_hours: u32,
    pub practice_streak: u32,
    pub longest_streak: u32,
    pub sessions: u64,
    pub exercises_completed: u64,
    pub speed_change: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
pub enum AchievementKind {
    #[strum(to_string = "Speed Demon")]
    SpeedDemon,
    #[strum(to_string = "Perfect Accuracy")]
    PerfectAccuracy,
    #[strum(to_string = "Dedication")]
    Dedication,
}

impl AchievementKind {
    pub fn description(&self) -> &'static str {
        match self {
            AchievementKind::SpeedDemon => "Achieve 80 WPM in a practice session",
            AchievementKind::PerfectAccuracy => "Complete a lesson with 100% accuracy",
            AchievementKind::Dedication => "Practice for 7 days in a row",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Achievement {
    pub kind: AchievementKind,
    pub completed: bool,
}
