mod ui;

use anyhow::{bail, Context};
use clap::{error::ErrorKind, Args, CommandFactory, Parser, Subcommand, ValueEnum};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Frame, Terminal,
};
use std::{
    io::{self, stdin, Write},
    path::PathBuf,
};

use typeflow::{
    app_dirs::AppDirs,
    clock::{Clock, SystemClock},
    lessons::{practice_text, PracticeMode},
    logging,
    practice::{PracticeController, PracticeOptions, PracticeTarget},
    runtime::{ChannelEventSource, HostEvent, Runner, TICK_INTERVAL},
    session::{KeystrokeOutcome, Millis, SessionResult},
    storage::{JsonFileStorage, SqliteStorage, Storage},
    store::ProgressStore,
    typing_policy::TypingPolicy,
};

/// Ten years of daily rows.
const MAX_STATS_DAYS: i64 = 3650;

/// keyboard lessons and free practice in the terminal
#[derive(Parser, Debug)]
#[clap(
    version,
    about,
    long_about = "Work through unlockable typing lessons or free practice texts, with speed, accuracy and streak tracking that persists between runs."
)]
pub struct Cli {
    /// directory for saved progress and logs
    #[clap(long, global = true)]
    data_dir: Option<PathBuf>,

    /// where progress is saved
    #[clap(long, value_enum, global = true, default_value_t = StorageKind::Json)]
    storage: StorageKind,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum StorageKind {
    Json,
    Sqlite,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// start a typing session (the default)
    Practice(PracticeArgs),
    /// list lesson categories and which exercises are unlocked
    Lessons,
    /// show recent daily stats, totals and achievements
    Stats {
        /// number of days to show, ending today
        #[clap(long, default_value_t = 7, value_parser = clap::value_parser!(u16).range(1..=MAX_STATS_DAYS))]
        days: u16,
        /// print every recorded day as csv instead
        #[clap(long)]
        csv: bool,
    },
    /// manage your own practice texts
    Custom {
        #[clap(subcommand)]
        action: CustomAction,
    },
    /// show or change display preferences
    Prefs {
        #[clap(subcommand)]
        action: Option<PrefsAction>,
    },
    /// forget all lesson progress and statistics
    Reset {
        /// confirm the reset
        #[clap(long)]
        yes: bool,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct PracticeArgs {
    /// lesson category, e.g. beginner
    category: Option<String>,

    /// exercise within the category, e.g. home-row
    exercise: Option<String>,

    /// free practice with a built-in text instead of a lesson
    #[clap(long, value_enum, conflicts_with_all = ["category", "text", "custom"])]
    mode: Option<PracticeMode>,

    /// free practice with this text
    #[clap(long, conflicts_with_all = ["category", "custom"])]
    text: Option<String>,

    /// free practice with a saved custom lesson
    #[clap(long, conflicts_with = "category")]
    custom: Option<String>,

    /// seconds before the session ends on its own; 0 disables a lesson's limit
    #[clap(short = 's', long)]
    time_limit: Option<u64>,

    /// keep going after a wrong key instead of waiting for the right one
    #[clap(long)]
    type_past_errors: bool,
}

impl PracticeArgs {
    fn options(&self) -> PracticeOptions {
        PracticeOptions {
            policy: if self.type_past_errors {
                TypingPolicy::TypePastErrors
            } else {
                TypingPolicy::StopOnError
            },
            time_limit_secs: self.time_limit,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum CustomAction {
    /// save a new custom lesson
    Add {
        #[clap(long)]
        title: String,
        #[clap(long)]
        text: String,
    },
    /// list saved custom lessons
    List,
    /// delete a custom lesson by id
    Remove { id: String },
}

#[derive(Subcommand, Debug)]
pub enum PrefsAction {
    /// set one preference, e.g. `set fontSize large`
    Set { key: String, value: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let dirs = match &cli.data_dir {
        Some(dir) => AppDirs::at(dir),
        None => AppDirs::resolve().context("could not determine a data directory")?,
    };
    let _log_guard = logging::init(&dirs.log_dir()).context("initializing logging")?;

    let mut store = open_store(&dirs, cli.storage)?;
    let command = cli
        .command
        .unwrap_or_else(|| Command::Practice(PracticeArgs::default()));

    if let Command::Practice(args) = command {
        if !stdin().is_tty() {
            let mut cmd = Cli::command();
            cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
        }
        let controller = build_controller(&mut store, &args)?;
        let mut app = App::new(store, controller, Box::new(SystemClock), args.options());
        run_terminal(&mut app)?;
        report_storage_warning(&app.store);
        return Ok(());
    }

    let stdout = io::stdout();
    run_command(&mut store, command, &mut stdout.lock())?;
    report_storage_warning(&store);
    Ok(())
}

fn open_store(dirs: &AppDirs, kind: StorageKind) -> anyhow::Result<ProgressStore> {
    let storage: Box<dyn Storage> = match kind {
        StorageKind::Json => Box::new(JsonFileStorage::with_path(dirs.json_path())),
        StorageKind::Sqlite => Box::new(
            SqliteStorage::open(dirs.db_path())
                .with_context(|| format!("opening {}", dirs.db_path().display()))?,
        ),
    };
    tracing::debug!(root = %dirs.root().display(), storage = %kind, "opening progress store");
    Ok(ProgressStore::open(storage, Box::new(SystemClock))?)
}

fn report_storage_warning(store: &ProgressStore) {
    if let Some(warning) = store.storage_warning() {
        eprintln!("warning: {warning}");
    }
}

/// Runs every non-interactive subcommand against `store`, printing to `out`.
pub fn run_command<W: Write>(
    store: &mut ProgressStore,
    command: Command,
    out: &mut W,
) -> anyhow::Result<()> {
    match command {
        Command::Practice(_) => bail!("practice needs an interactive terminal"),
        Command::Lessons => print_lessons(store, out)?,
        Command::Stats { csv: true, .. } => store.export_daily_csv(out)?,
        Command::Stats { days, .. } => print_stats(store, days.into(), out)?,
        Command::Custom { action } => match action {
            CustomAction::Add { title, text } => {
                let lesson = store.create_custom_lesson(&title, &text);
                writeln!(out, "{}", lesson.id)?;
            }
            CustomAction::List => {
                for lesson in store.custom_lessons() {
                    writeln!(
                        out,
                        "{}\t{}\t{}",
                        lesson.id,
                        lesson.title,
                        lesson.created_at.format("%Y-%m-%d")
                    )?;
                }
            }
            CustomAction::Remove { id } => {
                if !store.remove_custom_lesson(&id) {
                    bail!("no custom lesson with id {id}");
                }
                writeln!(out, "removed {id}")?;
            }
        },
        Command::Prefs { action } => {
            if let Some(PrefsAction::Set { key, value }) = action {
                store.set_preference(&key, &value)?;
            }
            for (key, value) in store.preferences().entries() {
                writeln!(out, "{key} = {value}")?;
            }
        }
        Command::Reset { yes } => {
            if !yes {
                bail!("this erases all progress; pass --yes to confirm");
            }
            store.reset_progress();
            writeln!(out, "progress reset")?;
        }
    }
    Ok(())
}

fn print_lessons<W: Write>(store: &ProgressStore, out: &mut W) -> io::Result<()> {
    for category in store.lessons().categories() {
        let lock = if category.unlocked { "" } else { " (locked)" };
        writeln!(
            out,
            "{:<14}{:<16}{:>4}%{}",
            category.id, category.title, category.progress, lock
        )?;
        for exercise in &category.exercises {
            let mark = match (exercise.completed, exercise.unlocked) {
                (true, _) => "[x]",
                (false, true) => "[ ]",
                (false, false) => "[-]",
            };
            let limit = exercise
                .time_limit_secs
                .map(|s| format!("  {s}s"))
                .unwrap_or_default();
            writeln!(out, "  {mark} {:<18}{}{limit}", exercise.id, exercise.title)?;
        }
    }
    Ok(())
}

fn print_stats<W: Write>(store: &ProgressStore, days: usize, out: &mut W) -> io::Result<()> {
    let summary = store.summary();
    writeln!(
        out,
        "average {} wpm / {}% acc   best {} wpm / {}% acc",
        summary.average_wpm, summary.average_accuracy, summary.best_wpm, summary.best_accuracy
    )?;
    writeln!(
        out,
        "streak {} days (longest {})   {} sessions   {} exercises   {}h practiced",
        summary.practice_streak,
        summary.longest_streak,
        summary.sessions,
        summary.exercises_completed,
        summary.practice_hours
    )?;
    if let Some(change) = summary.speed_change {
        writeln!(out, "speed vs previous week: {change:+.1} wpm")?;
    }

    writeln!(out)?;
    writeln!(out, "{:<12}{:>5}{:>6}{:>9}", "date", "wpm", "acc", "minutes")?;
    for day in store.recent_stats(days) {
        writeln!(
            out,
            "{:<12}{:>5}{:>5}%{:>9.1}",
            day.date, day.wpm, day.accuracy, day.time_spent
        )?;
    }

    writeln!(out)?;
    for achievement in store.achievements() {
        let mark = if achievement.completed { "[x]" } else { "[ ]" };
        writeln!(
            out,
            "{mark} {}: {}",
            achievement.kind,
            achievement.kind.description()
        )?;
    }

    let missed = store.statistics().most_missed_keys(5);
    if !missed.is_empty() {
        let keys = missed
            .iter()
            .map(|(key, count)| format!("{key:?} x{count}"))
            .collect::<Vec<_>>()
            .join("  ");
        writeln!(out, "most missed: {keys}")?;
    }
    Ok(())
}

/// Picks what `practice` runs: explicit text, a custom lesson, a built-in
/// mode, or a lesson exercise (the furthest unlocked one by default).
fn build_controller(
    store: &mut ProgressStore,
    args: &PracticeArgs,
) -> anyhow::Result<PracticeController> {
    let options = args.options();

    if let Some(text) = &args.text {
        return Ok(PracticeController::free("custom text", text, options));
    }
    if let Some(id) = &args.custom {
        let lesson = store
            .custom_lesson(id)
            .with_context(|| format!("no custom lesson with id {id}"))?;
        return Ok(PracticeController::free(&lesson.title, &lesson.text, options));
    }
    if let Some(mode) = args.mode {
        let index = store.statistics().sessions_recorded as usize;
        let text = practice_text(mode, index)?;
        return Ok(PracticeController::free(&mode.to_string(), &text, options));
    }

    let (category_id, exercise_id) =
        resolve_lesson(store, args.category.as_deref(), args.exercise.as_deref())?;
    PracticeController::for_exercise(store, &category_id, &exercise_id, options)
        .with_context(|| format!("exercise {category_id}/{exercise_id} is locked"))
}

fn resolve_lesson(
    store: &ProgressStore,
    category: Option<&str>,
    exercise: Option<&str>,
) -> anyhow::Result<(String, String)> {
    let lessons = store.lessons();
    let category = match category {
        Some(id) => lessons
            .category(id)
            .with_context(|| format!("unknown lesson category {id}"))?,
        None => lessons
            .categories()
            .iter()
            .rev()
            .find(|c| c.unlocked)
            .context("no unlocked lesson category")?,
    };

    let exercise = match exercise {
        Some(id) => category
            .exercises
            .iter()
            .find(|e| e.id == id)
            .with_context(|| format!("unknown exercise {id} in {}", category.id))?,
        None => category
            .exercises
            .iter()
            .find(|e| e.unlocked && !e.completed)
            .or_else(|| store.first_unlocked_exercise(&category.id))
            .with_context(|| format!("{} has no unlocked exercise", category.id))?,
    };

    Ok((category.id.clone(), exercise.id.clone()))
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppState {
    Practice,
    Results(SessionResult),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct App {
    pub store: ProgressStore,
    pub controller: PracticeController,
    pub state: AppState,
    clock: Box<dyn Clock>,
    options: PracticeOptions,
}

impl App {
    pub fn new(
        store: ProgressStore,
        controller: PracticeController,
        clock: Box<dyn Clock>,
        options: PracticeOptions,
    ) -> Self {
        Self {
            store,
            controller,
            state: AppState::Practice,
            clock,
            options,
        }
    }

    pub fn now(&self) -> Millis {
        self.clock.now_ms()
    }

    pub fn on_key(&mut self, key: KeyEvent) -> Flow {
        let ctrl_c =
            key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c');
        if key.code == KeyCode::Esc || ctrl_c {
            return Flow::Quit;
        }

        match self.state {
            AppState::Practice => match key.code {
                KeyCode::Tab | KeyCode::Left => self.restart(),
                KeyCode::Enter => self.type_char('\n'),
                KeyCode::Char(_)
                    if key
                        .modifiers
                        .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) => {}
                KeyCode::Char(c) => self.type_char(c),
                _ => {}
            },
            AppState::Results(_) => match key.code {
                KeyCode::Char('r') | KeyCode::Left => self.restart(),
                KeyCode::Char('n') | KeyCode::Right => self.advance(),
                _ => {}
            },
        }
        Flow::Continue
    }

    pub fn on_tick(&mut self) {
        if self.state != AppState::Practice {
            return;
        }
        let now = self.now();
        if let Some(result) = self.controller.tick(now, &mut self.store) {
            self.state = AppState::Results(result);
        }
    }

    pub fn has_next_exercise(&self) -> bool {
        self.next_lesson().is_some()
    }

    fn type_char(&mut self, c: char) {
        let now = self.now();
        if let KeystrokeOutcome::Finished(result) = self.controller.key(c, now, &mut self.store) {
            self.state = AppState::Results(result);
        }
    }

    fn restart(&mut self) {
        self.controller.restart();
        self.state = AppState::Practice;
    }

    fn advance(&mut self) {
        let Some((category_id, exercise_id)) = self.next_lesson() else {
            return;
        };
        if let Some(controller) =
            PracticeController::for_exercise(&mut self.store, &category_id, &exercise_id, self.options)
        {
            self.controller = controller;
            self.state = AppState::Practice;
        }
    }

    /// The exercise after the current lesson: the next one in its category,
    /// else the first unlocked one of the following category.
    fn next_lesson(&self) -> Option<(String, String)> {
        let PracticeTarget::Lesson {
            category_id,
            exercise_id,
        } = self.controller.target()
        else {
            return None;
        };
        let lessons = self.store.lessons();
        let category = lessons.category(category_id)?;
        let idx = category.exercise_index(exercise_id)?;

        if let Some(next) = category.exercises.get(idx + 1).filter(|e| e.unlocked) {
            return Some((category.id.clone(), next.id.clone()));
        }

        let categories = lessons.categories();
        let pos = categories.iter().position(|c| c.id == category.id)?;
        let following = categories.get(pos + 1).filter(|c| c.unlocked)?;
        let first = lessons.first_unlocked_exercise(&following.id)?;
        Some((following.id.clone(), first.id.clone()))
    }
}

fn run_terminal(app: &mut App) -> anyhow::Result<()> {
    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let outcome = start_tui(&mut terminal, app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    outcome
}

fn start_tui<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> anyhow::Result<()> {
    let mut runner = Runner::new(ChannelEventSource::crossterm(), TICK_INTERVAL);

    loop {
        terminal.draw(|f| ui(app, f))?;

        match runner.step() {
            HostEvent::Tick => app.on_tick(),
            HostEvent::Resize => {}
            HostEvent::Key(key) => {
                if app.on_key(key) == Flow::Quit {
                    break;
                }
            }
        }
    }

    Ok(())
}

fn ui(app: &App, f: &mut Frame) {
    f.render_widget(app, f.area());
}
