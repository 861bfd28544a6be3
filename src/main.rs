use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use itertools::Itertools;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    path::PathBuf,
    process,
};

use tryout::{
    app::{App, Control},
    app_dirs::AppDirs,
    catalog::{DirCatalog, ExamCatalog, LayeredCatalog},
    clock::SystemClock,
    config::{Config, ConfigStore, FileConfigStore},
    exam::{CatalogSource, Question},
    history::{self, AttemptLog},
    logging,
    profile::{self, FileProfileStore, LoginRequest, Profile, ProfileStore, Role},
    runtime::{CrosstermEventSource, ExamEvent, FixedTicker, Runner},
    ui::format::{format_minutes, format_time, pluralize},
};

/// timed multiple-choice tryout exams in the terminal
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Timed multiple-choice tryout exams in the terminal: pick an exam, answer against the clock, get scored, review your answers and track your attempts."
)]
pub struct Cli {
    /// directory holding local exam files (overrides the config file)
    #[clap(long, global = true)]
    exam_dir: Option<PathBuf>,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Command {
    /// start an exam right away
    Take { id: String },

    /// list available exams
    List {
        /// print machine-readable JSON
        #[clap(long)]
        json: bool,
    },

    /// show recorded attempts
    History {
        /// only attempts at this exam
        #[clap(long)]
        exam: Option<String>,

        /// maximum number of attempts to show
        #[clap(short = 'n', long)]
        limit: Option<usize>,

        /// print CSV instead of a table
        #[clap(long)]
        csv: bool,
    },

    /// sign in locally so attempts are attributed to you
    Login {
        #[clap(long)]
        email: String,

        #[clap(long)]
        name: Option<String>,

        #[clap(long, value_enum, default_value_t = Role::Student)]
        role: Role,

        /// staff access code, required for questioner and admin
        #[clap(long)]
        access_code: Option<String>,
    },

    /// forget the local profile
    Logout,

    /// show the local profile
    Whoami,

    /// manage whole exams
    #[clap(subcommand)]
    Exam(ExamCommand),

    /// add or remove questions
    #[clap(subcommand)]
    Question(QuestionCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum ExamCommand {
    /// copy an exam JSON file into the local exam directory
    Import { file: PathBuf },

    /// delete a local exam
    Remove { id: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum QuestionCommand {
    /// append a question to an exam
    Add {
        #[clap(long)]
        exam: String,

        #[clap(long)]
        prompt: String,

        /// answer option; repeat for each option in order
        #[clap(long = "option", required = true)]
        options: Vec<String>,

        /// number of the correct option, starting at 1
        #[clap(long)]
        correct: usize,

        /// question id (defaults to the next free `q<n>`)
        #[clap(long)]
        id: Option<String>,

        #[clap(long)]
        topic: Option<String>,
    },

    /// remove a question from an exam
    Remove {
        #[clap(long)]
        exam: String,

        #[clap(long)]
        question: String,
    },
}

impl Command {
    fn is_interactive(command: Option<&Command>) -> bool {
        matches!(command, None | Some(Command::Take { .. }))
    }
}

fn main() {
    let cli = Cli::parse();

    if Command::is_interactive(cli.command.as_ref()) && !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    if let Err(e) = run(cli) {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = FileConfigStore::new().load().with_overrides(cli.exam_dir.clone());
    if let Err(e) = logging::init(&config.log_level, &AppDirs::log_path()) {
        eprintln!("warning: logging disabled: {e}");
    }
    tracing::debug!(command = ?cli.command, "starting");

    let catalog = LayeredCatalog::new(DirCatalog::new(config.exam_dir()));
    let profiles = FileProfileStore::new();

    match cli.command {
        None => run_tui(config, catalog, &profiles, None),
        Some(Command::Take { id }) => run_tui(config, catalog, &profiles, Some(id)),
        Some(Command::List { json }) => list_exams(&catalog, json),
        Some(Command::History { exam, limit, csv }) => show_history(
            &AttemptLog::open(AppDirs::db_path())?,
            exam.as_deref(),
            limit.unwrap_or(config.history_limit),
            csv,
        ),
        Some(Command::Login {
            email,
            name,
            role,
            access_code,
        }) => {
            let request = LoginRequest {
                email,
                name,
                role,
                access_code,
            };
            let profile = profile::login(&profiles, request, config.staff_access_code.as_deref())?;
            println!("Logged in as {} <{}> ({})", profile.name, profile.email, profile.role);
            Ok(())
        }
        Some(Command::Logout) => {
            match profile::logout(&profiles)? {
                Some(p) => println!("Logged out {}", p.email),
                None => println!("Not logged in"),
            }
            Ok(())
        }
        Some(Command::Whoami) => {
            match profiles.load()? {
                Some(p) => println!(
                    "{} <{}> ({}), logged in {}",
                    p.name,
                    p.email,
                    p.role,
                    p.logged_in_at.format("%Y-%m-%d %H:%M")
                ),
                None => println!("Not logged in"),
            }
            Ok(())
        }
        Some(Command::Exam(cmd)) => manage_exams(&catalog, profiles.load()?.as_ref(), cmd),
        Some(Command::Question(cmd)) => manage_questions(&catalog, profiles.load()?.as_ref(), cmd),
    }
}

fn run_tui(
    config: Config,
    catalog: LayeredCatalog,
    profiles: &FileProfileStore,
    start: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let profile = profiles.load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "ignoring unreadable profile");
        None
    });

    let mut app = App::new(Box::new(catalog), SystemClock, config).with_profile(profile);
    match AttemptLog::open(AppDirs::db_path()) {
        Ok(log) => app = app.with_attempt_log(log),
        Err(e) => {
            tracing::error!(error = %e, "history database unavailable");
            app.status = Some(format!("History disabled: {e}"));
        }
    }

    if let Some(id) = start {
        if !app.start_exam(&id) {
            return Err(app.status.take().unwrap_or_else(|| format!("cannot start '{id}'")).into());
        }
    }

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let outcome = start_tui(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    outcome
}

fn start_tui<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::from_millis(app.config.tick_rate_ms),
    );

    loop {
        terminal.draw(|f| f.render_widget(&*app, f.area()))?;

        let event = runner.step();
        // time first, so a key pressed after expiry lands on the results screen
        app.on_tick();
        if let ExamEvent::Key(key) = event {
            if app.on_key(key) == Control::Quit {
                break;
            }
        }
    }

    Ok(())
}

fn list_exams<C: ExamCatalog>(catalog: &C, json: bool) -> Result<(), Box<dyn Error>> {
    let exams = catalog.list()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&exams)?);
        return Ok(());
    }

    let id_width = exams.iter().map(|e| e.id.len()).max().unwrap_or(2).max(2);
    let by_category = exams
        .iter()
        .sorted_by(|a, b| a.category.cmp(&b.category))
        .chunk_by(|e| e.category.clone());
    for (category, group) in &by_category {
        println!("{}", if category.is_empty() { "Other" } else { category.as_str() });
        for exam in group {
            println!(
                "  {:<id_width$}  {}  ({}, {}, {}, pass {}%{})",
                exam.id,
                exam.title,
                pluralize(exam.question_count, "question"),
                format_minutes(exam.duration_seconds),
                exam.difficulty,
                exam.passing_score,
                if exam.source == CatalogSource::Local {
                    ", local"
                } else {
                    ""
                },
            );
        }
    }
    Ok(())
}

fn show_history(
    log: &AttemptLog,
    exam: Option<&str>,
    limit: usize,
    csv: bool,
) -> Result<(), Box<dyn Error>> {
    let rows = match exam {
        Some(id) => log.for_exam(id, limit)?,
        None => log.recent(limit)?,
    };

    if csv {
        history::write_csv(&rows, io::stdout().lock())?;
        return Ok(());
    }

    if rows.is_empty() {
        println!("No attempts recorded yet.");
        return Ok(());
    }

    for r in &rows {
        println!(
            "{}  {:<32}  {:>3}%  {}/{}  {:<6}  {:>6}  {}",
            r.finished_at.format("%Y-%m-%d %H:%M"),
            r.exam_title,
            r.score_percent,
            r.correct_count,
            r.total_questions,
            if r.passed { "passed" } else { "failed" },
            format_time(r.time_used_secs),
            r.submitted_by,
        );
    }

    if exam.is_none() {
        println!();
        for s in log.summary_by_exam()? {
            println!(
                "{}: {} attempts, best {}%, average {:.1}%, passed {}",
                s.exam_title, s.attempts, s.best_score, s.average_score, s.passes
            );
        }
    }
    Ok(())
}

fn manage_exams(
    catalog: &LayeredCatalog,
    profile: Option<&Profile>,
    cmd: ExamCommand,
) -> Result<(), Box<dyn Error>> {
    match cmd {
        ExamCommand::Import { file } => {
            profile::require(profile, Role::can_author, "import exams")?;
            let exam = catalog.import_file(&file)?;
            println!(
                "Imported '{}' ({}) into {}",
                exam.id,
                pluralize(exam.question_count(), "question"),
                catalog.local().dir().display()
            );
        }
        ExamCommand::Remove { id } => {
            profile::require(profile, Role::can_manage_catalog, "remove exams")?;
            catalog.remove_exam(&id)?;
            println!("Removed '{id}'");
        }
    }
    Ok(())
}

fn manage_questions(
    catalog: &LayeredCatalog,
    profile: Option<&Profile>,
    cmd: QuestionCommand,
) -> Result<(), Box<dyn Error>> {
    profile::require(profile, Role::can_author, "edit questions")?;

    match cmd {
        QuestionCommand::Add {
            exam,
            prompt,
            options,
            correct,
            id,
            topic,
        } => {
            let Some(correct_option_index) = correct.checked_sub(1) else {
                let mut cmd = Cli::command();
                cmd.error(ErrorKind::ValueValidation, "--correct counts from 1").exit();
            };
            let id = match id {
                Some(id) => id,
                None => catalog.load_exam(&exam)?.next_question_id(),
            };
            let updated = catalog.add_question(
                &exam,
                Question {
                    id: id.clone(),
                    prompt,
                    options,
                    correct_option_index,
                    topic,
                },
            )?;
            println!(
                "Added question '{id}' to '{}' ({})",
                updated.id,
                pluralize(updated.question_count(), "question")
            );
        }
        QuestionCommand::Remove { exam, question } => {
            let updated = catalog.remove_question(&exam, &question)?;
            println!(
                "Removed question '{question}' from '{}' ({} left)",
                updated.id,
                pluralize(updated.question_count(), "question")
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tryout").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_opens_tui() {
        let cli = parse(&[]);
        assert_eq!(cli.command, None);
        assert!(Command::is_interactive(cli.command.as_ref()));
    }

    #[test]
    fn test_take_and_list() {
        let cli = parse(&["take", "science"]);
        assert_eq!(cli.command, Some(Command::Take { id: "science".into() }));
        assert!(Command::is_interactive(cli.command.as_ref()));

        let cli = parse(&["list", "--json"]);
        assert_eq!(cli.command, Some(Command::List { json: true }));
        assert!(!Command::is_interactive(cli.command.as_ref()));
    }

    #[test]
    fn test_history_flags() {
        let cli = parse(&["history", "--exam", "english", "-n", "5", "--csv"]);
        assert_eq!(
            cli.command,
            Some(Command::History {
                exam: Some("english".into()),
                limit: Some(5),
                csv: true,
            })
        );
    }

    #[test]
    fn test_login_defaults_to_student() {
        let cli = parse(&["login", "--email", "a@b.c"]);
        assert_eq!(
            cli.command,
            Some(Command::Login {
                email: "a@b.c".into(),
                name: None,
                role: Role::Student,
                access_code: None,
            })
        );

        let cli = parse(&["login", "--email", "a@b.c", "--role", "questioner", "--access-code", "x"]);
        assert!(matches!(
            cli.command,
            Some(Command::Login { role: Role::Questioner, .. })
        ));
    }

    #[test]
    fn test_question_add_collects_options() {
        let cli = parse(&[
            "question", "add", "--exam", "mathematics", "--prompt", "2 + 2?", "--option", "3",
            "--option", "4", "--correct", "2",
        ]);
        match cli.command {
            Some(Command::Question(QuestionCommand::Add {
                options, correct, id, ..
            })) => {
                assert_eq!(options, vec!["3", "4"]);
                assert_eq!(correct, 2);
                assert_eq!(id, None);
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_question_add_requires_options() {
        let err = Cli::try_parse_from([
            "tryout", "question", "add", "--exam", "m", "--prompt", "p", "--correct", "1",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_global_exam_dir() {
        let cli = parse(&["list", "--exam-dir", "/tmp/exams"]);
        assert_eq!(cli.exam_dir, Some(PathBuf::from("/tmp/exams")));
    }

    #[test]
    fn test_exam_subcommands() {
        assert_eq!(
            parse(&["exam", "remove", "old"]).command,
            Some(Command::Exam(ExamCommand::Remove { id: "old".into() }))
        );
        assert_eq!(
            parse(&["exam", "import", "new.json"]).command,
            Some(Command::Exam(ExamCommand::Import {
                file: PathBuf::from("new.json")
            }))
        );
    }
}
