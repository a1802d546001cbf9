// pair-cli/src/main.rs
mod commands;
mod models {
    pub mod cli;
}

use anyhow::{anyhow, Context, Result};
use colored::*;
use futures::StreamExt;
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rustyline::error::ReadlineError;
use rustyline::{Config, DefaultEditor};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{
    fmt::{self, time::LocalTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use pair_core::config::{CONFIG_FILENAME, MODEL_ENV_VAR};
use pair_core::images::is_image_path;
use pair_core::project::validate_file_selection;
use pair_core::{
    ContextAssembler, FileSelection, OpenAiProvider, PairConfig, Session, StreamConsumer,
    StructuredExtractor, TokenAccountant, Turn,
};

use crate::commands::{Command, HELP};

const APP_DIR: &str = "pair";
const LOG_FILE_NAME: &str = "pair.log";
const HISTORY_FILE_NAME: &str = "cli_history.txt";
const RULE: &str = "~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~";

/// Everything a turn needs, built once from the configuration.
struct App {
    config: PairConfig,
    assembler: ContextAssembler,
    consumer: StreamConsumer,
    extractor: StructuredExtractor,
}

impl App {
    fn new(config: PairConfig) -> Result<Self> {
        let api_key = env::var(&config.api_key_env_var).unwrap_or_else(|_| {
            warn!(var = %config.api_key_env_var, "API key environment variable is not set.");
            String::new()
        });
        let http_client = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        let provider = Arc::new(OpenAiProvider::new(
            http_client,
            Some(config.endpoint.clone()),
            api_key,
        ));
        let accountant = Arc::new(TokenAccountant::new(config.rate_table())?);

        let assembler = ContextAssembler::default()
            .with_history_window(Some(config.history_window))
            .with_selection_window(config.selection_window);
        let consumer =
            StreamConsumer::new(provider.clone(), accountant).with_max_tokens(config.max_tokens);
        let extractor = StructuredExtractor::new(provider, config.model.clone())
            .with_retry_bound(config.extraction_retries);

        Ok(Self {
            config,
            assembler,
            consumer,
            extractor,
        })
    }
}

/// Walks up from the current directory looking for `Pair.toml`.
fn find_project_root() -> Result<Option<PathBuf>> {
    let current_dir = env::current_dir().context("Failed to get current directory")?;
    let mut current = current_dir.as_path();
    loop {
        if current.join(CONFIG_FILENAME).is_file() {
            return Ok(Some(current.to_path_buf()));
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return Ok(None),
        }
    }
}

/// Loads `Pair.toml` (or defaults) and applies the model overrides.
fn load_cli_config(model_flag: Option<String>) -> Result<(PairConfig, PathBuf)> {
    let (mut config, project_root) = match find_project_root()? {
        Some(root) => {
            let config_path = root.join(CONFIG_FILENAME);
            info!("Found configuration file at: {:?}", config_path);
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
            let config = PairConfig::from_toml_str(&content)
                .context("Failed to parse or validate configuration content")?;
            (config, root)
        }
        None => {
            info!("No {} found, using defaults.", CONFIG_FILENAME);
            let root = env::current_dir().context("Failed to get current directory")?;
            (PairConfig::default(), root)
        }
    };

    let model_override = model_flag.or_else(|| env::var(MODEL_ENV_VAR).ok());
    if let Some(model) = model_override {
        config = config
            .with_model(model)
            .context("Invalid model override")?;
    }
    Ok((config, project_root))
}

fn print_welcome_message(config: &PairConfig, session: &Session) {
    println!("\n{}", "Pair - AI Programming REPL".magenta().bold());
    println!("{}: {}", "Model".magenta(), config.model);
    if !session.project_mode() {
        println!(
            "{}",
            "Project mode disabled: the file listing will not be sent to the model.".dimmed()
        );
    }
    println!(
        "{}",
        "Enter your code or questions, /file <path>, or /help to see all commands.".dimmed()
    );
    println!();
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.magenta} {msg}")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "-"]),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

/// Adds a starting path: images become image messages, other files project files.
fn add_path(session: &mut Session, path: &Path) -> Result<()> {
    if is_image_path(path) {
        session.add_user_image_msg(path)?;
        println!("{} {}", "added image".magenta(), path.display());
        return Ok(());
    }
    let cwd = env::current_dir().context("Failed to get current directory")?;
    let absolute = cwd.join(path);
    if absolute.is_dir() {
        return Err(anyhow!("Path is a directory, not a file: {}", path.display()));
    }
    if !absolute.is_file() {
        return Err(anyhow!("File not found: {}", path.display()));
    }
    let filename = project_filename(session.root(), &absolute);
    if session.add_file(filename.clone()) {
        println!("{} {}", "added".magenta(), filename);
    }
    Ok(())
}

/// Names a file the way the project listing does (`./rel/path`) when it lies under `root`.
fn project_filename(root: &Path, absolute: &Path) -> String {
    match absolute.strip_prefix(root) {
        Ok(relative) => {
            let parts: Vec<_> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect();
            format!("./{}", parts.join("/"))
        }
        Err(_) => absolute.display().to_string(),
    }
}

/// Lets the model pick the project files it needs for this turn.
///
/// Failure is reported and the turn continues with the files already loaded.
async fn select_files(app: &App, turn: &mut Turn<'_>, listing: &str) -> Result<()> {
    let messages = app
        .assembler
        .file_selection(listing, turn.session().messages());
    let root = turn.session().root().to_path_buf();
    let validator = move |selection: &FileSelection, _raw: &str| {
        validate_file_selection(&root, &selection.filenames)
    };

    let pb = spinner("Choosing project files...")?;
    let result = app
        .extractor
        .extract::<FileSelection>(messages, &FileSelection::schema(), Some(&validator))
        .await;
    pb.finish_and_clear();

    match result {
        Ok(selection) => {
            for filename in selection.filenames {
                if turn.add_file(filename.clone()) {
                    println!("{} {}", "added".magenta(), filename);
                }
            }
        }
        Err(e) => {
            warn!(error = %e, attempts = ?e.attempts(), "File selection failed.");
            eprintln!("{} {}", "File selection failed:".yellow(), e);
        }
    }
    Ok(())
}

fn print_interrupted() {
    info!("Turn interrupted by user.");
    println!(
        "\n\n{}",
        "Interrupted; your last message and the response were not added to the conversation."
            .magenta()
    );
}

/// Streams one answer. The user's message is kept only if the answer completes.
///
/// Ctrl-C is honoured from the moment the turn begins, file selection included.
async fn run_turn(app: &App, session: &mut Session, text: String) -> Result<()> {
    run_turn_until(app, session, text, tokio::signal::ctrl_c()).await
}

/// [`run_turn`] with the interrupt signal supplied by the caller.
async fn run_turn_until<F, T>(
    app: &App,
    session: &mut Session,
    text: String,
    interrupt: F,
) -> Result<()>
where
    F: std::future::Future<Output = T>,
{
    tokio::pin!(interrupt);
    let mut turn = session.begin_turn(text);

    let listing = turn.session().project_listing();
    if let Some(listing) = &listing {
        tokio::select! {
            _ = &mut interrupt => {
                print_interrupted();
                return Ok(());
            }
            selected = select_files(app, &mut turn, listing) => selected?,
        }
    }

    let files = turn.session().file_contents()?;
    let messages = app
        .assembler
        .assemble(&turn.session().turn_context(listing.as_deref(), &files));
    debug!(num_messages = messages.len(), "Submitting turn.");

    let mut stream = app
        .consumer
        .completions(messages, &app.config.model, app.config.temperature);

    println!("{}", RULE);
    loop {
        tokio::select! {
            _ = &mut interrupt => {
                print_interrupted();
                return Ok(());
            }
            next = stream.next() => match next {
                Some(Ok(snapshot)) if snapshot.done => {
                    println!(
                        "\n{}",
                        format!(
                            "({} + {} tokens = ${:.4})",
                            snapshot.input_tokens, snapshot.response_tokens, snapshot.price
                        )
                        .yellow()
                    );
                    println!("{}", RULE);
                    turn.commit(snapshot.text);
                    return Ok(());
                }
                Some(Ok(snapshot)) => {
                    print!("{}", snapshot.delta);
                    io::stdout().flush().context("Failed to flush stdout")?;
                }
                Some(Err(e)) => {
                    println!();
                    return Err(e.into());
                }
                None => return Err(anyhow!("Completion stream ended without a final result")),
            }
        }
    }
}

/// Runs the interactive REPL until Ctrl-D.
async fn run_interactive(app: App, mut session: Session) -> Result<()> {
    print_welcome_message(&app.config, &session);

    let rl_config = Config::builder()
        .history_ignore_space(true)
        .completion_type(rustyline::CompletionType::List)
        .edit_mode(rustyline::EditMode::Emacs)
        .auto_add_history(true)
        .build();
    let mut rl = DefaultEditor::with_config(rl_config)?;

    let history_dir = dirs::cache_dir()
        .map(|d| d.join(APP_DIR))
        .ok_or_else(|| anyhow!("Could not determine cache directory for history file"))?;
    fs::create_dir_all(&history_dir).context("Failed to create history directory")?;
    let history_file_path = history_dir.join(HISTORY_FILE_NAME);
    if rl.load_history(&history_file_path).is_err() {
        debug!(path = %history_file_path.display(), "No previous CLI history found or error loading.");
    }

    let prompt = format!("{} ", ">".green().bold());
    loop {
        match rl.readline(&prompt) {
            Ok(line) => match commands::parse(&line) {
                Command::Empty => continue,
                Command::Help => println!("{}", HELP),
                Command::ClearFiles => {
                    session.reset_files();
                    println!("{}", "Cleared files from context".magenta());
                }
                Command::File(path) => {
                    if let Err(e) = add_path(&mut session, Path::new(&path)) {
                        eprintln!("{}", e.to_string().red());
                    }
                }
                Command::Unknown(command) => {
                    eprintln!("{} {}", "Unknown command:".red(), command);
                    println!("{}", HELP);
                }
                Command::Prompt(text) => {
                    if let Err(e) = run_turn(&app, &mut session, text).await {
                        error!("Turn failed: {:#}", e);
                        eprintln!("\n{}: {:#}", "Error".red(), e);
                    }
                }
            },
            Err(ReadlineError::Interrupted) => {
                println!("{}", "^C".yellow());
                continue;
            }
            Err(ReadlineError::Eof) => {
                info!("EOF detected, exiting interactive mode.");
                break;
            }
            Err(err) => {
                error!("Readline error: {:?}", err);
                eprintln!("Error reading input: {}", err.to_string().red());
                break;
            }
        }
    }

    if let Err(e) = rl.save_history(&history_file_path) {
        warn!(path = %history_file_path.display(), error = %e, "Failed to save CLI history.");
    } else {
        debug!(path = %history_file_path.display(), "Saved CLI history.");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    colored::control::set_override(true);

    dotenvy::dotenv().ok();
    let cli = models::cli::Cli::parse();

    // --- Logging Setup ---
    let default_level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(default_level.into()));

    let log_dir = match dirs::cache_dir()
        .or_else(dirs::runtime_dir)
        .or_else(|| Some(env::temp_dir()))
        .map(|d| d.join(APP_DIR))
    {
        Some(dir) => dir,
        None => {
            eprintln!("{}", "Error: Could not determine a suitable directory for log files.".red());
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("{} Failed to create log directory {}: {}", "Error:".red(), log_dir.display(), e);
        return ExitCode::FAILURE;
    }
    let log_path = log_dir.join(LOG_FILE_NAME);

    let file_appender = tracing_appender::rolling::never(&log_dir, LOG_FILE_NAME);
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(file_appender);

    let local_timer = LocalTime::new(time::macros::format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
    ));
    let file_layer = fmt::layer()
        .with_writer(non_blocking_writer)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .with_timer(local_timer.clone());
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_timer(local_timer)
        .with_target(false)
        .with_level(true);

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
    {
        eprintln!("{} Failed to initialize logging: {}", "Error:".red(), e);
        return ExitCode::FAILURE;
    }
    colored::control::unset_override();

    info!(
        "Logging initialized. Level determined by RUST_LOG or -v flags (default: {}). Logging to stderr and {}",
        default_level,
        log_path.display()
    );
    // --- End Logging Setup ---

    let (config, project_root) = match load_cli_config(cli.model.clone()) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            eprintln!("{} {:#}", "Error:".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let mut session = Session::new(project_root);
    if cli.no_project || !config.project_mode {
        session.disable_project_mode();
    }
    for path in &cli.paths {
        if let Err(e) = add_path(&mut session, path) {
            eprintln!("{} {:#}", "Error:".red(), e);
            return ExitCode::FAILURE;
        }
    }

    let result = match App::new(config) {
        Ok(app) => run_interactive(app, session).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Pair exited with an error: {:#}", e);
            eprintln!("{} {:#}", "Error:".red(), e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_interrupt_during_file_selection_rolls_back() {
        let server = MockServer::start_async().await;
        // the selection request never answers before the interrupt
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200)
                    .delay(Duration::from_secs(30))
                    .header("content-type", "application/json")
                    .body(r#"{"choices":[]}"#);
            })
            .await;

        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();
        let config = PairConfig {
            endpoint: server.url("/v1/chat/completions"),
            ..PairConfig::default()
        };
        let app = App::new(config).unwrap();

        let mut session = Session::new(dir.path());
        session.add_user_msg("earlier");
        session.add_assistant_msg("earlier reply");
        let before = session.messages().to_vec();

        let interrupt = tokio::time::sleep(Duration::from_millis(100));
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            run_turn_until(&app, &mut session, "which file?".to_string(), interrupt),
        )
        .await
        .expect("interrupt should end the turn while files are being chosen");

        assert!(result.is_ok());
        assert_eq!(session.messages(), before.as_slice());
        assert!(session.project_files().is_empty());
    }

    #[test]
    fn test_project_filename() {
        let root = Path::new("/work/project");
        assert_eq!(
            project_filename(root, Path::new("/work/project/src/main.rs")),
            "./src/main.rs"
        );
        assert_eq!(project_filename(root, Path::new("/etc/hosts")), "/etc/hosts");
    }

    #[test]
    fn test_add_path_rejects_missing_and_directories() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(dir.path());
        assert!(add_path(&mut session, &dir.path().join("missing.rs")).is_err());
        assert!(add_path(&mut session, dir.path()).is_err());

        let file = dir.path().join("lib.rs");
        fs::write(&file, "pub fn f() {}").unwrap();
        add_path(&mut session, &file).unwrap();
        add_path(&mut session, &file).unwrap();
        assert_eq!(session.project_files(), &["./lib.rs"]);
    }
}
