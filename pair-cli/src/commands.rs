// pair-cli/src/commands.rs

/// One line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/file <path>`: add a file to the project files.
    File(String),
    /// `/clear_files`: forget every project file.
    ClearFiles,
    Help,
    /// A slash command we don't know.
    Unknown(String),
    /// Anything else is sent to the model.
    Prompt(String),
    Empty,
}

pub const HELP: &str = "Available commands:
/file <path>   - Load a file into the context
/clear_files   - Remove all loaded files from the context
/help          - Display this help message
Ctrl-C interrupts a response without keeping it; Ctrl-D exits.";

pub fn parse(line: &str) -> Command {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Command::Empty;
    }
    if !trimmed.starts_with('/') {
        return Command::Prompt(line.trim_end().to_string());
    }

    let (name, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (trimmed, ""),
    };
    match name {
        "/file" if !arg.is_empty() => Command::File(arg.to_string()),
        "/clear_files" => Command::ClearFiles,
        "/help" => Command::Help,
        _ => Command::Unknown(trimmed.to_string()),
    }
}
