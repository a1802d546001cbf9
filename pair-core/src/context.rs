// pair-core/src/context.rs

//! Builds the ordered message list submitted for a turn.

use crate::models::chat::ChatMessage;
use serde::{Deserialize, Serialize};
use tracing::trace;

pub const DEFAULT_BASE_PROMPT: &str = "You are a programming assistant. \
Below are portions of code the user is working on as well as questions from the user. \
Provide helpful answers to the user. If you need more information on code that is not included, \
ask for the contents of the code file or show the user how to cat the file in question. \
When generating example code that takes an input file, arrange the main code to take the filename as a command line argument. \
When outputing code blocks, please include a filename before the code block in markdown bold like **filename.py** .  \
When making edits to existing files, please output the entire file unless the file is very large. \
If the file is too large to output in its entirety, please be sure to include 3 lines before and after each edit. ";

const LISTING_INTRO: &str = "Here is a listing all files in our project directory: \n";

const FILES_INTRO: &str = "Here are file contents that might be helpful for completing the task. \
Please ask if you need to see the contents of any of the other files. ";

const SELECTION_PROMPT: &str = "You are a programming assistant deciding which project files \
must be read to complete the user's latest request. Choose only existing files from the listing \
that follows, using the paths exactly as they are listed. Choose an empty list if no file is needed.";

pub const DEFAULT_HISTORY_WINDOW: usize = 10;
pub const DEFAULT_SELECTION_WINDOW: usize = 3;

/// A project file and its text, rendered as one system message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContent {
    pub filename: String,
    pub content: String,
}

impl FileContent {
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }

    pub fn message(&self) -> ChatMessage {
        ChatMessage::system(format!("filename: {}\n{}", self.filename, self.content))
    }
}

/// The named sections a turn is assembled from.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnContext<'a> {
    /// Project file listing; `None` when project context is disabled or unavailable.
    pub project_files: Option<&'a str>,
    pub file_contents: &'a [FileContent],
    pub history: &'a [ChatMessage],
}

/// Returns the most recent `window` entries of `history`, oldest first.
pub fn window(history: &[ChatMessage], window: usize) -> &[ChatMessage] {
    &history[history.len().saturating_sub(window)..]
}

#[derive(Debug, Clone)]
pub struct ContextAssembler {
    base_prompt: String,
    history_window: Option<usize>,
    selection_window: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self {
            base_prompt: DEFAULT_BASE_PROMPT.to_string(),
            history_window: Some(DEFAULT_HISTORY_WINDOW),
            selection_window: DEFAULT_SELECTION_WINDOW,
        }
    }
}

impl ContextAssembler {
    pub fn new(base_prompt: impl Into<String>) -> Self {
        Self {
            base_prompt: base_prompt.into(),
            ..Self::default()
        }
    }

    /// Bounds the history to the last `window` entries; `None` keeps everything.
    pub fn with_history_window(mut self, window: Option<usize>) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_selection_window(mut self, window: usize) -> Self {
        self.selection_window = window;
        self
    }

    pub fn base_prompt(&self) -> &str {
        &self.base_prompt
    }

    /// Instructions, optional listing, files intro, one message per file, then windowed history.
    pub fn assemble(&self, turn: &TurnContext<'_>) -> Vec<ChatMessage> {
        let history = match self.history_window {
            Some(n) => window(turn.history, n),
            None => turn.history,
        };

        let mut messages =
            Vec::with_capacity(3 + turn.file_contents.len() + history.len());
        messages.push(ChatMessage::system(self.base_prompt.clone()));
        if let Some(listing) = turn.project_files {
            messages.push(ChatMessage::system(format!("{}{}", LISTING_INTRO, listing)));
        }
        messages.push(ChatMessage::system(FILES_INTRO));
        messages.extend(turn.file_contents.iter().map(FileContent::message));
        messages.extend_from_slice(history);

        trace!(
            num_files = turn.file_contents.len(),
            num_history = history.len(),
            num_messages = messages.len(),
            "Assembled turn context."
        );
        messages
    }

    /// The cheap prompt asking which project files a task needs.
    pub fn file_selection(&self, listing: &str, history: &[ChatMessage]) -> Vec<ChatMessage> {
        let history = window(history, self.selection_window);
        let mut messages = Vec::with_capacity(2 + history.len());
        messages.push(ChatMessage::system(SELECTION_PROMPT));
        messages.push(ChatMessage::system(format!("{}{}", LISTING_INTRO, listing)));
        messages.extend_from_slice(history);
        messages
    }
}
