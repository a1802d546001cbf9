// pair-core/src/session.rs

//! Conversation state owned by one interactive session.

use crate::context::{FileContent, TurnContext};
use crate::errors::{PairError, Result};
use crate::images::image_to_data_url;
use crate::models::chat::{ChatMessage, ContentPart, ImageDetail, Role};
use crate::project::list_project_files;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Project files, message history and project mode for one conversation.
///
/// History is append-only apart from [`Session::remove_last_message`] and the rollback
/// performed by an uncommitted [`Turn`].
#[derive(Debug, Clone)]
pub struct Session {
    root: PathBuf,
    project_files: Vec<String>,
    messages: Vec<ChatMessage>,
    project_mode: bool,
}

impl Session {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            project_files: Vec::new(),
            messages: Vec::new(),
            project_mode: true,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_files(&self) -> &[String] {
        &self.project_files
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn project_mode(&self) -> bool {
        self.project_mode
    }

    /// Adds a project file; returns `false` if it was already present.
    pub fn add_file(&mut self, filename: impl Into<String>) -> bool {
        let filename = filename.into();
        if self.project_files.contains(&filename) {
            return false;
        }
        debug!(file = %filename, "Adding project file.");
        self.project_files.push(filename);
        true
    }

    pub fn reset_files(&mut self) {
        self.project_files.clear();
    }

    pub fn add_user_msg(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage::user(text));
    }

    /// Adds a user message carrying one high-detail image read from `path`.
    pub fn add_user_image_msg(&mut self, path: &Path) -> Result<()> {
        let url = image_to_data_url(path)?;
        let part = ContentPart::image(url, ImageDetail::High).map_err(PairError::InvalidImageData)?;
        self.messages.push(ChatMessage::with_parts(Role::User, vec![part]));
        info!(path = %path.display(), "Added image message.");
        Ok(())
    }

    pub fn add_assistant_msg(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(text));
    }

    pub fn remove_last_message(&mut self) -> Option<ChatMessage> {
        self.messages.pop()
    }

    pub fn disable_project_mode(&mut self) {
        self.project_mode = false;
    }

    /// The project listing, or `None` when project mode is off or the walk fails.
    pub fn project_listing(&self) -> Option<String> {
        if !self.project_mode {
            return None;
        }
        match list_project_files(&self.root) {
            Ok(listing) => Some(listing),
            Err(e) => {
                warn!("Could not list project files: {:#}", e);
                None
            }
        }
    }

    /// Reads every project file relative to the session root.
    pub fn file_contents(&self) -> Result<Vec<FileContent>> {
        self.project_files
            .iter()
            .map(|filename| {
                let content =
                    fs::read_to_string(self.root.join(filename)).map_err(|source| PairError::Io {
                        path: filename.clone(),
                        source,
                    })?;
                Ok(FileContent::new(filename.clone(), content))
            })
            .collect()
    }

    /// Sections for assembling the next request from this session.
    pub fn turn_context<'a>(
        &'a self,
        project_listing: Option<&'a str>,
        file_contents: &'a [FileContent],
    ) -> TurnContext<'a> {
        TurnContext {
            project_files: project_listing.filter(|_| self.project_mode),
            file_contents,
            history: &self.messages,
        }
    }

    /// Appends the user's message and returns a guard for the turn in flight.
    pub fn begin_turn(&mut self, text: impl Into<String>) -> Turn<'_> {
        let start = self.messages.len();
        self.add_user_msg(text);
        Turn {
            session: self,
            start,
            committed: false,
        }
    }
}

/// A user turn awaiting the assistant's reply.
///
/// Dropping it without [`Turn::commit`] removes the user message again, leaving the
/// history exactly as it was before [`Session::begin_turn`].
#[derive(Debug)]
pub struct Turn<'a> {
    session: &'a mut Session,
    start: usize,
    committed: bool,
}

impl Turn<'_> {
    pub fn session(&self) -> &Session {
        self.session
    }

    /// Adds a project file while the turn is open.
    pub fn add_file(&mut self, filename: impl Into<String>) -> bool {
        self.session.add_file(filename)
    }

    /// Keeps the user message and appends the assistant's reply.
    pub fn commit(mut self, assistant_text: impl Into<String>) {
        self.session.add_assistant_msg(assistant_text);
        self.committed = true;
    }
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        if !self.committed {
            debug!("Turn abandoned, rolling back history.");
            self.session.messages.truncate(self.start);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextAssembler;
    use crate::providers::scripted::{Reply, ScriptedProvider};
    use crate::stream::StreamConsumer;
    use crate::tokens::{RateTable, TokenAccountant};
    use futures::StreamExt;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_add_file_dedupes() {
        let mut session = Session::new(".");
        assert!(session.add_file("./a.rs"));
        assert!(!session.add_file("./a.rs"));
        assert!(session.add_file("./b.rs"));
        assert_eq!(session.project_files(), &["./a.rs", "./b.rs"]);
        session.reset_files();
        assert!(session.project_files().is_empty());
    }

    #[test]
    fn test_file_contents_reads_relative_to_root() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
        let mut session = Session::new(dir.path());
        session.add_file("./a.rs");
        assert_eq!(
            session.file_contents().unwrap(),
            vec![FileContent::new("./a.rs", "fn a() {}")]
        );

        session.add_file("./gone.rs");
        match session.file_contents() {
            Err(PairError::Io { path, .. }) => assert_eq!(path, "./gone.rs"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_project_mode_controls_listing() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.rs"), "").unwrap();
        let mut session = Session::new(dir.path());
        let listing = session.project_listing().unwrap();
        assert_eq!(listing, "./main.rs\n");
        assert_eq!(session.turn_context(Some(listing.as_str()), &[]).project_files, Some("./main.rs\n"));

        session.disable_project_mode();
        assert!(session.project_listing().is_none());
        assert!(session.turn_context(Some("./main.rs\n"), &[]).project_files.is_none());
    }

    #[test]
    fn test_image_message() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shot.png");
        image::RgbImage::new(8, 8).save(&path).unwrap();
        let mut session = Session::new(dir.path());
        session.add_user_image_msg(&path).unwrap();
        let message = &session.messages()[0];
        assert_eq!(message.role(), Role::User);
        match message.content() {
            crate::models::chat::MessageContent::Parts(parts) => {
                assert!(matches!(
                    &parts[..],
                    [ContentPart::ImageUrl { image_url }] if image_url.detail == ImageDetail::High
                ));
            }
            other => panic!("expected parts, got {:?}", other),
        }
        assert!(session.add_user_image_msg(&dir.path().join("notes.txt")).is_err());
        assert_eq!(session.messages().len(), 1);
    }

    #[test]
    fn test_committed_turn_keeps_both_messages() {
        let mut session = Session::new(".");
        let turn = session.begin_turn("hi");
        assert_eq!(turn.session().messages().len(), 1);
        turn.commit("hello!");
        assert_eq!(
            session.messages(),
            &[ChatMessage::user("hi"), ChatMessage::assistant("hello!")]
        );
        assert_eq!(session.remove_last_message(), Some(ChatMessage::assistant("hello!")));
    }

    #[test]
    fn test_dropped_turn_rolls_back() {
        let mut session = Session::new(".");
        session.add_user_msg("first");
        session.add_assistant_msg("reply");
        let before = session.messages().to_vec();
        {
            let mut turn = session.begin_turn("second");
            turn.add_file("./kept.rs");
        }
        assert_eq!(session.messages(), before.as_slice());
        // files chosen during the turn are not history and survive
        assert_eq!(session.project_files(), &["./kept.rs"]);
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_leaves_history_unchanged() {
        let provider = ScriptedProvider::new(vec![Reply::Fragments(vec![
            Ok("partial ".to_string()),
            Ok("answer".to_string()),
        ])]);
        let accountant = Arc::new(TokenAccountant::new(RateTable::default()).unwrap());
        let consumer = StreamConsumer::new(Arc::new(provider), accountant);
        let assembler = ContextAssembler::default();

        let mut session = Session::new(".");
        session.disable_project_mode();
        session.add_user_msg("earlier");
        session.add_assistant_msg("earlier reply");
        let before = session.messages().to_vec();

        {
            let turn = session.begin_turn("explain this");
            let messages = assembler.assemble(&turn.session().turn_context(None, &[]));
            assert_eq!(messages.last(), Some(&ChatMessage::user("explain this")));

            let mut stream = consumer.completions(messages, "gpt-4", 0.0);
            let first = stream.next().await.unwrap().unwrap();
            assert_eq!(first.text, "partial ");
            // interrupted here: stream and turn dropped without commit
        }

        assert_eq!(session.messages(), before.as_slice());
    }
}
