// pair-core/src/providers/scripted.rs
use super::{CompletionProvider, CompletionRequest, FragmentStream};
use crate::errors::{PairError, Result};
use crate::models::chat::ChatMessage;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// What the scripted provider does for one call.
pub(crate) enum Reply {
    /// A non-streaming answer.
    Text(String),
    /// A stream of fragments; an `Err` item aborts the stream at that point.
    Fragments(Vec<Result<String>>),
    /// Fails the call before anything is returned.
    Fail(PairError),
}

/// Plays back canned replies in order and records every request it receives.
#[derive(Clone, Default)]
pub(crate) struct ScriptedProvider {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedProvider {
    pub(crate) fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answers every call with the same text.
    pub(crate) fn repeating(text: &str, times: usize) -> Self {
        Self::new((0..times).map(|_| Reply::Text(text.to_string())).collect())
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: &CompletionRequest) -> Result<Reply> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PairError::Transport("scripted provider ran out of replies".to_string()))
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<ChatMessage> {
        match self.next(request)? {
            Reply::Text(text) => Ok(ChatMessage::assistant(text)),
            Reply::Fragments(fragments) => {
                let text: Result<Vec<String>> = fragments.into_iter().collect();
                Ok(ChatMessage::assistant(text?.concat()))
            }
            Reply::Fail(err) => Err(err),
        }
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<FragmentStream> {
        match self.next(request)? {
            Reply::Text(text) => Ok(Box::pin(futures::stream::iter(vec![Ok(text)]))),
            Reply::Fragments(fragments) => Ok(Box::pin(futures::stream::iter(fragments))),
            Reply::Fail(err) => Err(err),
        }
    }
}
