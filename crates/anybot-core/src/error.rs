//! Error taxonomy shared by the platform client, handlers and dispatcher

use thiserror::Error;

/// Which piece of session state a command needed but did not find
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingSession {
    AccessToken,
    BusinessGroup,
}

impl std::fmt::Display for MissingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissingSession::AccessToken => write!(f, "access token"),
            MissingSession::BusinessGroup => write!(f, "business group"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BotError {
    /// Login rejected by the platform, or the login call itself failed
    #[error("login failed with status {status}: {body}")]
    Auth { status: u16, body: String },

    /// Required session state is missing or expired; the user must log in again
    #[error("session has no {0}, login required")]
    Session(MissingSession),

    /// Any non-login platform call that returned a non-2xx status
    #[error("platform call {operation} failed with status {status}: {body}")]
    Api {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// Malformed command input, rejected before any network call
    #[error("{0}")]
    Validation(String),

    /// Posting, uploading or opening views on the chat side failed
    #[error("chat transport error: {0}")]
    Transport(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected platform response: {0}")]
    Decode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BotError>;

impl BotError {
    pub fn is_session(&self) -> bool {
        matches!(self, BotError::Session(_))
    }

    /// Heading shown above the error text when it is reported in chat
    pub fn headline(&self) -> &'static str {
        match self {
            BotError::Auth { .. } => "Invalid username/password",
            BotError::Session(_) => "Please login again",
            BotError::Api { .. } => "Platform request failed",
            BotError::Validation(_) => "Invalid command",
            BotError::Transport(_) => "Could not deliver message",
            BotError::Http(_) => "Platform unreachable",
            BotError::Decode(_) => "Unexpected platform response",
            BotError::Io(_) => "Local file error",
        }
    }
}

/// Cap a response body for inclusion in an error, cutting on char boundaries
pub fn truncate_for_error(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}
