//! Event and message types exchanged between the transport and the handlers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a user chose to log in. Fixed when the login form is built and carried
/// back with the submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoginMode {
    /// Username and password
    Password,
    /// Connected-app client id and secret
    ClientCredentials,
}

impl LoginMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginMode::Password => "password",
            LoginMode::ClientCredentials => "client-credentials",
        }
    }
}

impl fmt::Display for LoginMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoginMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "password" => Ok(LoginMode::Password),
            "client-credentials" => Ok(LoginMode::ClientCredentials),
            other => Err(format!("unknown login mode: {}", other)),
        }
    }
}

/// Credentials entered in the login form. Used once, never stored.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Password { username: String, password: String },
    ClientCredentials { client_id: String, client_secret: String },
}

impl Credentials {
    pub fn mode(&self) -> LoginMode {
        match self {
            Credentials::Password { .. } => LoginMode::Password,
            Credentials::ClientCredentials { .. } => LoginMode::ClientCredentials,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
            Credentials::ClientCredentials { client_id, .. } => f
                .debug_struct("ClientCredentials")
                .field("client_id", client_id)
                .finish_non_exhaustive(),
        }
    }
}

/// An organization the logged-in user can act on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessGroup {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppMention {
    pub user_id: String,
    pub channel_id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlashCommand {
    /// Command name including the leading slash, e.g. `/get-status`
    pub command: String,
    pub text: String,
    pub user_id: String,
    pub channel_id: String,
}

/// Interactive callbacks from buttons, selects and modal forms
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    /// A business group was picked from the select menu
    OptionSelected { label: String, value: String },
    /// A login button was pressed; the form for `value` should be opened
    ButtonPressed { value: String, trigger_id: String },
    /// The login form was submitted
    LoginSubmitted { credentials: Credentials },
}

/// Everything the transport can hand to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    AppMention(AppMention),
    SlashCommand(SlashCommand),
    Interaction(Interaction),
    /// Recognised envelope that carries nothing we handle
    Unsupported { kind: String },
}

impl InboundEvent {
    pub fn kind(&self) -> &str {
        match self {
            InboundEvent::AppMention(_) => "app_mention",
            InboundEvent::SlashCommand(_) => "slash_command",
            InboundEvent::Interaction(Interaction::OptionSelected { .. }) => "option_selected",
            InboundEvent::Interaction(Interaction::ButtonPressed { .. }) => "button_pressed",
            InboundEvent::Interaction(Interaction::LoginSubmitted { .. }) => "login_submitted",
            InboundEvent::Unsupported { kind } => kind,
        }
    }
}

/// Colour hints for notices
pub const COLOR_OK: &str = "#36a64f";
pub const COLOR_WELCOME: &str = "#4af030";
pub const COLOR_ERROR: &str = "#d40e0d";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// A single attachment with a heading and body text
    Notice {
        pretext: String,
        text: String,
        color: Option<String>,
    },
    /// Greeting plus the two login buttons
    LoginOptions { greeting: String },
    /// Select menu listing the user's business groups
    BusinessGroupPicker { groups: Vec<BusinessGroup> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub channel: String,
    pub body: MessageBody,
}

impl OutgoingMessage {
    pub fn notice(channel: impl Into<String>, pretext: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            body: MessageBody::Notice {
                pretext: pretext.into(),
                text: text.into(),
                color: None,
            },
        }
    }

    pub fn with_color(mut self, value: &str) -> Self {
        if let MessageBody::Notice { color, .. } = &mut self.body {
            *color = Some(value.to_string());
        }
        self
    }

    /// Concatenated human-readable text, used for logging and assertions
    pub fn plain_text(&self) -> String {
        match &self.body {
            MessageBody::Notice { pretext, text, .. } => format!("{}\n{}", pretext, text),
            MessageBody::LoginOptions { greeting } => greeting.clone(),
            MessageBody::BusinessGroupPicker { groups } => groups
                .iter()
                .map(|g| g.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_mode_round_trips_through_str() {
        for mode in [LoginMode::Password, LoginMode::ClientCredentials] {
            assert_eq!(mode.as_str().parse::<LoginMode>().unwrap(), mode);
        }
        assert!("basic".parse::<LoginMode>().is_err());
    }

    #[test]
    fn test_credentials_debug_hides_secrets() {
        let creds = Credentials::Password {
            username: "ops".to_string(),
            password: "hunter2".to_string(),
        };
        let shown = format!("{:?}", creds);
        assert!(shown.contains("ops"));
        assert!(!shown.contains("hunter2"));

        let creds = Credentials::ClientCredentials {
            client_id: "cid".to_string(),
            client_secret: "s3cret".to_string(),
        };
        assert!(!format!("{:?}", creds).contains("s3cret"));
        assert_eq!(creds.mode(), LoginMode::ClientCredentials);
    }

    #[test]
    fn test_notice_color_only_applies_to_notices() {
        let msg = OutgoingMessage::notice("C1", "Heading", "Body").with_color(COLOR_OK);
        assert_eq!(
            msg.body,
            MessageBody::Notice {
                pretext: "Heading".into(),
                text: "Body".into(),
                color: Some(COLOR_OK.into()),
            }
        );

        let prompt = OutgoingMessage {
            channel: "C1".into(),
            body: MessageBody::LoginOptions { greeting: "hi".into() },
        }
        .with_color(COLOR_OK);
        assert_eq!(prompt.plain_text(), "hi");
    }
}
