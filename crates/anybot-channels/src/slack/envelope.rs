//! Socket Mode envelopes and their classification into core events
//!
//! Slack delivers `hello` and `disconnect` control messages plus envelopes of
//! three kinds: `events_api`, `slash_commands` and `interactive`. Envelopes
//! are acknowledged by id and then mapped to [`InboundEvent`]s.

use anybot_core::types::{AppMention, Credentials, InboundEvent, Interaction, LoginMode, SlashCommand};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::blocks::{
    CLIENT_ID_FIELD, CLIENT_SECRET_FIELD, LOGIN_CALLBACK_ID, PASSWORD_FIELD, USERNAME_FIELD,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    EventsApi,
    SlashCommands,
    Interactive,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub envelope_id: String,
    pub kind: EnvelopeKind,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketMessage {
    Hello,
    Disconnect { reason: Option<String> },
    Envelope(Envelope),
}

#[derive(Debug, Deserialize)]
struct RawSocketMessage {
    #[serde(rename = "type")]
    msg_type: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    reason: Option<String>,
}

/// Parse one websocket text frame. Unknown message types yield `None`.
pub fn parse_socket_message(text: &str) -> Result<Option<SocketMessage>> {
    let raw: RawSocketMessage =
        serde_json::from_str(text).context("failed to parse slack socket message")?;

    let kind = match raw.msg_type.as_str() {
        "hello" => return Ok(Some(SocketMessage::Hello)),
        "disconnect" => return Ok(Some(SocketMessage::Disconnect { reason: raw.reason })),
        "events_api" => EnvelopeKind::EventsApi,
        "slash_commands" => EnvelopeKind::SlashCommands,
        "interactive" => EnvelopeKind::Interactive,
        other => {
            warn!("Unknown socket message type {}, ignoring", other);
            return Ok(None);
        }
    };

    let Some(envelope_id) = raw.envelope_id.filter(|id| !id.is_empty()) else {
        warn!("{:?} envelope without envelope_id, ignoring", kind);
        return Ok(None);
    };

    Ok(Some(SocketMessage::Envelope(Envelope {
        envelope_id,
        kind,
        payload: raw.payload.unwrap_or(Value::Null),
    })))
}

#[derive(Debug, Deserialize)]
struct EventCallback {
    #[serde(rename = "type")]
    callback_type: String,
    event: EventPayload,
}

#[derive(Debug, Deserialize)]
struct EventPayload {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    user: String,
    #[serde(default)]
    channel: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct SlashPayload {
    command: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    channel_id: String,
}

#[derive(Debug, Deserialize)]
struct InteractivePayload {
    #[serde(rename = "type")]
    interaction_type: String,
    #[serde(default)]
    trigger_id: String,
    #[serde(default)]
    actions: Vec<BlockAction>,
    #[serde(default)]
    view: Option<ViewPayload>,
}

#[derive(Debug, Deserialize)]
struct BlockAction {
    #[serde(rename = "type")]
    action_type: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    selected_option: Option<SelectedOption>,
}

#[derive(Debug, Deserialize)]
struct SelectedOption {
    text: OptionText,
    value: String,
}

#[derive(Debug, Deserialize)]
struct OptionText {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ViewPayload {
    #[serde(default)]
    callback_id: String,
    #[serde(default)]
    private_metadata: String,
    #[serde(default)]
    state: ViewState,
}

#[derive(Debug, Default, Deserialize)]
struct ViewState {
    #[serde(default)]
    values: HashMap<String, HashMap<String, InputValue>>,
}

#[derive(Debug, Deserialize)]
struct InputValue {
    #[serde(default)]
    value: Option<String>,
}

impl ViewState {
    fn field(&self, (block_id, action_id): (&str, &str)) -> Option<String> {
        self.values
            .get(block_id)?
            .get(action_id)?
            .value
            .clone()
            .filter(|v| !v.trim().is_empty())
    }
}

fn unsupported(kind: impl Into<String>) -> InboundEvent {
    InboundEvent::Unsupported { kind: kind.into() }
}

/// Map an acknowledged envelope to the event the dispatcher understands.
/// Malformed or unhandled payloads become [`InboundEvent::Unsupported`].
pub fn classify(envelope: &Envelope) -> InboundEvent {
    let event = match envelope.kind {
        EnvelopeKind::EventsApi => classify_event(&envelope.payload),
        EnvelopeKind::SlashCommands => classify_slash(&envelope.payload),
        EnvelopeKind::Interactive => classify_interactive(&envelope.payload),
    };
    debug!("Envelope {} classified as {}", envelope.envelope_id, event.kind());
    event
}

fn classify_event(payload: &Value) -> InboundEvent {
    let callback = match EventCallback::deserialize(payload) {
        Ok(callback) => callback,
        Err(e) => {
            warn!("Malformed events_api payload: {}", e);
            return unsupported("events_api");
        }
    };
    if callback.callback_type != "event_callback" {
        return unsupported(callback.callback_type);
    }
    match callback.event.event_type.as_str() {
        "app_mention" => InboundEvent::AppMention(AppMention {
            user_id: callback.event.user,
            channel_id: callback.event.channel,
            text: callback.event.text,
        }),
        other => unsupported(format!("event:{}", other)),
    }
}

fn classify_slash(payload: &Value) -> InboundEvent {
    match SlashPayload::deserialize(payload) {
        Ok(slash) => InboundEvent::SlashCommand(SlashCommand {
            command: slash.command,
            text: slash.text,
            user_id: slash.user_id,
            channel_id: slash.channel_id,
        }),
        Err(e) => {
            warn!("Malformed slash command payload: {}", e);
            unsupported("slash_commands")
        }
    }
}

fn classify_interactive(payload: &Value) -> InboundEvent {
    let interactive = match InteractivePayload::deserialize(payload) {
        Ok(interactive) => interactive,
        Err(e) => {
            warn!("Malformed interactive payload: {}", e);
            return unsupported("interactive");
        }
    };

    match interactive.interaction_type.as_str() {
        "block_actions" => {
            let Some(action) = interactive.actions.into_iter().next() else {
                return unsupported("block_actions:empty");
            };
            match (action.action_type.as_str(), action.selected_option) {
                ("static_select", Some(option)) => InboundEvent::Interaction(Interaction::OptionSelected {
                    label: option.text.text,
                    value: option.value,
                }),
                ("button", _) => InboundEvent::Interaction(Interaction::ButtonPressed {
                    value: action.value.unwrap_or_default(),
                    trigger_id: interactive.trigger_id,
                }),
                (other, _) => unsupported(format!("block_actions:{}", other)),
            }
        }
        "view_submission" => match interactive.view {
            Some(view) => classify_login_submission(&view),
            None => unsupported("view_submission:no_view"),
        },
        other => unsupported(other),
    }
}

fn classify_login_submission(view: &ViewPayload) -> InboundEvent {
    if view.callback_id != LOGIN_CALLBACK_ID {
        return unsupported(format!("view_submission:{}", view.callback_id));
    }
    let mode: LoginMode = match view.private_metadata.parse() {
        Ok(mode) => mode,
        Err(e) => {
            warn!("Login form without a usable mode: {}", e);
            return unsupported("view_submission:no_mode");
        }
    };

    let credentials = match mode {
        LoginMode::Password => view
            .state
            .field(USERNAME_FIELD)
            .zip(view.state.field(PASSWORD_FIELD))
            .map(|(username, password)| Credentials::Password { username, password }),
        LoginMode::ClientCredentials => view
            .state
            .field(CLIENT_ID_FIELD)
            .zip(view.state.field(CLIENT_SECRET_FIELD))
            .map(|(client_id, client_secret)| Credentials::ClientCredentials {
                client_id,
                client_secret,
            }),
    };

    match credentials {
        Some(credentials) => InboundEvent::Interaction(Interaction::LoginSubmitted { credentials }),
        None => unsupported("view_submission:incomplete"),
    }
}
