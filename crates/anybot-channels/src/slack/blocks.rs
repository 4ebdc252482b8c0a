//! Block Kit payloads for outgoing messages and the login modal

use anybot_core::types::{LoginMode, MessageBody, OutgoingMessage};
use serde_json::{Value, json};
use tracing::warn;

pub const LOGIN_CALLBACK_ID: &str = "anybot-login";
pub const LOGIN_OPTIONS_BLOCK: &str = "login-options";
pub const BUSINESS_GROUP_BLOCK: &str = "bg-block";
pub const BUSINESS_GROUP_ACTION: &str = "business-group";

/// (block id, action id) of each login form field
pub const USERNAME_FIELD: (&str, &str) = ("username", "user");
pub const PASSWORD_FIELD: (&str, &str) = ("password", "pass");
pub const CLIENT_ID_FIELD: (&str, &str) = ("client_id", "client_id");
pub const CLIENT_SECRET_FIELD: (&str, &str) = ("client_secret", "client_secret");

/// Slack rejects static selects with more options than this
const MAX_SELECT_OPTIONS: usize = 100;

fn plain_text(text: &str) -> Value {
    json!({ "type": "plain_text", "text": text })
}

fn mrkdwn_section(text: &str) -> Value {
    json!({ "type": "section", "text": { "type": "mrkdwn", "text": text } })
}

fn text_input(field: (&str, &str), label: &str) -> Value {
    let (block_id, action_id) = field;
    json!({
        "type": "input",
        "block_id": block_id,
        "label": plain_text(label),
        "element": { "type": "plain_text_input", "action_id": action_id }
    })
}

/// `chat.postMessage` body for `msg`
pub fn message_payload(msg: &OutgoingMessage) -> Value {
    match &msg.body {
        MessageBody::Notice {
            pretext,
            text,
            color,
        } => {
            let mut attachment = json!({
                "pretext": pretext,
                "text": text,
                "mrkdwn_in": ["text", "pretext"],
            });
            if let Some(color) = color {
                attachment["color"] = Value::String(color.clone());
            }
            json!({
                "channel": msg.channel,
                "text": pretext,
                "attachments": [attachment],
            })
        }
        MessageBody::LoginOptions { greeting } => json!({
            "channel": msg.channel,
            "text": greeting,
            "blocks": [
                mrkdwn_section(greeting),
                mrkdwn_section("Please choose a login option"),
                {
                    "type": "actions",
                    "block_id": LOGIN_OPTIONS_BLOCK,
                    "elements": [
                        {
                            "type": "button",
                            "action_id": "login-password",
                            "value": LoginMode::Password.as_str(),
                            "text": plain_text("Login using Username/Password"),
                        },
                        {
                            "type": "button",
                            "action_id": "login-client-credentials",
                            "value": LoginMode::ClientCredentials.as_str(),
                            "text": plain_text("Login using Connected App"),
                        }
                    ]
                }
            ]
        }),
        MessageBody::BusinessGroupPicker { groups } => {
            if groups.len() > MAX_SELECT_OPTIONS {
                warn!(
                    "Showing {} of {} business groups",
                    MAX_SELECT_OPTIONS,
                    groups.len()
                );
            }
            let options: Vec<Value> = groups
                .iter()
                .take(MAX_SELECT_OPTIONS)
                .map(|group| json!({ "text": plain_text(&group.name), "value": group.id }))
                .collect();
            json!({
                "channel": msg.channel,
                "text": "Choose The Business Group",
                "blocks": [
                    mrkdwn_section("You are logged in to platform. Choose The Business Group"),
                    {
                        "type": "actions",
                        "block_id": BUSINESS_GROUP_BLOCK,
                        "elements": [{
                            "type": "static_select",
                            "action_id": BUSINESS_GROUP_ACTION,
                            "placeholder": plain_text("Choose Business Group"),
                            "options": options,
                        }]
                    }
                ]
            })
        }
    }
}

/// Modal view for the given login mode. The mode travels in
/// `private_metadata` so the submission says which form was filled.
pub fn login_view(mode: LoginMode) -> Value {
    let blocks = match mode {
        LoginMode::Password => vec![
            text_input(USERNAME_FIELD, "Enter Username"),
            text_input(PASSWORD_FIELD, "Enter Password"),
        ],
        LoginMode::ClientCredentials => vec![
            text_input(CLIENT_ID_FIELD, "Enter Connected app client Id"),
            text_input(CLIENT_SECRET_FIELD, "Enter Connected app client secret"),
        ],
    };
    json!({
        "type": "modal",
        "callback_id": LOGIN_CALLBACK_ID,
        "private_metadata": mode.as_str(),
        "title": plain_text("Login To Platform"),
        "submit": plain_text("Submit"),
        "close": plain_text("Cancel"),
        "blocks": blocks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anybot_core::types::{BusinessGroup, COLOR_ERROR};

    #[test]
    fn test_notice_renders_as_colored_attachment() {
        let msg = OutgoingMessage::notice("C1", "Heading", "Body").with_color(COLOR_ERROR);
        let payload = message_payload(&msg);
        assert_eq!(payload["channel"], "C1");
        assert_eq!(payload["attachments"][0]["pretext"], "Heading");
        assert_eq!(payload["attachments"][0]["text"], "Body");
        assert_eq!(payload["attachments"][0]["color"], COLOR_ERROR);
    }

    #[test]
    fn test_login_options_carry_mode_values() {
        let msg = OutgoingMessage {
            channel: "C1".into(),
            body: MessageBody::LoginOptions { greeting: "hi".into() },
        };
        let payload = message_payload(&msg);
        let buttons = payload["blocks"][2]["elements"].as_array().unwrap();
        let values: Vec<&str> = buttons.iter().map(|b| b["value"].as_str().unwrap()).collect();
        assert_eq!(values, vec!["password", "client-credentials"]);
    }

    #[test]
    fn test_group_picker_lists_ids_as_values() {
        let msg = OutgoingMessage {
            channel: "C1".into(),
            body: MessageBody::BusinessGroupPicker {
                groups: vec![BusinessGroup { id: "org-1".into(), name: "Ops".into() }],
            },
        };
        let payload = message_payload(&msg);
        let select = &payload["blocks"][1]["elements"][0];
        assert_eq!(select["type"], "static_select");
        assert_eq!(select["options"][0]["value"], "org-1");
        assert_eq!(select["options"][0]["text"]["text"], "Ops");
    }

    #[test]
    fn test_login_view_tags_mode_and_fields() {
        let view = login_view(LoginMode::ClientCredentials);
        assert_eq!(view["private_metadata"], "client-credentials");
        assert_eq!(view["callback_id"], LOGIN_CALLBACK_ID);
        assert_eq!(view["blocks"][0]["block_id"], CLIENT_ID_FIELD.0);
        assert_eq!(view["blocks"][1]["element"]["action_id"], CLIENT_SECRET_FIELD.1);

        let view = login_view(LoginMode::Password);
        assert_eq!(view["private_metadata"], "password");
        assert_eq!(view["blocks"][0]["block_id"], USERNAME_FIELD.0);
    }
}
