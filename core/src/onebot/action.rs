//! Outbound actions. One logical action, two wire forms: a push frame
//! `{"action": <name>, "params": {...}}` and a pull request `<base>/<name>?...`.

use serde::Serialize;
use serde_json::{json, Value};

use super::id_value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    DeleteMsg {
        message_id: String,
    },
    SendGroupMsg {
        group_id: String,
        user_id: String,
        message: String,
    },
    SetGroupKick {
        group_id: String,
        user_id: String,
        reject_add_request: bool,
    },
}

/// Push-form frame.
#[derive(Debug, Clone, Serialize)]
pub struct ActionFrame {
    pub action: &'static str,
    pub params: Value,
}

impl Action {
    /// Group notice addressed to `user_id` (prefixed with an at-mention when the user is known).
    pub fn group_notice(group_id: &str, user_id: &str, text: &str) -> Self {
        let message = if user_id.is_empty() {
            text.to_string()
        } else {
            format!("[CQ:at,qq={}]{}", user_id, text)
        };
        Action::SendGroupMsg {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            message,
        }
    }

    /// OneBot action name, also the pull-mode endpoint.
    pub fn name(&self) -> &'static str {
        match self {
            Action::DeleteMsg { .. } => "delete_msg",
            Action::SendGroupMsg { .. } => "send_group_msg",
            Action::SetGroupKick { .. } => "set_group_kick",
        }
    }

    pub fn params(&self) -> Value {
        match self {
            Action::DeleteMsg { message_id } => json!({ "message_id": id_value(message_id) }),
            Action::SendGroupMsg {
                group_id,
                user_id,
                message,
            } => json!({
                "group_id": id_value(group_id),
                "user_id": id_value(user_id),
                "message": message,
            }),
            Action::SetGroupKick {
                group_id,
                user_id,
                reject_add_request,
            } => json!({
                "group_id": id_value(group_id),
                "user_id": id_value(user_id),
                "reject_add_request": reject_add_request,
            }),
        }
    }

    pub fn frame(&self) -> ActionFrame {
        ActionFrame {
            action: self.name(),
            params: self.params(),
        }
    }

    /// Pull mode sends the notice as a JSON POST body; the other actions go as GET query pairs.
    pub fn is_post(&self) -> bool {
        matches!(self, Action::SendGroupMsg { .. })
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            Action::DeleteMsg { message_id } => vec![("message_id", message_id.clone())],
            Action::SendGroupMsg {
                group_id,
                user_id,
                message,
            } => vec![
                ("group_id", group_id.clone()),
                ("user_id", user_id.clone()),
                ("message", message.clone()),
            ],
            Action::SetGroupKick {
                group_id,
                user_id,
                reject_add_request,
            } => vec![
                ("group_id", group_id.clone()),
                ("user_id", user_id.clone()),
                ("reject_add_request", reject_add_request.to_string()),
            ],
        }
    }
}
