//! Inbound events. Parsed in two phases: a minimal envelope carrying only `post_type`, then the
//! matching typed variant. Ids are accepted as JSON numbers or numeric strings.

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    post_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Message(MessageEvent),
    MetaEvent(MetaEvent),
    Notice(NoticeEvent),
    /// Any other post_type (e.g. "request"); carried only for logging.
    Other(String),
}

/// One chat message. Immutable once received.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub message_type: String,
    #[serde(default)]
    pub sub_type: String,
    #[serde(default, deserialize_with = "de_id")]
    pub self_id: String,
    #[serde(default, deserialize_with = "de_id")]
    pub group_id: String,
    #[serde(default, deserialize_with = "de_id")]
    pub user_id: String,
    #[serde(default, deserialize_with = "de_id")]
    pub message_id: String,
    #[serde(default)]
    pub raw_message: String,
    #[serde(default)]
    pub time: i64,
}

impl MessageEvent {
    pub fn is_group(&self) -> bool {
        self.message_type == "group" && !self.group_id.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MetaEvent {
    #[serde(default)]
    pub meta_event_type: String,
    #[serde(default)]
    pub sub_type: String,
    #[serde(default, deserialize_with = "de_id")]
    pub self_id: String,
    #[serde(default)]
    pub interval: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NoticeEvent {
    #[serde(default)]
    pub notice_type: String,
    #[serde(default)]
    pub sub_type: String,
    #[serde(default, deserialize_with = "de_id")]
    pub self_id: String,
    #[serde(default, deserialize_with = "de_id")]
    pub group_id: String,
    #[serde(default, deserialize_with = "de_id")]
    pub user_id: String,
    #[serde(default, deserialize_with = "de_id")]
    pub operator_id: String,
}

/// Parse one inbound text frame.
pub fn parse_event(text: &str) -> Result<Event, serde_json::Error> {
    let envelope: Envelope = serde_json::from_str(text)?;
    let event = match envelope.post_type.as_str() {
        "message" => Event::Message(serde_json::from_str(text)?),
        "meta_event" => Event::MetaEvent(serde_json::from_str(text)?),
        "notice" => Event::Notice(serde_json::from_str(text)?),
        other => Event::Other(other.to_string()),
    };
    Ok(event)
}

/// Lifecycle `connect` meta event sent to a gateway right after it connects.
pub fn lifecycle_connect(self_id: &str, time: i64) -> serde_json::Value {
    serde_json::json!({
        "meta_event_type": "lifecycle",
        "post_type": "meta_event",
        "self_id": super::id_value(self_id),
        "sub_type": "connect",
        "time": time,
    })
}

fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Signed(i64),
        Unsigned(u64),
        Text(String),
    }
    Ok(match Option::<Id>::deserialize(deserializer)? {
        Some(Id::Signed(n)) => n.to_string(),
        Some(Id::Unsigned(n)) => n.to_string(),
        Some(Id::Text(s)) => s,
        None => String::new(),
    })
}
