//! OneBot v11 wire format: inbound event parsing, CQ media markers, outbound actions.
//! Log format: [withdraw][onebot][self_id] key=value ...

pub mod action;
pub mod cq;
pub mod event;
pub mod log;

pub use action::{Action, ActionFrame};
pub use cq::{extract_media, MediaKind, MediaReference};
pub use event::{parse_event, Event, MessageEvent, MetaEvent, NoticeEvent};

/// OneBot ids are numbers on the wire; keep them numeric when they parse, else send the string.
pub(crate) fn id_value(id: &str) -> serde_json::Value {
    id.parse::<i64>()
        .map(serde_json::Value::from)
        .unwrap_or_else(|_| serde_json::Value::from(id))
}
