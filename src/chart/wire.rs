use crate::chart::types::SubscriptionKey;
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_tungstenite::tungstenite::Message;

/// Loosely typed JSON value as delivered by the feed server.
///
/// Bar records arrive in several shapes (string prices, millisecond open times, single letter
/// keys), so they are decoded into this tree first and resolved field by field afterwards.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WireValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<WireValue>),
    Object(BTreeMap<String, WireValue>),
}

impl WireValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn get(&self, key: &str) -> Option<&WireValue> {
        match self {
            Self::Object(fields) => fields.get(key),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[WireValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Non-empty text content, used for symbol/tf/mode fields.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) if !text.is_empty() => Some(text),
            _ => None,
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Self::Bool(true))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(flag) => *flag,
            Self::Number(number) => *number != 0.0 && !number.is_nan(),
            Self::Text(text) => !text.is_empty(),
            Self::List(_) | Self::Object(_) => true,
        }
    }

    /// Loose numeric coercion: numbers pass through, booleans become 1/0, strings are trimmed
    /// and parsed (empty means 0), everything else is NaN.
    pub fn coerce_number(&self) -> f64 {
        match self {
            Self::Null => 0.0,
            Self::Bool(flag) => {
                if *flag {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Number(number) => *number,
            Self::Text(text) => parse_numeric_text(text),
            Self::List(_) | Self::Object(_) => f64::NAN,
        }
    }
}

fn parse_numeric_text(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    let radix_prefixed = [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)];
    for (prefix, radix) in radix_prefixed {
        if let Some(digits) = trimmed.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix)
                .map(|value| value as f64)
                .unwrap_or(f64::NAN);
        }
    }

    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// Read a text field, falling back to `None` for absent, empty or non-text values.
pub fn text_field(value: &Option<WireValue>) -> Option<String> {
    value
        .as_ref()
        .and_then(WireValue::as_text)
        .map(str::to_string)
}

/// A decoded feed frame, classified by its `type` field. Frames without a recognised text
/// `type` (including non-object JSON) are `Other`.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    Snapshot(SnapshotWire),
    Bar(BarWire),
    Health(HealthWire),
    CommandAck(CommandAckWire),
    Other,
}

impl InboundMessage {
    pub fn from_wire(value: WireValue) -> Self {
        let WireValue::Object(mut fields) = value else {
            return Self::Other;
        };
        let kind = fields.get("type").and_then(WireValue::as_text).map(str::to_string);

        match kind.as_deref() {
            Some("snapshot") => Self::Snapshot(SnapshotWire {
                symbol: fields.remove("symbol"),
                tf: fields.remove("tf"),
                mode: fields.remove("mode"),
                bars: fields.remove("bars"),
            }),
            Some("bar") => Self::Bar(BarWire {
                symbol: fields.remove("symbol"),
                tf: fields.remove("tf"),
                mode: fields.remove("mode"),
                bar: fields.remove("bar"),
            }),
            Some("health") => Self::Health(HealthWire {
                status_ok: fields.remove("status_ok"),
                status_stale: fields.remove("status_stale"),
                status: fields.remove("status"),
                ui: fields.remove("ui"),
            }),
            Some("command_ack") => Self::CommandAck(CommandAckWire {
                ok: fields.remove("ok"),
                req_id: fields.remove("req_id"),
                error: fields.remove("error"),
            }),
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotWire {
    pub symbol: Option<WireValue>,
    pub tf: Option<WireValue>,
    pub mode: Option<WireValue>,
    pub bars: Option<WireValue>,
}

#[derive(Debug, Clone)]
pub struct BarWire {
    pub symbol: Option<WireValue>,
    pub tf: Option<WireValue>,
    pub mode: Option<WireValue>,
    pub bar: Option<WireValue>,
}

#[derive(Debug, Clone)]
pub struct HealthWire {
    pub status_ok: Option<WireValue>,
    pub status_stale: Option<WireValue>,
    pub status: Option<WireValue>,
    pub ui: Option<WireValue>,
}

impl HealthWire {
    pub fn status_ok(&self) -> bool {
        self.status_ok.as_ref().is_some_and(WireValue::is_true)
    }

    pub fn status_stale(&self) -> bool {
        self.status_stale.as_ref().is_some_and(WireValue::is_true)
    }

    /// Status payload timestamp in ms: `status.ts_ms`, else `status.ts`; only positive finite
    /// values count.
    pub fn status_timestamp_ms(&self) -> Option<i64> {
        let status = self.status.as_ref()?;
        let raw = ["ts_ms", "ts"]
            .into_iter()
            .filter_map(|field| status.get(field))
            .find(|value| value.is_truthy())?;
        let timestamp = raw.coerce_number().floor();
        if timestamp.is_finite() && timestamp > 0.0 {
            Some(timestamp as i64)
        } else {
            None
        }
    }

    /// The timestamp that gates the status freshness signal, present only for a valid payload.
    pub fn valid_status_timestamp_ms(&self) -> Option<i64> {
        if self.status_ok() {
            self.status_timestamp_ms()
        } else {
            None
        }
    }

    pub fn degraded_count(&self) -> usize {
        self.status_list_len("degraded")
    }

    pub fn error_count(&self) -> usize {
        self.status_list_len("errors")
    }

    pub fn ui_counter(&self, field: &str) -> Option<u64> {
        let value = self.ui.as_ref()?.get(field)?.coerce_number();
        if value.is_finite() && value >= 0.0 {
            Some(value as u64)
        } else {
            None
        }
    }

    fn status_list_len(&self, field: &str) -> usize {
        self.status
            .as_ref()
            .and_then(|status| status.get(field))
            .and_then(WireValue::as_list)
            .map_or(0, <[WireValue]>::len)
    }
}

#[derive(Debug, Clone)]
pub struct CommandAckWire {
    pub ok: Option<WireValue>,
    pub req_id: Option<WireValue>,
    pub error: Option<WireValue>,
}

impl CommandAckWire {
    pub fn describe(&self) -> String {
        if self.ok.as_ref().is_some_and(WireValue::is_true) {
            match text_field(&self.req_id) {
                Some(req_id) => format!("OK: command accepted ({req_id})"),
                None => "OK: command accepted".to_string(),
            }
        } else {
            let error = text_field(&self.error).unwrap_or_else(|| "command_failed".to_string());
            format!("FAIL: {error}")
        }
    }
}

/// Fails only on malformed JSON; any well-formed payload decodes to some message.
pub fn parse_inbound_payload(payload: &mut [u8]) -> Result<InboundMessage, AppError> {
    let value: WireValue = simd_json::serde::from_slice(payload)?;
    Ok(InboundMessage::from_wire(value))
}

#[derive(Debug, Serialize)]
struct SubscribeFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    symbol: &'a str,
    tf: &'a str,
    mode: &'a str,
}

pub fn encode_subscribe_frame(key: &SubscriptionKey) -> Result<Message, AppError> {
    let frame = SubscribeFrame {
        kind: "subscribe",
        symbol: &key.symbol,
        tf: &key.tf,
        mode: &key.mode,
    };
    let text = simd_json::serde::to_string(&frame)?;
    Ok(Message::Text(text))
}
