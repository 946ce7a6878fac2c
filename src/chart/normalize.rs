//! Canonicalization of heterogeneous bar records.
//!
//! Field lookup goes through a fixed alias table; for each field the first alias holding a
//! non-null value wins, even when that value later fails validation.
//!
//! | field          | aliases (in precedence order)         |
//! |----------------|---------------------------------------|
//! | time (seconds) | `time`                                |
//! | open time (ms) | `open_time_ms`, `open_time`, `t`      |
//! | open           | `open`, `open_price`, `o`             |
//! | high           | `high`, `high_price`, `h`             |
//! | low            | `low`, `low_price`, `l`               |
//! | close          | `close`, `close_price`, `c`           |
//! | volume         | `volume`, `v`                         |

use crate::chart::types::Bar;
use crate::chart::wire::WireValue;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarField {
    Time,
    OpenTimeMs,
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl BarField {
    pub const ALL: [BarField; 7] = [
        Self::Time,
        Self::OpenTimeMs,
        Self::Open,
        Self::High,
        Self::Low,
        Self::Close,
        Self::Volume,
    ];

    pub const fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Time => &["time"],
            Self::OpenTimeMs => &["open_time_ms", "open_time", "t"],
            Self::Open => &["open", "open_price", "o"],
            Self::High => &["high", "high_price", "h"],
            Self::Low => &["low", "low_price", "l"],
            Self::Close => &["close", "close_price", "c"],
            Self::Volume => &["volume", "v"],
        }
    }
}

fn resolve(record: &BTreeMap<String, WireValue>, field: BarField) -> Option<&WireValue> {
    field
        .aliases()
        .iter()
        .filter_map(|alias| record.get(*alias))
        .find(|value| !value.is_null())
}

fn resolve_time(record: &BTreeMap<String, WireValue>) -> Option<i64> {
    let seconds = match resolve(record, BarField::Time) {
        Some(explicit) => explicit.coerce_number().floor(),
        None => (resolve(record, BarField::OpenTimeMs)?.coerce_number() / 1_000.0).floor(),
    };

    if seconds.is_finite() && seconds > 0.0 {
        Some(seconds as i64)
    } else {
        None
    }
}

fn resolve_price(record: &BTreeMap<String, WireValue>, field: BarField) -> Option<f64> {
    let price = resolve(record, field)?.coerce_number();
    price.is_finite().then_some(price)
}

/// Canonicalize one wire record. Returns `None` for anything that is not a usable bar.
pub fn normalize(raw: &WireValue) -> Option<Bar> {
    let WireValue::Object(record) = raw else {
        return None;
    };

    let time = resolve_time(record)?;
    let open = resolve_price(record, BarField::Open)?;
    let high = resolve_price(record, BarField::High)?;
    let low = resolve_price(record, BarField::Low)?;
    let close = resolve_price(record, BarField::Close)?;
    // A present but non-numeric volume is kept as NaN rather than dropped.
    let volume = resolve(record, BarField::Volume).map(WireValue::coerce_number);

    Some(Bar {
        time,
        open,
        high,
        low,
        close,
        volume,
    })
}

/// Normalize a wire list, silently dropping rejected records. Order is preserved and nothing
/// is deduplicated or sorted here.
pub fn normalize_bars(raw: &WireValue) -> Vec<Bar> {
    raw.as_list()
        .map(|items| items.iter().filter_map(normalize).collect())
        .unwrap_or_default()
}
