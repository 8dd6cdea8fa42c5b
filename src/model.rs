//! Order book domain events consumed by the codec.
//!
//! Three event kinds are served: a single [`OrderBookDelta`], an atomic batch
//! of them ([`OrderBookDeltas`]), and a full [`OrderBookSnapshot`]. The closed
//! sum [`BookData`] is what the encoder accepts and the decoder yields.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CodecError;
use crate::record::RecordKind;

/// Nanoseconds since the UNIX epoch.
pub type UnixNanos = u64;

/// Venue-qualified instrument identifier, e.g. `ESH1.GLBX`.
///
/// Ordering is plain lexicographic ordering of the full string, which is the
/// grouping order used by the decoder.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstrumentId(String);

impl InstrumentId {
    /// Symbol part (everything before the last `.`).
    pub fn symbol(&self) -> &str {
        self.split().0
    }

    /// Venue part (everything after the last `.`).
    pub fn venue(&self) -> &str {
        self.split().1
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split(&self) -> (&str, &str) {
        // FromStr guarantees a separator with non-empty halves
        self.0.rsplit_once('.').unwrap_or((self.0.as_str(), ""))
    }
}

impl FromStr for InstrumentId {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once('.') {
            Some((sym, venue)) if !sym.is_empty() && !venue.is_empty() => Ok(Self(s.to_string())),
            _ => Err(CodecError::InvalidRecord {
                reason: format!("instrument_id {s:?} is not of the form SYMBOL.VENUE"),
            }),
        }
    }
}

impl TryFrom<String> for InstrumentId {
    type Error = CodecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InstrumentId> for String {
    fn from(id: InstrumentId) -> Self {
        id.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Storage-boundary spelling of the side column.
    pub const fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl FromStr for OrderSide {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            other => Err(CodecError::InvalidRecord { reason: format!("wrong side {other:?}") }),
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BookAction {
    Add,
    Update,
    Delete,
    Clear,
}

impl BookAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            BookAction::Add => "ADD",
            BookAction::Update => "UPDATE",
            BookAction::Delete => "DELETE",
            BookAction::Clear => "CLEAR",
        }
    }
}

impl fmt::Display for BookAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookOrder {
    pub price: f64,
    pub size: f64,
    pub side: OrderSide,
    /// Venue order id for L3 feeds; 0 for aggregated levels.
    pub order_id: u64,
}

impl BookOrder {
    pub fn new(side: OrderSide, price: f64, size: f64, order_id: u64) -> Self {
        Self { price, size, side, order_id }
    }
}

/// One atomic order book mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookDelta {
    pub instrument_id: InstrumentId,
    pub action: BookAction,
    /// Absent only for [`BookAction::Clear`].
    pub order: Option<BookOrder>,
    pub flags: Option<u8>,
    pub sequence: Option<u64>,
    pub ts_event: UnixNanos,
    pub ts_init: UnixNanos,
}

impl OrderBookDelta {
    pub fn new(
        instrument_id: InstrumentId,
        action: BookAction,
        order: Option<BookOrder>,
        ts_event: UnixNanos,
        ts_init: UnixNanos,
    ) -> Self {
        Self { instrument_id, action, order, flags: None, sequence: None, ts_event, ts_init }
    }

    /// A `CLEAR` delta, which carries no order.
    pub fn clear(instrument_id: InstrumentId, ts_event: UnixNanos, ts_init: UnixNanos) -> Self {
        Self::new(instrument_id, BookAction::Clear, None, ts_event, ts_init)
    }

    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }
}

/// An ordered batch of deltas applied as one update at one event time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookDeltas {
    pub instrument_id: InstrumentId,
    pub deltas: Vec<OrderBookDelta>,
    pub ts_event: UnixNanos,
    pub ts_init: UnixNanos,
}

impl OrderBookDeltas {
    pub fn new(
        instrument_id: InstrumentId,
        deltas: Vec<OrderBookDelta>,
        ts_event: UnixNanos,
        ts_init: UnixNanos,
    ) -> Self {
        Self { instrument_id, deltas, ts_event, ts_init }
    }
}

/// A price level as `(price, size)`, in whatever order the caller supplied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

impl From<(f64, f64)> for BookLevel {
    fn from((price, size): (f64, f64)) -> Self {
        Self { price, size }
    }
}

/// Full book state at one instant. Level order is preserved verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub instrument_id: InstrumentId,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub ts_event: UnixNanos,
    pub ts_init: UnixNanos,
}

impl OrderBookSnapshot {
    pub fn new(
        instrument_id: InstrumentId,
        bids: Vec<BookLevel>,
        asks: Vec<BookLevel>,
        ts_event: UnixNanos,
        ts_init: UnixNanos,
    ) -> Self {
        Self { instrument_id, bids, asks, ts_event, ts_init }
    }
}

/// Closed set of event kinds served by the order book row format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BookData {
    Delta(OrderBookDelta),
    Deltas(OrderBookDeltas),
    Snapshot(OrderBookSnapshot),
}

impl BookData {
    pub fn kind(&self) -> RecordKind {
        match self {
            BookData::Delta(_) => RecordKind::Delta,
            BookData::Deltas(_) => RecordKind::Deltas,
            BookData::Snapshot(_) => RecordKind::Snapshot,
        }
    }

    pub fn instrument_id(&self) -> &InstrumentId {
        match self {
            BookData::Delta(d) => &d.instrument_id,
            BookData::Deltas(d) => &d.instrument_id,
            BookData::Snapshot(s) => &s.instrument_id,
        }
    }

    pub fn ts_event(&self) -> UnixNanos {
        match self {
            BookData::Delta(d) => d.ts_event,
            BookData::Deltas(d) => d.ts_event,
            BookData::Snapshot(s) => s.ts_event,
        }
    }

    pub fn ts_init(&self) -> UnixNanos {
        match self {
            BookData::Delta(d) => d.ts_init,
            BookData::Deltas(d) => d.ts_init,
            BookData::Snapshot(s) => s.ts_init,
        }
    }
}

impl From<OrderBookDelta> for BookData {
    fn from(d: OrderBookDelta) -> Self {
        BookData::Delta(d)
    }
}

impl From<OrderBookDeltas> for BookData {
    fn from(d: OrderBookDeltas) -> Self {
        BookData::Deltas(d)
    }
}

impl From<OrderBookSnapshot> for BookData {
    fn from(s: OrderBookSnapshot) -> Self {
        BookData::Snapshot(s)
    }
}
