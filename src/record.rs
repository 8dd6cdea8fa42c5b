//! Storage row shape shared by all order book event kinds.
//!
//! Every event is flattened into [`FlatRecord`]s: the columns of a single
//! delta plus a `_type` tag naming the logical event kind and a `_last`
//! marker set on the final row of each encode call. [`ORDER_BOOK_SCHEMA`]
//! describes the physical column layout handed to the storage engine.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CodecError;
use crate::model::{BookAction, BookOrder, InstrumentId, OrderBookDelta, OrderSide, UnixNanos};

/// Logical event kind a row belongs to (the `_type` column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Delta,
    Deltas,
    Snapshot,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [RecordKind::Delta, RecordKind::Deltas, RecordKind::Snapshot];

    pub const fn as_str(self) -> &'static str {
        match self {
            RecordKind::Delta => "Delta",
            RecordKind::Deltas => "Deltas",
            RecordKind::Snapshot => "Snapshot",
        }
    }
}

impl FromStr for RecordKind {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| CodecError::UnsupportedType(s.to_string()))
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One storage row.
///
/// `side`, `price`, `size` and `order_id` are present iff the originating
/// delta carried an order. `side` stays a plain string at this boundary; the
/// decoder validates it for the whole batch before rebuilding anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRecord {
    pub instrument_id: String,
    pub action: BookAction,
    pub side: Option<String>,
    pub price: Option<f64>,
    pub size: Option<f64>,
    pub order_id: Option<u64>,
    pub flags: Option<u8>,
    pub sequence: Option<u64>,
    pub ts_event: UnixNanos,
    pub ts_init: UnixNanos,
    #[serde(rename = "_type")]
    pub kind: RecordKind,
    #[serde(rename = "_last", default)]
    pub last: bool,
}

impl FlatRecord {
    /// Flatten a delta into a row tagged with `kind`.
    pub fn from_delta(delta: &OrderBookDelta, kind: RecordKind) -> Self {
        let order = delta.order.as_ref();
        Self {
            instrument_id: delta.instrument_id.to_string(),
            action: delta.action,
            side: order.map(|o| o.side.as_str().to_string()),
            price: order.map(|o| o.price),
            size: order.map(|o| o.size),
            order_id: order.map(|o| o.order_id),
            flags: delta.flags,
            sequence: delta.sequence,
            ts_event: delta.ts_event,
            ts_init: delta.ts_init,
            kind,
            last: false,
        }
    }

    /// Parsed side column; `None` when the row carries no order.
    pub fn order_side(&self) -> Result<Option<OrderSide>, CodecError> {
        self.side.as_deref().map(str::parse::<OrderSide>).transpose()
    }

    /// Check the columns the decoder relies on and return the parsed key
    /// instrument and order.
    ///
    /// Fails with [`CodecError::InvalidRecord`] when the instrument is not
    /// venue-qualified, the side is unknown, or a side is present without
    /// both price and size.
    pub fn validate(&self) -> Result<(InstrumentId, Option<BookOrder>), CodecError> {
        let instrument_id: InstrumentId = self.instrument_id.parse()?;
        let order = match self.order_side()? {
            None => None,
            Some(side) => {
                let (Some(price), Some(size)) = (self.price, self.size) else {
                    return Err(CodecError::InvalidRecord {
                        reason: format!(
                            "{} @ {}: side {side} without price and size",
                            self.instrument_id, self.ts_event
                        ),
                    });
                };
                Some(BookOrder::new(side, price, size, self.order_id.unwrap_or(0)))
            }
        };
        Ok((instrument_id, order))
    }

    /// Rebuild the delta this row was flattened from.
    pub fn to_delta(&self) -> Result<OrderBookDelta, CodecError> {
        let (instrument_id, order) = self.validate()?;
        Ok(OrderBookDelta {
            instrument_id,
            action: self.action,
            order,
            flags: self.flags,
            sequence: self.sequence,
            ts_event: self.ts_event,
            ts_init: self.ts_init,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Utf8,
    /// Small closed set of strings (`_type`, `action`, `side`).
    Dictionary,
    Boolean,
    UInt8,
    UInt64,
    Float64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub dtype: ColumnType,
    pub nullable: bool,
}

const fn col(name: &'static str, dtype: ColumnType, nullable: bool) -> Column {
    Column { name, dtype, nullable }
}

/// Physical column layout of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    pub table: &'static str,
    pub columns: &'static [Column],
}

impl Schema {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }
}

/// Row layout shared by `Delta`, `Deltas` and `Snapshot`.
pub const ORDER_BOOK_SCHEMA: Schema = Schema {
    table: "OrderBookDelta",
    columns: &[
        col("instrument_id", ColumnType::Utf8, false),
        col("action", ColumnType::Dictionary, false),
        col("side", ColumnType::Dictionary, true),
        col("price", ColumnType::Float64, true),
        col("size", ColumnType::Float64, true),
        col("order_id", ColumnType::UInt64, true),
        col("flags", ColumnType::UInt8, true),
        col("sequence", ColumnType::UInt64, true),
        col("ts_event", ColumnType::UInt64, false),
        col("ts_init", ColumnType::UInt64, false),
        col("_type", ColumnType::Dictionary, false),
        // written on every row; true only on the final row of an encode call
        col("_last", ColumnType::Boolean, false),
    ],
};
