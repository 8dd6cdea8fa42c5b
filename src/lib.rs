//! Order book event-log codec.
//!
//! Converts order book events (single deltas, delta batches, full snapshots)
//! into one flat row shape for columnar storage and rebuilds the exact event
//! stream from those rows:
//!
//! - `model`: the domain events and the closed [`BookData`] sum over them
//! - `record`: the storage row ([`FlatRecord`]) and its shared schema
//! - `encode` / `decode`: event -> rows and rows -> events
//! - `registry`: one-time binding of the three kinds to the row format
//! - `journal`: a framed, CRC-checked row log honoring the chunked contract
//!
//! The `orderbook-codec` binary inspects and replays journals.
pub mod decode;
pub mod encode;
pub mod error;
pub mod journal;
pub mod model;
pub mod record;
pub mod registry;

pub use decode::decode;
pub use encode::encode;
pub use error::CodecError;
pub use model::{
    BookAction, BookData, BookLevel, BookOrder, InstrumentId, OrderBookDelta, OrderBookDeltas,
    OrderBookSnapshot, OrderSide, UnixNanos,
};
pub use record::{FlatRecord, RecordKind, Schema, ORDER_BOOK_SCHEMA};
pub use registry::{register_order_book_format, FormatRegistry, TableFormat};
