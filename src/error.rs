use crate::model::{InstrumentId, UnixNanos};

/// Errors raised by the order book codec and its format registration.
///
/// All of them are fatal for the call that raised them; the codec never
/// returns a partial result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// A kind outside `Delta`, `Deltas`, `Snapshot` was handed to the format.
    #[error("unsupported order book data type {0:?}")]
    UnsupportedType(String),

    /// A row failed validation before any reconstruction started.
    #[error("invalid record: {reason}")]
    InvalidRecord { reason: String },

    /// A grouped run spans more than one instrument.
    #[error("group at ts_event={ts_event} spans instruments {instruments:?}")]
    InconsistentGroup { ts_event: UnixNanos, instruments: Vec<String> },

    /// A snapshot group holds fewer than two rows (the CLEAR plus one level).
    #[error("snapshot group {instrument_id} @ {ts_event} has {rows} row(s), need at least 2")]
    MalformedSnapshot { instrument_id: InstrumentId, ts_event: UnixNanos, rows: usize },

    /// A record kind was bound twice in the same registry.
    #[error("record kind {0:?} is already registered")]
    AlreadyRegistered(String),
}
