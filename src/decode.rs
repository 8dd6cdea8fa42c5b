//! Flat rows -> domain events.
//!
//! Rows are grouped on `(instrument_id, ts_event)`; each group is exactly one
//! original event. Intra-group order is the only thing that recovers delta
//! order and snapshot level order, so grouping uses an ordered multi-map that
//! keeps per-key insertion order.
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::CodecError;
use crate::model::{
    BookData, BookLevel, InstrumentId, OrderBookDeltas, OrderBookSnapshot, OrderSide, UnixNanos,
};
use crate::record::{FlatRecord, RecordKind};

type GroupKey = (InstrumentId, UnixNanos);

/// Rebuild events from rows, sorted by `ts_event` (stable on ties).
///
/// The whole batch is validated first; on any error nothing is returned.
/// Callers must not split one logical group across two calls.
pub fn decode(records: &[FlatRecord]) -> Result<Vec<BookData>, CodecError> {
    let groups = group_records(records)?;
    let group_count = groups.len();

    let mut events = Vec::with_capacity(group_count);
    for ((instrument_id, ts_event), rows) in groups {
        let Some(first) = rows.first() else { continue };
        let event = if first.kind == RecordKind::Snapshot {
            build_snapshot(&instrument_id, ts_event, &rows)?
        } else {
            build_deltas(&rows)?
        };
        events.push(event);
    }

    // stable: equal ts_event keeps the (instrument_id, ts_event) traversal order
    events.sort_by_key(BookData::ts_event);
    debug!("Decoded {} rows into {} events", records.len(), events.len());
    Ok(events)
}

/// Validate every row, then bucket them by key preserving arrival order.
fn group_records(records: &[FlatRecord]) -> Result<BTreeMap<GroupKey, Vec<&FlatRecord>>, CodecError> {
    let mut keys = Vec::with_capacity(records.len());
    for row in records {
        let (instrument_id, _) = row.validate()?;
        keys.push(instrument_id);
    }

    let mut groups: BTreeMap<GroupKey, Vec<&FlatRecord>> = BTreeMap::new();
    for (row, instrument_id) in records.iter().zip(keys) {
        groups.entry((instrument_id, row.ts_event)).or_default().push(row);
    }
    Ok(groups)
}

fn build_snapshot(
    instrument_id: &InstrumentId,
    ts_event: UnixNanos,
    rows: &[&FlatRecord],
) -> Result<BookData, CodecError> {
    // grouping keys on the parsed instrument, so this only trips when a caller
    // hands over rows that were not grouped by `group_records`
    let mut instruments: Vec<String> = rows.iter().map(|r| r.instrument_id.clone()).collect();
    instruments.sort();
    instruments.dedup();
    if instruments.len() > 1 {
        return Err(CodecError::InconsistentGroup { ts_event, instruments });
    }
    let [_clear, head, ..] = rows else {
        return Err(CodecError::MalformedSnapshot {
            instrument_id: instrument_id.clone(),
            ts_event,
            rows: rows.len(),
        });
    };

    let mut bids = Vec::new();
    let mut asks = Vec::new();
    for row in &rows[1..] {
        let (_, Some(order)) = row.validate()? else { continue };
        let level = BookLevel { price: order.price, size: order.size };
        match order.side {
            OrderSide::Buy => bids.push(level),
            OrderSide::Sell => asks.push(level),
        }
    }

    Ok(BookData::Snapshot(OrderBookSnapshot {
        instrument_id: head.instrument_id.parse()?,
        bids,
        asks,
        ts_event: head.ts_event,
        ts_init: head.ts_init,
    }))
}

fn build_deltas(rows: &[&FlatRecord]) -> Result<BookData, CodecError> {
    match rows {
        [single] if single.kind == RecordKind::Delta => Ok(BookData::Delta(single.to_delta()?)),
        [first, ..] => {
            let deltas = rows.iter().map(|r| r.to_delta()).collect::<Result<Vec<_>, _>>()?;
            Ok(BookData::Deltas(OrderBookDeltas {
                instrument_id: first.instrument_id.parse()?,
                deltas,
                ts_event: first.ts_event,
                ts_init: first.ts_init,
            }))
        }
        [] => Err(CodecError::InvalidRecord { reason: "empty delta group".to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode;
    use crate::model::{BookAction, BookOrder, OrderBookDelta};

    fn id(s: &str) -> InstrumentId {
        s.parse().unwrap()
    }

    fn add(inst: &str, side: OrderSide, price: f64, ts: u64) -> OrderBookDelta {
        OrderBookDelta::new(id(inst), BookAction::Add, Some(BookOrder::new(side, price, 1.0, 0)), ts, ts + 1)
    }

    fn snapshot() -> OrderBookSnapshot {
        OrderBookSnapshot::new(
            id("ESH1.GLBX"),
            vec![(100.0, 5.0).into(), (99.5, 3.0).into()],
            vec![(100.5, 2.0).into()],
            1000,
            1000,
        )
    }

    #[test]
    fn delta_round_trip() {
        let d: BookData = add("ESH1.GLBX", OrderSide::Buy, 100.0, 5).with_sequence(9).with_flags(128).into();
        assert_eq!(decode(&encode(&d)).unwrap(), vec![d]);
    }

    #[test]
    fn deltas_round_trip() {
        let batch: BookData = OrderBookDeltas::new(
            id("ESH1.GLBX"),
            vec![
                OrderBookDelta::clear(id("ESH1.GLBX"), 7, 8),
                add("ESH1.GLBX", OrderSide::Sell, 101.0, 7),
                add("ESH1.GLBX", OrderSide::Buy, 99.0, 7),
            ],
            7,
            8,
        )
        .into();
        assert_eq!(decode(&encode(&batch)).unwrap(), vec![batch]);
    }

    #[test]
    fn snapshot_round_trip_keeps_level_order() {
        let s: BookData = snapshot().into();
        assert_eq!(decode(&encode(&s)).unwrap(), vec![s]);
    }

    #[test]
    fn single_deltas_member_stays_a_batch() {
        let batch: BookData =
            OrderBookDeltas::new(id("ESH1.GLBX"), vec![add("ESH1.GLBX", OrderSide::Buy, 1.0, 3)], 3, 4).into();
        assert_eq!(decode(&encode(&batch)).unwrap(), vec![batch]);
    }

    #[test]
    fn interleaved_groups_are_regrouped() {
        let s: BookData = snapshot().into();
        let d: BookData = add("NQH1.GLBX", OrderSide::Sell, 13000.0, 500).into();
        let s_rows = encode(&s);
        let d_rows = encode(&d);
        let mut mixed = vec![s_rows[0].clone(), s_rows[1].clone()];
        mixed.extend(d_rows);
        mixed.extend_from_slice(&s_rows[2..]);

        assert_eq!(decode(&mixed).unwrap(), vec![d, s]);
    }

    #[test]
    fn output_sorted_by_ts_event_with_stable_ties() {
        let later: BookData = add("AAA.XNAS", OrderSide::Buy, 1.0, 20).into();
        let tie_b: BookData = add("BBB.XNAS", OrderSide::Buy, 2.0, 10).into();
        let tie_a: BookData = add("AAA.XNAS", OrderSide::Sell, 3.0, 10).into();
        let rows: Vec<_> = [&later, &tie_b, &tie_a].into_iter().flat_map(encode).collect();

        // ties resolve in instrument_id order from the grouping traversal
        assert_eq!(decode(&rows).unwrap(), vec![tie_a, tie_b, later]);
    }

    #[test]
    fn invalid_side_fails_whole_batch() {
        let mut rows = encode(&snapshot().into());
        rows.extend(encode(&add("NQH1.GLBX", OrderSide::Buy, 1.0, 1).into()));
        rows[2].side = Some("INVALID".to_string());
        let err = decode(&rows).unwrap_err();
        assert!(matches!(err, CodecError::InvalidRecord { .. }), "{err}");
    }

    #[test]
    fn unqualified_instrument_is_invalid() {
        let mut rows = encode(&add("ESH1.GLBX", OrderSide::Buy, 1.0, 1).into());
        rows[0].instrument_id = "ESH1".to_string();
        assert!(matches!(decode(&rows), Err(CodecError::InvalidRecord { .. })));
    }

    #[test]
    fn lone_clear_is_malformed_snapshot() {
        let rows = encode(&snapshot().into());
        let err = decode(&rows[..1]).unwrap_err();
        assert_eq!(
            err,
            CodecError::MalformedSnapshot { instrument_id: id("ESH1.GLBX"), ts_event: 1000, rows: 1 }
        );
    }

    #[test]
    fn mixed_instrument_snapshot_group_is_inconsistent() {
        let es = encode(&snapshot().into());
        let mut nq = es[1].clone();
        nq.instrument_id = "NQH1.GLBX".to_string();
        let rows = [&es[0], &nq, &es[2]];

        let err = build_snapshot(&id("ESH1.GLBX"), 1000, &rows).unwrap_err();
        assert_eq!(
            err,
            CodecError::InconsistentGroup {
                ts_event: 1000,
                instruments: vec!["ESH1.GLBX".to_string(), "NQH1.GLBX".to_string()],
            }
        );
    }

    #[test]
    fn empty_input_decodes_to_nothing() {
        assert!(decode(&[]).unwrap().is_empty());
    }

    #[test]
    fn repeated_delta_key_merges_into_batch() {
        let a = add("ESH1.GLBX", OrderSide::Buy, 1.0, 5);
        let b = add("ESH1.GLBX", OrderSide::Sell, 2.0, 5);
        let rows: Vec<_> = [BookData::from(a.clone()), BookData::from(b.clone())].iter().flat_map(encode).collect();
        let out = decode(&rows).unwrap();
        assert_eq!(out, vec![BookData::Deltas(OrderBookDeltas::new(id("ESH1.GLBX"), vec![a, b], 5, 6))]);
    }
}
