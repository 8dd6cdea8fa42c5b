//! Domain event -> ordered flat rows.
use crate::model::{BookAction, BookData, BookLevel, BookOrder, OrderBookDelta, OrderBookSnapshot, OrderSide};
use crate::record::{FlatRecord, RecordKind};

/// Flatten one event into its ordered rows.
///
/// A snapshot becomes a synthetic `CLEAR` followed by one `ADD` per bid level
/// and then one per ask level, each in the caller's order. The final row of a
/// non-empty output carries `_last = true`.
pub fn encode(data: &BookData) -> Vec<FlatRecord> {
    let mut rows = match data {
        BookData::Delta(delta) => vec![FlatRecord::from_delta(delta, RecordKind::Delta)],
        BookData::Deltas(batch) => batch
            .deltas
            .iter()
            .map(|d| FlatRecord::from_delta(d, RecordKind::Deltas))
            .collect(),
        BookData::Snapshot(snapshot) => encode_snapshot(snapshot),
    };
    if let Some(tail) = rows.last_mut() {
        tail.last = true;
    }
    rows
}

fn encode_snapshot(s: &OrderBookSnapshot) -> Vec<FlatRecord> {
    let mut rows = Vec::with_capacity(1 + s.bids.len() + s.asks.len());
    let clear = OrderBookDelta::clear(s.instrument_id.clone(), s.ts_event, s.ts_init);
    rows.push(FlatRecord::from_delta(&clear, RecordKind::Snapshot));

    let levels = s
        .bids
        .iter()
        .map(|l| (OrderSide::Buy, l))
        .chain(s.asks.iter().map(|l| (OrderSide::Sell, l)));
    for (side, &BookLevel { price, size }) in levels {
        let add = OrderBookDelta::new(
            s.instrument_id.clone(),
            BookAction::Add,
            Some(BookOrder::new(side, price, size, 0)),
            s.ts_event,
            s.ts_init,
        );
        rows.push(FlatRecord::from_delta(&add, RecordKind::Snapshot));
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InstrumentId, OrderBookDeltas};

    fn id() -> InstrumentId {
        "ESH1.GLBX".parse().unwrap()
    }

    fn add(side: OrderSide, price: f64, size: f64, ts: u64) -> OrderBookDelta {
        OrderBookDelta::new(id(), BookAction::Add, Some(BookOrder::new(side, price, size, 0)), ts, ts)
    }

    #[test]
    fn single_delta_is_one_last_row() {
        let rows = encode(&add(OrderSide::Buy, 100.0, 1.0, 10).into());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, RecordKind::Delta);
        assert!(rows[0].last);
    }

    #[test]
    fn batch_keeps_member_order() {
        let batch = OrderBookDeltas::new(
            id(),
            vec![
                add(OrderSide::Buy, 100.0, 1.0, 10),
                add(OrderSide::Sell, 101.0, 2.0, 10),
                OrderBookDelta::clear(id(), 10, 10),
            ],
            10,
            10,
        );
        let rows = encode(&batch.into());
        let actions: Vec<_> = rows.iter().map(|r| r.action).collect();
        assert_eq!(actions, [BookAction::Add, BookAction::Add, BookAction::Clear]);
        assert!(rows.iter().all(|r| r.kind == RecordKind::Deltas));
        assert_eq!(rows.iter().filter(|r| r.last).count(), 1);
        assert!(rows[2].last);
    }

    #[test]
    fn empty_batch_encodes_to_nothing() {
        let rows = encode(&OrderBookDeltas::new(id(), vec![], 1, 1).into());
        assert!(rows.is_empty());
    }

    #[test]
    fn snapshot_decomposition() {
        let snapshot = OrderBookSnapshot::new(
            id(),
            vec![(100.0, 5.0).into(), (99.5, 3.0).into()],
            vec![(100.5, 2.0).into()],
            1000,
            1000,
        );
        let rows = encode(&snapshot.into());
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.kind == RecordKind::Snapshot));
        assert!(rows.iter().all(|r| r.instrument_id == "ESH1.GLBX" && r.ts_event == 1000 && r.ts_init == 1000));

        assert_eq!(rows[0].action, BookAction::Clear);
        assert!(rows[0].side.is_none() && rows[0].price.is_none());

        let levels: Vec<_> = rows[1..]
            .iter()
            .map(|r| (r.action, r.side.as_deref().unwrap(), r.price.unwrap(), r.size.unwrap()))
            .collect();
        assert_eq!(
            levels,
            [
                (BookAction::Add, "BUY", 100.0, 5.0),
                (BookAction::Add, "BUY", 99.5, 3.0),
                (BookAction::Add, "SELL", 100.5, 2.0),
            ]
        );
        let last: Vec<_> = rows.iter().map(|r| r.last).collect();
        assert_eq!(last, [false, false, false, true]);
    }

    #[test]
    fn empty_snapshot_is_a_lone_clear() {
        let rows = encode(&OrderBookSnapshot::new(id(), vec![], vec![], 1, 1).into());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, BookAction::Clear);
        assert!(rows[0].last);
    }
}
