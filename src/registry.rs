//! Binding of record kinds to a table format for the storage engine.
//!
//! A [`FormatRegistry`] is filled once during storage setup and then shared
//! read-only (e.g. behind an `Arc`). There is no process-global registry.
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::CodecError;
use crate::model::BookData;
use crate::record::{FlatRecord, RecordKind, Schema, ORDER_BOOK_SCHEMA};
use crate::{decode, encode};

pub type Serializer = fn(&BookData) -> Vec<FlatRecord>;
pub type Deserializer = fn(&[FlatRecord]) -> Result<Vec<BookData>, CodecError>;

/// Everything a storage engine needs to persist and reload a family of kinds.
#[derive(Debug, Clone)]
pub struct TableFormat {
    pub record_kinds: &'static [RecordKind],
    pub serializer: Serializer,
    pub deserializer: Deserializer,
    pub schema: Schema,
    /// Reads and writes must keep intra-group row order, must not split a
    /// logical group across chunks, and leave grouping to the deserializer.
    pub chunked: bool,
}

impl TableFormat {
    pub fn serialize(&self, data: &BookData) -> Vec<FlatRecord> {
        (self.serializer)(data)
    }

    pub fn deserialize(&self, rows: &[FlatRecord]) -> Result<Vec<BookData>, CodecError> {
        (self.deserializer)(rows)
    }
}

/// The order book format: three kinds, one schema, chunked.
pub fn order_book_format() -> TableFormat {
    TableFormat {
        record_kinds: &RecordKind::ALL,
        serializer: encode::encode,
        deserializer: decode::decode,
        schema: ORDER_BOOK_SCHEMA,
        chunked: true,
    }
}

#[derive(Debug, Default)]
pub struct FormatRegistry {
    formats: HashMap<RecordKind, Arc<TableFormat>>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every kind of `format` to it. Fails without changes if any of
    /// those kinds is already bound.
    pub fn register(&mut self, format: TableFormat) -> Result<Arc<TableFormat>, CodecError> {
        if let Some(kind) = format.record_kinds.iter().find(|k| self.formats.contains_key(*k)) {
            return Err(CodecError::AlreadyRegistered(kind.to_string()));
        }
        let format = Arc::new(format);
        for kind in format.record_kinds {
            self.formats.insert(*kind, Arc::clone(&format));
        }
        debug!("Registered table {} for {:?}", format.schema.table, format.record_kinds);
        Ok(format)
    }

    /// Look up a format by kind name as it appears at the storage boundary.
    pub fn format_for(&self, kind_name: &str) -> Result<Arc<TableFormat>, CodecError> {
        let kind: RecordKind = kind_name.parse()?;
        self.format_for_kind(kind)
    }

    pub fn format_for_kind(&self, kind: RecordKind) -> Result<Arc<TableFormat>, CodecError> {
        self.formats
            .get(&kind)
            .cloned()
            .ok_or_else(|| CodecError::UnsupportedType(kind.to_string()))
    }

    pub fn format_for_data(&self, data: &BookData) -> Result<Arc<TableFormat>, CodecError> {
        self.format_for_kind(data.kind())
    }

    /// Format whose schema writes to `table`, if one is registered.
    pub fn format_for_table(&self, table: &str) -> Result<Arc<TableFormat>, CodecError> {
        self.formats
            .values()
            .find(|f| f.schema.table == table)
            .cloned()
            .ok_or_else(|| CodecError::UnsupportedType(table.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

/// One-time setup: bind `Delta`, `Deltas` and `Snapshot` to the order book
/// row format.
pub fn register_order_book_format(registry: &mut FormatRegistry) -> Result<Arc<TableFormat>, CodecError> {
    registry.register(order_book_format())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BookAction, BookOrder, OrderBookDelta, OrderSide};

    #[test]
    fn all_kinds_share_one_format() {
        let mut registry = FormatRegistry::new();
        let format = register_order_book_format(&mut registry).unwrap();
        assert!(format.chunked);
        for name in ["Delta", "Deltas", "Snapshot"] {
            let f = registry.format_for(name).unwrap();
            assert!(Arc::ptr_eq(&f, &format), "{name}");
        }
        assert!(Arc::ptr_eq(&registry.format_for_table("OrderBookDelta").unwrap(), &format));
    }

    #[test]
    fn unknown_kind_is_unsupported() {
        let mut registry = FormatRegistry::new();
        register_order_book_format(&mut registry).unwrap();
        assert_eq!(
            registry.format_for("QuoteTick").unwrap_err(),
            CodecError::UnsupportedType("QuoteTick".into())
        );
        assert!(matches!(registry.format_for_table("trades"), Err(CodecError::UnsupportedType(_))));
    }

    #[test]
    fn lookup_before_registration_is_unsupported() {
        let registry = FormatRegistry::new();
        assert!(registry.is_empty());
        assert!(matches!(registry.format_for_kind(RecordKind::Delta), Err(CodecError::UnsupportedType(_))));
    }

    #[test]
    fn registration_is_write_once() {
        let mut registry = FormatRegistry::new();
        register_order_book_format(&mut registry).unwrap();
        let err = register_order_book_format(&mut registry).unwrap_err();
        assert_eq!(err, CodecError::AlreadyRegistered("Delta".into()));
    }

    #[test]
    fn format_dispatches_to_codec() {
        let mut registry = FormatRegistry::new();
        register_order_book_format(&mut registry).unwrap();
        let data: BookData = OrderBookDelta::new(
            "ESH1.GLBX".parse().unwrap(),
            BookAction::Update,
            Some(BookOrder::new(OrderSide::Sell, 4000.25, 7.0, 42)),
            11,
            12,
        )
        .into();
        let format = registry.format_for_data(&data).unwrap();
        let rows = format.serialize(&data);
        assert_eq!(format.deserialize(&rows).unwrap(), vec![data]);
    }

    #[test]
    fn shared_registry_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FormatRegistry>();
        assert_send_sync::<Arc<TableFormat>>();
    }
}
