// ai
//! 🏨 Source 1 — the feed that nests its city in an `address` and calls the price `priceForNight`.

use serde_json::Value;

use super::{RecordMapper, finish};
use super::extract::{address, as_bool, as_number, as_string, external_id, fields_of};
use crate::error::MappingError;
use crate::record::{CanonicalRecord, NewRecord};

pub const SOURCE1: &str = "source1";

/// 🏨 Maps `{id, name, address{city,country}, isAvailable, priceForNight}`.
#[derive(Debug, Clone, Default)]
pub struct Source1Mapper;

impl RecordMapper for Source1Mapper {
    fn source_name(&self) -> &str {
        SOURCE1
    }

    fn map(&self, raw: Value) -> Result<CanonicalRecord, MappingError> {
        let rec = fields_of(&raw);
        let addr = address(&rec);
        let new = NewRecord {
            source: SOURCE1.to_string(),
            external_id: external_id(&rec, SOURCE1),
            name: as_string(&rec, "name"),
            city: addr.city,
            country: addr.country,
            availability: as_bool(&rec, "isAvailable"),
            price_per_night: as_number(&rec, "priceForNight"),
            price_segment: None,
            raw,
        };
        finish(SOURCE1, new)
    }
}
