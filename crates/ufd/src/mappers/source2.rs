// ai
//! 🏩 Source 2 — flat city, `pricePerNight`, and a `priceSegment` nobody else bothers with.

use serde_json::Value;

use super::{RecordMapper, finish};
use super::extract::{as_bool, as_number, as_string, external_id, fields_of};
use crate::error::MappingError;
use crate::record::{CanonicalRecord, NewRecord};

pub const SOURCE2: &str = "source2";

#[derive(Debug, Clone, Default)]
pub struct Source2Mapper;

impl RecordMapper for Source2Mapper {
    fn source_name(&self) -> &str {
        SOURCE2
    }

    fn map(&self, raw: Value) -> Result<CanonicalRecord, MappingError> {
        let rec = fields_of(&raw);
        let new = NewRecord {
            source: SOURCE2.to_string(),
            external_id: external_id(&rec, SOURCE2),
            name: None,
            city: as_string(&rec, "city"),
            country: None,
            availability: as_bool(&rec, "availability"),
            price_per_night: as_number(&rec, "pricePerNight"),
            price_segment: as_string(&rec, "priceSegment"),
            raw,
        };
        finish(SOURCE2, new)
    }
}
