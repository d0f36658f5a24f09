// ai
//! 🏷️ Record Mappers — one translator per source, all speaking fluent [`CanonicalRecord`].
//!
//! 🎬 COLD OPEN — INT. RECEPTION DESK — TWO GUESTS ARRIVE AT ONCE
//!
//! One hands over `{"priceForNight": "100"}`. The other, `{"pricePerNight": 100}`.
//! The clerk sighs, reaches for two different phrasebooks, and writes the same
//! booking card twice. That clerk is this module.
//!
//! ## Knowledge Graph 🧠
//! - Contract: [`RecordMapper::map`] is pure. No I/O, no clocks beyond synthesized ids, no state.
//! - Field extraction is defensive ([`extract`]): wrong types become absent, never errors.
//! - The ONLY failure is a canonical-record invariant (e.g. a negative price), surfaced as
//!   [`MappingError`]. The orchestrator's mapping stage turns that into skip-and-log.
//! - Dispatch is an enum ([`MapperBackend`]) resolved from a config string via [`MapperKind`].
//!   Adding a source = one file, one variant, one match arm. 🦆

pub mod extract;
pub mod source1;
pub mod source2;

use std::str::FromStr;

use serde_json::Value;

use crate::error::{ConfigurationError, MappingError};
use crate::record::{CanonicalRecord, NewRecord};

pub use source1::Source1Mapper;
pub use source2::Source2Mapper;

/// 🔄 Convert one raw source value into a canonical record.
///
/// # Contract 📜
/// - Input: the decoded array element, owned, so it can ride along as `raw` without a clone.
/// - Output: a record with no identity (`id`, timestamps are the store's business).
/// - Never panics on weird input. Weird input produces sparse records, not crashes.
pub trait RecordMapper {
    /// 🏷️ The `source` value stamped on every record this mapper produces.
    fn source_name(&self) -> &str;

    fn map(&self, raw: Value) -> Result<CanonicalRecord, MappingError>;
}

/// 🏁 The last step of every mapper: check the invariants, then bake. Checked first so a rejected
/// record's `raw` is still here for the log preview.
pub(crate) fn finish(source_name: &str, new: NewRecord) -> Result<CanonicalRecord, MappingError> {
    let reject = |reason, raw: &Value| MappingError::InvalidRecord {
        source_name: source_name.to_string(),
        reason,
        preview: extract::preview(raw),
    };
    if let Err(reason) = new.validate() {
        return Err(reject(reason, &new.raw));
    }
    CanonicalRecord::create(new).map_err(|reason| reject(reason, &Value::Null))
}

/// 🎯 Which mapper a configured source wants, by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapperKind {
    Source1,
    Source2,
}

impl MapperKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MapperKind::Source1 => source1::SOURCE1,
            MapperKind::Source2 => source2::SOURCE2,
        }
    }
}

impl FromStr for MapperKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            source1::SOURCE1 => Ok(MapperKind::Source1),
            source2::SOURCE2 => Ok(MapperKind::Source2),
            _ => Err(ConfigurationError::UnknownMapper(s.to_string())),
        }
    }
}

/// 🎭 The many faces of a mapper. Callers hold one of these and never care which face it wears.
#[derive(Debug, Clone)]
pub enum MapperBackend {
    Source1(Source1Mapper),
    Source2(Source2Mapper),
}

impl MapperBackend {
    pub fn from_kind(kind: MapperKind) -> Self {
        match kind {
            MapperKind::Source1 => MapperBackend::Source1(Source1Mapper),
            MapperKind::Source2 => MapperBackend::Source2(Source2Mapper),
        }
    }

    pub fn kind(&self) -> MapperKind {
        match self {
            MapperBackend::Source1(_) => MapperKind::Source1,
            MapperBackend::Source2(_) => MapperKind::Source2,
        }
    }
}

impl RecordMapper for MapperBackend {
    fn source_name(&self) -> &str {
        match self {
            MapperBackend::Source1(m) => m.source_name(),
            MapperBackend::Source2(m) => m.source_name(),
        }
    }

    fn map(&self, raw: Value) -> Result<CanonicalRecord, MappingError> {
        match self {
            MapperBackend::Source1(m) => m.map(raw),
            MapperBackend::Source2(m) => m.map(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn the_one_where_config_strings_find_their_mapper() {
        assert_eq!("source1".parse::<MapperKind>(), Ok(MapperKind::Source1));
        assert_eq!(" Source2 ".parse::<MapperKind>(), Ok(MapperKind::Source2));
        assert_eq!(
            "source3".parse::<MapperKind>(),
            Err(ConfigurationError::UnknownMapper("source3".into()))
        );
    }

    #[test]
    fn the_one_where_the_enum_dispatches_to_the_right_phrasebook() {
        let raw = json!({"id": 9, "city": "Flat City", "address": {"city": "Nested City"}});

        let via_source1 = MapperBackend::from_kind(MapperKind::Source1)
            .map(raw.clone())
            .expect("💀 source1 dispatch failed");
        let via_source2 = MapperBackend::from_kind(MapperKind::Source2)
            .map(raw)
            .expect("💀 source2 dispatch failed");

        assert_eq!(via_source1.city(), Some("Nested City"));
        assert_eq!(via_source2.city(), Some("Flat City"));
        assert_eq!(MapperBackend::from_kind(MapperKind::Source2).source_name(), "source2");
        assert_eq!(MapperBackend::from_kind(MapperKind::Source1).kind().as_str(), "source1");
    }
}
