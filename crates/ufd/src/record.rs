// ai
//! 📦 The Canonical Record — the one shape every source gets squeezed into.
//!
//! 🎬 COLD OPEN — INT. TWO HOTEL FEEDS — NOBODY AGREES ON ANYTHING
//!
//! Source 1 calls it `priceForNight` and nests the city in an `address`.
//! Source 2 calls it `pricePerNight` and leaves the city lying around at top level.
//! Both swear they are the standard. Neither is. This struct is.
//!
//! 🧠 Knowledge graph:
//! - Built by a `RecordMapper` through [`CanonicalRecord::create`], which enforces the invariants.
//! - Grouped into a [`Batch`] by the batcher, persisted by a `RecordStore`.
//! - `(source, external_id)` is the idempotency key: [`RecordKey`]. One stored row per key. Ever.
//! - `id`, `created_at`, `updated_at` belong to the store. Mappers never touch them.
//! - Immutable once built. The only "mutation" is [`CanonicalRecord::with_identity`], which
//!   returns a fresh copy wearing the store-assigned identity. 🦆

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::RecordError;

/// 📦 A group of records headed to the store in one `save_all` call. In-memory only.
pub type Batch = Vec<CanonicalRecord>;

/// 🔑 The natural key. Two records with the same key are the same listing, full stop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub source: String,
    pub external_id: String,
}

impl RecordKey {
    /// 🏷️ A stable, store-friendly rendering of the key, e.g. for Elasticsearch `_id`s.
    pub fn document_id(&self) -> String {
        format!("{}::{}", self.source, self.external_id)
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.source, self.external_id)
    }
}

/// 🧾 The raw ingredients for a record, before the invariants have had their say.
///
/// Mappers fill this in with whatever they could salvage and hand it to
/// [`CanonicalRecord::create`]. Everything optional is genuinely optional.
#[derive(Debug, Clone, Default)]
pub struct NewRecord {
    pub source: String,
    pub external_id: String,
    pub name: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub availability: Option<bool>,
    pub price_per_night: Option<f64>,
    pub price_segment: Option<String>,
    pub raw: Value,
}

impl NewRecord {
    /// ✅ The checks [`CanonicalRecord::create`] runs, without giving up ownership. Lets a
    /// caller still look at `raw` when the answer is no.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.source.trim().is_empty() {
            return Err(RecordError::MissingSource);
        }
        if self.external_id.trim().is_empty() {
            return Err(RecordError::MissingExternalId);
        }
        if let Some(price) = self.price_per_night {
            if !price.is_finite() || price < 0.0 {
                return Err(RecordError::InvalidPrice(price));
            }
        }
        Ok(())
    }
}

/// 🎯 One listing, normalized. The unit that gets persisted and (elsewhere) queried.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    source: String,
    external_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    availability: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    price_per_night: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    price_segment: Option<String>,
    raw: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

impl CanonicalRecord {
    /// 🏗️ Validate the ingredients and bake a record. No identity, no timestamps.
    ///
    /// # Errors
    /// 💀 [`RecordError`] when `source` or `external_id` is blank, or when the price is
    /// negative / not finite. A negative price is upstream corruption and we want it loud.
    pub fn create(new: NewRecord) -> Result<Self, RecordError> {
        new.validate()?;
        Ok(Self {
            id: None,
            source: new.source,
            external_id: new.external_id,
            name: new.name,
            city: new.city,
            country: new.country,
            availability: new.availability,
            price_per_night: new.price_per_night,
            price_segment: new.price_segment,
            raw: new.raw,
            created_at: None,
            updated_at: None,
        })
    }

    /// 🪪 Derive a copy carrying the identity and timestamps the store decided on.
    /// Business fields ride along untouched.
    pub fn with_identity(
        &self,
        id: impl Into<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            created_at: Some(created_at),
            updated_at: Some(updated_at),
            ..self.clone()
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            source: self.source.clone(),
            external_id: self.external_id.clone(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn city(&self) -> Option<&str> {
        self.city.as_deref()
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    pub fn availability(&self) -> Option<bool> {
        self.availability
    }

    pub fn price_per_night(&self) -> Option<f64> {
        self.price_per_night
    }

    pub fn price_segment(&self) -> Option<&str> {
        self.price_segment.as_deref()
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}
