//! Event mapping registry.
//!
//! The host app writes one full-replacement registry document into the
//! store before monitoring starts. It maps every armed event identifier to
//! the tracked entity it belongs to, and records the configuration
//! generation plus the instant monitoring was (re)armed. The engine only
//! ever reads it.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::store::{keys, KvStore};

/// Parsed form of an event identifier: `app<slot>-min<minutes>-gen<generation>`.
///
/// The slot is the monitored selection index, minutes the threshold the
/// event fires at, and generation the configuration epoch that armed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventKey {
    pub slot: u32,
    pub threshold_minutes: u32,
    pub generation: u32,
}

impl EventKey {
    /// Parse an event identifier. Returns `None` for anything that does
    /// not match the `app<slot>-min<minutes>-gen<generation>` shape.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split('-');
        let slot = parts.next()?.strip_prefix("app")?.parse().ok()?;
        let threshold_minutes = parts.next()?.strip_prefix("min")?.parse().ok()?;
        let generation = parts.next()?.strip_prefix("gen")?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            slot,
            threshold_minutes,
            generation,
        })
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "app{}-min{}-gen{}",
            self.slot, self.threshold_minutes, self.generation
        )
    }
}

/// One registry entry: the tracked entity behind an event identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMapping {
    /// Stable entity id; survives the host re-selecting the same app.
    pub logical_id: String,
    pub display_name: String,
    #[serde(default)]
    pub category: String,
    /// Points granted per accumulated minute. Zero for gated entities
    /// that are only monitored for their own consumption.
    #[serde(default)]
    pub reward_rate_per_minute: u32,
    /// Cumulative session seconds at which this event fires.
    pub threshold_seconds: u64,
}

/// The full-replacement registry document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryDoc {
    /// Current configuration generation. Events armed under an older
    /// generation are discarded.
    pub generation: u32,
    /// When the host last (re)armed monitoring. Drives the restart guard.
    #[serde(default)]
    pub armed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub mappings: HashMap<String, EventMapping>,
}

impl RegistryDoc {
    /// Resolve an event identifier to its mapping.
    ///
    /// # Errors
    /// [`EngineError::StaleGeneration`] when the identifier carries a
    /// superseded generation, [`EngineError::MappingMissing`] when it is
    /// unparseable or unknown.
    pub fn resolve(&self, event_id: &str) -> Result<&EventMapping> {
        let key = EventKey::parse(event_id).ok_or_else(|| EngineError::MappingMissing {
            event_id: event_id.to_string(),
        })?;
        if key.generation < self.generation {
            return Err(EngineError::StaleGeneration {
                event_id: event_id.to_string(),
                event_generation: key.generation,
                current_generation: self.generation,
            });
        }
        self.mappings
            .get(event_id)
            .ok_or_else(|| EngineError::MappingMissing {
                event_id: event_id.to_string(),
            })
    }

    /// Check document consistency before it is trusted.
    pub fn validate(&self) -> Result<()> {
        for (event_id, mapping) in &self.mappings {
            if EventKey::parse(event_id).is_none() {
                return Err(decode_error(format!(
                    "mapping key '{event_id}' is not a valid event identifier"
                )));
            }
            if mapping.logical_id.is_empty() {
                return Err(decode_error(format!(
                    "mapping '{event_id}' has an empty logical_id"
                )));
            }
            if mapping.threshold_seconds == 0 {
                return Err(decode_error(format!(
                    "mapping '{event_id}' has threshold_seconds = 0"
                )));
            }
        }
        Ok(())
    }
}

fn decode_error(message: String) -> EngineError {
    EngineError::ConfigDecode {
        document: "registry",
        message,
    }
}

/// Load the registry document from the store.
///
/// Returns `Ok(None)` when the host has not written one yet.
///
/// # Errors
/// [`EngineError::ConfigDecode`] when the stored document is corrupt.
pub fn load(store: &KvStore) -> Result<Option<RegistryDoc>> {
    let Some(raw) = store.get_string(keys::REGISTRY)? else {
        return Ok(None);
    };
    let doc: RegistryDoc =
        serde_json::from_str(&raw).map_err(|e| decode_error(e.to_string()))?;
    doc.validate()?;
    Ok(Some(doc))
}

/// Write a registry document (host side; the engine never mutates it).
pub fn save(store: &KvStore, doc: &RegistryDoc) -> Result<()> {
    doc.validate()?;
    store.put_json(keys::REGISTRY, doc)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with(event_id: &str, generation: u32) -> RegistryDoc {
        let mut mappings = HashMap::new();
        mappings.insert(
            event_id.to_string(),
            EventMapping {
                logical_id: "duolingo".into(),
                display_name: "Duolingo".into(),
                category: "learning".into(),
                reward_rate_per_minute: 10,
                threshold_seconds: 60,
            },
        );
        RegistryDoc {
            generation,
            armed_at: None,
            mappings,
        }
    }

    #[test]
    fn test_event_key_parse() {
        let key = EventKey::parse("app3-min5-gen2").unwrap();
        assert_eq!(key.slot, 3);
        assert_eq!(key.threshold_minutes, 5);
        assert_eq!(key.generation, 2);
        assert_eq!(key.to_string(), "app3-min5-gen2");
    }

    #[test]
    fn test_event_key_rejects_malformed() {
        assert!(EventKey::parse("").is_none());
        assert!(EventKey::parse("app3-min5").is_none());
        assert!(EventKey::parse("app3-min5-gen2-extra").is_none());
        assert!(EventKey::parse("appX-min5-gen2").is_none());
        assert!(EventKey::parse("slot3-min5-gen2").is_none());
    }

    #[test]
    fn test_resolve_known_event() {
        let doc = doc_with("app0-min1-gen1", 1);
        let mapping = doc.resolve("app0-min1-gen1").unwrap();
        assert_eq!(mapping.logical_id, "duolingo");
    }

    #[test]
    fn test_resolve_stale_generation() {
        let doc = doc_with("app0-min1-gen1", 2);
        let err = doc.resolve("app0-min1-gen1").unwrap_err();
        assert!(matches!(err, EngineError::StaleGeneration { .. }));
    }

    #[test]
    fn test_resolve_unknown_event() {
        let doc = doc_with("app0-min1-gen1", 1);
        let err = doc.resolve("app9-min1-gen1").unwrap_err();
        assert!(matches!(err, EngineError::MappingMissing { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let mut doc = doc_with("app0-min1-gen1", 1);
        doc.mappings.get_mut("app0-min1-gen1").unwrap().threshold_seconds = 0;
        assert!(matches!(
            doc.validate().unwrap_err(),
            EngineError::ConfigDecode { .. }
        ));
    }

    #[test]
    fn test_load_missing_and_corrupt() {
        let store = KvStore::open_memory().unwrap();
        assert!(load(&store).unwrap().is_none());

        store.set_string(keys::REGISTRY, "{broken").unwrap();
        assert!(matches!(
            load(&store).unwrap_err(),
            EngineError::ConfigDecode { .. }
        ));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let store = KvStore::open_memory().unwrap();
        let doc = doc_with("app0-min1-gen1", 1);
        save(&store, &doc).unwrap();
        let loaded = load(&store).unwrap().unwrap();
        assert_eq!(loaded.generation, 1);
        assert!(loaded.mappings.contains_key("app0-min1-gen1"));
    }
}
