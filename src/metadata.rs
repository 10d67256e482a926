//! Write-only metadata channel for treegraph nodes.
//!
//! A `MetadataSink` is scoped to one node-function invocation. Every set call
//! is an independent fact write; there is no read-back, no batching, and no
//! retraction. Modules therefore never depend on sibling or ancestor metadata
//! ordering. Key collisions within one node resolve last-write-wins.

use crate::error::BridgeError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Character encoding tag carried by string facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Encoding {
    /// The universal default.
    Utf8,
    /// Any other encoding, carried by label (e.g. "ISO-8859-1").
    Labeled(String),
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding::Utf8
    }
}

/// Clock a time fact was calibrated against. Facts sharing a time source can
/// be correlated without assuming global clock agreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TimeSource {
    /// Implicit source: the identity of this node's own parent data. The
    /// framework resolves it to the parent content digest.
    ParentData,
    /// An explicit reference, e.g. "ntfs:$STANDARD_INFORMATION".
    Reference(String),
}

/// One typed metadata value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MetaValue {
    String { value: String, encoding: Encoding },
    Float(f64),
    Int(i64),
    Time { value: DateTime<Utc>, source: TimeSource },
}

/// Write-only typed channel for attaching facts to one node.
pub trait MetadataSink {
    /// String fact with an explicit encoding tag.
    fn set_string(&mut self, key: &str, value: &str, encoding: Encoding)
        -> Result<(), BridgeError>;

    /// High-precision real number fact.
    fn set_float(&mut self, key: &str, value: f64) -> Result<(), BridgeError>;

    /// 64-bit integer fact.
    fn set_int(&mut self, key: &str, value: i64) -> Result<(), BridgeError>;

    /// Calendar time fact with its time-source reference.
    fn set_time(
        &mut self,
        key: &str,
        value: DateTime<Utc>,
        source: TimeSource,
    ) -> Result<(), BridgeError>;
}

/// Conversion into a [`MetaValue`], fallible for types whose range exceeds
/// the 64-bit integer form. Machine-native small integers widen to i64
/// automatically so callers never pick an overload by hand.
pub trait IntoMetaValue {
    fn into_meta_value(self, key: &str) -> Result<MetaValue, BridgeError>;
}

macro_rules! widening_int_into_meta {
    ($($ty:ty),*) => {
        $(impl IntoMetaValue for $ty {
            fn into_meta_value(self, _key: &str) -> Result<MetaValue, BridgeError> {
                Ok(MetaValue::Int(i64::from(self)))
            }
        })*
    };
}

widening_int_into_meta!(i8, i16, i32, i64, u8, u16, u32);

impl IntoMetaValue for u64 {
    fn into_meta_value(self, key: &str) -> Result<MetaValue, BridgeError> {
        i64::try_from(self)
            .map(MetaValue::Int)
            .map_err(|_| BridgeError::MetaCoercion {
                key: key.to_string(),
                reason: format!("{} exceeds the 64-bit signed integer range", self),
            })
    }
}

impl IntoMetaValue for usize {
    fn into_meta_value(self, key: &str) -> Result<MetaValue, BridgeError> {
        (self as u64).into_meta_value(key)
    }
}

impl IntoMetaValue for f64 {
    fn into_meta_value(self, _key: &str) -> Result<MetaValue, BridgeError> {
        Ok(MetaValue::Float(self))
    }
}

impl IntoMetaValue for f32 {
    fn into_meta_value(self, _key: &str) -> Result<MetaValue, BridgeError> {
        Ok(MetaValue::Float(f64::from(self)))
    }
}

impl IntoMetaValue for &str {
    fn into_meta_value(self, _key: &str) -> Result<MetaValue, BridgeError> {
        Ok(MetaValue::String {
            value: self.to_string(),
            encoding: Encoding::Utf8,
        })
    }
}

impl IntoMetaValue for String {
    fn into_meta_value(self, _key: &str) -> Result<MetaValue, BridgeError> {
        Ok(MetaValue::String {
            value: self,
            encoding: Encoding::Utf8,
        })
    }
}

impl IntoMetaValue for DateTime<Utc> {
    fn into_meta_value(self, _key: &str) -> Result<MetaValue, BridgeError> {
        Ok(MetaValue::Time {
            value: self,
            source: TimeSource::ParentData,
        })
    }
}

impl IntoMetaValue for MetaValue {
    fn into_meta_value(self, _key: &str) -> Result<MetaValue, BridgeError> {
        Ok(self)
    }
}

/// Assignment-style sugar over the typed setters. `sink.set("answer", 42)`
/// forwards to the same typed write as `sink.set_int("answer", 42)`; the two
/// forms are observably identical.
pub trait MetadataSinkExt: MetadataSink {
    fn set<V: IntoMetaValue>(&mut self, key: &str, value: V) -> Result<(), BridgeError> {
        match value.into_meta_value(key)? {
            MetaValue::String { value, encoding } => self.set_string(key, &value, encoding),
            MetaValue::Float(v) => self.set_float(key, v),
            MetaValue::Int(v) => self.set_int(key, v),
            MetaValue::Time { value, source } => self.set_time(key, value, source),
        }
    }
}

impl<T: MetadataSink + ?Sized> MetadataSinkExt for T {}

/// In-memory sink collecting one node's facts, last write per key winning.
/// Insertion order of first writes is preserved for reporting.
#[derive(Debug, Default)]
pub struct MemorySink {
    facts: HashMap<String, MetaValue>,
    order: Vec<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, key: &str, value: MetaValue) {
        if self.facts.insert(key.to_string(), value).is_none() {
            self.order.push(key.to_string());
        }
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.facts.get(key)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Facts in first-write key order.
    pub fn into_facts(mut self) -> Vec<(String, MetaValue)> {
        let order = std::mem::take(&mut self.order);
        order
            .into_iter()
            .filter_map(|key| self.facts.remove(&key).map(|value| (key, value)))
            .collect()
    }
}

impl MetadataSink for MemorySink {
    fn set_string(
        &mut self,
        key: &str,
        value: &str,
        encoding: Encoding,
    ) -> Result<(), BridgeError> {
        self.record(
            key,
            MetaValue::String {
                value: value.to_string(),
                encoding,
            },
        );
        Ok(())
    }

    fn set_float(&mut self, key: &str, value: f64) -> Result<(), BridgeError> {
        self.record(key, MetaValue::Float(value));
        Ok(())
    }

    fn set_int(&mut self, key: &str, value: i64) -> Result<(), BridgeError> {
        self.record(key, MetaValue::Int(value));
        Ok(())
    }

    fn set_time(
        &mut self,
        key: &str,
        value: DateTime<Utc>,
        source: TimeSource,
    ) -> Result<(), BridgeError> {
        self.record(key, MetaValue::Time { value, source });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn last_write_wins_per_key() {
        let mut sink = MemorySink::new();
        sink.set("size", 10).unwrap();
        sink.set("size", 20).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.get("size"), Some(&MetaValue::Int(20)));
    }

    #[test]
    fn small_integers_widen_to_i64() {
        let mut sink = MemorySink::new();
        sink.set("a", 7i32).unwrap();
        sink.set("b", 7u8).unwrap();
        sink.set("c", 7u32).unwrap();
        for key in ["a", "b", "c"] {
            assert_eq!(sink.get(key), Some(&MetaValue::Int(7)));
        }
    }

    #[test]
    fn out_of_range_u64_is_a_coercion_error() {
        let mut sink = MemorySink::new();
        let err = sink.set("huge", u64::MAX).unwrap_err();
        assert!(matches!(err, BridgeError::MetaCoercion { .. }));
        assert!(sink.is_empty());
    }

    #[test]
    fn sugar_and_typed_setter_are_observably_identical() {
        let mut a = MemorySink::new();
        let mut b = MemorySink::new();
        a.set("name", "MFT").unwrap();
        b.set_string("name", "MFT", Encoding::Utf8).unwrap();
        assert_eq!(a.get("name"), b.get("name"));
    }

    #[test]
    fn string_encoding_defaults_to_utf8() {
        let mut sink = MemorySink::new();
        sink.set("label", "latin").unwrap();
        assert_eq!(
            sink.get("label"),
            Some(&MetaValue::String {
                value: "latin".to_string(),
                encoding: Encoding::Utf8,
            })
        );
    }

    #[test]
    fn time_without_reference_uses_parent_data_source() {
        let mut sink = MemorySink::new();
        let when = Utc.with_ymd_and_hms(2009, 2, 13, 23, 31, 30).unwrap();
        sink.set("mtime", when).unwrap();
        assert_eq!(
            sink.get("mtime"),
            Some(&MetaValue::Time {
                value: when,
                source: TimeSource::ParentData,
            })
        );

        sink.set_time("atime", when, TimeSource::Reference("bios-rtc".to_string()))
            .unwrap();
        assert_eq!(
            sink.get("atime"),
            Some(&MetaValue::Time {
                value: when,
                source: TimeSource::Reference("bios-rtc".to_string()),
            })
        );
    }

    #[test]
    fn first_write_order_is_preserved_in_reporting() {
        let mut sink = MemorySink::new();
        sink.set("b", 1).unwrap();
        sink.set("a", 2).unwrap();
        sink.set("b", 3).unwrap();
        let facts = sink.into_facts();
        assert_eq!(facts[0].0, "b");
        assert_eq!(facts[0].1, MetaValue::Int(3));
        assert_eq!(facts[1].0, "a");
    }
}
