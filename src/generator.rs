//! Random Value Generator
//!
//! Produces a pseudo-random instance of any primitive type on demand. The
//! generator owns its RNG and nothing else, so a seeded generator replays the
//! exact same value stream.

use crate::core::{
    ExpandedNodeId, Identifier, LocalizedText, NodeId, QualifiedName, ScalarType, Value,
};
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use rand::distr::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Signed integer widths an abstract `Integer` resolves to
const INTEGER_TYPES: [ScalarType; 4] = [
    ScalarType::SByte,
    ScalarType::Int16,
    ScalarType::Int32,
    ScalarType::Int64,
];

/// Unsigned integer widths an abstract `UInteger` resolves to
const UINTEGER_TYPES: [ScalarType; 4] = [
    ScalarType::Byte,
    ScalarType::UInt16,
    ScalarType::UInt32,
    ScalarType::UInt64,
];

/// Concrete numeric types an abstract `Number` resolves to
const NUMBER_TYPES: [ScalarType; 10] = [
    ScalarType::SByte,
    ScalarType::Byte,
    ScalarType::Int16,
    ScalarType::UInt16,
    ScalarType::Int32,
    ScalarType::UInt32,
    ScalarType::Int64,
    ScalarType::UInt64,
    ScalarType::Float,
    ScalarType::Double,
];

const LOCALES: [&str; 4] = ["en-US", "de-DE", "fr-FR", "ja-JP"];

const WORDS: [&str; 12] = [
    "pump", "valve", "boiler", "sensor", "line", "tank", "motor", "relay", "feeder", "drum",
    "mixer", "press",
];

/// Status codes a simulated `StatusCode` value is drawn from
const STATUS_CODES: [u32; 6] = [
    0x0000_0000, // Good
    0x0096_0000, // GoodLocalOverride
    0x4000_0000, // Uncertain
    0x408F_0000, // UncertainLastUsableValue
    0x8000_0000, // Bad
    0x8031_0000, // BadCommunicationError
];

/// Ten years either side of "now"
const DATE_SPREAD_SECS: i64 = 10 * 365 * 24 * 3600;

pub struct RandomValueGenerator {
    rng: StdRng,
}

impl RandomValueGenerator {
    /// Deterministic generator for reproducible runs
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    // --- Building blocks used by the dispatcher ---

    /// Raw analog reading, uniform in [0, 200]
    pub fn analog_raw(&mut self) -> u32 {
        self.rng.random_range(0..=200)
    }

    /// Array length, uniform in [1, max]
    pub fn array_len(&mut self, max: usize) -> usize {
        self.rng.random_range(1..=max.max(1))
    }

    /// Fair coin
    pub fn coin(&mut self) -> bool {
        self.rng.random_bool(0.5)
    }

    pub fn pick<T: Copy>(&mut self, items: &[T]) -> T {
        items[self.rng.random_range(0..items.len())]
    }

    // --- Primitives ---

    pub fn boolean(&mut self) -> bool {
        self.rng.random()
    }

    pub fn float(&mut self) -> f32 {
        self.rng.random_range(-1.0e6..=1.0e6)
    }

    pub fn double(&mut self) -> f64 {
        self.rng.random_range(-1.0e9..=1.0e9)
    }

    pub fn string(&mut self) -> String {
        let len = self.rng.random_range(1..=24);
        (&mut self.rng)
            .sample_iter(Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    pub fn date_time(&mut self) -> DateTime<Utc> {
        let offset = self.rng.random_range(-DATE_SPREAD_SECS..=DATE_SPREAD_SECS);
        Utc::now() + TimeDelta::seconds(offset)
    }

    pub fn guid(&mut self) -> uuid::Uuid {
        uuid::Uuid::from_bytes(self.rng.random())
    }

    pub fn byte_string(&mut self) -> Bytes {
        let len = self.rng.random_range(0..=64);
        let mut buf = vec![0u8; len];
        self.rng.fill(&mut buf[..]);
        Bytes::from(buf)
    }

    pub fn xml_element(&mut self) -> String {
        let word = self.pick(&WORDS);
        format!("<{word} value=\"{}\"/>", self.rng.random_range(0..10_000))
    }

    pub fn node_id(&mut self) -> NodeId {
        let namespace = self.rng.random_range(0..=5);
        let identifier = match self.rng.random_range(0..4) {
            0 => Identifier::Numeric(self.rng.random()),
            1 => Identifier::String(self.string()),
            2 => Identifier::Guid(self.guid()),
            _ => Identifier::Opaque(self.byte_string()),
        };
        NodeId {
            namespace,
            identifier,
        }
    }

    pub fn expanded_node_id(&mut self) -> ExpandedNodeId {
        let node_id = self.node_id();
        let namespace_uri = self
            .coin()
            .then(|| format!("urn:via:pointsim:{}", self.pick(&WORDS)));
        ExpandedNodeId {
            node_id,
            namespace_uri,
            server_index: self.rng.random_range(0..=2),
        }
    }

    pub fn status_code(&mut self) -> u32 {
        self.pick(&STATUS_CODES)
    }

    pub fn qualified_name(&mut self) -> QualifiedName {
        QualifiedName {
            namespace: self.rng.random_range(0..=5),
            name: self.phrase(),
        }
    }

    pub fn localized_text(&mut self) -> LocalizedText {
        LocalizedText {
            locale: self.pick(&LOCALES).to_string(),
            text: self.phrase(),
        }
    }

    pub fn enumeration(&mut self) -> i32 {
        self.rng.random_range(0..=3)
    }

    fn phrase(&mut self) -> String {
        let count = self.rng.random_range(1..=3);
        let words: Vec<&str> = (0..count).map(|_| self.pick(&WORDS)).collect();
        words.join(" ")
    }

    /// Plain value of `data_type`; abstract types resolve to a random
    /// concrete member first.
    pub fn scalar(&mut self, data_type: ScalarType) -> Value {
        match data_type {
            ScalarType::Boolean => Value::Boolean(self.boolean()),
            ScalarType::SByte => Value::SByte(self.rng.random()),
            ScalarType::Byte => Value::Byte(self.rng.random()),
            ScalarType::Int16 => Value::Int16(self.rng.random()),
            ScalarType::UInt16 => Value::UInt16(self.rng.random()),
            ScalarType::Int32 => Value::Int32(self.rng.random()),
            ScalarType::UInt32 => Value::UInt32(self.rng.random()),
            ScalarType::Int64 => Value::Int64(self.rng.random()),
            ScalarType::UInt64 => Value::UInt64(self.rng.random()),
            ScalarType::Float => Value::Float(self.float()),
            ScalarType::Double => Value::Double(self.double()),
            ScalarType::String => Value::String(self.string()),
            ScalarType::DateTime => Value::DateTime(self.date_time()),
            ScalarType::Guid => Value::Guid(self.guid()),
            ScalarType::ByteString => Value::ByteString(self.byte_string()),
            ScalarType::XmlElement => Value::XmlElement(self.xml_element()),
            ScalarType::NodeId => Value::NodeId(self.node_id()),
            ScalarType::ExpandedNodeId => Value::ExpandedNodeId(self.expanded_node_id()),
            ScalarType::StatusCode => Value::StatusCode(self.status_code()),
            ScalarType::QualifiedName => Value::QualifiedName(self.qualified_name()),
            ScalarType::LocalizedText => Value::LocalizedText(self.localized_text()),
            ScalarType::Variant => {
                // Any concrete type except Variant itself
                let inner = self.pick(&ScalarType::ALL[..ScalarType::Variant.index() as usize]);
                Value::Variant(Box::new(self.scalar(inner)))
            }
            ScalarType::Enumeration => Value::Enumeration(self.enumeration()),
            ScalarType::Number => {
                let inner = self.pick(&NUMBER_TYPES);
                self.scalar(inner)
            }
            ScalarType::Integer => {
                let inner = self.pick(&INTEGER_TYPES);
                self.scalar(inner)
            }
            ScalarType::UInteger => {
                let inner = self.pick(&UINTEGER_TYPES);
                self.scalar(inner)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_generators_agree() {
        let mut a = RandomValueGenerator::new(42);
        let mut b = RandomValueGenerator::new(42);
        for data_type in ScalarType::ALL {
            if data_type == ScalarType::DateTime {
                // anchored to the wall clock
                continue;
            }
            assert_eq!(a.scalar(data_type), b.scalar(data_type));
        }
    }

    #[test]
    fn test_concrete_scalars_keep_their_type() {
        let mut generator = RandomValueGenerator::new(1);
        for data_type in ScalarType::ALL.iter().copied().filter(|t| t.is_concrete()) {
            let value = generator.scalar(data_type);
            assert_eq!(value.scalar_type(), Some(data_type));
        }
    }

    #[test]
    fn test_abstract_types_resolve_to_members() {
        let mut generator = RandomValueGenerator::new(9);
        for _ in 0..200 {
            let integer = generator.scalar(ScalarType::Integer).scalar_type().unwrap();
            assert!(INTEGER_TYPES.contains(&integer));

            let unsigned = generator.scalar(ScalarType::UInteger).scalar_type().unwrap();
            assert!(UINTEGER_TYPES.contains(&unsigned));

            let number = generator.scalar(ScalarType::Number);
            assert!(number.as_f64().is_some());

            match generator.scalar(ScalarType::Variant) {
                Value::Variant(inner) => assert!(!matches!(*inner, Value::Variant(_))),
                other => panic!("expected variant, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_building_block_ranges() {
        let mut generator = RandomValueGenerator::new(3);
        for _ in 0..1000 {
            assert!(generator.analog_raw() <= 200);
            let len = generator.array_len(10);
            assert!((1..=10).contains(&len));
            assert!((0..=3).contains(&generator.enumeration()));
        }
    }
}
