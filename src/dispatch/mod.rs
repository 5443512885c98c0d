//! Value Dispatcher
//!
//! Maps a point's category tag to its generation rule:
//! - **plain scalar**: delegate to the primitive generator
//! - **analog scalar**: uniform raw reading in [0, 200] shifted into the EU range
//! - **arrays**: 1-100 elements (1-10 for composite elements)
//! - **composites**: vectors, tagged unions, optional-field vectors and
//!   structures, generated recursively
//!
//! Rules are looked up in a table keyed by [`Category`]; a tag that does not
//! decode to a category yields no value.

pub mod category;
mod composite;

pub use category::{Category, CompositeKind, EuRange};

use crate::core::{Point, PointId, ScalarType, Value, lock_unpoisoned};
use crate::error::{Result, SimError};
use crate::generator::RandomValueGenerator;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::trace;

/// Longest array generated for scalar element types
pub const MAX_SCALAR_ARRAY_LEN: usize = 100;
/// Longest array generated for composite element types
pub const MAX_COMPOSITE_ARRAY_LEN: usize = 10;

type Strategy = fn(&mut RandomValueGenerator, Category) -> Option<Value>;

static STRATEGIES: Lazy<HashMap<Category, Strategy>> = Lazy::new(|| {
    Category::all()
        .into_iter()
        .map(|category| (category, strategy_for(category)))
        .collect()
});

fn strategy_for(category: Category) -> Strategy {
    match category {
        Category::Scalar(_) | Category::UserScalar(_) => plain_scalar,
        Category::AnalogScalar(_) => analog_scalar,
        Category::Array(_) | Category::UserArray(_) => scalar_array,
        Category::AnalogArray(_) => analog_array,
        Category::Composite(_) => composite_value,
        Category::CompositeArray(_) => composite_array,
    }
}

fn plain_scalar(generator: &mut RandomValueGenerator, category: Category) -> Option<Value> {
    let data_type = category.element_type()?;
    Some(generator.scalar(data_type))
}

fn analog_scalar(generator: &mut RandomValueGenerator, category: Category) -> Option<Value> {
    analog_value(generator, category.element_type()?)
}

fn scalar_array(generator: &mut RandomValueGenerator, category: Category) -> Option<Value> {
    let data_type = category.element_type()?;
    let len = generator.array_len(MAX_SCALAR_ARRAY_LEN);
    Some(Value::Array(
        (0..len).map(|_| generator.scalar(data_type)).collect(),
    ))
}

fn analog_array(generator: &mut RandomValueGenerator, category: Category) -> Option<Value> {
    let data_type = category.element_type()?;
    let len = generator.array_len(MAX_SCALAR_ARRAY_LEN);
    let items = (0..len)
        .map(|_| analog_value(generator, data_type))
        .collect::<Option<Vec<_>>>()?;
    Some(Value::Array(items))
}

fn composite_value(generator: &mut RandomValueGenerator, category: Category) -> Option<Value> {
    match category {
        Category::Composite(kind) => Some(composite::composite(generator, kind)),
        _ => None,
    }
}

fn composite_array(generator: &mut RandomValueGenerator, category: Category) -> Option<Value> {
    match category {
        Category::CompositeArray(kind) => Some(Value::Array(composite::repeat(generator, |g| {
            composite::composite(g, kind)
        }))),
        _ => None,
    }
}

/// Simulated sensor reading: `raw - 100` for signed targets, `raw + 50` for
/// unsigned ones.
fn analog_value(generator: &mut RandomValueGenerator, data_type: ScalarType) -> Option<Value> {
    let raw = generator.analog_raw() as i64;
    let reading = if data_type.is_unsigned() {
        raw + 50
    } else {
        raw - 100
    };
    let value = match data_type {
        ScalarType::Float => Value::Float(reading as f32),
        ScalarType::Double | ScalarType::Number => Value::Double(reading as f64),
        ScalarType::Integer => Value::Int64(reading),
        ScalarType::UInteger => Value::UInt64(reading as u64),
        other => Value::integer(other, reading)?,
    };
    Some(value)
}

/// Produces values for points by category
pub struct ValueDispatcher {
    generator: Mutex<RandomValueGenerator>,
}

impl ValueDispatcher {
    pub fn new(generator: RandomValueGenerator) -> Self {
        Self {
            generator: Mutex::new(generator),
        }
    }

    /// Seeded dispatcher, or entropy-seeded when `seed` is `None`
    pub fn from_seed(seed: Option<u64>) -> Self {
        Self::new(match seed {
            Some(seed) => RandomValueGenerator::new(seed),
            None => RandomValueGenerator::from_entropy(),
        })
    }

    /// Fresh value for `point`, `None` when its tag is not generatable here.
    pub fn generate(&self, point: &Point) -> Option<Value> {
        self.generate_tag(point.tag())
    }

    pub fn generate_tag(&self, tag: u32) -> Option<Value> {
        match Category::from_tag(tag) {
            Some(category) => self.generate_category(category),
            None => {
                trace!(tag, "Category not generatable");
                None
            }
        }
    }

    pub fn generate_category(&self, category: Category) -> Option<Value> {
        let strategy = STRATEGIES.get(&category)?;
        let mut generator = lock_unpoisoned(&self.generator);
        strategy(&mut *generator, category)
    }
}

// ============================================================================
// Write validation
// ============================================================================

/// Check that `value` may be written to a point of `category`.
///
/// The value's shape has to match the category; analog categories also
/// require every reading to lie within the EU range.
pub fn validate_write(point: &PointId, category: Category, value: &Value) -> Result<()> {
    let mismatch = || SimError::TypeMismatch {
        point: point.clone(),
        expected: category.name(),
    };

    let readings: Vec<&Value> = match category {
        Category::Scalar(t) | Category::UserScalar(t) | Category::AnalogScalar(t) => {
            if !scalar_matches(t, value) {
                return Err(mismatch());
            }
            vec![value]
        }
        Category::Array(t) | Category::UserArray(t) | Category::AnalogArray(t) => {
            let items = value.as_array().ok_or_else(mismatch)?;
            if !items.iter().all(|item| scalar_matches(t, item)) {
                return Err(mismatch());
            }
            items.iter().collect()
        }
        Category::Composite(kind) => {
            if !composite_matches(kind, value) {
                return Err(mismatch());
            }
            Vec::new()
        }
        Category::CompositeArray(kind) => {
            let items = value.as_array().ok_or_else(mismatch)?;
            if !items.iter().all(|item| composite_matches(kind, item)) {
                return Err(mismatch());
            }
            Vec::new()
        }
    };

    if let Some(range) = category.eu_range() {
        for reading in readings {
            let numeric = reading.as_f64().ok_or_else(mismatch)?;
            if !range.contains(numeric) {
                return Err(SimError::OutOfRange {
                    point: point.clone(),
                    value: numeric,
                    low: range.low,
                    high: range.high,
                });
            }
        }
    }
    Ok(())
}

fn scalar_matches(data_type: ScalarType, value: &Value) -> bool {
    match data_type {
        ScalarType::Variant => value.scalar_type().is_some(),
        ScalarType::Number => value.as_f64().is_some(),
        ScalarType::Integer => matches!(
            value,
            Value::SByte(_) | Value::Int16(_) | Value::Int32(_) | Value::Int64(_)
        ),
        ScalarType::UInteger => matches!(
            value,
            Value::Byte(_) | Value::UInt16(_) | Value::UInt32(_) | Value::UInt64(_)
        ),
        other => value.scalar_type() == Some(other),
    }
}

fn composite_matches(kind: CompositeKind, value: &Value) -> bool {
    matches!(
        (kind, value),
        (CompositeKind::Vector, Value::Vector(_))
            | (CompositeKind::VectorUnion, Value::VectorUnion(_))
            | (
                CompositeKind::VectorWithOptionalFields,
                Value::VectorWithOptionalFields(_)
            )
            | (CompositeKind::MultipleVectors, Value::MultipleVectors(_))
            | (CompositeKind::ScalarStructure, Value::ScalarStructure(_))
            | (CompositeKind::ArrayStructure, Value::ArrayStructure(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> ValueDispatcher {
        ValueDispatcher::from_seed(Some(2024))
    }

    #[test]
    fn test_every_category_generates() {
        let dispatcher = dispatcher();
        for category in Category::all() {
            let value = dispatcher
                .generate_tag(category.tag())
                .unwrap_or_else(|| panic!("{category:?} produced no value"));
            let id = PointId::new(category.name());
            // generated values always pass write validation
            validate_write(&id, category, &value).unwrap();
        }
    }

    #[test]
    fn test_unknown_tag_yields_nothing() {
        let dispatcher = dispatcher();
        assert!(dispatcher.generate_tag(0).is_none());
        assert!(dispatcher.generate_tag(8_000).is_none());
        assert!(dispatcher.generate(&Point::new("orphan", 42)).is_none());
    }

    #[test]
    fn test_analog_transform_bounds() {
        let dispatcher = dispatcher();
        for _ in 0..2_000 {
            let unsigned = dispatcher
                .generate_category(Category::AnalogScalar(ScalarType::Byte))
                .unwrap();
            let v = unsigned.as_f64().unwrap();
            assert!((50.0..=250.0).contains(&v), "{v}");

            let signed = dispatcher
                .generate_category(Category::AnalogScalar(ScalarType::SByte))
                .unwrap();
            let v = signed.as_f64().unwrap();
            assert!((-100.0..=100.0).contains(&v), "{v}");
        }
    }

    #[test]
    fn test_abstract_analog_types_map_to_wide_types() {
        let dispatcher = dispatcher();
        assert!(matches!(
            dispatcher.generate_category(Category::AnalogScalar(ScalarType::Number)),
            Some(Value::Double(_))
        ));
        assert!(matches!(
            dispatcher.generate_category(Category::AnalogScalar(ScalarType::Integer)),
            Some(Value::Int64(_))
        ));
        assert!(matches!(
            dispatcher.generate_category(Category::AnalogScalar(ScalarType::UInteger)),
            Some(Value::UInt64(_))
        ));
    }

    #[test]
    fn test_write_out_of_range_rejected() {
        let id = PointId::new("AnalogScalar_UInt16");
        let category = Category::AnalogScalar(ScalarType::UInt16);
        assert!(validate_write(&id, category, &Value::UInt16(250)).is_ok());
        let err = validate_write(&id, category, &Value::UInt16(251)).unwrap_err();
        assert!(matches!(err, SimError::OutOfRange { high, .. } if high == 250.0));

        let array = Category::AnalogArray(ScalarType::Int32);
        let values = Value::Array(vec![Value::Int32(0), Value::Int32(-101)]);
        assert!(matches!(
            validate_write(&id, array, &values),
            Err(SimError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_write_wrong_shape_rejected() {
        let id = PointId::new("Scalar_Int32");
        assert!(matches!(
            validate_write(&id, Category::Scalar(ScalarType::Int32), &Value::Double(1.0)),
            Err(SimError::TypeMismatch { .. })
        ));
        assert!(matches!(
            validate_write(&id, Category::Array(ScalarType::Int32), &Value::Int32(1)),
            Err(SimError::TypeMismatch { .. })
        ));
        assert!(validate_write(
            &id,
            Category::Scalar(ScalarType::Variant),
            &Value::String("anything".into())
        )
        .is_ok());
    }
}
