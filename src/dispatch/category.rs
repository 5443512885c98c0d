//! Point categories and their integer tags
//!
//! Tags are laid out in blocks of 1000 per family; the element type index is
//! added to the block base. Composites live in the 9000 block, their arrays
//! at 9100.

use crate::core::ScalarType;
use serde::{Deserialize, Serialize};

const SCALAR_BASE: u32 = 1000;
const ANALOG_SCALAR_BASE: u32 = 2000;
const ARRAY_BASE: u32 = 3000;
const ANALOG_ARRAY_BASE: u32 = 4000;
const USER_SCALAR_BASE: u32 = 5000;
const USER_ARRAY_BASE: u32 = 6000;
const COMPOSITE_BASE: u32 = 9000;
const COMPOSITE_ARRAY_BASE: u32 = 9100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompositeKind {
    Vector = 1,
    VectorUnion = 2,
    VectorWithOptionalFields = 3,
    MultipleVectors = 4,
    ScalarStructure = 5,
    ArrayStructure = 6,
}

impl CompositeKind {
    pub const ALL: [CompositeKind; 6] = [
        CompositeKind::Vector,
        CompositeKind::VectorUnion,
        CompositeKind::VectorWithOptionalFields,
        CompositeKind::MultipleVectors,
        CompositeKind::ScalarStructure,
        CompositeKind::ArrayStructure,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.code() == code)
    }
}

/// Engineering-unit range of an analog category
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EuRange {
    pub low: f64,
    pub high: f64,
}

impl EuRange {
    /// Signed analog readings: raw - 100
    pub const SIGNED: EuRange = EuRange {
        low: -100.0,
        high: 100.0,
    };
    /// Unsigned analog readings: raw + 50
    pub const UNSIGNED: EuRange = EuRange {
        low: 50.0,
        high: 250.0,
    };

    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }
}

/// Generation rule selector of a point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Scalar(ScalarType),
    AnalogScalar(ScalarType),
    Array(ScalarType),
    AnalogArray(ScalarType),
    UserScalar(ScalarType),
    UserArray(ScalarType),
    Composite(CompositeKind),
    CompositeArray(CompositeKind),
}

impl Category {
    pub fn tag(self) -> u32 {
        match self {
            Category::Scalar(t) => SCALAR_BASE + t.index(),
            Category::AnalogScalar(t) => ANALOG_SCALAR_BASE + t.index(),
            Category::Array(t) => ARRAY_BASE + t.index(),
            Category::AnalogArray(t) => ANALOG_ARRAY_BASE + t.index(),
            Category::UserScalar(t) => USER_SCALAR_BASE + t.index(),
            Category::UserArray(t) => USER_ARRAY_BASE + t.index(),
            Category::Composite(k) => COMPOSITE_BASE + k.code(),
            Category::CompositeArray(k) => COMPOSITE_ARRAY_BASE + k.code(),
        }
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        let element = || ScalarType::from_index(tag % 1000);
        let category = match tag / 1000 * 1000 {
            SCALAR_BASE => Category::Scalar(element()?),
            ANALOG_SCALAR_BASE => Category::AnalogScalar(element()?),
            ARRAY_BASE => Category::Array(element()?),
            ANALOG_ARRAY_BASE => Category::AnalogArray(element()?),
            USER_SCALAR_BASE => Category::UserScalar(element()?),
            USER_ARRAY_BASE => Category::UserArray(element()?),
            COMPOSITE_BASE if tag >= COMPOSITE_ARRAY_BASE => {
                Category::CompositeArray(CompositeKind::from_code(tag - COMPOSITE_ARRAY_BASE)?)
            }
            COMPOSITE_BASE => Category::Composite(CompositeKind::from_code(tag - COMPOSITE_BASE)?),
            _ => return None,
        };
        category.is_valid().then_some(category)
    }

    /// Analog families take numeric elements only; user-defined families
    /// alias concrete types only.
    pub fn is_valid(self) -> bool {
        match self {
            Category::Scalar(_) | Category::Array(_) => true,
            Category::AnalogScalar(t) | Category::AnalogArray(t) => t.is_numeric(),
            Category::UserScalar(t) | Category::UserArray(t) => t.is_concrete(),
            Category::Composite(_) | Category::CompositeArray(_) => true,
        }
    }

    /// Every valid category, family by family.
    pub fn all() -> Vec<Category> {
        let families: [fn(ScalarType) -> Category; 6] = [
            Category::Scalar,
            Category::AnalogScalar,
            Category::Array,
            Category::AnalogArray,
            Category::UserScalar,
            Category::UserArray,
        ];
        let mut all: Vec<Category> = families
            .iter()
            .flat_map(|family| ScalarType::ALL.iter().map(move |t| family(*t)))
            .filter(|c| c.is_valid())
            .collect();
        all.extend(CompositeKind::ALL.iter().map(|k| Category::Composite(*k)));
        all.extend(CompositeKind::ALL.iter().map(|k| Category::CompositeArray(*k)));
        all
    }

    pub fn element_type(self) -> Option<ScalarType> {
        match self {
            Category::Scalar(t)
            | Category::AnalogScalar(t)
            | Category::Array(t)
            | Category::AnalogArray(t)
            | Category::UserScalar(t)
            | Category::UserArray(t) => Some(t),
            Category::Composite(_) | Category::CompositeArray(_) => None,
        }
    }

    /// Single-valued scalar families; only these can be historized.
    pub fn is_scalar_rank(self) -> bool {
        matches!(
            self,
            Category::Scalar(_) | Category::AnalogScalar(_) | Category::UserScalar(_)
        )
    }

    pub fn eu_range(self) -> Option<EuRange> {
        match self {
            Category::AnalogScalar(t) | Category::AnalogArray(t) => Some(if t.is_unsigned() {
                EuRange::UNSIGNED
            } else {
                EuRange::SIGNED
            }),
            _ => None,
        }
    }

    /// Browse-style name, e.g. `AnalogArray_UInt16` or `VectorUnionArray`.
    pub fn name(self) -> String {
        match self {
            Category::Scalar(t) => format!("Scalar_{t:?}"),
            Category::AnalogScalar(t) => format!("AnalogScalar_{t:?}"),
            Category::Array(t) => format!("Array_{t:?}"),
            Category::AnalogArray(t) => format!("AnalogArray_{t:?}"),
            Category::UserScalar(t) => format!("UserScalar_{t:?}"),
            Category::UserArray(t) => format!("UserArray_{t:?}"),
            Category::Composite(k) => format!("{k:?}"),
            Category::CompositeArray(k) => format!("{k:?}Array"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_category_round_trips_its_tag() {
        for category in Category::all() {
            assert_eq!(Category::from_tag(category.tag()), Some(category), "{category:?}");
        }
    }

    #[test]
    fn test_catalogue_size() {
        // 26 + 13 + 26 + 13 + 22 + 22 + 6 + 6
        assert_eq!(Category::all().len(), 134);
    }

    #[test]
    fn test_invalid_tags_are_unknown() {
        assert_eq!(Category::from_tag(0), None);
        assert_eq!(Category::from_tag(1026), None);
        // analog string
        assert_eq!(Category::from_tag(ANALOG_SCALAR_BASE + ScalarType::String.index()), None);
        // user-defined abstract type
        assert_eq!(Category::from_tag(USER_SCALAR_BASE + ScalarType::Number.index()), None);
        assert_eq!(Category::from_tag(9000), None);
        assert_eq!(Category::from_tag(9007), None);
        assert_eq!(Category::from_tag(9199), None);
        assert_eq!(Category::from_tag(7005), None);
    }

    #[test]
    fn test_eu_ranges_follow_signedness() {
        assert_eq!(
            Category::AnalogScalar(ScalarType::Byte).eu_range(),
            Some(EuRange::UNSIGNED)
        );
        assert_eq!(
            Category::AnalogArray(ScalarType::Double).eu_range(),
            Some(EuRange::SIGNED)
        );
        assert_eq!(Category::Scalar(ScalarType::Int32).eu_range(), None);
    }
}
