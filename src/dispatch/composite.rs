//! Composite ("vector") value generation

use super::MAX_COMPOSITE_ARRAY_LEN;
use super::category::CompositeKind;
use crate::core::{
    ArrayField, ArrayStructure, MultipleVectors, ScalarStructure, ScalarType, StructureField,
    Value, Vector, VectorUnion, VectorUnionField, VectorWithOptionalFields,
};
use crate::generator::RandomValueGenerator;

/// Deepest nesting of a scalar structure inside another one
const MAX_STRUCTURE_DEPTH: usize = 1;

pub(crate) fn composite(generator: &mut RandomValueGenerator, kind: CompositeKind) -> Value {
    match kind {
        CompositeKind::Vector => Value::Vector(vector(generator)),
        CompositeKind::VectorUnion => Value::VectorUnion(vector_union(generator)),
        CompositeKind::VectorWithOptionalFields => {
            Value::VectorWithOptionalFields(vector_with_optional_fields(generator))
        }
        CompositeKind::MultipleVectors => {
            Value::MultipleVectors(Box::new(multiple_vectors(generator)))
        }
        CompositeKind::ScalarStructure => {
            Value::ScalarStructure(Box::new(scalar_structure(generator, 0)))
        }
        CompositeKind::ArrayStructure => {
            Value::ArrayStructure(Box::new(array_structure(generator)))
        }
    }
}

pub(crate) fn vector(generator: &mut RandomValueGenerator) -> Vector {
    Vector {
        x: generator.double(),
        y: generator.double(),
        z: generator.double(),
    }
}

pub(crate) fn vector_union(generator: &mut RandomValueGenerator) -> VectorUnion {
    let switch_field = generator.pick(&VectorUnionField::ALL);
    VectorUnion {
        switch_field,
        x: generator.double(),
        y: generator.double(),
        z: generator.double(),
    }
}

pub(crate) fn vector_with_optional_fields(
    generator: &mut RandomValueGenerator,
) -> VectorWithOptionalFields {
    let mut encoding_mask = 0;
    for bit in [
        VectorWithOptionalFields::X_PRESENT,
        VectorWithOptionalFields::Y_PRESENT,
        VectorWithOptionalFields::Z_PRESENT,
    ] {
        if generator.coin() {
            encoding_mask |= bit;
        }
    }
    VectorWithOptionalFields {
        encoding_mask,
        x: generator.double(),
        y: generator.double(),
        z: generator.double(),
    }
}

pub(crate) fn multiple_vectors(generator: &mut RandomValueGenerator) -> MultipleVectors {
    MultipleVectors {
        vector: vector(generator),
        vector_union: vector_union(generator),
        vector_with_optional_fields: vector_with_optional_fields(generator),
        vector_array: repeat(generator, vector),
        vector_union_array: repeat(generator, vector_union),
        vector_with_optional_fields_array: repeat(generator, vector_with_optional_fields),
    }
}

pub(crate) fn scalar_structure(generator: &mut RandomValueGenerator, depth: usize) -> ScalarStructure {
    let fields = ScalarType::ALL
        .iter()
        .map(|&data_type| StructureField {
            data_type,
            value: generator.scalar(data_type),
        })
        .collect();
    let nested = (depth < MAX_STRUCTURE_DEPTH)
        .then(|| Box::new(scalar_structure(generator, depth + 1)));
    ScalarStructure {
        fields,
        nested,
        arrays: array_structure(generator),
    }
}

pub(crate) fn array_structure(generator: &mut RandomValueGenerator) -> ArrayStructure {
    let fields = ScalarType::ALL
        .iter()
        .copied()
        .filter(|t| t.is_concrete())
        .map(|data_type| ArrayField {
            data_type,
            values: repeat(&mut *generator, |g| g.scalar(data_type)),
        })
        .collect();
    ArrayStructure { fields }
}

/// Composite array of length [1, 10]
pub(crate) fn repeat<T>(
    generator: &mut RandomValueGenerator,
    mut element: impl FnMut(&mut RandomValueGenerator) -> T,
) -> Vec<T> {
    let len = generator.array_len(MAX_COMPOSITE_ARRAY_LEN);
    (0..len).map(|_| element(generator)).collect()
}
