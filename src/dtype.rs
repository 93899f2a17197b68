//! Data types carried by ports and wires.
//!
//! Layout follows packed hardware conventions: the first field of a struct
//! occupies the most significant bits, and element 0 of a packed array
//! occupies the least significant bits.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The type of a signal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// A fixed-width bit vector.
    Vector(u32),
    /// A packed record.
    Struct(StructType),
    /// A packed multi-dimensional array. `dims[0]` is the outermost dimension.
    Array { elem: Box<DataType>, dims: Vec<u32> },
    /// A simulation-only integer (64 bits in the simulator) with no hardware mapping.
    Int,
}

/// A named packed record type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructType {
    pub name: String,
    pub fields: Vec<StructField>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub ty: DataType,
}

impl StructType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Appends a field. Later fields sit in less significant bits.
    pub fn field(mut self, name: impl Into<String>, ty: DataType) -> Self {
        self.fields.push(StructField {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn bit_width(&self) -> u32 {
        self.checked_bit_width().unwrap_or(u32::MAX)
    }

    pub fn checked_bit_width(&self) -> Option<u32> {
        self.fields
            .iter()
            .try_fold(0u32, |acc, f| acc.checked_add(f.ty.checked_bit_width()?))
    }
}

impl DataType {
    /// Shorthand for a `width`-bit vector.
    pub fn bits(width: u32) -> Self {
        DataType::Vector(width)
    }

    /// Packed array of `elem` with the given dimensions.
    pub fn array(elem: DataType, dims: impl Into<Vec<u32>>) -> Self {
        DataType::Array {
            elem: Box::new(elem),
            dims: dims.into(),
        }
    }

    /// Total number of bits in the packed representation. Saturates at
    /// `u32::MAX`; elaboration rejects such types.
    pub fn bit_width(&self) -> u32 {
        self.checked_bit_width().unwrap_or(u32::MAX)
    }

    /// Total number of bits, or `None` if it overflows a `u32`.
    pub fn checked_bit_width(&self) -> Option<u32> {
        match self {
            DataType::Vector(width) => Some(*width),
            DataType::Struct(st) => st.checked_bit_width(),
            DataType::Array { elem, dims } => dims
                .iter()
                .try_fold(elem.checked_bit_width()?, |acc, dim| acc.checked_mul(*dim)),
            DataType::Int => Some(64),
        }
    }

    /// Finds a part of the type that holds no bits: a zero-width vector, a
    /// struct without fields, or an array with no or a zero dimension.
    ///
    /// Returns the part's field path relative to the type (`""` for the
    /// type itself, `".hdr.len"` for a nested field).
    pub fn empty_part(&self) -> Option<String> {
        match self {
            DataType::Vector(0) => Some(String::new()),
            DataType::Vector(_) | DataType::Int => None,
            DataType::Struct(st) if st.fields.is_empty() => Some(String::new()),
            DataType::Struct(st) => st.fields.iter().find_map(|f| {
                f.ty.empty_part().map(|rest| format!(".{}{rest}", f.name))
            }),
            DataType::Array { dims, .. } if dims.is_empty() || dims.contains(&0) => Some(String::new()),
            DataType::Array { elem, .. } => elem.empty_part().map(|rest| format!("[0]{rest}")),
        }
    }

    /// Looks up a struct field, returning its bit offset from the LSB and its type.
    pub fn field(&self, name: &str) -> Option<(u32, &DataType)> {
        let DataType::Struct(st) = self else {
            return None;
        };
        let pos = st.fields.iter().position(|f| f.name == name)?;
        let offset = st.fields[pos + 1..]
            .iter()
            .fold(0u32, |acc, f| acc.saturating_add(f.ty.bit_width()));
        Some((offset, &st.fields[pos].ty))
    }

    /// Type obtained by indexing the outermost dimension, with the element
    /// stride in bits and the number of elements.
    pub fn element(&self) -> Option<(DataType, u32, u32)> {
        let DataType::Array { elem, dims } = self else {
            return None;
        };
        let (&count, rest) = dims.split_first()?;
        let inner = if rest.is_empty() {
            (**elem).clone()
        } else {
            DataType::Array {
                elem: elem.clone(),
                dims: rest.to_vec(),
            }
        };
        let stride = inner.bit_width();
        Some((inner, stride, count))
    }

    /// Whether a value of this type can be produced by a plain vector
    /// expression without losing structure.
    pub fn is_vector(&self) -> bool {
        matches!(self, DataType::Vector(_))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Vector(width) => write!(f, "Bits{width}"),
            DataType::Struct(st) => write!(f, "{}", st.name),
            DataType::Array { elem, dims } => {
                write!(f, "{elem}")?;
                for dim in dims {
                    write!(f, "[{dim}]")?;
                }
                Ok(())
            }
            DataType::Int => write!(f, "int"),
        }
    }
}
