//! User-supplied primitive seed values.
//!
//! A [`SeedSource`] holds values of a single primitive type and biases the
//! generation of parameters of that type. It is fixed at construction and
//! only ever read.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Primitive type held by a seed source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedKind {
    Int,
    Long,
    Double,
}

impl SeedKind {
    /// Encoded width in bytes.
    pub fn width(self) -> usize {
        match self {
            SeedKind::Int => 4,
            SeedKind::Long | SeedKind::Double => 8,
        }
    }
}

impl fmt::Display for SeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedKind::Int => write!(f, "int"),
            SeedKind::Long => write!(f, "long"),
            SeedKind::Double => write!(f, "double"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("seed source holds {actual} values, not {requested}")]
    WrongType {
        requested: SeedKind,
        actual: SeedKind,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
enum SeedValues {
    #[default]
    Empty,
    Ints(Vec<i32>),
    Longs(Vec<i64>),
    Doubles(Vec<f64>),
}

/// Read-only pool of typed seed values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeedSource {
    values: SeedValues,
}

impl SeedSource {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_ints(values: Vec<i32>) -> Self {
        Self {
            values: SeedValues::Ints(values),
        }
    }

    pub fn from_longs(values: Vec<i64>) -> Self {
        Self {
            values: SeedValues::Longs(values),
        }
    }

    pub fn from_doubles(values: Vec<f64>) -> Self {
        Self {
            values: SeedValues::Doubles(values),
        }
    }

    /// Type of the held values, `None` for an empty source.
    pub fn kind(&self) -> Option<SeedKind> {
        match self.values {
            SeedValues::Empty => None,
            SeedValues::Ints(_) => Some(SeedKind::Int),
            SeedValues::Longs(_) => Some(SeedKind::Long),
            SeedValues::Doubles(_) => Some(SeedKind::Double),
        }
    }

    pub fn len(&self) -> usize {
        match &self.values {
            SeedValues::Empty => 0,
            SeedValues::Ints(v) => v.len(),
            SeedValues::Longs(v) => v.len(),
            SeedValues::Doubles(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self, requested: SeedKind) -> Result<(), SeedError> {
        match self.kind() {
            Some(actual) if actual != requested => Err(SeedError::WrongType { requested, actual }),
            _ => Ok(()),
        }
    }

    /// Int seeds. Empty for an empty source, an error for another type.
    pub fn ints(&self) -> Result<impl Iterator<Item = i32> + '_, SeedError> {
        self.check(SeedKind::Int)?;
        let values: &[i32] = match &self.values {
            SeedValues::Ints(v) => v,
            _ => &[],
        };
        Ok(values.iter().copied())
    }

    pub fn longs(&self) -> Result<impl Iterator<Item = i64> + '_, SeedError> {
        self.check(SeedKind::Long)?;
        let values: &[i64] = match &self.values {
            SeedValues::Longs(v) => v,
            _ => &[],
        };
        Ok(values.iter().copied())
    }

    pub fn doubles(&self) -> Result<impl Iterator<Item = f64> + '_, SeedError> {
        self.check(SeedKind::Double)?;
        let values: &[f64] = match &self.values {
            SeedValues::Doubles(v) => v,
            _ => &[],
        };
        Ok(values.iter().copied())
    }

    /// The `index`-th value in little-endian encoding.
    pub fn encoded(&self, index: usize) -> Option<Vec<u8>> {
        match &self.values {
            SeedValues::Empty => None,
            SeedValues::Ints(v) => v.get(index).map(|x| x.to_le_bytes().to_vec()),
            SeedValues::Longs(v) => v.get(index).map(|x| x.to_le_bytes().to_vec()),
            SeedValues::Doubles(v) => v.get(index).map(|x| x.to_le_bytes().to_vec()),
        }
    }

    /// Every value in little-endian encoding, lazily.
    pub fn encoded_all(&self) -> impl Iterator<Item = Vec<u8>> + '_ {
        (0..self.len()).filter_map(move |i| self.encoded(i))
    }
}
