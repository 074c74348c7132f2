//! Decoding of raw payloads into typed target parameters.
//!
//! Fixed-width kinds read little-endian bytes in order, zero-padded when the
//! payload runs short. A trailing `Bytes` parameter takes whatever remains.

use serde::{Deserialize, Serialize};

use crate::seeds::SeedKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Int,
    Long,
    Double,
    Bytes,
}

impl ParamKind {
    /// Encoded width, `None` for the variable-length `Bytes`.
    pub fn width(self) -> Option<usize> {
        match self {
            ParamKind::Int => Some(4),
            ParamKind::Long | ParamKind::Double => Some(8),
            ParamKind::Bytes => None,
        }
    }

    /// Whether values from a seed source of `kind` fit this parameter.
    pub fn accepts(self, kind: SeedKind) -> bool {
        matches!(
            (self, kind),
            (ParamKind::Int, SeedKind::Int)
                | (ParamKind::Long, SeedKind::Long)
                | (ParamKind::Double, SeedKind::Double)
        )
    }
}

/// A decoded parameter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i32),
    Long(i64),
    Double(f64),
    Bytes(Vec<u8>),
}

impl ParamValue {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            ParamValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            ParamValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ParamValue::Bytes(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("a bytes parameter must be last, found one at position {position} of {len}")]
    BytesNotLast { position: usize, len: usize },
}

/// Ordered parameter kinds of the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ParamKind>", into = "Vec<ParamKind>")]
pub struct ParamLayout {
    kinds: Vec<ParamKind>,
}

impl ParamLayout {
    pub fn new(kinds: Vec<ParamKind>) -> Result<Self, LayoutError> {
        let len = kinds.len();
        if let Some(position) = kinds
            .iter()
            .position(|&k| k == ParamKind::Bytes)
            .filter(|&p| p + 1 != len)
        {
            return Err(LayoutError::BytesNotLast { position, len });
        }
        Ok(Self { kinds })
    }

    pub fn kinds(&self) -> &[ParamKind] {
        &self.kinds
    }

    /// Bytes consumed by the fixed-width parameters.
    pub fn fixed_width(&self) -> usize {
        self.kinds.iter().filter_map(|k| k.width()).sum()
    }

    /// Offset and kind of every fixed-width slot.
    pub fn slot_offsets(&self) -> Vec<(usize, ParamKind)> {
        let mut offset = 0;
        let mut slots = Vec::new();
        for &kind in &self.kinds {
            if let Some(width) = kind.width() {
                slots.push((offset, kind));
                offset += width;
            }
        }
        slots
    }

    pub fn decode(&self, payload: &[u8]) -> Vec<ParamValue> {
        let mut offset = 0;
        self.kinds
            .iter()
            .map(|&kind| match kind {
                ParamKind::Int => {
                    let v = i32::from_le_bytes(take::<4>(payload, &mut offset));
                    ParamValue::Int(v)
                }
                ParamKind::Long => {
                    let v = i64::from_le_bytes(take::<8>(payload, &mut offset));
                    ParamValue::Long(v)
                }
                ParamKind::Double => {
                    let v = f64::from_le_bytes(take::<8>(payload, &mut offset));
                    ParamValue::Double(v)
                }
                ParamKind::Bytes => {
                    ParamValue::Bytes(payload.get(offset..).unwrap_or_default().to_vec())
                }
            })
            .collect()
    }
}

impl Default for ParamLayout {
    /// A single byte-array parameter.
    fn default() -> Self {
        Self {
            kinds: vec![ParamKind::Bytes],
        }
    }
}

impl TryFrom<Vec<ParamKind>> for ParamLayout {
    type Error = LayoutError;

    fn try_from(kinds: Vec<ParamKind>) -> Result<Self, Self::Error> {
        Self::new(kinds)
    }
}

impl From<ParamLayout> for Vec<ParamKind> {
    fn from(layout: ParamLayout) -> Self {
        layout.kinds
    }
}

fn take<const N: usize>(payload: &[u8], offset: &mut usize) -> [u8; N] {
    let mut buf = [0u8; N];
    let start = (*offset).min(payload.len());
    let end = (*offset + N).min(payload.len());
    buf[..end - start].copy_from_slice(&payload[start..end]);
    *offset += N;
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_must_be_last() {
        assert!(ParamLayout::new(vec![ParamKind::Int, ParamKind::Bytes]).is_ok());
        let err = ParamLayout::new(vec![ParamKind::Bytes, ParamKind::Int]).unwrap_err();
        assert!(matches!(err, LayoutError::BytesNotLast { position: 0, len: 2 }));
    }

    #[test]
    fn test_decode_mixed() {
        let layout =
            ParamLayout::new(vec![ParamKind::Int, ParamKind::Long, ParamKind::Bytes]).unwrap();
        let mut payload = Vec::new();
        payload.extend_from_slice(&(-7i32).to_le_bytes());
        payload.extend_from_slice(&1234567890123i64.to_le_bytes());
        payload.extend_from_slice(b"tail");

        assert_eq!(
            layout.decode(&payload),
            vec![
                ParamValue::Int(-7),
                ParamValue::Long(1234567890123),
                ParamValue::Bytes(b"tail".to_vec()),
            ]
        );
    }

    #[test]
    fn test_short_payload_is_zero_padded() {
        let layout = ParamLayout::new(vec![ParamKind::Int, ParamKind::Int, ParamKind::Bytes]).unwrap();
        assert_eq!(
            layout.decode(&[1, 0]),
            vec![ParamValue::Int(1), ParamValue::Int(0), ParamValue::Bytes(Vec::new())]
        );
    }

    #[test]
    fn test_default_layout_passes_payload_through() {
        let layout = ParamLayout::default();
        assert_eq!(layout.fixed_width(), 0);
        assert_eq!(layout.decode(b"abc"), vec![ParamValue::Bytes(b"abc".to_vec())]);
    }

    #[test]
    fn test_slot_offsets() {
        let layout =
            ParamLayout::new(vec![ParamKind::Long, ParamKind::Int, ParamKind::Double]).unwrap();
        assert_eq!(
            layout.slot_offsets(),
            vec![(0, ParamKind::Long), (8, ParamKind::Int), (12, ParamKind::Double)]
        );
        assert_eq!(layout.fixed_width(), 20);
    }

    #[test]
    fn test_config_form_is_validated() {
        let layout: ParamLayout = serde_json::from_str(r#"["int", "bytes"]"#).unwrap();
        assert_eq!(layout.kinds(), &[ParamKind::Int, ParamKind::Bytes]);
        assert!(serde_json::from_str::<ParamLayout>(r#"["bytes", "int"]"#).is_err());
    }
}
