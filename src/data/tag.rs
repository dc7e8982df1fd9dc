//! Named, typed, fixed-width attribute arrays attached to one entity dimension.
//!
//! A [`Tag`] stores `ncomps` values per entity and declares how its values
//! survive a topology rebuild through a [`TransferPolicy`].

use crate::mesh_error::MeshError;
use bytemuck::Pod;
use serde::{Deserialize, Serialize};

/// Scalar type of a tag.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ScalarType {
    /// `i8`, used for flags.
    I8,
    /// `i32`
    I32,
    /// `i64`
    I64,
    /// `f64`, the only type the interpolating policies accept.
    F64,
}

impl ScalarType {
    /// Returns a stable string label for the scalar type.
    pub fn as_str(self) -> &'static str {
        match self {
            ScalarType::I8 => "i8",
            ScalarType::I32 => "i32",
            ScalarType::I64 => "i64",
            ScalarType::F64 => "f64",
        }
    }

    /// Inverse of [`ScalarType::as_str`]; `None` for an unknown label.
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "i8" => Some(ScalarType::I8),
            "i32" => Some(ScalarType::I32),
            "i64" => Some(ScalarType::I64),
            "f64" => Some(ScalarType::F64),
            _ => None,
        }
    }
}

/// How a tag's values are carried onto a rebuilt mesh.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TransferPolicy {
    /// Not carried; the tag disappears from the rebuilt mesh.
    Drop,
    /// Surviving entities keep their value; new entities copy the value of the
    /// entity they were carved from.
    Inherit,
    /// Real-valued vertex fields: a midpoint takes the mean of the split edge's
    /// endpoint values.
    LinearInterp,
    /// Real-valued element totals: each half of a split element receives half
    /// of its parent's value.
    Conserve,
}

impl TransferPolicy {
    /// Stable label used in logs and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            TransferPolicy::Drop => "drop",
            TransferPolicy::Inherit => "inherit",
            TransferPolicy::LinearInterp => "linear-interp",
            TransferPolicy::Conserve => "conserve",
        }
    }
}

/// Type-erased tag storage.
#[derive(Clone, Debug, PartialEq)]
pub enum TagData {
    /// Values of an `i8` tag.
    I8(Vec<i8>),
    /// Values of an `i32` tag.
    I32(Vec<i32>),
    /// Values of an `i64` tag.
    I64(Vec<i64>),
    /// Values of an `f64` tag.
    F64(Vec<f64>),
}

/// Scalars that can be stored in a [`Tag`].
pub trait TagValue: Pod + Default + PartialOrd + std::fmt::Debug + Send + Sync + 'static {
    /// Runtime label of `Self`.
    const TYPE: ScalarType;
    /// Move typed values into type-erased storage.
    fn wrap(data: Vec<Self>) -> TagData;
    /// Borrow the values back, `None` when `data` holds another type.
    fn view(data: &TagData) -> Option<&[Self]>;
}

macro_rules! impl_tag_value {
    ($t:ty, $variant:ident) => {
        impl TagValue for $t {
            const TYPE: ScalarType = ScalarType::$variant;
            fn wrap(data: Vec<Self>) -> TagData {
                TagData::$variant(data)
            }
            fn view(data: &TagData) -> Option<&[Self]> {
                match data {
                    TagData::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_tag_value!(i8, I8);
impl_tag_value!(i32, I32);
impl_tag_value!(i64, I64);
impl_tag_value!(f64, F64);

fn gather_rows<T: Copy>(values: &[T], rows: &[usize], ncomps: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(rows.len() * ncomps);
    for &r in rows {
        out.extend_from_slice(&values[r * ncomps..(r + 1) * ncomps]);
    }
    out
}

fn extend_pod<T: Pod>(values: &mut Vec<T>, bytes: &[u8]) -> Result<(), MeshError> {
    let width = std::mem::size_of::<T>();
    if bytes.len() % width != 0 {
        return Err(MeshError::Wire(format!(
            "{} tag bytes is not a multiple of {width}",
            bytes.len()
        )));
    }
    let mut tmp = vec![T::zeroed(); bytes.len() / width];
    bytemuck::cast_slice_mut(&mut tmp).copy_from_slice(bytes);
    values.extend(tmp);
    Ok(())
}

impl TagData {
    /// Scalar type of the stored values.
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            TagData::I8(_) => ScalarType::I8,
            TagData::I32(_) => ScalarType::I32,
            TagData::I64(_) => ScalarType::I64,
            TagData::F64(_) => ScalarType::F64,
        }
    }

    /// Number of stored scalars (entities × components).
    pub fn len(&self) -> usize {
        match self {
            TagData::I8(v) => v.len(),
            TagData::I32(v) => v.len(),
            TagData::I64(v) => v.len(),
            TagData::F64(v) => v.len(),
        }
    }

    /// `true` when no scalars are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero-filled storage of the same type.
    pub fn zeros(kind: ScalarType, len: usize) -> Self {
        match kind {
            ScalarType::I8 => TagData::I8(vec![0; len]),
            ScalarType::I32 => TagData::I32(vec![0; len]),
            ScalarType::I64 => TagData::I64(vec![0; len]),
            ScalarType::F64 => TagData::F64(vec![0.0; len]),
        }
    }

    /// Rows `rows` (each `ncomps` wide), in the given order.
    pub fn gather(&self, rows: &[usize], ncomps: usize) -> Self {
        match self {
            TagData::I8(v) => TagData::I8(gather_rows(v, rows, ncomps)),
            TagData::I32(v) => TagData::I32(gather_rows(v, rows, ncomps)),
            TagData::I64(v) => TagData::I64(gather_rows(v, rows, ncomps)),
            TagData::F64(v) => TagData::F64(gather_rows(v, rows, ncomps)),
        }
    }

    /// Raw byte image for the wire.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            TagData::I8(v) => bytemuck::cast_slice(v),
            TagData::I32(v) => bytemuck::cast_slice(v),
            TagData::I64(v) => bytemuck::cast_slice(v),
            TagData::F64(v) => bytemuck::cast_slice(v),
        }
    }

    /// Append values received as a raw byte image.
    pub fn extend_from_bytes(&mut self, bytes: &[u8]) -> Result<(), MeshError> {
        match self {
            TagData::I8(v) => extend_pod(v, bytes),
            TagData::I32(v) => extend_pod(v, bytes),
            TagData::I64(v) => extend_pod(v, bytes),
            TagData::F64(v) => extend_pod(v, bytes),
        }
    }

    /// Copy row `src_row` of `src` into row `dst_row` of `self`.
    pub fn copy_row(
        &mut self,
        dst_row: usize,
        src: &TagData,
        src_row: usize,
        ncomps: usize,
    ) -> Result<(), MeshError> {
        let (d, s) = (dst_row * ncomps, src_row * ncomps);
        match (self, src) {
            (TagData::I8(a), TagData::I8(b)) => a[d..d + ncomps].copy_from_slice(&b[s..s + ncomps]),
            (TagData::I32(a), TagData::I32(b)) => a[d..d + ncomps].copy_from_slice(&b[s..s + ncomps]),
            (TagData::I64(a), TagData::I64(b)) => a[d..d + ncomps].copy_from_slice(&b[s..s + ncomps]),
            (TagData::F64(a), TagData::F64(b)) => a[d..d + ncomps].copy_from_slice(&b[s..s + ncomps]),
            (a, b) => {
                return Err(MeshError::Wire(format!(
                    "cannot copy {} values into {} storage",
                    b.scalar_type().as_str(),
                    a.scalar_type().as_str()
                )));
            }
        }
        Ok(())
    }
}

/// A named attribute array on one entity dimension.
#[derive(Clone, Debug, PartialEq)]
pub struct Tag {
    name: String,
    ncomps: usize,
    policy: TransferPolicy,
    data: TagData,
}

impl Tag {
    /// Tag holding `data`, laid out as `ncomps` values per entity.
    pub fn new<T: TagValue>(
        name: impl Into<String>,
        ncomps: usize,
        policy: TransferPolicy,
        data: Vec<T>,
    ) -> Self {
        Self {
            name: name.into(),
            ncomps,
            policy,
            data: T::wrap(data),
        }
    }

    pub(crate) fn from_parts(
        name: String,
        ncomps: usize,
        policy: TransferPolicy,
        data: TagData,
    ) -> Self {
        Self {
            name,
            ncomps,
            policy,
            data,
        }
    }

    /// Tag name, unique within its dimension.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Values per entity.
    pub fn ncomps(&self) -> usize {
        self.ncomps
    }

    /// Transfer policy applied on rebuild.
    pub fn policy(&self) -> TransferPolicy {
        self.policy
    }

    /// Type-erased values.
    pub fn data(&self) -> &TagData {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut TagData {
        &mut self.data
    }

    pub(crate) fn set_data(&mut self, data: TagData) {
        self.data = data;
    }

    /// Scalar type of the stored values.
    pub fn scalar_type(&self) -> ScalarType {
        self.data.scalar_type()
    }

    /// Typed view, `None` when the stored type differs.
    pub fn array<T: TagValue>(&self) -> Option<&[T]> {
        T::view(&self.data)
    }

    /// Number of entities covered.
    pub fn nents(&self) -> usize {
        if self.ncomps == 0 {
            0
        } else {
            self.data.len() / self.ncomps
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_picks_whole_rows() {
        let tag = Tag::new("xy", 2, TransferPolicy::LinearInterp, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(tag.nents(), 3);
        assert_eq!(tag.data().gather(&[2, 0], 2), TagData::F64(vec![4.0, 5.0, 0.0, 1.0]));
    }

    #[test]
    fn bytes_roundtrip_through_extend() {
        let src = TagData::I32(vec![7, -3]);
        let mut dst = TagData::zeros(ScalarType::I32, 0);
        dst.extend_from_bytes(src.as_bytes()).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn typed_view_rejects_other_types() {
        let tag = Tag::new("flag", 1, TransferPolicy::Drop, vec![1i8, 0]);
        assert!(tag.array::<f64>().is_none());
        assert_eq!(tag.array::<i8>(), Some(&[1i8, 0][..]));
    }

    #[test]
    fn scalar_labels_parse_back() {
        for kind in [ScalarType::I8, ScalarType::I32, ScalarType::I64, ScalarType::F64] {
            assert_eq!(ScalarType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ScalarType::parse("u16"), None);
        assert_eq!(ScalarType::parse("F64"), None);
    }

    #[test]
    fn copy_row_checks_types() {
        let mut dst = TagData::zeros(ScalarType::F64, 2);
        assert!(dst.copy_row(0, &TagData::I8(vec![1]), 0, 1).is_err());
        dst.copy_row(1, &TagData::F64(vec![9.0]), 0, 1).unwrap();
        assert_eq!(dst, TagData::F64(vec![0.0, 9.0]));
    }
}
