//! Fixed, versioned wire types for collective payloads.
//!
//! Counts and record headers are little-endian. Bulk tag payloads are shipped
//! as the native byte image of `Pod` slices; all ranks of one run share an
//! architecture.

use crate::mesh_error::MeshError;
use bytemuck::{Pod, Zeroable};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use static_assertions::{assert_eq_size, const_assert_eq};
use std::mem::size_of;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Payload kinds carried behind a [`WireHdr`].
pub const KIND_GHOST_LAYER: u16 = 1;

#[repr(transparent)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32, // count of following records
}

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u32).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireHdr {
    pub version_le: u16,  // = WIRE_VERSION.to_le()
    pub kind_le: u16,     // KIND_*
    pub reserved_le: u32, // future use; keep zero
}

impl WireHdr {
    pub fn new(kind: u16) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            reserved_le: 0,
        }
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
}

/// One mesh entity as shipped between ranks.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireEntity {
    pub global_le: u64,
    pub owner_le: u64,
}

impl WireEntity {
    pub fn new(global: u64, owner: usize) -> Self {
        Self {
            global_le: global.to_le(),
            owner_le: (owner as u64).to_le(),
        }
    }
    pub fn global(&self) -> u64 {
        u64::from_le(self.global_le)
    }
    pub fn owner(&self) -> usize {
        u64::from_le(self.owner_le) as usize
    }
}

const_assert_eq!(size_of::<WireHdr>(), 8);
assert_eq_size!(WireEntity, [u64; 2]);
assert_eq_size!(WireCount, u32);

/// Append-only encoder.
#[derive(Default)]
pub struct WireWriter {
    buf: BytesMut,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a framed payload of the given kind.
    pub fn with_header(kind: u16) -> Self {
        let mut w = Self::new();
        w.put_pod(&WireHdr::new(kind));
        w
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.put_u64_le(v);
    }

    pub fn put_count(&mut self, n: usize) {
        self.buf.put_u32_le(n as u32);
    }

    pub fn put_pod<T: Pod>(&mut self, v: &T) {
        self.buf.put_slice(bytemuck::bytes_of(v));
    }

    /// Length-prefixed slice.
    pub fn put_slice<T: Pod>(&mut self, v: &[T]) {
        self.put_count(v.len());
        self.buf.put_slice(cast_slice(v));
    }

    pub fn put_str(&mut self, s: &str) {
        self.put_slice(s.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Cursor over a received payload; every read is bounds checked.
pub struct WireReader {
    buf: Bytes,
}

impl WireReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    /// Open a framed payload and check its version and kind.
    pub fn with_header(buf: Bytes, kind: u16) -> Result<Self, MeshError> {
        let mut r = Self::new(buf);
        let hdr: WireHdr = r.get_pod()?;
        if hdr.version() != WIRE_VERSION {
            return Err(MeshError::Wire(format!(
                "wire version {} (expected {WIRE_VERSION})",
                hdr.version()
            )));
        }
        if hdr.kind() != kind {
            return Err(MeshError::Wire(format!(
                "payload kind {} (expected {kind})",
                hdr.kind()
            )));
        }
        Ok(r)
    }

    pub fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }

    fn need(&self, n: usize) -> Result<(), MeshError> {
        if self.buf.remaining() < n {
            Err(MeshError::Wire(format!(
                "truncated payload: need {n} bytes, {} left",
                self.buf.remaining()
            )))
        } else {
            Ok(())
        }
    }

    pub fn get_u64(&mut self) -> Result<u64, MeshError> {
        self.need(size_of::<u64>())?;
        Ok(self.buf.get_u64_le())
    }

    pub fn get_count(&mut self) -> Result<usize, MeshError> {
        self.need(size_of::<u32>())?;
        Ok(self.buf.get_u32_le() as usize)
    }

    pub fn get_pod<T: Pod>(&mut self) -> Result<T, MeshError> {
        let n = size_of::<T>();
        self.need(n)?;
        let v = bytemuck::pod_read_unaligned(&self.buf[..n]);
        self.buf.advance(n);
        Ok(v)
    }

    /// Read a length-prefixed slice written by [`WireWriter::put_slice`].
    pub fn get_vec<T: Pod>(&mut self) -> Result<Vec<T>, MeshError> {
        let n = self.get_count()?;
        let bytes = n * size_of::<T>();
        self.need(bytes)?;
        let mut out = vec![T::zeroed(); n];
        cast_slice_mut(&mut out).copy_from_slice(&self.buf[..bytes]);
        self.buf.advance(bytes);
        Ok(out)
    }

    pub fn get_string(&mut self) -> Result<String, MeshError> {
        let raw: Vec<u8> = self.get_vec()?;
        String::from_utf8(raw).map_err(|e| MeshError::Wire(e.to_string()))
    }
}

/// Encode a bare list of `u64`.
pub fn encode_u64s(values: &[u64]) -> Bytes {
    let mut w = WireWriter::new();
    w.put_slice(values);
    w.finish()
}

/// Decode a list written by [`encode_u64s`].
pub fn decode_u64s(buf: Bytes) -> Result<Vec<u64>, MeshError> {
    let mut r = WireReader::new(buf);
    let out = r.get_vec()?;
    if !r.is_empty() {
        return Err(MeshError::Wire("trailing bytes after u64 list".into()));
    }
    Ok(out)
}
