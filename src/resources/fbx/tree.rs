//! The binary FBX container.
//!
//! A file is the 27-byte preamble (magic, two padding bytes, `u32` version) followed by a
//! list of node records. Every record header holds the absolute end offset of the record,
//! the number of properties, the byte length of the property list and the name length.
//! Files of version 7500 and later use 64-bit fields for the first three, older files
//! 32-bit ones. A header with an end offset of zero is a null record and terminates a
//! node list.
//!
//! Array properties carry a length, an encoding and a compressed length. Encoding 1 means
//! the payload is zlib-deflated; it is inflated transparently.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::error::LoadError;

pub const MAGIC: &[u8; 21] = b"Kaydara FBX Binary  \x00";

/// First version whose record headers use 64-bit fields.
pub const WIDE_HEADER_VERSION: u32 = 7500;

const PREAMBLE_LEN: usize = 27;

/// Node records nested deeper than this are rejected.
pub const MAX_NODE_DEPTH: usize = 64;

#[derive(Clone, Debug, PartialEq)]
pub enum Property {
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Raw(Vec<u8>),
    BoolArray(Vec<bool>),
    I32Array(Vec<i32>),
    I64Array(Vec<i64>),
    F32Array(Vec<f32>),
    F64Array(Vec<f64>),
}

impl Property {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Property::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Property::I16(v) => Some(v as i64),
            Property::I32(v) => Some(v as i64),
            Property::I64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Property::F32(v) => Some(v as f64),
            Property::F64(v) => Some(v),
            Property::I16(v) => Some(v as f64),
            Property::I32(v) => Some(v as f64),
            Property::I64(v) => Some(v as f64),
            _ => None,
        }
    }

    /// Float arrays of either precision, widened to `f64`.
    pub fn as_f64_array(&self) -> Option<Vec<f64>> {
        match self {
            Property::F64Array(v) => Some(v.clone()),
            Property::F32Array(v) => Some(v.iter().map(|f| *f as f64).collect()),
            _ => None,
        }
    }

    /// Integer arrays of either width, narrowed to `i32`.
    ///
    /// `None` when a 64-bit entry does not fit.
    pub fn as_i32_array(&self) -> Option<Vec<i32>> {
        match self {
            Property::I32Array(v) => Some(v.clone()),
            Property::I64Array(v) => {
                let narrowed: Result<Vec<i32>, _> = v.iter().map(|i| i32::try_from(*i)).collect();
                if narrowed.is_err() {
                    log::warn!("64-bit integer array holds values outside the 32-bit range");
                }
                narrowed.ok()
            }
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Node {
    pub name: String,
    pub properties: Vec<Property>,
    pub children: Vec<Node>,
}

impl Node {
    /// The first child called `name`.
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Every child called `name`, in file order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// The object ID: the first property, if it is a 64-bit integer.
    pub fn id(&self) -> Option<i64> {
        match self.properties.first() {
            Some(Property::I64(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn property(&self, idx: usize) -> Option<&Property> {
        self.properties.get(idx)
    }
}

/// A parsed file: its version and the top-level nodes.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub version: u32,
    pub root: Node,
}

/// Decode a binary FBX file.
pub fn parse(bytes: &[u8]) -> Result<Document, LoadError> {
    let mut reader = Reader { data: bytes, pos: 0 };
    let magic = reader.bytes(MAGIC.len())?;
    if magic != MAGIC {
        return Err(LoadError::BadMagic {
            path: Default::default(),
        });
    }
    reader.bytes(2)?;
    let version = reader.u32()?;
    debug_assert_eq!(reader.pos, PREAMBLE_LEN);
    log::debug!("binary FBX version {}.{}", version / 1000, (version % 1000) / 100);

    let wide = version >= WIDE_HEADER_VERSION;
    let mut root = Node::default();
    while reader.remaining() > 0 {
        match reader.node(wide, 0)? {
            Some(node) => root.children.push(node),
            None => break,
        }
    }
    Ok(Document { version, root })
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], LoadError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(LoadError::Truncated { offset: self.pos })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], LoadError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, LoadError> {
        Ok(self.array::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, LoadError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, LoadError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    /// A 32- or 64-bit header field.
    fn field(&mut self, wide: bool) -> Result<usize, LoadError> {
        let offset = self.pos;
        let value = if wide { self.u64()? } else { self.u32()? as u64 };
        usize::try_from(value).map_err(|_| LoadError::Truncated { offset })
    }

    /// Read one node record, or `None` for a null record. `depth` is 0 for top-level nodes.
    fn node(&mut self, wide: bool, depth: usize) -> Result<Option<Node>, LoadError> {
        let start = self.pos;
        if depth >= MAX_NODE_DEPTH {
            return Err(LoadError::NestingTooDeep {
                offset: start,
                limit: MAX_NODE_DEPTH,
            });
        }
        let end_offset = self.field(wide)?;
        let num_props = self.field(wide)?;
        let _prop_list_len = self.field(wide)?;
        let name_len = self.u8()? as usize;
        if end_offset == 0 {
            return Ok(None);
        }
        if end_offset > self.data.len() || end_offset <= start {
            return Err(LoadError::Truncated { offset: start });
        }

        let name = String::from_utf8_lossy(self.bytes(name_len)?).into_owned();
        let mut node = Node {
            name,
            properties: Vec::with_capacity(num_props.min(1024)),
            children: Vec::new(),
        };
        for _ in 0..num_props {
            node.properties.push(self.property()?);
        }

        while self.pos < end_offset {
            match self.node(wide, depth + 1)? {
                Some(child) => node.children.push(child),
                None => continue,
            }
        }
        if self.pos != end_offset {
            return Err(LoadError::Truncated { offset: self.pos });
        }
        Ok(Some(node))
    }

    fn property(&mut self) -> Result<Property, LoadError> {
        let offset = self.pos;
        let tag = self.u8()?;
        let prop = match tag {
            b'C' => Property::Bool(self.u8()? != 0),
            b'Y' => Property::I16(i16::from_le_bytes(self.array()?)),
            b'I' => Property::I32(i32::from_le_bytes(self.array()?)),
            b'L' => Property::I64(i64::from_le_bytes(self.array()?)),
            b'F' => Property::F32(f32::from_le_bytes(self.array()?)),
            b'D' => Property::F64(f64::from_le_bytes(self.array()?)),
            b'S' => {
                let len = self.u32()? as usize;
                Property::String(String::from_utf8_lossy(self.bytes(len)?).into_owned())
            }
            b'R' => {
                let len = self.u32()? as usize;
                Property::Raw(self.bytes(len)?.to_vec())
            }
            b'b' => Property::BoolArray(self.array_values(1, |b| b[0] != 0)?),
            b'i' => Property::I32Array(self.array_values(4, |b| {
                i32::from_le_bytes([b[0], b[1], b[2], b[3]])
            })?),
            b'l' => Property::I64Array(self.array_values(8, |b| {
                i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
            })?),
            b'f' => Property::F32Array(self.array_values(4, |b| {
                f32::from_le_bytes([b[0], b[1], b[2], b[3]])
            })?),
            b'd' => Property::F64Array(self.array_values(8, |b| {
                f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
            })?),
            other => {
                return Err(LoadError::InvalidProperty {
                    tag: other as char,
                    offset,
                })
            }
        };
        Ok(prop)
    }

    /// Read an array property payload and decode `size`-byte elements with `decode`.
    fn array_values<T>(
        &mut self,
        size: usize,
        decode: impl Fn(&[u8]) -> T,
    ) -> Result<Vec<T>, LoadError> {
        let len = self.u32()? as usize;
        let encoding = self.u32()?;
        let compressed_len = self.u32()? as usize;

        let raw: Vec<u8> = if encoding == 1 {
            let expected = len.saturating_mul(size);
            let mut inflated = Vec::with_capacity(expected.min(1 << 24));
            ZlibDecoder::new(self.bytes(compressed_len)?)
                .take(expected as u64)
                .read_to_end(&mut inflated)
                .map_err(LoadError::Decompress)?;
            inflated
        } else {
            let byte_len = len
                .checked_mul(size)
                .ok_or(LoadError::Truncated { offset: self.pos })?;
            self.bytes(byte_len)?.to_vec()
        };
        if raw.len() < len.saturating_mul(size) {
            log::warn!("array holds {} bytes, expected {}", raw.len(), len.saturating_mul(size));
        }
        Ok(raw.chunks_exact(size).take(len).map(decode).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preamble(version: u32) -> Vec<u8> {
        let mut out = MAGIC.to_vec();
        out.extend_from_slice(&[0x1a, 0x00]);
        out.extend_from_slice(&version.to_le_bytes());
        out
    }

    /// A 32-bit record with the given raw property bytes and no children.
    fn leaf32(start: usize, name: &str, num_props: u32, props: &[u8]) -> Vec<u8> {
        let header = 13 + name.len();
        let end = start + header + props.len();
        let mut out = Vec::new();
        out.extend_from_slice(&(end as u32).to_le_bytes());
        out.extend_from_slice(&num_props.to_le_bytes());
        out.extend_from_slice(&(props.len() as u32).to_le_bytes());
        out.push(name.len() as u8);
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(props);
        out
    }

    #[test]
    fn node_ending_after_its_header_has_no_children() {
        let mut file = preamble(7400);
        let node = leaf32(file.len(), "Empty", 0, &[]);
        file.extend_from_slice(&node);
        file.extend_from_slice(&[0u8; 13]);

        let doc = parse(&file).unwrap();
        assert_eq!(doc.version, 7400);
        assert_eq!(doc.root.children.len(), 1);
        let empty = &doc.root.children[0];
        assert_eq!(empty.name, "Empty");
        assert!(empty.properties.is_empty());
        assert!(empty.children.is_empty());
    }

    #[test]
    fn scalar_properties_are_decoded() {
        let mut props = vec![b'L'];
        props.extend_from_slice(&42i64.to_le_bytes());
        props.push(b'S');
        props.extend_from_slice(&3u32.to_le_bytes());
        props.extend_from_slice(b"abc");
        props.push(b'D');
        props.extend_from_slice(&1.5f64.to_le_bytes());

        let mut file = preamble(7300);
        let node = leaf32(file.len(), "N", 3, &props);
        file.extend_from_slice(&node);

        let doc = parse(&file).unwrap();
        let n = &doc.root.children[0];
        assert_eq!(n.id(), Some(42));
        assert_eq!(n.properties[1].as_str(), Some("abc"));
        assert_eq!(n.properties[2].as_f64(), Some(1.5));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut file = preamble(7400);
        file[0] = b'X';
        assert!(matches!(parse(&file), Err(LoadError::BadMagic { .. })));
    }

    #[test]
    fn unknown_property_tag_is_an_error() {
        let mut file = preamble(7400);
        let node = leaf32(file.len(), "N", 1, &[b'?']);
        file.extend_from_slice(&node);
        assert!(matches!(
            parse(&file),
            Err(LoadError::InvalidProperty { tag: '?', .. })
        ));
    }

    #[test]
    fn end_offset_past_the_data_is_truncated() {
        let mut file = preamble(7400);
        let mut node = leaf32(file.len(), "N", 0, &[]);
        node[0..4].copy_from_slice(&10_000u32.to_le_bytes());
        file.extend_from_slice(&node);
        assert!(matches!(parse(&file), Err(LoadError::Truncated { .. })));
    }

    /// `depth` records named `N`, each the only child of the previous one.
    fn nested32(start: usize, depth: usize) -> Vec<u8> {
        let end = (start + 14 * depth) as u32;
        let mut out = Vec::with_capacity(14 * depth);
        for _ in 0..depth {
            out.extend_from_slice(&end.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
            out.push(1);
            out.push(b'N');
        }
        out
    }

    #[test]
    fn moderate_nesting_is_read() {
        let mut file = preamble(7400);
        let nodes = nested32(file.len(), 10);
        file.extend_from_slice(&nodes);

        let doc = parse(&file).unwrap();
        let mut node = &doc.root;
        let mut depth = 0;
        while let Some(child) = node.child("N") {
            node = child;
            depth += 1;
        }
        assert_eq!(depth, 10);
    }

    #[test]
    fn runaway_nesting_is_an_error() {
        let mut file = preamble(7400);
        let nodes = nested32(file.len(), 200_000);
        file.extend_from_slice(&nodes);
        assert!(matches!(
            parse(&file),
            Err(LoadError::NestingTooDeep { limit: MAX_NODE_DEPTH, .. })
        ));
    }

    #[test]
    fn inflated_arrays_stop_at_the_declared_length() {
        use flate2::{write::ZlibEncoder, Compression};
        use std::io::Write;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[7u8; 1 << 16]).unwrap();
        let payload = encoder.finish().unwrap();

        let mut props = vec![b'i'];
        props.extend_from_slice(&2u32.to_le_bytes());
        props.extend_from_slice(&1u32.to_le_bytes());
        props.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        props.extend_from_slice(&payload);

        let mut file = preamble(7400);
        let node = leaf32(file.len(), "A", 1, &props);
        file.extend_from_slice(&node);

        let doc = parse(&file).unwrap();
        assert_eq!(
            doc.root.children[0].properties[0],
            Property::I32Array(vec![0x0707_0707; 2])
        );
    }

    #[test]
    fn wide_integer_arrays_narrow_only_when_they_fit() {
        assert_eq!(
            Property::I64Array(vec![1, -3, i32::MAX as i64]).as_i32_array(),
            Some(vec![1, -3, i32::MAX])
        );
        assert_eq!(Property::I64Array(vec![0, 1 << 40]).as_i32_array(), None);
    }
}
