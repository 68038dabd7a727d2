//! Witness-supplied loop shapes and their wire format.
//!
//! A loop tree tells the VM how many times a dynamic loop runs and how
//! the loops nested inside each iteration are shaped. The wire format
//! is a tag byte followed by ULEB128 counts and recursively encoded
//! children; a stream holds trees concatenated to its end.

use crate::consts::MAX_LOOP_DEPTH;
use crate::error::{DecodeError, DecodeErrorKind};

const TAG_LEAF: u8 = 0x00;
const TAG_ROLLED_OUT: u8 = 0x01;
const TAG_CARTESIAN: u8 = 0x02;

/// Iteration shape of one loop.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LoopTree {
    /// `n` iterations with no inner loops.
    Leaf(u64),
    /// One row of child shapes per iteration; all rows have the same
    /// length.
    RolledOut(Vec<Vec<LoopTree>>),
    /// `n` iterations, each sharing the same child shapes.
    Cartesian(u64, Vec<LoopTree>),
}

impl LoopTree {
    /// Number of iterations this tree describes.
    pub fn num_loops(&self) -> u64 {
        match self {
            LoopTree::Leaf(n) => *n,
            LoopTree::RolledOut(matrix) => matrix.len() as u64,
            LoopTree::Cartesian(n, _) => *n,
        }
    }

    /// Number of child shapes consumed by one iteration.
    pub fn num_children(&self) -> usize {
        match self {
            LoopTree::Leaf(_) => 0,
            LoopTree::RolledOut(matrix) => matrix.first().map_or(0, Vec::len),
            LoopTree::Cartesian(_, children) => children.len(),
        }
    }

    /// Append the wire encoding of this tree to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            LoopTree::Leaf(n) => {
                out.push(TAG_LEAF);
                write_uleb128(out, *n);
            }
            LoopTree::RolledOut(matrix) => {
                out.push(TAG_ROLLED_OUT);
                write_uleb128(out, matrix.len() as u64);
                write_uleb128(out, self.num_children() as u64);
                for row in matrix {
                    for child in row {
                        child.encode(out);
                    }
                }
            }
            LoopTree::Cartesian(n, children) => {
                out.push(TAG_CARTESIAN);
                write_uleb128(out, *n);
                write_uleb128(out, children.len() as u64);
                for child in children {
                    child.encode(out);
                }
            }
        }
    }
}

/// Decode a stream of concatenated loop trees to its end.
pub fn decode_loop_trees(bytes: &[u8]) -> Result<Vec<LoopTree>, DecodeError> {
    let mut decoder = Decoder { bytes, offset: 0 };
    let mut trees = Vec::new();
    while decoder.offset < decoder.bytes.len() {
        trees.push(decoder.tree(0)?);
    }
    Ok(trees)
}

/// Encode a forest back to its wire form.
pub fn encode_loop_trees(trees: &[LoopTree]) -> Vec<u8> {
    let mut out = Vec::new();
    for tree in trees {
        tree.encode(&mut out);
    }
    out
}

struct Decoder<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl Decoder<'_> {
    fn error(&self, kind: DecodeErrorKind) -> DecodeError {
        DecodeError {
            offset: self.offset,
            kind,
        }
    }

    fn byte(&mut self) -> Result<u8, DecodeError> {
        let b = *self
            .bytes
            .get(self.offset)
            .ok_or_else(|| self.error(DecodeErrorKind::UnexpectedEof))?;
        self.offset += 1;
        Ok(b)
    }

    fn uleb128(&mut self) -> Result<u64, DecodeError> {
        let start = self.offset;
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let b = self.byte()?;
            let low = u64::from(b & 0x7f);
            if shift >= 64 || (shift == 63 && low > 1) {
                return Err(DecodeError {
                    offset: start,
                    kind: DecodeErrorKind::VarintOverflow,
                });
            }
            value |= low << shift;
            if b & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    fn tree(&mut self, depth: usize) -> Result<LoopTree, DecodeError> {
        if depth >= MAX_LOOP_DEPTH {
            return Err(self.error(DecodeErrorKind::NestingTooDeep));
        }
        let tag_offset = self.offset;
        match self.byte()? {
            TAG_LEAF => Ok(LoopTree::Leaf(self.uleb128()?)),
            TAG_ROLLED_OUT => {
                let num_loops = self.uleb128()?;
                let num_children = self.uleb128()?;
                let mut matrix = Vec::new();
                for _ in 0..num_loops {
                    let mut row = Vec::new();
                    for _ in 0..num_children {
                        row.push(self.tree(depth + 1)?);
                    }
                    matrix.push(row);
                }
                Ok(LoopTree::RolledOut(matrix))
            }
            TAG_CARTESIAN => {
                let num_loops = self.uleb128()?;
                let num_children = self.uleb128()?;
                let mut children = Vec::new();
                for _ in 0..num_children {
                    children.push(self.tree(depth + 1)?);
                }
                Ok(LoopTree::Cartesian(num_loops, children))
            }
            tag => Err(DecodeError {
                offset: tag_offset,
                kind: DecodeErrorKind::UnknownTag(tag),
            }),
        }
    }
}

fn write_uleb128(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut b = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            b |= 0x80;
        }
        out.push(b);
        if value == 0 {
            return;
        }
    }
}
