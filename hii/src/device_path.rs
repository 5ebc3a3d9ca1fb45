//! Device path node walking and hex encoding
//!
//! A device path is a packed sequence of `{type u8, subtype u8, length u16}`
//! nodes closed by an end-of-path node (type `0x7F`, subtype `0xFF`). Package
//! lists carry one as their device-path package; keyword strings carry one as
//! `PATH=` hex.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

use crate::error::{HiiError, Result};
use crate::stream::Cursor;

pub const END_DEVICE_PATH_TYPE: u8 = 0x7F;
pub const END_ENTIRE_DEVICE_PATH_SUBTYPE: u8 = 0xFF;
pub const MEDIA_DEVICE_PATH: u8 = 0x04;
pub const MEDIA_HARDDRIVE_DP: u8 = 0x01;

/// `{type, subtype, length}` header of every node
pub const NODE_HEADER_SIZE: usize = 4;

/// Size of a hard-drive media node
pub const HARDDRIVE_NODE_SIZE: usize = 42;

/// End-of-path node
pub const END_NODE: [u8; 4] = [END_DEVICE_PATH_TYPE, END_ENTIRE_DEVICE_PATH_SUBTYPE, 4, 0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevicePathNode<'a> {
    pub node_type: u8,
    pub sub_type: u8,
    /// Whole node, header included
    pub bytes: &'a [u8],
}

impl DevicePathNode<'_> {
    pub fn is_end(&self) -> bool {
        self.node_type == END_DEVICE_PATH_TYPE && self.sub_type == END_ENTIRE_DEVICE_PATH_SUBTYPE
    }
}

/// Walks nodes up to and including the end-of-path node
pub struct DevicePathNodes<'a> {
    cursor: Cursor<'a>,
    done: bool,
}

impl<'a> DevicePathNodes<'a> {
    pub fn new(path: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(path),
            done: false,
        }
    }

    /// Offset of the next node
    pub fn offset(&self) -> usize {
        self.cursor.position()
    }

    fn read_node(&mut self) -> Result<DevicePathNode<'a>> {
        let start = self.cursor.position();
        let node_type = self.cursor.read_u8()?;
        let sub_type = self.cursor.read_u8()?;
        let length = self.cursor.read_u16()? as usize;
        let node = DevicePathNode {
            node_type,
            sub_type,
            bytes: &[],
        };
        if !node.is_end() && (node_type == 0 || sub_type == 0 || length < NODE_HEADER_SIZE) {
            return Err(HiiError::InvalidFormat);
        }
        self.cursor.skip(length.saturating_sub(NODE_HEADER_SIZE))?;
        Ok(DevicePathNode {
            bytes: &self.cursor.data()[start..self.cursor.position()],
            ..node
        })
    }
}

impl<'a> Iterator for DevicePathNodes<'a> {
    type Item = Result<DevicePathNode<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let node = self.read_node();
        match &node {
            Ok(n) if !n.is_end() => {}
            _ => self.done = true,
        }
        Some(node)
    }
}

/// Validated size of `path` in bytes, end node included
///
/// Every node before the end node must have a non-zero type and subtype and
/// a length of at least the node header. A path running off the buffer
/// without an end node is rejected too.
pub fn device_path_size(path: &[u8]) -> Result<usize> {
    let mut nodes = DevicePathNodes::new(path);
    for node in nodes.by_ref() {
        if node?.is_end() {
            return Ok(nodes.offset());
        }
    }
    Err(HiiError::InvalidFormat)
}

/// Lowercase hex, two digits per byte, in memory order
pub fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

fn hex_digit(c: u8) -> Result<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(HiiError::InvalidFormat),
    }
}

/// Decode pairs of hex digits into bytes
pub fn decode_hex(text: &str) -> Result<Vec<u8>> {
    let raw = text.as_bytes();
    if raw.len() % 2 != 0 {
        return Err(HiiError::InvalidFormat);
    }
    raw.chunks_exact(2)
        .map(|pair| Ok((hex_digit(pair[0])? << 4) | hex_digit(pair[1])?))
        .collect()
}

/// Decode a `PATH=` payload into a validated device path
pub fn parse_hex_path(text: &str) -> Result<Vec<u8>> {
    if text.len().div_ceil(2) < NODE_HEADER_SIZE {
        return Err(HiiError::InvalidFormat);
    }
    let path = decode_hex(text)?;
    device_path_size(&path)?;
    Ok(path)
}

/// Hard-drive media node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardDriveNode {
    pub partition_number: u32,
    pub partition_start: u64,
    pub partition_size: u64,
    pub signature: [u8; 16],
    pub mbr_type: u8,
    pub signature_type: u8,
}

impl HardDriveNode {
    pub fn parse(node: &DevicePathNode<'_>) -> Result<Self> {
        if node.node_type != MEDIA_DEVICE_PATH
            || node.sub_type != MEDIA_HARDDRIVE_DP
            || node.bytes.len() < HARDDRIVE_NODE_SIZE
        {
            return Err(HiiError::InvalidInput);
        }
        let mut cursor = Cursor::at(node.bytes, NODE_HEADER_SIZE)?;
        let partition_number = cursor.read_u32()?;
        let partition_start = cursor.read_u64()?;
        let partition_size = cursor.read_u64()?;
        let mut signature = [0u8; 16];
        signature.copy_from_slice(cursor.read_bytes(16)?);
        Ok(Self {
            partition_number,
            partition_start,
            partition_size,
            signature,
            mbr_type: cursor.read_u8()?,
            signature_type: cursor.read_u8()?,
        })
    }

    pub fn to_bytes(&self) -> [u8; HARDDRIVE_NODE_SIZE] {
        let mut out = [0u8; HARDDRIVE_NODE_SIZE];
        out[0] = MEDIA_DEVICE_PATH;
        out[1] = MEDIA_HARDDRIVE_DP;
        out[2..4].copy_from_slice(&(HARDDRIVE_NODE_SIZE as u16).to_le_bytes());
        out[4..8].copy_from_slice(&self.partition_number.to_le_bytes());
        out[8..16].copy_from_slice(&self.partition_start.to_le_bytes());
        out[16..24].copy_from_slice(&self.partition_size.to_le_bytes());
        out[24..40].copy_from_slice(&self.signature);
        out[40] = self.mbr_type;
        out[41] = self.signature_type;
        out
    }
}

/// First hard-drive node of `path` and its offset
pub fn find_hard_drive(path: &[u8]) -> Result<Option<(usize, HardDriveNode)>> {
    let mut nodes = DevicePathNodes::new(path);
    loop {
        let offset = nodes.offset();
        let Some(node) = nodes.next() else {
            return Ok(None);
        };
        let node = node?;
        if node.node_type == MEDIA_DEVICE_PATH && node.sub_type == MEDIA_HARDDRIVE_DP {
            return Ok(Some((offset, HardDriveNode::parse(&node)?)));
        }
    }
}
