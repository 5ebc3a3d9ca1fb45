//! Common test utilities: package builders, a recording router and an
//! in-memory GPT disk

#![allow(dead_code)]

use gpt_disk_io::{BlockIo, Disk};
use gpt_disk_types::{
    guid, BlockSize, GptHeader, GptPartitionEntry, GptPartitionEntryArray, GptPartitionType, Lba, LbaLe,
    U32Le,
};
use hii::device_path::{HardDriveNode, END_NODE};
use hii::form::ifr::{IFR_END_OP, IFR_NUMERIC_OP, IFR_VARSTORE_OP};
use hii::image::block::IIBT_END;
use hii::string::StringPackage;
use hii::types::{PackageHeader, PackageType, PACKAGE_LIST_HEADER_SIZE};
use hii::{ConfigRouter, HiiError, Result};
use std::io;
use std::sync::{Arc, Mutex};
use uguid::Guid;

/// Config store GUID used by the form builders
pub const STORE_GUID: Guid = guid!("8e1b7d6c-4f6a-4e0b-9a41-3c2d1e0f5a77");

/// PCI root followed by END
pub const CONTROLLER_PATH: [u8; 16] = [
    0x02, 0x01, 0x0C, 0x00, 0xD0, 0x41, 0x03, 0x0A, 0x00, 0x00, 0x00, 0x00, 0x7F, 0xFF, 0x04, 0x00,
];
pub const CONTROLLER_PATH_HEX: &str = "02010c00d041030a000000007fff0400";

/// Builds a package list payload
pub struct PackageListBuilder {
    guid: Guid,
    packages: Vec<Vec<u8>>,
}

impl PackageListBuilder {
    pub fn new(guid: Guid) -> Self {
        Self {
            guid,
            packages: Vec::new(),
        }
    }

    pub fn package(mut self, package: Vec<u8>) -> Self {
        self.packages.push(package);
        self
    }

    /// Header, packages in insertion order, then the END header
    pub fn build(self) -> Vec<u8> {
        let body: usize = self.packages.iter().map(Vec::len).sum();
        let mut payload = self.guid.to_bytes().to_vec();
        payload.extend_from_slice(&((PACKAGE_LIST_HEADER_SIZE + body + 4) as u32).to_le_bytes());
        for package in &self.packages {
            payload.extend_from_slice(package);
        }
        payload.extend_from_slice(&PackageHeader::new(4, PackageType::End).unwrap().to_bytes());
        payload
    }
}

pub fn package_list(guid: Guid, packages: &[Vec<u8>]) -> Vec<u8> {
    packages
        .iter()
        .fold(PackageListBuilder::new(guid), |list, package| list.package(package.clone()))
        .build()
}

/// Builds string packages one text entry at a time
pub struct StringPackageBuilder {
    package: StringPackage,
}

impl StringPackageBuilder {
    pub fn new(language: &str) -> Self {
        Self {
            package: StringPackage::create(language, language, 2).unwrap(),
        }
    }

    pub fn string(mut self, text: &str) -> Self {
        self.package.append_string(text, None).unwrap();
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.package.to_bytes().unwrap()
    }
}

/// Builds an image package around raw image blocks
#[derive(Default)]
pub struct ImagePackageBuilder {
    blocks: Vec<u8>,
    palettes: Vec<Vec<[u8; 3]>>,
}

impl ImagePackageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Palette colors in blue, green, red order
    pub fn palette(mut self, colors: &[[u8; 3]]) -> Self {
        self.palettes.push(colors.to_vec());
        self
    }

    pub fn block(mut self, block: &[u8]) -> Self {
        self.blocks.extend_from_slice(block);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut blocks = self.blocks;
        blocks.push(IIBT_END);
        let mut palette = Vec::new();
        if !self.palettes.is_empty() {
            palette.extend_from_slice(&(self.palettes.len() as u16).to_le_bytes());
            for colors in &self.palettes {
                palette.extend_from_slice(&((colors.len() * 3) as u16).to_le_bytes());
                for color in colors {
                    palette.extend_from_slice(color);
                }
            }
        }

        let length = 12 + blocks.len() + palette.len();
        let mut out = PackageHeader::new(length, PackageType::Images)
            .unwrap()
            .to_bytes()
            .to_vec();
        out.extend_from_slice(&12u32.to_le_bytes());
        let palette_offset = if palette.is_empty() { 0 } else { 12 + blocks.len() };
        out.extend_from_slice(&(palette_offset as u32).to_le_bytes());
        out.extend(blocks);
        out.extend(palette);
        out
    }
}

/// Builds a form package with one buffer varstore named `Cfg`
pub struct FormPackageBuilder {
    ifr: Vec<u8>,
}

impl FormPackageBuilder {
    pub fn new() -> Self {
        let mut varstore = STORE_GUID.to_bytes().to_vec();
        varstore.extend_from_slice(&1u16.to_le_bytes());
        varstore.extend_from_slice(&64u16.to_le_bytes());
        varstore.extend_from_slice(b"Cfg\0");
        let mut ifr = Vec::new();
        push_op(&mut ifr, IFR_VARSTORE_OP, &varstore);
        Self { ifr }
    }

    /// Numeric question prompted by `prompt` at `offset` of the buffer store
    pub fn numeric(mut self, prompt: u16, offset: u16, size_flags: u8, read_only: bool) -> Self {
        let mut body = Vec::new();
        for field in [prompt, 0, prompt, 1, offset] {
            body.extend_from_slice(&field.to_le_bytes());
        }
        body.push(u8::from(read_only));
        body.push(size_flags);
        body.extend_from_slice(&[0; 3]);
        push_op(&mut self.ifr, IFR_NUMERIC_OP, &body);
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        push_op(&mut self.ifr, IFR_END_OP, &[]);
        let mut out = PackageHeader::new(4 + self.ifr.len(), PackageType::Forms)
            .unwrap()
            .to_bytes()
            .to_vec();
        out.extend(self.ifr);
        out
    }
}

fn push_op(ifr: &mut Vec<u8>, opcode: u8, body: &[u8]) {
    ifr.push(opcode);
    ifr.push((body.len() + 2) as u8);
    ifr.extend_from_slice(body);
}

/// Router that answers every request with a fixed value and records responses
pub struct RecordingRouter {
    pub value: &'static str,
    pub requests: Mutex<Vec<String>>,
    pub routed: Mutex<Vec<String>>,
}

impl RecordingRouter {
    pub fn new(value: &'static str) -> Self {
        Self {
            value,
            requests: Mutex::new(Vec::new()),
            routed: Mutex::new(Vec::new()),
        }
    }

    pub fn routed(&self) -> Vec<String> {
        self.routed.lock().unwrap().clone()
    }
}

impl ConfigRouter for RecordingRouter {
    fn extract_config(&self, request: &str) -> Result<String> {
        self.requests.lock().unwrap().push(request.to_string());
        Ok(format!("{}&VALUE={}", request, self.value))
    }

    fn route_config(&self, response: &str) -> Result<()> {
        self.routed.lock().unwrap().push(response.to_string());
        Ok(())
    }
}

/// Controller path followed by a hard-drive node for `partition_number`
pub fn partition_path(partition_number: u32) -> Vec<u8> {
    let node = HardDriveNode {
        partition_number,
        partition_start: 34,
        partition_size: 64,
        signature: [0xA5; 16],
        mbr_type: 2,
        signature_type: 2,
    };
    let mut path = CONTROLLER_PATH[..CONTROLLER_PATH.len() - END_NODE.len()].to_vec();
    path.extend_from_slice(&node.to_bytes());
    path.extend_from_slice(&END_NODE);
    path
}

/// In-memory block device for testing; clones share the same storage
#[derive(Debug, Clone)]
pub struct MemoryBlockDevice {
    pub data: Arc<Mutex<Vec<u8>>>,
    pub block_size: usize,
}

impl MemoryBlockDevice {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(Mutex::new(data)),
            block_size: 512,
        }
    }

    /// Disk of `num_blocks` sectors with a primary GPT holding one entry per name
    pub fn with_gpt(num_blocks: u64, names: &[&str]) -> Self {
        let device = Self::new(vec![0u8; num_blocks as usize * 512]);
        let mut disk = Disk::new(device.clone()).unwrap();
        let mut header = GptHeader {
            my_lba: LbaLe::from_u64(1),
            alternate_lba: LbaLe::from_u64(num_blocks - 1),
            first_usable_lba: LbaLe::from_u64(34),
            last_usable_lba: LbaLe::from_u64(num_blocks - 34),
            disk_guid: guid!("12345678-1234-1234-1234-123456789012"),
            partition_entry_lba: LbaLe::from_u64(2),
            number_of_partition_entries: U32Le::from_u32(128),
            ..Default::default()
        };
        disk.write_protective_mbr(&mut [0u8; 512]).unwrap();

        let layout = header.get_partition_entry_array_layout().unwrap();
        let mut entry_buf = vec![0u8; 128 * 128];
        let mut entries = GptPartitionEntryArray::new(layout, BlockSize::BS_512, &mut entry_buf).unwrap();
        for (slot, name) in names.iter().enumerate() {
            let entry = entries.get_partition_entry_mut(slot.try_into().unwrap()).unwrap();
            *entry = partition_entry(34 + slot as u64 * 8, name);
        }
        header.partition_entry_array_crc32 = entries.calculate_crc32();
        header.update_header_crc32();
        disk.write_primary_gpt_header(&header, &mut [0u8; 512]).unwrap();
        disk.write_gpt_partition_entry_array(&entries).unwrap();
        disk.flush().unwrap();
        device
    }
}

fn partition_entry(start: u64, name: &str) -> GptPartitionEntry {
    GptPartitionEntry {
        partition_type_guid: GptPartitionType(guid!("0fc63daf-8483-4772-8e79-3d69d8477de4")),
        unique_partition_guid: guid!("12345678-1234-5678-1234-567812345678"),
        starting_lba: LbaLe::from_u64(start),
        ending_lba: LbaLe::from_u64(start + 7),
        name: name.parse().unwrap(),
        ..Default::default()
    }
}

impl BlockIo for MemoryBlockDevice {
    type Error = io::Error;

    fn block_size(&self) -> BlockSize {
        BlockSize::new(self.block_size as u32).expect("valid block size")
    }

    fn num_blocks(&mut self) -> std::result::Result<u64, Self::Error> {
        Ok((self.data.lock().unwrap().len() / self.block_size) as u64)
    }

    fn read_blocks(&mut self, start_lba: Lba, dst: &mut [u8]) -> std::result::Result<(), Self::Error> {
        let data = self.data.lock().unwrap();
        let offset = start_lba.0 as usize * self.block_size;
        if offset + dst.len() > data.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "read beyond end of device"));
        }
        dst.copy_from_slice(&data[offset..offset + dst.len()]);
        Ok(())
    }

    fn write_blocks(&mut self, start_lba: Lba, src: &[u8]) -> std::result::Result<(), Self::Error> {
        let mut data = self.data.lock().unwrap();
        let offset = start_lba.0 as usize * self.block_size;
        if offset + src.len() > data.len() {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "write beyond end of device"));
        }
        data[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn flush(&mut self) -> std::result::Result<(), Self::Error> {
        Ok(())
    }
}

/// Maps device-path prefixes to in-memory disks and counts opens
pub struct MemoryLocator {
    pub disks: Vec<(Vec<u8>, MemoryBlockDevice)>,
    pub opens: Mutex<usize>,
}

impl MemoryLocator {
    pub fn new(disks: Vec<(Vec<u8>, MemoryBlockDevice)>) -> Self {
        Self {
            disks,
            opens: Mutex::new(0),
        }
    }
}

impl hii::gpt::DiskLocator for MemoryLocator {
    type Device = MemoryBlockDevice;

    fn locate(&self, prefix: &[u8]) -> Result<hii::gpt::DiskHandle> {
        self.disks
            .iter()
            .position(|(path, _)| path == prefix)
            .map(|at| hii::gpt::DiskHandle(at as u64 + 1))
            .ok_or(HiiError::NotFound)
    }

    fn open(&self, disk: hii::gpt::DiskHandle) -> Result<MemoryBlockDevice> {
        *self.opens.lock().unwrap() += 1;
        let at = (disk.0 as usize).checked_sub(1).ok_or(HiiError::NotFound)?;
        self.disks.get(at).map(|(_, device)| device.clone()).ok_or(HiiError::NotFound)
    }
}
