//! GPT partition entry lookup for hard-drive device paths
//!
//! A partition's device path ends in a hard-drive node and the nodes before
//! it name the disk. Each disk's partition entry array is read once and kept
//! in a [`CapabilityRegistry`] under the disk handle.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use gpt_disk_io::{BlockIo, Disk};
use gpt_disk_types::GptPartitionEntry;

use crate::device_path::{find_hard_drive, END_NODE};
use crate::error::{HiiError, Result};
use crate::registry::CapabilityRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DiskHandle(pub u64);

/// Resolves device paths to disks with block I/O
pub trait DiskLocator {
    type Device: BlockIo;

    /// Disk whose device path is `prefix`
    fn locate(&self, prefix: &[u8]) -> Result<DiskHandle>;

    fn open(&self, disk: DiskHandle) -> Result<Self::Device>;
}

/// Read every entry of the primary GPT
fn read_entries<B: BlockIo>(device: B) -> Result<Vec<GptPartitionEntry>> {
    let block_size = device.block_size().to_u32() as usize;
    let mut disk = Disk::new(device).map_err(|_| HiiError::DeviceError)?;
    let mut block = vec![0u8; block_size];

    let header = disk
        .read_primary_gpt_header(&mut block)
        .map_err(|_| HiiError::DeviceError)?;
    if !header.is_signature_valid() {
        return Err(HiiError::InvalidFormat);
    }
    let layout = header
        .get_partition_entry_array_layout()
        .map_err(|_| HiiError::InvalidFormat)?;

    let iter = disk
        .gpt_partition_entry_array_iter(layout, &mut block)
        .map_err(|_| HiiError::DeviceError)?;
    let entries = iter
        .map(|entry| entry.map_err(|_| HiiError::DeviceError))
        .collect::<Result<Vec<_>>>()?;
    Ok(entries)
}

/// GPT entry of the partition `path` points at
///
/// The path must carry a hard-drive node; its partition number is the
/// 1-based index into the disk's entry array.
pub fn gpt_partition_entry<L: DiskLocator>(
    path: &[u8],
    locator: &L,
    registry: &mut dyn CapabilityRegistry,
) -> Result<GptPartitionEntry> {
    let (offset, node) = find_hard_drive(path)?.ok_or(HiiError::InvalidInput)?;
    let mut prefix = path[..offset].to_vec();
    prefix.extend_from_slice(&END_NODE);
    let disk = locator.locate(&prefix)?;

    if registry.lookup(disk.0).is_err() {
        let entries = read_entries(locator.open(disk)?)?;
        log::debug!("hii: cached {} GPT entries for disk {}", entries.len(), disk.0);
        registry.attach(disk.0, Box::new(entries))?;
    }
    let entries = registry
        .lookup(disk.0)?
        .downcast_ref::<Vec<GptPartitionEntry>>()
        .ok_or(HiiError::InvalidInput)?;

    let index = (node.partition_number as usize)
        .checked_sub(1)
        .ok_or(HiiError::NotFound)?;
    entries.get(index).cloned().ok_or_else(|| {
        log::warn!(
            "hii: partition {} beyond the {} entries of disk {}",
            node.partition_number,
            entries.len(),
            disk.0
        );
        HiiError::NotFound
    })
}
