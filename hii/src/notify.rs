//! Package notification bus
//!
//! Subscriptions are matched on the exact package type and notify type;
//! GUID packages additionally match on the GUID that follows their header.
//! Callbacks run synchronously in registration order and any error aborts
//! the operation that fired them.

use alloc::boxed::Box;
use alloc::vec::Vec;

use uguid::Guid;

use crate::error::{HiiError, Result};
use crate::stream::guid_at;
use crate::types::{HiiHandle, PackageType, PACKAGE_HEADER_SIZE};

/// Kind of database change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum NotifyType {
    New = 0x01,
    Add = 0x02,
    Export = 0x04,
    Remove = 0x08,
}

impl NotifyType {
    pub const fn bits(self) -> u32 {
        self as u32
    }
}

/// What a callback receives
#[derive(Debug, Clone, Copy)]
pub struct PackageEvent<'a> {
    pub package_type: u8,
    /// GUID of a GUID package, `None` for every other type
    pub package_guid: Option<Guid>,
    /// Package wire bytes, header included
    pub package: &'a [u8],
    pub handle: HiiHandle,
    pub notify_type: NotifyType,
}

/// Callback invoked while the database lock is held
pub type NotifyFn = Box<dyn FnMut(&PackageEvent<'_>) -> Result<()> + Send>;

/// Identifies one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NotifyHandle(u32);

struct Subscription {
    handle: NotifyHandle,
    package_type: u8,
    guid: Option<Guid>,
    notify_type: NotifyType,
    callback: NotifyFn,
}

#[derive(Default)]
pub struct NotificationBus {
    subscriptions: Vec<Subscription>,
    next_handle: u32,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Add a subscription
    ///
    /// GUID packages must be registered with a GUID and every other type
    /// without one.
    pub fn register(
        &mut self,
        package_type: PackageType,
        guid: Option<Guid>,
        notify_type: NotifyType,
        callback: NotifyFn,
    ) -> Result<NotifyHandle> {
        if (package_type == PackageType::Guid) != guid.is_some() {
            return Err(HiiError::InvalidInput);
        }
        self.next_handle += 1;
        let handle = NotifyHandle(self.next_handle);
        self.subscriptions.push(Subscription {
            handle,
            package_type: package_type.as_u8(),
            guid,
            notify_type,
            callback,
        });
        log::debug!(
            "hii: notify {:?} registered for type {:#04x}",
            notify_type,
            package_type.as_u8()
        );
        Ok(handle)
    }

    pub fn unregister(&mut self, handle: NotifyHandle) -> Result<()> {
        let index = self
            .subscriptions
            .iter()
            .position(|s| s.handle == handle)
            .ok_or(HiiError::NotFound)?;
        self.subscriptions.remove(index);
        Ok(())
    }

    /// Whether any subscription would fire for this pair
    pub fn wants(&self, notify_type: NotifyType, package_type: u8) -> bool {
        self.subscriptions
            .iter()
            .any(|s| s.notify_type == notify_type && s.package_type == package_type)
    }

    /// Invoke every matching subscription for `package`
    pub fn dispatch(&mut self, notify_type: NotifyType, package: &[u8], handle: HiiHandle) -> Result<()> {
        let Some(&type_byte) = package.get(3) else {
            return Err(HiiError::InvalidInput);
        };
        let package_guid = if type_byte == PackageType::Guid.as_u8() {
            Some(guid_at(package, PACKAGE_HEADER_SIZE)?)
        } else {
            None
        };
        let event = PackageEvent {
            package_type: type_byte,
            package_guid,
            package,
            handle,
            notify_type,
        };

        for sub in self.subscriptions.iter_mut() {
            if sub.notify_type != notify_type || sub.package_type != type_byte {
                continue;
            }
            if package_guid.is_some() && sub.guid != package_guid {
                continue;
            }
            if let Err(e) = (sub.callback)(&event) {
                log::warn!("hii: {:?} callback on {} failed: {}", notify_type, handle, e);
                return Err(e);
            }
        }
        Ok(())
    }
}
