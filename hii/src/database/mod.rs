//! The HII database
//!
//! A [`Database`] owns every registered package list behind one spin lock.
//! Every public operation takes the lock for its whole duration, including
//! notification callbacks, so callbacks must not call back into the same
//! database.

mod images;
mod resources;
mod strings;

use alloc::vec::Vec;

use spin::Mutex;
use uguid::Guid;

use crate::config::DatabaseConfig;
use crate::error::{HiiError, Result};
use crate::notify::{NotificationBus, NotifyFn, NotifyHandle, NotifyType};
use crate::package_list::{DevicePathPackage, Package, PackageList};
use crate::types::{
    DriverHandle, HiiHandle, PackageHeader, PackageKind, PackageListRef, PackageType, PACKAGE_HEADER_SIZE,
    PACKAGE_LIST_HEADER_SIZE,
};

/// One registered package list
pub(crate) struct Record {
    pub handle: HiiHandle,
    pub driver: DriverHandle,
    pub list: PackageList,
}

pub(crate) struct State {
    pub records: Vec<Record>,
    pub bus: NotificationBus,
    pub config: DatabaseConfig,
    /// Copy of the layout selected with `set_keyboard_layout`
    pub current_layout: Option<(Guid, Vec<u8>)>,
    next_handle: u32,
}

impl State {
    pub fn position(&self, handle: HiiHandle) -> Result<usize> {
        self.records
            .iter()
            .position(|r| r.handle == handle)
            .ok_or(HiiError::NotFound)
    }

    pub fn list(&self, handle: HiiHandle) -> Result<&PackageList> {
        Ok(&self.records[self.position(handle)?].list)
    }

    /// Fire `notify_type` for the `index`th package of `kind` in record `at`
    pub fn notify(&mut self, at: usize, kind: PackageKind, index: usize, notify_type: NotifyType) -> Result<()> {
        let Self { records, bus, .. } = self;
        if !bus.wants(notify_type, kind.package_type().as_u8()) {
            return Ok(());
        }
        let record = &records[at];
        let bytes = record.list.encode(kind, index)?;
        bus.dispatch(notify_type, &bytes, record.handle)
    }

    /// Insert one decoded package into record `at` and announce it
    fn insert_package(&mut self, at: usize, mut package: Package, notify_type: NotifyType) -> Result<()> {
        match &mut package {
            Package::Font(font) => {
                let taken = self
                    .records
                    .iter()
                    .flat_map(|r| r.list.fonts())
                    .any(|f| f.info() == font.info());
                if taken {
                    log::warn!("hii: font {:?} already registered", font.info());
                    return Err(HiiError::Unsupported);
                }
            }
            Package::Form(form) => {
                if let Some(source) = &self.config.defaults {
                    form.apply_defaults(source.as_ref());
                }
            }
            _ => {}
        }
        let kind = package.kind();
        let index = self.records[at].list.insert(package)?;
        self.notify(at, kind, index, notify_type)
    }

    /// Insert every package of a payload in order
    ///
    /// Packages inserted before a failure stay in place. String ids are
    /// reconciled once at the end when any string package went in.
    fn add_packages(&mut self, at: usize, packages: &[&[u8]], notify_type: NotifyType) -> Result<()> {
        let mut strings_added = false;
        for bytes in packages {
            let Some(package) = Package::parse(bytes)? else {
                continue;
            };
            strings_added |= package.kind() == PackageKind::String;
            self.insert_package(at, package, notify_type)?;
        }
        if strings_added {
            self.records[at].list.reconcile_string_ids()?;
        }
        Ok(())
    }

    /// Remove every package of `kind`, firing REMOVE before each is dropped
    fn remove_kind(&mut self, at: usize, kind: PackageKind) -> Result<()> {
        while self.records[at].list.count(kind) > 0 {
            self.notify(at, kind, 0, NotifyType::Remove)?;
            self.records[at].list.remove_first(kind);
        }
        Ok(())
    }

    /// Export record `at` into `buffer` starting at `used`; returns the new used size
    fn export_list(&mut self, at: usize, buffer: &mut [u8], used: usize) -> Result<usize> {
        let capacity = buffer.len();
        let mut size = PACKAGE_LIST_HEADER_SIZE;
        if used + size <= capacity {
            let list = &self.records[at].list;
            buffer[used..used + 16].copy_from_slice(&list.guid().to_bytes());
            buffer[used + 16..used + 20].copy_from_slice(&(list.package_length() as u32).to_le_bytes());
        }

        for kind in PackageKind::ORDER {
            for index in 0..self.records[at].list.count(kind) {
                let bytes = self.records[at].list.encode(kind, index)?;
                let start = used + size;
                if start + bytes.len() <= capacity {
                    self.notify(at, kind, index, NotifyType::Export)?;
                    buffer[start..start + bytes.len()].copy_from_slice(&bytes);
                }
                size += bytes.len();
            }
        }

        let start = used + size;
        if start + PACKAGE_HEADER_SIZE <= capacity {
            let end = PackageHeader::new(PACKAGE_HEADER_SIZE, PackageType::End)?;
            buffer[start..start + PACKAGE_HEADER_SIZE].copy_from_slice(&end.to_bytes());
        }
        Ok(used + size + PACKAGE_HEADER_SIZE)
    }

    /// Cascade-remove record `at` and drop it
    fn remove_record(&mut self, at: usize) -> Result<()> {
        for kind in PackageKind::ORDER {
            self.remove_kind(at, kind)?;
        }
        self.records.remove(at);
        Ok(())
    }
}

/// In-memory HII package database
pub struct Database {
    state: Mutex<State>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    pub fn new() -> Self {
        Self::with_config(DatabaseConfig::default())
    }

    pub fn with_config(config: DatabaseConfig) -> Self {
        Self {
            state: Mutex::new(State {
                records: Vec::new(),
                bus: NotificationBus::new(),
                config,
                current_layout: None,
                next_handle: 0,
            }),
        }
    }

    pub(crate) fn lock(&self) -> spin::MutexGuard<'_, State> {
        self.state.lock()
    }

    pub fn config(&self) -> DatabaseConfig {
        self.state.lock().config.clone()
    }

    /// Register a package list
    ///
    /// `payload` is a complete package list: GUID, length, packages and the
    /// END header. When `device_path` is given it is stored as the list's
    /// device-path package. A list whose GUID and driver both match a
    /// registered list is rejected. On failure nothing stays registered.
    pub fn new_package_list(
        &self,
        payload: &[u8],
        driver: DriverHandle,
        device_path: Option<&[u8]>,
    ) -> Result<HiiHandle> {
        let parsed = PackageListRef::parse(payload)?;
        let mut state = self.state.lock();
        if state
            .records
            .iter()
            .any(|r| r.list.guid() == parsed.guid && r.driver == driver)
        {
            log::warn!("hii: package list {} already registered by {:?}", parsed.guid, driver);
            return Err(HiiError::InvalidInput);
        }

        state.next_handle += 1;
        let handle = HiiHandle(state.next_handle);
        state.records.push(Record {
            handle,
            driver,
            list: PackageList::new(parsed.guid),
        });
        let at = state.records.len() - 1;

        let mut result = state.add_packages(at, &parsed.packages, NotifyType::New);
        if let (true, Some(path)) = (result.is_ok(), device_path) {
            result = DevicePathPackage::from_path(path)
                .and_then(|p| state.insert_package(at, Package::DevicePath(p), NotifyType::New));
        }
        if let Err(e) = result {
            log::warn!("hii: package list {} rejected: {}", parsed.guid, e);
            if state.remove_record(at).is_err() {
                state.records.truncate(at);
            }
            return Err(e);
        }

        log::debug!(
            "hii: registered {} ({} packages, {} bytes)",
            handle,
            parsed.packages.len(),
            state.records[at].list.package_length()
        );
        Ok(handle)
    }

    /// Remove a package list and every package it holds
    ///
    /// Packages go in the fixed export order with a REMOVE notification
    /// before each one. A failing callback stops the cascade and leaves the
    /// list registered with the packages not yet removed.
    pub fn remove_package_list(&self, handle: HiiHandle) -> Result<()> {
        let mut state = self.state.lock();
        let at = state.position(handle)?;
        state.remove_record(at)?;
        crate::log_info!("hii: removed {}", handle);
        Ok(())
    }

    /// Replace every package type present in `payload`
    ///
    /// All packages of each type present in the payload are removed first,
    /// then the payload packages are added with ADD notifications. The update
    /// is not atomic: packages added before a failing one stay committed.
    pub fn update_package_list(&self, handle: HiiHandle, payload: &[u8]) -> Result<()> {
        let parsed = PackageListRef::parse(payload)?;
        let mut state = self.state.lock();
        let at = state.position(handle)?;
        for bytes in &parsed.packages {
            let header = PackageHeader::parse(bytes)?;
            if let Some(kind) = header.kind().and_then(PackageKind::from_type) {
                state.remove_kind(at, kind)?;
            }
        }
        state.add_packages(at, &parsed.packages, NotifyType::Add)?;
        log::debug!("hii: updated {} with {} packages", handle, parsed.packages.len());
        Ok(())
    }

    /// Handles of lists holding a package of `package_type`
    ///
    /// [`PackageType::All`] lists every handle. GUID packages must be
    /// filtered by `guid`; every other type must not be.
    pub fn list_package_lists(&self, package_type: PackageType, guid: Option<&Guid>) -> Result<Vec<HiiHandle>> {
        if (package_type == PackageType::Guid) != guid.is_some() {
            return Err(HiiError::InvalidInput);
        }
        let state = self.state.lock();
        let handles: Vec<HiiHandle> = state
            .records
            .iter()
            .filter(|r| match package_type {
                PackageType::All => true,
                PackageType::Guid => r.list.guid_packages().iter().any(|p| Some(&p.guid()) == guid),
                other => PackageKind::from_type(other).map_or(false, |kind| r.list.count(kind) > 0),
            })
            .map(|r| r.handle)
            .collect();
        if handles.is_empty() {
            return Err(HiiError::NotFound);
        }
        Ok(handles)
    }

    /// Export one list, or every list when `handle` is `None`
    ///
    /// Returns the size the export needs. When `buffer` is shorter the call
    /// fails with [`HiiError::BufferTooSmall`] carrying that size, so a first
    /// call with an empty buffer probes the size. EXPORT notifications fire
    /// only for packages that were copied.
    pub fn export_package_lists(&self, handle: Option<HiiHandle>, buffer: &mut [u8]) -> Result<usize> {
        let mut state = self.state.lock();
        let targets: Vec<usize> = match handle {
            Some(handle) => alloc::vec![state.position(handle)?],
            None => (0..state.records.len()).collect(),
        };
        if targets.is_empty() {
            return Err(HiiError::NotFound);
        }

        let mut used = 0;
        for at in targets {
            used = state.export_list(at, buffer, used)?;
        }
        log::debug!("hii: export needs {} bytes, buffer holds {}", used, buffer.len());
        if buffer.len() < used {
            return Err(HiiError::BufferTooSmall(used));
        }
        Ok(used)
    }

    /// Driver that registered `handle`
    pub fn get_package_list_handle(&self, handle: HiiHandle) -> Result<DriverHandle> {
        let state = self.state.lock();
        let at = state.position(handle).map_err(|_| HiiError::InvalidInput)?;
        Ok(state.records[at].driver)
    }

    pub fn register_package_notify(
        &self,
        package_type: PackageType,
        guid: Option<Guid>,
        notify_type: NotifyType,
        callback: NotifyFn,
    ) -> Result<NotifyHandle> {
        self.state.lock().bus.register(package_type, guid, notify_type, callback)
    }

    pub fn unregister_package_notify(&self, handle: NotifyHandle) -> Result<()> {
        self.state.lock().bus.unregister(handle)
    }

    /// Device path of a registered list
    pub fn device_path(&self, handle: HiiHandle) -> Result<Vec<u8>> {
        let state = self.state.lock();
        state.list(handle)?.device_path().map(<[u8]>::to_vec).ok_or(HiiError::NotFound)
    }
}
