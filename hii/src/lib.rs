//! Morpheus HII Database
//!
//! In-memory store of human interface infrastructure packages: strings,
//! images, fonts, forms, keyboard layouts and device paths grouped into
//! package lists. On top of the store sit a package notification bus and a
//! keyword engine that reads and writes form questions through
//! `NAMESPACE=...&KEYWORD=...` configuration strings.
//!
//! Designed to be no_std compatible.

#![no_std]
#![allow(clippy::new_without_default)]
#![allow(clippy::len_without_is_empty)]

extern crate alloc;

pub mod config;
pub mod device_path;
pub mod error;
pub mod font;
pub mod form;
pub mod gpt;
pub mod image;
pub mod index;
pub mod keyboard;
pub mod keyword;
pub mod logger;
pub mod notify;
pub mod package_list;
pub mod registry;
pub mod stream;
pub mod string;
pub mod types;

mod database;

pub use config::{DatabaseConfig, DEFAULT_PLATFORM_LANGUAGE, UEFI_CONFIG_LANG};
pub use database::Database;
pub use error::{HiiError, Result};
pub use font::{FontInfo, GlyphCell};
pub use form::DefaultValueSource;
pub use image::{BltPixel, DecoderRegistry, Image, ImageDecoder};
pub use keyword::{ConfigRouter, Filter, KeywordError, ProgressKind};
pub use notify::{NotifyFn, NotifyHandle, NotifyType, PackageEvent};
pub use registry::{CapabilityRegistry, MemoryRegistry};
pub use types::{DriverHandle, HiiHandle, PackageKind, PackageType};
