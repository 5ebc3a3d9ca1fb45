//! Keyword configuration strings
//!
//! A keyword string addresses form questions by name instead of by storage
//! offset:
//!
//! ```text
//! NAMESPACE=x-UEFI-ns&PATH=<hex>&KEYWORD=Name&VALUE=<hex>[&READONLY]
//! ```
//!
//! [`Database::set_data`](crate::Database::set_data) turns such elements
//! into one `<MultiConfigResp>` and hands it to a [`ConfigRouter`];
//! [`Database::get_data`](crate::Database::get_data) builds one
//! `<ConfigRequest>` per keyword, asks the router for the value and answers
//! with keyword responses joined by `&`.

mod config_string;
mod handler;
mod parser;

use alloc::string::String;
use core::fmt;

use crate::error::{HiiError, Result};

pub use config_string::lower_config_string;
pub use parser::Filter;

/// Where processing of a keyword string stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ProgressKind {
    NoError = 0x0,
    NamespaceIdNotFound = 0x1,
    MalformedString = 0x2,
    KeywordNotFound = 0x4,
    IncompatibleValue = 0x8,
    AccessNotPermitted = 0x10,
    Undefined = 0x8000_0000,
}

impl ProgressKind {
    pub const fn bits(self) -> u32 {
        self as u32
    }
}

/// Failure of a keyword operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordError {
    pub status: HiiError,
    /// Byte index into the keyword string where processing stopped
    pub progress: usize,
    pub kind: ProgressKind,
    /// Responses produced before the failing element; always empty for set
    pub partial: String,
}

impl KeywordError {
    pub(crate) fn new(status: HiiError, kind: ProgressKind, progress: usize) -> Self {
        Self {
            status,
            progress,
            kind,
            partial: String::new(),
        }
    }
}

impl fmt::Display for KeywordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at byte {} (progress {:#x})",
            self.status,
            self.progress,
            self.kind.bits()
        )
    }
}

/// Storage side of the keyword handler
///
/// Implemented by whatever owns the variable stores behind the forms.
pub trait ConfigRouter {
    /// Answer a `<ConfigRequest>` with a `<ConfigResp>` holding `&VALUE=`
    fn extract_config(&self, request: &str) -> Result<String>;

    /// Write every element of a `<MultiConfigResp>` to storage
    fn route_config(&self, response: &str) -> Result<()>;
}
