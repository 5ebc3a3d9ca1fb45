//! Error types for HII database operations

use core::fmt;

/// Result type for HII database operations
pub type Result<T> = core::result::Result<T, HiiError>;

/// Errors that can occur while storing, exporting or resolving HII data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HiiError {
    /// Malformed caller argument
    InvalidInput,

    /// Malformed package, block stream or device path
    InvalidFormat,

    /// Allocation failed
    OutOfMemory,

    /// A package would grow past the 24-bit length field
    OutOfResources,

    /// Unknown list, string, image or keyword
    NotFound,

    /// Multiplicity-1 or unique-language constraint violated
    DuplicateConstraintViolated,

    /// Output buffer too small; carries the required size in bytes
    BufferTooSmall(usize),

    /// No decoder or duplicate font
    Unsupported,

    /// Filter or read-only mismatch
    ///
    /// Keyword operations never return this status. They report mismatches
    /// as `InvalidInput` and carry `ProgressKind::IncompatibleValue` in the
    /// `KeywordError` instead.
    IncompatibleValue,

    /// Write attempted against a read-only field
    AccessDenied,

    /// Downstream storage failure
    DeviceError,

    /// No string package matches the requested language
    InvalidLanguage,
}

impl HiiError {
    /// Short static description, usable from the log ring buffer
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid input",
            Self::InvalidFormat => "invalid format",
            Self::OutOfMemory => "out of memory",
            Self::OutOfResources => "out of resources",
            Self::NotFound => "not found",
            Self::DuplicateConstraintViolated => "duplicate constraint violated",
            Self::BufferTooSmall(_) => "buffer too small",
            Self::Unsupported => "unsupported",
            Self::IncompatibleValue => "incompatible value",
            Self::AccessDenied => "access denied",
            Self::DeviceError => "device error",
            Self::InvalidLanguage => "invalid language",
        }
    }
}

impl fmt::Display for HiiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall(needed) => write!(f, "Buffer too small, {} bytes required", needed),
            Self::OutOfResources => write!(f, "Package length exceeds 24-bit limit"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}
