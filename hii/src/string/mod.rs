//! String packages
//!
//! Block codec, package storage, id indirection and language tag helpers.

pub mod block;
pub mod language;
pub mod package;

pub use block::{RawText, StringBlock, StringBlocks, StringFont};
pub use language::{compare_language, primary_language, secondary_languages};
pub use package::StringPackage;
