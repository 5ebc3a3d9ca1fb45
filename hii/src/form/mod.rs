//! Form (IFR) packages

pub mod defaults;
pub mod ifr;

use alloc::vec::Vec;

use crate::error::{HiiError, Result};
use crate::types::{PackageHeader, PackageType, PACKAGE_HEADER_SIZE};

pub use defaults::{apply_defaults, DefaultValueSource};
pub use ifr::{IfrOp, IfrOps, QuestionHeader, VarStore};

/// Stored form package, header included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPackage {
    raw: Vec<u8>,
}

impl FormPackage {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let header = PackageHeader::parse(bytes)?;
        if header.package_type != PackageType::Forms.as_u8() || header.length as usize != bytes.len() {
            return Err(HiiError::InvalidInput);
        }
        Ok(Self { raw: bytes.to_vec() })
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.len() == PACKAGE_HEADER_SIZE
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// IFR opcode stream
    pub fn ifr(&self) -> &[u8] {
        &self.raw[PACKAGE_HEADER_SIZE..]
    }

    pub fn ops(&self) -> IfrOps<'_> {
        IfrOps::new(self.ifr())
    }

    /// Refresh default flags and values from `source`
    pub fn apply_defaults(&mut self, source: &dyn DefaultValueSource) {
        apply_defaults(&mut self.raw[PACKAGE_HEADER_SIZE..], source);
    }

    /// First statement whose prompt is `string_id`
    pub fn find_question(&self, string_id: u16) -> Option<IfrOp<'_>> {
        self.ops()
            .map_while(|op| op.ok())
            .find(|op| op.is_statement() && op.prompt().ok() == Some(string_id))
    }

    /// Variable store declared with `var_store_id`
    pub fn find_storage(&self, var_store_id: u16) -> Option<VarStore<'_>> {
        self.ops()
            .map_while(|op| op.ok())
            .filter(|op| op.is_storage())
            .filter_map(|op| VarStore::parse(&op).ok())
            .find(|store| store.id() == var_store_id)
    }

    /// Storage width of `question`
    pub fn question_width(&self, question: &IfrOp<'_>) -> Result<u16> {
        ifr::question_width(self.ifr(), question)
    }
}
