use alloc::vec::Vec;

use crate::device_path::parse_hex_path;
use crate::error::{HiiError, Result};
use crate::form::ifr::{IFR_CHECKBOX_OP, IFR_NUMERIC_OP, IFR_NUMERIC_SIZE, IFR_ONE_OF_OP};

const NAMESPACE_TAG: &str = "NAMESPACE=";
const PATH_TAG: &str = "PATH=";
const KEYWORD_TAG: &str = "KEYWORD=";
const VALUE_TAG: &str = "VALUE=";
const READONLY_TAG: &str = "&READONLY";

/// Trailing filter of a get element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    ReadOnly,
    ReadWrite,
    Buffer,
    /// `Numeric` or `Numeric:<width>`
    Numeric(Option<u16>),
}

impl Filter {
    /// Whether a question of `opcode` passes this filter
    ///
    /// `numeric_flags` is the flags byte of one-of and numeric questions.
    pub fn accepts(self, opcode: u8, numeric_flags: u8, read_only: bool) -> bool {
        let numeric = matches!(opcode, IFR_ONE_OF_OP | IFR_NUMERIC_OP | IFR_CHECKBOX_OP);
        match self {
            Self::ReadOnly => read_only,
            Self::ReadWrite => !read_only,
            Self::Buffer => !numeric,
            Self::Numeric(None) => numeric,
            // Checkboxes carry no size flags
            Self::Numeric(Some(width)) => {
                numeric && (opcode == IFR_CHECKBOX_OP || 1u16 << (numeric_flags & IFR_NUMERIC_SIZE) == width)
            }
        }
    }
}

/// Cursor over a keyword string
///
/// Every token may be preceded by one `&`. A token's value runs up to the
/// next `&` or the end of the string, and the cursor stops on that `&`.
/// A failed read leaves the cursor where it was.
pub(crate) struct Scanner<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    /// Start of the next token, past an optional `&`
    fn token_start(&self) -> usize {
        if self.text[self.pos..].starts_with('&') {
            self.pos + 1
        } else {
            self.pos
        }
    }

    fn tagged(&mut self, tag: &str) -> Result<&'a str> {
        let start = self.token_start();
        let value = self.text[start..].strip_prefix(tag).ok_or(HiiError::InvalidInput)?;
        let end = value.find('&').unwrap_or(value.len());
        self.pos = start + tag.len() + end;
        Ok(&value[..end])
    }

    pub fn namespace(&mut self) -> Result<&'a str> {
        self.tagged(NAMESPACE_TAG)
    }

    /// Optional `PATH=` token
    ///
    /// An element going straight to `KEYWORD=` has no path and leaves the
    /// cursor on the `&` before it. The hex payload must decode to a
    /// well-formed device path.
    pub fn device_path(&mut self) -> Result<Option<Vec<u8>>> {
        let start = self.token_start();
        let rest = &self.text[start..];
        let Some(hex) = rest.strip_prefix(PATH_TAG) else {
            if rest.starts_with(KEYWORD_TAG) {
                return Ok(None);
            }
            return Err(HiiError::InvalidInput);
        };
        let hex = &hex[..hex.find('&').unwrap_or(hex.len())];
        if hex.is_empty() {
            return Err(HiiError::InvalidInput);
        }
        let path = parse_hex_path(hex)?;
        self.pos = start + PATH_TAG.len() + hex.len();
        Ok(Some(path))
    }

    pub fn keyword(&mut self) -> Result<&'a str> {
        self.tagged(KEYWORD_TAG)
    }

    pub fn value(&mut self) -> Result<&'a str> {
        self.tagged(VALUE_TAG)
    }

    /// Consume a `&READONLY` marker
    pub fn read_only(&mut self) -> bool {
        if self.text[self.pos..].starts_with(READONLY_TAG) {
            self.pos += READONLY_TAG.len();
            true
        } else {
            false
        }
    }

    /// Next filter token, if the cursor sits on one
    ///
    /// Filters match by prefix. Anything else ends the filter section and
    /// leaves the cursor in place.
    pub fn filter(&mut self) -> Option<Filter> {
        let start = self.token_start();
        let rest = &self.text[start..];
        let (filter, len) = if rest.starts_with("ReadOnly") {
            (Filter::ReadOnly, 8)
        } else if rest.starts_with("ReadWrite") {
            (Filter::ReadWrite, 9)
        } else if rest.starts_with("Buffer") {
            (Filter::Buffer, 6)
        } else if let Some(tail) = rest.strip_prefix("Numeric") {
            match tail.as_bytes() {
                [b':', digit, ..] => {
                    let width = match *digit {
                        b'1' => 1,
                        b'2' => 2,
                        b'4' => 4,
                        b'8' => 8,
                        _ => return None,
                    };
                    (Filter::Numeric(Some(width)), 9)
                }
                _ => (Filter::Numeric(None), 7),
            }
        } else {
            return None;
        };
        self.pos = start + len;
        Some(filter)
    }
}
