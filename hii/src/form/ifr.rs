//! IFR opcode walking
//!
//! Every opcode starts with `{opcode u8, length:7 | scope:1}`. Questions
//! follow it with an 11-byte question header:
//!
//! ```text
//! +0 opcode  +1 len|scope  +2 prompt  +4 help  +6 question id
//! +8 varstore id  +10 varstore offset or name id  +12 flags
//! ```

use uguid::Guid;

use crate::error::{HiiError, Result};
use crate::stream::{guid_at, u16_at, u32_at, Cursor};

pub const IFR_FORM_OP: u8 = 0x01;
pub const IFR_SUBTITLE_OP: u8 = 0x02;
pub const IFR_TEXT_OP: u8 = 0x03;
pub const IFR_ONE_OF_OP: u8 = 0x05;
pub const IFR_CHECKBOX_OP: u8 = 0x06;
pub const IFR_NUMERIC_OP: u8 = 0x07;
pub const IFR_PASSWORD_OP: u8 = 0x08;
pub const IFR_ONE_OF_OPTION_OP: u8 = 0x09;
pub const IFR_ACTION_OP: u8 = 0x0C;
pub const IFR_RESET_BUTTON_OP: u8 = 0x0D;
pub const IFR_FORM_SET_OP: u8 = 0x0E;
pub const IFR_REF_OP: u8 = 0x0F;
pub const IFR_DATE_OP: u8 = 0x1A;
pub const IFR_TIME_OP: u8 = 0x1B;
pub const IFR_STRING_OP: u8 = 0x1C;
pub const IFR_ORDERED_LIST_OP: u8 = 0x23;
pub const IFR_VARSTORE_OP: u8 = 0x24;
pub const IFR_VARSTORE_NAME_VALUE_OP: u8 = 0x25;
pub const IFR_VARSTORE_EFI_OP: u8 = 0x26;
pub const IFR_END_OP: u8 = 0x29;
pub const IFR_DEFAULT_OP: u8 = 0x5B;
pub const IFR_DEFAULTSTORE_OP: u8 = 0x5C;
pub const IFR_FORM_MAP_OP: u8 = 0x5D;
pub const IFR_GUID_OP: u8 = 0x5F;

pub const IFR_TYPE_NUM_SIZE_8: u8 = 0x00;
pub const IFR_TYPE_NUM_SIZE_16: u8 = 0x01;
pub const IFR_TYPE_NUM_SIZE_32: u8 = 0x02;
pub const IFR_TYPE_NUM_SIZE_64: u8 = 0x03;
pub const IFR_TYPE_BOOLEAN: u8 = 0x04;
pub const IFR_TYPE_BUFFER: u8 = 0x0B;

/// Question flag: value cannot be changed
pub const IFR_FLAG_READ_ONLY: u8 = 0x01;
pub const IFR_NUMERIC_SIZE: u8 = 0x03;
/// Bit width mask of numeric/one-of flags for bit-field questions
pub const IFR_NUMERIC_SIZE_BIT: u8 = 0x3F;

pub const IFR_CHECKBOX_DEFAULT: u8 = 0x01;
pub const IFR_CHECKBOX_DEFAULT_MFG: u8 = 0x02;
pub const IFR_OPTION_DEFAULT: u8 = 0x10;
pub const IFR_OPTION_DEFAULT_MFG: u8 = 0x20;

/// Op header plus question header
pub const QUESTION_DATA_OFFSET: usize = 13;

/// `EFI_HII_REF` value width
const REF_WIDTH: u16 = 22;
const DATE_WIDTH: u16 = 4;
const TIME_WIDTH: u16 = 3;

/// One opcode inside a form package's IFR stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfrOp<'a> {
    /// Offset inside the IFR stream
    pub offset: usize,
    pub opcode: u8,
    pub scope: bool,
    /// Whole opcode, header included
    pub bytes: &'a [u8],
}

impl<'a> IfrOp<'a> {
    pub fn is_statement(&self) -> bool {
        matches!(
            self.opcode,
            IFR_SUBTITLE_OP
                | IFR_TEXT_OP
                | IFR_RESET_BUTTON_OP
                | IFR_REF_OP
                | IFR_ACTION_OP
                | IFR_NUMERIC_OP
                | IFR_ORDERED_LIST_OP
                | IFR_CHECKBOX_OP
                | IFR_STRING_OP
                | IFR_PASSWORD_OP
                | IFR_DATE_OP
                | IFR_TIME_OP
                | IFR_GUID_OP
                | IFR_ONE_OF_OP
        )
    }

    pub fn is_storage(&self) -> bool {
        matches!(
            self.opcode,
            IFR_VARSTORE_OP | IFR_VARSTORE_NAME_VALUE_OP | IFR_VARSTORE_EFI_OP
        )
    }

    /// Prompt string id of a statement
    pub fn prompt(&self) -> Result<u16> {
        u16_at(self.bytes, 2)
    }

    pub fn question(&self) -> Result<QuestionHeader> {
        let mut cursor = Cursor::at(self.bytes, 2)?;
        Ok(QuestionHeader {
            prompt: cursor.read_u16()?,
            help: cursor.read_u16()?,
            question_id: cursor.read_u16()?,
            var_store_id: cursor.read_u16()?,
            var_store_info: cursor.read_u16()?,
            flags: cursor.read_u8()?,
        })
    }

    /// Flags byte right after the question header (one-of, numeric, checkbox)
    pub fn question_flags(&self) -> Result<u8> {
        self.bytes
            .get(QUESTION_DATA_OFFSET)
            .copied()
            .ok_or(HiiError::InvalidFormat)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionHeader {
    pub prompt: u16,
    pub help: u16,
    pub question_id: u16,
    pub var_store_id: u16,
    /// Byte (or bit) offset for buffer stores, name string id for name/value stores
    pub var_store_info: u16,
    pub flags: u8,
}

impl QuestionHeader {
    pub fn is_read_only(&self) -> bool {
        self.flags & IFR_FLAG_READ_ONLY != 0
    }
}

/// Walks the opcodes of an IFR stream
pub struct IfrOps<'a> {
    cursor: Cursor<'a>,
}

impl<'a> IfrOps<'a> {
    pub fn new(ifr: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(ifr),
        }
    }
}

pub(crate) fn op_header(data: &[u8], offset: usize) -> Result<(u8, usize, bool)> {
    let header = data.get(offset..offset + 2).ok_or(HiiError::InvalidFormat)?;
    let length = (header[1] & 0x7F) as usize;
    if length < 2 {
        return Err(HiiError::InvalidFormat);
    }
    Ok((header[0], length, header[1] & 0x80 != 0))
}

impl<'a> Iterator for IfrOps<'a> {
    type Item = Result<IfrOp<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.remaining() == 0 {
            return None;
        }
        let offset = self.cursor.position();
        let data = self.cursor.data();
        let op = op_header(data, offset).and_then(|(opcode, length, scope)| {
            self.cursor.skip(length)?;
            Ok(IfrOp {
                offset,
                opcode,
                scope,
                bytes: &data[offset..offset + length],
            })
        });
        if op.is_err() {
            // Stop at the first malformed opcode
            self.cursor = Cursor::new(&[]);
        }
        Some(op)
    }
}

/// Variable store declared by a form package
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarStore<'a> {
    /// Byte buffer addressed by offset
    Buffer {
        id: u16,
        guid: Guid,
        size: u16,
        name: &'a [u8],
    },
    /// Named values addressed by string id
    NameValue { id: u16, guid: Guid },
    /// UEFI variable addressed by offset
    Efi {
        id: u16,
        guid: Guid,
        attributes: u32,
        size: u16,
        name: &'a [u8],
    },
}

impl<'a> VarStore<'a> {
    pub fn parse(op: &IfrOp<'a>) -> Result<Self> {
        let bytes = op.bytes;
        match op.opcode {
            IFR_VARSTORE_OP => Ok(Self::Buffer {
                guid: guid_at(bytes, 2)?,
                id: u16_at(bytes, 18)?,
                size: u16_at(bytes, 20)?,
                name: Cursor::at(bytes, 22)?.read_ascii_z()?,
            }),
            IFR_VARSTORE_NAME_VALUE_OP => Ok(Self::NameValue {
                id: u16_at(bytes, 2)?,
                guid: guid_at(bytes, 4)?,
            }),
            IFR_VARSTORE_EFI_OP => Ok(Self::Efi {
                id: u16_at(bytes, 2)?,
                guid: guid_at(bytes, 4)?,
                attributes: u32_at(bytes, 20)?,
                size: u16_at(bytes, 24)?,
                name: Cursor::at(bytes, 26)?.read_ascii_z()?,
            }),
            _ => Err(HiiError::InvalidInput),
        }
    }

    pub fn id(&self) -> u16 {
        match self {
            Self::Buffer { id, .. } | Self::NameValue { id, .. } | Self::Efi { id, .. } => *id,
        }
    }

    pub fn guid(&self) -> Guid {
        match self {
            Self::Buffer { guid, .. } | Self::NameValue { guid, .. } | Self::Efi { guid, .. } => *guid,
        }
    }

    /// ASCII store name; name/value stores have none
    pub fn name(&self) -> Option<&'a [u8]> {
        match self {
            Self::Buffer { name, .. } | Self::Efi { name, .. } => Some(name),
            Self::NameValue { .. } => None,
        }
    }
}

/// Byte width of a numeric value type, `None` for non-numeric types
pub fn type_width(value_type: u8) -> Option<u16> {
    match value_type {
        IFR_TYPE_NUM_SIZE_8 => Some(1),
        IFR_TYPE_NUM_SIZE_16 => Some(2),
        IFR_TYPE_NUM_SIZE_32 => Some(4),
        IFR_TYPE_NUM_SIZE_64 => Some(8),
        _ => None,
    }
}

/// Storage width of the question at `op`
///
/// Ordered lists take their element width from the option that must follow
/// them in `ifr`.
pub fn question_width(ifr: &[u8], op: &IfrOp<'_>) -> Result<u16> {
    match op.opcode {
        IFR_REF_OP => Ok(REF_WIDTH),
        IFR_ONE_OF_OP | IFR_NUMERIC_OP => Ok(1 << (op.question_flags()? & IFR_NUMERIC_SIZE)),
        IFR_CHECKBOX_OP => Ok(1),
        IFR_ORDERED_LIST_OP => {
            let max_containers = op.question_flags()? as u16;
            let next = op.offset + op.bytes.len();
            let (opcode, _, _) = op_header(ifr, next)?;
            if opcode != IFR_ONE_OF_OPTION_OP {
                return Err(HiiError::InvalidFormat);
            }
            let value_type = *ifr.get(next + 5).ok_or(HiiError::InvalidFormat)?;
            let width = type_width(value_type).ok_or(HiiError::InvalidFormat)?;
            Ok(width * max_containers)
        }
        IFR_STRING_OP => {
            let max_size = *op.bytes.get(QUESTION_DATA_OFFSET + 1).ok_or(HiiError::InvalidFormat)?;
            Ok(max_size as u16 * 2)
        }
        IFR_PASSWORD_OP => Ok(u16_at(op.bytes, QUESTION_DATA_OFFSET + 2)? * 2),
        IFR_DATE_OP => Ok(DATE_WIDTH),
        IFR_TIME_OP => Ok(TIME_WIDTH),
        _ => Err(HiiError::Unsupported),
    }
}
