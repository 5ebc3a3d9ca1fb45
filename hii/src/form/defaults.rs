//! Default-value refresh for freshly inserted form packages
//!
//! Questions backed by an EFI variable store get their checkbox default
//! flags, one-of option default flags and `DEFAULT` opcode values rewritten
//! from a [`DefaultValueSource`]. The pass only starts touching questions
//! once at least one EFI store has standard defaults and at least one
//! default store is declared; otherwise it stops at the first form.

use alloc::vec::Vec;

use uguid::{guid, Guid};

use super::ifr::*;
use crate::stream::{u16_at, Cursor};

/// Default class ids
pub const DEFAULT_CLASS_STANDARD: u16 = 0x0000;
pub const DEFAULT_CLASS_MANUFACTURING: u16 = 0x0001;

/// GUID opcode marking the enclosed questions as bit-field questions
pub const IFR_BIT_VARSTORE_GUID: Guid = guid!("82ddd68b-9163-4187-9b27-20a8fd60a71d");

/// Platform default variable contents
pub trait DefaultValueSource: Send + Sync {
    /// Contents of the variable `(guid, attributes, name)` under default
    /// store `default_id`, or `None` when that store has no such variable
    fn variable(&self, default_id: u16, guid: &Guid, attributes: u32, name: &str) -> Option<Vec<u8>>;
}

#[derive(Debug, Clone)]
struct EfiStore {
    id: u16,
    guid: Guid,
    attributes: u32,
    name: alloc::string::String,
}

/// Read `width` bytes (or bits for bit-field questions) at `offset` of the
/// default variable backing `store`
fn find_default(
    source: &dyn DefaultValueSource,
    default_id: u16,
    store: &EfiStore,
    offset: u16,
    width: usize,
    bit_field: bool,
) -> Option<Vec<u8>> {
    let data = source.variable(default_id, &store.guid, store.attributes, &store.name)?;
    if !bit_field {
        let start = offset as usize;
        return data.get(start..start + width).map(<[u8]>::to_vec);
    }

    if width == 0 || width > 32 {
        return None;
    }
    let byte_offset = offset as usize / 8;
    let start_bit = offset as usize % 8;
    let end_bit = start_bit + width - 1;
    let byte_width = end_bit / 8 + 1;
    let raw = data.get(byte_offset..byte_offset + byte_width)?;
    let mut buf = [0u8; 8];
    buf[..byte_width].copy_from_slice(raw);
    let word = u64::from_le_bytes(buf);
    let mask = (1u64 << width) - 1;
    let value = (word >> start_bit) & mask;
    Some(value.to_le_bytes()[..byte_width].to_vec())
}

fn store_index(stores: &[EfiStore], var_store_id: u16) -> Option<usize> {
    stores.iter().position(|s| s.id == var_store_id)
}

struct OpenQuestion {
    opcode: u8,
    header: QuestionHeader,
    width: usize,
}

/// Rewrite default flags and values inside `ifr` in place
pub fn apply_defaults(ifr: &mut [u8], source: &dyn DefaultValueSource) {
    let mut stores: Vec<EfiStore> = Vec::new();
    let mut default_ids: Vec<u16> = Vec::new();
    let mut question: Option<OpenQuestion> = None;
    let mut scope: u32 = 0;
    let mut bit_field = false;
    let mut standard: Option<Vec<u8>> = None;
    let mut manufacturing: Option<Vec<u8>> = None;

    let mut offset = 0;
    while offset < ifr.len() {
        let Ok((opcode, length, _)) = op_header(ifr, offset) else {
            log::warn!("hii: malformed opcode at {:#x} during default refresh", offset);
            return;
        };
        if offset + length > ifr.len() {
            return;
        }
        let op_range = offset..offset + length;
        let op = IfrOp {
            offset,
            opcode,
            scope: false,
            bytes: &ifr[op_range.clone()],
        };

        match opcode {
            IFR_VARSTORE_EFI_OP => {
                if let Ok(VarStore::Efi {
                    id,
                    guid,
                    attributes,
                    size,
                    name,
                }) = VarStore::parse(&op)
                {
                    let store = EfiStore {
                        id,
                        guid,
                        attributes,
                        name: name.iter().map(|&b| b as char).collect(),
                    };
                    if find_default(source, DEFAULT_CLASS_STANDARD, &store, 0, size as usize, false).is_some() {
                        stores.push(store);
                    }
                }
            }
            IFR_DEFAULTSTORE_OP => {
                if let Ok(id) = u16_at(op.bytes, 4) {
                    default_ids.push(id);
                }
            }
            IFR_FORM_OP | IFR_FORM_MAP_OP => {
                if stores.is_empty() || default_ids.is_empty() {
                    return;
                }
            }
            IFR_CHECKBOX_OP => {
                scope = op.bytes[1] as u32 >> 7;
                let Ok(header) = op.question() else { return };
                question = Some(OpenQuestion {
                    opcode,
                    header,
                    width: 1,
                });
                if let Some(index) = store_index(&stores, header.var_store_id) {
                    let store = stores[index].clone();
                    let mut flags = op.question_flags().unwrap_or(0);
                    for &default_id in &default_ids {
                        let bit = match default_id {
                            DEFAULT_CLASS_STANDARD => IFR_CHECKBOX_DEFAULT,
                            DEFAULT_CLASS_MANUFACTURING => IFR_CHECKBOX_DEFAULT_MFG,
                            _ => continue,
                        };
                        if let Some(value) =
                            find_default(source, default_id, &store, header.var_store_info, 1, bit_field)
                        {
                            if value[0] != 0 {
                                flags |= bit;
                            } else {
                                flags &= !bit;
                            }
                        }
                    }
                    if QUESTION_DATA_OFFSET < length {
                        ifr[offset + QUESTION_DATA_OFFSET] = flags;
                    }
                }
            }
            IFR_NUMERIC_OP | IFR_ONE_OF_OP => {
                scope = op.bytes[1] as u32 >> 7;
                let Ok(header) = op.question() else { return };
                let flags = op.question_flags().unwrap_or(0);
                let width = if bit_field {
                    (flags & IFR_NUMERIC_SIZE_BIT) as usize
                } else {
                    1usize << (flags & IFR_NUMERIC_SIZE)
                };
                if opcode == IFR_ONE_OF_OP {
                    standard = None;
                    manufacturing = None;
                    if let Some(index) = store_index(&stores, header.var_store_id) {
                        for &default_id in &default_ids {
                            let found =
                                find_default(source, default_id, &stores[index], header.var_store_info, width, bit_field);
                            match default_id {
                                DEFAULT_CLASS_STANDARD if found.is_some() => standard = found,
                                DEFAULT_CLASS_MANUFACTURING if found.is_some() => manufacturing = found,
                                _ => {}
                            }
                        }
                    }
                }
                question = Some(OpenQuestion { opcode, header, width });
            }
            IFR_ORDERED_LIST_OP => {
                scope = op.bytes[1] as u32 >> 7;
                let Ok(header) = op.question() else { return };
                question = Some(OpenQuestion {
                    opcode,
                    header,
                    width: 0,
                });
            }
            IFR_ONE_OF_OPTION_OP => {
                if let Some(open) = question.as_ref().filter(|q| q.opcode == IFR_ONE_OF_OP && scope > 0) {
                    let value_type = op.bytes.get(5).copied().unwrap_or(0);
                    let width = type_width(value_type).map_or(open.width, |w| w as usize);
                    let value = op.bytes.get(6..6 + width);
                    let mut flags = op.bytes.get(4).copied().unwrap_or(0);
                    if let Some(default) = &standard {
                        if value.is_some() && default.get(..width) == value {
                            flags |= IFR_OPTION_DEFAULT;
                        } else {
                            flags &= !IFR_OPTION_DEFAULT;
                        }
                    }
                    if let Some(default) = &manufacturing {
                        if value.is_some() && default.get(..width) == value {
                            flags |= IFR_OPTION_DEFAULT_MFG;
                        } else {
                            flags &= !IFR_OPTION_DEFAULT_MFG;
                        }
                    }
                    // Options too short to carry flags are left alone
                    if length > 4 {
                        ifr[offset + 4] = flags;
                    }
                }
            }
            IFR_DEFAULT_OP => {
                if let Some(open) = question.as_ref().filter(|_| scope > 0) {
                    let mut cursor = Cursor::at(op.bytes, 2).ok();
                    let default_id = cursor.as_mut().and_then(|c| c.read_u16().ok());
                    let value_type = cursor.as_mut().and_then(|c| c.read_u8().ok());
                    let width = if bit_field {
                        open.width
                    } else {
                        match value_type {
                            Some(IFR_TYPE_BOOLEAN) => 1,
                            Some(IFR_TYPE_BUFFER) => length.saturating_sub(5),
                            Some(t) => type_width(t).unwrap_or(0) as usize,
                            None => 0,
                        }
                    };
                    let index = store_index(&stores, open.header.var_store_id);
                    if let (Some(default_id), Some(index), true) = (default_id, index, width > 0) {
                        if let Some(value) = find_default(
                            source,
                            default_id,
                            &stores[index],
                            open.header.var_store_info,
                            width,
                            bit_field,
                        ) {
                            let start = offset + 5;
                            let end = (start + value.len()).min(offset + length);
                            if start < end {
                                ifr[start..end].copy_from_slice(&value[..end - start]);
                            }
                        }
                    }
                }
            }
            IFR_END_OP => {
                if question.is_some() {
                    scope = scope.saturating_sub(1);
                    if scope == 0 {
                        question = None;
                        bit_field = false;
                    }
                }
            }
            IFR_GUID_OP => {
                if crate::stream::guid_at(op.bytes, 2).ok() == Some(IFR_BIT_VARSTORE_GUID) {
                    bit_field = true;
                }
            }
            _ => {}
        }

        offset += length;
        // The scope count tracks the scope bit of the opcode that follows
        if scope > 0 {
            if let Ok((_, _, next_scope)) = op_header(ifr, offset) {
                scope += next_scope as u32;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    const STORE_GUID: Guid = guid!("11111111-2222-3333-4444-555555555555");

    struct Fixed(Vec<u8>);

    impl DefaultValueSource for Fixed {
        fn variable(&self, default_id: u16, guid: &Guid, _attributes: u32, name: &str) -> Option<Vec<u8>> {
            if default_id == DEFAULT_CLASS_STANDARD && *guid == STORE_GUID && name == "Setup" {
                Some(self.0.clone())
            } else {
                None
            }
        }
    }

    fn efi_store() -> Vec<u8> {
        let mut op = vec![IFR_VARSTORE_EFI_OP, 32];
        op.extend_from_slice(&1u16.to_le_bytes());
        op.extend_from_slice(&STORE_GUID.to_bytes());
        op.extend_from_slice(&7u32.to_le_bytes());
        op.extend_from_slice(&4u16.to_le_bytes());
        op.extend_from_slice(b"Setup\0");
        op
    }

    fn ifr_with(question: &[u8]) -> Vec<u8> {
        let mut ifr = efi_store();
        ifr.extend_from_slice(&[IFR_DEFAULTSTORE_OP, 6, 0, 0, 0, 0]);
        ifr.extend_from_slice(&[IFR_FORM_OP, 6, 1, 0, 0, 0]);
        ifr.extend_from_slice(question);
        ifr
    }

    fn question_header(opcode: u8, length: u8, offset: u16, scope: bool) -> Vec<u8> {
        let mut op = vec![opcode, length | if scope { 0x80 } else { 0 }];
        op.extend_from_slice(&[2, 0, 0, 0, 1, 0, 1, 0]);
        op.extend_from_slice(&offset.to_le_bytes());
        op.push(0);
        op
    }

    #[test]
    fn test_checkbox_default_flag_follows_variable() {
        let mut checkbox = question_header(IFR_CHECKBOX_OP, 14, 2, false);
        checkbox.push(0);
        let mut ifr = ifr_with(&checkbox);
        let flags_at = ifr.len() - 1;

        apply_defaults(&mut ifr, &Fixed(vec![0, 0, 1, 0]));
        assert_eq!(ifr[flags_at], IFR_CHECKBOX_DEFAULT);

        apply_defaults(&mut ifr, &Fixed(vec![0, 0, 0, 0]));
        assert_eq!(ifr[flags_at], 0);
    }

    #[test]
    fn test_one_of_option_marked_default() {
        let mut one_of = question_header(IFR_ONE_OF_OP, 14, 0, true);
        one_of.push(0x00);
        for value in [3u8, 5] {
            one_of.extend_from_slice(&[IFR_ONE_OF_OPTION_OP, 7, 0, 0, IFR_OPTION_DEFAULT, IFR_TYPE_NUM_SIZE_8, value]);
        }
        one_of.extend_from_slice(&[IFR_END_OP, 2]);
        let mut ifr = ifr_with(&one_of);
        let second_flags = ifr.len() - 2 - 7 + 4;
        let first_flags = second_flags - 7;

        apply_defaults(&mut ifr, &Fixed(vec![5, 0, 0, 0]));
        assert_eq!(ifr[first_flags], 0);
        assert_eq!(ifr[second_flags], IFR_OPTION_DEFAULT);
    }

    #[test]
    fn test_truncated_option_left_alone() {
        let mut one_of = question_header(IFR_ONE_OF_OP, 14, 0, true);
        one_of.push(0x00);
        one_of.extend_from_slice(&[IFR_ONE_OF_OPTION_OP, 2]);
        let mut ifr = ifr_with(&one_of);
        let before = ifr.clone();
        apply_defaults(&mut ifr, &Fixed(vec![5, 0, 0, 0]));
        assert_eq!(ifr, before);

        // A short option followed by other opcodes must not touch them
        one_of.extend_from_slice(&[IFR_END_OP, 2, IFR_END_OP, 2]);
        let mut ifr = ifr_with(&one_of);
        let before = ifr.clone();
        apply_defaults(&mut ifr, &Fixed(vec![5, 0, 0, 0]));
        assert_eq!(ifr, before);
    }

    #[test]
    fn test_truncated_bit_field_default_left_alone() {
        let mut body = vec![IFR_GUID_OP, 18];
        body.extend_from_slice(&IFR_BIT_VARSTORE_GUID.to_bytes());
        let mut numeric = question_header(IFR_NUMERIC_OP, 14, 0, true);
        numeric.push(4);
        body.extend_from_slice(&numeric);
        body.extend_from_slice(&[IFR_DEFAULT_OP, 4, 0, 0]);
        body.extend_from_slice(&[IFR_END_OP, 2]);
        let mut ifr = ifr_with(&body);
        let before = ifr.clone();
        apply_defaults(&mut ifr, &Fixed(vec![0x0F, 0, 0, 0]));
        assert_eq!(ifr, before);
    }

    #[test]
    fn test_no_default_store_leaves_form_untouched() {
        let mut checkbox = question_header(IFR_CHECKBOX_OP, 14, 2, false);
        checkbox.push(IFR_CHECKBOX_DEFAULT);
        let mut ifr = efi_store();
        ifr.extend_from_slice(&[IFR_FORM_OP, 6, 1, 0, 0, 0]);
        ifr.extend_from_slice(&checkbox);
        let before = ifr.clone();
        apply_defaults(&mut ifr, &Fixed(vec![0; 4]));
        assert_eq!(ifr, before);
    }

    #[test]
    fn test_bit_field_extraction() {
        let store = EfiStore {
            id: 1,
            guid: STORE_GUID,
            attributes: 7,
            name: "Setup".into(),
        };
        // bits 4..7 of byte 1 hold 0b1010
        let source = Fixed(vec![0, 0xA0, 0, 0]);
        let value = find_default(&source, DEFAULT_CLASS_STANDARD, &store, 12, 4, true).unwrap();
        assert_eq!(value, vec![0x0A]);
    }
}
