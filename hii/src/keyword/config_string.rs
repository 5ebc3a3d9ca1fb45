//! `<ConfigHdr>` and request element construction

use alloc::string::String;
use core::fmt::Write;

use crate::device_path::encode_hex;
use crate::error::{HiiError, Result};
use crate::form::VarStore;

/// Storage a question is addressed through
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Element {
    /// Buffer and EFI variable stores
    Offset { offset: u16, width: u16 },
    /// Name/value stores, by the text of the question's name string
    Name(String),
}

/// Lowercase every hex digit between a `=` and the next `&`
pub fn lower_config_string(config: &str) -> String {
    let mut lower = false;
    config
        .chars()
        .map(|c| {
            match c {
                '=' => lower = true,
                '&' => lower = false,
                'A'..='F' if lower => return c.to_ascii_lowercase(),
                _ => {}
            }
            c
        })
        .collect()
}

/// `GUID=<hex>&NAME=<hex>&PATH=<hex>` for `store` reached through `device_path`
///
/// The GUID is written byte by byte in memory order, the ASCII store name
/// as four hex digits per character. Name/value stores have an empty name.
pub(crate) fn config_hdr(store: &VarStore<'_>, device_path: &[u8]) -> String {
    let mut hdr = String::from("GUID=");
    hdr.push_str(&encode_hex(&store.guid().to_bytes()));
    hdr.push_str("&NAME=");
    for byte in store.name().unwrap_or_default() {
        let _ = write!(hdr, "{:04x}", byte);
    }
    hdr.push_str("&PATH=");
    hdr.push_str(&encode_hex(device_path));
    lower_config_string(&hdr)
}

pub(crate) fn request_element(element: &Element) -> String {
    match element {
        Element::Offset { offset, width } => alloc::format!("OFFSET={:04X}&WIDTH={:04X}", offset, width),
        Element::Name(name) => name.clone(),
    }
}

/// `&VALUE=<hex>` section of a router response
pub(crate) fn value_section(response: &str) -> Result<&str> {
    let start = response.find("&VALUE=").ok_or(HiiError::InvalidFormat)?;
    let rest = &response[start..];
    let end = rest[1..].find('&').map_or(rest.len(), |end| end + 1);
    Ok(&rest[..end])
}
