use alloc::string::String;
use alloc::vec::Vec;

use super::{Database, State};
use crate::error::{HiiError, Result};
use crate::font::FontInfo;
use crate::notify::NotifyType;
use crate::package_list::Package;
use crate::string::block::encode_ucs2;
use crate::string::language::join_languages;
use crate::string::{compare_language, secondary_languages, StringFont, StringPackage};
use crate::types::{HiiHandle, PackageKind};

fn string_font(font: &FontInfo) -> StringFont {
    StringFont {
        font_id: 0,
        size: font.size,
        style: font.style,
        name: font.name.clone(),
    }
}

impl From<StringFont> for FontInfo {
    fn from(font: StringFont) -> Self {
        Self {
            name: font.name,
            size: font.size,
            style: font.style,
        }
    }
}

impl State {
    /// Whether a font package with this identity is registered anywhere
    fn font_registered(&self, font: &FontInfo) -> bool {
        self.records
            .iter()
            .flat_map(|r| r.list.fonts())
            .any(|f| f.info() == font)
    }
}

impl Database {
    /// Add a string to every language of a list
    ///
    /// The text goes to the package matching `language`; every other
    /// package receives a blank entry so all of them keep the same max id.
    /// Without a matching package one is created, which needs
    /// `language_name` for its id 1 string.
    pub fn new_string(
        &self,
        handle: HiiHandle,
        language: &str,
        language_name: Option<&str>,
        text: &str,
        font: Option<&FontInfo>,
    ) -> Result<u16> {
        let mut state = self.lock();
        let at = state.position(handle)?;
        if let Some(font) = font {
            if !state.font_registered(font) {
                return Err(HiiError::InvalidInput);
            }
        }
        let font = font.map(string_font);

        let list = &state.records[at].list;
        let matched = list.find_strings(language);
        if matched.is_none() && language_name.is_none() {
            return Err(HiiError::InvalidInput);
        }
        let new_id = list
            .max_string_id()
            .checked_add(1)
            .ok_or(HiiError::OutOfResources)?
            .max(2);

        // Stage on copies so a failing package leaves the list untouched
        let mut staged: Vec<StringPackage> = list.strings().to_vec();
        let blank = encode_ucs2("", None);
        for (index, package) in staged.iter_mut().enumerate() {
            if Some(index) == matched {
                let id = package.append_string(text, font.as_ref())?;
                debug_assert_eq!(id, new_id);
            } else {
                package.append_block(&blank)?;
            }
        }
        let created = match (matched, language_name) {
            (None, Some(name)) => {
                let mut package = StringPackage::create(language, name, new_id)?;
                package.append_string(text, font.as_ref())?;
                Some(package)
            }
            _ => None,
        };

        *state.records[at].list.strings_mut() = staged;
        if let Some(package) = created {
            let index = state.records[at].list.insert(Package::String(package))?;
            state.notify(at, PackageKind::String, index, NotifyType::New)?;
        }
        log::debug!("hii: new string {} in {} for {}", new_id, handle, language);
        Ok(new_id)
    }

    /// Text and font of `string_id` in `language`
    ///
    /// An id present only in other languages is [`HiiError::InvalidLanguage`].
    pub fn get_string(&self, handle: HiiHandle, language: &str, string_id: u16) -> Result<(String, Option<FontInfo>)> {
        if string_id == 0 {
            return Err(HiiError::InvalidInput);
        }
        let state = self.lock();
        let list = state.list(handle)?;
        for package in list.strings().iter().filter(|p| compare_language(p.language(), language)) {
            match package.get_string(string_id) {
                Ok((text, font)) => return Ok((text, font.map(FontInfo::from))),
                Err(HiiError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        if list.strings().iter().any(|p| p.get_string(string_id).is_ok()) {
            return Err(HiiError::InvalidLanguage);
        }
        Err(HiiError::NotFound)
    }

    /// Replace the text of `string_id` in `language`
    pub fn set_string(
        &self,
        handle: HiiHandle,
        language: &str,
        string_id: u16,
        text: &str,
        font: Option<&FontInfo>,
    ) -> Result<()> {
        if string_id == 0 {
            return Err(HiiError::InvalidInput);
        }
        let mut state = self.lock();
        let at = state.position(handle)?;
        if let Some(font) = font {
            if !state.font_registered(font) {
                return Err(HiiError::InvalidInput);
            }
        }
        let list = &mut state.records[at].list;
        let index = list.find_strings(language).ok_or(HiiError::NotFound)?;
        let font = font.map(string_font);
        list.strings_mut()[index].set_string(string_id, text, font.as_ref())
    }

    /// Languages of every string package in the list, `;`-joined
    pub fn get_languages(&self, handle: HiiHandle) -> Result<String> {
        let state = self.lock();
        let list = state.list(handle)?;
        if list.strings().is_empty() {
            return Err(HiiError::NotFound);
        }
        Ok(join_languages(list.strings().iter().map(|p| p.language())))
    }

    /// Secondary languages declared by the package whose primary language is `primary`
    pub fn get_secondary_languages(&self, handle: HiiHandle, primary: &str) -> Result<String> {
        let state = self.lock();
        let list = state.list(handle)?;
        list.strings()
            .iter()
            .find(|p| compare_language(p.language(), primary))
            .and_then(|p| secondary_languages(p.language()))
            .map(String::from)
            .ok_or(HiiError::InvalidLanguage)
    }
}
