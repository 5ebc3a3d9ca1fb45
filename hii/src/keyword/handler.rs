use alloc::string::String;
use alloc::vec::Vec;

use super::config_string::{config_hdr, request_element, value_section, Element};
use super::parser::Scanner;
use super::{ConfigRouter, KeywordError, ProgressKind};
use crate::config::{DEFAULT_PLATFORM_LANGUAGE, UEFI_CONFIG_LANG};
use crate::database::{Database, Record, State};
use crate::device_path::encode_hex;
use crate::error::{HiiError, Result};
use crate::form::ifr::{IFR_NUMERIC_OP, IFR_ONE_OF_OP};
use crate::form::VarStore;
use crate::string::compare_language;

/// A keyword resolved to its question and storage
struct Target {
    namespace: String,
    /// Path echoed in keyword responses
    device_path: Vec<u8>,
    /// `<ConfigHdr>&<RequestElement>`
    request: String,
    opcode: u8,
    /// Size flags of one-of and numeric questions
    numeric_flags: u8,
    read_only: bool,
}

type Resolution<T> = core::result::Result<T, (HiiError, ProgressKind)>;

fn keyword_response(target: &Target, keyword: &str, value: &str) -> String {
    alloc::format!(
        "NAMESPACE={}&PATH={}&KEYWORD={}{}{}",
        target.namespace,
        encode_hex(&target.device_path),
        keyword,
        value,
        if target.read_only { "&READONLY" } else { "" }
    )
}

fn router_value(router: &dyn ConfigRouter, request: &str) -> Result<String> {
    let response = router.extract_config(request)?;
    value_section(&response).map(String::from)
}

impl Record {
    /// Id of `keyword` in the first string package under `namespace`
    fn keyword_id(&self, namespace: &str, keyword: &str) -> core::result::Result<(u16, &str), ProgressKind> {
        let package = self
            .list
            .strings()
            .iter()
            .find(|p| p.language().starts_with(namespace))
            .ok_or(ProgressKind::NamespaceIdNotFound)?;
        let id = package
            .find_id_by_text(keyword)
            .map_err(|_| ProgressKind::KeywordNotFound)?;
        Ok((id, package.language()))
    }

    /// Text of a name/value store entry name
    fn store_name(&self, platform_language: &str, string_id: u16) -> Result<String> {
        let strings = self.list.strings();
        let package = [platform_language, DEFAULT_PLATFORM_LANGUAGE]
            .iter()
            .find_map(|language| strings.iter().find(|p| compare_language(p.language(), language)))
            .or_else(|| strings.first())
            .ok_or(HiiError::NotFound)?;
        Ok(package.get_string(string_id)?.0)
    }

    /// Question prompted by `string_id` and the request addressing its storage
    fn target(&self, string_id: u16, namespace: &str, platform_language: &str) -> Result<Target> {
        let device_path = self.list.device_path().ok_or(HiiError::NotFound)?;
        for form in self.list.forms() {
            let Some(op) = form.find_question(string_id) else {
                continue;
            };
            let header = op.question()?;
            let store = form.find_storage(header.var_store_id).ok_or(HiiError::NotFound)?;
            let element = match &store {
                VarStore::NameValue { .. } => Element::Name(self.store_name(platform_language, header.var_store_info)?),
                _ => Element::Offset {
                    offset: header.var_store_info,
                    width: form.question_width(&op)?,
                },
            };
            let numeric_flags = match op.opcode {
                IFR_ONE_OF_OP | IFR_NUMERIC_OP => op.question_flags()?,
                _ => 0,
            };
            return Ok(Target {
                namespace: namespace.into(),
                device_path: device_path.to_vec(),
                request: alloc::format!("{}&{}", config_hdr(&store, device_path), request_element(&element)),
                opcode: op.opcode,
                numeric_flags,
                read_only: header.is_read_only(),
            });
        }
        Err(HiiError::NotFound)
    }
}

impl State {
    /// Resolve the keyword of one element
    ///
    /// With a device path only the list registered under that path is
    /// searched; otherwise the first list knowing the keyword wins. Lists
    /// without a device path are never searched. A missing namespace is
    /// replaced by the language of the package that resolved the keyword.
    fn resolve(&self, path: Option<&[u8]>, namespace: &mut Option<String>, keyword: &str) -> Resolution<Target> {
        let name = namespace.as_deref().unwrap_or(UEFI_CONFIG_LANG);
        let (record, id, language) = match path {
            Some(path) => {
                let record = self
                    .records
                    .iter()
                    .find(|r| r.list.device_path().map_or(false, |own| path.starts_with(own)))
                    .ok_or((HiiError::InvalidInput, ProgressKind::MalformedString))?;
                match record.keyword_id(name, keyword) {
                    Ok((id, language)) => (record, id, language),
                    Err(ProgressKind::KeywordNotFound) => {
                        return Err((HiiError::NotFound, ProgressKind::KeywordNotFound))
                    }
                    Err(kind) => return Err((HiiError::InvalidInput, kind)),
                }
            }
            None => {
                let mut namespace_seen = false;
                let found = self
                    .records
                    .iter()
                    .filter(|r| r.list.device_path().is_some())
                    .find_map(|r| match r.keyword_id(name, keyword) {
                        Ok((id, language)) => Some((r, id, language)),
                        Err(kind) => {
                            namespace_seen |= kind == ProgressKind::KeywordNotFound;
                            None
                        }
                    });
                match found {
                    Some(found) => found,
                    None if namespace_seen => return Err((HiiError::NotFound, ProgressKind::KeywordNotFound)),
                    None => return Err((HiiError::InvalidInput, ProgressKind::NamespaceIdNotFound)),
                }
            }
        };

        let namespace = namespace.get_or_insert_with(|| language.into());
        let mut target = record
            .target(id, namespace, &self.config.platform_language)
            .map_err(|e| (e, ProgressKind::Undefined))?;
        if let Some(path) = path {
            target.device_path = path.to_vec();
        }
        Ok(target)
    }

    /// Validate one set element and build its `<ConfigResp>`
    fn set_element(&self, scanner: &mut Scanner<'_>) -> core::result::Result<String, KeywordError> {
        let malformed =
            |status: HiiError, at: usize| KeywordError::new(status, ProgressKind::MalformedString, at);
        let start = scanner.position();
        let namespace = scanner.namespace().map_err(|e| malformed(e, start))?;
        if !namespace.starts_with(UEFI_CONFIG_LANG) {
            return Err(malformed(HiiError::InvalidInput, start));
        }
        let path = scanner.device_path().map_err(|e| malformed(e, scanner.position()))?;

        let keyword_start = scanner.position();
        let keyword = scanner
            .keyword()
            .map_err(|_| malformed(HiiError::InvalidInput, keyword_start))?;
        let value = scanner
            .value()
            .map_err(|_| malformed(HiiError::InvalidInput, keyword_start))?;
        let read_only = scanner.read_only();

        let fail = |(status, kind): (HiiError, ProgressKind)| KeywordError::new(status, kind, keyword_start);
        let mut namespace = Some(String::from(namespace));
        let target = self.resolve(path.as_deref(), &mut namespace, keyword).map_err(fail)?;
        if target.read_only != read_only {
            return Err(fail((HiiError::InvalidInput, ProgressKind::IncompatibleValue)));
        }
        if read_only {
            return Err(fail((HiiError::AccessDenied, ProgressKind::AccessNotPermitted)));
        }
        Ok(alloc::format!("{}&VALUE={}", target.request, value))
    }

    /// Every keyword of the string packages under `namespace`
    ///
    /// Keywords without a question or storage are skipped. The flag tells
    /// whether any package matched the namespace at all.
    fn keyword_targets(&self, namespace: &str) -> (Vec<(String, Target)>, bool) {
        let mut found_package = false;
        let mut targets = Vec::new();
        for record in self.records.iter().filter(|r| r.list.device_path().is_some()) {
            for package in record
                .list
                .strings()
                .iter()
                .filter(|p| p.language().starts_with(namespace))
            {
                found_package = true;
                let mut id = 1;
                while let Some((next, keyword)) = package.next_string(id) {
                    id = next;
                    match record.target(next, package.language(), &self.config.platform_language) {
                        Ok(target) => targets.push((keyword, target)),
                        Err(e) => log::debug!("hii: keyword {:?} of {} skipped: {}", keyword, record.handle, e),
                    }
                }
            }
        }
        (targets, found_package)
    }
}

impl Database {
    /// Write the keywords of a `<MultiKeywordResp>`
    ///
    /// Every element is validated and resolved before anything is written;
    /// the resulting `<MultiConfigResp>` goes to `router` in one call. A
    /// failing element reports the `&` before its `KEYWORD=` token.
    pub fn set_data(&self, router: &dyn ConfigRouter, keywords: &str) -> core::result::Result<(), KeywordError> {
        if keywords.is_empty() {
            return Err(KeywordError::new(HiiError::InvalidInput, ProgressKind::MalformedString, 0));
        }
        let mut scanner = Scanner::new(keywords);
        let mut responses = Vec::new();
        {
            let state = self.lock();
            while !scanner.at_end() {
                match state.set_element(&mut scanner) {
                    Ok(response) => responses.push(response),
                    Err(e) => {
                        log::warn!("hii: keyword set rejected: {}", e);
                        return Err(e);
                    }
                }
            }
        }

        router.route_config(&responses.join("&")).map_err(|e| {
            log::warn!(
                "hii: routing {} keyword(s) failed: {}; their storage state is undefined",
                responses.len(),
                e
            );
            KeywordError::new(HiiError::DeviceError, ProgressKind::Undefined, keywords.len())
        })?;
        log::debug!("hii: set {} keyword(s)", responses.len());
        Ok(())
    }

    /// Read keywords
    ///
    /// `namespace` is a `NAMESPACE=x-UEFI...` string; without one the
    /// namespace of the first resolved keyword is used. Without `keywords`
    /// every keyword of every matching package is returned. On failure the
    /// error carries the responses gathered before the failing element.
    pub fn get_data(
        &self,
        router: &dyn ConfigRouter,
        namespace: Option<&str>,
        keywords: Option<&str>,
    ) -> core::result::Result<String, KeywordError> {
        let namespace = match namespace {
            Some(text) => {
                let name = Scanner::new(text)
                    .namespace()
                    .map_err(|e| KeywordError::new(e, ProgressKind::MalformedString, 0))?;
                if !name.starts_with(UEFI_CONFIG_LANG) {
                    return Err(KeywordError::new(HiiError::InvalidInput, ProgressKind::MalformedString, 0));
                }
                Some(String::from(name))
            }
            None => None,
        };
        match keywords {
            Some(keywords) => self.get_keywords(router, namespace, keywords),
            None => self.enumerate_keywords(router, namespace.as_deref()),
        }
    }

    fn get_keywords(
        &self,
        router: &dyn ConfigRouter,
        mut namespace: Option<String>,
        keywords: &str,
    ) -> core::result::Result<String, KeywordError> {
        let mut scanner = Scanner::new(keywords);
        let mut responses = Vec::new();
        while !scanner.at_end() {
            match self.get_element(router, &mut scanner, &mut namespace) {
                Ok(response) => responses.push(response),
                Err(mut e) => {
                    log::warn!("hii: keyword get failed: {}", e);
                    e.partial = responses.join("&");
                    return Err(e);
                }
            }
        }
        Ok(responses.join("&"))
    }

    /// Resolve, read and filter one get element
    ///
    /// The database lock is released before the router is called.
    fn get_element(
        &self,
        router: &dyn ConfigRouter,
        scanner: &mut Scanner<'_>,
        namespace: &mut Option<String>,
    ) -> core::result::Result<String, KeywordError> {
        let path = scanner
            .device_path()
            .map_err(|e| KeywordError::new(e, ProgressKind::MalformedString, scanner.position()))?;
        let keyword_start = scanner.position();
        let keyword = scanner
            .keyword()
            .map_err(|_| KeywordError::new(HiiError::InvalidInput, ProgressKind::MalformedString, keyword_start))?;

        let target = self
            .lock()
            .resolve(path.as_deref(), namespace, keyword)
            .map_err(|(status, kind)| KeywordError::new(status, kind, keyword_start))?;
        let value = router_value(router, &target.request).map_err(|e| {
            let status = match e {
                HiiError::OutOfMemory => e,
                _ => HiiError::DeviceError,
            };
            KeywordError::new(status, ProgressKind::Undefined, keyword_start)
        })?;

        let filters_start = scanner.position();
        while let Some(filter) = scanner.filter() {
            if !filter.accepts(target.opcode, target.numeric_flags, target.read_only) {
                return Err(KeywordError::new(
                    HiiError::InvalidInput,
                    ProgressKind::IncompatibleValue,
                    filters_start,
                ));
            }
        }
        Ok(keyword_response(&target, keyword, &value))
    }

    fn enumerate_keywords(
        &self,
        router: &dyn ConfigRouter,
        namespace: Option<&str>,
    ) -> core::result::Result<String, KeywordError> {
        let namespace = namespace.unwrap_or(UEFI_CONFIG_LANG);
        let (targets, found_package) = self.lock().keyword_targets(namespace);
        let mut responses = Vec::new();
        for (keyword, target) in &targets {
            match router_value(router, &target.request) {
                Ok(value) => responses.push(keyword_response(target, keyword, &value)),
                Err(HiiError::OutOfMemory) => {
                    let mut error = KeywordError::new(HiiError::OutOfMemory, ProgressKind::Undefined, 0);
                    error.partial = responses.join("&");
                    return Err(error);
                }
                Err(e) => log::debug!("hii: no value for keyword {:?}: {}", keyword, e),
            }
        }
        if responses.is_empty() {
            let kind = if found_package {
                ProgressKind::KeywordNotFound
            } else {
                ProgressKind::NamespaceIdNotFound
            };
            return Err(KeywordError::new(HiiError::NotFound, kind, 0));
        }
        log::debug!("hii: enumerated {} keyword(s) under {}", responses.len(), namespace);
        Ok(responses.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::ifr::{IFR_END_OP, IFR_VARSTORE_NAME_VALUE_OP, IFR_VARSTORE_OP};
    use crate::string::StringPackage;
    use crate::types::{DriverHandle, PackageHeader, PackageType, PACKAGE_LIST_HEADER_SIZE};
    use spin::Mutex;
    use uguid::{guid, Guid};

    const STORE: Guid = guid!("11111111-2222-3333-4444-555566667777");
    const PATH: [u8; 8] = [0x01, 0x01, 0x04, 0x00, 0x7F, 0xFF, 0x04, 0x00];
    const PATH_HEX: &str = "010104007fff0400";

    struct Router {
        value: &'static str,
        routed: Mutex<Vec<String>>,
        fail: bool,
    }

    impl Router {
        fn new(value: &'static str) -> Self {
            Self {
                value,
                routed: Mutex::new(Vec::new()),
                fail: false,
            }
        }
    }

    impl ConfigRouter for Router {
        fn extract_config(&self, request: &str) -> Result<String> {
            Ok(alloc::format!("{}&VALUE={}", request, self.value))
        }

        fn route_config(&self, response: &str) -> Result<()> {
            if self.fail {
                return Err(HiiError::DeviceError);
            }
            self.routed.lock().push(response.into());
            Ok(())
        }
    }

    fn op(opcode: u8, body: &[u8]) -> Vec<u8> {
        let mut out = alloc::vec![opcode, (body.len() + 2) as u8];
        out.extend_from_slice(body);
        out
    }

    /// Question body: prompt, help, question id, varstore id, varstore info, flags, size flags
    fn question(prompt: u16, store: u16, info: u16, flags: u8, size: u8) -> Vec<u8> {
        let mut body = Vec::new();
        for field in [prompt, 0, prompt, store, info] {
            body.extend_from_slice(&field.to_le_bytes());
        }
        body.push(flags);
        body.push(size);
        body.extend_from_slice(&[0; 3]);
        body
    }

    fn form_package() -> Vec<u8> {
        let mut ifr = Vec::new();
        let mut varstore = STORE.to_bytes().to_vec();
        varstore.extend_from_slice(&1u16.to_le_bytes());
        varstore.extend_from_slice(&8u16.to_le_bytes());
        varstore.extend_from_slice(b"Cfg\0");
        ifr.extend(op(IFR_VARSTORE_OP, &varstore));
        let mut name_value = 2u16.to_le_bytes().to_vec();
        name_value.extend_from_slice(&STORE.to_bytes());
        ifr.extend(op(IFR_VARSTORE_NAME_VALUE_OP, &name_value));
        // Timeout: numeric, 2 bytes at offset 0x10
        ifr.extend(op(IFR_NUMERIC_OP, &question(2, 1, 0x10, 0, 0x01)));
        // Locked: read-only numeric, 1 byte at offset 0
        ifr.extend(op(IFR_NUMERIC_OP, &question(3, 1, 0, 0x01, 0x00)));
        // Speed: one-of in the name/value store named by string 5
        ifr.extend(op(IFR_ONE_OF_OP, &question(4, 2, 5, 0, 0x00)));
        ifr.extend(op(IFR_END_OP, &[]));
        let mut package = PackageHeader::new(4 + ifr.len(), PackageType::Forms)
            .unwrap()
            .to_bytes()
            .to_vec();
        package.extend(ifr);
        package
    }

    fn register(db: &Database) {
        let mut keywords = StringPackage::create("x-UEFI-test", "Keywords", 2).unwrap();
        for text in ["Timeout", "Locked", "Speed"] {
            keywords.append_string(text, None).unwrap();
        }
        let mut english = StringPackage::create("en-US", "English", 2).unwrap();
        for text in ["", "", "", "SpeedName"] {
            english.append_string(text, None).unwrap();
        }
        let packages = [form_package(), keywords.to_bytes().unwrap(), english.to_bytes().unwrap()];
        let body: usize = packages.iter().map(Vec::len).sum();
        let mut payload = Guid::ZERO.to_bytes().to_vec();
        payload.extend_from_slice(&((PACKAGE_LIST_HEADER_SIZE + body + 4) as u32).to_le_bytes());
        for package in &packages {
            payload.extend_from_slice(package);
        }
        payload.extend_from_slice(&PackageHeader::new(4, PackageType::End).unwrap().to_bytes());
        db.new_package_list(&payload, DriverHandle(1), Some(&PATH[..])).unwrap();
    }

    fn header() -> String {
        alloc::format!(
            "GUID={}&NAME=004300660067&PATH={}",
            encode_hex(&STORE.to_bytes()),
            PATH_HEX
        )
    }

    #[test]
    fn test_set_builds_config_resp() {
        let db = Database::new();
        register(&db);
        let router = Router::new("");
        let text = alloc::format!("NAMESPACE=x-UEFI-test&PATH={}&KEYWORD=Timeout&VALUE=0001", PATH_HEX);
        db.set_data(&router, &text).unwrap();
        assert_eq!(
            *router.routed.lock(),
            alloc::vec![alloc::format!("{}&OFFSET=0010&WIDTH=0002&VALUE=0001", header())]
        );
    }

    #[test]
    fn test_set_without_path_and_with_name_value_store() {
        let db = Database::new();
        register(&db);
        let router = Router::new("");
        db.set_data(&router, "NAMESPACE=x-UEFI-test&KEYWORD=Speed&VALUE=03").unwrap();
        let routed = router.routed.lock();
        assert!(routed[0].ends_with("&NAME=&PATH=010104007fff0400&SpeedName&VALUE=03"));
    }

    #[test]
    fn test_set_rejects_read_only_questions() {
        let db = Database::new();
        register(&db);
        let router = Router::new("");
        let err = db
            .set_data(&router, "NAMESPACE=x-UEFI-test&KEYWORD=Locked&VALUE=01")
            .unwrap_err();
        assert_eq!(err.status, HiiError::InvalidInput);
        assert_eq!(err.kind, ProgressKind::IncompatibleValue);
        assert_eq!(err.progress, 21);

        let err = db
            .set_data(&router, "NAMESPACE=x-UEFI-test&KEYWORD=Locked&VALUE=01&READONLY")
            .unwrap_err();
        assert_eq!(err.status, HiiError::AccessDenied);
        assert_eq!(err.kind, ProgressKind::AccessNotPermitted);
        assert!(router.routed.lock().is_empty());
    }

    #[test]
    fn test_set_errors() {
        let db = Database::new();
        register(&db);
        let router = Router::new("");
        let err = db.set_data(&router, "").unwrap_err();
        assert_eq!((err.status, err.kind, err.progress), (HiiError::InvalidInput, ProgressKind::MalformedString, 0));

        let err = db.set_data(&router, "NAMESPACE=en-US&KEYWORD=Timeout&VALUE=1").unwrap_err();
        assert_eq!(err.kind, ProgressKind::MalformedString);

        let err = db
            .set_data(&router, "NAMESPACE=x-UEFI-none&KEYWORD=Timeout&VALUE=1")
            .unwrap_err();
        assert_eq!((err.status, err.kind), (HiiError::InvalidInput, ProgressKind::NamespaceIdNotFound));

        let mut failing = Router::new("");
        failing.fail = true;
        let text = "NAMESPACE=x-UEFI-test&KEYWORD=Timeout&VALUE=1";
        let err = db.set_data(&failing, text).unwrap_err();
        assert_eq!((err.status, err.kind, err.progress), (HiiError::DeviceError, ProgressKind::Undefined, text.len()));
    }

    #[test]
    fn test_get_with_filters() {
        let db = Database::new();
        register(&db);
        let router = Router::new("0a00");
        let out = db
            .get_data(&router, None, Some("KEYWORD=Timeout&Numeric:2&ReadWrite"))
            .unwrap();
        assert_eq!(
            out,
            alloc::format!("NAMESPACE=x-UEFI-test&PATH={}&KEYWORD=Timeout&VALUE=0a00", PATH_HEX)
        );

        let err = db
            .get_data(&router, None, Some("KEYWORD=Timeout&KEYWORD=Locked&Buffer"))
            .unwrap_err();
        assert_eq!(err.kind, ProgressKind::IncompatibleValue);
        assert_eq!(err.progress, 30);
        assert!(err.partial.ends_with("KEYWORD=Timeout&VALUE=0a00"));
    }

    #[test]
    fn test_get_marks_read_only() {
        let db = Database::new();
        register(&db);
        let router = Router::new("01");
        let out = db
            .get_data(&router, Some("NAMESPACE=x-UEFI-test"), Some("KEYWORD=Locked"))
            .unwrap();
        assert!(out.ends_with("&KEYWORD=Locked&VALUE=01&READONLY"));
        let err = db
            .get_data(&router, Some("NAMESPACE=en-US"), Some("KEYWORD=Locked"))
            .unwrap_err();
        assert_eq!(err.kind, ProgressKind::MalformedString);
    }

    #[test]
    fn test_enumerate_all_keywords() {
        let db = Database::new();
        let router = Router::new("00");
        let err = db.get_data(&router, None, None).unwrap_err();
        assert_eq!((err.status, err.kind), (HiiError::NotFound, ProgressKind::NamespaceIdNotFound));

        register(&db);
        let out = db.get_data(&router, None, None).unwrap();
        let keywords: Vec<&str> = out
            .split('&')
            .filter_map(|part| part.strip_prefix("KEYWORD="))
            .collect();
        assert_eq!(keywords, ["Timeout", "Locked", "Speed"]);
    }
}
