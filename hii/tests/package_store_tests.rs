//! Package list registration, export and notification tests

mod common;

use std::sync::{Arc, Mutex};

use common::{package_list, ImagePackageBuilder, StringPackageBuilder, CONTROLLER_PATH};
use hii::image::block::IIBT_SKIP1;
use hii::string::block::SIBT_SKIP2;
use hii::string::StringPackage;
use hii::types::PackageListRef;
use hii::{Database, DriverHandle, HiiError, NotifyType, PackageType};
use uguid::guid;

const LIST: uguid::Guid = guid!("5b1a0c8e-7d3f-4c61-b2a9-0e4f6d8c1a23");

fn exported(db: &Database) -> Vec<u8> {
    let size = match db.export_package_lists(None, &mut []) {
        Err(HiiError::BufferTooSmall(size)) => size,
        other => panic!("unexpected probe result {:?}", other),
    };
    let mut buffer = vec![0u8; size];
    assert_eq!(db.export_package_lists(None, &mut buffer), Ok(size));
    buffer
}

fn string_packages(export: &[u8]) -> Vec<StringPackage> {
    PackageListRef::parse(export)
        .unwrap()
        .packages
        .iter()
        .filter(|p| p[3] == PackageType::Strings.as_u8())
        .map(|p| StringPackage::parse(p).unwrap())
        .collect()
}

#[test]
fn test_string_packages_share_max_id() {
    let db = Database::new();
    let english = StringPackageBuilder::new("en-US")
        .string("One")
        .string("Two")
        .string("Three")
        .build();
    let french = StringPackageBuilder::new("fr-FR").string("Un").build();
    db.new_package_list(&package_list(LIST, &[english, french]), DriverHandle(1), None)
        .unwrap();

    let packages = string_packages(&exported(&db));
    assert_eq!(packages.len(), 2);
    assert!(packages.iter().all(|p| p.max_string_id() == 4));

    // The French package was padded with a single skip block
    let bytes = packages[1].to_bytes().unwrap();
    assert_eq!(&bytes[bytes.len() - 4..], &[SIBT_SKIP2, 2, 0, 0]);
}

#[test]
fn test_second_image_package_rejected() {
    let db = Database::new();
    let first = ImagePackageBuilder::new().block(&[IIBT_SKIP1, 3]).build();
    let handle = db
        .new_package_list(&package_list(LIST, &[first.clone()]), DriverHandle(1), None)
        .unwrap();
    let before = exported(&db);

    // Two image packages in one list
    let second = ImagePackageBuilder::new().block(&[IIBT_SKIP1, 1]).build();
    assert_eq!(
        db.new_package_list(&package_list(LIST, &[first, second]), DriverHandle(2), None),
        Err(HiiError::DuplicateConstraintViolated)
    );
    assert_eq!(db.list_package_lists(PackageType::All, None), Ok(vec![handle]));
    assert_eq!(exported(&db), before);
}

#[test]
fn test_duplicate_language_rejected_and_cleaned_up() {
    let db = Database::new();
    let a = StringPackageBuilder::new("en-US").string("A").build();
    let b = StringPackageBuilder::new("en-US").string("B").build();
    assert_eq!(
        db.new_package_list(&package_list(LIST, &[a, b]), DriverHandle(1), None),
        Err(HiiError::DuplicateConstraintViolated)
    );
    assert_eq!(db.list_package_lists(PackageType::All, None), Err(HiiError::NotFound));
}

#[test]
fn test_export_is_idempotent() {
    let db = Database::new();
    let strings = StringPackageBuilder::new("en-US").string("Hello").build();
    let image = ImagePackageBuilder::new().block(&[IIBT_SKIP1, 2]).build();
    db.new_package_list(&package_list(LIST, &[strings, image]), DriverHandle(1), Some(&CONTROLLER_PATH[..]))
        .unwrap();
    let first = exported(&db);
    assert_eq!(exported(&db), first);

    let list = PackageListRef::parse(&first).unwrap();
    assert_eq!(list.guid, LIST);
    assert_eq!(list.declared_length as usize, first.len());
    // Strings, image, then the device path
    let types: Vec<u8> = list.packages.iter().map(|p| p[3]).collect();
    assert_eq!(
        types,
        vec![
            PackageType::Strings.as_u8(),
            PackageType::Images.as_u8(),
            PackageType::DevicePath.as_u8()
        ]
    );
}

#[test]
fn test_device_path_recorded_once() {
    let db = Database::new();
    let handle = db
        .new_package_list(&package_list(LIST, &[]), DriverHandle(1), Some(&CONTROLLER_PATH[..]))
        .unwrap();
    assert_eq!(db.device_path(handle), Ok(CONTROLLER_PATH.to_vec()));
    assert_eq!(db.get_package_list_handle(handle), Ok(DriverHandle(1)));

    // Same GUID from the same driver
    assert_eq!(
        db.new_package_list(&package_list(LIST, &[]), DriverHandle(1), None),
        Err(HiiError::InvalidInput)
    );
}

#[test]
fn test_notifications_follow_operation_order() {
    let db = Database::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    for (package_type, notify_type) in [
        (PackageType::Strings, NotifyType::New),
        (PackageType::Images, NotifyType::New),
        (PackageType::Strings, NotifyType::Remove),
        (PackageType::Images, NotifyType::Remove),
        (PackageType::Strings, NotifyType::Add),
    ] {
        let seen = seen.clone();
        db.register_package_notify(
            package_type,
            None,
            notify_type,
            Box::new(move |event| {
                seen.lock().unwrap().push((event.notify_type, event.package_type));
                Ok(())
            }),
        )
        .unwrap();
    }

    let image = ImagePackageBuilder::new().block(&[IIBT_SKIP1, 1]).build();
    let strings = StringPackageBuilder::new("en-US").string("A").build();
    let handle = db
        .new_package_list(&package_list(LIST, &[image, strings]), DriverHandle(1), None)
        .unwrap();
    let replacement = StringPackageBuilder::new("de-DE").string("B").build();
    db.update_package_list(handle, &package_list(LIST, &[replacement])).unwrap();
    db.remove_package_list(handle).unwrap();

    let strings = PackageType::Strings.as_u8();
    let images = PackageType::Images.as_u8();
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (NotifyType::New, images),
            (NotifyType::New, strings),
            (NotifyType::Remove, strings),
            (NotifyType::Add, strings),
            // Removal cascade: strings before images
            (NotifyType::Remove, strings),
            (NotifyType::Remove, images),
        ]
    );
}

#[test]
fn test_failing_callback_aborts_registration() {
    let db = Database::new();
    let notify = db
        .register_package_notify(
            PackageType::Strings,
            None,
            NotifyType::New,
            Box::new(|_| Err(HiiError::AccessDenied)),
        )
        .unwrap();
    let strings = StringPackageBuilder::new("en-US").string("A").build();
    assert_eq!(
        db.new_package_list(&package_list(LIST, &[strings.clone()]), DriverHandle(1), None),
        Err(HiiError::AccessDenied)
    );
    assert_eq!(db.list_package_lists(PackageType::All, None), Err(HiiError::NotFound));

    db.unregister_package_notify(notify).unwrap();
    assert!(db
        .new_package_list(&package_list(LIST, &[strings]), DriverHandle(1), None)
        .is_ok());
}
