use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use tempfile::tempdir;

use bagit::bagit::{
    create_bag, open_bag, validate_bag, BagInfo, DigestAlgorithm, Mode, ValidateOptions,
    ValidationVerdict,
};

fn write_file(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut f = File::create(path).unwrap();
    f.write_all(content.as_bytes()).unwrap();
}

#[test]
fn round_trips_a_bag_with_md5() {
    let dir = tempdir().unwrap();
    write_file(&dir.path().join("one.txt"), "hello\n");
    write_file(&dir.path().join("nested/two.txt"), "world\n");

    let bag = create_bag(
        dir.path(),
        dir.path(),
        BagInfo::new(),
        &[DigestAlgorithm::Md5],
        false,
        1,
        Mode::Create,
    )
    .unwrap();

    assert!(dir.path().join("data/one.txt").is_file());
    assert!(dir.path().join("manifest-md5.txt").is_file());
    assert_eq!(Some("12.2"), bag.bag_info().payload_oxum());

    let reopened = open_bag(dir.path()).unwrap();
    assert_eq!(vec![DigestAlgorithm::Md5], reopened.algorithms());

    let result = validate_bag(dir.path(), ValidateOptions::new()).unwrap();
    assert_eq!(ValidationVerdict::Valid, result.verdict());
    assert!(result.is_valid());
}

#[test]
fn detects_a_flipped_bit_in_the_payload() {
    let dir = tempdir().unwrap();
    write_file(&dir.path().join("one.txt"), "hello\n");

    create_bag(
        dir.path(),
        dir.path(),
        BagInfo::new(),
        &[DigestAlgorithm::Sha256],
        false,
        1,
        Mode::Create,
    )
    .unwrap();

    write_file(&dir.path().join("data/one.txt"), "hellO\n");

    let result = validate_bag(dir.path(), ValidateOptions::new()).unwrap();
    assert_eq!(ValidationVerdict::Invalid, result.verdict());
    assert!(!result.is_valid());
}

#[test]
fn reports_a_missing_payload_file() {
    let dir = tempdir().unwrap();
    write_file(&dir.path().join("one.txt"), "hello\n");

    create_bag(
        dir.path(),
        dir.path(),
        BagInfo::new(),
        &[DigestAlgorithm::Sha256],
        false,
        1,
        Mode::Create,
    )
    .unwrap();

    fs::remove_file(dir.path().join("data/one.txt")).unwrap();

    let result = validate_bag(dir.path(), ValidateOptions::new()).unwrap();
    assert_eq!(ValidationVerdict::Invalid, result.verdict());
}

#[test]
fn parallel_and_inline_hashing_produce_the_same_bag() {
    let inline_dir = tempdir().unwrap();
    let parallel_dir = tempdir().unwrap();

    for i in 0..12 {
        let name = format!("file-{i}.txt");
        write_file(&inline_dir.path().join(&name), &format!("payload {i}\n"));
        write_file(&parallel_dir.path().join(&name), &format!("payload {i}\n"));
    }

    create_bag(
        inline_dir.path(),
        inline_dir.path(),
        BagInfo::new(),
        &[DigestAlgorithm::Sha256],
        false,
        1,
        Mode::Create,
    )
    .unwrap();
    create_bag(
        parallel_dir.path(),
        parallel_dir.path(),
        BagInfo::new(),
        &[DigestAlgorithm::Sha256],
        false,
        4,
        Mode::Create,
    )
    .unwrap();

    let inline_manifest =
        fs::read_to_string(inline_dir.path().join("manifest-sha256.txt")).unwrap();
    let parallel_manifest =
        fs::read_to_string(parallel_dir.path().join("manifest-sha256.txt")).unwrap();
    assert_eq!(inline_manifest, parallel_manifest);
}

#[test]
fn rejects_a_bag_containing_an_unsafe_manifest_entry() {
    let dir = tempdir().unwrap();
    write_file(&dir.path().join("data/one.txt"), "hello\n");
    write_file(
        &dir.path().join("bagit.txt"),
        "BagIt-Version: 1.0\nTag-File-Character-Encoding: UTF-8\n",
    );
    write_file(
        &dir.path().join("manifest-md5.txt"),
        "5d41402abc4b2a76b9719d911017c592  ../escape.txt\n",
    );

    assert!(validate_bag(dir.path(), ValidateOptions::new()).is_err());
}

#[test]
fn empty_payload_yields_zero_oxum() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path()).unwrap();

    let bag = create_bag(
        dir.path(),
        dir.path(),
        BagInfo::new(),
        &[DigestAlgorithm::Sha256],
        false,
        1,
        Mode::Create,
    )
    .unwrap();

    assert_eq!(Some("0.0"), bag.bag_info().payload_oxum());
}

#[test]
fn rebag_recomputes_manifests_without_moving_payload() {
    let dir = tempdir().unwrap();
    write_file(&dir.path().join("one.txt"), "hello\n");

    create_bag(
        dir.path(),
        dir.path(),
        BagInfo::new(),
        &[DigestAlgorithm::Md5],
        false,
        1,
        Mode::Create,
    )
    .unwrap();

    let bag = create_bag(
        dir.path(),
        dir.path(),
        BagInfo::new(),
        &[DigestAlgorithm::Sha256],
        false,
        1,
        Mode::Rebag,
    )
    .unwrap();

    assert!(dir.path().join("data/one.txt").is_file());
    assert!(!dir.path().join("manifest-md5.txt").exists());
    assert!(dir.path().join("manifest-sha256.txt").exists());
    assert_eq!(vec![DigestAlgorithm::Sha256], bag.algorithms());
}

#[test]
fn fast_validate_fails_oxum_mismatch_when_a_payload_file_is_deleted() {
    let dir = tempdir().unwrap();
    write_file(&dir.path().join("one.txt"), "hello\n");
    write_file(&dir.path().join("two.txt"), "world\n");

    create_bag(
        dir.path(),
        dir.path(),
        BagInfo::new(),
        &[DigestAlgorithm::Sha256],
        false,
        1,
        Mode::Create,
    )
    .unwrap();

    fs::remove_file(dir.path().join("data/two.txt")).unwrap();

    let err = validate_bag(dir.path(), ValidateOptions::new().with_fast(true)).unwrap_err();
    assert!(err.to_string().contains("Oxum"), "{err}");
}

#[test]
fn fast_validate_passes_even_with_a_flipped_byte() {
    let dir = tempdir().unwrap();
    write_file(&dir.path().join("one.txt"), "hello\n");

    create_bag(
        dir.path(),
        dir.path(),
        BagInfo::new(),
        &[DigestAlgorithm::Sha256],
        false,
        1,
        Mode::Create,
    )
    .unwrap();

    write_file(&dir.path().join("data/one.txt"), "hellO\n");

    let result = validate_bag(dir.path(), ValidateOptions::new().with_fast(true)).unwrap();
    assert_eq!(ValidationVerdict::Complete, result.verdict());
}

#[test]
fn fast_validate_fails_with_no_oxum_declared() {
    let dir = tempdir().unwrap();
    write_file(&dir.path().join("data/one.txt"), "hello\n");
    write_file(
        &dir.path().join("bagit.txt"),
        "BagIt-Version: 0.97\nTag-File-Character-Encoding: UTF-8\n",
    );

    let err = validate_bag(dir.path(), ValidateOptions::new().with_fast(true)).unwrap_err();
    assert!(err.to_string().contains("Oxum"), "{err}");
}

#[test]
fn default_validate_reports_an_oxum_mismatch_as_a_soft_detail() {
    let dir = tempdir().unwrap();
    write_file(&dir.path().join("one.txt"), "hello\n");
    write_file(&dir.path().join("two.txt"), "world\n");

    create_bag(
        dir.path(),
        dir.path(),
        BagInfo::new(),
        &[DigestAlgorithm::Sha256],
        false,
        1,
        Mode::Create,
    )
    .unwrap();

    fs::remove_file(dir.path().join("data/two.txt")).unwrap();
    fs::remove_file(dir.path().join("manifest-sha256.txt")).unwrap();
    write_file(
        &dir.path().join("manifest-sha256.txt"),
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824  data/one.txt\n",
    );

    let result = validate_bag(dir.path(), ValidateOptions::new()).unwrap();
    assert_eq!(ValidationVerdict::Invalid, result.verdict());
}

#[test]
fn updater_recalculates_manifests_after_a_payload_change() {
    let dir = tempdir().unwrap();
    write_file(&dir.path().join("one.txt"), "hello\n");

    create_bag(
        dir.path(),
        dir.path(),
        BagInfo::new(),
        &[DigestAlgorithm::Sha256],
        false,
        1,
        Mode::Create,
    )
    .unwrap();

    write_file(&dir.path().join("data/one.txt"), "hello again\n");

    let bag = open_bag(dir.path()).unwrap();
    bag.update().finalize().unwrap();

    let result = validate_bag(dir.path(), ValidateOptions::new()).unwrap();
    assert!(result.is_valid());
}
