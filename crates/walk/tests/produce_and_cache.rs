//! Atomic list replacement and digest reuse from a previous list.

#![cfg(unix)]

use flist::{ListIo, MmapStream, Record, Tag};
use walk::{produce, ListGenerator, Md5Cache, WalkOptions};

fn read_list(path: &std::path::Path) -> Vec<Record> {
    let mut io = ListIo::new(MmapStream::open(path).unwrap());
    let mut records = Vec::new();
    loop {
        let record = Record::step(&mut io).expect("valid list");
        let done = matches!(record, Record::Trailer(_));
        records.push(record);
        if done {
            break;
        }
    }
    records
}

#[test]
fn produce_writes_a_valid_list_and_cleans_up() {
    let temp = tempfile::tempdir().unwrap();
    let base = temp.path().join("tree");
    std::fs::create_dir(&base).unwrap();
    std::fs::write(base.join("file"), b"contents").unwrap();
    let list = temp.path().join("archive.list");

    let mut generator = ListGenerator::new(WalkOptions {
        md5: true,
        ..WalkOptions::default()
    });
    produce(&base, &list, &mut generator).unwrap();

    assert!(list.exists());
    assert!(!temp.path().join("archive.list.new").exists());
    assert!(!temp.path().join("archive.list~").exists());

    let records = read_list(&list);
    assert_eq!(records.first().unwrap().tag(), Tag::Header);
    assert_eq!(records.last().unwrap().tag(), Tag::Trailer);
}

#[test]
fn failed_walk_leaves_the_previous_list_untouched() {
    let temp = tempfile::tempdir().unwrap();
    let base = temp.path().join("tree");
    std::fs::create_dir(&base).unwrap();
    let list = temp.path().join("archive.list");

    let mut generator = ListGenerator::new(WalkOptions::default());
    produce(&base, &list, &mut generator).unwrap();
    let original = std::fs::read(&list).unwrap();

    // Second run against a base that vanished must fail before any rename.
    std::fs::remove_dir(&base).unwrap();
    assert!(produce(&base, &list, &mut generator).is_err());
    assert_eq!(std::fs::read(&list).unwrap(), original);
}

#[test]
fn unchanged_files_reuse_digests_from_the_previous_list() {
    let temp = tempfile::tempdir().unwrap();
    let base = temp.path().join("tree");
    std::fs::create_dir(&base).unwrap();
    std::fs::write(base.join("stable"), b"stable bytes").unwrap();
    let list = temp.path().join("archive.list");

    let mut generator = ListGenerator::new(WalkOptions {
        md5: true,
        ..WalkOptions::default()
    });
    produce(&base, &list, &mut generator).unwrap();
    let first = read_list(&list);

    // Regenerate; the file is unchanged so the digest must carry over.
    produce(&base, &list, &mut generator).unwrap();
    let second = read_list(&list);

    let md5_of = |records: &[Record]| {
        records
            .iter()
            .find_map(|r| r.file().map(|f| f.md5))
            .expect("file record present")
    };
    assert_eq!(md5_of(&first), md5_of(&second));
}

#[test]
fn cache_lookup_honors_mtime_and_size() {
    let temp = tempfile::tempdir().unwrap();
    let base = temp.path().join("tree");
    std::fs::create_dir(&base).unwrap();
    std::fs::write(base.join("file"), b"version one").unwrap();
    let list = temp.path().join("archive.list");

    let mut generator = ListGenerator::new(WalkOptions {
        md5: true,
        ..WalkOptions::default()
    });
    produce(&base, &list, &mut generator).unwrap();

    let meta = std::fs::metadata(base.join("file")).unwrap();
    use std::os::unix::fs::MetadataExt;
    let mut cache = Md5Cache::open(&list, 0).unwrap();

    assert!(
        cache.lookup("", "file", meta.mtime(), meta.len()).is_some(),
        "matching mtime and size hit"
    );
    assert!(
        cache.lookup("", "file", meta.mtime() + 1, meta.len()).is_none(),
        "changed mtime misses"
    );
    assert!(
        cache.lookup("", "file", meta.mtime(), meta.len() + 1).is_none(),
        "changed size misses"
    );
    assert!(cache.lookup("", "absent", meta.mtime(), meta.len()).is_none());
}

#[test]
fn path_lookups_resolve_before_hitting_the_cache() {
    let temp = tempfile::tempdir().unwrap();
    let base = temp.path().join("tree");
    std::fs::create_dir_all(base.join("docs")).unwrap();
    std::fs::write(base.join("docs/readme"), b"cached text").unwrap();
    let list = temp.path().join("archive.list");

    let mut generator = ListGenerator::new(WalkOptions {
        md5: true,
        ..WalkOptions::default()
    });
    produce(&base, &list, &mut generator).unwrap();

    let meta = std::fs::metadata(base.join("docs/readme")).unwrap();
    use std::os::unix::fs::MetadataExt;
    let mut cache = Md5Cache::open(&list, 0).unwrap();

    // The raw path is normalized before the index query.
    assert!(
        cache
            .lookup_path("docs/./readme", meta.mtime(), meta.len())
            .is_some(),
        "dot components are simplified away"
    );
    assert!(
        cache
            .lookup_path("docs/./readme", meta.mtime() + 1, meta.len())
            .is_none(),
        "the mtime guard still applies"
    );
    assert!(cache
        .lookup_path("docs/missing", meta.mtime(), meta.len())
        .is_none());
}

#[test]
fn strip_depth_rebases_cache_lookups() {
    let temp = tempfile::tempdir().unwrap();
    let base = temp.path().join("tree");
    std::fs::create_dir_all(base.join("sub")).unwrap();
    std::fs::write(base.join("sub/file"), b"cached").unwrap();
    let list = temp.path().join("archive.list");

    let mut generator = ListGenerator::new(WalkOptions {
        md5: true,
        ..WalkOptions::default()
    });
    produce(&base, &list, &mut generator).unwrap();

    let meta = std::fs::metadata(base.join("sub/file")).unwrap();
    use std::os::unix::fs::MetadataExt;

    // The list records the directory as "sub/"; a query from a deeper
    // root only matches once the leading component is stripped.
    let mut strict = Md5Cache::open(&list, 0).unwrap();
    assert!(strict
        .lookup("mirror/sub/", "file", meta.mtime(), meta.len())
        .is_none());

    let mut rebased = Md5Cache::open(&list, 1).unwrap();
    assert!(rebased
        .lookup("mirror/sub/", "file", meta.mtime(), meta.len())
        .is_some());
}

#[test]
fn large_files_get_checksum_blocks_after_their_record() {
    let temp = tempfile::tempdir().unwrap();
    let base = temp.path().join("tree");
    std::fs::create_dir(&base).unwrap();
    let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(base.join("big"), &payload).unwrap();
    std::fs::write(base.join("small"), b"tiny").unwrap();
    let list = temp.path().join("archive.list");

    let mut generator = ListGenerator::new(WalkOptions {
        md5: true,
        rsync: true,
        min_rsync_size: 8_192,
        ..WalkOptions::default()
    });
    produce(&base, &list, &mut generator).unwrap();

    let records = read_list(&list);
    let big_at = records
        .iter()
        .position(|r| r.entity().is_some_and(|e| e.name == "big"))
        .unwrap();
    let Record::Checksums(block) = &records[big_at + 1] else {
        panic!("checksum block follows the large file record");
    };
    assert_eq!(block.file_size, 20_000);
    assert_eq!(block.block_size, signature::DEFAULT_BLOCK_SIZE);
    assert_eq!(block.block_count(), 3);
    assert!(block.has_sentinel());

    // The MD5 recorded on the file matches a direct computation.
    let md5 = records[big_at].file().unwrap().md5;
    assert_eq!(md5, checksums::Md5::digest(&payload));

    // The small file has no checksum block.
    let small_at = records
        .iter()
        .position(|r| r.entity().is_some_and(|e| e.name == "small"))
        .unwrap();
    assert!(!matches!(records[small_at + 1], Record::Checksums(_)));
}
