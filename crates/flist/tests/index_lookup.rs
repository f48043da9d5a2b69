//! Indexed `(directory, name)` lookup over a frozen list.

use flist::{
    Entity, FileRecord, Header, ListIndex, ListIo, ListStream, MmapStream, Record, SymlinkRecord,
    Trailer, VecStream,
};
use std::io::Write as _;

fn dir_start(name: &str) -> Record {
    Record::DirStart(Entity {
        name: name.to_owned(),
        ..Entity::default()
    })
}

fn file(name: &str, size: u64) -> Record {
    Record::NormalFile(FileRecord {
        entity: Entity {
            name: name.to_owned(),
            ..Entity::default()
        },
        size,
        md5: [0; 16],
    })
}

/// Builds the two-directory list used by most tests: `a/` and `b/`, each
/// holding files `p` and `q`.
fn two_dir_list() -> Vec<u8> {
    let mut io = ListIo::new(VecStream::new());
    io.write_header(Header::with_epoch(100)).unwrap();
    for dir in ["a/", "b/"] {
        dir_start(dir).write(&mut io).unwrap();
        file("p", 1).write(&mut io).unwrap();
        file("q", 2).write(&mut io).unwrap();
        Record::DirEnd.write(&mut io).unwrap();
    }
    Record::Trailer(Trailer::new()).write(&mut io).unwrap();
    io.into_inner().as_slice().to_vec()
}

#[test]
fn lookup_finds_entries_in_both_directories() {
    let mut io = ListIo::new(VecStream::from_bytes(two_dir_list()));
    let mut index = ListIndex::build(&mut io).unwrap();
    assert_eq!(index.len(), 2);
    assert!(index.contains_dir("a/"));
    assert!(index.contains_dir("b/"));

    let hit = index.lookup(&mut io, "a/", "q").unwrap().unwrap();
    assert_eq!(hit.file().unwrap().size, 2);

    // Same directory again: the cursor continues from its position and
    // wraps once to find the earlier entry.
    let hit = index.lookup(&mut io, "a/", "p").unwrap().unwrap();
    assert_eq!(hit.file().unwrap().size, 1);

    // Different directory: one seek to its recorded start.
    let hit = index.lookup(&mut io, "b/", "p").unwrap().unwrap();
    assert_eq!(hit.file().unwrap().size, 1);
}

#[test]
fn consecutive_same_directory_lookups_stream_forward() {
    let mut io = ListIo::new(VecStream::from_bytes(two_dir_list()));
    let mut index = ListIndex::build(&mut io).unwrap();

    // In list order: no wrap needed, each lookup continues the scan.
    let first = index.lookup(&mut io, "a/", "p").unwrap().unwrap();
    let pos_after_first = io.tell();
    let second = index.lookup(&mut io, "a/", "q").unwrap().unwrap();
    assert!(io.tell() > pos_after_first, "scan continued forward");
    assert_eq!(first.file().unwrap().size, 1);
    assert_eq!(second.file().unwrap().size, 2);
}

#[test]
fn missing_entries_and_directories_are_negative() {
    let mut io = ListIo::new(VecStream::from_bytes(two_dir_list()));
    let mut index = ListIndex::build(&mut io).unwrap();

    assert!(index.lookup(&mut io, "a/", "nope").unwrap().is_none());
    assert!(index.lookup(&mut io, "c/", "p").unwrap().is_none());
    // A miss must not poison later lookups.
    assert!(index.lookup(&mut io, "b/", "q").unwrap().is_some());
}

#[test]
fn symlink_context_is_restored_on_seek() {
    // Two directories whose symlinks compress against each other; jumping
    // straight into the second must restore the saved context first.
    let mut io = ListIo::new(VecStream::new());
    io.write_header(Header::with_epoch(0)).unwrap();
    dir_start("a/").write(&mut io).unwrap();
    Record::Symlink(SymlinkRecord {
        entity: Entity {
            name: "one".into(),
            ..Entity::default()
        },
        target: "/usr/share/doc".into(),
    })
    .write(&mut io)
    .unwrap();
    Record::DirEnd.write(&mut io).unwrap();
    dir_start("b/").write(&mut io).unwrap();
    Record::Symlink(SymlinkRecord {
        entity: Entity {
            name: "two".into(),
            ..Entity::default()
        },
        target: "/usr/share/man".into(),
    })
    .write(&mut io)
    .unwrap();
    Record::DirEnd.write(&mut io).unwrap();
    Record::Trailer(Trailer::new()).write(&mut io).unwrap();

    let mut io = ListIo::new(VecStream::from_bytes(io.into_inner().as_slice().to_vec()));
    let mut index = ListIndex::build(&mut io).unwrap();

    let Record::Symlink(two) = index.lookup(&mut io, "b/", "two").unwrap().unwrap() else {
        panic!("expected symlink");
    };
    assert_eq!(two.target, "/usr/share/man");

    let Record::Symlink(one) = index.lookup(&mut io, "a/", "one").unwrap().unwrap() else {
        panic!("expected symlink");
    };
    assert_eq!(one.target, "/usr/share/doc");
}

#[test]
fn index_works_over_a_memory_mapped_list() {
    let bytes = two_dir_list();
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&bytes).unwrap();

    let mut io = ListIo::new(MmapStream::open(tmp.path()).unwrap());
    let mut index = ListIndex::build(&mut io).unwrap();
    let hit = index.lookup(&mut io, "b/", "q").unwrap().unwrap();
    assert_eq!(hit.file().unwrap().size, 2);

    // The mapping refuses writes.
    let mut stream = io.into_inner();
    assert!(matches!(
        stream.write(b"x"),
        Err(flist::FlistError::ReadOnly)
    ));
}
