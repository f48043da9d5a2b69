//! Accept and delay filters during list generation.

#![cfg(unix)]

use filters::RuleKind;
use flist::{ListIo, Record, Tag, VecStream};
use walk::{ListGenerator, Order, WalkOptions};

fn run(generator: &mut ListGenerator, base: &std::path::Path) -> Vec<Record> {
    let mut io = ListIo::new(VecStream::new());
    generator.run(base, &mut io).expect("walk succeeds");
    io.seek(0).unwrap();
    io.last_symlink.clear();
    let mut records = Vec::new();
    loop {
        let record = Record::step(&mut io).expect("valid stream");
        let done = matches!(record, Record::Trailer(_));
        records.push(record);
        if done {
            break;
        }
    }
    records
}

fn names(records: &[Record], tag: Tag) -> Vec<String> {
    records
        .iter()
        .filter(|r| r.tag() == tag)
        .map(|r| r.entity().map(|e| e.name.clone()).unwrap_or_default())
        .collect()
}

#[test]
fn excluded_files_never_appear() {
    let temp = tempfile::tempdir().unwrap();
    std::fs::write(temp.path().join("keep.txt"), b"k").unwrap();
    std::fs::write(temp.path().join("drop.tmp"), b"d").unwrap();

    let mut generator = ListGenerator::new(WalkOptions::default());
    generator.accept.push(RuleKind::Exclude, "*.tmp").unwrap();

    let records = run(&mut generator, temp.path());
    assert_eq!(names(&records, Tag::NormalFile), vec!["keep.txt"]);
}

#[test]
fn excluded_directories_are_pruned_entirely() {
    let temp = tempfile::tempdir().unwrap();
    std::fs::create_dir(temp.path().join("src")).unwrap();
    std::fs::write(temp.path().join("src/lib.rs"), b"x").unwrap();
    std::fs::create_dir(temp.path().join("target")).unwrap();
    std::fs::write(temp.path().join("target/out.o"), b"o").unwrap();

    let mut generator = ListGenerator::new(WalkOptions::default());
    generator.accept.push(RuleKind::Exclude, "target/").unwrap();

    let records = run(&mut generator, temp.path());
    let dirs = names(&records, Tag::DirStart);
    assert!(dirs.contains(&"src/".to_owned()));
    assert!(!dirs.iter().any(|d| d.starts_with("target")));
    assert_eq!(names(&records, Tag::NormalFile), vec!["lib.rs"]);
}

#[test]
fn accept_rules_are_documented_in_the_stream() {
    let temp = tempfile::tempdir().unwrap();
    let mut generator = ListGenerator::new(WalkOptions::default());
    generator.accept.push(RuleKind::Include, "*.keep").unwrap();
    generator.accept.push(RuleKind::Exclude, "*").unwrap();

    let records = run(&mut generator, temp.path());
    let filters: Vec<(flist::FilterKind, String)> = records
        .iter()
        .filter_map(|r| match r {
            Record::Filter(f) => Some((f.kind, f.pattern.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(
        filters,
        vec![
            (flist::FilterKind::Include, "*.keep".to_owned()),
            (flist::FilterKind::Exclude, "*".to_owned()),
        ]
    );
    // Filter records come right after the header.
    assert_eq!(records[1].tag(), Tag::Filter);
    assert_eq!(records[2].tag(), Tag::Filter);
}

#[test]
fn delayed_directories_come_last_under_tree_order() {
    let temp = tempfile::tempdir().unwrap();
    for dir in ["early", "postponed", "zlast"] {
        std::fs::create_dir(temp.path().join(dir)).unwrap();
    }

    let mut generator = ListGenerator::new(WalkOptions::default());
    generator.delay.push(RuleKind::Exclude, "postponed/").unwrap();

    let records = run(&mut generator, temp.path());
    let dirs = names(&records, Tag::DirStart);
    assert_eq!(dirs.last().unwrap(), "postponed/");
    assert!(dirs.contains(&"early/".to_owned()));
    assert!(dirs.contains(&"zlast/".to_owned()));
}

#[test]
fn delayed_directories_come_last_under_depth_order() {
    let temp = tempfile::tempdir().unwrap();
    std::fs::create_dir(temp.path().join("normal")).unwrap();
    std::fs::write(temp.path().join("normal/a"), b"a").unwrap();
    std::fs::create_dir(temp.path().join("postponed")).unwrap();
    std::fs::write(temp.path().join("postponed/b"), b"b").unwrap();

    let mut generator = ListGenerator::new(WalkOptions {
        order: Order::Depth,
        ..WalkOptions::default()
    });
    generator.delay.push(RuleKind::Exclude, "postponed/").unwrap();

    let records = run(&mut generator, temp.path());
    let dirs = names(&records, Tag::DirStart);
    assert_eq!(
        dirs.last().unwrap(),
        "postponed/",
        "delayed subtree is emitted after the whole primary walk"
    );
    let normal = dirs.iter().position(|d| d == "normal/").unwrap();
    let root = dirs.iter().position(|d| d == "./").unwrap();
    assert!(normal < root, "depth order lists children before the root");
}
