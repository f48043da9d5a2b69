//! Scanning a file against its own checksum block.

use matching::{Hit, Matcher};
use signature::generate;
use std::io::Write as _;

fn write_temp(data: &[u8]) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(data).unwrap();
    tmp
}

fn patterned(len: usize) -> Vec<u8> {
    // Position-dependent bytes so distinct blocks have distinct sums.
    (0..len)
        .map(|i| ((i * 7 + i / 253) % 251) as u8)
        .collect()
}

#[test]
fn self_scan_hits_every_full_block_and_never_the_tail() {
    // Three full blocks plus a 17-byte tail.
    let block_size = 8192u64;
    let data = patterned(3 * 8192 + 17);
    let tmp = write_temp(&data);

    let (block, _md5) = generate(tmp.path(), block_size).unwrap();
    assert_eq!(block.block_count(), 4, "three full tuples plus sentinel");
    assert!(block.has_sentinel());

    let matcher = Matcher::new(&block);
    assert_eq!(matcher.len(), 3, "the sentinel stays out of the index");

    let mut hits = Vec::new();
    matcher.scan(tmp.path(), |hit| hits.push(hit)).unwrap();

    assert_eq!(
        hits,
        vec![
            Hit {
                block: 0,
                offset: 0
            },
            Hit {
                block: 1,
                offset: 8192
            },
            Hit {
                block: 2,
                offset: 16384
            },
        ]
    );
}

#[test]
fn shifted_content_matches_at_shifted_offsets() {
    // The target holds the source blocks at a 5-byte displacement; the
    // rolling scan must find them anyway.
    let block_size = 1024u64;
    let source = patterned(3 * 1024);
    let tmp_source = write_temp(&source);
    let (block, _) = generate(tmp_source.path(), block_size).unwrap();

    let mut target = b"12345".to_vec();
    target.extend_from_slice(&source);
    let tmp_target = write_temp(&target);

    let matcher = Matcher::new(&block);
    let mut hits = Vec::new();
    matcher.scan(tmp_target.path(), |hit| hits.push(hit)).unwrap();

    assert_eq!(
        hits,
        vec![
            Hit {
                block: 0,
                offset: 5
            },
            Hit {
                block: 1,
                offset: 5 + 1024
            },
            Hit {
                block: 2,
                offset: 5 + 2048
            },
        ]
    );
}

#[test]
fn unrelated_content_produces_no_hits() {
    let block_size = 512u64;
    let source = patterned(4 * 512);
    let tmp_source = write_temp(&source);
    let (block, _) = generate(tmp_source.path(), block_size).unwrap();

    let target: Vec<u8> = (0..4096).map(|i| (i % 2) as u8).collect();
    let tmp_target = write_temp(&target);

    let matcher = Matcher::new(&block);
    let mut hits = Vec::new();
    matcher.scan(tmp_target.path(), |hit| hits.push(hit)).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn target_shorter_than_a_block_cannot_match() {
    let block_size = 1024u64;
    let source = patterned(2048);
    let tmp_source = write_temp(&source);
    let (block, _) = generate(tmp_source.path(), block_size).unwrap();

    let tmp_target = write_temp(&source[..100]);
    let matcher = Matcher::new(&block);
    let mut hits = Vec::new();
    matcher.scan(tmp_target.path(), |hit| hits.push(hit)).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn repeated_blocks_report_non_overlapping_hits() {
    // A target of one source block repeated: each repetition matches and
    // the scan advances block-by-block, never overlapping.
    let block_size = 1024u64;
    let one_block = patterned(1024);
    let tmp_source = write_temp(&one_block);
    let (block, _) = generate(tmp_source.path(), block_size).unwrap();

    let mut target = Vec::new();
    for _ in 0..4 {
        target.extend_from_slice(&one_block);
    }
    let tmp_target = write_temp(&target);

    let matcher = Matcher::new(&block);
    let mut hits = Vec::new();
    matcher.scan(tmp_target.path(), |hit| hits.push(hit)).unwrap();

    assert_eq!(hits.len(), 4);
    for (i, hit) in hits.iter().enumerate() {
        assert_eq!(hit.block, 0);
        assert_eq!(hit.offset, i as u64 * 1024);
    }
}
