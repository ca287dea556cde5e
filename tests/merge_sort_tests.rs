//! Heterogeneous merge and sort pipelines over real files.

mod common;

use roslog::mcap::{McapReader, McapWriteOptions, MessageQuery};
use roslog::ops::{merge_mcap_files, sort_mcap_file, SortOptions};

#[test]
fn merge_interleaves_two_files_by_log_time() {
    // Two files with 10 messages each at even and odd timestamps; the
    // merged output holds 0..19 in order with sequence numbers 0..19.
    let even: Vec<(u64, Vec<u8>)> = (0..10).map(|i| (i * 2, vec![0xEE; 8])).collect();
    let odd: Vec<(u64, Vec<u8>)> = (0..10).map(|i| (i * 2 + 1, vec![0x0D; 8])).collect();

    let even_path = common::temp_path("merge-even", "mcap");
    let odd_path = common::temp_path("merge-odd", "mcap");
    let out_path = common::temp_path("merge-out", "mcap");
    std::fs::write(
        &even_path,
        common::build_mcap(McapWriteOptions::default(), &even),
    )
    .unwrap();
    std::fs::write(
        &odd_path,
        common::build_mcap(McapWriteOptions::default(), &odd),
    )
    .unwrap();

    let stats = merge_mcap_files(
        &[&even_path, &odd_path],
        &out_path,
        McapWriteOptions::default(),
    )
    .unwrap();
    assert_eq!(stats.messages, 20);
    assert_eq!(stats.channels, 1);

    let merged = McapReader::open(&out_path).unwrap();
    let messages: Vec<_> = merged
        .messages(MessageQuery::topic("/t"))
        .unwrap()
        .map(|m| m.unwrap())
        .collect();
    let times: Vec<u64> = messages.iter().map(|m| m.log_time).collect();
    assert_eq!(times, (0..20).collect::<Vec<u64>>());
    let sequences: Vec<u32> = messages.iter().map(|m| m.sequence).collect();
    assert_eq!(sequences, (0..20).collect::<Vec<u32>>());

    for path in [&even_path, &odd_path, &out_path] {
        std::fs::remove_file(path).ok();
    }
}

#[test]
fn sort_file_by_log_time() {
    let shuffled: Vec<(u64, Vec<u8>)> = [50u64, 10, 40, 20, 30]
        .into_iter()
        .map(|t| (t, t.to_le_bytes().to_vec()))
        .collect();
    let in_path = common::temp_path("sort-in", "mcap");
    let out_path = common::temp_path("sort-out", "mcap");
    std::fs::write(
        &in_path,
        common::build_mcap(McapWriteOptions::default(), &shuffled),
    )
    .unwrap();

    let stats = sort_mcap_file(
        &in_path,
        &out_path,
        SortOptions {
            by_topic: false,
            log_time: true,
        },
        McapWriteOptions::default(),
    )
    .unwrap();
    assert_eq!(stats.messages, 5);

    let sorted = McapReader::open(&out_path).unwrap();
    let mut query = MessageQuery::all();
    query.in_log_time_order = false;
    let times: Vec<u64> = sorted
        .messages(query)
        .unwrap()
        .map(|m| m.unwrap().log_time)
        .collect();
    assert_eq!(times, vec![10, 20, 30, 40, 50]);

    std::fs::remove_file(&in_path).ok();
    std::fs::remove_file(&out_path).ok();
}
