//! End-to-end behaviour of the Tessera facade.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tempfile::tempdir;
use tessera::{
    Cover, DeadLetterReason, ErrorKind, FsBlobs, ManualClock, NewEvent, Payload, PointInTime,
    PositionKey, RecordingDeadLetters, Retention, Selector, Sequence, Tessera, TesseraConfig,
    Timestamp, Upcaster, Uuid,
};

fn player() -> Cover {
    Cover::new("player", Uuid::from_u128(0xA11CE))
}

fn numbered(from: u32, to: u32) -> Vec<NewEvent> {
    (from..=to)
        .map(|n| NewEvent::new(format!("e{n}"), Bytes::from(format!("payload-{n}"))))
        .collect()
}

fn types(book: &tessera::EventBook) -> Vec<&str> {
    book.records.iter().map(|r| r.event_type.as_str()).collect()
}

#[test]
fn new_stream_appends_from_zero() {
    let tessera = Tessera::builder().build();

    let committed = tessera
        .append(&player(), Sequence::ZERO, numbered(1, 5))
        .unwrap();
    let sequences: Vec<u64> = committed.iter().map(|r| r.sequence.as_u64()).collect();
    assert_eq!(sequences, vec![0, 1, 2, 3, 4]);

    let book = tessera
        .get_event_book(&player(), &Selector::range(0, None))
        .unwrap();
    assert_eq!(types(&book), vec!["e1", "e2", "e3", "e4", "e5"]);
    assert_eq!(book.next_sequence, Sequence::new(5));
}

#[test]
fn stale_expected_sequence_conflicts() {
    let tessera = Tessera::builder().build();
    tessera
        .append(&player(), Sequence::ZERO, numbered(1, 5))
        .unwrap();

    let err = tessera
        .append(&player(), Sequence::new(3), numbered(6, 6))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SequenceConflict);
    assert_eq!(tessera.next_sequence(&player()).unwrap(), Sequence::new(5));
}

#[test]
fn latest_book_is_snapshot_plus_tail() {
    let tessera = Tessera::builder().build();
    tessera
        .append(&player(), Sequence::ZERO, numbered(0, 5))
        .unwrap();
    tessera
        .put_snapshot(
            &player(),
            Sequence::new(5),
            Bytes::from_static(b"S"),
            Retention::Default,
        )
        .unwrap();
    tessera
        .append(&player(), Sequence::new(6), numbered(6, 9))
        .unwrap();

    let book = tessera.get_event_book(&player(), &Selector::Latest).unwrap();

    let snapshot = book.snapshot.as_ref().expect("snapshot attached");
    assert_eq!(snapshot.sequence, Sequence::new(5));
    assert_eq!(snapshot.state, Payload::Inline(Bytes::from_static(b"S")));
    let sequences: Vec<u64> = book.records.iter().map(|r| r.sequence.as_u64()).collect();
    assert_eq!(sequences, vec![6, 7, 8, 9]);
    assert_eq!(book.next_sequence, Sequence::new(10));
}

#[test]
fn oversized_payloads_are_offloaded_and_deduplicated() {
    let tessera = Tessera::builder().offload_threshold(100).build();
    let a = Bytes::from(vec![b'a'; 500]);
    let b = Bytes::from(vec![b'b'; 500]);

    let first = tessera
        .append(
            &player(),
            Sequence::ZERO,
            vec![NewEvent::new("Blob", a.clone()), NewEvent::new("Blob", b)],
        )
        .unwrap();
    let hash_a = first[0].payload.as_reference().unwrap().content_hash;
    let hash_b = first[1].payload.as_reference().unwrap().content_hash;
    assert_ne!(hash_a, hash_b);

    let second = tessera
        .append(
            &player(),
            Sequence::new(2),
            vec![NewEvent::new("Blob", a.clone()), NewEvent::new("Blob", a.clone())],
        )
        .unwrap();
    assert_eq!(second[0].payload, second[1].payload);
    assert_eq!(
        second[0].payload.as_reference().unwrap().content_hash,
        hash_a
    );
    assert_eq!(tessera.payloads().stats().unwrap().blobs, 2);

    // Reads hand back the original bytes.
    let book = tessera
        .get_event_book(&player(), &Selector::range(2, Some(2)))
        .unwrap();
    assert_eq!(book.records[0].payload, Payload::Inline(a));
}

#[test]
fn upcaster_renames_old_types_on_read() {
    let upcaster = Upcaster::builder()
        .rename("OrderCreatedV1", "OrderCreatedV2")
        .build();
    let tessera = Tessera::builder().upcaster(upcaster).build();
    let order = Cover::new("order", Uuid::from_u128(7));

    let mut batch = numbered(0, 6);
    batch.push(NewEvent::new("OrderCreatedV1", "total=10"));
    tessera.append(&order, Sequence::ZERO, batch).unwrap();

    let book = tessera
        .get_event_book(&order, &Selector::range(7, Some(7)))
        .unwrap();
    assert_eq!(book.records[0].event_type, "OrderCreatedV2");
    assert_eq!(book.records[0].sequence, Sequence::new(7));
}

#[test]
fn upcast_failure_aborts_load_and_dead_letters() {
    let sink = Arc::new(RecordingDeadLetters::new());
    let upcaster = Upcaster::builder()
        .transform("Legacy", "Current", |_| Err("unreadable".to_string()))
        .build();
    let tessera = Tessera::builder()
        .upcaster(upcaster)
        .dead_letters(sink.clone())
        .build();

    tessera
        .append(
            &player(),
            Sequence::ZERO,
            vec![NewEvent::new("Fine", "x"), NewEvent::new("Legacy", "y")],
        )
        .unwrap();

    let err = tessera
        .get_event_book(&player(), &Selector::Latest)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransformFailed);
    assert_eq!(sink.letters()[0].reason, DeadLetterReason::TransformFailed);
}

#[test]
fn main_edition_cannot_be_deleted_but_branches_can() {
    let tessera = Tessera::builder().build();
    let main = player();
    let temp = player().with_edition("temp");

    tessera.append(&main, Sequence::ZERO, numbered(0, 2)).unwrap();
    tessera.append(&temp, Sequence::ZERO, numbered(0, 0)).unwrap();
    tessera
        .put_snapshot(&temp, Sequence::ZERO, Bytes::from_static(b"t"), Retention::Persist)
        .unwrap();

    for name in ["angzarr", "", "<main>"] {
        let err = tessera.delete_edition("player", name).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rejected);
    }

    assert_eq!(tessera.delete_edition("player", "temp").unwrap(), 1);
    assert!(tessera.list_roots("player", "temp").unwrap().is_empty());
    assert!(tessera.get_snapshot(&temp).unwrap().is_none());
    assert_eq!(tessera.next_sequence(&temp).unwrap(), Sequence::ZERO);
    assert_eq!(tessera.next_sequence(&main).unwrap(), Sequence::new(3));
    assert_eq!(tessera.stream_count().unwrap(), 1);
}

#[test]
fn reserved_main_alias_shares_the_main_stream() {
    let tessera = Tessera::builder().build();
    tessera.append(&player(), Sequence::ZERO, numbered(0, 1)).unwrap();

    let aliased = player().with_edition("<main>");
    assert_eq!(tessera.next_sequence(&aliased).unwrap(), Sequence::new(2));
    tessera.append(&aliased, Sequence::new(2), numbered(2, 2)).unwrap();

    let book = tessera.get_event_book(&player(), &Selector::Latest).unwrap();
    assert_eq!(book.records.len(), 3);
    assert_eq!(tessera.stream_count().unwrap(), 1);
}

#[test]
fn temporal_reads_by_sequence_time_and_rfc3339() {
    let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1_000)));
    let tessera = Tessera::builder().clock(clock.clone()).build();

    tessera.append(&player(), Sequence::ZERO, numbered(0, 1)).unwrap();
    clock.advance(Duration::from_secs(60));
    tessera.append(&player(), Sequence::new(2), numbered(2, 2)).unwrap();

    let by_sequence = tessera
        .get_event_book(&player(), &Selector::as_of_sequence(0))
        .unwrap();
    assert_eq!(types(&by_sequence), vec!["e0"]);

    let by_time = tessera
        .get_event_book(
            &player(),
            &Selector::Temporal(PointInTime::Timestamp(Timestamp::from_secs(1_030))),
        )
        .unwrap();
    assert_eq!(types(&by_time), vec!["e0", "e1"]);

    let by_string = tessera
        .get_event_book(&player(), &Selector::as_of_rfc3339("1970-01-01T00:20:00Z"))
        .unwrap();
    assert_eq!(types(&by_string), vec!["e0", "e1", "e2"]);
    assert!(by_string.snapshot.is_none());
}

#[test]
fn correlation_reads_span_streams() {
    let tessera = Tessera::builder().build();
    let order = Cover::new("order", Uuid::from_u128(1)).with_correlation("checkout-9");
    let stock = Cover::new("inventory", Uuid::from_u128(2)).with_correlation("checkout-9");

    tessera.append(&order, Sequence::ZERO, numbered(0, 0)).unwrap();
    tessera.append(&stock, Sequence::ZERO, numbered(0, 1)).unwrap();
    tessera
        .append(&order.clone().with_correlation("other"), Sequence::new(1), numbered(1, 1))
        .unwrap();

    let books = tessera.get_correlated("checkout-9").unwrap();
    assert_eq!(books.len(), 2);

    let scoped = tessera
        .get_event_book(&order, &Selector::Correlation("checkout-9".to_string()))
        .unwrap();
    assert_eq!(types(&scoped), vec!["e0"]);

    assert!(tessera.get_correlated("nobody").unwrap().is_empty());
    assert_eq!(
        tessera.get_correlated("").unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
}

#[test]
fn unknown_aggregate_reads_empty() {
    let tessera = Tessera::builder().build();
    let book = tessera.get_event_book(&player(), &Selector::Latest).unwrap();
    assert!(book.records.is_empty());
    assert!(book.snapshot.is_none());
    assert_eq!(book.next_sequence, Sequence::ZERO);
}

#[test]
fn positions_are_isolated_per_handler() {
    let tessera = Tessera::builder().build();
    tessera
        .put_position(PositionKey::new("A", "player"), Sequence::new(10))
        .unwrap();
    tessera
        .put_position(PositionKey::new("B", "player"), Sequence::new(20))
        .unwrap();

    assert_eq!(
        tessera.get_position(&PositionKey::new("A", "player")).unwrap(),
        Some(Sequence::new(10))
    );
    assert_eq!(
        tessera.get_position(&PositionKey::new("B", "player")).unwrap(),
        Some(Sequence::new(20))
    );

    let root = Uuid::from_u128(7);
    tessera
        .put_position(PositionKey::new("A", "order").with_root(root), Sequence::new(3))
        .unwrap();
    let held: Vec<_> = tessera
        .positions_for("A")
        .unwrap()
        .into_iter()
        .map(|p| (p.key.domain, p.sequence))
        .collect();
    assert_eq!(
        held,
        vec![
            ("order".to_string(), Sequence::new(3)),
            ("player".to_string(), Sequence::new(10)),
        ]
    );
    assert_eq!(
        tessera.positions_for("").unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
}

#[test]
fn persist_milestones_survive_newer_snapshots() {
    let tessera = Tessera::builder().milestone_interval(0).build();
    tessera.append(&player(), Sequence::ZERO, numbered(0, 9)).unwrap();

    tessera
        .put_snapshot(&player(), Sequence::new(3), "m3".into(), Retention::Persist)
        .unwrap();
    tessera
        .put_snapshot(&player(), Sequence::new(8), "d8".into(), Retention::Default)
        .unwrap();

    let current = tessera.get_snapshot(&player()).unwrap().unwrap();
    assert_eq!(current.sequence, Sequence::new(8));
    let milestone = tessera
        .get_snapshot_at(&player(), Sequence::new(3))
        .unwrap()
        .unwrap();
    assert_eq!(milestone.state, Payload::Inline(Bytes::from_static(b"m3")));
    assert_eq!(
        tessera.snapshot_milestones(&player()).unwrap(),
        vec![Sequence::new(3)]
    );

    tessera.delete_snapshot(&player()).unwrap();
    tessera.delete_snapshot(&player()).unwrap();
    assert!(tessera.get_snapshot(&player()).unwrap().is_none());
}

#[test]
fn sweep_only_reclaims_unreferenced_blobs() {
    let clock = Arc::new(ManualClock::new(Timestamp::from_secs(10_000)));
    let tessera = Tessera::builder()
        .clock(clock.clone())
        .offload_threshold(16)
        .build();

    // Referenced from the log.
    tessera
        .append(
            &player(),
            Sequence::ZERO,
            vec![NewEvent::new("Big", vec![1u8; 64])],
        )
        .unwrap();
    // Orphaned: offloaded directly, never referenced.
    tessera
        .payloads()
        .offload(&Bytes::from(vec![2u8; 64]))
        .unwrap();

    clock.advance(Duration::from_secs(3_600));
    let report = tessera.sweep_payloads(Duration::from_secs(60)).unwrap();

    assert_eq!(report.deleted, 1);
    assert_eq!(report.retained_live, 1);
    let book = tessera.get_event_book(&player(), &Selector::Latest).unwrap();
    assert_eq!(
        book.records[0].payload,
        Payload::Inline(Bytes::from(vec![1u8; 64]))
    );
}

#[test]
fn missing_blob_is_dead_lettered_on_read() {
    let dir = tempdir().unwrap();
    let blobs = Arc::new(FsBlobs::open(dir.path()).unwrap());
    let sink = Arc::new(RecordingDeadLetters::new());
    let tessera = Tessera::builder()
        .blob_backend(blobs.clone())
        .offload_threshold(16)
        .dead_letters(sink.clone())
        .build();

    let committed = tessera
        .append(
            &player(),
            Sequence::ZERO,
            vec![NewEvent::new("Big", vec![3u8; 64])],
        )
        .unwrap();
    let hash = committed[0].payload.as_reference().unwrap().content_hash;
    std::fs::write(blobs.blob_path(&hash), b"bit rot").unwrap();

    let err = tessera
        .get_event_book(&player(), &Selector::Latest)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IntegrityFailed);
    assert_eq!(sink.letters()[0].reason, DeadLetterReason::PayloadRetrieval);
}

#[test]
fn built_from_filesystem_config() {
    let dir = tempdir().unwrap();
    let mut config = TesseraConfig::production();
    config.payloads.threshold_bytes = 8;
    config.resolve_paths(dir.path());

    let tessera = Tessera::from_config(&config).unwrap();
    tessera
        .append(&player(), Sequence::ZERO, vec![NewEvent::new("Big", vec![5u8; 32])])
        .unwrap();

    assert!(config.payloads.directory.is_dir());
    assert_eq!(tessera.payloads().stats().unwrap().blobs, 1);
}
