//! Unit tests for tessera-types

use std::time::Duration;

use proptest::prelude::*;
use test_case::test_case;

use super::*;

// ============================================================================
// Sequence Tests
// ============================================================================

#[test]
fn sequence_starts_at_zero() {
    assert_eq!(Sequence::default(), Sequence::ZERO);
    assert_eq!(Sequence::ZERO.as_u64(), 0);
}

#[test]
fn sequence_next_overflows_to_none() {
    assert_eq!(Sequence::new(4).next(), Some(Sequence::new(5)));
    assert_eq!(Sequence::new(u64::MAX).next(), None);
}

// ============================================================================
// Timestamp Tests
// ============================================================================

#[test]
fn monotonic_after_bumps_when_clock_stalls() {
    let last = Timestamp::from_nanos(1_000);
    assert_eq!(
        Timestamp::monotonic_after(Timestamp::from_nanos(500), Some(last)),
        Timestamp::from_nanos(1_001)
    );
    assert_eq!(
        Timestamp::monotonic_after(Timestamp::from_nanos(1_000), Some(last)),
        Timestamp::from_nanos(1_001)
    );
    assert_eq!(
        Timestamp::monotonic_after(Timestamp::from_nanos(2_000), Some(last)),
        Timestamp::from_nanos(2_000)
    );
    assert_eq!(
        Timestamp::monotonic_after(Timestamp::from_nanos(7), None),
        Timestamp::from_nanos(7)
    );
}

#[test]
fn rfc3339_parses_and_formats() {
    let ts = Timestamp::parse_rfc3339("2024-03-01T12:00:00Z").expect("valid timestamp");
    assert_eq!(ts.as_secs(), 1_709_294_400);
    assert_eq!(ts.to_rfc3339(), "2024-03-01T12:00:00.000000000Z");
}

#[test]
fn rfc3339_honours_offsets() {
    let utc = Timestamp::parse_rfc3339("2024-03-01T12:00:00Z").expect("valid");
    let shifted = Timestamp::parse_rfc3339("2024-03-01T14:00:00+02:00").expect("valid");
    assert_eq!(utc, shifted);
}

#[test]
fn from_system_time_counts_from_epoch() {
    let time = UNIX_EPOCH + Duration::from_secs(42);
    assert_eq!(Timestamp::from_system_time(time), Timestamp::from_secs(42));
    let before = UNIX_EPOCH - Duration::from_secs(1);
    assert_eq!(Timestamp::from_system_time(before), Timestamp::EPOCH);
}

#[test]
fn saturating_sub_clamps_huge_durations_to_epoch() {
    let now = Timestamp::from_secs(3_600);
    assert_eq!(
        now.saturating_sub(Duration::from_secs(600)),
        Timestamp::from_secs(3_000)
    );
    // More nanoseconds than fit in a u64.
    assert_eq!(
        now.saturating_sub(Duration::from_secs(18_446_744_074)),
        Timestamp::EPOCH
    );
    assert_eq!(now.saturating_sub(Duration::MAX), Timestamp::EPOCH);
}

#[test_case("not a time" ; "garbage")]
#[test_case("2024-03-01" ; "date only")]
#[test_case("1969-12-31T23:59:59Z" ; "before epoch")]
fn rfc3339_rejects(input: &str) {
    assert!(Timestamp::parse_rfc3339(input).is_err());
}

// ============================================================================
// ContentHash Tests
// ============================================================================

#[test]
fn content_hash_hex_round_trips() {
    let mut bytes = [0u8; HASH_LENGTH];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = i as u8 * 7;
    }
    let hash = ContentHash::from_bytes(bytes);
    let hex = hash.to_hex();
    assert_eq!(hex.len(), 64);
    assert_eq!(ContentHash::from_hex(&hex), Some(hash));
}

#[test_case("" ; "empty")]
#[test_case("abc" ; "short")]
#[test_case(&"zz".repeat(32) ; "not hex")]
fn content_hash_rejects_bad_hex(input: &str) {
    assert_eq!(ContentHash::from_hex(input), None);
}

// ============================================================================
// Edition Tests
// ============================================================================

#[test_case("", true ; "empty alias")]
#[test_case("angzarr", true ; "reserved name")]
#[test_case("<main>", true ; "reserved alias")]
#[test_case("temp", false ; "branch")]
#[test_case("v2", false ; "migration branch")]
fn edition_aliases(name: &str, is_main: bool) {
    let edition = Edition::new(name);
    assert_eq!(edition.is_main(), is_main);
    if is_main {
        assert_eq!(edition, Edition::main());
    }
}

#[test]
fn edition_serde_canonicalizes_empty() {
    let edition: Edition = serde_json::from_str("\"\"").expect("deserialize");
    assert!(edition.is_main());
    assert_eq!(
        serde_json::to_string(&Edition::new("temp")).expect("serialize"),
        "\"temp\""
    );
}

#[test]
fn cover_stream_key_ignores_correlation() {
    let root = Uuid::new_v4();
    let a = Cover::new("player", root).with_correlation("c-1");
    let b = Cover::new("player", root).with_correlation("c-2");
    assert_eq!(a.stream_key(), b.stream_key());

    let branched = Cover::new("player", root).with_edition("temp");
    assert_ne!(a.stream_key(), branched.stream_key());
}

#[test]
fn payload_len_covers_both_forms() {
    let inline = Payload::Inline(Bytes::from_static(b"hello"));
    assert_eq!(inline.len(), 5);
    assert!(inline.as_reference().is_none());

    let external = Payload::External(PayloadReference {
        content_hash: ContentHash::from_bytes([1; HASH_LENGTH]),
        storage_type: StorageType::Memory,
        uri: "memory://01".to_string(),
        original_size: 4096,
        stored_at: Timestamp::EPOCH,
    });
    assert_eq!(external.len(), 4096);
    assert!(external.as_inline().is_none());
}

#[test]
fn storage_type_parses() {
    assert_eq!("memory".parse::<StorageType>(), Ok(StorageType::Memory));
    assert_eq!(
        "filesystem".parse::<StorageType>(),
        Ok(StorageType::Filesystem)
    );
    assert!("s3".parse::<StorageType>().is_err());
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #[test]
    fn monotonic_after_is_strictly_increasing(
        readings in proptest::collection::vec(0u64..1_000, 1..50)
    ) {
        let mut last = None;
        for reading in readings {
            let ts = Timestamp::monotonic_after(Timestamp::from_nanos(reading), last);
            if let Some(prev) = last {
                prop_assert!(ts > prev);
            }
            last = Some(ts);
        }
    }
}
