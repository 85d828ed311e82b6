//! Decoding of captured and hand-built PDUs through the public API

use cellular_modem::pdu;
use cellular_modem::{Delivery, SegmentStore};

/// First half of a concatenated UCS2 message captured from a live modem
const CAPTURED_PART_1: &str = concat!(
    "07911356044902004412916801861326265746660008520113",
    "1234718A8C050003D402013010660E65E565B9821F30110032",
    "003000320035611F8C225E8651785F00542FFF01000A4EBA4EE",
    "C65004E0A96EA5C71FF0C5411661F7A7A63A27D2230028C2262C",
    "9683C8FCE676565B053D89769000A5728803662C951885FB77684",
    "795D798F4E0BFF0C86548BDA65C54EBA518D6B2151FA53D1000A96",
    "505B9A5E72545851DB5FA194F67070",
);

/// Second half of the same message
const CAPTURED_PART_2: &str = concat!(
    "0791135604490200441291680186132626574666000852011",
    "31234718A8A050003D402023001003626055E725458572380",
    "46521D96EA767B573A000A53C24E0E6D3B52A883B753D6003",
    "626056D3B52A85E7254580026516C62DB5E72545830019650",
    "5B9A53418FDE595652B1000A70B951FB00200068006700740",
    "06F002E00630063002F0061002F0065004500590057002076",
    "7B5F556E38620FFF0C62D265368BF756DE590D0052",
);

const CAPTURED_TEXT_1: &str = "【明日方舟】2025感谢庆典开启！\n人们攀上雪山，向星空探索。谢拉格迎来新变革\n在耶拉冈德的祝福下，虔诚旅人再次出发\n限定干员凛御银灰";

const CAPTURED_TEXT_2: &str = "、6★干员圣聆初雪登场\n参与活动获取6★活动干员&公招干员、限定十连奖励\n点击 hgto.cc/a/eEYW 登录游戏，拒收请回复R";

/// 16-bit reference 0xABCD, segment 1 of 2
const PAIR_FIRST: &str = "0891683108200505F0440D91683119325476F800085210715102348013060804ABCD020100480065006C006C006F0020";

/// 16-bit reference 0xABCD, segment 2 of 2
const PAIR_SECOND: &str = "0891683108200505F0440D91683119325476F800085210715102348011060804ABCD02020077006F0072006C0064";

#[test]
fn test_captured_segments_decode() {
    let first = pdu::parse(CAPTURED_PART_1).unwrap();
    assert_eq!(first.record.smsc.as_deref(), Some("316540942000"));
    assert_eq!(first.record.sender, "861068316262756466");
    assert_eq!(first.record.timestamp, "25/10/31,21:43:17");
    assert_eq!(first.record.content, CAPTURED_TEXT_1);
    assert!(first.record.is_segment);
    assert_eq!(first.record.reference, 212);

    let second = pdu::parse(CAPTURED_PART_2).unwrap();
    assert_eq!(second.record.content, CAPTURED_TEXT_2);
    assert_eq!(second.segment.map(|s| (s.count, s.index)), Some((2, 1)));
}

#[test]
fn test_captured_message_reassembles_out_of_order() {
    let mut store = SegmentStore::new();

    let second = pdu::decode(CAPTURED_PART_2, &mut store).unwrap();
    assert!(matches!(
        store.deliver(second),
        Delivery::Pending {
            reference: 212,
            received: 1,
            total: Some(2)
        }
    ));

    let first = pdu::decode(CAPTURED_PART_1, &mut store).unwrap();
    match store.deliver(first) {
        Delivery::Ready(sms) => {
            assert_eq!(sms.content, format!("{}{}", CAPTURED_TEXT_1, CAPTURED_TEXT_2));
            assert_eq!(sms.sender, "861068316262756466");
        }
        other => panic!("expected complete message, got {:?}", other),
    }
    assert!(store.is_empty());
}

#[test]
fn test_sixteen_bit_reference_pair() {
    let mut store = SegmentStore::new();

    let first = pdu::decode(PAIR_FIRST, &mut store).unwrap();
    assert_eq!(first.reference, 0xABCD);
    assert_eq!(first.content, "Hello ");

    let second = pdu::decode(PAIR_SECOND, &mut store).unwrap();
    assert_eq!(second.content, "world");
    assert!(store.is_complete(0xABCD));

    match store.deliver(second) {
        Delivery::Ready(sms) => assert_eq!(sms.content, "Hello world"),
        other => panic!("expected complete message, got {:?}", other),
    }
}

#[test]
fn test_redelivered_segment_does_not_complete_group() {
    let mut store = SegmentStore::new();
    pdu::decode(PAIR_FIRST, &mut store).unwrap();
    let again = pdu::decode(PAIR_FIRST, &mut store).unwrap();

    assert_eq!(store.received(0xABCD), Some((1, 2)));
    assert!(matches!(store.deliver(again), Delivery::Pending { .. }));
}

#[test]
fn test_segment_count_conflict_is_a_decode_error() {
    let mut store = SegmentStore::new();
    pdu::decode(PAIR_FIRST, &mut store).unwrap();

    // Same reference, now claiming three segments
    let conflicting = PAIR_SECOND.replacen("ABCD0202", "ABCD0302", 1);
    let err = pdu::decode(&conflicting, &mut store).unwrap_err();
    assert_eq!(err.pdu, conflicting);
    assert!(err.reason.contains("segment mismatch"));
}
