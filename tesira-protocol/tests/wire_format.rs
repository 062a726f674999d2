//! End-to-end checks of the wire grammar: what we send, and how the
//! device's answers to it are understood.

use proptest::prelude::*;
use tesira_protocol::attribute;
use tesira_protocol::command::{self, CommandTarget, Verb};
use tesira_protocol::{InboundLine, LineClassifier, LineFramer, SubscriptionToken};

fn tag_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9]{0,15}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// A push carrying a derived token classifies back to that exact token.
    #[test]
    fn prop_push_routes_to_derived_token(
        tag in tag_strategy(),
        index in 1u32..64,
        value in -100.0f64..12.0,
    ) {
        let token = SubscriptionToken::new(&tag, attribute::LEVEL, index);
        let line = format!("! \"publishToken\":\"{}\" \"value\":{:.6}", token, value);

        match LineClassifier::default().classify(&line, None).unwrap() {
            InboundLine::Push(push) => {
                prop_assert_eq!(push.token, token.as_str());
                let parsed: f64 = push.value.parse().unwrap();
                prop_assert!((parsed - value).abs() < 1e-5);
            }
            other => prop_assert!(false, "unexpected classification {:?}", other),
        }
    }

    /// The subscribe line always carries the token as a standalone word.
    #[test]
    fn prop_subscribe_line_contains_token(tag in tag_strategy(), index in 1u32..64) {
        let token = SubscriptionToken::new(&tag, attribute::MUTE, index);
        let target = CommandTarget::new(&tag, index);
        let line = command::build_subscribe(attribute::MUTE, &target, &token, None);
        let words: Vec<&str> = line.split_whitespace().collect();
        prop_assert_eq!(words.last().copied(), Some(token.as_str()));
        prop_assert_eq!(words[1], "subscribe");
    }

    /// Framing is independent of how the byte stream is chunked.
    #[test]
    fn prop_framing_ignores_chunk_boundaries(split in 0usize..40) {
        let stream = b"+OK\r\n! \"T__level1\" -3.000000\r\n-ERR ALREADY_SUBSCRIBED\r";
        let split = split.min(stream.len());

        let mut whole = LineFramer::new();
        let expected = whole.push(stream);

        let mut chunked = LineFramer::new();
        let mut lines = chunked.push(&stream[..split]);
        lines.extend(chunked.push(&stream[split..]));

        prop_assert_eq!(lines, expected);
    }
}

#[test]
fn test_session_transcript() {
    let transcript = concat!(
        "Welcome to the Tesira Text Protocol Server...\r\n",
        "+OK \"value\":-100.000000\r\n",
        "! \"publishToken\":\"Level1__mute1\" \"value\":false\r\n",
        "-ERR ALREADY_SUBSCRIBED\r\n",
        "-ERR address not found: {\"deviceId\":0 \"classCode\":0 \"instanceNum\":0}\r\n",
    );

    let mut framer = LineFramer::new();
    let classifier = LineClassifier::default();
    let lines = framer.push(transcript.as_bytes());
    let kinds: Vec<_> = lines
        .iter()
        .map(|line| classifier.classify(line, None).unwrap())
        .collect();

    assert_eq!(kinds[0], InboundLine::SessionBanner);
    assert!(matches!(kinds[1], InboundLine::Ack(_)));
    assert!(matches!(kinds[2], InboundLine::Push(_)));
    assert_eq!(kinds[3], InboundLine::AlreadySubscribed);
    assert!(matches!(kinds[4], InboundLine::Error(_)));
}

#[test]
fn test_fader_command_set() {
    let target = CommandTarget::new("Level1", 2);
    let get_min = command::build(Verb::Get, attribute::MIN_LEVEL, &target, None);
    let get_max = command::build(Verb::Get, attribute::MAX_LEVEL, &target, None);
    let mute = command::build(Verb::Set, attribute::MUTE, &target, Some("true"));

    assert_eq!(get_min, "\"Level1\" get minLevel 2");
    assert_eq!(get_max, "\"Level1\" get maxLevel 2");
    assert_eq!(mute, "\"Level1\" set mute 2 true");
}
