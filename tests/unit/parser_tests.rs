//! Observer contract of the event parser
use mockall::Sequence;
use mockall::predicate::function;

use xvalid::events::{EventRecorder, ParseEvent, ParseObserver};
use xvalid::parser::{ParserConfig, parse_document};

use crate::common::mocks::MockObserver;

fn starts(name: &'static str) -> impl Fn(&ParseEvent) -> bool {
    move |event| matches!(event, ParseEvent::ElementStart { name: n, .. } if n == name)
}

fn ends(name: &'static str) -> impl Fn(&ParseEvent) -> bool {
    move |event| matches!(event, ParseEvent::ElementEnd { name: n, .. } if n == name)
}

#[test]
fn test_events_arrive_in_document_order() {
    let mut seq = Sequence::new();
    let mut observer = MockObserver::new();

    observer
        .expect_on_event()
        .with(function(|e: &ParseEvent| *e == ParseEvent::DocumentStart))
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    observer
        .expect_on_event()
        .with(function(starts("r")))
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    observer
        .expect_on_event()
        .with(function(starts("a")))
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    observer
        .expect_on_event()
        .with(function(ends("a")))
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    observer
        .expect_on_event()
        .with(function(|e: &ParseEvent| {
            matches!(e, ParseEvent::CharacterData { text, .. } if text == "hi")
        }))
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    observer
        .expect_on_event()
        .with(function(ends("r")))
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    observer
        .expect_on_event()
        .with(function(|e: &ParseEvent| *e == ParseEvent::DocumentEnd))
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());

    let outcome = parse_document(b"<r><a/>hi</r>", ParserConfig::default(), &mut [
        &mut observer,
    ]);

    assert!(outcome.well_formed);
    assert_eq!(outcome.events_emitted, 7);
}

#[test]
fn test_nothing_follows_a_fatal_error() {
    let mut seq = Sequence::new();
    let mut observer = MockObserver::new();

    observer
        .expect_on_event()
        .with(function(|e: &ParseEvent| !e.is_fatal()))
        .times(3)
        .in_sequence(&mut seq)
        .return_const(());
    observer
        .expect_on_event()
        .with(function(ParseEvent::is_fatal))
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());

    let outcome = parse_document(b"<a><b></a><c/>", ParserConfig::default(), &mut [
        &mut observer,
    ]);

    assert!(!outcome.well_formed);
    assert_eq!(outcome.events_emitted, 4);
}

#[test]
fn test_every_observer_sees_each_event_before_the_next() {
    let mut log: Vec<String> = Vec::new();
    let shared = std::cell::RefCell::new(&mut log);

    let mut first = |event: &ParseEvent| {
        if let ParseEvent::ElementStart { name, .. } = event {
            shared.borrow_mut().push(format!("first:{}", name));
        }
    };
    let mut second = |event: &ParseEvent| {
        if let ParseEvent::ElementStart { name, .. } = event {
            shared.borrow_mut().push(format!("second:{}", name));
        }
    };

    parse_document(b"<a><b/></a>", ParserConfig::default(), &mut [
        &mut first as &mut dyn ParseObserver,
        &mut second,
    ]);

    drop(shared);
    assert_eq!(log, vec!["first:a", "second:a", "first:b", "second:b"]);
}

#[test]
fn test_locations_point_at_tag_starts() {
    let mut recorder = EventRecorder::new();
    parse_document(
        b"<root>\n  <child/>\n</root>",
        ParserConfig::default(),
        &mut [&mut recorder],
    );

    let child = recorder
        .events()
        .iter()
        .find(|e| starts("child")(*e))
        .and_then(ParseEvent::location)
        .unwrap();
    assert_eq!((child.line, child.column), (2, 3));
}

#[test]
fn test_whitespace_after_root_is_ignored() {
    let mut recorder = EventRecorder::new();
    let outcome = parse_document(b"<a/>\n\n", ParserConfig::default(), &mut [&mut recorder]);

    assert!(outcome.well_formed);
    assert!(
        !recorder
            .events()
            .iter()
            .any(|e| matches!(e, ParseEvent::CharacterData { .. }))
    );
}
