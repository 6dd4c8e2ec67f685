use netsonde_domain::{Event, EventKind, TraceLog};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_events_are_ordered_and_snapshots_do_not_clear() {
    let log = TraceLog::new();
    let start = log.elapsed();
    log.push(Event::new(EventKind::ResolveStart, start));
    let done = log.elapsed();
    let mut event = Event::new(EventKind::ResolveDone, done);
    event.duration = Some(done - start);
    log.push(event);

    let first = log.read_all();
    let second = log.read_all();
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    assert_eq!(first[0].kind, EventKind::ResolveStart);
    assert_eq!(first[1].kind, EventKind::ResolveDone);
    assert!(first[1].time >= first[0].time);
    assert_eq!(first[1].duration, Some(first[1].time - first[0].time));
}

#[test]
fn test_scoped_log_merges_in_order() {
    let parent = TraceLog::new();
    parent.push(Event::new(EventKind::HttpRoundTripStart, parent.elapsed()));

    let child = parent.scoped();
    child.push(Event::new(EventKind::Connect, child.elapsed()));
    child.push(Event::new(EventKind::Read, child.elapsed()));
    parent.append_all(child.drain());
    assert!(child.is_empty());

    let events = parent.read_all();
    let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![EventKind::HttpRoundTripStart, EventKind::Connect, EventKind::Read]
    );
    // Child timestamps are on the parent clock.
    assert!(events[1].time >= events[0].time);
}

#[test]
fn test_concurrent_writers() {
    let log = Arc::new(TraceLog::new());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let log = Arc::clone(&log);
        handles.push(std::thread::spawn(move || {
            for _ in 0..100 {
                log.push(Event::new(EventKind::Write, log.elapsed()));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(log.len(), 800);
}

#[test]
fn test_event_serializes_without_empty_fields() {
    let mut event = Event::new(EventKind::Connect, Duration::from_millis(12));
    event.address = Some("93.184.216.34:443".into());
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["kind"], "connect");
    assert_eq!(json["address"], "93.184.216.34:443");
    assert!(json.get("hostname").is_none());
    assert!(json.get("failure").is_none());
}
