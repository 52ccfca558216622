//! Behavioural tests for the event bus: isolation, subscription semantics,
//! circuit breaking, history bounds, wildcard delivery and metrics.

use noteflow_core::config::CircuitBreakerSettings;
use noteflow_core::event_bus::{
    AppEvent, CircuitState, EventBus, EventName, FolderDeleted, LabelCreated, LinkCreated,
    Listener, ListenerError, ListenerErrorEvent, NoteCreated, PhotoUploaded, SearchPerformed,
    WildcardListener,
};
use noteflow_core::EventBusConfig;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::io;
use std::sync::Arc;
use std::time::Duration;

fn note_created(id: &str) -> NoteCreated {
    NoteCreated {
        note_id: id.to_string(),
        folder_id: None,
        title: "Hello".to_string(),
        timestamp: 1000,
    }
}

fn folder_deleted(id: &str) -> FolderDeleted {
    FolderDeleted {
        folder_id: id.to_string(),
        timestamp: 1000,
    }
}

fn bus_with_breaker(max_failures: u32, reset_timeout_ms: u64) -> EventBus {
    EventBus::with_config(EventBusConfig {
        circuit_breaker: CircuitBreakerSettings {
            max_failures,
            reset_timeout_ms,
        },
        ..Default::default()
    })
}

/// Log sink for asserting on warnings
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn error_events(bus: &EventBus) -> Arc<Mutex<Vec<ListenerErrorEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let listener = Listener::<ListenerErrorEvent>::new(move |e| {
        sink.lock().push(e.clone());
        Ok(())
    });
    bus.on(&listener);
    seen
}

#[test]
fn failing_listener_does_not_block_others() {
    let bus = EventBus::new();
    let counts: Vec<Arc<AtomicUsize>> = (0..4).map(|_| Arc::new(AtomicUsize::new(0))).collect();

    for (i, count) in counts.iter().enumerate() {
        let count = count.clone();
        bus.on(&Listener::<NoteCreated>::new(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
            if i == 1 {
                Err(ListenerError::msg("listener 1 always fails"))
            } else {
                Ok(())
            }
        }));
    }

    bus.emit(note_created("n1"));
    for count in &counts {
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn registering_twice_delivers_once() {
    let bus = EventBus::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_inner = calls.clone();
    let listener = Listener::<NoteCreated>::new(move |_| {
        calls_inner.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    bus.on(&listener);
    bus.on(&listener.clone());
    bus.emit(note_created("n1"));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(bus.listener_count(EventName::NoteCreated), 1);
}

#[test]
fn unsubscribe_stops_delivery_and_is_idempotent() {
    let bus = EventBus::new();
    let removed_calls = Arc::new(AtomicUsize::new(0));
    let other_calls = Arc::new(AtomicUsize::new(0));

    let removed_inner = removed_calls.clone();
    let subscription = bus.on(&Listener::<NoteCreated>::new(move |_| {
        removed_inner.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));
    let other_inner = other_calls.clone();
    bus.on(&Listener::<NoteCreated>::new(move |_| {
        other_inner.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));

    subscription.unsubscribe();
    bus.emit(note_created("n1"));
    subscription.unsubscribe();
    bus.emit(note_created("n2"));

    assert_eq!(removed_calls.load(Ordering::SeqCst), 0);
    assert_eq!(other_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn removing_a_later_listener_mid_dispatch_takes_effect_next_emit() {
    let bus = EventBus::new();
    let removed_calls = Arc::new(AtomicUsize::new(0));
    let removed_inner = removed_calls.clone();
    let removed = Listener::<NoteCreated>::new(move |_| {
        removed_inner.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let remover_bus = bus.clone();
    let target = removed.clone();
    let remover = Listener::<NoteCreated>::new(move |_| {
        remover_bus.off(&target);
        Ok(())
    });
    bus.on(&remover);
    bus.on(&removed);

    // The pass already under way keeps the listener set it started with
    bus.emit(note_created("n1"));
    assert_eq!(removed_calls.load(Ordering::SeqCst), 1);
    assert!(!bus.is_subscribed(&removed));
    assert_eq!(bus.listener_count(EventName::NoteCreated), 1);

    bus.emit(note_created("n2"));
    assert_eq!(removed_calls.load(Ordering::SeqCst), 1);
    assert_eq!(bus.metrics().total_errors, 0);
}

#[test]
fn exceeding_listener_limit_warns_once_and_keeps_registering() {
    let mut config = EventBusConfig::default();
    config.memory.max_listeners_per_event = 2;
    let bus = EventBus::with_config(config);
    let calls = Arc::new(AtomicUsize::new(0));
    let add_listener = || {
        let calls = calls.clone();
        bus.on(&Listener::<NoteCreated>::new(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
    };

    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        add_listener();
        add_listener();
        assert!(!logs.contents().contains("possible subscription leak"));
        add_listener();
        add_listener();
    });

    let output = logs.contents();
    assert_eq!(output.matches("possible subscription leak").count(), 1);
    assert!(output.contains("note:created has 3 listeners (limit 2)"));

    bus.emit(note_created("n1"));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[test]
fn untracked_emit_time_keeps_slow_events_at_zero() {
    let mut config = EventBusConfig::default();
    config.performance.track_emit_time = false;
    config.performance.slow_threshold_ms = 1;
    let bus = EventBus::with_config(config);
    bus.on(&Listener::<FolderDeleted>::new(|_| {
        std::thread::sleep(Duration::from_millis(10));
        Ok(())
    }));

    for i in 0..3 {
        bus.emit(folder_deleted(&format!("f{}", i)));
    }
    assert_eq!(bus.metrics().slow_events, 0);
}

#[test]
fn global_bus_macros_publish_and_subscribe() {
    noteflow_core::reset_event_bus();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_inner = calls.clone();
    let listener = Listener::<NoteCreated>::new(move |_| {
        calls_inner.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let subscription = noteflow_core::on_event!(&listener);
    noteflow_core::emit!(note_created("n1"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(noteflow_core::event_bus().is_subscribed(&listener));

    subscription.unsubscribe();
    noteflow_core::emit!(note_created("n2"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    noteflow_core::reset_event_bus();
}

#[test]
fn breaker_opens_after_max_failures() {
    let bus = bus_with_breaker(5, 60_000);
    let errors = error_events(&bus);
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_inner = calls.clone();
    let listener = Listener::<FolderDeleted>::new(move |_| {
        calls_inner.fetch_add(1, Ordering::SeqCst);
        Err(ListenerError::msg("cannot clean up"))
    });
    bus.on(&listener);

    for i in 0..5 {
        bus.emit(folder_deleted(&format!("f{}", i)));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert!(!bus.is_subscribed(&listener));

    bus.emit(folder_deleted("f5"));
    assert_eq!(calls.load(Ordering::SeqCst), 5);

    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].event, EventName::FolderDeleted);
    assert_eq!(errors[0].error, "cannot clean up");

    let state = bus.breaker_state(&listener).expect("breaker tracked");
    assert_eq!(state.circuit_state(), CircuitState::Open);
    assert!(state.failures >= 5);
    assert_eq!(bus.metrics().total_errors, 5);
}

#[test]
fn success_resets_consecutive_failures() {
    let bus = bus_with_breaker(3, 60_000);
    let fail = Arc::new(AtomicBool::new(true));
    let fail_inner = fail.clone();
    let listener = Listener::<FolderDeleted>::new(move |_| {
        if fail_inner.load(Ordering::SeqCst) {
            Err(ListenerError::msg("flaky"))
        } else {
            Ok(())
        }
    });
    bus.on(&listener);

    bus.emit(folder_deleted("a"));
    bus.emit(folder_deleted("b"));
    fail.store(false, Ordering::SeqCst);
    bus.emit(folder_deleted("c"));
    fail.store(true, Ordering::SeqCst);
    bus.emit(folder_deleted("d"));
    bus.emit(folder_deleted("e"));

    assert!(bus.is_subscribed(&listener));
    assert_eq!(bus.breaker_state(&listener).map(|s| s.failures), Some(2));
}

#[test]
fn breaker_resets_after_timeout_on_reregistration() {
    let bus = bus_with_breaker(2, 50);
    let fail = Arc::new(AtomicBool::new(true));
    let calls = Arc::new(AtomicUsize::new(0));
    let (fail_inner, calls_inner) = (fail.clone(), calls.clone());
    let listener = Listener::<FolderDeleted>::new(move |_| {
        calls_inner.fetch_add(1, Ordering::SeqCst);
        if fail_inner.load(Ordering::SeqCst) {
            Err(ListenerError::msg("down"))
        } else {
            Ok(())
        }
    });

    bus.on(&listener);
    bus.emit(folder_deleted("a"));
    bus.emit(folder_deleted("b"));
    assert!(!bus.is_subscribed(&listener));
    fail.store(false, Ordering::SeqCst);

    // Re-registered before the timeout: the open breaker still skips it
    bus.on(&listener);
    bus.emit(folder_deleted("c"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    std::thread::sleep(Duration::from_millis(80));
    bus.emit(folder_deleted("d"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let state = bus.breaker_state(&listener).expect("breaker tracked");
    assert_eq!(state.circuit_state(), CircuitState::Closed);
    assert_eq!(state.failures, 0);
}

#[test]
fn listener_error_listeners_do_not_recurse() {
    let bus = bus_with_breaker(1, 60_000);
    let error_calls = Arc::new(AtomicUsize::new(0));
    let error_inner = error_calls.clone();
    bus.on(&Listener::<ListenerErrorEvent>::new(move |_| {
        error_inner.fetch_add(1, Ordering::SeqCst);
        Err(ListenerError::msg("error reporter is broken too"))
    }));
    bus.on(&Listener::<FolderDeleted>::new(|_| Err(ListenerError::msg("nope"))));

    bus.emit(folder_deleted("a"));

    assert_eq!(error_calls.load(Ordering::SeqCst), 1);
    assert_eq!(bus.listener_count(EventName::FolderDeleted), 0);
    assert_eq!(bus.listener_count(EventName::SystemListenerError), 0);
    assert_eq!(bus.metrics().total_errors, 2);
}

#[test]
fn history_keeps_only_the_most_recent_entries() {
    let mut config = EventBusConfig::default();
    config.history.limit = 3;
    let bus = EventBus::with_config(config);

    bus.emit(note_created("n1"));
    bus.emit(folder_deleted("f1"));
    bus.emit(LinkCreated {
        link_id: "l1".to_string(),
        folder_id: Some("f2".to_string()),
        url: "https://example.com".to_string(),
        timestamp: 1,
    });
    bus.emit(LabelCreated {
        label_id: "lb1".to_string(),
        name: "todo".to_string(),
        color: None,
        timestamp: 2,
    });
    bus.emit(SearchPerformed {
        query: "todo".to_string(),
        result_count: 4,
        timestamp: 3,
    });

    let names: Vec<EventName> = bus.history(None).iter().map(|e| e.name()).collect();
    assert_eq!(
        names,
        vec![
            EventName::LinkCreated,
            EventName::LabelCreated,
            EventName::SearchPerformed
        ]
    );
    assert_eq!(bus.metrics().history_size, 3);

    let last = bus.history(Some(1));
    assert_eq!(last.len(), 1);
    assert_eq!(last[0].name(), EventName::SearchPerformed);

    bus.clear_history();
    assert!(bus.history(None).is_empty());
}

#[test]
fn wildcard_receives_every_event_once() {
    let bus = EventBus::new();
    bus.ready();
    let seen: Arc<Mutex<Vec<(EventName, AppEvent)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.on_any(&WildcardListener::new(move |name, event| {
        sink.lock().push((name, event.clone()));
        Ok(())
    }));

    let events: Vec<AppEvent> = vec![
        note_created("n1").into(),
        folder_deleted("f1").into(),
        PhotoUploaded {
            photo_id: "p1".to_string(),
            folder_id: None,
            file_name: "cat.png".to_string(),
            size_bytes: 2048,
            timestamp: 5,
        }
        .into(),
    ];
    for event in &events {
        bus.emit_event(event.clone());
    }

    let seen = seen.lock();
    assert_eq!(seen.len(), events.len());
    for ((name, received), sent) in seen.iter().zip(&events) {
        assert_eq!(*name, sent.name());
        assert_eq!(received, sent);
    }
}

#[test]
fn total_events_counts_emissions_not_listeners() {
    let bus = EventBus::new();
    bus.ready();
    for _ in 0..3 {
        bus.on(&Listener::<NoteCreated>::new(|_| Ok(())));
    }
    bus.on_any(&WildcardListener::new(|_, _| Ok(())));

    let before = bus.metrics().total_events;
    for i in 0..7 {
        bus.emit(note_created(&format!("n{}", i)));
    }
    let metrics = bus.metrics();
    assert_eq!(metrics.total_events, before + 7);
    assert_eq!(metrics.active_listeners, 3);
    assert_eq!(metrics.wildcard_listeners, 1);
}

#[test]
fn note_created_scenario() {
    let bus = EventBus::new();
    bus.ready();
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    bus.on(&Listener::<NoteCreated>::new(move |e| {
        sink.lock().push(e.clone());
        Ok(())
    }));

    let before = bus.metrics().total_events;
    let payload = NoteCreated {
        note_id: "n1".to_string(),
        folder_id: None,
        title: "Hello".to_string(),
        timestamp: 1000,
    };
    bus.emit(payload.clone());

    assert_eq!(*received.lock(), vec![payload]);
    assert_eq!(bus.metrics().total_events, before + 1);
}

#[test]
fn unknown_dynamic_names_are_inert() {
    let bus = EventBus::new();
    bus.on(&Listener::<NoteCreated>::new(|_| Ok(())));
    assert_eq!(bus.listener_count_by_name("note:created"), 1);
    assert_eq!(bus.listener_count_by_name("note:teleported"), 0);
    assert_eq!(bus.listener_count_by_name("*"), 0);
}

#[tokio::test]
async fn deferred_failures_open_the_breaker() {
    let bus = bus_with_breaker(2, 60_000);
    let errors = error_events(&bus);
    let listener = Listener::<FolderDeleted>::deferred(|e| {
        let id = e.folder_id.clone();
        async move { Err(ListenerError::msg(format!("sync of {} rejected", id))) }
    });
    bus.on(&listener);

    bus.emit(folder_deleted("a"));
    bus.emit(folder_deleted("b"));
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert!(!bus.is_subscribed(&listener));
    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].event, EventName::FolderDeleted);
    assert!(errors[0].error.starts_with("sync of "));
}

#[tokio::test]
async fn deferred_panic_is_contained() {
    let bus = EventBus::new();
    let after = Arc::new(AtomicUsize::new(0));
    bus.on(&Listener::<NoteCreated>::deferred(|e| {
        let id = e.note_id.clone();
        async move {
            if id == "n1" {
                panic!("async listener bug on {}", id);
            }
            Ok(())
        }
    }));
    let after_inner = after.clone();
    bus.on(&Listener::<NoteCreated>::new(move |_| {
        after_inner.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));

    bus.emit(note_created("n1"));
    assert_eq!(after.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(bus.metrics().total_errors, 1);
}
