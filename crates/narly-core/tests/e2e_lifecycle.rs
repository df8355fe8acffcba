//! End-to-end lifecycle scenarios: lazy Property seeding, demand-driven
//! teardown of derived chains, and the structured log events emitted on the
//! way.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use narly_core::{Event, Handler, Listener, NodeId, Observable, Outlet, SideEffect, Variant};
use tracing::Subscriber;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

// ── Property initializer ────────────────────────────────────────────────

#[test]
fn property_initializer_runs_once_for_two_subscribers() {
    let runs = Rc::new(Cell::new(0));
    let r = Rc::clone(&runs);
    let p: Observable<i32, String> = Observable::property_with(move || {
        r.set(r.get() + 1);
        Ok(42)
    });

    let first = Rc::new(RefCell::new(Vec::new()));
    let f = Rc::clone(&first);
    p.on_value(&Listener::new(move |v: &i32| f.borrow_mut().push(*v)));
    assert_eq!(runs.get(), 1);
    assert_eq!(*first.borrow(), vec![42]);

    let second = Rc::new(RefCell::new(Vec::new()));
    let s = Rc::clone(&second);
    p.on_value(&Listener::new(move |v: &i32| s.borrow_mut().push(*v)));
    assert_eq!(runs.get(), 1);
    assert_eq!(*second.borrow(), vec![42]);
    assert_eq!(*first.borrow(), vec![42]);
}

#[test]
fn initializer_is_skipped_when_value_arrives_first() {
    let runs = Rc::new(Cell::new(0));
    let r = Rc::clone(&runs);
    let p: Observable<i32, String> = Observable::property_with(move || {
        r.set(r.get() + 1);
        Ok(0)
    });
    p.emit_value(7);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = Rc::clone(&seen);
    let _sub = p.subscribe(SideEffect::OnValue(Listener::new(move |v: &i32| {
        s.borrow_mut().push(*v)
    })));
    assert_eq!(runs.get(), 0);
    assert_eq!(*seen.borrow(), vec![7]);
}

// ── Demand-driven teardown ──────────────────────────────────────────────

#[test]
fn dropping_last_subscription_releases_chain() {
    let root: Observable<i32, String> = Observable::stream();
    let mid = root.map(|v| v * 2);
    let leaf = mid.filter(|v| *v > 0);

    let a = leaf.observe(|_| {});
    let b = leaf.observe(|_| {});
    assert!(root.is_active());
    drop(a);
    assert!(root.is_active());
    drop(b);
    assert!(!leaf.is_active());
    assert!(!mid.is_active());
    assert!(!root.is_active());
}

#[test]
fn derived_node_survives_dropped_handle_while_active() {
    let root: Observable<i32, String> = Observable::stream();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = Rc::clone(&seen);
    {
        let derived = root.map(|v| v + 100);
        derived.on_value(&Listener::new(move |v: &i32| s.borrow_mut().push(*v)));
    }
    root.emit_value(1);
    assert_eq!(*seen.borrow(), vec![101]);
}

#[test]
fn sibling_branches_notified_in_registration_order() {
    let root: Observable<i32, String> = Observable::stream();
    let order = Rc::new(RefCell::new(Vec::new()));
    let o1 = Rc::clone(&order);
    let o2 = Rc::clone(&order);
    let o3 = Rc::clone(&order);
    root.map(|v| *v)
        .on_value(&Listener::new(move |_: &i32| o1.borrow_mut().push("left")));
    root.on_value(&Listener::new(move |_: &i32| o2.borrow_mut().push("direct")));
    root.filter(|_| true)
        .on_value(&Listener::new(move |_: &i32| o3.borrow_mut().push("right")));
    root.emit_value(1);
    assert_eq!(*order.borrow(), vec!["left", "direct", "right"]);
}

// ── Custom handlers ─────────────────────────────────────────────────────

/// Turns each ERROR into a VALUE of -1 and swallows END.
struct Recover;

impl Handler<i32, i32, String> for Recover {
    fn value(&mut self, value: &i32, out: &Outlet<'_, i32, String>) {
        out.value(*value);
    }

    fn error(&mut self, _error: &String, out: &Outlet<'_, i32, String>) {
        out.value(-1);
    }

    fn end(&mut self, _out: &Outlet<'_, i32, String>) {}
}

#[test]
fn custom_handler_overrides_error_and_end() {
    let root: Observable<i32, String> = Observable::stream();
    let recovered = root.extend(Recover);
    let log = Rc::new(RefCell::new(Vec::new()));
    let l = Rc::clone(&log);
    recovered.on_any(&Listener::new(move |e: &Event<i32, String>| {
        l.borrow_mut().push(e.clone())
    }));
    root.emit_value(3);
    root.emit_error("bad".into());
    root.end();
    assert_eq!(*log.borrow(), vec![Event::Value(3), Event::Value(-1)]);
    assert!(!recovered.is_ended());
    assert!(root.is_ended());
}

#[test]
fn merge_like_node_ends_after_all_producers() {
    struct EndAfterAll {
        open: usize,
    }
    impl Handler<i32, i32, String> for EndAfterAll {
        fn value(&mut self, value: &i32, out: &Outlet<'_, i32, String>) {
            out.value(*value);
        }
        fn end(&mut self, out: &Outlet<'_, i32, String>) {
            self.open -= 1;
            if self.open == 0 {
                out.end();
            }
        }
    }

    let a: Observable<i32, String> = Observable::stream();
    let b: Observable<i32, String> = Observable::stream();
    let merged = Observable::from_producers(
        Variant::Stream,
        "merge",
        &[a.clone(), b.clone()],
        EndAfterAll { open: 2 },
    );
    let log = Rc::new(RefCell::new(Vec::new()));
    let l = Rc::clone(&log);
    merged.on_any(&Listener::new(move |e: &Event<i32, String>| {
        l.borrow_mut().push(e.clone())
    }));
    a.emit_value(1);
    b.emit_value(2);
    a.end();
    assert!(!merged.is_ended());
    b.emit_value(3);
    b.end();
    assert_eq!(
        *log.borrow(),
        vec![Event::Value(1), Event::Value(2), Event::Value(3), Event::End]
    );
}

// ── Re-entrant emission ─────────────────────────────────────────────────

#[test]
fn side_effect_feeding_back_into_source_through_map() {
    let source: Observable<i32, String> = Observable::stream();
    let plus_one = source.map(|v| v + 1);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let (log, feedback) = (Rc::clone(&seen), source.clone());
    plus_one.on_value(&Listener::new(move |v: &i32| {
        log.borrow_mut().push(*v);
        if *v < 3 {
            feedback.emit_value(*v);
        }
    }));

    source.emit_value(0);
    assert_eq!(*seen.borrow(), vec![1, 2, 3]);

    // The loop settled; later emissions run through the same handler.
    source.emit_value(10);
    assert_eq!(*seen.borrow(), vec![1, 2, 3, 11]);
}

#[test]
fn sibling_producer_emitting_during_delivery_is_handled_after_it() {
    struct Origins(Rc<RefCell<Vec<NodeId>>>);
    impl Handler<i32, i32, String> for Origins {
        fn value(&mut self, value: &i32, out: &Outlet<'_, i32, String>) {
            self.0.borrow_mut().push(out.provenance());
            out.value(*value);
        }
    }

    let a: Observable<i32, String> = Observable::stream();
    let b: Observable<i32, String> = Observable::stream();
    let origins = Rc::new(RefCell::new(Vec::new()));
    let both = Observable::from_producers(
        Variant::Stream,
        "both",
        &[a.clone(), b.clone()],
        Origins(Rc::clone(&origins)),
    );
    let seen = Rc::new(RefCell::new(Vec::new()));
    let (log, echo) = (Rc::clone(&seen), b.clone());
    both.on_value(&Listener::new(move |v: &i32| {
        log.borrow_mut().push(*v);
        if *v < 10 {
            echo.emit_value(v * 10);
        }
    }));

    a.emit_value(1);
    assert_eq!(*seen.borrow(), vec![1, 10]);
    assert_eq!(*origins.borrow(), vec![a.id(), b.id()]);
}

#[test]
fn events_queued_behind_end_are_dropped() {
    let source: Observable<i32, String> = Observable::stream();
    let first_two = source.take(2);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let (log, feedback) = (Rc::clone(&seen), source.clone());
    first_two.on_value(&Listener::new(move |v: &i32| {
        log.borrow_mut().push(*v);
        feedback.emit_value(v + 1);
        feedback.emit_value(v + 100);
    }));

    source.emit_value(0);
    assert_eq!(*seen.borrow(), vec![0, 1]);
    assert!(first_two.is_ended());
    assert!(!source.is_active());
}

// ── Structured logging ──────────────────────────────────────────────────

#[derive(Default)]
struct TraceState {
    messages: Vec<String>,
}

struct TraceCapture {
    state: Arc<Mutex<TraceState>>,
}

impl<S> Layer<S> for TraceCapture
where
    S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        struct Msg {
            message: Option<String>,
        }
        impl tracing::field::Visit for Msg {
            fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                if field.name() == "message" {
                    self.message = Some(value.to_string());
                }
            }

            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.message = Some(format!("{value:?}").trim_matches('"').to_string());
                }
            }
        }
        let mut msg = Msg { message: None };
        event.record(&mut msg);
        if let Some(message) = msg.message {
            self.state
                .lock()
                .expect("trace lock")
                .messages
                .push(message);
        }
    }
}

#[test]
fn lifecycle_transitions_are_traced() {
    let state = Arc::new(Mutex::new(TraceState::default()));
    let subscriber = tracing_subscriber::registry().with(TraceCapture {
        state: Arc::clone(&state),
    });
    let _guard = tracing::subscriber::set_default(subscriber);

    let p: Observable<i32, String> = Observable::property();
    p.emit_value(1);
    let l = Listener::new(|_: &i32| {});
    p.on_value(&l);
    p.off_value(&l);
    p.off_value(&l);
    p.on_value(&l);
    p.end();

    let messages = state.lock().expect("trace lock").messages.clone();
    for expected in [
        "node.replay",
        "node.activate",
        "node.deactivate",
        "node.off_unknown",
        "node.end",
    ] {
        assert!(
            messages.iter().any(|m| m == expected),
            "missing {expected} in {messages:?}"
        );
    }
}
