//! End-to-end source scenarios on the lab clock.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use narly_core::{Event, Listener, Observable};
use narly_sources::{
    Emitter, EventHub, Scheduler, SchedulerConfig, SourceError, from_events, from_node_callback,
    interval, later, sequentially, timed,
};
use proptest::prelude::*;
use web_time::Duration;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

// ── Timed source + take ─────────────────────────────────────────────────

#[test]
fn timed_take_three_stops_timer_after_third_value() {
    let sched = Scheduler::lab();
    let source: Observable<i32, String> = timed(&sched, ms(10), |node| node.emit_value(1)).unwrap();
    let derived = source.take(3);

    let values = Rc::new(RefCell::new(Vec::new()));
    let v = Rc::clone(&values);
    derived.on_value(&Listener::new(move |x: &i32| v.borrow_mut().push(*x)));

    let timers_at_end = Rc::new(Cell::new(None));
    let t = Rc::clone(&timers_at_end);
    let clock = sched.clone();
    derived.on_end(&Listener::unit(move || t.set(Some(clock.active_timers()))));

    assert_eq!(sched.active_timers(), 1);
    sched.advance(ms(100)).unwrap();

    assert_eq!(*values.borrow(), vec![1, 1, 1]);
    assert_eq!(timers_at_end.get(), Some(0));
    assert_eq!(sched.fires(), 3);
    assert_eq!(sched.timers_started(), 1);
    assert_eq!(sched.timers_stopped(), 1);
    assert!(!source.is_active());
    assert!(!source.is_ended());
}

#[test]
fn timed_source_restarts_after_full_release() {
    let sched = Scheduler::lab();
    let source: Observable<i32, String> = interval(&sched, ms(5), 7).unwrap();
    let l = Listener::new(|_: &i32| {});

    source.on_value(&l);
    assert_eq!(sched.active_timers(), 1);
    source.off_value(&l);
    assert_eq!(sched.active_timers(), 0);
    sched.advance(ms(20)).unwrap();
    assert_eq!(sched.fires(), 0);

    source.on_value(&l);
    assert_eq!(sched.active_timers(), 1);
    assert_eq!(sched.timers_started(), 2);
    // The fresh timer counts from reactivation time.
    assert_eq!(sched.next_due(), Some(ms(25)));
}

#[test]
fn later_deactivated_early_never_fires() {
    let sched = Scheduler::lab();
    let l8r: Observable<&str, String> = later(&sched, ms(50), "done").unwrap();
    let sub = l8r.observe(|_| panic!("should not fire"));
    sched.advance(ms(20)).unwrap();
    drop(sub);
    sched.advance(ms(100)).unwrap();
    assert_eq!(sched.active_timers(), 0);
    assert!(!l8r.is_ended());
}

#[test]
fn sequentially_resumes_where_it_left_off() {
    let sched = Scheduler::lab();
    let seq: Observable<i32, String> = sequentially(&sched, ms(10), [1, 2, 3, 4]).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = Rc::clone(&seen);
    let l = Listener::new(move |v: &i32| s.borrow_mut().push(*v));

    seq.on_value(&l);
    sched.advance(ms(20)).unwrap();
    seq.off_value(&l);
    seq.on_value(&l);
    sched.advance(ms(20)).unwrap();
    assert_eq!(*seen.borrow(), vec![1, 2, 3, 4]);
    assert!(seq.is_ended());
}

#[test]
fn scan_state_survives_resubscription() {
    let sched = Scheduler::lab();
    let counter = Rc::new(Cell::new(0));
    let c = Rc::clone(&counter);
    let ticks: Observable<i32, String> = timed(&sched, ms(10), move |node| {
        c.set(c.get() + 1);
        node.emit_value(c.get());
    })
    .unwrap();
    let total = ticks.scan(0, |acc, v| acc + v);
    let first = total.observe(|_| {});
    sched.advance(ms(30)).unwrap();
    drop(first);
    assert_eq!(sched.active_timers(), 0);

    let latest = Rc::new(Cell::new(0));
    let l = Rc::clone(&latest);
    let _sub = total.observe(move |e| {
        if let Event::Value(v) = e {
            l.set(*v);
        }
    });
    sched.advance(ms(10)).unwrap();
    assert_eq!(latest.get(), 1 + 2 + 3 + 4);
}

#[test]
fn runaway_scheduler_reports_error() {
    let sched = Scheduler::lab_with_config(SchedulerConfig::default().max_fires_per_advance(10));
    let source: Observable<i32, String> = interval(&sched, ms(1), 0).unwrap();
    let _sub = source.observe(|_| {});
    let err = sched.advance(ms(1_000)).unwrap_err();
    assert!(matches!(err, SourceError::RunawayTimers { limit: 10, .. }));
}

// ── Events ──────────────────────────────────────────────────────────────

#[test]
fn from_events_attaches_one_translator_while_active() {
    let hub: Rc<EventHub<String>> = Rc::new(EventHub::new());
    let words: Observable<String, ()> = from_events(&hub, "word");
    let upper = words.map(|w| w.to_uppercase());

    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = Rc::clone(&seen);
    let a = upper.observe(move |e| {
        if let Event::Value(w) = e {
            s.borrow_mut().push(w.clone());
        }
    });
    let b = words.observe(|_| {});
    assert_eq!(hub.listener_count("word"), 1);

    hub.emit("word", &"hi".to_string());
    drop(a);
    assert_eq!(hub.listener_count("word"), 1);
    drop(b);
    assert_eq!(hub.listener_count("word"), 0);
    hub.emit("word", &"lost".to_string());
    assert_eq!(*seen.borrow(), vec!["HI".to_string()]);
}

#[test]
fn deactivating_before_any_event_leaves_no_listener() {
    let hub: Rc<EventHub<u8>> = Rc::new(EventHub::new());
    let s: Observable<u8, ()> = from_events(&hub, "x");
    drop(s.observe(|_| {}));
    assert_eq!(hub.listener_count("x"), 0);
}

/// An emitter that records the calls it receives.
#[derive(Default)]
struct Recording {
    calls: RefCell<Vec<&'static str>>,
}

impl Emitter<i32> for Recording {
    fn add_listener(&self, _name: &str, _listener: Listener<i32>) {
        self.calls.borrow_mut().push("add");
    }

    fn remove_listener(&self, _name: &str, _listener: &Listener<i32>) {
        self.calls.borrow_mut().push("remove");
    }
}

#[test]
fn custom_emitter_sees_balanced_calls() {
    let emitter = Rc::new(Recording::default());
    let s: Observable<i32, ()> = from_events(&emitter, "e");
    for _ in 0..3 {
        let a = s.observe(|_| {});
        let b = s.observe(|_| {});
        drop(a);
        drop(b);
    }
    assert_eq!(
        *emitter.calls.borrow(),
        vec!["add", "remove", "add", "remove", "add", "remove"]
    );
}

// ── Callbacks ───────────────────────────────────────────────────────────

#[test]
fn node_callback_error_then_end() {
    let node = from_node_callback::<i32, String>(|done| done(Err("io".to_string())));
    let log = Rc::new(RefCell::new(Vec::new()));
    let l = Rc::clone(&log);
    node.on_any(&Listener::new(move |e: &Event<i32, String>| {
        l.borrow_mut().push(e.clone())
    }));
    assert_eq!(*log.borrow(), vec![Event::Error("io".to_string()), Event::End]);
}

// ── Resource release ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn timer_count_tracks_activity(ops in proptest::collection::vec(any::<bool>(), 1..50)) {
        let sched = Scheduler::lab();
        let source: Observable<i32, String> = interval(&sched, ms(3), 1).unwrap();
        let chain = source.map(|v| v * 2).skip(1);

        let mut live = Vec::new();
        let mut rises = 0u64;
        for subscribe in ops {
            if subscribe {
                if live.is_empty() {
                    rises += 1;
                }
                live.push(chain.observe(|_| {}));
            } else {
                live.pop();
            }
            prop_assert_eq!(sched.active_timers(), usize::from(!live.is_empty()));
            sched.advance(ms(1)).unwrap();
        }
        prop_assert_eq!(sched.timers_started(), rises);
        live.clear();
        prop_assert_eq!(sched.active_timers(), 0);
        prop_assert_eq!(sched.timers_started(), sched.timers_stopped());
    }
}
