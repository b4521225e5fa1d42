use parking_lot::Mutex;
use std::sync::Arc;
use synapsed_reactive::*;
use tracing_subscriber::EnvFilter;

fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("synapsed_reactive=debug".parse().unwrap()))
        .with_test_writer()
        .try_init();
}

fn manager() -> StateManager {
    StateManager::new(ReactiveConfig {
        emit_initial_value: false,
        ..ReactiveConfig::default()
    })
    .unwrap()
}

fn record_events(manager: &StateManager) -> Arc<Mutex<Vec<StateEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    manager.subscribe(move |event| {
        sink.lock().push(event.clone());
        Ok(())
    });
    seen
}

fn changes(events: &Mutex<Vec<StateEvent>>) -> Vec<StateChange> {
    events
        .lock()
        .iter()
        .filter_map(|event| event.as_change().cloned())
        .collect()
}

#[test]
fn test_reference_count_sharing() {
    let manager = manager();
    let context = Value::from(Record::new().with_field("x", 1));

    manager.watch_state(&context, "x", None).unwrap();
    manager.watch_state(&context, "x", None).unwrap();
    assert_eq!(manager.watch_count(&context, "x", None), 2);
    assert_eq!(manager.factory().slot_observer_count(), 1);

    manager.release_state(&context, "x", None);
    assert_eq!(manager.get_state(&context, "x"), Some(Value::from(1)));

    manager.release_state(&context, "x", None);
    assert_eq!(manager.get_state(&context, "x"), None);
    assert!(!manager.release_state(&context, "x", None));
    assert_eq!(manager.factory().slot_observer_count(), 0);
    assert_eq!(manager.factory().adapter_count(), 0);
}

#[test]
fn test_recursive_rebind_moves_nested_watches() {
    init_test_logging();
    let manager = StateManager::default();

    let c = Record::new().with_field("value", 3);
    let b = Record::new().with_field("value", 2).with_field("nested", c.clone());
    let root = Record::new().with_field("nested", b.clone());
    let context = Value::from(root.clone());
    let b_value = Value::from(b.clone());
    let c_value = Value::from(c.clone());

    let outer_rule = WatchRule::recursive(&context, "nested");
    let inner_rule = WatchRule::recursive(&b_value, "nested");
    manager.watch_state(&context, "nested", Some(Arc::clone(&outer_rule))).unwrap();
    manager.watch_state(&b_value, "value", None).unwrap();
    manager.watch_state(&b_value, "nested", Some(Arc::clone(&inner_rule))).unwrap();
    manager.watch_state(&c_value, "value", None).unwrap();

    let events = record_events(&manager);

    let c2 = Record::new().with_field("value", 13);
    let b2 = Record::new().with_field("value", 2).with_field("nested", c2.clone());
    let b2_value = Value::from(b2.clone());
    let c2_value = Value::from(c2.clone());
    manager.set_state(&context, "nested", b2.clone()).unwrap();

    {
        let events = events.lock();
        assert_eq!(events.first(), Some(&StateEvent::CycleStarted));
        assert_eq!(events.last(), Some(&StateEvent::CycleEnded));
        assert_eq!(events.len(), 5);
    }

    let changed = changes(&events);
    assert_eq!(changed.len(), 3);
    assert_eq!(changed[0].context, c2_value);
    assert_eq!(changed[0].index, Index::from("value"));
    assert_eq!(changed[0].old_value, Value::from(3));
    assert_eq!(changed[0].new_value, Value::from(13));

    assert_eq!(changed[1].context, b2_value);
    assert_eq!(changed[1].index, Index::from("nested"));
    assert_eq!(changed[1].old_value, c_value);
    assert_eq!(changed[1].new_value, c2_value);

    assert_eq!(changed[2].context, context);
    assert_eq!(changed[2].index, Index::from("nested"));
    assert_eq!(changed[2].old_value, b_value);
    assert_eq!(changed[2].new_value, b2_value);

    assert_eq!(manager.get_state(&context, "nested"), Some(b2_value.clone()));
    assert_eq!(manager.get_state(&b2_value, "value"), Some(Value::from(2)));
    assert_eq!(manager.get_state(&b2_value, "nested"), Some(c2_value.clone()));
    assert_eq!(manager.get_state(&c2_value, "value"), Some(Value::from(13)));
    assert_eq!(manager.get_state(&b_value, "value"), None);
    assert_eq!(manager.get_state(&c_value, "value"), None);

    assert_eq!(inner_rule.context(), b2_value);
    assert_eq!(manager.watch_count(&b2_value, "nested", Some(&inner_rule)), 1);
    assert_eq!(manager.registration_count(), 4);
}

#[test]
fn test_rebound_watches_follow_the_new_containers() {
    init_test_logging();
    let manager = manager();

    let c = Record::new().with_field("value", 3);
    let b = Record::new().with_field("value", 2).with_field("nested", c.clone());
    let context = Value::from(Record::new().with_field("nested", b.clone()));
    let b_value = Value::from(b.clone());

    manager
        .watch_state(&context, "nested", Some(WatchRule::recursive(&context, "nested")))
        .unwrap();
    manager
        .watch_state(&b_value, "nested", Some(WatchRule::recursive(&b_value, "nested")))
        .unwrap();
    manager.watch_state(&Value::from(c.clone()), "value", None).unwrap();

    let c2 = Record::new().with_field("value", 13);
    let b2 = Record::new().with_field("value", 2).with_field("nested", c2.clone());
    manager.set_state(&context, "nested", b2.clone()).unwrap();

    let events = record_events(&manager);
    c.set("value", 99);
    assert!(changes(&events).is_empty());

    c2.set("value", 14);
    let changed = changes(&events);
    let touched: Vec<(Value, String)> = changed
        .iter()
        .map(|change| (change.context.clone(), change.index.to_string()))
        .collect();
    assert_eq!(changed.len(), 3);
    assert!(touched.contains(&(Value::from(c2.clone()), "value".to_string())));
    assert!(touched.contains(&(Value::from(b2.clone()), "nested".to_string())));
    assert!(touched.contains(&(context.clone(), "nested".to_string())));
    assert_eq!(manager.get_state(&Value::from(c2), "value"), Some(Value::from(14)));
}

#[test]
fn test_two_rules_on_one_slot_emit_once() {
    let manager = manager();
    let root = Record::new().with_field("item", Record::new().with_field("v", 1));
    let context = Value::from(root.clone());
    let first = WatchRule::recursive(&context, "item");
    let second = WatchRule::recursive(&context, "item");

    manager.watch_state(&context, "item", Some(Arc::clone(&first))).unwrap();
    manager.watch_state(&context, "item", Some(Arc::clone(&second))).unwrap();
    assert_eq!(manager.registration_count(), 2);
    assert_eq!(manager.state(&context, "item").unwrap().ref_count, 2);

    let events = record_events(&manager);

    manager
        .set_state(&context, "item", Record::new().with_field("v", 2))
        .unwrap();
    assert_eq!(changes(&events).len(), 1);

    let tracked = Record::new().with_field("v", 3);
    root.set("item", tracked.clone());
    assert_eq!(changes(&events).len(), 2);

    tracked.set("v", 4);
    let changed = changes(&events);
    assert_eq!(changed.len(), 3);
    assert_eq!(changed[2].context, context);
    assert_eq!(changed[2].chain.len(), 1);

    manager.release_state(&context, "item", Some(&first));
    assert!(manager.is_watched(&context, "item"));
    tracked.set("v", 5);
    assert_eq!(changes(&events).len(), 4);
}

#[test]
fn test_nested_change_reports_leaf_then_ancestors() {
    let manager = manager();
    let inner = Record::new().with_field("value", 1);
    let context = Value::from(Record::new().with_field("nested", inner.clone()));
    let inner_value = Value::from(inner.clone());

    manager
        .watch_state(&context, "nested", Some(WatchRule::recursive(&context, "nested")))
        .unwrap();
    manager.watch_state(&inner_value, "value", None).unwrap();

    let events = record_events(&manager);
    inner.set("value", 2);

    let changed = changes(&events);
    assert_eq!(changed.len(), 2);
    let leaf = changed
        .iter()
        .find(|change| change.context == inner_value)
        .unwrap();
    assert_eq!(leaf.new_value, Value::from(2));
    let ancestor = changed.iter().find(|change| change.context == context).unwrap();
    assert_eq!(ancestor.old_value.read_slot(&"value".into()), Value::from(1));
    assert_eq!(ancestor.new_value, inner_value);
}

fn cycle_markers(events: &Mutex<Vec<StateEvent>>) -> (usize, usize) {
    let events = events.lock();
    let started = events.iter().filter(|event| **event == StateEvent::CycleStarted).count();
    let ended = events.iter().filter(|event| **event == StateEvent::CycleEnded).count();
    (started, ended)
}

#[test]
fn test_one_write_is_one_cycle_whatever_the_watch_order() {
    init_test_logging();
    for leaf_first in [true, false] {
        let manager = manager();
        let inner = Record::new().with_field("value", 1);
        let context = Value::from(Record::new().with_field("nested", inner.clone()));
        let inner_value = Value::from(inner.clone());

        let watch_leaf = || manager.watch_state(&inner_value, "value", None).unwrap();
        let watch_ancestor = || {
            manager
                .watch_state(&context, "nested", Some(WatchRule::recursive(&context, "nested")))
                .unwrap()
        };
        if leaf_first {
            watch_leaf();
            watch_ancestor();
        } else {
            watch_ancestor();
            watch_leaf();
        }

        let events = record_events(&manager);
        inner.set("value", 2);

        assert_eq!(cycle_markers(&events), (1, 1), "leaf watched first: {leaf_first}");
        let events = events.lock();
        assert_eq!(events.first(), Some(&StateEvent::CycleStarted));
        assert_eq!(events.last(), Some(&StateEvent::CycleEnded));
        let touched: Vec<&Value> = events
            .iter()
            .filter_map(|event| event.as_change())
            .map(|change| &change.context)
            .collect();
        assert_eq!(touched, vec![&inner_value, &context]);
    }
}

#[test]
fn test_replacing_a_pending_deferred_moves_nested_watches() {
    init_test_logging();
    let manager = manager();
    let inner = Record::new().with_field("v", 1);
    let root = Value::from(Record::new().with_field("x", inner.clone()));
    let inner_value = Value::from(inner.clone());

    manager
        .watch_state(&root, "x", Some(WatchRule::recursive(&root, "x")))
        .unwrap();
    manager.watch_state(&inner_value, "v", None).unwrap();

    let deferred = Deferred::new();
    manager.set_state(&root, "x", deferred.clone()).unwrap();
    assert_eq!(manager.get_state(&inner_value, "v"), Some(Value::from(1)));

    let replacement = Record::new().with_field("v", 5);
    let replacement_value = Value::from(replacement.clone());
    let events = record_events(&manager);
    manager.set_state(&root, "x", replacement.clone()).unwrap();

    let moved = changes(&events);
    assert_eq!(moved.len(), 2);
    assert_eq!(moved[0].context, replacement_value);
    assert_eq!(moved[0].old_value, Value::from(1));
    assert_eq!(moved[0].new_value, Value::from(5));
    assert_eq!(moved[1].context, root);
    assert_eq!(manager.get_state(&inner_value, "v"), None);
    assert_eq!(manager.get_state(&replacement_value, "v"), Some(Value::from(5)));

    events.lock().clear();
    replacement.set("v", 6);
    let changed = changes(&events);
    assert!(changed
        .iter()
        .any(|change| change.context == replacement_value && change.new_value == Value::from(6)));
    assert_eq!(manager.get_state(&replacement_value, "v"), Some(Value::from(6)));
    assert_eq!(cycle_markers(&events), (1, 1));

    events.lock().clear();
    inner.set("v", 2);
    deferred.resolve(Record::new().with_field("v", 100));
    assert!(events.lock().is_empty());
    assert_eq!(manager.get_state(&replacement_value, "v"), Some(Value::from(6)));
}

#[test]
fn test_pending_stream_hands_nested_watches_to_its_first_item() {
    let manager = manager();
    let inner = Record::new().with_field("v", 1);
    let root = Value::from(Record::new().with_field("x", inner.clone()));
    let inner_value = Value::from(inner.clone());
    manager.watch_state(&root, "x", None).unwrap();
    manager.watch_state(&inner_value, "v", None).unwrap();

    let stream = Stream::new();
    manager.set_state(&root, "x", stream.clone()).unwrap();

    let events = record_events(&manager);
    let first = Record::new().with_field("v", 7);
    let first_value = Value::from(first.clone());
    stream.emit(first.clone());

    let changed = changes(&events);
    assert_eq!(changed.len(), 2);
    assert_eq!(changed[0].context, first_value);
    assert_eq!(changed[0].new_value, Value::from(7));
    assert_eq!(changed[1].context, root);
    assert_eq!(changed[1].new_value, first_value);
    assert_eq!(manager.get_state(&inner_value, "v"), None);
    assert_eq!(manager.get_state(&root, "x"), Some(first_value.clone()));

    first.set("v", 8);
    assert_eq!(manager.get_state(&first_value, "v"), Some(Value::from(8)));
}

#[test]
fn test_pending_stream_released_before_emitting_leaves_nested_watches() {
    let manager = manager();
    let inner = Record::new().with_field("v", 1);
    let root = Value::from(Record::new().with_field("x", inner.clone()));
    let inner_value = Value::from(inner.clone());
    manager.watch_state(&root, "x", None).unwrap();
    manager.watch_state(&inner_value, "v", None).unwrap();

    let stream = Stream::new();
    manager.set_state(&root, "x", stream.clone()).unwrap();
    assert!(manager.release_state(&root, "x", None));

    let events = record_events(&manager);
    stream.emit(Record::new().with_field("v", 9));
    assert!(events.lock().is_empty());

    inner.set("v", 2);
    let changed = changes(&events);
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].context, inner_value);
    assert_eq!(manager.get_state(&inner_value, "v"), Some(Value::from(2)));
}

#[test]
fn test_set_state_refuses_methods_and_getters() {
    let manager = manager();
    let record = Record::new()
        .with_field("n", 2)
        .with_method("double", |r, _| {
            Value::from(r.get("n").as_number().unwrap_or_default() * 2.0)
        })
        .with_accessor("label", Some(Arc::new(|r: &Record| r.get("n"))), None);
    let context = Value::from(record.clone());
    manager.watch_state(&context, "double", None).unwrap();
    let events = record_events(&manager);

    assert_eq!(
        manager.set_state(&context, "double", 7).unwrap_err(),
        ReactiveError::NotWritable { member: "double".into() }
    );
    assert_eq!(
        manager.set_state(&context, "label", 7).unwrap_err(),
        ReactiveError::NotWritable { member: "label".into() }
    );
    assert!(matches!(record.member("double"), Some(Member::Method(_))));
    assert!(events.lock().is_empty());

    record.set("n", 10);
    assert_eq!(manager.get_state(&context, "double"), Some(Value::from(20)));
}

#[test]
fn test_method_and_accessor_states() {
    let manager = manager();
    let record = Record::new()
        .with_field("n", 2)
        .with_method("double", |r, _| {
            Value::from(r.get("n").as_number().unwrap_or_default() * 2.0)
        })
        .with_accessor(
            "label",
            Some(Arc::new(|r: &Record| {
                Value::from(format!("n={}", r.get("n").as_number().unwrap_or_default()))
            })),
            None,
        );
    let context = Value::from(record.clone());

    assert_eq!(manager.watch_state(&context, "double", None).unwrap(), Value::from(4));
    assert_eq!(manager.watch_state(&context, "label", None).unwrap(), Value::from("n=2"));

    let events = record_events(&manager);
    record.set("n", 5);

    assert_eq!(manager.get_state(&context, "double"), Some(Value::from(10)));
    assert_eq!(manager.get_state(&context, "label"), Some(Value::from("n=5")));
    assert_eq!(changes(&events).len(), 2);
}

#[test]
fn test_configuration_errors_reach_the_caller() {
    let manager = manager();
    let record = Record::new().with_accessor("secret", None, Some(Arc::new(|_: &Record, _: Value| {})));
    let context = Value::from(record);

    assert_eq!(
        manager.watch_state(&context, "missing", None).unwrap_err(),
        ReactiveError::UnknownMember { member: "missing".into() }
    );
    assert_eq!(
        manager.watch_state(&context, "secret", None).unwrap_err(),
        ReactiveError::WriteOnlyAccessor { member: "secret".into() }
    );
    assert_eq!(manager.registration_count(), 0);
    assert!(StateManager::new(ReactiveConfig {
        event_buffer: 0,
        ..ReactiveConfig::default()
    })
    .is_err());
}

struct Refusing;

impl DeepClone for Refusing {
    fn clone_value(&self, value: &Value) -> anyhow::Result<Value> {
        if value.is_container() {
            anyhow::bail!("containers are not supported");
        }
        Ok(value.clone())
    }
}

#[test]
fn test_clone_failure_is_reported_to_the_caller() {
    let services = Services::default().with_cloner(Arc::new(Refusing));
    let manager = StateManager::with_services(ReactiveConfig::default(), services).unwrap();
    let context = Value::from(Record::new().with_field("inner", Record::new()).with_field("n", 1));

    let err = manager.watch_state(&context, "inner", None).unwrap_err();
    match err {
        ReactiveError::Clone { key, message } => {
            assert!(key.contains("inner"));
            assert!(message.contains("not supported"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(manager.factory().slot_observer_count(), 0);
    assert_eq!(manager.watch_state(&context, "n", None).unwrap(), Value::from(1));
}

#[test]
fn test_listener_failures_are_logged_as_fatal() {
    let log = Arc::new(TracingErrorLog::new(10));
    let services = Services::default().with_error_log(Arc::clone(&log) as Arc<dyn ErrorLog>);
    let manager = StateManager::with_services(
        ReactiveConfig {
            emit_initial_value: false,
            ..ReactiveConfig::default()
        },
        services,
    )
    .unwrap();
    let record = Record::new().with_field("x", 1);
    let context = Value::from(record.clone());
    manager.watch_state(&context, "x", None).unwrap();

    manager.subscribe(|event| match event {
        StateEvent::Changed(_) => Err(anyhow::anyhow!("listener rejected change")),
        _ => Ok(()),
    });
    manager.subscribe(|event| {
        if event.as_change().is_some() {
            panic!("listener blew up");
        }
        Ok(())
    });
    let events = record_events(&manager);

    record.set("x", 2);

    assert_eq!(
        *events.lock(),
        vec![
            StateEvent::CycleStarted,
            StateEvent::Changed(StateChange {
                context: context.clone(),
                index: Index::from("x"),
                old_value: Value::from(1),
                new_value: Value::from(2),
                chain: vec![ChainSegment::new(context.clone(), Index::from("x"))],
            }),
            StateEvent::CycleEnded,
        ]
    );
    let entries = log.entries();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|entry| entry.fatal));
    assert!(entries[0].exception.as_deref().unwrap().contains("rejected"));
    assert!(entries[1].exception.as_deref().unwrap().contains("blew up"));
}

#[test]
fn test_deferred_slot_reports_settled_value() {
    let manager = manager();
    let deferred = Deferred::new();
    let context = Value::from(Record::new().with_field("result", deferred.clone()));

    let initial = manager.watch_state(&context, "result", None).unwrap();
    assert_eq!(initial, Value::from(deferred.clone()));

    let events = record_events(&manager);
    deferred.resolve(42);

    let changed = changes(&events);
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].new_value, Value::from(42));
    assert_eq!(manager.get_state(&context, "result"), Some(Value::from(42)));
}

#[test]
fn test_settlement_after_release_is_ignored() {
    let manager = manager();
    let deferred = Deferred::new();
    let context = Value::from(Record::new().with_field("result", deferred.clone()));
    manager.watch_state(&context, "result", None).unwrap();
    manager.release_state(&context, "result", None);

    let events = record_events(&manager);
    assert!(deferred.resolve(1));

    assert!(events.lock().is_empty());
    assert_eq!(manager.factory().adapter_count(), 0);
}

#[test]
fn test_array_item_state_follows_splice() {
    let manager = manager();
    let array = Array::from_values([1, 2, 3, 4].map(Value::from));
    let context = Value::from(array.clone());
    manager.watch_state(&context, 3usize, None).unwrap();

    let events = record_events(&manager);
    array.splice(1, 1, [Value::from(10), Value::from(11)]);

    assert_eq!(manager.get_state(&context, 3usize), Some(Value::from(3)));
    let changed = changes(&events);
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].old_value, Value::from(4));
}

#[test]
fn test_events_are_broadcast() {
    let manager = manager();
    let record = Record::new().with_field("x", 1);
    let context = Value::from(record.clone());
    manager.watch_state(&context, "x", None).unwrap();
    let mut rx = manager.events();

    record.set("x", 2);

    tokio_test::block_on(async {
        assert_eq!(rx.recv().await.unwrap(), StateEvent::CycleStarted);
        let changed = rx.recv().await.unwrap();
        assert_eq!(changed.as_change().unwrap().new_value, Value::from(2));
        assert_eq!(rx.recv().await.unwrap(), StateEvent::CycleEnded);
    });
}

#[tokio::test]
async fn test_spawned_deferred_settles_into_state() {
    let manager = manager();
    let deferred = Deferred::spawn(async { Value::from("done") });
    let context = Value::from(Record::new().with_field("job", deferred.clone()));
    let mut rx = manager.events();
    manager.watch_state(&context, "job", None).unwrap();

    if deferred.value().is_none() {
        loop {
            let event = rx.recv().await.unwrap();
            if event.as_change().is_some() {
                break;
            }
        }
    }
    assert_eq!(manager.get_state(&context, "job"), Some(Value::from("done")));
}
