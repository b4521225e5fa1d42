use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use synapsed_reactive::*;
use tokio::sync::mpsc;

fn collect(observation: &Observation) -> Arc<Mutex<Vec<ChangeRecord>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    observation.subscribe(move |record| sink.lock().push(record.clone()));
    observation.init();
    seen
}

#[test]
fn test_array_splice_reports_shifted_positions() {
    let factory = ObserverFactory::default();
    let array = Array::from_values([1, 2, 3, 4].map(Value::from));
    let observation = factory.observe(&Value::from(array.clone())).unwrap();
    let seen = collect(&observation);

    let removed = array.splice(1, 1, [Value::from(10), Value::from(11)]);
    assert_eq!(removed, vec![Value::from(2)]);

    let seen = seen.lock();
    let writes: Vec<(Index, Value, bool)> = seen
        .iter()
        .map(|record| (record.slot.clone(), record.new_value.clone(), record.is_new))
        .collect();
    assert_eq!(
        writes,
        vec![
            (Index::Position(1), Value::from(10), false),
            (Index::Position(2), Value::from(11), false),
            (Index::Position(3), Value::from(3), false),
            (Index::Position(4), Value::from(4), true),
        ]
    );
    assert!(seen.iter().all(|record| record.mutation == seen[0].mutation));
    assert_eq!(seen[0].chain.len(), 1);
    assert_eq!(seen[0].target, Value::from(array.clone()));
}

#[test]
fn test_array_shrink_reports_dropped_positions() {
    let factory = ObserverFactory::default();
    let array = Array::from_values([1, 2, 3].map(Value::from));
    let observation = factory.observe(&Value::from(array.clone())).unwrap();
    let seen = collect(&observation);

    array.set_len(1);
    array.set_len(4);

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].slot, Index::Position(1));
    assert_eq!(seen[0].new_value, Value::Undefined);
    assert_eq!(seen[1].slot, Index::Position(2));
}

#[test]
fn test_map_flags_new_keys() {
    let factory = ObserverFactory::default();
    let map = Map::from_entries([
        (Value::from("a"), Value::from(1)),
        (Value::from("b"), Value::from(2)),
    ]);
    let observation = factory.observe(&Value::from(map.clone())).unwrap();
    let seen = collect(&observation);

    map.set("c", 3);
    map.set("a", 10);

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].slot, Index::Key(Value::from("c")));
    assert_eq!(seen[0].new_value, Value::from(3));
    assert!(seen[0].is_new);
    assert_eq!(seen[1].slot, Index::Key(Value::from("a")));
    assert_eq!(seen[1].new_value, Value::from(10));
    assert!(!seen[1].is_new);
}

#[test]
fn test_set_item_is_its_own_slot() {
    let factory = ObserverFactory::default();
    let set = Set::from_items([
        Value::from(Record::new().with_field("x", 1)),
        Value::from(Record::new().with_field("x", 2)),
    ]);
    let observation = factory.observe(&Value::from(set.clone())).unwrap();
    let seen = collect(&observation);

    let third = Value::from(Record::new().with_field("x", 3));
    assert!(set.add(third.clone()));

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].slot, Index::Key(third.clone()));
    assert_eq!(seen[0].new_value, third);
    assert!(seen[0].chain.is_empty());
    assert!(seen[0].is_new);
}

#[test]
fn test_date_coarse_reports_setter_once() {
    let factory = ObserverFactory::default();
    let date = Date::from_ymd(2021, 2, 2).unwrap();
    let observation = factory.observe(&Value::from(date.clone())).unwrap();
    let seen = collect(&observation);

    date.set_full_year(2022).unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].slot, Index::from("year"));
    assert_eq!(seen[0].new_value, Value::from(date.clone()));
}

#[test]
fn test_date_fine_reports_each_changed_property() {
    let factory = ObserverFactory::default();
    let date = Date::from_ymd(2021, 2, 2).unwrap();
    let value = Value::from(date.clone());
    let rule = WatchRule::recursive(&value, "date");
    let observation = factory
        .observe_filtered(&value, SlotFilter::Rule(rule))
        .unwrap();
    let seen = collect(&observation);

    date.set_full_year(2022).unwrap();

    let seen = seen.lock();
    let names: Vec<String> = seen.iter().map(|record| record.slot.to_string()).collect();
    assert_eq!(names, vec!["year", "utcYear", "time"]);
    assert_eq!(seen[0].new_value, Value::from(2022.0));
    assert_eq!(seen[1].new_value, Value::from(2022.0));
    assert_eq!(
        seen[2].new_value,
        Value::from(date.epoch_millis() as f64)
    );
}

#[test]
fn test_date_property_slot_observer() {
    let factory = ObserverFactory::default();
    let date = Date::from_ymd(2021, 2, 2).unwrap();
    let value = Value::from(date.clone());
    let observation = factory.observe_slot(&value, "month", None).unwrap();
    let seen = collect(&observation);

    date.set_full_year(2030).unwrap();
    date.set_month(5).unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].new_value, Value::from(5.0));
    assert_eq!(observation.current_value(), Value::from(5.0));
}

#[test]
fn test_deferred_settles_once_and_replays() {
    let factory = ObserverFactory::default();
    let deferred = Deferred::new();
    let value = Value::from(deferred.clone());
    let first = factory.observe(&value).unwrap();
    let seen = collect(&first);

    assert!(deferred.resolve(5));
    assert!(!deferred.resolve(6));

    {
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, ChangeKind::Settled);
        assert_eq!(seen[0].slot, Index::from("value"));
        assert_eq!(seen[0].new_value, Value::from(5));
        assert!(seen[0].chain.is_empty());
    }

    let late = factory.observe(&value).unwrap();
    assert!(late.shares_observer_with(&first));
    let replayed = collect(&late);
    assert_eq!(replayed.lock().len(), 1);
    assert_eq!(replayed.lock()[0].new_value, Value::from(5));
}

#[test]
fn test_stream_reports_every_emission() {
    let factory = ObserverFactory::default();
    let stream = Stream::new();
    let observation = factory.observe(&Value::from(stream.clone())).unwrap();
    let seen = collect(&observation);

    stream.emit(1);
    stream.emit(1);
    stream.emit(2);

    let values: Vec<Value> = seen.lock().iter().map(|r| r.new_value.clone()).collect();
    assert_eq!(values, vec![Value::from(1), Value::from(1), Value::from(2)]);
    assert_eq!(observation.current_value(), Value::from(2));
}

#[test]
fn test_settlement_after_disposal_is_ignored() {
    let factory = ObserverFactory::default();
    let deferred = Deferred::new();
    let observation = factory.observe(&Value::from(deferred.clone())).unwrap();
    let seen = collect(&observation);

    observation.dispose();
    assert_eq!(factory.adapter_count(), 0);
    assert!(deferred.resolve(1));

    assert!(seen.lock().is_empty());
}

#[test]
fn test_async_slots_have_no_addressable_members() {
    let factory = ObserverFactory::default();
    let value = Value::from(Deferred::new());
    assert_eq!(
        factory.observe_slot(&value, "value", None).unwrap_err(),
        ReactiveError::NoAddressableSlots { kind: "deferred" }
    );
}

#[tokio::test]
async fn test_spawned_deferred_settles_from_task() {
    let factory = ObserverFactory::default();
    let deferred = Deferred::spawn(async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Value::from(7)
    });
    let observation = factory.observe(&Value::from(deferred.clone())).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    observation.subscribe(move |record| {
        let _ = tx.send(record.new_value.clone());
    });
    observation.init();

    let settled = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap();
    assert_eq!(settled, Some(Value::from(7)));
    assert_eq!(deferred.value(), Some(Value::from(7)));
}

#[tokio::test]
async fn test_forwarded_stream_emits_channel_values() {
    let factory = ObserverFactory::default();
    let (source, receiver) = mpsc::unbounded_channel();
    let stream = Stream::forward(receiver);
    let observation = factory.observe(&Value::from(stream.clone())).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    observation.subscribe(move |record| {
        let _ = tx.send(record.new_value.clone());
    });
    observation.init();

    source.send(Value::from("a")).unwrap();
    source.send(Value::from("b")).unwrap();

    for expected in ["a", "b"] {
        let value = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(value, Some(Value::from(expected)));
    }
}
