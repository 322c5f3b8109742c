/*!
 * Collaborator Tests
 * Tripwires, triggers, latches and object holders working together
 */

use guarded::{
    Barrier, DelayedDestructor, DelayedObjects, GuardedError, Latch, SearchableObjectHolder,
    SharedGuarded, TripLine, TripLinePool, TriggerVariable,
};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug)]
struct Session {
    id: u32,
    hits: SharedGuarded<u32>,
}

impl Session {
    fn new(id: u32) -> Arc<Self> {
        Arc::new(Self {
            id,
            hits: SharedGuarded::new(0),
        })
    }
}

#[test]
fn test_registry_hands_objects_to_destructor() {
    let registry = SearchableObjectHolder::new();
    let destroyed = Arc::new(AtomicUsize::new(0));
    let counter = destroyed.clone();
    let graveyard = DelayedDestructor::with_callback(move |s: &Arc<Session>| {
        counter.fetch_add(*s.hits.lock_shared() as usize, Ordering::SeqCst);
    });

    for id in 0..4 {
        registry.add_object(format!("session-{id}"), Session::new(id));
    }
    let in_use = registry.find_object("session-2").unwrap();
    *in_use.hits.lock() += 5;

    for session in registry.objects() {
        *session.hits.lock() += 1;
        graveyard.add_object(session);
    }
    while registry.remove_object_by(|_| true) {}
    assert!(registry.is_empty());

    assert_eq!(graveyard.destroy_objects(), 1);
    assert_eq!(destroyed.load(Ordering::SeqCst), 3);

    drop(in_use);
    assert_eq!(graveyard.destroy_objects(), 0);
    assert_eq!(destroyed.load(Ordering::SeqCst), 9);
}

#[test]
#[serial]
fn test_tripwire_short_circuits_teardown() {
    let pool = TripLinePool::new(2);
    let line = pool.line(1).unwrap();
    let registry = SearchableObjectHolder::new().with_tripwire(line.detector());
    let graveyard = DelayedDestructor::new().with_tripwire(line.detector());

    let session = Session::new(7);
    registry.add_object("s", session.clone());
    graveyard.add_object(session.clone());
    assert_eq!(registry.find_object_by(|s| s.id == 7).map(|s| s.id), Some(7));

    drop(line.trigger());
    assert!(registry.find_object("s").is_none());
    assert!(!pool.line(0).unwrap().is_tripped());
    assert_eq!(
        pool.line(2).unwrap_err(),
        GuardedError::IndexOutOfRange { index: 2, len: 2 }
    );

    // Still shared: teardown gives up at once instead of retrying
    drop(graveyard);
    assert_eq!(Arc::strong_count(&session), 2);
}

#[test]
fn test_trigger_gates_workers() {
    let start = Arc::new(TriggerVariable::new(false));
    let latch = Arc::new(Latch::new(3));
    let barrier = Arc::new(Barrier::new(3));
    let total = Arc::new(SharedGuarded::new(0u32));

    let workers: Vec<_> = (0..3)
        .map(|_| {
            let (start, latch, barrier, total) =
                (start.clone(), latch.clone(), barrier.clone(), total.clone());
            thread::spawn(move || {
                start.wait_activation();
                start.wait();
                *total.lock() += 1;
                barrier.wait();
                latch.arrive();
            })
        })
        .collect();

    assert!(!latch.wait_for(Duration::from_millis(20)));
    assert!(start.activate());
    assert!(start.trigger());
    latch.wait();
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(*total.lock_shared(), 3);
}

#[test]
fn test_delayed_objects_across_threads() {
    let objs = Arc::new(DelayedObjects::new());
    let futures: Vec<_> = (0..4i64).map(|id| objs.get_future(id)).collect();
    let named = objs.get_future("all-done");

    let producer = {
        let objs = objs.clone();
        let line = TripLine::new();
        thread::spawn(move || {
            for id in 0..4i64 {
                objs.set_delayed_value(id, id * 10);
            }
            objs.fulfill_all_promises(-1);
            drop(line.trigger());
            line.is_tripped()
        })
    };

    let values: Vec<i64> = futures.into_iter().map(|f| f.get().unwrap()).collect();
    assert_eq!(values, vec![0, 10, 20, 30]);
    assert_eq!(named.get().unwrap(), -1);
    assert!(producer.join().unwrap());
}
