/*!
 * RCU Integration Tests
 * Reader snapshots, concurrent writers and zombie reclamation
 */

use guarded::{RcuGuarded, RcuList, RcuValue, ReclaimStats};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn test_iterator_survives_erase() {
    let list: RcuGuarded<RcuList<u32>> = RcuGuarded::new((0..10).collect());
    let reader = list.lock_read();
    let mut iter = reader.iter();
    assert_eq!(iter.next(), Some(&0));
    assert_eq!(iter.next(), Some(&1));

    {
        let mut writer = list.lock_write();
        assert_eq!(writer.retain(|v| v % 2 == 0), 5);
        assert!(writer.remove_first(|v| *v == 2));
    }

    // The reader stands on a removed node and walks on from where it was
    // unlinked
    assert_eq!(iter.copied().collect::<Vec<_>>(), [2, 4, 6, 8]);
    assert_eq!(list.lock_read().iter().copied().collect::<Vec<_>>(), [0, 4, 6, 8]);
    assert_eq!(list.reclaim_stats().pending(), 6);

    drop(reader);
    assert_eq!(
        list.reclaim_stats(),
        ReclaimStats {
            retired: 6,
            reclaimed: 6
        }
    );
}

#[test]
fn test_drained_list_is_empty() {
    let list = Arc::new(RcuGuarded::new(RcuList::new()));
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let list = list.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut walks = 0usize;
                while !stop.load(Ordering::Acquire) {
                    let snapshot = list.lock_read();
                    let values: Vec<u64> = snapshot.iter().copied().collect();
                    // Values are unique, so a walk never revisits a node
                    assert!(values.windows(2).all(|w| w[0] != w[1]));
                    walks += 1;
                }
                walks
            })
        })
        .collect();

    let writers: Vec<_> = (0..2u64)
        .map(|t| {
            let list = list.clone();
            thread::spawn(move || {
                for i in 0..500u64 {
                    let mut writer = list.lock_write();
                    writer.push_back(t * 10_000 + i);
                    if i % 3 == 0 {
                        writer.pop_front();
                    }
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let removed = list.lock_write().clear();
    stop.store(true, Ordering::Release);
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(removed + 2 * 167, 1_000);
    assert_eq!(list.lock_read().len(), 0);
    assert_eq!(list.lock_read().iter().count(), 0);
    assert_eq!(list.reclaim_stats().pending(), 0);
}

#[test]
fn test_value_readers_see_whole_versions() {
    let config = Arc::new(RcuGuarded::new(RcuValue::new(vec![0u32; 16])));
    let stop = Arc::new(AtomicBool::new(false));

    let reader = {
        let config = config.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            while !stop.load(Ordering::Acquire) {
                let version = config.lock_read();
                assert!(version.iter().all(|&v| v == version[0]));
            }
        })
    };

    for _ in 0..1_000 {
        let mut writer = config.lock_write();
        for v in writer.iter_mut() {
            *v += 1;
        }
    }
    stop.store(true, Ordering::Release);
    reader.join().unwrap();

    assert_eq!(config.lock_read()[0], 1_000);
    assert_eq!(config.reclaim_stats().pending(), 0);
}
