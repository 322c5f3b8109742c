/*!
 * Delayed Objects
 *
 * Promises keyed by name or integer id. A consumer asks for the future of a
 * key before the value exists; a producer fulfills it later.
 */

use crate::errors::{GuardedError, GuardedResult};
use ahash::RandomState;
use flume::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

/// Key of a delayed value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DelayedKey {
    Name(String),
    Id(i64),
}

impl From<&str> for DelayedKey {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<String> for DelayedKey {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<i64> for DelayedKey {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl fmt::Display for DelayedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "'{name}'"),
            Self::Id(id) => write!(f, "#{id}"),
        }
    }
}

struct Promise<X> {
    sender: Sender<X>,
    receiver: Receiver<X>,
}

/// Table of pending promises
pub struct DelayedObjects<X> {
    promises: Mutex<HashMap<DelayedKey, Promise<X>, RandomState>>,
}

impl<X> DelayedObjects<X> {
    pub fn new() -> Self {
        Self {
            promises: Mutex::new(HashMap::with_hasher(RandomState::new())),
        }
    }

    /// Future for `key`, creating the promise if needed
    ///
    /// Several futures for the same key each receive the value once; only the
    /// first to wait gets it when a single value is set.
    pub fn get_future(&self, key: impl Into<DelayedKey>) -> DelayedFuture<X> {
        let key = key.into();
        let receiver = self
            .promises
            .lock()
            .entry(key.clone())
            .or_insert_with(|| {
                let (sender, receiver) = flume::bounded(1);
                Promise { sender, receiver }
            })
            .receiver
            .clone();
        DelayedFuture { key, receiver }
    }

    /// Fulfill the promise for `key`
    ///
    /// Returns `false` if nobody asked for `key`.
    pub fn set_delayed_value(&self, key: impl Into<DelayedKey>, value: X) -> bool {
        let key = key.into();
        let Some(promise) = self.promises.lock().remove(&key) else {
            return false;
        };
        // The promise's own receiver keeps the channel open
        let _ = promise.sender.send(value);
        true
    }

    /// Number of promises still waiting for a value
    pub fn pending(&self) -> usize {
        self.promises.lock().len()
    }

    /// Drop the promise for `key`; its futures resolve to an error
    pub fn finished_with_value(&self, key: impl Into<DelayedKey>) {
        self.promises.lock().remove(&key.into());
    }
}

impl<X: Clone> DelayedObjects<X> {
    /// Fulfill every pending promise with a copy of `value`
    pub fn fulfill_all_promises(&self, value: X) {
        let promises: Vec<_> = self.promises.lock().drain().collect();
        debug!(count = promises.len(), "fulfilling all delayed promises");
        for (_, promise) in promises {
            let _ = promise.sender.send(value.clone());
        }
    }
}

impl<X> Default for DelayedObjects<X> {
    fn default() -> Self {
        Self::new()
    }
}

impl<X> fmt::Debug for DelayedObjects<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayedObjects")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Future value of a [`DelayedObjects`] key
#[must_use = "a delayed value does nothing unless waited on"]
pub struct DelayedFuture<X> {
    key: DelayedKey,
    receiver: Receiver<X>,
}

impl<X> DelayedFuture<X> {
    pub fn key(&self) -> &DelayedKey {
        &self.key
    }

    /// Block until the value arrives
    pub fn get(self) -> GuardedResult<X> {
        self.receiver.recv().map_err(|_| GuardedError::PromiseBroken {
            key: self.key.to_string(),
        })
    }

    /// Block up to `timeout` for the value
    pub fn get_timeout(&self, timeout: Duration) -> GuardedResult<X> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => GuardedError::WaitTimeout,
            RecvTimeoutError::Disconnected => GuardedError::PromiseBroken {
                key: self.key.to_string(),
            },
        })
    }
}

impl<X: Send + 'static> IntoFuture for DelayedFuture<X> {
    type Output = GuardedResult<X>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            let key = self.key;
            self.receiver
                .recv_async()
                .await
                .map_err(|_| GuardedError::PromiseBroken {
                    key: key.to_string(),
                })
        })
    }
}

impl<X> fmt::Debug for DelayedFuture<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayedFuture")
            .field("key", &self.key)
            .field("ready", &!self.receiver.is_empty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_keyed_by_name_and_id() {
        let objs = DelayedObjects::new();
        let first = objs.get_future("string1");
        let second = objs.get_future(45i64);

        assert!(objs.set_delayed_value("string1", String::from("string num1")));
        assert_eq!(first.get().unwrap(), "string num1");

        assert!(objs.set_delayed_value(45i64, String::from("string2")));
        assert_eq!(second.get().unwrap(), "string2");
        assert!(!objs.set_delayed_value("unknown", String::new()));
    }

    #[test]
    fn test_fulfill_all() {
        let objs = DelayedObjects::new();
        let futures = [
            objs.get_future("t1"),
            objs.get_future("t2"),
            objs.get_future(45i64),
            objs.get_future(55i64),
        ];
        objs.fulfill_all_promises(19);
        assert_eq!(objs.pending(), 0);
        for future in futures {
            assert_eq!(future.get().unwrap(), 19);
        }
    }

    #[test]
    fn test_finished_breaks_promise() {
        let objs: DelayedObjects<u8> = DelayedObjects::new();
        let future = objs.get_future("gone");
        assert_eq!(
            future.get_timeout(Duration::from_millis(5)).unwrap_err(),
            GuardedError::WaitTimeout
        );
        objs.finished_with_value("gone");
        assert_eq!(
            future.get().unwrap_err(),
            GuardedError::PromiseBroken {
                key: String::from("'gone'")
            }
        );
    }

    #[test]
    fn test_value_from_other_thread() {
        let objs = Arc::new(DelayedObjects::new());
        let future = objs.get_future(7i64);
        let producer = {
            let objs = objs.clone();
            thread::spawn(move || objs.set_delayed_value(7i64, 70u32))
        };
        let value = futures::executor::block_on(future.into_future()).unwrap();
        assert_eq!(value, 70);
        assert!(producer.join().unwrap());
    }
}
