/*!
 * Generation-Based Reclamation
 *
 * Deferred freeing for objects a writer has unlinked while readers may still
 * be looking at them.
 *
 * # Design
 *
 * The domain holds a chain of reference-counted generations:
 * - a reader pins the current generation by cloning its `Arc`
 * - a writer retires unlinked objects (zombies) into the current generation
 * - when a write session that retired something commits, a fresh generation
 *   is published and the old one links to it through `next`
 *
 * A generation is freed, together with its zombies, once nothing references
 * it: no reader pins it and no older generation links to it. A reader pinned
 * on generation G can only reach objects retired in G or later, and G keeps
 * every later generation alive through the chain, so nothing it can reach is
 * freed under it.
 *
 * # Performance
 *
 * - Pinning is one `ArcSwap` load plus a reference count increment
 * - Write sessions that retire nothing never allocate a generation
 */

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::trace;

/// Retirement counters of a domain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimStats {
    /// Objects handed to the domain since construction
    pub retired: usize,
    /// Objects actually freed since construction
    pub reclaimed: usize,
}

impl ReclaimStats {
    /// Zombies still waiting for their readers to leave
    #[inline]
    pub fn pending(&self) -> usize {
        self.retired - self.reclaimed
    }
}

#[derive(Default)]
struct Counters {
    retired: AtomicUsize,
    reclaimed: AtomicUsize,
}

struct Generation<Z> {
    zombies: Mutex<Vec<Z>>,
    next: OnceLock<Arc<Generation<Z>>>,
    counters: Arc<Counters>,
}

impl<Z> Generation<Z> {
    fn new(counters: Arc<Counters>) -> Self {
        Self {
            zombies: Mutex::new(Vec::new()),
            next: OnceLock::new(),
            counters,
        }
    }
}

impl<Z> Drop for Generation<Z> {
    fn drop(&mut self) {
        let freed = self.zombies.get_mut().len();
        if freed > 0 {
            self.counters.reclaimed.fetch_add(freed, Ordering::Relaxed);
            trace!(freed, "reclaimed rcu zombies");
        }

        // Unlink the chain iteratively so a long run of generations does not
        // recurse once per link
        let mut next = self.next.take();
        while let Some(generation) = next {
            match Arc::try_unwrap(generation) {
                Ok(mut generation) => next = generation.next.take(),
                Err(_) => break,
            }
        }
    }
}

/// Reclamation domain owning a generation chain
pub struct Domain<Z> {
    current: ArcSwap<Generation<Z>>,
    counters: Arc<Counters>,
}

/// A reader's hold on one generation
///
/// Everything retired in the pinned generation or a later one stays alive
/// until the pin is dropped.
#[must_use = "dropping the pin immediately protects nothing"]
pub struct Pinned<Z> {
    _generation: Arc<Generation<Z>>,
}

impl<Z> Domain<Z> {
    pub fn new() -> Self {
        let counters = Arc::new(Counters::default());
        Self {
            current: ArcSwap::from_pointee(Generation::new(counters.clone())),
            counters,
        }
    }

    /// Pin the current generation
    #[inline]
    pub fn pin(&self) -> Pinned<Z> {
        Pinned {
            _generation: self.current.load_full(),
        }
    }

    /// Hand an unlinked object over for deferred freeing
    ///
    /// Must only be called by the single active writer.
    pub fn retire(&self, zombie: Z) {
        self.current.load().zombies.lock().push(zombie);
        self.counters.retired.fetch_add(1, Ordering::Relaxed);
    }

    /// Close the current write session
    ///
    /// Must only be called by the single active writer, after every object
    /// of the session has been unlinked and retired.
    pub fn advance(&self) {
        let old = self.current.load_full();
        let retired = old.zombies.lock().len();
        if retired == 0 {
            return;
        }

        let fresh = Arc::new(Generation::new(self.counters.clone()));
        // Only the writer links generations, and each generation is
        // superseded exactly once
        let _ = old.next.set(fresh.clone());
        self.current.store(fresh);
        trace!(retired, "rcu generation advanced");
    }

    /// Counters since construction
    pub fn stats(&self) -> ReclaimStats {
        ReclaimStats {
            retired: self.counters.retired.load(Ordering::Relaxed),
            reclaimed: self.counters.reclaimed.load(Ordering::Relaxed),
        }
    }
}

impl<Z> Default for Domain<Z> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Z> fmt::Debug for Domain<Z> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Domain").field("stats", &self.stats()).finish()
    }
}

impl<Z> fmt::Debug for Pinned<Z> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pinned").finish_non_exhaustive()
    }
}
