/*!
 * RCU List
 *
 * Singly linked list that readers traverse without locks while one writer
 * inserts and removes nodes in place.
 *
 * # Design
 *
 * - Links are `AtomicPtr`s; writers publish with `Release`, readers follow
 *   with `Acquire`
 * - A removed node is unlinked from its predecessor but keeps its own `next`
 *   pointer, then retired to the reclamation domain
 * - A reader positioned on a removed node therefore keeps a valid iterator and
 *   walks on into the nodes that followed it at removal time
 *
 * # Performance
 *
 * - Reads: pointer chasing only, no atomics beyond the loads
 * - Writes: no cloning; only the touched links change
 */

use super::epoch::{Domain, Pinned, ReclaimStats};
use super::guarded::RcuCollection;
use std::cell::UnsafeCell;
use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

struct Node<T> {
    value: T,
    next: AtomicPtr<Node<T>>,
}

/// Linked list with lock-free readers and in-place writers
///
/// Host it in an [`RcuGuarded`](crate::RcuGuarded) to share it between
/// threads.
///
/// # Example
///
/// ```
/// use guarded::{RcuGuarded, RcuList};
///
/// let sessions: RcuGuarded<RcuList<u32>> = RcuGuarded::default();
/// {
///     let mut writer = sessions.lock_write();
///     writer.push_back(1);
///     writer.push_back(2);
/// }
///
/// let reader = sessions.lock_read();
/// sessions.lock_write().remove_first(|id| *id == 1);
///
/// // The reader still holds a valid view of the list
/// assert_eq!(reader.iter().copied().collect::<Vec<_>>(), vec![2]);
/// assert_eq!(sessions.lock_read().len(), 1);
/// ```
pub struct RcuList<T> {
    head: AtomicPtr<Node<T>>,
    // Only touched by the writer
    tail: UnsafeCell<*mut Node<T>>,
    len: AtomicUsize,
    domain: Domain<Box<Node<T>>>,
}

// Safety: readers share `&T` across threads and zombies are freed on
// whichever thread drops the last pin
unsafe impl<T: Send + Sync> Send for RcuList<T> {}
unsafe impl<T: Send + Sync> Sync for RcuList<T> {}

impl<T> RcuList<T> {
    pub fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            tail: UnsafeCell::new(ptr::null_mut()),
            len: AtomicUsize::new(0),
            domain: Domain::new(),
        }
    }

    /// Number of live elements at the moment of the call
    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }

    /// First element
    pub fn front(&self) -> Option<&T> {
        let head = self.head.load(Ordering::Acquire);
        // Safety: nodes reachable while the caller's pin is alive are not freed
        unsafe { head.as_ref().map(|node| &node.value) }
    }

    /// Iterate from the current head
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            next: self.head.load(Ordering::Acquire),
            _marker: PhantomData,
        }
    }

    /// Pin the list for reading
    pub fn pin(&self) -> ListPin<'_, T> {
        ListPin {
            list: self,
            _pin: self.domain.pin(),
        }
    }

    /// Counters of the reclamation domain
    pub fn reclaim_stats(&self) -> ReclaimStats {
        self.domain.stats()
    }
}

impl<T> Default for RcuList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for RcuList<T> {
    fn drop(&mut self) {
        let mut cursor = *self.head.get_mut();
        while !cursor.is_null() {
            // Safety: `&mut self` excludes readers and writers; every live
            // node was allocated by `Box::into_raw`
            let node = unsafe { Box::from_raw(cursor) };
            cursor = node.next.load(Ordering::Relaxed);
        }
    }
}

impl<T> FromIterator<T> for RcuList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let list = Self::new();
        {
            // Safety: the list is not shared yet
            let mut writer = unsafe { list.writer() };
            for value in iter {
                writer.push_back(value);
            }
        }
        list
    }
}

impl<T: fmt::Debug> fmt::Debug for RcuList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let view = self.pin();
        f.debug_list().entries(view.iter()).finish()
    }
}

/// Pinned view of an [`RcuList`]
///
/// Iterators started from it stay valid while it lives, even over nodes a
/// writer has since removed.
pub struct ListPin<'a, T> {
    list: &'a RcuList<T>,
    _pin: Pinned<Box<Node<T>>>,
}

impl<T> Deref for ListPin<'_, T> {
    type Target = RcuList<T>;

    #[inline]
    fn deref(&self) -> &RcuList<T> {
        self.list
    }
}

impl<T: fmt::Debug> fmt::Debug for ListPin<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.list.iter()).finish()
    }
}

impl<T> RcuCollection for RcuList<T> {
    type View = RcuList<T>;
    type Reader<'a> = ListPin<'a, T> where Self: 'a;
    type Writer<'a> = RcuListWriter<'a, T> where Self: 'a;

    fn pin(&self) -> Self::Reader<'_> {
        RcuList::pin(self)
    }

    unsafe fn writer(&self) -> Self::Writer<'_> {
        RcuListWriter { list: self }
    }

    fn reclaim_stats(&self) -> ReclaimStats {
        self.domain.stats()
    }
}

/// Borrowing iterator over an [`RcuList`]
pub struct Iter<'a, T> {
    next: *const Node<T>,
    _marker: PhantomData<&'a T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        // Safety: the pin that produced `'a` keeps zombies alive
        let node = unsafe { self.next.as_ref()? };
        self.next = node.next.load(Ordering::Acquire);
        Some(&node.value)
    }
}

impl<T> FusedIterator for Iter<'_, T> {}

// Safety: the iterator only hands out `&T`
unsafe impl<T: Sync> Send for Iter<'_, T> {}
unsafe impl<T: Sync> Sync for Iter<'_, T> {}

/// Exclusive writer over an [`RcuList`]
///
/// Edits are visible to new readers immediately. Dropping the writer closes
/// the write session so the nodes it removed can be reclaimed.
pub struct RcuListWriter<'a, T> {
    list: &'a RcuList<T>,
}

impl<T> RcuListWriter<'_, T> {
    #[inline]
    fn tail(&self) -> *mut Node<T> {
        // Safety: only the writer touches `tail`
        unsafe { *self.list.tail.get() }
    }

    #[inline]
    fn set_tail(&mut self, node: *mut Node<T>) {
        unsafe { *self.list.tail.get() = node };
    }

    fn alloc(value: T, next: *mut Node<T>) -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            value,
            next: AtomicPtr::new(next),
        }))
    }

    pub fn push_front(&mut self, value: T) {
        let head = self.list.head.load(Ordering::Relaxed);
        let node = Self::alloc(value, head);
        self.list.head.store(node, Ordering::Release);
        if head.is_null() {
            self.set_tail(node);
        }
        self.list.len.fetch_add(1, Ordering::Release);
    }

    pub fn push_back(&mut self, value: T) {
        let node = Self::alloc(value, ptr::null_mut());
        let tail = self.tail();
        if tail.is_null() {
            self.list.head.store(node, Ordering::Release);
        } else {
            // Safety: `tail` is a live node owned by the list
            unsafe { (*tail).next.store(node, Ordering::Release) };
        }
        self.set_tail(node);
        self.list.len.fetch_add(1, Ordering::Release);
    }

    /// Unlink the head; its value stays readable by older readers
    ///
    /// Returns whether an element was removed.
    pub fn pop_front(&mut self) -> bool {
        let head = self.list.head.load(Ordering::Relaxed);
        if head.is_null() {
            return false;
        }
        unsafe { self.unlink(ptr::null_mut(), head) };
        true
    }

    /// Unlink the first element matching `pred`
    pub fn remove_first(&mut self, mut pred: impl FnMut(&T) -> bool) -> bool {
        let mut prev: *mut Node<T> = ptr::null_mut();
        let mut cursor = self.list.head.load(Ordering::Relaxed);
        while !cursor.is_null() {
            // Safety: live nodes are only freed after the writer retires them
            let node = unsafe { &*cursor };
            if pred(&node.value) {
                unsafe { self.unlink(prev, cursor) };
                return true;
            }
            prev = cursor;
            cursor = node.next.load(Ordering::Relaxed);
        }
        false
    }

    /// Keep only the elements matching `keep`; returns how many were removed
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) -> usize {
        let mut removed = 0;
        let mut prev: *mut Node<T> = ptr::null_mut();
        let mut cursor = self.list.head.load(Ordering::Relaxed);
        while !cursor.is_null() {
            let node = unsafe { &*cursor };
            let next = node.next.load(Ordering::Relaxed);
            if keep(&node.value) {
                prev = cursor;
            } else {
                unsafe { self.unlink(prev, cursor) };
                removed += 1;
            }
            cursor = next;
        }
        removed
    }

    /// Unlink every element
    pub fn clear(&mut self) -> usize {
        self.retain(|_| false)
    }

    /// Unlink `node` whose predecessor is `prev` (null for the head)
    ///
    /// # Safety
    ///
    /// Both must be live nodes of this list with `prev.next == node`.
    unsafe fn unlink(&mut self, prev: *mut Node<T>, node: *mut Node<T>) {
        let next = (*node).next.load(Ordering::Relaxed);
        if prev.is_null() {
            self.list.head.store(next, Ordering::Release);
        } else {
            (*prev).next.store(next, Ordering::Release);
        }
        if self.tail() == node {
            self.set_tail(prev);
        }
        self.list.len.fetch_sub(1, Ordering::Release);
        // `node.next` is left intact for readers still standing on it
        self.list.domain.retire(Box::from_raw(node));
    }

    pub fn front(&self) -> Option<&T> {
        self.list.front()
    }

    pub fn iter(&self) -> Iter<'_, T> {
        self.list.iter()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

impl<T> Drop for RcuListWriter<'_, T> {
    fn drop(&mut self) {
        self.list.domain.advance();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(list: &RcuList<i32>) -> Vec<i32> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_push_and_pop() {
        let list = RcuList::new();
        {
            let mut writer = unsafe { list.writer() };
            writer.push_back(2);
            writer.push_front(1);
            writer.push_back(3);
            assert_eq!(writer.len(), 3);
        }
        assert_eq!(collect(&list), vec![1, 2, 3]);
        assert_eq!(list.front(), Some(&1));

        let mut writer = unsafe { list.writer() };
        assert!(writer.pop_front());
        assert!(writer.pop_front());
        assert!(writer.pop_front());
        assert!(!writer.pop_front());
        assert!(writer.is_empty());

        // The tail was reset: appending works on the emptied list
        writer.push_back(4);
        drop(writer);
        assert_eq!(collect(&list), vec![4]);
    }

    #[test]
    fn test_remove_tail_updates_tail() {
        let list: RcuList<i32> = (1..=3).collect();
        let mut writer = unsafe { list.writer() };
        assert!(writer.remove_first(|v| *v == 3));
        writer.push_back(5);
        assert!(!writer.remove_first(|v| *v == 42));
        drop(writer);
        assert_eq!(collect(&list), vec![1, 2, 5]);
    }

    #[test]
    fn test_pinned_iterator_survives_removal() {
        let list: RcuList<i32> = (1..=4).collect();
        let pin = list.pin();
        let mut iter = list.iter();
        assert_eq!(iter.next(), Some(&1));

        {
            let mut writer = unsafe { list.writer() };
            assert_eq!(writer.clear(), 4);
        }
        assert!(list.is_empty());
        assert_eq!(list.reclaim_stats().pending(), 4);

        // Removed nodes keep their links, so the walk continues
        assert_eq!(iter.copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        drop(pin);
        assert_eq!(list.reclaim_stats().pending(), 0);
    }

    #[test]
    fn test_retain() {
        let list: RcuList<i32> = (1..=10).collect();
        let removed = unsafe { list.writer() }.retain(|v| v % 3 == 0);
        assert_eq!(removed, 7);
        assert_eq!(collect(&list), vec![3, 6, 9]);
        assert_eq!(list.len(), 3);
        assert_eq!(format!("{list:?}"), "[3, 6, 9]");
    }
}
