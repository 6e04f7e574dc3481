// License and Copyright Notice:
//
// Some of the code and doc comments in this module were adapted from
// `std::collections::LinkedList` in the Rust standard library.
// https://github.com/rust-lang/rust/blob/master/library/alloc/src/collections/linked_list.rs
//
// The original code/comments from LinkedList are dual-licensed under
// the Apache License, Version 2.0 <https://github.com/rust-lang/rust/blob/master/LICENSE-APACHE>
// or the MIT license <https://github.com/rust-lang/rust/blob/master/LICENSE-MIT>
//
// Copyrights of the original code/comments are retained by their contributors.
// For full authorship information, see the version control history of
// https://github.com/rust-lang/rust/ or https://thanks.rust-lang.org

use std::{marker::PhantomData, ptr::NonNull};

/// A node of the access-order deque. A cache entry keeps a `NonNull` pointer to
/// its own node so that it can be moved or unlinked in O(1).
pub(crate) struct DeqNode<T> {
    next: Option<NonNull<DeqNode<T>>>,
    prev: Option<NonNull<DeqNode<T>>>,
    pub(crate) element: T,
}

impl<T> std::fmt::Debug for DeqNode<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeqNode")
            .field("next", &self.next)
            .field("prev", &self.prev)
            .finish()
    }
}

impl<T> DeqNode<T> {
    pub(crate) fn new(element: T) -> Self {
        Self {
            next: None,
            prev: None,
            element,
        }
    }
}

/// An intrusive doubly-linked list. The front is the least recently used end.
///
/// The deque owns its nodes. Pointers handed out by `push_back` stay valid
/// until the node is unlinked by `pop_front` or `unlink_and_drop`, or the deque
/// itself is dropped.
pub(crate) struct Deque<T> {
    len: usize,
    head: Option<NonNull<DeqNode<T>>>,
    tail: Option<NonNull<DeqNode<T>>>,
    marker: PhantomData<Box<DeqNode<T>>>,
}

impl<T> Default for Deque<T> {
    fn default() -> Self {
        Self {
            len: 0,
            head: None,
            tail: None,
            marker: PhantomData,
        }
    }
}

impl<T> Drop for Deque<T> {
    fn drop(&mut self) {
        while self.pop_front().is_some() {}
    }
}

impl<T> Deque<T> {
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[cfg(test)]
    pub(crate) fn peek_front(&self) -> Option<&DeqNode<T>> {
        self.head.as_ref().map(|node| unsafe { node.as_ref() })
    }

    #[cfg(test)]
    pub(crate) fn peek_back(&self) -> Option<&DeqNode<T>> {
        self.tail.as_ref().map(|node| unsafe { node.as_ref() })
    }

    /// Adds the given node to the back (most recently used end) of the list and
    /// returns a pointer to it.
    pub(crate) fn push_back(&mut self, node: Box<DeqNode<T>>) -> NonNull<DeqNode<T>> {
        let node = NonNull::from(Box::leak(node));
        unsafe { self.link_back(node) };
        self.len += 1;
        node
    }

    /// Removes and returns the node at the front of the list.
    pub(crate) fn pop_front(&mut self) -> Option<Box<DeqNode<T>>> {
        self.head.map(|node| unsafe {
            self.detach(node);
            self.len -= 1;
            Box::from_raw(node.as_ptr())
        })
    }

    /// Moves the node to the back of the list.
    ///
    /// # Safety
    ///
    /// `node` must be a node currently linked into _this_ deque.
    pub(crate) unsafe fn move_to_back(&mut self, node: NonNull<DeqNode<T>>) {
        if self.tail == Some(node) {
            return;
        }
        self.detach(node);
        self.link_back(node);
    }

    /// Unlinks the node from the list and drops it.
    ///
    /// # Safety
    ///
    /// `node` must be a node currently linked into _this_ deque. The pointer
    /// must not be used afterwards.
    pub(crate) unsafe fn unlink_and_drop(&mut self, node: NonNull<DeqNode<T>>) {
        self.detach(node);
        self.len -= 1;
        std::mem::drop(Box::from_raw(node.as_ptr()));
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> Iter<'_, T> {
        Iter {
            next: self.head,
            marker: PhantomData,
        }
    }
}

// Private methods
impl<T> Deque<T> {
    /// Splices the node out of the list without touching `len`. Takes care not to
    /// create mutable references overlapping `element`.
    unsafe fn detach(&mut self, node: NonNull<DeqNode<T>>) {
        let prev = (*node.as_ptr()).prev.take();
        let next = (*node.as_ptr()).next.take();

        match prev {
            Some(prev) => (*prev.as_ptr()).next = next,
            None => self.head = next,
        }

        match next {
            Some(next) => (*next.as_ptr()).prev = prev,
            None => self.tail = prev,
        }
    }

    unsafe fn link_back(&mut self, node: NonNull<DeqNode<T>>) {
        (*node.as_ptr()).next = None;
        (*node.as_ptr()).prev = self.tail;

        match self.tail {
            None => self.head = Some(node),
            Some(tail) => (*tail.as_ptr()).next = Some(node),
        }
        self.tail = Some(node);
    }
}

#[cfg(test)]
pub(crate) struct Iter<'a, T> {
    next: Option<NonNull<DeqNode<T>>>,
    marker: PhantomData<&'a DeqNode<T>>,
}

#[cfg(test)]
impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.next.map(|node| unsafe {
            let node = &*node.as_ptr();
            self.next = node.next;
            &node.element
        })
    }
}
