//! Ordered traversal.
//!
//! Iterators hold the record they will yield next and find its neighbour by
//! searching the trie again, so they carry no stack and work on a trie of
//! any depth.

use std::iter::FusedIterator;

use crate::node::NodePtr;
use crate::Trie;

/// Records in key order, created by [`Trie::iter`] and [`Trie::iter_rev`].
pub struct Iter<'t, 'a, T> {
    trie: &'t Trie<'a, T>,
    next: Option<NodePtr>,
    ascending: bool,
}

impl<'t, 'a, T> Iter<'t, 'a, T> {
    pub(crate) fn new(trie: &'t Trie<'a, T>, next: Option<NodePtr>, ascending: bool) -> Self {
        Self {
            trie,
            next,
            ascending,
        }
    }

    /// Yields the pending record like [`next`](Iterator::next), but then
    /// moves against the iteration direction.
    pub fn prev(&mut self) -> Option<&'a T> {
        self.advance(!self.ascending)
    }

    /// The record the next call will yield, without moving.
    pub fn peek(&self) -> Option<&'a T> {
        self.next.map(|node| self.trie.owner(node))
    }

    fn advance(&mut self, right: bool) -> Option<&'a T> {
        let current = self.next?;
        self.next = self.trie.step(current, right, 0);
        Some(self.trie.owner(current))
    }
}

impl<'a, T> Iterator for Iter<'_, 'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance(self.ascending)
    }
}

impl<T> FusedIterator for Iter<'_, '_, T> {}

/// Records whose key starts with a prefix, in ascending order. Created by
/// [`Trie::iter_prefix`].
pub struct PrefixIter<'t, 'a, T> {
    trie: &'t Trie<'a, T>,
    next: Option<NodePtr>,
    prefix_len: usize,
}

impl<'t, 'a, T> PrefixIter<'t, 'a, T> {
    pub(crate) fn new(trie: &'t Trie<'a, T>, next: Option<NodePtr>, prefix_len: usize) -> Self {
        Self {
            trie,
            next,
            prefix_len,
        }
    }
}

impl<'a, T> Iterator for PrefixIter<'_, 'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        // Every key in range agrees with the prefix on its first
        // `prefix_len` bytes once extended; shorter keys only match there
        // through their end marker.
        while let Some(current) = self.next {
            self.next = self.trie.step(current, true, self.prefix_len * 8);
            if self.trie.key_len(current) >= self.prefix_len {
                return Some(self.trie.owner(current));
            }
        }
        None
    }
}

impl<T> FusedIterator for PrefixIter<'_, '_, T> {}
