//! # intrusive-patricia
//!
//! A Patricia trie (crit-bit tree) over records owned by the caller.
//!
//! Every record embeds a [`TrieNode`]. The trie never allocates: inserting
//! links the embedded node into the tree, removing unlinks it and hands the
//! record back. Keys are arbitrary byte strings read through a streamed
//! accessor ([`GetKey`]), so a record may keep its key in pieces.
//!
//! Nodes store only the bit offset at which they discriminate. There are no
//! separate leaf objects and no null links: a link pointing to a node with a
//! bit offset not greater than the current one ends the descent, and the node
//! it reaches is the only candidate for the searched key.
//!
//! ## Ordering
//!
//! Every key is compared as if followed by a `0xFF` byte and then zeros. For
//! prefix-free key sets (fixed-length keys, NUL-terminated strings) ascending
//! order is plain lexicographic order. A key that is a proper prefix of
//! another sorts after it, unless the longer key continues with `0xFF`.
//!
//! ## Example
//!
//! ```rust
//! use intrusive_patricia::{node_adapter, KeyWindow, Trie, TrieNode};
//!
//! struct Word {
//!     text: &'static str,
//!     node: TrieNode,
//! }
//!
//! fn word_key<'k>(word: &'k Word, key: &mut KeyWindow<'k>, _offset: usize) {
//!     *key = KeyWindow::full(word.text.as_bytes());
//! }
//!
//! let words: Vec<Word> = ["pear", "apple", "plum"]
//!     .into_iter()
//!     .map(|text| Word { text, node: TrieNode::new() })
//!     .collect();
//!
//! let mut trie = Trie::new(node_adapter!(Word, node, word_key));
//! for word in &words {
//!     trie.insert(word).unwrap();
//! }
//!
//! assert_eq!(trie.find(b"plum").map(|w| w.text), Some("plum"));
//! let sorted: Vec<_> = trie.iter().map(|w| w.text).collect();
//! assert_eq!(sorted, ["apple", "pear", "plum"]);
//!
//! let removed = trie.remove(b"pear").unwrap();
//! assert!(std::ptr::eq(removed, &words[0]));
//! assert!(!removed.node.is_linked());
//! ```

#![deny(unsafe_op_in_unsafe_fn)]

mod error;
mod iter;
mod key;
mod node;

pub use error::{Error, InsertError};
pub use iter::{Iter, PrefixIter};
pub use key::{GetKey, KeyWindow};
pub use node::{NodeAdapter, TrieNode};

use std::convert::Infallible;
use std::fmt;
use std::marker::PhantomData;

use tracing::{debug, trace};

use key::{first_differing_bit, KeyCursor};
use node::NodePtr;

// =============================================================================
// Configuration
// =============================================================================

/// Longest key whose end marker still has an addressable bit offset.
pub const MAX_KEY_LEN: usize = usize::MAX / 8 - 1;

/// Limits applied by a [`Trie`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Longest key accepted by [`Trie::insert`], in bytes.
    pub max_key_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_key_len: MAX_KEY_LEN,
        }
    }
}

// =============================================================================
// Trie
// =============================================================================

/// Patricia trie over records of type `T` borrowed for `'a`.
///
/// Records must outlive the trie and stay in place while they are linked,
/// which the borrow enforces. Mutation needs `&mut self`; lookups and
/// iteration only `&self`.
pub struct Trie<'a, T> {
    root: Option<NodePtr>,
    adapter: NodeAdapter<T>,
    config: Config,
    len: usize,
    _records: PhantomData<&'a T>,
}

impl<'a, T> Trie<'a, T> {
    pub fn new(adapter: NodeAdapter<T>) -> Self {
        Self::with_config(adapter, Config::default())
    }

    pub fn with_config(adapter: NodeAdapter<T>, mut config: Config) -> Self {
        config.max_key_len = config.max_key_len.min(MAX_KEY_LEN);
        Self {
            root: None,
            adapter,
            config,
            len: 0,
            _records: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn adapter(&self) -> &NodeAdapter<T> {
        &self.adapter
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub(crate) fn node(&self, ptr: NodePtr) -> &'a TrieNode {
        // SAFETY: every pointer the trie handles was produced by `node_of` on
        // a record borrowed for `'a`.
        unsafe { ptr.as_ref() }
    }

    #[inline]
    pub(crate) fn owner(&self, ptr: NodePtr) -> &'a T {
        // SAFETY: as in `node`.
        unsafe { self.adapter.owner_of(ptr) }
    }

    fn cursor(&self, ptr: NodePtr) -> KeyCursor<'a, T> {
        KeyCursor::stored(self.owner(ptr), self.adapter.getkey())
    }

    /// A link from `from` to `to` ends the descent instead of going deeper.
    #[inline]
    pub(crate) fn is_back_edge(&self, from: NodePtr, to: NodePtr) -> bool {
        self.node(to).bit_offset() <= self.node(from).bit_offset()
    }

    /// Follows `key` from `root` until a back-edge; returns the node holding
    /// that back-edge and its target, the candidate for `key`.
    fn descend(&self, root: NodePtr, key: &mut KeyCursor<'_, T>) -> (NodePtr, NodePtr) {
        let mut node = root;
        loop {
            let parent = node;
            let p = self.node(parent);
            node = p.link(key.bit(p.bit_offset()));
            if self.is_back_edge(parent, node) {
                return (parent, node);
            }
        }
    }

    /// The node whose link along `key` points at `target`, `None` for the root.
    fn parent_of(
        &self,
        root: NodePtr,
        target: NodePtr,
        key: &mut KeyCursor<'_, T>,
    ) -> Option<NodePtr> {
        if root == target {
            return None;
        }
        let mut node = root;
        loop {
            let n = self.node(node);
            let next = n.link(key.bit(n.bit_offset()));
            if next == target {
                return Some(node);
            }
            node = next;
        }
    }

    fn replace_child(&mut self, parent: Option<NodePtr>, old: NodePtr, new: NodePtr) {
        match parent {
            Some(parent) => self.node(parent).replace_link(old, new),
            None => {
                debug_assert_eq!(self.root, Some(old));
                self.root = Some(new);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Search
    // -------------------------------------------------------------------------

    /// The record whose key equals `key`.
    pub fn find(&self, key: &[u8]) -> Option<&'a T> {
        let root = self.root?;
        if key.len() > self.config.max_key_len {
            return None;
        }
        let (_, candidate) = self.descend(root, &mut KeyCursor::probe(key));
        let owner = self.owner(candidate);
        self.cursor(candidate).matches(key).then_some(owner)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.find(key).is_some()
    }

    // -------------------------------------------------------------------------
    // Insert
    // -------------------------------------------------------------------------

    /// Links `owner` into the trie.
    ///
    /// Fails with [`InsertError::AlreadyExists`] if a record with an equal key
    /// (or `owner` itself) is stored, and with [`InsertError::Invalid`] if the
    /// key is too long or the node is linked into another trie. The trie is
    /// unchanged on failure.
    pub fn insert(&mut self, owner: &'a T) -> Result<(), InsertError<'a, T>> {
        let new = self.adapter.node_of(owner);
        let new_node = self.node(new);
        let mut key = KeyCursor::stored(owner, self.adapter.getkey());

        if key.len() > self.config.max_key_len {
            debug!(
                len = key.len(),
                max = self.config.max_key_len,
                "rejected insert: key too long"
            );
            return Err(Error::KeyTooLong {
                len: key.len(),
                max: self.config.max_key_len,
            }
            .into());
        }

        let Some(root) = self.root else {
            if new_node.is_linked() {
                debug!("rejected insert: node linked elsewhere");
                return Err(Error::NodeInUse.into());
            }
            new_node.make_bottom_leaf(new);
            self.root = Some(new);
            self.len = 1;
            return Ok(());
        };

        let (parent, candidate) = self.descend(root, &mut key);
        if candidate == new {
            return Err(InsertError::AlreadyExists(owner));
        }
        if new_node.is_linked() {
            debug!("rejected insert: node linked elsewhere");
            return Err(Error::NodeInUse.into());
        }

        let Some((bit_offset, bit)) = first_differing_bit(&mut self.cursor(candidate), &mut key)
        else {
            return Err(InsertError::AlreadyExists(self.owner(candidate)));
        };

        // The new discriminator may belong above the node where the search
        // stopped; find the first node on the path testing a later bit.
        let (splice_parent, target) = if bit_offset < self.node(parent).bit_offset() {
            let mut splice_parent = None;
            let mut node = root;
            while self.node(node).bit_offset() < bit_offset {
                splice_parent = Some(node);
                let n = self.node(node);
                node = n.link(key.bit(n.bit_offset()));
            }
            (splice_parent, node)
        } else {
            (Some(parent), candidate)
        };

        let t = self.node(target);
        if t.is_bottom_leaf(target) {
            // The bottom leaf starts discriminating and the new node takes
            // its place at the bottom.
            new_node.make_bottom_leaf(new);
            t.set_bit_offset(bit_offset);
            t.set_link(bit, new);
            trace!(bit_offset, "insert: split bottom leaf");
        } else {
            new_node.set_bit_offset(bit_offset);
            new_node.set_link(bit, new);
            new_node.set_link(!bit, target);
            self.replace_child(splice_parent, target, new);
            trace!(bit_offset, "insert: spliced above target");
        }

        self.len += 1;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Remove
    // -------------------------------------------------------------------------

    /// Unlinks and returns the record whose key equals `key`.
    ///
    /// The returned record is always the one whose key matched, even when a
    /// different node takes over its position in the tree.
    pub fn remove(&mut self, key: &[u8]) -> Option<&'a T> {
        let root = self.root?;
        if key.len() > self.config.max_key_len {
            return None;
        }
        let mut probe = KeyCursor::probe(key);
        let (parent, found) = self.descend(root, &mut probe);
        if !self.cursor(found).matches(key) {
            return None;
        }

        let n = self.node(found);
        let p = self.node(parent);
        // (node losing its position, node taking it over)
        let relink = if n.is_bottom_leaf(found) {
            if found == parent {
                trace!("remove: last node");
                self.root = None;
                None
            } else if p.has_self_loop(parent) {
                trace!("remove: parent becomes bottom leaf");
                p.make_bottom_leaf(parent);
                None
            } else {
                trace!("remove: sibling replaces parent");
                let sibling = p.other_link(found);
                p.make_bottom_leaf(parent);
                Some((parent, sibling))
            }
        } else if n.has_self_loop(found) {
            debug_assert_eq!(parent, found);
            trace!("remove: single child replaces node");
            Some((found, n.other_link(found)))
        } else {
            trace!("remove: back-edge holder replaces node");
            self.swap_roles(found, parent, &mut probe);
            Some((found, parent))
        };

        if let Some((replaced, replacement)) = relink {
            let above = self.parent_of(root, replaced, &mut probe);
            self.replace_child(above, replaced, replacement);
        }

        n.unlink();
        self.len -= 1;
        Some(self.owner(found))
    }

    /// Moves `heir`, the node holding `removed`'s back-edge, out of its
    /// position and makes it a copy of `removed`. Only the link above
    /// `removed` still needs redirecting afterwards.
    fn swap_roles(&self, removed: NodePtr, heir: NodePtr, key: &mut KeyCursor<'_, T>) {
        let mut holder = removed;
        loop {
            let h = self.node(holder);
            let next = h.link(key.bit(h.bit_offset()));
            if next == heir {
                break;
            }
            holder = next;
        }
        let heir_node = self.node(heir);
        self.node(holder)
            .replace_link(heir, heir_node.other_link(removed));
        heir_node.copy_from(self.node(removed));
    }

    // -------------------------------------------------------------------------
    // Teardown
    // -------------------------------------------------------------------------

    /// Unlinks every record, calling `on_delete` for each.
    ///
    /// Runs in O(n) time without recursion or auxiliary storage. Every node
    /// is processed even if `on_delete` fails; the first error is returned.
    pub fn remove_all<E, F>(&mut self, mut on_delete: F) -> Result<(), E>
    where
        F: FnMut(&'a T) -> Result<(), E>,
    {
        let Some(mut node) = self.root.take() else {
            return Ok(());
        };
        let count = std::mem::take(&mut self.len);
        let mut parent: Option<NodePtr> = None;
        let mut first_err = None;

        // On the way down `left` holds the structural parent. On the way up
        // an explored link is closed into a self-loop.
        loop {
            let n = self.node(node);
            if let Some(child) = self.subtree(node, false).or_else(|| self.subtree(node, true)) {
                n.push_backlink(parent);
                parent = Some(node);
                node = child;
                continue;
            }

            n.unlink();
            if let Err(err) = on_delete(self.owner(node)) {
                first_err.get_or_insert(err);
            }

            let Some(up) = parent else {
                break;
            };
            let u = self.node(up);
            if u.right_points_to(node) {
                u.close_right(up);
            }
            parent = u.pop_backlink(up);
            node = up;
        }

        debug!(
            nodes = count,
            failed = first_err.is_some(),
            "released all nodes"
        );
        first_err.map_or(Ok(()), Err)
    }

    /// Unlinks every record.
    pub fn clear(&mut self) {
        if let Err(never) = self.remove_all(|_| Ok::<(), Infallible>(())) {
            match never {}
        }
    }

    /// The structural child behind `node`'s `bit` link during teardown.
    fn subtree(&self, node: NodePtr, bit: bool) -> Option<NodePtr> {
        let n = self.node(node);
        let target = n.link(bit);
        let t = self.node(target);
        let deeper = t.bit_offset() > n.bit_offset();
        (deeper || (target != node && t.is_bottom_leaf(target))).then_some(target)
    }

    // -------------------------------------------------------------------------
    // Iteration
    // -------------------------------------------------------------------------

    /// Records in ascending key order.
    pub fn iter(&self) -> Iter<'_, 'a, T> {
        Iter::new(self, self.edge(false), true)
    }

    /// Records in descending key order.
    pub fn iter_rev(&self) -> Iter<'_, 'a, T> {
        Iter::new(self, self.edge(true), false)
    }

    /// Records whose key starts with `prefix`, in ascending order.
    pub fn iter_prefix(&self, prefix: &[u8]) -> PrefixIter<'_, 'a, T> {
        PrefixIter::new(self, self.prefix_start(prefix), prefix.len())
    }

    /// Smallest (`right == false`) or largest record.
    fn edge(&self, right: bool) -> Option<NodePtr> {
        self.root.map(|root| self.walk(root, right, right))
    }

    /// Follows `first` out of `from`, then `then` until a back-edge.
    fn walk(&self, from: NodePtr, first: bool, then: bool) -> NodePtr {
        let mut parent = from;
        let mut node = self.node(from).link(first);
        while !self.is_back_edge(parent, node) {
            parent = node;
            node = self.node(node).link(then);
        }
        node
    }

    /// Neighbour of `from` in direction `right`. Stops when the nearest turn
    /// point discriminates below `min_bit`.
    pub(crate) fn step(&self, from: NodePtr, right: bool, min_bit: usize) -> Option<NodePtr> {
        let root = self.root?;
        if self.node(root).is_bottom_leaf(root) {
            return None;
        }
        let mut key = self.cursor(from);
        let mut node = root;
        let mut turn = None;
        loop {
            let parent = node;
            let p = self.node(parent);
            let bit = key.bit(p.bit_offset());
            if bit != right {
                turn = Some(parent);
            }
            node = p.link(bit);
            if self.is_back_edge(parent, node) {
                break;
            }
        }
        let turn = turn?;
        if self.node(turn).bit_offset() < min_bit {
            return None;
        }
        Some(self.walk(turn, right, !right))
    }

    /// Smallest record whose sentinel-extended key begins with `prefix`.
    /// Keys shorter than `prefix` can qualify; [`PrefixIter`] skips them.
    fn prefix_start(&self, prefix: &[u8]) -> Option<NodePtr> {
        let root = self.root?;
        if prefix.len() > self.config.max_key_len {
            return None;
        }
        let prefix_bits = prefix.len() * 8;
        let mut key = KeyCursor::<T>::probe(prefix);

        // Descend while the prefix decides the way, then take the leftmost path.
        let mut parent = root;
        let mut node;
        if self.node(root).bit_offset() < prefix_bits {
            node = root;
            loop {
                parent = node;
                let p = self.node(parent);
                node = p.link(key.bit(p.bit_offset()));
                if self.is_back_edge(parent, node) || self.node(node).bit_offset() >= prefix_bits {
                    break;
                }
            }
        } else {
            node = self.node(root).link(false);
        }
        while !self.is_back_edge(parent, node) {
            parent = node;
            node = self.node(node).link(false);
        }

        self.cursor(node).agrees_with(prefix).then_some(node)
    }

    pub(crate) fn key_len(&self, ptr: NodePtr) -> usize {
        self.cursor(ptr).len()
    }
}

impl<T> Drop for Trie<'_, T> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: fmt::Debug> fmt::Debug for Trie<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'t, 'a, T> IntoIterator for &'t Trie<'a, T> {
    type Item = &'a T;
    type IntoIter = Iter<'t, 'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}


#[cfg(test)]
mod proptests;
