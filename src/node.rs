//! The node embedded in every stored record, and the adapter that maps
//! between nodes and their records.
//!
//! ```text
//!                ╭────────────╮
//!                │    node    │
//!            left├────────────┤right
//!  (bit at ╭─────┤ bit_offset ├─────╮ (bit at
//!  offset  │     ╰────────────╯     │  offset
//!  is 0)   ∇                        ∇  is 1)
//! ```
//!
//! A link whose target has a `bit_offset` not greater than the node holding
//! it is a back-edge: it ends a descent instead of continuing it. A node whose
//! two links point to itself is the bottom leaf.

use std::cell::Cell;
use std::fmt;
use std::ptr::NonNull;

use crate::key::GetKey;

pub(crate) type NodePtr = NonNull<TrieNode>;

/// Management fields of a record stored in a [`Trie`](crate::Trie).
///
/// Embed one in the record type and describe its position with a
/// [`NodeAdapter`]. An unlinked node has `bit_offset == 0` and no links.
pub struct TrieNode {
    bit_offset: Cell<usize>,
    left: Cell<Option<NodePtr>>,
    right: Cell<Option<NodePtr>>,
}

impl TrieNode {
    pub const fn new() -> Self {
        Self {
            bit_offset: Cell::new(0),
            left: Cell::new(None),
            right: Cell::new(None),
        }
    }

    /// Whether the node is currently registered with a trie.
    pub fn is_linked(&self) -> bool {
        self.left.get().is_some() || self.right.get().is_some()
    }

    /// Bit of the key tested at this node.
    pub fn bit_offset(&self) -> usize {
        self.bit_offset.get()
    }

    pub(crate) fn set_bit_offset(&self, bit_offset: usize) {
        self.bit_offset.set(bit_offset);
    }

    /// Link followed when the tested bit equals `bit`.
    pub(crate) fn link(&self, bit: bool) -> NodePtr {
        let link = if bit { &self.right } else { &self.left };
        match link.get() {
            Some(target) => target,
            None => unreachable!("unlinked node reachable from a trie root"),
        }
    }

    pub(crate) fn set_link(&self, bit: bool, target: NodePtr) {
        if bit {
            self.right.set(Some(target));
        } else {
            self.left.set(Some(target));
        }
    }

    /// Redirects whichever link points at `old` to `new`.
    pub(crate) fn replace_link(&self, old: NodePtr, new: NodePtr) {
        if self.right.get() == Some(old) {
            self.right.set(Some(new));
        } else {
            debug_assert_eq!(self.left.get(), Some(old));
            self.left.set(Some(new));
        }
    }

    /// The link that does not point at `target`.
    pub(crate) fn other_link(&self, target: NodePtr) -> NodePtr {
        if self.left.get() == Some(target) {
            self.link(true)
        } else {
            self.link(false)
        }
    }

    // Methods taking `me` expect the pointer this node is registered under,
    // which carries the provenance of the whole owning record.

    pub(crate) fn is_bottom_leaf(&self, me: NodePtr) -> bool {
        self.left.get() == Some(me) && self.right.get() == Some(me)
    }

    /// Whether at least one link loops back onto this node.
    pub(crate) fn has_self_loop(&self, me: NodePtr) -> bool {
        self.left.get() == Some(me) || self.right.get() == Some(me)
    }

    /// Turns the node into the bottom leaf: self-looped, no discriminator.
    pub(crate) fn make_bottom_leaf(&self, me: NodePtr) {
        self.bit_offset.set(0);
        self.left.set(Some(me));
        self.right.set(Some(me));
    }

    /// Takes over the structural role of `other`.
    pub(crate) fn copy_from(&self, other: &TrieNode) {
        self.bit_offset.set(other.bit_offset.get());
        self.left.set(other.left.get());
        self.right.set(other.right.get());
    }

    pub(crate) fn unlink(&self) {
        self.bit_offset.set(0);
        self.left.set(None);
        self.right.set(None);
    }

    // Teardown reuses `left` as a link to the structural parent. Only
    // `Trie::remove_all` calls these, on a trie detached from its root.

    pub(crate) fn push_backlink(&self, parent: Option<NodePtr>) {
        self.left.set(parent);
    }

    pub(crate) fn pop_backlink(&self, me: NodePtr) -> Option<NodePtr> {
        self.left.replace(Some(me))
    }

    pub(crate) fn right_points_to(&self, target: NodePtr) -> bool {
        self.right.get() == Some(target)
    }

    pub(crate) fn close_right(&self, me: NodePtr) {
        self.right.set(Some(me));
    }
}

impl Default for TrieNode {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TrieNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrieNode")
            .field("bit_offset", &self.bit_offset.get())
            .field("left", &self.left.get())
            .field("right", &self.right.get())
            .finish()
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// Where the [`TrieNode`] lives inside `T`, and how to read `T`'s key.
///
/// Usually built with [`node_adapter!`](crate::node_adapter).
pub struct NodeAdapter<T> {
    node_offset: usize,
    getkey: GetKey<T>,
}

impl<T> NodeAdapter<T> {
    /// # Safety
    ///
    /// `node_offset` must be the byte offset of a field of type [`TrieNode`]
    /// inside `T`.
    pub const unsafe fn new(node_offset: usize, getkey: GetKey<T>) -> Self {
        Self {
            node_offset,
            getkey,
        }
    }

    pub fn node_offset(&self) -> usize {
        self.node_offset
    }

    pub fn getkey(&self) -> GetKey<T> {
        self.getkey
    }

    /// Pointer to the node embedded in `owner`, derived from the record
    /// pointer so it can be turned back into one.
    pub(crate) fn node_of(&self, owner: &T) -> NodePtr {
        let owner = NonNull::from(owner).cast::<u8>();
        // SAFETY: the constructor guarantees a `TrieNode` at `node_offset`,
        // so the offset stays inside `*owner`.
        unsafe { owner.add(self.node_offset).cast::<TrieNode>() }
    }

    /// # Safety
    ///
    /// `node` must have been obtained from [`node_of`](Self::node_of) on a
    /// record that is still borrowed for `'a`.
    pub(crate) unsafe fn owner_of<'a>(&self, node: NodePtr) -> &'a T {
        // SAFETY: inverse of `node_of`; guaranteed by the caller.
        unsafe { node.cast::<u8>().sub(self.node_offset).cast::<T>().as_ref() }
    }
}

impl<T> Clone for NodeAdapter<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NodeAdapter<T> {}

impl<T> fmt::Debug for NodeAdapter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeAdapter")
            .field("node_offset", &self.node_offset)
            .finish_non_exhaustive()
    }
}

/// Builds a [`NodeAdapter`] for the [`TrieNode`] field `$field` of `$owner`.
///
/// ```rust
/// use intrusive_patricia::{node_adapter, KeyWindow, TrieNode};
///
/// struct Entry {
///     name: String,
///     node: TrieNode,
/// }
///
/// fn entry_key<'k>(entry: &'k Entry, key: &mut KeyWindow<'k>, _offset: usize) {
///     *key = KeyWindow::full(entry.name.as_bytes());
/// }
///
/// let adapter = node_adapter!(Entry, node, entry_key);
/// assert_eq!(adapter.node_offset(), std::mem::offset_of!(Entry, node));
/// ```
#[macro_export]
macro_rules! node_adapter {
    ($owner:ty, $field:ident, $getkey:expr) => {{
        let _: fn(&$owner) -> &$crate::TrieNode = |owner| &owner.$field;
        // SAFETY: the line above checks that `$field` is a `TrieNode`.
        unsafe { $crate::NodeAdapter::<$owner>::new(::core::mem::offset_of!($owner, $field), $getkey) }
    }};
}
