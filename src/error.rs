//! Error types for trie operations.

use std::fmt;

use thiserror::Error;

/// Malformed input, rejected before the trie is touched.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The record's key is longer than the trie accepts.
    #[error("key length {len} exceeds the limit of {max} bytes")]
    KeyTooLong { len: usize, max: usize },

    /// The node is still registered with another trie.
    #[error("node is already linked into another trie")]
    NodeInUse,
}

/// Failure of [`Trie::insert`](crate::Trie::insert).
#[derive(Error)]
pub enum InsertError<'a, T> {
    /// A record with an equal key is already stored; it is returned.
    #[error("a record with an equal key is already stored")]
    AlreadyExists(&'a T),

    #[error(transparent)]
    Invalid(#[from] Error),
}

impl<'a, T> InsertError<'a, T> {
    /// The stored record that collided with the inserted one, if any.
    pub fn into_existing(self) -> Option<&'a T> {
        match self {
            InsertError::AlreadyExists(existing) => Some(existing),
            InsertError::Invalid(_) => None,
        }
    }
}

impl<T> fmt::Debug for InsertError<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertError::AlreadyExists(existing) => f
                .debug_tuple("AlreadyExists")
                .field(&(*existing as *const T))
                .finish(),
            InsertError::Invalid(err) => f.debug_tuple("Invalid").field(err).finish(),
        }
    }
}
