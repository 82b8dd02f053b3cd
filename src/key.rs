//! Streamed binary keys.
//!
//! A record never hands its whole key to the trie. Instead its accessor
//! ([`GetKey`]) fills a [`KeyWindow`] describing one contiguous slice of the
//! key, and the trie asks for the next slice once it has consumed the current
//! one. Bits are counted from the most significant bit of the first byte.
//!
//! Every key is virtually extended by one `0xFF` byte followed by an unbounded
//! run of `0x00` bytes. This makes any two distinct keys differ in some bit,
//! including pairs where one key is a proper prefix of the other.

/// Byte value of the virtual end marker following every key.
const END_MARKER: u8 = 0xFF;

/// Produces the window of `owner`'s key that covers `offset`.
///
/// `offset == 0` (re)initialises the window through [`KeyWindow::start`].
/// Any other call passes the current [`KeyWindow::end_offset`] and expects
/// the window that begins exactly there, set through [`KeyWindow::advance`].
/// The trie never asks for an offset at or beyond the key's stream size
/// unless it is `0`.
pub type GetKey<T> = for<'k> fn(owner: &'k T, key: &mut KeyWindow<'k>, offset: usize);

/// One contiguous slice `[offset, end_offset)` of a key of `stream_size` bytes.
#[derive(Debug, Clone, Copy)]
pub struct KeyWindow<'k> {
    bytes: &'k [u8],
    offset: usize,
    stream_size: usize,
    state: usize,
}

impl<'k> KeyWindow<'k> {
    /// Window covering a whole key held in one slice.
    pub const fn full(bytes: &'k [u8]) -> Self {
        Self {
            bytes,
            offset: 0,
            stream_size: bytes.len(),
            state: 0,
        }
    }

    /// Empty window, filled by the first accessor call.
    pub const fn empty() -> Self {
        Self::full(&[])
    }

    /// Initialises the window to the first slice of a key of `stream_size` bytes.
    pub fn start(&mut self, stream_size: usize, bytes: &'k [u8]) {
        debug_assert!(bytes.len() <= stream_size);
        self.bytes = bytes;
        self.offset = 0;
        self.stream_size = stream_size;
    }

    /// Moves the window to the slice beginning at `offset`.
    pub fn advance(&mut self, offset: usize, bytes: &'k [u8]) {
        debug_assert!(offset + bytes.len() <= self.stream_size);
        self.bytes = bytes;
        self.offset = offset;
    }

    pub fn bytes(&self) -> &'k [u8] {
        self.bytes
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn end_offset(&self) -> usize {
        self.offset + self.bytes.len()
    }

    pub fn stream_size(&self) -> usize {
        self.stream_size
    }

    /// Opaque word reserved for the accessor (e.g. a chunk index).
    pub fn state(&self) -> usize {
        self.state
    }

    pub fn set_state(&mut self, state: usize) {
        self.state = state;
    }
}

// =============================================================================
// Cursor
// =============================================================================

/// Reads bytes and bits of one key, fetching windows on demand.
pub(crate) struct KeyCursor<'k, T> {
    window: KeyWindow<'k>,
    source: Option<(&'k T, GetKey<T>)>,
}

impl<'k, T> KeyCursor<'k, T> {
    /// Cursor over a probe key supplied as one slice.
    pub(crate) fn probe(bytes: &'k [u8]) -> Self {
        Self {
            window: KeyWindow::full(bytes),
            source: None,
        }
    }

    /// Cursor over the key of a stored record.
    pub(crate) fn stored(owner: &'k T, getkey: GetKey<T>) -> Self {
        let mut window = KeyWindow::empty();
        getkey(owner, &mut window, 0);
        Self {
            window,
            source: Some((owner, getkey)),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.window.stream_size
    }

    /// Byte at `offset` of the sentinel-extended key.
    pub(crate) fn byte(&mut self, offset: usize) -> u8 {
        let size = self.window.stream_size;
        if offset >= size {
            return if offset == size { END_MARKER } else { 0 };
        }
        self.seek(offset);
        self.window.bytes[offset - self.window.offset]
    }

    /// Bit at `bit_offset` of the sentinel-extended key.
    pub(crate) fn bit(&mut self, bit_offset: usize) -> bool {
        let mask = 0x80u8 >> (bit_offset % 8);
        self.byte(bit_offset / 8) & mask != 0
    }

    /// Whole-key equality with a contiguous probe key.
    pub(crate) fn matches(&mut self, probe: &[u8]) -> bool {
        self.len() == probe.len() && self.starts_with(probe)
    }

    /// Whether the sentinel-extended key begins with `prefix`.
    pub(crate) fn agrees_with(&mut self, prefix: &[u8]) -> bool {
        prefix
            .iter()
            .enumerate()
            .all(|(offset, &b)| self.byte(offset) == b)
    }

    pub(crate) fn starts_with(&mut self, prefix: &[u8]) -> bool {
        if self.len() < prefix.len() {
            return false;
        }
        let mut offset = 0;
        while offset < prefix.len() {
            self.seek(offset);
            let chunk = &self.window.bytes[offset - self.window.offset..];
            let chunk = &chunk[..chunk.len().min(prefix.len() - offset)];
            if chunk != &prefix[offset..offset + chunk.len()] {
                return false;
            }
            offset += chunk.len();
        }
        true
    }

    /// Makes the window cover `offset` (which must be inside the key).
    fn seek(&mut self, offset: usize) {
        let Some((owner, getkey)) = self.source else {
            return;
        };
        if offset < self.window.offset {
            getkey(owner, &mut self.window, 0);
        }
        while offset >= self.window.end_offset() {
            let end = self.window.end_offset();
            getkey(owner, &mut self.window, end);
            assert!(
                self.window.offset == end && self.window.end_offset() > end,
                "key accessor returned a window that does not start at offset {end}"
            );
        }
    }
}

/// First bit in which the sentinel-extended keys `a` and `b` differ, together
/// with `b`'s value of that bit. `None` if both keys are equal.
pub(crate) fn first_differing_bit<A, B>(
    a: &mut KeyCursor<'_, A>,
    b: &mut KeyCursor<'_, B>,
) -> Option<(usize, bool)> {
    // Beyond the longer key's end marker both keys read as zeros.
    let last = a.len().max(b.len());
    for offset in 0..=last {
        let (x, y) = (a.byte(offset), b.byte(offset));
        let diff = x ^ y;
        if diff != 0 {
            let bit = diff.leading_zeros() as usize;
            return Some((offset * 8 + bit, y & (0x80 >> bit) != 0));
        }
    }
    None
}
