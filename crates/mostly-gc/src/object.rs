//! Object header words and the forwarding encoding.
//!
//! Every heap object is one header word followed by its user words. The
//! header's low bit doubles as the liveness flag: while it is set, the word
//! encodes the object's size and leading pointer count; once the object has
//! been copied, the whole word is overwritten with the (word-aligned, so
//! even) address of the copy.

/// Size of a heap word in bytes.
pub const WORD_BYTES: usize = std::mem::size_of::<usize>();

const LIVE_BIT: usize = 1;
const WORDS_SHIFT: u32 = 1;

#[cfg(target_pointer_width = "64")]
const WORDS_BITS: u32 = 31;
#[cfg(target_pointer_width = "64")]
const PTRS_BITS: u32 = 31;

#[cfg(target_pointer_width = "32")]
const WORDS_BITS: u32 = 16;
#[cfg(target_pointer_width = "32")]
const PTRS_BITS: u32 = 15;

const PTRS_SHIFT: u32 = WORDS_SHIFT + WORDS_BITS;
const WORDS_MASK: usize = (1 << WORDS_BITS) - 1;
const PTRS_MASK: usize = (1 << PTRS_BITS) - 1;

/// Largest encodable object size, in words, header included.
pub const MAX_OBJECT_WORDS: usize = WORDS_MASK;

/// Decoded live header of an object (or of a page-tail filler).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Object size in words, including the header word itself.
    pub words: usize,
    /// Number of leading pointer-typed words in the user area.
    pub ptrs: usize,
}

impl ObjectHeader {
    /// Builds a header for an object of `words` total words whose first
    /// `ptrs` user words hold managed pointers.
    #[must_use]
    pub const fn new(words: usize, ptrs: usize) -> Self {
        Self { words, ptrs }
    }

    /// Builds a filler header covering `words` words of dead page tail.
    #[must_use]
    pub const fn filler(words: usize) -> Self {
        Self { words, ptrs: 0 }
    }

    /// Encodes the header into its in-heap word form.
    #[must_use]
    pub fn encode(self) -> usize {
        debug_assert!(self.words <= MAX_OBJECT_WORDS, "object size overflows header");
        debug_assert!(self.ptrs <= PTRS_MASK, "pointer count overflows header");
        debug_assert!(self.ptrs < self.words, "pointer count exceeds user words");
        LIVE_BIT | (self.words << WORDS_SHIFT) | (self.ptrs << PTRS_SHIFT)
    }
}

/// A raw header word, decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderWord {
    /// The object is live at its current address.
    Live(ObjectHeader),
    /// The object has been copied; the word holds its new address.
    Forward(*mut usize),
}

impl HeaderWord {
    /// Decodes a raw in-heap header word.
    #[must_use]
    pub fn decode(raw: usize) -> Self {
        if raw & LIVE_BIT == 0 {
            Self::Forward(raw as *mut usize)
        } else {
            Self::Live(ObjectHeader {
                words: (raw >> WORDS_SHIFT) & WORDS_MASK,
                ptrs: (raw >> PTRS_SHIFT) & PTRS_MASK,
            })
        }
    }
}
