//! Per-page metadata: space tags, page types, and the promotion queue.
//!
//! The directory is three parallel arrays indexed by heap-relative page
//! index. The queue threads promoted pages through the link array so the
//! sweep can drain them in FIFO order without extra allocation.

/// Identifies which collection epoch owns a page.
///
/// Tags live in 15 bits; tag 0 is reserved to mean "free" and is skipped
/// when the tag counter wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceTag(u16);

const TAG_MASK: u16 = 0x7fff;

impl SpaceTag {
    /// The tag carried by pages that belong to no collection.
    pub const FREE: Self = Self(0);

    /// The tag of the first collection epoch after heap construction.
    #[must_use]
    pub const fn first() -> Self {
        Self(1)
    }

    /// The tag of the following epoch, wrapping within 15 bits and
    /// skipping the reserved free tag.
    #[must_use]
    pub const fn advance(self) -> Self {
        let next = (self.0 + 1) & TAG_MASK;
        if next == 0 {
            Self(1)
        } else {
            Self(next)
        }
    }
}

/// Whether a page starts with an object header or continues one from an
/// earlier page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    /// The page's first word is an object (or filler) header.
    Object,
    /// The page is the middle or tail of a multi-page object.
    Continued,
}

/// Parallel per-page metadata arrays plus the promotion queue endpoints.
pub struct PageDirectory {
    space: Vec<SpaceTag>,
    ptype: Vec<PageType>,
    link: Vec<Option<usize>>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl PageDirectory {
    /// Creates a directory for `pages` pages, all free.
    #[must_use]
    pub fn new(pages: usize) -> Self {
        Self {
            space: vec![SpaceTag::FREE; pages],
            ptype: vec![PageType::Object; pages],
            link: vec![None; pages],
            head: None,
            tail: None,
        }
    }

    /// Reads a page's space tag.
    #[must_use]
    pub fn space(&self, page: usize) -> SpaceTag {
        self.space[page]
    }

    /// Writes a page's space tag.
    pub fn set_space(&mut self, page: usize, tag: SpaceTag) {
        self.space[page] = tag;
    }

    /// Reads a page's type.
    #[must_use]
    pub fn ptype(&self, page: usize) -> PageType {
        self.ptype[page]
    }

    /// Writes a page's type.
    pub fn set_ptype(&mut self, page: usize, ptype: PageType) {
        self.ptype[page] = ptype;
    }

    /// Appends a page to the promotion queue.
    ///
    /// A page must not be enqueued while it is already on the queue; the
    /// orchestrator guarantees this by enqueuing only on the one
    /// current-to-next retagging of each page per collection.
    pub fn enqueue(&mut self, page: usize) {
        debug_assert!(
            self.link[page].is_none() && self.head != Some(page) && self.tail != Some(page),
            "page {page} enqueued twice"
        );
        match self.tail {
            Some(tail) => self.link[tail] = Some(page),
            None => self.head = Some(page),
        }
        self.tail = Some(page);
    }

    /// Pops the queue's head page, if any.
    pub fn dequeue_head(&mut self) -> Option<usize> {
        let page = self.head?;
        self.head = self.link[page].take();
        if self.head.is_none() {
            self.tail = None;
        }
        Some(page)
    }

    /// True when no pages are queued.
    #[must_use]
    pub fn queue_is_empty(&self) -> bool {
        self.head.is_none()
    }
}
