//! Recycled cursor state for the binary tokenizer.
//!
//! Every container or annotation sequence the tokenizer steps into needs a
//! small record of its bounds and position. The pool keeps those records in
//! an arena and hands them out by [`CursorId`], with one free list per
//! [`Shape`], so sibling containers reuse the same slots.

/// The kinds of cursor the tokenizer opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    TopLevel,
    Sequence,
    Struct,
    DelimitedSequence,
    DelimitedStruct,
    Annotations,
}

const SHAPES: usize = 6;

impl Shape {
    fn index(self) -> usize {
        match self {
            Shape::TopLevel => 0,
            Shape::Sequence => 1,
            Shape::Struct => 2,
            Shape::DelimitedSequence => 3,
            Shape::DelimitedStruct => 4,
            Shape::Annotations => 5,
        }
    }

    pub fn is_struct(self) -> bool {
        matches!(self, Shape::Struct | Shape::DelimitedStruct)
    }

    pub fn is_delimited(self) -> bool {
        matches!(self, Shape::DelimitedSequence | Shape::DelimitedStruct)
    }
}

/// Handle to a cursor in a [`ReaderPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorId(usize);

/// Bounds and position of one open container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub shape: Shape,
    /// Position of the next unread byte.
    pub pos: usize,
    /// Exclusive end; `None` while a delimited container's end is unknown.
    pub end: Option<usize>,
    /// Struct field names are FlexSyms rather than symbol IDs.
    pub flex_sym: bool,
    /// The container type that was stepped into, if any.
    pub container: Option<crate::IonType>,
}

/// Arena of cursors with a free list per shape.
#[derive(Debug, Default)]
pub struct ReaderPool {
    cursors: Vec<Cursor>,
    in_use: Vec<bool>,
    free: [Vec<CursorId>; SHAPES],
}

impl ReaderPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a cursor of `shape` positioned at `start`, reusing a released
    /// one when available.
    pub fn acquire(
        &mut self,
        shape: Shape,
        container: Option<crate::IonType>,
        start: usize,
        end: Option<usize>,
    ) -> CursorId {
        let cursor = Cursor {
            shape,
            pos: start,
            end,
            flex_sym: shape == Shape::DelimitedStruct,
            container,
        };
        match self.free[shape.index()].pop() {
            Some(id) => {
                self.cursors[id.0] = cursor;
                self.in_use[id.0] = true;
                id
            }
            None => {
                self.cursors.push(cursor);
                self.in_use.push(true);
                tracing::trace!(?shape, size = self.cursors.len(), "cursor pool grows");
                CursorId(self.cursors.len() - 1)
            }
        }
    }

    /// Returns `id` to its shape's free list.
    pub fn release(&mut self, id: CursorId) {
        debug_assert!(self.in_use[id.0], "cursor released twice");
        self.in_use[id.0] = false;
        let shape = self.cursors[id.0].shape;
        self.free[shape.index()].push(id);
    }

    pub fn get(&self, id: CursorId) -> &Cursor {
        &self.cursors[id.0]
    }

    pub fn get_mut(&mut self, id: CursorId) -> &mut Cursor {
        &mut self.cursors[id.0]
    }

    /// Number of cursors ever allocated.
    pub fn allocated(&self) -> usize {
        self.cursors.len()
    }

    /// Number of cursors currently handed out.
    pub fn outstanding(&self) -> usize {
        self.in_use.iter().filter(|used| **used).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn siblings_reuse_slots() {
        let mut pool = ReaderPool::new();
        let a = pool.acquire(Shape::Sequence, None, 0, Some(4));
        pool.release(a);
        let b = pool.acquire(Shape::Sequence, None, 10, Some(12));
        assert_eq!(a, b);
        assert_eq!(pool.get(b).pos, 10);
        assert_eq!(pool.allocated(), 1);
    }

    #[test]
    fn shapes_have_separate_free_lists() {
        let mut pool = ReaderPool::new();
        let seq = pool.acquire(Shape::Sequence, None, 0, None);
        pool.release(seq);
        let strukt = pool.acquire(Shape::DelimitedStruct, None, 0, None);
        assert_ne!(seq, strukt);
        assert!(pool.get(strukt).flex_sym);
        assert_eq!(pool.outstanding(), 1);
    }

    #[test]
    #[should_panic(expected = "cursor released twice")]
    #[cfg(debug_assertions)]
    fn double_release_is_caught() {
        let mut pool = ReaderPool::new();
        let id = pool.acquire(Shape::Annotations, None, 0, Some(1));
        pool.release(id);
        pool.release(id);
    }
}
