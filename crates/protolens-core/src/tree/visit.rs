//! Depth-first traversal of a tag tree.
//!
//! This module provides the [`TagVisitor`] trait for walking a decoded
//! [`Message`] without recursion, plus [`TagStats`], a visitor that
//! summarises a tree.

use super::{EmbeddedMessageTag, Message, RepeatedTag, SingleTag, Tag, TagId, TagKind};
use std::fmt::Result;

/// Callbacks for [`Message::walk`].
///
/// Every method has a no-op default, so implementors only override what
/// they need. `depth` is the number of containers (repeated or embedded)
/// between the top level and the visited tag.
///
/// # Example
///
/// ```
/// use protolens_core::tree::{SingleTag, Tag, TagId, TagVisitor};
///
/// struct Names(Vec<String>);
///
/// impl TagVisitor for Names {
///     fn visit_single(
///         &mut self,
///         _id: TagId,
///         tag: &Tag,
///         _single: &SingleTag,
///         _depth: usize,
///     ) -> std::fmt::Result {
///         self.0.push(tag.name().to_string());
///         Ok(())
///     }
/// }
///
/// let message = protolens_core::parse(vec![0x08, 0x01, 0x10, 0x02]).unwrap();
/// let mut names = Names(Vec::new());
/// message.walk(&mut names).unwrap();
/// assert_eq!(names.0, ["Field1", "Field2"]);
/// ```
pub trait TagVisitor {
    /// Visit a single tag
    fn visit_single(&mut self, id: TagId, tag: &Tag, single: &SingleTag, depth: usize) -> Result {
        let _ = (id, tag, single, depth);
        Ok(())
    }

    /// Called before the items of a repeated tag
    fn enter_repeated(
        &mut self,
        id: TagId,
        tag: &Tag,
        repeated: &RepeatedTag,
        depth: usize,
    ) -> Result {
        let _ = (id, tag, repeated, depth);
        Ok(())
    }

    /// Called after the items of a repeated tag
    fn leave_repeated(&mut self, id: TagId, tag: &Tag, depth: usize) -> Result {
        let _ = (id, tag, depth);
        Ok(())
    }

    /// Called before the children of an embedded message
    fn enter_embedded(
        &mut self,
        id: TagId,
        tag: &Tag,
        embedded: &EmbeddedMessageTag,
        depth: usize,
    ) -> Result {
        let _ = (id, tag, embedded, depth);
        Ok(())
    }

    /// Called after the children of an embedded message
    fn leave_embedded(&mut self, id: TagId, tag: &Tag, depth: usize) -> Result {
        let _ = (id, tag, depth);
        Ok(())
    }
}

enum Step {
    Enter(TagId, usize),
    Leave(TagId, usize),
}

impl Message {
    /// Walks every reachable tag in tree order.
    ///
    /// The walk keeps its own stack, so deeply nested trees do not grow the
    /// call stack. It stops at the first error returned by the visitor.
    pub fn walk<V: TagVisitor + ?Sized>(&self, visitor: &mut V) -> Result {
        let mut stack: Vec<Step> = self
            .roots()
            .iter()
            .rev()
            .map(|&id| Step::Enter(id, 0))
            .collect();

        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(id, depth) => {
                    let Some(tag) = self.tag(id) else {
                        continue;
                    };
                    match &tag.kind {
                        TagKind::Single(single) => visitor.visit_single(id, tag, single, depth)?,
                        TagKind::Repeated(repeated) => {
                            visitor.enter_repeated(id, tag, repeated, depth)?;
                            stack.push(Step::Leave(id, depth));
                            let items = repeated.items.iter().rev();
                            stack.extend(items.map(|&c| Step::Enter(c, depth + 1)));
                        }
                        TagKind::Embedded(embedded) => {
                            visitor.enter_embedded(id, tag, embedded, depth)?;
                            stack.push(Step::Leave(id, depth));
                            let items = embedded.tags.iter().rev();
                            stack.extend(items.map(|&c| Step::Enter(c, depth + 1)));
                        }
                    }
                }
                Step::Leave(id, depth) => {
                    let Some(tag) = self.tag(id) else {
                        continue;
                    };
                    match &tag.kind {
                        TagKind::Repeated(_) => visitor.leave_repeated(id, tag, depth)?,
                        TagKind::Embedded(_) => visitor.leave_embedded(id, tag, depth)?,
                        TagKind::Single(_) => {}
                    }
                }
            }
        }

        Ok(())
    }

    /// Summary statistics for the reachable tree
    pub fn stats(&self) -> TagStats {
        let mut stats = TagStats::default();
        // TagStats never fails
        let _ = self.walk(&mut stats);
        stats
    }
}

/// A visitor that counts the tags of a tree
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TagStats {
    /// Number of single tags
    pub single_count: usize,
    /// Number of repeated groups
    pub repeated_count: usize,
    /// Number of embedded messages
    pub embedded_count: usize,
    /// Single tags that could still be expanded
    pub decodable_count: usize,
    /// Deepest container nesting seen
    pub max_depth: usize,
}

impl TagStats {
    /// Total number of reachable tags
    pub fn total(&self) -> usize {
        self.single_count + self.repeated_count + self.embedded_count
    }
}

impl TagVisitor for TagStats {
    fn visit_single(&mut self, _id: TagId, _tag: &Tag, single: &SingleTag, depth: usize) -> Result {
        self.single_count += 1;
        if single.can_decode {
            self.decodable_count += 1;
        }
        self.max_depth = self.max_depth.max(depth);
        Ok(())
    }

    fn enter_repeated(
        &mut self,
        _id: TagId,
        _tag: &Tag,
        _repeated: &RepeatedTag,
        depth: usize,
    ) -> Result {
        self.repeated_count += 1;
        self.max_depth = self.max_depth.max(depth);
        Ok(())
    }

    fn enter_embedded(
        &mut self,
        _id: TagId,
        _tag: &Tag,
        _embedded: &EmbeddedMessageTag,
        depth: usize,
    ) -> Result {
        self.embedded_count += 1;
        self.max_depth = self.max_depth.max(depth);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    struct Trace(Vec<String>);

    impl TagVisitor for Trace {
        fn visit_single(&mut self, _id: TagId, tag: &Tag, _s: &SingleTag, depth: usize) -> Result {
            self.0.push(format!("{}{}", "  ".repeat(depth), tag.index()));
            Ok(())
        }

        fn enter_repeated(
            &mut self,
            _id: TagId,
            tag: &Tag,
            _r: &RepeatedTag,
            depth: usize,
        ) -> Result {
            self.0.push(format!("{}[{}", "  ".repeat(depth), tag.index()));
            Ok(())
        }

        fn leave_repeated(&mut self, _id: TagId, tag: &Tag, depth: usize) -> Result {
            self.0.push(format!("{}{}]", "  ".repeat(depth), tag.index()));
            Ok(())
        }

        fn enter_embedded(
            &mut self,
            _id: TagId,
            tag: &Tag,
            _e: &EmbeddedMessageTag,
            depth: usize,
        ) -> Result {
            self.0.push(format!("{}{{{}", "  ".repeat(depth), tag.index()));
            Ok(())
        }

        fn leave_embedded(&mut self, _id: TagId, tag: &Tag, depth: usize) -> Result {
            self.0.push(format!("{}{}}}", "  ".repeat(depth), tag.index()));
            Ok(())
        }
    }

    #[test]
    fn test_walk_order() {
        // 1: varint, 2: {1: varint}, 3 twice
        let data = vec![0x08, 0x01, 0x12, 0x02, 0x08, 0x05, 0x18, 0x01, 0x18, 0x02];
        let mut message = parse(data).unwrap();
        message.expand_all();

        let mut trace = Trace(Vec::new());
        message.walk(&mut trace).unwrap();
        assert_eq!(trace.0, ["1", "{2", "  1", "2}", "[3", "  3", "  3", "3]"]);
    }

    #[test]
    fn test_stats() {
        let data = vec![0x08, 0x01, 0x12, 0x02, 0x08, 0x05, 0x18, 0x01, 0x18, 0x02];
        let mut message = parse(data).unwrap();

        let before = message.stats();
        assert_eq!(before.single_count, 4);
        assert_eq!(before.repeated_count, 1);
        assert_eq!(before.decodable_count, 1);
        assert_eq!(before.max_depth, 1);

        message.expand_all();
        let after = message.stats();
        assert_eq!(after.embedded_count, 1);
        assert_eq!(after.decodable_count, 0);
        assert_eq!(after.single_count, 4);
        assert_eq!(after.total(), 6);
    }
}
