//! Tree assembly and in-place rewriting.

use super::{ByteSpan, EmbeddedMessageTag, RepeatedTag, SingleTag, Tag, TagId, TagKind};
use crate::error::{Error, Result};
use crate::infer;
use crate::wire::{self, RawField, WireValue};
use crate::DecodeResult;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, trace};

/// A decoded top-level message.
///
/// The message owns every tag. Tags replaced by on-demand decode stay in the
/// arena as detached nodes so that ids handed out earlier remain readable,
/// but they are no longer reachable from [`roots`](Self::roots).
#[derive(Debug, Clone)]
pub struct Message {
    data: Bytes,
    tags: Vec<Tag>,
    roots: Vec<TagId>,
    max_depth: usize,
}

impl Message {
    /// Builds the tree for an already validated field list
    pub(crate) fn from_fields(data: Bytes, fields: Vec<RawField>, max_depth: usize) -> Self {
        let mut message = Self {
            data,
            tags: Vec::new(),
            roots: Vec::new(),
            max_depth,
        };
        message.roots = message.assemble(fields, None);
        message
    }

    /// The input buffer the message was decoded from
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Top-level tags in wire order
    pub fn roots(&self) -> &[TagId] {
        &self.roots
    }

    /// Number of top-level tags
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// True if the input held no fields
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Maximum embedded-message nesting allowed by on-demand decode
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Looks up a tag
    pub fn tag(&self, id: TagId) -> Option<&Tag> {
        self.tags.get(id.0)
    }

    /// Looks up a tag, failing with [`Error::UnknownTag`]
    pub fn get(&self, id: TagId) -> Result<&Tag> {
        self.tag(id).ok_or(Error::UnknownTag(id))
    }

    fn get_mut(&mut self, id: TagId) -> Result<&mut Tag> {
        self.tags.get_mut(id.0).ok_or(Error::UnknownTag(id))
    }

    /// Children of a container, or the top-level tags for `None`
    pub fn children(&self, container: Option<TagId>) -> Result<&[TagId]> {
        match container {
            None => Ok(&self.roots),
            Some(id) => Ok(self.get(id)?.children()),
        }
    }

    /// Iterates over the top-level tags
    pub fn iter(&self) -> impl Iterator<Item = (TagId, &Tag)> + '_ {
        self.roots.iter().map(move |&id| (id, &self.tags[id.0]))
    }

    fn alloc(&mut self, tag: Tag) -> TagId {
        let id = TagId(self.tags.len());
        self.tags.push(tag);
        id
    }

    /// Turns one level of fields into tags, grouping repeated field numbers.
    ///
    /// A field number seen more than once becomes a repeated tag at the
    /// position of its first occurrence, holding every occurrence in order.
    fn assemble(&mut self, fields: Vec<RawField>, parent: Option<TagId>) -> Vec<TagId> {
        let mut counts: HashMap<u32, usize> = HashMap::new();
        for field in &fields {
            *counts.entry(field.number).or_default() += 1;
        }

        let mut level = Vec::new();
        let mut groups: HashMap<u32, TagId> = HashMap::new();

        for field in fields {
            let number = field.number;
            if counts[&number] == 1 {
                let id = self.alloc_single(field, parent);
                level.push(id);
                continue;
            }

            let group = match groups.get(&number) {
                Some(&group) => group,
                None => {
                    let group = self.alloc(Tag {
                        index: number,
                        name: default_name(number),
                        is_optional: false,
                        parent,
                        detached: false,
                        kind: TagKind::Repeated(RepeatedTag::default()),
                    });
                    groups.insert(number, group);
                    level.push(group);
                    group
                }
            };

            let item = self.alloc_single(field, Some(group));
            if let TagKind::Repeated(repeated) = &mut self.tags[group.0].kind {
                repeated.items.push(item);
            }
        }

        trace!(
            "Assembled {} tags ({} repeated groups)",
            level.len(),
            groups.len()
        );
        level
    }

    fn alloc_single(&mut self, field: RawField, parent: Option<TagId>) -> TagId {
        let can_decode = match &field.value {
            WireValue::LengthDelimited(payload) => infer::can_decode(payload),
            _ => false,
        };

        self.alloc(Tag {
            index: field.number,
            name: default_name(field.number),
            is_optional: false,
            parent,
            detached: false,
            kind: TagKind::Single(SingleTag {
                wire_type: field.wire_type,
                value: field.value,
                raw: field.raw,
                can_decode,
                start_offset: field.start_offset,
                data_offset: field.data_offset,
                end_offset: field.end_offset,
            }),
        })
    }

    /// Number of embedded messages enclosing `id`, `id` itself included
    pub fn depth(&self, id: TagId) -> Result<usize> {
        let mut depth = 0;
        let mut current = Some(id);
        while let Some(cursor) = current {
            let tag = self.get(cursor)?;
            if matches!(tag.kind, TagKind::Embedded(_)) {
                depth += 1;
            }
            current = tag.parent;
        }
        Ok(depth)
    }

    /// Re-reads a decodable single tag as an embedded message.
    ///
    /// The new embedded tag takes the exact position of the original inside
    /// its container (the top level, a repeated tag or another embedded
    /// message). The original is detached. On failure the tree is left
    /// unchanged.
    pub fn decode_tag(&mut self, id: TagId) -> DecodeResult {
        let tag = self.get(id)?;
        let index = tag.index;

        let single = match &tag.kind {
            TagKind::Single(single) if single.can_decode => single,
            _ => return Err(Error::NotDecodable { index }),
        };

        if tag.detached {
            return Err(Error::NoParentContext { index });
        }

        let parent = tag.parent;
        let position = self
            .container(parent)
            .and_then(|items| items.iter().position(|&item| item == id))
            .ok_or(Error::NoParentContext { index })?;

        let depth = self.depth(id)? + 1;
        if depth > self.max_depth {
            return Err(Error::NestingTooDeep {
                depth,
                max: self.max_depth,
            });
        }

        let payload = single.raw.clone();
        let embedded = EmbeddedMessageTag {
            start_offset: single.start_offset,
            data_offset: single.data_offset,
            end_offset: single.end_offset,
            payload: payload.clone(),
            tags: Vec::new(),
        };
        let is_optional = tag.is_optional;

        let fields = wire::read_fields(payload)?;

        let embedded_id = self.alloc(Tag {
            index,
            name: format!("EmbeddedMessage{}", index),
            is_optional,
            parent,
            detached: false,
            kind: TagKind::Embedded(embedded),
        });
        let children = self.assemble(fields, Some(embedded_id));
        if let TagKind::Embedded(embedded) = &mut self.tags[embedded_id.0].kind {
            embedded.tags = children;
        }

        let items = self
            .container_mut(parent)
            .ok_or_else(|| Error::unexpected("container vanished during decode"))?;
        items[position] = embedded_id;
        self.tags[id.0].detached = true;

        debug!(
            "Decoded tag {} (field {}) into embedded message {} at depth {}",
            id, index, embedded_id, depth
        );
        Ok(embedded_id)
    }

    /// Child list of a splice target: the top level, a repeated tag or an
    /// embedded message. Single tags are not containers.
    fn container(&self, parent: Option<TagId>) -> Option<&Vec<TagId>> {
        match parent {
            None => Some(&self.roots),
            Some(id) => match &self.tags.get(id.0)?.kind {
                TagKind::Repeated(repeated) => Some(&repeated.items),
                TagKind::Embedded(embedded) => Some(&embedded.tags),
                TagKind::Single(_) => None,
            },
        }
    }

    fn container_mut(&mut self, parent: Option<TagId>) -> Option<&mut Vec<TagId>> {
        match parent {
            None => Some(&mut self.roots),
            Some(id) => match &mut self.tags.get_mut(id.0)?.kind {
                TagKind::Repeated(repeated) => Some(&mut repeated.items),
                TagKind::Embedded(embedded) => Some(&mut embedded.tags),
                TagKind::Single(_) => None,
            },
        }
    }

    /// Decodes every decodable tag, including those uncovered by earlier
    /// expansions, breadth first.
    ///
    /// Tags that would exceed the depth limit are left as they are. Returns
    /// the number of tags expanded.
    pub fn expand_all(&mut self) -> usize {
        let mut queue: VecDeque<TagId> = self.roots.iter().copied().collect();
        let mut expanded = 0;

        while let Some(id) = queue.pop_front() {
            if !self.tags[id.0].can_decode() {
                queue.extend(self.tags[id.0].children().iter().copied());
                continue;
            }

            match self.decode_tag(id) {
                Ok(embedded) => {
                    expanded += 1;
                    queue.push_back(embedded);
                }
                Err(e) => trace!("Leaving tag {} as is: {}", id, e),
            }
        }

        debug!("Expanded {} tags", expanded);
        expanded
    }

    /// Offset of the buffer holding `id`, relative to the input
    pub fn base_offset(&self, id: TagId) -> Result<usize> {
        let mut base = 0;
        let mut current = self.get(id)?.parent;
        while let Some(parent) = current {
            let tag = self.get(parent)?;
            base += tag.child_base();
            current = tag.parent;
        }
        Ok(base)
    }

    /// Span of `id` in input coordinates; `None` for repeated tags
    pub fn absolute_span(&self, id: TagId) -> Result<Option<ByteSpan>> {
        let span = self.get(id)?.span();
        match span {
            Some(span) => Ok(Some(span.shifted(self.base_offset(id)?))),
            None => Ok(None),
        }
    }

    /// Input-level span of the nearest embedded message enclosing `id`
    pub fn enclosing_span(&self, id: TagId) -> Result<Option<ByteSpan>> {
        let mut current = self.get(id)?.parent;
        while let Some(parent) = current {
            let tag = self.get(parent)?;
            if let TagKind::Embedded(_) = tag.kind {
                return self.absolute_span(parent);
            }
            current = tag.parent;
        }
        Ok(None)
    }

    /// Renames a tag; the name drives the inferred schema
    pub fn rename(&mut self, id: TagId, name: impl Into<String>) -> Result<()> {
        self.get_mut(id)?.name = name.into();
        Ok(())
    }

    /// Marks a tag optional or not in the inferred schema
    pub fn set_optional(&mut self, id: TagId, optional: bool) -> Result<()> {
        self.get_mut(id)?.is_optional = optional;
        Ok(())
    }

    /// Finds a tag by path.
    ///
    /// A path is a dot-separated list of field numbers. A repeated tag is
    /// addressed by its field number alone; `N[i]` selects its `i`-th
    /// occurrence. Every segment but the last must land on an embedded
    /// message, e.g. `3[1].2`.
    pub fn resolve_path(&self, path: &str) -> Result<TagId> {
        let mut container: Option<TagId> = None;
        let mut found = None;

        for segment in path.split('.') {
            if let Some(current) = found {
                if !matches!(self.get(current)?.kind, TagKind::Embedded(_)) {
                    return Err(Error::invalid_tag_path(
                        path,
                        format!("field {} is not an embedded message", self.tags[current.0].index),
                    ));
                }
                container = Some(current);
            }

            let (number, item) = parse_segment(path, segment)?;
            let id = self
                .children(container)?
                .iter()
                .copied()
                .find(|&child| self.tags[child.0].index == number)
                .ok_or_else(|| {
                    Error::invalid_tag_path(path, format!("no field {}", number))
                })?;

            found = Some(match item {
                None => id,
                Some(i) => match &self.tags[id.0].kind {
                    TagKind::Repeated(repeated) => {
                        repeated.items.get(i).copied().ok_or_else(|| {
                            Error::invalid_tag_path(
                                path,
                                format!("field {} has {} items", number, repeated.items.len()),
                            )
                        })?
                    }
                    _ => {
                        return Err(Error::invalid_tag_path(
                            path,
                            format!("field {} is not repeated", number),
                        ))
                    }
                },
            });
        }

        found.ok_or_else(|| Error::invalid_tag_path(path, "empty path"))
    }
}

fn parse_segment(path: &str, segment: &str) -> Result<(u32, Option<usize>)> {
    let invalid = || Error::invalid_tag_path(path, format!("bad segment '{}'", segment));

    let (number, item) = match segment.split_once('[') {
        Some((number, rest)) => {
            let item = rest.strip_suffix(']').ok_or_else(invalid)?;
            (number, Some(item.parse::<usize>().map_err(|_| invalid())?))
        }
        None => (segment, None),
    };

    let number = number.trim().parse::<u32>().map_err(|_| invalid())?;
    Ok((number, item))
}

fn default_name(number: u32) -> String {
    format!("Field{}", number)
}
