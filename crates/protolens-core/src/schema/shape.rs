//! Inference of message shapes from a tag tree, and their translation into
//! descriptor protos.
//!
//! A shape is the schema-level view of one message level: one entry per
//! field number with the inferred type. Repeated groups and sibling
//! embedded messages of the same field are merged into a single shape.

use super::{ProtoSyntax, SchemaConfig};
use crate::infer;
use crate::tree::{Message, SingleTag, TagId, TagKind};
use crate::wire::WireType;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, FieldDescriptorProto, OneofDescriptorProto};
use std::collections::HashSet;

/// Scalar types the writer can infer from wire data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScalarType {
    Int64,
    Fixed32,
    Fixed64,
    String,
    Bytes,
}

impl ScalarType {
    fn of(single: &SingleTag) -> Self {
        match single.wire_type {
            WireType::Varint => ScalarType::Int64,
            WireType::Fixed32 => ScalarType::Fixed32,
            WireType::Fixed64 => ScalarType::Fixed64,
            WireType::LengthDelimited => {
                if !single.can_decode && infer::is_text(&single.raw) {
                    ScalarType::String
                } else {
                    ScalarType::Bytes
                }
            }
        }
    }

    fn descriptor_type(self) -> Type {
        match self {
            ScalarType::Int64 => Type::Int64,
            ScalarType::Fixed32 => Type::Fixed32,
            ScalarType::Fixed64 => Type::Fixed64,
            ScalarType::String => Type::String,
            ScalarType::Bytes => Type::Bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FieldKind {
    Scalar(ScalarType),
    Message(MessageShape),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FieldShape {
    pub(crate) number: u32,
    pub(crate) name: String,
    pub(crate) optional: bool,
    pub(crate) repeated: bool,
    pub(crate) kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct MessageShape {
    pub(crate) name: String,
    pub(crate) fields: Vec<FieldShape>,
}

impl MessageShape {
    /// Shape of one message level. Nesting depth is bounded by the
    /// message's decode depth limit.
    pub(crate) fn of_level(message: &Message, name: &str, ids: &[TagId]) -> Self {
        let fields = ids
            .iter()
            .filter_map(|&id| FieldShape::of_tag(message, id))
            .collect();
        Self {
            name: name.to_string(),
            fields,
        }
    }

    fn merge(&mut self, other: MessageShape) {
        for field in other.fields {
            match self.fields.iter_mut().find(|f| f.number == field.number) {
                Some(existing) => {
                    existing.repeated |= field.repeated;
                    existing.optional |= field.optional;
                    let placeholder = FieldKind::Scalar(ScalarType::Bytes);
                    let kind = std::mem::replace(&mut existing.kind, placeholder);
                    existing.kind = merge_kind(kind, field.kind);
                }
                None => self.fields.push(field),
            }
        }
    }
}

impl FieldShape {
    fn of_tag(message: &Message, id: TagId) -> Option<Self> {
        let tag = message.tag(id)?;
        let kind = match tag.kind() {
            TagKind::Single(single) => FieldKind::Scalar(ScalarType::of(single)),
            TagKind::Embedded(embedded) => {
                FieldKind::Message(MessageShape::of_level(message, tag.name(), &embedded.tags))
            }
            TagKind::Repeated(repeated) => {
                let mut items = repeated
                    .items
                    .iter()
                    .filter_map(|&item| FieldShape::of_tag(message, item));
                let mut kind = items.next()?.kind;
                for item in items {
                    kind = merge_kind(kind, item.kind);
                }
                return Some(Self {
                    number: tag.index(),
                    name: tag.name().to_string(),
                    optional: tag.is_optional(),
                    repeated: true,
                    kind,
                });
            }
        };

        Some(Self {
            number: tag.index(),
            name: tag.name().to_string(),
            optional: tag.is_optional(),
            repeated: false,
            kind,
        })
    }
}

/// Combines the types inferred for two occurrences of the same field.
///
/// A message wins over length-delimited scalars (undecoded siblings),
/// string and bytes widen to bytes, otherwise the first type is kept.
fn merge_kind(kind: FieldKind, other: FieldKind) -> FieldKind {
    match (kind, other) {
        (FieldKind::Message(mut shape), FieldKind::Message(other)) => {
            shape.merge(other);
            FieldKind::Message(shape)
        }
        (
            FieldKind::Scalar(ScalarType::String | ScalarType::Bytes),
            message @ FieldKind::Message(_),
        ) => message,
        (FieldKind::Scalar(ScalarType::String), FieldKind::Scalar(ScalarType::Bytes)) => {
            FieldKind::Scalar(ScalarType::Bytes)
        }
        (kept, _) => kept,
    }
}

/// Translates shapes into descriptor protos
pub(crate) struct DescriptorBuilder<'a> {
    config: &'a SchemaConfig,
}

impl<'a> DescriptorBuilder<'a> {
    pub(crate) fn new(config: &'a SchemaConfig) -> Self {
        Self { config }
    }

    /// Descriptor for `shape` declared as `type_name` inside `scope`
    /// (the fully qualified name of the enclosing element, `""` for none).
    pub(crate) fn build(
        &self,
        shape: &MessageShape,
        type_name: &str,
        scope: &str,
    ) -> DescriptorProto {
        let full_name = format!("{}.{}", scope, type_name);
        let mut used = HashSet::new();
        let mut descriptor = DescriptorProto {
            name: Some(type_name.to_string()),
            ..Default::default()
        };

        for field in &shape.fields {
            let field_name =
                unique_name(to_snake_case(&field.name, field.number), field.number, &mut used);

            let (r#type, type_name) = match &field.kind {
                FieldKind::Scalar(scalar) => (scalar.descriptor_type(), None),
                FieldKind::Message(nested) => {
                    let nested_name = unique_name(
                        to_pascal_case(&nested.name, field.number),
                        field.number,
                        &mut used,
                    );
                    descriptor
                        .nested_type
                        .push(self.build(nested, &nested_name, &full_name));
                    (Type::Message, Some(format!("{}.{}", full_name, nested_name)))
                }
            };

            let mut proto = FieldDescriptorProto {
                name: Some(field_name.clone()),
                number: Some(field.number as i32),
                r#type: Some(r#type as i32),
                type_name,
                ..Default::default()
            };

            let label = if field.repeated {
                Label::Repeated
            } else {
                match self.config.syntax {
                    ProtoSyntax::Proto2 if !field.optional => Label::Required,
                    ProtoSyntax::Proto2 => Label::Optional,
                    ProtoSyntax::Proto3 => {
                        if field.optional {
                            proto.oneof_index = Some(descriptor.oneof_decl.len() as i32);
                            proto.proto3_optional = Some(true);
                            descriptor.oneof_decl.push(OneofDescriptorProto {
                                name: Some(format!("_{}", field_name)),
                                options: None,
                            });
                        }
                        Label::Optional
                    }
                }
            };
            proto.label = Some(label as i32);

            descriptor.field.push(proto);
        }

        descriptor
    }
}

/// Field name for a tag name: snake_case, identifier characters only
pub(crate) fn to_snake_case(name: &str, number: u32) -> String {
    let mut result = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;

    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else if c.is_ascii_alphanumeric() {
            result.push(c);
            prev_lower = true;
        } else {
            result.push('_');
            prev_lower = false;
        }
    }

    match result.chars().next() {
        None => format!("field_{}", number),
        Some(c) if c.is_ascii_digit() => format!("field_{}", result),
        _ => result,
    }
}

/// Message type name for a tag name: PascalCase, identifier characters only
pub(crate) fn to_pascal_case(name: &str, number: u32) -> String {
    let mut result = String::with_capacity(name.len());
    let mut capitalize_next = true;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if capitalize_next {
                result.push(c.to_ascii_uppercase());
            } else {
                result.push(c);
            }
            capitalize_next = false;
        } else {
            capitalize_next = true;
        }
    }

    match result.chars().next() {
        None => format!("Message{}", number),
        Some(c) if c.is_ascii_digit() => format!("Message{}", result),
        _ => result,
    }
}

fn unique_name(name: String, number: u32, used: &mut HashSet<String>) -> String {
    if used.insert(name.clone()) {
        return name;
    }

    let mut candidate = format!("{}_{}", name, number);
    let mut counter = 2;
    while !used.insert(candidate.clone()) {
        candidate = format!("{}_{}_{}", name, number, counter);
        counter += 1;
    }
    candidate
}
