//! `.proto` schema inference.
//!
//! ## Architecture
//!
//! Schema generation runs in two passes:
//!
//! 1. The tag tree is reduced to message shapes and translated into a
//!    `FileDescriptorProto` (see [`SchemaWriter::infer`])
//! 2. The descriptor is rendered as `.proto` source text
//!
//! The intermediate descriptor can also be loaded into a prost-reflect
//! [`DescriptorPool`], which checks that the inferred schema is consistent
//! and makes it usable for decoding.
//!
//! ## Type mapping
//!
//! | wire type        | inferred type                                   |
//! |------------------|-------------------------------------------------|
//! | varint           | `int64`                                         |
//! | fixed32          | `fixed32`                                       |
//! | fixed64          | `fixed64`                                       |
//! | length-delimited | `string` if UTF-8 and not decodable, else `bytes` |
//! | embedded message | nested `message` named after the tag            |

mod shape;

use crate::error::{Error, Result};
use crate::tree::Message;
use prost::Message as _;
use prost_reflect::{DescriptorPool, MessageDescriptor};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet};
use shape::{DescriptorBuilder, MessageShape};
use std::fmt::Write as FmtWrite;
use tracing::debug;

/// Configuration for schema generation
#[derive(Debug, Clone)]
pub struct SchemaConfig {
    /// Indentation string (default: 2 spaces)
    pub indent_str: String,
    /// Name of the top-level message (default: `Message`)
    pub root_name: String,
    /// Package declaration, if any
    pub package: Option<String>,
    /// Target syntax (default: proto3)
    pub syntax: ProtoSyntax,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            indent_str: "  ".to_string(),
            root_name: "Message".to_string(),
            package: None,
            syntax: ProtoSyntax::Proto3,
        }
    }
}

impl SchemaConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }

    /// Sets the top-level message name
    pub fn root_name(mut self, name: impl Into<String>) -> Self {
        self.root_name = name.into();
        self
    }

    /// Sets the package declaration
    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    /// Sets the target syntax
    pub fn syntax(mut self, syntax: ProtoSyntax) -> Self {
        self.syntax = syntax;
        self
    }
}

/// Proto syntax version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtoSyntax {
    /// Proto2 syntax; fields not marked optional are `required`
    Proto2,
    /// Proto3 syntax; fields not marked optional carry no label
    #[default]
    Proto3,
}

impl ProtoSyntax {
    /// Returns the syntax declaration string
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtoSyntax::Proto2 => "proto2",
            ProtoSyntax::Proto3 => "proto3",
        }
    }
}

/// Infers schemas from decoded messages
#[derive(Debug, Clone, Default)]
pub struct SchemaWriter {
    config: SchemaConfig,
}

impl SchemaWriter {
    /// Creates a writer with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writer with custom configuration
    pub fn with_config(config: SchemaConfig) -> Self {
        Self { config }
    }

    /// Infers the schema of `message` as a descriptor
    pub fn infer(&self, message: &Message) -> InferredSchema {
        let root_name = shape::to_pascal_case(&self.config.root_name, 0);
        let shape = MessageShape::of_level(message, &root_name, message.roots());

        let scope = match &self.config.package {
            Some(package) if !package.is_empty() => format!(".{}", package),
            _ => String::new(),
        };
        let root = DescriptorBuilder::new(&self.config).build(&shape, &root_name, &scope);

        let file = FileDescriptorProto {
            name: Some(format!("{}.proto", shape::to_snake_case(&root_name, 0))),
            package: self.config.package.clone().filter(|p| !p.is_empty()),
            syntax: Some(self.config.syntax.as_str().to_string()),
            message_type: vec![root],
            ..Default::default()
        };

        debug!(
            "Inferred schema with {} top-level fields",
            file.message_type[0].field.len()
        );

        InferredSchema {
            file,
            root_name,
            config: self.config.clone(),
        }
    }

    /// Infers and renders the schema of `message` as `.proto` text
    pub fn write(&self, message: &Message) -> String {
        self.infer(message).to_text()
    }
}

/// Renders the schema of `message` with the default configuration
pub fn write_schema(message: &Message) -> String {
    SchemaWriter::new().write(message)
}

/// A schema inferred from one message
#[derive(Debug, Clone)]
pub struct InferredSchema {
    file: FileDescriptorProto,
    root_name: String,
    config: SchemaConfig,
}

impl InferredSchema {
    /// The inferred file descriptor
    pub fn file_descriptor(&self) -> &FileDescriptorProto {
        &self.file
    }

    /// Name of the top-level message
    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    /// Fully qualified name of the top-level message
    pub fn root_full_name(&self) -> String {
        match self.file.package.as_deref() {
            Some(package) => format!("{}.{}", package, self.root_name),
            None => self.root_name.clone(),
        }
    }

    /// Renders the schema as `.proto` source
    pub fn to_text(&self) -> String {
        let mut output = String::new();
        // Writing into a String cannot fail
        let _ = self.write_to(&mut output);
        output
    }

    /// Writes the schema as `.proto` source
    pub fn write_to(&self, w: &mut impl FmtWrite) -> std::fmt::Result {
        TextWriter::new(w, &self.config).write_file(&self.file)
    }

    /// Loads the schema into a descriptor pool
    pub fn descriptor_pool(&self) -> Result<DescriptorPool> {
        let fds = FileDescriptorSet {
            file: vec![self.file.clone()],
        };

        let mut fds_bytes = Vec::new();
        fds.encode(&mut fds_bytes).map_err(|e| {
            Error::descriptor_build(format!("failed to encode descriptor set: {}", e))
        })?;

        DescriptorPool::decode(fds_bytes.as_slice()).map_err(|e| {
            Error::descriptor_build(format!("failed to decode descriptor pool: {}", e))
        })
    }

    /// Descriptor of the top-level message
    pub fn root_descriptor(&self) -> Result<MessageDescriptor> {
        let full_name = self.root_full_name();
        self.descriptor_pool()?
            .get_message_by_name(&full_name)
            .ok_or_else(|| {
                Error::descriptor_build(format!("message {} not found in pool", full_name))
            })
    }
}

/// Renders a file descriptor as `.proto` text
struct TextWriter<'a, W: FmtWrite> {
    writer: &'a mut W,
    config: &'a SchemaConfig,
    indent_level: usize,
}

impl<'a, W: FmtWrite> TextWriter<'a, W> {
    fn new(writer: &'a mut W, config: &'a SchemaConfig) -> Self {
        Self {
            writer,
            config,
            indent_level: 0,
        }
    }

    fn indent(&mut self) {
        self.indent_level += 1;
    }

    fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    fn write_indent(&mut self) -> std::fmt::Result {
        for _ in 0..self.indent_level {
            write!(self.writer, "{}", self.config.indent_str)?;
        }
        Ok(())
    }

    fn writeln(&mut self, s: &str) -> std::fmt::Result {
        self.write_indent()?;
        writeln!(self.writer, "{}", s)
    }

    fn write_file(&mut self, file: &FileDescriptorProto) -> std::fmt::Result {
        writeln!(self.writer, "syntax = \"{}\";", file.syntax())?;
        writeln!(self.writer)?;

        if !file.package().is_empty() {
            writeln!(self.writer, "package {};", file.package())?;
            writeln!(self.writer)?;
        }

        let scope = match file.package() {
            "" => String::new(),
            package => format!(".{}", package),
        };

        for (i, message) in file.message_type.iter().enumerate() {
            if i > 0 {
                writeln!(self.writer)?;
            }
            self.write_message(message, &scope)?;
        }

        Ok(())
    }

    fn write_message(&mut self, message: &DescriptorProto, scope: &str) -> std::fmt::Result {
        let full_name = format!("{}.{}", scope, message.name());

        self.write_indent()?;
        writeln!(self.writer, "message {} {{", message.name())?;
        self.indent();

        for nested in &message.nested_type {
            self.write_message(nested, &full_name)?;
            writeln!(self.writer)?;
        }

        for field in &message.field {
            self.write_field(field, message, &full_name)?;
        }

        self.dedent();
        self.writeln("}")
    }

    fn write_field(
        &mut self,
        field: &FieldDescriptorProto,
        message: &DescriptorProto,
        scope: &str,
    ) -> std::fmt::Result {
        self.write_indent()?;

        let label = self.field_label(field, message);
        if !label.is_empty() {
            write!(self.writer, "{} ", label)?;
        }

        writeln!(
            self.writer,
            "{} {} = {};",
            field_type_name(field, scope),
            field.name(),
            field.number()
        )
    }

    fn field_label(&self, field: &FieldDescriptorProto, message: &DescriptorProto) -> &'static str {
        match field.label() {
            Label::Repeated => "repeated",
            Label::Required => "required",
            Label::Optional => match self.config.syntax {
                ProtoSyntax::Proto2 => "optional",
                ProtoSyntax::Proto3 if is_proto3_optional(field, message) => "optional",
                ProtoSyntax::Proto3 => "",
            },
        }
    }
}

fn is_proto3_optional(field: &FieldDescriptorProto, message: &DescriptorProto) -> bool {
    // In proto3, optional fields have a synthetic oneof named "_<field>"
    field
        .oneof_index
        .and_then(|i| message.oneof_decl.get(i as usize))
        .map_or(false, |oneof| oneof.name().starts_with('_'))
}

fn field_type_name(field: &FieldDescriptorProto, scope: &str) -> String {
    match field.r#type() {
        Type::Message | Type::Enum => relative_type_name(field.type_name(), scope),
        scalar => scalar.as_str_name().trim_start_matches("TYPE_").to_ascii_lowercase(),
    }
}

/// Shortens a fully qualified type name when it is declared inside `scope`
fn relative_type_name(type_name: &str, scope: &str) -> String {
    type_name
        .strip_prefix(scope)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(type_name)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;
    use pretty_assertions::assert_eq;
    use prost_reflect::{DynamicMessage, Value};

    #[test]
    fn test_single_varint_schema() {
        let message = parse(vec![0x08, 0x96, 0x01]).unwrap();
        assert_eq!(
            write_schema(&message),
            "syntax = \"proto3\";\n\nmessage Message {\n  int64 field1 = 1;\n}\n"
        );
    }

    #[test]
    fn test_scalar_type_mapping() {
        let data = vec![
            0x08, 0x01, // 1: varint
            0x15, 0x00, 0x00, 0x80, 0x3F, // 2: fixed32
            0x19, 0, 0, 0, 0, 0, 0, 0, 0, // 3: fixed64
            0x22, 0x03, b'a', b'b', b'c', // 4: text
            0x2A, 0x02, 0xFF, 0xFE, // 5: binary
            0x32, 0x02, 0x08, 0x01, // 6: decodable, not expanded
        ];
        let message = parse(data).unwrap();
        assert_eq!(
            write_schema(&message),
            "\
syntax = \"proto3\";

message Message {
  int64 field1 = 1;
  fixed32 field2 = 2;
  fixed64 field3 = 3;
  string field4 = 4;
  bytes field5 = 5;
  bytes field6 = 6;
}
"
        );
    }

    #[test]
    fn test_embedded_and_repeated_schema() {
        let data = vec![
            0x0A, 0x04, 0x08, 0x01, 0x12, 0x00, // 1: {1: 1, 2: {}}
            0x0A, 0x02, 0x18, 0x05, // 1: {3: 5}
            0x10, 0x07, // 2: 7
            0x1A, 0x01, b'x', // 3: "x"
            0x1A, 0x01, 0xFF, // 3: <ff>
        ];
        let mut message = parse(data).unwrap();
        message.expand_all();

        let config = SchemaConfig::new().package("demo").root_name("capture");
        let schema = SchemaWriter::with_config(config).write(&message);
        assert_eq!(
            schema,
            "\
syntax = \"proto3\";

package demo;

message Capture {
  message EmbeddedMessage1 {
    message EmbeddedMessage2 {
    }

    int64 field1 = 1;
    EmbeddedMessage2 embedded_message2 = 2;
    int64 field3 = 3;
  }

  repeated EmbeddedMessage1 field1 = 1;
  int64 field2 = 2;
  repeated bytes field3 = 3;
}
"
        );
    }

    #[test]
    fn test_unexpanded_empty_payload_is_bytes() {
        let message = parse(vec![0x12, 0x00, 0x1A, 0x01, b'x']).unwrap();
        let schema = write_schema(&message);
        assert!(schema.contains("  bytes field2 = 2;\n"));
        assert!(schema.contains("  string field3 = 3;\n"));
    }

    #[test]
    fn test_renamed_and_optional_fields() {
        let mut message = parse(vec![0x08, 0x01, 0x12, 0x02, 0x08, 0x02]).unwrap();
        let first = message.roots()[0];
        message.rename(first, "userId").unwrap();
        message.set_optional(first, true).unwrap();

        let embedded = message.decode_tag(message.roots()[1]).unwrap();
        message.rename(embedded, "profile").unwrap();

        let proto3 = write_schema(&message);
        assert_eq!(
            proto3,
            "\
syntax = \"proto3\";

message Message {
  message Profile {
    int64 field1 = 1;
  }

  optional int64 user_id = 1;
  Profile profile = 2;
}
"
        );

        let proto2 = SchemaWriter::with_config(SchemaConfig::new().syntax(ProtoSyntax::Proto2))
            .write(&message);
        assert_eq!(
            proto2,
            "\
syntax = \"proto2\";

message Message {
  message Profile {
    required int64 field1 = 1;
  }

  optional int64 user_id = 1;
  required Profile profile = 2;
}
"
        );
    }

    #[test]
    fn test_name_collisions_are_resolved() {
        let mut message = parse(vec![0x08, 0x01, 0x10, 0x02]).unwrap();
        let ids = message.roots().to_vec();
        message.rename(ids[0], "count").unwrap();
        message.rename(ids[1], "count").unwrap();

        let schema = write_schema(&message);
        assert!(schema.contains("int64 count = 1;"));
        assert!(schema.contains("int64 count_2 = 2;"));
    }

    #[test]
    fn test_schema_is_deterministic() {
        let data = vec![0x0A, 0x02, 0x08, 0x01, 0x10, 0x05, 0x10, 0x06];
        let mut first = parse(data.clone()).unwrap();
        let mut second = parse(data).unwrap();
        first.expand_all();
        second.expand_all();
        assert_eq!(write_schema(&first), write_schema(&second));
    }

    #[test]
    fn test_descriptor_pool_decodes_input() {
        let data = vec![
            0x08, 0x96, 0x01, // 1: 150
            0x12, 0x05, b'h', b'e', b'l', b'l', b'o', // 2: "hello"
            0x1A, 0x02, 0x08, 0x2A, // 3: {1: 42}
        ];
        let mut message = parse(data.clone()).unwrap();
        message.expand_all();

        let schema = SchemaWriter::new().infer(&message);
        let descriptor = schema.root_descriptor().unwrap();
        assert_eq!(descriptor.full_name(), "Message");

        let decoded = DynamicMessage::decode(descriptor, data.as_slice()).unwrap();
        assert_eq!(*decoded.get_field_by_name("field1").unwrap(), Value::I64(150));
        assert_eq!(
            *decoded.get_field_by_name("field2").unwrap(),
            Value::String("hello".to_string())
        );

        let nested = decoded.get_field_by_name("embedded_message3").unwrap();
        let nested = nested.as_message().unwrap();
        assert_eq!(*nested.get_field_by_name("field1").unwrap(), Value::I64(42));
    }

    #[test]
    fn test_optional_fields_build_in_pool() {
        let mut message = parse(vec![0x08, 0x01]).unwrap();
        message.set_optional(message.roots()[0], true).unwrap();

        let schema = SchemaWriter::with_config(SchemaConfig::new().package("pkg")).infer(&message);
        assert_eq!(schema.root_full_name(), "pkg.Message");
        let descriptor = schema.root_descriptor().unwrap();
        let field = descriptor.get_field_by_name("field1").unwrap();
        assert!(field.supports_presence());
    }

    #[test]
    fn test_relative_type_name() {
        assert_eq!(relative_type_name(".pkg.Outer.Inner", ".pkg.Outer"), "Inner");
        assert_eq!(relative_type_name(".Other.Inner", ".pkg.Outer"), ".Other.Inner");
    }
}
