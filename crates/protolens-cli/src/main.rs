//! protolens - Inspect raw Protocol Buffer messages without a schema
//!
//! This tool decodes protobuf payloads into a tag tree, optionally expands
//! embedded messages, and infers `.proto` definitions from what it finds.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, ValueEnum};
use protolens_core::infer::classify;
use protolens_core::tree::{EmbeddedMessageTag, RepeatedTag, SingleTag, Tag, TagId, TagVisitor};
use protolens_core::wire::byte_array_literal;
use protolens_core::{
    Decoder, DecoderConfig, Message, ProtoSyntax, SchemaConfig, SchemaWriter, TagKind, WireType,
};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as FmtWrite;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Inspect raw Protocol Buffer messages and infer their schema
#[derive(Parser, Debug)]
#[command(name = "protolens")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// What to print for each input
    #[arg(long, value_enum, default_value = "tree")]
    format: OutputFormat,

    /// Expand every decodable field before rendering
    #[arg(long)]
    expand: bool,

    /// Decode the tag at this path first, e.g. `3` or `3[1].2` (repeatable)
    #[arg(long = "decode", value_name = "PATH")]
    decode: Vec<String>,

    /// Print the raw bytes of the tag at this path as an array literal
    #[arg(long, value_name = "PATH")]
    copy: Option<String>,

    /// Write the schema here (a directory in --directory mode)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overwrite existing files
    #[arg(long)]
    force: bool,

    /// Dry run - don't write files, just show what would be written
    #[arg(long)]
    dry_run: bool,

    /// Syntax of the generated schema
    #[arg(long, value_enum, default_value = "proto3")]
    syntax: SyntaxArg,

    /// Name of the top-level message
    #[arg(long, default_value = "Message")]
    root_name: String,

    /// Package declaration for the generated schema
    #[arg(long)]
    package: Option<String>,

    /// Maximum embedded-message nesting depth
    #[arg(long, default_value_t = protolens_core::decoder::DEFAULT_MAX_NESTING_DEPTH)]
    max_depth: usize,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a file holding one raw protobuf message
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a directory of raw protobuf messages
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Indented tag tree with values and offsets
    Tree,
    /// Inferred .proto schema
    Schema,
    /// Tag counts
    Stats,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SyntaxArg {
    Proto2,
    Proto3,
}

impl From<SyntaxArg> for ProtoSyntax {
    fn from(arg: SyntaxArg) -> Self {
        match arg {
            SyntaxArg::Proto2 => ProtoSyntax::Proto2,
            SyntaxArg::Proto3 => ProtoSyntax::Proto3,
        }
    }
}

impl Cli {
    fn schema_config(&self) -> SchemaConfig {
        let mut config = SchemaConfig::new()
            .root_name(self.root_name.as_str())
            .syntax(self.syntax.into());
        if let Some(package) = &self.package {
            config = config.package(package.as_str());
        }
        config
    }
}

/// Tracks written schemas for deduplication and output-name conflicts
#[derive(Default)]
struct SchemaRegistry {
    /// Maps content hash -> output path it was written to
    written: HashMap<String, PathBuf>,
    /// Output paths already taken by an earlier input
    claimed: HashSet<PathBuf>,
    /// Statistics
    stats: RegistryStats,
}

#[derive(Default)]
struct RegistryStats {
    inputs: usize,
    duplicates_skipped: usize,
    conflicts_renamed: usize,
    failed: usize,
    written: usize,
}

impl SchemaRegistry {
    fn new() -> Self {
        Self::default()
    }

    /// Compute a short hash of the content (first 8 chars of blake3)
    fn content_hash(content: &str) -> String {
        let hash = blake3::hash(content.as_bytes());
        hash.to_hex()[..8].to_string()
    }

    /// Resolve where a schema should go.
    ///
    /// Returns `None` if identical content was already written. A path taken
    /// by different content gets the content hash appended to its stem.
    fn resolve(&mut self, content_hash: &str, output_path: PathBuf) -> Option<PathBuf> {
        if let Some(first) = self.written.get(content_hash) {
            debug!(
                "Skipping duplicate schema for {} (same as {})",
                output_path.display(),
                first.display()
            );
            self.stats.duplicates_skipped += 1;
            return None;
        }

        if !self.claimed.contains(&output_path) {
            return Some(output_path);
        }

        let renamed = Self::add_suffix(&output_path, &format!("~{}", content_hash));
        info!(
            "Conflict resolved: {} -> {} (content differs)",
            output_path.display(),
            renamed.display()
        );
        self.stats.conflicts_renamed += 1;
        Some(renamed)
    }

    /// Record a schema once it has been written
    fn record(&mut self, content_hash: String, output_path: PathBuf) {
        self.claimed.insert(output_path.clone());
        self.written.insert(content_hash, output_path);
    }

    /// Add a suffix before the .proto extension
    fn add_suffix(path: &Path, suffix: &str) -> PathBuf {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("message");
        path.with_file_name(format!("{}{}.proto", stem, suffix))
    }

    fn print_summary(&self) {
        info!(
            "Summary: {} inputs, {} failed, {} duplicates, {} renamed, {} written",
            self.stats.inputs,
            self.stats.failed,
            self.stats.duplicates_skipped,
            self.stats.conflicts_renamed,
            self.stats.written
        );
    }
}

/// Renders a tag tree as indented text
struct TreeWriter<'a, W: FmtWrite> {
    writer: &'a mut W,
    message: &'a Message,
}

impl<'a, W: FmtWrite> TreeWriter<'a, W> {
    fn new(writer: &'a mut W, message: &'a Message) -> Self {
        Self { writer, message }
    }

    fn write_header(&mut self, tag: &Tag, depth: usize) -> std::fmt::Result {
        write!(
            self.writer,
            "{}{} {} ({})",
            "  ".repeat(depth),
            tag.index(),
            tag.name(),
            tag.kind_name()
        )?;
        if tag.is_optional() {
            write!(self.writer, " optional")?;
        }
        Ok(())
    }

    fn write_span(&mut self, id: TagId) -> std::fmt::Result {
        if let Ok(Some(span)) = self.message.absolute_span(id) {
            write!(self.writer, " @ {}", span)?;
        }
        Ok(())
    }
}

impl<W: FmtWrite> TagVisitor for TreeWriter<'_, W> {
    fn visit_single(
        &mut self,
        id: TagId,
        tag: &Tag,
        single: &SingleTag,
        depth: usize,
    ) -> std::fmt::Result {
        self.write_header(tag, depth)?;
        match single.wire_type {
            WireType::LengthDelimited => write!(
                self.writer,
                " [{}:{}] = {}",
                single.wire_type,
                classify(&single.raw),
                single.value
            )?,
            _ => write!(self.writer, " [{}] = {}", single.wire_type, single.value)?,
        }
        self.write_span(id)?;
        if single.can_decode {
            write!(self.writer, " +")?;
        }
        writeln!(self.writer)
    }

    fn enter_repeated(
        &mut self,
        _id: TagId,
        tag: &Tag,
        repeated: &RepeatedTag,
        depth: usize,
    ) -> std::fmt::Result {
        self.write_header(tag, depth)?;
        writeln!(self.writer, " x{}", repeated.items.len())
    }

    fn enter_embedded(
        &mut self,
        id: TagId,
        tag: &Tag,
        embedded: &EmbeddedMessageTag,
        depth: usize,
    ) -> std::fmt::Result {
        self.write_header(tag, depth)?;
        write!(self.writer, " {{{} fields}}", embedded.tags.len())?;
        self.write_span(id)?;
        writeln!(self.writer)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Dispatch based on input mode
    if let Some(ref file) = cli.input.file {
        process_single_file(&cli, file)
    } else if let Some(ref directory) = cli.input.directory {
        process_directory(&cli, directory)
    } else {
        bail!("Either --file or --directory must be specified")
    }
}

/// Process a single message file
fn process_single_file(cli: &Cli, file: &Path) -> Result<()> {
    if !file.exists() {
        bail!("Input file does not exist: {}", file.display());
    }
    if !file.is_file() {
        bail!("Input path is not a file: {}", file.display());
    }

    let message = load_message(cli, file)?;

    if let Some(path) = &cli.copy {
        let id = message
            .resolve_path(path)
            .with_context(|| format!("Failed to resolve tag path {}", path))?;
        println!("{}", copy_value(&message, id)?);
        return Ok(());
    }

    let output = render(cli, &message)?;
    match (&cli.output, cli.format) {
        (Some(output_path), OutputFormat::Schema) => {
            if cli.dry_run {
                println!("Would write: {}", output_path.display());
            } else {
                write_schema_file(output_path, &output, cli.force)?;
                println!("Wrote {}", output_path.display());
            }
        }
        _ => print!("{}", output),
    }

    Ok(())
}

/// Process a directory of message files recursively
fn process_directory(cli: &Cli, directory: &Path) -> Result<()> {
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());

    let mut registry = SchemaRegistry::new();

    for entry in WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if !path.is_file() || is_hidden(path) {
            trace!("Skipping {}", path.display());
            continue;
        }

        registry.stats.inputs += 1;
        debug!("Processing message: {}", path.display());
        if let Err(e) = process_entry(cli, path, &mut registry) {
            // Log error but continue with other files
            warn!("Error processing {}: {:#}", path.display(), e);
            registry.stats.failed += 1;
        }
    }

    registry.print_summary();
    Ok(())
}

fn process_entry(cli: &Cli, path: &Path, registry: &mut SchemaRegistry) -> Result<()> {
    let message = load_message(cli, path)?;
    let output = render(cli, &message)?;

    let output_dir = match (&cli.output, cli.format) {
        (Some(dir), OutputFormat::Schema) => dir,
        _ => {
            println!("== {}", path.display());
            print!("{}", output);
            return Ok(());
        }
    };

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("message");
    let output_path = output_dir.join(format!("{}.proto", stem));

    let content_hash = SchemaRegistry::content_hash(&output);
    let Some(output_path) = registry.resolve(&content_hash, output_path) else {
        return Ok(());
    };

    if cli.dry_run {
        println!("Would write: {}", output_path.display());
        if cli.verbose > 0 {
            println!("---");
            println!("{}", output);
            println!("---");
        }
        registry.record(content_hash, output_path);
        return Ok(());
    }

    write_schema_file(&output_path, &output, cli.force)
        .with_context(|| format!("Failed to write schema for {}", path.display()))?;
    println!("Wrote {}", output_path.display());
    registry.stats.written += 1;
    registry.record(content_hash, output_path);

    Ok(())
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Read, parse and expand one input as requested on the command line
fn load_message(cli: &Cli, path: &Path) -> Result<Message> {
    trace!("Reading {}", path.display());
    let data = fs::read(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;

    let decoder = Decoder::with_config(DecoderConfig::new().max_nesting_depth(cli.max_depth));
    let mut message = decoder
        .parse(data)
        .with_context(|| format!("Failed to parse message: {}", path.display()))?;

    for tag_path in &cli.decode {
        let id = message
            .resolve_path(tag_path)
            .with_context(|| format!("Failed to resolve tag path {}", tag_path))?;
        message
            .decode_tag(id)
            .with_context(|| format!("Failed to decode tag {}", tag_path))?;
    }

    if cli.expand {
        let expanded = message.expand_all();
        debug!("Expanded {} tags in {}", expanded, path.display());
    }

    Ok(message)
}

fn render(cli: &Cli, message: &Message) -> Result<String> {
    match cli.format {
        OutputFormat::Tree => render_tree(message),
        OutputFormat::Schema => Ok(SchemaWriter::with_config(cli.schema_config()).write(message)),
        OutputFormat::Stats => render_stats(message),
    }
}

fn render_stats(message: &Message) -> Result<String> {
    let stats = message.stats();
    let mut output = String::new();
    writeln!(output, "bytes: {}", message.data().len())?;
    writeln!(output, "tags: {}", stats.total())?;
    writeln!(output, "single: {}", stats.single_count)?;
    writeln!(output, "repeated: {}", stats.repeated_count)?;
    writeln!(output, "embedded: {}", stats.embedded_count)?;
    writeln!(output, "decodable: {}", stats.decodable_count)?;
    writeln!(output, "max depth: {}", stats.max_depth)?;
    Ok(output)
}

fn render_tree(message: &Message) -> Result<String> {
    let mut output = String::new();
    message
        .walk(&mut TreeWriter::new(&mut output, message))
        .context("Failed to render tag tree")?;
    Ok(output)
}

/// Raw bytes of a tag: the field payload, or the embedded message body
fn copy_value(message: &Message, id: TagId) -> Result<String> {
    let tag = message.get(id)?;
    match tag.kind() {
        TagKind::Single(single) => Ok(byte_array_literal(&single.raw)),
        TagKind::Embedded(embedded) => Ok(byte_array_literal(&embedded.payload)),
        TagKind::Repeated(_) => bail!("Tag {} is a repeated group; select one item", tag.index()),
    }
}

/// Write a schema file to disk
fn write_schema_file(output_path: &Path, content: &str, force: bool) -> Result<()> {
    // Create parent directories
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    if output_path.exists() && !force {
        bail!(
            "File already exists: {} (use --force to overwrite)",
            output_path.display()
        );
    }

    let mut file = fs::File::create(output_path)
        .with_context(|| format!("Failed to create file: {}", output_path.display()))?;

    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write file: {}", output_path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use protolens_core::parse;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("protolens").chain(args.iter().copied()))
    }

    #[test]
    fn test_schema_registry_deduplication() {
        let mut registry = SchemaRegistry::new();
        let temp_dir = TempDir::new().unwrap();

        let hash = SchemaRegistry::content_hash("syntax = \"proto3\";\n");

        // Not a duplicate until it has been recorded as written
        let path1 = registry.resolve(&hash, temp_dir.path().join("a.proto")).unwrap();
        assert!(path1.ends_with("a.proto"));
        assert!(registry.resolve(&hash, temp_dir.path().join("a.proto")).is_some());

        registry.record(hash.clone(), path1);
        assert!(registry.resolve(&hash, temp_dir.path().join("b.proto")).is_none());
        assert_eq!(registry.stats.duplicates_skipped, 1);
    }

    #[test]
    fn test_schema_registry_conflict_hash_suffix() {
        let mut registry = SchemaRegistry::new();
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("msg.proto");

        let hash1 = SchemaRegistry::content_hash("syntax = \"proto3\";\n");
        let hash2 = SchemaRegistry::content_hash("syntax = \"proto2\";\n");

        let path1 = registry.resolve(&hash1, target.clone()).unwrap();
        registry.record(hash1, path1.clone());
        assert_eq!(path1, target);

        let path2 = registry.resolve(&hash2, target.clone()).unwrap();
        assert_eq!(path2, temp_dir.path().join(format!("msg~{}.proto", hash2)));
        assert_eq!(registry.stats.conflicts_renamed, 1);
    }

    #[test]
    fn test_add_suffix() {
        assert_eq!(
            SchemaRegistry::add_suffix(Path::new("out/test.proto"), "~abc123"),
            PathBuf::from("out/test~abc123.proto")
        );
    }

    #[test]
    fn test_directory_mode_keeps_inputs_with_same_stem() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in");
        let output = temp_dir.path().join("out");
        fs::create_dir_all(input.join("a")).unwrap();
        fs::create_dir_all(input.join("b")).unwrap();
        fs::write(input.join("a").join("msg.bin"), [0x08, 0x01]).unwrap();
        fs::write(input.join("b").join("msg.bin"), [0x12, 0x01, 0xFF]).unwrap();
        // Identical to a/msg.bin, so skipped
        fs::write(input.join("b").join("same.bin"), [0x08, 0x02]).unwrap();

        let args = cli(&[
            "-d",
            input.to_str().unwrap(),
            "--format",
            "schema",
            "-o",
            output.to_str().unwrap(),
        ]);
        process_directory(&args, &input).unwrap();

        let mut written: Vec<String> = fs::read_dir(&output)
            .unwrap()
            .map(|entry| fs::read_to_string(entry.unwrap().path()).unwrap())
            .collect();
        written.sort();

        assert_eq!(written.len(), 2);
        assert!(written.iter().any(|s| s.contains("int64 field1 = 1;")));
        assert!(written.iter().any(|s| s.contains("bytes field2 = 2;")));
        assert!(output.join("msg.proto").exists());
    }

    #[test]
    fn test_failed_write_is_not_recorded() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("msg.bin");
        let output = temp_dir.path().join("out");
        fs::write(&input, [0x08, 0x01]).unwrap();
        fs::create_dir_all(&output).unwrap();
        fs::write(output.join("msg.proto"), "existing").unwrap();

        let args = cli(&["-d", "in", "--format", "schema", "-o", output.to_str().unwrap()]);
        let mut registry = SchemaRegistry::new();
        assert!(process_entry(&args, &input, &mut registry).is_err());
        assert_eq!(registry.stats.written, 0);
        assert!(registry.written.is_empty());
        assert_eq!(fs::read_to_string(output.join("msg.proto")).unwrap(), "existing");
    }

    #[test]
    fn test_content_hash() {
        let hash1 = SchemaRegistry::content_hash("hello");
        let hash2 = SchemaRegistry::content_hash("hello");
        let hash3 = SchemaRegistry::content_hash("world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 8);
    }

    #[test]
    fn test_write_schema_file_respects_force() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("out.proto");

        write_schema_file(&path, "first", false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first");

        assert!(write_schema_file(&path, "second", false).is_err());
        write_schema_file(&path, "second", true).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn test_load_message_applies_decode_paths() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("msg.bin");
        fs::write(&path, [0x08, 0x01, 0x12, 0x02, 0x08, 0x05]).unwrap();

        let args = cli(&["-f", "msg.bin", "--decode", "2", "--format", "schema"]);
        let message = load_message(&args, &path).unwrap();
        assert_eq!(message.stats().embedded_count, 1);

        let schema = render(&args, &message).unwrap();
        assert!(schema.contains("EmbeddedMessage2 embedded_message2 = 2;"));
    }

    #[test]
    fn test_render_tree() {
        let mut message = parse(vec![0x08, 0x96, 0x01, 0x12, 0x02, 0x08, 0x05]).unwrap();
        message.expand_all();

        let tree = render_tree(&message).unwrap();
        assert_eq!(
            tree,
            "1 Field1 (single) [varint] = 150 @ 0..=2\n\
             2 EmbeddedMessage2 (embedded) {1 fields} @ 3..=6\n\
             \x20 1 Field1 (single) [varint] = 5 @ 5..=6\n"
        );
    }

    #[test]
    fn test_render_tree_shows_payload_kind() {
        let data = vec![0x12, 0x03, b'a', b'b', b'c', 0x1A, 0x03, 0x08, 0x96, 0x01];
        let message = parse(data).unwrap();
        let tree = render_tree(&message).unwrap();
        assert_eq!(
            tree,
            "2 Field2 (single) [len:text] = \"abc\" @ 0..=4\n\
             3 Field3 (single) [len:message] = <3 bytes> @ 5..=9 +\n"
        );
    }

    #[test]
    fn test_copy_value() {
        let message = parse(vec![0x12, 0x03, 0x61, 0x62, 0x63, 0x18, 0x01, 0x18, 0x02]).unwrap();
        let id = message.resolve_path("2").unwrap();
        assert_eq!(copy_value(&message, id).unwrap(), "[0x61, 0x62, 0x63]");

        let group = message.resolve_path("3").unwrap();
        assert!(copy_value(&message, group).is_err());
    }

    #[test]
    fn test_stats_format() {
        let message = parse(vec![0x08, 0x01, 0x10, 0x02]).unwrap();
        let output = render(&cli(&["-f", "x", "--format", "stats"]), &message).unwrap();
        assert!(output.starts_with("bytes: 4\ntags: 2\n"));
    }

    #[test]
    fn test_is_hidden() {
        assert!(is_hidden(Path::new("/tmp/.cache")));
        assert!(!is_hidden(Path::new("/tmp/message.bin")));
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
