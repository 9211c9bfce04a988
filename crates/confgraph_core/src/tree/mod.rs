//! Nested document mirror: parsing, import with identity reconciliation, and
//! export.

pub mod document;
pub mod exporter;
pub mod importer;
pub mod parse;

pub use document::{CompoundNode, ExecNode, FlowDocument, ProcessDocument, ProcessNode, SectionNode};
pub use exporter::{AssetMode, ExportError, ExportSummary, MirrorLayout, TreeExporter};
pub use importer::{ImportError, ImportOptions, ImportOutcome, TreeImporter};
pub use parse::{KnownFields, ParseError, ParseMode};
