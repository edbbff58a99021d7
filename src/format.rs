//! Output format catalog.
//!
//! Captures are written in exactly one [`OutputFormat`]. The format is picked
//! either from an explicit identifier (`--out-format=png`) or from the suffix
//! of the output path. Both lookups walk an ordered table and stop at the
//! first match, so the position of an entry in [`STANDARD_ENTRIES`] decides
//! which format wins when two extensions overlap.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Encoder used for raster captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RasterEncoder {
    Png,
    Jpeg,
    Mng,
    Tiff,
    Gif,
    Bmp,
    Ppm,
    Xbm,
    Xpm,
}

impl RasterEncoder {
    pub fn identifier(self) -> &'static str {
        match self {
            RasterEncoder::Png => "png",
            RasterEncoder::Jpeg => "jpeg",
            RasterEncoder::Mng => "mng",
            RasterEncoder::Tiff => "tiff",
            RasterEncoder::Gif => "gif",
            RasterEncoder::Bmp => "bmp",
            RasterEncoder::Ppm => "ppm",
            RasterEncoder::Xbm => "xbm",
            RasterEncoder::Xpm => "xpm",
        }
    }
}

/// Flavour of a print document. Both share the same export path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrintKind {
    Pdf,
    PostScript,
}

/// Format a capture is serialized to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    VectorGraphics,
    PrintDocument(PrintKind),
    PlainText,
    MarkupDump,
    StructuralDump,
    RasterImage(RasterEncoder),
    Unknown,
}

/// How the dispatcher produces a given format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationStrategy {
    Vector,
    Print,
    Text,
    Raster,
}

impl OutputFormat {
    /// Strategy tag for the format, `None` for [`OutputFormat::Unknown`].
    pub fn strategy(self) -> Option<SerializationStrategy> {
        match self {
            OutputFormat::VectorGraphics => Some(SerializationStrategy::Vector),
            OutputFormat::PrintDocument(_) => Some(SerializationStrategy::Print),
            OutputFormat::PlainText | OutputFormat::MarkupDump | OutputFormat::StructuralDump => {
                Some(SerializationStrategy::Text)
            }
            OutputFormat::RasterImage(_) => Some(SerializationStrategy::Raster),
            OutputFormat::Unknown => None,
        }
    }

    pub fn is_known(self) -> bool {
        self != OutputFormat::Unknown
    }

    /// Canonical identifier from the standard catalog.
    pub fn identifier(self) -> &'static str {
        FormatCatalog::standard()
            .entries()
            .iter()
            .find(|entry| entry.format == self)
            .map(|entry| entry.identifier)
            .unwrap_or("unknown")
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

/// One row of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub format: OutputFormat,
    pub extension: &'static str,
    pub identifier: &'static str,
}

const fn entry(format: OutputFormat, extension: &'static str, identifier: &'static str) -> CatalogEntry {
    CatalogEntry {
        format,
        extension,
        identifier,
    }
}

/// Built-in table. Order is significant for suffix resolution.
pub const STANDARD_ENTRIES: &[CatalogEntry] = &[
    entry(OutputFormat::VectorGraphics, ".svg", "svg"),
    entry(OutputFormat::PrintDocument(PrintKind::Pdf), ".pdf", "pdf"),
    entry(OutputFormat::PrintDocument(PrintKind::PostScript), ".ps", "ps"),
    entry(OutputFormat::PlainText, ".txt", "itext"),
    entry(OutputFormat::MarkupDump, ".html", "html"),
    entry(OutputFormat::StructuralDump, ".rtree", "rtree"),
    entry(OutputFormat::RasterImage(RasterEncoder::Jpeg), ".jpeg", "jpeg"),
    entry(OutputFormat::RasterImage(RasterEncoder::Jpeg), ".jpg", "jpg"),
    entry(OutputFormat::RasterImage(RasterEncoder::Png), ".png", "png"),
    entry(OutputFormat::RasterImage(RasterEncoder::Mng), ".mng", "mng"),
    entry(OutputFormat::RasterImage(RasterEncoder::Tiff), ".tiff", "tiff"),
    entry(OutputFormat::RasterImage(RasterEncoder::Gif), ".gif", "gif"),
    entry(OutputFormat::RasterImage(RasterEncoder::Bmp), ".bmp", "bmp"),
    entry(OutputFormat::RasterImage(RasterEncoder::Ppm), ".ppm", "ppm"),
    entry(OutputFormat::RasterImage(RasterEncoder::Xbm), ".xbm", "xbm"),
    entry(OutputFormat::RasterImage(RasterEncoder::Xpm), ".xpm", "xpm"),
];

/// Errors raised while resolving a format. All of them are configuration
/// errors: they are detected before anything is loaded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("unknown output format '{0}'")]
    UnknownIdentifier(String),
    #[error("cannot infer an output format from '{}'", .0.display())]
    UnrecognizedExtension(PathBuf),
}

/// Ordered lookup table of supported formats.
#[derive(Debug, Clone, Copy)]
pub struct FormatCatalog {
    entries: &'static [CatalogEntry],
}

impl FormatCatalog {
    pub const fn new(entries: &'static [CatalogEntry]) -> Self {
        Self { entries }
    }

    pub const fn standard() -> Self {
        Self::new(STANDARD_ENTRIES)
    }

    pub fn entries(&self) -> &'static [CatalogEntry] {
        self.entries
    }

    /// Exact match against the identifier column.
    pub fn by_identifier(&self, identifier: &str) -> OutputFormat {
        self.entries
            .iter()
            .find(|entry| entry.identifier == identifier)
            .map(|entry| entry.format)
            .unwrap_or(OutputFormat::Unknown)
    }

    /// First entry whose extension is a suffix of `path`.
    pub fn by_extension(&self, path: impl AsRef<Path>) -> OutputFormat {
        let path = path.as_ref().to_string_lossy();
        self.entries
            .iter()
            .filter(|entry| !entry.extension.is_empty())
            .find(|entry| path.ends_with(entry.extension))
            .map(|entry| entry.format)
            .unwrap_or(OutputFormat::Unknown)
    }

    /// Resolve the capture format. An explicit identifier always wins over
    /// the output path, and an explicit identifier that does not resolve is
    /// an error even when the extension would have.
    pub fn resolve(
        &self,
        explicit: Option<&str>,
        output: impl AsRef<Path>,
    ) -> Result<OutputFormat, FormatError> {
        if let Some(identifier) = explicit {
            return match self.by_identifier(identifier) {
                OutputFormat::Unknown => Err(FormatError::UnknownIdentifier(identifier.to_string())),
                format => Ok(format),
            };
        }

        let output = output.as_ref();
        match self.by_extension(output) {
            OutputFormat::Unknown => Err(FormatError::UnrecognizedExtension(output.to_path_buf())),
            format => Ok(format),
        }
    }

    /// Comma separated list of identifiers, used in usage text.
    pub fn identifiers(&self) -> String {
        self.entries
            .iter()
            .map(|entry| entry.identifier)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Default for FormatCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
