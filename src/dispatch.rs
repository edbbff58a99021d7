//! Format specific export of a loaded page.
//!
//! The dispatcher runs once per capture, right after the orchestrator fires.
//! It resizes the viewport to the page content, asks the page to paint,
//! print or dump itself, and writes the result to the output path.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::pnm::{PnmEncoder, PnmSubtype, SampleEncoding};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, Rgba, RgbaImage};
use log::{debug, info};
use thiserror::Error;

use crate::engine::{CapturePage, EngineError, PageSize, Size};
use crate::format::{OutputFormat, RasterEncoder};
use crate::request::CaptureRequest;
use crate::surface::SvgSurface;

/// Why an export failed.
#[derive(Debug, Error)]
pub enum ExportFailure {
    #[error("page content has no area ({size})")]
    DegenerateViewport { size: Size },
    #[error("no encoder available for {0}")]
    UnsupportedEncoder(&'static str),
    #[error("format cannot be exported")]
    UnsupportedFormat,
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Debug, Error)]
#[error("failed to export {format} to {}: {kind}", path.display())]
pub struct ExportError {
    pub path: PathBuf,
    pub format: OutputFormat,
    #[source]
    pub kind: ExportFailure,
}

/// Summary of a successful export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub format: OutputFormat,
    pub path: PathBuf,
    pub viewport: Size,
    pub bytes_written: u64,
}

#[derive(Debug, Clone)]
pub struct SerializationDispatcher {
    format: OutputFormat,
    output: PathBuf,
    min_width: u32,
}

impl SerializationDispatcher {
    pub fn new(format: OutputFormat, output: impl Into<PathBuf>, min_width: u32) -> Self {
        Self {
            format,
            output: output.into(),
            min_width,
        }
    }

    pub fn from_request(request: &CaptureRequest) -> Self {
        Self::new(request.format, request.output.clone(), request.min_width)
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Viewport used for export: the content size, widened to the minimum
    /// width.
    pub fn viewport_for(&self, content: Size) -> Size {
        Size::new(content.width.max(self.min_width), content.height)
    }

    pub async fn export<P>(&self, page: &P) -> Result<ExportReport, ExportError>
    where
        P: CapturePage + ?Sized,
    {
        self.run(page).await.map_err(|kind| ExportError {
            path: self.output.clone(),
            format: self.format,
            kind,
        })
    }

    async fn run<P>(&self, page: &P) -> Result<ExportReport, ExportFailure>
    where
        P: CapturePage + ?Sized,
    {
        let strategy = self
            .format
            .strategy()
            .ok_or(ExportFailure::UnsupportedFormat)?;
        if let OutputFormat::RasterImage(encoder) = self.format {
            ensure_encoder(encoder)?;
        }

        let content = page.content_size().await?;
        if content.is_empty() {
            return Err(ExportFailure::DegenerateViewport { size: content });
        }
        let viewport = self.viewport_for(content);
        page.set_viewport(viewport).await?;
        debug!(
            "exporting {} ({:?}) with viewport {} (content {})",
            self.format, strategy, viewport, content
        );

        let bytes_written = match self.format {
            OutputFormat::VectorGraphics => {
                let mut surface = SvgSurface::new(viewport);
                page.paint_vector(&mut surface).await?;
                write_bytes(&self.output, surface.finish().as_bytes())?
            }
            OutputFormat::PrintDocument(kind) => {
                let document = page.print_document(kind, PageSize::A4).await?;
                write_bytes(&self.output, &document)?
            }
            OutputFormat::PlainText => write_bytes(&self.output, page.plain_text().await?.as_bytes())?,
            OutputFormat::MarkupDump => write_bytes(&self.output, page.markup().await?.as_bytes())?,
            OutputFormat::StructuralDump => {
                write_bytes(&self.output, page.structural_dump().await?.as_bytes())?
            }
            OutputFormat::RasterImage(encoder) => {
                let mut surface =
                    RgbaImage::from_pixel(viewport.width, viewport.height, Rgba([255, 255, 255, 255]));
                page.paint_raster(&mut surface).await?;
                encode_raster(&surface, encoder, &self.output)?
            }
            OutputFormat::Unknown => return Err(ExportFailure::UnsupportedFormat),
        };

        info!(
            "wrote {} bytes of {} to {}",
            bytes_written,
            self.format,
            self.output.display()
        );

        Ok(ExportReport {
            format: self.format,
            path: self.output.clone(),
            viewport,
            bytes_written,
        })
    }
}

/// Whether the raster encoder can be produced at all.
pub fn encoder_supported(encoder: RasterEncoder) -> bool {
    image_format(encoder).is_some()
}

fn ensure_encoder(encoder: RasterEncoder) -> Result<(), ExportFailure> {
    if encoder_supported(encoder) {
        Ok(())
    } else {
        Err(ExportFailure::UnsupportedEncoder(encoder.identifier()))
    }
}

fn image_format(encoder: RasterEncoder) -> Option<ImageFormat> {
    match encoder {
        RasterEncoder::Png => Some(ImageFormat::Png),
        RasterEncoder::Jpeg => Some(ImageFormat::Jpeg),
        RasterEncoder::Tiff => Some(ImageFormat::Tiff),
        RasterEncoder::Gif => Some(ImageFormat::Gif),
        RasterEncoder::Bmp => Some(ImageFormat::Bmp),
        RasterEncoder::Ppm => Some(ImageFormat::Pnm),
        RasterEncoder::Mng | RasterEncoder::Xbm | RasterEncoder::Xpm => None,
    }
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<u64, ExportFailure> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(bytes)?;
    writer.flush()?;
    Ok(bytes.len() as u64)
}

fn encode_raster(
    surface: &RgbaImage,
    encoder: RasterEncoder,
    path: &Path,
) -> Result<u64, ExportFailure> {
    let format = image_format(encoder).ok_or(ExportFailure::UnsupportedEncoder(encoder.identifier()))?;
    let mut writer = BufWriter::new(File::create(path)?);

    match encoder {
        RasterEncoder::Jpeg => {
            DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(surface.clone()).to_rgb8())
                .write_to(&mut writer, format)?;
        }
        RasterEncoder::Ppm => {
            let rgb = DynamicImage::ImageRgba8(surface.clone()).to_rgb8();
            PnmEncoder::new(&mut writer)
                .with_subtype(PnmSubtype::Pixmap(SampleEncoding::Binary))
                .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)?;
        }
        _ => {
            surface.write_to(&mut writer, format)?;
        }
    }

    writer.flush()?;
    drop(writer);
    Ok(fs::metadata(path)?.len())
}
