//! Core types for batch background removal and compositing

use crate::{
    cleanup::{ArtifactHandle, RunWorkspace},
    error::{BgStudioError, ErrorKind, Result},
};
use chrono::{DateTime, Utc};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Where an image came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetOrigin {
    /// Loaded from a file on disk
    Path(PathBuf),
    /// Uploaded or otherwise supplied as named bytes
    Upload { name: String },
    /// Produced by a pipeline stage
    Generated,
}

/// A decoded raster image and its origin
#[derive(Debug, Clone)]
pub struct ImageAsset {
    image: DynamicImage,
    origin: AssetOrigin,
}

impl ImageAsset {
    #[must_use]
    pub fn new(image: DynamicImage, origin: AssetOrigin) -> Self {
        Self { image, origin }
    }

    /// Wrap an image produced in memory
    #[must_use]
    pub fn generated(image: DynamicImage) -> Self {
        Self::new(image, AssetOrigin::Generated)
    }

    #[must_use]
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    #[must_use]
    pub fn into_image(self) -> DynamicImage {
        self.image
    }

    #[must_use]
    pub fn origin(&self) -> &AssetOrigin {
        &self.origin
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Whether the pixel format carries an alpha channel
    #[must_use]
    pub fn has_alpha(&self) -> bool {
        self.image.color().has_alpha()
    }

    /// Alpha-capable copy of the pixel data
    #[must_use]
    pub fn to_rgba8(&self) -> RgbaImage {
        self.image.to_rgba8()
    }

    /// Base file name of the origin, if any
    #[must_use]
    pub fn name(&self) -> Option<String> {
        match &self.origin {
            AssetOrigin::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            AssetOrigin::Upload { name } => base_name(name),
            AssetOrigin::Generated => None,
        }
    }

    /// File stem of the origin, falling back to `"image"`
    #[must_use]
    pub fn stem(&self) -> String {
        self.name()
            .map_or_else(|| "image".to_string(), |name| file_stem(&name))
    }
}

/// Strip any directory components from an upload name
fn base_name(name: &str) -> Option<String> {
    let trimmed = name.rsplit(['/', '\\']).next().unwrap_or(name);
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// File stem of a base name (`"cat.photo.jpg"` -> `"cat.photo"`)
pub(crate) fn file_stem(name: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if stem.is_empty() {
        "image".to_string()
    } else {
        stem
    }
}

/// A batch input item, decoded lazily by the codec adapter
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Image file on disk
    Path(PathBuf),
    /// Encoded image bytes with their upload name
    Bytes { name: String, data: Vec<u8> },
    /// Already decoded image
    Asset(ImageAsset),
}

impl ImageSource {
    #[must_use]
    pub fn from_path<P: Into<PathBuf>>(path: P) -> Self {
        Self::Path(path.into())
    }

    #[must_use]
    pub fn from_bytes<S: Into<String>>(name: S, data: Vec<u8>) -> Self {
        Self::Bytes {
            name: name.into(),
            data,
        }
    }

    /// Name used in reports and for output naming
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Path(path) => path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned()),
            Self::Bytes { name, .. } => base_name(name).unwrap_or_else(|| "upload".to_string()),
            Self::Asset(asset) => asset.name().unwrap_or_else(|| "image".to_string()),
        }
    }

    /// Stem used to derive output names
    #[must_use]
    pub fn stem(&self) -> String {
        file_stem(&self.display_name())
    }

    /// Encoded size in bytes, when known without decoding
    ///
    /// # Errors
    /// - Metadata for a path source cannot be read
    pub fn encoded_len(&self) -> Result<Option<u64>> {
        match self {
            Self::Path(path) => std::fs::metadata(path)
                .map(|meta| Some(meta.len()))
                .map_err(|e| BgStudioError::file_io_error("read metadata of", path, &e)),
            Self::Bytes { data, .. } => Ok(Some(data.len() as u64)),
            Self::Asset(_) => Ok(None),
        }
    }

    /// Decode into an `ImageAsset`
    ///
    /// # Errors
    /// - The file cannot be read or the bytes are not a supported image
    pub fn load(&self) -> Result<ImageAsset> {
        crate::services::ImageIOService::load_source(self)
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<ImageAsset> for ImageSource {
    fn from(asset: ImageAsset) -> Self {
        Self::Asset(asset)
    }
}

/// Background to place behind the cut-out subject
#[derive(Debug, Clone, Default)]
pub enum BackgroundSpec {
    /// Keep transparency
    #[default]
    None,
    /// Uniform color, including its alpha
    SolidColor(Rgba<u8>),
    /// Image stretched to the foreground's extents
    Image(ImageSource),
}

impl BackgroundSpec {
    /// Solid color from a hex string such as `#FFFFFF`
    ///
    /// # Errors
    /// - The string is not a valid hex color
    pub fn from_hex(hex: &str) -> Result<Self> {
        parse_hex_color(hex).map(Self::SolidColor)
    }

    #[must_use]
    pub fn is_transparent(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Parse `#RGB`, `#RRGGBB` or `#RRGGBBAA` (leading `#` optional)
///
/// # Errors
/// - Wrong length or non-hex digits
pub fn parse_hex_color(input: &str) -> Result<Rgba<u8>> {
    let digits = input.trim().trim_start_matches('#');
    let invalid = || BgStudioError::invalid_config(format!("Invalid hex color '{}'", input));

    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let channel = |range: std::ops::Range<usize>| {
        digits
            .get(range)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .ok_or_else(invalid)
    };

    match digits.len() {
        3 => {
            let expand = |i: usize| channel(i..i + 1).map(|v| v * 17);
            Ok(Rgba([expand(0)?, expand(1)?, expand(2)?, 255]))
        },
        6 => Ok(Rgba([channel(0..2)?, channel(2..4)?, channel(4..6)?, 255])),
        8 => Ok(Rgba([
            channel(0..2)?,
            channel(2..4)?,
            channel(4..6)?,
            channel(6..8)?,
        ])),
        _ => Err(invalid()),
    }
}

/// Per-pixel foreground opacity produced by segmentation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationMask {
    /// Row-major alpha values (0 = background, 255 = foreground)
    pub data: Vec<u8>,
    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    #[must_use]
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Self {
        Self { data, dimensions }
    }

    /// Stretch raw values so the darkest pixel maps to 0 and the brightest to 255
    ///
    /// Salient-object models emit unnormalized saliency; a flat mask is left untouched.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let (min, max) = self
            .data
            .iter()
            .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if max > min {
            let range = f32::from(max - min);
            for value in &mut self.data {
                *value = ((f32::from(*value - min) / range) * 255.0).round() as u8;
            }
        }
        self
    }

    /// Apply the mask as the alpha channel of `image`
    #[must_use]
    pub fn apply_to(&self, image: &DynamicImage) -> RgbaImage {
        let mut rgba = image.to_rgba8();
        let width = rgba.width();
        for (x, y, pixel) in rgba.enumerate_pixels_mut() {
            let index = (y * width + x) as usize;
            let alpha = self.data.get(index).copied().unwrap_or(0);
            // Scale, not replace, so existing transparency survives.
            pixel[3] = ((u16::from(pixel[3]) * u16::from(alpha)) / 255) as u8;
        }
        rgba
    }
}

/// A stored output of one batch item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    /// Base file name (`<stem>_processed.png`)
    pub file_name: String,
    /// Output dimensions
    pub dimensions: (u32, u32),
    /// Registry handle in the run workspace
    pub handle: ArtifactHandle,
}

/// Outcome of one batch item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Success,
    Failed { kind: ErrorKind, reason: String },
}

impl ItemStatus {
    #[must_use]
    pub fn failed(error: &BgStudioError) -> Self {
        Self::Failed {
            kind: error.kind(),
            reason: error.to_string(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Result record for one input item
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    /// Zero-based position in the input sequence
    pub index: usize,
    /// Display name of the input
    pub source_name: String,
    /// Outcome
    pub status: ItemStatus,
    /// Composited output (on success)
    pub output: Option<OutputArtifact>,
    /// Transparent cut-out kept alongside a composited output
    pub cutout: Option<OutputArtifact>,
    /// Wall time spent on this item
    pub elapsed_ms: u64,
}

impl ProcessingResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Failure reason, if the item failed
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        match &self.status {
            ItemStatus::Success => None,
            ItemStatus::Failed { reason, .. } => Some(reason),
        }
    }
}

/// Serializable per-item line of a `BatchSummary`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSummary {
    pub index: usize,
    pub source: String,
    pub output: Option<String>,
    #[serde(flatten)]
    pub status: ItemStatus,
    pub elapsed_ms: u64,
}

/// Aggregate, serializable view of a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub items: Vec<ItemSummary>,
}

/// The ordered results of one batch invocation plus the artifacts they refer to
///
/// Dropping the run releases every artifact it still holds.
#[derive(Debug)]
pub struct BatchRun {
    pub(crate) results: Vec<ProcessingResult>,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) finished_at: DateTime<Utc>,
    pub(crate) cancelled: bool,
    pub(crate) workspace: RunWorkspace,
}

impl BatchRun {
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.workspace.run_id()
    }

    #[must_use]
    pub fn results(&self) -> &[ProcessingResult] {
        &self.results
    }

    /// Successful results in input order
    pub fn successful(&self) -> impl Iterator<Item = &ProcessingResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    /// Failed results in input order
    pub fn failures(&self) -> impl Iterator<Item = &ProcessingResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.successful().count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    /// Whether the run stopped early on a cancellation request
    #[must_use]
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    #[must_use]
    pub fn workspace(&self) -> &RunWorkspace {
        &self.workspace
    }

    fn output_of(&self, index: usize) -> Result<&OutputArtifact> {
        self.results
            .get(index)
            .and_then(|r| r.output.as_ref())
            .ok_or_else(|| {
                BgStudioError::ArtifactReleased(format!("item {} has no output", index))
            })
    }

    /// Read an item's output bytes without releasing them
    ///
    /// # Errors
    /// - Item has no output or the output was already consumed
    pub fn read_output(&self, index: usize) -> Result<Vec<u8>> {
        let artifact = self.output_of(index)?;
        self.workspace.read(&artifact.handle)
    }

    /// Retrieve an item's output bytes and release the artifact
    ///
    /// # Errors
    /// - Item has no output or the output was already consumed
    pub fn take_output(&self, index: usize) -> Result<Vec<u8>> {
        let artifact = self.output_of(index)?;
        self.workspace.consume(&artifact.handle)
    }

    /// Copy every successful output (and cut-out) into `dir`, returning the written paths
    ///
    /// Artifacts stay registered; call [`BatchRun::finish`] or drop the run to release them.
    ///
    /// # Errors
    /// - The directory cannot be created or an artifact cannot be read or written
    pub fn export_outputs<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .map_err(|e| BgStudioError::file_io_error("create output directory", dir, &e))?;

        let mut written = Vec::new();
        let mut taken = std::collections::HashSet::new();
        for result in self.successful() {
            for artifact in result.output.iter().chain(result.cutout.iter()) {
                let name = crate::archive::unique_entry_name(
                    &artifact.file_name,
                    result.index + 1,
                    &mut taken,
                );
                let target = dir.join(name);
                let bytes = self.workspace.read(&artifact.handle)?;
                std::fs::write(&target, bytes)
                    .map_err(|e| BgStudioError::file_io_error("write output", &target, &e))?;
                written.push(target);
            }
        }
        Ok(written)
    }

    /// Serializable summary of the run
    #[must_use]
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            run_id: self.run_id(),
            total: self.total(),
            succeeded: self.succeeded(),
            failed: self.failed(),
            cancelled: self.cancelled,
            started_at: self.started_at,
            finished_at: self.finished_at,
            items: self
                .results
                .iter()
                .map(|r| ItemSummary {
                    index: r.index,
                    source: r.source_name.clone(),
                    output: r.output.as_ref().map(|o| o.file_name.clone()),
                    status: r.status.clone(),
                    elapsed_ms: r.elapsed_ms,
                })
                .collect(),
        }
    }

    /// Release every artifact of this run, returning how many were still live
    pub fn finish(self) -> usize {
        self.workspace.release_all()
    }
}
