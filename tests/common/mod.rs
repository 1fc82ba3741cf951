//! Shared fixtures for integration tests: generated images and mock segmenters
#![allow(dead_code)]

use bgremove_studio::{
    BatchCompletion, BatchProgress, BgStudioError, FnSegmenter, ImageSource, ItemFailure,
    ProgressReporter, Segmenter,
};
use image::{DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
use std::{
    io::Cursor,
    path::{Path, PathBuf},
    sync::Mutex,
};

/// Width that makes [`mock_segmenter`] fail
pub const POISON_WIDTH: u32 = 13;

/// Width that makes [`mock_segmenter`] panic
pub const PANIC_WIDTH: u32 = 7;

/// Opaque gradient image
pub fn gradient(width: u32, height: u32) -> DynamicImage {
    let mut image = RgbaImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let intensity = ((x * 7 + y * 3) % 200) as u8;
        *pixel = Rgba([intensity, 128, 255 - intensity, 255]);
    }
    DynamicImage::ImageRgba8(image)
}

pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    let image = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
        _ => image.clone(),
    };
    image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    bytes
}

/// Write a gradient PNG into `dir` and return its path
pub fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, encode(&gradient(width, height), ImageFormat::Png)).unwrap();
    path
}

pub fn png_source(name: &str, width: u32, height: u32) -> ImageSource {
    ImageSource::from_bytes(name, encode(&gradient(width, height), ImageFormat::Png))
}

/// Keeps a centered disc, clears everything else
///
/// Fails on images [`POISON_WIDTH`] wide and panics on images [`PANIC_WIDTH`] wide.
pub fn mock_segmenter() -> Box<dyn Segmenter> {
    Box::new(FnSegmenter::new("disc", |image: &DynamicImage| {
        let (width, height) = image.dimensions();
        if width == POISON_WIDTH {
            return Err(BgStudioError::segmentation("no subject found"));
        }
        if width == PANIC_WIDTH {
            panic!("model exploded");
        }

        let cx = width as f32 / 2.0;
        let cy = height as f32 / 2.0;
        let radius = width.min(height) as f32 / 3.0;
        let mut cut = image.to_rgba8();
        for (x, y, pixel) in cut.enumerate_pixels_mut() {
            let (dx, dy) = (x as f32 + 0.5 - cx, y as f32 + 0.5 - cy);
            if (dx * dx + dy * dy).sqrt() > radius {
                pixel[3] = 0;
            }
        }
        Ok(cut)
    }))
}

/// Clears every pixel
pub fn empty_segmenter() -> Box<dyn Segmenter> {
    Box::new(FnSegmenter::new("empty", |image: &DynamicImage| {
        let mut cut = image.to_rgba8();
        cut.pixels_mut().for_each(|p| p[3] = 0);
        Ok(cut)
    }))
}

/// Records everything it is told
#[derive(Default)]
pub struct RecordingReporter {
    pub updates: Mutex<Vec<BatchProgress>>,
    pub failures: Mutex<Vec<ItemFailure>>,
    pub completions: Mutex<Vec<BatchCompletion>>,
}

impl RecordingReporter {
    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    pub fn failure_messages(&self) -> Vec<String> {
        self.failures
            .lock()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report_progress(&self, update: BatchProgress) {
        self.updates.lock().unwrap().push(update);
    }

    fn report_item_failed(&self, failure: ItemFailure) {
        self.failures.lock().unwrap().push(failure);
    }

    fn report_completion(&self, completion: BatchCompletion) {
        self.completions.lock().unwrap().push(completion);
    }
}
