//! Background compositing
//!
//! Places a cut-out foreground over a background using the Porter-Duff "over"
//! operator. Image backgrounds are stretched to the foreground's exact extents
//! before blending; outputs always keep the foreground's dimensions.

use crate::{
    error::{BgStudioError, Result},
    types::{BackgroundSpec, ImageAsset},
};
use image::{imageops::FilterType, DynamicImage, Rgba, RgbaImage};
use tracing::{debug, warn};

/// Background prepared once per run
#[derive(Debug, Clone)]
enum PreparedBackground {
    Transparent,
    Color(Rgba<u8>),
    Image(RgbaImage),
    /// The background image could not be decoded; every item fails with this reason
    Unavailable(String),
}

/// Composites foregrounds over a fixed background
///
/// The background image, if any, is decoded once when the compositor is built.
#[derive(Debug, Clone)]
pub struct Compositor {
    background: PreparedBackground,
}

impl Compositor {
    /// Prepare `spec` for repeated use
    ///
    /// A background image that fails to decode does not fail construction; it is
    /// reported as a composite error for each item instead.
    #[must_use]
    pub fn new(spec: &BackgroundSpec) -> Self {
        let background = match spec {
            BackgroundSpec::None => PreparedBackground::Transparent,
            BackgroundSpec::SolidColor(color) => PreparedBackground::Color(*color),
            BackgroundSpec::Image(source) => match source.load() {
                Ok(asset) => {
                    debug!(
                        width = asset.width(),
                        height = asset.height(),
                        "Background image decoded"
                    );
                    PreparedBackground::Image(asset.to_rgba8())
                },
                Err(e) => {
                    warn!(source = %source.display_name(), error = %e, "Background image unusable");
                    PreparedBackground::Unavailable(format!(
                        "background image '{}' could not be used: {}",
                        source.display_name(),
                        e
                    ))
                },
            },
        };
        Self { background }
    }

    /// Whether a background is blended in (anything but transparent)
    #[must_use]
    pub fn applies_background(&self) -> bool {
        !matches!(self.background, PreparedBackground::Transparent)
    }

    /// Composite `foreground` over the prepared background
    ///
    /// # Errors
    /// - The background image was unusable
    /// - The stretched background does not match the foreground extents
    pub fn composite(&self, foreground: &ImageAsset) -> Result<ImageAsset> {
        let fg = foreground.to_rgba8();
        let (width, height) = fg.dimensions();

        let output = match &self.background {
            PreparedBackground::Transparent => fg,
            PreparedBackground::Color(color) => {
                let canvas = RgbaImage::from_pixel(width, height, *color);
                blend_over(&fg, &canvas)?
            },
            PreparedBackground::Image(bg) => {
                let stretched = if bg.dimensions() == (width, height) {
                    bg.clone()
                } else {
                    image::imageops::resize(bg, width, height, FilterType::Triangle)
                };
                blend_over(&fg, &stretched)?
            },
            PreparedBackground::Unavailable(reason) => {
                return Err(BgStudioError::composite(reason.clone()));
            },
        };

        Ok(ImageAsset::new(
            DynamicImage::ImageRgba8(output),
            foreground.origin().clone(),
        ))
    }
}

/// Composite a single foreground over `spec`
///
/// # Errors
/// - Background image unreadable or blending failed
pub fn composite(foreground: &ImageAsset, spec: &BackgroundSpec) -> Result<ImageAsset> {
    Compositor::new(spec).composite(foreground)
}

/// Porter-Duff "over" of `fg` onto `bg`; both must share dimensions
///
/// # Errors
/// - Mismatched extents
pub fn blend_over(fg: &RgbaImage, bg: &RgbaImage) -> Result<RgbaImage> {
    if fg.dimensions() != bg.dimensions() {
        return Err(BgStudioError::composite(format!(
            "Cannot composite {:?} foreground over {:?} background",
            fg.dimensions(),
            bg.dimensions()
        )));
    }

    let mut out = RgbaImage::new(fg.width(), fg.height());
    for ((o, f), b) in out.pixels_mut().zip(fg.pixels()).zip(bg.pixels()) {
        *o = over_pixel(*f, *b);
    }
    Ok(out)
}

/// Blend one pixel; fully transparent and fully opaque foregrounds pass through exactly
#[must_use]
pub fn over_pixel(fg: Rgba<u8>, bg: Rgba<u8>) -> Rgba<u8> {
    match fg[3] {
        0 => bg,
        255 => fg,
        alpha => {
            let a_f = f32::from(alpha) / 255.0;
            let a_b = f32::from(bg[3]) / 255.0;
            let a_o = a_f + a_b * (1.0 - a_f);

            let channel = |c_f: u8, c_b: u8| {
                let value =
                    (f32::from(c_f) * a_f + f32::from(c_b) * a_b * (1.0 - a_f)) / a_o;
                value.round().clamp(0.0, 255.0) as u8
            };

            Rgba([
                channel(fg[0], bg[0]),
                channel(fg[1], bg[1]),
                channel(fg[2], bg[2]),
                (a_o * 255.0).round().clamp(0.0, 255.0) as u8,
            ])
        },
    }
}
