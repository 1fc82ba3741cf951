//! Output format and naming helpers

use crate::config::OutputFormat;

/// Service for output format details
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// File extension (without the dot) for a format
    ///
    /// ```rust
    /// use bgremove_studio::{services::OutputFormatHandler, OutputFormat};
    ///
    /// assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Png), "png");
    /// assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Jpeg), "jpg");
    /// ```
    #[must_use]
    pub fn get_extension(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
        }
    }

    /// Whether a format keeps the alpha channel
    #[must_use]
    pub fn supports_transparency(format: OutputFormat) -> bool {
        match format {
            OutputFormat::Png => true,
            OutputFormat::Jpeg => false,
        }
    }

    /// Warn when transparent results would be flattened
    pub fn validate_for_background(format: OutputFormat, applies_background: bool) {
        if !applies_background && !Self::supports_transparency(format) {
            log::warn!(
                "Output format {:?} does not support transparency; cut-outs will be flattened over white",
                format
            );
        }
    }

    /// Name of the transparent cut-out kept next to a composited output
    #[must_use]
    pub fn cutout_name(stem: &str) -> String {
        format!("{}_cutout.png", stem)
    }
}
