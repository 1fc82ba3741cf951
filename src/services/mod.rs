//! Services separating I/O, formatting and progress concerns from the pipeline

pub mod format;
pub mod io;
pub mod progress;

pub use format::OutputFormatHandler;
pub use io::ImageIOService;
pub use progress::{
    BatchCompletion, BatchProgress, ChannelProgressReporter, ConsoleProgressReporter,
    FnProgressReporter, ItemFailure, NoOpProgressReporter, PipelineEvent, ProgressReporter,
    ProgressTracker,
};
