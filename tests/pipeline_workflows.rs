//! End-to-end batch workflows using mock segmenters

mod common;

use bgremove_studio::{
    composite, ArchiveBuilder, ArtifactStorage, BackgroundSpec, BatchPipeline, ErrorKind,
    FnProgressReporter, ImageAsset, ImageSource, ItemStatus, NoOpProgressReporter, OutputFormat,
    PipelineConfig,
};
use common::{
    empty_segmenter, gradient, mock_segmenter, png_source, write_png, RecordingReporter,
    PANIC_WIDTH, POISON_WIDTH,
};
use image::{GenericImageView, ImageFormat, Rgba};
use std::io::Cursor;
use tokio_util::sync::CancellationToken;
use zip::ZipArchive;

fn memory_config() -> PipelineConfig {
    PipelineConfig::builder()
        .artifact_storage(ArtifactStorage::Memory)
        .build()
        .unwrap()
}

fn pipeline(config: PipelineConfig) -> BatchPipeline {
    BatchPipeline::new(config, mock_segmenter()).unwrap()
}

fn kind_of(status: &ItemStatus) -> Option<ErrorKind> {
    match status {
        ItemStatus::Success => None,
        ItemStatus::Failed { kind, .. } => Some(*kind),
    }
}

#[test]
fn test_empty_batch_is_an_empty_success() {
    let reporter = RecordingReporter::default();
    let run = pipeline(memory_config())
        .run(&[], &BackgroundSpec::None, &reporter)
        .unwrap();

    assert_eq!((run.total(), run.succeeded(), run.failed()), (0, 0, 0));
    assert_eq!(reporter.update_count(), 0);
    assert_eq!(reporter.completions.lock().unwrap().len(), 1);
}

#[test]
fn test_transparent_background_is_identity_on_pixels() {
    let source = gradient(9, 6);
    let asset = ImageAsset::generated(source.clone());
    let result = composite(&asset, &BackgroundSpec::None).unwrap();
    assert_eq!(result.to_rgba8(), source.to_rgba8());
}

#[test]
fn test_solid_color_with_fully_transparent_foreground_is_flat() {
    let mut pipeline = BatchPipeline::new(memory_config(), empty_segmenter()).unwrap();
    let background = BackgroundSpec::from_hex("#336699").unwrap();
    let run = pipeline
        .run(&[png_source("flat.png", 12, 8)], &background, &NoOpProgressReporter)
        .unwrap();

    let output = image::load_from_memory(&run.read_output(0).unwrap()).unwrap();
    assert_eq!(output.dimensions(), (12, 8));
    assert!(output
        .to_rgba8()
        .pixels()
        .all(|p| *p == Rgba([0x33, 0x66, 0x99, 0xFF])));
}

#[test]
fn test_image_background_is_stretched_to_foreground() {
    let background = BackgroundSpec::Image(png_source("tiny_bg.png", 3, 2));
    let run = pipeline(memory_config())
        .run(
            &[png_source("wide.png", 40, 10), png_source("tall.png", 10, 30)],
            &background,
            &NoOpProgressReporter,
        )
        .unwrap();

    assert_eq!(run.succeeded(), 2);
    for (index, dims) in [(0, (40, 10)), (1, (10, 30))] {
        let output = image::load_from_memory(&run.read_output(index).unwrap()).unwrap();
        assert_eq!(output.dimensions(), dims);
        assert_eq!(run.results()[index].output.as_ref().unwrap().dimensions, dims);
        // Background is opaque, so every pixel ends up opaque
        assert!(output.to_rgba8().pixels().all(|p| p[3] == 255));
    }
}

#[test]
fn test_one_segmentation_failure_is_isolated() {
    let items = vec![
        png_source("a.png", 16, 16),
        png_source("b.png", 16, 16),
        png_source("poison.png", POISON_WIDTH, 9),
        png_source("d.png", 16, 16),
    ];
    let reporter = RecordingReporter::default();
    let run = pipeline(memory_config())
        .run(&items, &BackgroundSpec::None, &reporter)
        .unwrap();

    assert_eq!(run.total(), 4);
    assert_eq!(run.succeeded(), 3);
    assert_eq!(run.failed(), 1);
    assert_eq!(reporter.update_count(), 4);
    assert_eq!(kind_of(&run.results()[2].status), Some(ErrorKind::Segmentation));
    assert_eq!(
        reporter.failure_messages(),
        vec!["item 3 failed: Segmentation error: no subject found".to_string()]
    );

    let indices: Vec<_> = run.results().iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
}

#[test]
fn test_segmenter_panic_becomes_item_failure() {
    let items = vec![png_source("boom.png", PANIC_WIDTH, 5), png_source("ok.png", 8, 8)];
    let run = pipeline(memory_config())
        .run(&items, &BackgroundSpec::None, &NoOpProgressReporter)
        .unwrap();

    assert_eq!(run.succeeded(), 1);
    let reason = run.results()[0].failure_reason().unwrap();
    assert!(reason.contains("model exploded"), "{}", reason);
}

#[test]
fn test_undecodable_and_oversized_items_fail_individually() {
    let config = PipelineConfig::builder()
        .artifact_storage(ArtifactStorage::Memory)
        .max_item_bytes(Some(2_000))
        .build()
        .unwrap();
    let items = vec![
        ImageSource::from_bytes("broken.png", b"definitely not a png".to_vec()),
        ImageSource::from_bytes("huge.png", vec![0_u8; 5_000]),
        png_source("fine.png", 8, 8),
    ];
    let run = pipeline(config)
        .run(&items, &BackgroundSpec::None, &NoOpProgressReporter)
        .unwrap();

    assert_eq!(kind_of(&run.results()[0].status), Some(ErrorKind::Codec));
    assert_eq!(kind_of(&run.results()[1].status), Some(ErrorKind::InputRejected));
    assert!(run.results()[2].is_success());
}

#[test]
fn test_too_many_items_aborts_before_any_work() {
    let work_dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::builder()
        .max_batch_size(Some(2))
        .work_dir(work_dir.path())
        .build()
        .unwrap();
    let items: Vec<_> = (0..3).map(|i| png_source(&format!("{i}.png"), 4, 4)).collect();
    let reporter = RecordingReporter::default();

    let err = pipeline(config)
        .run(&items, &BackgroundSpec::None, &reporter)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TooManyItems);
    assert_eq!(reporter.update_count(), 0);
    assert_eq!(std::fs::read_dir(work_dir.path()).unwrap().count(), 0);
}

#[test]
fn test_unusable_background_fails_each_item_as_composite() {
    let dir = tempfile::tempdir().unwrap();
    let background = BackgroundSpec::Image(ImageSource::from_path(dir.path().join("gone.jpg")));
    let run = pipeline(memory_config())
        .run(
            &[png_source("a.png", 8, 8), png_source("b.png", 8, 8)],
            &background,
            &NoOpProgressReporter,
        )
        .unwrap();

    assert_eq!(run.failed(), 2);
    for result in run.results() {
        assert_eq!(kind_of(&result.status), Some(ErrorKind::Composite));
        assert!(result.failure_reason().unwrap().contains("gone.jpg"));
    }
}

#[test]
fn test_jpeg_output_and_naming() {
    let config = PipelineConfig::builder()
        .artifact_storage(ArtifactStorage::Memory)
        .output_format(OutputFormat::Jpeg)
        .output_suffix("_white")
        .build()
        .unwrap();
    let run = pipeline(config)
        .run(
            &[png_source("portrait.png", 16, 16)],
            &BackgroundSpec::from_hex("#FFFFFF").unwrap(),
            &NoOpProgressReporter,
        )
        .unwrap();

    let output = run.results()[0].output.as_ref().unwrap();
    assert_eq!(output.file_name, "portrait_white.jpg");
    let bytes = run.read_output(0).unwrap();
    assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
}

#[test]
fn test_cancellation_keeps_one_result_per_item() {
    let token = CancellationToken::new();
    let trigger = token.clone();
    let reporter = FnProgressReporter::new(move |completed, _total| {
        if completed == 1 {
            trigger.cancel();
        }
    });
    let items: Vec<_> = (0..4).map(|i| png_source(&format!("{i}.png"), 6, 6)).collect();

    let run = pipeline(memory_config())
        .run_with_cancellation(&items, &BackgroundSpec::None, &reporter, &token)
        .unwrap();

    assert!(run.was_cancelled());
    assert_eq!(run.total(), 4);
    assert_eq!(run.succeeded(), 1);
    for result in &run.results()[1..] {
        assert_eq!(kind_of(&result.status), Some(ErrorKind::Cancelled));
    }
}

#[test]
fn test_artifacts_are_released_after_consumption_and_on_drop() {
    let work_dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::builder()
        .work_dir(work_dir.path())
        .keep_cutout(true)
        .build()
        .unwrap();
    let items = vec![
        png_source("a.png", 10, 10),
        png_source("bad.png", POISON_WIDTH, 4),
        png_source("c.png", 10, 10),
    ];

    let run = pipeline(config)
        .run(&items, &BackgroundSpec::from_hex("#000").unwrap(), &NoOpProgressReporter)
        .unwrap();
    let root = run.workspace().root().unwrap().to_path_buf();
    assert!(root.starts_with(work_dir.path()));
    // Output plus cut-out for each success
    assert_eq!(run.workspace().live_count(), 4);

    let handle = run.results()[0].output.as_ref().unwrap().handle.clone();
    let path = run.workspace().path_of(&handle).unwrap();
    assert!(!run.take_output(0).unwrap().is_empty());
    assert!(!path.exists());
    assert!(run.take_output(0).is_err());
    assert!(run.read_output(1).is_err());

    drop(run);
    assert!(!root.exists());
    assert_eq!(std::fs::read_dir(work_dir.path()).unwrap().count(), 0);
}

#[test]
fn test_three_images_on_white_with_one_failure() {
    let inputs = tempfile::tempdir().unwrap();
    let items: Vec<ImageSource> = vec![
        write_png(inputs.path(), "cat.png", 24, 18).into(),
        write_png(inputs.path(), "broken_subject.png", POISON_WIDTH, 10).into(),
        write_png(inputs.path(), "dog.png", 20, 20).into(),
    ];

    let run = pipeline(PipelineConfig::default())
        .run(
            &items,
            &BackgroundSpec::from_hex("#FFFFFF").unwrap(),
            &NoOpProgressReporter,
        )
        .unwrap();

    assert_eq!(run.succeeded(), 2);
    assert_eq!(run.failed(), 1);
    assert!(!run.results()[1].is_success());

    let bytes = ArchiveBuilder::default().build(&run).unwrap();
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut names: Vec<_> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["cat_processed.png", "dog_processed.png"]);

    let exported = tempfile::tempdir().unwrap();
    let written = run.export_outputs(exported.path()).unwrap();
    assert_eq!(written.len(), 2);
    assert_eq!(run.finish(), 2);
}
