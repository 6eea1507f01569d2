//! End-to-end pipeline behavior over the public API
//!
//! Runs the full fetch → decode → infer → resolve → composite → store chain
//! with the deterministic mock backend and real PNG encoding/decoding.

use bg_matte::{
    ArtifactStore, FsArtifactStore, MattingOptions, MattingPipeline, MemoryArtifactStore,
    MockModelLoader, OutputMode, SourceReference, Stage, ARTIFACT_CATEGORY,
};
use image::GenericImageView;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// A small gradient image so compositing has non-uniform RGB to preserve
fn gradient_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([x as u8, y as u8, (x + y) as u8, 255])
    });
    let mut bytes = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut bytes, image::ImageFormat::Png)
        .unwrap();
    bytes.into_inner()
}

/// Same gradient, but through the lossy JPEG path (always opaque on decode)
fn gradient_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([x as u8, y as u8, (x + y) as u8])
    });
    let mut bytes = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut bytes, image::ImageFormat::Jpeg)
        .unwrap();
    bytes.into_inner()
}

fn fs_pipeline(dir: &tempfile::TempDir) -> MattingPipeline {
    let store = Arc::new(FsArtifactStore::new(dir.path().to_path_buf()));
    MattingPipeline::new(Arc::new(MockModelLoader::new(16)), store).unwrap()
}

async fn run_and_load(
    pipeline: &MattingPipeline,
    source: &SourceReference,
) -> (bg_matte::MattingResult, image::DynamicImage) {
    let result = pipeline.remove_background(source).await.unwrap();
    let stored = std::fs::read(&result.artifact.path).unwrap();
    let decoded = image::load_from_memory(&stored).unwrap();
    (result, decoded)
}

#[tokio::test]
async fn output_keeps_source_dimensions() {
    // Odd, non-square dimensions that differ from the model's working
    // resolution force a real mask resample.
    let dir = tempfile::TempDir::new().unwrap();
    let pipeline = fs_pipeline(&dir);
    let source = SourceReference::from_bytes(gradient_png(37, 23), "owner-1");

    let (result, decoded) = run_and_load(&pipeline, &source).await;

    assert_eq!((result.width, result.height), (37, 23));
    assert_eq!(decoded.dimensions(), (37, 23));

    // The radial mock pattern produces a non-uniform alpha channel.
    let rgba = decoded.to_rgba8();
    let alphas: std::collections::HashSet<u8> = rgba.pixels().map(|p| p[3]).collect();
    assert!(alphas.len() > 1, "alpha channel should vary across the image");
}

#[tokio::test]
async fn opaque_jpeg_source_runs_end_to_end() {
    let dir = tempfile::TempDir::new().unwrap();
    let pipeline = fs_pipeline(&dir);
    let source = SourceReference::from_bytes(gradient_jpeg(512, 512), "owner-1");

    let (result, decoded) = run_and_load(&pipeline, &source).await;

    assert_eq!((result.width, result.height), (512, 512));
    assert_eq!(decoded.dimensions(), (512, 512));

    // The alpha-less JPEG decodes fully opaque; the matte still carves a
    // varying alpha channel into the stored PNG.
    let rgba = decoded.to_rgba8();
    let alphas: std::collections::HashSet<u8> = rgba.pixels().map(|p| p[3]).collect();
    assert!(alphas.len() > 1, "alpha channel should vary across the image");
    assert!(result.artifact.file_name.ends_with(".png"));
}

#[tokio::test]
async fn foreground_and_background_are_complementary() {
    let dir = tempfile::TempDir::new().unwrap();
    let pipeline = fs_pipeline(&dir);
    let png = gradient_png(24, 24);

    let fg_source = SourceReference::from_bytes(png.clone(), "owner-1");
    let bg_source = SourceReference::from_bytes(png, "owner-1").with_options(
        MattingOptions::builder().mode(OutputMode::Background).build(),
    );

    let (_, fg) = run_and_load(&pipeline, &fg_source).await;
    let (_, bg) = run_and_load(&pipeline, &bg_source).await;

    let fg = fg.to_rgba8();
    let bg = bg.to_rgba8();
    for (fg_px, bg_px) in fg.pixels().zip(bg.pixels()) {
        // RGB is identical in both layers; the inverted mask flows through
        // the same compositing path, so the alphas sum exactly.
        assert_eq!(fg_px[0], bg_px[0]);
        assert_eq!(fg_px[1], bg_px[1]);
        assert_eq!(fg_px[2], bg_px[2]);
        assert_eq!(u16::from(fg_px[3]) + u16::from(bg_px[3]), 255);
    }
}

#[tokio::test]
async fn rgb_passes_through_unchanged() {
    let dir = tempfile::TempDir::new().unwrap();
    let pipeline = fs_pipeline(&dir);
    let source = SourceReference::from_bytes(gradient_png(16, 16), "owner-1");

    let (_, decoded) = run_and_load(&pipeline, &source).await;
    let rgba = decoded.to_rgba8();

    for (x, y, px) in rgba.enumerate_pixels() {
        assert_eq!(px[0], x as u8);
        assert_eq!(px[1], y as u8);
        assert_eq!(px[2], (x + y) as u8);
    }
}

#[tokio::test]
async fn invalid_bytes_fail_before_inference() {
    let loader = Arc::new(MockModelLoader::new(16));
    let spy = loader.inference_calls();
    let store = Arc::new(MemoryArtifactStore::new());
    let pipeline = MattingPipeline::new(loader, Arc::clone(&store) as Arc<dyn ArtifactStore>).unwrap();

    let source = SourceReference::from_bytes(b"definitely not an image".to_vec(), "owner-1");
    let err = pipeline.remove_background(&source).await.unwrap_err();

    assert_eq!(err.stage, Stage::Decode);
    assert_eq!(spy.load(Ordering::SeqCst), 0, "inference must not run");
    assert_eq!(store.call_count(), 0, "nothing is stored on failure");
}

#[tokio::test]
async fn store_called_exactly_once_with_category() {
    let loader = Arc::new(MockModelLoader::new(16));
    let store = Arc::new(MemoryArtifactStore::new());
    let pipeline = MattingPipeline::new(loader, Arc::clone(&store) as Arc<dyn ArtifactStore>).unwrap();

    let source = SourceReference::from_bytes(gradient_png(8, 8), "owner-7");
    pipeline.remove_background(&source).await.unwrap();

    assert_eq!(store.call_count(), 1);
    let call = &store.calls()[0];
    assert_eq!(call.owner_id, "owner-7");
    assert_eq!(call.category, ARTIFACT_CATEGORY);
    assert!(call.file_name.ends_with(".png"));
}

#[tokio::test]
async fn repeat_runs_have_identical_mask_statistics() {
    let dir = tempfile::TempDir::new().unwrap();
    let pipeline = fs_pipeline(&dir);
    let png = gradient_png(20, 14);

    let first = pipeline
        .remove_background(&SourceReference::from_bytes(png.clone(), "owner-1"))
        .await
        .unwrap();
    let second = pipeline
        .remove_background(&SourceReference::from_bytes(png, "owner-1"))
        .await
        .unwrap();

    assert_eq!(first.mask_statistics, second.mask_statistics);

    let stats = &first.mask_statistics;
    assert_eq!(stats.total_pixels, 20 * 14);
    assert_eq!(
        stats.transparent_pixels + stats.opaque_pixels + stats.partial_pixels,
        stats.total_pixels
    );
}

#[tokio::test]
async fn quality_changes_encoding_effort_not_pixels() {
    let dir = tempfile::TempDir::new().unwrap();
    let pipeline = fs_pipeline(&dir);
    let png = gradient_png(16, 16);

    let low = SourceReference::from_bytes(png.clone(), "owner-1")
        .with_options(MattingOptions::builder().quality(10).build());
    let high = SourceReference::from_bytes(png, "owner-1")
        .with_options(MattingOptions::builder().quality(100).build());

    let (_, low_img) = run_and_load(&pipeline, &low).await;
    let (_, high_img) = run_and_load(&pipeline, &high).await;

    assert_eq!(low_img.to_rgba8().as_raw(), high_img.to_rgba8().as_raw());
}

#[tokio::test]
async fn missing_file_is_a_fetch_error() {
    let loader = Arc::new(MockModelLoader::new(16));
    let store = Arc::new(MemoryArtifactStore::new());
    let pipeline = MattingPipeline::new(loader, store).unwrap();

    let source = SourceReference::from_path("/no/such/image.png", "owner-1");
    let err = pipeline.remove_background(&source).await.unwrap_err();
    assert_eq!(err.stage, Stage::Fetch);
    assert!(err.to_string().contains("/no/such/image.png"));
}
