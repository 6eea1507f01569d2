//! Shared model lifecycle under concurrency
//!
//! Exercises the memoized-future singleton: one load per process however
//! many callers arrive, shared failures, and recovery after a failed load.

use bg_matte::{
    ArtifactStore, MattingPipeline, MemoryArtifactStore, MockModelLoader, ModelProfile,
    ModelResource,
    SourceReference, Stage,
};
use std::sync::Arc;
use std::time::Duration;

fn tiny_png() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(6, 6, image::Rgba([100, 150, 200, 255]));
    let mut bytes = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut bytes, image::ImageFormat::Png)
        .unwrap();
    bytes.into_inner()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_load() {
    // The delay keeps the load in flight long enough for every task to
    // arrive while the state is still Loading.
    let loader = Arc::new(MockModelLoader::new(8).delay(Duration::from_millis(50)));
    let resource = Arc::new(ModelResource::new(loader.clone(), ModelProfile::Small));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let resource = Arc::clone(&resource);
            tokio::spawn(async move { resource.ensure_ready().await })
        })
        .collect();

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap().unwrap());
    }

    assert_eq!(loader.load_count(), 1, "exactly one load for N callers");
    for handle in &handles[1..] {
        assert!(Arc::ptr_eq(&handles[0], handle), "all callers share one handle");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_failure() {
    let loader = Arc::new(
        MockModelLoader::new(8)
            .fail_times(1)
            .delay(Duration::from_millis(50)),
    );
    let resource = Arc::new(ModelResource::new(loader.clone(), ModelProfile::Small));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let resource = Arc::clone(&resource);
            tokio::spawn(async move { resource.ensure_ready().await })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap().is_err(), "every waiter sees the failure");
    }
    assert_eq!(loader.load_count(), 1, "the failure came from a single attempt");

    // The state reset; a later call retries and succeeds.
    resource.ensure_ready().await.unwrap();
    assert_eq!(loader.load_count(), 2);
}

#[tokio::test]
async fn ready_state_skips_loading() {
    let loader = Arc::new(MockModelLoader::new(8));
    let resource = ModelResource::new(loader.clone(), ModelProfile::Medium);

    for _ in 0..5 {
        resource.ensure_ready().await.unwrap();
    }
    assert_eq!(loader.load_count(), 1);
}

#[tokio::test]
async fn failed_load_does_not_poison_the_pipeline() {
    let loader = Arc::new(MockModelLoader::new(8).fail_times(1));
    let store = Arc::new(MemoryArtifactStore::new());
    let pipeline = MattingPipeline::new(loader, Arc::clone(&store) as Arc<dyn ArtifactStore>).unwrap();

    let source = SourceReference::from_bytes(tiny_png(), "owner-1");
    let err = pipeline.remove_background(&source).await.unwrap_err();
    assert_eq!(err.stage, Stage::ModelLoad);
    assert_eq!(store.call_count(), 0);

    // Same pipeline, same input; the retry succeeds.
    let result = pipeline.remove_background(&source).await.unwrap();
    assert_eq!((result.width, result.height), (6, 6));
    assert_eq!(store.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn load_deadline_surfaces_as_model_load_error() {
    let loader = Arc::new(MockModelLoader::new(8).delay(Duration::from_secs(120)));
    let resource = ModelResource::new(loader, ModelProfile::Small)
        .with_load_timeout(Duration::from_secs(10));

    let err = resource.ensure_ready().await.unwrap_err();
    assert!(err.to_string().contains("deadline"));

    // A deadline counts as a failure; the resource is retryable, not stuck.
    assert!(!resource.is_ready().await);
}
