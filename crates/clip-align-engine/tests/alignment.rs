use std::path::Path;
use std::sync::Arc;

use clip_align_engine::align::{AlignmentOrchestrator, PairRequest, VideoSource};
use clip_align_types::{AlignError, AlignmentConfig};
use clip_align_vision::backends::mock::{MockProvider, MockVisionOps};

fn mock_source(dir: &Path, frame_count: usize, content_start: u64, fps: f64) -> VideoSource {
    let work_dir = dir.to_path_buf();
    VideoSource {
        work_dir,
        open: Box::new(move || Ok(Box::new(MockProvider::synthetic(frame_count, content_start, fps)) as _)),
    }
}

fn broken_source(dir: &Path) -> VideoSource {
    VideoSource {
        work_dir: dir.to_path_buf(),
        open: Box::new(|| Err(AlignError::source_unavailable("missing.mp4", "no such file"))),
    }
}

fn test_config() -> AlignmentConfig {
    AlignmentConfig {
        target_fps: 30.0,
        max_pixels: 1_000_000,
        pca_dim: 8,
        motion_bins: 8,
        lambda: 0.1,
        reuse_projection: true,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn excerpt_is_located_inside_the_reference() {
    let workspace = tempfile::tempdir().unwrap();
    let query_dir = workspace.path().join("query");
    let reference_dir = workspace.path().join("reference");

    // Query content is the reference's frames 50..70.
    let mut orchestrator =
        AlignmentOrchestrator::new(test_config(), Arc::new(MockVisionOps)).unwrap();
    let result = orchestrator
        .align_pair(PairRequest {
            pair_id: "excerpt".into(),
            query: mock_source(&query_dir, 20, 50, 30.0),
            reference: mock_source(&reference_dir, 120, 0, 30.0),
        })
        .await
        .unwrap();

    assert_eq!(result.offset_sampled_frames, 50);
    assert_eq!(result.offset_original_frames, 50);
    assert!((result.offset_seconds - 50.0 / 30.0).abs() < 1e-9);
}

#[tokio::test(flavor = "multi_thread")]
async fn offsets_map_through_the_sampling_step() {
    let workspace = tempfile::tempdir().unwrap();
    let query_dir = workspace.path().join("query");
    let reference_dir = workspace.path().join("reference");

    let mut config = test_config();
    // 30 fps source sampled at 10 fps: step 3, so sampled offset 10 maps to
    // original frame 30.
    config.target_fps = 10.0;
    let mut orchestrator =
        AlignmentOrchestrator::new(config, Arc::new(MockVisionOps)).unwrap();
    let result = orchestrator
        .align_pair(PairRequest {
            pair_id: "stepped".into(),
            query: mock_source(&query_dir, 21, 30, 30.0),
            reference: mock_source(&reference_dir, 120, 0, 30.0),
        })
        .await
        .unwrap();

    assert_eq!(result.offset_sampled_frames, 10);
    assert_eq!(result.offset_original_frames, 30);
    assert!((result.offset_seconds - 1.0).abs() < 1e-9);
}

#[tokio::test(flavor = "multi_thread")]
async fn a_failing_pair_does_not_abort_the_batch() {
    let workspace = tempfile::tempdir().unwrap();

    let mut orchestrator =
        AlignmentOrchestrator::new(test_config(), Arc::new(MockVisionOps)).unwrap();
    let outcomes = orchestrator
        .align_batch(vec![
            PairRequest {
                pair_id: "bad".into(),
                query: broken_source(&workspace.path().join("bad-query")),
                reference: mock_source(&workspace.path().join("bad-reference"), 60, 0, 30.0),
            },
            PairRequest {
                pair_id: "good".into(),
                query: mock_source(&workspace.path().join("good-query"), 15, 20, 30.0),
                reference: mock_source(&workspace.path().join("good-reference"), 90, 0, 30.0),
            },
        ])
        .await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].pair_id, "bad");
    assert!(matches!(
        outcomes[0].outcome,
        Err(AlignError::SourceUnavailable { .. })
    ));
    assert_eq!(outcomes[1].pair_id, "good");
    let good = outcomes[1].outcome.as_ref().unwrap();
    assert_eq!(good.offset_original_frames, 20);
}

#[tokio::test(flavor = "multi_thread")]
async fn projection_reuse_is_an_explicit_choice() {
    let workspace = tempfile::tempdir().unwrap();

    // With reuse disabled every pair fits its own model; both still align.
    let mut config = test_config();
    config.reuse_projection = false;
    let mut orchestrator =
        AlignmentOrchestrator::new(config, Arc::new(MockVisionOps)).unwrap();

    for (label, start) in [("first", 10u64), ("second", 40u64)] {
        let result = orchestrator
            .align_pair(PairRequest {
                pair_id: label.into(),
                query: mock_source(&workspace.path().join(format!("{label}-q")), 12, start, 30.0),
                reference: mock_source(&workspace.path().join(format!("{label}-r")), 100, 0, 30.0),
            })
            .await
            .unwrap();
        assert_eq!(result.offset_original_frames, start);
    }
}
