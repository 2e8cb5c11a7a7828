use ndarray::Array2;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use s2compose::{
    AoiPolygon, AoiSelection, BandId, Composite, ExportParams, ExportQueue, ExportRejection,
    ExportStatus, GeoTransform,
};

/// 10x10 composite of 10 m pixels spanning x 0..100, y 0..100
fn test_composite() -> Composite {
    let mut bands = HashMap::new();
    bands.insert(
        BandId::B04,
        Array2::from_shape_fn((10, 10), |(r, c)| (r * 10 + c) as f32 / 100.0),
    );
    Composite {
        bands,
        geo_transform: GeoTransform::north_up(0.0, 100.0, 10.0),
        crs: String::new(),
        source_granules: vec!["s1".to_string()],
    }
}

fn square_aoi() -> AoiPolygon {
    AoiPolygon::new(vec![(10.0, 10.0), (90.0, 10.0), (90.0, 90.0), (10.0, 90.0)])
}

fn wait_settled(queue: &ExportQueue, job_id: u64) -> ExportStatus {
    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        if let Some(status) = queue.status(job_id) {
            if status.is_settled() {
                return status;
            }
        }
        assert!(Instant::now() < deadline, "export job {} never settled", job_id);
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn test_export_writes_clipped_raster() {
    let dir = tempfile::tempdir().unwrap();
    let queue = ExportQueue::start().unwrap();
    let params = ExportParams {
        folder: dir.path().to_path_buf(),
        prefix: "clip_test".to_string(),
        ..Default::default()
    };

    let request = queue
        .prepare_export(&test_composite(), Some(&square_aoi()), &params)
        .unwrap();
    // Clipped to the 80x80 m AOI window
    assert_eq!(request.image.shape(), (8, 8));
    assert_eq!(request.region, square_aoi().bounding_box().unwrap());

    let status = wait_settled(&queue, request.job_id);
    let ExportStatus::Completed(path) = status else {
        panic!("expected completion, got {:?}", status);
    };
    assert!(path.exists());

    let dataset = gdal::Dataset::open(&path).unwrap();
    assert_eq!(dataset.raster_count() as usize, 1);
    let band = dataset.rasterband(1).unwrap();
    assert_eq!(band.x_size() as usize, 8);
    assert_eq!(band.y_size() as usize, 8);
}

#[test]
fn test_export_resamples_to_requested_scale() {
    let dir = tempfile::tempdir().unwrap();
    let queue = ExportQueue::start().unwrap();
    let params = ExportParams {
        folder: dir.path().to_path_buf(),
        prefix: "scale_test".to_string(),
        scale_m: 20.0,
        ..Default::default()
    };

    let request = queue
        .prepare_export(&test_composite(), Some(&square_aoi()), &params)
        .unwrap();
    let status = wait_settled(&queue, request.job_id);
    let ExportStatus::Completed(path) = status else {
        panic!("expected completion, got {:?}", status);
    };

    let dataset = gdal::Dataset::open(&path).unwrap();
    let band = dataset.rasterband(1).unwrap();
    // 8 pixels at 10 m become 4 at 20 m
    assert_eq!(band.x_size() as usize, 4);
    assert_eq!(band.y_size() as usize, 4);
}

#[test]
fn test_missing_geometry_never_reaches_the_queue() {
    let queue = ExportQueue::start().unwrap();
    let composite = test_composite();

    let selection = AoiSelection::new();
    selection.replace(square_aoi());
    selection.clear();

    let current = selection.current();
    let result = queue.prepare_export(&composite, current.as_ref(), &ExportParams::default());
    assert_eq!(result.unwrap_err(), ExportRejection::NoGeometry);
    assert_eq!(queue.pending(), 0);
    assert!(queue.status(1).is_none());
}

#[test]
fn test_redraw_then_export_uses_current_geometry() {
    let dir = tempfile::tempdir().unwrap();
    let queue = ExportQueue::start().unwrap();
    let params = ExportParams {
        folder: dir.path().to_path_buf(),
        ..Default::default()
    };

    let selection = AoiSelection::new();
    selection.replace(AoiPolygon::new(vec![
        (0.0, 0.0),
        (100.0, 0.0),
        (100.0, 100.0),
        (0.0, 100.0),
    ]));
    // Redraw a smaller region before exporting
    selection.replace(square_aoi());

    let current = selection.current();
    let request = queue
        .prepare_export(&test_composite(), current.as_ref(), &params)
        .unwrap();
    assert_eq!(request.region, square_aoi().bounding_box().unwrap());
    wait_settled(&queue, request.job_id);
}

#[test]
fn test_back_to_back_exports_are_independent_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let queue = ExportQueue::start().unwrap();
    let params = ExportParams {
        folder: dir.path().to_path_buf(),
        ..Default::default()
    };
    let composite = test_composite();
    let aoi = square_aoi();

    let first = queue
        .prepare_export(&composite, Some(&aoi), &params)
        .unwrap();
    let second = queue
        .prepare_export(&composite, Some(&aoi), &params)
        .unwrap();
    assert_ne!(first.job_id, second.job_id);

    let first_status = wait_settled(&queue, first.job_id);
    let second_status = wait_settled(&queue, second.job_id);
    let (ExportStatus::Completed(a), ExportStatus::Completed(b)) = (first_status, second_status)
    else {
        panic!("both jobs should complete");
    };
    assert_ne!(a, b);
    assert!(a.exists());
    assert!(b.exists());
}

#[test]
fn test_oversized_job_fails_downstream() {
    let dir = tempfile::tempdir().unwrap();
    let queue = ExportQueue::start().unwrap();
    let params = ExportParams {
        folder: dir.path().to_path_buf(),
        max_pixels: 4,
        ..Default::default()
    };

    let request = queue
        .prepare_export(&test_composite(), Some(&square_aoi()), &params)
        .unwrap();
    let status = wait_settled(&queue, request.job_id);
    let ExportStatus::Failed(reason) = status else {
        panic!("expected failure, got {:?}", status);
    };
    assert!(reason.contains("pixel budget"));
}
