//! Area-of-interest session state and the asynchronous export queue.
//!
//! `prepare_export` validates the current AOI, clips the composite, and
//! enqueues a job; the raster write-out happens out-of-band on a worker
//! thread and is observed only through `ExportQueue::status`.

use crate::core::clip::{clip_to_polygon, resample_nearest};
use crate::io::geotiff::GeoTiffWriter;
use crate::types::{AoiPolygon, BoundingBox, Composite, S2Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Export sink parameters, mirrored into every request
#[derive(Debug, Clone)]
pub struct ExportParams {
    /// Destination folder for finished rasters
    pub folder: PathBuf,
    /// File name prefix; the job id is appended
    pub prefix: String,
    /// Human-readable description stored in the raster metadata
    pub description: String,
    /// Output ground sample distance in meters
    pub scale_m: f64,
    /// Maximum pixel count the export subsystem accepts
    pub max_pixels: u64,
}

impl Default for ExportParams {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("EarthEngine"),
            prefix: "Sentinel2_Export".to_string(),
            description: "Sentinel2_Exported_Image".to_string(),
            scale_m: 10.0,
            max_pixels: 1_000_000_000,
        }
    }
}

/// One enqueued export job. Identical back-to-back submissions get
/// distinct ids; jobs are never deduplicated.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub job_id: u64,
    /// Composite already clipped to the region
    pub image: Composite,
    /// Bounding box of the clipped image
    pub region: BoundingBox,
    pub params: ExportParams,
}

/// Lifecycle of an export job as seen through status polling
#[derive(Debug, Clone, PartialEq)]
pub enum ExportStatus {
    Queued,
    Running,
    Completed(PathBuf),
    Failed(String),
}

impl ExportStatus {
    /// Whether the job has reached a terminal state
    pub fn is_settled(&self) -> bool {
        matches!(self, ExportStatus::Completed(_) | ExportStatus::Failed(_))
    }
}

/// Guarded precondition failures; these never enqueue anything
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExportRejection {
    #[error("no geometry supplied")]
    NoGeometry,
    #[error("export queue is closed")]
    QueueClosed,
}

/// The single shared mutable resource: the currently drawn polygon.
/// Redraws replace it, the clear action removes it; exports read the
/// state current at the moment of invocation.
#[derive(Debug, Default)]
pub struct AoiSelection {
    current: Mutex<Option<AoiPolygon>>,
}

impl AoiSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, polygon: AoiPolygon) {
        log::info!("Area of interest set ({} vertices)", polygon.ring().len());
        *self.lock() = Some(polygon);
    }

    pub fn clear(&self) {
        log::info!("Drawing cleared");
        *self.lock() = None;
    }

    /// Snapshot of the current polygon, if any
    pub fn current(&self) -> Option<AoiPolygon> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Option<AoiPolygon>> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Asynchronous export queue: jobs are handed to a worker on a
/// dedicated runtime thread, which resamples and writes GeoTIFFs.
/// Dropping the queue closes the channel, drains pending jobs, and
/// joins the worker.
pub struct ExportQueue {
    sender: Option<mpsc::UnboundedSender<ExportRequest>>,
    statuses: Arc<Mutex<HashMap<u64, ExportStatus>>>,
    next_job_id: AtomicU64,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl ExportQueue {
    /// Start the worker thread and its single-thread runtime
    pub fn start() -> S2Result<Self> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<ExportRequest>();
        let statuses: Arc<Mutex<HashMap<u64, ExportStatus>>> = Arc::new(Mutex::new(HashMap::new()));

        let runtime = tokio::runtime::Builder::new_current_thread().build()?;
        let worker_statuses = Arc::clone(&statuses);
        let worker = std::thread::spawn(move || {
            runtime.block_on(async move {
                while let Some(request) = receiver.recv().await {
                    let job_id = request.job_id;
                    set_status(&worker_statuses, job_id, ExportStatus::Running);
                    log::info!("Export job {} started", job_id);

                    match run_export(request) {
                        Ok(path) => {
                            log::info!("Export job {} completed: {}", job_id, path.display());
                            set_status(&worker_statuses, job_id, ExportStatus::Completed(path));
                        }
                        Err(reason) => {
                            log::warn!("Export job {} failed: {}", job_id, reason);
                            set_status(&worker_statuses, job_id, ExportStatus::Failed(reason));
                        }
                    }
                }
            });
        });

        Ok(Self {
            sender: Some(sender),
            statuses,
            next_job_id: AtomicU64::new(1),
            worker: Some(worker),
        })
    }

    /// Validate the AOI, clip the composite, and enqueue an export job.
    ///
    /// Returns the enqueued request on success. A missing or empty AOI
    /// is rejected before anything reaches the queue; completion or
    /// failure of an accepted job is reported through `status`, never
    /// through this return value.
    pub fn prepare_export(
        &self,
        composite: &Composite,
        aoi: Option<&AoiPolygon>,
        params: &ExportParams,
    ) -> Result<ExportRequest, ExportRejection> {
        let aoi = match aoi {
            Some(polygon) if !polygon.is_empty() => polygon,
            _ => {
                log::warn!("No geometry drawn, export rejected");
                return Err(ExportRejection::NoGeometry);
            }
        };

        let clipped = clip_to_polygon(composite, aoi);
        let region = clipped.bounding_box();
        let job_id = self.next_job_id.fetch_add(1, Ordering::SeqCst);
        let request = ExportRequest {
            job_id,
            image: clipped,
            region,
            params: params.clone(),
        };

        set_status(&self.statuses, job_id, ExportStatus::Queued);
        let sender = self.sender.as_ref().ok_or(ExportRejection::QueueClosed)?;
        if sender.send(request.clone()).is_err() {
            self.lock_statuses().remove(&job_id);
            return Err(ExportRejection::QueueClosed);
        }

        log::info!(
            "Export job {} queued: {}/{}_{}.tif @ {} m",
            job_id,
            params.folder.display(),
            params.prefix,
            job_id,
            params.scale_m
        );
        Ok(request)
    }

    /// Current lifecycle state of a job, if the queue knows it
    pub fn status(&self, job_id: u64) -> Option<ExportStatus> {
        self.lock_statuses().get(&job_id).cloned()
    }

    /// Number of jobs that have not reached a terminal state
    pub fn pending(&self) -> usize {
        self.lock_statuses()
            .values()
            .filter(|s| !s.is_settled())
            .count()
    }

    fn lock_statuses(&self) -> MutexGuard<'_, HashMap<u64, ExportStatus>> {
        self.statuses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ExportQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit
        self.sender.take();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn set_status(statuses: &Arc<Mutex<HashMap<u64, ExportStatus>>>, job_id: u64, status: ExportStatus) {
    statuses
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .insert(job_id, status);
}

/// Materialize one export job: resample to the requested ground sample
/// distance, enforce the pixel budget, and write the GeoTIFF.
fn run_export(request: ExportRequest) -> Result<PathBuf, String> {
    let resampled = resample_nearest(&request.image, request.params.scale_m)
        .map_err(|e| format!("resampling failed: {}", e))?;

    let (rows, cols) = resampled.shape();
    if rows == 0 || cols == 0 {
        return Err("clipped image has no pixels".to_string());
    }

    let pixel_count = rows as u64 * cols as u64 * resampled.bands.len() as u64;
    if pixel_count > request.params.max_pixels {
        return Err(format!(
            "pixel budget exceeded: {} > {}",
            pixel_count, request.params.max_pixels
        ));
    }

    std::fs::create_dir_all(&request.params.folder)
        .map_err(|e| format!("cannot create {}: {}", request.params.folder.display(), e))?;
    let path = request
        .params
        .folder
        .join(format!("{}_{}.tif", request.params.prefix, request.job_id));

    GeoTiffWriter::write_composite(&path, &resampled, Some(&request.params.description))
        .map_err(|e| format!("GeoTIFF write failed: {}", e))?;

    Ok(path)
}
