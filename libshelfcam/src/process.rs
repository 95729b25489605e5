use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use super::camera_stream::CameraStream;
use super::config::Config;
use super::constants::WINDOW_NAME;
use super::error::ProcessorError;
use super::experiment::Experiment;
use super::player::{
    play, Compositor, EventHandler, PlaybackOutcome, PlayerOptions, PlayerOutputs, PlotLayout,
};
use super::plot::WeightPlot;
use super::synchronizer::{synchronize_experiment, SyncOptions};
use super::timestamp::format_timestamp;
use super::video::{Display, FrameSink, FrameSource, VideoEncoder, VideoFile, Window};
use super::weights::{WeightSelection, WeightSeries};
use super::worker_status::{WorkerPhase, WorkerStatus};

/// Only send progress when it moved by at least this much
const PROGRESS_STEP: f32 = 0.01;

/// Outcome of one experiment of a batch
#[derive(Debug)]
pub struct TaskReport {
    pub experiment: String,
    pub result: Result<(), ProcessorError>,
}

/// Generate the stitched multicam video and alignment of one experiment.
///
/// Progress is reported to `tx` as the video is written.
pub fn process_experiment(
    experiment: &Experiment,
    options: &SyncOptions,
    tx: &Sender<WorkerStatus>,
    worker_id: usize,
) -> Result<(), ProcessorError> {
    let name = experiment.name();
    tx.send(WorkerStatus::new(0.0, name, worker_id, WorkerPhase::Rendering))?;
    let mut last_sent: f32 = 0.0;
    let mut progress = |done: usize, total: usize| {
        let fraction = done as f32 / total as f32;
        if fraction - last_sent >= PROGRESS_STEP || done == total {
            last_sent = fraction;
            if tx
                .send(WorkerStatus::new(fraction, name, worker_id, WorkerPhase::Rendering))
                .is_err()
            {
                log::warn!("Worker {worker_id} lost its status channel");
            }
        }
    };
    let alignment = synchronize_experiment(experiment, options, None, &mut progress)?;
    log::info!(
        "Experiment {} has {} synchronized frames",
        name,
        alignment.n_frames()
    );
    tx.send(WorkerStatus::new(1.0, name, worker_id, WorkerPhase::Finished))?;
    Ok(())
}

/// Experiments waiting for a free worker
pub type WorkQueue = Arc<Mutex<VecDeque<Experiment>>>;

pub fn work_queue(experiments: Vec<Experiment>) -> WorkQueue {
    Arc::new(Mutex::new(experiments.into()))
}

/// Take experiments from the shared queue and process them until the queue is empty.
///
/// A failed (or panicking) experiment is logged and reported; the worker moves on to the next one.
pub fn process_queue(
    options: SyncOptions,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
    queue: WorkQueue,
) -> Vec<TaskReport> {
    drain_queue(&queue, &tx, worker_id, |experiment, tx| {
        process_experiment(experiment, &options, tx, worker_id)
    })
}

fn drain_queue<F>(
    queue: &WorkQueue,
    tx: &Sender<WorkerStatus>,
    worker_id: usize,
    mut task: F,
) -> Vec<TaskReport>
where
    F: FnMut(&Experiment, &Sender<WorkerStatus>) -> Result<(), ProcessorError>,
{
    let mut reports = Vec::new();
    loop {
        // The guard is dropped before the experiment runs
        let next = match queue.lock() {
            Ok(mut pending) => pending.pop_front(),
            Err(_) => {
                log::error!("Worker {worker_id} found the work queue poisoned, stopping");
                break;
            }
        };
        let Some(experiment) = next else {
            break;
        };

        log::info!("Processing experiment {}...", experiment.name());
        let result = match panic::catch_unwind(AssertUnwindSafe(|| task(&experiment, tx))) {
            Ok(result) => result,
            Err(payload) => Err(ProcessorError::WorkerPanic(panic_message(payload.as_ref()))),
        };
        match &result {
            Ok(()) => log::info!("Finished processing experiment {}.", experiment.name()),
            Err(e) => {
                log::error!("Experiment {} failed: {e}", experiment.name());
                // The coordinator may already be gone; the report still carries the error
                let _ = tx.send(WorkerStatus::new(
                    1.0,
                    experiment.name(),
                    worker_id,
                    WorkerPhase::Failed,
                ));
            }
        }
        reports.push(TaskReport {
            experiment: experiment.name().to_string(),
            result,
        });
    }
    reports
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        String::from("unknown panic payload")
    }
}

/// Number of workers to start: never more than there are experiments
pub fn worker_pool_size(n_experiments: usize, n_workers: usize) -> usize {
    n_workers.max(1).min(n_experiments)
}

/// What to show in an interactive session
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Camera to play (numbered from 1); None plays the stitched multicam video
    pub camera: Option<usize>,
    pub weights: WeightSelection,
    pub clip_start_s: Option<f64>,
    pub clip_end_s: Option<f64>,
    /// Write the composite to the experiment's composite video
    pub save_video: bool,
    /// Show the composite in a window and take keyboard commands
    pub visualize: bool,
}

/// Play one experiment with its weight plot overlaid.
///
/// For the multicam view the experiment is synchronized first (reusing a stored
/// alignment when possible). Passing an event handler turns on labeling mode.
pub fn run_session(
    experiment: &Experiment,
    request: &SessionRequest,
    config: &Config,
    events: Option<&mut dyn EventHandler>,
) -> Result<PlaybackOutcome, ProcessorError> {
    let timezone = config.timezone()?;
    let fps = config.fps()?;
    let mut options = PlayerOptions::from_config(config)?;
    options.clip_start_s = request.clip_start_s;
    options.clip_end_s = request.clip_end_s;

    Experiment::require(&experiment.weights_path())?;
    let weights = WeightSeries::read(
        &experiment.weights_path(),
        request.weights,
        &config.weight_group_prefix,
        timezone,
    )?;

    let (mut source, timestamps, layout) = match request.camera {
        None => {
            let sync_options = SyncOptions::from_config(config)?;
            let mut progress = |done: usize, total: usize| {
                if done == total {
                    log::info!("Multi-cam video has {total} frames");
                }
            };
            let alignment = synchronize_experiment(experiment, &sync_options, None, &mut progress)?;
            let source = VideoFile::open(&experiment.multicam_video_path())?;
            (source, alignment.timeline()?, PlotLayout::SideStrip)
        }
        Some(camera) => {
            let stream = CameraStream::open(experiment, camera, timezone)?;
            (
                stream.source,
                stream.timestamps,
                PlotLayout::from_scale(config.plot_scale),
            )
        }
    };
    if let Some(first) = timestamps.first() {
        log::info!(
            "Playing {} ({} frames from {})",
            source.name(),
            timestamps.len(),
            format_timestamp(first)?
        );
    }

    let plot_size = WeightPlot::default_size(&weights, request.camera.is_none());
    let plot = WeightPlot::new(&weights, plot_size)?;
    let mut compositor = Compositor::new(plot, source.frame_size(), layout, config.out_scale)?;

    let mut encoder = if request.save_video {
        Some(VideoEncoder::new(
            &experiment.composite_video_path(),
            config.fourcc_chars(),
            fps as f64,
            compositor.output_size(),
        )?)
    } else {
        None
    };
    let mut window = if request.visualize {
        Some(Window::new(WINDOW_NAME)?)
    } else {
        None
    };

    let outcome = play(
        &mut source,
        &timestamps,
        &weights,
        &mut compositor,
        &options,
        PlayerOutputs {
            sink: encoder.as_mut().map(|e| e as &mut dyn FrameSink),
            display: window.as_mut().map(|w| w as &mut dyn Display),
            events,
        },
    )?;
    log::info!(
        "Final weight-to-camera offset: {:.3}s",
        -outcome.start_offset_s
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::PersistedAlignment;
    use crate::error::{CameraStreamError, ExperimentError, SyncError};
    use ndarray::array;
    use std::sync::mpsc;
    use time::macros::{datetime, offset};

    fn options() -> SyncOptions {
        SyncOptions {
            fps: 1,
            scale: 0.5,
            fourcc: ['a', 'v', 'c', '1'],
            overwrite: false,
            timezone: offset!(-8),
        }
    }

    fn make_experiment(parent: &std::path::Path, name: &str) -> Experiment {
        let folder = parent.join(name);
        std::fs::create_dir(&folder).unwrap();
        Experiment::new(&folder, offset!(-8)).unwrap()
    }

    #[test]
    fn test_worker_pool_size() {
        assert_eq!(worker_pool_size(5, 2), 2);
        // No idle workers
        assert_eq!(worker_pool_size(2, 8), 2);
        assert_eq!(worker_pool_size(3, 0), 1);
        assert_eq!(worker_pool_size(0, 4), 0);
    }

    #[test]
    fn test_workers_share_the_queue() {
        let dir = tempfile::tempdir().unwrap();
        let experiments: Vec<Experiment> = (0..6)
            .map(|i| make_experiment(dir.path(), &format!("2019-05-01_12-00-0{i}")))
            .collect();
        let queue = work_queue(experiments.clone());
        let (tx, rx) = mpsc::channel();

        // A slow first experiment must not hold back the rest
        let workers: Vec<_> = (0..2)
            .map(|worker_id| {
                let queue = Arc::clone(&queue);
                let tx = tx.clone();
                std::thread::spawn(move || {
                    drain_queue(&queue, &tx, worker_id, |experiment, _| {
                        if experiment.name() == "2019-05-01_12-00-00" {
                            std::thread::sleep(std::time::Duration::from_millis(200));
                        }
                        Ok(())
                    })
                })
            })
            .collect();
        drop(tx);
        let reports: Vec<Vec<TaskReport>> = workers.into_iter().map(|w| w.join().unwrap()).collect();

        let mut names: Vec<String> = reports
            .iter()
            .flatten()
            .map(|r| r.experiment.clone())
            .collect();
        names.sort();
        let expected: Vec<String> = experiments.iter().map(|e| e.name().to_string()).collect();
        assert_eq!(names, expected);
        let slow_worker = reports
            .iter()
            .find(|r| r.iter().any(|t| t.experiment == "2019-05-01_12-00-00"))
            .unwrap();
        assert!(slow_worker.len() < 6);
        assert!(queue.lock().unwrap().is_empty());
        assert_eq!(rx.iter().count(), 0);
    }

    #[test]
    fn test_panic_does_not_stop_the_worker() {
        let dir = tempfile::tempdir().unwrap();
        let first = make_experiment(dir.path(), "2019-05-01_12-00-00");
        let second = make_experiment(dir.path(), "2019-05-01_13-00-00");
        let queue = work_queue(vec![first, second]);
        let (tx, rx) = mpsc::channel();

        let reports = drain_queue(&queue, &tx, 1, |experiment, _| {
            if experiment.name() == "2019-05-01_12-00-00" {
                panic!("corrupt frame in {}", experiment.name());
            }
            Ok(())
        });
        drop(tx);

        assert_eq!(reports.len(), 2);
        match &reports[0].result {
            Err(ProcessorError::WorkerPanic(msg)) => {
                assert_eq!(msg, "corrupt frame in 2019-05-01_12-00-00")
            }
            other => panic!("expected a worker panic, got {other:?}"),
        }
        assert!(reports[1].result.is_ok());
        let statuses: Vec<WorkerStatus> = rx.iter().collect();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].experiment, "2019-05-01_12-00-00");
        assert_eq!(statuses[0].phase, WorkerPhase::Failed);
    }

    #[test]
    fn test_failures_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let broken = make_experiment(dir.path(), "2019-05-01_12-00-00");
        let done = make_experiment(dir.path(), "2019-05-01_13-00-00");
        // An existing alignment and video are reused without touching the cameras
        PersistedAlignment {
            t_start: datetime!(2019-05-01 13:00:00 -8),
            t_end: datetime!(2019-05-01 13:00:01 -8),
            fps: 1,
            frame_nums: array![[0, 1], [0, 1], [0, 1], [0, 1]],
        }
        .write(&done.alignment_path())
        .unwrap();
        std::fs::write(done.multicam_video_path(), b"").unwrap();

        let (tx, rx) = mpsc::channel();
        let reports = process_queue(options(), tx, 3, work_queue(vec![broken, done]));
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].experiment, "2019-05-01_12-00-00");
        assert!(matches!(
            reports[0].result,
            Err(ProcessorError::SyncError(SyncError::CameraStreamError(
                CameraStreamError::ExperimentError(ExperimentError::MissingFile(_))
            )))
        ));
        assert!(reports[1].result.is_ok());

        let statuses: Vec<WorkerStatus> = rx.iter().collect();
        assert!(statuses.iter().all(|s| s.worker_id == 3));
        let last_broken = statuses
            .iter()
            .filter(|s| s.experiment == "2019-05-01_12-00-00")
            .last()
            .unwrap();
        assert_eq!(last_broken.phase, WorkerPhase::Failed);
        let last_done = statuses.last().unwrap();
        assert_eq!(last_done.experiment, "2019-05-01_13-00-00");
        assert_eq!(last_done.phase, WorkerPhase::Finished);
    }

    #[test]
    fn test_session_needs_weight_offset() {
        let dir = tempfile::tempdir().unwrap();
        let experiment = make_experiment(dir.path(), "2019-05-01_12-00-00");
        let request = SessionRequest {
            camera: Some(3),
            weights: WeightSelection::AllShelves,
            clip_start_s: None,
            clip_end_s: None,
            save_video: false,
            visualize: false,
        };
        let result = run_session(&experiment, &request, &Config::default(), None);
        assert!(matches!(
            result,
            Err(ProcessorError::PlayerError(crate::error::PlayerError::ConfigError(
                crate::error::ConfigError::MissingWeightOffset
            )))
        ));
    }
}
