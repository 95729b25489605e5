use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use libshelfcam::config::Config;
use libshelfcam::error::ProcessorError;
use libshelfcam::experiment::{list_experiments, Experiment};
use libshelfcam::process::{process_queue, work_queue, worker_pool_size, TaskReport};
use libshelfcam::synchronizer::SyncOptions;
use libshelfcam::worker_status::{WorkerPhase, WorkerStatus};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const BAR_LENGTH: u64 = 1000;

fn bar_style(phase: WorkerPhase) -> ProgressStyle {
    let template = format!(
        "{{prefix:>10}} [{{bar:40.{}}}] {{percent:>3}}% {{msg}}",
        phase.color()
    );
    ProgressStyle::with_template(&template).unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Runs the multicam synchronization of many experiments on a pool of worker threads
/// and shows one progress bar per worker.
pub struct BatchRunner {
    workers: Vec<JoinHandle<Vec<TaskReport>>>,
    worker_bars: Vec<ProgressBar>,
    worker_phases: Vec<WorkerPhase>,
    worker_rx: mpsc::Receiver<WorkerStatus>,
    worker_tx: mpsc::Sender<WorkerStatus>,
}

impl BatchRunner {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel::<WorkerStatus>();
        Self {
            workers: vec![],
            worker_bars: vec![],
            worker_phases: vec![],
            worker_rx: rx,
            worker_tx: tx,
        }
    }

    /// Start some workers
    pub fn start_workers(
        &mut self,
        experiments: Vec<Experiment>,
        options: &SyncOptions,
        n_workers: usize,
        pb_manager: &MultiProgress,
    ) {
        // Safety first
        if !self.workers.is_empty() {
            return;
        }
        let n_workers = worker_pool_size(experiments.len(), n_workers);
        let queue = work_queue(experiments);
        for idx in 0..n_workers {
            let bar = pb_manager.add(ProgressBar::new(BAR_LENGTH));
            bar.set_style(bar_style(WorkerPhase::Rendering));
            bar.set_prefix(format!("Worker {idx}"));
            self.worker_bars.push(bar);
            self.worker_phases.push(WorkerPhase::Rendering);

            let options = options.clone();
            let tx = self.worker_tx.clone();
            let queue = queue.clone();
            self.workers
                .push(std::thread::spawn(move || process_queue(options, tx, idx, queue)));
        }
    }

    /// Move every worker's bar to its latest status
    pub fn poll_messages(&mut self) {
        loop {
            match self.worker_rx.try_recv() {
                Ok(status) => self.show_status(status),
                Err(mpsc::TryRecvError::Empty) => break,
                // We hold a sender ourselves, so this only happens while shutting down
                Err(mpsc::TryRecvError::Disconnected) => break,
            }
        }
    }

    fn show_status(&mut self, status: WorkerStatus) {
        let id = status.worker_id;
        let Some(bar) = self.worker_bars.get(id) else {
            log::error!("Status from unknown worker {id}");
            return;
        };
        if self.worker_phases[id] != status.phase {
            bar.set_style(bar_style(status.phase));
            self.worker_phases[id] = status.phase;
        }
        bar.set_position((status.progress * BAR_LENGTH as f32) as u64);
        bar.set_message(format!("{} {}", status.phase.label(), status.experiment));
    }

    /// Check if there are any workers still doing stuff
    pub fn are_any_workers_alive(&self) -> bool {
        self.workers.iter().any(|worker| !worker.is_finished())
    }

    /// Wait for the workers and collect their reports
    pub fn stop_workers(&mut self) -> Vec<TaskReport> {
        let mut reports = Vec::new();
        for worker in self.workers.drain(..) {
            match worker.join() {
                Ok(mut worker_reports) => reports.append(&mut worker_reports),
                Err(_) => log::error!("An error occured joining one of the workers!"),
            }
        }
        self.poll_messages();
        for bar in self.worker_bars.drain(..) {
            bar.finish();
        }
        reports
    }
}

/// Synchronize every experiment under `folder`.
///
/// Failed experiments are reported on stdout and in the returned reports, they don't fail the batch.
pub fn run_batch(
    folder: &Path,
    config: &Config,
    pb_manager: &MultiProgress,
) -> Result<Vec<TaskReport>, ProcessorError> {
    let options = SyncOptions::from_config(config)?;
    let experiments = list_experiments(folder, options.timezone, None)?;
    let n_experiments = experiments.len();
    let n_workers = config.worker_count();
    log::info!(
        "Found {} experiments in {}, using {} workers",
        n_experiments,
        folder.display(),
        n_workers
    );

    let mut runner = BatchRunner::new();
    runner.start_workers(experiments, &options, n_workers, pb_manager);
    while runner.are_any_workers_alive() {
        std::thread::sleep(POLL_INTERVAL);
        runner.poll_messages();
    }
    let reports = runner.stop_workers();

    let n_ok = reports.iter().filter(|r| r.result.is_ok()).count();
    println!("{n_ok} out of {n_experiments} experiments synchronized");
    for report in reports.iter() {
        if let Err(e) = &report.result {
            println!("Uh oh... Experiment {}: {e}", report.experiment);
        }
    }
    Ok(reports)
}
