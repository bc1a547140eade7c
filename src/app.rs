use std::sync::mpsc::{SyncSender, sync_channel};
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::clock::{RunTimestamp, most_recent_run};
use crate::config::BatchSettings;
use crate::domain::{ParamList, Provider};
use crate::error::{GribError, Stage, UnitFailure};
use crate::http::HttpSource;
use crate::index::resolve_index;
use crate::plan::{StepPlan, plan};
use crate::registry::{ModelDescriptor, Registry};
use crate::regrid::Regridder;
use crate::store::Store;
use crate::template::archive_url;
use crate::worker::{FetchUnit, Worker, with_retries};

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub provider: Provider,
    pub model: String,
    pub params: ParamList,
    pub max_step: i64,
    pub height: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub provider: Provider,
    pub model: String,
    pub run: String,
    pub steps: Vec<u32>,
    pub units: usize,
    pub landed: Vec<String>,
    pub failures: Vec<UnitFailure>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum UnitOutcome {
    Landed(Utf8PathBuf),
    Failed(UnitFailure),
}

impl From<Result<Utf8PathBuf, UnitFailure>> for UnitOutcome {
    fn from(result: Result<Utf8PathBuf, UnitFailure>) -> Self {
        match result {
            Ok(path) => UnitOutcome::Landed(path),
            Err(failure) => UnitOutcome::Failed(failure),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

pub struct App<S: HttpSource, R: Regridder> {
    registry: &'static Registry,
    store: Store,
    source: S,
    regridder: R,
    settings: BatchSettings,
}

impl<S: HttpSource, R: Regridder> App<S, R> {
    pub fn new(store: Store, source: S, regridder: R, settings: BatchSettings) -> Self {
        Self {
            registry: Registry::builtin(),
            store,
            source,
            regridder,
            settings,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    // Only configuration errors fail the call; unit failures land in the report.
    pub fn run(
        &self,
        request: &BatchRequest,
        now: DateTime<Utc>,
        sink: &dyn ProgressSink,
    ) -> Result<BatchReport, GribError> {
        let started = Instant::now();
        let model = self.registry.lookup(request.provider, &request.model)?;
        let run = most_recent_run(model, now);
        let plan = plan(model, run.hour(), request.max_step)?;
        let last_step = match plan.last() {
            Some(step) => step.to_string(),
            None => "-".to_string(),
        };

        info!(
            "[MAIN] Processing {} model for parameter {} up to step {} starting from {}",
            model.name, request.params, last_step, run
        );
        sink.event(ProgressEvent {
            message: format!(
                "phase=Plan; {} run {run}, {} steps x {} params",
                model.name,
                plan.len(),
                request.params.len()
            ),
            elapsed: None,
        });

        let outcomes = self.dispatch(model, &run, &plan, request, sink)?;

        let mut report = BatchReport {
            provider: request.provider,
            model: model.name.to_string(),
            run: run.to_string(),
            steps: plan.steps().to_vec(),
            units: plan.len() * request.params.len(),
            landed: Vec::new(),
            failures: Vec::new(),
        };
        for outcome in outcomes {
            match outcome {
                UnitOutcome::Landed(path) => report.landed.push(path.to_string()),
                UnitOutcome::Failed(failure) => {
                    error!("{failure}");
                    report.failures.push(failure);
                }
            }
        }
        report.landed.sort();

        let elapsed = started.elapsed();
        info!(
            "[MAIN] Finished {}: {} landed, {} failed in {:.1}s",
            model.name,
            report.landed.len(),
            report.failures.len(),
            elapsed.as_secs_f64()
        );
        sink.event(ProgressEvent {
            message: format!(
                "phase=Collected; {} landed, {} failed",
                report.landed.len(),
                report.failures.len()
            ),
            elapsed: Some(elapsed),
        });
        Ok(report)
    }

    fn dispatch(
        &self,
        model: &ModelDescriptor,
        run: &RunTimestamp,
        plan: &StepPlan,
        request: &BatchRequest,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<UnitOutcome>, GribError> {
        if plan.is_empty() {
            warn!("[MAIN] empty step plan for {}", model.name);
            return Ok(Vec::new());
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.settings.concurrency)
            .thread_name(|i| format!("gribdl-fetch-{i}"))
            .build()
            .map_err(|err| GribError::WorkerPool(err.to_string()))?;

        // Every unit reports exactly once, so senders never block.
        let capacity = (plan.len() * request.params.len()).max(1);
        let (tx, rx) = sync_channel::<UnitOutcome>(capacity);
        let worker = Worker::new(
            &self.source,
            &self.regridder,
            &self.store,
            self.settings.retry,
            self.settings.regrid,
        );
        let worker = &worker;

        pool.scope(|scope| match request.provider {
            Provider::Dwd => {
                for param in request.params.iter() {
                    for &step in plan.steps() {
                        let tx = tx.clone();
                        scope.spawn(move |_| {
                            let url = archive_url(model, param, run, step);
                            let unit = FetchUnit::archive(param, step, url);
                            let outcome = UnitOutcome::from(worker.land_archive(model, &unit));
                            report_unit(sink, &unit, &outcome);
                            let _ = tx.send(outcome);
                        });
                    }
                }
            }
            Provider::Noaa => {
                for &step in plan.steps() {
                    let tx = tx.clone();
                    scope.spawn(move |_| {
                        fetch_ranged_step(worker, model, run, step, request, sink, &tx);
                    });
                }
            }
        });
        drop(tx);

        Ok(rx.iter().collect())
    }
}

// One index fetch per step; its parameters are then fetched in turn.
fn fetch_ranged_step(
    worker: &Worker<'_>,
    model: &ModelDescriptor,
    run: &RunTimestamp,
    step: u32,
    request: &BatchRequest,
    sink: &dyn ProgressSink,
    tx: &SyncSender<UnitOutcome>,
) {
    let url = archive_url(model, "", run, step);
    let index = with_retries(worker.retry_policy(), Stage::Index, &url, || {
        resolve_index(worker.source(), &url)
    });
    let index = match index {
        Ok(index) => index,
        Err(err) => {
            let failure = UnitFailure::new(Stage::Index, &url, None, step, err);
            let _ = tx.send(UnitOutcome::Failed(failure));
            return;
        }
    };

    for param in request.params.iter() {
        let outcome = match index.lookup(param, &request.height) {
            Ok(range) => {
                let unit = FetchUnit::ranged(param, step, &request.height, &url, range);
                let outcome = UnitOutcome::from(worker.land_range(&unit));
                report_unit(sink, &unit, &outcome);
                outcome
            }
            Err(err) => {
                let failure = UnitFailure::new(Stage::Index, &url, Some(param), step, err);
                UnitOutcome::Failed(failure)
            }
        };
        let _ = tx.send(outcome);
    }
}

fn report_unit(sink: &dyn ProgressSink, unit: &FetchUnit, outcome: &UnitOutcome) {
    let message = match outcome {
        UnitOutcome::Landed(path) => format!("phase=Land; step {:03} -> {path}", unit.step),
        UnitOutcome::Failed(failure) => format!("phase=Land; {failure}"),
    };
    sink.event(ProgressEvent {
        message,
        elapsed: None,
    });
}
