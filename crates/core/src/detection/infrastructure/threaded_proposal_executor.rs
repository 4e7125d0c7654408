use std::sync::atomic::{AtomicBool, Ordering};

use crate::detection::domain::candidate::CandidateSet;
use crate::detection::domain::errors::{ConfigError, ModelError};
use crate::detection::domain::proposal_executor::{ProposalExecutor, ProposalJob};

type ScaleResult = (usize, Result<CandidateSet, ModelError>);

/// Runs the per-scale proposal work on a fixed pool of scoped threads.
///
/// Layout: `scales → [worker × N] → ordered merge`
///
/// Results are reassembled by scale index, so the output is identical to
/// [`crate::detection::domain::proposal_executor::SequentialProposalExecutor`].
/// After the first failure no new scales are started, and the failure with
/// the lowest scale index is reported.
#[derive(Clone, Copy, Debug)]
pub struct ThreadedProposalExecutor {
    workers: usize,
}

impl ThreadedProposalExecutor {
    pub fn new(workers: usize) -> Result<Self, ConfigError> {
        if workers == 0 {
            return Err(ConfigError::Workers);
        }
        Ok(Self { workers })
    }
}

impl ProposalExecutor for ThreadedProposalExecutor {
    fn run(&self, scales: &[f64], job: &ProposalJob<'_>) -> Result<Vec<CandidateSet>, ModelError> {
        let workers = self.workers.min(scales.len());
        if workers == 0 {
            return Ok(Vec::new());
        }

        let (scale_tx, scale_rx) = crossbeam_channel::bounded::<(usize, f64)>(scales.len());
        for (index, &scale) in scales.iter().enumerate() {
            // Capacity covers every scale, and the receiver is still alive.
            let _ = scale_tx.send((index, scale));
        }
        drop(scale_tx);

        let (result_tx, result_rx) = crossbeam_channel::bounded::<ScaleResult>(scales.len());
        let failed = AtomicBool::new(false);

        let panicked = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let scale_rx = scale_rx.clone();
                    let result_tx = result_tx.clone();
                    let failed = &failed;
                    scope.spawn(move || {
                        for (index, scale) in scale_rx {
                            if failed.load(Ordering::Relaxed) {
                                break;
                            }
                            let result = job(index, scale);
                            if result.is_err() {
                                failed.store(true, Ordering::Relaxed);
                            }
                            if result_tx.send((index, result)).is_err() {
                                break;
                            }
                        }
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join())
                .filter(Result::is_err)
                .count()
        });
        drop(result_tx);

        if panicked > 0 {
            log::error!("{panicked} proposal worker(s) panicked");
            return Err(ModelError::WorkerPanicked);
        }

        merge_ordered(scales.len(), result_rx)
    }
}

fn merge_ordered(
    len: usize,
    results: crossbeam_channel::Receiver<ScaleResult>,
) -> Result<Vec<CandidateSet>, ModelError> {
    let mut slots: Vec<Option<CandidateSet>> = vec![None; len];
    let mut first_error: Option<(usize, ModelError)> = None;

    for (index, result) in results {
        match result {
            Ok(candidates) => slots[index] = Some(candidates),
            Err(e) => {
                let lower = first_error.as_ref().map_or(true, |(i, _)| index < *i);
                if lower {
                    first_error = Some((index, e));
                }
            }
        }
    }

    if let Some((_, e)) = first_error {
        return Err(e);
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| ModelError::Transform(format!("scale {index} produced no result")))
        })
        .collect()
}
