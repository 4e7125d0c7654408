use super::candidate::CandidateSet;
use super::errors::ModelError;

/// Work for one pyramid level: `(scale index, scale) -> candidates`.
pub type ProposalJob<'a> = dyn Fn(usize, f64) -> Result<CandidateSet, ModelError> + Sync + 'a;

/// Runs the per-scale proposal work of Stage 1.
///
/// Scales are independent of each other, so implementations may run them
/// concurrently, but must return the results in the order of `scales`:
/// downstream suppression breaks ties by position.
pub trait ProposalExecutor: Send + Sync {
    fn run(&self, scales: &[f64], job: &ProposalJob<'_>) -> Result<Vec<CandidateSet>, ModelError>;
}

/// Runs every scale on the calling thread, stopping at the first error.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialProposalExecutor;

impl ProposalExecutor for SequentialProposalExecutor {
    fn run(&self, scales: &[f64], job: &ProposalJob<'_>) -> Result<Vec<CandidateSet>, ModelError> {
        scales
            .iter()
            .enumerate()
            .map(|(index, &scale)| job(index, scale))
            .collect()
    }
}
