use std::fmt;
use std::time::Duration;

use super::scoring_stage::StageKind;

/// Progress of one pass through the cascade.
///
/// `Empty` is absorbing: it is entered from any stage whose candidate set
/// runs dry, and the remaining stages are skipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CascadeState {
    Init,
    Stage1,
    Stage1Nms,
    Stage2,
    Stage2Nms,
    Stage3,
    Stage3Nms,
    Done,
    Empty,
}

impl fmt::Display for CascadeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CascadeState::Init => "init",
            CascadeState::Stage1 => "stage 1",
            CascadeState::Stage1Nms => "stage 1 nms",
            CascadeState::Stage2 => "stage 2",
            CascadeState::Stage2Nms => "stage 2 nms",
            CascadeState::Stage3 => "stage 3",
            CascadeState::Stage3Nms => "stage 3 nms",
            CascadeState::Done => "done",
            CascadeState::Empty => "empty",
        };
        f.pad(name)
    }
}

/// Candidate counts and stage timings collected during one detection.
#[derive(Clone, Debug, PartialEq)]
pub struct CascadeStats {
    scales: usize,
    state: CascadeState,
    counts: Vec<(CascadeState, usize)>,
    timings: Vec<(StageKind, Duration)>,
}

impl CascadeStats {
    pub fn new(scales: usize) -> Self {
        Self {
            scales,
            state: CascadeState::Init,
            counts: Vec::new(),
            timings: Vec::new(),
        }
    }

    /// Enter `state` with `count` surviving candidates.
    ///
    /// Returns `false` (and moves to [`CascadeState::Empty`]) when nothing
    /// survived.
    pub fn advance(&mut self, state: CascadeState, count: usize) -> bool {
        log::debug!("{state}: {count} candidates");
        self.counts.push((state, count));
        if count == 0 {
            self.state = CascadeState::Empty;
            false
        } else {
            self.state = state;
            true
        }
    }

    pub fn finish(&mut self) {
        if self.state != CascadeState::Empty {
            self.state = CascadeState::Done;
        }
    }

    pub fn record_timing(&mut self, stage: StageKind, elapsed: Duration) {
        self.timings.push((stage, elapsed));
    }

    pub fn scales(&self) -> usize {
        self.scales
    }

    pub fn state(&self) -> CascadeState {
        self.state
    }

    /// Candidates alive after `state`, if the pass got that far.
    pub fn count(&self, state: CascadeState) -> Option<usize> {
        self.counts
            .iter()
            .find(|(s, _)| *s == state)
            .map(|&(_, n)| n)
    }

    pub fn timing(&self, stage: StageKind) -> Option<Duration> {
        self.timings
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|&(_, d)| d)
    }

    pub fn summary_string(&self) -> String {
        let total: Duration = self.timings.iter().map(|(_, d)| *d).sum();
        let mut lines = vec![format!(
            "Cascade summary ({} scales, {:.1}ms, {}):",
            self.scales,
            total.as_secs_f64() * 1000.0,
            self.state
        )];
        for (stage, elapsed) in &self.timings {
            lines.push(format!(
                "  {stage:10}: {:7.1}ms",
                elapsed.as_secs_f64() * 1000.0
            ));
        }
        for (state, count) in &self.counts {
            lines.push(format!("  {:12} {count:6} candidates", format!("{state}:")));
        }
        lines.join("\n")
    }
}
