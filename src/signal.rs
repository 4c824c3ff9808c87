use crate::error::{non_negative, Error, Result};
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

/// The traffic control at a node.
#[derive(Clone, Debug, Default)]
pub enum Signal {
    /// Every incoming link may always send.
    #[default]
    NoSignal,
    /// A fixed time plan which cycles through its phases.
    FixedCycle(SignalPlan),
}

/// A single phase of a fixed time signal plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalPhase {
    /// The duration of the phase in s.
    pub duration: f64,
    /// The signal groups shown green during the phase.
    /// An incoming link is active when its `signal_group` is in this set.
    pub green_groups: SmallVec<[u32; 4]>,
}

/// The state of a fixed time signal plan.
#[derive(Clone, Debug)]
pub struct SignalPlan {
    /// The phases, in order.
    phases: Vec<SignalPhase>,
    /// The index of the current phase.
    phase: usize,
    /// The time spent in the current phase, in s.
    elapsed: f64,
}

impl Signal {
    /// Creates a signal with one phase per duration, where phase `i` shows
    /// green to signal group `i`.
    ///
    /// An empty list or a single phase means the node is uncontrolled.
    pub fn from_durations(durations: &[f64]) -> Result<Self> {
        if durations.len() <= 1 {
            return Ok(Signal::NoSignal);
        }
        let phases = durations
            .iter()
            .enumerate()
            .map(|(group, duration)| SignalPhase {
                duration: *duration,
                green_groups: smallvec![group as u32],
            })
            .collect();
        Self::fixed_cycle(phases)
    }

    /// Creates a fixed time signal from a list of phases.
    pub fn fixed_cycle(phases: Vec<SignalPhase>) -> Result<Self> {
        for phase in &phases {
            non_negative("signal phase duration", phase.duration)?;
        }
        let cycle = phases.iter().map(|p| p.duration).sum::<f64>();
        if phases.is_empty() || cycle <= 0.0 {
            return Err(Error::EmptySignalCycle);
        }
        Ok(Signal::FixedCycle(SignalPlan {
            phases,
            phase: 0,
            elapsed: 0.0,
        }))
    }

    /// Advances the signal timing by one step of `dt` seconds.
    pub(crate) fn step(&mut self, dt: f64) {
        if let Signal::FixedCycle(plan) = self {
            plan.step(dt);
        }
    }

    /// Whether a link in the given signal group may send this step.
    pub fn is_green(&self, group: u32) -> bool {
        match self {
            Signal::NoSignal => true,
            Signal::FixedCycle(plan) => plan.current().green_groups.contains(&group),
        }
    }

    /// The index of the current phase, if the node is signalised.
    pub fn phase(&self) -> Option<usize> {
        match self {
            Signal::NoSignal => None,
            Signal::FixedCycle(plan) => Some(plan.phase),
        }
    }
}

impl SignalPlan {
    /// The phases of the plan.
    pub fn phases(&self) -> &[SignalPhase] {
        &self.phases
    }

    /// The total cycle length in s.
    pub fn cycle_length(&self) -> f64 {
        self.phases.iter().map(|p| p.duration).sum()
    }

    fn current(&self) -> &SignalPhase {
        &self.phases[self.phase]
    }

    /// Moves to the next phase once the current one has run its duration.
    fn step(&mut self, dt: f64) {
        if self.elapsed > self.current().duration {
            self.phase = (self.phase + 1) % self.phases.len();
            self.elapsed = 0.0;
        }
        self.elapsed += dt;
    }
}
