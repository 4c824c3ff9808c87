use crate::error::{positive, Error, Result};

/// Relative tolerance when checking a given wave speed against the derived one.
const WAVE_SPEED_TOLERANCE: f64 = 1e-6;

/// A triangular fundamental diagram.
///
/// The congested branch follows from Newell's simplified car following model:
/// each vehicle keeps a jam spacing of `1/kappa` and reacts to its leader
/// after `tau` seconds, so the backward wave travels at `w = 1/(tau*kappa)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FundamentalDiagram {
    /// Free flow speed in m/s.
    u: f64,
    /// Jam density in veh/m.
    kappa: f64,
    /// Backward wave speed in m/s.
    w: f64,
    /// Reaction time in s.
    tau: f64,
}

impl FundamentalDiagram {
    /// Creates a fundamental diagram, deriving the wave speed from the reaction time.
    pub fn new(free_flow_speed: f64, jam_density: f64, reaction_time: f64) -> Result<Self> {
        let u = positive("free_flow_speed", free_flow_speed)?;
        let kappa = positive("jam_density", jam_density)?;
        let tau = positive("reaction_time", reaction_time)?;
        Ok(Self {
            u,
            kappa,
            w: 1.0 / (tau * kappa),
            tau,
        })
    }

    /// Creates a fundamental diagram with an explicit wave speed,
    /// which must agree with the reaction time and jam density.
    pub fn with_wave_speed(
        free_flow_speed: f64,
        jam_density: f64,
        reaction_time: f64,
        wave_speed: f64,
    ) -> Result<Self> {
        let fd = Self::new(free_flow_speed, jam_density, reaction_time)?;
        let given = positive("wave_speed", wave_speed)?;
        if (given - fd.w).abs() > WAVE_SPEED_TOLERANCE * fd.w {
            return Err(Error::InconsistentWaveSpeed {
                given,
                expected: fd.w,
            });
        }
        Ok(fd)
    }

    /// The free flow speed in m/s.
    pub fn free_flow_speed(&self) -> f64 {
        self.u
    }

    /// The jam density in veh/m.
    pub fn jam_density(&self) -> f64 {
        self.kappa
    }

    /// The backward wave speed in m/s.
    pub fn wave_speed(&self) -> f64 {
        self.w
    }

    /// The reaction time in s.
    pub fn reaction_time(&self) -> f64 {
        self.tau
    }

    /// The jam spacing of a single vehicle in m.
    pub fn jam_spacing(&self) -> f64 {
        1.0 / self.kappa
    }

    /// The critical density `k*` in veh/m, at which flow is maximised.
    pub fn critical_density(&self) -> f64 {
        self.kappa * self.w / (self.u + self.w)
    }

    /// The capacity `q*` in veh/s.
    pub fn capacity(&self) -> f64 {
        self.u * self.critical_density()
    }

    /// Evaluates the flow in veh/s at the given density.
    ///
    /// Densities outside of `[0, kappa]` are clamped.
    pub fn flow(&self, density: f64) -> f64 {
        let k = density.clamp(0.0, self.kappa);
        if k <= self.critical_density() {
            self.u * k
        } else {
            self.w * (self.kappa - k)
        }
    }

    /// The speed in m/s at the given density.
    pub fn speed(&self, density: f64) -> f64 {
        if density <= self.critical_density() {
            self.u
        } else {
            self.flow(density) / density
        }
    }

    /// The density on the congested branch that carries the given flow.
    pub fn congested_density(&self, flow: f64) -> f64 {
        let q = flow.clamp(0.0, self.capacity());
        self.kappa - q / self.w
    }

    /// The density on the free flow branch that carries the given flow.
    pub fn free_flow_density(&self, flow: f64) -> f64 {
        flow.clamp(0.0, self.capacity()) / self.u
    }
}
