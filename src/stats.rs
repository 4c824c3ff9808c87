use crate::platoon::{Platoon, PlatoonState};
use serde::Serialize;
use std::fmt;

/// Summary statistics of a simulation run, in vehicles rather than platoons.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RunStats {
    /// Vehicles in every trip created from the demand
    pub trips_generated: f64,
    /// Vehicles which reached their destination
    pub trips_completed: f64,
    /// Vehicles on a link when the run stopped
    pub trips_running: f64,
    /// Vehicles held in an origin queue
    pub trips_waiting: f64,
    /// Vehicles whose departure time was not reached
    pub trips_scheduled: f64,
    /// Total travel time of the completed trips in veh·s
    pub total_travel_time: f64,
    /// Mean travel time of a completed trip in s
    pub average_travel_time: f64,
    /// Mean free flow travel time of a completed trip in s
    pub average_free_flow_time: f64,
    /// Mean delay of a completed trip in s
    pub average_delay: f64,
    /// Total distance travelled by every vehicle in veh·m
    pub total_distance: f64,
    /// Steps executed
    pub steps: usize,
}

impl RunStats {
    pub(crate) fn compute<'a>(platoons: impl Iterator<Item = &'a Platoon>, steps: usize) -> Self {
        let mut stats = Self {
            steps,
            ..Default::default()
        };
        let mut free_flow_time = 0.0;
        let mut delay = 0.0;
        for platoon in platoons {
            let size = platoon.size();
            stats.trips_generated += size;
            stats.total_distance += platoon.distance() * size;
            match platoon.state() {
                PlatoonState::Scheduled => stats.trips_scheduled += size,
                PlatoonState::Waiting => stats.trips_waiting += size,
                PlatoonState::Running => stats.trips_running += size,
                PlatoonState::Completed => {
                    stats.trips_completed += size;
                    stats.total_travel_time += platoon.travel_time().unwrap_or_default() * size;
                    free_flow_time += platoon.route().free_flow_time() * size;
                    delay += platoon.delay().unwrap_or_default() * size;
                }
            }
        }
        if stats.trips_completed > 0.0 {
            stats.average_travel_time = stats.total_travel_time / stats.trips_completed;
            stats.average_free_flow_time = free_flow_time / stats.trips_completed;
            stats.average_delay = delay / stats.trips_completed;
        }
        stats
    }

    /// Vehicles not accounted for by any state. Always zero, up to rounding.
    pub fn unaccounted(&self) -> f64 {
        self.trips_generated
            - self.trips_completed
            - self.trips_running
            - self.trips_waiting
            - self.trips_scheduled
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "trips: {} generated, {} completed, {} running, {} waiting, {} scheduled",
            self.trips_generated,
            self.trips_completed,
            self.trips_running,
            self.trips_waiting,
            self.trips_scheduled
        )?;
        writeln!(
            f,
            "travel time: {:.1} s total, {:.2} s average, {:.2} s free flow, {:.2} s delay",
            self.total_travel_time,
            self.average_travel_time,
            self.average_free_flow_time,
            self.average_delay
        )?;
        write!(
            f,
            "distance: {:.1} km over {} steps",
            self.total_distance / 1000.0,
            self.steps
        )
    }
}
