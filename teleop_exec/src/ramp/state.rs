//! Implementations for the RampCtrl state structure

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::trace;
use serde::Serialize;

// Internal
use super::{Params, RampCtrlError};
use util::{maths::clamp, module::State, params, session::Session};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Normalised actuator demands for the vehicle.
///
/// Engine and steering always lie in [-1, 1] and brake in [0, 1]. RampCtrl enforces the bounds
/// on every tick, so a state that has been through `proc` can be dispatched without further
/// checks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ActuatorState {
    /// Forward/reverse drive command
    pub engine: f64,

    /// Lateral control command
    pub steering: f64,

    /// Braking command. Never ramped.
    pub brake: f64
}

/// Ramp control module state
#[derive(Default)]
pub struct RampCtrl {
    pub(crate) params: Params,

    report: StatusReport,

    /// The actuator state output on the previous tick
    current: ActuatorState
}

/// Input data to ramp control.
#[derive(Clone, Copy, Default)]
pub struct InputData {
    /// The actuator targets to move toward on this tick.
    pub target: ActuatorState
}

/// Status report for ramp control processing.
#[derive(Clone, Copy, Default, Serialize, Debug)]
pub struct StatusReport {
    /// True if any actuator value changed on this tick
    pub changed: bool,

    /// True if the engine target was clamped to its bounds
    pub engine_limited: bool,

    /// True if the steering target was clamped to its bounds
    pub steer_limited: bool,

    /// True if the brake target was clamped to its bounds
    pub brake_limited: bool
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ActuatorState {
    /// A full stop demand: no drive, centred steering, full brake.
    pub fn full_stop() -> Self {
        Self {
            engine: 0.0,
            steering: 0.0,
            brake: 1.0
        }
    }
}

impl State for RampCtrl {
    type InitData = &'static str;
    type InitError = RampCtrlError;

    type InputData = InputData;
    type OutputData = ActuatorState;
    type StatusReport = StatusReport;
    type ProcError = RampCtrlError;

    /// Initialise the RampCtrl module.
    ///
    /// Expected init data is the path to the parameter file
    fn init(&mut self, init_data: Self::InitData, _session: &Session)
        -> Result<(), Self::InitError>
    {
        // Load the parameters
        self.params = params::load(init_data)
            .map_err(RampCtrlError::ParamLoadError)?;

        // A zero or negative step could never reach its target
        if self.params.engine_step <= 0.0 || self.params.steer_step <= 0.0 {
            return Err(RampCtrlError::NonPositiveStep(
                self.params.engine_step,
                self.params.steer_step
            ));
        }

        Ok(())
    }

    /// Advance the actuator state one tick toward the target.
    ///
    /// Engine and steering move by at most their per-tick step and reach the target exactly,
    /// never overshooting. The brake is passed straight through. A nonzero brake target forces
    /// the engine and steering targets to zero on this same tick, the values then ramp down
    /// while the brake is already applied.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        // Clear the status report
        self.report = StatusReport::default();

        let mut target = input_data.target;

        // Clamp the targets to the actuator bounds, raising the limit flags
        let engine_clamped = clamp(target.engine, -1.0, 1.0);
        self.report.engine_limited = engine_clamped != target.engine;
        target.engine = engine_clamped;

        let steering_clamped = clamp(target.steering, -1.0, 1.0);
        self.report.steer_limited = steering_clamped != target.steering;
        target.steering = steering_clamped;

        let brake_clamped = clamp(target.brake, 0.0, 1.0);
        self.report.brake_limited = brake_clamped != target.brake;
        target.brake = brake_clamped;

        // Braking overrides drive and steering
        if target.brake > 0.0 {
            target.engine = 0.0;
            target.steering = 0.0;
        }

        let next = ActuatorState {
            engine: ramp_axis(self.current.engine, target.engine, self.params.engine_step),
            steering: ramp_axis(self.current.steering, target.steering, self.params.steer_step),
            // Delayed braking is a safety issue, the brake is never ramped
            brake: target.brake
        };

        self.report.changed = next != self.current;
        self.current = next;

        trace!(
            "RampCtrl output: engine {:.3}, steering {:.3}, brake {:.3}",
            next.engine, next.steering, next.brake
        );

        Ok((next, self.report))
    }
}

impl RampCtrl {
    /// Create a ramp controller with the given parameters, without loading a parameter file.
    pub fn with_params(params: Params) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    /// The actuator state output on the last tick.
    pub fn current(&self) -> ActuatorState {
        self.current
    }

    /// Set the actuator state directly, bypassing the ramp.
    ///
    /// Used by input sources that accumulate their own values per keypress rather than supplying
    /// targets. Bounds and the brake override are still enforced.
    pub fn set_direct(&mut self, state: ActuatorState) -> (ActuatorState, StatusReport) {
        self.report = StatusReport::default();

        let mut next = state;

        let engine_clamped = clamp(next.engine, -1.0, 1.0);
        self.report.engine_limited = engine_clamped != next.engine;
        next.engine = engine_clamped;

        let steering_clamped = clamp(next.steering, -1.0, 1.0);
        self.report.steer_limited = steering_clamped != next.steering;
        next.steering = steering_clamped;

        let brake_clamped = clamp(next.brake, 0.0, 1.0);
        self.report.brake_limited = brake_clamped != next.brake;
        next.brake = brake_clamped;

        if next.brake > 0.0 {
            next.engine = 0.0;
        }

        self.report.changed = next != self.current;
        self.current = next;

        (next, self.report)
    }

    /// Reset the actuator state to neutral, performed on shutdown.
    pub fn make_neutral(&mut self) {
        self.current = ActuatorState::default();
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Move one axis toward its target, bounded by the given step.
fn ramp_axis(current: f64, target: f64, step: f64) -> f64 {
    if current < target {
        (current + step).min(target)
    }
    else if current > target {
        (current - step).max(target)
    }
    else {
        current
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;

    use super::*;

    fn ramp() -> RampCtrl {
        RampCtrl::with_params(Params {
            engine_step: 0.02,
            steer_step: 0.05
        })
    }

    #[test]
    fn test_ramp_bound() {
        let mut ramp = ramp();
        let target = ActuatorState {
            engine: 1.0,
            steering: -1.0,
            brake: 0.0
        };

        let mut prev = ramp.current();

        for _ in 0..100 {
            let (next, _) = ramp.proc(&InputData { target }).unwrap();

            assert!((next.engine - prev.engine).abs() <= 0.02 + f64::EPSILON);
            assert!((next.steering - prev.steering).abs() <= 0.05 + f64::EPSILON);

            prev = next;
        }
    }

    #[test]
    fn test_exact_arrival() {
        // engine_step 0.02 from 0 to 1 must arrive exactly at tick 50, no overshoot
        let mut ramp = ramp();
        let target = ActuatorState {
            engine: 1.0,
            ..Default::default()
        };

        for _ in 0..49 {
            let (next, _) = ramp.proc(&InputData { target }).unwrap();
            assert!(next.engine < 1.0);
        }

        let (next, report) = ramp.proc(&InputData { target }).unwrap();
        assert_eq!(next.engine, 1.0);
        assert!(report.changed);

        // Steady state, nothing changes any more
        let (next, report) = ramp.proc(&InputData { target }).unwrap();
        assert_eq!(next.engine, 1.0);
        assert!(!report.changed);
    }

    #[test]
    fn test_brake_not_ramped() {
        let mut ramp = ramp();

        // Drive up to some speed first
        let drive = ActuatorState {
            engine: 1.0,
            ..Default::default()
        };
        for _ in 0..30 {
            ramp.proc(&InputData { target: drive }).unwrap();
        }
        let engine_before = ramp.current().engine;
        assert_relative_eq!(engine_before, 0.6, max_relative = 1e-9);

        // Full brake: brake applies on this very tick, engine ramps down one step only
        let braking = ActuatorState {
            engine: 1.0,
            steering: 0.0,
            brake: 1.0
        };
        let (next, _) = ramp.proc(&InputData { target: braking }).unwrap();

        assert_eq!(next.brake, 1.0);
        assert_relative_eq!(next.engine, engine_before - 0.02, max_relative = 1e-9);
    }

    #[test]
    fn test_target_limits() {
        let mut ramp = ramp();
        let target = ActuatorState {
            engine: 2.0,
            steering: -3.0,
            brake: 1.5
        };

        let (next, report) = ramp.proc(&InputData { target }).unwrap();

        assert!(report.engine_limited);
        assert!(report.steer_limited);
        assert!(report.brake_limited);

        // Brake is clamped then applied directly, and forces the other targets to zero so the
        // limited values never actually drive the axes
        assert_eq!(next.brake, 1.0);
        assert_eq!(next.engine, 0.0);
        assert_eq!(next.steering, 0.0);
    }

    #[test]
    fn test_set_direct() {
        let mut ramp = ramp();

        let (next, report) = ramp.set_direct(ActuatorState {
            engine: 1.7,
            steering: 0.3,
            brake: 0.0
        });

        // No ramping on the direct path, only clamping
        assert_eq!(next.engine, 1.0);
        assert_eq!(next.steering, 0.3);
        assert!(report.changed);
        assert!(report.engine_limited);

        let (_, report) = ramp.set_direct(ActuatorState {
            engine: 1.0,
            steering: 0.3,
            brake: 0.0
        });
        assert!(!report.changed);

        // A braking state zeroes the engine immediately
        let (next, _) = ramp.set_direct(ActuatorState {
            engine: 0.5,
            steering: 0.0,
            brake: 1.0
        });
        assert_eq!(next.engine, 0.0);
        assert_eq!(next.brake, 1.0);
    }

    #[test]
    fn test_make_neutral() {
        let mut ramp = ramp();
        ramp.set_direct(ActuatorState {
            engine: 0.4,
            steering: 0.1,
            brake: 0.0
        });

        ramp.make_neutral();
        assert_eq!(ramp.current(), ActuatorState::default());
    }
}
