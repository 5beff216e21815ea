//! # Command Dispatcher
//!
//! Runs the fixed-cadence teleoperation loop: sample the input source, advance the ramp, and
//! issue the resulting command to the vehicle, for as long as the shared run flag holds.
//!
//! Individual command sends are best effort. A command is an idempotent snapshot rather than a
//! delta, so a dropped or stale send self-corrects within one ramp step, and transport failures
//! are logged and counted rather than propagated. Failing to establish actuation authority
//! before the loop is the one fatal case, the error is returned and the caller must bring the
//! whole process down rather than leave the input context running ownerless.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::thread;
use std::time::{Duration, Instant};

use log::{error, info, warn};
use serde::Deserialize;

use util::module::State;

use crate::input::key_state::SharedRunState;
use crate::input::{InputIntent, InputSampler};
use crate::ramp::{ActuatorState, InputData, RampCtrl};
use crate::rover::{RoverError, RoverInterface};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for the command dispatcher
#[derive(Clone, Deserialize)]
pub struct Params {
    /// Target period of one dispatch tick in seconds
    pub cycle_period_s: f64,

    /// Commands are sent while the engine or steering magnitude exceeds this value, even on
    /// ticks which produced no change
    pub dispatch_epsilon: f64,

    /// Number of consecutive send failures at which the failure is escalated to an error log
    pub max_consec_send_errors: u64
}

/// The command dispatcher.
///
/// Generic over the input sampler and the vehicle interface so that both seams can be mocked in
/// tests.
pub struct CommandDispatcher<S, V> {
    params: Params,
    sampler: S,
    vehicle: V,
    ramp: RampCtrl,
    run_state: SharedRunState,

    /// Number of consecutive command sends that have failed
    num_consec_send_errors: u64
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Could not establish actuation authority: {0}")]
    AuthorityError(RoverError)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            cycle_period_s: 0.02,
            dispatch_epsilon: 0.01,
            max_consec_send_errors: 5
        }
    }
}

impl<S: InputSampler, V: RoverInterface> CommandDispatcher<S, V> {
    pub fn new(
        params: Params,
        sampler: S,
        vehicle: V,
        ramp: RampCtrl,
        run_state: SharedRunState
    ) -> Self {
        Self {
            params,
            sampler,
            vehicle,
            ramp,
            run_state,
            num_consec_send_errors: 0
        }
    }

    /// Run the dispatch loop until the run flag clears or the sampler requests quit.
    ///
    /// Establishes actuation authority (enable then arm) before the first tick. On exit the
    /// vehicle is brought to a full stop and authority is released exactly once, whatever ended
    /// the loop.
    pub fn run(mut self) -> Result<V, DispatchError> {
        self.vehicle
            .enable_api_control()
            .map_err(DispatchError::AuthorityError)?;
        self.vehicle.arm().map_err(DispatchError::AuthorityError)?;

        info!("Actuation authority established, beginning dispatch loop");

        while self.run_state.is_running() {
            // Get cycle start time
            let cycle_start_instant = Instant::now();

            if !self.tick() {
                break;
            }

            // ---- CYCLE MANAGEMENT ----

            let cycle_dur = Instant::now() - cycle_start_instant;

            match Duration::from_secs_f64(self.params.cycle_period_s).checked_sub(cycle_dur) {
                Some(d) => thread::sleep(d),
                None => warn!(
                    "Dispatch tick overran by {:.06} s",
                    cycle_dur.as_secs_f64() - self.params.cycle_period_s
                )
            }
        }

        self.shutdown()
    }

    /// Process one dispatch tick. Returns false if the sampler requested quit.
    fn tick(&mut self) -> bool {
        let (new_state, changed) = match self.sampler.sample() {
            InputIntent::Ramp(target) => match self.ramp.proc(&InputData { target }) {
                Ok((state, report)) => (state, report.changed),
                Err(e) => {
                    // A ramp error means a bad target, skip this tick and try again on the next
                    warn!("Error during RampCtrl processing: {}", e);
                    return true;
                }
            },
            InputIntent::Set(state) => {
                let (state, report) = self.ramp.set_direct(state);
                (state, report.changed)
            }
            InputIntent::Quit => {
                self.run_state.stop();
                return false;
            }
        };

        // Redundant all-zero commands are suppressed, but a deceleration back to zero must keep
        // sending until the magnitudes die out
        if changed
            || new_state.engine.abs() > self.params.dispatch_epsilon
            || new_state.steering.abs() > self.params.dispatch_epsilon
        {
            self.send(new_state);
        }

        true
    }

    /// Send one command to the vehicle, best effort.
    fn send(&mut self, state: ActuatorState) {
        match self
            .vehicle
            .set_rover_controls(state.engine, state.steering, state.brake)
        {
            Ok(()) => {
                self.num_consec_send_errors = 0;
            }
            Err(e) => {
                self.num_consec_send_errors += 1;

                warn!("Could not send controls to the vehicle: {}", e);

                // Escalate once when a run of failures stops looking like a transient blip
                if self.num_consec_send_errors == self.params.max_consec_send_errors {
                    error!(
                        "{} consecutive control sends have failed, is the simulation server \
                         still alive?",
                        self.num_consec_send_errors
                    );
                }
            }
        }
    }

    /// Send the final full-stop command and release actuation authority.
    fn shutdown(mut self) -> Result<V, DispatchError> {
        info!("Teleop stopping: braking and releasing actuation authority");

        let full_stop = ActuatorState::full_stop();
        if let Err(e) =
            self.vehicle
                .set_rover_controls(full_stop.engine, full_stop.steering, full_stop.brake)
        {
            warn!("Could not send the final stop command: {}", e);
        }

        self.ramp.make_neutral();

        if let Err(e) = self.vehicle.disarm() {
            warn!("Could not disarm the vehicle: {}", e);
        }
        if let Err(e) = self.vehicle.disable_api_control() {
            warn!("Could not disable API control of the vehicle: {}", e);
        }

        Ok(self.vehicle)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use super::*;
    use crate::input::key_state::RunState;
    use crate::ramp;
    use crate::sim_client::SimSessionError;

    /// What the mock vehicle saw, in call order.
    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Enable,
        Disable,
        Arm,
        Disarm,
        Controls(ActuatorState)
    }

    /// Recording vehicle mock.
    struct MockRover {
        calls: Mutex<Vec<Call>>,
        fail_authority: bool,
        fail_sends: bool
    }

    impl MockRover {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_authority: false,
                fail_sends: false
            }
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn transport_error() -> RoverError {
            RoverError::RequestError(SimSessionError::ResponseTimeout)
        }
    }

    impl RoverInterface for MockRover {
        fn enable_api_control(&self) -> Result<(), RoverError> {
            if self.fail_authority {
                return Err(Self::transport_error());
            }
            self.record(Call::Enable);
            Ok(())
        }

        fn disable_api_control(&self) -> Result<(), RoverError> {
            self.record(Call::Disable);
            Ok(())
        }

        fn arm(&self) -> Result<(), RoverError> {
            self.record(Call::Arm);
            Ok(())
        }

        fn disarm(&self) -> Result<(), RoverError> {
            self.record(Call::Disarm);
            Ok(())
        }

        fn set_rover_controls(
            &self,
            engine: f64,
            steering_angle: f64,
            brake: f64
        ) -> Result<(), RoverError> {
            if self.fail_sends {
                return Err(Self::transport_error());
            }
            self.record(Call::Controls(ActuatorState {
                engine,
                steering: steering_angle,
                brake
            }));
            Ok(())
        }
    }

    /// Sampler that yields a fixed intent a number of times, then quits.
    struct ScriptedSampler {
        intent: InputIntent,
        remaining: usize
    }

    impl InputSampler for ScriptedSampler {
        fn sample(&mut self) -> InputIntent {
            if self.remaining == 0 {
                return InputIntent::Quit;
            }
            self.remaining -= 1;
            self.intent
        }
    }

    fn fast_params() -> Params {
        Params {
            cycle_period_s: 0.001,
            ..Default::default()
        }
    }

    fn test_ramp() -> RampCtrl {
        RampCtrl::with_params(ramp::Params {
            engine_step: 0.02,
            steer_step: 0.05
        })
    }

    #[test]
    fn test_shutdown_sequence() {
        let sampler = ScriptedSampler {
            intent: InputIntent::Ramp(ActuatorState {
                engine: 1.0,
                ..Default::default()
            }),
            remaining: 3
        };

        let dispatcher = CommandDispatcher::new(
            fast_params(),
            sampler,
            MockRover::new(),
            test_ramp(),
            RunState::new()
        );

        let vehicle = dispatcher.run().unwrap();
        let calls = vehicle.calls();

        // Authority established first
        assert_eq!(calls[0], Call::Enable);
        assert_eq!(calls[1], Call::Arm);

        // The last command is the full stop, then authority is released exactly once
        let n = calls.len();
        assert_eq!(
            calls[n - 3],
            Call::Controls(ActuatorState {
                engine: 0.0,
                steering: 0.0,
                brake: 1.0
            })
        );
        assert_eq!(calls[n - 2], Call::Disarm);
        assert_eq!(calls[n - 1], Call::Disable);

        assert_eq!(calls.iter().filter(|c| **c == Call::Disarm).count(), 1);
        assert_eq!(calls.iter().filter(|c| **c == Call::Disable).count(), 1);
    }

    #[test]
    fn test_ramped_commands_bounded() {
        let sampler = ScriptedSampler {
            intent: InputIntent::Ramp(ActuatorState {
                engine: 1.0,
                ..Default::default()
            }),
            remaining: 5
        };

        let dispatcher = CommandDispatcher::new(
            fast_params(),
            sampler,
            MockRover::new(),
            test_ramp(),
            RunState::new()
        );

        let vehicle = dispatcher.run().unwrap();
        let calls = vehicle.calls();

        // Five ramped ticks, each one engine step further on
        let commands: Vec<ActuatorState> = calls
            .iter()
            .filter_map(|c| match c {
                Call::Controls(s) => Some(*s),
                _ => None
            })
            .collect();

        // Five ramp ticks plus the final stop
        assert_eq!(commands.len(), 6);

        let mut prev = 0.0;
        for command in &commands[..5] {
            assert!(command.engine - prev <= 0.02 + f64::EPSILON);
            assert!(command.engine > prev);
            prev = command.engine;
        }
    }

    #[test]
    fn test_zero_commands_suppressed() {
        // A neutral direct-set produces no change and no magnitude, so nothing is sent until
        // the final stop command
        let sampler = ScriptedSampler {
            intent: InputIntent::Set(ActuatorState::default()),
            remaining: 4
        };

        let dispatcher = CommandDispatcher::new(
            fast_params(),
            sampler,
            MockRover::new(),
            test_ramp(),
            RunState::new()
        );

        let vehicle = dispatcher.run().unwrap();
        let calls = vehicle.calls();

        let num_commands = calls
            .iter()
            .filter(|c| matches!(c, Call::Controls(_)))
            .count();
        assert_eq!(num_commands, 1);
    }

    #[test]
    fn test_authority_failure_is_fatal() {
        let sampler = ScriptedSampler {
            intent: InputIntent::Quit,
            remaining: 0
        };

        let mut vehicle = MockRover::new();
        vehicle.fail_authority = true;

        let dispatcher = CommandDispatcher::new(
            fast_params(),
            sampler,
            vehicle,
            test_ramp(),
            RunState::new()
        );

        assert!(matches!(
            dispatcher.run(),
            Err(DispatchError::AuthorityError(_))
        ));
    }

    #[test]
    fn test_send_failures_not_fatal() {
        let sampler = ScriptedSampler {
            intent: InputIntent::Ramp(ActuatorState {
                engine: 1.0,
                ..Default::default()
            }),
            remaining: 10
        };

        let mut vehicle = MockRover::new();
        vehicle.fail_sends = true;

        let dispatcher = CommandDispatcher::new(
            fast_params(),
            sampler,
            vehicle,
            test_ramp(),
            RunState::new()
        );

        // Every send fails, well past the escalation limit, yet the loop finishes cleanly and
        // still releases authority
        let vehicle = dispatcher.run().unwrap();
        let calls = vehicle.calls();

        assert!(calls.contains(&Call::Disarm));
        assert!(calls.contains(&Call::Disable));
    }

    #[test]
    fn test_quit_clears_run_flag() {
        let sampler = ScriptedSampler {
            intent: InputIntent::Quit,
            remaining: 0
        };

        let run_state = RunState::new();

        let dispatcher = CommandDispatcher::new(
            fast_params(),
            sampler,
            MockRover::new(),
            test_ramp(),
            run_state.clone()
        );

        dispatcher.run().unwrap();
        assert!(!run_state.is_running());
    }
}
