//! # RC Channel Forwarding
//!
//! Forwards a game-controller channel vector to a flight controller's RC input at a fixed
//! cadence. The physical controller is abstracted behind [`ChannelSource`], how channel indices
//! map onto flight-controller functions is the server's concern, this module only normalises
//! the raw values and keeps the stream flowing while the run flag holds.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};
use serde::Deserialize;

use util::maths::{clamp, lin_map};

use crate::drone::{Drone, DroneError};
use crate::input::key_state::SharedRunState;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Raw range of one controller channel, used to normalise the value into [-1, 1].
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct ChannelCalibration {
    pub raw_min: f64,
    pub raw_max: f64
}

/// Parameters for RC channel forwarding
#[derive(Clone, Deserialize)]
pub struct Params {
    /// Target period of one forwarding tick in seconds
    pub cycle_period_s: f64,

    /// Per-channel calibration, indexed by channel. Channels beyond the end of the table pass
    /// through unchanged.
    pub calibration: Vec<ChannelCalibration>
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RcError {
    #[error("Could not read from the channel source: {0}")]
    SourceReadError(std::io::Error)
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A multi-channel input controller.
pub trait ChannelSource {
    /// Read the current raw channel values, or `None` if they have not changed since the last
    /// read. Non-blocking.
    fn read(&mut self) -> Result<Option<Vec<f64>>, RcError>;
}

/// Destination for normalised RC channel vectors, implemented by [`Drone`] and by mocks in
/// tests.
pub trait RcOutput {
    type Error: std::fmt::Display;

    fn set_rc_channels(&self, channels: Vec<f64>) -> Result<(), Self::Error>;
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            cycle_period_s: 0.02,
            calibration: Vec::new()
        }
    }
}

impl RcOutput for Drone<'_> {
    type Error = DroneError;

    fn set_rc_channels(&self, channels: Vec<f64>) -> Result<(), DroneError> {
        Drone::set_rc_channels(self, channels)
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Forward controller channels to the output until the run flag clears.
///
/// Channel sends are best effort like the rover's command stream, each vector is a full
/// snapshot so a dropped send is corrected by the next one. A failed source read however is
/// fatal: the run flag is cleared so sibling loops shut down too, and the error is returned.
pub fn forward_channels<C, O>(
    source: &mut C,
    output: &O,
    params: &Params,
    run_state: &SharedRunState
) -> Result<(), RcError>
where
    C: ChannelSource,
    O: RcOutput
{
    info!("RC channel forwarding started");

    while run_state.is_running() {
        let cycle_start_instant = Instant::now();

        match source.read() {
            Ok(Some(raw)) => {
                let channels = normalise_channels(&raw, &params.calibration);

                if let Err(e) = output.set_rc_channels(channels) {
                    warn!("Could not send RC channels: {}", e);
                }
            }
            // Channels unchanged, nothing to send
            Ok(None) => (),
            Err(e) => {
                // The controller is gone, no further input can arrive on this branch
                run_state.stop();
                return Err(e);
            }
        }

        let cycle_dur = Instant::now() - cycle_start_instant;
        if let Some(d) = Duration::from_secs_f64(params.cycle_period_s).checked_sub(cycle_dur) {
            thread::sleep(d);
        }
    }

    info!("RC channel forwarding stopped");

    Ok(())
}

/// Normalise raw channel values against the calibration table.
///
/// Calibrated channels are mapped linearly from their raw range onto [-1, 1] and clamped,
/// channels without a calibration entry pass through unchanged.
pub fn normalise_channels(raw: &[f64], calibration: &[ChannelCalibration]) -> Vec<f64> {
    raw.iter()
        .enumerate()
        .map(|(i, &value)| match calibration.get(i) {
            Some(c) => clamp(
                lin_map((c.raw_min, c.raw_max), (-1.0, 1.0), value),
                -1.0,
                1.0
            ),
            None => value
        })
        .collect()
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use approx::assert_relative_eq;

    use super::*;
    use crate::input::key_state::RunState;

    /// Channel source fed from a script of frames, clears the run flag when it runs dry.
    struct ScriptedChannels {
        frames: VecDeque<Vec<f64>>,
        run_state: SharedRunState
    }

    impl ChannelSource for ScriptedChannels {
        fn read(&mut self) -> Result<Option<Vec<f64>>, RcError> {
            match self.frames.pop_front() {
                Some(frame) => Ok(Some(frame)),
                None => {
                    self.run_state.stop();
                    Ok(None)
                }
            }
        }
    }

    /// Recording output mock.
    struct RecordingOutput {
        sent: RefCell<Vec<Vec<f64>>>
    }

    impl RcOutput for RecordingOutput {
        type Error = RcError;

        fn set_rc_channels(&self, channels: Vec<f64>) -> Result<(), RcError> {
            self.sent.borrow_mut().push(channels);
            Ok(())
        }
    }

    #[test]
    fn test_normalise_channels() {
        let calibration = vec![
            ChannelCalibration {
                raw_min: 0.0,
                raw_max: 1024.0
            },
            ChannelCalibration {
                raw_min: -32768.0,
                raw_max: 32767.0
            }
        ];

        let channels = normalise_channels(&[512.0, 0.0, 0.73], &calibration);

        assert_relative_eq!(channels[0], 0.0);
        assert_relative_eq!(channels[1], 0.0, epsilon = 1e-4);

        // Third channel has no calibration entry and passes through
        assert_relative_eq!(channels[2], 0.73);
    }

    #[test]
    fn test_normalise_clamps_out_of_range() {
        let calibration = vec![ChannelCalibration {
            raw_min: 0.0,
            raw_max: 1024.0
        }];

        let channels = normalise_channels(&[2048.0], &calibration);
        assert_eq!(channels[0], 1.0);

        let channels = normalise_channels(&[-500.0], &calibration);
        assert_eq!(channels[0], -1.0);
    }

    #[test]
    fn test_forward_until_flag_clears() {
        let run_state = RunState::new();

        let mut source = ScriptedChannels {
            frames: vec![vec![0.0, 512.0], vec![1024.0, 512.0], vec![512.0, 512.0]]
                .into_iter()
                .collect(),
            run_state: run_state.clone()
        };

        let output = RecordingOutput {
            sent: RefCell::new(Vec::new())
        };

        let params = Params {
            cycle_period_s: 0.001,
            calibration: vec![
                ChannelCalibration {
                    raw_min: 0.0,
                    raw_max: 1024.0
                };
                2
            ]
        };

        forward_channels(&mut source, &output, &params, &run_state).unwrap();

        let sent = output.sent.borrow();
        assert_eq!(sent.len(), 3);
        assert_relative_eq!(sent[0][0], -1.0);
        assert_relative_eq!(sent[1][0], 1.0);
        assert_relative_eq!(sent[2][0], 0.0);

        assert!(!run_state.is_running());
    }
}
