//! Teleop executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the session and logging
//!     - Load parameters and parse the command line
//!     - Establish a verified connection to the simulation server (phased connect)
//!     - Start the drone's manual-flight watch in a background thread
//!     - Run the rover teleoperation loop on this thread until the quit key
//!     - Release actuation authority and disconnect
//!
//! Two input modes are supported: `edge`, in which a listener thread tracks key press/release
//! edges and the held keys become ramp targets, and `polled`, in which one buffered keypress
//! per tick nudges the accumulated actuator values directly.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use crossterm::{
    event::{KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags},
    execute,
    terminal::{self, disable_raw_mode, enable_raw_mode}
};
use log::{debug, info, warn};
use std::str::FromStr;
use std::thread;
use std::time::Duration;
use structopt::StructOpt;

// Internal
use sim_if::net::{zmq, SimNetParams};
use teleop_lib::{
    dispatch::{self, CommandDispatcher},
    drone::{self, Drone},
    input::{
        key_state::RunState,
        keyboard::{KeyboardListener, KeyboardSampler},
        polled::{PolledSampler, TerminalKeys}
    },
    params::TeleopExecParams,
    ramp::RampCtrl,
    rover::Rover,
    sim_client::{self, SimSession}
};
use util::{
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Command line arguments for the teleop executable.
#[derive(Debug, StructOpt)]
#[structopt(
    name = "teleop_exec",
    about = "Keyboard teleoperation of a simulated rover, with a drone flown manually from the \
             ground control station in parallel."
)]
struct CliArgs {
    #[structopt(flatten)]
    net: SimNetParams,

    /// Scene config to load, overriding the value in teleop_exec.toml
    #[structopt(long)]
    scene_config: Option<String>,

    /// Input sampling mode for the rover teleop
    #[structopt(long, default_value = "edge", possible_values = &["edge", "polled"])]
    input_mode: InputMode
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Input sampling mode for the rover teleop.
#[derive(Debug, Clone, Copy)]
enum InputMode {
    /// Key press/release edges feed a held-key set, held keys become ramp targets
    Edge,

    /// One buffered keypress per tick nudges the accumulated values directly
    Polled
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("teleop_exec", "sessions")
        .wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution
    info!("Ares Teleop Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- CLI & PARAMETERS ----

    let args = CliArgs::from_args();
    debug!("CLI arguments: {:?}", args);

    let exec_params: TeleopExecParams = util::params::load("teleop_exec.toml")
        .wrap_err("Could not load teleop exec params")?;

    let dispatch_params: dispatch::Params = util::params::load("dispatch.toml")
        .wrap_err("Could not load dispatch params")?;

    let scene_config = args
        .scene_config
        .clone()
        .unwrap_or_else(|| exec_params.scene_config.clone());

    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    let mut ramp = RampCtrl::default();
    ramp.init("ramp.toml", &session)
        .wrap_err("Failed to initialise RampCtrl")?;
    info!("RampCtrl init complete\n");

    // ---- CONNECTION ----

    let zmq_ctx = zmq::Context::new();

    let settle_duration = Duration::from_secs_f64(exec_params.settle_duration_s);
    let sim_session = sim_client::phased_connect(
        &zmq_ctx,
        &args.net,
        &scene_config,
        &exec_params.expected_entities,
        settle_duration
    )
    .wrap_err("Failed to establish a verified connection to the simulation server")?;

    // ---- TELEOPERATION ----

    let teleop_result = run_teleop(
        &sim_session,
        &exec_params,
        dispatch_params,
        ramp,
        args.input_mode
    );

    // The session must be explicitly discarded even when teleop failed part way through
    sim_session.disconnect();

    teleop_result?;

    info!("End of execution");

    Ok(())
}

/// Run the rover teleoperation loop and the drone's manual-flight watch until quit.
fn run_teleop(
    session: &SimSession,
    exec_params: &TeleopExecParams,
    dispatch_params: dispatch::Params,
    ramp: RampCtrl,
    input_mode: InputMode
) -> Result<(), Report> {
    let run_state = RunState::new();

    // Drone branch: presence in the sim only, flight stays with the ground station. The watch
    // polls the same run flag as the rover teleop so both exit on the same quit signal.
    let drone = Drone::new(session, &exec_params.drone_name);
    let drone_watch = {
        let name = String::from(drone.name());
        let run_state = run_state.clone();
        thread::spawn(move || drone::manual_flight_watch(&name, &run_state))
    };

    // Rover teleop runs on this thread
    let rover = Rover::new(session, &exec_params.rover_name);

    info!("Rover controls: ARROW KEYS to drive, SPACE to brake, Q to quit");

    enable_raw_mode().wrap_err("Could not put the terminal into raw mode")?;

    let teleop_result = match input_mode {
        InputMode::Edge => {
            // Key release events need the kitty keyboard protocol on most Unix terminals,
            // without it a released key is never noticed and the rover keeps driving
            match terminal::supports_keyboard_enhancement() {
                Ok(true) => {
                    execute!(
                        std::io::stdout(),
                        PushKeyboardEnhancementFlags(
                            KeyboardEnhancementFlags::REPORT_EVENT_TYPES
                        )
                    )
                    .ok();
                }
                _ => warn!(
                    "This terminal does not report key release events, consider --input-mode \
                     polled"
                )
            }

            let listener = KeyboardListener::spawn(run_state.clone());
            let sampler = KeyboardSampler::new(run_state.clone());

            let dispatch_result = CommandDispatcher::new(
                dispatch_params,
                sampler,
                rover,
                ramp,
                run_state.clone()
            )
            .run();

            // However the dispatcher exited, release the sibling loops before joining them
            run_state.stop();
            let listen_result = listener.join();

            match (dispatch_result, listen_result) {
                (Err(e), _) => Err(e).wrap_err("Rover teleop failed"),
                (Ok(_), Err(e)) => {
                    Err(e).wrap_err("The keyboard listener failed, teleop cannot continue")
                }
                (Ok(_), Ok(())) => Ok(())
            }
        }
        InputMode::Polled => {
            let sampler = PolledSampler::new(TerminalKeys);

            let dispatch_result = CommandDispatcher::new(
                dispatch_params,
                sampler,
                rover,
                ramp,
                run_state.clone()
            )
            .run();

            run_state.stop();

            dispatch_result
                .map(|_| ())
                .wrap_err("Rover teleop failed")
        }
    };

    // Raw mode and the enhancement flags must be undone before anything else prints
    if matches!(input_mode, InputMode::Edge) {
        execute!(std::io::stdout(), PopKeyboardEnhancementFlags).ok();
    }
    disable_raw_mode().ok();

    drone_watch.join().ok();

    teleop_result
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl FromStr for InputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "edge" => Ok(InputMode::Edge),
            "polled" => Ok(InputMode::Polled),
            _ => Err(format!("{} is not a recognised input mode", s))
        }
    }
}
