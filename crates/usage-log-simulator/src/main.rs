//! Host simulator for the usage log.
//!
//! Plays a scripted sequence of days: each day the robot boots, runs a few
//! behaviour modes and a user VM program, optionally sits on USB with a studio
//! session attached, then sleeps until the next day. Flash and retained RAM
//! live in memory and can be saved between runs.
//!
//! # Usage
//!
//! ```text
//! usage-log-simulator [DAYS] [STATE_FILE]
//! ```
//!
//! | Argument     | Default | Meaning                                        |
//! |--------------|---------|------------------------------------------------|
//! | `DAYS`       | 10      | Number of simulated days                       |
//! | `STATE_FILE` | none    | postcard file loaded at start, written at exit |
//!
//! Set `RUST_LOG=debug` to see every record commit.

use std::error::Error;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use usage_log::scanner::opcode::OpcodeClass;
use usage_log::scanner::vm_layout::{LocalEvent, var};
use usage_log::storage::{Header, RamFlash};
use usage_log::usage::IMAGE_LEN;
use usage_log::{Board, FlushStatus, LogConfig, LogService, Mode, RetainedUsage};

// ---------------------------------------------------------------------------
// Battery model
// ---------------------------------------------------------------------------

/// Fully charged supply sample
const SUPPLY_FULL: u16 = 760;

/// Supply sample of a fresh robot out of the box
const SUPPLY_INITIAL: u16 = 740;

/// Battery minutes per unit of supply sample lost
const DRAIN_MINUTES_PER_UNIT: u32 = 3;

/// Supply units gained per minute on USB
const CHARGE_PER_MINUTE: u16 = 2;

/// Below this sample the regulator drops out and the robot resets
const BROWNOUT_SAMPLE: u16 = 600;

// ---------------------------------------------------------------------------
// Simulated board
// ---------------------------------------------------------------------------

struct SimBoard {
    supply: u16,
    battery_minutes: u32,
    usb: bool,
    studio: bool,
    brownout: bool,
    mode: Option<Mode>,
}

impl SimBoard {
    fn new(supply: u16) -> Self {
        Self {
            supply,
            battery_minutes: 0,
            usb: false,
            studio: false,
            brownout: false,
            mode: Some(Mode::Menu),
        }
    }

    /// Advance the battery by one powered minute. Returns whether the supply
    /// collapsed.
    fn run_minute(&mut self) -> bool {
        if self.usb {
            self.supply = (self.supply + CHARGE_PER_MINUTE).min(SUPPLY_FULL);
            return false;
        }

        self.battery_minutes += 1;
        if self.battery_minutes % DRAIN_MINUTES_PER_UNIT == 0 {
            self.supply = self.supply.saturating_sub(1);
        }
        if self.supply < BROWNOUT_SAMPLE {
            self.brownout = true;
        }
        self.brownout
    }
}

impl Board for SimBoard {
    fn request_supply_sample(&mut self) {}

    fn poll_supply_sample(&mut self) -> Option<u16> {
        Some(self.supply)
    }

    fn external_power_present(&mut self) -> bool {
        self.usb
    }

    fn channel_open(&mut self) -> bool {
        self.usb && self.studio
    }

    fn take_brownout(&mut self) -> bool {
        core::mem::take(&mut self.brownout)
    }

    fn current_mode(&mut self) -> Option<Mode> {
        self.mode
    }
}

// ---------------------------------------------------------------------------
// Day script
// ---------------------------------------------------------------------------

enum Activity {
    /// Run a built-in mode for some minutes
    Mode(Mode, u16),
    /// Sit on USB; `studio` attaches a programming session
    Usb { minutes: u16, studio: bool },
    /// Install and run a user program for some minutes
    Program(&'static [u16], u16),
}

/// Obstacle avoidance: proximity event, drive the motors
const AVOID_PROGRAM: &[u16] = &[
    3,
    LocalEvent::Prox.id(),
    3,
    OpcodeClass::Load.encode(var::PROX + 2),
    OpcodeClass::Store.encode(var::MOTOR_TARGET),
    OpcodeClass::Store.encode(var::MOTOR_TARGET + 1),
    0,
];

/// Clap switch: react to the microphone, read the buttons, flash the top LED
const CLAP_PROGRAM: &[u16] = &[
    3,
    LocalEvent::Mic.id(),
    3,
    OpcodeClass::Load.encode(var::BUTTONS_STATE),
    OpcodeClass::SmallImmediate.encode(32),
    OpcodeClass::NativeCall.encode(0),
    0,
];

fn day_script(day: u32) -> Vec<Activity> {
    let explore = 30 + (day * 7) % 40;
    let mut script = vec![
        Activity::Mode(Mode::Menu, 2),
        Activity::Mode(Mode::Explorer, explore as u16),
    ];

    match day % 4 {
        0 => script.push(Activity::Usb {
            minutes: 90,
            studio: true,
        }),
        1 => script.push(Activity::Program(AVOID_PROGRAM, 45)),
        2 => {
            script.push(Activity::Mode(Mode::Line, 25));
            script.push(Activity::Program(CLAP_PROGRAM, 15));
        }
        _ => script.push(Activity::Usb {
            minutes: 30,
            studio: false,
        }),
    }
    script.push(Activity::Mode(Mode::Follow, 10));
    script
}

// ---------------------------------------------------------------------------
// Saved state
// ---------------------------------------------------------------------------

/// Everything that survives between simulator runs
#[derive(Serialize, Deserialize)]
struct SavedState {
    config: LogConfig,
    supply: u16,
    retained: [u8; IMAGE_LEN],
    flash: Vec<u8>,
}

impl SavedState {
    fn fresh() -> Self {
        Self {
            config: LogConfig::DEFAULT,
            supply: SUPPLY_INITIAL,
            retained: RetainedUsage::new().image(),
            flash: RamFlash::new().as_bytes().to_vec(),
        }
    }

    fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        if !path.exists() {
            info!("No state at {}, starting with a fresh robot", path.display());
            return Ok(Self::fresh());
        }
        let bytes = std::fs::read(path)?;
        Ok(postcard::from_bytes(&bytes)?)
    }

    fn save(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        let bytes = postcard::to_allocvec(self)?;
        std::fs::write(path, bytes)?;
        info!("Saved state to {}", path.display());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Boot, run one day's script, then sleep through the night
fn simulate_day(day: u32, state: &mut SavedState) {
    let usage = RetainedUsage::from_image(&state.retained);
    let mut board = SimBoard::new(state.supply);
    // A brownout on the previous day left the reset latch set; the battery
    // was charged overnight
    board.brownout = state.supply < BROWNOUT_SAMPLE;
    if board.brownout {
        board.supply = SUPPLY_FULL;
    }

    let mut log = LogService::new(
        &usage,
        RamFlash::from_image(&state.flash),
        board,
        state.config,
    );

    let report = log.init();
    match report.flush {
        FlushStatus::Written(address) => info!("Day {}: flushed to {}", day, address),
        FlushStatus::Postponed { sample } => {
            warn!("Day {}: supply {} too low, flush postponed", day, sample)
        }
        FlushStatus::Failed(e) => warn!("Day {}: flush failed: {}", day, e),
        FlushStatus::NotDue => {}
    }

    let mut browned_out = false;
    'script: for activity in day_script(day) {
        let minutes = match activity {
            Activity::Mode(mode, minutes) => {
                log.board_mut().mode = Some(mode);
                minutes
            }
            Activity::Usb { minutes, studio } => {
                let board = log.board_mut();
                board.mode = Some(Mode::Menu);
                board.usb = true;
                board.studio = studio;
                if studio {
                    log.note_reprogram();
                }
                minutes
            }
            Activity::Program(program, minutes) => {
                log.board_mut().mode = None;
                log.note_reprogram();
                log.on_vm_cycle(program);
                minutes
            }
        };

        for _ in 0..minutes {
            if log.board_mut().run_minute() {
                browned_out = true;
                break 'script;
            }
            log.tick_poweron();
        }

        let board = log.board_mut();
        board.usb = false;
        board.studio = false;
    }

    if browned_out {
        // No controlled reset: the epoch's counters fail their check at next boot
        warn!("Day {}: brownout, robot reset without sealing", day);
    } else {
        for _ in 0..state.config.sleep_quanta_per_day {
            log.tick_poweroff();
        }
        log.prepare_reset();
    }

    state.supply = log.board_mut().supply;
    state.flash = log.flash().as_bytes().to_vec();
    state.retained = usage.image();
}

fn print_totals(totals: &Header) {
    println!("Lifetime usage");
    println!("  switch-ons:      {}", totals.switchon);
    println!("  power-on:        {} min", totals.poweron_minutes);
    println!("  studio:          {} min", totals.studio_minutes);
    println!("  usb:             {} min", totals.usb_minutes);
    println!("  reprograms:      {}", totals.reprogram);
    println!("  power-off days:  {}", totals.poweroff_days);
    for mode in Mode::ALL {
        println!("  {:<16} {} min", format!("{:?}:", mode), totals.mode_minutes[mode.slot()]);
    }
    println!(
        "  {:<16} {} min",
        "VM program:",
        totals.mode_minutes[usage_log::usage::UNKNOWN_MODE_SLOT]
    );
    println!("  features:        {}", totals.flags.labels().join(", "));
}

fn run(days: u32, state_path: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let mut state = match &state_path {
        Some(path) => SavedState::load(path)?,
        None => SavedState::fresh(),
    };

    for day in 0..days {
        simulate_day(day, &mut state);
    }

    // Read back through a fresh boot view without touching the counters
    let usage = RetainedUsage::from_image(&state.retained);
    let mut log = LogService::new(
        &usage,
        RamFlash::from_image(&state.flash),
        SimBoard::new(state.supply),
        state.config,
    );
    let totals = log.lifetime_totals().map_err(|e| e.to_string())?;
    print_totals(&totals);

    let stats = log.page_stats();
    info!(
        "Page rotations this read: {}, forced recoveries: {}",
        stats.rotations, stats.forced_recoveries
    );

    if let Some(path) = &state_path {
        state.save(path)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let days = match args.next().map(|arg| arg.parse::<u32>()) {
        None => 10,
        Some(Ok(days)) => days,
        Some(Err(e)) => {
            eprintln!("DAYS must be a number: {}", e);
            std::process::exit(2);
        }
    };
    let state_path = args.next().map(PathBuf::from);

    info!("Simulating {} days of robot use", days);
    if let Err(e) = run(days, state_path) {
        log::error!("Simulation failed: {}", e);
        std::process::exit(1);
    }
}
