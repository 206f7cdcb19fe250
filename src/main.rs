use std::io::{self, BufRead};
use std::process::{Child, Command, Stdio};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use course_pilot::actuator::{ActuatorLink, DryRunActuator, IndicatorSide, LineProtocolActuator};
use course_pilot::config::{ActuatorConfig, SourceConfig, TrackerConfig};
use course_pilot::duty_map::DutyMap;
use course_pilot::io::{CsvDetectionLog, FrameSource, ImageSequence};
use course_pilot::tracking::TrackingController;

const HELP: &str = "\
commands:
  start                 calibrate if needed and start tracking
  stop                  stop tracking
  wait                  block until a bounded replay finishes
  calibrate             acquire a new background plate
  set <col> <row> <v>   edit one cell's duty ratio
  load <path>           replace the duty map
  save <path>           write the duty map
  duty <v>              send a duty ratio by hand
  halt                  send duty 0
  led <left|right> <on|off>
  status
  quit";

#[derive(Debug, Clone, PartialEq)]
enum OperatorCommand {
    Start,
    Stop,
    Wait,
    Calibrate,
    Set { col: usize, row: usize, value: f64 },
    Load(String),
    Save(String),
    Duty(f64),
    Halt,
    Led(IndicatorSide, bool),
    Status,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<OperatorCommand> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let command = match words.as_slice() {
        ["start"] => OperatorCommand::Start,
        ["stop"] => OperatorCommand::Stop,
        ["wait"] => OperatorCommand::Wait,
        ["calibrate"] => OperatorCommand::Calibrate,
        ["set", col, row, value] => OperatorCommand::Set {
            col: col.parse().with_context(|| format!("bad column '{}'", col))?,
            row: row.parse().with_context(|| format!("bad row '{}'", row))?,
            value: value.parse().with_context(|| format!("bad duty '{}'", value))?,
        },
        ["load", path] => OperatorCommand::Load(path.to_string()),
        ["save", path] => OperatorCommand::Save(path.to_string()),
        ["duty", value] => {
            OperatorCommand::Duty(value.parse().with_context(|| format!("bad duty '{}'", value))?)
        }
        ["halt"] => OperatorCommand::Halt,
        ["led", side, state] => {
            let side = match *side {
                "left" => IndicatorSide::Left,
                "right" => IndicatorSide::Right,
                other => bail!("unknown side '{}'", other),
            };
            let on = match *state {
                "on" => true,
                "off" => false,
                other => bail!("expected on/off, got '{}'", other),
            };
            OperatorCommand::Led(side, on)
        }
        ["status"] => OperatorCommand::Status,
        ["help"] | ["?"] => OperatorCommand::Help,
        ["quit"] | ["exit"] => OperatorCommand::Quit,
        _ => bail!("unrecognised command '{}' (try 'help')", line.trim()),
    };
    Ok(command)
}

fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    match config {
        SourceConfig::ImageDir { path } => {
            let sequence = ImageSequence::open(path)?;
            info!("Replaying {} frames from {}", sequence.len(), path.display());
            Ok(Box::new(sequence))
        }
        #[cfg(feature = "camera")]
        SourceConfig::Camera { index } => {
            Ok(Box::new(course_pilot::io::CameraSource::open(*index)?))
        }
        #[cfg(not(feature = "camera"))]
        SourceConfig::Camera { index } => {
            bail!(
                "camera {} requested but course_pilot was built without the `camera` feature",
                index
            )
        }
    }
}

/// The actuator link, plus the driver process when one was spawned.
fn open_actuator(config: &ActuatorConfig) -> Result<(ActuatorLink, Option<Child>)> {
    match config {
        ActuatorConfig::DryRun => Ok((ActuatorLink::new(DryRunActuator), None)),
        ActuatorConfig::Command { program, args } => {
            let mut child = Command::new(program)
                .args(args)
                .stdin(Stdio::piped())
                .spawn()
                .with_context(|| format!("Failed to spawn driver '{}'", program))?;
            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("driver '{}' has no stdin", program))?;
            info!("Driver '{}' started (pid {})", program, child.id());
            Ok((ActuatorLink::new(LineProtocolActuator::new(stdin)), Some(child)))
        }
    }
}

/// Run one operator command. Returns false when the session should end.
fn execute(controller: &mut TrackingController, command: OperatorCommand) -> Result<bool> {
    match command {
        OperatorCommand::Start => controller.start()?,
        OperatorCommand::Stop => {
            let stats = controller.stop()?;
            println!("{}", stats);
        }
        OperatorCommand::Wait => {
            let stats = controller.wait()?;
            println!("{}", stats);
        }
        OperatorCommand::Calibrate => controller.calibrate()?,
        OperatorCommand::Set { col, row, value } => controller.set_duty(col, row, value)?,
        OperatorCommand::Load(path) => controller.load_duty_map(&path)?,
        OperatorCommand::Save(path) => controller.save_duty_map(&path)?,
        OperatorCommand::Duty(value) => controller.manual_duty(value)?,
        OperatorCommand::Halt => controller.halt()?,
        OperatorCommand::Led(side, on) => controller.set_side_indicator(side, on),
        OperatorCommand::Status => {
            let track = controller.track_state();
            println!(
                "{:?}: cell {}, duty {:.3}, centroid ({:.1}, {:.1})",
                controller.state(),
                track.previous_cell,
                track.current_duty,
                track.previous_centroid.x,
                track.previous_centroid.y
            );
            for row in controller.duty_map().rows() {
                let cells: Vec<String> = row.iter().map(|v| format!("{:5.2}", v)).collect();
                println!("  {}", cells.join(" "));
            }
        }
        OperatorCommand::Help => println!("{}", HELP),
        OperatorCommand::Quit => return Ok(false),
    }
    Ok(true)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "course_pilot.yaml".to_string());
    let config = TrackerConfig::from_yaml_file(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let Some(map_path) = &config.session.duty_map_path else {
        bail!("session.duty_map_path is not set in {}", config_path);
    };
    let duty_map = DutyMap::load(map_path)
        .with_context(|| format!("Failed to load duty map {}", map_path.display()))?;
    info!(
        "Loaded {}x{} duty map from {}",
        duty_map.width(),
        duty_map.height(),
        map_path.display()
    );

    let source = open_source(&config.source)?;
    let (actuator, driver) = open_actuator(&config.actuator)?;

    let mut controller = TrackingController::new(config.clone(), duty_map, source, actuator);
    if let Some(path) = &config.session.detection_log_path {
        let log = CsvDetectionLog::create(path)
            .with_context(|| format!("Failed to create detection log {}", path.display()))?;
        controller = controller.with_detection_log(Box::new(log));
    }

    println!("{}", HELP);
    for line in io::stdin().lock().lines() {
        let line = line.context("Failed to read operator input")?;
        if line.trim().is_empty() {
            continue;
        }
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                warn!("{:#}", e);
                continue;
            }
        };
        match execute(&mut controller, command) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => error!("{:#}", e),
        }
    }

    controller.shutdown();
    // Closing the link closes the driver's stdin.
    drop(controller);
    if let Some(mut child) = driver {
        let status = child.wait().context("Failed to wait for driver")?;
        info!("Driver exited with {}", status);
    }
    Ok(())
}
