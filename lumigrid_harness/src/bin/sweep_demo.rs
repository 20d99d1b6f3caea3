//! Run a full two-axis sweep calibration against the simulated sensor array
//! and report how accurately each sensor position was recovered.

use std::fs::File;

use anyhow::Result;
use clap::Parser;
use lumigrid::callback::CalibrationEvent;
use lumigrid::config::SweepConfig;
use lumigrid::diagnostics::CsvTraceSink;
use lumigrid::{CalibrationModule, Calibrator, CalibratorConfig, SweepAxis};
use lumigrid_harness::{run_to_idle, SensorArrayConfig, SensorArraySim, SimDisplay};

/// Command line arguments for the sweep calibration demo
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Sweep calibration demo against a simulated sensor array"
)]
struct Args {
    /// Sensors per axis (NxN grid)
    #[arg(short, long, default_value_t = 3)]
    grid_size: usize,

    /// Display slices calibrated per sensor
    #[arg(short, long, default_value_t = 3)]
    slices: usize,

    /// Sweep speed in normalized units per cycle
    #[arg(long, default_value_t = 0.004)]
    speed: f64,

    /// Sweep line thickness in normalized units
    #[arg(long, default_value_t = 0.02)]
    thickness: f64,

    /// Sensor response amplitude above baseline (raw counts)
    #[arg(long, default_value_t = 120.0)]
    amplitude: f64,

    /// Dark reading baseline (raw counts)
    #[arg(long, default_value_t = 40)]
    baseline: i32,

    /// Uniform noise half-range (raw counts)
    #[arg(long, default_value_t = 2)]
    noise: i32,

    /// RNG seed for reproducible noise
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Minimum peak amplitude above the window edges
    #[arg(long, default_value_t = 10)]
    min_amplitude: i32,

    /// Expected sample spacing between slice crossings
    #[arg(long, default_value_t = 10)]
    min_freq: usize,

    /// Write raw per-sensor traces to this CSV file
    #[arg(long)]
    trace_csv: Option<String>,

    /// Simulate a disconnected sensor at x,y (may repeat)
    #[arg(long, value_parser = parse_sensor)]
    dead_sensor: Vec<(usize, usize)>,

    /// Enable verbose event output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_sensor(s: &str) -> Result<(usize, usize), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got '{s}'"))?;
    Ok((
        x.trim().parse().map_err(|e| format!("bad x: {e}"))?,
        y.trim().parse().map_err(|e| format!("bad y: {e}"))?,
    ))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    println!("Sweep Calibration Demo");
    println!("======================");
    println!("Grid: {}x{}, {} slices", args.grid_size, args.grid_size, args.slices);
    println!("Sweep: speed {} thickness {}", args.speed, args.thickness);

    let sim_config = SensorArrayConfig {
        x_count: args.grid_size,
        y_count: args.grid_size,
        slice_count: args.slices,
        amplitude: args.amplitude,
        baseline: args.baseline,
        noise: args.noise,
        seed: args.seed,
        ..SensorArrayConfig::default()
    };
    let mut sim = SensorArraySim::new(sim_config);
    for &(x, y) in &args.dead_sensor {
        println!("Simulating dead sensor at ({x}, {y})");
        sim.kill_sensor(x, y);
    }

    let config = CalibratorConfig {
        x_count: args.grid_size,
        y_count: args.grid_size,
        slice_count: args.slices,
        min_peak_amplitude: args.min_amplitude,
        min_peak_freq: args.min_freq,
        sweep: SweepConfig {
            speed: args.speed,
            thickness: args.thickness,
        },
        ..CalibratorConfig::default()
    };

    let display = SimDisplay::default();
    let mut calibrator = Calibrator::new(display.clone(), config);

    if let Some(path) = &args.trace_csv {
        let sink = CsvTraceSink::new(File::create(path)?)?;
        calibrator.set_trace_sink(Some(Box::new(sink)));
        println!("Writing raw traces to {path}");
    }

    let verbose = args.verbose;
    calibrator.register_callback(move |event| match event {
        CalibrationEvent::SweepStarted { axis } => {
            println!("Sweep started: {axis:?}");
        }
        CalibrationEvent::AxisCompleted {
            axis,
            matched,
            missing,
        } => {
            println!("Axis {axis:?} complete: {matched} peaks matched, {missing} missing");
        }
        CalibrationEvent::IndicatorPlaced {
            sensor_x,
            sensor_y,
            slice,
            position,
            depth,
        } => {
            if verbose {
                println!(
                    "  indicator ({sensor_x}, {sensor_y}, slice {slice}) -> ({:.1}, {:.1}) depth {depth:.2}",
                    position.x, position.y
                );
            }
        }
        CalibrationEvent::CalibrationComplete {
            fully_calibrated,
            total,
        } => {
            println!("Calibration complete: {fully_calibrated}/{total} points");
        }
        CalibrationEvent::BoundsLocated { .. } => {}
    });

    let sweep = calibrator.config().sweep.clone();
    calibrator.set_active_module(Some(CalibrationModule::line_sweep(sweep)));
    let cycles = run_to_idle(&mut calibrator, &display, &mut sim, 100_000);
    println!("\nRan {cycles} ingestion cycles");

    // Accuracy table: estimated vs true normalized positions.
    println!();
    println!("| Sensor | Slice | Est X | Est Y | True X | True Y | Error |");
    println!("|--------|-------|-------|-------|--------|--------|-------|");

    let mut sum_sq = 0.0;
    let mut complete = 0usize;
    let mut incomplete = 0usize;
    for (x, y, slice, point) in calibrator.table().iter() {
        let true_x = sim.true_position(x, y, slice, SweepAxis::Vertical);
        let true_y = sim.true_position(x, y, slice, SweepAxis::Horizontal);
        match (point.x, point.y) {
            (Some(px), Some(py)) => {
                let err = ((px - true_x).powi(2) + (py - true_y).powi(2)).sqrt();
                sum_sq += err * err;
                complete += 1;
                println!(
                    "| ({x},{y}) | {slice} | {px:.4} | {py:.4} | {true_x:.4} | {true_y:.4} | {err:.4} |"
                );
            }
            _ => {
                incomplete += 1;
                println!("| ({x},{y}) | {slice} | - | - | {true_x:.4} | {true_y:.4} | - |");
            }
        }
    }

    println!();
    if complete > 0 {
        let rms = (sum_sq / complete as f64).sqrt();
        println!("RMS position error: {rms:.5} (normalized units)");
    }
    if incomplete > 0 {
        println!("{incomplete} point(s) did not calibrate");
    }

    Ok(())
}
