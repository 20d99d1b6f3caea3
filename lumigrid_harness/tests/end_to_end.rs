//! End-to-end calibration runs against the simulated sensor array.

use std::sync::{Arc, Mutex};

use approx::assert_abs_diff_eq;
use lumigrid::callback::CalibrationEvent;
use lumigrid::{CalibrationModule, Calibrator, CalibratorConfig, SweepAxis};
use lumigrid_harness::{run_to_idle, SensorArrayConfig, SensorArraySim, SimDisplay};

/// Worst-case position error accepted from a simulated run, in normalized
/// display units (a fraction of the line thickness).
const POSITION_TOLERANCE: f64 = 0.01;

fn setup(
    sim_config: SensorArrayConfig,
) -> (Calibrator<SimDisplay>, SimDisplay, SensorArraySim) {
    let display = SimDisplay::default();
    let config = CalibratorConfig {
        x_count: sim_config.x_count,
        y_count: sim_config.y_count,
        slice_count: sim_config.slice_count,
        min_peak_amplitude: 10,
        min_peak_freq: 10,
        ..CalibratorConfig::default()
    };
    let calibrator = Calibrator::new(display.clone(), config);
    let sim = SensorArraySim::new(sim_config);
    (calibrator, display, sim)
}

fn start_line_sweep(calibrator: &mut Calibrator<SimDisplay>) {
    let sweep = calibrator.config().sweep.clone();
    calibrator.set_active_module(Some(CalibrationModule::line_sweep(sweep)));
}

#[test]
fn test_full_run_recovers_every_sensor_position() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (mut calibrator, display, mut sim) = setup(SensorArrayConfig::default());

    start_line_sweep(&mut calibrator);
    run_to_idle(&mut calibrator, &display, &mut sim, 2_000);

    let config = calibrator.config().clone();
    for y in 0..config.y_count {
        for x in 0..config.x_count {
            for slice in 0..config.slice_count {
                let point = calibrator.table().point(x, y, slice).unwrap();
                assert!(
                    point.is_complete(),
                    "point ({x}, {y}, slice {slice}) did not calibrate"
                );
                assert_abs_diff_eq!(
                    point.x.unwrap(),
                    sim.true_position(x, y, slice, SweepAxis::Vertical),
                    epsilon = POSITION_TOLERANCE
                );
                assert_abs_diff_eq!(
                    point.y.unwrap(),
                    sim.true_position(x, y, slice, SweepAxis::Horizontal),
                    epsilon = POSITION_TOLERANCE
                );
            }
        }
    }
}

#[test]
fn test_axis_completions_report_full_match() {
    let (mut calibrator, display, mut sim) = setup(SensorArrayConfig::default());

    let completions = Arc::new(Mutex::new(Vec::new()));
    let completions_clone = completions.clone();
    calibrator.register_callback(move |event| {
        if let CalibrationEvent::AxisCompleted {
            axis,
            matched,
            missing,
        } = event
        {
            completions_clone.lock().unwrap().push((*axis, *matched, *missing));
        }
    });

    start_line_sweep(&mut calibrator);
    run_to_idle(&mut calibrator, &display, &mut sim, 2_000);

    let completions = completions.lock().unwrap();
    assert_eq!(
        *completions,
        vec![
            (SweepAxis::Horizontal, 27, 0),
            (SweepAxis::Vertical, 27, 0)
        ]
    );
}

#[test]
fn test_dead_sensor_leaves_its_points_uncalibrated() {
    let (mut calibrator, display, mut sim) = setup(SensorArrayConfig::default());
    sim.kill_sensor(1, 1);

    start_line_sweep(&mut calibrator);
    run_to_idle(&mut calibrator, &display, &mut sim, 2_000);

    let config = calibrator.config().clone();
    for y in 0..config.y_count {
        for x in 0..config.x_count {
            for slice in 0..config.slice_count {
                let point = calibrator.table().point(x, y, slice).unwrap();
                if (x, y) == (1, 1) {
                    assert!(!point.is_complete(), "dead sensor must not calibrate");
                } else {
                    assert!(point.is_complete());
                }
            }
        }
    }
    assert_eq!(calibrator.table().completion(), (24, 27));
}

#[test]
fn test_dropped_middle_slice_leaves_exactly_that_point() {
    let (mut calibrator, display, mut sim) = setup(SensorArrayConfig::default());
    sim.drop_slice(1, 1, 1);

    start_line_sweep(&mut calibrator);
    run_to_idle(&mut calibrator, &display, &mut sim, 2_000);

    // The middle slice of (1, 1) has no pulse to find; its neighbors still
    // resolve to their own positions.
    assert!(!calibrator.table().point(1, 1, 1).unwrap().is_complete());
    for slice in [0, 2] {
        let point = calibrator.table().point(1, 1, slice).unwrap();
        assert!(point.is_complete());
        assert_abs_diff_eq!(
            point.y.unwrap(),
            sim.true_position(1, 1, slice, SweepAxis::Horizontal),
            epsilon = POSITION_TOLERANCE
        );
        assert_abs_diff_eq!(
            point.x.unwrap(),
            sim.true_position(1, 1, slice, SweepAxis::Vertical),
            epsilon = POSITION_TOLERANCE
        );
    }
    assert_eq!(calibrator.table().completion(), (26, 27));
}

#[test]
fn test_indicators_are_placed_in_scene_coordinates() {
    let (mut calibrator, display, mut sim) = setup(SensorArrayConfig::default());

    let placed = Arc::new(Mutex::new(Vec::new()));
    let placed_clone = placed.clone();
    calibrator.register_callback(move |event| {
        if let CalibrationEvent::IndicatorPlaced {
            sensor_x,
            sensor_y,
            slice,
            position,
            depth,
        } = event
        {
            placed_clone
                .lock()
                .unwrap()
                .push((*sensor_x, *sensor_y, *slice, *position, *depth));
        }
    });

    start_line_sweep(&mut calibrator);
    run_to_idle(&mut calibrator, &display, &mut sim, 2_000);

    let placed = placed.lock().unwrap();
    assert_eq!(placed.len(), 27, "one indicator per fully calibrated point");

    for (x, y, slice, position, depth) in placed.iter() {
        let true_x = sim.true_position(*x, *y, *slice, SweepAxis::Vertical) * display.width;
        let true_y = sim.true_position(*x, *y, *slice, SweepAxis::Horizontal) * display.height;
        assert_abs_diff_eq!(position.x, true_x, epsilon = POSITION_TOLERANCE * display.width);
        assert_abs_diff_eq!(position.y, true_y, epsilon = POSITION_TOLERANCE * display.height);
        assert_abs_diff_eq!(*depth, *slice as f64 / 2.0);
    }
}

#[test]
fn test_repeated_runs_are_reproducible() {
    let run = |seed: u64| {
        let (mut calibrator, display, mut sim) = setup(SensorArrayConfig {
            seed,
            ..SensorArrayConfig::default()
        });
        start_line_sweep(&mut calibrator);
        run_to_idle(&mut calibrator, &display, &mut sim, 2_000);
        calibrator
            .table()
            .iter()
            .map(|(_, _, _, p)| (p.x, p.y))
            .collect::<Vec<_>>()
    };

    assert_eq!(run(7), run(7));
}
