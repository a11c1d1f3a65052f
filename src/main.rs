//! Laser Logic entry point
//!
//! Headless runner: loads a scene file (or builds a small demo circuit),
//! settles it, steps the clock driver a few times and prints the beams.
//!
//! Usage: `laser-logic [scene.json] [out.json]`

use std::process::ExitCode;
use std::sync::PoisonError;

use glam::Vec2;
use laser_logic::persistence;
use laser_logic::sim::{ClockRate, ObjectType, World};
use laser_logic::{ClockDriver, Result, Settings};

/// Settings file location override
const SETTINGS_ENV: &str = "LASER_LOGIC_SETTINGS";
const DEFAULT_SETTINGS: &str = "laser-logic.json";
/// Driver ticks to run when the scene has clocks
const DEMO_TICKS: usize = 6;

fn main() -> ExitCode {
    env_logger::init();
    log::info!("Laser Logic (headless) starting...");

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let settings_path = std::env::var(SETTINGS_ENV).unwrap_or_else(|_| DEFAULT_SETTINGS.to_string());
    let settings = Settings::load(&settings_path);
    let mut args = std::env::args().skip(1);
    let scene = args.next();
    let output = args.next();

    let driver = ClockDriver::from_settings(&settings);
    let world = World::with_driver(settings, &driver);
    let mut guard = world.lock().unwrap_or_else(PoisonError::into_inner);

    match &scene {
        Some(path) => {
            let snapshot = persistence::load_scene(path)?;
            guard.import(&snapshot)?;
        }
        None => build_demo(&mut guard)?,
    }

    let report = guard.last_settle();
    println!(
        "{} objects, settled in {} cycle(s) ({:?})",
        guard.len(),
        report.cycles,
        report.outcome
    );
    print_beams(&guard);

    let clocks = guard.clock_count();
    drop(guard);

    if clocks > 0 {
        for tick in 1..=DEMO_TICKS {
            driver.tick();
            let guard = world.lock().unwrap_or_else(PoisonError::into_inner);
            println!(
                "tick {tick}: {} beam path(s), phases {:?}",
                guard.beam_paths().len(),
                driver.phases()
            );
        }
    }

    if let Some(path) = output {
        let snapshot = world.lock().unwrap_or_else(PoisonError::into_inner).export();
        persistence::save_scene(&path, &snapshot)?;
        println!("saved {path}");
    }
    Ok(())
}

/// Mirror relay plus a fast clock gating a second emitter
fn build_demo(world: &mut World) -> Result<()> {
    world.add_object(ObjectType::Emitter, Vec2::ZERO)?;
    let mirror = world.add_object(ObjectType::Mirror, Vec2::new(100.0, 0.0))?;
    world.set_angle(mirror, std::f32::consts::FRAC_PI_4)?;
    let detector = world.add_object(ObjectType::Detector, Vec2::new(100.0, 100.0))?;
    let gate = world.add_object(ObjectType::TransparentBlock, Vec2::new(100.0, 200.0))?;
    world.control(detector, gate)?;

    let clock = world.add_object(ObjectType::Clock, Vec2::new(-60.0, 200.0))?;
    let pulse = world.add_object(ObjectType::Emitter, Vec2::new(0.0, 200.0))?;
    world.set_clock_rate(clock, ClockRate::Fast)?;
    world.control(clock, pulse)?;
    world.add_object(ObjectType::Detector, Vec2::new(200.0, 200.0))?;
    Ok(())
}

fn print_beams(world: &World) {
    for (i, path) in world.beam_paths().iter().enumerate() {
        println!(
            "beam {i}: {} segment(s), {:.1} units",
            path.len(),
            path.total_length()
        );
        for segment in &path.segments {
            let end = segment.end();
            println!(
                "  ({:7.1}, {:7.1}) -> ({:7.1}, {:7.1})  {:6.1} deg",
                segment.origin.x,
                segment.origin.y,
                end.x,
                end.y,
                segment.angle.to_degrees()
            );
        }
    }
}
