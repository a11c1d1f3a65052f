//! Settlement loop
//!
//! One cycle: emit fresh root beams, trace all of them, then let every
//! controller push its signal into the toggles it drives. A toggle whose
//! logical state changes invalidates the cycle and the whole thing runs
//! again from scratch. Scenes that never stop changing are cut off after
//! `max_cycles` and left without beams.

use super::world::World;
use super::{WorldObject, trace};

/// How a settlement run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SettleOutcome {
    /// No toggle changed state in the final cycle
    #[default]
    Converged,
    /// The cycle cap was hit; beams and invalidations were cleared
    Oscillating,
}

/// Summary of one settlement run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SettleReport {
    pub outcome: SettleOutcome,
    /// Cycles executed, including the final one
    pub cycles: u32,
    /// Beam paths left in the world
    pub beams: usize,
}

impl SettleReport {
    pub fn converged(&self) -> bool {
        self.outcome == SettleOutcome::Converged
    }
}

/// Run cycles until no toggle changes state or the cycle cap is reached
pub fn settle(world: &mut World) -> SettleReport {
    let params = world.trace_params();
    world.max_distance = params.max_distance;
    let max_cycles = world.settings.max_cycles.max(1);
    let mut cycles = 0;

    loop {
        world.beams.clear();
        world.invalid.clear();

        // Fresh root beams
        let mut roots = Vec::new();
        for &id in &world.order {
            let Some(obj) = world.objects.get_mut(id) else {
                continue;
            };
            if let Some(mut beam) = obj.unsettled() {
                beam.source = Some(id);
                roots.push(beam);
            }
        }

        for root in roots {
            let path = trace(root, &mut world.objects, &world.index, &params);
            world.beams.push(path);
        }

        // Controllers push their signal into driven toggles
        for &id in &world.order {
            let Some((signal, targets)) = world
                .objects
                .get(id)
                .and_then(WorldObject::settled)
                .map(|(signal, targets)| (signal, targets.to_vec()))
            else {
                continue;
            };
            for target in targets {
                let Some(toggle) = world.objects.get_mut(target).and_then(|o| o.as_toggle_mut())
                else {
                    continue;
                };
                if toggle.set_toggle(signal) {
                    world.invalid.push(target);
                }
            }
        }

        cycles += 1;

        if world.invalid.is_empty() {
            return SettleReport {
                outcome: SettleOutcome::Converged,
                cycles,
                beams: world.beams.len(),
            };
        }

        if cycles >= max_cycles {
            log::warn!(
                "Scene did not settle after {} cycles ({} objects still changing), clearing beams",
                cycles,
                world.invalid.len()
            );
            world.beams.clear();
            world.invalid.clear();
            return SettleReport {
                outcome: SettleOutcome::Oscillating,
                cycles,
                beams: 0,
            };
        }
    }
}
