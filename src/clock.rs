//! Clock driver
//!
//! Clocks are grouped into four rate buckets shared by every attached world.
//! Each driver tick flips the phase of the buckets that are due, pushes the
//! new phase into their clocks and re-settles every world that owns at least
//! one clock (ticking or not).
//!
//! Locking: a world's mutex is always taken before the driver tables. The
//! driver never holds its tables while it locks a world.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{Result, SimError};
use crate::settings::Settings;
use crate::sim::{ClockRate, ObjectId, World};

/// Id of a world attached to a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorldId(u64);

type RedrawHook = Arc<dyn Fn(WorldId) + Send + Sync>;

const BUCKETS: usize = ClockRate::TICKING.len();

struct WorldEntry {
    world: Weak<Mutex<World>>,
    /// Clocks in the world, including stopped ones
    clocks: usize,
}

struct ClockTables {
    buckets: [Vec<(WorldId, ObjectId)>; BUCKETS],
    phases: [bool; BUCKETS],
    ticks: u64,
    worlds: BTreeMap<WorldId, WorldEntry>,
    next_world: u64,
    redraw: Option<RedrawHook>,
    /// A `ClockThread` is alive for this driver
    threaded: bool,
}

/// Work for one world during a tick
struct TickPlan {
    id: WorldId,
    world: Arc<Mutex<World>>,
    phases: Vec<(ObjectId, bool)>,
}

impl ClockTables {
    fn new() -> Self {
        Self {
            buckets: Default::default(),
            phases: [true; BUCKETS],
            ticks: 0,
            worlds: BTreeMap::new(),
            next_world: 0,
            redraw: None,
            threaded: false,
        }
    }

    /// Flip due buckets and collect the worlds to settle
    fn advance(&mut self) -> Vec<TickPlan> {
        let tick = self.ticks;
        self.ticks += 1;

        let mut flipped = Vec::new();
        for (slot, rate) in ClockRate::TICKING.iter().enumerate() {
            let Some(period) = rate.period_ticks() else {
                continue;
            };
            if tick % period != 0 {
                continue;
            }
            self.phases[slot] = !self.phases[slot];
            let phase = self.phases[slot];
            flipped.extend(self.buckets[slot].iter().map(|&(world, clock)| (world, clock, phase)));
        }

        self.worlds
            .iter()
            .filter(|(_, entry)| entry.clocks > 0)
            .filter_map(|(&id, entry)| {
                let world = entry.world.upgrade()?;
                let phases = flipped
                    .iter()
                    .filter(|(w, ..)| *w == id)
                    .map(|&(_, clock, phase)| (clock, phase))
                    .collect();
                Some(TickPlan { id, world, phases })
            })
            .collect()
    }

    fn unschedule(&mut self, world: WorldId, clock: ObjectId, rate: ClockRate) {
        if let Some(slot) = rate.bucket() {
            self.buckets[slot].retain(|&entry| entry != (world, clock));
        }
    }

    fn schedule(&mut self, world: WorldId, clock: ObjectId, rate: ClockRate) {
        if let Some(slot) = rate.bucket() {
            self.buckets[slot].push((world, clock));
        }
    }
}

/// Shared handle to the clock tables. Clones refer to the same driver.
#[derive(Clone)]
pub struct ClockDriver {
    tables: Arc<Mutex<ClockTables>>,
    period: Duration,
}

impl fmt::Debug for ClockDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClockDriver")
            .field("period", &self.period)
            .finish_non_exhaustive()
    }
}

impl Default for ClockDriver {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl ClockDriver {
    pub fn new(period: Duration) -> Self {
        Self {
            tables: Arc::new(Mutex::new(ClockTables::new())),
            period,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(Duration::from_millis(settings.tick_period_ms.max(1)))
    }

    /// Base tick period of the background thread
    pub fn period(&self) -> Duration {
        self.period
    }

    fn tables(&self) -> MutexGuard<'_, ClockTables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // === Registration (called by worlds) ===

    pub(crate) fn attach(&self, world: Weak<Mutex<World>>) -> WorldId {
        let mut tables = self.tables();
        let id = WorldId(tables.next_world);
        tables.next_world += 1;
        tables.worlds.insert(id, WorldEntry { world, clocks: 0 });
        log::debug!("Attached world {:?} to clock driver", id);
        id
    }

    pub(crate) fn detach(&self, world: WorldId) {
        let mut tables = self.tables();
        tables.worlds.remove(&world);
        for bucket in tables.buckets.iter_mut() {
            bucket.retain(|&(w, _)| w != world);
        }
        log::debug!("Detached world {:?} from clock driver", world);
    }

    pub(crate) fn add_clock(&self, world: WorldId, clock: ObjectId, rate: ClockRate) {
        let mut tables = self.tables();
        if let Some(entry) = tables.worlds.get_mut(&world) {
            entry.clocks += 1;
            tables.schedule(world, clock, rate);
        }
    }

    pub(crate) fn remove_clock(&self, world: WorldId, clock: ObjectId, rate: ClockRate) {
        let mut tables = self.tables();
        if let Some(entry) = tables.worlds.get_mut(&world) {
            entry.clocks = entry.clocks.saturating_sub(1);
        }
        tables.unschedule(world, clock, rate);
    }

    /// Move a clock between buckets in one step
    pub(crate) fn retype(&self, world: WorldId, clock: ObjectId, from: ClockRate, to: ClockRate) {
        let mut tables = self.tables();
        if !tables.worlds.contains_key(&world) {
            return;
        }
        tables.unschedule(world, clock, from);
        tables.schedule(world, clock, to);
    }

    /// Called with the world's id after each tick re-settles it
    pub fn set_redraw_hook<F>(&self, hook: F)
    where
        F: Fn(WorldId) + Send + Sync + 'static,
    {
        self.tables().redraw = Some(Arc::new(hook));
    }

    pub fn clear_redraw_hook(&self) {
        self.tables().redraw = None;
    }

    // === Queries ===

    /// Worlds currently attached
    pub fn world_count(&self) -> usize {
        self.tables().worlds.len()
    }

    /// Clocks the driver counts for `world`, stopped ones included
    pub fn clock_count(&self, world: WorldId) -> usize {
        self.tables().worlds.get(&world).map_or(0, |entry| entry.clocks)
    }

    /// Clocks scheduled at `rate` across all worlds
    pub fn scheduled(&self, rate: ClockRate) -> usize {
        rate.bucket().map_or(0, |slot| self.tables().buckets[slot].len())
    }

    /// Current phase per bucket, slowest first
    pub fn phases(&self) -> [bool; BUCKETS] {
        self.tables().phases
    }

    /// Ticks executed so far
    pub fn ticks(&self) -> u64 {
        self.tables().ticks
    }

    // === Driving ===

    /// Run one tick synchronously. Returns the number of worlds re-settled.
    pub fn tick(&self) -> usize {
        let (plans, redraw) = {
            let mut tables = self.tables();
            let plans = tables.advance();
            log::trace!("Clock tick {}: {} world(s)", tables.ticks, plans.len());
            (plans, tables.redraw.clone())
        };

        for plan in &plans {
            {
                let mut world = plan.world.lock().unwrap_or_else(PoisonError::into_inner);
                for &(clock, phase) in &plan.phases {
                    world.tick_clock(clock, phase);
                }
                let report = world.settle();
                if !report.converged() {
                    log::debug!("World {:?} oscillating after clock tick", plan.id);
                }
            }
            if let Some(redraw) = &redraw {
                redraw(plan.id);
            }
        }
        plans.len()
    }

    /// Tick on a background thread every `period` until the guard is stopped.
    /// Only one thread per driver; a second `start` fails with `ClockRunning`.
    pub fn start(&self) -> Result<ClockThread> {
        {
            let mut tables = self.tables();
            if tables.threaded {
                return Err(SimError::ClockRunning);
            }
            tables.threaded = true;
        }

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let driver = self.clone();
        let period = self.period;

        let spawned = thread::Builder::new()
            .name("laser-clocks".into())
            .spawn(move || {
                let mut deadline = Instant::now() + period;
                while flag.load(Ordering::Acquire) {
                    let now = Instant::now();
                    if now < deadline {
                        thread::park_timeout(deadline - now);
                        continue;
                    }
                    driver.tick();
                    deadline += period;
                    if deadline < now {
                        // Fell behind; skip the missed ticks
                        deadline = now + period;
                    }
                }
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.tables().threaded = false;
                return Err(e.into());
            }
        };

        log::info!("Clock driver started ({:?} period)", period);
        Ok(ClockThread {
            running,
            handle: Some(handle),
            driver: self.clone(),
        })
    }
}

/// Guard for the background tick thread; stops and joins it on drop
#[derive(Debug)]
pub struct ClockThread {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    driver: ClockDriver,
}

impl ClockThread {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            return;
        };
        handle.thread().unpark();
        if handle.join().is_err() {
            log::error!("Clock thread panicked");
        } else {
            log::info!("Clock driver stopped");
        }
        self.driver.tables().threaded = false;
    }
}

impl Drop for ClockThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{ObjectKind, ObjectType, SharedWorld};
    use glam::Vec2;
    use std::sync::atomic::AtomicUsize;

    fn shared(driver: &ClockDriver) -> SharedWorld {
        World::with_driver(Settings::default(), driver)
    }

    fn clock_active(world: &SharedWorld, id: ObjectId) -> bool {
        match world.lock().unwrap().object(id).unwrap().kind() {
            ObjectKind::Clock(clock) => clock.active,
            other => panic!("expected clock, got {other:?}"),
        }
    }

    #[test]
    fn test_bucket_phases_follow_periods() {
        let driver = ClockDriver::default();
        assert_eq!(driver.phases(), [true; 4]);

        // Slow, regular, fast, extreme
        let expected = [
            [false, false, false, false],
            [false, false, false, true],
            [false, false, true, false],
            [false, true, true, true],
            [true, true, false, false],
            [true, true, false, true],
            [true, false, true, false],
        ];
        for phases in expected {
            driver.tick();
            assert_eq!(driver.phases(), phases);
        }
        assert_eq!(driver.ticks(), 7);
    }

    #[test]
    fn test_world_attach_and_detach() {
        let driver = ClockDriver::default();
        let world = shared(&driver);
        let id = world.lock().unwrap().world_id().unwrap();
        assert_eq!(driver.world_count(), 1);
        assert_eq!(driver.clock_count(id), 0);

        world.lock().unwrap().add_object(ObjectType::Clock, Vec2::ZERO).unwrap();
        assert_eq!(driver.clock_count(id), 1);
        assert_eq!(driver.scheduled(ClockRate::Regular), 1);

        drop(world);
        assert_eq!(driver.world_count(), 0);
        assert_eq!(driver.scheduled(ClockRate::Regular), 0);
    }

    #[test]
    fn test_retype_moves_between_buckets() {
        let driver = ClockDriver::default();
        let world = shared(&driver);
        let mut guard = world.lock().unwrap();
        let id = guard.world_id().unwrap();
        let clock = guard.add_object(ObjectType::Clock, Vec2::ZERO).unwrap();

        guard.set_clock_rate(clock, ClockRate::Fast).unwrap();
        assert_eq!(driver.scheduled(ClockRate::Regular), 0);
        assert_eq!(driver.scheduled(ClockRate::Fast), 1);

        // Stopped clocks leave their bucket but still count
        guard.set_clock_rate(clock, ClockRate::Off).unwrap();
        assert_eq!(driver.scheduled(ClockRate::Fast), 0);
        assert_eq!(driver.clock_count(id), 1);

        guard.remove_object(clock).unwrap();
        assert_eq!(driver.clock_count(id), 0);
    }

    #[test]
    fn test_worlds_without_clocks_are_skipped() {
        let driver = ClockDriver::default();
        let world = shared(&driver);
        world.lock().unwrap().add_object(ObjectType::Emitter, Vec2::ZERO).unwrap();
        assert_eq!(driver.tick(), 0);
    }

    #[test]
    fn test_stopped_clock_keeps_phase() {
        let driver = ClockDriver::default();
        let world = shared(&driver);
        let clock = {
            let mut guard = world.lock().unwrap();
            let clock = guard.add_object(ObjectType::Clock, Vec2::ZERO).unwrap();
            guard.set_clock_rate(clock, ClockRate::Off).unwrap();
            clock
        };
        // The world is still re-settled because it owns a clock
        assert_eq!(driver.tick(), 1);
        assert_eq!(driver.tick(), 1);
        assert!(!clock_active(&world, clock));
    }

    #[test]
    fn test_clock_drives_emitter() {
        let driver = ClockDriver::default();
        let world = shared(&driver);
        let (clock, emitter) = {
            let mut guard = world.lock().unwrap();
            let clock = guard.add_object(ObjectType::Clock, Vec2::new(0.0, -100.0)).unwrap();
            let emitter = guard.add_object(ObjectType::Emitter, Vec2::ZERO).unwrap();
            guard.set_clock_rate(clock, ClockRate::Extreme).unwrap();
            guard.control(clock, emitter).unwrap();
            (clock, emitter)
        };
        assert!(world.lock().unwrap().beam_paths().is_empty());

        let mut seen = Vec::new();
        for _ in 0..4 {
            driver.tick();
            let guard = world.lock().unwrap();
            let on = guard.object(emitter).unwrap().as_toggle().unwrap().is_on();
            let active = matches!(
                guard.object(clock).map(|o| o.kind()),
                Some(ObjectKind::Clock(c)) if c.active
            );
            assert_eq!(on, active);
            seen.push(guard.beam_paths().len());
        }
        assert_eq!(seen, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_redraw_hook_called_per_world() {
        let driver = ClockDriver::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        driver.set_redraw_hook(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let a = shared(&driver);
        let b = shared(&driver);
        a.lock().unwrap().add_object(ObjectType::Clock, Vec2::ZERO).unwrap();
        b.lock().unwrap().add_object(ObjectType::Clock, Vec2::ZERO).unwrap();

        assert_eq!(driver.tick(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        driver.clear_redraw_hook();
        driver.tick();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_background_thread_ticks_until_stopped() {
        let driver = ClockDriver::new(Duration::from_millis(1));
        let world = shared(&driver);
        world.lock().unwrap().add_object(ObjectType::Clock, Vec2::ZERO).unwrap();

        let ticker = driver.start().unwrap();
        assert!(ticker.is_running());
        let deadline = Instant::now() + Duration::from_secs(5);
        while driver.ticks() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        ticker.stop();

        let stopped_at = driver.ticks();
        assert!(stopped_at >= 3);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(driver.ticks(), stopped_at);
    }

    #[test]
    fn test_single_background_thread_per_driver() {
        let driver = ClockDriver::new(Duration::from_millis(5));
        let ticker = driver.start().unwrap();
        assert!(matches!(driver.start(), Err(SimError::ClockRunning)));
        assert!(matches!(driver.clone().start(), Err(SimError::ClockRunning)));
        ticker.stop();

        let ticker = driver.start().unwrap();
        assert!(ticker.is_running());
        drop(ticker);
        driver.start().unwrap().stop();
    }
}
