// ==============================================================================
// race.rs — RACE SESSION
// ------------------------------------------------------------------------------
// Owns the track, every driver, the driver-id counter and the RNG seed.
//
// Frame contract:
// - drivers update in insertion order (the Vec order), every frame
// - a DriverView snapshot of all drivers is taken before anyone moves, so every
//   AI reads the same pre-frame positions whatever its place in the order;
//   only a lane claimed this frame is written back, so two AIs never take the
//   same free lane
// - each AI's own inputs -> dynamics -> verge check happen inside its update
//
// Status: Countdown (vehicles held) -> Racing -> Finished. Closed tracks count
// laps; on open tracks reaching the end of the track finishes a driver.
// ==============================================================================

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use crate::ai::{AiTelemetry, RacingAiDriver, TelemetryClock, TELEMETRY_TARGET};
use crate::config::SimConfig;
use crate::driver::{Driver, DriverView, PlayerDriver};
use crate::dynamics::{DrivableVehicle, DynamicsTuning, VehicleInput, VehicleSnapshot, VehicleSpec};
use crate::powertrain::Motor;
use crate::spawn::SpawnManager;
use crate::track::{oval, Track, TrackBuilder, TrackError};

pub const MAX_PLAYERS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RaceStatus {
    Countdown { remaining: f32 },
    Racing,
    Finished,
}

#[derive(Debug, Clone, Serialize)]
pub struct Standing {
    pub id: usize,
    pub name: String,
    pub place: usize, // 1-based
    pub lap: i32,
    pub track_position: f32,
    pub speed: f32,
    pub finished: bool,
    pub at_end: bool,
    pub is_ai: bool,
    pub lap_times: Vec<f32>, // s, completed laps in order
    pub current_lap_time: f32,
    pub best_lap_time: Option<f32>,
}

// ---------------------------------------------
// PER-DRIVER LAP TIMING
// ---------------------------------------------
// A lap is timed only when the lap counter passes its highest value so far, so
// reversing over the line and crossing back does not produce a short lap.
#[derive(Debug, Clone, Default)]
pub struct LapTimer {
    lap_started_at: f32,
    highest_lap: i32,
    pub lap_times: Vec<f32>,
}

impl LapTimer {
    pub fn starting_at(elapsed: f32, lap: i32) -> Self {
        Self {
            lap_started_at: elapsed,
            highest_lap: lap,
            lap_times: Vec::new(),
        }
    }

    /// Feeds the driver's lap counter; returns the lap time when one completes.
    pub fn observe(&mut self, lap: i32, elapsed: f32) -> Option<f32> {
        if lap <= self.highest_lap {
            return None;
        }
        self.highest_lap = lap;
        let time = elapsed - self.lap_started_at;
        self.lap_started_at = elapsed;
        self.lap_times.push(time);
        Some(time)
    }

    pub fn current(&self, elapsed: f32) -> f32 {
        (elapsed - self.lap_started_at).max(0.0)
    }

    pub fn best(&self) -> Option<f32> {
        self.lap_times.iter().copied().reduce(f32::min)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverSnapshot {
    pub id: usize,
    pub lane: Option<i32>,
    pub vehicle: VehicleSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct RaceSnapshot {
    pub tick: u64,
    pub elapsed: f32,
    pub status: RaceStatus,
    pub laps: u32,
    pub standings: Vec<Standing>,
    pub drivers: Vec<DriverSnapshot>,
}

pub struct RaceSession {
    track: Track,
    drivers: Vec<Driver>,
    next_id: usize,
    seed: u64,
    laps: u32,
    status: RaceStatus,
    elapsed: f32,
    tick: u64,
    finish_order: Vec<usize>,
    lap_timers: HashMap<usize, LapTimer>,
    spawns: SpawnManager,

    tuning: DynamicsTuning,
    player_spec: VehicleSpec,
    ai_spec: VehicleSpec,
    manual_gearbox: bool,
    telemetry_enabled: bool,
    telemetry_interval: f32,
}

impl RaceSession {
    pub fn new(track: Track, config: &SimConfig, max_drivers: usize) -> Self {
        tracing::info!(
            nodes = track.len(),
            closed = track.is_closed(),
            laps = config.laps,
            seed = config.seed,
            "race session created"
        );
        Self {
            track,
            drivers: Vec::new(),
            next_id: 0,
            seed: config.seed,
            laps: config.laps.max(1),
            status: RaceStatus::Countdown {
                remaining: config.countdown_secs.max(0.0),
            },
            elapsed: 0.0,
            tick: 0,
            finish_order: Vec::new(),
            lap_timers: HashMap::new(),
            spawns: SpawnManager::new(max_drivers),
            tuning: config.tuning,
            player_spec: config.player_vehicle.spec(),
            ai_spec: config.ai_vehicle.spec(),
            manual_gearbox: config.manual_gearbox,
            telemetry_enabled: config.telemetry.enabled,
            telemetry_interval: config.telemetry.interval,
        }
    }

    /// Builds the configured circuit and fills the AI part of the grid.
    pub fn from_config(config: &SimConfig) -> Result<Self, TrackError> {
        let t = &config.track;
        let track = if t.closed {
            oval(t.node_spacing, t.straight_nodes, t.corner_nodes)?
        } else {
            let per_node = 90.0 / t.corner_nodes.max(1) as f32;
            TrackBuilder::new(t.node_spacing)
                .straight(t.straight_nodes)
                .corner(t.corner_nodes, per_node)
                .straight(t.straight_nodes)
                .build(false)?
        };
        let mut race = Self::new(track, config, config.ai_drivers + MAX_PLAYERS);
        for _ in 0..config.ai_drivers {
            race.add_ai();
        }
        Ok(race)
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn status(&self) -> RaceStatus {
        self.status
    }

    pub fn drivers(&self) -> &[Driver] {
        &self.drivers
    }

    pub fn driver(&self, id: usize) -> Option<&Driver> {
        self.drivers.iter().find(|d| d.id() == id)
    }

    pub fn driver_mut(&mut self, id: usize) -> Option<&mut Driver> {
        self.drivers.iter_mut().find(|d| d.id() == id)
    }

    fn take_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn spawn_vehicle(&mut self, id: usize, spec: VehicleSpec, manual: bool) -> Option<DrivableVehicle> {
        let slot = self.spawns.allocate_slot(&self.track, id)?;
        tracing::debug!(id, grid = slot.grid_position, column = ?slot.column, node = slot.node.0, "grid slot");
        self.lap_timers.insert(id, LapTimer::starting_at(self.elapsed, 0));
        let motor = Motor::new(spec.horsepower, spec.redline, manual);
        Some(DrivableVehicle::new(
            spec,
            self.tuning,
            Box::new(motor),
            &self.track,
            slot.node,
            slot.lateral,
        ))
    }

    /// Adds a player on the next grid slot. None once the grid is full.
    pub fn add_player(&mut self, name: impl Into<String>) -> Option<usize> {
        let id = self.next_id;
        let vehicle = self.spawn_vehicle(id, self.player_spec, self.manual_gearbox)?;
        self.take_id();
        let name = name.into();
        tracing::info!(id, %name, "player joined");
        self.drivers.push(Driver::Player(PlayerDriver::new(id, name, vehicle)));
        Some(id)
    }

    /// Adds an AI opponent seeded from the session seed and its id.
    pub fn add_ai(&mut self) -> Option<usize> {
        let id = self.next_id;
        let vehicle = self.spawn_vehicle(id, self.ai_spec, false)?;
        self.take_id();
        let clock = TelemetryClock::new(self.telemetry_enabled, self.telemetry_interval);
        let driver = RacingAiDriver::new(id, vehicle, self.seed ^ id as u64, clock);
        self.drivers.push(Driver::Ai(Box::new(driver)));
        Some(id)
    }

    pub fn remove_driver(&mut self, id: usize) -> bool {
        let before = self.drivers.len();
        self.drivers.retain(|d| d.id() != id);
        self.finish_order.retain(|&f| f != id);
        self.lap_timers.remove(&id);
        self.spawns.release(id);
        let removed = self.drivers.len() != before;
        if removed {
            tracing::info!(id, "driver removed");
        }
        removed
    }

    pub fn set_player_input(&mut self, id: usize, input: VehicleInput) -> bool {
        match self.driver_mut(id) {
            Some(Driver::Player(p)) => {
                p.set_input(input);
                true
            }
            _ => false,
        }
    }

    fn is_finished(&self, driver: &Driver) -> bool {
        driver.at_end_of_track(&self.track)
            || (self.track.is_closed() && driver.vehicle().lap >= self.laps as i32)
    }

    /// Advances the whole race by one frame and returns any AI telemetry due.
    pub fn step(&mut self, dt: f32) -> Vec<AiTelemetry> {
        self.tick += 1;
        let mut records = Vec::new();

        match self.status {
            RaceStatus::Countdown { remaining } => {
                let remaining = remaining - dt;
                if remaining <= 0.0 {
                    tracing::info!(drivers = self.drivers.len(), "race started");
                    self.status = RaceStatus::Racing;
                } else {
                    self.status = RaceStatus::Countdown { remaining };
                }
                return records;
            }
            RaceStatus::Finished => return records,
            RaceStatus::Racing => {}
        }

        self.elapsed += dt;
        let mut views: Vec<DriverView> = self.drivers.iter().map(|d| d.view(&self.track)).collect();

        for (i, driver) in self.drivers.iter_mut().enumerate() {
            if let Some(record) = driver.update(&self.track, &views, dt) {
                tracing::debug!(target: TELEMETRY_TARGET, "{}", record.to_json());
                records.push(record);
            }
            views[i].virtual_lane = driver.virtual_lane();

            let lap = driver.vehicle().lap;
            if let Some(timer) = self.lap_timers.get_mut(&driver.id()) {
                if let Some(time) = timer.observe(lap, self.elapsed) {
                    tracing::info!(id = driver.id(), lap, time, "lap completed");
                }
            }
        }

        for i in 0..self.drivers.len() {
            let id = self.drivers[i].id();
            if !self.finish_order.contains(&id) && self.is_finished(&self.drivers[i]) {
                self.finish_order.push(id);
                tracing::info!(
                    id,
                    place = self.finish_order.len(),
                    elapsed = self.elapsed,
                    "driver finished"
                );
            }
        }

        if !self.drivers.is_empty() && self.finish_order.len() == self.drivers.len() {
            tracing::info!(elapsed = self.elapsed, "race finished");
            self.status = RaceStatus::Finished;
        }
        records
    }

    /// Driver ids best-first: finishers in finishing order, then by progress.
    pub fn ranking(&self) -> Vec<usize> {
        let mut running: Vec<(usize, f32)> = self
            .drivers
            .iter()
            .filter(|d| !self.finish_order.contains(&d.id()))
            .map(|d| (d.id(), d.vehicle().track_position(&self.track)))
            .collect();
        running.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        self.finish_order
            .iter()
            .copied()
            .chain(running.into_iter().map(|(id, _)| id))
            .collect()
    }

    pub fn snapshot(&self) -> RaceSnapshot {
        let standings = self
            .ranking()
            .into_iter()
            .enumerate()
            .filter_map(|(i, id)| {
                let d = self.driver(id)?;
                let v = d.vehicle();
                let timer = self.lap_timers.get(&id);
                Some(Standing {
                    id,
                    name: d.name(),
                    place: i + 1,
                    lap: v.lap,
                    track_position: v.track_position(&self.track),
                    speed: v.speed,
                    finished: self.finish_order.contains(&id),
                    at_end: d.at_end_of_track(&self.track),
                    is_ai: matches!(d, Driver::Ai(_)),
                    lap_times: timer.map(|t| t.lap_times.clone()).unwrap_or_default(),
                    current_lap_time: timer.map(|t| t.current(self.elapsed)).unwrap_or(0.0),
                    best_lap_time: timer.and_then(LapTimer::best),
                })
            })
            .collect();

        let drivers = self
            .drivers
            .iter()
            .map(|d| DriverSnapshot {
                id: d.id(),
                lane: d.virtual_lane(),
                vehicle: d.vehicle().snapshot(),
            })
            .collect();

        RaceSnapshot {
            tick: self.tick,
            elapsed: self.elapsed,
            status: self.status,
            laps: self.laps,
            standings,
            drivers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SimConfig {
        SimConfig {
            countdown_secs: 0.5,
            laps: 1,
            ..SimConfig::default()
        }
    }

    #[test]
    fn from_config_fills_the_grid_with_ai() {
        let cfg = SimConfig { ai_drivers: 3, ..config() };
        let mut race = RaceSession::from_config(&cfg).unwrap();
        assert_eq!(race.drivers().len(), 3);
        assert!(race.drivers().iter().all(|d| matches!(d, Driver::Ai(_))));
        assert!(race.add_player("late joiner").is_some());
    }

    #[test]
    fn ids_come_from_the_session_counter() {
        let mut race = RaceSession::new(oval(4.0, 30, 30).unwrap(), &config(), 3);
        assert_eq!(race.add_player("p1"), Some(0));
        assert_eq!(race.add_ai(), Some(1));
        assert_eq!(race.add_ai(), Some(2));
        assert_eq!(race.add_ai(), None, "grid full");
        assert!(race.remove_driver(1));
        assert_eq!(race.drivers().len(), 2);
        assert_eq!(race.add_ai(), Some(3), "freed slot, fresh id");
    }

    #[test]
    fn countdown_holds_everyone() {
        let mut race = RaceSession::new(oval(4.0, 30, 30).unwrap(), &config(), 2);
        let id = race.add_player("p1").unwrap();
        race.set_player_input(id, VehicleInput { throttle: 1.0, ..Default::default() });
        for _ in 0..20 {
            race.step(1.0 / 60.0);
        }
        assert!(matches!(race.status(), RaceStatus::Countdown { .. }));
        assert_eq!(race.driver(id).unwrap().vehicle().speed, 0.0);
        for _ in 0..30 {
            race.step(1.0 / 60.0);
        }
        assert_eq!(race.status(), RaceStatus::Racing);
        assert!(race.driver(id).unwrap().vehicle().speed > 0.0);
    }

    #[test]
    fn same_seed_same_race() {
        let run = || {
            let mut race = RaceSession::new(oval(4.0, 30, 30).unwrap(), &config(), 4);
            for _ in 0..4 {
                race.add_ai();
            }
            for _ in 0..600 {
                race.step(1.0 / 60.0);
            }
            race.drivers()
                .iter()
                .map(|d| d.vehicle().track_position(race.track()))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn open_track_race_finishes_when_everyone_reaches_the_end() {
        let track = TrackBuilder::new(4.0).straight(80).build(false).unwrap();
        let mut race = RaceSession::new(track, &config(), 2);
        race.add_ai();
        race.add_ai();
        for _ in 0..60 * 60 {
            race.step(1.0 / 60.0);
            if race.status() == RaceStatus::Finished {
                break;
            }
        }
        assert_eq!(race.status(), RaceStatus::Finished);
        let snap = race.snapshot();
        assert_eq!(snap.standings.len(), 2);
        assert!(snap.standings.iter().all(|s| s.finished && s.at_end));
        assert_eq!(snap.standings[0].place, 1);
    }

    #[test]
    fn side_by_side_ais_do_not_claim_the_same_lane() {
        use crate::ai::overtaking::Overtaking;
        use crate::track::NodeId;

        let track = TrackBuilder::new(4.0).verges(5.0, 7.0).straight(100).build(false).unwrap();
        let mut race = RaceSession::new(track, &SimConfig { countdown_secs: 0.0, ..config() }, 3);
        for _ in 0..3 {
            race.add_ai();
        }
        race.step(1.0 / 60.0);
        assert_eq!(race.status(), RaceStatus::Racing);

        // 0 and 1 alongside each other, both stuck behind a slow 2
        for (id, node, speed) in [(0, 50, 120.0), (1, 50, 120.0), (2, 51, 50.0)] {
            let position = race.track().node(NodeId(node)).position;
            let Some(Driver::Ai(ai)) = race.driver_mut(id) else {
                panic!("driver {id} is not an AI");
            };
            ai.virtual_lane = 2;
            ai.personality.lane_change_probability = 1.0;
            ai.overtaking = Overtaking::new(0);
            ai.vehicle.current_node = NodeId(node);
            ai.vehicle.node_fraction = 0.0;
            ai.vehicle.position = position;
            ai.vehicle.speed = speed;
        }

        race.step(1.0 / 60.0);
        let lanes: Vec<_> = race.drivers().iter().map(|d| d.virtual_lane()).collect();
        assert_eq!(lanes, vec![Some(3), Some(2), Some(2)]);
    }

    #[test]
    fn lap_timer_ignores_recrossing_the_line() {
        let mut timer = LapTimer::starting_at(2.0, 0);
        assert_eq!(timer.observe(0, 10.0), None);
        assert_eq!(timer.observe(1, 32.0), Some(30.0));
        // backed over the line and crossed it again
        assert_eq!(timer.observe(0, 33.0), None);
        assert_eq!(timer.observe(1, 34.0), None);
        assert_eq!(timer.observe(2, 60.0), Some(28.0));
        assert_eq!(timer.lap_times, vec![30.0, 28.0]);
        assert_eq!(timer.best(), Some(28.0));
        assert_eq!(timer.current(65.0), 5.0);
    }

    #[test]
    fn lap_times_are_recorded_each_time_the_line_is_crossed() {
        let cfg = SimConfig { countdown_secs: 0.0, laps: 3, ..config() };
        let mut race = RaceSession::new(oval(4.0, 40, 30).unwrap(), &cfg, 1);
        let id = race.add_ai().unwrap();
        for _ in 0..60 * 240 {
            race.step(1.0 / 60.0);
            if race.driver(id).unwrap().vehicle().lap >= 2 {
                break;
            }
        }
        let snap = race.snapshot();
        let standing = &snap.standings[0];
        assert_eq!(standing.lap, 2);
        assert_eq!(standing.lap_times.len(), 2);
        assert!(standing.lap_times.iter().all(|&t| t > 5.0), "{:?}", standing.lap_times);
        let timed: f32 = standing.lap_times.iter().sum::<f32>() + standing.current_lap_time;
        assert!((timed - snap.elapsed).abs() < 1e-2, "timed {timed} elapsed {}", snap.elapsed);
        assert_eq!(
            standing.best_lap_time,
            standing.lap_times.iter().copied().reduce(f32::min)
        );
    }

    #[test]
    fn ranking_orders_by_progress() {
        let mut race = RaceSession::new(oval(4.0, 30, 30).unwrap(), &config(), 4);
        let a = race.add_player("a").unwrap();
        let b = race.add_player("b").unwrap();
        let c = race.add_player("c").unwrap();
        // c is on the second row
        let ranking = race.ranking();
        assert_eq!(ranking.len(), 3);
        assert_eq!(ranking[2], c);
        assert!(ranking[..2].contains(&a) && ranking[..2].contains(&b));
        let json = serde_json::to_string(&race.snapshot()).unwrap();
        assert!(json.contains("\"state\":\"countdown\""));
    }
}
