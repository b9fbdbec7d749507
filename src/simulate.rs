/// Two-sensor flood simulator.
///
/// Reproduces the field test rig: a downstream sensor (B) that reacts to
/// rain first and an upstream sensor (A) that replays B's level after a
/// fixed lag. Each step is one reading; a flood walks through
///
/// ```text
/// Normal → Raining → Rising → Peak → Falling → Normal
/// ```
///
/// and carries a countdown to the moment A is expected to reach danger.
/// Seeded with ChaCha8 so a given seed always yields the same history,
/// which the training dry runs and the test suite rely on.

use crate::model::SensorReading;
use chrono::{DateTime, Duration, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    pub base_a: f64,
    pub base_b: f64,
    pub base_flow: f64,
    pub peak_a: f64,
    pub peak_b: f64,
    pub peak_flow: f64,
    /// B level the countdown is computed against
    pub danger_b: f64,
    pub rain_steps: u32,
    pub rise_steps: u32,
    pub peak_steps: u32,
    pub fall_steps: u32,
    /// Steps by which A trails B
    pub lag_steps: usize,
    pub step_secs: f64,
    /// Chance per Normal step that rain starts
    pub flood_probability: f64,
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            base_a: 5.0,
            base_b: 4.0,
            base_flow: 2.0,
            peak_a: 30.0,
            peak_b: 28.0,
            peak_flow: 15.0,
            danger_b: 25.0,
            rain_steps: 10,
            rise_steps: 30,
            peak_steps: 15,
            fall_steps: 30,
            lag_steps: 15,
            step_secs: 2.0,
            flood_probability: 0.001,
            seed: 42,
        }
    }
}

impl SimulatorConfig {
    /// Steps from the start of rain until A is expected at danger level.
    pub fn steps_to_upstream_danger(&self) -> f64 {
        let rise_per_step = (self.peak_b - self.base_b) / self.rise_steps as f64;
        let b_steps = (self.danger_b - self.base_b) / rise_per_step;
        self.rain_steps as f64 + b_steps + self.lag_steps as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Normal,
    Raining,
    Rising,
    Peak,
    Falling,
}

pub struct SensorSimulator {
    config: SimulatorConfig,
    rng: ChaCha8Rng,
    phase: Phase,
    phase_step: u32,
    countdown_steps: f64,
    a: f64,
    b: f64,
    flow: f64,
    raining: bool,
    b_history: VecDeque<f64>,
    clock: DateTime<Utc>,
}

impl SensorSimulator {
    pub fn new(config: SimulatorConfig, start: DateTime<Utc>) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            phase: Phase::Normal,
            phase_step: 0,
            countdown_steps: 0.0,
            a: config.base_a,
            b: config.base_b,
            flow: config.base_flow,
            raining: false,
            b_history: VecDeque::with_capacity(config.lag_steps + 1),
            clock: start,
            config,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Starts rain immediately, as the rig's `--flood` switch does.
    pub fn start_flood(&mut self) {
        self.phase = Phase::Raining;
        self.phase_step = 0;
        self.raining = true;
        self.countdown_steps = self.config.steps_to_upstream_danger();
        log::debug!(
            "simulated rain started, upstream danger in {:.0} steps",
            self.countdown_steps
        );
    }

    fn noise(&mut self, amplitude: f64) -> f64 {
        self.rng.gen_range(-0.5..0.5) * amplitude
    }

    fn advance_phase(&mut self, length: u32, next: Phase) {
        self.phase_step += 1;
        if self.phase_step >= length {
            self.phase = next;
            self.phase_step = 0;
        }
    }

    /// Produces the next reading and advances the clock by one step.
    pub fn step(&mut self) -> SensorReading {
        let c = self.config.clone();

        if self.phase == Phase::Normal && self.rng.gen_bool(c.flood_probability.clamp(0.0, 1.0)) {
            self.start_flood();
        }

        match self.phase {
            Phase::Raining => self.advance_phase(c.rain_steps, Phase::Rising),
            Phase::Rising => {
                let remaining = c.rise_steps.saturating_sub(self.phase_step);
                if remaining > 0 {
                    self.b += (c.peak_b - self.b) / remaining as f64;
                    self.flow += (c.peak_flow - self.flow) / remaining as f64;
                }
                self.advance_phase(c.rise_steps, Phase::Peak);
            }
            Phase::Peak => {
                self.b = c.peak_b + self.noise(2.0);
                self.flow = c.peak_flow + self.noise(3.0);
                self.advance_phase(c.peak_steps, Phase::Falling);
            }
            Phase::Falling => {
                let remaining = c.fall_steps.saturating_sub(self.phase_step);
                if remaining > 0 {
                    self.b -= (self.b - c.base_b) / remaining as f64;
                    self.flow -= (self.flow - c.base_flow) / remaining as f64;
                }
                self.advance_phase(c.fall_steps, Phase::Normal);
                if self.phase == Phase::Normal {
                    self.countdown_steps = 0.0;
                    self.raining = false;
                }
            }
            Phase::Normal => {
                self.b += self.noise(0.5);
                self.b -= (self.b - c.base_b) * 0.1;
                self.flow += self.noise(0.2);
                self.flow -= (self.flow - c.base_flow) * 0.1;
                self.raining = false;
            }
        }

        // A replays B from `lag_steps` readings ago once the history is full
        self.b_history.push_back(self.b);
        if self.b_history.len() > c.lag_steps {
            if let Some(lagged) = self.b_history.pop_front() {
                self.a = lagged;
            }
        } else {
            self.a += self.noise(0.5);
            self.a -= (self.a - c.base_a) * 0.1;
        }

        let countdown_seconds = if self.phase == Phase::Normal {
            None
        } else {
            self.countdown_steps -= 1.0;
            Some((self.countdown_steps * c.step_secs).max(0.0))
        };

        self.a = self.a.clamp(0.0, c.peak_a);
        self.b = self.b.clamp(0.0, c.peak_b);

        let reading = SensorReading {
            mucnuoca: round_to(self.a, 1),
            mucnuocb: round_to(self.b, 1),
            luuluong: round_to(self.flow, 2),
            is_raining: Some(self.raining),
            created_at: self.clock,
            countdown_seconds,
        };

        self.clock += Duration::milliseconds((c.step_secs * 1000.0) as i64);
        reading
    }

    pub fn take(&mut self, n: usize) -> Vec<SensorReading> {
        (0..n).map(|_| self.step()).collect()
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// `rows` readings with frequent floods, for dry runs without a database.
///
/// The first flood starts on the first step so even short histories
/// contain every risk level.
pub fn synthetic_history(rows: usize, seed: u64, start: DateTime<Utc>) -> Vec<SensorReading> {
    let config = SimulatorConfig {
        flood_probability: 0.02,
        seed,
        ..SimulatorConfig::default()
    };
    let mut simulator = SensorSimulator::new(config, start);
    simulator.start_flood();
    simulator.take(rows)
}
