//! Two-state Markov demand generator.
//!
//! The client alternates between an OFF state (no demand) and an ON state
//! (holding a demand window). From a target duty fraction `rho` and a mean
//! cycle length, the transition probabilities are
//! `beta = cycle * rho`, `alpha = cycle - beta`,
//! `p = 1 / beta` (ON -> OFF) and `q = 1 / (alpha + 1)` (OFF -> ON).
//!
//! The generator is stepped once per grant period. Opening a demand window
//! yields a tier (uniform over Low/High/Both) and a window length drawn
//! geometric(p), the ON-state dwell time.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use smartgrid_wire::PowerTier;

/// Cap on a single demand window, in ticks. The geometric tail is long; a
/// window this size is already several full cycles.
const MAX_WINDOW_TICKS: u32 = 64;

/// What the generator decided on this step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A new demand window opened: request this tier for this many ticks.
    TurnOn { tier: PowerTier, ticks: u32 },
    /// Still inside a demand window.
    StayOn,
    /// The current demand window ended.
    TurnOff,
    /// Still idle.
    StayOff,
}

/// Markov-modulated demand source.
#[derive(Debug)]
pub struct MarkovGenerator {
    /// Probability of leaving the ON state on a step.
    p: f64,

    /// Probability of leaving the OFF state on a step.
    q: f64,

    on: bool,
    rng: StdRng,
}

impl MarkovGenerator {
    /// Build a generator targeting duty fraction `rho` over a mean cycle of
    /// `cycle_length` steps. `rho` must be in (0, 1).
    pub fn new(rho: f64, cycle_length: u32, seed: Option<u64>) -> Self {
        let beta = f64::from(cycle_length) * rho;
        let alpha = f64::from(cycle_length) - beta;
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            p: 1.0 / beta,
            q: 1.0 / (alpha + 1.0),
            on: false,
            rng,
        }
    }

    /// ON -> OFF transition probability.
    pub fn p(&self) -> f64 {
        self.p
    }

    /// OFF -> ON transition probability.
    pub fn q(&self) -> f64 {
        self.q
    }

    /// Whether a demand window is currently open.
    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Advance the chain by one step.
    pub fn step(&mut self) -> Transition {
        if self.on {
            if self.rng.random::<f64>() <= self.p {
                self.on = false;
                Transition::TurnOff
            } else {
                Transition::StayOn
            }
        } else if self.rng.random::<f64>() <= self.q {
            self.on = true;
            let tier = match self.rng.random_range(0..3u8) {
                0 => PowerTier::High,
                1 => PowerTier::Low,
                _ => PowerTier::Both,
            };
            Transition::TurnOn {
                tier,
                ticks: self.sample_window(),
            }
        } else {
            Transition::StayOff
        }
    }

    /// Geometric(p) dwell time, at least one tick.
    fn sample_window(&mut self) -> u32 {
        let mut ticks = 1;
        while ticks < MAX_WINDOW_TICKS && self.rng.random::<f64>() > self.p {
            ticks += 1;
        }
        ticks
    }
}
