//! Fault-injecting transport for deterministic testing.
//!
//! Real pub/sub links drop, reorder, duplicate and corrupt messages, and
//! publishes fail transiently.  To exercise the reassembly and retry paths
//! without depending on a real broker, [`Simulator`] wraps any
//! [`Transport`] and applies a configurable fault model on every publish:
//!
//! | Fault            | Description                                        |
//! |------------------|----------------------------------------------------|
//! | Publish failure  | Return a transient error with `fail_rate`.         |
//! | Loss             | Report success but deliver nothing (`loss_rate`).  |
//! | Corruption       | Flip one byte of the payload (`corrupt_rate`).     |
//! | Duplication      | Deliver the message twice (`duplicate_rate`).      |
//! | Reordering       | Hold the message back and release it after a later |
//! |                  | publish (`reorder_rate`).                          |
//!
//! All randomness comes from a seeded RNG so a failing run can be replayed.
//! Held-back messages are released by later publishes or by [`Simulator::flush`].

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::transport::{Message, Transport, TransportError};

/// Configuration for the fault model.
///
/// All rates are probabilities in `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that a publish attempt fails transiently.
    pub fail_rate: f64,
    /// Probability that an accepted message is silently dropped.
    pub loss_rate: f64,
    /// Probability that one payload byte is flipped.
    pub corrupt_rate: f64,
    /// Probability that a message is delivered twice.
    pub duplicate_rate: f64,
    /// Probability that a message is held back behind later traffic.
    pub reorder_rate: f64,
    /// RNG seed.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default: the simulator is a transparent pass-through.
        Self {
            fail_rate: 0.0,
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            duplicate_rate: 0.0,
            reorder_rate: 0.0,
            seed: 0,
        }
    }
}

/// Counters of what the simulator did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatorStats {
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
    pub corrupted: u64,
    pub duplicated: u64,
    pub reordered: u64,
}

struct SimState {
    rng: StdRng,
    held: Vec<Message>,
    stats: SimulatorStats,
}

/// A fault-injecting wrapper around another transport.
pub struct Simulator<T> {
    inner: T,
    config: SimulatorConfig,
    state: Mutex<SimState>,
}

/// What to do with one publish, decided under the lock.
enum Plan {
    Fail,
    Deliver(Vec<Message>),
}

impl<T: Transport> Simulator<T> {
    pub fn new(inner: T, config: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            inner,
            config,
            state: Mutex::new(SimState {
                rng,
                held: Vec::new(),
                stats: SimulatorStats::default(),
            }),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn stats(&self) -> SimulatorStats {
        self.lock().stats
    }

    /// Deliver every held-back message, in random order.
    pub async fn flush(&self) -> Result<(), TransportError> {
        let held = {
            let mut state = self.lock();
            let mut held = std::mem::take(&mut state.held);
            shuffle(&mut state.rng, &mut held);
            state.stats.delivered += held.len() as u64;
            held
        };
        for msg in held {
            self.inner.publish(&msg.topic, &msg.payload).await?;
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        // A panic while holding the lock leaves only counters and a queue
        // behind, both still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn plan(&self, topic: &str, payload: &[u8]) -> Plan {
        let cfg = &self.config;
        let mut state = self.lock();
        let st = &mut *state;

        if st.rng.gen_bool(cfg.fail_rate) {
            st.stats.failed += 1;
            return Plan::Fail;
        }
        if st.rng.gen_bool(cfg.loss_rate) {
            st.stats.dropped += 1;
            return Plan::Deliver(Vec::new());
        }

        let mut msg = Message::new(topic, payload.to_vec());
        if !msg.payload.is_empty() && st.rng.gen_bool(cfg.corrupt_rate) {
            let at = st.rng.gen_range(0..msg.payload.len());
            msg.payload[at] ^= 0xff;
            st.stats.corrupted += 1;
        }

        let copies = if st.rng.gen_bool(cfg.duplicate_rate) {
            st.stats.duplicated += 1;
            2
        } else {
            1
        };

        if st.rng.gen_bool(cfg.reorder_rate) {
            st.stats.reordered += 1;
            for _ in 0..copies {
                st.held.push(msg.clone());
            }
            return Plan::Deliver(Vec::new());
        }

        // Anything held back overtakes nothing: it goes out after this one.
        let mut out = vec![msg; copies];
        out.append(&mut st.held);
        st.stats.delivered += out.len() as u64;
        Plan::Deliver(out)
    }
}

impl<T: Transport> Transport for Simulator<T> {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        match self.plan(topic, payload) {
            Plan::Fail => Err(TransportError::Transient("simulated publish failure".into())),
            Plan::Deliver(msgs) => {
                for msg in msgs {
                    self.inner.publish(&msg.topic, &msg.payload).await?;
                }
                Ok(())
            }
        }
    }
}

fn shuffle(rng: &mut StdRng, items: &mut [Message]) {
    // Fisher–Yates.
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}
