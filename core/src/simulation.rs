//! Deterministic scenarios of several systems on one simulated clock and network.
//!
//! A [Scenario](Scenario) steps all of its systems in turn and only moves the clock
//! when nobody has anything left to do, jumping straight to the next deadline.
//! Timeouts of minutes therefore take no real time at all.
//!
//! # Example
//!
//! ```
//! use troupe::{prelude::*, simulation::Scenario};
//! use std::time::Duration;
//!
//! let mut scenario = Scenario::new();
//! let leader_address = "local://10.0.0.1:1900";
//! let mut leader = scenario.config(leader_address).expect("config");
//! leader.load_config_str(r#"troupe.convention.addresses = ["local://10.0.0.1:1900"]"#);
//! let mut member = scenario.config("local://10.0.0.2:1900").expect("config");
//! member.load_config_str(r#"troupe.convention.addresses = ["local://10.0.0.1:1900"]"#);
//! let leader = scenario.add_system(leader).expect("leader");
//! let member = scenario.add_system(member).expect("member");
//! let joined = scenario.run_until(Duration::from_secs(5), |s| {
//!     let now = s.now();
//!     s.system(leader).convention().live_members(now).len() == 1
//! });
//! assert!(joined);
//! assert!(!scenario.system(member).is_leader());
//! ```

use crate::{
    actors::{AddressParseError, SystemPath},
    net::simulation::SimulationNetwork,
    runtime::{keys, ActorSystem, SystemConfig, SystemError},
    timer::SimulationClock,
};
use std::time::Duration;

const MAX_SETTLE_ROUNDS: usize = 10_000;

/// Several systems sharing a [SimulationClock](SimulationClock) and a [SimulationNetwork](SimulationNetwork)
pub struct Scenario {
    clock: SimulationClock,
    network: SimulationNetwork,
    systems: Vec<ActorSystem>,
}

impl Scenario {
    pub fn new() -> Self {
        Scenario {
            clock: SimulationClock::new(),
            network: SimulationNetwork::new(),
            systems: Vec::new(),
        }
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    /// The network, for inspecting traffic and injecting faults
    pub fn network(&self) -> &SimulationNetwork {
        &self.network
    }

    pub fn now(&self) -> Duration {
        use crate::timer::Clock;
        self.clock.now()
    }

    /// A config for a system at `address` on this scenario's clock and network
    pub fn config(&self, address: &str) -> Result<SystemConfig, AddressParseError> {
        let system: SystemPath = address.parse()?;
        let mut config = SystemConfig::default();
        config
            .set_config_value(&keys::ADDRESS, address.to_string())
            .clock(self.clock.shared())
            .transport(Box::new(self.network.transport(system)));
        Ok(config)
    }

    /// Build a system and add it, returning its index
    pub fn add_system(&mut self, config: SystemConfig) -> Result<usize, SystemError> {
        let system = config.build()?;
        self.systems.push(system);
        Ok(self.systems.len() - 1)
    }

    /// The system at `index`
    ///
    /// # Panics
    ///
    /// If there is no system at `index`.
    pub fn system(&mut self, index: usize) -> &mut ActorSystem {
        &mut self.systems[index]
    }

    pub fn systems(&self) -> &[ActorSystem] {
        &self.systems
    }

    /// Step every system without moving the clock until nothing happens any more
    ///
    /// Returns the number of rounds it took.
    pub fn settle(&mut self) -> usize {
        for round in 0..MAX_SETTLE_ROUNDS {
            let mut progressed = false;
            for system in self.systems.iter_mut() {
                progressed |= system.step(Duration::ZERO);
            }
            if !progressed && self.network.is_idle() {
                return round;
            }
        }
        MAX_SETTLE_ROUNDS
    }

    /// The earliest deadline of any running system
    pub fn next_deadline(&self) -> Option<Duration> {
        self.systems
            .iter()
            .filter(|system| !system.is_shut_down())
            .filter_map(|system| system.next_deadline())
            .min()
    }

    /// Run until `done` holds or `limit` has passed on the simulated clock
    ///
    /// Returns whether `done` held.
    pub fn run_until<F>(&mut self, limit: Duration, mut done: F) -> bool
    where
        F: FnMut(&mut Scenario) -> bool,
    {
        let end = self.now().saturating_add(limit);
        loop {
            self.settle();
            if done(self) {
                return true;
            }
            let now = self.now();
            if now >= end {
                return false;
            }
            let next = self
                .next_deadline()
                .unwrap_or(end)
                .max(now + Duration::from_millis(1))
                .min(end);
            self.clock.advance_to(next);
        }
    }

    /// Run for `duration` of simulated time
    pub fn run_for(&mut self, duration: Duration) {
        self.run_until(duration, |_| false);
    }

    /// Shut down the system at `index`, letting the others keep running while it drains
    ///
    /// Returns `true` if it finished within its drain period.
    pub fn shutdown(&mut self, index: usize) -> bool {
        let limit = {
            let system = &mut self.systems[index];
            system.handle().request_shutdown();
            system.drain_period()
        };
        self.run_until(limit + Duration::from_secs(1), |s| {
            s.systems[index].is_shut_down()
        })
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Scenario::new()
    }
}
