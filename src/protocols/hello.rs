use std::collections::BTreeMap;

use crate::model::node::NodeId;

/// Protocol timer constants, in seconds. The down interval exceeds the HELLO
/// interval by enough to tolerate a single lost beacon.
#[derive(Debug, Clone, Copy)]
pub struct Timers {
    pub hello_interval: f64,
    pub down_interval: f64,
    pub link_interval: f64,
}

impl Default for Timers {
    fn default() -> Self {
        Self {
            hello_interval: 1.0,
            down_interval: 2.1,
            link_interval: 4.5,
        }
    }
}

/// Periodic-origination clock: `due` fires and rearms, `mark` rearms after a
/// triggered origination so the periodic cadence restarts from it.
#[derive(Debug, Clone, Copy)]
struct OriginationClock {
    last_sent_at: f64,
}

impl Default for OriginationClock {
    fn default() -> Self {
        Self { last_sent_at: -1e9 }
    }
}

impl OriginationClock {
    fn due(&mut self, now: f64, interval: f64) -> bool {
        if (now - self.last_sent_at) < interval {
            return false;
        }
        self.last_sent_at = now;
        true
    }

    fn mark(&mut self, now: f64) {
        self.last_sent_at = now;
    }

    fn remaining(&self, now: f64, interval: f64) -> f64 {
        (self.last_sent_at + interval - now).max(0.0)
    }
}

/// Tracks when each direct neighbor last said HELLO and when this node last
/// originated HELLOs and LSAs.
#[derive(Debug)]
pub struct NeighborMonitor {
    timers: Timers,
    last_hello_at: BTreeMap<NodeId, f64>,
    hello_clock: OriginationClock,
    lsa_clock: OriginationClock,
}

impl NeighborMonitor {
    pub fn new(neighbors: &[NodeId], now: f64, timers: Timers) -> Self {
        Self {
            timers,
            last_hello_at: neighbors.iter().map(|n| (*n, now)).collect(),
            hello_clock: OriginationClock::default(),
            lsa_clock: OriginationClock::default(),
        }
    }

    pub fn timers(&self) -> Timers {
        self.timers
    }

    /// Advances the neighbor's last-HELLO timestamp, forward in time only.
    /// Any number of HELLOs within one tick collapse into a single update.
    pub fn record_hello(&mut self, neighbor: NodeId, now: f64) {
        if let Some(at) = self.last_hello_at.get_mut(&neighbor) {
            if now > *at {
                *at = now;
            }
        }
    }

    pub fn last_hello_at(&self, neighbor: NodeId) -> Option<f64> {
        self.last_hello_at.get(&neighbor).copied()
    }

    /// Neighbors whose last HELLO is older than the down interval. The
    /// caller intersects this with the set of currently-up neighbors.
    pub fn expired(&self, now: f64) -> Vec<NodeId> {
        self.last_hello_at
            .iter()
            .filter(|(_, &at)| (now - at) > self.timers.down_interval)
            .map(|(n, _)| *n)
            .collect()
    }

    pub fn hello_due(&mut self, now: f64) -> bool {
        self.hello_clock.due(now, self.timers.hello_interval)
    }

    pub fn lsa_due(&mut self, now: f64) -> bool {
        self.lsa_clock.due(now, self.timers.link_interval)
    }

    /// Rearm the periodic LSA clock after a triggered origination.
    pub fn mark_lsa_sent(&mut self, now: f64) {
        self.lsa_clock.mark(now);
    }

    /// Seconds until the nearest origination deadline; bounds the receive
    /// wait so timers never starve.
    pub fn next_deadline_in(&self, now: f64) -> f64 {
        let hello = self.hello_clock.remaining(now, self.timers.hello_interval);
        let lsa = self.lsa_clock.remaining(now, self.timers.link_interval);
        hello.min(lsa)
    }
}
