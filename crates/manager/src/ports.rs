//! Local port allocation for relay sessions.

use std::collections::BTreeSet;
use std::net::TcpListener;
use std::ops::RangeInclusive;

/// Pool of local TCP ports handed out to relay sessions.
///
/// Allocation prefers the lowest free port and probes each candidate
/// with a real bind before handing it out, so ports occupied by other
/// processes on the machine are skipped rather than returned.
#[derive(Debug)]
pub struct PortPool {
    range: RangeInclusive<u16>,
    in_use: BTreeSet<u16>,
}

impl PortPool {
    pub fn new(range: RangeInclusive<u16>) -> Self {
        Self {
            range,
            in_use: BTreeSet::new(),
        }
    }

    /// Reserves the lowest bindable port in the range, or `None` when
    /// every port is taken.
    pub fn allocate(&mut self) -> Option<u16> {
        for port in self.range.clone() {
            if self.in_use.contains(&port) {
                continue;
            }
            if !probe_bind(port) {
                continue;
            }
            self.in_use.insert(port);
            return Some(port);
        }
        None
    }

    /// Returns a port to the pool. Releasing a port that is not
    /// currently allocated is a no-op.
    pub fn release(&mut self, port: u16) {
        self.in_use.remove(&port);
    }

    pub fn allocated(&self) -> usize {
        self.in_use.len()
    }
}

fn probe_bind(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_distinct_ascending_ports() {
        let mut pool = PortPool::new(47100..=47109);
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        assert_ne!(a, b);
        assert!(a < b);
        assert_eq!(pool.allocated(), 2);
    }

    #[test]
    fn released_port_is_reused_first() {
        let mut pool = PortPool::new(47110..=47119);
        let a = pool.allocate().unwrap();
        let _b = pool.allocate().unwrap();
        pool.release(a);
        assert_eq!(pool.allocate(), Some(a));
    }

    #[test]
    fn skips_ports_bound_by_other_processes() {
        let mut pool = PortPool::new(47120..=47124);
        // Occupy the first port out of band.
        let _guard = TcpListener::bind(("127.0.0.1", 47120)).unwrap();
        let got = pool.allocate().unwrap();
        assert_ne!(got, 47120);
    }

    #[test]
    fn exhausted_range_yields_none() {
        let mut pool = PortPool::new(47130..=47131);
        pool.allocate().unwrap();
        pool.allocate().unwrap();
        assert_eq!(pool.allocate(), None);
        pool.release(47130);
        assert_eq!(pool.allocate(), Some(47130));
    }

    #[test]
    fn release_of_unallocated_port_is_harmless() {
        let mut pool = PortPool::new(47140..=47141);
        pool.release(47140);
        assert_eq!(pool.allocate(), Some(47140));
    }
}
