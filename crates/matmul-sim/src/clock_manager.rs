#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEdge {
    None,
    Rising,
    Falling,
}

#[derive(Debug, Clone)]
pub struct ClockInfo {
    pub name: String,
    pub current_value: bool,
    pub previous_value: bool,
    pub period_ps: u64, // Period in picoseconds
}

impl ClockInfo {
    pub fn new(name: String, period_ps: u64) -> Self {
        ClockInfo {
            name,
            current_value: false,
            previous_value: false,
            period_ps,
        }
    }

    pub fn detect_edge(&self) -> ClockEdge {
        match (self.previous_value, self.current_value) {
            (false, true) => ClockEdge::Rising,
            (true, false) => ClockEdge::Falling,
            _ => ClockEdge::None,
        }
    }

    pub fn update(&mut self, new_value: bool) {
        self.previous_value = self.current_value;
        self.current_value = new_value;
    }

    pub fn toggle(&mut self) {
        self.update(!self.current_value);
    }
}

/// Drives the single harness clock and keeps cycle/time bookkeeping.
///
/// A cycle starts at a rising edge. Cycle 0 is the span before the first edge.
pub struct ClockManager {
    clock: ClockInfo,
    cycle: u64,
    current_time_ps: u64,
}

impl ClockManager {
    pub fn new(name: impl Into<String>, period_ps: u64) -> Self {
        ClockManager {
            clock: ClockInfo::new(name.into(), period_ps),
            cycle: 0,
            current_time_ps: 0,
        }
    }

    pub fn clock(&self) -> &ClockInfo {
        &self.clock
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn time_ps(&self) -> u64 {
        self.current_time_ps
    }

    /// Run the low half of the period, then raise the clock
    pub fn advance_to_rising_edge(&mut self) -> ClockEdge {
        let half_period = self.clock.period_ps / 2;
        if self.clock.current_value {
            self.clock.update(false);
            self.current_time_ps += self.clock.period_ps - half_period;
        }
        self.current_time_ps += half_period;
        self.clock.update(true);
        let edge = self.clock.detect_edge();
        if edge == ClockEdge::Rising {
            self.cycle += 1;
        }
        edge
    }

    pub fn reset(&mut self) {
        self.cycle = 0;
        self.current_time_ps = 0;
        self.clock.current_value = false;
        self.clock.previous_value = false;
    }
}
