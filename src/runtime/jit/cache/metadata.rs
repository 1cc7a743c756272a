/// Frame id stored in a record that has never reported usage.
pub const UNSEEN_FRAME: u64 = u64::MAX;

/// Routine handle plus accumulated usage statistics for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecializationRecord<V> {
    pub routine: V,
    pub last_frame_seen: u64,
    pub frame_count: u64,
    pub primitive_count: u64,
    pub tick_count: u64,
    pub actual_unit_count: u64,
    pub total_unit_count: u64,
}

impl<V> SpecializationRecord<V> {
    pub fn new(routine: V) -> Self {
        Self {
            routine,
            last_frame_seen: UNSEEN_FRAME,
            frame_count: 0,
            primitive_count: 0,
            tick_count: 0,
            actual_unit_count: 0,
            total_unit_count: 0,
        }
    }

    /// Fold one invocation's counters into the record.
    ///
    /// Panics when the accumulated actual units exceed the total units, which
    /// means the caller measured its work incorrectly.
    pub fn record_usage(
        &mut self,
        frame: u64,
        ticks: u64,
        actual_units: u64,
        total_units: u64,
        primitives: u64,
    ) {
        if self.last_frame_seen != frame {
            self.last_frame_seen = frame;
            self.frame_count += 1;
        }

        self.primitive_count += primitives;
        self.tick_count += ticks;
        self.actual_unit_count += actual_units;
        self.total_unit_count += total_units;

        assert!(
            self.total_unit_count >= self.actual_unit_count,
            "usage accounting violated: {} actual units reported against {} total units",
            self.actual_unit_count,
            self.total_unit_count
        );
    }

    /// Whether the record carries enough data to show up in a report.
    pub fn is_reportable(&self) -> bool {
        self.frame_count > 0 && self.actual_unit_count > 0
    }
}
