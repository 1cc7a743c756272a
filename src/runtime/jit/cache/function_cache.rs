use std::collections::HashMap;
use std::hash::Hash;
use std::io::{self, Write};

use ahash::RandomState;
use specmap_utils::TICK_FREQUENCY;
use tracing::warn;

use super::metadata::SpecializationRecord;
use super::report::{self, ReportRow};
use crate::runtime::jit::specialization::SelectorKey;

/// Produces the routine for a key the cache has not seen yet.
///
/// A producer is called at most once per key for the lifetime of the cache
/// that owns it. It has no error channel: it returns a usable routine or
/// panics.
pub trait Producer<K, V> {
    fn produce(&mut self, key: &K) -> V;
}

impl<K, V, F> Producer<K, V> for F
where
    F: FnMut(&K) -> V,
{
    fn produce(&mut self, key: &K) -> V {
        self(key)
    }
}

/// Key to routine cache with lazy production and per-key usage statistics
pub struct SpecializationCache<K, V, P> {
    name: String,
    records: Vec<SpecializationRecord<V>>,
    slots: HashMap<K, usize, RandomState>,
    active: Option<usize>,
    producer: P,
    tick_frequency: u64,
}

impl<K, V, P> SpecializationCache<K, V, P> {
    pub fn new(producer: P) -> Self {
        Self::with_name("specialization", producer)
    }

    pub fn with_name(name: impl Into<String>, producer: P) -> Self {
        Self {
            name: name.into(),
            records: Vec::new(),
            slots: HashMap::default(),
            active: None,
            producer,
            tick_frequency: TICK_FREQUENCY,
        }
    }

    /// Override the tick frequency used to convert ticks in reports.
    pub fn with_tick_frequency(mut self, tick_frequency: u64) -> Self {
        self.tick_frequency = tick_frequency;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tick_frequency(&self) -> u64 {
        self.tick_frequency
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn producer(&self) -> &P {
        &self.producer
    }

    pub fn producer_mut(&mut self) -> &mut P {
        &mut self.producer
    }

    /// Record of the most recent lookup, if any.
    pub fn active(&self) -> Option<&SpecializationRecord<V>> {
        self.active.and_then(|slot| self.records.get(slot))
    }

    /// Drop every record while leaving the producer untouched.
    ///
    /// The next lookup of each key goes back to the producer, which may hand
    /// out a routine it kept from before.
    pub fn clear_records(&mut self) {
        self.records.clear();
        self.slots.clear();
        self.active = None;
    }

    /// Fold one invocation's counters into the record of the last lookup.
    ///
    /// Does nothing before the first lookup.
    pub fn record_usage(
        &mut self,
        frame: u64,
        ticks: u64,
        actual_units: u64,
        total_units: u64,
        primitives: u64,
    ) {
        if let Some(record) = self.active.and_then(|slot| self.records.get_mut(slot)) {
            record.record_usage(frame, ticks, actual_units, total_units, primitives);
        }
    }
}

impl<K, V, P> SpecializationCache<K, V, P>
where
    K: Eq + Hash,
    V: Clone,
    P: Producer<K, V>,
{
    /// Return the routine for `key`, producing it on first use.
    pub fn lookup_or_create(&mut self, key: K) -> V {
        self.active = None;

        if let Some(&slot) = self.slots.get(&key) {
            self.active = Some(slot);
            return self.records[slot].routine.clone();
        }

        let routine = self.producer.produce(&key);
        let slot = self.records.len();
        self.records.push(SpecializationRecord::new(routine.clone()));
        self.slots.insert(key, slot);
        self.active = Some(slot);

        routine
    }
}

impl<K, V, P> SpecializationCache<K, V, P>
where
    K: Eq + Hash,
{
    pub fn record(&self, key: &K) -> Option<&SpecializationRecord<V>> {
        self.slots.get(key).and_then(|&slot| self.records.get(slot))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &SpecializationRecord<V>)> + Clone {
        self.slots
            .iter()
            .filter_map(|(key, &slot)| self.records.get(slot).map(|record| (key, record)))
    }
}

impl<K, V, P> SpecializationCache<K, V, P>
where
    K: SelectorKey,
{
    /// Aggregate the per-key statistics into report rows.
    pub fn report_rows(&self) -> Vec<ReportRow> {
        report::build_rows(self.iter(), self.tick_frequency)
    }

    /// Render the statistics table.
    pub fn write_report<W: Write>(&self, out: &mut W) -> io::Result<()> {
        report::write_table(out, &self.name, &self.report_rows())
    }

    /// Print the statistics table to stdout.
    pub fn report(&self) {
        let stdout = io::stdout();
        self.report_to(&mut stdout.lock());
    }

    /// Render the statistics table to `out`; write failures are logged, not returned.
    pub fn report_to<W: Write>(&self, out: &mut W) {
        if let Err(err) = self.write_report(out) {
            warn!(map = %self.name, "failed to write statistics: {err}");
        }
    }
}
