use std::io::{self, Write};

use serde::Serialize;

use super::metadata::SpecializationRecord;
use crate::runtime::jit::specialization::SelectorKey;

const MICROS_PER_SECOND: u128 = 1_000_000;
const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// One line of the statistics table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub key: u64,
    pub frames: u64,
    pub primitives_per_frame: u64,
    /// Share of the aggregate per-frame time, in percent.
    pub share_percent: f32,
    pub micros_per_frame: u64,
    pub nanos_per_unit: u64,
    pub units_per_frame: u64,
    pub units_per_primitive: u64,
    pub overdraw_percent: f32,
}

/// Two-pass aggregation over the records.
///
/// The first pass sums the average ticks per frame of every record that was
/// used at least once; the second derives one row for each record that also
/// processed some units.
pub fn build_rows<'a, K, V, I>(records: I, tick_frequency: u64) -> Vec<ReportRow>
where
    K: SelectorKey + 'a,
    V: 'a,
    I: Iterator<Item = (&'a K, &'a SpecializationRecord<V>)> + Clone,
{
    let total_ticks_per_frame: u64 = records
        .clone()
        .filter(|(_, record)| record.frame_count > 0)
        .map(|(_, record)| record.tick_count / record.frame_count)
        .sum();

    if total_ticks_per_frame == 0 {
        return Vec::new();
    }

    let tick_frequency = u128::from(tick_frequency.max(1));

    records
        .filter(|(_, record)| record.is_reportable())
        .map(|(key, record)| {
            let ticks_per_unit = record.tick_count / record.actual_unit_count;
            let ticks_per_frame = record.tick_count / record.frame_count;

            ReportRow {
                key: key.bits(),
                frames: record.frame_count,
                primitives_per_frame: record.primitive_count / record.frame_count,
                share_percent: hundredths(u128::from(ticks_per_frame), total_ticks_per_frame),
                micros_per_frame: scale(ticks_per_frame, MICROS_PER_SECOND, tick_frequency),
                nanos_per_unit: scale(ticks_per_unit, NANOS_PER_SECOND, tick_frequency),
                units_per_frame: record.actual_unit_count / record.frame_count,
                units_per_primitive: record
                    .actual_unit_count
                    .checked_div(record.primitive_count)
                    .unwrap_or(0),
                overdraw_percent: hundredths(
                    u128::from(record.total_unit_count - record.actual_unit_count),
                    record.total_unit_count,
                ),
            }
        })
        .collect()
}

/// Render the header and one line per row.
pub fn write_table<W: Write>(out: &mut W, title: &str, rows: &[ReportRow]) -> io::Result<()> {
    writeln!(out, "{title} stats")?;
    writeln!(
        out,
        "      key      | frames | prims |       runtime      |          units"
    )?;
    writeln!(
        out,
        "               |        |  #/f  |   pct   µs/f ns/un |    #/f   #/prim overdraw"
    )?;

    for row in rows {
        writeln!(
            out,
            "{:014x} | {:6} | {:5} | {:5.2}% {:6} {:4} | {:8} {:6} {:5.2}%",
            row.key,
            row.frames,
            row.primitives_per_frame,
            row.share_percent,
            row.micros_per_frame,
            row.nanos_per_unit,
            row.units_per_frame,
            row.units_per_primitive,
            row.overdraw_percent,
        )?;
    }

    Ok(())
}

/// `part / whole` as a percentage truncated to two decimals.
fn hundredths(part: u128, whole: u64) -> f32 {
    let basis_points = part * 10_000 / u128::from(whole);
    basis_points as f32 / 100.0
}

fn scale(ticks: u64, unit_per_second: u128, tick_frequency: u128) -> u64 {
    u64::try_from(u128::from(ticks) * unit_per_second / tick_frequency).unwrap_or(u64::MAX)
}
