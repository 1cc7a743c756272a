use anyhow::Result;
use specmap::{Selector, SpecializationCache};

fn render<K, V, P>(cache: &SpecializationCache<K, V, P>) -> Result<String>
where
    K: specmap::SelectorKey,
{
    let mut out = Vec::new();
    cache.write_report(&mut out)?;
    Ok(String::from_utf8(out)?)
}

#[test]
fn empty_cache_prints_header_only() -> Result<()> {
    let cache: SpecializationCache<u64, u64, _> =
        SpecializationCache::with_name("scanline", |key: &u64| *key);
    let text = render(&cache)?;

    assert_eq!(text.lines().count(), 3);
    assert!(text.starts_with("scanline stats\n"));
    assert!(cache.report_rows().is_empty());
    Ok(())
}

#[test]
fn unused_and_idle_records_are_skipped() -> Result<()> {
    let mut cache = SpecializationCache::new(|key: &Selector| key.field(0, 8));

    // Looked up but never reported.
    cache.lookup_or_create(Selector::new(0x01));

    // Reported frames without any units.
    cache.lookup_or_create(Selector::new(0x02));
    cache.record_usage(1, 400, 0, 0, 3);

    // Fully measured.
    cache.lookup_or_create(Selector::new(0x03));
    cache.record_usage(1, 600, 30, 40, 3);
    cache.record_usage(2, 600, 30, 40, 3);

    let rows = cache.report_rows();
    assert_eq!(rows.len(), 1);

    let row = &rows[0];
    assert_eq!(row.key, 0x03);
    assert_eq!(row.frames, 2);
    assert_eq!(row.primitives_per_frame, 3);
    assert!((row.share_percent - 60.0).abs() < f32::EPSILON);
    assert_eq!(row.units_per_frame, 30);
    assert_eq!(row.units_per_primitive, 10);
    assert!((row.overdraw_percent - 25.0).abs() < f32::EPSILON);

    let text = render(&cache)?;
    assert_eq!(text.lines().count(), 4);
    assert!(text.contains("00000000000003 |      2 |     3 |"));
    assert!(!text.contains("00000000000001 |"));
    assert!(!text.contains("00000000000002 |"));
    Ok(())
}

#[test]
fn tick_frequency_drives_time_columns() {
    let mut cache = SpecializationCache::new(|key: &u32| *key).with_tick_frequency(1_000_000);
    cache.lookup_or_create(7);
    cache.record_usage(0, 2_000, 100, 100, 10);

    let rows = cache.report_rows();
    assert_eq!(rows[0].micros_per_frame, 2_000);
    assert_eq!(rows[0].nanos_per_unit, 20_000);
    assert_eq!(rows[0].overdraw_percent, 0.0);
}

#[test]
fn rows_serialize_to_json() -> Result<()> {
    let mut cache = SpecializationCache::new(|key: &u64| *key);
    cache.lookup_or_create(0xabc);
    cache.record_usage(5, 1_000, 10, 20, 2);

    let json = serde_json::to_value(cache.report_rows())?;
    assert_eq!(json[0]["key"], 0xabc);
    assert_eq!(json[0]["frames"], 1);
    assert_eq!(json[0]["units_per_primitive"], 5);
    Ok(())
}
