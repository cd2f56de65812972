//! Per-zone replica arithmetic.
//!
//! A pool spread across N zones becomes N machine groups. Integer
//! quantities are divided evenly with the remainder going to the first
//! zones, so the per-zone values always add back up to the pool total.

use poolgrid_core::IntOrPercent;

/// Share of `size` that lands in zone `zone_index` out of `zone_count`.
///
/// `zone_count` of zero is treated as a single zone. Counts beyond
/// `i32::MAX` saturate, which leaves every such zone the plain quotient.
pub fn distribute_over_zones(zone_index: usize, size: i32, zone_count: usize) -> i32 {
    let zones = i32::try_from(zone_count.max(1)).unwrap_or(i32::MAX);
    let index = i32::try_from(zone_index).unwrap_or(i32::MAX);
    let mut share = size / zones;
    if index < size % zones {
        share += 1;
    }
    share
}

/// Like [`distribute_over_zones`], but percentages apply per group and
/// are left untouched.
pub fn distribute_positive_int_or_percent(
    zone_index: usize,
    value: IntOrPercent,
    zone_count: usize,
) -> IntOrPercent {
    match value {
        IntOrPercent::Int(n) => {
            IntOrPercent::Int(distribute_over_zones(zone_index, n.max(0), zone_count))
        }
        IntOrPercent::Percent(_) => value,
    }
}
