/// Ratio-based difficulty retargeting, clamped to avoid runaway oscillation.
///
/// `expected_ms` is `RETARGET_INTERVAL × TARGET_BLOCK_TIME_MS`; `actual_ms`
/// is the observed epoch duration. Called strictly on retarget boundaries,
/// never mid-epoch.
pub fn retarget(previous: f64, actual_ms: i64, expected_ms: i64, floor: f64) -> f64 {
    let actual = (actual_ms.max(1_000)) as f64;
    let ratio = (expected_ms as f64 / actual).clamp(0.25, 4.0);
    (previous * ratio).floor().max(floor)
}
