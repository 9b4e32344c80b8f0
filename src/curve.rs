/// Lowest and highest attainable level.
pub const MIN_LEVEL: u32 = 1;
pub const MAX_LEVEL: u32 = 100;

/// Total XP required to hold `level`: floor(100 * 1.5^(level-1)).
///
/// Near the top of the curve the exact value no longer fits in a u64;
/// the float conversion saturates, which keeps the curve strictly
/// increasing through level 100 and keeps both directions of the
/// level/xp mapping in agreement.
pub fn xp_for_level(level: u32) -> u64 {
    let level = level.clamp(MIN_LEVEL, MAX_LEVEL);
    (100.0 * 1.5f64.powi(level as i32 - 1)).floor() as u64
}

/// Level held at `xp` total experience: the largest level whose
/// threshold is at or below `xp`, floored at level 1 (a fresh user at
/// xp 0 is level 1, below even the level-1 threshold) and clamped at
/// level 100 (xp keeps accumulating past the last threshold).
pub fn level_from_xp(xp: u64) -> u32 {
    let mut level = MIN_LEVEL;
    while level < MAX_LEVEL && xp_for_level(level + 1) <= xp {
        level += 1;
    }
    level
}
