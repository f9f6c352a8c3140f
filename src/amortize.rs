//! Integer discounting of a future benefit.

/// Decay denominator: each turn of delay keeps `(MORT - 1) / MORT` of the
/// benefit.
pub const MORT: i64 = 24;

/// Fraction bits carried between steps so intermediate rounding never
/// reorders results for neighbouring delays.
const FRACTION_BITS: u32 = 16;

/// Returns `benefit * ((MORT - 1) / MORT) ^ delay`, rounded to the nearest
/// integer.
///
/// Twelve turns of decay are applied at once as the pre-reduced fraction
/// 3/5, the remainder one turn at a time as 23/24. The working value is a
/// 16-bit fixed point number in an `i64`; `|benefit| << 16` stays below
/// 2^47 so neither fraction can overflow.
pub fn amortize(benefit: i32, delay: i32) -> i32 {
    debug_assert!(delay >= 0, "negative delay {delay}");
    let mut remaining = delay.max(0);
    if remaining == 0 || benefit == 0 {
        return benefit;
    }

    let negative = benefit < 0;
    let mut value = i64::from(benefit).abs() << FRACTION_BITS;

    while remaining > 0 && value > 0 {
        if remaining >= 12 {
            value = value * 3 / 5;
            remaining -= 12;
        } else {
            value = value * (MORT - 1) / MORT;
            remaining -= 1;
        }
    }

    let rounded = (value + (1 << (FRACTION_BITS - 1))) >> FRACTION_BITS;
    let rounded = i32::try_from(rounded).unwrap_or(i32::MAX);
    if negative {
        -rounded
    } else {
        rounded
    }
}
