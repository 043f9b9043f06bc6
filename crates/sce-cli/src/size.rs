//! Human-readable byte sizes for the `--memory-limit` flag.

/// Unit suffixes, lowercase, with their multipliers.
///
/// Decimal units (`kB`, `MB`, ...) are powers of 1000, binary units
/// (`KiB`, `MiB`, ...) powers of 1024. A bare letter is decimal.
const UNITS: &[(&str, u64)] = &[
    ("", 1),
    ("b", 1),
    ("k", 1000),
    ("kb", 1000),
    ("ki", 1 << 10),
    ("kib", 1 << 10),
    ("m", 1000 * 1000),
    ("mb", 1000 * 1000),
    ("mi", 1 << 20),
    ("mib", 1 << 20),
    ("g", 1000 * 1000 * 1000),
    ("gb", 1000 * 1000 * 1000),
    ("gi", 1 << 30),
    ("gib", 1 << 30),
    ("t", 1000 * 1000 * 1000 * 1000),
    ("tb", 1000 * 1000 * 1000 * 1000),
    ("ti", 1 << 40),
    ("tib", 1 << 40),
    ("p", 1000 * 1000 * 1000 * 1000 * 1000),
    ("pb", 1000 * 1000 * 1000 * 1000 * 1000),
    ("pi", 1 << 50),
    ("pib", 1 << 50),
    ("e", 1000 * 1000 * 1000 * 1000 * 1000 * 1000),
    ("eb", 1000 * 1000 * 1000 * 1000 * 1000 * 1000),
    ("ei", 1 << 60),
    ("eib", 1 << 60),
];

/// Parses sizes like `128MB`, `128 MiB`, `1.5GB` or `1048576` into bytes.
///
/// Units are case-insensitive and `,` digit separators are ignored.
/// Fractional results are truncated.
///
/// # Errors
///
/// Returns a message if the number or unit is malformed, or the size
/// does not fit in 64 bits.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn parse_byte_size(input: &str) -> Result<u64, String> {
    let s = input.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let number: String = number.chars().filter(|&c| c != ',').collect();
    if number.is_empty() {
        return Err(format!("invalid size {input:?}: missing number"));
    }

    let unit = unit.trim().to_ascii_lowercase();
    let multiplier = UNITS
        .iter()
        .find(|(suffix, _)| *suffix == unit)
        .map(|&(_, m)| m)
        .ok_or_else(|| format!("invalid size {input:?}: unknown unit {unit:?}"))?;

    // Integers are exact; only fractions go through floating point.
    if let Ok(whole) = number.parse::<u64>() {
        return whole
            .checked_mul(multiplier)
            .ok_or_else(|| format!("invalid size {input:?}: too large"));
    }
    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid size {input:?}: malformed number"))?;
    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes >= u64::MAX as f64 {
        return Err(format!("invalid size {input:?}: too large"));
    }
    Ok(bytes as u64)
}

/// Formats a byte count into a human-readable string (e.g., "128.0 MiB").
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    match bytes {
        0 => "unlimited".to_string(),
        b if b >= GIB => format!("{:.1} GiB", b as f64 / GIB as f64),
        b if b >= MIB => format!("{:.1} MiB", b as f64 / MIB as f64),
        b if b >= KIB => format!("{:.1} KiB", b as f64 / KIB as f64),
        b => format!("{b} B"),
    }
}
