//! NCM code grammar and classification groupings.
//!
//! NCM codes have up to eight digits: chapter (2), heading (4), subheading
//! (6), item (7) and subitem (8). They are written `NNNN.NN.NN` but invoices
//! and datasets frequently drop the dots, so every entry point accepts both
//! forms and stores the dotted one.
//!
//! ```rust
//! use ncm_search::ncm::{canonical_code, chapter_of, section_of};
//!
//! assert_eq!(canonical_code("84713012").as_deref(), Some("8471.30.12"));
//! assert_eq!(chapter_of("8471.30.12").as_deref(), Some("84"));
//! assert_eq!(section_of("84"), Some("XVI"));
//! ```

/// Maximum number of digits in a full NCM code.
pub const MAX_CODE_DIGITS: usize = 8;

/// Extract the digits of a code-like string.
///
/// Accepts digits separated by dots (and surrounding whitespace). Returns
/// `None` for anything else, for fewer than two digits, or for more than
/// [`MAX_CODE_DIGITS`].
pub fn code_digits(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.starts_with('.')
        || trimmed.ends_with('.')
        || trimmed.contains("..")
    {
        return None;
    }
    if !trimmed.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 2 || digits.len() > MAX_CODE_DIGITS {
        return None;
    }
    Some(digits)
}

/// True when the text is a (possibly partial) NCM code rather than prose.
pub fn looks_like_code(text: &str) -> bool {
    code_digits(text).is_some()
}

/// Insert dots after the heading and subheading digits.
///
/// A formatted prefix of a code is always a prefix of the formatted code,
/// which lets prefix matching run on either representation.
pub fn format_digits(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + 2);
    for (i, c) in digits.chars().enumerate() {
        if i == 4 || i == 6 {
            out.push('.');
        }
        out.push(c);
    }
    out
}

/// Canonical dotted form of a complete or partial code.
///
/// Valid lengths are 2, 4, 5, 6, 7 and 8 digits. A three-digit code names
/// nothing in the nomenclature and is rejected.
pub fn canonical_code(raw: &str) -> Option<String> {
    let digits = code_digits(raw)?;
    if digits.len() == 3 {
        return None;
    }
    Some(format_digits(&digits))
}

/// Two-digit chapter of a code.
pub fn chapter_of(code: &str) -> Option<String> {
    let digits = code_digits(code)?;
    Some(digits[..2].to_string())
}

/// Harmonized System section (Roman numeral) containing a chapter.
pub fn section_of(chapter: &str) -> Option<&'static str> {
    let n: u8 = chapter.parse().ok()?;
    let section = match n {
        1..=5 => "I",
        6..=14 => "II",
        15 => "III",
        16..=24 => "IV",
        25..=27 => "V",
        28..=38 => "VI",
        39..=40 => "VII",
        41..=43 => "VIII",
        44..=46 => "IX",
        47..=49 => "X",
        50..=63 => "XI",
        64..=67 => "XII",
        68..=70 => "XIII",
        71 => "XIV",
        72..=83 => "XV",
        84..=85 => "XVI",
        86..=89 => "XVII",
        90..=92 => "XVIII",
        93 => "XIX",
        94..=96 => "XX",
        97 => "XXI",
        _ => return None,
    };
    Some(section)
}
