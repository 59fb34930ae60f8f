/// Strip everything except ASCII digits, `.` and `-` from scraped price text.
///
/// The result is not validated as a number; `"--1.2.3"` survives unchanged.
pub fn normalize_price(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-'))
        .collect()
}
