use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Interpret a vendor timestamp. Offsets are honoured, naive values are taken
/// as UTC and a bare date means midnight. Anything else is `None`.
pub fn coerce_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Split a comma separated address list, trimming and dropping blanks and
/// duplicates. Order follows first appearance.
pub fn split_contact_emails<'a>(lists: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for address in lists.into_iter().flat_map(|l| l.split(',')).map(str::trim) {
        if !address.is_empty() && !out.iter().any(|known| known == address) {
            out.push(address.to_string());
        }
    }
    out
}

/// File-name safe rendition of a customer name.
pub fn file_slug(name: &str) -> String {
    let slug: String = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if slug.is_empty() { "sin_nombre".to_string() } else { slug }
}
