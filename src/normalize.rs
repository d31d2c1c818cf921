//! Salary, location and text normalization.
//!
//! Everything here is lossy-tolerant: bad input degrades to a best-effort
//! string or `None`, never an error.

use regex::Regex;
use scraper::Html;
use serde_json::Value;
use std::sync::LazyLock;

use crate::models::{non_empty, SalaryInput};

const DEFAULT_CURRENCY: &str = "EUR";

static SALARY_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d.,\s]*\d").expect("valid salary token pattern"));
static EURO_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\x{20ac}|eur").expect("valid currency pattern"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Elements whose text never counts as description text.
const NON_TEXT_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "iframe"];

/// Parse one salary figure written in either European or US notation.
///
/// A `.` followed by exactly three digits is a thousands separator; the first
/// `,` is the decimal separator. Parsing stops at the first character that
/// cannot continue the number.
pub fn parse_salary_number(raw: &str) -> Option<f64> {
    let kept: Vec<char> = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();

    let mut cleaned = String::with_capacity(kept.len());
    for (i, c) in kept.iter().enumerate() {
        if *c == '.' && is_thousands_dot(&kept[i + 1..]) {
            continue;
        }
        cleaned.push(*c);
    }

    leading_float(&cleaned.replacen(',', ".", 1))
}

fn is_thousands_dot(rest: &[char]) -> bool {
    rest.len() >= 3
        && rest[..3].iter().all(|c| c.is_ascii_digit())
        && rest.get(3).is_none_or(|c| !c.is_ascii_digit())
}

fn leading_float(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut end = usize::from(bytes.first() == Some(&b'-'));
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let mut frac_end = end + 1;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if frac_end > end + 1 {
            digits += frac_end - end - 1;
            end = frac_end;
        }
    }

    if digits == 0 {
        return None;
    }
    s[..end].parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Render a salary figure or range, e.g. `45,000 - 60,000 EUR`.
pub fn format_salary_range(min: Option<f64>, max: Option<f64>, currency: Option<&str>) -> Option<String> {
    let currency = currency.filter(|c| !c.trim().is_empty()).unwrap_or(DEFAULT_CURRENCY);
    let min = min.filter(|n| n.is_finite());
    let max = max.filter(|n| n.is_finite());

    match (min, max) {
        (Some(lo), Some(hi)) if lo != hi => Some(format!(
            "{} - {} {}",
            group_thousands(lo),
            group_thousands(hi),
            currency
        )),
        (Some(lo), _) => Some(format!("{} {}", group_thousands(lo), currency)),
        _ => None,
    }
}

fn group_thousands(n: f64) -> String {
    let rounded = (n + 0.5).floor() as i64;
    let digits = rounded.unsigned_abs().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0 {
        grouped.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

pub fn normalize_salary(input: &SalaryInput) -> Option<String> {
    match input {
        SalaryInput::Numeric(n) => format_salary_range(Some(*n), None, Some(DEFAULT_CURRENCY)),
        SalaryInput::Structured { min, max, currency } => {
            format_salary_range(*min, *max, currency.as_deref())
        }
        SalaryInput::FreeText(text) => normalize_salary_text(text),
    }
}

fn normalize_salary_text(raw: &str) -> Option<String> {
    let clean = WHITESPACE.replace_all(raw, " ").trim().to_string();
    if clean.is_empty() {
        return None;
    }

    let currency = EURO_MARKER.is_match(&clean).then_some(DEFAULT_CURRENCY);
    let numbers: Vec<f64> = SALARY_TOKEN
        .find_iter(&clean)
        .filter_map(|m| parse_salary_number(m.as_str()))
        .collect();

    match numbers.as_slice() {
        [] => Some(match currency {
            Some(cur) => format!("{} ({})", clean, cur),
            None => clean,
        }),
        [single] => format_salary_range(Some(*single), None, currency).or(Some(clean)),
        many => {
            let min = many.iter().copied().fold(f64::INFINITY, f64::min);
            let max = many.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            format_salary_range(Some(min), Some(max), currency)
        }
    }
}

/// Classify a JSON salary value (API field or schema.org `baseSalary`).
pub fn salary_input_from_json(value: &Value) -> Option<SalaryInput> {
    match value {
        Value::Number(n) => n.as_f64().map(SalaryInput::Numeric),
        Value::String(s) => non_empty(s).map(SalaryInput::FreeText),
        Value::Object(obj) => {
            let nested = obj.get("value").filter(|v| v.is_object());
            let currency = ["currency", "currencyCode"]
                .iter()
                .find_map(|key| obj.get(*key).and_then(Value::as_str))
                .or_else(|| nested.and_then(|v| v.get("currency")).and_then(Value::as_str))
                .and_then(non_empty);

            let amounts = nested.unwrap_or(value);
            let min = amounts
                .get("minValue")
                .filter(|v| !v.is_null())
                .or_else(|| amounts.get("value"))
                .and_then(json_number);
            let max = amounts.get("maxValue").and_then(json_number);

            Some(SalaryInput::Structured { min, max, currency })
        }
        _ => None,
    }
}

fn json_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_salary_number(s),
        _ => None,
    }
}

pub fn normalize_salary_json(value: &Value) -> Option<String> {
    salary_input_from_json(value).and_then(|input| normalize_salary(&input))
}

/// Compose `locality, region, country` from a schema.org `jobLocation`.
pub fn extract_location(job_location: &Value) -> Option<String> {
    let location = match job_location {
        Value::Array(items) => items.first()?,
        other => other,
    };

    let address = match location.get("address") {
        Some(Value::String(s)) => return non_empty(s),
        Some(addr @ Value::Object(_)) => addr,
        _ if location.get("addressLocality").is_some() => location,
        _ => return None,
    };

    let parts: Vec<String> = ["addressLocality", "addressRegion", "addressCountry"]
        .iter()
        .filter_map(|key| match address.get(*key)? {
            Value::String(s) => non_empty(s),
            Value::Object(obj) => obj.get("name").and_then(Value::as_str).and_then(non_empty),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

/// Plain text of an HTML description: non-text elements dropped, whitespace collapsed.
pub fn clean_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut text = String::new();

    for node in fragment.root_element().descendants() {
        let Some(chunk) = node.value().as_text() else { continue };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| NON_TEXT_ELEMENTS.contains(&el.name()))
        });
        if !hidden {
            text.push_str(chunk);
        }
    }

    WHITESPACE.replace_all(&text, " ").trim().to_string()
}
