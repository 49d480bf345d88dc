/// Returns "1,234,567" for 1234567.
pub fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Parse "1,234,567" (or "1234567") back into a number. Whitespace is ignored.
pub fn parse_thousands(text: &str) -> Option<u64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '_')
        .collect();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    cleaned.parse().ok()
}

/// Returns "+60.0%" / "-12.5%" / "+0.0%", rounded to one decimal.
pub fn format_signed_percent(pct: f64) -> String {
    let rounded = (pct * 10.0).round() / 10.0;
    if rounded < 0.0 {
        format!("{:.1}%", rounded)
    } else {
        format!("+{:.1}%", rounded.abs())
    }
}

/// Compact token count for terminal output: "1.2M", "45.3K", "812".
pub fn format_tokens(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        format!("{}", count)
    }
}

/// Returns "$1.2345".
pub fn format_cost(dollars: f64) -> String {
    format!("${:.4}", dollars)
}
