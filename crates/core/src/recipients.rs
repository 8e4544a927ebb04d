//! Recipient address list normalisation.

/// Normalise a sequence of addresses into an ordered set: trim whitespace,
/// drop empties, keep the first occurrence of each address.
pub fn normalize_recipients<I, S>(addresses: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for address in addresses {
        let trimmed = address.as_ref().trim();
        if trimmed.is_empty() || out.iter().any(|a| a == trimmed) {
            continue;
        }
        out.push(trimmed.to_string());
    }
    out
}

/// Parse a comma separated list (`"a@x.gov, b@y.gov"`).
pub fn parse_recipient_list(raw: &str) -> Vec<String> {
    normalize_recipients(raw.split(','))
}
