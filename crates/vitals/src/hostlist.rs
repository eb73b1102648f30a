//! Hostlist expression expansion.
//!
//! Expands compressed host expressions like `node[01-04]` or
//! `rack[1-2]n[1,3]` into individual host names. Malformed expressions fall
//! back to the literal token so a typo degrades to "host not found" instead
//! of aborting the run.

use tracing::debug;

/// Expand a comma-separated hostlist expression.
///
/// Commas inside brackets belong to the range list, commas outside separate
/// expressions.
#[must_use]
pub fn expand(expr: &str) -> Vec<String> {
    let mut hosts = Vec::new();
    for token in split_top_level(expr) {
        hosts.extend(expand_token(&token));
    }
    hosts
}

/// Split on commas that are not inside brackets.
fn split_top_level(expr: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in expr.chars() {
        match ch {
            '[' => {
                depth += 1;
                current.push(ch);
            }
            ']' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn expand_token(token: &str) -> Vec<String> {
    let Some(open) = token.find('[') else {
        return vec![token.to_string()];
    };
    let Some(close) = token[open..].find(']').map(|i| open + i) else {
        debug!(token, "unterminated bracket, keeping literal");
        return vec![token.to_string()];
    };

    let prefix = &token[..open];
    let ranges = &token[open + 1..close];
    let suffix = &token[close + 1..];

    let Some(numbers) = expand_ranges(ranges) else {
        debug!(token, "malformed range, keeping literal");
        return vec![token.to_string()];
    };

    let mut hosts = Vec::new();
    for number in numbers {
        // suffix may contain further brackets, expand recursively
        for rest in expand_token(suffix) {
            hosts.push(format!("{prefix}{number}{rest}"));
        }
    }
    hosts
}

/// Expand `01-03,07` into zero-padded number strings. `None` on bad syntax.
fn expand_ranges(ranges: &str) -> Option<Vec<String>> {
    let mut numbers = Vec::new();
    for part in ranges.split(',') {
        if let Some((lo, hi)) = part.split_once('-') {
            let width = lo.len();
            let lo_n: u64 = lo.parse().ok()?;
            let hi_n: u64 = hi.parse().ok()?;
            if hi_n < lo_n {
                return None;
            }
            for n in lo_n..=hi_n {
                numbers.push(format!("{n:0width$}"));
            }
        } else {
            let width = part.len();
            let n: u64 = part.parse().ok()?;
            numbers.push(format!("{n:0width$}"));
        }
    }
    if numbers.is_empty() {
        return None;
    }
    Some(numbers)
}
