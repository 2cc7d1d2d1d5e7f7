//! Address text helpers used before and after lookups.

use crate::feature::LocationData;

fn is_han(c: char) -> bool {
    ('\u{4e00}'..='\u{9faf}').contains(&c)
}

fn is_hiragana(c: char) -> bool {
    ('\u{3040}'..='\u{309f}').contains(&c)
}

fn is_katakana(c: char) -> bool {
    ('\u{30a0}'..='\u{30ff}').contains(&c)
}

/// Whether `c` is Japanese script (kanji, hiragana or katakana).
pub(crate) fn is_japanese(c: char) -> bool {
    is_han(c) || is_hiragana(c) || is_katakana(c)
}

/// At least two characters, one of which is Japanese script, a digit or a
/// Latin letter.
pub fn validate_address(address: &str) -> bool {
    let trimmed = address.trim();
    if trimmed.chars().count() < 2 {
        return false;
    }
    trimmed
        .chars()
        .any(|c| is_japanese(c) || c.is_ascii_digit() || c.is_ascii_alphabetic())
}

/// Fold an address into one canonical form.
///
/// Whitespace (full-width included) is trimmed and collapsed to single
/// spaces; full-width digits and Latin letters become ASCII; the hyphen and
/// dash variants used in block numbers become `-`.
pub fn normalize_address(address: &str) -> String {
    address
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .map(|c| match c {
            '０'..='９' | 'Ａ'..='Ｚ' | 'ａ'..='ｚ' => {
                char::from_u32(c as u32 - 0xFEE0).unwrap_or(c)
            }
            '－' | '\u{2212}' | '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}'
            | '\u{2014}' => '-',
            other => other,
        })
        .collect()
}

/// Up to five distinct completions for a partially typed address.
pub fn address_suggestions(partial: &str, location: Option<&LocationData>) -> Vec<String> {
    let mut suggestions: Vec<String> = Vec::new();

    if let Some(location) = location {
        if let Some(formatted) = &location.formatted_address {
            suggestions.push(formatted.clone());
        }
        let base = location
            .address
            .split('、')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(&location.address);
        suggestions.push(format!("{base}付近"));
        suggestions.push(format!("{base}周辺"));
    }

    if partial.chars().count() > 2 {
        let normalized = normalize_address(partial);
        if normalized != partial {
            suggestions.push(normalized);
        }
    }

    let mut seen = std::collections::HashSet::new();
    suggestions.retain(|s| seen.insert(s.clone()));
    suggestions.truncate(5);
    suggestions
}
