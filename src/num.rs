/// Parse a decimal, `0x` hex or `0b` binary literal with an optional sign.
pub fn parse_int(s: &str) -> Option<i64> {
    let t = s.trim();
    let (neg, body) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t.strip_prefix('+').unwrap_or(t)),
    };
    let (digits, radix) = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        (hex, 16)
    } else if let Some(bin) = body.strip_prefix("0b").or_else(|| body.strip_prefix("0B")) {
        (bin, 2)
    } else {
        (body, 10)
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    let v = i64::from_str_radix(digits, radix).ok()?;
    Some(if neg { -v } else { v })
}

/// Symbol-shaped token: a letter or `_`, then letters, digits, `_` or `.`.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

pub(crate) fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Rewrite every identifier token of `text` for which `lookup` has a replacement.
pub(crate) fn substitute_identifiers(text: &str, mut lookup: impl FnMut(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut token_start: Option<usize> = None;
    let flush = |out: &mut String, token: &str, lookup: &mut dyn FnMut(&str) -> Option<String>| {
        match is_identifier(token).then(|| lookup(token)).flatten() {
            Some(rep) => out.push_str(&rep),
            None => out.push_str(token),
        }
    };
    for (i, c) in text.char_indices() {
        if is_word_char(c) {
            token_start.get_or_insert(i);
            continue;
        }
        if let Some(start) = token_start.take() {
            flush(&mut out, &text[start..i], &mut lookup);
        }
        out.push(c);
    }
    if let Some(start) = token_start {
        flush(&mut out, &text[start..], &mut lookup);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals() {
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int("-7"), Some(-7));
        assert_eq!(parse_int("0x1F"), Some(31));
        assert_eq!(parse_int("0b101"), Some(5));
        assert_eq!(parse_int("-0x10"), Some(-16));
        assert_eq!(parse_int("0x-5"), None);
        assert_eq!(parse_int("R1"), None);
        assert_eq!(parse_int(""), None);
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("loop"));
        assert!(is_identifier("_tmp.1"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("-x"));
    }

    #[test]
    fn substitution_is_token_bounded() {
        let out = substitute_identifiers("R1,COUNT+COUNTER", |t| (t == "COUNT").then(|| "10".to_string()));
        assert_eq!(out, "R1,10+COUNTER");
    }
}
