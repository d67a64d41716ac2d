use std::borrow::Cow;

const JWT_PREFIX: &str = "eyJ";
const SECRET_FIELDS: [&str; 3] = ["\"access\"", "\"refresh\"", "\"password\""];

fn is_token_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' || ch == '.'
}

/// Replaces JWT-shaped tokens (`eyJ...`) with a marker.
pub fn redact_jwt(input: &str) -> Cow<'_, str> {
    if !input.contains(JWT_PREFIX) {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(idx) = rest.find(JWT_PREFIX) {
        let boundary = rest[..idx].chars().next_back().map_or(true, |c| !is_token_char(c));
        out.push_str(&rest[..idx]);
        rest = &rest[idx..];

        let consumed: usize = rest
            .chars()
            .take_while(|c| is_token_char(*c))
            .map(char::len_utf8)
            .sum();
        if boundary {
            out.push_str("REDACTED");
        } else {
            out.push_str(&rest[..consumed]);
        }
        rest = &rest[consumed..];
    }
    out.push_str(rest);

    if out == input {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(out)
    }
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let nee = needle.as_bytes();
    if nee.is_empty() {
        return Some(0);
    }
    if nee.len() > hay.len() {
        return None;
    }

    (0..=hay.len() - nee.len()).find(|&i| {
        hay[i..i + nee.len()]
            .iter()
            .zip(nee)
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    })
}

fn redact_header_value(text: String, header: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text.as_str();
    loop {
        let Some(idx) = find_ascii_case_insensitive(rest, header) else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..idx + header.len()]);
        rest = &rest[idx + header.len()..];

        if let Some(stripped) = rest.strip_prefix(' ') {
            out.push(' ');
            rest = stripped;
        }

        let consumed = rest.find(['\n', '\r']).unwrap_or(rest.len());
        out.push_str("REDACTED");
        rest = &rest[consumed..];
    }
    out
}

// `"access": "value"` -> `"access": "REDACTED"`; only string values are touched.
fn redact_json_field(text: String, field: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text.as_str();
    while let Some(idx) = rest.find(field) {
        out.push_str(&rest[..idx + field.len()]);
        rest = &rest[idx + field.len()..];

        let after_colon = rest.trim_start().strip_prefix(':').map(str::trim_start);
        let Some(value) = after_colon.and_then(|v| v.strip_prefix('"')) else {
            continue;
        };
        let Some(end) = value.find('"') else {
            continue;
        };
        let prefix_len = rest.len() - value.len();
        out.push_str(&rest[..prefix_len]);
        out.push_str("REDACTED\"");
        rest = &value[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Scrubs credentials from text that is about to be logged or surfaced.
pub fn redact_secrets(input: &str) -> Cow<'_, str> {
    let mut value = redact_jwt(input).into_owned();

    value = redact_header_value(value, "Authorization: Bearer");
    for field in SECRET_FIELDS {
        value = redact_json_field(value, field);
    }

    if value == input {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(value)
    }
}
