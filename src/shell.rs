//! Shell quoting for strings embedded into constructed command lines.
//!
//! Every user-supplied string that ends up in a gphoto2 invocation (paths,
//! filenames, config keys and values) goes through [`quote`] so that quotes,
//! newlines and other control characters cannot break out of the argument.
//! This is write-only: nothing in the crate ever needs to un-quote.

/// Escape a string and wrap it in double quotes.
///
/// Backslash, double-quote and the C0 control characters gphoto2's own
/// escaping convention covers (`\n \r \t \f \v \0`) are escaped.
pub(crate) fn quote(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len() + 2);
    escaped.push('"');
    for ch in raw.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            '\x0c' => escaped.push_str("\\f"),
            '\x0b' => escaped.push_str("\\v"),
            '\0' => escaped.push_str("\\0"),
            _ => escaped.push(ch),
        }
    }
    escaped.push('"');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Naive inverse of the escaping convention, used only to verify the
    /// round-trip property.
    fn unquote(quoted: &str) -> String {
        let inner = quoted.strip_prefix('"').unwrap().strip_suffix('"').unwrap();
        let mut out = String::new();
        let mut chars = inner.chars();
        while let Some(ch) = chars.next() {
            if ch != '\\' {
                out.push(ch);
                continue;
            }
            match chars.next() {
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some('f') => out.push('\x0c'),
                Some('v') => out.push('\x0b'),
                Some('0') => out.push('\0'),
                other => panic!("unexpected escape: {other:?}"),
            }
        }
        out
    }

    #[test]
    fn quotes_plain_path() {
        assert_eq!(quote("/tmp/photos"), "\"/tmp/photos\"");
    }

    #[test]
    fn escapes_embedded_quotes_and_newlines() {
        assert_eq!(quote("a\"b\nc"), "\"a\\\"b\\nc\"");
    }

    #[test]
    fn escapes_null_and_backslash() {
        assert_eq!(quote("a\\b\0"), "\"a\\\\b\\0\"");
    }

    proptest! {
        #[test]
        fn round_trips_through_naive_unescape(s in "[ -~\t\n\r\x0b\x0c\x00\"\\\\]*") {
            let quoted = quote(&s);
            prop_assert!(quoted.starts_with('"') && quoted.ends_with('"'));
            prop_assert_eq!(unquote(&quoted), s);
        }

        #[test]
        fn output_contains_no_raw_control_chars(s in ".*") {
            let quoted = quote(&s);
            let inner = &quoted[1..quoted.len() - 1];
            prop_assert!(!inner.contains('\n'));
            prop_assert!(!inner.contains('\r'));
            prop_assert!(!inner.contains('\0'));
        }
    }
}
