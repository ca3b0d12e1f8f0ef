//! `#define` body locator.
//!
//! The macro-body rewrite path needs the byte range of an object-like
//! macro's replacement text in the main buffer. This walker scans the text
//! line by line: function-like definitions are skipped and trailing
//! comments are excluded from the body range.

/// Finds the replacement-text range of `#define <name> <body>`.
///
/// Returns the byte range of the body and its text. Function-like
/// definitions (`#define NAME(args) ...`) and empty bodies yield nothing;
/// the first object-like definition wins.
pub fn find_object_macro_body(text: &str, name: &str) -> Option<(std::ops::Range<usize>, String)> {
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let found = scan_line(line, name);
        if let Some((rel_start, body)) = found {
            return Some((offset + rel_start..offset + rel_start + body.len(), body));
        }
        offset += line.len();
    }
    None
}

/// Checks one line; returns the body's offset within the line and its text.
fn scan_line(line: &str, name: &str) -> Option<(usize, String)> {
    let trimmed = line.trim_start();
    let rest = trimmed.strip_prefix('#')?;
    let after_hash = rest.trim_start();
    let after_define = after_hash.strip_prefix("define")?;
    if !after_define.starts_with(char::is_whitespace) {
        return None;
    }

    let name_part = after_define.trim_start();
    let candidate = name_part.strip_prefix(name)?;
    // The match must end at an identifier boundary and must not open a
    // parameter list.
    match candidate.chars().next() {
        None => return None, // no body at all
        Some('(') => return None,
        Some(c) if c.is_ascii_alphanumeric() || c == '_' => return None,
        Some(_) => {}
    }

    let body_area = strip_trailing_comment(candidate);
    let body = body_area.trim();
    if body.is_empty() {
        return None;
    }

    let lead = body_area.len() - body_area.trim_start().len();
    let rel = (line.len() - trimmed.len())
        + 1
        + (rest.len() - after_hash.len())
        + "define".len()
        + (after_define.len() - name_part.len())
        + name.len()
        + lead;
    Some((rel, body.to_string()))
}

fn strip_trailing_comment(body: &str) -> &str {
    let cut = match (body.find("//"), body.find("/*")) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    };
    match cut {
        Some(i) => &body[..i],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finds_simple_body() {
        let text = "int x;\n#define WIDTH int\nWIDTH n;\n";
        let (range, body) = find_object_macro_body(text, "WIDTH").unwrap();
        assert_eq!(body, "int");
        assert_eq!(&text[range], "int");
    }

    #[test]
    fn test_skips_function_like_macro() {
        let text = "#define SQR(x) ((x)*(x))\n";
        assert!(find_object_macro_body(text, "SQR").is_none());
    }

    #[test]
    fn test_skips_prefix_name_collision() {
        let text = "#define WIDTH2 long\n#define WIDTH int\n";
        let (_, body) = find_object_macro_body(text, "WIDTH").unwrap();
        assert_eq!(body, "int");
    }

    #[test]
    fn test_strips_trailing_line_comment() {
        let text = "#define WIDTH int // narrow on purpose\n";
        let (range, body) = find_object_macro_body(text, "WIDTH").unwrap();
        assert_eq!(body, "int");
        assert_eq!(&text[range], "int");
    }

    #[test]
    fn test_strips_trailing_block_comment() {
        let text = "#define WIDTH int /* todo */\n";
        let (_, body) = find_object_macro_body(text, "WIDTH").unwrap();
        assert_eq!(body, "int");
    }

    #[test]
    fn test_empty_body_yields_nothing() {
        let text = "#define GUARD\nint n;\n";
        assert!(find_object_macro_body(text, "GUARD").is_none());
    }

    #[test]
    fn test_indented_directive() {
        let text = "  #  define WIDTH unsigned long\n";
        let (range, body) = find_object_macro_body(text, "WIDTH").unwrap();
        assert_eq!(body, "unsigned long");
        assert_eq!(&text[range], "unsigned long");
    }

    #[test]
    fn test_missing_macro() {
        assert!(find_object_macro_body("int n;\n", "WIDTH").is_none());
    }

    #[test]
    fn test_multi_token_body_range() {
        let text = "#define LEN_T unsigned long long\nLEN_T n;\n";
        let (range, body) = find_object_macro_body(text, "LEN_T").unwrap();
        assert_eq!(body, "unsigned long long");
        assert_eq!(&text[range], "unsigned long long");
    }
}
