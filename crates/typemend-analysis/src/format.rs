//! printf/scanf format-string scanning.
//!
//! The collector records where integer conversion specifiers sit inside
//! format literals; when the solver later changes an argument's declared
//! type the rewriter replaces just those specifier bytes.

use typemend_ast::{CType, Span};

/// One `%...X` conversion inside a format literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSpec {
    /// Byte offset of the `%` within the literal content.
    pub offset: usize,
    /// Length in bytes including the conversion character.
    pub len: usize,
    /// The conversion consumes a variadic argument.
    pub consumes_arg: bool,
    /// The conversion formats an integer (`d i u o x X`).
    pub is_integer: bool,
}

/// A recorded specifier location for one argument declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatUsage {
    /// Span of the specifier bytes in the source file.
    pub spec_span: Span,
}

/// Scans a format literal's content (text between the quotes, escapes left
/// as written) and returns every conversion in order.
pub fn parse_format_string(content: &str) -> Vec<FormatSpec> {
    let bytes = content.as_bytes();
    let mut specs = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }
        let start = i;
        i += 1;
        if i < bytes.len() && bytes[i] == b'%' {
            i += 1;
            continue;
        }

        // Flags.
        while i < bytes.len() && matches!(bytes[i], b'-' | b'+' | b' ' | b'#' | b'0') {
            i += 1;
        }
        // Width.
        while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'*') {
            i += 1;
        }
        // Precision.
        if i < bytes.len() && bytes[i] == b'.' {
            i += 1;
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'*') {
                i += 1;
            }
        }
        // Length modifier.
        while i < bytes.len() && matches!(bytes[i], b'h' | b'l' | b'z' | b't' | b'j') {
            i += 1;
        }

        let Some(&conv) = bytes.get(i) else { break };
        i += 1;
        let is_integer = matches!(conv, b'd' | b'i' | b'u' | b'o' | b'x' | b'X');
        specs.push(FormatSpec {
            offset: start,
            len: i - start,
            consumes_arg: true,
            is_integer,
        });
    }

    specs
}

/// The conversion specifier for a resolved integer type, without the `%`.
pub fn specifier_for(ty: &CType) -> Option<&'static str> {
    if let CType::Named { name, target } = ty {
        return match name.as_str() {
            "size_t" | "std::size_t" => Some("zu"),
            "ptrdiff_t" | "std::ptrdiff_t" => Some("td"),
            _ => specifier_for(target),
        };
    }
    match ty {
        CType::Bool => Some("d"),
        CType::Int(i) => {
            use typemend_ast::IntWidth::*;
            Some(match (i.width, i.signed) {
                (Char | Short | Int, true) => "d",
                (Char | Short | Int, false) => "u",
                (Long, true) => "ld",
                (Long, false) => "lu",
                (LongLong, true) => "lld",
                (LongLong, false) => "llu",
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_integer_specifier() {
        let specs = parse_format_string("%d");
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].offset, 0);
        assert_eq!(specs[0].len, 2);
        assert!(specs[0].is_integer);
    }

    #[test]
    fn test_parse_mixed_specifiers() {
        let specs = parse_format_string("name=%s count=%zu hex=%08lx");
        assert_eq!(specs.len(), 3);
        assert!(!specs[0].is_integer); // %s
        assert!(specs[1].is_integer); // %zu
        assert_eq!(specs[1].len, 3);
        assert!(specs[2].is_integer); // %08lx
        assert_eq!(specs[2].len, 5);
    }

    #[test]
    fn test_percent_escape_consumes_nothing() {
        let specs = parse_format_string("100%% done: %d");
        assert_eq!(specs.len(), 1);
        assert!(specs[0].is_integer);
    }

    #[test]
    fn test_offsets_point_at_percent() {
        let content = "x=%d y=%ld";
        let specs = parse_format_string(content);
        assert_eq!(&content[specs[0].offset..specs[0].offset + specs[0].len], "%d");
        assert_eq!(&content[specs[1].offset..specs[1].offset + specs[1].len], "%ld");
    }

    #[test]
    fn test_specifier_mapping() {
        assert_eq!(specifier_for(&CType::int_()), Some("d"));
        assert_eq!(specifier_for(&CType::uint()), Some("u"));
        assert_eq!(specifier_for(&CType::long_()), Some("ld"));
        assert_eq!(specifier_for(&CType::ulong()), Some("lu"));
        assert_eq!(specifier_for(&CType::longlong()), Some("lld"));
        assert_eq!(specifier_for(&CType::ulonglong()), Some("llu"));
        assert_eq!(
            specifier_for(&CType::named("size_t", CType::ulong())),
            Some("zu")
        );
        assert_eq!(
            specifier_for(&CType::named("ptrdiff_t", CType::long_())),
            Some("td")
        );
        assert_eq!(specifier_for(&CType::ptr(CType::char_())), None);
    }

    #[test]
    fn test_unknown_typedef_falls_through_to_target() {
        let t = CType::named("my_len_t", CType::ulong());
        assert_eq!(specifier_for(&t), Some("lu"));
    }
}
