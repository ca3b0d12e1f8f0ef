//! C type representation.
//!
//! This module defines the type model the solver and rewriter operate on.
//! Typedef references keep both their written spelling and their resolved
//! target, so `size_t` compares by width like `unsigned long` but is still
//! emitted as `size_t`.

use serde::{Deserialize, Serialize};

/// Standard integer width classes. Actual bit widths come from the
/// [`TypeOracle`](crate::TypeOracle) so 32-bit targets can be modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntWidth {
    /// `char` / `unsigned char`
    Char,
    /// `short` / `unsigned short`
    Short,
    /// `int` / `unsigned int`
    Int,
    /// `long` / `unsigned long`
    Long,
    /// `long long` / `unsigned long long`
    LongLong,
}

/// Integer type details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntType {
    /// Width class.
    pub width: IntWidth,
    /// Whether the type is signed.
    pub signed: bool,
}

impl IntType {
    pub fn new(width: IntWidth, signed: bool) -> Self {
        Self { width, signed }
    }
}

/// A C type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CType {
    /// void type
    Void,

    /// `bool` / `_Bool`
    Bool,

    /// Integer type (char, short, int, long, long long)
    Int(IntType),

    /// Floating-point type with size in bytes
    Float { size: u8 },

    /// Pointer to another type
    Pointer(Box<CType>),

    /// Typedef reference: written spelling plus resolved target
    Named { name: String, target: Box<CType> },

    /// Class template specialization, e.g. `std::vector<int>`
    Template { name: String, args: Vec<CType> },

    /// struct/class/union tag reference
    Record { name: String },

    /// `auto` awaiting deduction (C++)
    Auto,

    /// Unresolvable type
    Unknown,
}

impl CType {
    /// Check if this is an integer type (through typedefs).
    pub fn is_integer(&self) -> bool {
        match self {
            CType::Int(_) | CType::Bool => true,
            CType::Named { target, .. } => target.is_integer(),
            _ => false,
        }
    }

    /// Check if this is a pointer type (through typedefs).
    pub fn is_pointer(&self) -> bool {
        match self {
            CType::Pointer(_) => true,
            CType::Named { target, .. } => target.is_pointer(),
            _ => false,
        }
    }

    /// Check if this is a scalar type: integer, float, bool, or pointer.
    pub fn is_scalar(&self) -> bool {
        match self {
            CType::Int(_) | CType::Float { .. } | CType::Bool | CType::Pointer(_) => true,
            CType::Named { target, .. } => target.is_scalar(),
            _ => false,
        }
    }

    /// Check if this type is incomplete: `auto` without deduction, an
    /// unresolved reference, or void.
    pub fn is_incomplete(&self) -> bool {
        match self {
            CType::Unknown | CType::Auto | CType::Void => true,
            CType::Named { target, .. } => target.is_incomplete(),
            _ => false,
        }
    }

    /// Signedness through typedefs. Non-integers report false for both.
    pub fn is_unsigned_integer(&self) -> bool {
        match self {
            CType::Int(i) => !i.signed,
            CType::Bool => true,
            CType::Named { target, .. } => target.is_unsigned_integer(),
            _ => false,
        }
    }

    /// True for a signed integer type (through typedefs).
    pub fn is_signed_integer(&self) -> bool {
        match self {
            CType::Int(i) => i.signed,
            CType::Named { target, .. } => target.is_signed_integer(),
            _ => false,
        }
    }

    /// Resolves typedef chains to the underlying type.
    pub fn canonical(&self) -> &CType {
        match self {
            CType::Named { target, .. } => target.canonical(),
            other => other,
        }
    }

    /// The type a dereference yields.
    pub fn pointee(&self) -> Option<&CType> {
        match self.canonical() {
            CType::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    /// Format this type the way it is written in source.
    pub fn spelling(&self) -> String {
        match self {
            CType::Void => "void".to_string(),
            CType::Bool => "bool".to_string(),
            CType::Int(i) => {
                let base = match i.width {
                    IntWidth::Char => "char",
                    IntWidth::Short => "short",
                    IntWidth::Int => "int",
                    IntWidth::Long => "long",
                    IntWidth::LongLong => "long long",
                };
                if i.signed {
                    base.to_string()
                } else if i.width == IntWidth::Int {
                    "unsigned int".to_string()
                } else {
                    format!("unsigned {}", base)
                }
            }
            CType::Float { size } => match size {
                4 => "float".to_string(),
                16 => "long double".to_string(),
                _ => "double".to_string(),
            },
            CType::Pointer(inner) => format!("{}*", inner.spelling()),
            CType::Named { name, .. } => name.clone(),
            CType::Template { name, args } => {
                let args: Vec<_> = args.iter().map(|a| a.spelling()).collect();
                format!("{}<{}>", name, args.join(", "))
            }
            CType::Record { name } => name.clone(),
            CType::Auto => "auto".to_string(),
            CType::Unknown => "int".to_string(),
        }
    }
}

// Common type constructors for convenience
impl CType {
    pub fn char_() -> Self { CType::Int(IntType::new(IntWidth::Char, true)) }
    pub fn uchar() -> Self { CType::Int(IntType::new(IntWidth::Char, false)) }
    pub fn short_() -> Self { CType::Int(IntType::new(IntWidth::Short, true)) }
    pub fn ushort() -> Self { CType::Int(IntType::new(IntWidth::Short, false)) }
    pub fn int_() -> Self { CType::Int(IntType::new(IntWidth::Int, true)) }
    pub fn uint() -> Self { CType::Int(IntType::new(IntWidth::Int, false)) }
    pub fn long_() -> Self { CType::Int(IntType::new(IntWidth::Long, true)) }
    pub fn ulong() -> Self { CType::Int(IntType::new(IntWidth::Long, false)) }
    pub fn longlong() -> Self { CType::Int(IntType::new(IntWidth::LongLong, true)) }
    pub fn ulonglong() -> Self { CType::Int(IntType::new(IntWidth::LongLong, false)) }
    pub fn double_() -> Self { CType::Float { size: 8 } }

    pub fn ptr(inner: CType) -> Self {
        CType::Pointer(Box::new(inner))
    }

    /// A typedef reference with a known target, e.g. `size_t` over
    /// `unsigned long`.
    pub fn named(name: impl Into<String>, target: CType) -> Self {
        CType::Named {
            name: name.into(),
            target: Box::new(target),
        }
    }

    /// `signed char` as produced by range narrowing. Spelled explicitly to
    /// distinguish it from plain `char`.
    pub fn schar() -> Self {
        CType::named("signed char", CType::char_())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spellings() {
        assert_eq!(CType::int_().spelling(), "int");
        assert_eq!(CType::uint().spelling(), "unsigned int");
        assert_eq!(CType::ulonglong().spelling(), "unsigned long long");
        assert_eq!(CType::ptr(CType::char_()).spelling(), "char*");
        assert_eq!(CType::named("size_t", CType::ulong()).spelling(), "size_t");
        assert_eq!(
            CType::Template {
                name: "std::vector".to_string(),
                args: vec![CType::long_()],
            }
            .spelling(),
            "std::vector<long>"
        );
    }

    #[test]
    fn test_canonical_resolves_chains() {
        let t = CType::named("my_size", CType::named("size_t", CType::ulong()));
        assert_eq!(t.canonical(), &CType::ulong());
        assert!(t.is_integer());
        assert!(t.is_unsigned_integer());
    }

    #[test]
    fn test_scalar_predicates() {
        assert!(CType::int_().is_scalar());
        assert!(CType::ptr(CType::Void).is_scalar());
        assert!(!CType::Record { name: "S".into() }.is_scalar());
        assert!(!CType::Template {
            name: "std::vector".into(),
            args: vec![CType::int_()],
        }
        .is_scalar());
    }

    #[test]
    fn test_incomplete() {
        assert!(CType::Auto.is_incomplete());
        assert!(CType::Unknown.is_incomplete());
        assert!(!CType::int_().is_incomplete());
        assert!(CType::named("opaque", CType::Unknown).is_incomplete());
    }

    #[test]
    fn test_signed_char_spelling() {
        assert_eq!(CType::schar().spelling(), "signed char");
        assert!(CType::schar().is_signed_integer());
    }

    #[test]
    fn test_pointee() {
        let p = CType::ptr(CType::char_());
        assert_eq!(p.pointee(), Some(&CType::char_()));
        assert_eq!(CType::int_().pointee(), None);
    }
}
