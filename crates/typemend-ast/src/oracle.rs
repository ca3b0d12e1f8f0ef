//! Integer width oracle.
//!
//! Bit widths are target properties, not type properties: `long` is 64 bits
//! on LP64 and 32 bits on ILP32, and `size_t`/`ptrdiff_t` follow the pointer
//! width. Everything in the solver that compares widths asks the oracle
//! rather than hardcoding a rank table.

use crate::ctype::{CType, IntWidth};

/// Width oracle for one compilation target.
#[derive(Debug, Clone, Copy)]
pub struct TypeOracle {
    /// Pointer width in bits.
    pub pointer_bits: u32,
    /// Width of `long` in bits.
    pub long_bits: u32,
}

impl TypeOracle {
    /// The common 64-bit Unix model: 64-bit pointers, 64-bit `long`.
    pub fn lp64() -> Self {
        Self {
            pointer_bits: 64,
            long_bits: 64,
        }
    }

    /// A 32-bit model: 32-bit pointers, 32-bit `long`.
    pub fn ilp32() -> Self {
        Self {
            pointer_bits: 32,
            long_bits: 32,
        }
    }

    /// Bit width of a type, `None` for non-scalars and incomplete types.
    pub fn bit_width(&self, ty: &CType) -> Option<u32> {
        match ty {
            CType::Bool => Some(8),
            CType::Int(i) => Some(match i.width {
                IntWidth::Char => 8,
                IntWidth::Short => 16,
                IntWidth::Int => 32,
                IntWidth::Long => self.long_bits,
                IntWidth::LongLong => 64,
            }),
            CType::Float { size } => Some(*size as u32 * 8),
            CType::Pointer(_) => Some(self.pointer_bits),
            CType::Named { target, .. } => self.bit_width(target),
            _ => None,
        }
    }

    /// The canonical target of `size_t` on this target.
    pub fn size_type_target(&self) -> CType {
        if self.pointer_bits == self.long_bits {
            CType::ulong()
        } else {
            CType::ulonglong()
        }
    }

    /// The canonical target of `ptrdiff_t` on this target.
    pub fn ptrdiff_type_target(&self) -> CType {
        if self.pointer_bits == self.long_bits {
            CType::long_()
        } else {
            CType::longlong()
        }
    }

    /// `size_t`, spelled as such.
    pub fn size_type(&self) -> CType {
        CType::named("size_t", self.size_type_target())
    }

    /// `ptrdiff_t`, spelled as such.
    pub fn ptrdiff_type(&self) -> CType {
        CType::named("ptrdiff_t", self.ptrdiff_type_target())
    }
}

impl Default for TypeOracle {
    fn default() -> Self {
        Self::lp64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lp64_widths() {
        let o = TypeOracle::lp64();
        assert_eq!(o.bit_width(&CType::char_()), Some(8));
        assert_eq!(o.bit_width(&CType::int_()), Some(32));
        assert_eq!(o.bit_width(&CType::long_()), Some(64));
        assert_eq!(o.bit_width(&CType::longlong()), Some(64));
        assert_eq!(o.bit_width(&CType::ptr(CType::Void)), Some(64));
    }

    #[test]
    fn test_ilp32_widths() {
        let o = TypeOracle::ilp32();
        assert_eq!(o.bit_width(&CType::long_()), Some(32));
        assert_eq!(o.bit_width(&CType::ptr(CType::Void)), Some(32));
        assert_eq!(o.bit_width(&o.size_type()), Some(32));
    }

    #[test]
    fn test_typedef_width_follows_target() {
        let o = TypeOracle::lp64();
        let t = CType::named("size_t", CType::ulong());
        assert_eq!(o.bit_width(&t), Some(64));
    }

    #[test]
    fn test_non_scalars_have_no_width() {
        let o = TypeOracle::lp64();
        assert_eq!(o.bit_width(&CType::Unknown), None);
        assert_eq!(o.bit_width(&CType::Record { name: "S".into() }), None);
        assert_eq!(o.bit_width(&CType::Auto), None);
    }

    #[test]
    fn test_standard_typedef_spellings() {
        let o = TypeOracle::lp64();
        assert_eq!(o.size_type().spelling(), "size_t");
        assert_eq!(o.ptrdiff_type().spelling(), "ptrdiff_t");
        assert!(o.size_type().is_unsigned_integer());
        assert!(o.ptrdiff_type().is_signed_integer());
    }
}
