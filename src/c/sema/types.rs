use std::fmt;

/// The value types of the language, plus the pseudo-type of an untyped literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarType {
    Int,
    Char,
    UInt,
    UChar,
    /// An integer literal, which conforms to whatever it is combined with.
    Literal,
}

impl VarType {
    pub fn is_unsigned(self) -> bool {
        matches!(self, VarType::UInt | VarType::UChar)
    }

    pub fn is_signed(self) -> bool {
        matches!(self, VarType::Int | VarType::Char)
    }

    fn is_narrow(self) -> bool {
        matches!(self, VarType::Char | VarType::UChar)
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VarType::Int => "int",
            VarType::Char => "char",
            VarType::UInt => "unsigned int",
            VarType::UChar => "unsigned char",
            VarType::Literal => "literal",
        };
        f.write_str(s)
    }
}

/// The outcome of combining two operand types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Combined {
    pub ty: VarType,
    /// A signed operand was forced into an unsigned result.
    pub lossy: bool,
}

/// Infers the result type of a symmetric binary operation.
///
/// A literal takes the other side's type. Otherwise `char`/`unsigned char` promote to `int`,
/// and `unsigned int` dominates everything else.
pub fn new_typing(lhs: VarType, rhs: VarType) -> Combined {
    let plain = |ty| Combined { ty, lossy: false };
    match (lhs, rhs) {
        (VarType::Literal, other) | (other, VarType::Literal) => plain(other),
        (VarType::UInt, other) | (other, VarType::UInt) => Combined {
            ty: VarType::UInt,
            lossy: other.is_signed(),
        },
        (a, b) if a == b && !a.is_narrow() => plain(a),
        _ => plain(VarType::Int),
    }
}

/// Whether a value of type `src` fits a location of type `dest` without loss.
pub fn can_assign(dest: VarType, src: VarType) -> bool {
    if dest == VarType::Literal || src == VarType::Literal || dest == src {
        return true;
    }
    match dest {
        VarType::UInt => src == VarType::UChar,
        VarType::Int => src != VarType::UInt,
        VarType::Char | VarType::UChar | VarType::Literal => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [VarType; 5] = [
        VarType::Int,
        VarType::Char,
        VarType::UInt,
        VarType::UChar,
        VarType::Literal,
    ];

    #[test]
    fn test_new_typing_is_commutative() {
        for a in ALL {
            for b in ALL {
                assert_eq!(new_typing(a, b), new_typing(b, a), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn test_new_typing_rules() {
        assert_eq!(new_typing(VarType::Literal, VarType::UChar).ty, VarType::UChar);
        assert_eq!(new_typing(VarType::Literal, VarType::Literal).ty, VarType::Literal);
        assert_eq!(new_typing(VarType::Char, VarType::Char).ty, VarType::Int);
        assert_eq!(new_typing(VarType::UChar, VarType::Char).ty, VarType::Int);

        let mixed = new_typing(VarType::Int, VarType::UInt);
        assert_eq!(mixed.ty, VarType::UInt);
        assert!(mixed.lossy);
        assert!(!new_typing(VarType::UChar, VarType::UInt).lossy);
    }

    #[test]
    fn test_can_assign() {
        assert!(can_assign(VarType::Int, VarType::Char));
        assert!(can_assign(VarType::Int, VarType::UChar));
        assert!(!can_assign(VarType::Int, VarType::UInt));
        assert!(can_assign(VarType::UInt, VarType::UChar));
        assert!(!can_assign(VarType::UInt, VarType::Int));
        assert!(!can_assign(VarType::Char, VarType::Int));
        assert!(can_assign(VarType::Char, VarType::Literal));
    }
}
