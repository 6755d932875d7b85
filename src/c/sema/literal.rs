/// A parsed integer literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedLit {
    /// The value reduced modulo 65536, always in `0..=0xFFFF`.
    pub value: i32,
    /// The written value did not fit in 16 bits.
    pub overflow: bool,
}

fn accumulate(digits: impl Iterator<Item = u32>, radix: i64) -> ParsedLit {
    let mut value = 0i64;
    let mut overflow = false;
    for d in digits {
        value = value * radix + d as i64;
        if value > 0xFFFF {
            overflow = true;
            value &= 0xFFFF;
        }
    }
    ParsedLit {
        value: value as i32,
        overflow,
    }
}

/// Parses a decimal, `0x` hex or character literal, as produced by the lexer.
pub fn parse_literal(text: &str) -> Option<ParsedLit> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        let digits = hex.chars().map(|c| c.to_digit(16));
        return Some(accumulate(digits.collect::<Option<Vec<_>>>()?.into_iter(), 16));
    }
    if let Some(quoted) = text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        let value = match quoted {
            "\\0" => 0,
            "\\t" => b'\t' as i32,
            "\\n" => b'\n' as i32,
            "\\\\" => b'\\' as i32,
            "\\'" => b'\'' as i32,
            c if c.len() == 1 => c.as_bytes()[0] as i32,
            _ => return None,
        };
        return Some(ParsedLit {
            value,
            overflow: false,
        });
    }
    let digits = text.chars().map(|c| c.to_digit(10));
    Some(accumulate(digits.collect::<Option<Vec<_>>>()?.into_iter(), 10))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_in_range() {
        assert_eq!(parse_literal("300").unwrap().value, 300);
        assert_eq!(parse_literal("0xA50E").unwrap().value, 0xA50E);
        assert_eq!(parse_literal("65535").unwrap(), ParsedLit { value: 65535, overflow: false });
        assert_eq!(parse_literal("'a'").unwrap().value, 97);
        assert_eq!(parse_literal("'\\n'").unwrap().value, 10);
        assert_eq!(parse_literal("'\\''").unwrap().value, 39);
    }

    #[test]
    fn test_parse_truncates_modulo_65536() {
        let lit = parse_literal("65536").unwrap();
        assert!(lit.overflow);
        assert_eq!(lit.value, 0);

        let lit = parse_literal("70000").unwrap();
        assert_eq!(lit.value, 70000 % 65536);

        let lit = parse_literal("0x123456").unwrap();
        assert!(lit.overflow);
        assert_eq!(lit.value, 0x3456);

        let huge = parse_literal("123456789012345678901234567890").unwrap();
        assert!(huge.overflow);
        assert_eq!(
            huge.value as u128,
            123456789012345678901234567890u128 % 65536
        );
    }
}
