//! Text renderings of an instruction stream: the assembly listing and the hex image.

use std::fmt;

use super::{AsmMaker, Entry};

/// Column-aligned assembly text, one entry per line.
pub struct Listing<'a>(pub &'a AsmMaker);

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in self.0.entries() {
            match entry {
                Entry::Real(instr) => writeln!(f, "\t{instr}")?,
                Entry::Label(name) => writeln!(f, "{name}:")?,
                Entry::Comment(text) => writeln!(f, ";{text}")?,
                Entry::Spacer => writeln!(f)?,
                Entry::CallMacro(target) => writeln!(f, "\t_to\t{target}")?,
            }
        }
        Ok(())
    }
}

/// A hex image of encoded words: one byte per line, high byte first.
pub struct HexImage<'a>(pub &'a [u16]);

impl fmt::Display for HexImage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for word in self.0 {
            let [hi, lo] = word.to_be_bytes();
            writeln!(f, "{hi:02x}")?;
            writeln!(f, "{lo:02x}")?;
        }
        Ok(())
    }
}

pub fn render_asm(asm: &AsmMaker) -> String {
    Listing(asm).to_string()
}

pub fn render_hex(words: &[u16]) -> String {
    HexImage(words).to_string()
}
