//! SPIR-V instruction building and reading.
use std::fmt;

use num_traits::FromPrimitive;
use spirv::Op;

use crate::error::{anyhow, Result};

/// An owned SPIR-V instruction: opcode plus word count in word 0, operands
/// after.
#[derive(Debug, Clone)]
pub struct Instruction {
    inner: Vec<u32>,
}

impl Instruction {
    pub fn as_words(&self) -> &[u32] {
        &self.inner
    }
    pub fn into_words(self) -> Vec<u32> {
        self.inner
    }
}

impl AsRef<[u32]> for Instruction {
    fn as_ref(&self) -> &[u32] {
        &self.inner
    }
}

/// Builder that fixes up the word count on `build`.
pub struct InstructionBuilder {
    inner: Vec<u32>,
}

impl InstructionBuilder {
    pub fn new(op: Op) -> InstructionBuilder {
        InstructionBuilder {
            inner: vec![(op as u32) & 0xFFFF],
        }
    }
    pub fn push(mut self, x: u32) -> Self {
        self.inner.push(x);
        self
    }
    pub fn push_list(mut self, x: &[u32]) -> Self {
        self.inner.extend_from_slice(x);
        self
    }
    /// Pack a string literal: UTF-8 bytes, little-endian within each word,
    /// NUL terminated and padded to a word boundary.
    pub fn push_str(mut self, x: &str) -> Self {
        let mut word = 0u32;
        let mut shift = 0u32;
        for byte in x.bytes() {
            word |= (byte as u32) << shift;
            shift += 8;
            if shift == 32 {
                self.inner.push(word);
                word = 0;
                shift = 0;
            }
        }
        // The remaining bytes, or a bare NUL word when the length is a
        // multiple of four.
        self.inner.push(word);
        self
    }
    pub fn build(mut self) -> Instruction {
        self.inner[0] |= (self.inner.len() as u32) << 16;
        Instruction { inner: self.inner }
    }
}

/// Borrowed view of one instruction inside a word stream.
pub struct Instr<'a> {
    words: &'a [u32],
}

impl<'a> Instr<'a> {
    pub fn opcode(&self) -> u32 {
        self.words[0] & 0xFFFF
    }
    pub fn op(&self) -> Option<Op> {
        Op::from_u32(self.opcode())
    }
    /// Word count including the leading opcode word.
    pub fn word_count(&self) -> usize {
        self.words.len()
    }
    pub fn operands(&self) -> &'a [u32] {
        &self.words[1..]
    }
    pub fn operand(&self, index: usize) -> Option<u32> {
        self.words.get(index + 1).copied()
    }
}

impl fmt::Debug for Instr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op() {
            Some(op) => write!(f, "{:?} {:?}", op, self.operands()),
            None => write!(f, "Op({}) {:?}", self.opcode(), self.operands()),
        }
    }
}

/// Iterator over the instructions of a SPIR-V word stream.
pub struct Instrs<'a> {
    inner: &'a [u32],
}

impl<'a> Instrs<'a> {
    /// Iterate a bare instruction stream (no header).
    pub fn new(words: &'a [u32]) -> Instrs<'a> {
        Instrs { inner: words }
    }

    /// Iterate the instructions of a whole module, skipping the five-word
    /// header.
    pub fn of_module(words: &'a [u32]) -> Result<Instrs<'a>> {
        if words.len() < 5 {
            return Err(anyhow!("SPIR-V module is shorter than its header"));
        }
        Ok(Instrs {
            inner: &words[5..],
        })
    }
}

impl<'a> Iterator for Instrs<'a> {
    type Item = Instr<'a>;

    fn next(&mut self) -> Option<Instr<'a>> {
        let head = *self.inner.first()?;
        let len = (head >> 16) as usize;
        if len == 0 || len > self.inner.len() {
            // Zero-length or truncated instruction; stop rather than spin.
            self.inner = &[];
            return None;
        }
        let instr = Instr {
            words: &self.inner[..len],
        };
        self.inner = &self.inner[len..];
        Some(instr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_packs_word_count() {
        let instr = InstructionBuilder::new(Op::Load).push(1).push(2).push(3).build();
        assert_eq!(instr.as_words()[0], (4 << 16) | Op::Load as u32);
        assert_eq!(instr.as_words().len(), 4);
    }

    #[test]
    fn strings_are_nul_terminated_and_padded() {
        let four = InstructionBuilder::new(Op::Name).push(1).push_str("main").build();
        // "main" fills a word, so the terminator needs its own.
        assert_eq!(&four.as_words()[2..], &[u32::from_le_bytes(*b"main"), 0]);

        let three = InstructionBuilder::new(Op::Name).push(1).push_str("oD0").build();
        assert_eq!(&three.as_words()[2..], &[u32::from_le_bytes([b'o', b'D', b'0', 0])]);
    }

    #[test]
    fn reader_walks_instruction_boundaries() {
        let mut words = Vec::new();
        words.extend_from_slice(
            InstructionBuilder::new(Op::TypeFloat).push(7).push(32).build().as_words(),
        );
        words.extend_from_slice(InstructionBuilder::new(Op::TypeVoid).push(9).build().as_words());
        let ops: Vec<_> = Instrs::new(&words).map(|x| x.op().unwrap()).collect();
        assert_eq!(ops, vec![Op::TypeFloat, Op::TypeVoid]);
    }
}
