//! Bytecode instruction set and encoding.
//!
//! Instructions are a flat byte stream: a one-byte opcode followed by its
//! operands as big-endian unsigned integers, with widths fixed per opcode by
//! the definition table. [`make`] encodes one instruction, [`read_operands`]
//! decodes the operand list, and the [`Instructions`] `Display` impl renders
//! the stream as a disassembly listing for tests and debugging.

use std::fmt;
use std::ops::{Deref, DerefMut};

use num_enum::TryFromPrimitive;

/// One-byte operation codes.
///
/// Jump targets are absolute byte offsets into the containing function's
/// instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum Opcode {
    /// Push `constants[operand]`.
    Constant = 0,
    /// Discard the top of the stack.
    Pop,
    Add,
    Sub,
    Mul,
    Div,
    True,
    False,
    Equal,
    NotEqual,
    LessThan,
    Minus,
    Bang,
    Jump,
    /// Pop the condition; jump when it is not truthy.
    JumpNotTruthy,
    Null,
    SetGlobal,
    GetGlobal,
    SetLocal,
    GetLocal,
    /// Pop `operand` elements and push them as an array.
    Array,
    /// Pop `operand` stack slots (twice the pair count) and push a hash.
    Hash,
    Index,
    /// Call the value below the `operand` arguments on the stack.
    Call,
    /// Return null from the current frame.
    Return,
    /// Pop the return value, then return it from the current frame.
    ReturnValue,
}

/// Name and operand layout for one opcode.
#[derive(Debug, PartialEq, Eq)]
pub struct Definition {
    pub name: &'static str,
    /// Width in bytes of each operand, in declaration order.
    pub operand_widths: &'static [usize],
}

impl Opcode {
    pub fn definition(self) -> &'static Definition {
        match self {
            Opcode::Constant => &Definition { name: "OpConstant", operand_widths: &[2] },
            Opcode::Pop => &Definition { name: "OpPop", operand_widths: &[] },
            Opcode::Add => &Definition { name: "OpAdd", operand_widths: &[] },
            Opcode::Sub => &Definition { name: "OpSub", operand_widths: &[] },
            Opcode::Mul => &Definition { name: "OpMul", operand_widths: &[] },
            Opcode::Div => &Definition { name: "OpDiv", operand_widths: &[] },
            Opcode::True => &Definition { name: "OpTrue", operand_widths: &[] },
            Opcode::False => &Definition { name: "OpFalse", operand_widths: &[] },
            Opcode::Equal => &Definition { name: "OpEqual", operand_widths: &[] },
            Opcode::NotEqual => &Definition { name: "OpNotEqual", operand_widths: &[] },
            Opcode::LessThan => &Definition { name: "OpLessThan", operand_widths: &[] },
            Opcode::Minus => &Definition { name: "OpMinus", operand_widths: &[] },
            Opcode::Bang => &Definition { name: "OpBang", operand_widths: &[] },
            Opcode::Jump => &Definition { name: "OpJump", operand_widths: &[2] },
            Opcode::JumpNotTruthy => {
                &Definition { name: "OpJumpNotTruthy", operand_widths: &[2] }
            }
            Opcode::Null => &Definition { name: "OpNull", operand_widths: &[] },
            Opcode::SetGlobal => &Definition { name: "OpSetGlobal", operand_widths: &[2] },
            Opcode::GetGlobal => &Definition { name: "OpGetGlobal", operand_widths: &[2] },
            Opcode::SetLocal => &Definition { name: "OpSetLocal", operand_widths: &[1] },
            Opcode::GetLocal => &Definition { name: "OpGetLocal", operand_widths: &[1] },
            Opcode::Array => &Definition { name: "OpArray", operand_widths: &[2] },
            Opcode::Hash => &Definition { name: "OpHash", operand_widths: &[2] },
            Opcode::Index => &Definition { name: "OpIndex", operand_widths: &[] },
            Opcode::Call => &Definition { name: "OpCall", operand_widths: &[1] },
            Opcode::Return => &Definition { name: "OpReturn", operand_widths: &[] },
            Opcode::ReturnValue => &Definition { name: "OpReturnValue", operand_widths: &[] },
        }
    }

    /// Look up the definition for a raw byte, if it names an opcode.
    pub fn lookup(byte: u8) -> Option<&'static Definition> {
        Opcode::try_from(byte).ok().map(Opcode::definition)
    }
}

/// A contiguous, byte-encoded instruction stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Instructions(pub Vec<u8>);

impl Instructions {
    pub fn new() -> Self {
        Instructions(Vec::new())
    }
}

impl Deref for Instructions {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Instructions {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl fmt::Display for Instructions {
    /// Disassemble as one `%04d NAME operands…` line per instruction.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut i = 0;
        while i < self.0.len() {
            let Some(def) = Opcode::lookup(self.0[i]) else {
                writeln!(f, "ERROR: opcode {} undefined", self.0[i])?;
                i += 1;
                continue;
            };

            let (operands, read) = read_operands(def, &self.0[i + 1..]);
            writeln!(f, "{:04} {}", i, format_instruction(def, &operands))?;
            i += 1 + read;
        }
        Ok(())
    }
}

fn format_instruction(def: &Definition, operands: &[usize]) -> String {
    match def.operand_widths.len() {
        0 => def.name.to_string(),
        1 => format!("{} {}", def.name, operands[0]),
        n => format!("ERROR: unhandled operand count {} for {}", n, def.name),
    }
}

/// Encode one instruction. Width-2 operands truncate to `u16`, width-1 to
/// `u8`.
pub fn make(op: Opcode, operands: &[usize]) -> Vec<u8> {
    let def = op.definition();

    let len = 1 + def.operand_widths.iter().sum::<usize>();
    let mut instruction = Vec::with_capacity(len);
    instruction.push(op as u8);

    for (operand, width) in operands.iter().zip(def.operand_widths) {
        match width {
            2 => instruction.extend_from_slice(&(*operand as u16).to_be_bytes()),
            1 => instruction.push(*operand as u8),
            _ => unreachable!("no opcode declares operand width {}", width),
        }
    }

    instruction
}

/// Decode the operands of one instruction (the opcode byte itself already
/// consumed). Returns the operands and the number of bytes read.
pub fn read_operands(def: &Definition, ins: &[u8]) -> (Vec<usize>, usize) {
    let mut operands = Vec::with_capacity(def.operand_widths.len());
    let mut offset = 0;

    for width in def.operand_widths {
        match width {
            2 => operands.push(read_u16(&ins[offset..]) as usize),
            1 => operands.push(ins[offset] as usize),
            _ => unreachable!("no opcode declares operand width {}", width),
        }
        offset += width;
    }

    (operands, offset)
}

/// Read a big-endian `u16` from the front of a byte slice.
pub fn read_u16(ins: &[u8]) -> u16 {
    u16::from_be_bytes([ins[0], ins[1]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn make_encodes_big_endian_operands() {
        let cases: &[(Opcode, &[usize], &[u8])] = &[
            (Opcode::Constant, &[65534], &[Opcode::Constant as u8, 255, 254]),
            (Opcode::Add, &[], &[Opcode::Add as u8]),
            (Opcode::GetLocal, &[255], &[Opcode::GetLocal as u8, 255]),
        ];
        for (op, operands, expected) in cases {
            assert_eq!(make(*op, operands), *expected);
        }
    }

    #[test]
    fn make_truncates_oversized_operands() {
        assert_eq!(
            make(Opcode::Constant, &[0x1_2345]),
            vec![Opcode::Constant as u8, 0x23, 0x45]
        );
    }

    #[test]
    fn read_operands_inverts_make_for_every_opcode() {
        // Exercise every defined opcode with a maximal legal operand tuple.
        for byte in 0..=u8::MAX {
            let Ok(op) = Opcode::try_from(byte) else {
                continue;
            };
            let def = op.definition();
            let operands: Vec<usize> = def
                .operand_widths
                .iter()
                .map(|width| match width {
                    2 => 65535,
                    1 => 255,
                    _ => unreachable!(),
                })
                .collect();

            let instruction = make(op, &operands);
            let (decoded, read) = read_operands(def, &instruction[1..]);
            assert_eq!(read, instruction.len() - 1, "{}", def.name);
            assert_eq!(decoded, operands, "{}", def.name);
        }
    }

    #[test]
    fn instructions_disassemble() {
        let mut ins = Instructions::new();
        ins.extend(make(Opcode::Add, &[]));
        ins.extend(make(Opcode::GetLocal, &[1]));
        ins.extend(make(Opcode::Constant, &[2]));
        ins.extend(make(Opcode::Constant, &[65535]));

        let expected = "\
0000 OpAdd
0001 OpGetLocal 1
0003 OpConstant 2
0006 OpConstant 65535
";
        assert_eq!(ins.to_string(), expected);
    }

    #[test]
    fn undefined_opcodes_render_an_error_line() {
        let ins = Instructions(vec![255]);
        assert_eq!(ins.to_string(), "ERROR: opcode 255 undefined\n");
    }
}
