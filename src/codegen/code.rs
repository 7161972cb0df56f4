//! Instruction sink and method layout
//!
//! The generator talks to an `InstructionSink`: it creates labels, binds
//! them, and appends symbolic instructions whose branch targets are labels.
//! `CodeBuffer::write` then lays the method out, giving every instruction a
//! byte offset (switch padding and `wide` forms included), resolving labels
//! to offsets and turning the registered handler ranges into an exception
//! table.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use crate::codegen::opcodes::{self, mnemonic};
use crate::error::{Error, Result};

/// Branch target handle; an index into the sink's label arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(usize);

/// Constant loaded by `LDC`/`LDC2_W`
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
}

impl Constant {
    /// Long and double constants take two pool slots and need `LDC2_W`
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{}", v),
            Constant::Long(v) => write!(f, "{}L", v),
            Constant::Double(v) => write!(f, "{:?}", v),
            Constant::String(s) => write!(f, "\"{}\"", s.escape_default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    NoArg(u8),
    Ldc(Constant),
    Branch {
        opcode: u8,
        target: Label,
    },
    /// Field access or method invocation
    MemberAccess {
        opcode: u8,
        owner: String,
        name: String,
        descriptor: String,
    },
    /// `NEW`, `ANEWARRAY`, `CHECKCAST`, `INSTANCEOF`
    Reference {
        opcode: u8,
        type_name: String,
    },
    /// Long-form local load or store
    Local {
        opcode: u8,
        slot: u16,
    },
    /// `BIPUSH`, `SIPUSH`, `NEWARRAY`
    IntOperand {
        opcode: u8,
        operand: i32,
    },
    Iinc {
        slot: u16,
        delta: i16,
    },
    MultiANewArray {
        type_name: String,
        dims: u8,
    },
    TableSwitch {
        default: Label,
        lo: i32,
        hi: i32,
        targets: Vec<Label>,
    },
    LookupSwitch {
        default: Label,
        pairs: BTreeMap<i32, Label>,
    },
}

impl Instruction {
    pub fn opcode(&self) -> u8 {
        match self {
            Instruction::NoArg(op) => *op,
            Instruction::Ldc(constant) if constant.is_wide() => opcodes::LDC2_W,
            Instruction::Ldc(_) => opcodes::LDC,
            Instruction::Branch { opcode, .. }
            | Instruction::MemberAccess { opcode, .. }
            | Instruction::Reference { opcode, .. }
            | Instruction::Local { opcode, .. }
            | Instruction::IntOperand { opcode, .. } => *opcode,
            Instruction::Iinc { .. } => opcodes::IINC,
            Instruction::MultiANewArray { .. } => opcodes::MULTIANEWARRAY,
            Instruction::TableSwitch { .. } => opcodes::TABLESWITCH,
            Instruction::LookupSwitch { .. } => opcodes::LOOKUPSWITCH,
        }
    }

    /// Encoded size in bytes when the instruction starts at `offset`
    pub fn size(&self, offset: usize) -> usize {
        let padding = (4 - (offset + 1) % 4) % 4;
        match self {
            Instruction::NoArg(_) => 1,
            Instruction::Ldc(constant) if constant.is_wide() => 3,
            Instruction::Ldc(_) => 2,
            Instruction::Branch { .. } => 3,
            Instruction::MemberAccess { opcode, .. } if *opcode == opcodes::INVOKEINTERFACE => 5,
            Instruction::MemberAccess { .. } | Instruction::Reference { .. } => 3,
            Instruction::Local { slot, .. } => {
                if *slot <= u8::MAX as u16 {
                    2
                } else {
                    4
                }
            }
            Instruction::IntOperand { opcode, .. } if *opcode == opcodes::SIPUSH => 3,
            Instruction::IntOperand { .. } => 2,
            Instruction::Iinc { slot, delta } => {
                if *slot <= u8::MAX as u16 && i8::try_from(*delta).is_ok() {
                    3
                } else {
                    6
                }
            }
            Instruction::MultiANewArray { .. } => 4,
            Instruction::TableSwitch { targets, .. } => 1 + padding + 12 + 4 * targets.len(),
            Instruction::LookupSwitch { pairs, .. } => 1 + padding + 8 + 8 * pairs.len(),
        }
    }
}

/// Consumer of generated instructions
pub trait InstructionSink {
    fn create_label(&mut self) -> Label;

    /// Bind `label` to the position of the next instruction
    fn add_label(&mut self, label: Label);

    fn add_no_arg_instruction(&mut self, opcode: u8);

    fn add_ldc_instruction(&mut self, constant: Constant);

    fn add_branch_instruction(&mut self, opcode: u8, target: Label);

    fn add_member_access_instruction(&mut self, opcode: u8, owner: &str, name: &str, descriptor: &str);

    fn add_reference_instruction(&mut self, opcode: u8, type_name: &str);

    fn add_local_instruction(&mut self, opcode: u8, slot: u16);

    fn add_one_arg_instruction(&mut self, opcode: u8, operand: i32);

    fn add_iinc_instruction(&mut self, slot: u16, delta: i16);

    fn add_multianewarray_instruction(&mut self, type_name: &str, dims: u8);

    fn add_tableswitch_instruction(&mut self, default: Label, lo: i32, hi: i32, targets: Vec<Label>);

    fn add_lookupswitch_instruction(&mut self, default: Label, count: usize, pairs: BTreeMap<i32, Label>);

    /// Protect `[start, end)`; `catch_type` is `None` for a catch-any handler
    fn add_exception_handler(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<&str>);

    /// Reserve local slots not reached through a local instruction
    fn reserve_locals(&mut self, count: u16);

    /// Lay out the method
    fn write(&self) -> Result<Code>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Handler {
    start: Label,
    end: Label,
    handler: Label,
    catch_type: Option<String>,
}

/// In-memory sink producing a `Code` layout
#[derive(Debug, Clone, Default)]
pub struct CodeBuffer {
    instructions: Vec<Instruction>,
    /// Instruction index each label is bound to
    labels: Vec<Option<usize>>,
    handlers: Vec<Handler>,
    max_locals: u16,
}

impl CodeBuffer {
    /// A buffer whose method already uses `max_locals` slots (this and parameters)
    pub fn new(max_locals: u16) -> Self {
        Self {
            max_locals,
            ..Self::default()
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }
}

impl InstructionSink for CodeBuffer {
    fn create_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    fn add_label(&mut self, label: Label) {
        if let Some(slot) = self.labels.get_mut(label.0) {
            *slot = Some(self.instructions.len());
        }
    }

    fn add_no_arg_instruction(&mut self, opcode: u8) {
        self.push(Instruction::NoArg(opcode));
    }

    fn add_ldc_instruction(&mut self, constant: Constant) {
        self.push(Instruction::Ldc(constant));
    }

    fn add_branch_instruction(&mut self, opcode: u8, target: Label) {
        self.push(Instruction::Branch { opcode, target });
    }

    fn add_member_access_instruction(&mut self, opcode: u8, owner: &str, name: &str, descriptor: &str) {
        self.push(Instruction::MemberAccess {
            opcode,
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        });
    }

    fn add_reference_instruction(&mut self, opcode: u8, type_name: &str) {
        self.push(Instruction::Reference {
            opcode,
            type_name: type_name.to_string(),
        });
    }

    fn add_local_instruction(&mut self, opcode: u8, slot: u16) {
        let width = match opcode {
            opcodes::LLOAD | opcodes::DLOAD | opcodes::LSTORE | opcodes::DSTORE => 2,
            _ => 1,
        };
        self.max_locals = self.max_locals.max(slot + width);
        match opcodes::short_local_form(opcode, slot) {
            Some(short) => self.push(Instruction::NoArg(short)),
            None => self.push(Instruction::Local { opcode, slot }),
        }
    }

    fn add_one_arg_instruction(&mut self, opcode: u8, operand: i32) {
        self.push(Instruction::IntOperand { opcode, operand });
    }

    fn add_iinc_instruction(&mut self, slot: u16, delta: i16) {
        self.max_locals = self.max_locals.max(slot + 1);
        self.push(Instruction::Iinc { slot, delta });
    }

    fn add_multianewarray_instruction(&mut self, type_name: &str, dims: u8) {
        self.push(Instruction::MultiANewArray {
            type_name: type_name.to_string(),
            dims,
        });
    }

    fn add_tableswitch_instruction(&mut self, default: Label, lo: i32, hi: i32, targets: Vec<Label>) {
        self.push(Instruction::TableSwitch {
            default,
            lo,
            hi,
            targets,
        });
    }

    fn add_lookupswitch_instruction(&mut self, default: Label, count: usize, pairs: BTreeMap<i32, Label>) {
        debug_assert_eq!(count, pairs.len());
        self.push(Instruction::LookupSwitch { default, pairs });
    }

    fn add_exception_handler(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<&str>) {
        self.handlers.push(Handler {
            start,
            end,
            handler,
            catch_type: catch_type.map(str::to_string),
        });
    }

    fn reserve_locals(&mut self, count: u16) {
        self.max_locals = self.max_locals.max(count);
    }

    fn write(&self) -> Result<Code> {
        let mut offsets = Vec::with_capacity(self.instructions.len() + 1);
        let mut offset = 0;
        for instruction in &self.instructions {
            offsets.push(offset);
            offset += instruction.size(offset);
        }
        offsets.push(offset);

        let label_offsets = self
            .labels
            .iter()
            .enumerate()
            .map(|(id, position)| {
                position
                    .map(|index| offsets[index])
                    .ok_or_else(|| Error::internal_error(format!("label L{} is never bound", id)))
            })
            .collect::<Result<Vec<usize>>>()?;

        let exception_table = self
            .handlers
            .iter()
            .map(|h| ExceptionTableEntry {
                start_pc: label_offsets[h.start.0],
                end_pc: label_offsets[h.end.0],
                handler_pc: label_offsets[h.handler.0],
                catch_type: h.catch_type.clone(),
            })
            .filter(|entry| entry.start_pc < entry.end_pc)
            .collect();

        log::trace!(
            "code layout: {} instruction(s), {} byte(s), {} label(s)",
            self.instructions.len(),
            offset,
            label_offsets.len()
        );
        Ok(Code {
            instructions: offsets.iter().copied().zip(self.instructions.iter().cloned()).collect(),
            label_offsets,
            exception_table,
            max_locals: self.max_locals,
            code_length: offset,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    pub start_pc: usize,
    pub end_pc: usize,
    pub handler_pc: usize,
    /// Internal class name; `None` catches everything
    pub catch_type: Option<String>,
}

/// A laid-out method body
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    /// Instructions with their byte offsets
    pub instructions: Vec<(usize, Instruction)>,
    pub label_offsets: Vec<usize>,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub max_locals: u16,
    pub code_length: usize,
}

impl Code {
    pub fn label_offset(&self, label: Label) -> usize {
        self.label_offsets[label.0]
    }

    /// Opcodes in order, handy for assertions
    pub fn opcodes(&self) -> Vec<u8> {
        self.instructions.iter().map(|(_, i)| i.opcode()).collect()
    }

    pub fn count(&self, opcode: u8) -> usize {
        self.instructions.iter().filter(|(_, i)| i.opcode() == opcode).count()
    }

    /// One instruction per line with offsets, then the exception table
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for (offset, instruction) in &self.instructions {
            let _ = writeln!(out, "{:>6}: {}", offset, self.render(instruction));
        }
        if !self.exception_table.is_empty() {
            let _ = writeln!(out, "  Exception table:");
            let _ = writeln!(out, "     from    to  target type");
            for entry in &self.exception_table {
                let _ = writeln!(
                    out,
                    "    {:>5} {:>5} {:>7} {}",
                    entry.start_pc,
                    entry.end_pc,
                    entry.handler_pc,
                    entry.catch_type.as_deref().unwrap_or("any")
                );
            }
        }
        out
    }

    fn render(&self, instruction: &Instruction) -> String {
        let name = mnemonic(instruction.opcode());
        match instruction {
            Instruction::NoArg(_) => name.to_string(),
            Instruction::Ldc(constant) => format!("{} {}", name, constant),
            Instruction::Branch { target, .. } => format!("{} {}", name, self.label_offset(*target)),
            Instruction::MemberAccess {
                owner,
                name: member,
                descriptor,
                ..
            } => format!("{} {}.{}:{}", name, owner, member, descriptor),
            Instruction::Reference { type_name, .. } => format!("{} {}", name, type_name),
            Instruction::Local { slot, .. } => {
                if *slot > u8::MAX as u16 {
                    format!("{} {} {}", mnemonic(opcodes::WIDE), name, slot)
                } else {
                    format!("{} {}", name, slot)
                }
            }
            Instruction::IntOperand { operand, .. } => format!("{} {}", name, operand),
            Instruction::Iinc { slot, delta } => format!("{} {} {}", name, slot, delta),
            Instruction::MultiANewArray { type_name, dims } => format!("{} {} {}", name, type_name, dims),
            Instruction::TableSwitch {
                default,
                lo,
                hi,
                targets,
            } => {
                let mut text = format!("{} {} to {}", name, lo, hi);
                for (value, target) in (*lo..=*hi).zip(targets) {
                    let _ = write!(text, "\n{:>14}: {}", value, self.label_offset(*target));
                }
                let _ = write!(text, "\n{:>14}: {}", "default", self.label_offset(*default));
                text
            }
            Instruction::LookupSwitch { default, pairs } => {
                let mut text = format!("{} {}", name, pairs.len());
                for (value, target) in pairs {
                    let _ = write!(text, "\n{:>14}: {}", value, self.label_offset(*target));
                }
                let _ = write!(text, "\n{:>14}: {}", "default", self.label_offset(*default));
                text
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::opcodes::*;

    #[test]
    fn test_forward_branch_resolution() {
        let mut code = CodeBuffer::new(1);
        let end = code.create_label();
        code.add_local_instruction(ILOAD, 0);
        code.add_branch_instruction(IFEQ, end);
        code.add_no_arg_instruction(ICONST_1);
        code.add_label(end);
        code.add_no_arg_instruction(RETURN);
        let laid_out = code.write().expect("layout");
        assert_eq!(laid_out.label_offset(end), 5);
        assert_eq!(laid_out.code_length, 6);
        assert_eq!(laid_out.opcodes(), vec![ILOAD_0, IFEQ, ICONST_1, RETURN]);
    }

    #[test]
    fn test_switch_padding() {
        let mut code = CodeBuffer::new(1);
        let default = code.create_label();
        code.add_local_instruction(ILOAD, 0);
        let mut pairs = BTreeMap::new();
        pairs.insert(1, default);
        pairs.insert(5, default);
        code.add_lookupswitch_instruction(default, 2, pairs);
        code.add_label(default);
        code.add_no_arg_instruction(RETURN);
        let laid_out = code.write().expect("layout");
        // iload_0 at 0, lookupswitch at 1 with 2 bytes of padding
        assert_eq!(laid_out.label_offset(default), 1 + 1 + 2 + 8 + 16);
    }

    #[test]
    fn test_wide_locals_and_iinc() {
        let mut code = CodeBuffer::new(0);
        code.add_local_instruction(ISTORE, 300);
        code.add_iinc_instruction(2, 1000);
        code.add_iinc_instruction(2, 1);
        let laid_out = code.write().expect("layout");
        assert_eq!(laid_out.code_length, 4 + 6 + 3);
        assert_eq!(laid_out.max_locals, 301);
    }

    #[test]
    fn test_zero_length_handler_is_dropped() {
        let mut code = CodeBuffer::new(0);
        let start = code.create_label();
        let end = code.create_label();
        let handler = code.create_label();
        code.add_label(start);
        code.add_label(end);
        code.add_no_arg_instruction(RETURN);
        code.add_label(handler);
        code.add_no_arg_instruction(ATHROW);
        code.add_exception_handler(start, end, handler, None);
        assert!(code.write().expect("layout").exception_table.is_empty());
    }

    #[test]
    fn test_unbound_label_is_an_internal_error() {
        let mut code = CodeBuffer::new(0);
        let nowhere = code.create_label();
        code.add_branch_instruction(GOTO, nowhere);
        assert!(matches!(code.write(), Err(Error::Internal { .. })));
    }
}
