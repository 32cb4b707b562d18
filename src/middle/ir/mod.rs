//! Structured, SPIR-V shaped intermediate representation.
//!
//! The parser emits instructions straight into [`Section`]s owned by the
//! [`builder::ModuleBuilder`]. Once parsing is done the builder hands over a
//! finished [`Module`] where every function body has been split into
//! [`BasicBlock`]s.

pub use rspirv::{
    dr::Operand,
    spirv::{
        BuiltIn, Decoration, ExecutionModel, GLOp, ImageOperands, LoopControl, Op,
        SelectionControl, StorageClass,
    },
};

use crate::frontend::lexer::Location;

pub mod builder;
pub mod pretty_print;
pub mod writer;

/// Result identifier of an instruction. Ids are allocated by the module
/// builder starting at 1, which is reserved for the `GLSL.std.450` import.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(pub u32);

impl Id {
    /// Id bound to symbols of declarations that failed to parse
    pub const PLACEHOLDER: Id = Id(u32::MAX);

    pub fn is_placeholder(self) -> bool {
        self == Self::PLACEHOLDER
    }
}

impl From<Id> for u32 {
    fn from(value: Id) -> Self {
        value.0
    }
}

impl From<Id> for Operand {
    fn from(value: Id) -> Self {
        Operand::IdRef(value.0)
    }
}

impl core::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Whether an operation ends a basic block
pub fn is_terminator(op: Op) -> bool {
    matches!(
        op,
        Op::Branch
            | Op::BranchConditional
            | Op::Switch
            | Op::Kill
            | Op::Return
            | Op::ReturnValue
            | Op::Unreachable
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: Op,
    pub ty: Option<Id>,
    pub result: Option<Id>,
    pub operands: Vec<Operand>,
    pub location: Option<Location>,
}

impl Instruction {
    pub fn new(op: Op) -> Self {
        Self {
            op,
            ty: None,
            result: None,
            operands: Vec::new(),
            location: None,
        }
    }

    pub fn with_result(op: Op, ty: Id, result: Id) -> Self {
        Self {
            ty: Some(ty),
            result: Some(result),
            ..Self::new(op)
        }
    }

    /// Label opening the block `label`
    pub fn label(label: Id) -> Self {
        Self {
            result: Some(label),
            ..Self::new(Op::Label)
        }
    }

    /// Appends an id operand
    pub fn add(self, id: Id) -> Self {
        self.add_operand(Operand::IdRef(id.0))
    }

    pub fn add_ids(mut self, ids: impl IntoIterator<Item = Id>) -> Self {
        self.operands.extend(ids.into_iter().map(Operand::from));
        self
    }

    /// Appends a 32-bit literal operand
    pub fn add_literal(self, literal: u32) -> Self {
        self.add_operand(Operand::LiteralBit32(literal))
    }

    pub fn add_literals(mut self, literals: impl IntoIterator<Item = u32>) -> Self {
        self.operands
            .extend(literals.into_iter().map(Operand::LiteralBit32));
        self
    }

    pub fn add_string(self, string: &str) -> Self {
        self.add_operand(Operand::LiteralString(string.to_owned()))
    }

    pub fn add_operand(mut self, operand: Operand) -> Self {
        self.operands.push(operand);
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Ids this instruction refers to through its operands
    pub fn referenced_ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.operands.iter().filter_map(|operand| match operand {
            Operand::IdRef(id) => Some(Id(*id)),
            _ => None,
        })
    }

    pub fn to_dr(&self) -> rspirv::dr::Instruction {
        rspirv::dr::Instruction::new(
            self.op,
            self.ty.map(u32::from),
            self.result.map(u32::from),
            self.operands.clone(),
        )
    }
}

/// A flat, ordered list of instructions
#[derive(Debug, Default, Clone)]
pub struct Section {
    pub instructions: Vec<Instruction>,
}

impl Section {
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn append(&mut self, other: Section) {
        self.instructions.extend(other.instructions);
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub label: Id,
    pub instructions: Vec<Instruction>,
}

impl BasicBlock {
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| is_terminator(i.op))
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub id: Id,
    pub name: Option<String>,
    pub return_type: Id,
    pub function_type: Id,
    pub parameters: Vec<Instruction>,
    pub blocks: Vec<BasicBlock>,
}

#[derive(Debug, Clone)]
pub struct EntryPoint {
    pub name: String,
    pub model: ExecutionModel,
    pub function: Id,
    pub interface: Vec<Id>,
}

/// A finished module ready to be printed or serialized
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub id_bound: u32,
    pub glsl_ext: Id,
    pub entry_points: Vec<EntryPoint>,
    pub debug_names: Section,
    pub annotations: Section,
    /// Types, constants and global variables in declaration order
    pub declarations: Section,
    pub functions: Vec<Function>,
}

impl Module {
    /// Looks up the debug name attached to an id
    pub fn name_of(&self, id: Id) -> Option<String> {
        self.debug_names
            .instructions
            .iter()
            .filter(|i| i.op == Op::Name && i.referenced_ids().next() == Some(id))
            .find_map(|i| match i.operands.get(1) {
                Some(Operand::LiteralString(name)) => Some(name.clone()),
                _ => None,
            })
    }

    pub fn declaration_of(&self, id: Id) -> Option<&Instruction> {
        self.declarations
            .instructions
            .iter()
            .find(|i| i.result == Some(id))
    }

    /// Iterates over every instruction inside of function bodies
    pub fn body_instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.functions
            .iter()
            .flat_map(|f| f.blocks.iter())
            .flat_map(|b| b.instructions.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_are_not_referenced_ids() {
        let instruction = Instruction::with_result(Op::CompositeExtract, Id(2), Id(5))
            .add(Id(4))
            .add_literal(32);

        assert_eq!(instruction.referenced_ids().collect::<Vec<_>>(), vec![Id(4)]);
        assert_eq!(instruction.operands[1], Operand::LiteralBit32(32));
    }

    #[test]
    fn terminators_end_blocks() {
        assert!(is_terminator(Op::Branch));
        assert!(is_terminator(Op::Kill));
        assert!(!is_terminator(Op::LoopMerge));
    }

    #[test]
    fn names_are_looked_up_by_target() {
        let mut module = Module::default();
        module
            .debug_names
            .push(Instruction::new(Op::Name).add(Id(3)).add_string("main"));

        assert_eq!(module.name_of(Id(3)).as_deref(), Some("main"));
        assert_eq!(module.name_of(Id(4)), None);
    }
}
