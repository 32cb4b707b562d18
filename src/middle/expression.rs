use crate::{
    frontend::lexer::Location,
    middle::{
        constant::Constant,
        ir::{Id, Instruction, Op, Section, StorageClass, builder::ModuleBuilder},
        ty::{BaseKind, Qualifiers, Type},
    },
};

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    /// Known at compile time, nothing has been emitted for it
    Constant(Constant),
    /// A value which has already been computed
    RValue(Id),
    /// A pointer to storage, the chain describes which part of it is accessed
    LValue(Id, StorageClass),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operation {
    Cast,
    Member(u32),
    StaticIndex(u32),
    DynamicIndex(Id),
    /// Component offsets, unused slots are -1. Matrix offsets are encoded as
    /// `row * 4 + col`
    Swizzle([i8; 4]),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainStep {
    pub operation: Operation,
    pub from: Type,
    pub to: Type,
}

impl ChainStep {
    fn is_addressing(&self) -> bool {
        matches!(
            self.operation,
            Operation::Member(_) | Operation::StaticIndex(_) | Operation::DynamicIndex(_)
        )
    }
}

/// Result of parsing an expression. Loads and stores through l-values are
/// deferred until the expression is used.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub ty: Type,
    pub location: Location,
    pub chain: Vec<ChainStep>,
}

impl Expression {
    pub fn constant(ty: Type, value: Constant, location: Location) -> Self {
        Self {
            kind: ExpressionKind::Constant(value),
            ty,
            location,
            chain: Vec::new(),
        }
    }

    pub fn rvalue(id: Id, ty: Type, location: Location) -> Self {
        Self {
            kind: ExpressionKind::RValue(id),
            ty,
            location,
            chain: Vec::new(),
        }
    }

    pub fn lvalue(id: Id, storage: StorageClass, ty: Type, location: Location) -> Self {
        Self {
            kind: ExpressionKind::LValue(id, storage),
            ty: Type {
                is_pointer: false,
                ..ty
            },
            location,
            chain: Vec::new(),
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, ExpressionKind::Constant(_))
    }

    pub fn is_lvalue(&self) -> bool {
        matches!(self.kind, ExpressionKind::LValue(..))
    }

    pub fn constant_value(&self) -> Option<&Constant> {
        match &self.kind {
            ExpressionKind::Constant(value) => Some(value),
            _ => None,
        }
    }

    /// Whether a value can be stored through this expression
    pub fn is_assignable(&self) -> bool {
        self.is_lvalue()
            && !self.ty.has(Qualifiers::CONST)
            && !self.ty.has(Qualifiers::UNIFORM)
            && self.chain.iter().all(|s| s.operation != Operation::Cast)
    }

    fn push(&mut self, operation: Operation, to: Type) {
        self.chain.push(ChainStep {
            operation,
            from: self.ty,
            to,
        });
        self.ty = to;
    }

    /// Converts the expression to another type. Constants are converted in
    /// place, anything else records a cast step. Casting to the same type does
    /// nothing.
    pub fn add_cast(&mut self, to: Type) {
        if self.ty.unqualified() == to.unqualified() {
            return;
        }

        if let ExpressionKind::Constant(value) = &mut self.kind {
            value.convert(&self.ty, &to);
            self.ty = to;
            return;
        }

        self.push(Operation::Cast, to);
    }

    pub fn add_member_access(&mut self, index: u32, to: Type) {
        self.push(Operation::Member(index), to);
    }

    pub fn add_static_index_access(&mut self, index: u32, to: Type) {
        if let ExpressionKind::Constant(value) = &mut self.kind {
            let from = self.ty;

            *value = if from.is_array() {
                value.array.get(index as usize).cloned().unwrap_or_default()
            } else if from.is_matrix() {
                let offsets = (0..from.cols)
                    .map(|col| index * from.cols + col)
                    .collect::<Vec<_>>();
                value.swizzle(&offsets)
            } else {
                value.swizzle(&[index])
            };

            self.ty = to;
            return;
        }

        self.push(Operation::StaticIndex(index), to);
    }

    /// Constants have to be materialized before being indexed dynamically
    pub fn add_dynamic_index_access(&mut self, index: Id, to: Type) {
        debug_assert!(!self.is_constant());
        self.push(Operation::DynamicIndex(index), to);
    }

    pub fn add_swizzle_access(&mut self, offsets: [i8; 4], length: usize) {
        let from = self.ty;
        let mut to = Type {
            rows: length as u32,
            cols: 1,
            ..from
        };
        to.array_length = 0;

        if let ExpressionKind::Constant(value) = &mut self.kind {
            let offsets = offsets[..length]
                .iter()
                .map(|offset| {
                    let offset = *offset as u32;
                    match from.is_matrix() {
                        true => (offset / 4) * from.cols + offset % 4,
                        false => offset,
                    }
                })
                .collect::<Vec<_>>();

            *value = value.swizzle(&offsets);
            self.ty = to;
            return;
        }

        self.push(Operation::Swizzle(offsets), to);
    }
}

fn constant_splat(ty: &Type, word: u32) -> Constant {
    let mut value = Constant::default();
    value.words[..ty.components().max(1) as usize].fill(word);
    value
}

impl ModuleBuilder {
    fn int_constant(&mut self, value: u32) -> Id {
        self.convert_constant(&Type::INT, &Constant::from_uint(value))
    }

    /// Emits an `AccessChain` for the leading addressing steps of an l-value
    /// and returns the resulting pointer together with the remaining steps
    fn access_chain_pointer<'e>(
        &mut self,
        section: &mut Section,
        base: Id,
        storage: StorageClass,
        chain: &'e [ChainStep],
    ) -> (Id, Type, &'e [ChainStep]) {
        let prefix = chain.iter().take_while(|s| s.is_addressing()).count();
        let (addressing, rest) = chain.split_at(prefix);

        let Some(last) = addressing.last() else {
            let ty = chain.first().map(|s| s.from).unwrap_or_default();
            return (base, ty, rest);
        };

        let indices = addressing
            .iter()
            .map(|step| match step.operation {
                Operation::Member(index) | Operation::StaticIndex(index) => {
                    self.int_constant(index)
                }
                Operation::DynamicIndex(id) => id,
                _ => unreachable!("only addressing steps are part of the prefix"),
            })
            .collect::<Vec<_>>();

        let pointer_type = self.convert_pointer_type(&last.to, storage);
        let pointer = self.emit_typed(
            section,
            Op::AccessChain,
            pointer_type,
            std::iter::once(base).chain(indices),
        );

        (pointer, last.to, rest)
    }

    /// Materializes the value an expression refers to
    pub fn access_chain_load(&mut self, section: &mut Section, expression: &Expression) -> Id {
        let (mut value, steps) = match &expression.kind {
            ExpressionKind::Constant(constant) => {
                return self.convert_constant(&expression.ty, constant);
            }
            ExpressionKind::RValue(id) => (*id, expression.chain.as_slice()),
            ExpressionKind::LValue(base, storage) => {
                let (pointer, loaded_type, rest) =
                    self.access_chain_pointer(section, *base, *storage, &expression.chain);

                let loaded_type = match expression.chain.is_empty() {
                    true => expression.ty,
                    false => loaded_type,
                };

                let value = self.emit(section, Op::Load, &loaded_type, [pointer]);
                (value, rest)
            }
        };

        for step in steps {
            value = self.apply_step(section, value, step);
        }

        value
    }

    fn apply_step(&mut self, section: &mut Section, value: Id, step: &ChainStep) -> Id {
        let (from, to) = (&step.from, &step.to);

        match step.operation {
            Operation::Cast => self.emit_cast(section, value, from, to),
            Operation::Member(index) | Operation::StaticIndex(index) => {
                self.emit_extract(section, to, value, [index])
            }
            Operation::DynamicIndex(index) if from.is_vector() => {
                self.emit(section, Op::VectorExtractDynamic, to, [value, index])
            }
            Operation::DynamicIndex(index) => {
                // Composite values can only be indexed dynamically in memory
                let temporary = self.define_variable(
                    None,
                    from,
                    StorageClass::Function,
                    None,
                    Location::default(),
                );
                self.emit_void(
                    section,
                    Instruction::new(Op::Store).add(temporary).add(value),
                );

                let pointer_type = self.convert_pointer_type(to, StorageClass::Function);
                let pointer = self.emit_typed(
                    section,
                    Op::AccessChain,
                    pointer_type,
                    [temporary, index],
                );

                self.emit(section, Op::Load, to, [pointer])
            }
            Operation::Swizzle(offsets) => {
                let length = to.rows as usize;
                let offsets = &offsets[..length];

                if from.is_matrix() {
                    let scalar = Type::scalar(to.base);
                    let components = offsets
                        .iter()
                        .map(|offset| {
                            let (row, col) = ((*offset / 4) as u32, (*offset % 4) as u32);
                            self.emit_extract(section, &scalar, value, [row, col])
                        })
                        .collect::<Vec<_>>();

                    match components.as_slice() {
                        [single] => *single,
                        _ => self.emit(section, Op::CompositeConstruct, to, components),
                    }
                } else if length == 1 {
                    self.emit_extract(section, to, value, [offsets[0] as u32])
                } else {
                    let components = offsets.iter().map(|o| *o as u32);
                    self.emit_shuffle(section, to, [value, value], components)
                }
            }
        }
    }

    /// Writes `value` (already converted to the expression's type) through an
    /// assignable expression
    pub fn access_chain_store(&mut self, section: &mut Section, expression: &Expression, value: Id) {
        let ExpressionKind::LValue(base, storage) = expression.kind else {
            debug_assert!(false, "stores require an l-value");
            return;
        };

        let (pointer, _, rest) =
            self.access_chain_pointer(section, base, storage, &expression.chain);

        let [step] = rest else {
            self.emit_void(section, Instruction::new(Op::Store).add(pointer).add(value));
            return;
        };

        let Operation::Swizzle(offsets) = step.operation else {
            debug_assert!(false, "only swizzles may follow addressing steps in a store");
            return;
        };

        let (from, to) = (&step.from, &step.to);
        let length = to.rows as usize;
        let scalar = Type::scalar(from.base);

        if from.is_matrix() {
            for (i, offset) in offsets[..length].iter().enumerate() {
                let (row, col) = ((*offset / 4) as u32, (*offset % 4) as u32);
                let (row, col) = (self.int_constant(row), self.int_constant(col));

                let pointer_type = self.convert_pointer_type(&scalar, storage);
                let component_pointer = self.emit_typed(
                    section,
                    Op::AccessChain,
                    pointer_type,
                    [pointer, row, col],
                );

                let component = match length {
                    1 => value,
                    _ => self.emit_extract(section, &scalar, value, [i as u32]),
                };

                self.emit_void(
                    section,
                    Instruction::new(Op::Store)
                        .add(component_pointer)
                        .add(component),
                );
            }
        } else if length == 1 {
            let index = self.int_constant(offsets[0] as u32);
            let pointer_type = self.convert_pointer_type(&scalar, storage);
            let component_pointer =
                self.emit_typed(section, Op::AccessChain, pointer_type, [pointer, index]);

            self.emit_void(
                section,
                Instruction::new(Op::Store).add(component_pointer).add(value),
            );
        } else {
            // Blend the written components into the current vector value
            let current = self.emit(section, Op::Load, from, [pointer]);

            let mut selectors = (0..from.rows).collect::<Vec<_>>();
            for (i, offset) in offsets[..length].iter().enumerate() {
                selectors[*offset as usize] = from.rows + i as u32;
            }

            let blended = self.emit_shuffle(section, from, [current, value], selectors);

            self.emit_void(section, Instruction::new(Op::Store).add(pointer).add(blended));
        }
    }

    /// Converts a value between numeric types: base kind first, then
    /// dimensions (scalar broadcast or truncation)
    pub fn emit_cast(&mut self, section: &mut Section, value: Id, from: &Type, to: &Type) -> Id {
        let (from, to) = (from.unqualified(), to.unqualified());
        if from == to {
            return value;
        }

        let mut value = value;

        if from.base != to.base {
            let converted = Type {
                base: to.base,
                ..from
            };

            value = match (from.base, to.base) {
                (_, BaseKind::Bool) => {
                    let zero = self.convert_constant(&from, &Constant::default());
                    let op = match from.is_floating_point() {
                        true => Op::FOrdNotEqual,
                        false => Op::INotEqual,
                    };
                    self.emit(section, op, &converted, [value, zero])
                }
                (BaseKind::Bool, _) => {
                    let one_bits = match to.base {
                        BaseKind::Float => 1.0f32.to_bits(),
                        _ => 1,
                    };
                    let zero = self.convert_constant(&converted, &Constant::default());
                    let one = self.convert_constant(&converted, &constant_splat(&converted, one_bits));
                    self.emit(section, Op::Select, &converted, [value, one, zero])
                }
                (BaseKind::Int, BaseKind::Float) => {
                    self.emit(section, Op::ConvertSToF, &converted, [value])
                }
                (BaseKind::Uint, BaseKind::Float) => {
                    self.emit(section, Op::ConvertUToF, &converted, [value])
                }
                (BaseKind::Float, BaseKind::Int) => {
                    self.emit(section, Op::ConvertFToS, &converted, [value])
                }
                (BaseKind::Float, BaseKind::Uint) => {
                    self.emit(section, Op::ConvertFToU, &converted, [value])
                }
                _ => self.emit(section, Op::Bitcast, &converted, [value]),
            };
        }

        let (source_components, target_components) = (from.components(), to.components());
        let scalar = Type::scalar(to.base);

        if source_components == 1 && target_components > 1 {
            if to.is_matrix() {
                let row_type = Type::vector(to.base, to.cols);
                let row = self.emit(
                    section,
                    Op::CompositeConstruct,
                    &row_type,
                    vec![value; to.cols as usize],
                );
                return self.emit(
                    section,
                    Op::CompositeConstruct,
                    &to,
                    vec![row; to.rows as usize],
                );
            }

            return self.emit(
                section,
                Op::CompositeConstruct,
                &to,
                vec![value; target_components as usize],
            );
        }

        if target_components >= source_components {
            return value;
        }

        if target_components == 1 {
            return match from.is_matrix() {
                true => self.emit_extract(section, &scalar, value, [0, 0]),
                false => self.emit_extract(section, &scalar, value, [0]),
            };
        }

        if from.is_vector() && to.is_vector() {
            return self.emit_shuffle(section, &to, [value, value], 0..to.rows);
        }

        if from.is_matrix() && to.is_matrix() {
            let source_row = Type::vector(to.base, from.cols);
            let target_row = Type::vector(to.base, to.cols);

            let rows = (0..to.rows)
                .map(|row| {
                    let mut row = self.emit_extract(section, &source_row, value, [row]);

                    if to.cols < from.cols {
                        row = self.emit_shuffle(section, &target_row, [row, row], 0..to.cols);
                    }

                    row
                })
                .collect::<Vec<_>>();

            return self.emit(section, Op::CompositeConstruct, &to, rows);
        }

        // Matrix to vector, taking components in row order
        let components = (0..target_components)
            .map(|i| {
                let (row, col) = (i / from.cols, i % from.cols);
                self.emit_extract(section, &scalar, value, [row, col])
            })
            .collect::<Vec<_>>();

        self.emit(section, Op::CompositeConstruct, &to, components)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::ir::{Operand, builder::ShortCircuit};

    fn location() -> Location {
        Location { line: 1, column: 1 }
    }

    #[test]
    fn casting_to_the_same_type_is_a_no_op() {
        let mut builder = ModuleBuilder::new(ShortCircuit::Select);
        let mut section = Section::default();
        let float2 = Type::vector(BaseKind::Float, 2);

        let mut expression = Expression::rvalue(Id(42), float2, location());
        expression.add_cast(float2);
        assert!(expression.chain.is_empty());

        let value = builder.access_chain_load(&mut section, &expression);
        assert_eq!(value, Id(42));
        assert!(section.is_empty());
    }

    #[test]
    fn constant_swizzles_fold() {
        let float3 = Type::vector(BaseKind::Float, 3);
        let mut value = Constant::default();
        value.words[..3].copy_from_slice(&[1.0f32.to_bits(), 2.0f32.to_bits(), 3.0f32.to_bits()]);

        let mut expression = Expression::constant(float3, value, location());
        expression.add_swizzle_access([2, 0, -1, -1], 2);

        assert_eq!(expression.ty.rows, 2);
        let folded = expression.constant_value().unwrap();
        assert_eq!((folded.as_float(0), folded.as_float(1)), (3.0, 1.0));
    }

    #[test]
    fn lvalue_loads_go_through_an_access_chain() {
        let mut builder = ModuleBuilder::new(ShortCircuit::Select);
        let mut section = Section::default();
        let float4 = Type::vector(BaseKind::Float, 4);

        let mut array = float4;
        array.array_length = 4;

        let mut expression = Expression::lvalue(Id(100), StorageClass::Private, array, location());
        expression.add_static_index_access(1, float4);
        expression.add_swizzle_access([0, 1, -1, -1], 2);

        builder.access_chain_load(&mut section, &expression);

        let ops = section.instructions.iter().map(|i| i.op).collect::<Vec<_>>();
        assert_eq!(ops, vec![Op::AccessChain, Op::Load, Op::VectorShuffle]);
    }

    #[test]
    fn swizzled_stores_blend_components() {
        let mut builder = ModuleBuilder::new(ShortCircuit::Select);
        let mut section = Section::default();
        let float4 = Type::vector(BaseKind::Float, 4);

        let mut expression = Expression::lvalue(Id(100), StorageClass::Function, float4, location());
        expression.add_swizzle_access([2, 0, -1, -1], 2);
        assert!(expression.is_assignable());

        builder.access_chain_store(&mut section, &expression, Id(7));

        let shuffle = &section.instructions[1];
        assert_eq!(shuffle.op, Op::VectorShuffle);
        assert_eq!(
            &shuffle.operands[2..],
            &[5, 1, 4, 3].map(Operand::LiteralBit32)
        );
        assert_eq!(section.instructions[2].op, Op::Store);
    }

    #[test]
    fn casts_are_not_assignable() {
        let mut expression =
            Expression::lvalue(Id(100), StorageClass::Function, Type::INT, location());
        expression.add_cast(Type::FLOAT);
        assert!(!expression.is_assignable());
    }
}
