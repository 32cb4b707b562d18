use hashbrown::{HashMap, HashSet};
use log::trace;
use rspirv::spirv::{Dim, ImageFormat};

use super::{
    BasicBlock, BuiltIn, Decoration, EntryPoint, ExecutionModel, Function, Id, Instruction,
    Module, Op, Operand, Section, StorageClass,
};
use crate::{
    frontend::lexer::Location,
    middle::{
        constant::Constant,
        ty::{BaseKind, Type},
    },
};

/// How `&&`, `||` and `?:` are lowered
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ShortCircuit {
    /// Evaluate both operands and pick the result with a `Select`
    #[default]
    Select,
    /// Only evaluate the operand that is needed, merging with a `Phi`
    Branch,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TypeKey {
    Value {
        base: BaseKind,
        rows: u32,
        cols: u32,
        array_length: i32,
        definition: Option<Id>,
    },
    Image,
    Pointer {
        pointee: Id,
        storage: StorageClass,
    },
    Function {
        return_type: Id,
        parameters: Vec<Id>,
    },
}

impl TypeKey {
    fn of(ty: &Type) -> Self {
        Self::Value {
            base: ty.base,
            rows: ty.rows,
            cols: ty.cols,
            array_length: ty.array_length,
            definition: ty.definition,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct ConstantKey {
    ty: Id,
    op: Op,
    words: Vec<u32>,
}

/// Constants only carry ids and 32-bit literals
fn operand_word(operand: &Operand) -> Option<u32> {
    match operand {
        Operand::IdRef(word) | Operand::LiteralBit32(word) => Some(*word),
        _ => None,
    }
}

#[derive(Debug)]
struct FunctionBuilder {
    id: Id,
    name: Option<String>,
    return_type: Id,
    parameters: Vec<Instruction>,
    /// Entry block label followed by every local variable of the function
    variables: Section,
    definition: Section,
}

/// Owns every module level section and hands out fresh ids. Also tracks the
/// block currently under construction, which makes it the control-flow
/// builder the parser drives.
#[derive(Debug)]
pub struct ModuleBuilder {
    next_id: u32,
    glsl_ext: Id,
    entry_points: Vec<EntryPoint>,
    debug_names: Section,
    annotations: Section,
    declarations: Section,
    type_lookup: HashMap<TypeKey, Id>,
    constant_lookup: HashMap<ConstantKey, Id>,
    functions: Vec<FunctionBuilder>,
    current_function: Option<usize>,
    current_block: Option<Id>,
    entry_block: Option<Id>,
    /// Labels some terminator branches to
    branch_targets: HashSet<Id>,
    pub short_circuit: ShortCircuit,
}

impl ModuleBuilder {
    pub fn new(short_circuit: ShortCircuit) -> Self {
        Self {
            next_id: 2,
            glsl_ext: Id(1),
            entry_points: Vec::new(),
            debug_names: Section::default(),
            annotations: Section::default(),
            declarations: Section::default(),
            type_lookup: HashMap::new(),
            constant_lookup: HashMap::new(),
            functions: Vec::new(),
            current_function: None,
            current_block: None,
            entry_block: None,
            branch_targets: HashSet::new(),
            short_circuit,
        }
    }

    pub fn make_id(&mut self) -> Id {
        let id = Id(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn glsl_ext(&self) -> Id {
        self.glsl_ext
    }

    /* Debug names and decorations */

    pub fn add_name(&mut self, id: Id, name: &str) {
        self.debug_names
            .push(Instruction::new(Op::Name).add(id).add_string(name));
    }

    pub fn add_member_name(&mut self, id: Id, member: u32, name: &str) {
        self.debug_names.push(
            Instruction::new(Op::MemberName)
                .add(id)
                .add_literal(member)
                .add_string(name),
        );
    }

    pub fn add_decoration(&mut self, id: Id, decoration: Decoration, values: &[u32]) {
        self.annotations.push(
            Instruction::new(Op::Decorate)
                .add(id)
                .add_operand(Operand::Decoration(decoration))
                .add_literals(values.iter().copied()),
        );
    }

    pub fn add_member_decoration(
        &mut self,
        id: Id,
        member: u32,
        decoration: Decoration,
        values: &[u32],
    ) {
        self.annotations.push(
            Instruction::new(Op::MemberDecorate)
                .add(id)
                .add_literal(member)
                .add_operand(Operand::Decoration(decoration))
                .add_literals(values.iter().copied()),
        );
    }

    pub fn add_builtin(&mut self, id: Id, builtin: BuiltIn) {
        self.annotations.push(
            Instruction::new(Op::Decorate)
                .add(id)
                .add_operand(Operand::Decoration(Decoration::BuiltIn))
                .add_operand(Operand::BuiltIn(builtin)),
        );
    }

    pub fn add_entry_point(
        &mut self,
        name: &str,
        model: ExecutionModel,
        function: Id,
        interface: Vec<Id>,
    ) {
        trace!("adding {model:?} entry point '{name}' ({function})");

        self.entry_points.push(EntryPoint {
            name: name.to_owned(),
            model,
            function,
            interface,
        });
    }

    /* Types */

    fn declare_type(&mut self, key: TypeKey, instruction: Instruction) -> Id {
        let id = self.make_id();
        let mut instruction = instruction;
        instruction.result = Some(id);

        self.declarations.push(instruction);
        self.type_lookup.insert(key, id);

        id
    }

    fn image_type(&mut self) -> Id {
        if let Some(id) = self.type_lookup.get(&TypeKey::Image) {
            return *id;
        }

        let sampled_type = self.convert_type(&Type::FLOAT);

        // 2D, not depth, not arrayed, single sampled, used with a sampler,
        // unknown format
        let instruction = Instruction::new(Op::TypeImage)
            .add(sampled_type)
            .add_operand(Operand::Dim(Dim::Dim2D))
            .add_literals([0, 0, 0, 1])
            .add_operand(Operand::ImageFormat(ImageFormat::Unknown));

        self.declare_type(TypeKey::Image, instruction)
    }

    /// Returns the id of the IR type for a value of type `ty`, declaring it on
    /// first use. Qualifiers do not take part in the lookup.
    pub fn convert_type(&mut self, ty: &Type) -> Id {
        if ty.is_struct() {
            if let Some(definition) = ty.definition.filter(|_| !ty.is_array()) {
                return definition;
            }
        }

        let key = TypeKey::of(ty);
        if let Some(id) = self.type_lookup.get(&key) {
            return *id;
        }

        let instruction = if ty.is_array() {
            let element = self.convert_type(&ty.element());

            if ty.array_length > 0 {
                let length = self.convert_constant(
                    &Type::UINT,
                    &Constant::from_uint(ty.array_length as u32),
                );
                Instruction::new(Op::TypeArray).add(element).add(length)
            } else {
                Instruction::new(Op::TypeRuntimeArray).add(element)
            }
        } else if ty.is_matrix() {
            let row = self.convert_type(&Type::vector(ty.base, ty.cols));
            Instruction::new(Op::TypeMatrix).add(row).add_literal(ty.rows)
        } else if ty.is_vector() {
            let component = self.convert_type(&Type::scalar(ty.base));
            Instruction::new(Op::TypeVector)
                .add(component)
                .add_literal(ty.rows)
        } else {
            match ty.base {
                BaseKind::Bool => Instruction::new(Op::TypeBool),
                BaseKind::Int => Instruction::new(Op::TypeInt).add_literals([32, 1]),
                BaseKind::Uint => Instruction::new(Op::TypeInt).add_literals([32, 0]),
                BaseKind::Float => Instruction::new(Op::TypeFloat).add_literal(32),
                BaseKind::Texture => return self.image_type(),
                BaseKind::Sampler => {
                    let image = self.image_type();
                    Instruction::new(Op::TypeSampledImage).add(image)
                }
                BaseKind::Void
                | BaseKind::String
                | BaseKind::Struct
                | BaseKind::Function => Instruction::new(Op::TypeVoid),
            }
        };

        self.declare_type(key, instruction)
    }

    pub fn convert_pointer_type(&mut self, ty: &Type, storage: StorageClass) -> Id {
        let pointee = self.convert_type(ty);
        let key = TypeKey::Pointer { pointee, storage };

        if let Some(id) = self.type_lookup.get(&key) {
            return *id;
        }

        let instruction = Instruction::new(Op::TypePointer)
            .add_operand(Operand::StorageClass(storage))
            .add(pointee);

        self.declare_type(key, instruction)
    }

    fn convert_function_type(&mut self, return_type: Id, parameters: Vec<Id>) -> Id {
        let key = TypeKey::Function {
            return_type,
            parameters: parameters.clone(),
        };

        if let Some(id) = self.type_lookup.get(&key) {
            return *id;
        }

        let instruction = Instruction::new(Op::TypeFunction)
            .add(return_type)
            .add_ids(parameters);

        self.declare_type(key, instruction)
    }

    /// Declares a struct type under an id allocated beforehand
    pub fn define_struct(&mut self, id: Id, name: &str, members: &[(String, Type)]) {
        let member_types = members
            .iter()
            .map(|(_, ty)| self.convert_type(ty))
            .collect::<Vec<_>>();

        let mut instruction = Instruction::new(Op::TypeStruct).add_ids(member_types);
        instruction.result = Some(id);
        self.declarations.push(instruction);

        self.add_name(id, name);

        for (index, (member_name, _)) in members.iter().enumerate() {
            self.add_member_name(id, index as u32, member_name);
        }
    }

    /* Constants */

    /// Returns the id of a constant with the value `constant` interpreted as
    /// type `ty`, declaring it on first use
    pub fn convert_constant(&mut self, ty: &Type, constant: &Constant) -> Id {
        let type_id = self.convert_type(ty);

        let (op, operands) = if ty.is_array() {
            let element_type = ty.element();
            let elements = constant
                .array
                .iter()
                .map(|element| Operand::from(self.convert_constant(&element_type, element)))
                .collect::<Vec<_>>();

            (Op::ConstantComposite, elements)
        } else if ty.is_matrix() {
            let row_type = Type::vector(ty.base, ty.cols);
            let rows = (0..ty.rows)
                .map(|row| {
                    let offsets = (0..ty.cols).map(|col| row * ty.cols + col).collect::<Vec<_>>();
                    Operand::from(self.convert_constant(&row_type, &constant.swizzle(&offsets)))
                })
                .collect();

            (Op::ConstantComposite, rows)
        } else if ty.is_vector() {
            let component_type = Type::scalar(ty.base);
            let components = (0..ty.rows)
                .map(|i| {
                    Operand::from(self.convert_constant(&component_type, &constant.swizzle(&[i])))
                })
                .collect();

            (Op::ConstantComposite, components)
        } else if ty.is_boolean() {
            match constant.as_uint(0) {
                0 => (Op::ConstantFalse, Vec::new()),
                _ => (Op::ConstantTrue, Vec::new()),
            }
        } else if ty.is_numeric() {
            (Op::Constant, vec![Operand::LiteralBit32(constant.as_uint(0))])
        } else {
            (Op::ConstantNull, Vec::new())
        };

        let key = ConstantKey {
            ty: type_id,
            op,
            words: operands.iter().filter_map(operand_word).collect(),
        };

        if let Some(id) = self.constant_lookup.get(&key) {
            return *id;
        }

        let id = self.make_id();
        let mut instruction = Instruction::with_result(op, type_id, id);
        instruction.operands = operands;

        self.declarations.push(instruction);
        self.constant_lookup.insert(key, id);

        id
    }

    /* Variables and functions */

    /// Declares a variable and returns its pointer id. Function local
    /// variables are hoisted into the entry block of the current function.
    pub fn define_variable(
        &mut self,
        name: Option<&str>,
        ty: &Type,
        storage: StorageClass,
        initializer: Option<Id>,
        location: Location,
    ) -> Id {
        let id = self.make_id();
        self.define_variable_with_id(id, name, ty, storage, initializer, location)
    }

    /// Same as [`Self::define_variable`], for variables that are referenced
    /// before they are declared
    pub fn define_variable_with_id(
        &mut self,
        id: Id,
        name: Option<&str>,
        ty: &Type,
        storage: StorageClass,
        initializer: Option<Id>,
        location: Location,
    ) -> Id {
        let pointer_type = self.convert_pointer_type(ty, storage);

        let mut instruction = Instruction::with_result(Op::Variable, pointer_type, id)
            .add_operand(Operand::StorageClass(storage))
            .at(location);

        if let Some(initializer) = initializer {
            instruction = instruction.add(initializer);
        }

        match (storage, self.current_function) {
            (StorageClass::Function, Some(index)) => {
                self.functions[index].variables.push(instruction);
            }
            _ => self.declarations.push(instruction),
        }

        if let Some(name) = name {
            self.add_name(id, name);
        }

        id
    }

    /// Starts a new function and makes it current
    pub fn define_function(&mut self, name: Option<&str>, return_type: &Type) -> Id {
        let return_type = self.convert_type(return_type);
        let id = self.make_id();

        if let Some(name) = name {
            self.add_name(id, name);
        }

        self.functions.push(FunctionBuilder {
            id,
            name: name.map(str::to_owned),
            return_type,
            parameters: Vec::new(),
            variables: Section::default(),
            definition: Section::default(),
        });
        self.current_function = Some(self.functions.len() - 1);

        id
    }

    /// Adds a by-pointer parameter to the current function
    pub fn define_parameter(&mut self, name: &str, ty: &Type, location: Location) -> Id {
        let pointer_type = self.convert_pointer_type(ty, StorageClass::Function);
        let id = self.make_id();

        if let Some(index) = self.current_function {
            self.functions[index].parameters.push(
                Instruction::with_result(Op::FunctionParameter, pointer_type, id).at(location),
            );
        }

        self.add_name(id, name);

        id
    }

    /// Opens the entry block of the current function
    pub fn enter_function_entry_block(&mut self) -> Id {
        let label = self.make_id();

        if let Some(index) = self.current_function {
            self.functions[index]
                .variables
                .push(Instruction::label(label));
        }

        self.current_block = Some(label);
        self.entry_block = Some(label);
        label
    }

    /// Attaches the body to the current function and closes it
    pub fn leave_function(&mut self, definition: Section) {
        if let Some(index) = self.current_function.take() {
            self.functions[index].definition.append(definition);
        }

        self.current_block = None;
        self.entry_block = None;
    }

    /* Blocks */

    pub fn current_block(&self) -> Option<Id> {
        self.current_block
    }

    pub fn is_in_block(&self) -> bool {
        self.current_block.is_some()
    }

    /// Moves the insertion point onto another open block. Used when the
    /// instructions of two blocks are built in separate sections.
    pub fn set_current_block(&mut self, block: Option<Id>) {
        self.current_block = block;
    }

    /// Whether any path of the current function can reach a block
    pub fn is_reachable(&self, label: Id) -> bool {
        self.entry_block == Some(label) || self.branch_targets.contains(&label)
    }

    pub fn enter_block(&mut self, section: &mut Section, label: Id) {
        section.push(Instruction::label(label));
        self.current_block = Some(label);
    }

    fn leave_block(&mut self, section: &mut Section, terminator: Instruction, targets: &[Id]) {
        if self.current_block.take().is_some() {
            section.push(terminator);
            self.branch_targets.extend(targets.iter().copied());
        }
    }

    pub fn leave_block_and_branch(&mut self, section: &mut Section, target: Id) {
        self.leave_block(section, Instruction::new(Op::Branch).add(target), &[target]);
    }

    pub fn leave_block_and_branch_conditional(
        &mut self,
        section: &mut Section,
        condition: Id,
        true_target: Id,
        false_target: Id,
    ) {
        self.leave_block(
            section,
            Instruction::new(Op::BranchConditional)
                .add(condition)
                .add(true_target)
                .add(false_target),
            &[true_target, false_target],
        );
    }

    pub fn leave_block_and_switch(
        &mut self,
        section: &mut Section,
        selector: Id,
        default_target: Id,
        cases: &[(u32, Id)],
    ) {
        let mut instruction = Instruction::new(Op::Switch).add(selector).add(default_target);

        for (literal, target) in cases {
            instruction = instruction.add_literal(*literal).add(*target);
        }

        let mut targets = cases.iter().map(|(_, target)| *target).collect::<Vec<_>>();
        targets.push(default_target);

        self.leave_block(section, instruction, &targets);
    }

    pub fn leave_block_and_return(&mut self, section: &mut Section, value: Option<Id>) {
        let instruction = match value {
            Some(value) => Instruction::new(Op::ReturnValue).add(value),
            None => Instruction::new(Op::Return),
        };

        self.leave_block(section, instruction, &[]);
    }

    pub fn leave_block_and_kill(&mut self, section: &mut Section) {
        self.leave_block(section, Instruction::new(Op::Kill), &[]);
    }

    pub fn leave_block_and_unreachable(&mut self, section: &mut Section) {
        self.leave_block(section, Instruction::new(Op::Unreachable), &[]);
    }

    /* Instructions */

    /// Appends an instruction producing a value of type `ty` from the values
    /// `operands` and returns its id
    pub fn emit(
        &mut self,
        section: &mut Section,
        op: Op,
        ty: &Type,
        operands: impl IntoIterator<Item = Id>,
    ) -> Id {
        let type_id = self.convert_type(ty);
        self.emit_typed(section, op, type_id, operands)
    }

    pub fn emit_typed(
        &mut self,
        section: &mut Section,
        op: Op,
        type_id: Id,
        operands: impl IntoIterator<Item = Id>,
    ) -> Id {
        self.emit_operands(section, op, type_id, operands.into_iter().map(Operand::from))
    }

    /// Same as [`Self::emit_typed`], for operations mixing ids and literals
    pub fn emit_operands(
        &mut self,
        section: &mut Section,
        op: Op,
        type_id: Id,
        operands: impl IntoIterator<Item = Operand>,
    ) -> Id {
        let id = self.make_id();
        let mut instruction = Instruction::with_result(op, type_id, id);
        instruction.operands.extend(operands);
        section.push(instruction);
        id
    }

    /// Extracts the element at `indices` out of a composite value
    pub fn emit_extract(
        &mut self,
        section: &mut Section,
        ty: &Type,
        composite: Id,
        indices: impl IntoIterator<Item = u32>,
    ) -> Id {
        let type_id = self.convert_type(ty);
        let operands = [Operand::from(composite)]
            .into_iter()
            .chain(indices.into_iter().map(Operand::LiteralBit32));
        self.emit_operands(section, Op::CompositeExtract, type_id, operands)
    }

    /// Picks the `components` of the concatenation of two vectors
    pub fn emit_shuffle(
        &mut self,
        section: &mut Section,
        ty: &Type,
        vectors: [Id; 2],
        components: impl IntoIterator<Item = u32>,
    ) -> Id {
        let type_id = self.convert_type(ty);
        let operands = vectors
            .into_iter()
            .map(Operand::from)
            .chain(components.into_iter().map(Operand::LiteralBit32));
        self.emit_operands(section, Op::VectorShuffle, type_id, operands)
    }

    /// Appends an instruction without a result
    pub fn emit_void(&mut self, section: &mut Section, instruction: Instruction) {
        section.push(instruction);
    }

    /* Finishing */

    pub fn finish(mut self) -> Module {
        let functions = std::mem::take(&mut self.functions);
        let mut finished = Vec::with_capacity(functions.len());

        for function in functions {
            let parameter_types = function
                .parameters
                .iter()
                .filter_map(|p| p.ty)
                .collect::<Vec<_>>();
            let function_type = self.convert_function_type(function.return_type, parameter_types);

            let mut blocks: Vec<BasicBlock> = Vec::new();

            for instruction in function
                .variables
                .instructions
                .into_iter()
                .chain(function.definition.instructions)
            {
                if let (Op::Label, Some(label)) = (instruction.op, instruction.result) {
                    blocks.push(BasicBlock {
                        label,
                        instructions: Vec::new(),
                    });
                } else if let Some(block) = blocks.last_mut() {
                    block.instructions.push(instruction);
                }
            }

            finished.push(Function {
                id: function.id,
                name: function.name,
                return_type: function.return_type,
                function_type,
                parameters: function.parameters,
                blocks,
            });
        }

        let declarations = Self::order_declarations(std::mem::take(&mut self.declarations));

        Module {
            id_bound: self.next_id,
            glsl_ext: self.glsl_ext,
            entry_points: self.entry_points,
            debug_names: self.debug_names,
            annotations: self.annotations,
            declarations,
            functions: finished,
        }
    }

    /// Moves every declaration after the declarations its type and id
    /// operands refer to. The `$Globals` struct is only defined once all
    /// uniforms are known, after pointers to it were already declared.
    fn order_declarations(declarations: Section) -> Section {
        let instructions = declarations.instructions;
        let positions: HashMap<Id, usize> = instructions
            .iter()
            .enumerate()
            .filter_map(|(index, instruction)| instruction.result.map(|id| (id, index)))
            .collect();

        let mut visited = vec![false; instructions.len()];
        let mut order = Vec::with_capacity(instructions.len());

        fn visit(
            index: usize,
            instructions: &[Instruction],
            positions: &HashMap<Id, usize>,
            visited: &mut [bool],
            order: &mut Vec<usize>,
        ) {
            if visited[index] {
                return;
            }

            visited[index] = true;

            let instruction = &instructions[index];

            for id in instruction.ty.into_iter().chain(instruction.referenced_ids()) {
                if let Some(&dependency) = positions.get(&id) {
                    visit(dependency, instructions, positions, visited, order);
                }
            }

            order.push(index);
        }

        for index in 0..instructions.len() {
            visit(index, &instructions, &positions, &mut visited, &mut order);
        }

        let mut slots = instructions.into_iter().map(Some).collect::<Vec<_>>();

        Section {
            instructions: order
                .into_iter()
                .filter_map(|index| slots[index].take())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn types_and_constants_are_deduplicated() {
        let mut builder = ModuleBuilder::new(ShortCircuit::Select);
        let float3 = Type::vector(BaseKind::Float, 3);

        let a = builder.convert_type(&float3);
        let mut qualified = float3;
        qualified.qualifiers = crate::middle::ty::Qualifiers::CONST;
        assert_eq!(builder.convert_type(&qualified), a);

        let one = builder.convert_constant(&Type::FLOAT, &Constant::from_float(1.0));
        assert_eq!(
            builder.convert_constant(&Type::FLOAT, &Constant::from_float(1.0)),
            one
        );
        assert_ne!(
            builder.convert_constant(&Type::INT, &Constant::from_int(1)),
            one
        );
    }

    #[test]
    fn literal_operands_do_not_reorder_declarations() {
        let mut builder = ModuleBuilder::new(ShortCircuit::Select);
        while builder.next_id < 31 {
            builder.make_id();
        }

        // `TypeFloat 32` must not be mistaken for a use of the constant %32
        let float = builder.convert_type(&Type::FLOAT);
        let one = builder.convert_constant(&Type::FLOAT, &Constant::from_float(1.0));
        assert_eq!((float, one), (Id(31), Id(32)));

        let module = builder.finish();
        let position = |id| {
            module
                .declarations
                .instructions
                .iter()
                .position(|i| i.result == Some(id))
        };

        assert!(position(float) < position(one));
    }

    #[test]
    fn closed_blocks_ignore_further_terminators() {
        let mut builder = ModuleBuilder::new(ShortCircuit::Select);
        let mut section = Section::default();

        let label = builder.make_id();
        builder.enter_block(&mut section, label);
        builder.leave_block_and_kill(&mut section);
        builder.leave_block_and_branch(&mut section, label);

        assert!(!builder.is_in_block());
        assert_eq!(section.instructions.len(), 2);
        assert_eq!(section.instructions[1].op, Op::Kill);
    }

    #[test]
    fn functions_are_split_into_blocks() {
        let mut builder = ModuleBuilder::new(ShortCircuit::Select);

        builder.define_function(Some("main"), &Type::VOID);
        builder.enter_function_entry_block();
        builder.define_variable(
            Some("x"),
            &Type::FLOAT,
            StorageClass::Function,
            None,
            Location::default(),
        );

        let mut body = Section::default();
        let next = builder.make_id();
        builder.leave_block_and_branch(&mut body, next);
        builder.enter_block(&mut body, next);
        builder.leave_block_and_return(&mut body, None);
        builder.leave_function(body);

        let module = builder.finish();
        let function = &module.functions[0];

        assert_eq!(function.blocks.len(), 2);
        assert_eq!(function.blocks[0].instructions[0].op, Op::Variable);
        assert!(function.blocks.iter().all(|b| b.terminator().is_some()));
    }
}
