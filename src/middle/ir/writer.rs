//! Serializes a finished module into the SPIR-V binary word stream.

use rspirv::{
    binary::Assemble,
    dr,
    spirv::{AddressingModel, Capability, ExecutionMode, FunctionControl, MemoryModel},
};

use super::{ExecutionModel, Instruction, Module, Op, Operand};

fn instructions(instructions: &[Instruction]) -> Vec<dr::Instruction> {
    instructions.iter().map(Instruction::to_dr).collect()
}

/// Lays the module out in the section order a SPIR-V binary requires
fn to_data_representation(module: &Module) -> dr::Module {
    let mut output = dr::Module::new();

    let mut header = dr::ModuleHeader::new(module.id_bound);
    header.set_version(1, 0);
    output.header = Some(header);

    output.capabilities.push(dr::Instruction::new(
        Op::Capability,
        None,
        None,
        vec![Operand::Capability(Capability::Shader)],
    ));

    output.ext_inst_imports.push(dr::Instruction::new(
        Op::ExtInstImport,
        None,
        Some(module.glsl_ext.0),
        vec![Operand::LiteralString("GLSL.std.450".to_owned())],
    ));

    output.memory_model = Some(dr::Instruction::new(
        Op::MemoryModel,
        None,
        None,
        vec![
            Operand::AddressingModel(AddressingModel::Logical),
            Operand::MemoryModel(MemoryModel::GLSL450),
        ],
    ));

    for entry_point in &module.entry_points {
        let operands = [
            Operand::ExecutionModel(entry_point.model),
            Operand::IdRef(entry_point.function.0),
            Operand::LiteralString(entry_point.name.clone()),
        ]
        .into_iter()
        .chain(entry_point.interface.iter().map(|id| Operand::IdRef(id.0)))
        .collect();

        output
            .entry_points
            .push(dr::Instruction::new(Op::EntryPoint, None, None, operands));

        if entry_point.model == ExecutionModel::Fragment {
            output.execution_modes.push(dr::Instruction::new(
                Op::ExecutionMode,
                None,
                None,
                vec![
                    Operand::IdRef(entry_point.function.0),
                    Operand::ExecutionMode(ExecutionMode::OriginUpperLeft),
                ],
            ));
        }
    }

    output.debug_names = instructions(&module.debug_names.instructions);
    output.annotations = instructions(&module.annotations.instructions);
    output.types_global_values = instructions(&module.declarations.instructions);

    for function in &module.functions {
        let blocks = function
            .blocks
            .iter()
            .map(|block| dr::Block {
                label: Some(dr::Instruction::new(Op::Label, None, Some(block.label.0), vec![])),
                instructions: instructions(&block.instructions),
            })
            .collect();

        output.functions.push(dr::Function {
            def: Some(dr::Instruction::new(
                Op::Function,
                Some(function.return_type.0),
                Some(function.id.0),
                vec![
                    Operand::FunctionControl(FunctionControl::NONE),
                    Operand::IdRef(function.function_type.0),
                ],
            )),
            end: Some(dr::Instruction::new(Op::FunctionEnd, None, None, vec![])),
            parameters: instructions(&function.parameters),
            blocks,
        });
    }

    output
}

pub fn write_module(module: &Module) -> Vec<u32> {
    to_data_representation(module).assemble()
}

/// Little-endian byte image of a word stream
pub fn to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|word| word.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use rspirv::{binary::parse_words, dr::Loader, spirv::MAGIC_NUMBER};

    use super::*;
    use crate::middle::{
        ir::{
            Section,
            builder::{ModuleBuilder, ShortCircuit},
        },
        ty::Type,
    };

    fn trivial_module() -> Module {
        let mut builder = ModuleBuilder::new(ShortCircuit::Select);
        let function = builder.define_function(Some("main"), &Type::VOID);
        builder.enter_function_entry_block();

        let mut body = Section::default();
        builder.leave_block_and_return(&mut body, None);
        builder.leave_function(body);
        builder.add_entry_point("main", ExecutionModel::Fragment, function, Vec::new());

        builder.finish()
    }

    fn load(words: &[u32]) -> dr::Module {
        let mut loader = Loader::new();
        parse_words(words, &mut loader).expect("module should parse");
        loader.module()
    }

    #[test]
    fn header_is_written_first() {
        let module = trivial_module();
        let words = write_module(&module);

        assert_eq!(words[0], MAGIC_NUMBER);
        assert_eq!(words[1], 0x0001_0000);
        assert_eq!(words[3], module.id_bound);
        assert_eq!(to_bytes(&words[..1]), vec![0x03, 0x02, 0x23, 0x07]);
    }

    #[test]
    fn written_module_loads_back() {
        let loaded = load(&write_module(&trivial_module()));

        assert_eq!(loaded.capabilities.len(), 1);
        assert_eq!(loaded.ext_inst_imports.len(), 1);
        assert_eq!(loaded.execution_modes.len(), 1);

        let entry_point = &loaded.entry_points[0];
        assert_eq!(
            entry_point.operands[0],
            Operand::ExecutionModel(ExecutionModel::Fragment)
        );
        assert_eq!(
            entry_point.operands[2],
            Operand::LiteralString("main".to_owned())
        );

        let function = &loaded.functions[0];
        assert_eq!(function.blocks.len(), 1);
        assert_eq!(
            function.blocks[0].instructions.last().map(|i| i.class.opcode),
            Some(Op::Return)
        );
    }
}
