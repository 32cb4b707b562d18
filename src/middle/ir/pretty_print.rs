use colored::Colorize;
use itertools::Itertools;

use super::{Function, Id, Instruction, Module, Operand};

/// Renders a module as a human readable listing
pub fn pretty_print_module(module: &Module) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "{} {} {}\n",
        "; id bound".bright_black(),
        module.id_bound,
        format!("(glsl.std.450 = {})", module.glsl_ext).bright_black()
    ));

    for entry_point in &module.entry_points {
        output.push_str(&format!(
            "{} {} {} {}({})\n",
            "entry".magenta(),
            format!("{:?}", entry_point.model).cyan(),
            entry_point.name.blue(),
            entry_point.function,
            entry_point.interface.iter().join(", ")
        ));
    }

    for section in [&module.debug_names, &module.annotations, &module.declarations] {
        if section.is_empty() {
            continue;
        }

        output.push('\n');
        for instruction in &section.instructions {
            output.push_str(&format!("{instruction}\n"));
        }
    }

    for function in &module.functions {
        output.push('\n');
        output.push_str(&pretty_print_function(module, function));
    }

    output
}

fn pretty_print_function(module: &Module, function: &Function) -> String {
    let name = function
        .name
        .clone()
        .or_else(|| module.name_of(function.id))
        .unwrap_or_else(|| function.id.to_string());

    let mut output = format!(
        "{} {}{}{}{} {} {}\n",
        "fn".magenta(),
        name.blue(),
        "(".white(),
        function
            .parameters
            .iter()
            .filter_map(|p| p.result)
            .join(", "),
        ")".white(),
        "->".white(),
        function.return_type
    );

    for block in &function.blocks {
        output.push_str(&format!("{}\n", format!("{}:", block.label).bright_red()));

        for instruction in &block.instructions {
            output.push_str(&format!("    {instruction}\n"));
        }
    }

    output
}

fn format_operand(operand: &Operand) -> String {
    match operand {
        Operand::IdRef(id) => Id(*id).to_string(),
        Operand::LiteralBit32(value) | Operand::LiteralExtInstInteger(value) => {
            value.to_string().purple().to_string()
        }
        Operand::LiteralString(string) => format!("\"{string}\"").green().to_string(),
        Operand::StorageClass(storage) => format!("{storage:?}"),
        Operand::Decoration(decoration) => format!("{decoration:?}"),
        Operand::BuiltIn(builtin) => format!("{builtin:?}"),
        Operand::LoopControl(control) => format!("{control:?}"),
        Operand::SelectionControl(control) => format!("{control:?}"),
        Operand::ImageOperands(operands) => format!("{operands:?}"),
        other => format!("{other:?}"),
    }
}

impl core::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(result) = self.result {
            write!(f, "{} {} ", result.to_string().yellow(), "=".white())?;
        }

        write!(f, "{}", format!("{:?}", self.op).cyan())?;

        if let Some(ty) = self.ty {
            write!(f, " {}", ty.to_string().bright_blue())?;
        }

        if !self.operands.is_empty() {
            write!(f, " {}", self.operands.iter().map(format_operand).join(" "))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::{
        ir::{
            Decoration, Op,
            builder::{ModuleBuilder, ShortCircuit},
        },
        ty::Type,
    };

    #[test]
    fn listing_contains_names_and_blocks() {
        colored::control::set_override(false);

        let mut builder = ModuleBuilder::new(ShortCircuit::Select);
        builder.define_function(Some("main"), &Type::VOID);
        builder.enter_function_entry_block();

        let mut body = super::super::Section::default();
        builder.leave_block_and_return(&mut body, None);
        builder.leave_function(body);

        let listing = pretty_print_module(&builder.finish());

        assert!(listing.contains("Name %3 \"main\""));
        assert!(listing.contains("fn main()"));
        assert!(listing.contains("%4:"));
        assert!(listing.contains("    Return"));
    }

    #[test]
    fn literal_operands_are_not_printed_as_ids() {
        colored::control::set_override(false);

        let instruction = Instruction::with_result(Op::CompositeExtract, Id(2), Id(5))
            .add(Id(4))
            .add_literal(1);
        assert_eq!(instruction.to_string(), "%5 = CompositeExtract %2 %4 1");

        let instruction = Instruction::new(Op::Decorate)
            .add(Id(7))
            .add_operand(Operand::Decoration(Decoration::Location))
            .add_literal(10);
        assert_eq!(instruction.to_string(), "Decorate %7 Location 10");
    }
}
