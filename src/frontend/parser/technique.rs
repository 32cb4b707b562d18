use log::trace;

use super::{ParseResult, Parser, Reported};
use crate::{
    frontend::lexer::{Keyword, Location, TokenKind},
    middle::{
        effect::{PassInfo, TechniqueInfo},
        ir::{BuiltIn, Decoration, ExecutionModel, Id, Instruction, Op, Section, StorageClass},
        symbol::{FunctionIndex, StructMember, SymbolKind},
        ty::{Qualifiers, Type},
    },
};

/// Enumeration names accepted as pass state values
const PASS_STATE_VALUES: &[(&str, u32)] = &[
    ("NONE", 0),
    ("ZERO", 0),
    ("ONE", 1),
    ("SRCCOLOR", 2),
    ("SRCALPHA", 3),
    ("INVSRCCOLOR", 4),
    ("INVSRCALPHA", 5),
    ("DESTCOLOR", 8),
    ("DESTALPHA", 6),
    ("INVDESTCOLOR", 9),
    ("INVDESTALPHA", 7),
    ("ADD", 1),
    ("SUBTRACT", 2),
    ("REVSUBTRACT", 3),
    ("MIN", 4),
    ("MAX", 5),
    ("KEEP", 1),
    ("REPLACE", 3),
    ("INVERT", 6),
    ("INCR", 7),
    ("INCRSAT", 4),
    ("DECR", 8),
    ("DECRSAT", 5),
    ("NEVER", 1),
    ("ALWAYS", 8),
    ("LESS", 2),
    ("GREATER", 5),
    ("LEQUAL", 4),
    ("LESSEQUAL", 4),
    ("GEQUAL", 7),
    ("GREATEREQUAL", 7),
    ("EQUAL", 3),
    ("NEQUAL", 6),
    ("NOTEQUAL", 6),
];

const MAX_RENDER_TARGETS: usize = 8;

/// Index of a `RenderTarget` or `RenderTarget0` to `RenderTarget7` state
fn render_target_index(state: &str) -> Option<usize> {
    match state.strip_prefix("RenderTarget")? {
        "" => Some(0),
        suffix => suffix
            .parse::<usize>()
            .ok()
            .filter(|index| suffix.len() == 1 && *index < MAX_RENDER_TARGETS),
    }
}

impl Parser<'_> {
    /// `technique name <annotations> { passes }` after the keyword
    pub(super) fn parse_technique(&mut self) -> ParseResult<()> {
        let name = self.expect_identifier()?;
        let annotations = self.parse_annotations()?;

        self.expect(TokenKind::OpenBrace)?;

        let mut technique = TechniqueInfo {
            name,
            annotations,
            passes: Vec::new(),
        };

        while !self.peek(TokenKind::CloseBrace) {
            match self.parse_pass() {
                Ok(pass) => technique.passes.push(pass),
                // Resume at the next pass if there is one
                Err(reported) if !self.peek_keyword(Keyword::Pass) => return Err(reported),
                Err(_) => {}
            }
        }

        self.expect(TokenKind::CloseBrace)?;

        trace!(
            "technique '{}' with {} passes",
            technique.name,
            technique.passes.len()
        );

        self.effect.techniques.push(technique);

        Ok(())
    }

    fn parse_pass(&mut self) -> ParseResult<PassInfo> {
        self.expect_keyword(Keyword::Pass)?;

        let mut pass = PassInfo::default();

        if self.accept(TokenKind::Identifier) {
            pass.name = self.token_text();
        }

        self.expect(TokenKind::OpenBrace)?;

        while !self.peek(TokenKind::CloseBrace) {
            if let Err(reported) = self.parse_pass_state(&mut pass) {
                self.consume_until(TokenKind::CloseBrace);
                return Err(reported);
            }
        }

        self.expect(TokenKind::CloseBrace)?;

        Ok(pass)
    }

    fn parse_pass_state(&mut self, pass: &mut PassInfo) -> ParseResult<()> {
        let state = self.expect_identifier()?;
        let location = self.token.location;

        self.expect(TokenKind::Equals)?;

        let stage = match state.as_str() {
            "VertexShader" => Some(ExecutionModel::Vertex),
            "PixelShader" => Some(ExecutionModel::Fragment),
            _ => None,
        };

        if let Some(stage) = stage {
            let function = self.parse_function_reference()?;
            let entry_point = self.define_entry_point(function, stage, location);

            match stage {
                ExecutionModel::Vertex => pass.vertex_shader = Some(entry_point),
                ExecutionModel::Fragment => pass.pixel_shader = Some(entry_point),
            }

            return self.expect(TokenKind::Semicolon);
        }

        if let Some(index) = render_target_index(&state) {
            pass.render_targets[index] = Some(self.parse_texture_reference()?);
            return self.expect(TokenKind::Semicolon);
        }

        let value = self.parse_state_value(PASS_STATE_VALUES)?;
        let value = self.literal_uint(&value, "pass state value must be a literal scalar expression")?;

        match state.as_str() {
            "SRGBWriteEnable" => pass.srgb_write_enable = value != 0,
            "BlendEnable" => pass.blend_enable = value != 0,
            "StencilEnable" => pass.stencil_enable = value != 0,
            "ClearRenderTargets" => pass.clear_render_targets = value != 0,
            "RenderTargetWriteMask" | "ColorWriteMask" => pass.color_write_mask = value & 0xFF,
            "StencilReadMask" | "StencilMask" => pass.stencil_read_mask = value & 0xFF,
            "StencilWriteMask" => pass.stencil_write_mask = value & 0xFF,
            "BlendOp" => pass.blend_op = value,
            "BlendOpAlpha" => pass.blend_op_alpha = value,
            "SrcBlend" => pass.src_blend = value,
            "SrcBlendAlpha" => pass.src_blend_alpha = value,
            "DestBlend" => pass.dest_blend = value,
            "DestBlendAlpha" => pass.dest_blend_alpha = value,
            "StencilFunc" => pass.stencil_comparison_func = value,
            "StencilRef" => pass.stencil_reference_value = value,
            "StencilPass" | "StencilPassOp" => pass.stencil_op_pass = value,
            "StencilFail" | "StencilFailOp" => pass.stencil_op_fail = value,
            "StencilZFail" | "StencilDepthFail" | "StencilDepthFailOp" => {
                pass.stencil_op_depth_fail = value
            }
            _ => {
                return Err(report_error!(
                    self,
                    location,
                    3004,
                    "unrecognized pass state '{state}'"
                ));
            }
        }

        self.expect(TokenKind::Semicolon)
    }

    fn parse_function_reference(&mut self) -> ParseResult<FunctionIndex> {
        let (name, exclusive) = self.parse_qualified_identifier()?;
        let location = self.token.location;

        let Some(symbol) = self.lookup(&name, exclusive) else {
            return Err(report_error!(
                self,
                location,
                3004,
                "undeclared identifier '{name}', expected function name"
            ));
        };

        match symbol.kind {
            SymbolKind::Function(Some(index)) => Ok(index),
            // The declaration failed and was reported already
            SymbolKind::Function(None) => Err(Reported),
            _ => Err(report_error!(
                self,
                location,
                3020,
                "type mismatch, expected function name"
            )),
        }
    }

    /// Name of the texture a render target state refers to
    fn parse_texture_reference(&mut self) -> ParseResult<String> {
        let (name, exclusive) = self.parse_qualified_identifier()?;
        let location = self.token.location;

        let Some(symbol) = self.lookup(&name, exclusive) else {
            return Err(report_error!(
                self,
                location,
                3004,
                "undeclared identifier '{name}', expected texture name"
            ));
        };

        if !symbol.ty.is_texture() {
            return Err(report_error!(
                self,
                location,
                3020,
                "type mismatch, expected texture name"
            ));
        }

        Ok(self
            .effect
            .texture(symbol.id)
            .map(|texture| texture.name.clone())
            .unwrap_or(name))
    }

    /* Semantics and entry points */

    /// Built-in variable or interface location a semantic binds to. Semantics
    /// without an explicit index are assigned locations from 10 upwards, in
    /// order of first use.
    pub(super) fn semantic_binding(&mut self, semantic: &str) -> (Option<BuiltIn>, u32) {
        match semantic {
            "SV_POSITION" => return (Some(BuiltIn::Position), 0),
            "SV_POINTSIZE" => return (Some(BuiltIn::PointSize), 0),
            "SV_DEPTH" => return (Some(BuiltIn::FragDepth), 0),
            "VERTEXID" | "SV_VERTEXID" => return (Some(BuiltIn::VertexId), 0),
            _ => {}
        }

        for prefix in ["SV_TARGET", "TEXCOORD"] {
            if let Some(index) = semantic.strip_prefix(prefix) {
                if let Ok(index) = index.parse::<u32>() {
                    return (None, index);
                }

                if index.is_empty() {
                    return (None, 0);
                }
            }
        }

        let next = 10 + self.semantic_locations.len() as u32;
        let location = *self
            .semantic_locations
            .entry(semantic.to_owned())
            .or_insert(next);

        (None, location)
    }

    /// Wraps a function in a parameterless entry point for one stage. The
    /// wrapper loads the stage inputs, calls the function and stores its
    /// results to the stage outputs. Created once per function and stage.
    fn define_entry_point(
        &mut self,
        index: FunctionIndex,
        model: ExecutionModel,
        location: Location,
    ) -> Id {
        let info = self.functions[index].clone();

        let cached = match model {
            ExecutionModel::Vertex => info.vertex_entry_point,
            ExecutionModel::Fragment => info.fragment_entry_point,
        };

        if let Some(wrapper) = cached {
            return wrapper;
        }

        let is_fragment = model == ExecutionModel::Fragment;

        let wrapper = self.builder.define_function(None, &Type::VOID);
        self.builder.enter_function_entry_block();

        let mut section = Section::default();
        let mut interface = Vec::new();
        let mut arguments = Vec::new();
        let mut outputs = Vec::new();

        for parameter in &info.parameters {
            let value_type = parameter.ty.unqualified();
            let temporary = self.builder.define_variable(
                None,
                &value_type,
                StorageClass::Function,
                None,
                location,
            );

            arguments.push(temporary);

            let members = self.interface_members(parameter);

            if parameter.ty.has(Qualifiers::OUT) {
                let variables = members
                    .iter()
                    .map(|member| {
                        let variable = self.define_interface_variable(
                            member,
                            StorageClass::Output,
                            is_fragment,
                            &mut interface,
                        );
                        (variable, member.ty.unqualified())
                    })
                    .collect::<Vec<_>>();

                outputs.push((temporary, value_type, variables));
                continue;
            }

            let mut values = Vec::new();

            for member in &members {
                let variable = self.define_interface_variable(
                    member,
                    StorageClass::Input,
                    is_fragment,
                    &mut interface,
                );

                let member_type = member.ty.unqualified();
                let value = self
                    .builder
                    .emit(&mut section, Op::Load, &member_type, [variable]);

                values.push(value);
            }

            let value = match value_type.is_struct() {
                true => self
                    .builder
                    .emit(&mut section, Op::CompositeConstruct, &value_type, values),
                false => values[0],
            };

            self.builder.emit_void(
                &mut section,
                Instruction::new(Op::Store).add(temporary).add(value),
            );
        }

        let result = self.builder.emit(
            &mut section,
            Op::FunctionCall,
            &info.return_type,
            std::iter::once(info.definition).chain(arguments),
        );

        for (temporary, value_type, variables) in outputs {
            let value = self
                .builder
                .emit(&mut section, Op::Load, &value_type, [temporary]);

            self.store_outputs(&mut section, value, &value_type, &variables);
        }

        if !info.return_type.is_void() {
            let return_value = StructMember {
                ty: info.return_type,
                semantic: info.return_semantic.clone(),
                builtin: info.return_builtin,
                semantic_index: info.return_semantic_index,
                location,
                ..Default::default()
            };

            let variables = self
                .interface_members(&return_value)
                .iter()
                .map(|member| {
                    let variable = self.define_interface_variable(
                        member,
                        StorageClass::Output,
                        is_fragment,
                        &mut interface,
                    );
                    (variable, member.ty.unqualified())
                })
                .collect::<Vec<_>>();

            self.store_outputs(&mut section, result, &info.return_type, &variables);
        }

        self.builder.leave_block_and_return(&mut section, None);
        self.builder.leave_function(section);
        self.builder
            .add_entry_point(&info.name, model, wrapper, interface);

        let info = &mut self.functions[index];
        match model {
            ExecutionModel::Vertex => info.vertex_entry_point = Some(wrapper),
            ExecutionModel::Fragment => info.fragment_entry_point = Some(wrapper),
        }

        trace!("synthesized {model:?} entry point for '{}'", info.name);

        wrapper
    }

    /// Struct values are passed through one interface variable per member
    fn interface_members(&self, value: &StructMember) -> Vec<StructMember> {
        if !value.ty.is_struct() {
            return vec![value.clone()];
        }

        value
            .ty
            .definition
            .and_then(|definition| self.struct_info(definition))
            .map(|info| info.members.clone())
            .unwrap_or_default()
    }

    fn store_outputs(
        &mut self,
        section: &mut Section,
        value: Id,
        ty: &Type,
        variables: &[(Id, Type)],
    ) {
        if !ty.is_struct() {
            if let Some((variable, _)) = variables.first() {
                self.builder.emit_void(
                    section,
                    Instruction::new(Op::Store).add(*variable).add(value),
                );
            }

            return;
        }

        for (member, (variable, member_type)) in variables.iter().enumerate() {
            let extracted = self
                .builder
                .emit_extract(section, member_type, value, [member as u32]);

            self.builder.emit_void(
                section,
                Instruction::new(Op::Store).add(*variable).add(extracted),
            );
        }
    }

    fn define_interface_variable(
        &mut self,
        member: &StructMember,
        storage: StorageClass,
        is_fragment: bool,
        interface: &mut Vec<Id>,
    ) -> Id {
        let ty = member.ty.unqualified();
        let is_fragment_input = is_fragment && storage == StorageClass::Input;

        let variable = self
            .builder
            .define_variable(None, &ty, storage, None, member.location);

        match member.builtin {
            // The position output of the vertex stage is the fragment coordinate
            Some(BuiltIn::Position) if is_fragment_input => {
                self.builder.add_builtin(variable, BuiltIn::FragCoord)
            }
            Some(builtin) => self.builder.add_builtin(variable, builtin),
            None => self.builder.add_decoration(
                variable,
                Decoration::Location,
                &[member.semantic_index],
            ),
        }

        if member.ty.has(Qualifiers::NOPERSPECTIVE) {
            self.builder
                .add_decoration(variable, Decoration::NoPerspective, &[]);
        }

        if member.ty.has(Qualifiers::CENTROID) {
            self.builder.add_decoration(variable, Decoration::Centroid, &[]);
        }

        // Integer inputs of the fragment stage cannot be interpolated
        if member.ty.has(Qualifiers::NOINTERPOLATION)
            || (is_fragment_input && member.builtin.is_none() && ty.is_integral())
        {
            self.builder.add_decoration(variable, Decoration::Flat, &[]);
        }

        interface.push(variable);
        variable
    }
}
