use itertools::Itertools;
use log::trace;

use super::{ParseResult, Parser, Reported};
use crate::{
    frontend::lexer::{Location, TokenKind},
    middle::{
        constant::Constant,
        effect::{
            Annotation, Annotations, SamplerInfo, TextureInfo, UniformInfo, VariableProperties,
        },
        expression::{Expression, ExpressionKind},
        ir::{Id, Section, StorageClass},
        symbol::{FunctionInfo, StructInfo, StructMember, Symbol, SymbolKind},
        ty::{BaseKind, Qualifiers, Type},
    },
};

/// Enumeration names accepted as texture and sampler property values
const PROPERTY_VALUES: &[(&str, u32)] = &[
    ("NONE", 0),
    ("POINT", 0),
    ("LINEAR", 1),
    ("ANISOTROPIC", 3),
    ("WRAP", 1),
    ("REPEAT", 1),
    ("MIRROR", 2),
    ("CLAMP", 3),
    ("BORDER", 4),
    ("R8", 1),
    ("R16F", 2),
    ("R32F", 3),
    ("RG8", 4),
    ("R8G8", 4),
    ("RG16", 5),
    ("R16G16", 5),
    ("RG16F", 6),
    ("R16G16F", 6),
    ("RG32F", 7),
    ("R32G32F", 7),
    ("RGBA8", 8),
    ("R8G8B8A8", 8),
    ("RGBA16", 9),
    ("R16G16B16A16", 9),
    ("RGBA16F", 10),
    ("R16G16B16A16F", 10),
    ("RGBA32F", 11),
    ("R32G32B32A32F", 11),
    ("DXT1", 12),
    ("DXT3", 13),
    ("DXT4", 14),
    ("LATC1", 15),
    ("LATC2", 16),
];

/// All components zero, with one element per array entry
fn zero_constant(ty: &Type) -> Constant {
    let mut value = Constant::default();

    if ty.array_length > 0 {
        value.array = vec![Constant::default(); ty.array_length as usize];
    }

    value
}

impl Parser<'_> {
    /* Structs */

    /// `struct [name] { members };` after the `struct` keyword. The trailing
    /// semicolon is left to the caller.
    pub(super) fn parse_struct(&mut self) -> ParseResult<()> {
        let location = self.token.location;

        let name = match self.accept(TokenKind::Identifier) {
            true => self.token_text(),
            false => format!("__anonymous_struct_{}_{}", location.line, location.column),
        };

        let unique_name = self.unique_name('S', &name);

        self.expect(TokenKind::OpenBrace)?;

        let mut members = Vec::new();

        while !self.peek(TokenKind::CloseBrace) {
            let Some(ty) = self.parse_type()? else {
                return Err(report_error!(
                    self,
                    self.next.location,
                    3000,
                    "syntax error: unexpected '{}', expected struct member type",
                    self.next.kind
                ));
            };

            if ty.is_void() {
                return Err(report_error!(
                    self,
                    self.next.location,
                    3038,
                    "struct members cannot be void"
                ));
            }

            if ty.has(Qualifiers::IN) || ty.has(Qualifiers::OUT) {
                return Err(report_error!(
                    self,
                    self.next.location,
                    3055,
                    "struct members cannot be declared 'in' or 'out'"
                ));
            }

            if ty.is_struct() {
                return Err(report_error!(
                    self,
                    self.next.location,
                    3090,
                    "nested struct members are not supported"
                ));
            }

            loop {
                let name = self.expect_identifier()?;
                let location = self.token.location;

                let mut member = StructMember {
                    name,
                    ty,
                    location,
                    ..Default::default()
                };

                self.parse_array_size(&mut member.ty)?;

                if self.accept(TokenKind::Colon) {
                    self.parse_semantic(&mut member)?;
                }

                members.push(member);

                if !self.accept(TokenKind::Comma) {
                    break;
                }
            }

            self.expect(TokenKind::Semicolon)?;
        }

        if members.is_empty() {
            report_warning!(self, location, 5001, "struct has no members");
        }

        let definition = self.builder.make_id();
        let fields = members
            .iter()
            .map(|member| (member.name.clone(), member.ty))
            .collect_vec();

        self.builder.define_struct(definition, &unique_name, &fields);

        trace!("defined struct '{name}' ({unique_name}) with {} members", members.len());

        self.structs.push(StructInfo {
            definition,
            members,
        });

        let symbol = Symbol {
            kind: SymbolKind::Struct,
            id: definition,
            ty: Type::structure(definition),
        };

        if !self.symbols.insert(&name, symbol, true) {
            return Err(report_error!(
                self,
                location,
                3003,
                "redefinition of '{name}'"
            ));
        }

        self.expect(TokenKind::CloseBrace)
    }

    /// `: SEMANTIC` after the colon
    fn parse_semantic(&mut self, member: &mut StructMember) -> ParseResult<()> {
        let semantic = self.expect_identifier()?.to_uppercase();
        let (builtin, index) = self.semantic_binding(&semantic);

        member.semantic = semantic;
        member.builtin = builtin;
        member.semantic_index = index;

        Ok(())
    }

    /* Functions */

    /// Function definition following its return type and name. Parameter and
    /// body errors both skip the whole definition.
    pub(super) fn parse_function(
        &mut self,
        return_type: Type,
        name: String,
        location: Location,
    ) -> ParseResult<()> {
        let signature = self.parse_function_signature(return_type);

        let (parameters, return_semantic) = match signature {
            Ok(signature) => signature,
            Err(reported) => {
                self.skip_function_body();
                self.insert_function_placeholder(&name);
                return Err(reported);
            }
        };

        let parameter_types = parameters.iter().map(|p| p.ty).collect_vec();

        if self
            .symbols
            .find_exact_overload(&name, &parameter_types, &self.functions)
            .is_some()
        {
            self.skip_function_body();
            return Err(report_error!(
                self,
                location,
                3003,
                "redefinition of '{name}'"
            ));
        }

        let unique_name = self.unique_name('F', &name);
        let definition = self.builder.define_function(Some(&unique_name), &return_type);

        trace!("defining function '{name}' ({unique_name})");

        let index = self.functions.push(FunctionInfo {
            name: name.clone(),
            definition,
            return_type,
            return_semantic: return_semantic.semantic,
            return_builtin: return_semantic.builtin,
            return_semantic_index: return_semantic.semantic_index,
            parameters: parameters.clone(),
            vertex_entry_point: None,
            fragment_entry_point: None,
        });

        // Registered before the body so recursive calls resolve to it
        let symbol = Symbol {
            kind: SymbolKind::Function(Some(index)),
            id: definition,
            ty: Self::function_type(definition),
        };
        self.symbols.insert(&name, symbol, true);

        self.symbols.enter_scope();
        self.current_function = Some(index);

        let mut result = Ok(());

        for parameter in &parameters {
            let id = self
                .builder
                .define_parameter(&parameter.name, &parameter.ty, parameter.location);

            let symbol = Symbol {
                kind: SymbolKind::Variable(StorageClass::Function),
                id,
                ty: Type {
                    is_pointer: false,
                    ..parameter.ty
                },
            };

            if !self.symbols.insert(&parameter.name, symbol, false) {
                result = Err(report_error!(
                    self,
                    parameter.location,
                    3003,
                    "redefinition of '{}'",
                    parameter.name
                ));
            }
        }

        let mut body = Section::default();
        self.builder.enter_function_entry_block();

        if let Err(reported) = self.parse_statement_block(&mut body, false) {
            result = Err(reported);
        }

        // Close the last block with an implicit return
        if let Some(block) = self.builder.current_block() {
            if return_type.is_void() {
                self.builder.leave_block_and_return(&mut body, None);
            } else {
                if self.builder.is_reachable(block) && result.is_ok() {
                    result = Err(report_error!(
                        self,
                        self.token.location,
                        3080,
                        "function must return a value"
                    ));
                }

                self.builder.leave_block_and_unreachable(&mut body);
            }
        }

        self.builder.leave_function(body);
        self.symbols.leave_scope();
        self.current_function = None;

        result
    }

    /// Parameter list and return semantic. The opening parenthesis is next.
    fn parse_function_signature(
        &mut self,
        return_type: Type,
    ) -> ParseResult<(Vec<StructMember>, StructMember)> {
        let location = self.next.location;
        self.expect(TokenKind::OpenParen)?;

        if !return_type.qualifiers.is_empty() {
            return Err(report_error!(
                self,
                location,
                3047,
                "function return type cannot have any qualifiers"
            ));
        }

        let mut parameters: Vec<StructMember> = Vec::new();

        while !self.peek(TokenKind::CloseParen) {
            if !parameters.is_empty() {
                self.expect(TokenKind::Comma)?;
            }

            parameters.push(self.parse_parameter()?);
        }

        self.expect(TokenKind::CloseParen)?;

        let mut return_semantic = StructMember {
            ty: return_type,
            ..Default::default()
        };

        if self.accept(TokenKind::Colon) {
            let location = self.next.location;
            self.parse_semantic(&mut return_semantic)?;

            if return_type.is_void() {
                return Err(report_error!(
                    self,
                    location,
                    3076,
                    "void function cannot have a semantic"
                ));
            }
        }

        if !self.peek(TokenKind::OpenBrace) {
            self.expect(TokenKind::OpenBrace)?;
        }

        Ok((parameters, return_semantic))
    }

    fn parse_parameter(&mut self) -> ParseResult<StructMember> {
        let Some(mut ty) = self.parse_type()? else {
            return Err(report_error!(
                self,
                self.next.location,
                3000,
                "syntax error: unexpected '{}', expected parameter type",
                self.next.kind
            ));
        };

        let name = self.expect_identifier()?;
        let location = self.token.location;

        if ty.is_void() {
            return Err(report_error!(
                self,
                location,
                3038,
                "function parameters cannot be void"
            ));
        }

        if ty.has(Qualifiers::EXTERN) {
            return Err(report_error!(
                self,
                location,
                3006,
                "function parameters cannot be declared 'extern'"
            ));
        }

        if ty.has(Qualifiers::STATIC) {
            return Err(report_error!(
                self,
                location,
                3007,
                "function parameters cannot be declared 'static'"
            ));
        }

        if ty.has(Qualifiers::UNIFORM) {
            return Err(report_error!(
                self,
                location,
                3047,
                "function parameters cannot be declared 'uniform', consider placing in global scope instead"
            ));
        }

        if ty.has(Qualifiers::OUT) && ty.has(Qualifiers::CONST) {
            return Err(report_error!(
                self,
                location,
                3046,
                "output parameters cannot be declared 'const'"
            ));
        }

        // Parameters are implicitly 'in' unless declared 'out'
        if !ty.has(Qualifiers::OUT) {
            ty.qualifiers |= Qualifiers::IN;
        }

        self.parse_array_size(&mut ty)?;
        ty.is_pointer = true;

        let mut parameter = StructMember {
            name,
            ty,
            location,
            ..Default::default()
        };

        if self.accept(TokenKind::Colon) {
            self.parse_semantic(&mut parameter)?;
        }

        Ok(parameter)
    }

    /// Skips up to and including the body of a function whose signature
    /// failed to parse
    fn skip_function_body(&mut self) {
        while !self.peek(TokenKind::OpenBrace)
            && !self.peek(TokenKind::Semicolon)
            && !self.peek(TokenKind::EndOfFile)
        {
            self.consume();
        }

        if self.accept(TokenKind::OpenBrace) {
            self.skip_block();
        } else {
            self.accept(TokenKind::Semicolon);
        }
    }

    fn insert_function_placeholder(&mut self, name: &str) {
        if self.lookup(name, false).is_some() {
            return;
        }

        let symbol = Symbol {
            kind: SymbolKind::Function(None),
            id: Id::PLACEHOLDER,
            ty: Self::function_type(Id::PLACEHOLDER),
        };

        self.symbols.insert(name, symbol, true);
    }

    /* Variables */

    /// A single variable declarator: array size, semantic, annotations,
    /// initializer or property block. `section` receives the code of dynamic
    /// initializers of local variables.
    pub(super) fn parse_variable(
        &mut self,
        mut ty: Type,
        name: &str,
        location: Location,
        global: bool,
        section: Option<&mut Section>,
    ) -> ParseResult<()> {
        let mut scratch = Section::default();
        let section = match section {
            Some(section) => section,
            None => &mut scratch,
        };

        if ty.is_void() {
            return Err(report_error!(self, location, 3038, "variables cannot be void"));
        }

        if ty.has(Qualifiers::IN) || ty.has(Qualifiers::OUT) {
            return Err(report_error!(
                self,
                location,
                3055,
                "variables cannot be declared 'in' or 'out'"
            ));
        }

        if global {
            self.check_global_qualifiers(&mut ty, location)?;
        } else {
            self.check_local_qualifiers(&ty, location)?;
        }

        self.parse_array_size(&mut ty)?;

        let unique_name = match (global, ty.has(Qualifiers::UNIFORM)) {
            (true, true) => self.unique_name('U', name),
            (true, false) => self.unique_name('V', name),
            (false, _) => name.to_owned(),
        };

        let mut semantic = String::new();
        let mut annotations = Annotations::new();
        let mut initializer: Option<Expression> = None;
        let mut properties = VariableProperties::default();

        if self.accept(TokenKind::Colon) {
            semantic = self.expect_identifier()?.to_uppercase();

            if !global {
                return Err(report_error!(
                    self,
                    self.token.location,
                    3043,
                    "local variables cannot have semantics"
                ));
            }
        } else {
            if global {
                annotations = self.parse_annotations()?;
            }

            if self.accept(TokenKind::Equals) {
                let value = self.parse_initializer(section, &mut ty, global)?;
                initializer = Some(value);
            } else if ty.is_numeric() {
                if ty.has(Qualifiers::CONST) {
                    return Err(report_error!(
                        self,
                        location,
                        3012,
                        "missing initial value for '{name}'"
                    ));
                }

                // Everything but uniforms starts out zeroed
                if !ty.has(Qualifiers::UNIFORM) {
                    initializer = Some(Expression::constant(ty, zero_constant(&ty), location));
                }
            } else if self.peek(TokenKind::OpenBrace) {
                properties = self.parse_variable_properties()?;
            }
        }

        let is_named_constant = ty.is_numeric()
            && ty.has(Qualifiers::CONST)
            && initializer.as_ref().is_some_and(Expression::is_constant);

        let symbol = if is_named_constant {
            let value = initializer
                .as_ref()
                .and_then(Expression::constant_value)
                .cloned()
                .unwrap_or_default();

            Symbol {
                kind: SymbolKind::Constant(value),
                id: Id::default(),
                ty,
            }
        } else if ty.is_texture() {
            let id = self.builder.make_id();

            self.effect.textures.push(TextureInfo {
                id,
                name: name.to_owned(),
                unique_name,
                semantic,
                width: properties.width,
                height: properties.height,
                levels: properties.levels,
                format: properties.format,
                annotations,
            });

            Symbol {
                kind: SymbolKind::Variable(StorageClass::UniformConstant),
                id,
                ty,
            }
        } else if ty.is_sampler() {
            let Some(texture) = properties.texture else {
                return Err(report_error!(
                    self,
                    location,
                    3012,
                    "missing 'Texture' property for '{name}'"
                ));
            };

            let texture_name = self
                .effect
                .texture(texture)
                .map(|texture| texture.name.clone())
                .unwrap_or_default();

            let id = self.builder.define_variable(
                Some(&unique_name),
                &ty,
                StorageClass::UniformConstant,
                None,
                location,
            );

            self.effect.samplers.push(SamplerInfo {
                id,
                name: name.to_owned(),
                unique_name,
                texture_name,
                address_u: properties.address_u,
                address_v: properties.address_v,
                address_w: properties.address_w,
                filter: properties.filter,
                srgb: properties.srgb,
                min_lod: properties.min_lod,
                max_lod: properties.max_lod,
                lod_bias: properties.lod_bias,
                annotations,
            });

            Symbol {
                kind: SymbolKind::Variable(StorageClass::UniformConstant),
                id,
                ty,
            }
        } else if ty.has(Qualifiers::UNIFORM) {
            // Booleans have no defined size in uniform storage
            if ty.is_boolean() {
                ty.base = BaseKind::Uint;
            }

            let (variable, member_index, offset) = self.add_uniform(name, &ty);
            let (size, _) = self.uniform_layout(&ty);

            self.effect.uniforms.push(UniformInfo {
                name: name.to_owned(),
                ty,
                member_index,
                offset,
                size,
                initializer: initializer.as_ref().and_then(Expression::constant_value).cloned(),
                annotations,
            });

            Symbol {
                kind: SymbolKind::UniformMember(member_index),
                id: variable,
                ty,
            }
        } else {
            let storage = match global {
                true => StorageClass::Private,
                false => StorageClass::Function,
            };

            let constant_initializer = match global {
                true => initializer
                    .as_ref()
                    .and_then(Expression::constant_value)
                    .map(|value| self.builder.convert_constant(&ty, value)),
                false => None,
            };

            let id = self.builder.define_variable(
                Some(&unique_name),
                &ty,
                storage,
                constant_initializer,
                location,
            );

            // Locals are initialized every time their declaration executes
            if let Some(initializer) = initializer.filter(|_| !global) {
                let value = self.builder.access_chain_load(section, &initializer);
                let variable = Expression::lvalue(id, storage, ty, location);
                self.builder.access_chain_store(section, &variable, value);
            }

            Symbol {
                kind: SymbolKind::Variable(storage),
                id,
                ty,
            }
        };

        if !self.symbols.insert(name, symbol, global) {
            return Err(report_error!(
                self,
                location,
                3003,
                "redefinition of '{name}'"
            ));
        }

        Ok(())
    }

    fn check_global_qualifiers(&mut self, ty: &mut Type, location: Location) -> ParseResult<()> {
        if ty.has(Qualifiers::STATIC) {
            if ty.has(Qualifiers::UNIFORM) {
                return Err(report_error!(
                    self,
                    location,
                    3007,
                    "uniform global variables cannot be declared 'static'"
                ));
            }

            return Ok(());
        }

        if !ty.has(Qualifiers::UNIFORM) && !ty.is_texture() && !ty.is_sampler() {
            report_warning!(
                self,
                location,
                5000,
                "global variables are considered 'uniform' by default"
            );
        }

        if ty.has(Qualifiers::CONST) {
            return Err(report_error!(
                self,
                location,
                3035,
                "variables which are 'uniform' cannot be declared 'const'"
            ));
        }

        // Globals which are not 'static' are always 'extern' and 'uniform'
        ty.qualifiers |= Qualifiers::EXTERN | Qualifiers::UNIFORM;

        Ok(())
    }

    fn check_local_qualifiers(&mut self, ty: &Type, location: Location) -> ParseResult<()> {
        if ty.has(Qualifiers::EXTERN) {
            return Err(report_error!(
                self,
                location,
                3006,
                "local variables cannot be declared 'extern'"
            ));
        }

        if ty.has(Qualifiers::UNIFORM) {
            return Err(report_error!(
                self,
                location,
                3047,
                "local variables cannot be declared 'uniform'"
            ));
        }

        if ty.is_texture() || ty.is_sampler() {
            return Err(report_error!(
                self,
                location,
                3038,
                "local variables cannot be textures or samplers"
            ));
        }

        Ok(())
    }

    /// Initializer expression after `=`, checked against and converted to the
    /// variable type. Unsized arrays take their length from it.
    fn parse_initializer(
        &mut self,
        section: &mut Section,
        ty: &mut Type,
        global: bool,
    ) -> ParseResult<Expression> {
        let mut value = self.parse_expression_assignment(section)?;

        if global && !value.is_constant() {
            return Err(report_error!(
                self,
                value.location,
                3011,
                "initial value must be a literal expression"
            ));
        }

        let length_mismatch = ty.array_length >= 0 && value.ty.array_length != ty.array_length;
        let element_rank = Type::rank(&value.ty.element().unqualified(), &ty.element().unqualified());

        if length_mismatch || element_rank == 0 {
            return Err(report_error!(
                self,
                value.location,
                3017,
                "initial value does not match variable type"
            ));
        }

        if (value.ty.rows < ty.rows || value.ty.cols < ty.cols) && !value.ty.is_scalar() {
            return Err(report_error!(
                self,
                value.location,
                3017,
                "cannot implicitly convert these vector types"
            ));
        }

        if value.ty.components() > ty.components() {
            report_warning!(
                self,
                value.location,
                3206,
                "implicit truncation of vector type"
            );
        }

        if value.ty.is_array() {
            ty.array_length = value.ty.array_length;
        }

        value.add_cast(*ty);

        Ok(value)
    }

    /* Annotations and properties */

    /// Optional `< [type] name = value; ... >` list
    pub(super) fn parse_annotations(&mut self) -> ParseResult<Annotations> {
        let mut annotations = Annotations::new();

        if !self.accept(TokenKind::LessThan) {
            return Ok(annotations);
        }

        let mut result = Ok(());

        while !self.peek(TokenKind::GreaterThan) {
            if self.accept_type_class()?.is_some() {
                report_warning!(
                    self,
                    self.token.location,
                    4717,
                    "type prefixes for annotations are deprecated and ignored"
                );
            }

            let name = self.expect_identifier()?;
            self.expect(TokenKind::Equals)?;

            let mut scratch = Section::default();
            let value = self.parse_expression_unary(&mut scratch)?;
            self.expect(TokenKind::Semicolon)?;

            // Keep going, the syntax is still intact
            let ExpressionKind::Constant(constant) = value.kind else {
                result = Err(report_error!(
                    self,
                    value.location,
                    3011,
                    "value must be a literal expression"
                ));
                continue;
            };

            annotations.insert(
                name,
                Annotation {
                    ty: value.ty,
                    value: constant,
                },
            );
        }

        self.expect(TokenKind::GreaterThan)?;

        result.map(|_| annotations)
    }

    /// `{ Name = value; ... }` block of a texture or sampler. On failure the
    /// rest of the block is skipped.
    fn parse_variable_properties(&mut self) -> ParseResult<VariableProperties> {
        self.expect(TokenKind::OpenBrace)?;

        let mut properties = VariableProperties::default();

        while !self.peek(TokenKind::CloseBrace) {
            if let Err(reported) = self.parse_variable_property(&mut properties) {
                self.consume_until(TokenKind::CloseBrace);
                return Err(reported);
            }
        }

        self.expect(TokenKind::CloseBrace)?;

        Ok(properties)
    }

    fn parse_variable_property(&mut self, properties: &mut VariableProperties) -> ParseResult<()> {
        let name = self.expect_identifier()?;
        let location = self.token.location;

        self.expect(TokenKind::Equals)?;

        let value = self.parse_state_value(PROPERTY_VALUES)?;

        if name == "Texture" {
            let texture = match value.kind {
                ExpressionKind::LValue(id, _) | ExpressionKind::RValue(id)
                    if value.ty.is_texture() =>
                {
                    id
                }
                _ => {
                    return Err(report_error!(
                        self,
                        location,
                        3020,
                        "type mismatch, expected texture name"
                    ));
                }
            };

            properties.texture = Some(texture);
            return self.expect(TokenKind::Semicolon);
        }

        let value = self.literal_uint(&value, "value must be a literal scalar expression")?;

        match name.as_str() {
            "Width" => properties.width = value.max(1),
            "Height" => properties.height = value.max(1),
            "MipLevels" => properties.levels = value.max(1),
            "Format" => properties.format = value,
            "SRGBTexture" | "SRGBReadEnable" => properties.srgb = value != 0,
            "AddressU" => properties.address_u = value,
            "AddressV" => properties.address_v = value,
            "AddressW" => properties.address_w = value,
            // Filter bits: min in 4..6, mag in 2..4, mip in 0..2
            "MinFilter" => properties.filter = (properties.filter & 0x0F) | ((value << 4) & 0x30),
            "MagFilter" => properties.filter = (properties.filter & 0x33) | ((value << 2) & 0x0C),
            "MipFilter" => properties.filter = (properties.filter & 0x3C) | (value & 0x03),
            "MinLOD" | "MaxMipLevel" => properties.min_lod = value as f32,
            "MaxLOD" => properties.max_lod = value as f32,
            "MipLODBias" | "MipMapLodBias" => properties.lod_bias = value as f32,
            _ => {
                return Err(report_error!(
                    self,
                    location,
                    3004,
                    "unrecognized property '{name}'"
                ));
            }
        }

        self.expect(TokenKind::Semicolon)
    }

    /// Value of a property or pass state: one of the enumeration names in
    /// `values` (case insensitive) or an expression
    pub(super) fn parse_state_value(&mut self, values: &[(&str, u32)]) -> ParseResult<Expression> {
        let checkpoint = self.backup();

        if self.accept(TokenKind::Identifier) {
            let name = self.token_text().to_uppercase();

            if let Some((_, value)) = values.iter().find(|(candidate, _)| *candidate == name) {
                return Ok(Expression::constant(
                    Type::UINT,
                    Constant::from_uint(*value),
                    self.token.location,
                ));
            }

            self.restore(checkpoint);
        }

        let mut scratch = Section::default();
        self.parse_expression_multary(&mut scratch, 0)
    }

    /// Unsigned value of a literal scalar expression
    pub(super) fn literal_uint(&mut self, value: &Expression, message: &str) -> ParseResult<u32> {
        if !value.is_constant() || !value.ty.is_scalar() {
            return Err(report_error!(self, value.location, 3011, "{message}"));
        }

        let mut value = value.clone();
        value.add_cast(Type::UINT);

        value
            .constant_value()
            .map(|constant| constant.as_uint(0))
            .ok_or(Reported)
    }
}
