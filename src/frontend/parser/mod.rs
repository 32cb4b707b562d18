//! Single pass recursive descent parser.
//!
//! There is no syntax tree: every production type checks what it recognized
//! and emits IR through the [`ModuleBuilder`] right away. Productions return
//! [`ParseResult`], where the error case means a diagnostic has already been
//! appended, so failures propagate with `?` until a production which knows
//! how to resynchronize the token stream.

use hashbrown::{HashMap, HashSet};
use log::{debug, trace};

use crate::{
    frontend::{
        SourceFile,
        diagnostics::Diagnostics,
        lexer::{Keyword, Lexer, Literal, Location, Token, TokenKind},
    },
    index::IndexVec,
    middle::{
        effect::EffectInfo,
        ir::{
            Decoration, Id, Module, StorageClass,
            builder::{ModuleBuilder, ShortCircuit},
        },
        symbol::{
            FunctionIndex, FunctionInfo, Scope, StructInfo, Symbol, SymbolKind, SymbolTable,
        },
        ty::{BaseKind, Type},
    },
};

/// Marker for a failed production. The diagnostic describing the failure has
/// already been reported when this is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reported;

pub type ParseResult<T> = Result<T, Reported>;

macro_rules! report_error {
    ($self:expr, $location:expr, $code:expr, $($format:tt)+) => {{
        let location = $location;
        let message = format!($($format)+);

        #[cfg(feature = "error-backtrace")]
        log::debug!("X{} reported at {}:{} ({})", $code, file!(), line!(), module_path!());

        $self.diagnostics.error(location, $code, message);
        $crate::frontend::parser::Reported
    }};
}

macro_rules! report_warning {
    ($self:expr, $location:expr, $code:expr, $($format:tt)+) => {{
        let location = $location;
        let message = format!($($format)+);

        #[cfg(feature = "error-backtrace")]
        log::debug!("warning X{} reported at {}:{}", $code, file!(), line!());

        $self.diagnostics.warning(location, $code, message);
    }};
}

mod declaration;
mod expression;
mod statement;
mod technique;
mod types;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Copy, Default)]
pub struct ParserConfig {
    pub short_circuit: ShortCircuit,
}

/// Everything a parse produces. `success` is false as soon as a single error
/// was reported, warnings do not affect it.
#[derive(Debug)]
pub struct ParseOutput {
    pub success: bool,
    pub module: Module,
    pub effect: EffectInfo,
    pub structs: Vec<StructInfo>,
    pub functions: Vec<FunctionInfo>,
    pub diagnostics: Diagnostics,
}

/// Saved token stream position for speculative parses
#[derive(Debug, Clone)]
struct Checkpoint<'source> {
    lexer: Lexer<'source>,
    token: Token,
    next: Token,
}

/// Members of the implicit `$Globals` uniform block
#[derive(Debug, Default)]
struct UniformBlock {
    /// Struct type and variable, allocated with the first uniform
    ids: Option<(Id, Id)>,
    members: Vec<(String, Type)>,
    offsets: Vec<u32>,
    size: u32,
}

pub struct Parser<'source> {
    source: &'source SourceFile,
    lexer: Lexer<'source>,
    /// Last consumed token
    token: Token,
    /// Lookahead token
    next: Token,
    diagnostics: Diagnostics,
    symbols: SymbolTable,
    builder: ModuleBuilder,
    functions: IndexVec<FunctionIndex, FunctionInfo>,
    structs: Vec<StructInfo>,
    effect: EffectInfo,
    uniforms: UniformBlock,
    array_strides: HashSet<Id>,
    semantic_locations: HashMap<String, u32>,
    current_function: Option<FunctionIndex>,
    loop_break_targets: Vec<Id>,
    loop_continue_targets: Vec<Id>,
}

/// Parses a whole effect file
pub fn parse(source: &SourceFile, config: ParserConfig) -> ParseOutput {
    Parser::new(source, config).run()
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source SourceFile, config: ParserConfig) -> Self {
        let mut lexer = Lexer::new(source);
        let next = lexer.lex();

        Self {
            source,
            lexer,
            token: next.clone(),
            next,
            diagnostics: Diagnostics::new(source.origin.to_string()),
            symbols: SymbolTable::new(),
            builder: ModuleBuilder::new(config.short_circuit),
            functions: IndexVec::new(),
            structs: Vec::new(),
            effect: EffectInfo::default(),
            uniforms: UniformBlock::default(),
            array_strides: HashSet::new(),
            semantic_locations: HashMap::new(),
            current_function: None,
            loop_break_targets: Vec::new(),
            loop_continue_targets: Vec::new(),
        }
    }

    pub fn run(mut self) -> ParseOutput {
        while !self.peek(TokenKind::EndOfFile) {
            // Every top level production resynchronizes on its own
            let _ = self.parse_top_level();
        }

        self.finish_uniform_block();

        let module = self.builder.finish();

        debug!(
            "parsed {}: {} functions, {} uniforms, {} techniques, {} diagnostics",
            self.source.origin,
            module.functions.len(),
            self.effect.uniforms.len(),
            self.effect.techniques.len(),
            self.diagnostics.entries().len()
        );

        ParseOutput {
            success: !self.diagnostics.has_errors(),
            module,
            effect: self.effect,
            structs: self.structs,
            functions: self.functions.raw,
            diagnostics: self.diagnostics,
        }
    }

    /* Token management */

    fn peek(&self, kind: TokenKind) -> bool {
        self.next.kind == kind
    }

    fn peek_keyword(&self, keyword: Keyword) -> bool {
        self.peek(TokenKind::Keyword(keyword))
    }

    fn consume(&mut self) {
        let next = self.lexer.lex();
        self.token = std::mem::replace(&mut self.next, next);
    }

    fn accept(&mut self, kind: TokenKind) -> bool {
        if self.peek(kind) {
            self.consume();
            return true;
        }

        false
    }

    fn accept_keyword(&mut self, keyword: Keyword) -> bool {
        self.accept(TokenKind::Keyword(keyword))
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<()> {
        if self.accept(kind) {
            return Ok(());
        }

        Err(report_error!(
            self,
            self.next.location,
            3000,
            "syntax error: unexpected '{}', expected '{}'",
            self.next.kind,
            kind
        ))
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> ParseResult<()> {
        self.expect(TokenKind::Keyword(keyword))
    }

    fn expect_identifier(&mut self) -> ParseResult<String> {
        self.expect(TokenKind::Identifier)?;
        Ok(self.token_text())
    }

    /// Skips tokens until the given kind was consumed or the input ends
    fn consume_until(&mut self, kind: TokenKind) {
        while !self.accept(kind) {
            if self.peek(TokenKind::EndOfFile) {
                return;
            }

            self.consume();
        }
    }

    /// Skips a brace enclosed block including all nested blocks. Expects the
    /// opening brace to already be consumed.
    fn skip_block(&mut self) {
        let mut level = 0u32;

        while !self.peek(TokenKind::EndOfFile) {
            if self.accept(TokenKind::OpenBrace) {
                level += 1;
            } else if self.accept(TokenKind::CloseBrace) {
                if level == 0 {
                    return;
                }

                level -= 1;
            } else {
                self.consume();
            }
        }
    }

    fn backup(&self) -> Checkpoint<'source> {
        Checkpoint {
            lexer: self.lexer.clone(),
            token: self.token.clone(),
            next: self.next.clone(),
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint<'source>) {
        self.lexer = checkpoint.lexer;
        self.token = checkpoint.token;
        self.next = checkpoint.next;
    }

    /// Source text of the last consumed token
    fn token_text(&self) -> String {
        self.source.value_of_span(self.token.span).to_owned()
    }

    fn token_location(&self) -> Location {
        self.token.location
    }

    fn token_string(&self) -> String {
        match &self.token.literal {
            Literal::String(value) => value.clone(),
            _ => self.token_text(),
        }
    }

    /// `name`, `A::B::name` or `::name`. Returns the name and whether the
    /// lookup is restricted to the root scope.
    fn parse_qualified_identifier(&mut self) -> ParseResult<(String, bool)> {
        let exclusive = self.accept(TokenKind::DoubleColon);
        let mut name = self.expect_identifier()?;

        while self.accept(TokenKind::DoubleColon) {
            name.push_str("::");
            name.push_str(&self.expect_identifier()?);
        }

        Ok((name, exclusive))
    }

    fn lookup(&self, name: &str, exclusive: bool) -> Option<Symbol> {
        match exclusive {
            true => self.symbols.find_in(name, &Scope::root(), true).cloned(),
            false => self.symbols.find(name).cloned(),
        }
    }

    /// Name mangled with the current namespace path, prefixed by a letter
    /// describing what kind of entity it names
    fn unique_name(&self, prefix: char, name: &str) -> String {
        format!("{prefix}{}{name}", self.symbols.current_scope().name).replace(':', "_")
    }

    fn struct_info(&self, definition: Id) -> Option<&StructInfo> {
        self.structs.iter().find(|s| s.definition == definition)
    }

    /* Top level */

    fn parse_top_level(&mut self) -> ParseResult<()> {
        let location = self.next.location;

        if self.accept_keyword(Keyword::Namespace) {
            return self.parse_namespace();
        }

        if self.accept_keyword(Keyword::Struct) {
            let result = self.parse_struct().and_then(|_| self.expect(TokenKind::Semicolon));
            if result.is_err() {
                self.consume_until(TokenKind::CloseBrace);
                self.accept(TokenKind::Semicolon);
            }

            return result;
        }

        if self.accept_keyword(Keyword::Technique) {
            let result = self.parse_technique();
            if result.is_err() {
                self.consume_until(TokenKind::CloseBrace);
            }

            return result;
        }

        if let Some(ty) = self.parse_type()? {
            let name = match self.expect_identifier() {
                Ok(name) => name,
                Err(reported) => {
                    self.consume_until(TokenKind::Semicolon);
                    return Err(reported);
                }
            };

            if self.peek(TokenKind::OpenParen) {
                return self.parse_function(ty, name, location);
            }

            return self.parse_global_variables(ty, name);
        }

        // Stray semicolons are allowed
        if self.accept(TokenKind::Semicolon) {
            return Ok(());
        }

        let is_statement = matches!(
            self.next.kind,
            TokenKind::Keyword(
                Keyword::If
                    | Keyword::Switch
                    | Keyword::For
                    | Keyword::While
                    | Keyword::Do
                    | Keyword::Break
                    | Keyword::Continue
                    | Keyword::Return
                    | Keyword::Discard
            )
        );

        self.consume();

        if is_statement {
            return Err(report_error!(
                self,
                location,
                3000,
                "statements are valid only inside a code block"
            ));
        }

        Err(report_error!(
            self,
            location,
            3000,
            "syntax error: unexpected '{}'",
            self.token.kind
        ))
    }

    fn parse_namespace(&mut self) -> ParseResult<()> {
        let name = self.expect_identifier()?;
        self.expect(TokenKind::OpenBrace)?;

        trace!("entering namespace '{name}'");
        self.symbols.enter_namespace(&name);

        let mut result = Ok(());
        while !self.peek(TokenKind::CloseBrace) && !self.peek(TokenKind::EndOfFile) {
            if let Err(reported) = self.parse_top_level() {
                result = Err(reported);
            }
        }

        self.symbols.leave_namespace();

        self.expect(TokenKind::CloseBrace)?;
        result
    }

    /// Declarations following a type at the top level: `float a, b = 1;`
    fn parse_global_variables(&mut self, ty: Type, name: String) -> ParseResult<()> {
        let mut name = name;

        loop {
            let location = self.token_location();

            if let Err(reported) = self.parse_variable(ty, &name, location, true, None) {
                // Later references to the variable resolve to a placeholder
                // instead of reporting more errors
                self.insert_placeholder(&name, ty);
                self.consume_until(TokenKind::Semicolon);
                return Err(reported);
            }

            if !self.accept(TokenKind::Comma) {
                break;
            }

            name = match self.expect_identifier() {
                Ok(name) => name,
                Err(reported) => {
                    self.consume_until(TokenKind::Semicolon);
                    return Err(reported);
                }
            };
        }

        self.expect(TokenKind::Semicolon)
    }

    fn insert_placeholder(&mut self, name: &str, ty: Type) {
        if self.lookup(name, false).is_some() {
            return;
        }

        let symbol = Symbol {
            kind: SymbolKind::Variable(StorageClass::Private),
            id: Id::PLACEHOLDER,
            ty,
        };

        self.symbols.insert(name, symbol, true);
    }

    /* Global uniform block */

    /// Appends a member to `$Globals` and returns its index and byte offset
    fn add_uniform(&mut self, name: &str, ty: &Type) -> (Id, u32, u32) {
        let (_, variable) = *self.uniforms.ids.get_or_insert_with(|| {
            let struct_type = self.builder.make_id();
            let variable = self.builder.make_id();
            (struct_type, variable)
        });

        let (size, alignment) = self.uniform_layout(ty);
        let offset = self.uniforms.size.next_multiple_of(alignment);

        self.uniforms.size = offset + size;
        self.uniforms.offsets.push(offset);
        self.uniforms.members.push((name.to_owned(), *ty));

        debug!("uniform '{name}' ({ty}) at offset {offset}, {size} bytes");

        (variable, self.uniforms.members.len() as u32 - 1, offset)
    }

    /// Size and alignment in bytes of a value in uniform storage
    fn uniform_layout(&self, ty: &Type) -> (u32, u32) {
        if ty.is_array() {
            let (element_size, _) = self.uniform_layout(&ty.element());
            let stride = element_size.next_multiple_of(16);
            return (stride * ty.array_length.max(1) as u32, 16);
        }

        if ty.is_struct() {
            let members = ty
                .definition
                .and_then(|definition| self.struct_info(definition))
                .map(|info| info.members.clone())
                .unwrap_or_default();

            let size = members.iter().fold(0u32, |offset, member| {
                let (size, alignment) = self.uniform_layout(&member.ty);
                offset.next_multiple_of(alignment) + size
            });

            return (size.next_multiple_of(16), 16);
        }

        if ty.is_matrix() {
            return (ty.rows * 16, 16);
        }

        let size = 4 * match ty.rows {
            3 => 4,
            rows => rows.max(1),
        };

        (size, size)
    }

    /// Declares the `$Globals` struct and its variable once all uniforms are
    /// known
    fn finish_uniform_block(&mut self) {
        let Some((struct_type, variable)) = self.uniforms.ids else {
            return;
        };

        let members = std::mem::take(&mut self.uniforms.members);
        self.builder.define_struct(struct_type, "$Globals", &members);
        self.builder
            .add_decoration(struct_type, Decoration::Block, &[]);

        for (index, ((_, ty), offset)) in members.iter().zip(&self.uniforms.offsets).enumerate() {
            let index = index as u32;

            self.builder
                .add_member_decoration(struct_type, index, Decoration::Offset, &[*offset]);

            if ty.is_matrix() {
                self.builder
                    .add_member_decoration(struct_type, index, Decoration::ColMajor, &[]);
                self.builder
                    .add_member_decoration(struct_type, index, Decoration::MatrixStride, &[16]);
            }

            if ty.is_array() {
                let array_type = self.builder.convert_type(ty);
                let (element_size, _) = self.uniform_layout(&ty.element());

                if self.array_strides.insert(array_type) {
                    self.builder.add_decoration(
                        array_type,
                        Decoration::ArrayStride,
                        &[element_size.next_multiple_of(16)],
                    );
                }
            }
        }

        self.builder.define_variable_with_id(
            variable,
            Some("$Globals"),
            &Type::structure(struct_type),
            StorageClass::Uniform,
            None,
            Location::default(),
        );
        self.builder
            .add_decoration(variable, Decoration::DescriptorSet, &[0]);
        self.builder.add_decoration(variable, Decoration::Binding, &[0]);

        trace!(
            "declared $Globals with {} members, {} bytes",
            members.len(),
            self.uniforms.size
        );
    }

    fn current_return_type(&self) -> Type {
        self.current_function
            .map(|index| self.functions[index].return_type)
            .unwrap_or(Type::VOID)
    }

    fn function_type(definition: Id) -> Type {
        Type {
            definition: Some(definition),
            ..Type::new(BaseKind::Function, 0, 0)
        }
    }
}
