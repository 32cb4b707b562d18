use super::{ParseResult, Parser};
use crate::{
    frontend::lexer::{Keyword, Literal, TokenKind},
    middle::{
        ir::Section,
        symbol::SymbolKind,
        ty::{BaseKind, Qualifiers, Type},
    },
};

fn qualifier_of(keyword: Keyword) -> Option<Qualifiers> {
    Some(match keyword {
        Keyword::Extern => Qualifiers::EXTERN,
        Keyword::Static => Qualifiers::STATIC,
        Keyword::Uniform => Qualifiers::UNIFORM,
        Keyword::Volatile => Qualifiers::VOLATILE,
        Keyword::Precise => Qualifiers::PRECISE,
        Keyword::In => Qualifiers::IN,
        Keyword::Out => Qualifiers::OUT,
        Keyword::Inout => Qualifiers::INOUT,
        Keyword::Const => Qualifiers::CONST,
        Keyword::Linear => Qualifiers::LINEAR,
        Keyword::Noperspective => Qualifiers::NOPERSPECTIVE,
        Keyword::Centroid => Qualifiers::CENTROID,
        Keyword::Nointerpolation => Qualifiers::NOINTERPOLATION,
        _ => return None,
    })
}

impl Parser<'_> {
    /// Recognizes a type name: a built-in type, `vector<T, N>`,
    /// `matrix<T, R, C>` or the name of a declared struct. Consumes nothing
    /// and returns `None` if the next tokens do not name a type.
    pub(super) fn accept_type_class(&mut self) -> ParseResult<Option<Type>> {
        if self.peek(TokenKind::Identifier) || self.peek(TokenKind::DoubleColon) {
            let checkpoint = self.backup();

            if let Ok((name, exclusive)) = self.parse_qualified_identifier() {
                if let Some(symbol) = self.lookup(&name, exclusive) {
                    if symbol.kind == SymbolKind::Struct {
                        return Ok(Some(symbol.ty.unqualified()));
                    }
                }
            }

            self.restore(checkpoint);
            return Ok(None);
        }

        if self.accept_keyword(Keyword::Vector) {
            return self.parse_vector_template().map(Some);
        }

        if self.accept_keyword(Keyword::Matrix) {
            return self.parse_matrix_template().map(Some);
        }

        let TokenKind::Type(builtin) = self.next.kind else {
            return Ok(None);
        };

        self.consume();

        Ok(Some(Type::new(builtin.base, builtin.rows, builtin.cols)))
    }

    /// Element type of a `vector<...>` or `matrix<...>` template
    fn parse_template_element(&mut self, what: &str, code: u32) -> ParseResult<Type> {
        let location = self.next.location;

        let Some(element) = self.accept_type_class()? else {
            return Err(report_error!(
                self,
                location,
                3000,
                "syntax error: unexpected '{}', expected {what} element type",
                self.next.kind
            ));
        };

        if !element.is_scalar() {
            return Err(report_error!(
                self,
                location,
                code,
                "{what} element type must be a scalar type"
            ));
        }

        Ok(element)
    }

    fn parse_template_dimension(&mut self) -> ParseResult<Option<u32>> {
        self.expect(TokenKind::Comma)?;
        self.expect(TokenKind::IntLiteral)?;

        let value = match self.token.literal {
            Literal::Int(value) => value,
            _ => 0,
        };

        Ok((1..=4).contains(&value).then_some(value as u32))
    }

    fn parse_vector_template(&mut self) -> ParseResult<Type> {
        if !self.accept(TokenKind::LessThan) {
            return Ok(Type::vector(BaseKind::Float, 4));
        }

        let element = self.parse_template_element("vector", 3122)?;
        let location = self.next.location;

        let Some(rows) = self.parse_template_dimension()? else {
            return Err(report_error!(
                self,
                location,
                3052,
                "vector dimension must be between 1 and 4"
            ));
        };

        self.expect(TokenKind::GreaterThan)?;

        Ok(Type::vector(element.base, rows))
    }

    fn parse_matrix_template(&mut self) -> ParseResult<Type> {
        if !self.accept(TokenKind::LessThan) {
            return Ok(Type::matrix(BaseKind::Float, 4, 4));
        }

        let element = self.parse_template_element("matrix", 3123)?;
        let location = self.next.location;

        let (Some(rows), Some(cols)) =
            (self.parse_template_dimension()?, self.parse_template_dimension()?)
        else {
            return Err(report_error!(
                self,
                location,
                3053,
                "matrix dimensions must be between 1 and 4"
            ));
        };

        self.expect(TokenKind::GreaterThan)?;

        Ok(Type::matrix(element.base, rows, cols))
    }

    /// Accepts any number of qualifier keywords. Returns whether at least one
    /// was present.
    pub(super) fn accept_type_qualifiers(&mut self, ty: &mut Type) -> bool {
        let mut accepted = false;

        while let TokenKind::Keyword(keyword) = self.next.kind {
            let Some(qualifier) = qualifier_of(keyword) else {
                break;
            };

            self.consume();
            accepted = true;

            if ty.has(qualifier) {
                report_warning!(
                    self,
                    self.token.location,
                    3048,
                    "duplicate usages specified"
                );
            }

            ty.qualifiers |= qualifier;
        }

        accepted
    }

    /// Qualifiers followed by a type class. Returns `None` if no type class
    /// follows, qualifiers are consumed either way. An invalid interpolation
    /// mode is reported without failing, so the declaration still parses.
    pub(super) fn parse_type(&mut self) -> ParseResult<Option<Type>> {
        let mut qualifiers = Type::VOID;
        self.accept_type_qualifiers(&mut qualifiers);

        let Some(mut ty) = self.accept_type_class()? else {
            return Ok(None);
        };

        ty.qualifiers = qualifiers.qualifiers;

        if ty.is_integral()
            && (ty.has(Qualifiers::CENTROID) || ty.has(Qualifiers::NOPERSPECTIVE))
        {
            report_error!(
                self,
                self.token.location,
                4576,
                "signature specifies invalid interpolation mode for integer component type"
            );
        }

        if ty.has(Qualifiers::CENTROID) && !ty.has(Qualifiers::NOPERSPECTIVE) {
            ty.qualifiers |= Qualifiers::LINEAR;
        }

        Ok(Some(ty))
    }

    /// Optional `[]` or `[N]` suffix of a declaration
    pub(super) fn parse_array_size(&mut self, ty: &mut Type) -> ParseResult<()> {
        if !self.accept(TokenKind::OpenBracket) {
            return Ok(());
        }

        if self.accept(TokenKind::CloseBracket) {
            ty.array_length = -1;
            return Ok(());
        }

        // Only constants are accepted, nothing emitted here is kept
        let mut scratch = Section::default();
        let expression = self.parse_expression(&mut scratch)?;
        self.expect(TokenKind::CloseBracket)?;

        let length = match expression.constant_value() {
            Some(value) if expression.ty.is_scalar() && expression.ty.is_integral() => {
                value.as_int(0)
            }
            _ => {
                return Err(report_error!(
                    self,
                    expression.location,
                    3058,
                    "array dimensions must be literal scalar expressions"
                ));
            }
        };

        if !(1..=Type::MAX_ARRAY_LENGTH).contains(&length) {
            return Err(report_error!(
                self,
                expression.location,
                3059,
                "array dimension must be between 1 and 65536"
            ));
        }

        ty.array_length = length;

        Ok(())
    }
}
