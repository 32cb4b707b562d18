use itertools::Itertools;

use super::{ParseResult, Parser, Reported};
use crate::{
    frontend::{
        lexer::{Keyword, Literal, Location, TokenKind},
        operator::{self, BinaryOperator, TERNARY_PRECEDENCE, UnaryOperator},
    },
    middle::{
        constant::{Constant, FoldError},
        expression::{Expression, ExpressionKind},
        intrinsics::{Intrinsic, Lowering},
        ir::{
            GLOp, Id, ImageOperands, Instruction, Op, Operand, Section, SelectionControl,
            StorageClass, builder::ShortCircuit,
        },
        symbol::{CallError, Callee, Scope, SymbolKind},
        ty::{BaseKind, Qualifiers, Type},
    },
};

const SWIZZLE_SETS: [&[u8; 4]; 3] = [b"xyzw", b"rgba", b"stpq"];

fn literal_type(base: BaseKind) -> Type {
    Type {
        qualifiers: Qualifiers::CONST,
        ..Type::scalar(base)
    }
}

/// Constant with every component of `ty` set to one
fn splat_one(ty: &Type) -> Constant {
    let word = match ty.base {
        BaseKind::Float => 1.0f32.to_bits(),
        _ => 1,
    };

    let mut value = Constant::default();
    value.words[..ty.components().max(1) as usize].fill(word);
    value
}

fn binary_op(operator: BinaryOperator, ty: &Type) -> Op {
    let float = ty.is_floating_point();
    let signed = ty.is_signed();

    let pick = |f: Op, s: Op, u: Op| match (float, signed) {
        (true, _) => f,
        (false, true) => s,
        (false, false) => u,
    };

    match operator {
        BinaryOperator::Add => pick(Op::FAdd, Op::IAdd, Op::IAdd),
        BinaryOperator::Subtract => pick(Op::FSub, Op::ISub, Op::ISub),
        BinaryOperator::Multiply => pick(Op::FMul, Op::IMul, Op::IMul),
        BinaryOperator::Divide => pick(Op::FDiv, Op::SDiv, Op::UDiv),
        BinaryOperator::Modulo => pick(Op::FRem, Op::SRem, Op::UMod),
        BinaryOperator::BitwiseAnd => Op::BitwiseAnd,
        BinaryOperator::BitwiseOr => Op::BitwiseOr,
        BinaryOperator::BitwiseXor => Op::BitwiseXor,
        BinaryOperator::ShiftLeft => Op::ShiftLeftLogical,
        BinaryOperator::ShiftRight => pick(
            Op::ShiftRightArithmetic,
            Op::ShiftRightArithmetic,
            Op::ShiftRightLogical,
        ),
        BinaryOperator::LogicalAnd => Op::LogicalAnd,
        BinaryOperator::LogicalOr => Op::LogicalOr,
        BinaryOperator::Less => pick(Op::FOrdLessThan, Op::SLessThan, Op::ULessThan),
        BinaryOperator::Greater => pick(Op::FOrdGreaterThan, Op::SGreaterThan, Op::UGreaterThan),
        BinaryOperator::LessEqual => pick(
            Op::FOrdLessThanEqual,
            Op::SLessThanEqual,
            Op::ULessThanEqual,
        ),
        BinaryOperator::GreaterEqual => pick(
            Op::FOrdGreaterThanEqual,
            Op::SGreaterThanEqual,
            Op::UGreaterThanEqual,
        ),
        BinaryOperator::Equal if ty.is_boolean() => Op::LogicalEqual,
        BinaryOperator::Equal => pick(Op::FOrdEqual, Op::IEqual, Op::IEqual),
        BinaryOperator::NotEqual if ty.is_boolean() => Op::LogicalNotEqual,
        BinaryOperator::NotEqual => pick(Op::FOrdNotEqual, Op::INotEqual, Op::INotEqual),
    }
}

impl Parser<'_> {
    /* Helpers */

    fn load(&mut self, section: &mut Section, expression: &Expression) -> Id {
        self.builder.access_chain_load(section, expression)
    }

    /// Loads the value of an expression converted to `ty`
    pub(super) fn load_as(&mut self, section: &mut Section, expression: &Expression, ty: &Type) -> Id {
        let mut converted = expression.clone();
        converted.add_cast(ty.unqualified());
        self.builder.access_chain_load(section, &converted)
    }

    /// Computes the value of an expression now, so that nothing emitted later
    /// can change it. Constants stay constants.
    fn materialize(&mut self, section: &mut Section, expression: Expression) -> Expression {
        let is_plain_rvalue =
            matches!(expression.kind, ExpressionKind::RValue(_)) && expression.chain.is_empty();

        if expression.is_constant() || is_plain_rvalue {
            return expression;
        }

        let id = self.load(section, &expression);
        Expression::rvalue(id, expression.ty, expression.location)
    }

    fn is_basic_numeric(ty: &Type) -> bool {
        ty.is_scalar() || ty.is_vector() || ty.is_matrix()
    }

    fn warn_if_truncated(&mut self, from: &Type, to: &Type, location: Location) {
        if from.is_numeric() && !from.is_scalar() && (from.rows > to.rows || from.cols > to.cols) {
            report_warning!(self, location, 3206, "implicit truncation of vector type");
        }
    }

    /* Entry points */

    /// Full expression including the comma operator
    pub(super) fn parse_expression(&mut self, section: &mut Section) -> ParseResult<Expression> {
        let mut expression = self.parse_expression_assignment(section)?;

        while self.accept(TokenKind::Comma) {
            expression = self.parse_expression_assignment(section)?;
        }

        Ok(expression)
    }

    pub(super) fn parse_expression_assignment(
        &mut self,
        section: &mut Section,
    ) -> ParseResult<Expression> {
        let lhs = self.parse_expression_multary(section, 0)?;

        let Some(operator) = operator::assignment_operator(self.next.kind) else {
            return Ok(lhs);
        };

        self.consume();
        let location = self.token.location;

        let rhs = self.parse_expression_assignment(section)?;

        if !lhs.is_assignable() {
            return Err(report_error!(
                self,
                lhs.location,
                3025,
                "l-value specifies const object"
            ));
        }

        if Type::rank(&rhs.ty.unqualified(), &lhs.ty.unqualified()) == 0 {
            return Err(report_error!(
                self,
                rhs.location,
                3020,
                "cannot convert these types (from {} to {})",
                rhs.ty,
                lhs.ty
            ));
        }

        self.warn_if_truncated(&rhs.ty, &lhs.ty, rhs.location);

        let value = match operator {
            None => self.load_as(section, &rhs, &lhs.ty),
            Some(operator) => {
                if !Self::is_basic_numeric(&lhs.ty) {
                    return Err(report_error!(
                        self,
                        lhs.location,
                        3022,
                        "scalar, vector, or matrix expected"
                    ));
                }

                if operator.is_bitwise() && !lhs.ty.is_integral() {
                    return Err(report_error!(
                        self,
                        lhs.location,
                        3082,
                        "int or unsigned int type required"
                    ));
                }

                let ty = lhs.ty.unqualified();
                let current = self.load(section, &lhs);
                let operand = self.load_as(section, &rhs, &ty);
                self.emit_binary(section, operator, &ty, &ty, current, operand)
            }
        };

        self.builder.access_chain_store(section, &lhs, value);

        Ok(Expression::rvalue(value, lhs.ty.unqualified(), location))
    }

    /// Precedence climbing over the binary operators and the conditional
    /// operator. Only operators binding tighter than `left_precedence` are
    /// consumed.
    pub(super) fn parse_expression_multary(
        &mut self,
        section: &mut Section,
        left_precedence: u32,
    ) -> ParseResult<Expression> {
        let mut lhs = self.parse_expression_unary(section)?;

        loop {
            let (operator, precedence) = match self.next.kind {
                TokenKind::Question => (None, TERNARY_PRECEDENCE),
                kind => match BinaryOperator::from_token(kind) {
                    Some(operator) => (Some(operator), operator.precedence()),
                    None => break,
                },
            };

            if precedence <= left_precedence {
                break;
            }

            self.consume();

            lhs = match operator {
                None => self.parse_ternary(section, lhs)?,
                Some(operator)
                    if operator.is_logical()
                        && self.builder.short_circuit == ShortCircuit::Branch
                        && lhs.ty.is_scalar()
                        && !lhs.is_constant() =>
                {
                    self.parse_short_circuit(section, operator, lhs, precedence)?
                }
                Some(operator) => {
                    let location = self.token.location;

                    // The left operand is evaluated before anything the right
                    // operand emits
                    let lhs = self.materialize(section, lhs);
                    let rhs = self.parse_expression_multary(section, precedence)?;

                    self.binary_operation(section, operator, lhs, rhs, location)?
                }
            };
        }

        Ok(lhs)
    }

    /* Binary operators */

    fn binary_operation(
        &mut self,
        section: &mut Section,
        operator: BinaryOperator,
        mut lhs: Expression,
        mut rhs: Expression,
        location: Location,
    ) -> ParseResult<Expression> {
        if operator.is_equality()
            && (lhs.ty.is_array() || rhs.ty.is_array() || lhs.ty.definition != rhs.ty.definition)
        {
            return Err(report_error!(self, rhs.location, 3020, "type mismatch"));
        }

        if operator.is_bitwise() && (!lhs.ty.is_integral() || !rhs.ty.is_integral()) {
            return Err(report_error!(
                self,
                location,
                3082,
                "int or unsigned int type required"
            ));
        }

        for operand in [&lhs, &rhs] {
            if !Self::is_basic_numeric(&operand.ty) {
                return Err(report_error!(
                    self,
                    operand.location,
                    3022,
                    "scalar, vector, or matrix expected"
                ));
            }
        }

        let mut ty = Type::merge(&lhs.ty, &rhs.ty);
        if operator.is_logical() {
            ty.base = BaseKind::Bool;
        }

        self.warn_if_truncated(&lhs.ty, &ty, lhs.location);
        self.warn_if_truncated(&rhs.ty, &ty, rhs.location);

        lhs.add_cast(ty);
        rhs.add_cast(ty);

        let result_type = match operator.is_comparison() {
            true => Type {
                base: BaseKind::Bool,
                ..ty
            },
            false => ty,
        };

        if let (Some(lhs), Some(rhs)) = (lhs.constant_value(), rhs.constant_value()) {
            let mut value = lhs.clone();

            if let Err(FoldError::DivisionByZero) = value.fold_binary(operator, &ty, rhs) {
                report_warning!(self, location, 4008, "integer divide by zero");
            }

            let ty = Type {
                qualifiers: Qualifiers::CONST,
                ..result_type
            };

            return Ok(Expression::constant(ty, value, location));
        }

        let lhs = self.load(section, &lhs);
        let rhs = self.load(section, &rhs);
        let id = self.emit_binary(section, operator, &ty, &result_type, lhs, rhs);

        Ok(Expression::rvalue(id, result_type, location))
    }

    /// Emits a binary operation over operands of type `ty`. Arithmetic on
    /// matrices is applied row by row.
    fn emit_binary(
        &mut self,
        section: &mut Section,
        operator: BinaryOperator,
        ty: &Type,
        result_type: &Type,
        lhs: Id,
        rhs: Id,
    ) -> Id {
        let op = binary_op(operator, ty);

        if !ty.is_matrix() || operator.is_comparison() {
            return self.builder.emit(section, op, result_type, [lhs, rhs]);
        }

        let row_type = Type::vector(ty.base, ty.cols);
        let mut rows = Vec::with_capacity(ty.rows as usize);

        for row in 0..ty.rows {
            let l = self.builder.emit_extract(section, &row_type, lhs, [row]);
            let r = self.builder.emit_extract(section, &row_type, rhs, [row]);
            rows.push(self.builder.emit(section, op, &row_type, [l, r]));
        }

        self.builder
            .emit(section, Op::CompositeConstruct, result_type, rows)
    }

    /// `&&` and `||` which only evaluate their right operand when needed
    fn parse_short_circuit(
        &mut self,
        section: &mut Section,
        operator: BinaryOperator,
        lhs: Expression,
        precedence: u32,
    ) -> ParseResult<Expression> {
        let location = self.token.location;

        let lhs_value = self.load_as(section, &lhs, &Type::BOOL);
        let condition = match operator {
            BinaryOperator::LogicalOr => {
                self.builder
                    .emit(section, Op::LogicalNot, &Type::BOOL, [lhs_value])
            }
            _ => lhs_value,
        };

        let lhs_block = self.builder.current_block().unwrap_or_default();
        let rhs_label = self.builder.make_id();
        let merge_label = self.builder.make_id();

        self.builder.emit_void(
            section,
            Instruction::new(Op::SelectionMerge)
                .add(merge_label)
                .add_operand(Operand::SelectionControl(SelectionControl::NONE)),
        );
        self.builder
            .leave_block_and_branch_conditional(section, condition, rhs_label, merge_label);

        let mut rhs_section = Section::default();
        self.builder.enter_block(&mut rhs_section, rhs_label);

        let rhs = self.parse_expression_multary(&mut rhs_section, precedence)?;

        if !Self::is_basic_numeric(&rhs.ty) {
            return Err(report_error!(
                self,
                rhs.location,
                3022,
                "scalar, vector, or matrix expected"
            ));
        }

        self.warn_if_truncated(&rhs.ty, &Type::BOOL, rhs.location);

        let rhs_value = self.load_as(&mut rhs_section, &rhs, &Type::BOOL);
        let rhs_block = self.builder.current_block().unwrap_or_default();
        self.builder
            .leave_block_and_branch(&mut rhs_section, merge_label);

        section.append(rhs_section);
        self.builder.enter_block(section, merge_label);

        let id = self.builder.emit(
            section,
            Op::Phi,
            &Type::BOOL,
            [lhs_value, lhs_block, rhs_value, rhs_block],
        );

        Ok(Expression::rvalue(id, Type::BOOL, location))
    }

    /* Conditional operator */

    fn ternary_type(
        &mut self,
        condition: &Expression,
        true_value: &Expression,
        false_value: &Expression,
    ) -> ParseResult<Type> {
        let (t, f) = (&true_value.ty, &false_value.ty);

        if t.is_array() || f.is_array() || t.definition != f.definition {
            return Err(report_error!(
                self,
                false_value.location,
                3020,
                "type mismatch between conditional values"
            ));
        }

        let ty = match t.is_numeric() && f.is_numeric() {
            true => Type::merge(t, f),
            false => t.unqualified(),
        };

        if condition.ty.is_vector() && condition.ty.rows != ty.rows {
            return Err(report_error!(
                self,
                condition.location,
                3020,
                "dimension of conditional does not match value"
            ));
        }

        Ok(ty)
    }

    fn parse_ternary(
        &mut self,
        section: &mut Section,
        condition: Expression,
    ) -> ParseResult<Expression> {
        let location = self.token.location;

        if !condition.ty.is_scalar() && !condition.ty.is_vector() {
            return Err(report_error!(
                self,
                condition.location,
                3022,
                "boolean or vector expression expected"
            ));
        }

        if self.builder.short_circuit == ShortCircuit::Branch
            && condition.ty.is_scalar()
            && !condition.is_constant()
        {
            return self.parse_ternary_branch(section, condition, location);
        }

        let mut condition = self.materialize(section, condition);
        let mut true_value = self.parse_expression(section)?;
        self.expect(TokenKind::Colon)?;
        let mut false_value = self.parse_expression_assignment(section)?;

        let ty = self.ternary_type(&condition, &true_value, &false_value)?;

        condition.add_cast(Type::vector(BaseKind::Bool, ty.rows.max(1)));
        true_value.add_cast(ty);
        false_value.add_cast(ty);

        if let (Some(c), Some(t), Some(f)) = (
            condition.constant_value(),
            true_value.constant_value(),
            false_value.constant_value(),
        ) {
            let mut value = Constant::default();

            for i in 0..ty.components().min(16) as usize {
                let selector = c.words[i / ty.cols.max(1) as usize];
                value.words[i] = match selector {
                    0 => f.words[i],
                    _ => t.words[i],
                };
            }

            let ty = Type {
                qualifiers: Qualifiers::CONST,
                ..ty
            };

            return Ok(Expression::constant(ty, value, location));
        }

        let condition = self.load(section, &condition);
        let true_id = self.load(section, &true_value);
        let false_id = self.load(section, &false_value);

        let id = self.builder.emit(
            section,
            Op::Select,
            &ty,
            [condition, true_id, false_id],
        );

        Ok(Expression::rvalue(id, ty, location))
    }

    /// Conditional operator which only evaluates the selected side
    fn parse_ternary_branch(
        &mut self,
        section: &mut Section,
        condition: Expression,
        location: Location,
    ) -> ParseResult<Expression> {
        let condition_value = self.load_as(section, &condition, &Type::BOOL);

        let true_label = self.builder.make_id();
        let false_label = self.builder.make_id();
        let merge_label = self.builder.make_id();

        self.builder.emit_void(
            section,
            Instruction::new(Op::SelectionMerge)
                .add(merge_label)
                .add_operand(Operand::SelectionControl(SelectionControl::NONE)),
        );
        self.builder.leave_block_and_branch_conditional(
            section,
            condition_value,
            true_label,
            false_label,
        );

        // The true side stays open until the result type is known
        let mut true_section = Section::default();
        self.builder.enter_block(&mut true_section, true_label);
        let true_value = self.parse_expression(&mut true_section)?;
        let true_block = self.builder.current_block();

        self.expect(TokenKind::Colon)?;

        self.builder.set_current_block(None);
        let mut false_section = Section::default();
        self.builder.enter_block(&mut false_section, false_label);
        let false_value = self.parse_expression_assignment(&mut false_section)?;

        let ty = self.ternary_type(&condition, &true_value, &false_value)?;

        let false_id = self.load_as(&mut false_section, &false_value, &ty);
        let false_block = self.builder.current_block();
        self.builder
            .leave_block_and_branch(&mut false_section, merge_label);

        self.builder.set_current_block(true_block);
        let true_id = self.load_as(&mut true_section, &true_value, &ty);
        self.builder
            .leave_block_and_branch(&mut true_section, merge_label);

        section.append(true_section);
        section.append(false_section);
        self.builder.enter_block(section, merge_label);

        let id = self.builder.emit(
            section,
            Op::Phi,
            &ty,
            [
                true_id,
                true_block.unwrap_or_default(),
                false_id,
                false_block.unwrap_or_default(),
            ],
        );

        Ok(Expression::rvalue(id, ty, location))
    }

    /* Unary expressions */

    pub(super) fn parse_expression_unary(
        &mut self,
        section: &mut Section,
    ) -> ParseResult<Expression> {
        let location = self.next.location;

        let prefix = matches!(
            self.next.kind,
            TokenKind::Bang
                | TokenKind::Minus
                | TokenKind::Tilde
                | TokenKind::Plus
                | TokenKind::Increment
                | TokenKind::Decrement
        );

        if prefix {
            return self.parse_prefix(section, location);
        }

        let expression = self.parse_primary(section, location)?;
        self.parse_postfix(section, expression)
    }

    fn parse_prefix(&mut self, section: &mut Section, location: Location) -> ParseResult<Expression> {
        let kind = self.next.kind;
        self.consume();

        let mut operand = self.parse_expression_unary(section)?;

        if !Self::is_basic_numeric(&operand.ty) {
            return Err(report_error!(
                self,
                operand.location,
                3022,
                "scalar, vector, or matrix expected"
            ));
        }

        let operator = match kind {
            TokenKind::Plus => return Ok(operand),
            TokenKind::Increment | TokenKind::Decrement => {
                let increment = kind == TokenKind::Increment;
                return self.emit_increment(section, operand, increment, true, location);
            }
            TokenKind::Tilde => {
                if !operand.ty.is_integral() {
                    return Err(report_error!(
                        self,
                        operand.location,
                        3082,
                        "int or unsigned int type required"
                    ));
                }

                UnaryOperator::BitwiseNot
            }
            TokenKind::Bang => {
                operand.add_cast(Type {
                    base: BaseKind::Bool,
                    ..operand.ty
                });

                UnaryOperator::LogicalNot
            }
            _ => UnaryOperator::Negate,
        };

        let ty = operand.ty;

        if let ExpressionKind::Constant(mut value) = operand.kind {
            value.fold_unary(operator, &ty);
            return Ok(Expression::constant(ty, value, location));
        }

        let op = match operator {
            UnaryOperator::Negate if ty.is_floating_point() => Op::FNegate,
            UnaryOperator::Negate => Op::SNegate,
            UnaryOperator::BitwiseNot => Op::Not,
            UnaryOperator::LogicalNot => Op::LogicalNot,
        };

        let value = self.load(section, &operand);
        let id = self.builder.emit(section, op, &ty, [value]);

        Ok(Expression::rvalue(id, ty.unqualified(), location))
    }

    /// `++x`, `--x`, `x++` and `x--`. Prefix forms evaluate to the new value,
    /// postfix forms to the old one.
    fn emit_increment(
        &mut self,
        section: &mut Section,
        operand: Expression,
        increment: bool,
        prefix: bool,
        location: Location,
    ) -> ParseResult<Expression> {
        if !operand.is_assignable() {
            return Err(report_error!(
                self,
                operand.location,
                3025,
                "l-value specifies const object"
            ));
        }

        let ty = operand.ty.unqualified();
        let op = match (ty.is_floating_point(), increment) {
            (true, true) => Op::FAdd,
            (true, false) => Op::FSub,
            (false, true) => Op::IAdd,
            (false, false) => Op::ISub,
        };

        let value = self.load(section, &operand);
        let one = self.builder.convert_constant(&ty, &splat_one(&ty));
        let result = self.builder.emit(section, op, &ty, [value, one]);

        self.builder.access_chain_store(section, &operand, result);

        let id = match prefix {
            true => result,
            false => value,
        };

        Ok(Expression::rvalue(id, ty, location))
    }

    /* Primary expressions */

    fn parse_primary(&mut self, section: &mut Section, location: Location) -> ParseResult<Expression> {
        if self.accept(TokenKind::OpenParen) {
            return self.parse_parenthesized(section, location);
        }

        if self.accept(TokenKind::OpenBrace) {
            return self.parse_initializer_list(section, location);
        }

        if let Some(literal) = self.accept_literal(location) {
            return Ok(literal);
        }

        if let Some(ty) = self.accept_type_class()? {
            return self.parse_constructor(section, ty, location);
        }

        if self.peek(TokenKind::Identifier) || self.peek(TokenKind::DoubleColon) {
            return self.parse_identifier(section, location);
        }

        Err(report_error!(
            self,
            location,
            3000,
            "syntax error: unexpected '{}', expected expression",
            self.next.kind
        ))
    }

    fn accept_literal(&mut self, location: Location) -> Option<Expression> {
        let (ty, value) = match (self.next.kind, &self.next.literal) {
            (TokenKind::Keyword(Keyword::True), _) => (BaseKind::Bool, Constant::from_bool(true)),
            (TokenKind::Keyword(Keyword::False), _) => {
                (BaseKind::Bool, Constant::from_bool(false))
            }
            (TokenKind::IntLiteral, Literal::Int(value)) => (BaseKind::Int, Constant::from_int(*value)),
            (TokenKind::UintLiteral, Literal::Uint(value)) => {
                (BaseKind::Uint, Constant::from_uint(*value))
            }
            (TokenKind::FloatLiteral, Literal::Float(value)) => {
                (BaseKind::Float, Constant::from_float(*value))
            }
            (TokenKind::DoubleLiteral, Literal::Double(value)) => {
                report_warning!(
                    self,
                    location,
                    5000,
                    "double literal truncated to float literal"
                );
                (BaseKind::Float, Constant::from_float(*value as f32))
            }
            (TokenKind::StringLiteral, _) => {
                let mut value = String::new();

                // Adjacent string literals are concatenated
                while self.accept(TokenKind::StringLiteral) {
                    value.push_str(&self.token_string());
                }

                let ty = Type {
                    qualifiers: Qualifiers::CONST,
                    ..Type::new(BaseKind::String, 0, 0)
                };

                return Some(Expression::constant(ty, Constant::from_string(value), location));
            }
            _ => return None,
        };

        self.consume();

        Some(Expression::constant(literal_type(ty), value, location))
    }

    /// Either a cast `(type)x`, a parenthesized expression or a parenthesized
    /// constructor call
    fn parse_parenthesized(
        &mut self,
        section: &mut Section,
        location: Location,
    ) -> ParseResult<Expression> {
        let checkpoint = self.backup();

        if let Some(ty) = self.accept_type_class()? {
            if self.peek(TokenKind::OpenParen) {
                // `(float2(a, b))` is a constructor call in parentheses
                self.restore(checkpoint);
            } else {
                self.expect(TokenKind::CloseParen)?;
                let operand = self.parse_expression_unary(section)?;
                return self.parse_cast(operand, ty, location);
            }
        }

        let expression = self.parse_expression(section)?;
        self.expect(TokenKind::CloseParen)?;

        Ok(expression)
    }

    fn parse_cast(
        &mut self,
        mut operand: Expression,
        to: Type,
        location: Location,
    ) -> ParseResult<Expression> {
        let from = operand.ty;

        let same_type = from.base == to.base
            && from.rows == to.rows
            && from.cols == to.cols
            && from.definition == to.definition;

        if same_type && !from.is_array() && !to.is_array() {
            return Ok(operand);
        }

        if !from.is_numeric() || !to.is_numeric() {
            return Err(report_error!(
                self,
                location,
                3017,
                "cannot convert non-numeric types"
            ));
        }

        if (from.rows < to.rows || from.cols < to.cols) && !from.is_scalar() {
            return Err(report_error!(
                self,
                location,
                3017,
                "cannot convert these vector types (from {from} to {to})"
            ));
        }

        operand.add_cast(to);
        operand.location = location;

        Ok(operand)
    }

    /// `{ a, b, c }` array initializer
    fn parse_initializer_list(
        &mut self,
        section: &mut Section,
        location: Location,
    ) -> ParseResult<Expression> {
        let mut elements: Vec<Expression> = Vec::new();
        let mut element_type: Option<Type> = None;

        while !self.peek(TokenKind::CloseBrace) {
            if !elements.is_empty() {
                self.expect(TokenKind::Comma)?;

                // Trailing comma
                if self.peek(TokenKind::CloseBrace) {
                    break;
                }
            }

            let element = match self.parse_expression_assignment(section) {
                Ok(element) => element,
                Err(reported) => {
                    self.consume_until(TokenKind::CloseBrace);
                    return Err(reported);
                }
            };

            element_type = Some(match element_type {
                None => element.ty.unqualified(),
                Some(ty) if ty.is_numeric() && element.ty.is_numeric() => {
                    Type::merge(&ty, &element.ty)
                }
                Some(ty) => ty,
            });

            elements.push(element);
        }

        self.expect(TokenKind::CloseBrace)?;

        let Some(element_type) = element_type else {
            return Err(report_error!(
                self,
                self.token.location,
                3000,
                "syntax error: unexpected '}}', expected expression"
            ));
        };

        let ty = Type {
            array_length: elements.len() as i32,
            ..element_type
        };

        if elements.iter().all(Expression::is_constant) {
            let mut value = Constant::default();

            value.array = elements
                .into_iter()
                .map(|mut element| {
                    element.add_cast(element_type);
                    element.constant_value().cloned().unwrap_or_default()
                })
                .collect();

            let ty = Type {
                qualifiers: Qualifiers::CONST,
                ..ty
            };

            return Ok(Expression::constant(ty, value, location));
        }

        let ids = elements
            .iter()
            .map(|element| self.load_as(section, element, &element_type))
            .collect_vec();

        let id = self
            .builder
            .emit(section, Op::CompositeConstruct, &ty, ids);

        Ok(Expression::rvalue(id, ty, location))
    }

    /// `float3(a, b, c)` and friends. The number of components of all
    /// arguments has to add up to exactly the constructed type.
    fn parse_constructor(
        &mut self,
        section: &mut Section,
        ty: Type,
        location: Location,
    ) -> ParseResult<Expression> {
        self.expect(TokenKind::OpenParen)?;

        if !ty.is_numeric() {
            return Err(report_error!(
                self,
                location,
                3037,
                "constructors only defined for numeric base types"
            ));
        }

        let mut arguments = Vec::new();
        let mut components = 0;

        while !self.peek(TokenKind::CloseParen) {
            if !arguments.is_empty() {
                self.expect(TokenKind::Comma)?;
            }

            let argument = self.parse_expression_assignment(section)?;

            if !argument.ty.is_numeric() || argument.ty.is_array() {
                return Err(report_error!(
                    self,
                    argument.location,
                    3017,
                    "cannot convert non-numeric types"
                ));
            }

            components += argument.ty.components();
            arguments.push(argument);
        }

        self.expect(TokenKind::CloseParen)?;

        if arguments.is_empty() || components != ty.components() {
            return Err(report_error!(
                self,
                location,
                3014,
                "incorrect number of arguments to numeric-type constructor"
            ));
        }

        // A single argument of the same shape is a plain conversion
        if let [argument] = arguments.as_slice() {
            if argument.ty.rows == ty.rows && argument.ty.cols == ty.cols {
                let mut expression = argument.clone();
                expression.add_cast(ty);
                expression.location = location;
                return Ok(expression);
            }
        }

        // Arguments keep their shape but take on the constructed base type
        let converted = |argument: &Expression| Type {
            base: ty.base,
            ..argument.ty.unqualified()
        };

        if arguments.iter().all(Expression::is_constant) {
            let mut value = Constant::default();
            let mut index = 0;

            for mut argument in arguments {
                let argument_type = converted(&argument);
                argument.add_cast(argument_type);

                if let Some(constant) = argument.constant_value() {
                    for component in 0..argument_type.components() as usize {
                        value.words[index] = constant.words[component];
                        index += 1;
                    }
                }
            }

            let ty = Type {
                qualifiers: Qualifiers::CONST,
                ..ty
            };

            return Ok(Expression::constant(ty, value, location));
        }

        let needs_scalars = ty.is_matrix() || arguments.iter().any(|a| a.ty.is_matrix());

        if !needs_scalars {
            let ids = arguments
                .iter()
                .map(|argument| {
                    let argument_type = converted(argument);
                    self.load_as(section, argument, &argument_type)
                })
                .collect_vec();

            let id = self
                .builder
                .emit(section, Op::CompositeConstruct, &ty, ids);
            return Ok(Expression::rvalue(id, ty, location));
        }

        // Matrices are built from row vectors, so split everything into
        // scalars first
        let scalar = Type::scalar(ty.base);
        let mut scalars = Vec::with_capacity(ty.components() as usize);

        for argument in &arguments {
            let argument_type = converted(argument);
            let value = self.load_as(section, argument, &argument_type);

            if argument_type.is_scalar() {
                scalars.push(value);
                continue;
            }

            for row in 0..argument_type.rows {
                for col in 0..argument_type.cols {
                    let id = match argument_type.is_matrix() {
                        true => self.builder.emit_extract(section, &scalar, value, [row, col]),
                        false => self.builder.emit_extract(section, &scalar, value, [row]),
                    };
                    scalars.push(id);
                }
            }
        }

        let id = if ty.is_matrix() {
            let row_type = Type::vector(ty.base, ty.cols);
            let mut rows = Vec::with_capacity(ty.rows as usize);

            for row in scalars.chunks(ty.cols as usize) {
                let id = self.builder.emit(
                    section,
                    Op::CompositeConstruct,
                    &row_type,
                    row.iter().copied(),
                );
                rows.push(id);
            }

            self.builder
                .emit(section, Op::CompositeConstruct, &ty, rows)
        } else {
            self.builder
                .emit(section, Op::CompositeConstruct, &ty, scalars)
        };

        Ok(Expression::rvalue(id, ty, location))
    }

    /// Variable reference or function call
    fn parse_identifier(
        &mut self,
        section: &mut Section,
        location: Location,
    ) -> ParseResult<Expression> {
        let (name, exclusive) = self.parse_qualified_identifier()?;
        let symbol = self.lookup(&name, exclusive);

        if self.accept(TokenKind::OpenParen) {
            if symbol.as_ref().is_some_and(|s| !s.is_function()) {
                return Err(report_error!(
                    self,
                    location,
                    3005,
                    "identifier '{name}' represents a variable, not a function"
                ));
            }

            let arguments = self.parse_call_arguments(section)?;
            return self.emit_call(section, &name, exclusive, arguments, location);
        }

        let Some(symbol) = symbol else {
            return Err(report_error!(
                self,
                location,
                3004,
                "undeclared identifier '{name}'"
            ));
        };

        // The declaration failed and has already been reported
        if symbol.id.is_placeholder() {
            return Err(Reported);
        }

        match symbol.kind {
            SymbolKind::Variable(storage) => {
                Ok(Expression::lvalue(symbol.id, storage, symbol.ty, location))
            }
            SymbolKind::UniformMember(index) => {
                let block_type = self
                    .uniforms
                    .ids
                    .map(|(struct_type, _)| Type::structure(struct_type))
                    .unwrap_or_default();

                let block_type = Type {
                    qualifiers: Qualifiers::UNIFORM,
                    ..block_type
                };

                let mut expression =
                    Expression::lvalue(symbol.id, StorageClass::Uniform, block_type, location);
                expression.add_member_access(index, symbol.ty);

                Ok(expression)
            }
            SymbolKind::Constant(value) => Ok(Expression::constant(symbol.ty, value, location)),
            SymbolKind::Function(_) => Err(report_error!(
                self,
                location,
                3005,
                "identifier '{name}' represents a function, not a variable"
            )),
            SymbolKind::Struct => Err(report_error!(
                self,
                location,
                3005,
                "identifier '{name}' represents a type, not a variable"
            )),
        }
    }

    fn parse_call_arguments(&mut self, section: &mut Section) -> ParseResult<Vec<Expression>> {
        let mut arguments = Vec::new();

        while !self.peek(TokenKind::CloseParen) {
            if !arguments.is_empty() {
                self.expect(TokenKind::Comma)?;
            }

            arguments.push(self.parse_expression_assignment(section)?);
        }

        self.expect(TokenKind::CloseParen)?;

        Ok(arguments)
    }

    /* Calls */

    fn emit_call(
        &mut self,
        section: &mut Section,
        name: &str,
        exclusive: bool,
        arguments: Vec<Expression>,
        location: Location,
    ) -> ParseResult<Expression> {
        let argument_types = arguments.iter().map(|a| a.ty).collect_vec();
        let scope = match exclusive {
            true => Scope::root(),
            false => self.symbols.current_scope().clone(),
        };

        let resolved = self.symbols.resolve_function_call(
            name,
            &argument_types,
            &scope,
            exclusive,
            &self.functions,
        );

        let callee = match resolved {
            Ok(callee) => callee,
            Err(CallError::Undeclared) => {
                return Err(report_error!(
                    self,
                    location,
                    3004,
                    "undeclared identifier '{name}'"
                ));
            }
            Err(CallError::Ambiguous) => {
                return Err(report_error!(
                    self,
                    location,
                    3067,
                    "ambiguous function call to '{name}'"
                ));
            }
            Err(CallError::NoMatch) => {
                return Err(report_error!(
                    self,
                    location,
                    3013,
                    "no matching function overload for '{name}'"
                ));
            }
            Err(CallError::Placeholder) => return Err(Reported),
        };

        let (parameters, return_type) = match callee {
            Callee::Function(index) => {
                if self.current_function == Some(index) {
                    return Err(report_error!(
                        self,
                        location,
                        3500,
                        "recursive function calls are not allowed"
                    ));
                }

                let info = &self.functions[index];
                let parameters = info.parameters.iter().map(|p| p.ty).collect_vec();
                (parameters, info.return_type)
            }
            Callee::Intrinsic(intrinsic) => (intrinsic.parameters.clone(), intrinsic.return_type),
        };

        for (argument, parameter) in arguments.iter().zip(&parameters) {
            if parameter.has(Qualifiers::OUT) && !argument.is_assignable() {
                return Err(report_error!(
                    self,
                    argument.location,
                    3025,
                    "l-value specifies const object"
                ));
            }

            self.warn_if_truncated(&argument.ty, parameter, argument.location);
        }

        // Pointer parameters receive a temporary which is copied in before
        // and copied back out after the call
        let mut values = Vec::with_capacity(arguments.len());

        for (argument, parameter) in arguments.iter().zip(&parameters) {
            let value_type = parameter.unqualified();

            if !parameter.is_pointer {
                values.push(self.load_as(section, argument, &value_type));
                continue;
            }

            let temporary = self.builder.define_variable(
                None,
                &value_type,
                StorageClass::Function,
                None,
                argument.location,
            );

            if parameter.has(Qualifiers::IN) {
                let value = self.load_as(section, argument, &value_type);
                self.builder.emit_void(
                    section,
                    Instruction::new(Op::Store).add(temporary).add(value),
                );
            }

            values.push(temporary);
        }

        let result = match callee {
            Callee::Function(index) => {
                let definition = self.functions[index].definition;
                self.builder.emit(
                    section,
                    Op::FunctionCall,
                    &return_type,
                    std::iter::once(definition).chain(values.iter().copied()),
                )
            }
            Callee::Intrinsic(intrinsic) => self.emit_intrinsic(section, intrinsic, &values),
        };

        for ((argument, parameter), value) in arguments.iter().zip(&parameters).zip(&values) {
            if !parameter.is_pointer || !parameter.has(Qualifiers::OUT) {
                continue;
            }

            let value_type = parameter.unqualified();
            let loaded = self.builder.emit(section, Op::Load, &value_type, [*value]);
            let converted = self
                .builder
                .emit_cast(section, loaded, &value_type, &argument.ty);

            self.builder
                .access_chain_store(section, argument, converted);
        }

        Ok(Expression::rvalue(result, return_type, location))
    }

    fn emit_extended(
        &mut self,
        section: &mut Section,
        instruction: GLOp,
        ty: &Type,
        operands: &[Id],
    ) -> Id {
        let type_id = self.builder.convert_type(ty);
        let glsl_ext = self.builder.glsl_ext();

        self.builder.emit_operands(
            section,
            Op::ExtInst,
            type_id,
            [
                Operand::from(glsl_ext),
                Operand::LiteralExtInstInteger(instruction as u32),
            ]
            .into_iter()
            .chain(operands.iter().copied().map(Operand::from)),
        )
    }

    fn emit_intrinsic(
        &mut self,
        section: &mut Section,
        intrinsic: &Intrinsic,
        values: &[Id],
    ) -> Id {
        let ty = intrinsic.return_type;

        match intrinsic.lowering {
            Lowering::Op(op) => self.builder.emit(section, op, &ty, values.iter().copied()),
            Lowering::Ext(instruction) => self.emit_extended(section, instruction, &ty, values),
            Lowering::Reciprocal => {
                let one = self.builder.convert_constant(&ty, &splat_one(&ty));
                self.builder
                    .emit(section, Op::FDiv, &ty, [one, values[0]])
            }
            Lowering::Saturate => {
                let zero = self.builder.convert_constant(&ty, &Constant::default());
                let one = self.builder.convert_constant(&ty, &splat_one(&ty));
                self.emit_extended(section, GLOp::FClamp, &ty, &[values[0], zero, one])
            }
            Lowering::SinCos => {
                let value_type = intrinsic.parameters[0];
                let sin = self.emit_extended(section, GLOp::Sin, &value_type, &values[..1]);
                let cos = self.emit_extended(section, GLOp::Cos, &value_type, &values[..1]);

                self.builder.emit_void(
                    section,
                    Instruction::new(Op::Store).add(values[1]).add(sin),
                );
                self.builder.emit_void(
                    section,
                    Instruction::new(Op::Store).add(values[2]).add(cos),
                );

                Id::default()
            }
            Lowering::Mul => {
                // Matrices are stored transposed, so the operand order flips
                let (lhs, rhs) = (&intrinsic.parameters[0], &intrinsic.parameters[1]);
                let op = match (lhs.is_matrix(), rhs.is_matrix()) {
                    (true, true) => Op::MatrixTimesMatrix,
                    (true, false) => Op::VectorTimesMatrix,
                    _ => Op::MatrixTimesVector,
                };

                self.builder
                    .emit(section, op, &ty, [values[1], values[0]])
            }
            Lowering::Sample => {
                self.builder
                    .emit(section, Op::ImageSampleImplicitLod, &ty, values.iter().copied())
            }
            Lowering::SampleLod => {
                let coordinates = self.builder.emit_shuffle(
                    section,
                    &Type::vector(BaseKind::Float, 2),
                    [values[1], values[1]],
                    [0, 1],
                );
                let level = self
                    .builder
                    .emit_extract(section, &Type::FLOAT, values[1], [3]);

                let type_id = self.builder.convert_type(&ty);
                self.builder.emit_operands(
                    section,
                    Op::ImageSampleExplicitLod,
                    type_id,
                    [
                        Operand::from(values[0]),
                        Operand::from(coordinates),
                        Operand::ImageOperands(ImageOperands::LOD),
                        Operand::from(level),
                    ],
                )
            }
        }
    }

    /* Postfix expressions */

    fn parse_postfix(
        &mut self,
        section: &mut Section,
        mut expression: Expression,
    ) -> ParseResult<Expression> {
        loop {
            let location = self.next.location;

            if self.peek(TokenKind::Increment) || self.peek(TokenKind::Decrement) {
                let increment = self.peek(TokenKind::Increment);
                self.consume();

                if !Self::is_basic_numeric(&expression.ty) {
                    return Err(report_error!(
                        self,
                        expression.location,
                        3022,
                        "scalar, vector, or matrix expected"
                    ));
                }

                expression = self.emit_increment(section, expression, increment, false, location)?;
            } else if self.accept(TokenKind::Dot) {
                let subscript = self.expect_identifier()?;
                let location = self.token.location;

                if self.accept(TokenKind::OpenParen) {
                    return Err(match expression.ty.is_struct() {
                        true => report_error!(self, location, 3088, "structures do not have methods"),
                        false => report_error!(self, location, 3087, "object does not have methods"),
                    });
                }

                if expression.ty.is_array() {
                    return Err(report_error!(self, location, 3018, "invalid subscript on array"));
                }

                if expression.ty.is_struct() {
                    self.apply_member_access(&mut expression, &subscript, location)?;
                } else if expression.ty.is_scalar() {
                    self.apply_scalar_swizzle(&mut expression, &subscript, location)?;
                } else if expression.ty.is_vector() {
                    self.apply_vector_swizzle(&mut expression, &subscript, location)?;
                } else if expression.ty.is_matrix() {
                    self.apply_matrix_swizzle(&mut expression, &subscript, location)?;
                } else {
                    return Err(report_error!(
                        self,
                        location,
                        3018,
                        "invalid subscript '{subscript}'"
                    ));
                }
            } else if self.accept(TokenKind::OpenBracket) {
                expression = self.parse_index(section, expression, location)?;
            } else {
                break;
            }
        }

        Ok(expression)
    }

    fn apply_member_access(
        &mut self,
        expression: &mut Expression,
        subscript: &str,
        location: Location,
    ) -> ParseResult<()> {
        let member = expression
            .ty
            .definition
            .and_then(|definition| self.struct_info(definition))
            .and_then(|info| info.member(subscript))
            .map(|(index, member)| (index as u32, member.ty));

        let Some((index, mut member_type)) = member else {
            return Err(report_error!(
                self,
                location,
                3018,
                "invalid subscript '{subscript}'"
            ));
        };

        if expression.ty.has(Qualifiers::UNIFORM) || expression.ty.has(Qualifiers::CONST) {
            member_type.qualifiers |= Qualifiers::CONST;
        }

        expression.add_member_access(index, member_type);

        Ok(())
    }

    /// Marks the result of a swizzle as read only
    fn make_swizzle_const(expression: &mut Expression) {
        expression.ty.qualifiers |= Qualifiers::CONST;
        expression.ty.qualifiers.remove(Qualifiers::UNIFORM);
    }

    /// `s.xxx` turns a scalar into a vector
    fn apply_scalar_swizzle(
        &mut self,
        expression: &mut Expression,
        subscript: &str,
        location: Location,
    ) -> ParseResult<()> {
        if subscript.len() > 4 {
            return Err(report_error!(
                self,
                location,
                3018,
                "invalid subscript '{subscript}', swizzle too long"
            ));
        }

        if !subscript.bytes().all(|c| matches!(c, b'x' | b'r' | b's')) {
            return Err(report_error!(
                self,
                location,
                3018,
                "invalid subscript '{subscript}'"
            ));
        }

        if subscript.len() > 1 {
            let ty = Type {
                qualifiers: expression.ty.qualifiers,
                ..Type::vector(expression.ty.base, subscript.len() as u32)
            };

            expression.add_cast(ty);
            Self::make_swizzle_const(expression);
        }

        Ok(())
    }

    fn apply_vector_swizzle(
        &mut self,
        expression: &mut Expression,
        subscript: &str,
        location: Location,
    ) -> ParseResult<()> {
        if subscript.len() > 4 {
            return Err(report_error!(
                self,
                location,
                3018,
                "invalid subscript '{subscript}', swizzle too long"
            ));
        }

        let mut offsets = [-1i8; 4];
        let mut set = None;
        let mut repeated = false;

        for (i, c) in subscript.bytes().enumerate() {
            let component = SWIZZLE_SETS.iter().enumerate().find_map(|(set, letters)| {
                letters
                    .iter()
                    .position(|letter| *letter == c)
                    .map(|index| (set, index as i8))
            });

            let Some((component_set, index)) = component else {
                return Err(report_error!(
                    self,
                    location,
                    3018,
                    "invalid subscript '{subscript}'"
                ));
            };

            if set.is_some_and(|set| set != component_set) {
                return Err(report_error!(
                    self,
                    location,
                    3018,
                    "invalid subscript '{subscript}', mixed swizzle sets"
                ));
            }

            set = Some(component_set);

            if index as u32 >= expression.ty.rows {
                return Err(report_error!(
                    self,
                    location,
                    3018,
                    "invalid subscript '{subscript}', swizzle out of range"
                ));
            }

            repeated |= offsets[..i].contains(&index);
            offsets[i] = index;
        }

        let is_uniform = expression.ty.has(Qualifiers::UNIFORM);
        expression.add_swizzle_access(offsets, subscript.len());

        if repeated || is_uniform {
            Self::make_swizzle_const(expression);
        }

        Ok(())
    }

    /// `m._m00_m11` (zero based) or `m._11_22` (one based)
    fn apply_matrix_swizzle(
        &mut self,
        expression: &mut Expression,
        subscript: &str,
        location: Location,
    ) -> ParseResult<()> {
        let bytes = subscript.as_bytes();

        if bytes.len() < 3 {
            return Err(report_error!(
                self,
                location,
                3018,
                "invalid subscript '{subscript}'"
            ));
        }

        let zero_based = bytes[1] == b'm';
        let stride = if zero_based { 4 } else { 3 };
        let first = if zero_based { b'0' } else { b'1' };

        let mut offsets = [-1i8; 4];
        let mut count = 0;
        let mut repeated = false;

        for group in bytes.chunks(stride) {
            let digits = match (zero_based, group) {
                (true, [b'_', b'm', row, col]) => Some((*row, *col)),
                (false, [b'_', row, col]) => Some((*row, *col)),
                _ => None,
            };

            if zero_based && matches!(group, [b'_', c, _, _] if *c != b'm') {
                return Err(report_error!(
                    self,
                    location,
                    3018,
                    "invalid subscript '{subscript}', mixed swizzle sets"
                ));
            }

            let in_range = |digit: u8| (first..first + 4).contains(&digit);

            let Some((row, col)) = digits.filter(|(row, col)| in_range(*row) && in_range(*col))
            else {
                return Err(report_error!(
                    self,
                    location,
                    3018,
                    "invalid subscript '{subscript}'"
                ));
            };

            let (row, col) = ((row - first) as u32, (col - first) as u32);

            if row >= expression.ty.rows || col >= expression.ty.cols || count > 3 {
                return Err(report_error!(
                    self,
                    location,
                    3018,
                    "invalid subscript '{subscript}', swizzle out of range"
                ));
            }

            let offset = (row * 4 + col) as i8;
            repeated |= offsets[..count].contains(&offset);
            offsets[count] = offset;
            count += 1;
        }

        let is_uniform = expression.ty.has(Qualifiers::UNIFORM);
        expression.add_swizzle_access(offsets, count);

        if repeated || is_uniform {
            Self::make_swizzle_const(expression);
        }

        Ok(())
    }

    fn parse_index(
        &mut self,
        section: &mut Section,
        mut expression: Expression,
        location: Location,
    ) -> ParseResult<Expression> {
        let ty = expression.ty;

        if !ty.is_array() && !ty.is_vector() && !ty.is_matrix() {
            return Err(report_error!(
                self,
                location,
                3121,
                "array, matrix, vector, or indexable object type expected in index expression"
            ));
        }

        let index = self.parse_expression(section)?;

        if !index.ty.is_scalar() || !index.ty.is_integral() {
            return Err(report_error!(
                self,
                index.location,
                3120,
                "invalid type for index - index must be a scalar"
            ));
        }

        self.expect(TokenKind::CloseBracket)?;

        let element = if ty.is_array() {
            ty.element()
        } else if ty.is_matrix() {
            Type {
                rows: ty.cols,
                cols: 1,
                ..ty
            }
        } else {
            Type {
                rows: 1,
                cols: 1,
                ..ty
            }
        };

        if let Some(value) = index.constant_value() {
            let index = value.scalar_as_int(index.ty.base).max(0) as u32;
            expression.add_static_index_access(index, element);
            return Ok(expression);
        }

        if expression.is_constant() {
            let id = self.load(section, &expression);
            expression = Expression::rvalue(id, ty, expression.location);
        }

        let index = self.load_as(section, &index, &Type::INT);
        expression.add_dynamic_index_access(index, element);

        Ok(expression)
    }
}
