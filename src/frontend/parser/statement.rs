use super::{ParseResult, Parser};
use crate::{
    frontend::lexer::{Keyword, TokenKind},
    middle::{
        ir::{Id, Instruction, LoopControl, Op, Operand, SelectionControl, Section},
        ty::Type,
    },
};

/// Control masks requested through `[attribute]` prefixes
#[derive(Debug, Clone, Copy)]
struct Attributes {
    loop_control: LoopControl,
    selection_control: SelectionControl,
}

impl Default for Attributes {
    fn default() -> Self {
        Self {
            loop_control: LoopControl::NONE,
            selection_control: SelectionControl::NONE,
        }
    }
}

impl Parser<'_> {
    /// Parses a single statement into `section`. `scoped` controls whether a
    /// block statement opens a new symbol scope.
    pub(super) fn parse_statement(&mut self, section: &mut Section, scoped: bool) -> ParseResult<()> {
        if !self.builder.is_in_block() {
            // Code following a terminator is still checked, it goes into a
            // block nothing branches to
            let label = self.builder.make_id();
            self.builder.enter_block(section, label);
        }

        let attributes = self.parse_attributes()?;
        let location = self.next.location;

        if self.peek(TokenKind::OpenBrace) {
            return self.parse_statement_block(section, scoped);
        }

        if self.accept(TokenKind::Semicolon) {
            return Ok(());
        }

        if let TokenKind::Keyword(keyword) = self.next.kind {
            match keyword {
                Keyword::If => {
                    self.consume();
                    return self.parse_if(section, attributes);
                }
                Keyword::Switch => {
                    self.consume();
                    return self.parse_switch(section, attributes);
                }
                Keyword::For => {
                    self.consume();
                    return self.parse_for(section, attributes);
                }
                Keyword::While => {
                    self.consume();
                    return self.parse_while(section, attributes);
                }
                Keyword::Do => {
                    self.consume();
                    return self.parse_do_while(section, attributes);
                }
                Keyword::Break => {
                    self.consume();

                    let Some(&target) = self.loop_break_targets.last() else {
                        return Err(report_error!(
                            self,
                            location,
                            3518,
                            "break must be inside loop"
                        ));
                    };

                    self.builder.leave_block_and_branch(section, target);
                    return self.expect(TokenKind::Semicolon);
                }
                Keyword::Continue => {
                    self.consume();

                    let Some(&target) = self.loop_continue_targets.last() else {
                        return Err(report_error!(
                            self,
                            location,
                            3519,
                            "continue must be inside loop"
                        ));
                    };

                    self.builder.leave_block_and_branch(section, target);
                    return self.expect(TokenKind::Semicolon);
                }
                Keyword::Return => {
                    self.consume();
                    return self.parse_return(section);
                }
                Keyword::Discard => {
                    self.consume();
                    self.builder.leave_block_and_kill(section);
                    return self.expect(TokenKind::Semicolon);
                }
                _ => {}
            }
        }

        // Local declaration, unless the type turns out to start a constructor
        // call such as `float2(a, b).x;`
        let checkpoint = self.backup();

        if let Some(ty) = self.parse_type()? {
            if !self.peek(TokenKind::OpenParen) {
                return self.parse_local_variables(section, ty);
            }

            self.restore(checkpoint);
        }

        self.parse_expression(section)?;
        self.expect(TokenKind::Semicolon)
    }

    /// `{ ... }`. On failure the rest of the block is skipped.
    pub(super) fn parse_statement_block(
        &mut self,
        section: &mut Section,
        scoped: bool,
    ) -> ParseResult<()> {
        self.expect(TokenKind::OpenBrace)?;

        if scoped {
            self.symbols.enter_scope();
        }

        let mut result = Ok(());

        while !self.peek(TokenKind::CloseBrace) && !self.peek(TokenKind::EndOfFile) {
            if let Err(reported) = self.parse_statement(section, true) {
                self.skip_block();
                result = Err(reported);
                break;
            }
        }

        if scoped {
            self.symbols.leave_scope();
        }

        result?;
        self.expect(TokenKind::CloseBrace)
    }

    fn parse_attributes(&mut self) -> ParseResult<Attributes> {
        let mut attributes = Attributes::default();

        while self.accept(TokenKind::OpenBracket) {
            let name = self.expect_identifier()?;
            let location = self.token.location;

            // `[unroll(4)]` takes an optional count, which is ignored
            if self.accept(TokenKind::OpenParen) {
                self.expect(TokenKind::IntLiteral)?;
                self.expect(TokenKind::CloseParen)?;
            }

            self.expect(TokenKind::CloseBracket)?;

            match name.as_str() {
                "unroll" => attributes.loop_control |= LoopControl::UNROLL,
                "loop" => attributes.loop_control |= LoopControl::DONT_UNROLL,
                "flatten" => attributes.selection_control |= SelectionControl::FLATTEN,
                "branch" => attributes.selection_control |= SelectionControl::DONT_FLATTEN,
                _ => report_warning!(self, location, 0, "unknown attribute '{name}'"),
            }
        }

        Ok(attributes)
    }

    /// `type a, b = x, c[2];` inside a function
    fn parse_local_variables(&mut self, section: &mut Section, ty: Type) -> ParseResult<()> {
        loop {
            let name = self.expect_identifier()?;
            let location = self.token.location;

            self.parse_variable(ty, &name, location, false, Some(&mut *section))?;

            if !self.accept(TokenKind::Comma) {
                break;
            }
        }

        self.expect(TokenKind::Semicolon)
    }

    /// Condition of an `if`, `while` or `for` converted to a boolean
    fn parse_condition(&mut self, section: &mut Section, message: &str) -> ParseResult<Id> {
        let condition = self.parse_expression(section)?;

        if !condition.ty.is_scalar() {
            return Err(report_error!(self, condition.location, 3019, "{message}"));
        }

        Ok(self.load_as(section, &condition, &Type::BOOL))
    }

    fn parse_if(&mut self, section: &mut Section, attributes: Attributes) -> ParseResult<()> {
        self.expect(TokenKind::OpenParen)?;
        let condition = self.parse_condition(
            section,
            "if statement conditional expressions must evaluate to a scalar",
        )?;
        self.expect(TokenKind::CloseParen)?;

        let true_label = self.builder.make_id();
        let false_label = self.builder.make_id();
        let merge_label = self.builder.make_id();

        self.builder.emit_void(
            section,
            Instruction::new(Op::SelectionMerge)
                .add(merge_label)
                .add_operand(Operand::SelectionControl(attributes.selection_control)),
        );
        self.builder
            .leave_block_and_branch_conditional(section, condition, true_label, false_label);

        self.builder.enter_block(section, true_label);
        self.parse_statement(section, true)?;
        self.builder.leave_block_and_branch(section, merge_label);

        self.builder.enter_block(section, false_label);
        if self.accept_keyword(Keyword::Else) {
            self.parse_statement(section, true)?;
        }
        self.builder.leave_block_and_branch(section, merge_label);

        self.builder.enter_block(section, merge_label);

        Ok(())
    }

    fn parse_switch(&mut self, section: &mut Section, attributes: Attributes) -> ParseResult<()> {
        let location = self.token.location;

        self.expect(TokenKind::OpenParen)?;
        let selector = self.parse_expression(section)?;
        self.expect(TokenKind::CloseParen)?;

        if !selector.ty.is_scalar() {
            return Err(report_error!(
                self,
                selector.location,
                3019,
                "switch statements must evaluate to a scalar"
            ));
        }

        let selector = self.load_as(section, &selector, &Type::INT);
        let merge_label = self.builder.make_id();

        // Case blocks are collected separately, the switch instruction itself
        // needs all labels first
        let switch_block = self.builder.current_block();
        self.builder.set_current_block(None);

        self.loop_break_targets.push(merge_label);
        let body = self.parse_switch_body(merge_label);
        self.loop_break_targets.pop();

        let (body, cases, default) = body?;

        if cases.is_empty() && default.is_none() {
            report_warning!(
                self,
                location,
                5002,
                "switch statement contains no 'case' or 'default' labels"
            );
        }

        self.builder.set_current_block(switch_block);
        self.builder.emit_void(
            section,
            Instruction::new(Op::SelectionMerge)
                .add(merge_label)
                .add_operand(Operand::SelectionControl(attributes.selection_control)),
        );
        self.builder.leave_block_and_switch(
            section,
            selector,
            default.unwrap_or(merge_label),
            &cases,
        );

        section.append(body);
        self.builder.enter_block(section, merge_label);

        Ok(())
    }

    /// `{ case ...: ... }`. On failure the rest of the body is skipped.
    #[allow(clippy::type_complexity)]
    fn parse_switch_body(
        &mut self,
        merge_label: Id,
    ) -> ParseResult<(Section, Vec<(u32, Id)>, Option<Id>)> {
        self.expect(TokenKind::OpenBrace)?;

        let mut body = Section::default();
        let mut cases = Vec::new();
        let mut default = None;

        if let Err(reported) = self.parse_switch_cases(&mut body, &mut cases, &mut default) {
            self.skip_block();
            return Err(reported);
        }

        self.builder.leave_block_and_branch(&mut body, merge_label);
        self.expect(TokenKind::CloseBrace)?;

        Ok((body, cases, default))
    }

    fn parse_switch_cases(
        &mut self,
        body: &mut Section,
        cases: &mut Vec<(u32, Id)>,
        default: &mut Option<Id>,
    ) -> ParseResult<()> {
        while !self.peek(TokenKind::CloseBrace) && !self.peek(TokenKind::EndOfFile) {
            let label = self.builder.make_id();
            let mut has_label = false;

            loop {
                if self.accept_keyword(Keyword::Case) {
                    let mut scratch = Section::default();
                    let value = self.parse_expression(&mut scratch)?;
                    self.expect(TokenKind::Colon)?;

                    let literal = value
                        .constant_value()
                        .filter(|_| value.ty.is_scalar() && value.ty.is_numeric())
                        .map(|constant| constant.scalar_as_int(value.ty.base));

                    let Some(literal) = literal else {
                        return Err(report_error!(
                            self,
                            value.location,
                            3020,
                            "non-numeric case expression"
                        ));
                    };

                    cases.push((literal as u32, label));
                } else if self.accept_keyword(Keyword::Default) {
                    self.expect(TokenKind::Colon)?;
                    *default = Some(label);
                } else {
                    break;
                }

                has_label = true;
            }

            if !has_label {
                return Err(report_error!(
                    self,
                    self.next.location,
                    3000,
                    "syntax error: unexpected '{}', expected 'case' or 'default'",
                    self.next.kind
                ));
            }

            // The previous case falls through into this one
            self.builder.leave_block_and_branch(body, label);
            self.builder.enter_block(body, label);

            while !self.peek_keyword(Keyword::Case)
                && !self.peek_keyword(Keyword::Default)
                && !self.peek(TokenKind::CloseBrace)
                && !self.peek(TokenKind::EndOfFile)
            {
                self.parse_statement(body, true)?;
            }
        }

        Ok(())
    }

    /// Loop body with `break` and `continue` bound to the given labels
    fn parse_loop_body(
        &mut self,
        section: &mut Section,
        break_target: Id,
        continue_target: Id,
        scoped: bool,
    ) -> ParseResult<()> {
        self.loop_break_targets.push(break_target);
        self.loop_continue_targets.push(continue_target);

        let result = self.parse_statement(section, scoped);

        self.loop_break_targets.pop();
        self.loop_continue_targets.pop();

        result
    }

    fn emit_loop_merge(
        &mut self,
        section: &mut Section,
        merge_label: Id,
        continue_label: Id,
        attributes: Attributes,
    ) {
        self.builder.emit_void(
            section,
            Instruction::new(Op::LoopMerge)
                .add(merge_label)
                .add(continue_label)
                .add_operand(Operand::LoopControl(attributes.loop_control)),
        );
    }

    fn parse_for(&mut self, section: &mut Section, attributes: Attributes) -> ParseResult<()> {
        self.expect(TokenKind::OpenParen)?;

        // Variables declared in the initializer are only visible in the loop
        self.symbols.enter_scope();
        let result = self.parse_for_loop(section, attributes);
        self.symbols.leave_scope();

        result
    }

    fn parse_for_loop(&mut self, section: &mut Section, attributes: Attributes) -> ParseResult<()> {
        if !self.accept(TokenKind::Semicolon) {
            if let Some(ty) = self.parse_type()? {
                self.parse_local_variables(section, ty)?;
            } else {
                self.parse_expression(section)?;
                self.expect(TokenKind::Semicolon)?;
            }
        }

        let header_label = self.builder.make_id();
        let condition_label = self.builder.make_id();
        let body_label = self.builder.make_id();
        let continue_label = self.builder.make_id();
        let merge_label = self.builder.make_id();

        self.builder.leave_block_and_branch(section, header_label);
        self.builder.enter_block(section, header_label);
        self.emit_loop_merge(section, merge_label, continue_label, attributes);
        self.builder.leave_block_and_branch(section, condition_label);

        self.builder.enter_block(section, condition_label);

        if self.peek(TokenKind::Semicolon) {
            self.builder.leave_block_and_branch(section, body_label);
        } else {
            let condition = self.parse_condition(section, "scalar value expected")?;
            self.builder.leave_block_and_branch_conditional(
                section,
                condition,
                body_label,
                merge_label,
            );
        }

        self.expect(TokenKind::Semicolon)?;

        // The increment expression is parsed before the body but runs after it
        let mut continue_section = Section::default();
        self.builder.enter_block(&mut continue_section, continue_label);

        if !self.peek(TokenKind::CloseParen) {
            self.parse_expression(&mut continue_section)?;
        }

        self.builder
            .leave_block_and_branch(&mut continue_section, header_label);
        self.expect(TokenKind::CloseParen)?;

        self.builder.enter_block(section, body_label);
        self.parse_loop_body(section, merge_label, continue_label, false)?;
        self.builder.leave_block_and_branch(section, continue_label);

        section.append(continue_section);
        self.builder.enter_block(section, merge_label);

        Ok(())
    }

    fn parse_while(&mut self, section: &mut Section, attributes: Attributes) -> ParseResult<()> {
        let header_label = self.builder.make_id();
        let condition_label = self.builder.make_id();
        let body_label = self.builder.make_id();
        let continue_label = self.builder.make_id();
        let merge_label = self.builder.make_id();

        self.builder.leave_block_and_branch(section, header_label);
        self.builder.enter_block(section, header_label);
        self.emit_loop_merge(section, merge_label, continue_label, attributes);
        self.builder.leave_block_and_branch(section, condition_label);

        self.builder.enter_block(section, condition_label);

        self.expect(TokenKind::OpenParen)?;
        let condition = self.parse_condition(section, "scalar value expected")?;
        self.expect(TokenKind::CloseParen)?;

        self.builder
            .leave_block_and_branch_conditional(section, condition, body_label, merge_label);

        self.builder.enter_block(section, body_label);
        self.parse_loop_body(section, merge_label, continue_label, true)?;
        self.builder.leave_block_and_branch(section, continue_label);

        self.builder.enter_block(section, continue_label);
        self.builder.leave_block_and_branch(section, header_label);

        self.builder.enter_block(section, merge_label);

        Ok(())
    }

    fn parse_do_while(&mut self, section: &mut Section, attributes: Attributes) -> ParseResult<()> {
        let header_label = self.builder.make_id();
        let body_label = self.builder.make_id();
        let continue_label = self.builder.make_id();
        let merge_label = self.builder.make_id();

        self.builder.leave_block_and_branch(section, header_label);
        self.builder.enter_block(section, header_label);
        self.emit_loop_merge(section, merge_label, continue_label, attributes);
        self.builder.leave_block_and_branch(section, body_label);

        self.builder.enter_block(section, body_label);
        self.parse_loop_body(section, merge_label, continue_label, true)?;
        self.builder.leave_block_and_branch(section, continue_label);

        // The condition is evaluated in the continue block
        self.builder.enter_block(section, continue_label);

        self.expect_keyword(Keyword::While)?;
        self.expect(TokenKind::OpenParen)?;
        let condition = self.parse_condition(section, "scalar value expected")?;
        self.expect(TokenKind::CloseParen)?;
        self.expect(TokenKind::Semicolon)?;

        self.builder.leave_block_and_branch_conditional(
            section,
            condition,
            header_label,
            merge_label,
        );

        self.builder.enter_block(section, merge_label);

        Ok(())
    }

    fn parse_return(&mut self, section: &mut Section) -> ParseResult<()> {
        let location = self.token.location;
        let return_type = self.current_return_type();

        if self.accept(TokenKind::Semicolon) {
            if !return_type.is_void() {
                return Err(report_error!(
                    self,
                    location,
                    3080,
                    "function must return a value"
                ));
            }

            self.builder.leave_block_and_return(section, None);
            return Ok(());
        }

        let value = self.parse_expression(section)?;
        self.expect(TokenKind::Semicolon)?;

        if return_type.is_void() {
            return Err(report_error!(
                self,
                value.location,
                3079,
                "void functions cannot return a value"
            ));
        }

        if Type::rank(&value.ty.unqualified(), &return_type.unqualified()) == 0 {
            return Err(report_error!(
                self,
                value.location,
                3017,
                "expression does not match function return type"
            ));
        }

        if value.ty.is_numeric()
            && !value.ty.is_scalar()
            && (value.ty.rows > return_type.rows || value.ty.cols > return_type.cols)
        {
            report_warning!(
                self,
                value.location,
                3206,
                "implicit truncation of vector type"
            );
        }

        let id = self.load_as(section, &value, &return_type);
        self.builder.leave_block_and_return(section, Some(id));

        Ok(())
    }
}
