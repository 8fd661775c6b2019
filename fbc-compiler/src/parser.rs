//! A lightweight recursive-descent parser producing [`crate::ast::Program`].
//!
//! Per §1, the parsing grammar is an external collaborator; this parser
//! exists only to drive the in-scope pipeline stages (semantic analysis,
//! CFG construction, IR emission) end-to-end for the §8 test scenarios. It
//! covers enough of the dialect to do that, not the full BASIC grammar.

use crate::ast::*;
use crate::diagnostics::Location;
use crate::lexer::{tokenize, Token, TokenKind, TypeSuffix};

pub struct Parser<'src> {
    tokens: Vec<Token<'src>>,
    pos: usize,
}

type PResult<T> = Result<T, String>;

pub fn parse(source: &str) -> PResult<Program> {
    let stream = tokenize(source);
    if stream.diagnostics.has_errors() {
        // Recoverable lexical issues still produce a best-effort token
        // stream (§4.1); parsing proceeds over it rather than aborting.
    }
    Parser::new(stream.tokens).parse_program()
}

impl<'src> Parser<'src> {
    pub fn new(tokens: Vec<Token<'src>>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn parse_program(&mut self) -> PResult<Program> {
        let mut statements = Vec::new();
        self.skip_separators();
        while !self.at_eof() {
            statements.push(self.parse_statement()?);
            self.skip_separators();
        }
        Ok(Program { statements })
    }

    // --- token stream primitives ---

    fn peek(&self) -> &Token<'src> {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_ahead(&self, offset: usize) -> &Token<'src> {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)]
    }

    /// `CLASS`, `METHOD`, `CONSTRUCTOR`, `DESTRUCTOR` and `TRY` never
    /// collapse into a single compound `END` token (the lexer keeps them
    /// two tokens so a bare `END` inside those bodies stays distinguishable
    /// from the block terminator); this checks for that two-token form
    /// without consuming it.
    fn at_end_word(&self, word: &str) -> bool {
        self.check(TokenKind::KwEnd)
            && matches!(self.peek_ahead(1).kind, TokenKind::Identifier)
            && self.peek_ahead(1).lexeme.eq_ignore_ascii_case(word)
    }

    fn consume_end_word(&mut self, word: &str, what: &str) -> PResult<()> {
        self.expect(TokenKind::KwEnd, what)?;
        let tok = self.expect(TokenKind::Identifier, what)?;
        if !tok.lexeme.eq_ignore_ascii_case(word) {
            return Err(format!(
                "expected {} at {}, found END {}",
                what, tok.location, tok.lexeme
            ));
        }
        Ok(())
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::EndOfFile)
    }

    fn advance(&mut self) -> Token<'src> {
        let t = *self.peek();
        if !self.at_eof() {
            self.pos += 1;
        }
        t
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<Token<'src>> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(format!(
                "expected {} at {}, found {:?} '{}'",
                what,
                self.peek().location,
                self.peek().kind,
                self.peek().lexeme
            ))
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek_kind(), TokenKind::EndOfLine | TokenKind::Colon) {
            self.advance();
        }
    }

    /// Consumes end-of-statement separators (end-of-line or `:`) required
    /// between statements; tolerant of trailing EOF.
    fn end_statement(&mut self) {
        if matches!(self.peek_kind(), TokenKind::EndOfLine | TokenKind::Colon) {
            self.advance();
        }
    }

    fn loc(&self) -> Location {
        self.peek().location
    }

    /// Reads an identifier, folding an immediately-following type suffix
    /// into the returned name (BASIC convention: `X$`, `I%`).
    fn parse_name(&mut self) -> PResult<String> {
        let tok = self.expect(TokenKind::Identifier, "identifier")?;
        let mut name = tok.lexeme.to_string();
        if let TokenKind::TypeSuffix(sfx) = self.peek_kind() {
            name.push(suffix_char(sfx));
            self.advance();
        }
        Ok(name)
    }

    // --- statements ---

    fn parse_statement(&mut self) -> PResult<Stmt> {
        let loc = self.loc();

        if let TokenKind::NumberLiteral = self.peek_kind() {
            // A numbered BASIC line: `10 GOTO 30`.
            let n = self.peek().number.unwrap_or(0.0) as i32;
            self.advance();
            let mut inner = self.parse_statement()?;
            inner.line_number = Some(n);
            return Ok(inner);
        }

        let kind = match self.peek_kind() {
            TokenKind::KwLet => self.parse_let()?,
            TokenKind::Identifier if self.looks_like_bare_assignment() => self.parse_let()?,
            TokenKind::KwPrint => self.parse_print()?,
            TokenKind::KwDim => self.parse_dim()?,
            TokenKind::KwGlobal => self.parse_global()?,
            TokenKind::KwConst => self.parse_const()?,
            TokenKind::KwIf => self.parse_if()?,
            TokenKind::KwFor => self.parse_for()?,
            TokenKind::KwWhile => self.parse_while()?,
            TokenKind::KwDo => self.parse_do()?,
            TokenKind::KwRepeat => self.parse_repeat()?,
            TokenKind::KwSelect => self.parse_select_case()?,
            TokenKind::KwTry => self.parse_try()?,
            TokenKind::KwGoto => self.parse_goto()?,
            TokenKind::KwGosub => self.parse_gosub()?,
            TokenKind::KwOn => self.parse_on_goto()?,
            TokenKind::KwReturn => {
                self.advance();
                StmtKind::Return
            }
            TokenKind::KwExit => self.parse_exit()?,
            TokenKind::KwEnd => {
                self.advance();
                StmtKind::End
            }
            TokenKind::KwFunction => self.parse_function()?,
            TokenKind::KwSub => self.parse_sub()?,
            TokenKind::KwType => self.parse_type_def()?,
            TokenKind::KwClass => self.parse_class()?,
            TokenKind::KwData => self.parse_data()?,
            TokenKind::KwRead => self.parse_read()?,
            TokenKind::KwRestore => self.parse_restore()?,
            TokenKind::KwInc => self.parse_inc_dec(true)?,
            TokenKind::KwDec => self.parse_inc_dec(false)?,
            TokenKind::KwSwap => self.parse_swap()?,
            TokenKind::Identifier => self.parse_label_or_call()?,
            TokenKind::KwNext | TokenKind::KwWend | TokenKind::KwLoop | TokenKind::KwUntil => {
                self.parse_orphan_closer()?
            }
            _ => {
                let e = self.parse_expr()?;
                StmtKind::ExprStmt(e)
            }
        };

        let stmt = Stmt {
            kind,
            location: loc,
            line_number: None,
        };
        self.end_statement();
        Ok(stmt)
    }

    /// `X = 1` without a leading `LET` is legal BASIC; this distinguishes
    /// it from a bare call/label by checking for `=` or an array/field
    /// chain ending in `=` before committing.
    fn looks_like_bare_assignment(&self) -> bool {
        let mut i = self.pos;
        if !matches!(self.tokens[i].kind, TokenKind::Identifier) {
            return false;
        }
        i += 1;
        if matches!(self.tokens.get(i).map(|t| t.kind), Some(TokenKind::TypeSuffix(_))) {
            i += 1;
        }
        if matches!(self.tokens.get(i).map(|t| t.kind), Some(TokenKind::LParen)) {
            let mut depth = 1;
            i += 1;
            while i < self.tokens.len() && depth > 0 {
                match self.tokens[i].kind {
                    TokenKind::LParen => depth += 1,
                    TokenKind::RParen => depth -= 1,
                    TokenKind::EndOfLine | TokenKind::EndOfFile => return false,
                    _ => {}
                }
                i += 1;
            }
        }
        matches!(self.tokens.get(i).map(|t| t.kind), Some(TokenKind::Equal))
    }

    fn parse_let(&mut self) -> PResult<StmtKind> {
        self.matches(TokenKind::KwLet);
        let target = self.parse_lvalue()?;
        self.expect(TokenKind::Equal, "'='")?;
        let value = self.parse_expr()?;
        Ok(StmtKind::Let { target, value })
    }

    fn parse_lvalue(&mut self) -> PResult<LValue> {
        let name = self.parse_name()?;
        let mut lv = if self.matches(TokenKind::LParen) {
            let mut indices = Vec::new();
            if !self.check(TokenKind::RParen) {
                loop {
                    indices.push(self.parse_expr()?);
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen, "')'")?;
            LValue::ArrayElement { name, indices }
        } else {
            LValue::Variable(name)
        };
        while self.matches(TokenKind::Dot) {
            let field = self.parse_name()?;
            lv = LValue::Field {
                base: Box::new(lv),
                field,
            };
        }
        Ok(lv)
    }

    fn parse_print(&mut self) -> PResult<StmtKind> {
        self.advance();
        let mut items = Vec::new();
        if !matches!(self.peek_kind(), TokenKind::EndOfLine | TokenKind::EndOfFile | TokenKind::Colon) {
            loop {
                items.push(self.parse_expr()?);
                if !self.matches(TokenKind::Semicolon) && !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        Ok(StmtKind::Print { items })
    }

    fn parse_as_type(&mut self) -> PResult<Option<String>> {
        if self.matches(TokenKind::KwAs) {
            Ok(Some(self.parse_name()?))
        } else {
            Ok(None)
        }
    }

    fn parse_dim(&mut self) -> PResult<StmtKind> {
        self.advance();
        let name = self.parse_name()?;
        let mut dims = Vec::new();
        if self.matches(TokenKind::LParen) {
            loop {
                dims.push(self.parse_expr()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "')'")?;
        }
        let as_type = self.parse_as_type()?;
        Ok(StmtKind::Dim { name, as_type, dims })
    }

    fn parse_global(&mut self) -> PResult<StmtKind> {
        self.advance();
        let name = self.parse_name()?;
        let as_type = self.parse_as_type()?;
        Ok(StmtKind::Global { name, as_type })
    }

    fn parse_const(&mut self) -> PResult<StmtKind> {
        self.advance();
        let name = self.parse_name()?;
        self.expect(TokenKind::Equal, "'='")?;
        let value = self.parse_expr()?;
        Ok(StmtKind::Const { name, value })
    }

    fn parse_block_until(&mut self, stops: &[TokenKind]) -> PResult<Vec<Stmt>> {
        let mut body = Vec::new();
        self.skip_separators();
        while !self.at_eof() && !stops.contains(&self.peek_kind()) {
            body.push(self.parse_statement()?);
            self.skip_separators();
        }
        Ok(body)
    }

    fn parse_if(&mut self) -> PResult<StmtKind> {
        self.advance();
        let cond = self.parse_expr()?;
        self.matches(TokenKind::KwThen);
        let then_branch = self.parse_block_until(&[
            TokenKind::KwElseIf,
            TokenKind::KwElse,
            TokenKind::KwEndIf,
        ])?;
        let mut elseifs = Vec::new();
        while self.check(TokenKind::KwElseIf) {
            self.advance();
            let c = self.parse_expr()?;
            self.matches(TokenKind::KwThen);
            let body = self.parse_block_until(&[
                TokenKind::KwElseIf,
                TokenKind::KwElse,
                TokenKind::KwEndIf,
            ])?;
            elseifs.push((c, body));
        }
        let else_branch = if self.matches(TokenKind::KwElse) {
            Some(self.parse_block_until(&[TokenKind::KwEndIf])?)
        } else {
            None
        };
        self.expect(TokenKind::KwEndIf, "END IF")?;
        Ok(StmtKind::If {
            cond,
            then_branch,
            elseifs,
            else_branch,
        })
    }

    fn parse_for(&mut self) -> PResult<StmtKind> {
        self.advance();
        if self.matches(TokenKind::KwForEach) {
            let var = self.parse_name()?;
            self.expect(TokenKind::KwIn, "IN")?;
            let collection = self.parse_expr()?;
            let body = self.parse_block_until(&[TokenKind::KwNext])?;
            self.expect(TokenKind::KwNext, "NEXT")?;
            if self.check(TokenKind::Identifier) {
                self.parse_name()?;
            }
            return Ok(StmtKind::ForEach { var, collection, body });
        }
        let var = self.parse_name()?;
        self.expect(TokenKind::Equal, "'='")?;
        let start = self.parse_expr()?;
        self.expect(TokenKind::KwTo, "TO")?;
        let end = self.parse_expr()?;
        let step = if self.matches(TokenKind::KwStep) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        let body = self.parse_block_until(&[TokenKind::KwNext])?;
        self.expect(TokenKind::KwNext, "NEXT")?;
        if self.check(TokenKind::Identifier) {
            self.parse_name()?;
        }
        Ok(StmtKind::For {
            var,
            start,
            end,
            step,
            body,
        })
    }

    fn parse_while(&mut self) -> PResult<StmtKind> {
        self.advance();
        let cond = self.parse_expr()?;
        let body = self.parse_block_until(&[TokenKind::KwWend])?;
        self.expect(TokenKind::KwWend, "WEND")?;
        Ok(StmtKind::While { cond, body })
    }

    fn parse_do(&mut self) -> PResult<StmtKind> {
        self.advance();
        let pre = if self.matches(TokenKind::KwWhile) {
            Some(DoCondition::PreWhile(self.parse_expr()?))
        } else if self.matches(TokenKind::KwUntil) {
            Some(DoCondition::PreUntil(self.parse_expr()?))
        } else {
            None
        };
        let body = self.parse_block_until(&[TokenKind::KwLoop])?;
        self.expect(TokenKind::KwLoop, "LOOP")?;
        let condition = if let Some(c) = pre {
            Some(c)
        } else if self.matches(TokenKind::KwWhile) {
            Some(DoCondition::PostWhile(self.parse_expr()?))
        } else if self.matches(TokenKind::KwUntil) {
            Some(DoCondition::PostUntil(self.parse_expr()?))
        } else {
            None
        };
        Ok(StmtKind::DoLoop { condition, body })
    }

    fn parse_repeat(&mut self) -> PResult<StmtKind> {
        self.advance();
        let body = self.parse_block_until(&[TokenKind::KwUntil])?;
        self.expect(TokenKind::KwUntil, "UNTIL")?;
        let until = self.parse_expr()?;
        Ok(StmtKind::Repeat { body, until })
    }

    fn parse_select_case(&mut self) -> PResult<StmtKind> {
        self.advance();
        self.expect(TokenKind::KwCase, "CASE")?;
        let selector = self.parse_expr()?;
        self.skip_separators();
        let mut cases = Vec::new();
        let mut otherwise = None;
        while self.check(TokenKind::KwCase) {
            self.advance();
            if self.matches(TokenKind::KwElse) {
                otherwise = Some(self.parse_block_until(&[
                    TokenKind::KwCase,
                    TokenKind::KwEndSelect,
                    TokenKind::KwEndCase,
                ])?);
                break;
            }
            let mut matches_exprs = vec![self.parse_expr()?];
            while self.matches(TokenKind::Comma) {
                matches_exprs.push(self.parse_expr()?);
            }
            let body = self.parse_block_until(&[
                TokenKind::KwCase,
                TokenKind::KwEndSelect,
                TokenKind::KwEndCase,
            ])?;
            cases.push((matches_exprs, body));
        }
        if !self.matches(TokenKind::KwEndSelect) {
            self.expect(TokenKind::KwEndCase, "END SELECT")?;
        }
        Ok(StmtKind::SelectCase {
            selector,
            cases,
            otherwise,
        })
    }

    fn parse_try(&mut self) -> PResult<StmtKind> {
        self.advance();
        let try_body = self.parse_block_until_word(&[TokenKind::KwCatch, TokenKind::KwFinally], "TRY")?;
        let mut catches = Vec::new();
        while self.matches(TokenKind::KwCatch) {
            let name = if self.check(TokenKind::Identifier) {
                Some(self.parse_name()?)
            } else {
                None
            };
            let body =
                self.parse_block_until_word(&[TokenKind::KwCatch, TokenKind::KwFinally], "TRY")?;
            catches.push((name, body));
        }
        let finally = if self.matches(TokenKind::KwFinally) {
            Some(self.parse_block_until_word(&[], "TRY")?)
        } else {
            None
        };
        self.consume_end_word("TRY", "END TRY")?;
        Ok(StmtKind::TryCatch {
            try_body,
            catches,
            finally,
        })
    }

    /// Like [`Self::parse_block_until`], but the closing boundary is the
    /// two-token `END <word>` form rather than a single terminator token.
    fn parse_block_until_word(&mut self, stops: &[TokenKind], word: &str) -> PResult<Vec<Stmt>> {
        let mut body = Vec::new();
        self.skip_separators();
        while !self.at_eof() && !stops.contains(&self.peek_kind()) && !self.at_end_word(word) {
            body.push(self.parse_statement()?);
            self.skip_separators();
        }
        Ok(body)
    }

    fn parse_jump_target(&mut self) -> PResult<JumpTarget> {
        if let TokenKind::NumberLiteral = self.peek_kind() {
            let n = self.peek().number.unwrap_or(0.0) as i32;
            self.advance();
            Ok(JumpTarget::Line(n))
        } else {
            Ok(JumpTarget::Label(self.parse_name()?))
        }
    }

    fn parse_goto(&mut self) -> PResult<StmtKind> {
        self.advance();
        Ok(StmtKind::Goto {
            target: self.parse_jump_target()?,
        })
    }

    fn parse_gosub(&mut self) -> PResult<StmtKind> {
        self.advance();
        Ok(StmtKind::Gosub {
            target: self.parse_jump_target()?,
        })
    }

    fn parse_on_goto(&mut self) -> PResult<StmtKind> {
        self.advance();
        let selector = self.parse_expr()?;
        let is_gosub = if self.matches(TokenKind::KwGoto) {
            false
        } else {
            self.expect(TokenKind::KwGosub, "GOTO or GOSUB")?;
            true
        };
        let mut targets = vec![self.parse_jump_target()?];
        while self.matches(TokenKind::Comma) {
            targets.push(self.parse_jump_target()?);
        }
        Ok(StmtKind::OnGoto {
            selector,
            targets,
            is_gosub,
        })
    }

    fn parse_exit(&mut self) -> PResult<StmtKind> {
        self.advance();
        let kind = match self.peek_kind() {
            TokenKind::KwFor => ExitKind::For,
            TokenKind::KwDo => ExitKind::Do,
            TokenKind::KwWhile => ExitKind::While,
            TokenKind::KwRepeat => ExitKind::Repeat,
            _ => return Err(format!("expected loop kind after EXIT at {}", self.loc())),
        };
        self.advance();
        Ok(StmtKind::Exit { kind })
    }

    fn parse_params(&mut self) -> PResult<Vec<Param>> {
        let mut params = Vec::new();
        self.expect(TokenKind::LParen, "'('")?;
        if !self.check(TokenKind::RParen) {
            loop {
                let by_ref = self.matches(TokenKind::KwByRef);
                self.matches(TokenKind::KwByVal);
                let name = self.parse_name()?;
                let as_type = self.parse_as_type()?;
                params.push(Param {
                    name,
                    as_type,
                    by_ref,
                });
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(params)
    }

    fn parse_function(&mut self) -> PResult<StmtKind> {
        self.advance();
        let name = self.parse_name()?;
        let params = self.parse_params()?;
        let return_type = self.parse_as_type()?;
        if self.matches(TokenKind::Equal) {
            let inline_expr = self.parse_expr()?;
            return Ok(StmtKind::FunctionDef {
                name,
                params,
                return_type,
                body: Vec::new(),
                inline_expr: Some(inline_expr),
            });
        }
        let body = self.parse_block_until(&[TokenKind::KwEndFunction])?;
        self.expect(TokenKind::KwEndFunction, "END FUNCTION")?;
        Ok(StmtKind::FunctionDef {
            name,
            params,
            return_type,
            body,
            inline_expr: None,
        })
    }

    fn parse_sub(&mut self) -> PResult<StmtKind> {
        self.advance();
        let name = self.parse_name()?;
        let params = self.parse_params()?;
        let body = self.parse_block_until(&[TokenKind::KwEndSub])?;
        self.expect(TokenKind::KwEndSub, "END SUB")?;
        Ok(StmtKind::SubDef { name, params, body })
    }

    fn parse_type_def(&mut self) -> PResult<StmtKind> {
        self.advance();
        let name = self.parse_name()?;
        self.skip_separators();
        let mut fields = Vec::new();
        while !self.check(TokenKind::KwEndType) && !self.at_eof() {
            let fname = self.parse_name()?;
            self.expect(TokenKind::KwAs, "AS")?;
            let as_type = self.parse_name()?;
            fields.push(FieldDef {
                name: fname,
                as_type,
                builtin: true,
            });
            self.skip_separators();
        }
        self.expect(TokenKind::KwEndType, "END TYPE")?;
        Ok(StmtKind::TypeDef { name, fields })
    }

    fn parse_method(&mut self) -> PResult<MethodDef> {
        self.expect(TokenKind::KwMethod, "METHOD")?;
        let name = self.parse_name()?;
        let params = self.parse_params()?;
        let return_type = self.parse_as_type()?;
        let body = self.parse_block_until_word(&[], "METHOD")?;
        self.consume_end_word("METHOD", "END METHOD")?;
        Ok(MethodDef {
            name,
            params,
            return_type,
            body,
        })
    }

    fn parse_class(&mut self) -> PResult<StmtKind> {
        self.advance();
        let name = self.parse_name()?;
        let parent = if self.matches(TokenKind::KwExtends) {
            Some(self.parse_name()?)
        } else {
            None
        };
        self.skip_separators();
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        let mut constructor = None;
        let mut destructor = None;
        while !self.at_end_word("CLASS") && !self.at_eof() {
            match self.peek_kind() {
                TokenKind::KwMethod => methods.push(self.parse_method()?),
                TokenKind::KwConstructor => {
                    self.advance();
                    let params = self.parse_params()?;
                    let body = self.parse_block_until_word(&[], "CONSTRUCTOR")?;
                    self.consume_end_word("CONSTRUCTOR", "END CONSTRUCTOR")?;
                    constructor = Some(MethodDef {
                        name: "CONSTRUCTOR".to_string(),
                        params,
                        return_type: None,
                        body,
                    });
                }
                TokenKind::KwDestructor => {
                    self.advance();
                    let params = self.parse_params()?;
                    let body = self.parse_block_until_word(&[], "DESTRUCTOR")?;
                    self.consume_end_word("DESTRUCTOR", "END DESTRUCTOR")?;
                    destructor = Some(MethodDef {
                        name: "DESTRUCTOR".to_string(),
                        params,
                        return_type: None,
                        body,
                    });
                }
                TokenKind::Identifier => {
                    let fname = self.parse_name()?;
                    self.expect(TokenKind::KwAs, "AS")?;
                    let as_type = self.parse_name()?;
                    fields.push(FieldDef {
                        name: fname,
                        as_type,
                        builtin: true,
                    });
                }
                _ => {
                    return Err(format!(
                        "unexpected token in CLASS body at {}: {:?}",
                        self.loc(),
                        self.peek_kind()
                    ))
                }
            }
            self.skip_separators();
        }
        self.consume_end_word("CLASS", "END CLASS")?;
        Ok(StmtKind::ClassDef {
            name,
            parent,
            fields,
            methods,
            constructor,
            destructor,
        })
    }

    fn parse_data(&mut self) -> PResult<StmtKind> {
        self.advance();
        let mut values = Vec::new();
        loop {
            match self.peek_kind() {
                TokenKind::NumberLiteral => {
                    let n = self.peek().number.unwrap_or(0.0);
                    self.advance();
                    if n.fract() == 0.0 {
                        values.push(DataLiteral::Integer(n as i64));
                    } else {
                        values.push(DataLiteral::Double(n));
                    }
                }
                TokenKind::StringLiteral => {
                    let lex = self.peek().lexeme;
                    let s = lex.trim_start_matches('"').trim_end_matches('"').to_string();
                    self.advance();
                    values.push(DataLiteral::Str(s));
                }
                _ => break,
            }
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        Ok(StmtKind::Data { values })
    }

    fn parse_read(&mut self) -> PResult<StmtKind> {
        self.advance();
        let mut targets = vec![self.parse_lvalue()?];
        while self.matches(TokenKind::Comma) {
            targets.push(self.parse_lvalue()?);
        }
        Ok(StmtKind::Read { targets })
    }

    fn parse_restore(&mut self) -> PResult<StmtKind> {
        self.advance();
        let target = if matches!(self.peek_kind(), TokenKind::Identifier | TokenKind::NumberLiteral)
        {
            Some(self.parse_jump_target()?)
        } else {
            None
        };
        Ok(StmtKind::Restore { target })
    }

    fn parse_inc_dec(&mut self, inc: bool) -> PResult<StmtKind> {
        self.advance();
        let target = self.parse_lvalue()?;
        Ok(if inc {
            StmtKind::Inc { target }
        } else {
            StmtKind::Dec { target }
        })
    }

    fn parse_swap(&mut self) -> PResult<StmtKind> {
        self.advance();
        let a = self.parse_lvalue()?;
        self.expect(TokenKind::Comma, "','")?;
        let b = self.parse_lvalue()?;
        Ok(StmtKind::Swap { a, b })
    }

    /// A block-closer keyword reached outside `parse_for`/`parse_while`/
    /// `parse_do`/`parse_repeat` has no opener to match; consume the rest of
    /// the line and hand semantic analysis an [`StmtKind::Orphan`] to report.
    fn parse_orphan_closer(&mut self) -> PResult<StmtKind> {
        let keyword = self.peek().lexeme.to_ascii_uppercase();
        self.advance();
        while !matches!(
            self.peek_kind(),
            TokenKind::EndOfLine | TokenKind::EndOfFile | TokenKind::Colon
        ) {
            self.advance();
        }
        Ok(StmtKind::Orphan { keyword })
    }

    /// A bare identifier statement is either `LABEL:` or a `CALL`-style sub
    /// invocation, `Name arg1, arg2`.
    fn parse_label_or_call(&mut self) -> PResult<StmtKind> {
        let name = self.parse_name()?;
        if self.matches(TokenKind::Colon) {
            return Ok(StmtKind::Label { name });
        }
        let mut args = Vec::new();
        if !matches!(
            self.peek_kind(),
            TokenKind::EndOfLine | TokenKind::EndOfFile | TokenKind::Colon
        ) {
            loop {
                args.push(self.parse_expr()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        Ok(StmtKind::Call { name, args })
    }

    // --- expressions (precedence climbing) ---

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_and()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::KwOr => BinOp::Or,
                TokenKind::KwXor => BinOp::Xor,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                location: loc,
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_not()?;
        while self.check(TokenKind::KwAnd) {
            let loc = self.loc();
            self.advance();
            let rhs = self.parse_not()?;
            lhs = Expr {
                kind: ExprKind::Binary {
                    op: BinOp::And,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                location: loc,
            };
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> PResult<Expr> {
        if self.check(TokenKind::KwNot) {
            let loc = self.loc();
            self.advance();
            let operand = self.parse_not()?;
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op: UnOp::Not,
                    operand: Box::new(operand),
                },
                location: loc,
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Equal => BinOp::Eq,
                TokenKind::NotEqual => BinOp::Ne,
                TokenKind::Less => BinOp::Lt,
                TokenKind::LessEqual => BinOp::Le,
                TokenKind::Greater => BinOp::Gt,
                TokenKind::GreaterEqual => BinOp::Ge,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                location: loc,
            };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                location: loc,
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::BackSlash => BinOp::IntDiv,
                TokenKind::KwMod => BinOp::Mod,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                location: loc,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        if self.check(TokenKind::Minus) {
            let loc = self.loc();
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op: UnOp::Neg,
                    operand: Box::new(operand),
                },
                location: loc,
            });
        }
        if self.matches(TokenKind::Plus) {
            return self.parse_unary();
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> PResult<Expr> {
        let base = self.parse_postfix()?;
        if self.check(TokenKind::Caret) {
            let loc = self.loc();
            self.advance();
            let exp = self.parse_unary()?;
            return Ok(Expr {
                kind: ExprKind::Binary {
                    op: BinOp::Pow,
                    lhs: Box::new(base),
                    rhs: Box::new(exp),
                },
                location: loc,
            });
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.matches(TokenKind::Dot) {
                let loc = self.loc();
                let name = self.parse_name()?;
                if self.check(TokenKind::LParen) {
                    let args = self.parse_arg_list()?;
                    expr = Expr {
                        kind: ExprKind::MethodCall {
                            base: Box::new(expr),
                            method: name,
                            args,
                        },
                        location: loc,
                    };
                } else {
                    expr = Expr {
                        kind: ExprKind::FieldAccess {
                            base: Box::new(expr),
                            field: name,
                        },
                        location: loc,
                    };
                }
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_arg_list(&mut self) -> PResult<Vec<Expr>> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let loc = self.loc();
        match self.peek_kind() {
            TokenKind::NumberLiteral => {
                let n = self.peek().number.unwrap_or(0.0);
                self.advance();
                Ok(Expr {
                    kind: ExprKind::NumberLiteral(n),
                    location: loc,
                })
            }
            TokenKind::StringLiteral => {
                let lex = self.peek().lexeme;
                let s = lex.trim_start_matches('"').trim_end_matches('"').to_string();
                self.advance();
                Ok(Expr {
                    kind: ExprKind::StringLiteral(s),
                    location: loc,
                })
            }
            TokenKind::KwTrue => {
                self.advance();
                Ok(Expr {
                    kind: ExprKind::BoolLiteral(true),
                    location: loc,
                })
            }
            TokenKind::KwFalse => {
                self.advance();
                Ok(Expr {
                    kind: ExprKind::BoolLiteral(false),
                    location: loc,
                })
            }
            TokenKind::LParen => {
                self.advance();
                let e = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(e)
            }
            TokenKind::KwIif => {
                self.advance();
                self.expect(TokenKind::LParen, "'('")?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::Comma, "','")?;
                let then_value = self.parse_expr()?;
                self.expect(TokenKind::Comma, "','")?;
                let else_value = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(Expr {
                    kind: ExprKind::Iif {
                        cond: Box::new(cond),
                        then_value: Box::new(then_value),
                        else_value: Box::new(else_value),
                    },
                    location: loc,
                })
            }
            TokenKind::KwNew => {
                self.advance();
                let class_name = self.parse_name()?;
                let args = if self.check(TokenKind::LParen) {
                    self.parse_arg_list()?
                } else {
                    Vec::new()
                };
                Ok(Expr {
                    kind: ExprKind::New { class_name, args },
                    location: loc,
                })
            }
            TokenKind::KwCreate => {
                self.advance();
                let type_name = self.parse_name()?;
                let mut args = Vec::new();
                if self.matches(TokenKind::LParen) {
                    if !self.check(TokenKind::RParen) {
                        loop {
                            let field = self.parse_name()?;
                            self.expect(TokenKind::Colon, "':'")?;
                            let value = self.parse_expr()?;
                            args.push((field, value));
                            if !self.matches(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen, "')'")?;
                }
                Ok(Expr {
                    kind: ExprKind::Create { type_name, args },
                    location: loc,
                })
            }
            TokenKind::Identifier => {
                let name = self.parse_name()?;
                if self.check(TokenKind::LParen) {
                    let args = self.parse_arg_list()?;
                    // `NAME(args)` is ambiguous between a function call and
                    // an array index until the symbol table is consulted;
                    // the semantic analyzer resolves it (`pass2::use_expr`).
                    return Ok(Expr {
                        kind: ExprKind::Call { name, args },
                        location: loc,
                    });
                }
                Ok(Expr {
                    kind: ExprKind::Variable(name),
                    location: loc,
                })
            }
            _ => Err(format!(
                "unexpected token {:?} '{}' at {} while parsing expression",
                self.peek().kind,
                self.peek().lexeme,
                loc
            )),
        }
    }
}

fn suffix_char(sfx: TypeSuffix) -> char {
    match sfx {
        TypeSuffix::Percent => '%',
        TypeSuffix::Bang => '!',
        TypeSuffix::Hash => '#',
        TypeSuffix::At => '@',
        TypeSuffix::Amp => '&',
        TypeSuffix::Caret => '^',
        TypeSuffix::Dollar => '$',
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_empty_program() {
        let p = parse("").unwrap();
        assert!(p.statements.is_empty());
    }

    #[test]
    fn parses_hello_world() {
        let p = parse("PRINT \"Hello\"\n").unwrap();
        assert_eq!(p.statements.len(), 1);
        assert!(matches!(p.statements[0].kind, StmtKind::Print { .. }));
    }

    #[test]
    fn parses_if_else_diamond() {
        let src = "IF X > 0 THEN\nPRINT \"yes\"\nELSE\nPRINT \"no\"\nEND IF\n";
        let p = parse(src).unwrap();
        assert_eq!(p.statements.len(), 1);
        match &p.statements[0].kind {
            StmtKind::If { then_branch, else_branch, .. } => {
                assert_eq!(then_branch.len(), 1);
                assert!(else_branch.is_some());
            }
            _ => panic!("expected if"),
        }
    }

    #[test]
    fn parses_for_loop() {
        let src = "FOR I = 1 TO 10: PRINT I: NEXT I\n";
        let p = parse(src).unwrap();
        assert_eq!(p.statements.len(), 1);
        assert!(matches!(p.statements[0].kind, StmtKind::For { .. }));
    }

    #[test]
    fn parses_numbered_lines_and_goto() {
        let src = "10 GOTO 30\n20 PRINT \"dead\"\n30 END\n";
        let p = parse(src).unwrap();
        assert_eq!(p.statements.len(), 3);
        assert_eq!(p.statements[0].line_number, Some(10));
        assert!(matches!(p.statements[0].kind, StmtKind::Goto { .. }));
    }

    #[test]
    fn parses_class_with_inheritance() {
        let src = "CLASS Animal\nMETHOD Speak()\nEND METHOD\nEND CLASS\nCLASS Dog EXTENDS Animal\nMETHOD Speak()\nEND METHOD\nEND CLASS\n";
        let p = parse(src).unwrap();
        assert_eq!(p.statements.len(), 2);
        match &p.statements[1].kind {
            StmtKind::ClassDef { parent, .. } => assert_eq!(parent.as_deref(), Some("Animal")),
            _ => panic!("expected class"),
        }
    }
}
