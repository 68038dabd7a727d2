//! Surface-language compiler.
//!
//! A single pass over the token stream lowers each statement straight
//! to instructions while maintaining three pieces of compile-time
//! state: a model of the runtime belt (so names resolve to belt
//! positions), a stack of scopes (so branches and loops can check which
//! names cross their boundaries), and the local-variable allocator.
//!
//! The belt model makes two structural guarantees. At an `if`/`else`
//! join, positions where the branches disagree are marked inconsistent
//! and poison any later read by name. At a loop exit, every name read
//! across the loop boundary must sit at the same position with the same
//! signedness as before the body, so re-entering the loop from the top
//! cannot drift from the model.

mod lexer;

use std::collections::{HashMap, HashSet};
use std::mem;

use itertools::{EitherOrBoth, Itertools};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::belt::{BeltNum, Width};
use crate::consts::{BELT_SIZE, LANG_VERSION};
use crate::error::{CompileError, CompileErrorKind};
use crate::instruction::{
    ArithMode, ArithOp, Block, CastKind, Instruction, Operand, RelOp, SliceOpKind,
};
use lexer::{lex, LocatedToken, OpToken, Pos, Token};

lazy_static! {
    static ref REG_LIT: Regex = Regex::new(r"^(-?\d+)([iu])(8|16|32|64)$").unwrap();
    static ref REG_TYPE: Regex = Regex::new(r"^([iu])(8|16|32|64)$").unwrap();
    static ref REG_CAST: Regex =
        Regex::new(r"^(cast_extend|cast_wrap|cast_sat|cast_checked)(8|16|32|64)$").unwrap();
}

/// Compiled form of one program.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileResult {
    /// The top-level block.
    pub block: Block,
    /// Number of local slots the program uses.
    pub num_locals: usize,
}

/// Surface-language to instruction-stream compiler.
///
/// Each [`compile`](Compiler::compile) call starts from a clean state;
/// nothing leaks between programs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Compiler;

impl Compiler {
    /// A new compiler.
    pub fn new() -> Self {
        Self
    }

    /// Compile one program.
    pub fn compile(&self, src: &str) -> Result<CompileResult, CompileError> {
        let tokens = lex(src)?;
        let result = Lowering::new(tokens).program()?;
        debug!(num_locals = result.num_locals, "compiled program");
        Ok(result)
    }
}

/// Compile-time model of one belt slot.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ModelItem {
    name: String,
    is_signed: Option<bool>,
    is_slice: bool,
    is_consistent: bool,
    /// What the other branch left here, kept for diagnostics.
    other: Option<Box<ModelItem>>,
}

impl ModelItem {
    fn new(name: &str, is_signed: Option<bool>, is_slice: bool) -> Self {
        Self {
            name: name.to_string(),
            is_signed,
            is_slice,
            is_consistent: true,
            other: None,
        }
    }

    /// Stand-in for a position only one branch produced.
    fn filler() -> Self {
        Self {
            name: String::new(),
            is_signed: None,
            is_slice: false,
            is_consistent: false,
            other: None,
        }
    }
}

#[derive(Debug, Clone)]
struct LocalSlot {
    is_signed: Option<bool>,
    is_slice: bool,
    index: usize,
}

#[derive(Debug, Default)]
struct Scope {
    name: Option<String>,
    /// Names pushed while this scope was innermost.
    introduced: HashSet<String>,
    /// Names read here that an enclosing scope introduced.
    crossed: Vec<String>,
}

impl Scope {
    fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }
}

enum AssignTarget {
    Local(String, Pos),
    Names(Vec<String>, Pos),
}

enum OpCategory {
    Checked(ArithOp),
    Widening(ArithOp),
    Rel(RelOp),
}

struct Lowering {
    tokens: Vec<LocatedToken>,
    cursor: usize,
    belt: Vec<ModelItem>,
    locals: HashMap<String, LocalSlot>,
    scopes: Vec<Scope>,
}

impl Lowering {
    fn new(tokens: Vec<LocatedToken>) -> Self {
        Self {
            tokens,
            cursor: 0,
            belt: Vec::new(),
            locals: HashMap::new(),
            scopes: Vec::new(),
        }
    }

    /* token cursor */

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|t| &t.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.cursor + offset).map(|t| &t.token)
    }

    fn location(&self) -> Pos {
        self.tokens
            .get(self.cursor)
            .or_else(|| self.tokens.last())
            .map(|t| t.pos)
            .unwrap_or(Pos { line: 1, column: 1 })
    }

    fn err(&self, kind: CompileErrorKind, pos: Pos) -> CompileError {
        CompileError {
            kind,
            line: pos.line,
            column: pos.column,
        }
    }

    fn next_token(&mut self) -> Result<(Token, Pos), CompileError> {
        let pos = self.location();
        let located = self
            .tokens
            .get(self.cursor)
            .ok_or_else(|| self.err(CompileErrorKind::UnexpectedEnd, pos))?;
        self.cursor += 1;
        Ok((located.token.clone(), located.pos))
    }

    fn expect(&mut self, token: Token, expected: &'static str) -> Result<Pos, CompileError> {
        let (found, pos) = self.next_token()?;
        if found != token {
            return Err(self.err(
                CompileErrorKind::UnexpectedToken {
                    found: found.to_string(),
                    expected,
                },
                pos,
            ));
        }
        Ok(pos)
    }

    fn expect_ident(&mut self, expected: &'static str) -> Result<(String, Pos), CompileError> {
        match self.next_token()? {
            (Token::Ident(name), pos) => Ok((name, pos)),
            (found, pos) => Err(self.err(
                CompileErrorKind::UnexpectedToken {
                    found: found.to_string(),
                    expected,
                },
                pos,
            )),
        }
    }

    /* belt model */

    fn push_item(&mut self, name: &str, is_signed: Option<bool>, is_slice: bool) {
        self.belt.insert(0, ModelItem::new(name, is_signed, is_slice));
        self.belt.truncate(BELT_SIZE);
        if let Some(scope) = self.scopes.last_mut() {
            scope.introduced.insert(name.to_string());
        }
    }

    fn get_item(
        &mut self,
        name: &str,
        want_slice: Option<bool>,
        pos: Pos,
    ) -> Result<(usize, ModelItem), CompileError> {
        let Some(index) = self.belt.iter().position(|item| item.name == name) else {
            return Err(self.err(CompileErrorKind::ItemNotFound(name.to_string()), pos));
        };
        let item = self.belt[index].clone();
        if !item.is_consistent {
            let other = item
                .other
                .as_ref()
                .map(|o| o.name.clone())
                .unwrap_or_default();
            return Err(self.err(
                CompileErrorKind::InconsistentItem {
                    name: name.to_string(),
                    other,
                },
                pos,
            ));
        }
        if let Some(want_slice) = want_slice {
            if item.is_slice != want_slice {
                return Err(self.err(
                    CompileErrorKind::TypeMismatch {
                        name: name.to_string(),
                        found: if item.is_slice { "slice" } else { "number" },
                    },
                    pos,
                ));
            }
        }
        if let Some(scope) = self.scopes.last_mut() {
            if !scope.introduced.contains(name) {
                scope.crossed.push(name.to_string());
            }
        }
        Ok((index, item))
    }

    fn check_signs(
        &self,
        a_name: &str,
        a: &ModelItem,
        b_name: &str,
        b: &ModelItem,
        pos: Pos,
    ) -> Result<bool, CompileError> {
        if a.is_signed != b.is_signed {
            return Err(self.err(
                CompileErrorKind::SignednessMismatch {
                    a: a_name.to_string(),
                    b: b_name.to_string(),
                },
                pos,
            ));
        }
        Ok(a.is_signed.unwrap_or(false))
    }

    /* program structure */

    fn program(mut self) -> Result<CompileResult, CompileError> {
        self.version()?;
        let mut code = Vec::new();
        while self.peek().is_some() {
            code.extend(self.statement()?);
        }
        Ok(CompileResult {
            block: Block::new(code),
            num_locals: self.locals.len(),
        })
    }

    fn version(&mut self) -> Result<(), CompileError> {
        let (word, pos) = self.expect_ident("`version`")?;
        if word != "version" {
            return Err(self.err(
                CompileErrorKind::UnexpectedToken {
                    found: word,
                    expected: "`version`",
                },
                pos,
            ));
        }
        let (major, vpos) = self.expect_ident("a version number")?;
        self.expect(Token::Dot, "`.`")?;
        let (minor, _) = self.expect_ident("a version number")?;
        self.expect(Token::Dot, "`.`")?;
        let (patch, _) = self.expect_ident("a version number")?;
        self.expect(Token::Semi, "`;`")?;
        let version = format!("{major}.{minor}.{patch}");
        if version != LANG_VERSION {
            return Err(self.err(CompileErrorKind::UnsupportedVersion(version), vpos));
        }
        Ok(())
    }

    fn block_statements(&mut self) -> Result<Vec<Instruction>, CompileError> {
        self.expect(Token::LBrace, "`{`")?;
        let mut code = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.err(CompileErrorKind::UnexpectedEnd, self.location())),
                Some(Token::RBrace) => {
                    self.next_token()?;
                    return Ok(code);
                }
                Some(_) => code.extend(self.statement()?),
            }
        }
    }

    fn statement(&mut self) -> Result<Vec<Instruction>, CompileError> {
        let first = self.peek().cloned();
        let second = self.peek_at(1).cloned();
        match first {
            Some(Token::Local(_)) => self.assign(),
            Some(Token::Ident(word)) => match (word.as_str(), second) {
                ("loop", Some(Token::Ident(_))) => self.loop_statement(),
                ("if", Some(Token::Ident(_))) => self.if_statement(),
                (_, Some(Token::LParen)) => self.call_statement(),
                (_, Some(Token::LBracket)) => self.store_statement(),
                _ => self.assign(),
            },
            Some(token) => Err(self.err(
                CompileErrorKind::UnexpectedToken {
                    found: token.to_string(),
                    expected: "a statement",
                },
                self.location(),
            )),
            None => Err(self.err(CompileErrorKind::UnexpectedEnd, self.location())),
        }
    }

    /* control flow */

    fn loop_statement(&mut self) -> Result<Vec<Instruction>, CompileError> {
        self.next_token()?;
        let (name, pos) = self.expect_ident("a loop name")?;
        let belt_before = self.belt.clone();
        self.scopes.push(Scope::named(&name));
        let code = self.block_statements()?;
        let scope = self.scopes.pop().expect("loop scope pushed above");

        for crossed in &scope.crossed {
            let Some(after) = self.belt.iter().position(|item| item.name == *crossed) else {
                return Err(self.err(CompileErrorKind::LoopVariableLost(crossed.clone()), pos));
            };
            let Some(before) = belt_before.iter().position(|item| item.name == *crossed) else {
                return Err(self.err(CompileErrorKind::LoopVariableNew(crossed.clone()), pos));
            };
            if self.belt[after].is_signed != belt_before[before].is_signed {
                return Err(self.err(CompileErrorKind::LoopVariableSign(crossed.clone()), pos));
            }
            if after != before {
                return Err(self.err(
                    CompileErrorKind::LoopVariableMoved {
                        name: crossed.clone(),
                        before,
                        after,
                    },
                    pos,
                ));
            }
        }
        Ok(vec![Instruction::Loop(Block::new(code))])
    }

    fn if_statement(&mut self) -> Result<Vec<Instruction>, CompileError> {
        self.next_token()?;
        let (condition, cpos) = self.expect_ident("a condition name")?;
        let (condition_idx, _) = self.get_item(&condition, Some(false), cpos)?;

        let old_belt = self.belt.clone();
        self.scopes.push(Scope::default());
        let then_code = self.block_statements()?;
        self.scopes.pop();

        let (other_belt, else_code) =
            if matches!(self.peek(), Some(Token::Ident(word)) if word == "else") {
                self.next_token()?;
                let then_belt = mem::replace(&mut self.belt, old_belt);
                self.scopes.push(Scope::default());
                let else_code = self.block_statements()?;
                self.scopes.pop();
                (then_belt, else_code)
            } else {
                (old_belt, Vec::new())
            };
        self.merge_branches(other_belt);

        Ok(vec![Instruction::If {
            condition: condition_idx,
            then_block: Block::new(then_code),
            else_block: Block::new(else_code),
        }])
    }

    /// Join the two branch belts: positions that disagree on name,
    /// signedness, kind or consistency become inconsistent and remember
    /// the other branch's descriptor.
    fn merge_branches(&mut self, other_belt: Vec<ModelItem>) {
        let current = mem::take(&mut self.belt);
        self.belt = current
            .into_iter()
            .zip_longest(other_belt)
            .map(|pair| {
                let (item, other) = match pair {
                    EitherOrBoth::Both(item, other) => (item, other),
                    EitherOrBoth::Left(item) => (item, ModelItem::filler()),
                    EitherOrBoth::Right(other) => (ModelItem::filler(), other),
                };
                if item.is_consistent
                    && other.is_consistent
                    && item.name == other.name
                    && item.is_signed == other.is_signed
                    && item.is_slice == other.is_slice
                {
                    item
                } else {
                    ModelItem {
                        name: item.name,
                        is_signed: item.is_signed,
                        is_slice: item.is_slice,
                        is_consistent: false,
                        other: Some(Box::new(other)),
                    }
                }
            })
            .collect();
    }

    /* statements */

    fn assign(&mut self) -> Result<Vec<Instruction>, CompileError> {
        let target = self.assign_target()?;
        self.expect(Token::Assign, "`=`")?;
        let code = self.expression(target)?;
        self.expect(Token::Semi, "`;`")?;
        Ok(code)
    }

    fn assign_target(&mut self) -> Result<AssignTarget, CompileError> {
        match self.next_token()? {
            (Token::Local(name), pos) => Ok(AssignTarget::Local(name, pos)),
            (Token::Ident(name), pos) => {
                let mut names = vec![name];
                while self.peek() == Some(&Token::Comma) {
                    self.next_token()?;
                    match self.peek() {
                        Some(Token::Ident(_)) => {
                            let (name, _) = self.expect_ident("a result name")?;
                            names.push(name);
                        }
                        // Trailing comma before `=`.
                        _ => break,
                    }
                }
                Ok(AssignTarget::Names(names, pos))
            }
            (found, pos) => Err(self.err(
                CompileErrorKind::UnexpectedToken {
                    found: found.to_string(),
                    expected: "an assignment target",
                },
                pos,
            )),
        }
    }

    fn store_statement(&mut self) -> Result<Vec<Instruction>, CompileError> {
        let (target, tpos) = self.expect_ident("a slice name")?;
        self.expect(Token::LBracket, "`[`")?;
        let offset = self.offset()?;
        self.expect(Token::RBracket, "`]`")?;
        self.expect(Token::Assign, "`=`")?;
        let (value, vpos) = self.expect_ident("a value name")?;
        self.expect(Token::Semi, "`;`")?;

        let (slice_idx, _) = self.get_item(&target, Some(true), tpos)?;
        let (value_idx, _) = self.get_item(&value, Some(false), vpos)?;
        Ok(vec![Instruction::Store {
            value: value_idx,
            slice: slice_idx,
            offset,
        }])
    }

    fn offset(&mut self) -> Result<usize, CompileError> {
        let (text, pos) = self.expect_ident("an offset")?;
        if !text.chars().all(|c| c.is_ascii_digit()) {
            return Err(self.err(
                CompileErrorKind::UnexpectedToken {
                    found: text,
                    expected: "an offset",
                },
                pos,
            ));
        }
        text.parse().map_err(|_| {
            self.err(
                CompileErrorKind::UnexpectedToken {
                    found: text.clone(),
                    expected: "an offset",
                },
                pos,
            )
        })
    }

    fn call_statement(&mut self) -> Result<Vec<Instruction>, CompileError> {
        let (call, pos) = self.expect_ident("a statement")?;
        let params = self.params()?;
        self.expect(Token::Semi, "`;`")?;

        let arity = |expected: &'static str, ok: bool| {
            if ok {
                Ok(())
            } else {
                Err(self.err(
                    CompileErrorKind::BadArity {
                        call: call.clone(),
                        expected,
                        found: params.len(),
                    },
                    pos,
                ))
            }
        };

        match call.as_str() {
            "unreachable" => {
                arity("no", params.is_empty())?;
                Ok(vec![Instruction::Unreachable])
            }
            "nop" => {
                arity("no", params.is_empty())?;
                Ok(vec![Instruction::Nop])
            }
            "br" | "continue" => {
                arity("at most 1", params.len() <= 1)?;
                let depth = self.break_depth(params.first())?;
                Ok(vec![if call == "br" {
                    Instruction::Br(depth)
                } else {
                    Instruction::BrContinue(depth)
                }])
            }
            "br_if" => {
                arity("1 or 2", matches!(params.len(), 1 | 2))?;
                let depth = self.break_depth(params.get(1))?;
                let (condition_name, cpos) = &params[0];
                let (condition, _) = self.get_item(condition_name, Some(false), *cpos)?;
                Ok(vec![Instruction::BrIf { condition, depth }])
            }
            "verify" | "verify_ok" => {
                arity("exactly 1", params.len() == 1)?;
                let (name, npos) = &params[0];
                let (index, _) = self.get_item(name, Some(false), *npos)?;
                Ok(vec![if call == "verify" {
                    Instruction::Verify(index)
                } else {
                    Instruction::VerifyOk(index)
                }])
            }
            "verify_eq" => {
                arity("exactly 2", params.len() == 2)?;
                let (a_name, apos) = &params[0];
                let (b_name, bpos) = &params[1];
                let (a, a_item) = self.get_item(a_name, Some(false), *apos)?;
                let (b, b_item) = self.get_item(b_name, Some(false), *bpos)?;
                let is_signed = self.check_signs(a_name, &a_item, b_name, &b_item, *bpos)?;
                Ok(vec![Instruction::RelVerify {
                    a,
                    b,
                    is_signed,
                    op: RelOp::Eq,
                }])
            }
            _ => Err(self.err(CompileErrorKind::UnknownFunction(call), pos)),
        }
    }

    fn params(&mut self) -> Result<Vec<(String, Pos)>, CompileError> {
        self.expect(Token::LParen, "`(`")?;
        let mut params = Vec::new();
        loop {
            match self.peek() {
                Some(Token::RParen) => {
                    self.next_token()?;
                    return Ok(params);
                }
                Some(Token::Ident(_)) => {
                    let (name, pos) = self.expect_ident("an argument name")?;
                    params.push((name, pos));
                    if self.peek() == Some(&Token::Comma) {
                        self.next_token()?;
                    }
                }
                _ => {
                    let pos = self.location();
                    let (found, _) = self.next_token()?;
                    return Err(self.err(
                        CompileErrorKind::UnexpectedToken {
                            found: found.to_string(),
                            expected: "an argument name or `)`",
                        },
                        pos,
                    ));
                }
            }
        }
    }

    /// Resolve a break target: unnamed breaks leave the innermost
    /// block, named ones search the scope stack outward.
    fn break_depth(&self, scope: Option<&(String, Pos)>) -> Result<usize, CompileError> {
        match scope {
            None => Ok(1),
            Some((name, pos)) => self
                .scopes
                .iter()
                .rev()
                .position(|s| s.name.as_deref() == Some(name.as_str()))
                .map(|index| index + 1)
                .ok_or_else(|| self.err(CompileErrorKind::ScopeNotFound(name.clone()), *pos)),
        }
    }

    /* expressions */

    fn expression(&mut self, target: AssignTarget) -> Result<Vec<Instruction>, CompileError> {
        let first = self.peek().cloned();
        let second = self.peek_at(1).cloned();
        match first {
            Some(Token::Op(OpToken::Sub)) => {
                let (_, pos) = self.next_token()?;
                let (body, _) = self.expect_ident("a literal")?;
                self.literal(target, &format!("-{body}"), pos)
            }
            Some(Token::Ident(word)) => match second {
                Some(Token::LParen) => self.call_expression(target),
                Some(Token::LBracket) => self.bracket_expression(target),
                Some(Token::Op(_)) => self.operation(target),
                _ => {
                    let (_, pos) = self.next_token()?;
                    if is_literal_text(&word) {
                        self.literal(target, &word, pos)
                    } else {
                        self.name_expression(target, &word, pos, false)
                    }
                }
            },
            Some(Token::Local(name)) => {
                let (_, pos) = self.next_token()?;
                self.name_expression(target, &name, pos, true)
            }
            Some(token) => Err(self.err(
                CompileErrorKind::UnexpectedToken {
                    found: token.to_string(),
                    expected: "an expression",
                },
                self.location(),
            )),
            None => Err(self.err(CompileErrorKind::UnexpectedEnd, self.location())),
        }
    }

    fn single_name(
        &self,
        target: AssignTarget,
        produces: &str,
    ) -> Result<(String, Pos), CompileError> {
        match target {
            AssignTarget::Local(_, pos) => {
                Err(self.err(CompileErrorKind::LocalFromExpression, pos))
            }
            AssignTarget::Names(mut names, pos) => {
                if names.len() != 1 {
                    return Err(self.err(
                        CompileErrorKind::BadResultArity {
                            call: produces.to_string(),
                            expected: 1,
                            found: names.len(),
                        },
                        pos,
                    ));
                }
                Ok((names.remove(0), pos))
            }
        }
    }

    fn literal(
        &mut self,
        target: AssignTarget,
        text: &str,
        pos: Pos,
    ) -> Result<Vec<Instruction>, CompileError> {
        if let AssignTarget::Local(..) = target {
            return Err(self.err(CompileErrorKind::LiteralToLocal, pos));
        }
        let (name, _) = self.single_name(target, "a literal")?;
        let cleaned = text.replace('_', "");
        let Some(caps) = REG_LIT.captures(&cleaned) else {
            return Err(self.err(CompileErrorKind::BadLiteral(text.to_string()), pos));
        };
        let value: i128 = caps[1]
            .parse()
            .map_err(|_| self.err(CompileErrorKind::LiteralOutOfRange(text.to_string()), pos))?;
        let is_signed = &caps[2] == "i";
        let width = Width::from_bits(caps[3].parse().unwrap_or(0))
            .ok_or_else(|| self.err(CompileErrorKind::BadLiteral(text.to_string()), pos))?;
        if value < width.min_value(is_signed) || value > width.max_value(is_signed) {
            return Err(self.err(CompileErrorKind::LiteralOutOfRange(text.to_string()), pos));
        }
        self.push_item(&name, Some(is_signed), false);
        Ok(vec![Instruction::Const(BeltNum::from_signed(value, width))])
    }

    fn name_expression(
        &mut self,
        target: AssignTarget,
        source: &str,
        pos: Pos,
        source_is_local: bool,
    ) -> Result<Vec<Instruction>, CompileError> {
        match target {
            AssignTarget::Local(local_name, _) => {
                if source_is_local {
                    return Err(self.err(CompileErrorKind::LocalFromLocal, pos));
                }
                self.get_item(source, None, pos)?;
                let front = self.belt.first().cloned().unwrap_or_else(ModelItem::filler);
                if front.name != source {
                    return Err(self.err(
                        CompileErrorKind::NotFrontOfBelt {
                            front: front.name,
                            requested: source.to_string(),
                        },
                        pos,
                    ));
                }
                let next_index = self.locals.len();
                let slot = self.locals.entry(local_name).or_insert_with(|| LocalSlot {
                    is_signed: front.is_signed,
                    is_slice: front.is_slice,
                    index: next_index,
                });
                Ok(vec![Instruction::LocalSet(slot.index)])
            }
            AssignTarget::Names(names, tpos) => {
                if !source_is_local {
                    return Err(self.err(CompileErrorKind::BeltToBelt, pos));
                }
                let target = AssignTarget::Names(names, tpos);
                let (name, _) = self.single_name(target, "a local read")?;
                let slot = self
                    .locals
                    .get(source)
                    .cloned()
                    .ok_or_else(|| self.err(CompileErrorKind::LocalNotDefined(source.to_string()), pos))?;
                self.push_item(&name, slot.is_signed, slot.is_slice);
                Ok(vec![Instruction::LocalGet(slot.index)])
            }
        }
    }

    fn operation(&mut self, target: AssignTarget) -> Result<Vec<Instruction>, CompileError> {
        let (a_name, apos) = self.expect_ident("an operand name")?;
        let (op, oppos) = match self.next_token()? {
            (Token::Op(op), pos) => (op, pos),
            (found, pos) => {
                return Err(self.err(
                    CompileErrorKind::UnexpectedToken {
                        found: found.to_string(),
                        expected: "an operator",
                    },
                    pos,
                ))
            }
        };
        let (b_name, bpos) = self.expect_ident("an operand name")?;

        let (a, a_item) = self.get_item(&a_name, Some(false), apos)?;
        let (b, b_item) = self.get_item(&b_name, Some(false), bpos)?;
        let is_signed = self.check_signs(&a_name, &a_item, &b_name, &b_item, oppos)?;

        let category = match op {
            OpToken::WideAdd => OpCategory::Widening(ArithOp::Add),
            OpToken::WideSub => OpCategory::Widening(ArithOp::Sub),
            OpToken::WideMul => OpCategory::Widening(ArithOp::Mul),
            OpToken::Add => OpCategory::Checked(ArithOp::Add),
            OpToken::Sub => OpCategory::Checked(ArithOp::Sub),
            OpToken::Mul => OpCategory::Checked(ArithOp::Mul),
            OpToken::Div => OpCategory::Checked(ArithOp::Div),
            OpToken::Rem => OpCategory::Checked(ArithOp::Rem),
            OpToken::Shl => OpCategory::Checked(ArithOp::Shl),
            OpToken::Shr => OpCategory::Checked(ArithOp::Shr),
            OpToken::And => OpCategory::Checked(ArithOp::And),
            OpToken::Or => OpCategory::Checked(ArithOp::Or),
            OpToken::Xor => OpCategory::Checked(ArithOp::Xor),
            OpToken::Eq => OpCategory::Rel(RelOp::Eq),
            OpToken::Ne => OpCategory::Rel(RelOp::Ne),
            OpToken::Lt => OpCategory::Rel(RelOp::Lt),
            OpToken::Le => OpCategory::Rel(RelOp::Le),
            OpToken::Gt => OpCategory::Rel(RelOp::Gt),
            OpToken::Ge => OpCategory::Rel(RelOp::Ge),
        };

        match category {
            OpCategory::Rel(rel) => {
                let (name, _) = self.single_name(target, op.symbol())?;
                self.push_item(&name, Some(is_signed), false);
                Ok(vec![Instruction::Rel {
                    a,
                    b,
                    is_signed,
                    op: rel,
                }])
            }
            OpCategory::Checked(arith) => {
                let (name, _) = self.single_name(target, op.symbol())?;
                self.push_item(&name, Some(is_signed), false);
                Ok(vec![Instruction::Arith {
                    a: Operand::Belt(a),
                    b: Operand::Belt(b),
                    is_signed,
                    mode: ArithMode::Checked,
                    op: arith,
                }])
            }
            OpCategory::Widening(arith) => {
                let AssignTarget::Names(names, tpos) = target else {
                    return Err(self.err(CompileErrorKind::LocalFromExpression, oppos));
                };
                if names.len() != 2 {
                    return Err(self.err(
                        CompileErrorKind::BadResultArity {
                            call: op.symbol().to_string(),
                            expected: 2,
                            found: names.len(),
                        },
                        tpos,
                    ));
                }
                // The first-listed name is the high half and lands at
                // the belt front, as at runtime.
                self.push_item(&names[1], Some(is_signed), false);
                self.push_item(&names[0], Some(is_signed), false);
                Ok(vec![Instruction::Arith {
                    a: Operand::Belt(a),
                    b: Operand::Belt(b),
                    is_signed,
                    mode: ArithMode::Widening,
                    op: arith,
                }])
            }
        }
    }

    fn call_expression(&mut self, target: AssignTarget) -> Result<Vec<Instruction>, CompileError> {
        let (call, pos) = self.expect_ident("a function name")?;
        let params = self.params()?;

        let arity = |expected: &'static str, ok: bool| {
            if ok {
                Ok(())
            } else {
                Err(self.err(
                    CompileErrorKind::BadArity {
                        call: call.clone(),
                        expected,
                        found: params.len(),
                    },
                    pos,
                ))
            }
        };

        match call.as_str() {
            "is_err" => {
                arity("exactly 1", params.len() == 1)?;
                let (name, _) = self.single_name(target, &call)?;
                let (item_name, ipos) = &params[0];
                let (index, _) = self.get_item(item_name, Some(false), *ipos)?;
                self.push_item(&name, Some(false), false);
                Ok(vec![Instruction::IsErr(index)])
            }
            "length" => {
                arity("exactly 1", params.len() == 1)?;
                let (name, _) = self.single_name(target, &call)?;
                let (slice_name, spos) = &params[0];
                let (index, _) = self.get_item(slice_name, Some(true), *spos)?;
                self.push_item(&name, Some(false), false);
                Ok(vec![Instruction::SliceLen(index)])
            }
            "trim_l" | "trim_r" | "shrink" => {
                arity("exactly 2", params.len() == 2)?;
                let (name, _) = self.single_name(target, &call)?;
                let (slice_name, spos) = &params[0];
                let (count_name, cpos) = &params[1];
                let (slice, _) = self.get_item(slice_name, Some(true), *spos)?;
                let (count, _) = self.get_item(count_name, Some(false), *cpos)?;
                self.push_item(&name, None, true);
                let op = match call.as_str() {
                    "trim_l" => SliceOpKind::TrimLeft,
                    "trim_r" => SliceOpKind::TrimRight,
                    _ => SliceOpKind::Shrink,
                };
                Ok(vec![Instruction::SliceOp { slice, count, op }])
            }
            "divmod" => {
                arity("exactly 2", params.len() == 2)?;
                let AssignTarget::Names(names, tpos) = target else {
                    return Err(self.err(CompileErrorKind::LocalFromExpression, pos));
                };
                if names.len() != 2 {
                    return Err(self.err(
                        CompileErrorKind::BadResultArity {
                            call,
                            expected: 2,
                            found: names.len(),
                        },
                        tpos,
                    ));
                }
                let (a_name, apos) = &params[0];
                let (b_name, bpos) = &params[1];
                let (a, a_item) = self.get_item(a_name, Some(false), *apos)?;
                let (b, b_item) = self.get_item(b_name, Some(false), *bpos)?;
                let is_signed = self.check_signs(a_name, &a_item, b_name, &b_item, *bpos)?;
                // Quotient name first, at the belt front, as at runtime.
                self.push_item(&names[1], Some(is_signed), false);
                self.push_item(&names[0], Some(is_signed), false);
                Ok(vec![Instruction::DivMod { a, b, is_signed }])
            }
            "ram" => {
                arity("no", params.is_empty())?;
                let (name, _) = self.single_name(target, &call)?;
                self.push_item(&name, None, true);
                Ok(vec![Instruction::Ram])
            }
            "data" => {
                arity("exactly 1", params.len() == 1)?;
                let (name, _) = self.single_name(target, &call)?;
                let (index_name, ipos) = &params[0];
                let (index, _) = self.get_item(index_name, Some(false), *ipos)?;
                self.push_item(&name, None, true);
                Ok(vec![Instruction::Data { index }])
            }
            "rotl" | "rotr" | "clz" | "ctz" | "popcnt" => {
                Err(self.err(CompileErrorKind::Unimplemented(call), pos))
            }
            _ => {
                let (kind_name, bits) = match REG_CAST.captures(&call) {
                    Some(caps) => {
                        let kind_name = caps[1].to_string();
                        let bits: u32 = caps[2].parse().unwrap_or(0);
                        (kind_name, bits)
                    }
                    None => return Err(self.err(CompileErrorKind::UnknownFunction(call), pos)),
                };
                let kind = match kind_name.as_str() {
                    "cast_extend" if bits == 8 => {
                        return Err(self.err(CompileErrorKind::CastWidth(call), pos))
                    }
                    "cast_extend" => CastKind::Extend,
                    _ if bits == 64 => {
                        return Err(self.err(CompileErrorKind::CastWidth(call), pos))
                    }
                    "cast_wrap" => CastKind::Wrap,
                    "cast_sat" => CastKind::Saturating,
                    _ => CastKind::Checked,
                };
                let width = Width::from_bits(bits)
                    .ok_or_else(|| self.err(CompileErrorKind::UnknownFunction(call.clone()), pos))?;
                arity("exactly 1", params.len() == 1)?;
                let (name, _) = self.single_name(target, &call)?;
                let (item_name, ipos) = &params[0];
                let (value, item) = self.get_item(item_name, Some(false), *ipos)?;
                self.push_item(&name, item.is_signed, false);
                Ok(vec![Instruction::Convert {
                    value,
                    width,
                    is_signed: item.is_signed.unwrap_or(false),
                    kind,
                }])
            }
        }
    }

    /// `s[a..b]`, `s[a..]`, `s[..b]` or the load statement
    /// `x = s[offset] as TYPE`.
    fn bracket_expression(&mut self, target: AssignTarget) -> Result<Vec<Instruction>, CompileError> {
        let (source, spos) = self.expect_ident("a slice name")?;
        self.expect(Token::LBracket, "`[`")?;

        match (self.peek().cloned(), self.peek_at(1).cloned()) {
            (Some(Token::Ident(_)), Some(Token::RBracket)) => {
                let offset = self.offset()?;
                self.expect(Token::RBracket, "`]`")?;
                let (word, wpos) = self.expect_ident("`as`")?;
                if word != "as" {
                    return Err(self.err(
                        CompileErrorKind::UnexpectedToken {
                            found: word,
                            expected: "`as`",
                        },
                        wpos,
                    ));
                }
                let (type_name, tpos) = self.expect_ident("a type")?;
                let Some(caps) = REG_TYPE.captures(&type_name) else {
                    return Err(self.err(
                        CompileErrorKind::UnexpectedToken {
                            found: type_name,
                            expected: "a type",
                        },
                        tpos,
                    ));
                };
                let is_signed = &caps[1] == "i";
                let width = Width::from_bits(caps[2].parse().unwrap_or(0)).ok_or_else(|| {
                    self.err(
                        CompileErrorKind::UnexpectedToken {
                            found: type_name.clone(),
                            expected: "a type",
                        },
                        tpos,
                    )
                })?;
                let (name, _) = self.single_name(target, "a load")?;
                let (slice, _) = self.get_item(&source, Some(true), spos)?;
                self.push_item(&name, Some(is_signed), false);
                Ok(vec![Instruction::Load {
                    width,
                    slice,
                    offset,
                }])
            }
            (Some(Token::Ident(start)), Some(Token::DotDot)) => {
                let (_, start_pos) = self.next_token()?;
                self.next_token()?;
                let length = match self.peek().cloned() {
                    Some(Token::RBracket) => None,
                    _ => Some(self.expect_ident("a length name")?),
                };
                self.expect(Token::RBracket, "`]`")?;
                self.slicing(target, &source, spos, Some((start, start_pos)), length)
            }
            (Some(Token::DotDot), _) => {
                let (_, dots_pos) = self.next_token()?;
                let length = match self.peek().cloned() {
                    Some(Token::RBracket) => None,
                    _ => Some(self.expect_ident("a length name")?),
                };
                self.expect(Token::RBracket, "`]`")?;
                if length.is_none() {
                    return Err(self.err(CompileErrorKind::SliceBoundsMissing, dots_pos));
                }
                self.slicing(target, &source, spos, None, length)
            }
            (Some(token), _) => Err(self.err(
                CompileErrorKind::UnexpectedToken {
                    found: token.to_string(),
                    expected: "a slice bound or an offset",
                },
                self.location(),
            )),
            (None, _) => Err(self.err(CompileErrorKind::UnexpectedEnd, self.location())),
        }
    }

    fn slicing(
        &mut self,
        target: AssignTarget,
        source: &str,
        source_pos: Pos,
        start: Option<(String, Pos)>,
        length: Option<(String, Pos)>,
    ) -> Result<Vec<Instruction>, CompileError> {
        let (name, _) = self.single_name(target, "a slice expression")?;
        let (slice, _) = self.get_item(source, Some(true), source_pos)?;
        let code = match (&start, &length) {
            (Some((start_name, spos)), Some((length_name, lpos))) => {
                let (start, _) = self.get_item(start_name, Some(false), *spos)?;
                let (length, _) = self.get_item(length_name, Some(false), *lpos)?;
                vec![Instruction::SubSlice {
                    slice,
                    start,
                    length,
                }]
            }
            (Some((start_name, spos)), None) => {
                let (count, _) = self.get_item(start_name, Some(false), *spos)?;
                vec![Instruction::SliceOp {
                    slice,
                    count,
                    op: SliceOpKind::TrimLeft,
                }]
            }
            (None, Some((length_name, lpos))) => {
                let (count, _) = self.get_item(length_name, Some(false), *lpos)?;
                vec![Instruction::SliceOp {
                    slice,
                    count,
                    op: SliceOpKind::Shrink,
                }]
            }
            (None, None) => {
                return Err(self.err(CompileErrorKind::SliceBoundsMissing, source_pos))
            }
        };
        self.push_item(&name, None, true);
        Ok(code)
    }
}

fn is_literal_text(text: &str) -> bool {
    text.chars()
        .next()
        .map_or(false, |c| c == '-' || c.is_ascii_digit())
        && REG_LIT.is_match(&text.replace('_', ""))
}
