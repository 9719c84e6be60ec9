//! Logic gates built from AND/OR/NOT expressions.
//!
//! An [`Expr`] is compiled once into a flat op list. Evaluation walks the
//! list with an explicit frame stack and three-valued truth tables; once a
//! frame's value is decided (a 0 under AND, a 1 under OR) the walk jumps
//! straight to the frame's end.

use std::fmt;

use super::{Behavior, DeviceDescriptor, DeviceIo, TermRole};
use crate::error::{Result, SimError};
use crate::network::TermKind;
use crate::strength::Logic;
use crate::types::{Strength, MAX_TERMINALS};

pub const GATE: DeviceDescriptor = DeviceDescriptor {
    name: "gate",
    terminals: &[
        TermRole::new("out", TermKind::Output),
        TermRole::new("in", TermKind::VoltageInput),
    ],
    expandable: Some(1),
    params: [0; 3],
};

const R_0: u8 = 0;
const R_1: u8 = 1;
const R_X: u8 = 2;
const STOP: u8 = 4;

const AND_TABLE: [[u8; 3]; 3] = [
    [R_0 | STOP, R_0 | STOP, R_0 | STOP],
    [R_0 | STOP, R_1, R_X],
    [R_0 | STOP, R_X, R_X],
];

const OR_TABLE: [[u8; 3]; 3] = [
    [R_0, R_1 | STOP, R_X],
    [R_1 | STOP, R_1 | STOP, R_1 | STOP],
    [R_X, R_1 | STOP, R_X],
];

/// Boolean expression over gate inputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    /// Input `n`, wired to terminal `n + 1`.
    Input(usize),
    Const(bool),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl Expr {
    pub fn not(expr: Expr) -> Expr {
        Expr::Not(Box::new(expr))
    }

    /// Number of inputs the expression refers to.
    pub fn input_count(&self) -> usize {
        match self {
            Expr::Input(i) => i + 1,
            Expr::Const(_) => 0,
            Expr::Not(e) => e.input_count(),
            Expr::And(v) | Expr::Or(v) => v.iter().map(Expr::input_count).max().unwrap_or(0),
        }
    }

    fn depth(&self) -> usize {
        match self {
            Expr::Input(_) | Expr::Const(_) => 0,
            Expr::Not(e) => e.depth(),
            Expr::And(v) | Expr::Or(v) => 1 + v.iter().map(Expr::depth).max().unwrap_or(0),
        }
    }

    /// Parses `|`, `&`, `!`, parentheses, `0`/`1` and the letters `a`..`z`
    /// as inputs 0..25. `&` binds tighter than `|`.
    pub fn parse(text: &str) -> Result<Expr> {
        let mut parser = Parser {
            chars: text.chars().filter(|c| !c.is_whitespace()).collect(),
            pos: 0,
        };
        let expr = parser.or()?;
        match parser.peek() {
            None => Ok(expr),
            Some(c) => Err(parser.error(format!("unexpected '{c}'"))),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |f: &mut fmt::Formatter<'_>, v: &[Expr], sep: &str| -> fmt::Result {
            write!(f, "(")?;
            for (i, e) in v.iter().enumerate() {
                if i > 0 {
                    write!(f, " {sep} ")?;
                }
                write!(f, "{e}")?;
            }
            write!(f, ")")
        };
        match self {
            Expr::Input(i) if *i < 26 => write!(f, "{}", (b'a' + *i as u8) as char),
            Expr::Input(i) => write!(f, "in{i}"),
            Expr::Const(b) => write!(f, "{}", u8::from(*b)),
            Expr::Not(e) => write!(f, "!{e}"),
            Expr::And(v) => list(f, v, "&"),
            Expr::Or(v) => list(f, v, "|"),
        }
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn error(&self, reason: String) -> SimError {
        SimError::bad_attr("expr", format!("{reason} at position {}", self.pos))
    }

    fn or(&mut self) -> Result<Expr> {
        let mut terms = vec![self.and()?];
        while self.peek() == Some('|') {
            self.pos += 1;
            terms.push(self.and()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Or(terms)
        })
    }

    fn and(&mut self) -> Result<Expr> {
        let mut factors = vec![self.factor()?];
        while self.peek() == Some('&') {
            self.pos += 1;
            factors.push(self.factor()?);
        }
        Ok(if factors.len() == 1 {
            factors.remove(0)
        } else {
            Expr::And(factors)
        })
    }

    fn factor(&mut self) -> Result<Expr> {
        let c = self
            .peek()
            .ok_or_else(|| self.error("unexpected end".to_string()))?;
        self.pos += 1;
        match c {
            '!' => Ok(Expr::not(self.factor()?)),
            '(' => {
                let inner = self.or()?;
                if self.peek() != Some(')') {
                    return Err(self.error("missing ')'".to_string()));
                }
                self.pos += 1;
                Ok(inner)
            }
            '0' => Ok(Expr::Const(false)),
            '1' => Ok(Expr::Const(true)),
            'a'..='z' => Ok(Expr::Input(c as usize - 'a' as usize)),
            _ => Err(self.error(format!("unexpected '{c}'"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Join {
    And,
    Or,
}

impl Join {
    fn identity(self) -> u8 {
        match self {
            Join::And => R_1,
            Join::Or => R_0,
        }
    }

    fn table(self) -> &'static [[u8; 3]; 3] {
        match self {
            Join::And => &AND_TABLE,
            Join::Or => &OR_TABLE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    Lit { term: usize, invert: bool },
    Const(u8),
    Begin { join: Join, invert: bool, end: usize },
    End,
}

struct Frame {
    join: Join,
    invert: bool,
    acc: u8,
    end: usize,
}

fn code(value: Logic) -> u8 {
    match value {
        Logic::Zero => R_0,
        Logic::One => R_1,
        Logic::X => R_X,
    }
}

fn invert_code(c: u8, invert: bool) -> u8 {
    match (c, invert) {
        (R_0, true) => R_1,
        (R_1, true) => R_0,
        _ => c,
    }
}

fn compile(expr: &Expr, invert: bool, ops: &mut Vec<Op>) {
    match expr {
        Expr::Input(i) => ops.push(Op::Lit {
            term: *i + 1,
            invert,
        }),
        Expr::Const(b) => ops.push(Op::Const(if *b != invert { R_1 } else { R_0 })),
        Expr::Not(e) => compile(e, !invert, ops),
        Expr::And(v) | Expr::Or(v) => {
            let join = if matches!(expr, Expr::And(_)) {
                Join::And
            } else {
                Join::Or
            };
            let begin = ops.len();
            ops.push(Op::Begin {
                join,
                invert,
                end: 0,
            });
            for e in v {
                compile(e, false, ops);
            }
            let end = ops.len();
            ops.push(Op::End);
            ops[begin] = Op::Begin { join, invert, end };
        }
    }
}

#[derive(Clone, Debug)]
pub struct Gate {
    expr: Expr,
    ops: Vec<Op>,
    inputs: usize,
    depth: usize,
    strength: Strength,
}

impl Gate {
    /// Compiles `expr`. Fails when the expression names more inputs than an
    /// instance has terminals for.
    pub fn new(expr: Expr, strength: Strength) -> Result<Self> {
        let inputs = expr.input_count();
        if inputs >= MAX_TERMINALS {
            return Err(SimError::bad_attr(
                "expr",
                format!("{inputs} inputs exceed the limit of {}", MAX_TERMINALS - 1),
            ));
        }
        Ok(Self::build(expr, strength))
    }

    fn build(expr: Expr, strength: Strength) -> Self {
        let mut ops = Vec::new();
        compile(&expr, false, &mut ops);
        Self {
            inputs: expr.input_count(),
            depth: expr.depth(),
            expr,
            ops,
            strength,
        }
    }

    /// Inverter driving at `strength`.
    pub fn inverter(strength: Strength) -> Self {
        Self::build(Expr::not(Expr::Input(0)), strength)
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn input_count(&self) -> usize {
        self.inputs
    }

    /// Evaluates the expression, reading input terminals through `read`.
    pub fn evaluate(&self, read: impl Fn(usize) -> Logic) -> Logic {
        let mut frames: Vec<Frame> = Vec::with_capacity(self.depth);
        let mut result = R_X;
        let mut pc = 0;
        while pc < self.ops.len() {
            let value = match self.ops[pc] {
                Op::Begin { join, invert, end } => {
                    frames.push(Frame {
                        join,
                        invert,
                        acc: join.identity(),
                        end,
                    });
                    pc += 1;
                    continue;
                }
                Op::Lit { term, invert } => invert_code(code(read(term)), invert),
                Op::Const(c) => c,
                Op::End => match frames.pop() {
                    Some(frame) => invert_code(frame.acc, frame.invert),
                    None => break,
                },
            };
            pc += 1;
            match frames.last_mut() {
                None => result = value,
                Some(frame) => {
                    let next = frame.join.table()[frame.acc as usize][value as usize];
                    frame.acc = next & !STOP;
                    if next & STOP != 0 {
                        pc = frame.end;
                    }
                }
            }
        }
        match result {
            R_0 => Logic::Zero,
            R_1 => Logic::One,
            _ => Logic::X,
        }
    }
}

impl Behavior for Gate {
    fn descriptor(&self) -> &'static DeviceDescriptor {
        &GATE
    }

    fn terminal_count(&self) -> usize {
        1 + self.inputs
    }

    fn simulate(&mut self, io: &mut DeviceIo<'_>) {
        let value = self.evaluate(|term| io.logic(term));
        io.drive(0, value.to_level(), self.strength);
    }

    fn describe(&self) -> String {
        format!("gate {} strength {}", self.expr, self.strength)
    }
}
