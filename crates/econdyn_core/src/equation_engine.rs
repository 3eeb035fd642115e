use crate::params::{ParameterError, ParameterSet};
use crate::traits::{Derivative, DynamicalSystem, Scalar};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Unexpected character '{ch}' at position {pos}")]
    UnexpectedCharacter { ch: char, pos: usize },
    #[error("Invalid number literal: {0}")]
    InvalidNumber(String),
    #[error("Unexpected token: {0}")]
    UnexpectedToken(String),
    #[error("Unexpected end of expression")]
    UnexpectedEnd,
    #[error("Unknown variable or parameter: {0}")]
    UnknownSymbol(String),
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    #[error("Duplicate name: {0}")]
    DuplicateName(String),
    #[error("Expected {expected} equations, got {got}")]
    EquationCount { expected: usize, got: usize },
    #[error("State has {got} components, system has {expected}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("Equation {index}: {source}")]
    InEquation {
        index: usize,
        #[source]
        source: Box<EngineError>,
    },
    #[error(transparent)]
    Parameter(#[from] ParameterError),
}

/// OpCodes for the Stack-based Virtual Machine.
/// The VM operates on a stack of `Scalar` values (f64 or Dual).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant `f64` value onto the stack.
    LoadConst(f64),
    /// Pushes the value of a state variable (by index) onto the stack.
    LoadVar(usize),
    /// Pushes the value of a parameter (by index) onto the stack.
    LoadParam(usize),
    /// Pushes the current time.
    LoadTime,
    Add,
    Sub,
    Mul,
    Div,
    /// Pops top two values (b, a), pushes (a ^ b).
    Pow,
    Neg,
    Call(Function),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Exp,
    Ln,
    Sqrt,
    Tanh,
    Abs,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "tan" => Function::Tan,
            "exp" => Function::Exp,
            // `log` is the natural logarithm, as in numpy.
            "ln" | "log" => Function::Ln,
            "sqrt" => Function::Sqrt,
            "tanh" => Function::Tanh,
            "abs" => Function::Abs,
            _ => return None,
        })
    }

    fn apply<T: Scalar>(self, a: T) -> T {
        match self {
            Function::Sin => a.sin(),
            Function::Cos => a.cos(),
            Function::Tan => a.tan(),
            Function::Exp => a.exp(),
            Function::Ln => a.ln(),
            Function::Sqrt => a.sqrt(),
            Function::Tanh => a.tanh(),
            Function::Abs => a.abs(),
        }
    }
}

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

/// Stack-based Virtual Machine for evaluating equations.
///
/// The VM is stateless; `execute` takes all necessary context and returns the
/// value left on the stack.
pub struct VM;

impl VM {
    pub fn execute<T: Scalar>(
        bytecode: &Bytecode,
        vars: &[T],
        params: &[T],
        t: T,
        stack: &mut Vec<T>,
    ) -> T {
        stack.clear();

        // Bytecode from `Compiler` is always balanced; a malformed hand-built
        // program evaluates to NaN instead of panicking.
        fn pop<T: Scalar>(stack: &mut Vec<T>) -> T {
            stack.pop().unwrap_or_else(T::nan)
        }

        for op in &bytecode.ops {
            let value = match *op {
                OpCode::LoadConst(val) => T::from_f64(val).unwrap_or_else(T::nan),
                OpCode::LoadVar(idx) => vars.get(idx).copied().unwrap_or_else(T::nan),
                OpCode::LoadParam(idx) => params.get(idx).copied().unwrap_or_else(T::nan),
                OpCode::LoadTime => t,
                OpCode::Neg => -pop(stack),
                OpCode::Call(func) => func.apply(pop(stack)),
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Pow => {
                    let b = pop(stack);
                    let a = pop(stack);
                    match op {
                        OpCode::Add => a + b,
                        OpCode::Sub => a - b,
                        OpCode::Mul => a * b,
                        OpCode::Div => a / b,
                        _ => a.powf(b),
                    }
                }
            };
            stack.push(value);
        }

        pop(stack)
    }
}

// --- AST & Compiler ---

/// Abstract Syntax Tree nodes for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Neg(Box<Expr>),
    Call(Function, Box<Expr>),
}

/// Compiles an AST (`Expr`) into `Bytecode`.
/// Resolves variable and parameter names to indices.
///
/// State variables shadow parameters of the same name; `t` and `pi` are only
/// reserved when no variable or parameter claims them.
pub struct Compiler {
    pub var_map: HashMap<String, usize>,
    pub param_map: HashMap<String, usize>,
}

impl Compiler {
    pub fn new(var_names: &[String], param_names: &[String]) -> Self {
        let var_map = var_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        let param_map = param_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { var_map, param_map }
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode, EngineError> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<(), EngineError> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Variable(name) => ops.push(self.resolve(name)?),
            Expr::Binary(left, op, right) => {
                self.compile_recursive(left, ops)?;
                self.compile_recursive(right, ops)?;
                ops.push(match op {
                    BinaryOp::Add => OpCode::Add,
                    BinaryOp::Sub => OpCode::Sub,
                    BinaryOp::Mul => OpCode::Mul,
                    BinaryOp::Div => OpCode::Div,
                    BinaryOp::Pow => OpCode::Pow,
                });
            }
            Expr::Neg(operand) => {
                self.compile_recursive(operand, ops)?;
                ops.push(OpCode::Neg);
            }
            Expr::Call(func, arg) => {
                self.compile_recursive(arg, ops)?;
                ops.push(OpCode::Call(*func));
            }
        }
        Ok(())
    }

    fn resolve(&self, name: &str) -> Result<OpCode, EngineError> {
        if let Some(&idx) = self.var_map.get(name) {
            return Ok(OpCode::LoadVar(idx));
        }
        if let Some(&idx) = self.param_map.get(name) {
            return Ok(OpCode::LoadParam(idx));
        }
        match name {
            "t" => Ok(OpCode::LoadTime),
            "pi" => Ok(OpCode::LoadConst(std::f64::consts::PI)),
            _ => Err(EngineError::UnknownSymbol(name.to_string())),
        }
    }
}

// --- Parser ---

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> Result<Expr, EngineError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(EngineError::UnexpectedToken(format!("{token:?}"))),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, EngineError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut literal = String::new();
            while let Some(&(_, d)) = chars.peek() {
                let exponent_sign =
                    (d == '-' || d == '+') && literal.ends_with(['e', 'E']);
                if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' || exponent_sign {
                    literal.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = literal
                .parse()
                .map_err(|_| EngineError::InvalidNumber(literal.clone()))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            tokens.push(match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                _ => return Err(EngineError::UnexpectedCharacter { ch: c, pos }),
            });
            chars.next();
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect_rparen(&mut self) -> Result<(), EngineError> {
        match self.consume() {
            Some(Token::RParen) => Ok(()),
            Some(other) => Err(EngineError::UnexpectedToken(format!(
                "{other:?}, expected ')'"
            ))),
            None => Err(EngineError::UnexpectedEnd),
        }
    }

    // expression := factor (('+' | '-') factor)*
    fn parse_expression(&mut self) -> Result<Expr, EngineError> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.consume();
            let right = self.parse_factor()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    // factor := unary (('*' | '/') unary)*
    fn parse_factor(&mut self) -> Result<Expr, EngineError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    // unary := ('-' | '+') unary | power
    fn parse_unary(&mut self) -> Result<Expr, EngineError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.consume();
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            Some(Token::Plus) => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    // power := primary ('^' unary)?   (right associative, so -x^2 = -(x^2))
    fn parse_power(&mut self) -> Result<Expr, EngineError> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(Box::new(base), BinaryOp::Pow, Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, EngineError> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume();
                    let func = Function::from_name(&name)
                        .ok_or_else(|| EngineError::UnknownFunction(name.clone()))?;
                    let arg = self.parse_expression()?;
                    self.expect_rparen()?;
                    Ok(Expr::Call(func, Box::new(arg)))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                self.expect_rparen()?;
                Ok(expr)
            }
            Some(other) => Err(EngineError::UnexpectedToken(format!("{other:?}"))),
            None => Err(EngineError::UnexpectedEnd),
        }
    }
}

// --- EquationSystem ---

/// A system of ODEs given as text, one right-hand side per state variable.
///
/// Implements [`Derivative`] (parameters supplied per call) and
/// [`DynamicalSystem`] (parameters bound via [`EquationSystem::bind`]).
#[derive(Debug, Clone)]
pub struct EquationSystem {
    pub equations: Vec<Bytecode>,
    pub var_names: Vec<String>,
    pub param_names: Vec<String>,
    /// Bound parameter values, ordered like `param_names`.
    pub params: Vec<f64>,
}

impl EquationSystem {
    pub fn compile<S: AsRef<str>>(
        var_names: &[String],
        param_names: &[String],
        equations: &[S],
    ) -> Result<Self, EngineError> {
        if equations.len() != var_names.len() {
            return Err(EngineError::EquationCount {
                expected: var_names.len(),
                got: equations.len(),
            });
        }
        let mut seen = std::collections::HashSet::new();
        for name in var_names.iter().chain(param_names) {
            if !seen.insert(name.as_str()) {
                return Err(EngineError::DuplicateName(name.clone()));
            }
        }

        let compiler = Compiler::new(var_names, param_names);
        let bytecodes = equations
            .iter()
            .enumerate()
            .map(|(index, eq)| {
                parse(eq.as_ref())
                    .and_then(|expr| compiler.compile(&expr))
                    .map_err(|source| EngineError::InEquation {
                        index,
                        source: Box::new(source),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            equations: bytecodes,
            var_names: var_names.to_vec(),
            param_names: param_names.to_vec(),
            params: vec![0.0; param_names.len()],
        })
    }

    /// Binds parameter values for use through [`DynamicalSystem`].
    pub fn bind(&mut self, params: &ParameterSet) -> Result<(), ParameterError> {
        self.params = params.values_for(&self.param_names)?;
        Ok(())
    }

    fn evaluate<T: Scalar>(&self, t: T, x: &[T], params: &[T], out: &mut [T]) {
        let mut stack = Vec::with_capacity(16);
        for (slot, eq) in out.iter_mut().zip(&self.equations) {
            *slot = VM::execute(eq, x, params, t, &mut stack);
        }
    }
}

impl<T: Scalar> DynamicalSystem<T> for EquationSystem {
    fn dimension(&self) -> usize {
        self.equations.len()
    }

    fn apply(&self, t: T, x: &[T], out: &mut [T]) {
        let params: Vec<T> = self
            .params
            .iter()
            .map(|&p| T::from_f64(p).unwrap_or_else(T::nan))
            .collect();
        self.evaluate(t, x, &params, out);
    }
}

impl Derivative for EquationSystem {
    type Error = EngineError;

    fn parameter_names(&self) -> &[String] {
        &self.param_names
    }

    fn derivative(
        &self,
        state: &[f64],
        t: f64,
        params: &ParameterSet,
    ) -> Result<Vec<f64>, EngineError> {
        if state.len() != self.equations.len() {
            return Err(EngineError::DimensionMismatch {
                expected: self.equations.len(),
                got: state.len(),
            });
        }
        let values = params.values_for(&self.param_names)?;
        let mut out = vec![0.0; state.len()];
        self.evaluate(t, state, &values, &mut out);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::Dual;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn eval(expr: &str, vars: &[(&str, f64)]) -> Result<f64, EngineError> {
        let var_names: Vec<String> = vars.iter().map(|(n, _)| n.to_string()).collect();
        let values: Vec<f64> = vars.iter().map(|(_, v)| *v).collect();
        let code = Compiler::new(&var_names, &[]).compile(&parse(expr)?)?;
        Ok(VM::execute(&code, &values, &[], 0.0, &mut Vec::new()))
    }

    #[test]
    fn respects_precedence_and_associativity() {
        assert_eq!(eval("1 + 2 * 3", &[]), Ok(7.0));
        assert_eq!(eval("(1 + 2) * 3", &[]), Ok(9.0));
        assert_eq!(eval("8 / 4 / 2", &[]), Ok(1.0));
        assert_eq!(eval("2 ^ 3 ^ 2", &[]), Ok(512.0));
        assert_eq!(eval("-x^2", &[("x", 3.0)]), Ok(-9.0));
        assert_eq!(eval("2^-1", &[]), Ok(0.5));
        assert_eq!(eval("10 - 4 - 3", &[]), Ok(3.0));
    }

    #[test]
    fn parses_exponent_literals_and_functions() {
        assert_eq!(eval("1.5e2 + 2.5E-1", &[]), Ok(150.25));
        let v = eval("tanh(0) + sqrt(16) + log(exp(2)) + abs(-1)", &[]).expect("evaluates");
        assert!((v - 7.0).abs() < 1e-12);
    }

    #[test]
    fn reports_errors_instead_of_panicking() {
        assert_eq!(eval("1 +", &[]), Err(EngineError::UnexpectedEnd));
        assert!(matches!(
            eval("1 # 2", &[]),
            Err(EngineError::UnexpectedCharacter { ch: '#', pos: 2 })
        ));
        assert_eq!(
            eval("x + missing", &[("x", 1.0)]),
            Err(EngineError::UnknownSymbol("missing".to_string()))
        );
        assert_eq!(
            eval("gamma(2)", &[]),
            Err(EngineError::UnknownFunction("gamma".to_string()))
        );
        assert!(matches!(eval("(1 + 2", &[]), Err(EngineError::UnexpectedEnd)));
        assert!(matches!(eval("1 2", &[]), Err(EngineError::UnexpectedToken(_))));
        assert!(matches!(eval("1.2.3", &[]), Err(EngineError::InvalidNumber(_))));
    }

    #[test]
    fn time_is_available_to_equations() {
        let system = EquationSystem::compile(&names(&["y"]), &[], &["t * 2"]).expect("compiles");
        let d = system
            .derivative(&[0.0], 1.5, &ParameterSet::new())
            .expect("evaluates");
        assert_eq!(d, vec![3.0]);
    }

    #[test]
    fn derivative_reads_parameters_by_name() {
        let system = EquationSystem::compile(
            &names(&["k"]),
            &names(&["s", "alpha", "delta"]),
            &["s*k^alpha - delta*k"],
        )
        .expect("compiles");
        assert_eq!(system.parameter_names(), names(&["s", "alpha", "delta"]).as_slice());

        let params = ParameterSet::new()
            .with("delta", 0.1)
            .with("alpha", 0.5)
            .with("s", 0.2);
        let d = system.derivative(&[4.0], 0.0, &params).expect("evaluates");
        assert!((d[0] - 0.0).abs() < 1e-12);

        let err = system
            .derivative(&[4.0], 0.0, &ParameterSet::new().with("s", 0.2))
            .expect_err("alpha missing");
        assert_eq!(
            err,
            EngineError::Parameter(ParameterError::Missing("alpha".to_string()))
        );
    }

    #[test]
    fn compile_rejects_mismatched_or_duplicate_names() {
        assert!(matches!(
            EquationSystem::compile(&names(&["x", "y"]), &[], &["x"]),
            Err(EngineError::EquationCount { expected: 2, got: 1 })
        ));
        assert!(matches!(
            EquationSystem::compile(&names(&["x"]), &names(&["x"]), &["x"]),
            Err(EngineError::DuplicateName(_))
        ));
        match EquationSystem::compile(&names(&["x", "y"]), &[], &["y", "x +"]) {
            Err(EngineError::InEquation { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected equation error, got {other:?}"),
        }
    }

    #[test]
    fn bound_system_evaluates_on_dual_numbers() {
        let mut system =
            EquationSystem::compile(&names(&["x", "y"]), &names(&["a"]), &["a*x*y", "x - y"])
                .expect("compiles");
        system
            .bind(&ParameterSet::new().with("a", 2.0))
            .expect("binds");

        let x = [Dual::new(3.0, 1.0), Dual::new(5.0, 0.0)];
        let mut out = [Dual::new(0.0, 0.0); 2];
        system.apply(Dual::new(0.0, 0.0), &x, &mut out);
        // d/dx (2xy) = 2y, d/dx (x - y) = 1
        assert_eq!(out[0], Dual::new(30.0, 10.0));
        assert_eq!(out[1], Dual::new(-2.0, 1.0));
    }
}
