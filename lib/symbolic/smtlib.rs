//! SMT-LIB2 printing and parsing.
//!
//! The printer emits scripts of `declare-datatypes`, `declare-fun` and
//! `assert` commands. The parser reads that subset back, along with the
//! `(model (define-fun ...))` answers solvers give to `get-model`.

use crate::symbolic::{ArithCmp, ArithOp, BvCmp, BvOp, DatatypeSort, Expr, Model, Sort};
use crate::Error;
use crate::RC;
use std::collections::BTreeMap;

fn is_simple_symbol(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        None => return false,
        Some(c) if c.is_ascii_digit() => return false,
        Some(_) => {}
    }
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || "~!@$%^&*_-+=<>.?/".contains(c))
}

/// A symbol, quoted when it is not a simple symbol.
pub fn symbol(name: &str) -> String {
    if is_simple_symbol(name) {
        name.to_string()
    } else {
        format!("|{}|", name)
    }
}

fn real_literal(value: f64) -> String {
    if !value.is_finite() {
        return "(/ 1.0 0.0)".to_string();
    }
    let magnitude = crate::il::Float::new(value.abs()).to_string();
    if value < 0.0 {
        format!("(- {})", magnitude)
    } else {
        magnitude
    }
}

fn string_literal(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

pub fn sort(sort: &Sort) -> String {
    match sort {
        Sort::Datatype(datatype) => symbol(datatype.name()),
        sort => sort.to_string(),
    }
}

fn bv_op(op: BvOp) -> &'static str {
    match op {
        BvOp::Add => "bvadd",
        BvOp::Sub => "bvsub",
        BvOp::Mul => "bvmul",
        BvOp::UDiv => "bvudiv",
        BvOp::SDiv => "bvsdiv",
        BvOp::URem => "bvurem",
        BvOp::SRem => "bvsrem",
        BvOp::And => "bvand",
        BvOp::Or => "bvor",
        BvOp::Xor => "bvxor",
        BvOp::Shl => "bvshl",
        BvOp::LShr => "bvlshr",
        BvOp::AShr => "bvashr",
    }
}

fn bv_cmp(cmp: BvCmp) -> &'static str {
    match cmp {
        BvCmp::Ult => "bvult",
        BvCmp::Ule => "bvule",
        BvCmp::Ugt => "bvugt",
        BvCmp::Uge => "bvuge",
        BvCmp::Slt => "bvslt",
        BvCmp::Sle => "bvsle",
        BvCmp::Sgt => "bvsgt",
        BvCmp::Sge => "bvsge",
    }
}

fn arith_cmp(cmp: ArithCmp) -> &'static str {
    match cmp {
        ArithCmp::Lt => "<",
        ArithCmp::Le => "<=",
        ArithCmp::Gt => ">",
        ArithCmp::Ge => ">=",
    }
}

fn application(function: &str, arguments: &[&Expr]) -> String {
    let mut text = format!("({}", function);
    for argument in arguments {
        text.push(' ');
        text.push_str(&term(argument));
    }
    text.push(')');
    text
}

/// The SMT-LIB2 term for `expr`.
pub fn term(expr: &Expr) -> String {
    let children = expr.children();
    match expr {
        Expr::Var(name, _) => symbol(name),
        Expr::Bool(value) => value.to_string(),
        Expr::BitVec { value, bits } => format!("(_ bv{} {})", value, bits),
        Expr::Int(value) => {
            if *value < 0 {
                format!("(- {})", value.unsigned_abs())
            } else {
                value.to_string()
            }
        }
        Expr::Real(value) => real_literal(value.value()),
        Expr::Str(value) => string_literal(value),
        Expr::Not(_) => application("not", &children),
        Expr::And(exprs) if exprs.is_empty() => "true".to_string(),
        Expr::And(_) => application("and", &children),
        Expr::Or(exprs) if exprs.is_empty() => "false".to_string(),
        Expr::Or(_) => application("or", &children),
        Expr::Eq(..) => application("=", &children),
        Expr::Ite(..) => application("ite", &children),
        Expr::Bv(op, ..) => application(bv_op(*op), &children),
        Expr::BvCmp(cmp, ..) => application(bv_cmp(*cmp), &children),
        Expr::Arith(op, lhs, _) => {
            let function = match op {
                ArithOp::Add => "+",
                ArithOp::Sub => "-",
                ArithOp::Mul => "*",
                ArithOp::Div if lhs.sort() == Sort::Int => "div",
                ArithOp::Div => "/",
            };
            application(function, &children)
        }
        Expr::ArithCmp(cmp, ..) => application(arith_cmp(*cmp), &children),
        Expr::Neg(_) => application("-", &children),
        Expr::Concat(..) => application("concat", &children),
        Expr::Extract { high, low, .. } => {
            application(&format!("(_ extract {} {})", high, low), &children)
        }
        Expr::ZeroExtend(extra, _) => application(&format!("(_ zero_extend {})", extra), &children),
        Expr::SignExtend(extra, _) => application(&format!("(_ sign_extend {})", extra), &children),
        Expr::Bv2Nat(_) => application("bv2nat", &children),
        Expr::Nat2Bv(bits, _) => application(&format!("(_ int2bv {})", bits), &children),
        Expr::ToReal(_) => application("to_real", &children),
        Expr::ToInt(_) => application("to_int", &children),
        Expr::Construct(datatype, fields) if fields.is_empty() => {
            symbol(&datatype.constructor_name())
        }
        Expr::Construct(datatype, _) => application(&symbol(&datatype.constructor_name()), &children),
        Expr::Access(datatype, index, _) => {
            let accessor = datatype.accessor_name(*index).unwrap_or_default();
            application(&symbol(&accessor), &children)
        }
    }
}

fn collect_datatypes(sort: &Sort, datatypes: &mut Vec<RC<DatatypeSort>>) {
    if let Sort::Datatype(datatype) = sort {
        if datatypes.contains(datatype) {
            return;
        }
        for (_, field) in datatype.fields() {
            collect_datatypes(field, datatypes);
        }
        datatypes.push(datatype.clone());
    }
}

fn collect_expr_datatypes(expr: &Expr, datatypes: &mut Vec<RC<DatatypeSort>>) {
    collect_datatypes(&expr.sort(), datatypes);
    for child in expr.children() {
        collect_expr_datatypes(child, datatypes);
    }
}

/// Every datatype the conditions mention, dependencies first.
pub fn datatypes(conditions: &[Expr]) -> Vec<RC<DatatypeSort>> {
    let mut datatypes = Vec::new();
    for condition in conditions {
        collect_expr_datatypes(condition, &mut datatypes);
    }
    datatypes
}

pub fn declare_datatype(datatype: &DatatypeSort) -> String {
    let fields: Vec<String> = datatype
        .fields()
        .iter()
        .enumerate()
        .map(|(index, (_, field))| {
            format!(
                "({} {})",
                symbol(&datatype.accessor_name(index).unwrap_or_default()),
                sort(field)
            )
        })
        .collect();
    let constructor = if fields.is_empty() {
        format!("({})", symbol(&datatype.constructor_name()))
    } else {
        format!("({} {})", symbol(&datatype.constructor_name()), fields.join(" "))
    };
    format!(
        "(declare-datatypes (({} 0)) (({})))",
        symbol(datatype.name()),
        constructor
    )
}

/// A script declaring everything `conditions` mention and asserting each of
/// them.
pub fn print_script(conditions: &[Expr]) -> String {
    let mut lines = Vec::new();
    for datatype in datatypes(conditions) {
        lines.push(declare_datatype(&datatype));
    }

    let mut variables = BTreeMap::new();
    for condition in conditions {
        variables.extend(condition.variables());
    }
    for (name, variable_sort) in &variables {
        lines.push(format!("(declare-fun {} () {})", symbol(name), sort(variable_sort)));
    }

    for condition in conditions {
        lines.push(format!("(assert {})", term(condition)));
    }
    let mut script = lines.join("\n");
    script.push('\n');
    script
}

/// The declarations and assertions of a parsed script.
#[derive(Clone, Debug, Default)]
pub struct Script {
    pub datatypes: Vec<RC<DatatypeSort>>,
    pub declarations: BTreeMap<String, Sort>,
    pub assertions: Vec<Expr>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum SExpr {
    Symbol(String),
    Literal(String),
    Str(String),
    List(Vec<SExpr>),
}

impl SExpr {
    fn symbol(&self) -> Option<&str> {
        match self {
            SExpr::Symbol(symbol) => Some(symbol),
            _ => None,
        }
    }

    fn list(&self) -> Option<&[SExpr]> {
        match self {
            SExpr::List(list) => Some(list),
            _ => None,
        }
    }
}

fn parse_error<S: Into<String>>(message: S) -> Error {
    Error::Parse(message.into())
}

fn tokenize(text: &str) -> Result<Vec<SExpr>, Error> {
    let chars: Vec<char> = text.chars().collect();
    let mut stack: Vec<Vec<SExpr>> = vec![Vec::new()];
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ';' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '(' => {
                stack.push(Vec::new());
                i += 1;
            }
            ')' => {
                let list = stack.pop().ok_or_else(|| parse_error("unbalanced )"))?;
                stack
                    .last_mut()
                    .ok_or_else(|| parse_error("unbalanced )"))?
                    .push(SExpr::List(list));
                i += 1;
            }
            '|' => {
                let start = i + 1;
                i = start;
                while i < chars.len() && chars[i] != '|' {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(parse_error("unterminated quoted symbol"));
                }
                let symbol: String = chars[start..i].iter().collect();
                push_token(&mut stack, SExpr::Symbol(symbol))?;
                i += 1;
            }
            '"' => {
                let mut value = String::new();
                i += 1;
                loop {
                    if i >= chars.len() {
                        return Err(parse_error("unterminated string literal"));
                    }
                    if chars[i] == '"' {
                        if i + 1 < chars.len() && chars[i + 1] == '"' {
                            value.push('"');
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    value.push(chars[i]);
                    i += 1;
                }
                push_token(&mut stack, SExpr::Str(value))?;
            }
            c if c.is_whitespace() => i += 1,
            _ => {
                let start = i;
                while i < chars.len()
                    && !chars[i].is_whitespace()
                    && !"()|\";".contains(chars[i])
                {
                    i += 1;
                }
                let atom: String = chars[start..i].iter().collect();
                let token = if atom.starts_with('#')
                    || atom.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false)
                {
                    SExpr::Literal(atom)
                } else {
                    SExpr::Symbol(atom)
                };
                push_token(&mut stack, token)?;
            }
        }
    }

    if stack.len() != 1 {
        return Err(parse_error("unbalanced ("));
    }
    Ok(stack.pop().unwrap_or_default())
}

fn push_token(stack: &mut [Vec<SExpr>], token: SExpr) -> Result<(), Error> {
    stack
        .last_mut()
        .ok_or_else(|| parse_error("token outside of any list"))?
        .push(token);
    Ok(())
}

/// Names in scope while parsing terms.
#[derive(Default)]
struct Environment {
    datatypes: BTreeMap<String, RC<DatatypeSort>>,
    variables: BTreeMap<String, Sort>,
}

impl Environment {
    fn add_datatype(&mut self, datatype: RC<DatatypeSort>) {
        self.datatypes.insert(datatype.name().to_string(), datatype);
    }

    fn constructor(&self, name: &str) -> Option<&RC<DatatypeSort>> {
        self.datatypes
            .values()
            .find(|datatype| datatype.constructor_name() == name)
    }

    fn accessor(&self, name: &str) -> Option<(&RC<DatatypeSort>, usize)> {
        self.datatypes.values().find_map(|datatype| {
            (0..datatype.fields().len())
                .find(|index| datatype.accessor_name(*index).as_deref() == Some(name))
                .map(|index| (datatype, index))
        })
    }

    fn sort(&self, sexpr: &SExpr) -> Result<Sort, Error> {
        match sexpr {
            SExpr::Symbol(name) => match name.as_str() {
                "Bool" => Ok(Sort::Bool),
                "Int" => Ok(Sort::Int),
                "Real" => Ok(Sort::Real),
                "String" => Ok(Sort::String),
                name => self
                    .datatypes
                    .get(name)
                    .map(|datatype| Sort::Datatype(datatype.clone()))
                    .ok_or_else(|| parse_error(format!("unknown sort {}", name))),
            },
            SExpr::List(list) => match list.as_slice() {
                [SExpr::Symbol(underscore), SExpr::Symbol(bitvec), SExpr::Literal(bits)]
                    if underscore == "_" && bitvec == "BitVec" =>
                {
                    Ok(Sort::BitVec(parse_usize(bits)?))
                }
                _ => Err(parse_error(format!("unknown sort {:?}", sexpr))),
            },
            _ => Err(parse_error(format!("unknown sort {:?}", sexpr))),
        }
    }

    fn term(&self, sexpr: &SExpr) -> Result<Expr, Error> {
        match sexpr {
            SExpr::Str(value) => Ok(Expr::Str(value.clone())),
            SExpr::Literal(literal) => parse_literal(literal),
            SExpr::Symbol(name) => match name.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                name => {
                    if let Some(sort) = self.variables.get(name) {
                        return Ok(Expr::Var(name.to_string(), sort.clone()));
                    }
                    match self.constructor(name) {
                        Some(datatype) => Expr::construct(datatype.clone(), Vec::new()),
                        None => Err(parse_error(format!("unknown symbol {}", name))),
                    }
                }
            },
            SExpr::List(list) => self.application(list),
        }
    }

    fn arguments(&self, list: &[SExpr]) -> Result<Vec<Expr>, Error> {
        list.iter().map(|argument| self.term(argument)).collect()
    }

    fn application(&self, list: &[SExpr]) -> Result<Expr, Error> {
        let (head, rest) = list
            .split_first()
            .ok_or_else(|| parse_error("empty application"))?;

        if let SExpr::List(indexed) = head {
            return self.indexed(indexed, rest);
        }
        let function = head
            .symbol()
            .ok_or_else(|| parse_error(format!("bad function {:?}", head)))?;

        if function == "_" {
            // (_ bvN W)
            return match rest {
                [SExpr::Symbol(value), SExpr::Literal(bits)] if value.starts_with("bv") => {
                    let value = value[2..]
                        .parse::<u64>()
                        .map_err(|_| parse_error(format!("bad bitvector {}", value)))?;
                    Ok(Expr::bitvec(value, parse_usize(bits)?))
                }
                _ => Err(parse_error("bad indexed constant")),
            };
        }

        let mut arguments = self.arguments(rest)?;
        let binary = |arguments: &mut Vec<Expr>| -> Result<(Expr, Expr), Error> {
            if arguments.len() != 2 {
                return Err(parse_error(format!("{} takes two arguments", function)));
            }
            let rhs = arguments.pop().unwrap_or(Expr::Bool(false));
            let lhs = arguments.pop().unwrap_or(Expr::Bool(false));
            Ok((lhs, rhs))
        };
        let unary = |arguments: &mut Vec<Expr>| -> Result<Expr, Error> {
            if arguments.len() != 1 {
                return Err(parse_error(format!("{} takes one argument", function)));
            }
            Ok(arguments.remove(0))
        };

        let bv_ops = [
            ("bvadd", BvOp::Add),
            ("bvsub", BvOp::Sub),
            ("bvmul", BvOp::Mul),
            ("bvudiv", BvOp::UDiv),
            ("bvsdiv", BvOp::SDiv),
            ("bvurem", BvOp::URem),
            ("bvsrem", BvOp::SRem),
            ("bvand", BvOp::And),
            ("bvor", BvOp::Or),
            ("bvxor", BvOp::Xor),
            ("bvshl", BvOp::Shl),
            ("bvlshr", BvOp::LShr),
            ("bvashr", BvOp::AShr),
        ];
        if let Some((_, op)) = bv_ops.iter().find(|(name, _)| *name == function) {
            let (lhs, rhs) = binary(&mut arguments)?;
            return Expr::bv(*op, lhs, rhs);
        }
        let bv_cmps = [
            ("bvult", BvCmp::Ult),
            ("bvule", BvCmp::Ule),
            ("bvugt", BvCmp::Ugt),
            ("bvuge", BvCmp::Uge),
            ("bvslt", BvCmp::Slt),
            ("bvsle", BvCmp::Sle),
            ("bvsgt", BvCmp::Sgt),
            ("bvsge", BvCmp::Sge),
        ];
        if let Some((_, cmp)) = bv_cmps.iter().find(|(name, _)| *name == function) {
            let (lhs, rhs) = binary(&mut arguments)?;
            return Expr::bv_cmp(*cmp, lhs, rhs);
        }

        match function {
            "not" => Expr::not(unary(&mut arguments)?),
            "and" => Expr::and(arguments),
            "or" => Expr::or(arguments),
            "=" => {
                let (lhs, rhs) = binary(&mut arguments)?;
                Expr::eq(lhs, rhs)
            }
            "ite" => {
                if arguments.len() != 3 {
                    return Err(parse_error("ite takes three arguments"));
                }
                let else_ = arguments.remove(2);
                let then = arguments.remove(1);
                Expr::ite(arguments.remove(0), then, else_)
            }
            "-" if arguments.len() == 1 => match arguments.remove(0) {
                Expr::Int(value) => Ok(Expr::Int(-value)),
                Expr::Real(value) => Ok(Expr::real(-value.value())),
                expr => Expr::neg(expr),
            },
            "+" | "-" | "*" | "/" | "div" => {
                let op = match function {
                    "+" => ArithOp::Add,
                    "-" => ArithOp::Sub,
                    "*" => ArithOp::Mul,
                    _ => ArithOp::Div,
                };
                if arguments.len() < 2 {
                    return Err(parse_error(format!("{} takes two arguments", function)));
                }
                let mut arguments = arguments.into_iter();
                let mut result = arguments.next().unwrap_or(Expr::Int(0));
                for argument in arguments {
                    result = Expr::arith(op, result, argument)?;
                }
                Ok(result)
            }
            "<" | "<=" | ">" | ">=" => {
                let cmp = match function {
                    "<" => ArithCmp::Lt,
                    "<=" => ArithCmp::Le,
                    ">" => ArithCmp::Gt,
                    _ => ArithCmp::Ge,
                };
                let (lhs, rhs) = binary(&mut arguments)?;
                Expr::arith_cmp(cmp, lhs, rhs)
            }
            "concat" => {
                let (high, low) = binary(&mut arguments)?;
                Expr::concat(high, low)
            }
            "bv2nat" => Expr::bv2nat(unary(&mut arguments)?),
            "to_real" => Expr::to_real(unary(&mut arguments)?),
            "to_int" => Expr::to_int(unary(&mut arguments)?),
            name => {
                if let Some(datatype) = self.constructor(name) {
                    return Expr::construct(datatype.clone(), arguments);
                }
                if let Some((datatype, index)) = self.accessor(name) {
                    let (field, _) = &datatype.fields()[index];
                    return Expr::access(unary(&mut arguments)?, field);
                }
                Err(parse_error(format!("unknown function {}", name)))
            }
        }
    }

    fn indexed(&self, indexed: &[SExpr], rest: &[SExpr]) -> Result<Expr, Error> {
        let mut arguments = self.arguments(rest)?;
        if arguments.len() != 1 {
            return Err(parse_error("indexed functions take one argument"));
        }
        let argument = arguments.remove(0);
        match indexed {
            [SExpr::Symbol(underscore), SExpr::Symbol(name), SExpr::Literal(high), SExpr::Literal(low)]
                if underscore == "_" && name == "extract" =>
            {
                Expr::extract(parse_usize(high)?, parse_usize(low)?, argument)
            }
            [SExpr::Symbol(underscore), SExpr::Symbol(name), SExpr::Literal(n)] if underscore == "_" => {
                let n = parse_usize(n)?;
                match name.as_str() {
                    "zero_extend" => Expr::zero_extend(n, argument),
                    "sign_extend" => Expr::sign_extend(n, argument),
                    "int2bv" => Expr::nat2bv(n, argument),
                    name => Err(parse_error(format!("unknown indexed function {}", name))),
                }
            }
            _ => Err(parse_error(format!("bad indexed function {:?}", indexed))),
        }
    }

    fn declare_datatypes(&mut self, command: &[SExpr]) -> Result<Vec<RC<DatatypeSort>>, Error> {
        // (declare-datatypes ((T 0)) (((mk-T (T.x Real) ...))))
        let names = command
            .get(1)
            .and_then(|names| names.list())
            .ok_or_else(|| parse_error("declare-datatypes without sorts"))?;
        let bodies = command
            .get(2)
            .and_then(|bodies| bodies.list())
            .ok_or_else(|| parse_error("declare-datatypes without constructors"))?;

        let mut declared = Vec::new();
        for (name, body) in names.iter().zip(bodies) {
            let name = name
                .list()
                .and_then(|name| name.first())
                .and_then(|name| name.symbol())
                .ok_or_else(|| parse_error("bad datatype name"))?;
            let constructor = body
                .list()
                .and_then(|constructors| constructors.first())
                .and_then(|constructor| constructor.list())
                .ok_or_else(|| parse_error(format!("{} needs one constructor", name)))?;

            let prefix = format!("{}.", name);
            let mut fields = Vec::new();
            for selector in constructor.iter().skip(1) {
                match selector.list() {
                    Some([SExpr::Symbol(accessor), field_sort]) => {
                        let field = accessor.strip_prefix(&prefix).unwrap_or(accessor);
                        fields.push((field.to_string(), self.sort(field_sort)?));
                    }
                    _ => return Err(parse_error(format!("bad selector in {}", name))),
                }
            }
            let datatype = RC::new(DatatypeSort::new(name, fields));
            self.add_datatype(datatype.clone());
            declared.push(datatype);
        }
        Ok(declared)
    }
}

fn parse_usize(literal: &str) -> Result<usize, Error> {
    literal
        .parse::<usize>()
        .map_err(|_| parse_error(format!("expected a numeral, found {}", literal)))
}

fn parse_literal(literal: &str) -> Result<Expr, Error> {
    if let Some(hex) = literal.strip_prefix("#x") {
        let value = u64::from_str_radix(hex, 16)
            .map_err(|_| parse_error(format!("bad hexadecimal {}", literal)))?;
        return Ok(Expr::bitvec(value, hex.len() * 4));
    }
    if let Some(binary) = literal.strip_prefix("#b") {
        let value = u64::from_str_radix(binary, 2)
            .map_err(|_| parse_error(format!("bad binary {}", literal)))?;
        return Ok(Expr::bitvec(value, binary.len()));
    }
    if literal.contains('.') {
        let value = literal
            .parse::<f64>()
            .map_err(|_| parse_error(format!("bad decimal {}", literal)))?;
        return Ok(Expr::real(value));
    }
    literal
        .parse::<i64>()
        .map(Expr::Int)
        .map_err(|_| parse_error(format!("bad numeral {}", literal)))
}

fn command_name(command: &[SExpr]) -> Option<&str> {
    command.first().and_then(|name| name.symbol())
}

/// Parse a script of declarations and assertions. Other commands are
/// skipped.
pub fn parse_script(text: &str) -> Result<Script, Error> {
    let mut environment = Environment::default();
    let mut script = Script::default();

    for sexpr in tokenize(text)? {
        let command = sexpr
            .list()
            .ok_or_else(|| parse_error(format!("expected a command, found {:?}", sexpr)))?;
        match command_name(command) {
            Some("declare-datatypes") => {
                let declared = environment.declare_datatypes(command)?;
                script.datatypes.extend(declared);
            }
            Some("declare-fun") | Some("declare-const") => {
                let name = command
                    .get(1)
                    .and_then(|name| name.symbol())
                    .ok_or_else(|| parse_error("declaration without a name"))?;
                let sort = match command_name(command) {
                    Some("declare-fun") => {
                        let nullary = command
                            .get(2)
                            .and_then(|params| params.list())
                            .map(|params| params.is_empty());
                        if nullary != Some(true) {
                            return Err(Error::Unsupported(format!(
                                "uninterpreted function {}",
                                name
                            )));
                        }
                        command.get(3)
                    }
                    _ => command.get(2),
                }
                .ok_or_else(|| parse_error(format!("{} has no sort", name)))?;
                let sort = environment.sort(sort)?;
                environment.variables.insert(name.to_string(), sort.clone());
                script.declarations.insert(name.to_string(), sort);
            }
            Some("assert") => {
                let assertion = command
                    .get(1)
                    .ok_or_else(|| parse_error("assert without a term"))?;
                script.assertions.push(environment.term(assertion)?);
            }
            _ => {}
        }
    }

    Ok(script)
}

/// Parse the answer to `get-model`, given the datatypes of the query.
///
/// Values are simplified to constants, so `(/ 1.0 4.0)` reads as `0.25`.
pub fn parse_model(text: &str, datatypes: &[RC<DatatypeSort>]) -> Result<Model, Error> {
    let mut environment = Environment::default();
    for datatype in datatypes {
        environment.add_datatype(datatype.clone());
    }

    let mut model = Model::new();
    for sexpr in tokenize(text)? {
        let list = match sexpr.list() {
            Some(list) => list,
            None => continue,
        };
        let definitions = match list.first().and_then(|head| head.symbol()) {
            Some("model") => &list[1..],
            _ => list,
        };
        for definition in definitions {
            let definition = match definition.list() {
                Some(definition) => definition,
                None => continue,
            };
            match definition {
                [SExpr::Symbol(define), SExpr::Symbol(name), SExpr::List(params), sort, value]
                    if define == "define-fun" =>
                {
                    if !params.is_empty() {
                        continue;
                    }
                    let sort = environment.sort(sort)?;
                    let value = environment.term(value)?.simplify();
                    if !value.is_constant() || value.sort() != sort {
                        return Err(parse_error(format!("bad model value for {}", name)));
                    }
                    model.insert(name.clone(), value);
                }
                _ => {}
            }
        }
    }
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector3() -> RC<DatatypeSort> {
        RC::new(DatatypeSort::new(
            "UnityEngine.Vector3",
            vec![
                ("x".to_string(), Sort::Real),
                ("y".to_string(), Sort::Real),
                ("z".to_string(), Sort::Real),
            ],
        ))
    }

    #[test]
    fn symbols_are_quoted() {
        assert_eq!(symbol("x"), "x");
        assert_eq!(symbol("symcall:0"), "|symcall:0|");
        assert_eq!(symbol("0x"), "|0x|");
        assert_eq!(
            term(&Expr::var("frame:0:arg:1", Sort::Int)),
            "|frame:0:arg:1|"
        );
        assert_eq!(term(&Expr::real(-0.25)), "(- 0.25)");
        assert_eq!(term(&Expr::bitvec(3, 8)), "(_ bv3 8)");
    }

    #[test]
    fn scripts_round_trip() {
        let mouse = Expr::var("symcall:1", Sort::Datatype(vector3()));
        let axis = Expr::var("symcall:0", Sort::Real);
        let key = Expr::var("symcall:2", Sort::BitVec(8));
        let name = Expr::var("staticfield:Game.Player.name", Sort::String);

        let conditions = vec![
            Expr::arith_cmp(ArithCmp::Gt, axis.clone(), Expr::real(0.0)).unwrap(),
            Expr::and(vec![
                Expr::arith_cmp(
                    ArithCmp::Ge,
                    Expr::access(mouse.clone(), "x").unwrap(),
                    Expr::real(0.25),
                )
                .unwrap(),
                Expr::arith_cmp(
                    ArithCmp::Lt,
                    Expr::access(mouse, "y").unwrap(),
                    Expr::real(-0.5),
                )
                .unwrap(),
            ])
            .unwrap(),
            Expr::ne(key.clone(), Expr::bitvec(0, 8)).unwrap(),
            Expr::bv_cmp(
                BvCmp::Slt,
                Expr::sign_extend(24, key.clone()).unwrap(),
                Expr::extract(31, 0, Expr::zero_extend(32, Expr::sign_extend(24, key).unwrap()).unwrap())
                    .unwrap(),
            )
            .unwrap(),
            Expr::eq(
                Expr::to_real(Expr::bv2nat(Expr::bitvec(7, 32)).unwrap()).unwrap(),
                Expr::arith(ArithOp::Div, axis, Expr::real(3.0)).unwrap(),
            )
            .unwrap(),
            Expr::eq(name, Expr::string("say \"hi\"")).unwrap(),
        ];

        let script = print_script(&conditions);
        assert!(script.starts_with("(declare-datatypes ((UnityEngine.Vector3 0))"));
        let parsed = parse_script(&script).unwrap();
        assert_eq!(parsed.assertions, conditions);
        assert_eq!(parsed.declarations.len(), 4);
        assert_eq!(parsed.datatypes, vec![vector3()]);
    }

    #[test]
    fn models_parse_to_constants() {
        let text = r#"sat
(
  (define-fun |symcall:0| () Real
    (/ 1.0 4.0))
  (define-fun |symcall:2| () (_ BitVec 8)
    #x01)
  (define-fun neg () Real
    (- (/ 1.0 2.0)))
  (define-fun |symcall:1| () |UnityEngine.Vector3|
    (|mk-UnityEngine.Vector3| 0.0 (/ 1.0 2.0) 0.0))
)"#;
        let text = text.trim_start_matches("sat");
        let model = parse_model(text, &[vector3()]).unwrap();
        assert_eq!(model.get("symcall:0"), Some(&Expr::real(0.25)));
        assert_eq!(model.get("symcall:2"), Some(&Expr::bitvec(1, 8)));
        assert_eq!(model.get("neg"), Some(&Expr::real(-0.5)));
        assert_eq!(
            model.get("symcall:1"),
            Some(&Expr::Construct(
                vector3(),
                vec![Expr::real(0.0), Expr::real(0.5), Expr::real(0.0)]
            ))
        );
    }
}
