//! Satisfiability checking.
//!
//! Two backends implement `Solver`. `Z3Process` hands an SMT-LIB2 script to
//! the `z3` binary. `BoundsSolver` decides the formulas the executor
//! typically produces, comparisons of input values against constants,
//! in-process, and answers `Unknown` for the rest.

use crate::config::AnalysisOptions;
use crate::symbolic::{smtlib, ArithCmp, BvCmp, Expr, Sort};
use crate::Error;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::PathBuf;
use std::process;

/// Values for free variables.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Model {
    values: BTreeMap<String, Expr>,
}

impl Model {
    pub fn new() -> Model {
        Model::default()
    }

    pub fn get(&self, name: &str) -> Option<&Expr> {
        self.values.get(name)
    }

    pub fn insert<S: Into<String>>(&mut self, name: S, value: Expr) {
        self.values.insert(name.into(), value);
    }

    pub fn values(&self) -> &BTreeMap<String, Expr> {
        &self.values
    }

    /// Evaluate `expr` in this model. `None` if it mentions a variable the
    /// model has no value for.
    pub fn eval(&self, expr: &Expr) -> Option<Expr> {
        expr.eval(&|name: &str| self.values.get(name).cloned())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SatResult {
    Sat(Model),
    Unsat,
    Unknown,
}

impl SatResult {
    pub fn is_sat(&self) -> bool {
        matches!(self, SatResult::Sat(_))
    }

    pub fn is_unsat(&self) -> bool {
        matches!(self, SatResult::Unsat)
    }

    pub fn model(&self) -> Option<&Model> {
        match self {
            SatResult::Sat(model) => Some(model),
            _ => None,
        }
    }
}

/// Decides whether a conjunction of boolean formulas is satisfiable.
pub trait Solver {
    fn check(&self, assertions: &[Expr]) -> Result<SatResult, Error>;
}

/// Runs `z3` once per query.
#[derive(Clone, Debug)]
pub struct Z3Process {
    binary: PathBuf,
    timeout_ms: Option<u64>,
}

impl Default for Z3Process {
    fn default() -> Z3Process {
        Z3Process {
            binary: PathBuf::from("z3"),
            timeout_ms: None,
        }
    }
}

impl Z3Process {
    pub fn new() -> Z3Process {
        Z3Process::default()
    }

    pub fn with_binary<P: Into<PathBuf>>(mut self, binary: P) -> Z3Process {
        self.binary = binary.into();
        self
    }

    /// Bound every query. A query running out of time answers `Unknown`.
    pub fn with_timeout(mut self, timeout_ms: Option<u64>) -> Z3Process {
        self.timeout_ms = timeout_ms;
        self
    }

    /// A solver bounded by the configured query timeout.
    pub fn from_options(options: &AnalysisOptions) -> Z3Process {
        Z3Process::new().with_timeout(options.solver_timeout_ms)
    }

    pub fn timeout_ms(&self) -> Option<u64> {
        self.timeout_ms
    }

    fn arguments(&self) -> Vec<String> {
        let mut arguments = vec!["-in".to_string(), "-smt2".to_string()];
        if let Some(timeout_ms) = self.timeout_ms {
            arguments.push(format!("-t:{}", timeout_ms));
        }
        arguments
    }

    fn script(&self, assertions: &[Expr]) -> String {
        let mut script = "(set-option :produce-models true)\n".to_string();
        script.push_str(&smtlib::print_script(assertions));
        script.push_str("(check-sat)\n(get-model)\n");
        script
    }
}

impl Solver for Z3Process {
    fn check(&self, assertions: &[Expr]) -> Result<SatResult, Error> {
        let script = self.script(assertions);
        trace!("z3 query:\n{}", script);

        let mut child = process::Command::new(&self.binary)
            .args(self.arguments())
            .stdin(process::Stdio::piped())
            .stdout(process::Stdio::piped())
            .stderr(process::Stdio::piped())
            .spawn()
            .map_err(|e| Error::Solver(format!("failed to start {:?}: {}", self.binary, e)))?;

        match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(script.as_bytes())?,
            None => return Err(Error::Solver("failed to get stdin of z3".to_string())),
        }
        let output = child.wait_with_output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        let mut lines = stdout.splitn(2, '\n');
        let answer = lines.next().unwrap_or("").trim();
        let rest = lines.next().unwrap_or("");
        match answer {
            "sat" => Ok(SatResult::Sat(smtlib::parse_model(
                rest,
                &smtlib::datatypes(assertions),
            )?)),
            "unsat" => Ok(SatResult::Unsat),
            "unknown" | "timeout" => Ok(SatResult::Unknown),
            _ => Err(Error::Solver(format!(
                "unexpected answer from z3: {}{}",
                stdout,
                String::from_utf8_lossy(&output.stderr)
            ))),
        }
    }
}

/// An in-process decision procedure.
///
/// The conjunction is simplified, put in negation normal form and expanded
/// into cubes. A leaf, a variable or a field of a variable, which only
/// appears in comparisons against constants is decided exactly by trying the
/// constants, their neighbours and the points between them. Everything else
/// is searched over the same candidates, and an unsuccessful search answers
/// `Unknown`.
#[derive(Clone, Debug)]
pub struct BoundsSolver {
    max_cubes: usize,
    max_assignments: usize,
}

impl Default for BoundsSolver {
    fn default() -> BoundsSolver {
        BoundsSolver {
            max_cubes: 256,
            max_assignments: 4096,
        }
    }
}

impl BoundsSolver {
    pub fn new() -> BoundsSolver {
        BoundsSolver::default()
    }
}

fn is_leaf(expr: &Expr) -> bool {
    match expr {
        Expr::Var(..) => true,
        Expr::Access(_, _, inner) => is_leaf(inner),
        _ => false,
    }
}

fn collect_leaves(expr: &Expr, leaves: &mut BTreeSet<Expr>) {
    if is_leaf(expr) {
        leaves.insert(expr.clone());
        return;
    }
    for child in expr.children() {
        collect_leaves(child, leaves);
    }
}

fn collect_constants(expr: &Expr, constants: &mut BTreeSet<Expr>) {
    if expr.is_constant() {
        constants.insert(expr.clone());
        return;
    }
    for child in expr.children() {
        collect_constants(child, constants);
    }
}

fn negate_bv_cmp(cmp: BvCmp) -> BvCmp {
    match cmp {
        BvCmp::Ult => BvCmp::Uge,
        BvCmp::Ule => BvCmp::Ugt,
        BvCmp::Ugt => BvCmp::Ule,
        BvCmp::Uge => BvCmp::Ult,
        BvCmp::Slt => BvCmp::Sge,
        BvCmp::Sle => BvCmp::Sgt,
        BvCmp::Sgt => BvCmp::Sle,
        BvCmp::Sge => BvCmp::Slt,
    }
}

fn negate_arith_cmp(cmp: ArithCmp) -> ArithCmp {
    match cmp {
        ArithCmp::Lt => ArithCmp::Ge,
        ArithCmp::Le => ArithCmp::Gt,
        ArithCmp::Gt => ArithCmp::Le,
        ArithCmp::Ge => ArithCmp::Lt,
    }
}

/// Push negations down to the atoms.
fn nnf(expr: &Expr, negated: bool) -> Expr {
    match expr {
        Expr::Bool(value) => Expr::Bool(*value != negated),
        Expr::Not(inner) => nnf(inner, !negated),
        Expr::And(exprs) | Expr::Or(exprs) => {
            let exprs = exprs.iter().map(|expr| nnf(expr, negated)).collect();
            if matches!(expr, Expr::And(_)) != negated {
                Expr::And(exprs)
            } else {
                Expr::Or(exprs)
            }
        }
        Expr::Ite(condition, then, else_) if then.sort().is_bool() => {
            let rewritten = Expr::Or(vec![
                Expr::And(vec![(**condition).clone(), (**then).clone()]),
                Expr::And(vec![Expr::Not(condition.clone()), (**else_).clone()]),
            ]);
            nnf(&rewritten, negated)
        }
        Expr::BvCmp(cmp, lhs, rhs) if negated => Expr::BvCmp(negate_bv_cmp(*cmp), lhs.clone(), rhs.clone()),
        Expr::ArithCmp(cmp, lhs, rhs) if negated => {
            Expr::ArithCmp(negate_arith_cmp(*cmp), lhs.clone(), rhs.clone())
        }
        expr if negated => Expr::Not(Box::new(expr.clone())),
        expr => expr.clone(),
    }
}

/// Disjunctive normal form of an NNF formula, `None` past `limit` cubes.
fn dnf(expr: &Expr, limit: usize) -> Option<Vec<Vec<Expr>>> {
    match expr {
        Expr::And(exprs) => {
            let mut cubes: Vec<Vec<Expr>> = vec![Vec::new()];
            for expr in exprs {
                let expanded = dnf(expr, limit)?;
                if cubes.len() * expanded.len() > limit {
                    return None;
                }
                let mut next = Vec::new();
                for cube in &cubes {
                    for other in &expanded {
                        let mut combined = cube.clone();
                        combined.extend(other.iter().cloned());
                        next.push(combined);
                    }
                }
                cubes = next;
            }
            Some(cubes)
        }
        Expr::Or(exprs) => {
            let mut cubes = Vec::new();
            for expr in exprs {
                cubes.extend(dnf(expr, limit)?);
                if cubes.len() > limit {
                    return None;
                }
            }
            Some(cubes)
        }
        Expr::Bool(true) => Some(vec![Vec::new()]),
        Expr::Bool(false) => Some(Vec::new()),
        literal => Some(vec![vec![literal.clone()]]),
    }
}

/// The leaf of a literal comparing a leaf against a constant.
fn simple_leaf(literal: &Expr) -> Option<&Expr> {
    let leaf = match literal {
        Expr::Not(inner) => match inner.as_ref() {
            Expr::Eq(lhs, rhs) => leaf_against_constant(lhs, rhs),
            leaf if is_leaf(leaf) => Some(leaf),
            _ => None,
        },
        Expr::Eq(lhs, rhs) | Expr::BvCmp(_, lhs, rhs) | Expr::ArithCmp(_, lhs, rhs) => {
            leaf_against_constant(lhs, rhs)
        }
        leaf if is_leaf(leaf) => Some(leaf),
        _ => None,
    }?;
    match leaf.sort() {
        Sort::Datatype(_) => None,
        _ => Some(leaf),
    }
}

fn leaf_against_constant<'e>(lhs: &'e Expr, rhs: &'e Expr) -> Option<&'e Expr> {
    if is_leaf(lhs) && rhs.is_constant() {
        Some(lhs)
    } else if is_leaf(rhs) && lhs.is_constant() {
        Some(rhs)
    } else {
        None
    }
}

/// Values worth trying for a leaf of `sort`, given the constants it is
/// compared against.
fn candidates(sort: &Sort, constants: &BTreeSet<Expr>) -> Vec<Expr> {
    let mut values: BTreeSet<Expr> = BTreeSet::new();
    match sort {
        Sort::Bool => {
            values.insert(Expr::Bool(false));
            values.insert(Expr::Bool(true));
        }
        Sort::BitVec(bits) => {
            let bits = *bits;
            let top = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
            let sign = 1u64 << (bits.max(1) - 1);
            for value in [0, 1, top, sign, sign.wrapping_sub(1)] {
                values.insert(Expr::bitvec(value, bits));
            }
            for constant in constants {
                let value = match constant {
                    Expr::BitVec { value, .. } => *value,
                    Expr::Int(value) => *value as u64,
                    _ => continue,
                };
                for value in [value, value.wrapping_add(1), value.wrapping_sub(1)] {
                    values.insert(Expr::bitvec(value, bits));
                }
            }
        }
        Sort::Int => {
            values.insert(Expr::Int(0));
            for constant in constants {
                if let Expr::Int(value) = constant {
                    values.insert(Expr::Int(*value));
                    values.insert(Expr::Int(value.saturating_add(1)));
                    values.insert(Expr::Int(value.saturating_sub(1)));
                }
            }
        }
        Sort::Real => {
            let mut points: Vec<f64> = constants
                .iter()
                .filter_map(|constant| match constant {
                    Expr::Real(value) => Some(value.value()),
                    _ => None,
                })
                .filter(|value| value.is_finite())
                .collect();
            points.sort_by(|a, b| a.total_cmp(b));
            points.dedup();
            values.insert(Expr::real(0.0));
            for point in &points {
                values.insert(Expr::real(*point));
            }
            for pair in points.windows(2) {
                values.insert(Expr::real((pair[0] + pair[1]) / 2.0));
            }
            if let (Some(first), Some(last)) = (points.first(), points.last()) {
                values.insert(Expr::real(first - 1.0));
                values.insert(Expr::real(last + 1.0));
            }
        }
        Sort::String => {
            let mut fresh = String::from("_");
            for constant in constants {
                if let Expr::Str(value) = constant {
                    values.insert(constant.clone());
                    fresh.push_str(value);
                }
            }
            values.insert(Expr::Str(fresh));
        }
        Sort::Datatype(_) => {
            values.insert(Expr::zero(sort));
            for constant in constants {
                if constant.sort() == *sort {
                    values.insert(constant.clone());
                }
            }
        }
    }
    values.into_iter().collect()
}

/// Field path of an access leaf, outermost last.
fn leaf_path(leaf: &Expr) -> Option<(&str, Vec<usize>)> {
    match leaf {
        Expr::Var(name, _) => Some((name, Vec::new())),
        Expr::Access(_, index, inner) => {
            let (name, mut path) = leaf_path(inner)?;
            path.push(*index);
            Some((name, path))
        }
        _ => None,
    }
}

fn set_field(value: &mut Expr, path: &[usize], leaf_value: Expr) {
    match path.split_first() {
        None => *value = leaf_value,
        Some((index, rest)) => {
            if let Expr::Construct(_, fields) = value {
                if let Some(field) = fields.get_mut(*index) {
                    set_field(field, rest, leaf_value);
                }
            }
        }
    }
}

/// Variable values for an assignment of leaves.
fn compose(
    variables: &BTreeMap<String, Sort>,
    assignment: &BTreeMap<Expr, Expr>,
) -> BTreeMap<String, Expr> {
    let mut values: BTreeMap<String, Expr> = variables
        .iter()
        .map(|(name, sort)| (name.clone(), Expr::zero(sort)))
        .collect();
    // Whole variables first, then their fields.
    let mut ordered: Vec<(&Expr, &Expr)> = assignment.iter().collect();
    ordered.sort_by_key(|(leaf, _)| leaf_path(leaf).map(|(_, path)| path.len()).unwrap_or(0));
    for (leaf, leaf_value) in ordered {
        if let Some((name, mut path)) = leaf_path(leaf) {
            path.reverse();
            if let Some(value) = values.get_mut(name) {
                set_field(value, &path, leaf_value.clone());
            }
        }
    }
    values
}

fn holds(literals: &[Expr], values: &BTreeMap<String, Expr>) -> Option<bool> {
    let lookup = |name: &str| values.get(name).cloned();
    let mut all = true;
    for literal in literals {
        match literal.eval(&lookup) {
            Some(Expr::Bool(true)) => {}
            Some(Expr::Bool(false)) => return Some(false),
            _ => all = false,
        }
    }
    if all {
        Some(true)
    } else {
        None
    }
}

enum CubeResult {
    Sat(Model),
    Unsat,
    Unknown,
}

impl BoundsSolver {
    fn check_cube(&self, cube: &[Expr], variables: &BTreeMap<String, Sort>) -> CubeResult {
        // Leaves appearing only in literals against constants are decided
        // exactly, one at a time.
        let mut exact: BTreeMap<Expr, Vec<&Expr>> = BTreeMap::new();
        let mut rest: Vec<&Expr> = Vec::new();
        for literal in cube {
            match simple_leaf(literal) {
                Some(leaf) => exact.entry(leaf.clone()).or_default().push(literal),
                None => rest.push(literal),
            }
        }
        let mut rest_leaves = BTreeSet::new();
        for literal in &rest {
            collect_leaves(literal, &mut rest_leaves);
        }
        let mut searched: Vec<&Expr> = Vec::new();
        for (leaf, literals) in &exact {
            if rest_leaves.contains(leaf) {
                searched.extend(literals.iter().cloned());
            }
        }
        exact.retain(|leaf, _| !rest_leaves.contains(leaf));
        searched.extend(rest.iter().cloned());

        let mut assignment: BTreeMap<Expr, Expr> = BTreeMap::new();
        for (leaf, literals) in &exact {
            let mut constants = BTreeSet::new();
            for literal in literals {
                collect_constants(literal, &mut constants);
            }
            let literals: Vec<Expr> = literals.iter().map(|literal| (*literal).clone()).collect();
            let found = candidates(&leaf.sort(), &constants).into_iter().find(|candidate| {
                let mut single = BTreeMap::new();
                single.insert(leaf.clone(), candidate.clone());
                holds(&literals, &compose(variables, &single)) == Some(true)
            });
            match found {
                Some(value) => {
                    assignment.insert(leaf.clone(), value);
                }
                None => return CubeResult::Unsat,
            }
        }

        // Search the remaining leaves over the product of their candidates.
        let searched: Vec<Expr> = searched.into_iter().cloned().collect();
        let mut constants = BTreeSet::new();
        for literal in &searched {
            collect_constants(literal, &mut constants);
        }
        let open: Vec<(Expr, Vec<Expr>)> = rest_leaves
            .into_iter()
            .map(|leaf| {
                let values = candidates(&leaf.sort(), &constants);
                (leaf, values)
            })
            .collect();

        let mut indices = vec![0usize; open.len()];
        for _ in 0..self.max_assignments {
            for (i, (leaf, values)) in open.iter().enumerate() {
                if let Some(value) = values.get(indices[i]) {
                    assignment.insert(leaf.clone(), value.clone());
                }
            }
            let values = compose(variables, &assignment);
            if holds(&searched, &values) == Some(true) {
                let mut model = Model::new();
                for (name, value) in values {
                    model.insert(name, value);
                }
                return CubeResult::Sat(model);
            }

            // Next assignment, odometer style.
            let mut position = 0;
            loop {
                if position == open.len() {
                    return CubeResult::Unknown;
                }
                indices[position] += 1;
                if indices[position] < open[position].1.len() {
                    break;
                }
                indices[position] = 0;
                position += 1;
            }
        }
        CubeResult::Unknown
    }
}

impl Solver for BoundsSolver {
    fn check(&self, assertions: &[Expr]) -> Result<SatResult, Error> {
        let formula = Expr::And(assertions.to_vec()).simplify();
        let variables = formula.variables();

        let cubes = match dnf(&nnf(&formula, false), self.max_cubes) {
            Some(cubes) => cubes,
            None => vec![vec![formula.clone()]],
        };

        let mut unknown = false;
        for cube in &cubes {
            let cube: Vec<Expr> = cube.iter().map(|literal| literal.simplify()).collect();
            if cube.iter().any(|literal| literal == &Expr::Bool(false)) {
                continue;
            }
            match self.check_cube(&cube, &variables) {
                CubeResult::Sat(model) => return Ok(SatResult::Sat(model)),
                CubeResult::Unsat => {}
                CubeResult::Unknown => unknown = true,
            }
        }

        if unknown {
            Ok(SatResult::Unknown)
        } else {
            Ok(SatResult::Unsat)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::{ArithOp, DatatypeSort};
    use crate::RC;

    fn axis() -> Expr {
        Expr::var("symcall:0", Sort::Real)
    }

    fn gt(lhs: Expr, rhs: f64) -> Expr {
        Expr::arith_cmp(ArithCmp::Gt, lhs, Expr::real(rhs)).unwrap()
    }

    fn lt(lhs: Expr, rhs: f64) -> Expr {
        Expr::arith_cmp(ArithCmp::Lt, lhs, Expr::real(rhs)).unwrap()
    }

    #[test]
    fn sign_cases_are_disjoint() {
        let solver = BoundsSolver::new();
        let positive = gt(axis(), 0.0);
        let negative = lt(axis(), 0.0);
        let zero = Expr::eq(axis(), Expr::real(0.0)).unwrap();

        for case in [&positive, &negative, &zero] {
            assert!(solver.check(&[case.clone()]).unwrap().is_sat());
        }
        assert!(solver
            .check(&[positive.clone(), negative.clone()])
            .unwrap()
            .is_unsat());
        assert!(solver.check(&[positive, zero.clone()]).unwrap().is_unsat());
        assert!(solver.check(&[negative, zero]).unwrap().is_unsat());
    }

    #[test]
    fn models_satisfy_the_query() {
        let solver = BoundsSolver::new();
        let vector = RC::new(DatatypeSort::new(
            "UnityEngine.Vector3",
            vec![
                ("x".to_string(), Sort::Real),
                ("y".to_string(), Sort::Real),
            ],
        ));
        let mouse = Expr::var("symcall:1", Sort::Datatype(vector));
        let x = Expr::access(mouse.clone(), "x").unwrap();
        let y = Expr::access(mouse, "y").unwrap();
        let query = vec![
            Expr::arith_cmp(ArithCmp::Ge, x.clone(), Expr::real(0.25)).unwrap(),
            lt(x, 0.5),
            Expr::not(lt(y.clone(), 0.75)).unwrap(),
            Expr::arith_cmp(ArithCmp::Le, y, Expr::real(1.0)).unwrap(),
        ];
        let result = solver.check(&query).unwrap();
        let model = result.model().unwrap();
        for condition in &query {
            assert_eq!(model.eval(condition), Some(Expr::Bool(true)));
        }
    }

    #[test]
    fn bitvectors_and_disjunctions() {
        let solver = BoundsSolver::new();
        let key = Expr::var("symcall:2", Sort::BitVec(8));
        let pressed = Expr::ne(key.clone(), Expr::bitvec(0, 8)).unwrap();
        let released = Expr::eq(key.clone(), Expr::bitvec(0, 8)).unwrap();
        assert!(solver
            .check(&[pressed.clone(), released.clone()])
            .unwrap()
            .is_unsat());
        assert!(solver
            .check(&[Expr::or(vec![pressed, released]).unwrap()])
            .unwrap()
            .is_sat());

        let negative = Expr::bv_cmp(BvCmp::Slt, key.clone(), Expr::bitvec(0, 8)).unwrap();
        let small = Expr::bv_cmp(BvCmp::Ult, key, Expr::bitvec(0x80, 8)).unwrap();
        assert!(solver.check(&[negative, small]).unwrap().is_unsat());
    }

    #[test]
    fn nonlinear_queries_are_searched() {
        let solver = BoundsSolver::new();
        let doubled = Expr::arith(ArithOp::Mul, axis(), Expr::real(2.0)).unwrap();
        let result = solver.check(&[gt(doubled, 1.0), lt(axis(), 2.0)]).unwrap();
        assert!(result.is_sat());
        let value = result.model().unwrap().get("symcall:0").unwrap().as_f64().unwrap();
        assert!(value * 2.0 > 1.0 && value < 2.0);
    }

    #[test]
    fn z3_queries_are_bounded_by_the_configured_timeout() {
        let mut options = AnalysisOptions::default();
        assert_eq!(Z3Process::from_options(&options).arguments(), vec!["-in", "-smt2"]);

        options.solver_timeout_ms = Some(250);
        let solver = Z3Process::from_options(&options);
        assert_eq!(solver.timeout_ms(), Some(250));
        assert_eq!(solver.arguments(), vec!["-in", "-smt2", "-t:250"]);
    }
}
