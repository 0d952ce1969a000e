//! Whole pipeline runs over small games.

use crate::analysis::COMPONENT_BASE_TYPE;
use crate::compile::{EvalContext, InputCondition, Object, Value};
use crate::config::GameConfiguration;
use crate::driver::Driver;
use crate::il::*;
use crate::symbolic::{smtlib, BoundsSolver, ExecutionStatus, Solver};

fn get_axis() -> MethodRef {
    MethodRef::static_(
        "UnityEngine.Input",
        "GetAxis",
        vec![Type::String],
        Type::Single,
    )
}

fn component(program: &mut Program, name: &str) {
    program.add_type(TypeDefinition::new(name, TypeKind::Class).with_base(COMPONENT_BASE_TYPE));
}

fn update(declaring_type: &str, body: Body) -> Method {
    Method::builder(declaring_type, "Update")
        .module("Game")
        .body(body)
        .build()
}

/// void Update() {
///     float h = Input.GetAxis("Horizontal");
///     if (h > 0) this.facing = 1;
/// }
fn player() -> Method {
    let this = Variable::this(Type::object("Game.Player"));
    let h = Variable::local("h", Type::Single);
    let facing = FieldRef::instance("Game.Player", "facing", Type::Int32);
    let mut body = Body::new();
    let entry = body.new_block();
    let right = body.new_block();
    let exit = body.new_block();
    body.emit(entry, Operation::stloc(&h, call(get_axis(), vec![ldstr("Horizontal")])))
        .unwrap();
    body.emit(
        entry,
        Operation::if_(
            comp(ComparisonKind::GreaterThan, ldloc(&h), ldc_f4(0.0)),
            right,
        ),
    )
    .unwrap();
    body.emit_glue(entry, exit).unwrap();
    body.emit(right, Operation::stfld(ldloc(&this), facing, ldc_i4(1)))
        .unwrap();
    body.emit(exit, Operation::ret()).unwrap();
    update("Game.Player", body)
}

/// void Update() { float h = Input.GetAxis("Vertical"); null.speed = h; }
fn broken_menu() -> Method {
    let h = Variable::local("h", Type::Single);
    let speed = FieldRef::instance("Game.Menu", "speed", Type::Single);
    let mut body = Body::new();
    let block = body.new_block();
    body.emit(block, Operation::stloc(&h, call(get_axis(), vec![ldstr("Vertical")])))
        .unwrap();
    body.emit(block, Operation::stfld(ldnull(), speed, ldloc(&h)))
        .unwrap();
    body.emit(block, Operation::ret()).unwrap();
    update("Game.Menu", body)
}

fn game() -> Program {
    let mut program = Program::new("Game");
    program.add_type(TypeDefinition::new(COMPONENT_BASE_TYPE, TypeKind::Class));
    component(&mut program, "Game.Player");
    component(&mut program, "Game.Menu");
    program.add_method(player());
    program.add_method(broken_menu());
    program
}

#[test]
fn one_path_per_axis_sign() {
    let program = game();
    let config = GameConfiguration::default();
    let solver = BoundsSolver::new();
    let report = Driver::run(&program, &config, &solver).unwrap();

    let player = report.entry_point("Game.Player.Update()").unwrap();
    assert_eq!(player.paths.len(), 3);
    let indices: Vec<usize> = player.paths.iter().map(|path| path.path_index).collect();
    assert_eq!(indices, vec![1, 2, 3]);
    for path in &player.paths {
        assert_eq!(path.status, ExecutionStatus::Halted);
        assert_eq!(
            path.symcalls[0].method,
            "UnityEngine.Input.GetAxis(System.String)"
        );
        assert_eq!(path.symcalls[0].arguments, vec!["\"Horizontal\"".to_string()]);
    }

    let conditions: Vec<Vec<_>> = player
        .paths
        .iter()
        .map(|path| smtlib::parse_script(&path.condition).unwrap().assertions)
        .collect();
    for (i, lhs) in conditions.iter().enumerate() {
        assert!(solver.check(lhs).unwrap().is_sat());
        for rhs in &conditions[i + 1..] {
            let mut both = lhs.clone();
            both.extend(rhs.iter().cloned());
            assert!(solver.check(&both).unwrap().is_unsat());
        }
    }
}

#[test]
fn unsupported_entry_points_are_skipped() {
    let program = game();
    let mut config = GameConfiguration::default();
    config.slicing = true;
    let solver = BoundsSolver::new();
    let report = Driver::run(&program, &config, &solver).unwrap();

    assert_eq!(report.entry_points.len(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].method, "Game.Menu.Update()");

    let slice = report.slice.as_ref().unwrap();
    assert!(slice.contains_method("Game.Player.Update()"));
    assert!(slice.contains_method("Game.Menu.Update()"));

    let json = report.to_json().unwrap();
    assert!(json.contains("Game.Menu.Update()"));
}

/// void Update() {
///     if (this.enabled) {
///         if (Input.GetButton("Jump")) this.jumps = 1;
///     }
/// }
#[test]
fn preconditions_and_inputs_of_each_path() {
    let this = Variable::this(Type::object("Game.Jumper"));
    let enabled = FieldRef::instance("Game.Jumper", "enabled", Type::Boolean);
    let jumps = FieldRef::instance("Game.Jumper", "jumps", Type::Int32);
    let get_button = MethodRef::static_(
        "UnityEngine.Input",
        "GetButton",
        vec![Type::String],
        Type::Boolean,
    );
    let mut body = Body::new();
    let entry = body.new_block();
    let active = body.new_block();
    let jump = body.new_block();
    let exit = body.new_block();
    body.emit(entry, Operation::if_(ldfld(ldloc(&this), enabled), active))
        .unwrap();
    body.emit_glue(entry, exit).unwrap();
    body.emit(
        active,
        Operation::if_(call(get_button, vec![ldstr("Jump")]), jump),
    )
    .unwrap();
    body.emit_glue(active, exit).unwrap();
    body.emit(jump, Operation::stfld(ldloc(&this), jumps, ldc_i4(1)))
        .unwrap();
    body.emit(exit, Operation::ret()).unwrap();

    let mut program = Program::new("Game");
    program.add_type(TypeDefinition::new(COMPONENT_BASE_TYPE, TypeKind::Class));
    component(&mut program, "Game.Jumper");
    program.add_method(update("Game.Jumper", body));
    let entry = program.require_method("Game.Jumper.Update()").unwrap().clone();

    let config = GameConfiguration::default();
    let solver = BoundsSolver::new();
    let analysis = Driver::new(&program, &config, &solver)
        .analyze_entry_point(&entry)
        .unwrap();
    assert_eq!(analysis.paths.len(), 3);
    assert!(analysis.report.warnings.is_empty());

    let jumper = EvalContext::new(Value::object(
        Object::new(1, "Game.Jumper").with_field("enabled", Value::Bool(true)),
    ));
    let feasible: Vec<_> = analysis
        .paths
        .iter()
        .filter(|path| path.is_feasible(&jumper))
        .collect();
    assert_eq!(feasible.len(), 2);

    let mut inputs: Vec<InputCondition> = Vec::new();
    for path in &feasible {
        let solved = path.solve_for_inputs(&jumper, &solver).unwrap().unwrap();
        assert_eq!(solved.len(), 1);
        inputs.extend(solved);
    }
    for down in [false, true] {
        assert!(inputs.contains(&InputCondition::Button {
            name: "Jump".to_string(),
            down,
        }));
    }

    let disabled = analysis
        .paths
        .iter()
        .find(|path| !path.is_feasible(&jumper))
        .unwrap();
    assert_eq!(disabled.solve_for_inputs(&jumper, &solver).unwrap(), None);
}

/// void Update() {
///     float h = Input.GetAxis("Horizontal");
///     if (this.label == null) this.shown = h;
/// }
fn label() -> Method {
    let this = Variable::this(Type::object("Game.Label"));
    let h = Variable::local("h", Type::Single);
    let text = FieldRef::instance("Game.Label", "label", Type::String);
    let shown = FieldRef::instance("Game.Label", "shown", Type::Single);
    let mut body = Body::new();
    let entry = body.new_block();
    let then = body.new_block();
    let exit = body.new_block();
    body.emit(entry, Operation::stloc(&h, call(get_axis(), vec![ldstr("Horizontal")])))
        .unwrap();
    body.emit(
        entry,
        Operation::if_(
            comp(ComparisonKind::Equality, ldfld(ldloc(&this), text), ldnull()),
            then,
        ),
    )
    .unwrap();
    body.emit_glue(entry, exit).unwrap();
    body.emit(then, Operation::stfld(ldloc(&this), shown, ldloc(&h)))
        .unwrap();
    body.emit(exit, Operation::ret()).unwrap();
    update("Game.Label", body)
}

/// void Update() { float h = Input.GetAxis("Vertical"); this.pose = this.pose; }
/// where `Game.Pose` is not part of the program.
fn rig() -> Method {
    let this = Variable::this(Type::object("Game.Rig"));
    let h = Variable::local("h", Type::Single);
    let pose = FieldRef::instance("Game.Rig", "pose", Type::structure("Game.Pose"));
    let mut body = Body::new();
    let block = body.new_block();
    body.emit(block, Operation::stloc(&h, call(get_axis(), vec![ldstr("Vertical")])))
        .unwrap();
    body.emit(
        block,
        Operation::stfld(ldloc(&this), pose.clone(), ldfld(ldloc(&this), pose)),
    )
    .unwrap();
    body.emit(block, Operation::ret()).unwrap();
    update("Game.Rig", body)
}

#[test]
fn failing_entry_points_do_not_end_the_run() {
    let mut program = Program::new("Game");
    program.add_type(TypeDefinition::new(COMPONENT_BASE_TYPE, TypeKind::Class));
    component(&mut program, "Game.Player");
    component(&mut program, "Game.Label");
    component(&mut program, "Game.Rig");
    program.add_method(player());
    program.add_method(label());
    program.add_method(rig());

    let config = GameConfiguration::default();
    let solver = BoundsSolver::new();
    let report = Driver::run(&program, &config, &solver).unwrap();

    assert_eq!(report.entry_point("Game.Player.Update()").unwrap().paths.len(), 3);
    let skipped: Vec<&str> = report
        .skipped
        .iter()
        .map(|skipped| skipped.method.as_str())
        .collect();
    assert_eq!(skipped.len(), 2);
    assert!(skipped.contains(&"Game.Label.Update()"));
    assert!(skipped.contains(&"Game.Rig.Update()"));
}
