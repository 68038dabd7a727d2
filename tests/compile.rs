use belt_vm::prelude::*;

fn compile(src: &str) -> CompileResult {
    Compiler::new().compile(src).expect("program compiles")
}

fn compile_err(src: &str) -> CompileErrorKind {
    Compiler::new().compile(src).unwrap_err().kind
}

fn run_with(src: &str, trees: Vec<LoopTree>, ram_size: usize) -> Interpreter {
    let result = compile(src);
    let mut vm = Interpreter::new(LoopStack::new(trees), result.num_locals, ram_size);
    vm.run(&result.block).expect("program runs clean");
    vm
}

#[test]
fn lowers_to_the_expected_instructions() {
    let result = compile(
        "version 0.0.1;\n\
         a = 3i32;\n\
         b = 2i32;\n\
         h, l = a _*_ b;\n",
    );
    assert_eq!(result.num_locals, 0);
    assert_eq!(
        result.block.instructions(),
        &[
            Instruction::Const(BeltNum::new(Width::W32, 3)),
            Instruction::Const(BeltNum::new(Width::W32, 2)),
            Instruction::Arith {
                a: Operand::Belt(1),
                b: Operand::Belt(0),
                is_signed: true,
                mode: ArithMode::Widening,
                op: ArithOp::Mul,
            },
        ]
    );
}

#[test]
fn negative_literals_store_two_s_complement() {
    let result = compile("version 0.0.1; a = -2i8;");
    assert_eq!(
        result.block.instructions(),
        &[Instruction::Const(BeltNum::from_signed(-2, Width::W8))]
    );
}

#[test]
fn count_with_a_local() {
    let vm = run_with(
        "version 0.0.1;\n\
         zero = 0u8;\n\
         $acc = zero;\n\
         loop count {\n\
             x = $acc;\n\
             one = 1u8;\n\
             y = x + one;\n\
             $acc = y;\n\
         }\n\
         result = $acc;\n",
        vec![LoopTree::Leaf(5)],
        0,
    );
    assert_eq!(vm.belt().get_num(0).unwrap().value(), Some(5));
    assert_eq!(
        vm.local(0).unwrap().as_num().unwrap().value(),
        Some(5)
    );
}

#[test]
fn ram_store_load_round_trip() {
    let vm = run_with(
        "version 0.0.1;\n\
         r = ram();\n\
         v = 513u16;\n\
         r[0] = v;\n\
         w = r[0] as u16;\n\
         eq = w == v;\n\
         verify(eq);\n",
        vec![],
        4,
    );
    assert_eq!(&vm.ram()[..2], &[0x01, 0x02]);
    assert_eq!(vm.belt().get_num(0).unwrap().value(), Some(1));
}

#[test]
fn slicing_forms() {
    let vm = run_with(
        "version 0.0.1;\n\
         r = ram();\n\
         two = 2u8;\n\
         three = 3u8;\n\
         tail = r[two..];\n\
         mid = r[two..three];\n\
         head = r[..three];\n\
         tail_len = length(tail);\n\
         mid_len = length(mid);\n\
         head_len = length(head);\n",
        vec![],
        8,
    );
    assert_eq!(vm.belt().get_num(0).unwrap().value(), Some(5));
    assert_eq!(vm.belt().get_num(1).unwrap().value(), Some(3));
    assert_eq!(vm.belt().get_num(2).unwrap().value(), Some(6));
}

#[test]
fn trim_calls() {
    let vm = run_with(
        "version 0.0.1;\n\
         r = ram();\n\
         n = 2u8;\n\
         a = trim_l(r, n);\n\
         b = trim_r(r, n);\n\
         c = shrink(r, n);\n\
         a_len = length(a);\n\
         b_len = length(b);\n\
         c_len = length(c);\n",
        vec![],
        8,
    );
    assert_eq!(vm.belt().get_num(0).unwrap().value(), Some(6));
    assert_eq!(vm.belt().get_num(1).unwrap().value(), Some(6));
    assert_eq!(vm.belt().get_num(2).unwrap().value(), Some(6));
}

#[test]
fn witness_data_is_read_only() {
    let result = compile(
        "version 0.0.1;\n\
         i = 0u8;\n\
         d = data(i);\n\
         v = 5u8;\n\
         d[0] = v;\n",
    );
    let mut vm = Interpreter::new(LoopStack::new(vec![]), result.num_locals, 0)
        .with_data(vec![vec![1, 2, 3]]);
    let err = vm.run(&result.block).unwrap_err();
    assert_eq!(err.reason(), TrapReason::ImmutableSliceWrite);
}

#[test]
fn divmod_and_casts() {
    let vm = run_with(
        "version 0.0.1;\n\
         a = 17u16;\n\
         b = 3u16;\n\
         d, m = divmod(a, b);\n\
         small = cast_checked8(d);\n\
         wide = cast_extend32(small);\n\
         wrapped = cast_wrap8(wide);\n\
         sat = cast_sat8(a);\n",
        vec![],
        0,
    );
    // belt front to back: sat, wrapped, wide, small, d, m
    assert_eq!(vm.belt().get_num(0).unwrap(), BeltNum::new(Width::W8, 17));
    assert_eq!(vm.belt().get_num(1).unwrap(), BeltNum::new(Width::W8, 5));
    assert_eq!(vm.belt().get_num(2).unwrap(), BeltNum::new(Width::W32, 5));
    assert_eq!(vm.belt().get_num(3).unwrap(), BeltNum::new(Width::W8, 5));
    assert_eq!(vm.belt().get_num(4).unwrap(), BeltNum::new(Width::W16, 5));
    assert_eq!(vm.belt().get_num(5).unwrap(), BeltNum::new(Width::W16, 2));
}

#[test]
fn is_err_and_verify_ok_filter_errors() {
    let vm = run_with(
        "version 0.0.1;\n\
         a = 255u8;\n\
         one = 1u8;\n\
         sum = a + one;\n\
         bad = is_err(sum);\n\
         verify(bad);\n\
         zero = 0u8;\n\
         ok = a / zero;\n\
         flag = is_err(ok);\n\
         verify(flag);\n",
        vec![],
        0,
    );
    assert_eq!(vm.belt().get_num(0).unwrap().value(), Some(1));
}

#[test]
fn branches_merge_consistent_names() {
    let vm = run_with(
        "version 0.0.1;\n\
         c = 1u8;\n\
         if c {\n\
             x = 1u8;\n\
         } else {\n\
             x = 2u8;\n\
         }\n\
         y = x + c;\n",
        vec![],
        0,
    );
    assert_eq!(vm.belt().get_num(0).unwrap().value(), Some(2));
}

#[test]
fn branch_divergence_poisons_the_name() {
    let kind = compile_err(
        "version 0.0.1;\n\
         c = 1u8;\n\
         if c {\n\
             x = 1u8;\n\
         }\n\
         y = x + c;\n",
    );
    assert!(matches!(kind, CompileErrorKind::InconsistentItem { name, .. } if name == "x"));
}

#[test]
fn named_break_crosses_two_loops() {
    let result = compile(
        "version 0.0.1;\n\
         flag = 1u8;\n\
         loop outer {\n\
             loop inner {\n\
                 br_if(flag, outer);\n\
             }\n\
         }\n",
    );
    let mut vm = Interpreter::new(
        LoopStack::new(vec![LoopTree::Cartesian(1, vec![LoopTree::Leaf(1)])]),
        result.num_locals,
        0,
    );
    vm.run(&result.block).unwrap();
}

#[test]
fn unnamed_break_leaves_the_innermost_loop() {
    let vm = run_with(
        "version 0.0.1;\n\
         zero = 0u8;\n\
         $n = zero;\n\
         loop l {\n\
             x = $n;\n\
             one = 1u8;\n\
             y = x + one;\n\
             $n = y;\n\
             br();\n\
         }\n\
         result = $n;\n",
        vec![LoopTree::Leaf(9)],
        0,
    );
    // The unconditional break ends the loop after one iteration.
    assert_eq!(vm.belt().get_num(0).unwrap().value(), Some(1));
}

#[test]
fn loop_keeps_crossed_names_stable() {
    let kind = compile_err(
        "version 0.0.1;\n\
         a = 1u8;\n\
         b = 2u8;\n\
         loop l {\n\
             c = a + b;\n\
         }\n",
    );
    assert!(matches!(
        kind,
        CompileErrorKind::LoopVariableMoved { name, before: 1, after: 2 } if name == "a"
    ));
}

#[test]
fn version_gate() {
    assert!(matches!(
        compile_err("version 0.0.2;"),
        CompileErrorKind::UnsupportedVersion(v) if v == "0.0.2"
    ));
}

#[test]
fn cast_name_rejections() {
    // The misspelled form is not a function.
    assert!(matches!(
        compile_err("version 0.0.1; a = 1u32; b = cast_warp8(a);"),
        CompileErrorKind::UnknownFunction(name) if name == "cast_warp8"
    ));
    // Wrapping to the full width is pointless and rejected.
    assert!(matches!(
        compile_err("version 0.0.1; a = 1u32; b = cast_wrap64(a);"),
        CompileErrorKind::CastWidth(name) if name == "cast_wrap64"
    ));
    assert!(matches!(
        compile_err("version 0.0.1; a = 1u32; b = cast_extend8(a);"),
        CompileErrorKind::CastWidth(name) if name == "cast_extend8"
    ));
}

#[test]
fn belt_to_belt_assignment_is_rejected() {
    assert!(matches!(
        compile_err("version 0.0.1; a = 1u8; b = a;"),
        CompileErrorKind::BeltToBelt
    ));
}

#[test]
fn local_set_requires_the_front_item() {
    assert!(matches!(
        compile_err("version 0.0.1; a = 1u8; b = 2u8; $l = a;"),
        CompileErrorKind::NotFrontOfBelt { front, requested }
            if front == "b" && requested == "a"
    ));
}

#[test]
fn missing_name_suggests_locals() {
    let kind = compile_err("version 0.0.1; a = 1u8; c = ghost + a;");
    assert!(matches!(kind, CompileErrorKind::ItemNotFound(name) if name == "ghost"));
}

#[test]
fn sign_mismatch_is_rejected() {
    assert!(matches!(
        compile_err("version 0.0.1; a = 1u8; b = 1i8; c = a + b;"),
        CompileErrorKind::SignednessMismatch { .. }
    ));
}

#[test]
fn widening_needs_two_result_names() {
    assert!(matches!(
        compile_err("version 0.0.1; a = 1u8; b = 1u8; c = a _+_ b;"),
        CompileErrorKind::BadResultArity { expected: 2, found: 1, .. }
    ));
}

#[test]
fn literal_out_of_range_is_rejected() {
    assert!(matches!(
        compile_err("version 0.0.1; a = 300u8;"),
        CompileErrorKind::LiteralOutOfRange(text) if text == "300u8"
    ));
    assert!(matches!(
        compile_err("version 0.0.1; a = -1u8;"),
        CompileErrorKind::LiteralOutOfRange(text) if text == "-1u8"
    ));
}

#[test]
fn rotations_are_not_implemented() {
    assert!(matches!(
        compile_err("version 0.0.1; a = 1u8; b = rotl(a);"),
        CompileErrorKind::Unimplemented(name) if name == "rotl"
    ));
}

#[test]
fn unknown_scope_is_rejected() {
    assert!(matches!(
        compile_err("version 0.0.1; loop l { br(ghost); }"),
        CompileErrorKind::ScopeNotFound(name) if name == "ghost"
    ));
}

#[test]
fn errors_carry_their_location() {
    let err = Compiler::new()
        .compile("version 0.0.1;\na = 1u8;\nb = ghost;\n")
        .unwrap_err();
    assert_eq!((err.line, err.column), (3, 5));
}
