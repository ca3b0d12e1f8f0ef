//! Property tests for the type solver.

use proptest::prelude::*;
use typemend_analysis::{OpKind, TypeSolver, ValueRange};
use typemend_ast::{CType, DeclId, TypeOracle};

fn arb_type() -> impl Strategy<Value = CType> {
    prop_oneof![
        Just(CType::char_()),
        Just(CType::uchar()),
        Just(CType::short_()),
        Just(CType::int_()),
        Just(CType::uint()),
        Just(CType::long_()),
        Just(CType::ulong()),
        Just(CType::longlong()),
        Just(CType::named("size_t", CType::ulong())),
        Just(CType::named("ptrdiff_t", CType::long_())),
    ]
}

#[derive(Debug, Clone)]
enum Op {
    Edge(u32, u32),
    Constraint(u32, CType),
    Range(u32, i64),
    Symbolic(u32, u32, u32),
    PtrOffset(u32),
}

fn arb_op(n: u32) -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..n, 0..n).prop_map(|(a, b)| Op::Edge(a, b)),
        (0..n, arb_type()).prop_map(|(a, t)| Op::Constraint(a, t)),
        (0..n, -100_000i64..5_000_000_000i64).prop_map(|(a, v)| Op::Range(a, v)),
        (0..n, 0..n, 0..n).prop_map(|(a, b, c)| Op::Symbolic(a, b, c)),
        (0..n).prop_map(Op::PtrOffset),
    ]
}

fn build(types: &[CType], fixed: &[bool], ops: &[Op]) -> TypeSolver {
    let oracle = TypeOracle::lp64();
    let mut solver = TypeSolver::new(oracle, oracle.size_type(), oracle.ptrdiff_type());
    for (i, ty) in types.iter().enumerate() {
        solver.add_node(DeclId(i as u32), ty.clone(), fixed[i], false);
    }
    for op in ops {
        match op {
            Op::Edge(a, b) => solver.add_edge(DeclId(*a), DeclId(*b)),
            Op::Constraint(a, t) => solver.add_constraint(DeclId(*a), t.clone(), None),
            Op::Range(a, v) => solver.add_range_constraint(DeclId(*a), ValueRange::single(*v)),
            Op::Symbolic(a, b, c) => {
                solver.add_symbolic_constraint(DeclId(*a), OpKind::Add, DeclId(*b), DeclId(*c))
            }
            Op::PtrOffset(a) => solver.add_pointer_offset_usage(DeclId(*a)),
        }
    }
    solver
}

proptest! {
    /// Resolved types never narrow: every update is at least as wide as
    /// the written type.
    #[test]
    fn prop_updates_only_widen(
        types in proptest::collection::vec(arb_type(), 2..6),
        ops in proptest::collection::vec(arb_op(8), 0..24),
    ) {
        let n = types.len() as u32;
        let ops: Vec<Op> = ops.into_iter().map(|op| clamp(op, n)).collect();
        let fixed = vec![false; types.len()];
        let oracle = TypeOracle::lp64();

        let mut solver = build(&types, &fixed, &ops);
        let updates = solver.solve();
        for (decl, node) in &updates {
            let original = &types[decl.0 as usize];
            let before = oracle.bit_width(original).unwrap_or(0);
            let after = oracle.bit_width(&node.constraint).unwrap_or(0);
            prop_assert!(after >= before, "{:?} narrowed {:?} -> {:?}", decl, original, node.constraint);
        }
    }

    /// Fixed nodes are never emitted as updates, whatever the constraints.
    #[test]
    fn prop_fixed_nodes_never_update(
        types in proptest::collection::vec(arb_type(), 2..6),
        ops in proptest::collection::vec(arb_op(8), 0..24),
    ) {
        let n = types.len() as u32;
        let ops: Vec<Op> = ops.into_iter().map(|op| clamp(op, n)).collect();
        let fixed = vec![true; types.len()];

        let mut solver = build(&types, &fixed, &ops);
        prop_assert!(solver.solve().is_empty());
    }

    /// Solving the same inputs twice produces the same updates.
    #[test]
    fn prop_solve_is_deterministic(
        types in proptest::collection::vec(arb_type(), 2..6),
        ops in proptest::collection::vec(arb_op(8), 0..24),
    ) {
        let n = types.len() as u32;
        let ops: Vec<Op> = ops.into_iter().map(|op| clamp(op, n)).collect();
        let fixed = vec![false; types.len()];

        let mut first = build(&types, &fixed, &ops);
        let mut second = build(&types, &fixed, &ops);
        let a = first.solve();
        let b = second.solve();

        prop_assert_eq!(a.len(), b.len());
        for (decl, node) in &a {
            prop_assert_eq!(&b[decl].constraint, &node.constraint);
        }
    }
}

/// Rewrites node indices into range for the generated node count.
fn clamp(op: Op, n: u32) -> Op {
    let c = |v: u32| v % n;
    match op {
        Op::Edge(a, b) => Op::Edge(c(a), c(b)),
        Op::Constraint(a, t) => Op::Constraint(c(a), t),
        Op::Range(a, v) => Op::Range(c(a), v),
        Op::Symbolic(a, b, d) => Op::Symbolic(c(a), c(b), c(d)),
        Op::PtrOffset(a) => Op::PtrOffset(c(a)),
    }
}
