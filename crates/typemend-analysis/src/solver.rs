//! The constraint-graph type solver.
//!
//! Declarations are nodes; assignments and loop bounds are directed edges;
//! arithmetic is kept symbolically. Solving runs in three phases:
//!
//! 1. SCC contraction (Tarjan) with widest-constraint unification per
//!    component, then constraint flow through the condensation: an edge
//!    `target -> source` means the source's width must flow into the target.
//! 2. A bounded symbolic fixpoint over `(result, op, lhs, rhs)` records.
//! 3. Per-node finalization: pointer offsets floor at `ptrdiff_t`, observed
//!    ranges pick the smallest sufficient integer, and the accumulated
//!    constraint stays a floor throughout.
//!
//! The solver never fails: unknown types degrade to the original type and
//! the result is a possibly empty update map.

use crate::range::ValueRange;
use indexmap::IndexMap;
use typemend_ast::{CType, DeclId, ExprId, TypeOracle};

/// Arithmetic operators tracked symbolically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Add,
    Sub,
    Mul,
    Div,
}

/// Solver state for one declaration.
#[derive(Debug, Clone)]
pub struct Node {
    /// The declaration this node stands for.
    pub decl: DeclId,
    /// The type written in source.
    pub original: CType,
    /// The widest requirement seen so far. Only ever widens.
    pub constraint: CType,
    /// Observed value range.
    pub range: ValueRange,
    /// Immovable anchor: never emitted as an update.
    pub is_fixed: bool,
    /// The declaration is a typedef alias.
    pub is_typedef: bool,
    /// A cross-TU fact constrained this node.
    pub has_global_constraint: bool,
    /// Used as an index/offset into a pointer.
    pub is_ptr_offset: bool,
    /// Held a negative literal; blocks promotion to unsigned types.
    pub never_unsigned: bool,
    /// Last expression the constraint came from, for decltype generation.
    pub base_expr: Option<ExprId>,
}

impl Node {
    fn new(decl: DeclId, ty: CType, is_fixed: bool, is_typedef: bool) -> Self {
        Self {
            decl,
            original: ty.clone(),
            constraint: ty,
            range: ValueRange::empty(),
            is_fixed,
            is_typedef,
            has_global_constraint: false,
            is_ptr_offset: false,
            never_unsigned: false,
            base_expr: None,
        }
    }
}

/// The strict "wider" partial order over scalar types.
///
/// Unknown loses to anything; incomplete types lose to complete ones;
/// non-scalars lose to scalars; otherwise the larger bit width wins and
/// unsigned beats signed on ties. First operand wins exact ties, so an
/// established spelling like `size_t` is kept over `unsigned long`.
pub fn wider_type(oracle: &TypeOracle, a: &CType, b: &CType) -> CType {
    if matches!(a, CType::Unknown) {
        return b.clone();
    }
    if matches!(b, CType::Unknown) {
        return a.clone();
    }
    if a == b {
        return a.clone();
    }
    if a.is_incomplete() {
        return b.clone();
    }
    if b.is_incomplete() {
        return a.clone();
    }
    if !a.is_scalar() {
        return b.clone();
    }
    if !b.is_scalar() {
        return a.clone();
    }

    let wa = oracle.bit_width(a).unwrap_or(0);
    let wb = oracle.bit_width(b).unwrap_or(0);
    if wb > wa {
        return b.clone();
    }
    if wa > wb {
        return a.clone();
    }
    if b.is_unsigned_integer() && a.is_signed_integer() {
        return b.clone();
    }
    a.clone()
}

#[derive(Debug, Clone)]
struct SymbolicConstraint {
    result: DeclId,
    op: OpKind,
    lhs: DeclId,
    rhs: DeclId,
}

/// Graph-based solver for type constraints.
#[derive(Debug)]
pub struct TypeSolver {
    oracle: TypeOracle,
    /// `size_t` as it should be spelled in this unit.
    size_ty: CType,
    /// `ptrdiff_t` as it should be spelled in this unit.
    ptrdiff_ty: CType,
    nodes: IndexMap<DeclId, Node>,
    /// Directed adjacency. An entry `target -> [sources]` records that each
    /// source's width must flow into the target (assignment `target = source`).
    adjacency: IndexMap<DeclId, Vec<DeclId>>,
    symbolic: Vec<SymbolicConstraint>,
}

impl TypeSolver {
    /// Creates a solver. The size/ptrdiff spellings come from the session
    /// so a unit-local `typedef` wins over the oracle's canonical type.
    pub fn new(oracle: TypeOracle, size_ty: CType, ptrdiff_ty: CType) -> Self {
        Self {
            oracle,
            size_ty,
            ptrdiff_ty,
            nodes: IndexMap::new(),
            adjacency: IndexMap::new(),
            symbolic: Vec::new(),
        }
    }

    /// Registers a declaration. Idempotent: re-adding only strengthens the
    /// `is_fixed` / `is_typedef` flags.
    pub fn add_node(&mut self, decl: DeclId, current_type: CType, is_fixed: bool, is_typedef: bool) {
        match self.nodes.get_mut(&decl) {
            None => {
                self.nodes
                    .insert(decl, Node::new(decl, current_type, is_fixed, is_typedef));
            }
            Some(node) => {
                node.is_fixed |= is_fixed;
                node.is_typedef |= is_typedef;
            }
        }
    }

    /// Records a directed flow: `source`'s width must flow into `target`
    /// (assignment `target = source`). Unknown endpoints and self-loops are
    /// ignored.
    pub fn add_edge(&mut self, target: DeclId, source: DeclId) {
        if target == source || !self.nodes.contains_key(&target) || !self.nodes.contains_key(&source)
        {
            return;
        }
        self.adjacency.entry(target).or_default().push(source);
    }

    /// Widens a node's constraint to `candidate` and remembers the driving
    /// expression.
    pub fn add_constraint(&mut self, decl: DeclId, candidate: CType, base_expr: Option<ExprId>) {
        let wide = match self.nodes.get(&decl) {
            Some(node) => self.wider(&node.constraint, &candidate),
            None => return,
        };
        let node = self.nodes.get_mut(&decl).expect("checked above");
        node.constraint = wide;
        if base_expr.is_some() {
            node.base_expr = base_expr;
        }
    }

    /// Applies a cross-TU fact as a constraint. Creates the node if the
    /// declaration was not seen yet.
    pub fn add_global_constraint(&mut self, decl: DeclId, global_type: CType) {
        let Some(node) = self.nodes.get(&decl) else {
            let mut node = Node::new(decl, global_type, false, false);
            node.has_global_constraint = true;
            self.nodes.insert(decl, node);
            return;
        };
        let wide = self.wider(&node.constraint, &global_type);
        let node = self.nodes.get_mut(&decl).expect("checked above");
        node.constraint = wide;
        node.has_global_constraint = true;
    }

    /// Constrains a loop induction variable by its bound: the bound's type
    /// becomes a candidate, and a named bound also links the two nodes.
    pub fn add_loop_comparison_constraint(
        &mut self,
        induction: DeclId,
        bound_type: CType,
        bound_decl: Option<DeclId>,
        base_expr: Option<ExprId>,
    ) {
        self.add_constraint(induction, bound_type, base_expr);
        if let Some(bound) = bound_decl {
            self.add_edge(bound, induction);
        }
    }

    /// Unions an observed range into the node.
    pub fn add_range_constraint(&mut self, decl: DeclId, range: ValueRange) {
        if let Some(node) = self.nodes.get_mut(&decl) {
            node.range.union(&range);
            if range.has_negative() {
                node.never_unsigned = true;
            }
        }
    }

    /// Records `result = lhs op rhs` for the fixpoint phase. All three must
    /// already be nodes.
    pub fn add_symbolic_constraint(&mut self, result: DeclId, op: OpKind, lhs: DeclId, rhs: DeclId) {
        if self.nodes.contains_key(&result)
            && self.nodes.contains_key(&lhs)
            && self.nodes.contains_key(&rhs)
        {
            self.symbolic.push(SymbolicConstraint {
                result,
                op,
                lhs,
                rhs,
            });
        }
    }

    /// Flags a node as a pointer offset; its resolved type is floored at
    /// `ptrdiff_t` during solve.
    pub fn add_pointer_offset_usage(&mut self, decl: DeclId) {
        if let Some(node) = self.nodes.get_mut(&decl) {
            node.is_ptr_offset = true;
        }
    }

    /// Blocks promotion of the node to unsigned types (negative literal
    /// observed).
    pub fn mark_never_unsigned(&mut self, decl: DeclId) {
        if let Some(node) = self.nodes.get_mut(&decl) {
            node.never_unsigned = true;
        }
    }

    /// Read access to a node.
    pub fn node(&self, decl: DeclId) -> Option<&Node> {
        self.nodes.get(&decl)
    }

    /// The node's current constraint, post-solve the resolved type.
    pub fn resolved_type(&self, decl: DeclId) -> Option<&CType> {
        self.nodes.get(&decl).map(|n| &n.constraint)
    }

    /// The strict "wider" partial order over scalar types; see
    /// [`wider_type`].
    pub fn wider(&self, a: &CType, b: &CType) -> CType {
        wider_type(&self.oracle, a, b)
    }

    /// Smallest standard integer representing the range; the original type
    /// when no bound was observed.
    fn optimal_type_for_range(&self, range: &ValueRange, original: &CType) -> CType {
        if range.is_empty() {
            return original.clone();
        }

        if !range.has_negative() {
            let Some(max) = range.max else {
                return original.clone();
            };
            if max <= u8::MAX as i64 {
                return CType::uchar();
            }
            if max <= u16::MAX as i64 {
                return CType::ushort();
            }
            if max <= u32::MAX as i64 {
                return CType::uint();
            }
            return self.size_ty.clone();
        }

        let abs_max = range
            .min
            .map(|m| (m as i128).abs())
            .into_iter()
            .chain(range.max.map(|m| (m as i128).abs()))
            .max()
            .unwrap_or(0);
        if abs_max <= i8::MAX as i128 {
            CType::schar()
        } else if abs_max <= i16::MAX as i128 {
            CType::short_()
        } else if abs_max <= i32::MAX as i128 {
            CType::int_()
        } else {
            CType::longlong()
        }
    }

    /// Solves the graph and returns the nodes whose resolved type differs
    /// from the written one.
    pub fn solve(&mut self) -> IndexMap<DeclId, Node> {
        self.contract_components();
        self.run_symbolic_fixpoint();
        self.finalize()
    }

    // --- Phase A: SCC contraction + condensation flow ---

    fn contract_components(&mut self) {
        let sccs = self.tarjan();

        // Tarjan emits an SCC before every SCC that can reach it, so by the
        // time a target component is processed its sources already carry
        // their final constraints.
        for component in &sccs {
            let mut merged = CType::Unknown;
            let mut merged_range = ValueRange::empty();
            let mut fixed = false;
            let mut ptr_offset = false;
            let mut never_unsigned = false;

            for member in component {
                let node = &self.nodes[member];
                merged = self.wider(&merged, &node.constraint);
                merged_range.union(&node.range.clone());
                fixed |= node.is_fixed;
                ptr_offset |= node.is_ptr_offset;
                never_unsigned |= node.never_unsigned;
            }

            // Pull widths in from the sources this component points at.
            for member in component {
                let sources = self.adjacency.get(member).cloned().unwrap_or_default();
                for source in sources {
                    if component.contains(&source) {
                        continue;
                    }
                    let source_constraint = self.nodes[&source].constraint.clone();
                    merged = self.wider(&merged, &source_constraint);
                }
            }

            if ptr_offset {
                merged = self.wider(&merged, &self.ptrdiff_ty.clone());
            }

            for member in component {
                let node = self.nodes.get_mut(member).expect("member exists");
                node.constraint = merged.clone();
                node.range = merged_range;
                if ptr_offset {
                    node.is_ptr_offset = true;
                }
                if fixed {
                    node.is_fixed = true;
                }
                if never_unsigned {
                    node.never_unsigned = true;
                }
            }
        }
    }

    /// Iterative Tarjan over the directed graph; components come out in
    /// reverse topological order of the condensation.
    fn tarjan(&self) -> Vec<Vec<DeclId>> {
        let ids: Vec<DeclId> = self.nodes.keys().copied().collect();
        let n = ids.len();
        let position = |decl: DeclId| self.nodes.get_index_of(&decl).expect("node exists");

        const UNVISITED: usize = usize::MAX;
        let mut index = vec![UNVISITED; n];
        let mut lowlink = vec![0usize; n];
        let mut on_stack = vec![false; n];
        let mut stack: Vec<usize> = Vec::new();
        let mut next_index = 0usize;
        let mut sccs: Vec<Vec<DeclId>> = Vec::new();

        let neighbors: Vec<Vec<usize>> = ids
            .iter()
            .map(|id| {
                self.adjacency
                    .get(id)
                    .map(|targets| targets.iter().map(|t| position(*t)).collect())
                    .unwrap_or_default()
            })
            .collect();

        for root in 0..n {
            if index[root] != UNVISITED {
                continue;
            }
            let mut frames: Vec<(usize, usize)> = vec![(root, 0)];
            while let Some(&(v, cursor)) = frames.last() {
                if cursor == 0 {
                    index[v] = next_index;
                    lowlink[v] = next_index;
                    next_index += 1;
                    stack.push(v);
                    on_stack[v] = true;
                }

                if cursor < neighbors[v].len() {
                    let w = neighbors[v][cursor];
                    frames.last_mut().expect("frame exists").1 += 1;
                    if index[w] == UNVISITED {
                        frames.push((w, 0));
                    } else if on_stack[w] {
                        lowlink[v] = lowlink[v].min(index[w]);
                    }
                } else {
                    frames.pop();
                    if let Some(&(parent, _)) = frames.last() {
                        lowlink[parent] = lowlink[parent].min(lowlink[v]);
                    }
                    if lowlink[v] == index[v] {
                        let mut component = Vec::new();
                        while let Some(w) = stack.pop() {
                            on_stack[w] = false;
                            component.push(ids[w]);
                            if w == v {
                                break;
                            }
                        }
                        sccs.push(component);
                    }
                }
            }
        }

        sccs
    }

    // --- Phase B: bounded symbolic fixpoint ---

    fn run_symbolic_fixpoint(&mut self) {
        const MAX_ITER: u32 = 25;

        let constraints = self.symbolic.clone();
        let mut changed = true;
        let mut iterations = 0;

        while changed && iterations < MAX_ITER {
            changed = false;
            iterations += 1;

            for sc in &constraints {
                let lhs_c = self.nodes[&sc.lhs].constraint.clone();
                let rhs_c = self.nodes[&sc.rhs].constraint.clone();
                let mut op_type = self.wider(&lhs_c, &rhs_c);

                if self.nodes[&sc.lhs].is_ptr_offset || self.nodes[&sc.rhs].is_ptr_offset {
                    op_type = self.wider(&op_type, &self.ptrdiff_ty.clone());
                }

                // Forward: the result must hold the operation's width.
                let target_c = self.nodes[&sc.result].constraint.clone();
                let new_target = self.wider(&target_c, &op_type);
                if new_target != target_c {
                    self.nodes.get_mut(&sc.result).expect("node exists").constraint =
                        new_target.clone();
                    changed = true;
                }

                // Backward: a wider result pushes width into non-fixed
                // operands.
                let target_bits = self.oracle.bit_width(&new_target).unwrap_or(0);
                let op_bits = self.oracle.bit_width(&op_type).unwrap_or(0);
                if target_bits > op_bits {
                    for operand in [sc.lhs, sc.rhs] {
                        if self.nodes[&operand].is_fixed {
                            continue;
                        }
                        let current = self.nodes[&operand].constraint.clone();
                        let widened = self.wider(&current, &new_target);
                        if widened != current {
                            self.nodes.get_mut(&operand).expect("node exists").constraint =
                                widened;
                            changed = true;
                        }
                    }
                }
            }
        }
    }

    // --- Phase C: finalization ---

    fn finalize(&mut self) -> IndexMap<DeclId, Node> {
        let mut updates = IndexMap::new();
        let decls: Vec<DeclId> = self.nodes.keys().copied().collect();

        for decl in decls {
            let node = self.nodes[&decl].clone();
            if node.is_fixed {
                continue;
            }

            let mut resolved = if node.is_ptr_offset {
                self.wider(&node.constraint, &self.ptrdiff_ty.clone())
            } else if node.range.max.is_some() {
                self.optimal_type_for_range(&node.range, &node.original)
            } else {
                node.constraint.clone()
            };

            // The accumulated constraint is a floor even when range
            // analysis shrinks.
            resolved = self.wider(&resolved, &node.constraint);

            if resolved.is_incomplete() || matches!(resolved, CType::Unknown) {
                continue;
            }
            if node.never_unsigned && resolved.is_unsigned_integer() {
                continue;
            }
            if resolved != node.original {
                let slot = self.nodes.get_mut(&decl).expect("node exists");
                slot.constraint = resolved;
                updates.insert(decl, slot.clone());
            }
        }

        updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solver() -> TypeSolver {
        let oracle = TypeOracle::lp64();
        let size_ty = oracle.size_type();
        let ptrdiff_ty = oracle.ptrdiff_type();
        TypeSolver::new(oracle, size_ty, ptrdiff_ty)
    }

    fn d(n: u32) -> DeclId {
        DeclId(n)
    }

    // --- Wider Order Tests ---

    #[test]
    fn test_wider_prefers_larger_width() {
        let s = solver();
        assert_eq!(s.wider(&CType::int_(), &CType::long_()), CType::long_());
        assert_eq!(s.wider(&CType::long_(), &CType::int_()), CType::long_());
    }

    #[test]
    fn test_wider_unsigned_wins_ties() {
        let s = solver();
        assert_eq!(s.wider(&CType::long_(), &CType::ulong()), CType::ulong());
        // First operand wins when both are unsigned.
        let size_t = CType::named("size_t", CType::ulong());
        assert_eq!(s.wider(&size_t, &CType::ulong()), size_t);
    }

    #[test]
    fn test_wider_unknown_loses() {
        let s = solver();
        assert_eq!(s.wider(&CType::Unknown, &CType::int_()), CType::int_());
        assert_eq!(s.wider(&CType::int_(), &CType::Unknown), CType::int_());
    }

    #[test]
    fn test_wider_incomplete_loses() {
        let s = solver();
        assert_eq!(s.wider(&CType::Auto, &CType::long_()), CType::long_());
        assert_eq!(s.wider(&CType::long_(), &CType::Auto), CType::long_());
    }

    #[test]
    fn test_wider_non_scalar_loses() {
        let s = solver();
        let vec_ty = CType::Template {
            name: "std::vector".to_string(),
            args: vec![CType::int_()],
        };
        assert_eq!(s.wider(&vec_ty, &CType::long_()), CType::long_());
    }

    // --- Constraint Tests ---

    #[test]
    fn test_simple_constraint_widens() {
        let mut s = solver();
        let size_t = s.size_ty.clone();
        s.add_node(d(0), CType::int_(), false, false);
        s.add_constraint(d(0), size_t.clone(), None);

        let updates = s.solve();
        assert_eq!(updates[&d(0)].constraint, size_t);
    }

    #[test]
    fn test_constraint_on_unknown_decl_is_ignored() {
        let mut s = solver();
        s.add_constraint(d(9), CType::long_(), None);
        assert!(s.solve().is_empty());
    }

    #[test]
    fn test_no_update_when_type_unchanged() {
        let mut s = solver();
        s.add_node(d(0), CType::int_(), false, false);
        s.add_constraint(d(0), CType::short_(), None);
        assert!(s.solve().is_empty());
    }

    #[test]
    fn test_fixed_node_never_updates() {
        let mut s = solver();
        s.add_node(d(0), CType::int_(), true, false);
        s.add_constraint(d(0), CType::longlong(), None);
        assert!(s.solve().is_empty());
    }

    #[test]
    fn test_add_node_strengthens_flags() {
        let mut s = solver();
        s.add_node(d(0), CType::int_(), false, false);
        s.add_node(d(0), CType::int_(), true, true);
        let node = s.node(d(0)).unwrap();
        assert!(node.is_fixed);
        assert!(node.is_typedef);
    }

    // --- Graph Tests ---

    #[test]
    fn test_edge_propagates_source_width_to_target() {
        // j = i; i widened to size_t. j must follow.
        let mut s = solver();
        let size_t = s.size_ty.clone();
        s.add_node(d(0), CType::int_(), false, false); // i
        s.add_node(d(1), CType::int_(), false, false); // j
        s.add_edge(d(1), d(0));
        s.add_constraint(d(0), size_t.clone(), None);

        let updates = s.solve();
        assert_eq!(updates[&d(1)].constraint, size_t);
    }

    #[test]
    fn test_cycle_members_unify() {
        // a = b; b = a; one constrained to long long.
        let mut s = solver();
        s.add_node(d(0), CType::int_(), false, false);
        s.add_node(d(1), CType::int_(), false, false);
        s.add_edge(d(0), d(1));
        s.add_edge(d(1), d(0));
        s.add_constraint(d(1), CType::longlong(), None);

        let updates = s.solve();
        assert_eq!(updates[&d(0)].constraint, CType::longlong());
        assert_eq!(updates[&d(1)].constraint, CType::longlong());
    }

    #[test]
    fn test_chain_propagation_through_condensation() {
        // c = b; b = a; a constrained wide: the whole chain follows.
        let mut s = solver();
        let size_t = s.size_ty.clone();
        for i in 0..3 {
            s.add_node(d(i), CType::int_(), false, false);
        }
        s.add_edge(d(1), d(0));
        s.add_edge(d(2), d(1));
        s.add_constraint(d(0), size_t.clone(), None);

        let updates = s.solve();
        assert_eq!(updates[&d(1)].constraint, size_t);
        assert_eq!(updates[&d(2)].constraint, size_t);
    }

    #[test]
    fn test_self_loop_ignored() {
        let mut s = solver();
        s.add_node(d(0), CType::int_(), false, false);
        s.add_edge(d(0), d(0));
        assert!(s.solve().is_empty());
    }

    #[test]
    fn test_fixed_is_sticky_across_scc() {
        let mut s = solver();
        s.add_node(d(0), CType::int_(), true, false);
        s.add_node(d(1), CType::int_(), false, false);
        s.add_edge(d(0), d(1));
        s.add_edge(d(1), d(0));
        s.add_constraint(d(1), CType::longlong(), None);

        // The whole cycle is anchored by the fixed member.
        assert!(s.solve().is_empty());
    }

    // --- Symbolic Tests ---

    #[test]
    fn test_symbolic_forward_flow() {
        // r = a + b with b : long long.
        let mut s = solver();
        s.add_node(d(0), CType::int_(), false, false); // r
        s.add_node(d(1), CType::int_(), false, false); // a
        s.add_node(d(2), CType::longlong(), false, false); // b
        s.add_symbolic_constraint(d(0), OpKind::Add, d(1), d(2));

        let updates = s.solve();
        assert_eq!(updates[&d(0)].constraint, CType::longlong());
    }

    #[test]
    fn test_symbolic_backward_flow() {
        // r = a + b with r : long long pushes into the operands.
        let mut s = solver();
        s.add_node(d(0), CType::longlong(), false, false);
        s.add_node(d(1), CType::int_(), false, false);
        s.add_node(d(2), CType::int_(), false, false);
        s.add_symbolic_constraint(d(0), OpKind::Mul, d(1), d(2));

        let updates = s.solve();
        assert_eq!(updates[&d(1)].constraint, CType::longlong());
        assert_eq!(updates[&d(2)].constraint, CType::longlong());
    }

    #[test]
    fn test_symbolic_backward_skips_fixed_operand() {
        let mut s = solver();
        s.add_node(d(0), CType::longlong(), false, false);
        s.add_node(d(1), CType::int_(), true, false); // fixed
        s.add_node(d(2), CType::int_(), false, false);
        s.add_symbolic_constraint(d(0), OpKind::Add, d(1), d(2));

        let updates = s.solve();
        assert!(!updates.contains_key(&d(1)));
        assert_eq!(updates[&d(2)].constraint, CType::longlong());
    }

    // --- Pointer Offset Tests ---

    #[test]
    fn test_ptr_offset_floors_at_ptrdiff() {
        let mut s = solver();
        let ptrdiff = s.ptrdiff_ty.clone();
        s.add_node(d(0), CType::int_(), false, false);
        s.add_pointer_offset_usage(d(0));

        let updates = s.solve();
        assert_eq!(updates[&d(0)].constraint, ptrdiff);
    }

    #[test]
    fn test_ptr_offset_overrides_small_range() {
        // for (int i = 0; i < 10; i++) p[i]: the range says char, the
        // pointer arithmetic says ptrdiff_t.
        let mut s = solver();
        let ptrdiff = s.ptrdiff_ty.clone();
        s.add_node(d(0), CType::int_(), false, false);
        s.add_range_constraint(d(0), ValueRange::single(0));
        s.add_range_constraint(d(0), ValueRange::single(10));
        s.add_pointer_offset_usage(d(0));

        let updates = s.solve();
        assert_eq!(updates[&d(0)].constraint, ptrdiff);
    }

    // --- Range Tests ---

    #[test]
    fn test_range_picks_smallest_sufficient_type() {
        let mut s = solver();
        s.add_node(d(0), CType::longlong(), false, false);
        s.add_node(d(1), CType::longlong(), false, false);
        s.add_range_constraint(d(0), ValueRange::single(200));
        s.add_range_constraint(d(1), ValueRange::single(70000));

        // The constraint (long long, from the written type) floors the
        // result, so no shrinking update is emitted.
        let updates = s.solve();
        assert!(updates.is_empty());
    }

    #[test]
    fn test_range_to_type_table() {
        let s = solver();
        let t = |min: i64, max: i64| {
            s.optimal_type_for_range(
                &ValueRange {
                    min: Some(min),
                    max: Some(max),
                },
                &CType::int_(),
            )
        };
        assert_eq!(t(0, 200), CType::uchar());
        assert_eq!(t(0, 60000), CType::ushort());
        assert_eq!(t(0, 70000), CType::uint());
        assert_eq!(t(0, 5_000_000_000), s.size_ty);
        assert_eq!(t(-5, 100), CType::schar());
        assert_eq!(t(-200, 100), CType::short_());
        assert_eq!(t(-70000, 0), CType::int_());
        assert_eq!(t(-5_000_000_000, 0), CType::longlong());
    }

    #[test]
    fn test_constraint_floors_range_result() {
        // Range says unsigned char but a size_t constraint exists.
        let mut s = solver();
        let size_t = s.size_ty.clone();
        s.add_node(d(0), CType::int_(), false, false);
        s.add_range_constraint(d(0), ValueRange::single(10));
        s.add_constraint(d(0), size_t.clone(), None);

        let updates = s.solve();
        assert_eq!(updates[&d(0)].constraint, size_t);
    }

    // --- Negative Guard Tests ---

    #[test]
    fn test_negative_value_blocks_unsigned_promotion() {
        // int i = -1; i = get_size();
        let mut s = solver();
        let size_t = s.size_ty.clone();
        s.add_node(d(0), CType::int_(), false, false);
        s.add_range_constraint(d(0), ValueRange::single(-1));
        s.add_constraint(d(0), size_t, None);

        assert!(s.solve().is_empty());
    }

    #[test]
    fn test_negative_value_allows_signed_promotion() {
        let mut s = solver();
        s.add_node(d(0), CType::int_(), false, false);
        s.add_range_constraint(d(0), ValueRange::single(-1));
        s.add_constraint(d(0), CType::longlong(), None);

        let updates = s.solve();
        assert_eq!(updates[&d(0)].constraint, CType::longlong());
    }

    // --- Global Constraint Tests ---

    #[test]
    fn test_global_constraint_widens_existing_node() {
        let mut s = solver();
        let size_t = s.size_ty.clone();
        s.add_node(d(0), CType::int_(), false, false);
        s.add_global_constraint(d(0), size_t.clone());

        let updates = s.solve();
        assert_eq!(updates[&d(0)].constraint, size_t);
        assert!(updates[&d(0)].has_global_constraint);
    }

    #[test]
    fn test_global_constraint_creates_node() {
        let mut s = solver();
        s.add_global_constraint(d(0), CType::long_());
        // Node exists but original == constraint, so no update.
        assert!(s.node(d(0)).is_some());
        assert!(s.solve().is_empty());
    }
}
