//! The BDD manager.
//!
//! All symbolic sets and relations of the abstraction layer live in a single
//! [`Bdd`] manager. Nodes are hash-consed in a unique [`Table`] and edges may
//! be complemented (the sign of a [`Ref`]), so that for a fixed variable order
//! every boolean function has exactly one handle. The abstraction caches rely
//! on this: two computations of "the same" set yield equal handles.
//!
//! Variables are 1-indexed and ordered by index (variable 1 is the topmost).
//! Nodes are never freed, which makes every [`Ref`] an immutable value that
//! can be kept across refinement rounds without copying.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Debug;

use log::debug;

use crate::cache::Cache;
use crate::reference::Ref;
use crate::table::Table;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
struct Node {
    variable: u32,
    low: Ref,
    high: Ref,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            variable: 0,
            low: Ref::positive(0),
            high: Ref::positive(0),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
enum OpKey {
    Ite(Ref, Ref, Ref),
    Exists(Ref, Ref),
}

pub struct Bdd {
    nodes: RefCell<Table<Node>>,
    cache: RefCell<Cache<OpKey, Ref>>,
    pub zero: Ref,
    pub one: Ref,
}

impl Bdd {
    pub fn new(storage_bits: usize) -> Self {
        assert!(storage_bits <= 31, "Storage bits should be in the range 0..=31");

        let mut nodes = Table::new(storage_bits);

        // Allocate the terminal node:
        let one = nodes.add(Node::default());
        assert_eq!(one, 1); // Make sure the terminal node is (1).
        let one = Ref::positive(one);
        let zero = -one;

        Self {
            nodes: RefCell::new(nodes),
            cache: RefCell::new(Cache::new(storage_bits.min(16))),
            zero,
            one,
        }
    }
}

impl Default for Bdd {
    fn default() -> Self {
        Bdd::new(20)
    }
}

impl Debug for Bdd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.cache.borrow();
        f.debug_struct("Bdd")
            .field("nodes", &self.num_nodes())
            .field("cache_capacity", &cache.capacity())
            .field("cache_hits", &cache.hits())
            .field("cache_misses", &cache.misses())
            .finish()
    }
}

impl Bdd {
    fn node(&self, index: u32) -> Node {
        *self.nodes.borrow().value(index)
    }

    /// Number of allocated nodes, including the terminal.
    pub fn num_nodes(&self) -> usize {
        self.nodes.borrow().size() - 1
    }

    pub fn cache_hits(&self) -> usize {
        self.cache.borrow().hits()
    }

    /// Decision variable of the node behind `f`, or 0 for terminals.
    pub fn variable(&self, f: Ref) -> u32 {
        self.node(f.index()).variable
    }

    pub fn low_node(&self, f: Ref) -> Ref {
        let low = self.node(f.index()).low;
        if f.is_negated() {
            -low
        } else {
            low
        }
    }

    pub fn high_node(&self, f: Ref) -> Ref {
        let high = self.node(f.index()).high;
        if f.is_negated() {
            -high
        } else {
            high
        }
    }

    pub fn is_zero(&self, f: Ref) -> bool {
        f == self.zero
    }
    pub fn is_one(&self, f: Ref) -> bool {
        f == self.one
    }
    pub fn is_terminal(&self, f: Ref) -> bool {
        f.index() == self.one.index()
    }

    pub fn mk_node(&self, v: u32, low: Ref, high: Ref) -> Ref {
        assert_ne!(v, 0, "Variable index should not be zero");

        // Handle canonicity: the high edge is never complemented.
        if high.is_negated() {
            return -self.mk_node(v, -low, -high);
        }

        // Handle duplicates
        if low == high {
            return low;
        }

        let i = self.nodes.borrow_mut().put(Node { variable: v, low, high });
        Ref::positive(i)
    }

    pub fn mk_var(&self, v: u32) -> Ref {
        self.mk_node(v, self.zero, self.one)
    }

    /// The literal `v` (if `value`) or `¬v`.
    pub fn mk_literal(&self, v: u32, value: bool) -> Ref {
        let x = self.mk_var(v);
        if value {
            x
        } else {
            -x
        }
    }

    /// Conjunction of the given literals.
    pub fn cube(&self, literals: impl IntoIterator<Item = (u32, bool)>) -> Ref {
        let mut literals = literals.into_iter().collect::<Vec<_>>();
        literals.sort_by_key(|&(v, _)| std::cmp::Reverse(v));
        let mut current = self.one;
        for (v, value) in literals {
            current = if value {
                self.mk_node(v, self.zero, current)
            } else {
                self.mk_node(v, current, self.zero)
            };
        }
        current
    }

    /// Positive cube over the given variables, used to name quantified sets.
    pub fn vars_cube(&self, vars: &[u32]) -> Ref {
        self.cube(vars.iter().map(|&v| (v, true)))
    }

    pub fn top_cofactors(&self, f: Ref, v: u32) -> (Ref, Ref) {
        assert_ne!(v, 0, "Variable index should not be zero");
        if self.is_terminal(f) || self.variable(f) != v {
            return (f, f);
        }
        (self.low_node(f), self.high_node(f))
    }

    /// Apply the ITE operation to the arguments.
    ///
    /// ```text
    /// ITE(f, g, h) = (f ∧ g) ∨ (¬f ∧ h)
    /// ```
    pub fn apply_ite(&self, f: Ref, g: Ref, h: Ref) -> Ref {
        // Base cases:
        //   ite(1,G,H) => G
        //   ite(0,G,H) => H
        //   ite(F,G,G) => G
        //   ite(F,1,0) => F
        //   ite(F,0,1) => ~F
        if self.is_one(f) {
            return g;
        }
        if self.is_zero(f) {
            return h;
        }
        if g == h {
            return g;
        }
        if self.is_one(g) && self.is_zero(h) {
            return f;
        }
        if self.is_zero(g) && self.is_one(h) {
            return -f;
        }

        // Standard triples:
        //   ite(F,F,H) => ite(F,1,H)
        //   ite(F,G,F) => ite(F,G,0)
        //   ite(F,~F,H) => ite(F,0,H)
        //   ite(F,G,~F) => ite(F,G,1)
        if g == f {
            return self.apply_ite(f, self.one, h);
        }
        if h == f {
            return self.apply_ite(f, g, self.zero);
        }
        if g == -f {
            return self.apply_ite(f, self.zero, h);
        }
        if h == -f {
            return self.apply_ite(f, g, self.one);
        }

        // ite(~F,G,H) => ite(F,H,G)
        let (f, g, h) = if f.is_negated() { (-f, h, g) } else { (f, g, h) };

        // ite(F,~G,H) => ~ite(F,G,~H)
        let (g, h, n) = if g.is_negated() { (-g, -h, true) } else { (g, h, false) };

        let key = OpKey::Ite(f, g, h);
        let cached = self.cache.borrow_mut().get(&key).copied();
        if let Some(res) = cached {
            return if n { -res } else { res };
        }

        // Determine the top variable:
        let i = self.variable(f);
        let j = self.variable(g);
        let k = self.variable(h);
        let mut m = i;
        if j != 0 {
            m = m.min(j);
        }
        if k != 0 {
            m = m.min(k);
        }

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);

        let e = self.apply_ite(f0, g0, h0);
        let t = self.apply_ite(f1, g1, h1);
        let res = self.mk_node(m, e, t);
        self.cache.borrow_mut().insert(key, res);

        if n {
            -res
        } else {
            res
        }
    }

    pub fn apply_and(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, self.zero)
    }

    pub fn apply_or(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, self.one, v)
    }

    pub fn apply_xor(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, -v, v)
    }

    pub fn apply_imply(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, self.one)
    }

    pub fn apply_and_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Ref {
        let mut res = self.one;
        for node in nodes {
            res = self.apply_and(res, node);
        }
        res
    }

    pub fn apply_or_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Ref {
        let mut res = self.zero;
        for node in nodes {
            res = self.apply_or(res, node);
        }
        res
    }

    pub fn is_implies(&self, f: Ref, g: Ref) -> bool {
        self.is_one(self.apply_imply(f, g))
    }

    /// Existential quantification `∃vars. f`.
    pub fn exists(&self, f: Ref, vars: &[u32]) -> Ref {
        let cube = self.vars_cube(vars);
        self.exists_rec(f, cube)
    }

    fn exists_rec(&self, f: Ref, cube: Ref) -> Ref {
        if self.is_terminal(f) {
            return f;
        }
        let v = self.variable(f);

        // Skip quantified variables above the top variable of `f`.
        let mut cube = cube;
        while !self.is_one(cube) && self.variable(cube) < v {
            cube = self.high_node(cube);
        }
        if self.is_one(cube) {
            return f;
        }

        let key = OpKey::Exists(f, cube);
        let cached = self.cache.borrow_mut().get(&key).copied();
        if let Some(res) = cached {
            return res;
        }

        let (f0, f1) = (self.low_node(f), self.high_node(f));
        let res = if self.variable(cube) == v {
            let rest = self.high_node(cube);
            let low = self.exists_rec(f0, rest);
            if self.is_one(low) {
                self.one
            } else {
                let high = self.exists_rec(f1, rest);
                self.apply_or(low, high)
            }
        } else {
            let low = self.exists_rec(f0, cube);
            let high = self.exists_rec(f1, cube);
            self.mk_node(v, low, high)
        };
        self.cache.borrow_mut().insert(key, res);
        res
    }

    /// Relational product `∃vars. f ∧ g`.
    pub fn and_exists(&self, f: Ref, g: Ref, vars: &[u32]) -> Ref {
        let conj = self.apply_and(f, g);
        self.exists(conj, vars)
    }

    /// Rename variables of `f` according to `map` (unmapped variables are kept).
    pub fn rename(&self, f: Ref, map: &HashMap<u32, u32>) -> Ref {
        let mut cache = HashMap::new();
        self.rename_rec(f, map, &mut cache)
    }

    fn rename_rec(&self, f: Ref, map: &HashMap<u32, u32>, cache: &mut HashMap<Ref, Ref>) -> Ref {
        if self.is_terminal(f) {
            return f;
        }
        if let Some(&res) = cache.get(&f) {
            return res;
        }
        let v = self.variable(f);
        let low = self.rename_rec(self.low_node(f), map, cache);
        let high = self.rename_rec(self.high_node(f), map, cache);
        let target = map.get(&v).copied().unwrap_or(v);
        let res = self.apply_ite(self.mk_var(target), high, low);
        cache.insert(f, res);
        res
    }

    /// Variables that `f` depends on, in ascending order.
    pub fn support(&self, f: Ref) -> Vec<u32> {
        let mut seen = std::collections::HashSet::new();
        let mut vars = std::collections::BTreeSet::new();
        let mut stack = vec![f.index()];
        while let Some(i) = stack.pop() {
            if i == self.one.index() || !seen.insert(i) {
                continue;
            }
            let node = self.node(i);
            vars.insert(node.variable);
            stack.push(node.low.index());
            stack.push(node.high.index());
        }
        debug!("support of {} has {} variables", f, vars.len());
        vars.into_iter().collect()
    }

    pub fn to_bracket_string(&self, f: Ref) -> String {
        if self.is_zero(f) {
            return "(0)".to_string();
        } else if self.is_one(f) {
            return "(1)".to_string();
        }
        format!(
            "{}:(x{}, {}, {})",
            f,
            self.variable(f),
            self.to_bracket_string(self.high_node(f)),
            self.to_bracket_string(self.low_node(f))
        )
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_var() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1);

        assert_eq!(bdd.variable(x), 1);
        assert_eq!(bdd.high_node(x), bdd.one);
        assert_eq!(bdd.low_node(x), bdd.zero);
    }

    #[test]
    fn test_terminal() {
        let bdd = Bdd::default();

        assert!(bdd.is_terminal(bdd.zero));
        assert!(bdd.is_zero(bdd.zero));
        assert!(!bdd.is_one(bdd.zero));
        assert!(bdd.is_terminal(bdd.one));
        assert_eq!(bdd.variable(bdd.one), 0);
    }

    #[test]
    fn test_cube() {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1);
        let x2 = bdd.mk_var(2);
        let x3 = bdd.mk_var(3);

        let f = bdd.apply_and(bdd.apply_and(x1, -x2), x3);
        let cube = bdd.cube([(3, true), (1, true), (2, false)]);
        assert_eq!(f, cube);
    }

    #[test]
    fn test_de_morgan() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);

        assert_eq!(-bdd.apply_and(x, y), bdd.apply_or(-x, -y));
        assert_eq!(-bdd.apply_or(x, y), bdd.apply_and(-x, -y));
    }

    #[test]
    fn test_canonical_sharing() {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);

        // Two different constructions of x ⊕ y.
        let f = bdd.apply_xor(x, y);
        let g = bdd.apply_or(bdd.apply_and(x, -y), bdd.apply_and(-x, y));
        assert_eq!(f, g);
        assert_eq!(bdd.apply_xor(f, f), bdd.zero);
        assert_eq!(bdd.apply_xor(f, -f), bdd.one);
    }

    #[test]
    fn test_apply_ite() {
        let bdd = Bdd::default();

        let f = bdd.mk_var(1);
        let g = bdd.mk_var(2);
        let h = bdd.mk_var(3);

        assert_eq!(bdd.apply_ite(bdd.one, g, h), g);
        assert_eq!(bdd.apply_ite(bdd.zero, g, h), h);
        assert_eq!(bdd.apply_ite(f, g, g), g);

        let ite = bdd.apply_ite(f, g, h);
        let expected = bdd.apply_or(bdd.apply_and(f, g), bdd.apply_and(-f, h));
        assert_eq!(ite, expected);
        assert_eq!(bdd.apply_ite(-f, -g, -h), -bdd.apply_ite(-f, g, h));
    }

    #[test]
    fn test_exists() {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1);
        let x2 = bdd.mk_var(2);
        let x3 = bdd.mk_var(3);

        // ∃x2. (x1 ∧ x2) ∨ (¬x2 ∧ x3) = x1 ∨ x3
        let f = bdd.apply_or(bdd.apply_and(x1, x2), bdd.apply_and(-x2, x3));
        assert_eq!(bdd.exists(f, &[2]), bdd.apply_or(x1, x3));

        // Quantifying variables not in the support is the identity.
        assert_eq!(bdd.exists(x1, &[2, 3]), x1);
        assert_eq!(bdd.exists(f, &[1, 2, 3]), bdd.one);
        assert_eq!(bdd.exists(bdd.zero, &[1]), bdd.zero);
    }

    #[test]
    fn test_and_exists() {
        let bdd = Bdd::default();

        // Identity relation x2 = x1, with x2 the successor copy.
        let x1 = bdd.mk_var(1);
        let x2 = bdd.mk_var(2);
        let relation = -bdd.apply_xor(x1, x2);
        let image = bdd.and_exists(x1, relation, &[1]);
        assert_eq!(image, x2);
    }

    #[test]
    fn test_rename() {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1);
        let x3 = bdd.mk_var(3);
        let f = bdd.apply_and(x1, -x3);

        let map = HashMap::from([(1, 2), (3, 4)]);
        let g = bdd.rename(f, &map);
        assert_eq!(g, bdd.apply_and(bdd.mk_var(2), -bdd.mk_var(4)));
        assert_eq!(bdd.support(g), vec![2, 4]);
    }

    #[test]
    fn test_is_implies() {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1);
        let x2 = bdd.mk_var(2);
        let f = bdd.apply_and(x1, x2);

        assert!(bdd.is_implies(f, x1));
        assert!(bdd.is_implies(f, bdd.apply_or(x1, x2)));
        assert!(!bdd.is_implies(f, -x2));
        assert!(bdd.is_implies(bdd.zero, x1));
    }
}
