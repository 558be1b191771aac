use std::collections::HashMap;

use num_bigint::BigUint;

use crate::bdd::Bdd;
use crate::reference::Ref;

impl Bdd {
    /// Number of satisfying assignments of `node` over the variables `1..=num_vars`.
    pub fn sat_count(&self, node: Ref, num_vars: usize) -> BigUint {
        let mut cache = HashMap::new();
        let max = BigUint::from(1u32) << num_vars;
        self._sat_count(node, &max, &mut cache)
    }

    fn _sat_count(&self, node: Ref, max: &BigUint, cache: &mut HashMap<Ref, BigUint>) -> BigUint {
        if self.is_zero(node) {
            return BigUint::ZERO;
        } else if self.is_one(node) {
            return max.clone();
        }

        if let Some(count) = cache.get(&node) {
            return count.clone();
        }

        // Count the regular node, then complement if needed.
        let regular = if node.is_negated() { -node } else { node };
        let count_low = self._sat_count(self.low_node(regular), max, cache);
        let count_high = self._sat_count(self.high_node(regular), max, cache);

        let count: BigUint = (count_low + count_high) >> 1;
        let count = if node.is_negated() { max - count } else { count };

        cache.insert(node, count.clone());
        count
    }

    /// All assignments to `vars` (sorted ascending) that satisfy `node`.
    ///
    /// `node` must not depend on variables outside `vars`. Assignments are
    /// produced in lexicographic order with `false < true`.
    pub fn valuations(&self, node: Ref, vars: &[u32]) -> Vec<Vec<bool>> {
        debug_assert!(vars.windows(2).all(|w| w[0] < w[1]), "vars must be sorted");
        let mut out = Vec::new();
        let mut current = Vec::with_capacity(vars.len());
        self.valuations_rec(node, vars, &mut current, &mut out);
        out
    }

    fn valuations_rec(&self, node: Ref, vars: &[u32], current: &mut Vec<bool>, out: &mut Vec<Vec<bool>>) {
        if self.is_zero(node) {
            return;
        }
        let i = current.len();
        if i == vars.len() {
            debug_assert!(self.is_one(node), "node depends on variables outside the given list");
            out.push(current.clone());
            return;
        }
        let v = vars[i];
        debug_assert!(self.is_terminal(node) || self.variable(node) >= v);
        let (low, high) = self.top_cofactors(node, v);
        current.push(false);
        self.valuations_rec(low, vars, current, out);
        current.pop();
        current.push(true);
        self.valuations_rec(high, vars, current, out);
        current.pop();
    }

    /// Evaluate `node` under a full assignment given as `(variable, value)` pairs.
    pub fn eval(&self, node: Ref, assignment: &HashMap<u32, bool>) -> bool {
        let mut current = node;
        while !self.is_terminal(current) {
            let v = self.variable(current);
            current = if assignment.get(&v).copied().unwrap_or(false) {
                self.high_node(current)
            } else {
                self.low_node(current)
            };
        }
        self.is_one(current)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_sat_count() {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1);
        let x2 = bdd.mk_var(2);
        let x3 = bdd.mk_var(3);

        assert_eq!(bdd.sat_count(bdd.zero, 3), BigUint::ZERO);
        assert_eq!(bdd.sat_count(bdd.one, 3), BigUint::from(8u32));
        assert_eq!(bdd.sat_count(x1, 3), BigUint::from(4u32));

        let f = bdd.apply_or(bdd.apply_and(x1, x2), x3);
        assert_eq!(bdd.sat_count(f, 3), BigUint::from(5u32));
        assert_eq!(bdd.sat_count(-f, 3), BigUint::from(3u32));
    }

    #[test]
    fn test_valuations() {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1);
        let x3 = bdd.mk_var(3);
        let f = bdd.apply_xor(x1, x3);

        let vals = bdd.valuations(f, &[1, 3]);
        assert_eq!(vals, vec![vec![false, true], vec![true, false]]);

        // Variables absent from `node` are enumerated both ways.
        let vals = bdd.valuations(x3, &[1, 3]);
        assert_eq!(vals.len(), 2);
        assert!(vals.iter().all(|v| v[1]));
        assert!(bdd.valuations(bdd.zero, &[1]).is_empty());
    }

    #[test]
    fn test_eval() {
        let bdd = Bdd::default();

        let f = bdd.apply_imply(bdd.mk_var(1), bdd.mk_var(2));
        assert!(bdd.eval(f, &HashMap::from([(1, false), (2, false)])));
        assert!(!bdd.eval(f, &HashMap::from([(1, true), (2, false)])));
        assert!(bdd.eval(f, &HashMap::from([(1, true), (2, true)])));
    }
}
