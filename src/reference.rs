use std::fmt::{Display, Formatter};
use std::ops::Neg;

/// Handle to a BDD node, with the sign bit marking a complemented edge.
///
/// Handles are only meaningful together with the [`Bdd`][crate::bdd::Bdd]
/// manager that produced them. Because the manager hash-conses nodes, two
/// handles are equal if and only if they denote the same boolean function.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Ref(i32);

impl Ref {
    pub(crate) const fn positive(index: u32) -> Self {
        Self(index as i32)
    }

    pub const fn is_negated(self) -> bool {
        self.0 < 0
    }

    pub const fn negate(self) -> Self {
        Self(-self.0)
    }

    /// Index of the underlying node in the manager storage.
    pub const fn index(self) -> u32 {
        self.0.unsigned_abs()
    }

    /// Raw signed representation.
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl Neg for Ref {
    type Output = Self;

    fn neg(self) -> Self::Output {
        self.negate()
    }
}

impl Display for Ref {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", if self.is_negated() { "~" } else { "" }, self.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negation_roundtrip() {
        let r = Ref::positive(7);
        assert!(!r.is_negated());
        assert!((-r).is_negated());
        assert_eq!(-(-r), r);
        assert_eq!((-r).index(), 7);
    }

    #[test]
    fn test_display() {
        let r = Ref::positive(3);
        assert_eq!(r.to_string(), "@3");
        assert_eq!((-r).to_string(), "~@3");
    }
}
