//! Cached static properties of expressions.
use super::types::ItemType;
use bitflags::bitflags;

bitflags! {
    /// Allowed occurrence counts of a sequence: zero, one, or more than one.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Cardinality: u8 {
        const ALLOWS_ZERO = 1;
        const ALLOWS_ONE = 1 << 1;
        const ALLOWS_MANY = 1 << 2;

        const EMPTY = Self::ALLOWS_ZERO.bits();
        const EXACTLY_ONE = Self::ALLOWS_ONE.bits();
        const ZERO_OR_ONE = Self::ALLOWS_ZERO.bits() | Self::ALLOWS_ONE.bits();
        const ONE_OR_MORE = Self::ALLOWS_ONE.bits() | Self::ALLOWS_MANY.bits();
        const ZERO_OR_MORE = Self::ALLOWS_ZERO.bits() | Self::ALLOWS_ONE.bits() | Self::ALLOWS_MANY.bits();
    }
}

impl Cardinality {
    pub fn allows_zero(self) -> bool {
        self.contains(Self::ALLOWS_ZERO)
    }

    pub fn allows_many(self) -> bool {
        self.contains(Self::ALLOWS_MANY)
    }

    /// Proven to produce no items.
    pub fn is_empty_only(self) -> bool {
        self == Self::EMPTY
    }

    pub fn at_most_one(self) -> bool {
        !self.allows_many()
    }

    /// Whether a sequence of `count` items satisfies this cardinality.
    pub fn admits(self, count: usize) -> bool {
        match count {
            0 => self.contains(Self::ALLOWS_ZERO),
            1 => self.contains(Self::ALLOWS_ONE),
            _ => self.contains(Self::ALLOWS_MANY),
        }
    }

    // min/max as 0, 1 or 2 (= many)
    fn bounds(self) -> (u8, u8) {
        let min = if self.allows_zero() {
            0
        } else if self.contains(Self::ALLOWS_ONE) {
            1
        } else {
            2
        };
        let max = if self.allows_many() {
            2
        } else if self.contains(Self::ALLOWS_ONE) {
            1
        } else {
            0
        };
        (min, max)
    }

    fn from_bounds(min: u8, max: u8) -> Self {
        let mut c = Cardinality::empty();
        for n in min.min(2)..=max.min(2) {
            c |= match n {
                0 => Self::ALLOWS_ZERO,
                1 => Self::ALLOWS_ONE,
                _ => Self::ALLOWS_MANY,
            };
        }
        if c.is_empty() { Self::EMPTY } else { c }
    }

    /// Cardinality of the concatenation of two sequences.
    pub fn sum(self, other: Self) -> Self {
        let (a0, a1) = self.bounds();
        let (b0, b1) = other.bounds();
        Self::from_bounds(a0.saturating_add(b0), a1.saturating_add(b1))
    }

    /// Cardinality of a mapping that yields `per_item` items for each of `self`'s items.
    pub fn multiply(self, per_item: Self) -> Self {
        let (a0, a1) = self.bounds();
        let (b0, b1) = per_item.bounds();
        Self::from_bounds(a0.saturating_mul(b0), a1.saturating_mul(b1))
    }

    /// Cardinality of either-or (conditional branches).
    pub fn either(self, other: Self) -> Self {
        let (a0, a1) = self.bounds();
        let (b0, b1) = other.bounds();
        Self::from_bounds(a0.min(b0), a1.max(b1))
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SpecialProperties: u8 {
        /// Nodes come out in document order without duplicates.
        const ORDERED_NODESET = 1;
        /// No node in the result is an ancestor of another.
        const PEER_NODESET = 1 << 1;
        /// Evaluation creates no new nodes and has no side effects.
        const NON_CREATIVE = 1 << 2;
    }
}

bitflags! {
    /// Parts of the dynamic context an expression reads.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Dependencies: u8 {
        const CONTEXT_ITEM = 1;
        const POSITION = 1 << 1;
        const LAST = 1 << 2;
        const LOCAL_VARIABLES = 1 << 3;
        const GLOBAL_VARIABLES = 1 << 4;
        /// Reads the rule tables or the current rule.
        const RULES = 1 << 5;

        const FOCUS = Self::CONTEXT_ITEM.bits() | Self::POSITION.bits() | Self::LAST.bits();
    }
}

bitflags! {
    /// Evaluation strategies an expression implements natively. Missing ones
    /// are derived from the others.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EvaluationMethods: u8 {
        const ITERATE = 1;
        const EVALUATE_ITEM = 1 << 1;
        const PROCESS = 1 << 2;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaticProperties {
    pub cardinality: Cardinality,
    pub item_type: ItemType,
    pub special: SpecialProperties,
    pub dependencies: Dependencies,
    pub methods: EvaluationMethods,
}

impl Default for StaticProperties {
    fn default() -> Self {
        Self {
            cardinality: Cardinality::EMPTY,
            item_type: ItemType::AnyItem,
            special: SpecialProperties::NON_CREATIVE,
            dependencies: Dependencies::empty(),
            methods: EvaluationMethods::ITERATE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Cardinality as C;

    #[test]
    fn cardinality_arithmetic() {
        assert_eq!(C::EMPTY.sum(C::EXACTLY_ONE), C::EXACTLY_ONE);
        assert_eq!(C::ZERO_OR_ONE.sum(C::ZERO_OR_ONE), C::ZERO_OR_MORE);
        assert_eq!(C::EXACTLY_ONE.sum(C::EXACTLY_ONE), C::ALLOWS_MANY);
        assert_eq!(C::ONE_OR_MORE.multiply(C::EMPTY), C::EMPTY);
        assert_eq!(C::EXACTLY_ONE.multiply(C::ZERO_OR_ONE), C::ZERO_OR_ONE);
        assert_eq!(C::EMPTY.either(C::EXACTLY_ONE), C::ZERO_OR_ONE);
    }
}
