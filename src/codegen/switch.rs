//! Switch dispatch selection
//!
//! Picks between `tableswitch` (dense, indexed by `value - lo`) and
//! `lookupswitch` (sorted key search) with the classic cost model:
//! table space `4 + (hi - lo + 1)` and time 3, lookup space `3 + 2n` and
//! time `n`, time weighted three times over space.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchStrategy {
    Table,
    Lookup,
}

/// Costs computed for one set of case values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchCosts {
    pub lo: i32,
    pub hi: i32,
    pub table_space: i64,
    pub table_time: i64,
    pub lookup_space: i64,
    pub lookup_time: i64,
}

impl SwitchCosts {
    /// `None` for a switch without case labels
    pub fn of(values: &[i32]) -> Option<Self> {
        let lo = *values.iter().min()?;
        let hi = *values.iter().max()?;
        let n = values.len() as i64;
        Some(Self {
            lo,
            hi,
            table_space: 4 + (hi as i64 - lo as i64 + 1),
            table_time: 3,
            lookup_space: 3 + 2 * n,
            lookup_time: n,
        })
    }

    pub fn strategy(&self) -> SwitchStrategy {
        if self.table_space + 3 * self.table_time <= self.lookup_space + 3 * self.lookup_time {
            SwitchStrategy::Table
        } else {
            SwitchStrategy::Lookup
        }
    }
}

/// Choose the dispatch instruction for `values`; an empty switch uses a lookup
pub fn select_strategy(values: &[i32]) -> SwitchStrategy {
    let strategy = SwitchCosts::of(values).map_or(SwitchStrategy::Lookup, |costs| costs.strategy());
    log::debug!("switch over {} case(s): {:?}", values.len(), strategy);
    strategy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_cases_use_lookup() {
        let costs = SwitchCosts::of(&[1, 5]).expect("costs");
        assert_eq!((costs.table_space, costs.lookup_space, costs.lookup_time), (9, 7, 2));
        assert_eq!(select_strategy(&[1, 5]), SwitchStrategy::Lookup);
    }

    #[test]
    fn test_contiguous_cases_use_table() {
        assert_eq!(select_strategy(&[1, 2, 3, 4, 5]), SwitchStrategy::Table);
        assert_eq!(select_strategy(&[3, 1, 2]), SwitchStrategy::Table);
    }

    #[test]
    fn test_extreme_range_does_not_overflow() {
        assert_eq!(select_strategy(&[i32::MIN, i32::MAX]), SwitchStrategy::Lookup);
    }

    #[test]
    fn test_empty_switch() {
        assert_eq!(select_strategy(&[]), SwitchStrategy::Lookup);
    }
}
