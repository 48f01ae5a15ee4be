//! Token budget allocation across failure items.
//!
//! The available window `W - R` is shared in proportion to each item's
//! weight, `max(min(size, kind cap), 1) * kind weight`. Allocations never
//! exceed an item's need (`max(floor, min(size, cap))`), so small items do
//! not soak up tokens they cannot use. Items that end up below the floor are
//! bumped to it while spare capacity remains, otherwise excluded.
//!
//! Ties are broken by [`ItemKey`] order (Step < Test < ArtifactBatch, then
//! identifier), so identical inputs always produce identical budgets.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::config::BudgetConfig;
use crate::domain::item::{FailureItem, ItemKey};

/// Budget decision for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Allocation {
    Granted { tokens: u64 },
    ExcludedForBudget,
}

impl Allocation {
    pub fn tokens(&self) -> Option<u64> {
        match self {
            Self::Granted { tokens } => Some(*tokens),
            Self::ExcludedForBudget => None,
        }
    }
}

/// Per-run token allocation plan. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Budget {
    total_window: u64,
    reserved_overhead: u64,
    floor: u64,
    #[serde(serialize_with = "serialize_allocations")]
    allocations: BTreeMap<ItemKey, Allocation>,
}

impl Budget {
    pub fn total_window(&self) -> u64 {
        self.total_window
    }

    pub fn reserved_overhead(&self) -> u64 {
        self.reserved_overhead
    }

    pub fn floor(&self) -> u64 {
        self.floor
    }

    /// Tokens available to item analyses (`W - R`, or zero).
    pub fn available(&self) -> u64 {
        self.total_window.saturating_sub(self.reserved_overhead)
    }

    /// True when `W - R` left nothing to hand out.
    pub fn is_exhausted(&self) -> bool {
        self.available() == 0
    }

    pub fn allocation(&self, key: &ItemKey) -> Option<Allocation> {
        self.allocations.get(key).copied()
    }

    pub fn granted(&self, key: &ItemKey) -> Option<u64> {
        self.allocation(key).and_then(|a| a.tokens())
    }

    /// Sum of all granted tokens.
    pub fn total_granted(&self) -> u64 {
        self.allocations.values().filter_map(Allocation::tokens).sum()
    }

    /// Allocations in canonical item order.
    pub fn iter(&self) -> impl Iterator<Item = (&ItemKey, &Allocation)> {
        self.allocations.iter()
    }

    pub fn excluded(&self) -> impl Iterator<Item = &ItemKey> {
        self.allocations
            .iter()
            .filter(|(_, a)| matches!(a, Allocation::ExcludedForBudget))
            .map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}

fn serialize_allocations<S>(
    allocations: &BTreeMap<ItemKey, Allocation>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    #[derive(Serialize)]
    struct Entry<'a> {
        item: String,
        #[serde(flatten)]
        allocation: &'a Allocation,
    }

    let mut seq = serializer.serialize_seq(Some(allocations.len()))?;
    for (key, allocation) in allocations {
        seq.serialize_element(&Entry {
            item: key.to_string(),
            allocation,
        })?;
    }
    seq.end()
}

struct Candidate {
    key: ItemKey,
    weight: u64,
    need: u64,
    granted: u64,
}

/// Compute the budget for `items`.
///
/// Never fails: when `W - R` is not positive every item is excluded.
pub fn allocate(items: &[FailureItem<'_>], config: &BudgetConfig) -> Budget {
    let floor = config.min_item_tokens;
    let available = config
        .context_window
        .saturating_sub(config.reserved_overhead());

    let mut candidates: Vec<Candidate> = items
        .iter()
        .map(|item| {
            let kind = item.kind();
            let capped = item.size_tokens().min(config.caps.get(kind));
            Candidate {
                key: item.key(),
                weight: capped.max(1).saturating_mul(config.weights.get(kind)),
                need: capped.max(floor),
                granted: 0,
            }
        })
        .collect();
    candidates.sort_by(|a, b| a.key.cmp(&b.key));
    debug_assert!(
        candidates.windows(2).all(|w| w[0].key != w[1].key),
        "item keys must be unique"
    );

    let total_weight: u128 = candidates.iter().map(|c| c.weight as u128).sum();

    if available > 0 && total_weight > 0 {
        let mut handed_out = 0u64;
        for c in candidates.iter_mut() {
            let share = (available as u128 * c.weight as u128 / total_weight) as u64;
            handed_out += share;
            c.granted = share.min(c.need);
        }

        // Rounding remainder goes to the heaviest item, first key on ties.
        let remainder = available - handed_out;
        if let Some(heaviest) = candidates
            .iter_mut()
            .max_by_key(|c| (c.weight, Reverse(c.key.clone())))
        {
            let headroom = heaviest.need - heaviest.granted;
            heaviest.granted += remainder.min(headroom);
        }

        let mut spare = available
            - candidates
                .iter()
                .filter(|c| c.granted >= floor)
                .map(|c| c.granted)
                .sum::<u64>();

        let mut below: Vec<&mut Candidate> = candidates
            .iter_mut()
            .filter(|c| c.granted < floor)
            .collect();
        below.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.key.cmp(&b.key)));
        for c in below {
            if spare >= floor {
                c.granted = floor;
                spare -= floor;
            } else {
                c.granted = 0;
            }
        }
    }

    let allocations = candidates
        .into_iter()
        .map(|c| {
            let allocation = if available > 0 && c.granted >= floor {
                Allocation::Granted { tokens: c.granted }
            } else {
                debug!(item = %c.key, weight = c.weight, "item excluded for budget");
                Allocation::ExcludedForBudget
            };
            (c.key, allocation)
        })
        .collect();

    Budget {
        total_window: config.context_window,
        reserved_overhead: config.reserved_overhead(),
        floor,
        allocations,
    }
}
