//! Property-based test generators using proptest.

use crate::records::{Counter, Person, Ticket};
use proptest::prelude::*;

/// Strategy for generating names usable as keys.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,12}").expect("Invalid regex")
}

/// Strategy for generating people.
pub fn person_strategy() -> impl Strategy<Value = Person> {
    (
        name_strategy(),
        any::<u16>(),
        prop::collection::vec("[a-z]{1,8}", 0..4),
    )
        .prop_map(|(name, born, tags)| Person {
            name: Some(name),
            born,
            tags,
        })
}

/// Strategy for generating counters with distinct ids.
pub fn counters_strategy(max: usize) -> impl Strategy<Value = Vec<Counter>> {
    prop::collection::btree_map(any::<u32>(), any::<u64>(), 0..max).prop_map(|entries| {
        entries
            .into_iter()
            .map(|(id, hits)| Counter::new(id, hits))
            .collect()
    })
}

/// Strategy for generating unnumbered tickets.
pub fn tickets_strategy(max: usize) -> impl Strategy<Value = Vec<Ticket>> {
    prop::collection::vec("[ -~]{0,40}", 1..max)
        .prop_map(|subjects| subjects.iter().map(|s| Ticket::new(s)).collect())
}
