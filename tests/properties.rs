//! Property-based tests for invariants that should hold across arbitrary
//! inputs rather than just the handful of examples covered by `scenarios.rs`.

mod common;

use std::collections::HashSet;

use proptest::prelude::*;
use schemalign::cli::resolve_table_patterns;
use schemalign::diff::{diff_schema, DiffOptions, Safety};
use schemalign::fixer;
use schemalign::schema::builder::{not_null_field, primary_key, StructureBuilder, TableBuilder};
use schemalign::schema::FieldType;

use common::test_dispatcher;

fn table_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,8}"
}

proptest! {
    /// A literal pattern (no `*`) always resolves to exactly itself,
    /// regardless of what else is in the candidate set.
    #[test]
    fn literal_pattern_resolves_to_itself(
        name in table_name_strategy(),
        extras in proptest::collection::hash_set(table_name_strategy(), 0..5),
    ) {
        prop_assume!(!name.contains('*'));
        let mut candidates = extras;
        candidates.insert(name.clone());
        let resolved = resolve_table_patterns(&[name.clone()], &candidates);
        prop_assert_eq!(resolved, [name].into_iter().collect::<HashSet<_>>());
    }

    /// A trailing-star glob resolves to exactly the candidates sharing its
    /// literal prefix, never more and never fewer.
    #[test]
    fn prefix_glob_matches_exactly_the_shared_prefix(
        prefix in "[a-z][a-z0-9_]{0,5}",
        matching_suffixes in proptest::collection::vec("[a-z0-9_]{0,4}", 0..4),
        other in proptest::collection::hash_set(table_name_strategy(), 0..4),
    ) {
        let pattern = format!("{prefix}*");
        let mut candidates: HashSet<String> = other.into_iter().filter(|c| !c.starts_with(&prefix)).collect();
        let mut expected = HashSet::new();
        for suffix in matching_suffixes {
            let name = format!("{prefix}{suffix}");
            candidates.insert(name.clone());
            expected.insert(name);
        }
        let resolved = resolve_table_patterns(&[pattern], &candidates);
        prop_assert_eq!(resolved, expected);
    }

    /// The safety total order (`Safe < DbIndex < Risky < Unsafe < Unfixable`)
    /// is consistent with the declaration order regardless of which pair is
    /// picked.
    #[test]
    fn safety_order_matches_declaration_order(a in 0usize..5, b in 0usize..5) {
        const LEVELS: [Safety; 5] = [
            Safety::Safe,
            Safety::DbIndex,
            Safety::Risky,
            Safety::Unsafe,
            Safety::Unfixable,
        ];
        prop_assert_eq!(LEVELS[a].cmp(&LEVELS[b]), a.cmp(&b));
    }

    /// Fixing a freshly diffed schema twice in a row at the same levels
    /// applies changes only the first time: the second run is always a
    /// no-op, for any subset of fields declared NOT NULL on a fresh table.
    #[test]
    fn fixer_is_idempotent_over_arbitrary_notnull_subsets(
        notnull_flags in proptest::collection::vec(any::<bool>(), 1..5),
    ) {
        let dispatcher = test_dispatcher();
        let mut builder = TableBuilder::new("widgets");
        for (i, notnull) in notnull_flags.iter().enumerate() {
            let name = format!("col_{i}");
            builder = builder.field(if *notnull {
                not_null_field(name, FieldType::Integer, 11)
            } else {
                schemalign::schema::builder::field(name, FieldType::Integer, 11)
            });
        }
        let structure = StructureBuilder::new("1")
            .table(builder.key(primary_key(vec!["col_0".to_string()])).build())
            .build();

        let levels: HashSet<Safety> = [Safety::Safe, Safety::DbIndex, Safety::Unsafe].into_iter().collect();

        let mut errors = diff_schema(&structure, &dispatcher, &DiffOptions::default()).unwrap();
        fixer::fix(&mut errors, &structure, &dispatcher, &levels).unwrap();

        let mut errors_again = diff_schema(&structure, &dispatcher, &DiffOptions::default()).unwrap();
        let second_run = fixer::fix(&mut errors_again, &structure, &dispatcher, &levels).unwrap();
        prop_assert_eq!(second_run, 0);
    }
}
