//! Property-based tests for input selection and receipt parsing.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::error::PlanError;
    use crate::ledger::{CompressedAccount, TreeContext};
    use crate::planner::{select_inputs, total_lamports};
    use crate::receipt::Receipt;

    fn accounts(amounts: &[u64]) -> Vec<CompressedAccount> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, &lamports)| CompressedAccount {
                owner: "o".into(),
                lamports,
                hash: format!("h{i}"),
                tree_context: TreeContext { tree: "t".into(), queue: None, leaf_index: i as u64 },
            })
            .collect()
    }

    proptest! {
        /// Selection covers the target, and dropping its last account would not.
        #[test]
        fn test_selection_is_first_fit_prefix(
            amounts in prop::collection::vec(0u64..1_000_000, 0..20),
            target in 1u64..5_000_000,
        ) {
            let available = accounts(&amounts);
            match select_inputs(&available, target) {
                Ok(sel) => {
                    prop_assert!(sel.total >= target);
                    prop_assert!(sel.selected.iter().all(|a| a.lamports > 0));
                    let last = sel.selected.last().map(|a| a.lamports).unwrap_or(0);
                    prop_assert!(sel.total - last < target);
                    let nonzero: Vec<_> = available.iter().filter(|a| a.lamports > 0).collect();
                    for (picked, expected) in sel.selected.iter().zip(nonzero) {
                        prop_assert_eq!(&picked.hash, &expected.hash);
                    }
                }
                Err(PlanError::InsufficientBalance { available: have, required }) => {
                    prop_assert_eq!(required, target);
                    prop_assert_eq!(have, total_lamports(&available));
                    prop_assert!(have < target);
                }
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
        }

        /// Arbitrary pasted text never panics the receipt parser.
        #[test]
        fn test_parse_input_total(input in "\\PC{0,300}") {
            let _ = Receipt::parse_input(&input);
        }
    }
}
