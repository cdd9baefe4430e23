#![allow(missing_docs)]

use std::collections::BTreeSet;

use pdom::pdom::linkage::Linkage;
use pdom::pdom::symbol::{Symbol, SymbolKind};
use pdom::query::find_binding::find_binding;
use pdom::query::BindingCollector;
use pdom::storage::strings::compare_compatible_with_ignore_case;
use pdom::types::{LinkageId, RecPtr, Result};
use pdom::{Pdom, PdomOptions};
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Clone)]
enum Op {
    Add(String),
    Delete(String),
}

fn arb_name() -> impl Strategy<Value = String> {
    "[a-cA-C_][a-cA-C0-9_]{0,4}"
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => arb_name().prop_map(Op::Add),
        1 => arb_name().prop_map(Op::Delete),
    ]
}

struct Harness {
    pdom: Pdom,
    linkage: Linkage,
    model: BTreeSet<String>,
}

impl Harness {
    fn new(options: PdomOptions) -> Result<Self> {
        let pdom = Pdom::in_memory(options)?;
        let linkage = pdom.create_linkage(LinkageId::C)?;
        Ok(Self {
            pdom,
            linkage,
            model: BTreeSet::new(),
        })
    }

    fn apply(&mut self, op: &Op) -> Result<()> {
        match op {
            Op::Add(name) => {
                let symbol = Symbol::new(SymbolKind::Variable, name.as_str());
                self.linkage.add_binding(&self.pdom, &symbol)?;
                self.model.insert(name.clone());
            }
            Op::Delete(name) => {
                let found = find_binding(&self.pdom, &self.linkage, name, &[], RecPtr::NULL)?;
                assert_eq!(found.is_some(), self.model.contains(name), "lookup of {name}");
                if let Some(binding) = found {
                    self.linkage.delete_binding(&self.pdom, &binding)?;
                    self.model.remove(name);
                }
            }
        }
        Ok(())
    }

    fn index_names(&self) -> Result<Vec<String>> {
        let db = self.pdom.db();
        self.linkage
            .index(&self.pdom)
            .records(db)?
            .into_iter()
            .map(|record| {
                let binding = self.pdom.binding(record)?.expect("index holds bindings");
                binding.name(db)
            })
            .collect()
    }

    fn expected_order(&self) -> Vec<String> {
        let mut names: Vec<String> = self.model.iter().cloned().collect();
        names.sort_by(|a, b| compare_compatible_with_ignore_case(a.as_bytes(), b.as_bytes()));
        names
    }

    fn search(&self, collector: BindingCollector) -> Result<Vec<String>> {
        let mut collector = collector;
        collector.search(&self.pdom, &self.linkage)?;
        let db = self.pdom.db();
        collector
            .bindings(db)?
            .iter()
            .map(|binding| binding.name(db))
            .collect()
    }

    fn check(&self) -> Result<()> {
        assert_eq!(self.index_names()?, self.expected_order());
        let report = self.pdom.verify()?;
        assert!(report.is_ok(), "{:?}", report.violations);
        Ok(())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn index_matches_a_sorted_model(ops in prop::collection::vec(arb_op(), 1..120)) {
        let mut harness = Harness::new(PdomOptions::default()).unwrap();
        for op in &ops {
            harness.apply(op).unwrap();
        }
        harness.check().unwrap();
    }

    #[test]
    fn prefix_search_matches_the_model(
        ops in prop::collection::vec(arb_op(), 1..80),
        prefix in "[a-cA-C_]{1,2}",
        case_sensitive in any::<bool>(),
    ) {
        let mut harness = Harness::new(PdomOptions::default()).unwrap();
        for op in &ops {
            harness.apply(op).unwrap();
        }
        let found = harness
            .search(BindingCollector::prefix(&prefix).case_sensitive(case_sensitive))
            .unwrap();
        let expected: Vec<String> = harness
            .expected_order()
            .into_iter()
            .filter(|name| {
                if case_sensitive {
                    name.starts_with(prefix.as_str())
                } else {
                    name.to_ascii_lowercase().starts_with(&prefix.to_ascii_lowercase())
                }
            })
            .collect();
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn exact_search_ignoring_case_finds_every_spelling(
        names in prop::collection::vec(arb_name(), 1..60),
        probe in arb_name(),
    ) {
        let mut harness = Harness::new(PdomOptions::default()).unwrap();
        for name in &names {
            harness.apply(&Op::Add(name.clone())).unwrap();
        }
        let found = harness
            .search(BindingCollector::exact(&probe).case_sensitive(false))
            .unwrap();
        let expected: Vec<String> = harness
            .expected_order()
            .into_iter()
            .filter(|name| name.eq_ignore_ascii_case(&probe))
            .collect();
        prop_assert_eq!(found, expected);

        let exact = harness.search(BindingCollector::exact(&probe)).unwrap();
        let present = harness.model.contains(&probe);
        prop_assert_eq!(exact, if present { vec![probe.clone()] } else { Vec::new() });
    }
}

#[test]
fn seeded_churn_keeps_the_index_consistent() -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
    let mut harness = Harness::new(PdomOptions::default().binding_cache_capacity(8))?;
    for round in 0..4_000 {
        let name = format!("sym_{}", rng.gen_range(0..600));
        let op = if rng.gen_bool(0.65) {
            Op::Add(name)
        } else {
            Op::Delete(name)
        };
        harness.apply(&op)?;
        if round % 1_000 == 999 {
            harness.check()?;
        }
    }
    let cached = harness
        .linkage
        .get_bindings_via_cache(&harness.pdom, b"sym_1", true)?;
    assert_eq!(cached.len(), usize::from(harness.model.contains("sym_1")));
    harness.check()
}
