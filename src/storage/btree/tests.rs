use super::*;
use crate::storage::database::Database;
use crate::storage::options::DatabaseOptions;
use crate::types::PdomError;
use proptest::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Orders records holding a single big-endian `i64` key.
struct KeyOrder;

impl RecordComparator for KeyOrder {
    fn compare(&self, db: &Database, a: RecPtr, b: RecPtr) -> Result<Ordering> {
        Ok(db.get_long(a)?.cmp(&db.get_long(b)?))
    }
}

struct Range {
    low: i64,
    high: i64,
    seen: Vec<i64>,
    stop_at: Option<i64>,
}

impl BTreeVisitor for Range {
    fn compare(&mut self, db: &Database, record: RecPtr) -> Result<Ordering> {
        let key = db.get_long(record)?;
        Ok(if key < self.low {
            Ordering::Less
        } else if key > self.high {
            Ordering::Greater
        } else {
            Ordering::Equal
        })
    }

    fn visit(&mut self, db: &Database, record: RecPtr) -> Result<VisitFlow> {
        let key = db.get_long(record)?;
        self.seen.push(key);
        if Some(key) == self.stop_at {
            return Ok(VisitFlow::StopFound);
        }
        Ok(VisitFlow::Continue)
    }
}

fn setup() -> (Database, BTree<KeyOrder>) {
    let db = Database::in_memory(DatabaseOptions::default()).unwrap();
    let tree = BTree::new(Database::root_area(0), KeyOrder);
    (db, tree)
}

fn make(db: &Database, key: i64) -> RecPtr {
    let rec = db.malloc(8).unwrap();
    db.put_long(rec, key).unwrap();
    rec
}

fn keys(db: &Database, tree: &BTree<KeyOrder>) -> Vec<i64> {
    tree.records(db)
        .unwrap()
        .into_iter()
        .map(|rec| db.get_long(rec).unwrap())
        .collect()
}

#[test]
fn empty_tree_visits_nothing() {
    let (db, tree) = setup();
    assert!(tree.is_empty(&db).unwrap());
    let mut all = CollectAll::default();
    assert_eq!(tree.accept(&db, &mut all).unwrap(), AcceptOutcome::Exhausted);
    assert!(all.records.is_empty());
    assert!(!tree.delete(&db, RecPtr(4098)).unwrap());
}

#[test]
fn insert_returns_existing_equal_record() {
    let (db, tree) = setup();
    let first = make(&db, 7);
    assert_eq!(tree.insert(&db, first).unwrap(), first);
    let duplicate = make(&db, 7);
    assert_eq!(tree.insert(&db, duplicate).unwrap(), first);
    assert_eq!(tree.records(&db).unwrap(), vec![first]);
    assert!(!tree.delete(&db, duplicate).unwrap(), "equal but distinct record");
    assert!(tree.delete(&db, first).unwrap());
    assert!(tree.is_empty(&db).unwrap());
}

#[test]
fn many_inserts_split_and_stay_ordered() {
    let (db, tree) = setup();
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let mut values: Vec<i64> = (0..2_000).collect();
    values.shuffle(&mut rng);
    for value in &values {
        tree.insert(&db, make(&db, *value)).unwrap();
    }
    assert_eq!(keys(&db, &tree), (0..2_000).collect::<Vec<_>>());
    let check = tree.check(&db).unwrap();
    assert!(check.violations.is_empty(), "{:?}", check.violations);
    assert_eq!(check.records, 2_000);
    assert!(check.depth >= 3);
}

#[test]
fn deleting_everything_frees_every_node() {
    let (db, _) = setup();
    let stats = Arc::new(BTreeStats::default());
    let tree = BTree::new(Database::root_area(0), KeyOrder).with_stats(stats.clone());
    let records: Vec<RecPtr> = (0..500).map(|k| make(&db, k)).collect();
    let before = db.stats().bytes_in_use;
    for rec in &records {
        tree.insert(&db, *rec).unwrap();
    }
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let mut order = records.clone();
    order.shuffle(&mut rng);
    for rec in &order {
        assert!(tree.delete(&db, *rec).unwrap());
        assert!(tree.check(&db).unwrap().violations.is_empty());
    }
    assert!(tree.is_empty(&db).unwrap());
    assert_eq!(db.stats().bytes_in_use, before);
    let snapshot = stats.snapshot();
    assert_eq!(snapshot.inserts, 500);
    assert_eq!(snapshot.deletes, 500);
    assert!(snapshot.splits > 0 && snapshot.merges > 0);
}

#[test]
fn range_visitor_sees_exactly_the_range_in_order() {
    let (db, tree) = setup();
    for key in (0..300).rev() {
        tree.insert(&db, make(&db, key * 2)).unwrap();
    }
    let mut range = Range {
        low: 101,
        high: 140,
        seen: Vec::new(),
        stop_at: None,
    };
    assert_eq!(tree.accept(&db, &mut range).unwrap(), AcceptOutcome::Exhausted);
    assert_eq!(range.seen, (51..=70).map(|k| k * 2).collect::<Vec<_>>());
}

#[test]
fn visitor_can_stop_early() {
    let (db, tree) = setup();
    for key in 0..100 {
        tree.insert(&db, make(&db, key)).unwrap();
    }
    let mut range = Range {
        low: 10,
        high: 90,
        seen: Vec::new(),
        stop_at: Some(12),
    };
    assert_eq!(tree.accept(&db, &mut range).unwrap(), AcceptOutcome::Found);
    assert_eq!(range.seen, vec![10, 11, 12]);
}

struct CancelAfter(usize);

impl BTreeVisitor for CancelAfter {
    fn compare(&mut self, _db: &Database, _record: RecPtr) -> Result<Ordering> {
        Ok(Ordering::Equal)
    }

    fn visit(&mut self, _db: &Database, _record: RecPtr) -> Result<VisitFlow> {
        if self.0 == 0 {
            return Err(PdomError::Cancelled);
        }
        self.0 -= 1;
        Ok(VisitFlow::Continue)
    }
}

#[test]
fn cancellation_is_reported_not_raised() {
    let (db, tree) = setup();
    for key in 0..50 {
        tree.insert(&db, make(&db, key)).unwrap();
    }
    let outcome = tree.accept(&db, &mut CancelAfter(5)).unwrap();
    assert!(outcome.is_cancelled());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn matches_reference_after_inserts_and_deletes(
        ops in prop::collection::vec((any::<bool>(), 0i64..400), 1..600)
    ) {
        let (db, tree) = setup();
        let mut reference: BTreeMap<i64, RecPtr> = BTreeMap::new();
        for (insert, key) in ops {
            if insert {
                let rec = make(&db, key);
                let kept = tree.insert(&db, rec).unwrap();
                let expected = *reference.entry(key).or_insert(rec);
                prop_assert_eq!(kept, expected);
            } else if let Some(rec) = reference.remove(&key) {
                prop_assert!(tree.delete(&db, rec).unwrap());
            }
        }
        prop_assert_eq!(keys(&db, &tree), reference.keys().copied().collect::<Vec<_>>());
        let check = tree.check(&db).unwrap();
        prop_assert!(check.violations.is_empty(), "{:?}", check.violations);
    }
}
