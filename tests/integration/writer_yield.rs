#![allow(missing_docs)]

use std::path::Path;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use pdom::pdom::file::{NameOccurrence, SignificantMacros};
use pdom::pdom::location::IndexLocation;
use pdom::pdom::name::NameRole;
use pdom::pdom::symbol::{Symbol, SymbolKind};
use pdom::primitives::concurrency::IndexLock;
use pdom::query::BindingCollector;
use pdom::types::{LinkageId, Result};
use pdom::{Pdom, PdomOptions};

const OCCURRENCES: usize = 200;

#[test]
fn waiting_reader_sees_a_partial_file() -> Result<()> {
    let pdom = Arc::new(Pdom::in_memory(PdomOptions::default().yield_interval(1))?);
    let lock = IndexLock::new();
    let file = pdom.add_file(
        LinkageId::C,
        &IndexLocation::from_path(Path::new("/src/big.c")),
        &SignificantMacros::new(),
    )?;
    let symbols: Vec<Symbol> = (0..OCCURRENCES)
        .map(|i| Symbol::new(SymbolKind::Variable, format!("v{i:03}")))
        .collect();
    let occurrences: Vec<_> = symbols
        .iter()
        .enumerate()
        .map(|(i, symbol)| NameOccurrence::new(symbol, NameRole::Definition, i as u32 * 16, 4))
        .collect();

    let mut writer = lock.acquire_writer();
    let (ready_tx, ready_rx) = mpsc::channel();
    let reader = {
        let pdom = Arc::clone(&pdom);
        let lock = lock.clone();
        thread::spawn(move || -> Result<usize> {
            ready_tx.send(()).expect("main thread listens");
            let _guard = lock.acquire_reader();
            let seen = file.names(pdom.db())?.count();
            let linkage = pdom.linkage(LinkageId::C)?.expect("created by the writer");
            let mut collector = BindingCollector::prefix("v");
            collector.search(&pdom, &linkage)?;
            assert_eq!(collector.records().len(), seen);
            Ok(seen)
        })
    };
    ready_rx.recv().expect("reader starts");
    thread::sleep(Duration::from_millis(50));

    file.add_names(&pdom, &occurrences, &mut writer)?;
    drop(writer);

    let seen = reader.join().expect("reader thread")?;
    assert!(seen > 0, "reader ran before any name was written");
    assert!(seen < OCCURRENCES, "reader only ran after the writer finished");
    assert!(lock.snapshot().writer_yields > 0);
    assert_eq!(file.names(pdom.db())?.count(), OCCURRENCES);
    Ok(())
}
