#![allow(missing_docs)]

use std::path::Path;

use pdom::pdom::file::{File, NameOccurrence, SignificantMacros};
use pdom::pdom::location::IndexLocation;
use pdom::pdom::macros::MacroDefinition;
use pdom::pdom::name::{NameRole, Specifier};
use pdom::pdom::node::{self, BindingKind};
use pdom::pdom::symbol::{Symbol, SymbolKind};
use pdom::primitives::concurrency::NoYield;
use pdom::query::BindingCollector;
use pdom::types::{LinkageId, Result};
use pdom::{Pdom, PdomOptions};

fn fresh() -> Result<Pdom> {
    Pdom::in_memory(PdomOptions::default())
}

fn file(pdom: &Pdom, path: &str) -> Result<File> {
    pdom.add_file(
        LinkageId::CPP,
        &IndexLocation::from_path(Path::new(path)),
        &SignificantMacros::new(),
    )
}

fn symbol_for(kind: BindingKind) -> Symbol {
    match kind {
        BindingKind::Variable => Symbol::new(SymbolKind::Variable, "v"),
        BindingKind::Function => Symbol::new(SymbolKind::Function, "f"),
        BindingKind::Typedef => Symbol::new(SymbolKind::Typedef, "t"),
        BindingKind::Composite => Symbol::new(SymbolKind::Composite, "c"),
        BindingKind::Field => {
            Symbol::new(SymbolKind::Field, "x").in_scope(Symbol::new(SymbolKind::Composite, "c"))
        }
        BindingKind::Enumeration => Symbol::new(SymbolKind::Enumeration, "e"),
        BindingKind::Enumerator => Symbol::new(SymbolKind::Enumerator, "E1")
            .in_scope(Symbol::new(SymbolKind::Enumeration, "e")),
        BindingKind::Namespace => Symbol::new(SymbolKind::Namespace, "ns"),
        BindingKind::Method => {
            Symbol::new(SymbolKind::Method, "m").in_scope(Symbol::new(SymbolKind::Composite, "c"))
        }
    }
}

#[test]
fn every_binding_kind_loads_back_as_created() -> Result<()> {
    let pdom = fresh()?;
    let linkage = pdom.create_linkage(LinkageId::CPP)?;
    for kind in BindingKind::ALL {
        let symbol = symbol_for(kind);
        let created = linkage
            .add_binding(&pdom, &symbol)?
            .expect("kind is stored in C++");
        let loaded = pdom.binding(created.record())?.expect("record is a binding");
        assert_eq!(loaded.kind(), kind);
        assert_eq!(loaded.linkage(), LinkageId::CPP);
        assert_eq!(loaded.name(pdom.db())?, symbol.name);
        assert_eq!(loaded.parent(pdom.db())?, created.parent(pdom.db())?);
        assert_eq!(node::read_tag(pdom.db(), created.record())?.1, kind.node_type());
        assert!(loaded.first_declaration(pdom.db())?.is_none());
        assert!(loaded.is_orphaned(pdom.db())?);
    }
    Ok(())
}

#[test]
fn names_load_back_with_their_flags() -> Result<()> {
    let pdom = fresh()?;
    let source = file(&pdom, "/src/flags.cpp")?;
    let counter = Symbol::new(SymbolKind::Variable, "counter");
    let friend = Symbol::new(SymbolKind::Composite, "peer");
    let names = source.add_names(
        &pdom,
        &[
            NameOccurrence::new(&counter, NameRole::Definition, 4, 7),
            NameOccurrence::new(&counter, NameRole::Reference, 120, 7).with_access(true, true),
            NameOccurrence::new(&friend, NameRole::Declaration, 300, 4)
                .with_specifier(Specifier::Friend),
        ],
        &mut NoYield,
    )?;
    let db = pdom.db();
    let [Some(def), Some(use_), Some(decl)] = names[..] else {
        panic!("every occurrence is stored");
    };
    assert_eq!((def.offset(db)?, def.length(db)?), (4, 7));
    assert_eq!(def.role(db)?, NameRole::Definition);
    assert_eq!(def.file(db)?, source.record());
    let flags = use_.flags(db)?;
    assert_eq!(flags.role(), NameRole::Reference);
    assert!(flags.is_read() && flags.is_write());
    assert_eq!(decl.flags(db)?.specifier(), Specifier::Friend);
    assert_eq!(use_.binding(db)?, def.binding(db)?);
    assert_eq!(source.names(db)?.collect::<Result<Vec<_>>>()?, vec![def, use_, decl]);
    Ok(())
}

#[test]
fn binding_identity_follows_qualified_name_and_locality() -> Result<()> {
    let pdom = fresh()?;
    let linkage = pdom.create_linkage(LinkageId::CPP)?;
    let fragment = pdom.fragment_id()?;
    let local_file = file(&pdom, "/src/local.cpp")?;

    let outer = Symbol::new(SymbolKind::Namespace, "outer");
    let inner = Symbol::new(SymbolKind::Namespace, "inner").in_scope(outer.clone());
    let in_inner = Symbol::new(SymbolKind::Function, "run").in_scope(inner.clone());
    let in_outer = Symbol::new(SymbolKind::Function, "run").in_scope(outer);
    let local = Symbol::new(SymbolKind::Function, "run")
        .in_scope(inner)
        .local_to(fragment, local_file.record());

    let a = linkage.add_binding(&pdom, &in_inner)?;
    let b = linkage.add_binding(&pdom, &in_inner)?;
    assert_eq!(a, b);
    let c = linkage.add_binding(&pdom, &in_outer)?;
    let d = linkage.add_binding(&pdom, &local)?;
    assert_ne!(a, c);
    assert_ne!(a, d);
    assert_ne!(c, d);
    let a = a.expect("stored");
    assert_eq!(a.qualified_name(pdom.db())?, ["outer", "inner", "run"]);
    Ok(())
}

#[test]
fn removing_a_declaration_keeps_the_chain_intact() -> Result<()> {
    const K: u32 = 5;
    let pdom = fresh()?;
    let source = file(&pdom, "/src/decls.h")?;
    let symbol = Symbol::new(SymbolKind::Function, "open");
    let occurrences: Vec<_> = (0..K)
        .map(|i| NameOccurrence::new(&symbol, NameRole::Declaration, i * 10, 4))
        .collect();
    let names: Vec<_> = source
        .add_names(&pdom, &occurrences, &mut NoYield)?
        .into_iter()
        .map(|name| name.expect("stored"))
        .collect();
    let db = pdom.db();
    let binding = pdom
        .binding(names[0].binding(db)?)?
        .expect("names point at their binding");

    let newest_first: Vec<_> = names.iter().rev().copied().collect();
    assert_eq!(binding.declarations(db)?.collect::<Result<Vec<_>>>()?, newest_first);

    let removed = names[2];
    binding.remove_name(db, removed, LinkageId::CPP)?;
    let expected: Vec<_> = newest_first.into_iter().filter(|name| *name != removed).collect();
    let remaining = binding.declarations(db)?.collect::<Result<Vec<_>>>()?;
    assert_eq!(remaining.len(), (K - 1) as usize);
    assert_eq!(remaining, expected);
    assert!(removed.prev_in_binding(db)?.is_null());
    assert!(removed.next_in_binding(db)?.is_null());
    for name in &remaining {
        assert_ne!(name.next_in_binding(db)?, removed.record());
        assert_ne!(name.prev_in_binding(db)?, removed.record());
    }
    Ok(())
}

#[test]
fn prefix_scan_ignores_insertion_order() -> Result<()> {
    let keys = ["foo", "foobar", "foot", "bar"];
    let orders: [[usize; 4]; 4] = [[0, 1, 2, 3], [3, 2, 1, 0], [1, 3, 0, 2], [2, 0, 3, 1]];
    for order in orders {
        let pdom = fresh()?;
        let linkage = pdom.create_linkage(LinkageId::C)?;
        for &i in &order {
            linkage.add_binding(&pdom, &Symbol::new(SymbolKind::Variable, keys[i]))?;
        }
        let mut collector = BindingCollector::prefix("foo");
        collector.search(&pdom, &linkage)?;
        let found: Vec<String> = collector
            .bindings(pdom.db())?
            .iter()
            .map(|binding| binding.name(pdom.db()))
            .collect::<Result<_>>()?;
        assert_eq!(found, ["foo", "foobar", "foot"], "order {order:?}");
    }
    Ok(())
}

#[test]
fn macro_container_lives_while_any_file_uses_it() -> Result<()> {
    let pdom = fresh()?;
    let a = file(&pdom, "/src/a.h")?;
    let b = file(&pdom, "/src/b.h")?;
    a.add_macros(&pdom, &[MacroDefinition::object("LIMIT", "10", 8)])?;
    b.add_macros(&pdom, &[MacroDefinition::undef("LIMIT", 7)])?;
    let linkage = pdom.linkage(LinkageId::CPP)?.expect("created by add_macros");
    let container = linkage
        .macro_container(&pdom, "LIMIT", false)?
        .expect("container exists");
    assert_eq!(container.definitions(pdom.db())?.len(), 2);

    a.clear(&pdom)?;
    let kept = linkage.macro_container(&pdom, "LIMIT", false)?;
    assert_eq!(kept.map(|c| c.record()), Some(container.record()));
    assert_eq!(container.definitions(pdom.db())?.len(), 1);

    b.clear(&pdom)?;
    assert!(linkage.macro_container(&pdom, "LIMIT", false)?.is_none());
    assert!(linkage.macro_index(&pdom).is_empty(pdom.db())?);
    Ok(())
}

#[test]
fn file_variants_are_found_by_signature() -> Result<()> {
    let pdom = fresh()?;
    let header = IndexLocation::from_path(Path::new("/src/config.h"));
    let release = SignificantMacros::new().undefine("NDEBUG_OFF");
    let debug = SignificantMacros::new().define("DEBUG", "1");
    let first = pdom.add_file(LinkageId::C, &header, &release)?;
    let second = pdom.add_file(LinkageId::C, &header, &debug)?;
    assert_ne!(first, second);

    let mut all = pdom.find_files(&header)?;
    all.sort_by_key(|file| file.record());
    let mut expected = vec![first, second];
    expected.sort_by_key(|file| file.record());
    assert_eq!(all, expected);
    assert_eq!(pdom.find_file(LinkageId::C, &header, &debug)?, Some(second));
    assert_eq!(pdom.find_file(LinkageId::C, &header, &release)?, Some(first));
    assert_eq!(pdom.find_file(LinkageId::C, &header, &SignificantMacros::new())?, None);
    assert_eq!(second.significant_macros(pdom.db())?, debug.signature());
    Ok(())
}

#[test]
fn verify_accepts_a_populated_index() -> Result<()> {
    let pdom = fresh()?;
    let source = file(&pdom, "/src/all.cpp")?;
    let occurrences: Vec<Symbol> = BindingKind::ALL.into_iter().map(symbol_for).collect();
    let names: Vec<_> = occurrences
        .iter()
        .enumerate()
        .map(|(i, symbol)| NameOccurrence::new(symbol, NameRole::Definition, i as u32 * 8, 2))
        .collect();
    source.add_names(&pdom, &names, &mut NoYield)?;
    let report = pdom.verify()?;
    assert!(report.is_ok(), "{:?}", report.violations);
    assert_eq!(report.names, BindingKind::ALL.len());
    assert_eq!(report.files, 1);
    assert!(report.bindings >= BindingKind::ALL.len());
    Ok(())
}
