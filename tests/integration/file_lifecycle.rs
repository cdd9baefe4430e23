#![allow(missing_docs)]

use std::path::Path;

use pdom::pdom::file::{File, NameOccurrence, SignificantMacros};
use pdom::pdom::include::IncludeInfo;
use pdom::pdom::location::IndexLocation;
use pdom::pdom::macros::{MacroDefinition, MacroUse};
use pdom::pdom::name::NameRole;
use pdom::pdom::symbol::{Symbol, SymbolKind};
use pdom::primitives::concurrency::NoYield;
use pdom::types::{LinkageId, RecPtr, Result};
use pdom::{Pdom, PdomOptions};

fn location(path: &str) -> IndexLocation {
    IndexLocation::from_path(Path::new(path))
}

fn committed(pdom: &Pdom, path: &str) -> Result<File> {
    pdom.add_file(LinkageId::CPP, &location(path), &SignificantMacros::new())
}

fn include_sources(pdom: &Pdom, target: File) -> Result<Vec<RecPtr>> {
    let db = pdom.db();
    target
        .included_by(db)?
        .into_iter()
        .map(|include| include.included_by(db))
        .collect()
}

#[test]
fn commit_transplants_the_new_contents() -> Result<()> {
    let pdom = Pdom::in_memory(PdomOptions::default())?;
    let db = pdom.db();
    let header = location("/src/util.h");
    let canonical = committed(&pdom, "/src/util.h")?;
    let main = committed(&pdom, "/src/main.cpp")?;
    let other = committed(&pdom, "/src/other.cpp")?;
    main.add_includes_to(&pdom, &[IncludeInfo::new("util.h", 10).resolved_to(canonical.record())])?;

    let stale = Symbol::new(SymbolKind::Function, "util_old");
    canonical.add_names(
        &pdom,
        &[NameOccurrence::new(&stale, NameRole::Declaration, 40, 8)],
        &mut NoYield,
    )?;
    canonical.add_macros(&pdom, &[MacroDefinition::object("OLD_GUARD", "", 8)])?;

    let fresh = pdom.add_uncommitted_file(LinkageId::CPP, &header, &SignificantMacros::new())?;
    other.add_includes_to(&pdom, &[IncludeInfo::new("util.h", 3).resolved_to(fresh.record())])?;
    let ns = Symbol::new(SymbolKind::Namespace, "util");
    let init = Symbol::new(SymbolKind::Function, "util_init").in_scope(ns.clone());
    let names = fresh.add_names(
        &pdom,
        &[
            NameOccurrence::new(&ns, NameRole::Definition, 12, 4),
            NameOccurrence::new(&init, NameRole::Declaration, 30, 9),
        ],
        &mut NoYield,
    )?;
    fresh.add_macros(&pdom, &[MacroDefinition::object("UTIL_H", "", 8)])?;
    fresh.add_macro_references(
        &pdom,
        &[MacroUse {
            name: "UTIL_H".into(),
            offset: 1,
            length: 6,
            conditional: true,
        }],
    )?;
    fresh.add_includes_to(&pdom, &[IncludeInfo::new("cstdio", 60).system()])?;
    let linkage = pdom.linkage(LinkageId::CPP)?.expect("linkage exists");
    let namespace = linkage.add_binding(&pdom, &ns)?.expect("namespace is stored");
    fresh.add_using_directive(db, &namespace, 90)?;
    fresh.set_timestamp(db, 1_700_000_000)?;
    fresh.set_content_hash(db, 0xfeed)?;
    fresh.set_pragma_once(db, true)?;

    let result = pdom.commit_uncommitted_file(fresh)?;
    assert_eq!(result, canonical);

    let moved = canonical.names(db)?.collect::<Result<Vec<_>>>()?;
    let expected: Vec<_> = names.into_iter().flatten().collect();
    assert_eq!(moved, expected);
    for name in &moved {
        assert_eq!(name.file(db)?, canonical.record());
    }
    let macros = canonical.macros(db)?;
    assert_eq!(macros.len(), 1);
    assert_eq!(macros[0].file(db)?, canonical.record());
    assert!(linkage.macro_container(&pdom, "OLD_GUARD", false)?.is_none());
    let references = canonical.macro_references(db)?;
    assert_eq!(references.len(), 1);
    assert!(references[0].is_conditional(db)?);
    assert_eq!(references[0].file(db)?, canonical.record());

    let includes = canonical.includes(db)?;
    assert_eq!(includes.len(), 1);
    assert_eq!(includes[0].included_by(db)?, canonical.record());
    assert!(includes[0].is_system(db)?);
    assert!(!includes[0].is_resolved(db)?);

    let directives = canonical.using_directives(db)?;
    assert_eq!(directives.len(), 1);
    assert_eq!(directives[0].file(db)?, canonical.record());
    assert_eq!(directives[0].namespace(db)?, namespace.record());

    assert_eq!(include_sources(&pdom, canonical)?, vec![main.record(), other.record()]);
    for include in canonical.included_by(db)? {
        assert_eq!(include.includes(db)?, canonical.record());
    }

    assert_eq!(canonical.timestamp(db)?, 1_700_000_000);
    assert_eq!(canonical.content_hash(db)?, 0xfeed);
    assert!(canonical.has_pragma_once(db)?);
    assert_eq!(pdom.find_files(&header)?, vec![canonical]);
    assert_eq!(pdom.files()?.len(), 3);

    let report = pdom.verify()?;
    assert!(report.is_ok(), "{:?}", report.violations);
    Ok(())
}

#[test]
fn first_commit_inserts_the_file() -> Result<()> {
    let pdom = Pdom::in_memory(PdomOptions::default())?;
    let header = location("/src/new.h");
    let fresh = pdom.add_uncommitted_file(LinkageId::C, &header, &SignificantMacros::new())?;
    assert!(pdom.find_files(&header)?.is_empty());
    let result = pdom.commit_uncommitted_file(fresh)?;
    assert_eq!(result, fresh);
    assert_eq!(
        pdom.find_file(LinkageId::C, &header, &SignificantMacros::new())?,
        Some(fresh)
    );
    Ok(())
}

#[test]
fn clear_keeps_identity_and_incoming_includes() -> Result<()> {
    let pdom = Pdom::in_memory(PdomOptions::default())?;
    let db = pdom.db();
    let target = committed(&pdom, "/src/types.h")?;
    let user = committed(&pdom, "/src/user.cpp")?;
    user.add_includes_to(&pdom, &[IncludeInfo::new("types.h", 0).resolved_to(target.record())])?;
    target.add_includes_to(&pdom, &[IncludeInfo::new("base.h", 0)])?;

    let size = Symbol::new(SymbolKind::Typedef, "size_type");
    let names = target.add_names(
        &pdom,
        &[NameOccurrence::new(&size, NameRole::Definition, 8, 9)],
        &mut NoYield,
    )?;
    let max = MacroDefinition::function("MAX", vec!["a".into(), "b".into()], "a>b?a:b", 8);
    target.add_macros(&pdom, &[max])?;
    target.set_timestamp(db, 5)?;
    let binding = pdom
        .binding(names[0].expect("stored").binding(db)?)?
        .expect("binding exists");
    assert!(!binding.is_orphaned(db)?);

    target.clear(&pdom)?;
    assert_eq!(target.names(db)?.count(), 0);
    assert!(target.macros(db)?.is_empty());
    assert!(target.includes(db)?.is_empty());
    assert!(!target.has_content(db)?);
    assert!(binding.is_orphaned(db)?);
    assert_eq!(include_sources(&pdom, target)?, vec![user.record()]);
    assert_eq!(target.location(db)?, pdom.internal_location(&location("/src/types.h")));
    assert_eq!(pdom.files()?.len(), 2);
    Ok(())
}

#[test]
fn context_include_heads_the_incoming_list() -> Result<()> {
    let pdom = Pdom::in_memory(PdomOptions::default())?;
    let target = committed(&pdom, "/src/shared.h")?;
    let a = committed(&pdom, "/src/a.cpp")?;
    let b = committed(&pdom, "/src/b.cpp")?;
    let c = committed(&pdom, "/src/c.cpp")?;
    let to_target = |name: &str| IncludeInfo::new(name, 0).resolved_to(target.record());

    a.add_includes_to(&pdom, &[to_target("shared.h")])?;
    b.add_includes_to(&pdom, &[to_target("shared.h")])?;
    assert_eq!(include_sources(&pdom, target)?, vec![a.record(), b.record()]);

    c.add_includes_to(&pdom, &[to_target("shared.h").as_context()])?;
    assert_eq!(
        include_sources(&pdom, target)?,
        vec![c.record(), a.record(), b.record()]
    );

    a.clear(&pdom)?;
    assert_eq!(include_sources(&pdom, target)?, vec![c.record(), b.record()]);
    Ok(())
}

#[test]
fn a_file_cannot_replace_itself() -> Result<()> {
    let pdom = Pdom::in_memory(PdomOptions::default())?;
    let file = committed(&pdom, "/src/self.h")?;
    assert!(file.replace_contents_from(&pdom, file).is_err());
    Ok(())
}
