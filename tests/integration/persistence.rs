#![allow(missing_docs)]

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use pdom::pdom::file::{NameOccurrence, SignificantMacros};
use pdom::pdom::location::IndexLocation;
use pdom::pdom::macros::MacroDefinition;
use pdom::pdom::name::NameRole;
use pdom::pdom::symbol::{Symbol, SymbolKind};
use pdom::primitives::concurrency::NoYield;
use pdom::query::find_binding::find_binding;
use pdom::storage::database::CHUNK_SIZE;
use pdom::storage::DatabaseOptions;
use pdom::types::{LinkageId, RecPtr, Result};
use pdom::{Pdom, PdomError, PdomOptions};
use tempfile::TempDir;

fn options() -> PdomOptions {
    PdomOptions::default().database(DatabaseOptions::new().sync_on_flush(false))
}

fn populate(pdom: &Pdom) -> Result<()> {
    let file = pdom.add_file(
        LinkageId::CPP,
        &IndexLocation::from_path(Path::new("/src/widget.cpp")),
        &SignificantMacros::new().define("WIDGETS", "1"),
    )?;
    let widget = Symbol::new(SymbolKind::Composite, "Widget");
    let draw = Symbol::new(SymbolKind::Method, "draw").in_scope(widget.clone());
    file.add_names(
        pdom,
        &[
            NameOccurrence::new(&widget, NameRole::Definition, 6, 6),
            NameOccurrence::new(&draw, NameRole::Declaration, 20, 4),
            NameOccurrence::new(&draw, NameRole::Reference, 90, 4),
        ],
        &mut NoYield,
    )?;
    file.add_macros(pdom, &[MacroDefinition::object("WIDGET_API", "", 8)])?;
    file.set_timestamp(pdom.db(), 42)?;
    Ok(())
}

#[test]
fn reopened_index_answers_the_same_queries() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("index.pdom");
    let fragment = {
        let pdom = Pdom::create(&path, options())?;
        populate(&pdom)?;
        pdom.flush()?;
        pdom.fragment_id()?
    };
    assert_eq!(fs::metadata(&path)?.len() % CHUNK_SIZE as u64, 0);

    let pdom = Pdom::open(&path, options())?;
    assert_eq!(pdom.fragment_id()?, fragment);
    let files = pdom.files()?;
    assert_eq!(files.len(), 1);
    let summary = files[0].summary(pdom.db())?;
    assert_eq!(summary.names, 3);
    assert_eq!(summary.macros, 1);
    assert_eq!(files[0].timestamp(pdom.db())?, 42);

    let linkage = pdom.linkage(LinkageId::CPP)?.expect("linkage persisted");
    let widget = find_binding(&pdom, &linkage, "Widget", &[], RecPtr::NULL)?.expect("Widget");
    let draw_symbol = Symbol::new(SymbolKind::Method, "draw")
        .in_scope(Symbol::new(SymbolKind::Composite, "Widget"));
    let draw = linkage.adapt_binding(&pdom, &draw_symbol)?.expect("draw");
    assert_eq!(draw.parent(pdom.db())?, widget.record());
    assert_eq!(draw.references(pdom.db())?.count(), 1);
    assert!(linkage.macro_container(&pdom, "WIDGET_API", false)?.is_some());

    let report = pdom.verify()?;
    assert!(report.is_ok(), "{:?}", report.violations);
    Ok(())
}

#[test]
fn open_or_create_keeps_the_fragment_id() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("lazy.pdom");
    let first = Pdom::open_or_create(&path, options())?;
    let fragment = first.fragment_id()?;
    assert_ne!(fragment.0, 0);
    first.flush()?;
    drop(first);

    let second = Pdom::open_or_create(&path, options())?;
    assert_eq!(second.fragment_id()?, fragment);
    Ok(())
}

#[test]
fn missing_file_does_not_open() {
    let dir = TempDir::new().expect("tempdir");
    let err = Pdom::open(dir.path().join("absent.pdom"), options()).unwrap_err();
    assert!(matches!(err, PdomError::Io(_)), "{err}");
}

#[test]
fn damaged_header_is_rejected_unless_unchecked() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("damaged.pdom");
    {
        let pdom = Pdom::create(&path, options())?;
        populate(&pdom)?;
        pdom.flush()?;
    }
    let mut raw = OpenOptions::new().write(true).open(&path)?;
    raw.seek(SeekFrom::Start(CHUNK_SIZE as u64 - 1))?;
    raw.write_all(&[0xa5])?;
    drop(raw);

    let err = Pdom::open(&path, options()).unwrap_err();
    assert!(matches!(err, PdomError::Corruption(_)), "{err}");

    let lenient = options().database(
        DatabaseOptions::new()
            .sync_on_flush(false)
            .verify_header_checksum(false),
    );
    let pdom = Pdom::open(&path, lenient)?;
    assert_eq!(pdom.files()?.len(), 1);
    Ok(())
}

#[test]
fn growth_past_the_limit_is_fatal() -> Result<()> {
    let limit = 4 * CHUNK_SIZE as u64;
    let pdom = Pdom::in_memory(
        PdomOptions::default().database(DatabaseOptions::new().max_size(limit)),
    )?;
    let linkage = pdom.create_linkage(LinkageId::C)?;
    let mut failure = None;
    for i in 0..10_000 {
        let symbol = Symbol::new(SymbolKind::Variable, format!("global_variable_{i:05}"));
        if let Err(err) = linkage.add_binding(&pdom, &symbol) {
            failure = Some(err);
            break;
        }
    }
    let err = failure.expect("the limit is reached");
    assert!(err.is_too_large(), "{err}");
    assert!(pdom.db().chunk_count() as u64 * CHUNK_SIZE as u64 <= limit);
    Ok(())
}

#[test]
fn options_load_from_toml() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("pdom.toml");
    fs::write(
        &path,
        "[index]\n\
         binding_cache_capacity = 0\n\
         cancellation_poll_interval = 16\n\
         workspace_root = \"/work\"\n\
         \n\
         [database]\n\
         max_size = 1048576\n\
         sync_on_flush = false\n",
    )?;
    let loaded = PdomOptions::load(&path)?;
    assert_eq!(loaded.binding_cache_capacity, 0);
    assert_eq!(loaded.cancellation_poll_interval, 16);
    assert_eq!(loaded.macro_cache_capacity, PdomOptions::default().macro_cache_capacity);
    assert_eq!(loaded.workspace_root.as_deref(), Some(Path::new("/work")));
    assert_eq!(loaded.database.max_size, 1 << 20);
    assert!(!loaded.database.sync_on_flush);
    assert!(loaded.database.verify_header_checksum);

    let round = PdomOptions::from_toml_str(&loaded.to_toml_string()?)?;
    assert_eq!(round, loaded);

    let err = PdomOptions::load(dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, PdomError::Config(_)));
    Ok(())
}
