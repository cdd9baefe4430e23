#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use pdom::pdom::file::{NameOccurrence, SignificantMacros};
use pdom::pdom::location::IndexLocation;
use pdom::pdom::macros::MacroDefinition;
use pdom::pdom::name::NameRole;
use pdom::pdom::symbol::{Symbol, SymbolKind};
use pdom::primitives::concurrency::NoYield;
use pdom::types::LinkageId;
use pdom::{Pdom, PdomOptions};
use serde_json::Value;
use tempfile::TempDir;

fn setup_db(name: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join(format!("{name}.pdom"));
    seed(&path).expect("seed index");
    (dir, path)
}

fn seed(path: &Path) -> pdom::Result<()> {
    let pdom = Pdom::create(path, PdomOptions::default())?;
    let file = pdom.add_file(
        LinkageId::CPP,
        &IndexLocation::from_path(Path::new("/src/foo.cpp")),
        &SignificantMacros::new(),
    )?;
    let foo = Symbol::new(SymbolKind::Namespace, "foo");
    let get = Symbol::new(SymbolKind::Function, "getFooBar");
    let set = Symbol::new(SymbolKind::Function, "setFooBar").in_scope(foo.clone());
    let count = Symbol::new(SymbolKind::Variable, "fooCount");
    file.add_names(
        &pdom,
        &[
            NameOccurrence::new(&foo, NameRole::Definition, 10, 3),
            NameOccurrence::new(&get, NameRole::Definition, 30, 9),
            NameOccurrence::new(&set, NameRole::Declaration, 60, 9),
            NameOccurrence::new(&count, NameRole::Definition, 90, 8),
        ],
        &mut NoYield,
    )?;
    file.add_macros(&pdom, &[MacroDefinition::object("FOO_VERSION", "3", 8)])?;
    pdom.flush()
}

fn pdom_cmd(dir: &TempDir, db: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("pdom");
    cmd.env_remove("PDOM_CONFIG")
        .env("XDG_CONFIG_HOME", dir.path())
        .env("HOME", dir.path())
        .arg("--database")
        .arg(db);
    cmd
}

fn json_output(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("json output")
}

fn hit_names(value: &Value) -> Vec<String> {
    value["hits"]
        .as_array()
        .expect("hits array")
        .iter()
        .map(|hit| hit["name"].as_str().expect("name").to_owned())
        .collect()
}

#[test]
fn info_reports_linkages_and_files() {
    let (dir, db) = setup_db("info");
    let info = json_output(pdom_cmd(&dir, &db).args(["--format", "json", "info"]));
    assert_eq!(info["files"], 1);
    assert_eq!(info["fragment_id"].as_str().map(str::len), Some(16));
    let linkages = info["linkages"].as_array().expect("linkages");
    assert_eq!(linkages.len(), 1);
    assert_eq!(linkages[0]["name"], "C++");
    assert_eq!(linkages[0]["global_bindings"], 3);
    assert_eq!(linkages[0]["nested_bindings"], 1);
    assert_eq!(linkages[0]["macro_names"], 1);
    assert!(info["allocator"]["mallocs"].is_u64());
    assert!(info["chunks"].as_u64().unwrap_or_default() > 1);

    let text = pdom_cmd(&dir, &db).arg("info").assert().success().get_output().stdout.clone();
    let text = String::from_utf8(text).expect("utf8");
    assert!(text.starts_with("fragment "), "{text}");
}

#[test]
fn files_lists_summaries() {
    let (dir, db) = setup_db("files");
    let files = json_output(pdom_cmd(&dir, &db).args(["--format", "json", "files"]));
    let files = files.as_array().expect("file array");
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["names"], 4);
    assert_eq!(files[0]["macros"], 1);
    assert!(files[0]["location"].as_str().expect("location").ends_with("foo.cpp"));
}

#[test]
fn find_by_prefix_and_content_assist() {
    let (dir, db) = setup_db("find");
    let prefix = json_output(pdom_cmd(&dir, &db).args(["--format", "json", "find", "--prefix", "foo"]));
    assert_eq!(hit_names(&prefix), ["foo", "fooCount"]);
    assert_eq!(prefix["cancelled"], false);

    let assisted = json_output(pdom_cmd(&dir, &db).args([
        "--format",
        "json",
        "find",
        "--content-assist",
        "gFB",
    ]));
    assert_eq!(hit_names(&assisted), ["getFooBar"]);

    let exact = json_output(pdom_cmd(&dir, &db).args(["--format", "json", "find", "setFooBar"]));
    assert!(hit_names(&exact).is_empty(), "members live in the nested index");

    let kinds = json_output(pdom_cmd(&dir, &db).args([
        "--format", "json", "find", "--prefix", "-i", "FOO", "--kind", "variable",
    ]));
    assert_eq!(hit_names(&kinds), ["fooCount"]);

    let macros = json_output(pdom_cmd(&dir, &db).args([
        "--format", "json", "find", "--macros", "--prefix", "FOO_",
    ]));
    assert_eq!(hit_names(&macros), ["FOO_VERSION"]);
    assert_eq!(macros["hits"][0]["kind"], "macro");
}

#[test]
fn find_rejects_unknown_kinds() {
    let (dir, db) = setup_db("badkind");
    pdom_cmd(&dir, &db)
        .args(["find", "foo", "--kind", "lambda"])
        .assert()
        .failure();
}

#[test]
fn verify_succeeds_on_a_healthy_index() {
    let (dir, db) = setup_db("verify");
    let report = json_output(pdom_cmd(&dir, &db).args(["--format", "json", "verify"]));
    assert_eq!(report["violations"].as_array().map(Vec::len), Some(0));
    assert_eq!(report["names"], 4);
}

#[test]
fn missing_database_is_an_error() {
    let dir = TempDir::new().expect("tempdir");
    pdom_cmd(&dir, &dir.path().join("absent.pdom"))
        .arg("info")
        .assert()
        .code(1);
}
