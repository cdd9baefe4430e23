//! The persisted program database.
//!
//! A [`Pdom`] owns the heap, the registry that decodes node records, one factory per
//! language, and the in-memory caches. Its root area holds the head of the linkage list,
//! the root of the file index and the fragment id.
//!
//! Every handle in this module (`Linkage`, `Binding`, `Name`, `File`, ...) is a record
//! address plus a tag. Handles hold no data; every accessor reads through the heap.

pub mod base;
pub mod binding;
pub mod cache;
pub mod extref;
pub mod file;
pub mod include;
pub mod kinds;
pub mod linkage;
pub mod location;
pub mod macros;
pub mod name;
pub mod named;
pub mod node;
pub mod options;
pub mod symbol;
pub mod using;

use std::path::Path;
use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::storage::database::Database;
use crate::storage::{BTree, BTreeStats, RecordComparator};
use crate::types::{FragmentId, LinkageId, PdomError, RecPtr, Result};
use binding::Binding;
use cache::PdomCaches;
use file::{File, FileIndexOrder, FileLookup, SignificantMacros};
use linkage::{CLinkageFactory, CppLinkageFactory, Linkage, LinkageFactory};
use location::{IndexLocation, LocationConverter};
use node::{BindingKind, NodeRegistry, MACRO_CONTAINER_NODE};
use options::PdomOptions;

mod root {
    //! Offsets inside the heap's root area.
    pub const LINKAGES: usize = 0;
    pub const FILE_INDEX: usize = 4;
    pub const FRAGMENT_ID: usize = 8;
}

/// The index.
pub struct Pdom {
    db: Database,
    options: PdomOptions,
    registry: NodeRegistry,
    factories: Vec<Box<dyn LinkageFactory>>,
    caches: PdomCaches,
    btree_stats: Arc<BTreeStats>,
    converter: LocationConverter,
}

impl std::fmt::Debug for Pdom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pdom")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Pdom {
    /// Creates an index that lives only in memory.
    pub fn in_memory(options: PdomOptions) -> Result<Self> {
        let db = Database::in_memory(options.database.clone())?;
        Self::init(db, options)
    }

    /// Creates (truncating) an index file at `path`.
    pub fn create(path: impl AsRef<Path>, options: PdomOptions) -> Result<Self> {
        let db = Database::create(path, options.database.clone())?;
        Self::init(db, options)
    }

    /// Opens an existing index file.
    pub fn open(path: impl AsRef<Path>, options: PdomOptions) -> Result<Self> {
        let db = Database::open(path, options.database.clone())?;
        let pdom = Self::assemble(db, options);
        if pdom.fragment_id()?.0 == 0 {
            return Err(PdomError::corruption("index has no fragment id"));
        }
        Ok(pdom)
    }

    /// Opens `path` if it exists, otherwise creates it.
    pub fn open_or_create(path: impl AsRef<Path>, options: PdomOptions) -> Result<Self> {
        let db = Database::open_or_create(path, options.database.clone())?;
        let pdom = Self::assemble(db, options);
        if pdom.fragment_id()?.0 == 0 {
            pdom.write_fragment_id()?;
        }
        Ok(pdom)
    }

    fn init(db: Database, options: PdomOptions) -> Result<Self> {
        let pdom = Self::assemble(db, options);
        pdom.write_fragment_id()?;
        Ok(pdom)
    }

    fn assemble(db: Database, options: PdomOptions) -> Self {
        let factories: Vec<Box<dyn LinkageFactory>> =
            vec![Box::new(CLinkageFactory), Box::new(CppLinkageFactory)];
        let mut registry = NodeRegistry::default();
        for factory in &factories {
            factory.register(&mut registry);
        }
        Self {
            caches: PdomCaches::new(&options),
            converter: LocationConverter::new(options.workspace_root.clone()),
            db,
            options,
            registry,
            factories,
            btree_stats: Arc::new(BTreeStats::default()),
        }
    }

    fn write_fragment_id(&self) -> Result<()> {
        let mut rng = rand::thread_rng();
        let id = loop {
            let candidate: u64 = rng.gen();
            if candidate != 0 {
                break candidate;
            }
        };
        self.db
            .put_long(Database::root_area(root::FRAGMENT_ID), id as i64)?;
        info!(fragment = %FragmentId(id), "pdom.create");
        Ok(())
    }

    /// Writes the heap to its backing file.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()
    }

    /// The heap.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Options the index was opened with.
    pub fn options(&self) -> &PdomOptions {
        &self.options
    }

    /// Decoders of node records.
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// In-memory caches.
    pub fn caches(&self) -> &PdomCaches {
        &self.caches
    }

    /// Counters shared by every tree of the index.
    pub fn btree_stats(&self) -> Arc<BTreeStats> {
        Arc::clone(&self.btree_stats)
    }

    /// Location converter.
    pub fn converter(&self) -> &LocationConverter {
        &self.converter
    }

    /// Factory of the language `id`.
    pub fn factory(&self, id: LinkageId) -> Option<&dyn LinkageFactory> {
        self.factories
            .iter()
            .find(|factory| factory.id() == id)
            .map(|factory| factory.as_ref())
    }

    /// Random id distinguishing this index from others.
    pub fn fragment_id(&self) -> Result<FragmentId> {
        Ok(FragmentId(
            self.db.get_long(Database::root_area(root::FRAGMENT_ID))? as u64,
        ))
    }

    /// Every linkage, most recently created first.
    pub fn linkages(&self) -> Result<Vec<Linkage>> {
        let mut out = Vec::new();
        let mut next = self.db.get_rec_ptr(Database::root_area(root::LINKAGES))?;
        while !next.is_null() {
            let (id, _) = node::read_tag(&self.db, next)?;
            let linkage = Linkage::at(next, id);
            next = linkage.next(&self.db)?;
            out.push(linkage);
        }
        Ok(out)
    }

    /// The linkage of language `id`, if it has been created.
    pub fn linkage(&self, id: LinkageId) -> Result<Option<Linkage>> {
        Ok(self.linkages()?.into_iter().find(|linkage| linkage.id() == id))
    }

    /// The linkage of language `id`, created on first use.
    pub fn create_linkage(&self, id: LinkageId) -> Result<Linkage> {
        if let Some(existing) = self.linkage(id)? {
            return Ok(existing);
        }
        let factory = self
            .factory(id)
            .ok_or(PdomError::Invalid("no factory for linkage"))?;
        let head = Database::root_area(root::LINKAGES);
        let linkage = Linkage::create(&self.db, factory, self.db.get_rec_ptr(head)?)?;
        self.db.put_rec_ptr(head, linkage.record())?;
        Ok(linkage)
    }

    /// Binding stored at `record`.
    pub fn binding(&self, record: RecPtr) -> Result<Option<Binding>> {
        Ok(node::load(self, record)?.and_then(|node| node.into_binding()))
    }

    /// Tree of all committed files.
    pub fn file_index(&self) -> BTree<FileIndexOrder> {
        BTree::new(Database::root_area(root::FILE_INDEX), FileIndexOrder)
            .with_stats(self.btree_stats())
    }

    /// Stored form of `location`.
    pub fn internal_location(&self, location: &IndexLocation) -> String {
        self.converter.to_internal(location)
    }

    /// Get-or-create of the committed file for `location` in `linkage` under the macro
    /// context `macros`.
    pub fn add_file(
        &self,
        linkage: LinkageId,
        location: &IndexLocation,
        macros: &SignificantMacros,
    ) -> Result<File> {
        if let Some(existing) = self.find_file(linkage, location, macros)? {
            return Ok(existing);
        }
        let internal = self.internal_location(location);
        let file = File::create(&self.db, linkage, &internal, macros)?;
        self.file_index().insert(&self.db, file.record())?;
        debug!(file = %file.record(), location = %internal, "pdom.add_file");
        Ok(file)
    }

    /// The file for `location` in `linkage` under exactly the macro context `macros`.
    pub fn find_file(
        &self,
        linkage: LinkageId,
        location: &IndexLocation,
        macros: &SignificantMacros,
    ) -> Result<Option<File>> {
        let internal = self.internal_location(location);
        let signature = macros.signature();
        let mut lookup = FileLookup {
            location: internal.as_bytes(),
            key: Some((linkage, signature.as_bytes())),
            found: Vec::new(),
        };
        self.file_index().accept(&self.db, &mut lookup)?;
        Ok(lookup.found.first().copied().map(File::at))
    }

    /// Every variant of the file at `location`, across linkages and macro contexts.
    pub fn find_files(&self, location: &IndexLocation) -> Result<Vec<File>> {
        let internal = self.internal_location(location);
        let mut lookup = FileLookup {
            location: internal.as_bytes(),
            key: None,
            found: Vec::new(),
        };
        self.file_index().accept(&self.db, &mut lookup)?;
        Ok(lookup.found.into_iter().map(File::at).collect())
    }

    /// Every committed file in index order.
    pub fn files(&self) -> Result<Vec<File>> {
        Ok(self
            .file_index()
            .records(&self.db)?
            .into_iter()
            .map(File::at)
            .collect())
    }

    /// A file record outside the file index, to be filled and then committed with
    /// [`Pdom::commit_uncommitted_file`].
    pub fn add_uncommitted_file(
        &self,
        linkage: LinkageId,
        location: &IndexLocation,
        macros: &SignificantMacros,
    ) -> Result<File> {
        let internal = self.internal_location(location);
        File::create(&self.db, linkage, &internal, macros)
    }

    /// Makes `uncommitted` the committed file of its key. An existing committed file takes
    /// over its contents and stays the canonical record; otherwise `uncommitted` is
    /// inserted into the file index.
    pub fn commit_uncommitted_file(&self, uncommitted: File) -> Result<File> {
        let existing = self.file_index().insert(&self.db, uncommitted.record())?;
        if existing == uncommitted.record() {
            return Ok(uncommitted);
        }
        let canonical = File::at(existing);
        canonical.replace_contents_from(self, uncommitted)?;
        Ok(canonical)
    }

    /// Checks every tree and every file list.
    pub fn verify(&self) -> Result<VerifyReport> {
        let db = &self.db;
        let mut report = VerifyReport::default();
        for linkage in self.linkages()? {
            let id = linkage.id();
            let label = |tree: &str| format!("{}:{tree}", id.name());
            let global = linkage.index(self);
            let nested = linkage.nested_index(self);
            self.verify_tree(&mut report, label("index"), &global)?;
            self.verify_tree(&mut report, label("nested"), &nested)?;
            self.verify_tree(&mut report, label("macros"), &linkage.macro_index(self))?;
            for record in global.records(db)? {
                report.bindings += 1;
                self.verify_binding(&mut report, &linkage, record, true)?;
            }
            for record in nested.records(db)? {
                report.bindings += 1;
                self.verify_binding(&mut report, &linkage, record, false)?;
            }
            for record in linkage.macro_index(self).records(db)? {
                let tag = node::read_tag(db, record)?;
                if tag != (id, MACRO_CONTAINER_NODE) {
                    report
                        .violations
                        .push(format!("macro index of {id} holds {record} tagged {tag:?}"));
                }
            }
        }
        let files = self.file_index();
        self.verify_tree(&mut report, "files".to_string(), &files)?;
        for file in self.files()? {
            report.files += 1;
            for name in file.names(db)? {
                let name = name?;
                report.names += 1;
                if name.file(db)? != file.record() {
                    report.violations.push(format!(
                        "name {} is listed by file {} but owned by {}",
                        name.record(),
                        file.record(),
                        name.file(db)?
                    ));
                }
                if name.binding(db)?.is_null() {
                    report
                        .violations
                        .push(format!("name {} has no binding", name.record()));
                }
            }
            for include in file.includes(db)? {
                if include.included_by(db)? != file.record() {
                    report.violations.push(format!(
                        "include {} is listed by file {} but owned by {}",
                        include.record(),
                        file.record(),
                        include.included_by(db)?
                    ));
                }
            }
            for include in file.included_by(db)? {
                if include.includes(db)? != file.record() {
                    report.violations.push(format!(
                        "include {} is an incoming include of {} but targets {}",
                        include.record(),
                        file.record(),
                        include.includes(db)?
                    ));
                }
            }
        }
        if !report.is_ok() {
            warn!(violations = report.violations.len(), "pdom.verify");
        }
        Ok(report)
    }

    fn verify_tree<C: RecordComparator>(
        &self,
        report: &mut VerifyReport,
        name: String,
        tree: &BTree<C>,
    ) -> Result<()> {
        let check = tree.check(&self.db)?;
        report
            .violations
            .extend(check.violations.iter().map(|violation| format!("{name}: {violation}")));
        report.trees.push(TreeSummary {
            name,
            records: check.records,
            depth: check.depth,
        });
        Ok(())
    }

    fn verify_binding(
        &self,
        report: &mut VerifyReport,
        linkage: &Linkage,
        record: RecPtr,
        global: bool,
    ) -> Result<()> {
        let db = &self.db;
        let (id, node_type) = node::read_tag(db, record)?;
        let known = id == linkage.id()
            && BindingKind::from_node_type(node_type).is_some()
            && self.registry.contains(id, node_type);
        if !known {
            report.violations.push(format!(
                "binding {record} in {} has tag ({id}, {node_type})",
                linkage.id()
            ));
            return Ok(());
        }
        let parent = node::parent(db, record)?;
        if (parent == linkage.record()) != global {
            report.violations.push(format!(
                "binding {record} with parent {parent} is in the wrong index"
            ));
        }
        Ok(())
    }
}

/// Size of one tree, as reported by [`Pdom::verify`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TreeSummary {
    /// Tree name.
    pub name: String,
    /// Records reached.
    pub records: usize,
    /// Levels.
    pub depth: usize,
}

/// Result of [`Pdom::verify`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// Every tree checked.
    pub trees: Vec<TreeSummary>,
    /// Bindings reached through the indexes.
    pub bindings: usize,
    /// Committed files.
    pub files: usize,
    /// Names reached through file lists.
    pub names: usize,
    /// Problems found.
    pub violations: Vec<String>,
}

impl VerifyReport {
    /// Returns true when no problem was found.
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}
