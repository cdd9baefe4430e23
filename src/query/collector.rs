//! Collectors gathering every record of a linkage tree that matches a name pattern.

use std::cmp::Ordering;

use smallvec::SmallVec;

use crate::pdom::binding::{self, Binding};
use crate::pdom::linkage::Linkage;
use crate::pdom::macros::MacroContainer;
use crate::pdom::named;
use crate::pdom::node::{self, BindingKind};
use crate::pdom::Pdom;
use crate::storage::database::Database;
use crate::storage::strings;
use crate::storage::{AcceptOutcome, BTreeVisitor, VisitFlow};
use crate::types::{LinkageId, RecPtr, Result};

use super::cancel::{CancelPoll, Cancellation};
use super::matcher::ContentAssistMatcher;

/// How a collector matches names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NamePattern {
    /// The whole name.
    Exact(Vec<u8>),
    /// A leading part of the name.
    Prefix(Vec<u8>),
    /// A completion pattern, see [`ContentAssistMatcher`].
    ContentAssist(ContentAssistMatcher),
}

impl NamePattern {
    /// Places `name` relative to the range of candidates in an index ordered by
    /// [`strings::compare_compatible_with_ignore_case`].
    fn compare(&self, name: &[u8], case_sensitive: bool) -> Ordering {
        match self {
            NamePattern::Exact(key) if case_sensitive => {
                strings::compare_compatible_with_ignore_case(name, key)
            }
            NamePattern::Exact(key) => strings::compare_ignore_case(name, key),
            NamePattern::Prefix(prefix) => strings::compare_prefix(name, prefix),
            NamePattern::ContentAssist(matcher) => {
                strings::compare_prefix(name, matcher.search_prefix())
            }
        }
    }

    /// Confirms a candidate that compared `Equal`.
    fn accepts(&self, name: &[u8], case_sensitive: bool) -> bool {
        match self {
            NamePattern::Exact(_) => true,
            NamePattern::Prefix(prefix) => strings::starts_with(name, prefix, case_sensitive),
            NamePattern::ContentAssist(matcher) => matcher.matches(name),
        }
    }
}

/// Collects bindings of one index whose names match a [`NamePattern`].
///
/// Drive it with [`BindingCollector::search`] or pass it to
/// [`crate::storage::BTree::accept`] directly. Results come in index order.
#[derive(Debug)]
pub struct BindingCollector {
    pattern: NamePattern,
    case_sensitive: bool,
    node_types: SmallVec<[u16; 4]>,
    skip_global_enumerators: bool,
    parent: Option<RecPtr>,
    poll: CancelPoll,
    records: Vec<RecPtr>,
}

impl BindingCollector {
    fn new(pattern: NamePattern) -> Self {
        Self {
            pattern,
            case_sensitive: true,
            node_types: SmallVec::new(),
            skip_global_enumerators: false,
            parent: None,
            poll: CancelPoll::default(),
            records: Vec::new(),
        }
    }

    /// Bindings called `name`.
    pub fn exact(name: impl AsRef<[u8]>) -> Self {
        Self::new(NamePattern::Exact(name.as_ref().to_vec()))
    }

    /// Bindings whose name starts with `prefix`.
    pub fn prefix(prefix: impl AsRef<[u8]>) -> Self {
        Self::new(NamePattern::Prefix(prefix.as_ref().to_vec()))
    }

    /// Bindings matching a completion pattern.
    pub fn content_assist(pattern: &str) -> Self {
        Self::new(NamePattern::ContentAssist(ContentAssistMatcher::new(pattern)))
    }

    /// Whether exact and prefix matching respect case. Defaults to true; completion
    /// patterns always ignore case.
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Keeps only bindings of the given kinds. An empty list keeps every kind.
    pub fn kinds(mut self, kinds: &[BindingKind]) -> Self {
        self.node_types = kinds.iter().map(|kind| kind.node_type()).collect();
        self
    }

    /// Drops enumerators of unscoped enumerations declared at global scope.
    pub fn skip_global_enumerators(mut self, skip: bool) -> Self {
        self.skip_global_enumerators = skip;
        self
    }

    /// Restricts the search to the members of `parent`, which makes
    /// [`BindingCollector::search`] walk the nested index.
    pub fn within(mut self, parent: RecPtr) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Stops the search once `token` is raised, polling it every `interval` visits.
    pub fn with_cancellation(mut self, token: Cancellation, interval: u32) -> Self {
        self.poll = CancelPoll::new(token, interval);
        self
    }

    /// Stops the search once `token` is raised, polling at the interval configured for
    /// `pdom`.
    pub fn cancellable(self, pdom: &Pdom, token: Cancellation) -> Self {
        self.with_cancellation(token, pdom.options().cancellation_poll_interval)
    }

    /// Searches the index of `linkage` this collector applies to.
    pub fn search(&mut self, pdom: &Pdom, linkage: &Linkage) -> Result<AcceptOutcome> {
        let db = pdom.db();
        match self.parent {
            Some(_) => linkage.nested_index(pdom).accept(db, self),
            None => linkage.index(pdom).accept(db, self),
        }
    }

    /// Records collected so far.
    pub fn records(&self) -> &[RecPtr] {
        &self.records
    }

    /// Consumes the collector, returning the collected records.
    pub fn into_records(self) -> Vec<RecPtr> {
        self.records
    }

    /// Loads the collected bindings.
    pub fn bindings(&self, db: &Database) -> Result<Vec<Binding>> {
        self.records.iter().map(|&record| Binding::load(db, record)).collect()
    }
}

impl BTreeVisitor for BindingCollector {
    fn compare(&mut self, db: &Database, record: RecPtr) -> Result<Ordering> {
        if let Some(parent) = self.parent {
            let cmp = node::parent(db, record)?.cmp(&parent);
            if cmp != Ordering::Equal {
                return Ok(cmp);
            }
        }
        Ok(self
            .pattern
            .compare(&named::name_of(db, record)?, self.case_sensitive))
    }

    fn visit(&mut self, db: &Database, record: RecPtr) -> Result<VisitFlow> {
        self.poll.check()?;
        if !self
            .pattern
            .accepts(&named::name_of(db, record)?, self.case_sensitive)
        {
            return Ok(VisitFlow::Continue);
        }
        let (_, node_type) = node::read_tag(db, record)?;
        if !self.node_types.is_empty() && !self.node_types.contains(&node_type) {
            return Ok(VisitFlow::Continue);
        }
        if self.skip_global_enumerators
            && node_type == BindingKind::Enumerator.node_type()
            && binding::is_linkage_record(db, node::parent(db, record)?)?
        {
            return Ok(VisitFlow::Continue);
        }
        self.records.push(record);
        Ok(VisitFlow::Continue)
    }
}

/// Collects macro containers whose names match a [`NamePattern`].
#[derive(Debug)]
pub struct MacroContainerCollector {
    pattern: NamePattern,
    case_sensitive: bool,
    poll: CancelPoll,
    records: Vec<RecPtr>,
}

impl MacroContainerCollector {
    fn new(pattern: NamePattern) -> Self {
        Self {
            pattern,
            case_sensitive: true,
            poll: CancelPoll::default(),
            records: Vec::new(),
        }
    }

    /// Containers called `name`.
    pub fn exact(name: impl AsRef<[u8]>) -> Self {
        Self::new(NamePattern::Exact(name.as_ref().to_vec()))
    }

    /// Containers whose name starts with `prefix`.
    pub fn prefix(prefix: impl AsRef<[u8]>) -> Self {
        Self::new(NamePattern::Prefix(prefix.as_ref().to_vec()))
    }

    /// Containers matching a completion pattern.
    pub fn content_assist(pattern: &str) -> Self {
        Self::new(NamePattern::ContentAssist(ContentAssistMatcher::new(pattern)))
    }

    /// Whether exact and prefix matching respect case.
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Stops the search once `token` is raised, polling it every `interval` visits.
    pub fn with_cancellation(mut self, token: Cancellation, interval: u32) -> Self {
        self.poll = CancelPoll::new(token, interval);
        self
    }

    /// Stops the search once `token` is raised, polling at the interval configured for
    /// `pdom`.
    pub fn cancellable(self, pdom: &Pdom, token: Cancellation) -> Self {
        self.with_cancellation(token, pdom.options().cancellation_poll_interval)
    }

    /// Searches the macro index of `linkage`.
    pub fn search(&mut self, pdom: &Pdom, linkage: &Linkage) -> Result<AcceptOutcome> {
        linkage.macro_index(pdom).accept(pdom.db(), self)
    }

    /// Containers collected so far.
    pub fn containers(&self, linkage: LinkageId) -> Vec<MacroContainer> {
        self.records
            .iter()
            .map(|&record| MacroContainer::at(record, linkage))
            .collect()
    }

    /// Consumes the collector, returning the collected records.
    pub fn into_records(self) -> Vec<RecPtr> {
        self.records
    }
}

impl BTreeVisitor for MacroContainerCollector {
    fn compare(&mut self, db: &Database, record: RecPtr) -> Result<Ordering> {
        Ok(self
            .pattern
            .compare(&named::name_of(db, record)?, self.case_sensitive))
    }

    fn visit(&mut self, db: &Database, record: RecPtr) -> Result<VisitFlow> {
        self.poll.check()?;
        if self
            .pattern
            .accepts(&named::name_of(db, record)?, self.case_sensitive)
        {
            self.records.push(record);
        }
        Ok(VisitFlow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdom::options::PdomOptions;
    use crate::pdom::symbol::{Symbol, SymbolKind};

    fn names(pdom: &Pdom, records: &[RecPtr]) -> Vec<String> {
        records
            .iter()
            .map(|&record| String::from_utf8(named::name_of(pdom.db(), record).unwrap()).unwrap())
            .collect()
    }

    fn populated() -> (Pdom, Linkage) {
        let pdom = Pdom::in_memory(PdomOptions::default()).unwrap();
        let linkage = pdom.create_linkage(LinkageId::CPP).unwrap();
        for name in ["getFooBar", "GetFoo", "getfoo", "setFooBar", "gamma", "count"] {
            linkage
                .add_binding(&pdom, &Symbol::new(SymbolKind::Function, name))
                .unwrap();
        }
        linkage
            .add_binding(&pdom, &Symbol::new(SymbolKind::Variable, "getValue"))
            .unwrap();
        (pdom, linkage)
    }

    #[test]
    fn exact_respects_case_setting() {
        let (pdom, linkage) = populated();
        let mut sensitive = BindingCollector::exact("getfoo");
        sensitive.search(&pdom, &linkage).unwrap();
        assert_eq!(names(&pdom, sensitive.records()), vec!["getfoo"]);

        let mut insensitive = BindingCollector::exact("getfoo").case_sensitive(false);
        insensitive.search(&pdom, &linkage).unwrap();
        let mut found = names(&pdom, insensitive.records());
        found.sort();
        assert_eq!(found, vec!["GetFoo", "getfoo"]);
    }

    #[test]
    fn prefix_and_kind_filter() {
        let (pdom, linkage) = populated();
        let mut all = BindingCollector::prefix("get");
        all.search(&pdom, &linkage).unwrap();
        let mut found = names(&pdom, all.records());
        found.sort();
        assert_eq!(found, vec!["getFooBar", "getValue", "getfoo"]);

        let mut variables = BindingCollector::prefix("GET")
            .case_sensitive(false)
            .kinds(&[BindingKind::Variable]);
        variables.search(&pdom, &linkage).unwrap();
        assert_eq!(names(&pdom, variables.records()), vec!["getValue"]);
    }

    #[test]
    fn content_assist_confirms_camel_case() {
        let (pdom, linkage) = populated();
        let mut collector = BindingCollector::content_assist("gFB");
        collector.search(&pdom, &linkage).unwrap();
        assert_eq!(names(&pdom, collector.records()), vec!["getFooBar"]);
    }

    #[test]
    fn global_enumerators_can_be_skipped() {
        let pdom = Pdom::in_memory(PdomOptions::default()).unwrap();
        let linkage = pdom.create_linkage(LinkageId::C).unwrap();
        let color = Symbol::new(SymbolKind::Enumeration, "color");
        linkage
            .add_binding(&pdom, &Symbol::new(SymbolKind::Enumerator, "red").in_scope(color))
            .unwrap();
        linkage
            .add_binding(&pdom, &Symbol::new(SymbolKind::Variable, "red"))
            .unwrap();

        let mut every = BindingCollector::exact("red");
        every.search(&pdom, &linkage).unwrap();
        assert_eq!(every.records().len(), 2);

        let mut skipping = BindingCollector::exact("red").skip_global_enumerators(true);
        skipping.search(&pdom, &linkage).unwrap();
        let kinds: Vec<_> = skipping
            .bindings(pdom.db())
            .unwrap()
            .iter()
            .map(Binding::kind)
            .collect();
        assert_eq!(kinds, vec![BindingKind::Variable]);
    }

    #[test]
    fn members_come_from_the_nested_index() {
        let pdom = Pdom::in_memory(PdomOptions::default()).unwrap();
        let linkage = pdom.create_linkage(LinkageId::CPP).unwrap();
        let point = Symbol::new(SymbolKind::Composite, "point");
        let x = linkage
            .add_binding(&pdom, &Symbol::new(SymbolKind::Field, "x").in_scope(point.clone()))
            .unwrap()
            .unwrap();
        linkage
            .add_binding(&pdom, &Symbol::new(SymbolKind::Field, "y").in_scope(point))
            .unwrap();
        let owner = x.parent(pdom.db()).unwrap();

        let mut collector = BindingCollector::prefix("").within(owner);
        collector.search(&pdom, &linkage).unwrap();
        assert_eq!(names(&pdom, collector.records()), vec!["x", "y"]);
    }

    #[test]
    fn raised_token_cancels_the_search() {
        let (pdom, linkage) = populated();
        let token = Cancellation::new();
        token.cancel();
        let mut collector = BindingCollector::prefix("").with_cancellation(token, 2);
        let outcome = collector.search(&pdom, &linkage).unwrap();
        assert!(outcome.is_cancelled());
        assert_eq!(collector.records().len(), 1);
    }

    #[test]
    fn configured_interval_bounds_partial_results() {
        let pdom = Pdom::in_memory(PdomOptions::default().cancellation_poll_interval(3)).unwrap();
        let linkage = pdom.create_linkage(LinkageId::C).unwrap();
        for name in ["a", "b", "c", "d", "e"] {
            linkage
                .add_binding(&pdom, &Symbol::new(SymbolKind::Variable, name))
                .unwrap();
        }
        let token = Cancellation::new();
        token.cancel();
        let mut collector = BindingCollector::prefix("").cancellable(&pdom, token);
        assert!(collector.search(&pdom, &linkage).unwrap().is_cancelled());
        assert_eq!(names(&pdom, collector.records()), vec!["a", "b"]);
    }

    #[test]
    fn macro_containers_by_prefix() {
        let pdom = Pdom::in_memory(PdomOptions::default()).unwrap();
        let linkage = pdom.create_linkage(LinkageId::C).unwrap();
        for name in ["MAX", "MIN", "max_len"] {
            linkage.macro_container(&pdom, name, true).unwrap();
        }
        let mut collector = MacroContainerCollector::prefix("ma").case_sensitive(false);
        collector.search(&pdom, &linkage).unwrap();
        let found: Vec<String> = collector
            .containers(linkage.id())
            .iter()
            .map(|container| container.name(pdom.db()).unwrap())
            .collect();
        assert_eq!(found, vec!["MAX", "max_len"]);
    }
}
