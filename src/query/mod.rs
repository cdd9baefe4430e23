#![forbid(unsafe_code)]

//! Name lookups over the index.
//!
//! Every lookup is a visitor: it descends a linkage tree with a `compare` that narrows
//! the candidates, then confirms or rejects each candidate in `visit`. Long searches
//! poll a [`Cancellation`] and end with [`AcceptOutcome::Cancelled`] and partial results.

/// Cooperative cancellation of searches.
pub mod cancel;

/// Collectors gathering every match of a name pattern.
pub mod collector;

/// Point lookups of single bindings and member walks.
pub mod find_binding;

/// Completion pattern matching.
pub mod matcher;

pub use cancel::Cancellation;
pub use collector::{BindingCollector, MacroContainerCollector, NamePattern};
pub use find_binding::{
    accept_members, find_binding, find_in_scope, find_member, FindBinding, NodeVisitor,
};
pub use matcher::ContentAssistMatcher;

use crate::pdom::binding::Binding;
use crate::pdom::Pdom;
use crate::storage::AcceptOutcome;
use crate::types::Result;

/// Bindings found across all linkages of an index.
#[derive(Debug, Default)]
pub struct BindingMatches {
    /// Matches, linkage by linkage in index order.
    pub bindings: Vec<Binding>,
    /// True when a search was cancelled and the matches are partial.
    pub cancelled: bool,
}

/// Runs a fresh collector from `collector` over the global index of every linkage.
pub fn find_bindings(
    pdom: &Pdom,
    collector: impl Fn() -> BindingCollector,
) -> Result<BindingMatches> {
    let mut matches = BindingMatches::default();
    for linkage in pdom.linkages()? {
        let mut search = collector();
        let outcome = search.search(pdom, &linkage)?;
        matches.bindings.extend(search.bindings(pdom.db())?);
        if outcome == AcceptOutcome::Cancelled {
            matches.cancelled = true;
            break;
        }
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdom::options::PdomOptions;
    use crate::pdom::symbol::{Symbol, SymbolKind};
    use crate::types::LinkageId;

    #[test]
    fn searches_every_linkage() {
        let pdom = Pdom::in_memory(PdomOptions::default()).unwrap();
        for id in [LinkageId::C, LinkageId::CPP] {
            pdom.create_linkage(id)
                .unwrap()
                .add_binding(&pdom, &Symbol::new(SymbolKind::Function, "init"))
                .unwrap();
        }
        let matches = find_bindings(&pdom, || BindingCollector::exact("init")).unwrap();
        assert!(!matches.cancelled);
        let mut linkages: Vec<_> = matches.bindings.iter().map(Binding::linkage).collect();
        linkages.sort_by_key(|id| id.0);
        assert_eq!(linkages, vec![LinkageId::C, LinkageId::CPP]);

        let token = Cancellation::new();
        token.cancel();
        let cancelled =
            find_bindings(&pdom, || BindingCollector::prefix("").with_cancellation(token.clone(), 1))
                .unwrap();
        assert!(cancelled.cancelled);
        assert!(cancelled.bindings.is_empty());
    }
}
