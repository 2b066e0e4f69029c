//! Symbol lookups answered from committed store state.

use codegraph_core::{CodegraphError, GraphQuery, GraphStore};
use codegraph_index::{SymbolEntry, SymbolIndex};

/// [`SymbolIndex`] over a [`GraphStore`].
pub struct StoreSymbols<'a> {
    store: &'a dyn GraphStore,
}

impl<'a> StoreSymbols<'a> {
    pub fn new(store: &'a dyn GraphStore) -> Self {
        Self { store }
    }

    fn lookup(&self, query: GraphQuery) -> Result<Vec<SymbolEntry>, CodegraphError> {
        Ok(self
            .store
            .query_nodes(&query)?
            .iter()
            .map(SymbolEntry::from)
            .collect())
    }
}

impl SymbolIndex for StoreSymbols<'_> {
    fn by_qualified_name(&self, qualified_name: &str) -> Result<Vec<SymbolEntry>, CodegraphError> {
        self.lookup(GraphQuery::NodesByQualifiedName(qualified_name.to_string()))
    }

    fn by_name(&self, name: &str) -> Result<Vec<SymbolEntry>, CodegraphError> {
        self.lookup(GraphQuery::NodesByName(name.to_string()))
    }
}
