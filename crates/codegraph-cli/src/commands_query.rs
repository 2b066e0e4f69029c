//! `codegraph query`, `status`, `repos` and `serve`.

use codegraph_core::{CodegraphConfig, GraphStore};
use codegraph_engine::{ContextService, Request};
use std::sync::Arc;

fn service(config: &CodegraphConfig) -> anyhow::Result<ContextService> {
    let store: Arc<dyn GraphStore> = crate::open_store(config)?;
    Ok(ContextService::new(store, config.clone()))
}

/// Answer one request and pretty-print the result.
pub(crate) fn cmd_query(config: &CodegraphConfig, request: Request) -> anyhow::Result<()> {
    let response = service(config)?.handle(request);
    match (response.ok, response.result, response.error) {
        (true, Some(result), _) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        (_, _, error) => anyhow::bail!(error.unwrap_or_else(|| "request failed".into())),
    }
}

pub(crate) fn cmd_serve(config: &CodegraphConfig) -> anyhow::Result<()> {
    let service = service(config)?;
    tracing::info!(
        "codegraph context service ready (stdin mode, backend: {}, db: {})",
        service.backend_type(),
        config.storage.db_path
    );
    crate::commands_index::serve_stdin(&service)
}
