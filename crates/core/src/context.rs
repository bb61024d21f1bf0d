//! Shared dependency container threaded through the router, orchestrator,
//! and agent tool-use loop.

use std::path::PathBuf;
use std::sync::Arc;

use chainreview_domain::config::Config;
use chainreview_domain::error::Result;
use chainreview_llm::LlmProvider;
use chainreview_mcp::McpManager;
use chainreview_wire::transport::ChainReviewTransport;

use crate::cancel::CancelMap;
use crate::run_store::RunStore;

/// Boxed `AsyncWrite` sinks so `main.rs` can plug in stdout/fd3 or, in
/// tests, an in-memory duplex pipe without a generic parameter threading
/// through every function in this crate.
pub type DynWrite = Box<dyn tokio::io::AsyncWrite + Unpin + Send>;
pub type Transport = ChainReviewTransport<DynWrite, DynWrite>;

#[derive(Clone)]
pub struct Context {
    pub repo_root: PathBuf,
    pub config: Arc<Config>,
    pub llm: Arc<dyn LlmProvider>,
    pub mcp: Arc<McpManager>,
    pub run_store: Arc<RunStore>,
    pub cancel_map: Arc<CancelMap>,
    pub transport: Arc<Transport>,
}

impl Context {
    /// Loads `chainreview.toml` (or defaults), builds the configured LLM
    /// provider, and initializes any configured MCP servers. The transport
    /// is constructed separately by `main.rs` once the output sinks are
    /// known, then passed in here.
    pub async fn bootstrap(repo_root: PathBuf, transport: Arc<Transport>) -> Result<Self> {
        let config = Config::load(&repo_root);
        let llm: Arc<dyn LlmProvider> = Arc::from(chainreview_llm::build_provider(&config.llm)?);
        let mcp = Arc::new(McpManager::from_config(&config.mcp).await);

        Ok(Self {
            repo_root,
            config: Arc::new(config),
            llm,
            mcp,
            run_store: Arc::new(RunStore::new()),
            cancel_map: Arc::new(CancelMap::new()),
            transport,
        })
    }
}
