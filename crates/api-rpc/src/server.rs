//! JSON-RPC Server
//!
//! Serves JSON-RPC 2.0 over HTTP and WebSocket on one TCP port.
//! Subscriptions need the WebSocket transport.

use crate::handler::RpcHandler;
use crate::types::{JobRequest, ListJobsRequest, StartRequest};
use harvest_core::application::ExtractionService;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9630;

/// Name of the progress notification
pub const PROGRESS_NOTIFICATION: &str = "jobs.progress";

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, service: Arc<ExtractionService>) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(service)),
        }
    }

    fn build_module(&self) -> Result<RpcModule<()>, String> {
        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("extract.start.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: StartRequest = params.parse()?;
                    handler.start(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("jobs.get.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: JobRequest = params.parse()?;
                    handler.get(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("jobs.list.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    // Accept both `{}` and no params at all
                    let req: ListJobsRequest = if params.is_object() {
                        params.parse()?
                    } else {
                        ListJobsRequest::default()
                    };
                    handler.list(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_subscription(
                "jobs.subscribe.v1",
                PROGRESS_NOTIFICATION,
                "jobs.unsubscribe.v1",
                move |params, pending, _, _| {
                    let handler = handler.clone();
                    async move {
                        let req: JobRequest = match params.parse() {
                            Ok(req) => req,
                            Err(e) => {
                                pending.reject(e).await;
                                return Ok(());
                            }
                        };
                        handler.subscribe(req, pending).await
                    }
                },
            )
            .map_err(|e| e.to_string())?;

        Ok(module)
    }

    /// Start the JSON-RPC server
    ///
    /// Port 0 binds an ephemeral port; the bound address is returned.
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle), String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| format!("Failed to read bound address: {}", e))?;

        let module = self.build_module()?;
        let handle = server.start(module);

        info!(addr = %local_addr, "JSON-RPC server started (HTTP + WebSocket)");
        Ok((local_addr, handle))
    }
}
