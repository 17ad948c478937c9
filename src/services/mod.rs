pub mod chart_service;
pub mod database; // Backend connector and per-backend adapters
pub mod derivation;
pub mod dialect;
pub mod inference; // Inference gateway trait, RPC client and cache decorator
pub mod memo_cache; // LRU + TTL memoization for gateway calls
pub mod pipeline;
pub mod query_service;

pub use database::{BackendConnector, ConnectionPurpose, DatabaseError};
pub use derivation::DerivationPipeline;
pub use dialect::DialectAdapter;
pub use inference::{BackendHint, CachedGateway, GatewayError, InferenceGateway, RpcGateway};
pub use pipeline::QueryPipeline;
pub use query_service::QueryExecutor;
