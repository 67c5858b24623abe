//! chainscan-evm: EVM node client, fetch jobs and the sync orchestrator.

pub mod builder;
pub mod fetch;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod node;
pub mod pool;
pub mod rpc;
pub mod sync;

pub use builder::SyncBuilder;
pub use fetch::{ContractInfo, ContractInfoCache, FetchConfig, FetchJob};
pub use node::{CallFrame, HeadFeed, NodeBlock, NodeClient};
pub use pool::{JobHandle, WorkerPool};
pub use rpc::HttpNode;
pub use sync::{SyncOrchestrator, SyncReport};
