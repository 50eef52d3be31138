//! Transaction analysis, chain statistics, composite reports and data sinks.

pub mod blocks;
pub mod chain;
pub mod composite;
pub mod engine;
mod fields;
pub mod mempool;
pub mod reporter;
pub mod script;
pub mod sink;
pub mod stats;
pub mod tx;

pub use blocks::{connection_info, detailed_block_info, search_blocks, BlockFilter};
pub use chain::{chain_tips, chain_tx_stats, current_difficulty, utxo_set_info};
pub use composite::{blockchain_status, comprehensive_analysis, Section};
pub use engine::{sample_heights, AnalyticsEngine, EngineConfig, FeePoint};
pub use mempool::{mempool_ancestors, mempool_descendants, mempool_entry};
pub use tx::TransactionAnalyzer;
