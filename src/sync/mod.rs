pub mod cache;
pub mod chunked;
pub mod engine;
pub mod locks;
pub mod reconcile;
pub mod status;
pub mod writer;

pub use cache::WriteCache;
pub use chunked::{apply_chunked, BatchOperation, ChunkedOperationResult, CHUNK_SIZE};
pub use engine::{SyncEngine, SyncOutcome};
pub use locks::ClusterLocks;
pub use reconcile::{diff_edges, diff_nodes, reconcile, EdgeDiff, NodeDiff, ReconcileOutcome};
pub use status::{cluster_hash, digest_hashes};
