pub mod opensearch;

pub use opensearch::{ClusterInfo, OpenSearchConfig, OpenSearchStore};
