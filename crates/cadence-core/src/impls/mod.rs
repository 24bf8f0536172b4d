//! Impls - port の実装
//!
//! - **InMemoryCluster**: JobStore + JobReconciler（開発・テスト用）

pub mod inmem_cluster;

pub use self::inmem_cluster::InMemoryCluster;
