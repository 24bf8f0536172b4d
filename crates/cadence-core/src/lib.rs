//! cadence-core
//!
//! Lifecycle controller for batch jobs.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, phase, action, job, task, errors）
//! - **policy**: PhasePolicy（snapshot → 次の phase を決める純粋関数）
//! - **state**: phase × action の遷移表と `State::execute`
//! - **ports**: 抽象化レイヤー（JobStore, JobReconciler, Clock, IdGenerator）
//! - **impls**: 実装（InMemoryCluster など開発・テスト用）
//! - **app**: reconciliation loop（WorkQueue, ControllerGroup, config）
//! - **observability**: status views

pub mod domain;
pub mod policy;
pub mod state;
pub mod ports;
pub mod impls;
pub mod app;
pub mod observability;

pub use domain::{Action, ControllerError, JobId, JobInfo, JobSpec, JobStatus, Phase};
pub use policy::PhasePolicy;
pub use state::{Direction, State, Transition};
