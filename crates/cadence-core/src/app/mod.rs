//! App - reconciliation loop
//!
//! # 主要コンポーネント
//! - **WorkQueue**: `(job_id, action)` の request キュー（job ごとに直列化、backoff 付き再投入）
//! - **ControllerGroup**: ワーカー群（lease → get_job → State::execute → done/retry）と resync ループ
//! - **ControllerConfig**: ワーカー数・retry 設定（TOML）

pub mod config;
pub mod controller;
pub mod retry;
pub mod work_queue;

pub use self::config::{ConfigError, ControllerConfig, RetryConfig};
pub use self::controller::ControllerGroup;
pub use self::retry::RetryPolicy;
pub use self::work_queue::{Request, RetryOutcome, WorkQueue};
