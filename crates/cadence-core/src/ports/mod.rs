//! Ports - 抽象化レイヤー
//!
//! State machine が依存する外部操作（task の起動・停止、status の永続化）と、
//! 時刻・ID 生成を trait として定義します。実装は `impls` にあります。

pub mod clock;
pub mod id_generator;
pub mod job_store;
pub mod reconciler;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::job_store::JobStore;
pub use self::reconciler::JobReconciler;
