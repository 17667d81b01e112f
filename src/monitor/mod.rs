//! Resource limit enforcement for monitored executions.
//!
//! The monitor samples process usage on a dedicated task, publishes usage
//! snapshots and early warnings on the event bus, and short-circuits the
//! guarded execution on the first limit violation. A `None` limit on any
//! dimension disables checks for that dimension entirely.
//!
//! # Example
//!
//! ```rust,no_run
//! use pipewright::monitor::{Monitored, ResourceLimits, ResourceMonitor};
//!
//! # async fn example() {
//! let monitor = ResourceMonitor::unobserved();
//! let limits = ResourceLimits::unlimited().with_max_wall_time_ms(5_000);
//!
//! match monitor.run("exec-1", limits, async { do_work().await }).await {
//!     Monitored::Completed { value, stats } => {
//!         println!("done: {value:?}, wall {} ms", stats.usage.wall_ms);
//!     }
//!     Monitored::Violated { violation, .. } => eprintln!("cut short: {violation}"),
//! }
//! # }
//! # async fn do_work() -> u32 { 0 }
//! ```

pub mod limits;
pub mod monitor;
pub mod sampler;

pub use limits::{
    ResourceEfficiency, ResourceKind, ResourceLimits, ResourceUsage, UsageStats, Violation,
};
pub use monitor::{Monitored, MonitorConfig, ResourceMonitor};
pub use sampler::{NullSampler, ProcSampler, Sample, UsageSampler};
