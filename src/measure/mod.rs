mod dispatch_latency;

pub use dispatch_latency::{DispatchKind, DispatchLatency, LatencyStats};
