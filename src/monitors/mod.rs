pub mod system;

pub use system::{LocalSampler, MetricsSource, ResourceUsage, SystemSampler};
