pub mod health_monitor;

pub use health_monitor::{HealthMonitor, HealthMonitorConfig, HealthProbe, HttpHealthProbe};

#[cfg(test)]
pub use health_monitor::MockHealthProbe;
