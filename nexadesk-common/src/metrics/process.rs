use std::sync::{Mutex, PoisonError};
use std::time::{Instant, SystemTime};

use sysinfo::{Pid, System};

use super::registry::MetricSpec;

const RESIDENT_MEMORY: &str = "process_resident_memory_bytes";
const VIRTUAL_MEMORY: &str = "process_virtual_memory_bytes";
const CPU_USAGE: &str = "process_cpu_usage_percent";
const START_TIME: &str = "process_start_time_seconds";
const UPTIME: &str = "process_uptime_seconds";

/// Default runtime metrics of the current process, sampled at scrape time.
pub(crate) struct ProcessCollector {
    namespace: String,
    pid: Option<Pid>,
    system: Mutex<System>,
    started: Instant,
    start_time: f64,
}

impl ProcessCollector {
    pub(crate) fn specs(namespace: &str) -> Vec<MetricSpec> {
        vec![
            MetricSpec::gauge(
                format!("{namespace}{RESIDENT_MEMORY}"),
                "Resident memory size in bytes.",
            ),
            MetricSpec::gauge(
                format!("{namespace}{VIRTUAL_MEMORY}"),
                "Virtual memory size in bytes.",
            ),
            MetricSpec::gauge(
                format!("{namespace}{CPU_USAGE}"),
                "CPU usage of the process since the previous scrape, in percent.",
            ),
            MetricSpec::gauge(
                format!("{namespace}{START_TIME}"),
                "Start time of the process since unix epoch in seconds.",
            ),
            MetricSpec::gauge(
                format!("{namespace}{UPTIME}"),
                "Time since the metrics registry was built, in seconds.",
            ),
        ]
    }

    pub(crate) fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_owned(),
            pid: sysinfo::get_current_pid().ok(),
            system: Mutex::new(System::new()),
            started: Instant::now(),
            start_time: get_current_timestamp_seconds(),
        }
    }

    /// Current values keyed by full metric name. Memory and CPU are skipped
    /// when the platform does not expose them.
    pub(crate) fn collect(&self) -> Vec<(String, f64)> {
        let ns = &self.namespace;
        let mut values = vec![
            (format!("{ns}{START_TIME}"), self.start_time),
            (
                format!("{ns}{UPTIME}"),
                self.started.elapsed().as_secs_f64(),
            ),
        ];

        let Some(pid) = self.pid else {
            return values;
        };
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        if !system.refresh_process(pid) {
            return values;
        }
        if let Some(process) = system.process(pid) {
            values.push((format!("{ns}{RESIDENT_MEMORY}"), process.memory() as f64));
            values.push((
                format!("{ns}{VIRTUAL_MEMORY}"),
                process.virtual_memory() as f64,
            ));
            values.push((format!("{ns}{CPU_USAGE}"), f64::from(process.cpu_usage())));
            if process.start_time() > 0 {
                values[0].1 = process.start_time() as f64;
            }
        }
        values
    }
}

/// Returns the number of seconds since the Unix epoch, to use in prom gauges.
/// Saturates to zero if the system time is set before epoch.
fn get_current_timestamp_seconds() -> f64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specs_are_namespaced() {
        let names: Vec<String> = ProcessCollector::specs("desk_")
            .iter()
            .map(|spec| spec.name().to_owned())
            .collect();
        assert!(names.iter().all(|name| name.starts_with("desk_process_")));
        assert_eq!(names.len(), 5);
    }

    #[test]
    fn collect_always_reports_uptime() {
        let collector = ProcessCollector::new("desk_");
        let values = collector.collect();

        let uptime = values
            .iter()
            .find(|(name, _)| name == "desk_process_uptime_seconds")
            .map(|(_, value)| *value)
            .unwrap();
        assert!(uptime >= 0.0);
        assert!(values
            .iter()
            .any(|(name, _)| name == "desk_process_start_time_seconds"));
    }
}
