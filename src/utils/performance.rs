use chrono::Utc;
use std::{fs::OpenOptions, io::Write, path::Path, time::Duration};
use sysinfo::System;
use tokio::time;
use log::{info, error};

use crate::server::hub::{HubStats, SignalingHub};

pub const HEADER: &str = "# Timestamp, Online_Users, Connections, Active_Calls, CPU_Usage";

pub fn format_line(timestamp: &str, stats: &HubStats, cpu_usage: f32) -> String {
    format!(
        "{}, {}, {}, {}, {:.1}%",
        timestamp, stats.online_users, stats.connections, stats.active_calls, cpu_usage
    )
}

pub async fn start_performance_logger(hub: SignalingHub, log_path: &str, every: Duration) {
    if let Some(parent) = Path::new(log_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                error!("[PERF] Unable to create directory {:?}: {}", parent, e);
                return;
            }
        }
    }

    let mut file = match OpenOptions::new().create(true).append(true).open(log_path) {
        Ok(f) => f,
        Err(e) => {
            error!("[PERF] Unable to open performance log file '{}': {}", log_path, e);
            return;
        }
    };

    // Write header if file is empty
    if file.metadata().map(|m| m.len()).unwrap_or(0) == 0 {
        if let Err(e) = writeln!(file, "# Parla Server Performance Log\n{}", HEADER) {
            error!("[PERF] Failed to write header to performance log: {}", e);
            return;
        }
        info!("[PERF] Performance log initialized: {}", log_path);
    }

    let mut system = System::new();
    loop {
        system.refresh_cpu();
        let cpus = system.cpus();
        let cpu_usage = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
        };
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
        let stats = hub.stats().await;

        info!(
            "[PERF] Online users: {}, connections: {}, calls: {}, CPU: {:.1}%",
            stats.online_users, stats.connections, stats.active_calls, cpu_usage
        );

        if let Err(e) = writeln!(file, "{}", format_line(&timestamp, &stats, cpu_usage)) {
            error!("[PERF] Failed to write to performance log: {}", e);
        } else if let Err(e) = file.flush() {
            error!("[PERF] Failed to flush performance log: {}", e);
        }

        time::sleep(every).await;
    }
}
