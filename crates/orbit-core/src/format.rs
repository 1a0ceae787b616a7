//! Human-readable renderings used in log lines and watch mode.

use orbit_platform::system_info::SystemSummary;

pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let units = ["B", "KB", "MB", "GB", "TB"];
    let i = (bytes as f64).log(1024.0).floor() as usize;
    let i = i.min(units.len() - 1);
    let val = bytes as f64 / 1024f64.powi(i as i32);
    if i == 0 {
        format!("{} {}", val as u64, units[i])
    } else {
        format!("{:.1} {}", val, units[i])
    }
}

pub fn format_rate(bytes_per_sec: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec.max(0.0).round() as u64))
}

pub fn format_uptime(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let (days, hours, minutes) = (total / 86_400, total % 86_400 / 3_600, total % 3_600 / 60);
    match (days, hours) {
        (0, 0) => format!("{}m", minutes),
        (0, _) => format!("{}h {}m", hours, minutes),
        _ => format!("{}d {}h {}m", days, hours, minutes),
    }
}

/// One-line digest of a snapshot
pub fn summary_line(s: &SystemSummary) -> String {
    format!(
        "{} up {} | cpu {:.1}% | mem {}/{} | disk {:.0}% | net rx {} tx {} | io r {} w {} | load {:.2} {:.2} {:.2} | {} procs",
        s.hostname,
        format_uptime(s.uptime_seconds),
        s.cpu_percent,
        format_bytes(s.memory.used_bytes),
        format_bytes(s.memory.total_bytes),
        s.disk.percent,
        format_rate(s.network.rx_bps),
        format_rate(s.network.tx_bps),
        format_rate(s.disk_io.read_bps),
        format_rate(s.disk_io.write_bps),
        s.load_average[0],
        s.load_average[1],
        s.load_average[2],
        s.process_count,
    )
}
