//! Host Monitor – amostras do próprio host via `sysinfo`.
//!
//! Alimenta o buffer do serviço quando o sender roda num PC em vez do
//! dispositivo: categoria `System` com uso de CPU, RAM, temperatura e uptime.

use logtracer_core::types::Sample;
use sysinfo::{Components, CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tracing::debug;

/// Categoria usada por todas as amostras do host.
pub const HOST_CATEGORY: &str = "System";

/// Leitura instantânea do host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostSnapshot {
    /// Uso total da CPU (0–100%)
    pub cpu_usage: f32,
    /// Temperatura da CPU (°C), 0 se indisponível
    pub cpu_temp: f32,
    /// RAM usada (0–100%)
    pub ram_used: f32,
    /// Segundos desde o boot
    pub uptime_secs: u64,
}

impl HostSnapshot {
    /// Converte a leitura em amostras, na ordem em que vão para o buffer.
    pub fn samples(&self) -> Vec<Sample> {
        let mut samples = vec![
            Sample::new(HOST_CATEGORY, "cpu_usage", self.cpu_usage),
            Sample::new(HOST_CATEGORY, "ram_used", self.ram_used),
        ];
        if self.cpu_temp > 0.0 {
            samples.push(Sample::new(HOST_CATEGORY, "cpu_temp", self.cpu_temp));
        }
        samples.push(Sample::new(
            HOST_CATEGORY,
            "uptime",
            format_uptime(self.uptime_secs),
        ));
        samples
    }
}

/// `"3d 04h 12m"`, `"12h 03m"` ou `"7m"`.
pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    if days > 0 {
        format!("{days}d {hours:02}h {minutes:02}m")
    } else if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else {
        format!("{minutes}m")
    }
}

/// Monitor de hardware do host.
pub struct HostMonitor {
    sys: System,
    components: Components,
}

impl HostMonitor {
    pub fn new() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        Self {
            sys,
            components: Components::new_with_refreshed_list(),
        }
    }

    /// Atualiza os contadores e retorna a leitura atual.
    pub fn collect(&mut self) -> HostSnapshot {
        self.sys.refresh_cpu_all();
        self.sys.refresh_memory();
        self.components.refresh(true);

        let total = self.sys.total_memory() as f64;
        let used = self.sys.used_memory() as f64;
        let ram_used = if total > 0.0 {
            (used / total * 100.0) as f32
        } else {
            0.0
        };

        let snapshot = HostSnapshot {
            cpu_usage: self.sys.global_cpu_usage(),
            cpu_temp: self.cpu_temp_from_components(),
            ram_used,
            uptime_secs: System::uptime(),
        };
        debug!("Host: {snapshot:?}");
        snapshot
    }

    /// Maior temperatura plausível entre os sensores de CPU.
    fn cpu_temp_from_components(&self) -> f32 {
        let mut temp = 0.0_f32;
        for comp in self.components.iter() {
            let label = comp.label().to_lowercase();
            if label.contains("cpu")
                || label.contains("tctl")
                || label.contains("tdie")
                || label.contains("package")
                || label.contains("core")
            {
                if let Some(t) = comp.temperature() {
                    if t > temp && t < 150.0 {
                        temp = t;
                    }
                }
            }
        }
        temp
    }
}
