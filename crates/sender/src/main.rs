//! # LogTracer Sender
//!
//! Acumula amostras rotuladas e as transmite a cada intervalo, em JSON,
//! para todos os observadores conectados via WebSocket.
//!
//! ## Uso
//! ```bash
//! logtracer_sender              # Normal (amostras do host incluídas)
//! logtracer_sender --no-host    # Só o ciclo de flush, sem amostras do host
//! ```

use logtracer_core::config::AppConfig;
use logtracer_sender::monitor::HostMonitor;
use logtracer_sender::network::{Credentials, HostNetwork};
use logtracer_sender::service::{Millis, ServiceOptions, TelemetryService};
use logtracer_sender::transport::{ServerOptions, WsBroadcastServer};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Pausa entre voltas do loop principal.
const LOOP_SLEEP: Duration = Duration::from_millis(10);

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = AppConfig::default_path();
    let config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }
    for problem in config.validate() {
        warn!("Config: {problem}");
    }

    let sample_host = config.sender.sample_host && !std::env::args().any(|a| a == "--no-host");

    // ── Serviço ──
    let server = WsBroadcastServer::new(ServerOptions {
        bind_ip: config.sender.bind_ip.clone(),
        max_clients: config.sender.max_clients,
        handshake_timeout: Duration::from_millis(config.sender.handshake_timeout_ms),
        max_backlog_bytes: config.sender.max_backlog_bytes,
    });
    let network = HostNetwork::new(config.network.probe_addr.clone());
    let mut service = TelemetryService::new(network, server, ServiceOptions::from(&config));

    let credentials = Credentials {
        ssid: config.network.ssid.clone(),
        password: config.network.password.clone(),
    };
    info!("Aguardando conectividade de rede...");
    if let Err(e) = service.initialize(&credentials) {
        error!("Falha ao iniciar o serviço: {e}");
        std::process::exit(1);
    }

    if !config.network.static_ip.is_empty() {
        let gateway = Some(config.network.gateway.as_str()).filter(|s| !s.is_empty());
        let subnet = Some(config.network.subnet.as_str()).filter(|s| !s.is_empty());
        // Falha já logada pelo serviço; segue com o endereço atual
        let _ = service.fix_ip_address(&config.network.static_ip, gateway, subnet);
    }

    // ── Banner ──
    let address = service
        .current_address()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "?".into());
    println!();
    println!("══════════════════════════════════════════════");
    println!("   📡 LOGTRACER SENDER – ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  Endereço:  ws://{address}:{}", service.channel());
    println!("  Intervalo: {} ms", config.sender.interval_ms);
    println!("  Buffer:    {} bytes", service.buffer().capacity());
    println!("  Host:      {}", if sample_host { "sim" } else { "não" });
    println!("══════════════════════════════════════════════");
    println!();

    // ── Loop principal ──
    let mut monitor = sample_host.then(HostMonitor::new);
    let started = Instant::now();
    let mut last_sample: Option<Millis> = None;

    loop {
        let now = started.elapsed().as_millis() as Millis;

        if let Some(monitor) = monitor.as_mut() {
            let due = last_sample
                .is_none_or(|t| now.saturating_sub(t) >= config.sender.sample_interval_ms);
            if due {
                last_sample = Some(now);
                for sample in monitor.collect().samples() {
                    if let Err(e) = service.record(sample.category, sample.key, sample.value) {
                        warn!("Amostra descartada: {e}");
                    }
                }
            }
        }

        service.tick(now);
        std::thread::sleep(LOOP_SLEEP);
    }
}
