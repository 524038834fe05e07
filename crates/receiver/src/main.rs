//! # LogTracer Receiver
//!
//! Observador do sender: conecta via WebSocket e exibe cada frame com data e
//! hora (modo texto) ou plota o histórico das chaves escolhidas (`--chart`),
//! opcionalmente gravando as linhas em arquivo.
//!
//! ## Uso
//! ```bash
//! logtracer_receiver                              # URL do config.toml
//! logtracer_receiver ws://192.168.1.50:81         # URL explícita
//! logtracer_receiver --keys temp,humidity         # Só as chaves indicadas
//! logtracer_receiver --save sessao.txt            # Grava as linhas exibidas
//! logtracer_receiver --chart --keys temp          # Gráficos (eframe/egui)
//! ```

mod dashboard;
mod history;
mod log_view;
mod net_thread;

use chrono::Local;
use dashboard::ChartDashboard;
use log_view::{LineFormatter, LogFile};
use logtracer_core::config::AppConfig;
use net_thread::NetEvent;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Config ──
    let config_path = AppConfig::default_path();
    let mut config = AppConfig::load(&config_path);

    if !config_path.exists() {
        let _ = config.save(&config_path);
    }

    apply_args(&mut config, std::env::args().skip(1));
    for problem in config.validate() {
        warn!("Config: {problem}");
    }
    let recv_cfg = config.receiver;

    let mut log_file = if recv_cfg.save_path.is_empty() {
        None
    } else {
        match LogFile::open(Path::new(&recv_cfg.save_path)) {
            Ok(file) => {
                info!("Gravando linhas em {}", recv_cfg.save_path);
                Some(file)
            }
            Err(e) => {
                warn!("Não foi possível abrir {}: {e}", recv_cfg.save_path);
                None
            }
        }
    };

    // ── Thread de rede ──
    let reconnect = Duration::from_secs_f64(recv_cfg.reconnect_secs.clamp(0.1, 60.0));
    let rx = net_thread::spawn_receiver_thread(recv_cfg.url.clone(), reconnect);
    info!("Conectando a {}...", recv_cfg.url);

    if recv_cfg.chart {
        let app = ChartDashboard::new(
            rx,
            recv_cfg.url,
            recv_cfg.keys,
            recv_cfg.history_size,
            log_file,
        );
        if let Err(e) = dashboard::run(app) {
            error!("Falha na janela de gráficos: {e}");
            std::process::exit(1);
        }
        return;
    }

    let formatter = LineFormatter::new(recv_cfg.keys);

    // ── Loop de exibição ──
    for event in rx.iter() {
        match event {
            NetEvent::Connected => info!("Status: conectado"),
            NetEvent::Disconnected(reason) => warn!("Status: desconectado ({reason})"),
            NetEvent::Frame(msg) => {
                let lines = formatter.format(&Local::now().naive_local(), &msg);
                for line in &lines {
                    println!("{line}");
                }
                if let Some(file) = log_file.as_mut() {
                    if let Err(e) = file.append(&lines) {
                        warn!("Erro ao gravar log: {e}");
                    }
                }
            }
        }
    }
}

/// Sobrepõe a config com os argumentos da linha de comando.
fn apply_args(config: &mut AppConfig, mut args: impl Iterator<Item = String>) {
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--keys" => {
                if let Some(list) = args.next() {
                    config.receiver.keys = list
                        .split(',')
                        .map(str::trim)
                        .filter(|k| !k.is_empty())
                        .map(String::from)
                        .collect();
                }
            }
            "--chart" => config.receiver.chart = true,
            "--save" => {
                if let Some(path) = args.next() {
                    config.receiver.save_path = path;
                }
            }
            url if url.starts_with("ws://") || url.starts_with("wss://") => {
                config.receiver.url = url.to_string();
            }
            other => warn!("Argumento ignorado: {other}"),
        }
    }
}
