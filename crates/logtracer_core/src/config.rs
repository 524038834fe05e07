//! Configuração unificada via TOML.
//!
//! Um único `config.toml` ao lado do executável, compartilhado pelo sender
//! e pelo receiver.

use crate::buffer::DEFAULT_CAPACITY;
use crate::protocol::EMPTY_DOCUMENT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Configuração do Sender (dispositivo que acumula e transmite).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Porta do servidor WebSocket
    pub port: u16,
    /// IP local para bind
    pub bind_ip: String,
    /// Intervalo entre flushes (ms)
    pub interval_ms: u64,
    /// Tamanho máximo do documento serializado (bytes)
    pub buffer_capacity: usize,
    /// Máximo de observadores simultâneos
    pub max_clients: usize,
    /// Tempo máximo do handshake WebSocket (ms)
    pub handshake_timeout_ms: u64,
    /// Bytes pendentes por cliente lento antes de descartar frames
    pub max_backlog_bytes: usize,
    /// Registrar amostras do próprio host
    pub sample_host: bool,
    /// Intervalo entre amostras do host (ms)
    pub sample_interval_ms: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            port: 81,
            bind_ip: "0.0.0.0".into(),
            interval_ms: 2000,
            buffer_capacity: DEFAULT_CAPACITY,
            max_clients: 5,
            handshake_timeout_ms: 500,
            max_backlog_bytes: 64 * 1024,
            sample_host: true,
            sample_interval_ms: 1000,
        }
    }
}

/// Configuração de rede (associação e IP estático).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub ssid: String,
    pub password: String,
    /// Espera entre verificações de conectividade (ms)
    pub join_poll_ms: u64,
    /// Endereço usado para descobrir a rota local (nenhum pacote é enviado)
    pub probe_addr: String,
    /// IP estático (vazio = manter o atual)
    pub static_ip: String,
    /// Gateway (vazio = manter o atual)
    pub gateway: String,
    /// Máscara de sub-rede (vazio = manter a atual)
    pub subnet: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
            join_poll_ms: 500,
            probe_addr: "8.8.8.8:80".into(),
            static_ip: String::new(),
            gateway: String::new(),
            subnet: String::new(),
        }
    }
}

/// Configuração do Receiver (observador em texto).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// URL do sender, ex: `ws://192.168.1.50:81`
    pub url: String,
    /// Chaves exibidas (vazio = frame bruto)
    pub keys: Vec<String>,
    /// Arquivo de log (vazio = desativado)
    pub save_path: String,
    /// Espera antes de reconectar (segundos)
    pub reconnect_secs: f64,
    /// Abrir o painel de gráficos em vez do texto
    pub chart: bool,
    /// Pontos mantidos por chave nos gráficos
    pub history_size: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            url: "ws://192.168.1.50:81".into(),
            keys: Vec::new(),
            save_path: String::new(),
            reconnect_secs: 2.0,
            chart: false,
            history_size: 120,
        }
    }
}

/// Configuração raiz do aplicativo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sender: SenderConfig,
    pub network: NetworkConfig,
    pub receiver: ReceiverConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self).map_err(|e| e.to_string())?;
        std::fs::write(path, content).map_err(|e| e.to_string())?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.sender.interval_ms == 0 {
            errors.push("Intervalo do sender não pode ser 0".into());
        }
        if self.sender.buffer_capacity <= EMPTY_DOCUMENT.len() {
            errors.push(format!(
                "Capacidade do buffer muito pequena: {} (mínimo {})",
                self.sender.buffer_capacity,
                EMPTY_DOCUMENT.len() + 1
            ));
        }
        // Um frame maior que o backlog nunca seria enviado
        if self.sender.max_backlog_bytes <= self.sender.buffer_capacity {
            errors.push(format!(
                "max_backlog_bytes ({}) deve ser maior que buffer_capacity ({})",
                self.sender.max_backlog_bytes, self.sender.buffer_capacity
            ));
        }
        if self.sender.max_clients == 0 || self.sender.max_clients > u8::MAX as usize {
            errors.push(format!(
                "max_clients inválido: {} (1–255)",
                self.sender.max_clients
            ));
        }
        if !self.network.static_ip.is_empty()
            && self.network.static_ip.parse::<std::net::Ipv4Addr>().is_err()
        {
            errors.push(format!("IP estático inválido: {}", self.network.static_ip));
        }
        if !self.receiver.url.starts_with("ws://") && !self.receiver.url.starts_with("wss://") {
            errors.push(format!("URL do receiver inválida: {}", self.receiver.url));
        }
        if self.receiver.reconnect_secs < 0.1 || self.receiver.reconnect_secs > 60.0 {
            errors.push(format!(
                "Intervalo de reconexão inválido: {} (0.1–60.0)",
                self.receiver.reconnect_secs
            ));
        }
        if self.receiver.history_size == 0 {
            errors.push("history_size não pode ser 0".into());
        }

        errors
    }
}
