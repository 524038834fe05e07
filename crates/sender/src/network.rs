//! Conectividade de rede – associação e IP estático.
//!
//! No dispositivo embarcado isso é o Wi-Fi; no host a associação pertence
//! ao sistema operacional e [`HostNetwork`] apenas verifica se existe uma
//! rota utilizável.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Erros de rede.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Operação não suportada nesta plataforma: {0}")]
    Unsupported(&'static str),

    #[error("Endereço inválido: {0}")]
    InvalidAddress(String),

    #[error("Configuração de IP recusada")]
    ConfigRejected,

    #[error("Erro de I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Credenciais da rede a associar.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub ssid: String,
    pub password: String,
}

/// Capacidade "estabelecer conectividade" consumida pelo serviço.
pub trait Reachability {
    /// Inicia a associação. Não espera a conclusão.
    fn join(&mut self, ssid: &str, credential: &str) -> Result<(), NetworkError>;

    fn is_reachable(&mut self) -> bool;

    fn current_address(&self) -> Option<IpAddr>;

    fn gateway(&self) -> Option<Ipv4Addr>;

    fn subnet_mask(&self) -> Option<Ipv4Addr>;

    fn configure_static_address(
        &mut self,
        address: Ipv4Addr,
        gateway: Ipv4Addr,
        mask: Ipv4Addr,
    ) -> Result<(), NetworkError>;
}

/// Bloqueia até a rede estar acessível. Sem timeout: sem rede o
/// dispositivo não tem trabalho útil.
pub fn wait_for_reachability<N: Reachability + ?Sized>(
    net: &mut N,
    credentials: &Credentials,
    poll: Duration,
) -> Result<Option<IpAddr>, NetworkError> {
    net.join(&credentials.ssid, &credentials.password)?;

    let mut attempts: u64 = 0;
    while !net.is_reachable() {
        attempts += 1;
        debug!("Aguardando rede... (tentativa {attempts})");
        std::thread::sleep(poll);
    }

    let address = net.current_address();
    match address {
        Some(ip) => info!("Conectado à rede. Endereço IP: {ip}"),
        None => info!("Conectado à rede (endereço desconhecido)"),
    }
    Ok(address)
}

/// Converte `"a.b.c.d"` em [`Ipv4Addr`].
pub fn parse_ipv4(text: &str) -> Result<Ipv4Addr, NetworkError> {
    text.trim()
        .parse()
        .map_err(|_| NetworkError::InvalidAddress(text.to_owned()))
}

// ──────────────────────────────────────────────
// Host
// ──────────────────────────────────────────────

/// Conectividade do host: a rede já é gerenciada pelo SO.
pub struct HostNetwork {
    probe_addr: String,
    address: Option<IpAddr>,
}

impl HostNetwork {
    pub fn new(probe_addr: impl Into<String>) -> Self {
        Self {
            probe_addr: probe_addr.into(),
            address: None,
        }
    }

    /// Descobre o IP local da rota padrão. `connect` em UDP não envia pacotes.
    fn probe(&self) -> std::io::Result<IpAddr> {
        let sock = UdpSocket::bind("0.0.0.0:0")?;
        sock.connect(&self.probe_addr)?;
        Ok(sock.local_addr()?.ip())
    }
}

impl Reachability for HostNetwork {
    fn join(&mut self, ssid: &str, _credential: &str) -> Result<(), NetworkError> {
        if !ssid.is_empty() {
            info!("SSID \"{ssid}\" ignorado: associação gerenciada pelo sistema operacional");
        }
        Ok(())
    }

    fn is_reachable(&mut self) -> bool {
        match self.probe() {
            Ok(ip) if !ip.is_unspecified() && !ip.is_loopback() => {
                self.address = Some(ip);
                true
            }
            Ok(ip) => {
                debug!("Rota local sem endereço utilizável ({ip})");
                false
            }
            Err(e) => {
                debug!("Sem rota para {}: {e}", self.probe_addr);
                false
            }
        }
    }

    fn current_address(&self) -> Option<IpAddr> {
        self.address
    }

    fn gateway(&self) -> Option<Ipv4Addr> {
        None
    }

    fn subnet_mask(&self) -> Option<Ipv4Addr> {
        None
    }

    fn configure_static_address(
        &mut self,
        address: Ipv4Addr,
        _gateway: Ipv4Addr,
        _mask: Ipv4Addr,
    ) -> Result<(), NetworkError> {
        warn!("IP estático {address} não pode ser aplicado pelo processo no host");
        Err(NetworkError::Unsupported("IP estático no host"))
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
