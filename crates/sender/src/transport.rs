//! Transporte de broadcast – servidor WebSocket sem threads.
//!
//! Tudo acontece dentro de [`BroadcastTransport::pump_events`] e
//! [`BroadcastTransport::broadcast_text`], chamados pelo loop do serviço.
//! Listener, handshakes e clientes são não bloqueantes: um handshake
//! incompleto é retomado no próximo `pump_events` e descartado depois de
//! `handshake_timeout`.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tungstenite::handshake::server::{NoCallback, ServerHandshake};
use tungstenite::handshake::{HandshakeError, MidHandshake};
use tungstenite::protocol::WebSocketConfig;
use tungstenite::{Message, WebSocket};

/// Handle de conexão: índice do slot ocupado pelo cliente.
pub type ClientId = u8;

/// Evento de ciclo de vida de uma conexão.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
}

/// Recebe eventos de conexão, de forma síncrona, dentro de `pump_events`.
pub trait ConnectionObserver {
    fn on_event(&mut self, client: ClientId, event: ConnectionEvent);
}

impl<F> ConnectionObserver for F
where
    F: FnMut(ClientId, ConnectionEvent),
{
    fn on_event(&mut self, client: ClientId, event: ConnectionEvent) {
        self(client, event)
    }
}

/// Erros do transporte.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Falha ao bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Erro de I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Canal de texto multi-cliente consumido pelo serviço.
pub trait BroadcastTransport {
    /// Abre (ou reabre) o canal na porta indicada.
    fn open(&mut self, port: u16) -> Result<(), TransportError>;

    /// Fecha o canal e derruba todas as conexões.
    fn close(&mut self);

    /// Registra o observador de eventos, substituindo o anterior.
    fn on_connection_event(&mut self, observer: Box<dyn ConnectionObserver>);

    /// Processa conexões pendentes e entrega os eventos ao observador.
    fn pump_events(&mut self);

    /// Envia o texto a todas as conexões abertas. Retorna quantas receberam.
    fn broadcast_text(&mut self, payload: &str) -> usize;

    fn local_addr(&self) -> Option<SocketAddr>;
}

// ──────────────────────────────────────────────
// Servidor WebSocket
// ──────────────────────────────────────────────

/// Parâmetros do servidor.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub bind_ip: String,
    pub max_clients: usize,
    pub handshake_timeout: Duration,
    /// Bytes ainda não enviados que um cliente pode acumular; acima disso
    /// os frames novos são descartados para ele
    pub max_backlog_bytes: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            bind_ip: "0.0.0.0".into(),
            max_clients: 5,
            handshake_timeout: Duration::from_millis(500),
            max_backlog_bytes: 64 * 1024,
        }
    }
}

type Handshake = MidHandshake<ServerHandshake<TcpStream, NoCallback>>;

/// Conexão aceita cujo upgrade HTTP ainda não terminou.
struct PendingHandshake {
    handshake: Handshake,
    peer: SocketAddr,
    started: Instant,
}

struct Client {
    ws: WebSocket<TcpStream>,
    peer: SocketAddr,
}

/// Servidor WebSocket baseado em `tungstenite`.
pub struct WsBroadcastServer {
    options: ServerOptions,
    listener: Option<TcpListener>,
    local_addr: Option<SocketAddr>,
    slots: Vec<Option<Client>>,
    handshakes: Vec<PendingHandshake>,
    observer: Option<Box<dyn ConnectionObserver>>,
    /// Eventos aguardando o próximo `pump_events`
    pending: Vec<(ClientId, ConnectionEvent)>,
}

impl WsBroadcastServer {
    pub fn new(options: ServerOptions) -> Self {
        let slots = (0..options.max_clients.min(ClientId::MAX as usize + 1))
            .map(|_| None)
            .collect();
        Self {
            options,
            listener: None,
            local_addr: None,
            slots,
            handshakes: Vec::new(),
            observer: None,
            pending: Vec::new(),
        }
    }

    /// Número de conexões abertas.
    pub fn client_count(&self) -> usize {
        self.slots.iter().filter(|c| c.is_some()).count()
    }

    /// Número de handshakes em andamento.
    pub fn handshake_count(&self) -> usize {
        self.handshakes.len()
    }

    fn ws_config(&self) -> WebSocketConfig {
        // Escrita imediata; o buffer só guarda o que o socket não aceitou
        let mut config = WebSocketConfig::default();
        config.write_buffer_size = 0;
        config.max_write_buffer_size = self.options.max_backlog_bytes.max(1);
        config
    }

    fn accept_pending(&mut self) {
        let Some(listener) = self.listener.as_ref() else {
            return;
        };

        let mut accepted = Vec::new();
        loop {
            match listener.accept() {
                Ok(conn) => accepted.push(conn),
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("Erro ao aceitar conexão: {e}");
                    break;
                }
            }
        }

        for (stream, peer) in accepted {
            self.admit(stream, peer);
        }
    }

    /// Inicia o handshake. Handshakes em andamento contam no limite de
    /// clientes, então quem chega com tudo ocupado é recusado aqui.
    fn admit(&mut self, stream: TcpStream, peer: SocketAddr) {
        if self.client_count() + self.handshakes.len() >= self.slots.len() {
            warn!(
                "Conexão de {peer} recusada: limite de {} clientes",
                self.slots.len()
            );
            return;
        }

        if let Err(e) = stream.set_nonblocking(true) {
            warn!("Conexão de {peer} descartada: {e}");
            return;
        }
        let started = Instant::now();
        let result = tungstenite::accept_with_config(stream, Some(self.ws_config()));
        self.resolve_handshake(result, peer, started);
    }

    /// Retoma os handshakes interrompidos e descarta os que expiraram.
    fn advance_handshakes(&mut self) {
        let timeout = self.options.handshake_timeout;
        for pending in std::mem::take(&mut self.handshakes) {
            if pending.started.elapsed() >= timeout {
                warn!(
                    "Handshake com {} expirou após {} ms",
                    pending.peer,
                    timeout.as_millis()
                );
                continue;
            }
            let result = pending.handshake.handshake();
            self.resolve_handshake(result, pending.peer, pending.started);
        }
    }

    fn resolve_handshake(
        &mut self,
        result: Result<WebSocket<TcpStream>, HandshakeError<ServerHandshake<TcpStream, NoCallback>>>,
        peer: SocketAddr,
        started: Instant,
    ) {
        match result {
            Ok(ws) => self.install(ws, peer),
            Err(HandshakeError::Interrupted(handshake)) => self.handshakes.push(PendingHandshake {
                handshake,
                peer,
                started,
            }),
            Err(HandshakeError::Failure(e)) => warn!("Handshake com {peer} falhou: {e}"),
        }
    }

    fn install(&mut self, ws: WebSocket<TcpStream>, peer: SocketAddr) {
        let Some(slot) = self.slots.iter().position(Option::is_none) else {
            warn!("Sem slot livre para {peer}; conexão descartada");
            return;
        };
        debug!("Handshake com {peer} concluído (slot {slot})");
        self.slots[slot] = Some(Client { ws, peer });
        self.pending.push((slot as ClientId, ConnectionEvent::Connected));
    }

    fn poll_clients(&mut self) {
        for slot in 0..self.slots.len() {
            let Some(client) = self.slots[slot].as_mut() else {
                continue;
            };
            if !poll_client(client) {
                debug!("Cliente {slot} ({}) encerrou a conexão", client.peer);
                self.slots[slot] = None;
                self.pending
                    .push((slot as ClientId, ConnectionEvent::Disconnected));
            }
        }
    }

    fn dispatch(&mut self) {
        let events = std::mem::take(&mut self.pending);
        if let Some(observer) = self.observer.as_mut() {
            for (client, event) in events {
                observer.on_event(client, event);
            }
        }
    }
}

/// Lê tudo o que estiver disponível. `false` se a conexão terminou.
fn poll_client(client: &mut Client) -> bool {
    use tungstenite::Error;

    loop {
        match client.ws.read() {
            Ok(Message::Close(_)) => {
                // Envia a resposta de close já enfileirada pelo tungstenite
                let _ = client.ws.flush();
                return false;
            }
            Ok(Message::Text(text)) => debug!("Ignorando texto de {}: {text}", client.peer),
            Ok(_) => {}
            Err(Error::Io(ref e)) if e.kind() == std::io::ErrorKind::WouldBlock => return true,
            Err(Error::ConnectionClosed | Error::AlreadyClosed) => return false,
            Err(e) => {
                debug!("Erro de leitura de {}: {e}", client.peer);
                return false;
            }
        }
    }
}

impl BroadcastTransport for WsBroadcastServer {
    fn open(&mut self, port: u16) -> Result<(), TransportError> {
        if self.listener.is_some() {
            self.close();
        }

        let addr = format!("{}:{port}", self.options.bind_ip);
        let listener = TcpListener::bind(&addr).map_err(|source| TransportError::Bind {
            addr: addr.clone(),
            source,
        })?;
        listener.set_nonblocking(true)?;

        let local = listener.local_addr()?;
        info!("Servidor WebSocket escutando em {local}");
        self.local_addr = Some(local);
        self.listener = Some(listener);
        Ok(())
    }

    fn close(&mut self) {
        for slot in 0..self.slots.len() {
            if let Some(mut client) = self.slots[slot].take() {
                let _ = client.ws.close(None);
                let _ = client.ws.flush();
                self.pending
                    .push((slot as ClientId, ConnectionEvent::Disconnected));
            }
        }
        self.handshakes.clear();
        if let Some(addr) = self.local_addr.take() {
            info!("Servidor WebSocket em {addr} fechado");
        }
        self.listener = None;
    }

    fn on_connection_event(&mut self, observer: Box<dyn ConnectionObserver>) {
        self.observer = Some(observer);
    }

    fn pump_events(&mut self) {
        self.advance_handshakes();
        self.accept_pending();
        self.poll_clients();
        self.dispatch();
    }

    fn broadcast_text(&mut self, payload: &str) -> usize {
        use tungstenite::Error;

        let mut delivered = 0;
        for slot in 0..self.slots.len() {
            let Some(client) = self.slots[slot].as_mut() else {
                continue;
            };
            match client.ws.send(Message::Text(payload.to_owned())) {
                Ok(()) => delivered += 1,
                // Frame ficou no buffer de saída (limitado), vai no próximo flush
                Err(Error::Io(ref e)) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    delivered += 1
                }
                Err(Error::WriteBufferFull(_)) => {
                    debug!("Cliente {slot} lento, frame descartado");
                }
                Err(e) => {
                    debug!("Falha ao enviar para cliente {slot} ({}): {e}", client.peer);
                    self.slots[slot] = None;
                    self.pending
                        .push((slot as ClientId, ConnectionEvent::Disconnected));
                }
            }
        }
        delivered
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
