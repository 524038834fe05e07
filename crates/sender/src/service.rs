//! Serviço de telemetria – acumula amostras e faz flush periódico.
//!
//! ```text
//! Uninitialized ──initialize()──▶ Ready ──tick()──▶ Running ⟲
//! ```
//!
//! O chamador invoca [`TelemetryService::tick`] a cada volta do loop; a cada
//! `flush_interval` o buffer é serializado, enviado a todos os observadores
//! conectados e esvaziado. `tick` nunca falha: erros são apenas logados.

use crate::network::{self, Credentials, NetworkError, Reachability};
use crate::transport::{
    BroadcastTransport, ClientId, ConnectionEvent, ConnectionObserver, TransportError,
};
use logtracer_core::buffer::{BufferError, DEFAULT_CAPACITY, SampleBuffer};
use logtracer_core::config::AppConfig;
use logtracer_core::protocol::ProtocolError;
use logtracer_core::types::SampleValue;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Timestamp monotônico em milissegundos.
pub type Millis = u64;

/// Estado do serviço.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Uninitialized,
    Ready,
    Running,
}

/// Resultado de um `tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// `initialize` ainda não foi chamado
    NotInitialized,
    /// Intervalo ainda não expirou
    Idle,
    Flushed { recipients: usize, bytes: usize },
    /// Serialização falhou; o buffer foi descartado
    Failed,
}

/// Erros do serviço.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Serviço já inicializado")]
    AlreadyInitialized,

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Parâmetros do serviço.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub channel: u16,
    pub flush_interval: Millis,
    pub buffer_capacity: usize,
    pub join_poll: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            channel: 81,
            flush_interval: 2000,
            buffer_capacity: DEFAULT_CAPACITY,
            join_poll: Duration::from_millis(500),
        }
    }
}

impl From<&AppConfig> for ServiceOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            channel: config.sender.port,
            flush_interval: config.sender.interval_ms,
            buffer_capacity: config.sender.buffer_capacity,
            join_poll: Duration::from_millis(config.network.join_poll_ms),
        }
    }
}

/// Loga uma linha por evento e repassa ao observador do usuário.
struct ConnectionNotices {
    inner: Option<Box<dyn ConnectionObserver>>,
}

impl ConnectionObserver for ConnectionNotices {
    fn on_event(&mut self, client: ClientId, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => info!("Cliente {client} conectado"),
            ConnectionEvent::Disconnected => info!("Cliente {client} desconectado"),
        }
        if let Some(inner) = self.inner.as_mut() {
            inner.on_event(client, event);
        }
    }
}

/// Serviço que liga o [`SampleBuffer`] a um transporte de broadcast.
pub struct TelemetryService<N, T> {
    network: N,
    transport: T,
    buffer: SampleBuffer,
    state: ServiceState,
    channel: u16,
    flush_interval: Millis,
    join_poll: Duration,
    last_flush: Millis,
    observer: Option<Box<dyn ConnectionObserver>>,
    warned_uninitialized: bool,
}

impl<N: Reachability, T: BroadcastTransport> TelemetryService<N, T> {
    pub fn new(network: N, transport: T, options: ServiceOptions) -> Self {
        Self {
            network,
            transport,
            buffer: SampleBuffer::new(options.buffer_capacity),
            state: ServiceState::Uninitialized,
            channel: options.channel,
            flush_interval: options.flush_interval,
            join_poll: options.join_poll,
            last_flush: 0,
            observer: None,
            warned_uninitialized: false,
        }
    }

    pub fn set_flush_interval(&mut self, interval: Millis) {
        self.flush_interval = interval;
    }

    /// Porta usada pelo próximo `initialize`.
    pub fn set_channel(&mut self, channel: u16) {
        self.channel = channel;
    }

    /// Observador extra, chamado depois da notificação no log.
    /// Depois de `initialize`, substitui o observador já instalado.
    pub fn set_connection_observer(&mut self, observer: Box<dyn ConnectionObserver>) {
        if self.state == ServiceState::Uninitialized {
            self.observer = Some(observer);
            return;
        }
        debug!("Observador de conexão substituído com o serviço ativo");
        self.transport.on_connection_event(Box::new(ConnectionNotices {
            inner: Some(observer),
        }));
    }

    /// Espera a rede (sem timeout) e abre o transporte.
    pub fn initialize(&mut self, credentials: &Credentials) -> Result<(), ServiceError> {
        if self.state != ServiceState::Uninitialized {
            return Err(ServiceError::AlreadyInitialized);
        }

        network::wait_for_reachability(&mut self.network, credentials, self.join_poll)?;

        self.transport.on_connection_event(Box::new(ConnectionNotices {
            inner: self.observer.take(),
        }));
        self.transport.open(self.channel)?;

        self.state = ServiceState::Ready;
        info!(
            "Serviço pronto: canal {}, flush a cada {} ms",
            self.channel, self.flush_interval
        );
        Ok(())
    }

    /// Processa eventos de conexão e, se o intervalo expirou, faz o flush.
    ///
    /// No máximo um flush por chamada, mesmo que vários intervalos tenham
    /// passado; o próximo intervalo conta a partir deste flush.
    pub fn tick(&mut self, now: Millis) -> FlushOutcome {
        if self.state == ServiceState::Uninitialized {
            if !self.warned_uninitialized {
                warn!("tick() chamado antes de initialize(); ignorando");
                self.warned_uninitialized = true;
            }
            return FlushOutcome::NotInitialized;
        }
        self.state = ServiceState::Running;

        self.transport.pump_events();

        let elapsed = now.saturating_sub(self.last_flush);
        if elapsed < self.flush_interval {
            return FlushOutcome::Idle;
        }
        self.last_flush = now;
        self.flush()
    }

    fn flush(&mut self) -> FlushOutcome {
        let encoded = self.buffer.serialize();
        self.publish(encoded)
    }

    /// Envia o documento (ou loga a falha) e esvazia o buffer nos dois casos.
    fn publish(&mut self, encoded: Result<String, ProtocolError>) -> FlushOutcome {
        let outcome = match encoded {
            Ok(text) => {
                let recipients = self.transport.broadcast_text(&text);
                info!("{text}");
                debug!(
                    "Flush: {} entradas, {} bytes, {recipients} clientes",
                    self.buffer.len(),
                    text.len()
                );
                FlushOutcome::Flushed {
                    recipients,
                    bytes: text.len(),
                }
            }
            Err(e) => {
                error!("Erro ao serializar buffer: {e}");
                FlushOutcome::Failed
            }
        };
        self.buffer.clear();
        outcome
    }

    /// Registra uma amostra para o próximo flush. Permitido em qualquer estado.
    pub fn record(
        &mut self,
        category: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<SampleValue>,
    ) -> Result<(), BufferError> {
        self.buffer.record(category, key, value)
    }

    /// Fecha o transporte e reabre em outra porta. Conexões antigas caem.
    pub fn reconfigure_channel(&mut self, channel: u16) -> Result<(), ServiceError> {
        self.channel = channel;
        if self.state == ServiceState::Uninitialized {
            return Ok(());
        }

        self.transport.close();
        self.transport.open(channel)?;
        info!("Canal reconfigurado para {channel}");
        Ok(())
    }

    /// Aplica IP estático. Sem gateway/máscara, mantém os atuais.
    /// Falhas são logadas e não interrompem o serviço.
    pub fn fix_ip_address(
        &mut self,
        ip: &str,
        gateway: Option<&str>,
        subnet: Option<&str>,
    ) -> Result<(), NetworkError> {
        let result = self.apply_static_address(ip, gateway, subnet);
        match &result {
            Ok(()) => info!("Endereço IP fixado em {ip}"),
            Err(e) => warn!("Falha ao configurar endereço IP: {e}"),
        }
        result
    }

    fn apply_static_address(
        &mut self,
        ip: &str,
        gateway: Option<&str>,
        subnet: Option<&str>,
    ) -> Result<(), NetworkError> {
        let address = network::parse_ipv4(ip)?;
        let gateway = match gateway {
            Some(text) => network::parse_ipv4(text)?,
            None => self
                .network
                .gateway()
                .ok_or_else(|| NetworkError::InvalidAddress("gateway atual desconhecido".into()))?,
        };
        let mask = match subnet {
            Some(text) => network::parse_ipv4(text)?,
            None => self
                .network
                .subnet_mask()
                .ok_or_else(|| NetworkError::InvalidAddress("máscara atual desconhecida".into()))?,
        };
        self.network.configure_static_address(address, gateway, mask)
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn last_flush(&self) -> Millis {
        self.last_flush
    }

    pub fn channel(&self) -> u16 {
        self.channel
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    pub fn current_address(&self) -> Option<IpAddr> {
        self.network.current_address()
    }

    pub fn local_address(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::tests::ScriptedNetwork;
    use crate::transport::{ServerOptions, WsBroadcastServer};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::net::Ipv4Addr;
    use std::rc::Rc;

    /// Transporte em memória: grava o que foi enviado e entrega eventos
    /// roteirizados no próximo `pump_events`.
    #[derive(Default)]
    struct FakeTransport {
        opened: Vec<u16>,
        closed: usize,
        sent: Vec<String>,
        clients: usize,
        script: VecDeque<(ClientId, ConnectionEvent)>,
        pumps: usize,
        fail_open: bool,
        observer: Option<Box<dyn ConnectionObserver>>,
    }

    impl FakeTransport {
        fn queue(&mut self, client: ClientId, event: ConnectionEvent) {
            self.script.push_back((client, event));
        }
    }

    impl BroadcastTransport for FakeTransport {
        fn open(&mut self, port: u16) -> Result<(), TransportError> {
            if self.fail_open {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::AddrInUse,
                    "porta ocupada",
                )));
            }
            self.opened.push(port);
            Ok(())
        }

        fn close(&mut self) {
            self.closed += 1;
            self.clients = 0;
        }

        fn on_connection_event(&mut self, observer: Box<dyn ConnectionObserver>) {
            self.observer = Some(observer);
        }

        fn pump_events(&mut self) {
            self.pumps += 1;
            while let Some((client, event)) = self.script.pop_front() {
                match event {
                    ConnectionEvent::Connected => self.clients += 1,
                    ConnectionEvent::Disconnected => self.clients -= 1,
                }
                if let Some(observer) = self.observer.as_mut() {
                    observer.on_event(client, event);
                }
            }
        }

        fn broadcast_text(&mut self, payload: &str) -> usize {
            self.sent.push(payload.to_owned());
            self.clients
        }

        fn local_addr(&self) -> Option<SocketAddr> {
            None
        }
    }

    type Service = TelemetryService<ScriptedNetwork, FakeTransport>;

    fn options() -> ServiceOptions {
        ServiceOptions {
            join_poll: Duration::ZERO,
            ..Default::default()
        }
    }

    fn ready_service() -> Service {
        let mut svc = TelemetryService::new(
            ScriptedNetwork::reachable_after(0),
            FakeTransport::default(),
            options(),
        );
        svc.initialize(&Credentials::default()).unwrap();
        svc
    }

    #[test]
    fn flushes_once_when_interval_elapses() {
        let mut svc = ready_service();
        assert_eq!(svc.tick(0), FlushOutcome::Idle);
        assert_eq!(svc.tick(1000), FlushOutcome::Idle);
        assert!(matches!(svc.tick(2500), FlushOutcome::Flushed { .. }));
        assert_eq!(svc.tick(3000), FlushOutcome::Idle);

        assert_eq!(svc.transport().sent.len(), 1);
        assert_eq!(svc.last_flush(), 2500);
    }

    #[test]
    fn missed_intervals_fire_a_single_flush() {
        let mut svc = ready_service();
        assert!(matches!(svc.tick(7000), FlushOutcome::Flushed { .. }));
        assert_eq!(svc.tick(8000), FlushOutcome::Idle);
        assert!(matches!(svc.tick(9000), FlushOutcome::Flushed { .. }));
        assert_eq!(svc.transport().sent.len(), 2);
    }

    #[test]
    fn flush_sends_records_in_order_and_empties_buffer() {
        let mut svc = ready_service();
        svc.record("Weather", "temp", 21.5).unwrap();
        svc.record("System", "uptime", "12h").unwrap();
        svc.record("Weather", "temp", 21.5).unwrap();
        svc.tick(2000);

        assert_eq!(
            svc.transport().sent,
            vec![
                r#"{"DataToSend":[{"Weather":[{"temp":21.5}]},{"System":[{"uptime":"12h"}]},{"Weather":[{"temp":21.5}]}]}"#
                    .to_string()
            ]
        );
        assert!(svc.buffer().is_empty());
    }

    #[test]
    fn consecutive_flushes_carry_only_new_samples() {
        let mut svc = ready_service();
        svc.record("Weather", "temp", 21.5).unwrap();
        svc.tick(2000);
        svc.record("Weather", "temp", 22.0).unwrap();
        svc.tick(4000);
        svc.tick(6000);

        assert_eq!(
            svc.transport().sent,
            vec![
                r#"{"DataToSend":[{"Weather":[{"temp":21.5}]}]}"#.to_string(),
                r#"{"DataToSend":[{"Weather":[{"temp":22.0}]}]}"#.to_string(),
                r#"{"DataToSend":[]}"#.to_string(),
            ]
        );
    }

    #[test]
    fn flush_without_listeners_still_clears() {
        let mut svc = ready_service();
        svc.record("System", "voltage", 3.3).unwrap();
        let outcome = svc.tick(2000);

        assert_eq!(
            outcome,
            FlushOutcome::Flushed {
                recipients: 0,
                bytes: r#"{"DataToSend":[{"System":[{"voltage":3.3}]}]}"#.len()
            }
        );
        assert_eq!(svc.transport().sent.len(), 1);
        assert!(svc.buffer().is_empty());
    }

    #[test]
    fn connection_churn_does_not_touch_buffer_or_timing() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);

        let mut svc = TelemetryService::new(
            ScriptedNetwork::reachable_after(0),
            FakeTransport::default(),
            options(),
        );
        svc.set_connection_observer(Box::new(move |id: ClientId, ev: ConnectionEvent| {
            sink.borrow_mut().push((id, ev))
        }));
        svc.initialize(&Credentials::default()).unwrap();

        svc.record("Weather", "temp", 21.5).unwrap();
        svc.transport_mut().queue(0, ConnectionEvent::Connected);
        svc.transport_mut().queue(1, ConnectionEvent::Connected);
        svc.transport_mut().queue(0, ConnectionEvent::Disconnected);

        assert_eq!(svc.tick(500), FlushOutcome::Idle);
        assert_eq!(svc.buffer().len(), 1);
        assert_eq!(
            *seen.borrow(),
            vec![
                (0, ConnectionEvent::Connected),
                (1, ConnectionEvent::Connected),
                (0, ConnectionEvent::Disconnected),
            ]
        );

        assert!(matches!(
            svc.tick(2000),
            FlushOutcome::Flushed { recipients: 1, .. }
        ));
        assert_eq!(svc.last_flush(), 2000);
    }

    #[test]
    fn observer_set_after_initialize_receives_events() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);

        let mut svc = ready_service();
        svc.set_connection_observer(Box::new(move |id: ClientId, ev: ConnectionEvent| {
            sink.borrow_mut().push((id, ev))
        }));
        svc.transport_mut().queue(3, ConnectionEvent::Connected);
        svc.tick(100);

        assert_eq!(*seen.borrow(), vec![(3, ConnectionEvent::Connected)]);
    }

    #[test]
    fn serialization_failure_discards_buffer_and_keeps_cadence() {
        let mut svc = ready_service();
        svc.record("Weather", "temp", 21.5).unwrap();

        let outcome = svc.publish(Err(ProtocolError::Serialize("falha simulada".into())));
        assert_eq!(outcome, FlushOutcome::Failed);
        assert!(svc.buffer().is_empty());
        assert!(svc.transport().sent.is_empty());

        svc.record("Weather", "temp", 22.5).unwrap();
        assert!(matches!(svc.tick(2000), FlushOutcome::Flushed { .. }));
        assert_eq!(
            svc.transport().sent,
            vec![r#"{"DataToSend":[{"Weather":[{"temp":22.5}]}]}"#.to_string()]
        );
    }

    #[test]
    fn initialize_waits_for_network_and_opens_channel() {
        let mut svc = TelemetryService::new(
            ScriptedNetwork::reachable_after(3),
            FakeTransport::default(),
            options(),
        );
        assert_eq!(svc.state(), ServiceState::Uninitialized);

        let creds = Credentials {
            ssid: "lab".into(),
            password: "secret".into(),
        };
        svc.initialize(&creds).unwrap();

        assert_eq!(svc.state(), ServiceState::Ready);
        assert_eq!(svc.transport().opened, vec![81]);
        assert_eq!(
            svc.current_address(),
            Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50)))
        );

        svc.tick(0);
        assert_eq!(svc.state(), ServiceState::Running);
        assert!(matches!(
            svc.initialize(&creds),
            Err(ServiceError::AlreadyInitialized)
        ));
    }

    #[test]
    fn open_failure_keeps_service_uninitialized() {
        let transport = FakeTransport {
            fail_open: true,
            ..Default::default()
        };
        let mut svc =
            TelemetryService::new(ScriptedNetwork::reachable_after(0), transport, options());
        assert!(matches!(
            svc.initialize(&Credentials::default()),
            Err(ServiceError::Transport(_))
        ));
        assert_eq!(svc.state(), ServiceState::Uninitialized);
    }

    #[test]
    fn samples_recorded_before_initialize_wait_for_first_flush() {
        let mut svc = TelemetryService::new(
            ScriptedNetwork::reachable_after(0),
            FakeTransport::default(),
            options(),
        );
        svc.record("Boot", "reason", "power-on").unwrap();
        assert_eq!(svc.tick(5000), FlushOutcome::NotInitialized);
        assert_eq!(svc.transport().pumps, 0);
        assert_eq!(svc.buffer().len(), 1);

        svc.initialize(&Credentials::default()).unwrap();
        svc.tick(5000);
        assert_eq!(
            svc.transport().sent,
            vec![r#"{"DataToSend":[{"Boot":[{"reason":"power-on"}]}]}"#.to_string()]
        );
    }

    #[test]
    fn configured_interval_is_respected() {
        let mut svc = TelemetryService::new(
            ScriptedNetwork::reachable_after(0),
            FakeTransport::default(),
            options(),
        );
        svc.set_flush_interval(500);
        svc.set_channel(8081);
        svc.initialize(&Credentials::default()).unwrap();

        assert!(matches!(svc.tick(500), FlushOutcome::Flushed { .. }));
        assert_eq!(svc.tick(999), FlushOutcome::Idle);
        assert!(matches!(svc.tick(1000), FlushOutcome::Flushed { .. }));
        assert_eq!(svc.transport().opened, vec![8081]);
    }

    #[test]
    fn reconfigure_channel_reopens_transport() {
        let mut svc = TelemetryService::new(
            ScriptedNetwork::reachable_after(0),
            FakeTransport::default(),
            options(),
        );
        svc.reconfigure_channel(90).unwrap();
        assert!(svc.transport().opened.is_empty());

        svc.initialize(&Credentials::default()).unwrap();
        svc.record("Weather", "temp", 21.5).unwrap();
        svc.reconfigure_channel(91).unwrap();

        assert_eq!(svc.transport().opened, vec![90, 91]);
        assert_eq!(svc.transport().closed, 1);
        assert_eq!(svc.channel(), 91);
        // Buffer não pertence ao transporte
        assert_eq!(svc.buffer().len(), 1);
    }

    #[test]
    fn capacity_overflow_is_reported_and_flush_continues() {
        let mut svc = TelemetryService::new(
            ScriptedNetwork::reachable_after(0),
            FakeTransport::default(),
            ServiceOptions {
                buffer_capacity: 34,
                ..options()
            },
        );
        svc.initialize(&Credentials::default()).unwrap();

        svc.record("A", "k", 1.0).unwrap();
        assert!(matches!(
            svc.record("A", "k", 2.0),
            Err(BufferError::CapacityExceeded { .. })
        ));

        svc.tick(2000);
        assert_eq!(
            svc.transport().sent,
            vec![r#"{"DataToSend":[{"A":[{"k":1.0}]}]}"#.to_string()]
        );
        svc.record("A", "k", 2.0).unwrap();
    }

    #[test]
    fn fix_ip_uses_current_gateway_and_mask() {
        let mut svc = ready_service();
        svc.fix_ip_address("192.168.1.77", None, None).unwrap();
        assert_eq!(
            svc.network.applied,
            Some((
                Ipv4Addr::new(192, 168, 1, 77),
                Ipv4Addr::new(192, 168, 1, 1),
                Ipv4Addr::new(255, 255, 255, 0)
            ))
        );

        svc.fix_ip_address("10.0.0.5", Some("10.0.0.1"), Some("255.0.0.0"))
            .unwrap();
        assert_eq!(
            svc.network.applied,
            Some((
                Ipv4Addr::new(10, 0, 0, 5),
                Ipv4Addr::new(10, 0, 0, 1),
                Ipv4Addr::new(255, 0, 0, 0)
            ))
        );
    }

    #[test]
    fn fix_ip_failures_are_not_fatal() {
        let mut svc = ready_service();
        assert!(matches!(
            svc.fix_ip_address("999.1.1.1", None, None),
            Err(NetworkError::InvalidAddress(_))
        ));

        svc.network.accept_static = false;
        assert!(matches!(
            svc.fix_ip_address("192.168.1.77", None, None),
            Err(NetworkError::ConfigRejected)
        ));

        svc.record("Weather", "temp", 21.5).unwrap();
        assert!(matches!(svc.tick(2000), FlushOutcome::Flushed { .. }));
    }

    #[test]
    fn broadcasts_to_real_websocket_client() {
        let server = WsBroadcastServer::new(ServerOptions {
            bind_ip: "127.0.0.1".into(),
            max_clients: 2,
            handshake_timeout: Duration::from_secs(2),
            ..Default::default()
        });
        let mut svc = TelemetryService::new(
            ScriptedNetwork::reachable_after(0),
            server,
            ServiceOptions {
                channel: 0,
                ..options()
            },
        );
        svc.initialize(&Credentials::default()).unwrap();
        let addr = svc.local_address().unwrap();

        let client = std::thread::spawn(move || {
            let url = format!("ws://{addr}/");
            let (mut ws, _) = tungstenite::connect(url.as_str()).unwrap();
            ws.read().unwrap()
        });

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while svc.transport().client_count() == 0 {
            assert!(std::time::Instant::now() < deadline, "cliente não conectou");
            svc.tick(0);
            std::thread::sleep(Duration::from_millis(5));
        }

        svc.record("Weather", "temp", 21.5).unwrap();
        assert!(matches!(
            svc.tick(2000),
            FlushOutcome::Flushed { recipients: 1, .. }
        ));

        match client.join().unwrap() {
            tungstenite::Message::Text(text) => {
                assert_eq!(text, r#"{"DataToSend":[{"Weather":[{"temp":21.5}]}]}"#)
            }
            other => panic!("mensagem inesperada: {other:?}"),
        }
    }
}
