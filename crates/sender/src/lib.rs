//! # LogTracer Sender
//!
//! Serviço de telemetria embarcável: acumula amostras num buffer limitado e
//! faz broadcast periódico do documento JSON para observadores WebSocket.
//!
//! ## Módulos
//! - [`service`] – Ciclo de vida e flush periódico
//! - [`transport`] – Servidor WebSocket multi-cliente
//! - [`network`] – Espera por conectividade e IP estático
//! - [`monitor`] – Amostras do próprio host (`sysinfo`)

pub mod monitor;
pub mod network;
pub mod service;
pub mod transport;

// Re-exports convenientes
pub use service::{FlushOutcome, Millis, ServiceError, ServiceOptions, TelemetryService};
pub use transport::{BroadcastTransport, ConnectionEvent, ConnectionObserver, WsBroadcastServer};
