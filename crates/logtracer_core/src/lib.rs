//! # LogTracer Core
//!
//! Crate compartilhada que define as amostras, o buffer de capacidade fixa,
//! o protocolo JSON e a configuração TOML do sistema LogTracer.
//!
//! ## Módulos
//! - [`types`] – Amostras e valores (`f32` ou texto)
//! - [`buffer`] – Acumulador limitado, esvaziado a cada flush
//! - [`protocol`] – Encode/decode do documento `DataToSend`
//! - [`config`] – Configuração unificada via TOML

pub mod types;
pub mod buffer;
pub mod protocol;
pub mod config;

// Re-exports convenientes
pub use types::{Sample, SampleValue};
pub use buffer::{BufferError, SampleBuffer};
pub use protocol::{decode_payload, encode_document, ProtocolError, DATA_FIELD};
pub use config::{AppConfig, NetworkConfig, ReceiverConfig, SenderConfig};
