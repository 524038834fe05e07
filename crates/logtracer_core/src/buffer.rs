//! Buffer de amostras com capacidade fixa.
//!
//! Acumula amostras entre dois flushes. A capacidade limita o tamanho do
//! documento serializado (em bytes); uma amostra que ultrapassaria o limite
//! é rejeitada com [`BufferError::CapacityExceeded`] e o buffer fica intacto.

use crate::protocol::{self, EMPTY_DOCUMENT, ProtocolError};
use crate::types::{Sample, SampleValue};

/// Capacidade padrão do documento serializado (bytes).
pub const DEFAULT_CAPACITY: usize = 1024;

/// Erros ao registrar amostras.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("Capacidade do buffer excedida: {needed} bytes (limite {capacity})")]
    CapacityExceeded { needed: usize, capacity: usize },

    #[error("Valor não finito em {category}.{key}")]
    NonFiniteValue { category: String, key: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Acumulador append-only de entradas de categoria.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: Vec<Sample>,
    /// Tamanho exato do próximo `serialize()`
    encoded_len: usize,
    capacity: usize,
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Vec::new(),
            encoded_len: EMPTY_DOCUMENT.len(),
            capacity,
        }
    }

    /// Adiciona uma nova entrada de categoria, mesmo que a categoria e a
    /// chave já existam no buffer.
    pub fn record(
        &mut self,
        category: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<SampleValue>,
    ) -> Result<(), BufferError> {
        let sample = Sample::new(category, key, value);
        if !sample.value.is_finite() {
            return Err(BufferError::NonFiniteValue {
                category: sample.category,
                key: sample.key,
            });
        }

        let separator = usize::from(!self.samples.is_empty());
        let needed = self.encoded_len + separator + protocol::encoded_entry_len(&sample)?;
        if needed > self.capacity {
            return Err(BufferError::CapacityExceeded {
                needed,
                capacity: self.capacity,
            });
        }

        self.encoded_len = needed;
        self.samples.push(sample);
        Ok(())
    }

    /// Documento canônico com todo o conteúdo atual.
    pub fn serialize(&self) -> Result<String, ProtocolError> {
        protocol::encode_document(&self.samples)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.encoded_len = EMPTY_DOCUMENT.len();
    }

    pub fn entries(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn encoded_len(&self) -> usize {
        self.encoded_len
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
