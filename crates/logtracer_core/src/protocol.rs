//! Protocolo de comunicação JSON.
//!
//! Cada flush gera um único frame de texto WebSocket:
//!
//! ```text
//! {"DataToSend":[{"Weather":[{"temp":21.5}]},{"System":[{"uptime":"12h"}]}]}
//! ```
//!
//! - Um único campo de topo, `DataToSend`
//! - Entradas na ordem de inserção
//! - Números sem aspas, textos com aspas

use crate::types::{Sample, SampleValue};
use serde::Serialize;
use serde_json::Value;

/// Nome do único campo de topo do documento.
pub const DATA_FIELD: &str = "DataToSend";

/// Documento de um buffer vazio.
pub const EMPTY_DOCUMENT: &str = r#"{"DataToSend":[]}"#;

/// Erros do protocolo.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Erro de serialização: {0}")]
    Serialize(String),

    #[error("Erro de deserialização: {0}")]
    Deserialize(String),

    #[error("Documento fora do formato esperado: {0}")]
    Malformed(String),
}

#[derive(Serialize)]
struct Document<'a> {
    #[serde(rename = "DataToSend")]
    data: &'a [Sample],
}

/// Codifica as amostras no documento canônico.
pub fn encode_document(samples: &[Sample]) -> Result<String, ProtocolError> {
    serde_json::to_string(&Document { data: samples })
        .map_err(|e| ProtocolError::Serialize(e.to_string()))
}

/// Tamanho exato, em bytes, da entrada de uma amostra dentro do documento.
pub fn encoded_entry_len(sample: &Sample) -> Result<usize, ProtocolError> {
    serde_json::to_vec(sample)
        .map(|bytes| bytes.len())
        .map_err(|e| ProtocolError::Serialize(e.to_string()))
}

/// Decodifica um frame recebido de volta em amostras, na ordem do documento.
///
/// Tolerante a objetos com mais de um par: cada par vira uma amostra.
pub fn decode_payload(text: &str) -> Result<Vec<Sample>, ProtocolError> {
    let root: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Deserialize(e.to_string()))?;

    let entries = root
        .get(DATA_FIELD)
        .and_then(Value::as_array)
        .ok_or_else(|| ProtocolError::Malformed(format!("campo `{DATA_FIELD}` ausente")))?;

    let mut samples = Vec::with_capacity(entries.len());
    for entry in entries {
        let entry = entry
            .as_object()
            .ok_or_else(|| ProtocolError::Malformed("entrada não é objeto".into()))?;

        for (category, records) in entry {
            let records = records.as_array().ok_or_else(|| {
                ProtocolError::Malformed(format!("categoria `{category}` não é lista"))
            })?;

            for record in records {
                let record = record.as_object().ok_or_else(|| {
                    ProtocolError::Malformed(format!("registro em `{category}` não é objeto"))
                })?;

                for (key, value) in record {
                    samples.push(Sample {
                        category: category.clone(),
                        key: key.clone(),
                        value: decode_value(category, key, value)?,
                    });
                }
            }
        }
    }

    Ok(samples)
}

fn decode_value(category: &str, key: &str, value: &Value) -> Result<SampleValue, ProtocolError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .map(|v| SampleValue::Float(v as f32))
            .ok_or_else(|| ProtocolError::Malformed(format!("{category}.{key}: número inválido"))),
        Value::String(s) => Ok(SampleValue::Text(s.clone())),
        other => Err(ProtocolError::Malformed(format!(
            "{category}.{key}: tipo não suportado ({other})"
        ))),
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
