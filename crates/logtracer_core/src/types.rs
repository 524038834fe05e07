//! Tipos de amostra acumulados pelo sender.
//!
//! Cada chamada a `record` gera uma [`Sample`], que no documento JSON vira
//! uma "entrada de categoria":
//!
//! ```text
//! {"Weather":[{"temp":21.5}]}
//! ```
//!
//! A lista de um único elemento permite que duas amostras da mesma categoria
//! apareçam lado a lado sem colidir na mesma chave de objeto.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;

// ──────────────────────────────────────────────
// Valor
// ──────────────────────────────────────────────

/// Valor de uma amostra: número (`f32`) ou texto curto.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SampleValue {
    Float(f32),
    Text(String),
}

impl SampleValue {
    /// `false` para NaN e ±infinito, que não têm representação JSON.
    pub fn is_finite(&self) -> bool {
        match self {
            SampleValue::Float(v) => v.is_finite(),
            SampleValue::Text(_) => true,
        }
    }
}

impl From<f32> for SampleValue {
    fn from(value: f32) -> Self {
        SampleValue::Float(value)
    }
}

/// Literais sem sufixo caem em `f64`; o documento sempre carrega `f32`.
impl From<f64> for SampleValue {
    fn from(value: f64) -> Self {
        SampleValue::Float(value as f32)
    }
}

impl From<&str> for SampleValue {
    fn from(value: &str) -> Self {
        SampleValue::Text(value.to_owned())
    }
}

impl From<String> for SampleValue {
    fn from(value: String) -> Self {
        SampleValue::Text(value)
    }
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // `Debug` mantém o ".0", como no documento JSON
            SampleValue::Float(v) => write!(f, "{v:?}"),
            SampleValue::Text(s) => f.write_str(s),
        }
    }
}

// ──────────────────────────────────────────────
// Amostra
// ──────────────────────────────────────────────

/// Uma medição rotulada (`category` agrupa, `key` nomeia o campo).
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub category: String,
    pub key: String,
    pub value: SampleValue,
}

impl Sample {
    pub fn new(
        category: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<SampleValue>,
    ) -> Self {
        Self {
            category: category.into(),
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Serializa como `{"<category>":[{"<key>":<value>}]}`.
impl Serialize for Sample {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let record = Record {
            key: &self.key,
            value: &self.value,
        };
        let mut entry = serializer.serialize_map(Some(1))?;
        entry.serialize_entry(&self.category, std::slice::from_ref(&record))?;
        entry.end()
    }
}

struct Record<'a> {
    key: &'a str,
    value: &'a SampleValue,
}

impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.key, self.value)?;
        map.end()
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_entry_is_unquoted() {
        let s = Sample::new("Weather", "temp", 21.5);
        assert_eq!(
            serde_json::to_string(&s).unwrap(),
            r#"{"Weather":[{"temp":21.5}]}"#
        );
    }

    #[test]
    fn text_entry_is_quoted() {
        let s = Sample::new("System", "uptime", "12h");
        assert_eq!(
            serde_json::to_string(&s).unwrap(),
            r#"{"System":[{"uptime":"12h"}]}"#
        );
    }

    #[test]
    fn f32_keeps_short_representation() {
        let s = Sample::new("System", "voltage", 3.3_f32);
        assert_eq!(
            serde_json::to_string(&s).unwrap(),
            r#"{"System":[{"voltage":3.3}]}"#
        );
    }

    #[test]
    fn non_finite_detection() {
        assert!(!SampleValue::Float(f32::NAN).is_finite());
        assert!(!SampleValue::Float(f32::INFINITY).is_finite());
        assert!(SampleValue::Float(0.0).is_finite());
        assert!(SampleValue::from("ok").is_finite());
    }

    #[test]
    fn display_matches_value() {
        assert_eq!(SampleValue::Float(21.5).to_string(), "21.5");
        assert_eq!(SampleValue::Float(22.0).to_string(), "22.0");
        assert_eq!(SampleValue::from("12h").to_string(), "12h");
    }
}
