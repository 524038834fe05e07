//! Formatação das linhas exibidas e gravação do log em arquivo.

use crate::net_thread::NetMessage;
use chrono::NaiveDateTime;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Monta as linhas de um frame.
///
/// Sem chaves selecionadas, exibe o frame bruto com data e hora; com chaves,
/// uma linha por registro cuja chave foi selecionada.
pub struct LineFormatter {
    keys: Vec<String>,
}

impl LineFormatter {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys }
    }

    pub fn format(&self, at: &NaiveDateTime, msg: &NetMessage) -> Vec<String> {
        if self.keys.is_empty() {
            return vec![format!("[{}] {}", at.format("%Y-%m-%d %H:%M:%S"), msg.raw)];
        }

        let time = at.format("%H:%M:%S");
        msg.samples
            .iter()
            .filter(|s| self.keys.iter().any(|k| *k == s.key))
            .map(|s| format!("{time}: {}: {}", s.key, s.value))
            .collect()
    }
}

/// Arquivo de log em modo append.
pub struct LogFile {
    file: File,
}

impl LogFile {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }

    pub fn append(&mut self, lines: &[String]) -> std::io::Result<()> {
        for line in lines {
            writeln!(self.file, "{line}")?;
        }
        self.file.flush()
    }
}
