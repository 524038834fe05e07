//! Histórico por chave para os gráficos.
//!
//! Cada chave numérica vira uma série limitada de pontos `[t, valor]`, com
//! `t` em segundos desde o início da sessão. Chaves aparecem na ordem em que
//! foram vistas pela primeira vez.

use logtracer_core::types::{Sample, SampleValue};
use std::collections::VecDeque;

/// Como as chaves selecionadas são distribuídas nos gráficos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartMode {
    /// Um gráfico, só com a primeira chave selecionada
    Single,
    /// Um gráfico por chave selecionada
    Multiple,
}

impl ChartMode {
    /// Chaves efetivamente plotadas, dada a seleção em ordem.
    pub fn plotted<'a>(&self, selected: &'a [String]) -> &'a [String] {
        match self {
            ChartMode::Single => &selected[..selected.len().min(1)],
            ChartMode::Multiple => selected,
        }
    }
}

struct Series {
    key: String,
    points: VecDeque<[f64; 2]>,
}

pub struct KeyHistory {
    capacity: usize,
    series: Vec<Series>,
}

impl KeyHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            series: Vec::new(),
        }
    }

    /// Registra as amostras de um frame. Textos só registram a chave.
    pub fn push(&mut self, t: f64, samples: &[Sample]) {
        for sample in samples {
            let idx = match self.series.iter().position(|s| s.key == sample.key) {
                Some(idx) => idx,
                None => {
                    self.series.push(Series {
                        key: sample.key.clone(),
                        points: VecDeque::with_capacity(self.capacity),
                    });
                    self.series.len() - 1
                }
            };

            if let SampleValue::Float(v) = sample.value {
                let points = &mut self.series[idx].points;
                if points.len() >= self.capacity {
                    points.pop_front();
                }
                points.push_back([t, f64::from(v)]);
            }
        }
    }

    /// Chaves vistas até agora.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.series.iter().map(|s| s.key.as_str())
    }

    pub fn points(&self, key: &str) -> Option<&VecDeque<[f64; 2]>> {
        self.series.iter().find(|s| s.key == key).map(|s| &s.points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_keep_discovery_order() {
        let mut history = KeyHistory::new(10);
        history.push(
            0.0,
            &[
                Sample::new("Weather", "temp", 21.5),
                Sample::new("System", "uptime", "12h"),
            ],
        );
        history.push(2.0, &[Sample::new("Weather", "humidity", 40.0)]);

        let keys: Vec<&str> = history.keys().collect();
        assert_eq!(keys, vec!["temp", "uptime", "humidity"]);
    }

    #[test]
    fn text_values_are_not_plotted() {
        let mut history = KeyHistory::new(10);
        history.push(0.0, &[Sample::new("System", "uptime", "12h")]);
        assert!(history.points("uptime").unwrap().is_empty());
        assert!(history.points("temp").is_none());
    }

    #[test]
    fn series_is_bounded() {
        let mut history = KeyHistory::new(3);
        for i in 0..5 {
            history.push(i as f64, &[Sample::new("Weather", "temp", i as f32)]);
        }
        let points: Vec<[f64; 2]> = history.points("temp").unwrap().iter().copied().collect();
        assert_eq!(points, vec![[2.0, 2.0], [3.0, 3.0], [4.0, 4.0]]);
    }

    #[test]
    fn repeated_key_in_one_frame_adds_each_value() {
        let mut history = KeyHistory::new(10);
        history.push(
            1.0,
            &[
                Sample::new("Weather", "temp", 21.5),
                Sample::new("Weather", "temp", 22.0),
            ],
        );
        assert_eq!(history.points("temp").unwrap().len(), 2);
    }

    #[test]
    fn single_mode_plots_first_selection() {
        let selected = vec!["temp".to_string(), "humidity".to_string()];
        assert_eq!(ChartMode::Single.plotted(&selected), &selected[..1]);
        assert_eq!(ChartMode::Multiple.plotted(&selected), &selected[..]);
        assert!(ChartMode::Single.plotted(&[]).is_empty());
    }
}
