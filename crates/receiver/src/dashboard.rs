//! Painel de gráficos – App eframe/egui.
//!
//! Lista as chaves recebidas como checkboxes e plota o histórico das
//! selecionadas, em um gráfico (Single) ou um por chave (Multiple).

use crate::history::{ChartMode, KeyHistory};
use crate::log_view::{LineFormatter, LogFile};
use crate::net_thread::NetEvent;
use chrono::Local;
use crossbeam_channel::Receiver;
use egui::{Color32, RichText};
use egui_plot::{Legend, Line, Plot, PlotPoints};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const PLOT_HEIGHT: f32 = 180.0;
const CONNECTED: Color32 = Color32::from_rgb(0, 255, 136);
const OFFLINE: Color32 = Color32::from_rgb(255, 80, 80);

/// Estado do painel.
pub struct ChartDashboard {
    rx: Receiver<NetEvent>,
    url: String,
    started: Instant,

    // Dados
    history: KeyHistory,
    frames: usize,
    last_frame: Option<Instant>,

    // Seleção
    checked: HashSet<String>,
    mode: ChartMode,

    // Status
    connected: bool,
    status: String,

    // Log em arquivo, com o mesmo formato do modo texto
    formatter: LineFormatter,
    log_file: Option<LogFile>,
}

impl ChartDashboard {
    pub fn new(
        rx: Receiver<NetEvent>,
        url: String,
        keys: Vec<String>,
        history_size: usize,
        log_file: Option<LogFile>,
    ) -> Self {
        Self {
            rx,
            status: format!("Conectando a {url}..."),
            url,
            started: Instant::now(),
            history: KeyHistory::new(history_size),
            frames: 0,
            last_frame: None,
            checked: keys.iter().cloned().collect(),
            mode: ChartMode::Multiple,
            connected: false,
            formatter: LineFormatter::new(keys),
            log_file,
        }
    }

    /// Drena os eventos pendentes da thread de rede.
    fn poll_network(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            match event {
                NetEvent::Connected => {
                    info!("Status: conectado");
                    self.connected = true;
                    self.status = format!("Conectado a {}", self.url);
                }
                NetEvent::Disconnected(reason) => {
                    warn!("Status: desconectado ({reason})");
                    self.connected = false;
                    self.status = format!("Desconectado ({reason})");
                }
                NetEvent::Frame(msg) => {
                    self.history
                        .push(self.started.elapsed().as_secs_f64(), &msg.samples);
                    self.frames += 1;
                    self.last_frame = Some(Instant::now());

                    if let Some(file) = self.log_file.as_mut() {
                        let lines = self.formatter.format(&Local::now().naive_local(), &msg);
                        if let Err(e) = file.append(&lines) {
                            warn!("Erro ao gravar log: {e}");
                        }
                    }
                }
            }
        }
    }

    /// Chaves marcadas, na ordem em que apareceram.
    fn selected(&self) -> Vec<String> {
        self.history
            .keys()
            .filter(|k| self.checked.contains(*k))
            .map(String::from)
            .collect()
    }

    fn render_keys(&mut self, ui: &mut egui::Ui) {
        ui.label(RichText::new("Chaves").strong().monospace());

        let keys: Vec<String> = self.history.keys().map(String::from).collect();
        if keys.is_empty() {
            ui.label(RichText::new("aguardando dados...").weak());
        }
        for key in keys {
            let mut on = self.checked.contains(&key);
            if ui.checkbox(&mut on, key.as_str()).changed() {
                if on {
                    self.checked.insert(key);
                } else {
                    self.checked.remove(&key);
                }
            }
        }

        ui.separator();
        ui.radio_value(&mut self.mode, ChartMode::Single, "Single Item");
        ui.radio_value(&mut self.mode, ChartMode::Multiple, "Multiple Items");
    }

    fn render_charts(&self, ui: &mut egui::Ui) {
        let selected = self.selected();
        let plotted = self.mode.plotted(&selected);
        if plotted.is_empty() {
            ui.label("Selecione ao menos uma chave.");
            return;
        }

        egui::ScrollArea::vertical().show(ui, |ui: &mut egui::Ui| {
            for key in plotted {
                self.plot_key(ui, key);
                ui.add_space(6.0);
            }
        });
    }

    fn plot_key(&self, ui: &mut egui::Ui, key: &str) {
        ui.label(RichText::new(key).monospace().size(12.0));

        let points: PlotPoints = self
            .history
            .points(key)
            .into_iter()
            .flatten()
            .copied()
            .collect();
        let line = Line::new(points).name(key).width(1.5);

        Plot::new(format!("plot_{key}"))
            .height(PLOT_HEIGHT)
            .legend(Legend::default())
            .x_axis_label("s")
            .allow_scroll(false)
            .show(ui, |plot_ui| {
                plot_ui.line(line);
            });
    }
}

impl eframe::App for ChartDashboard {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_network();
        ctx.request_repaint_after(Duration::from_millis(100));

        ctx.input(|i: &egui::InputState| {
            if i.key_pressed(egui::Key::Q) || i.key_pressed(egui::Key::Escape) {
                ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            }
        });

        egui::SidePanel::left("keys")
            .resizable(false)
            .show(ctx, |ui: &mut egui::Ui| self.render_keys(ui));

        egui::CentralPanel::default().show(ctx, |ui: &mut egui::Ui| {
            let color = if self.connected { CONNECTED } else { OFFLINE };
            let age = self
                .last_frame
                .map(|t| format!(" | último frame há {} ms", t.elapsed().as_millis()))
                .unwrap_or_default();
            ui.label(
                RichText::new(format!("● {} | {} frames{age}", self.status, self.frames))
                    .color(color)
                    .monospace(),
            );
            ui.separator();
            self.render_charts(ui);
        });
    }
}

/// Abre a janela e bloqueia até ela ser fechada.
pub fn run(dashboard: ChartDashboard) -> eframe::Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("LogTracer")
            .with_inner_size([1024.0, 640.0])
            .with_min_inner_size([640.0, 400.0]),
        ..Default::default()
    };

    eframe::run_native(
        "LogTracer",
        options,
        Box::new(move |_cc| Ok(Box::new(dashboard))),
    )
}
