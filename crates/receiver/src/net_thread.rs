//! Thread de rede que escuta o WebSocket e envia eventos para a saída via channel.

use crossbeam_channel::{Receiver, Sender, bounded};
use logtracer_core::protocol::decode_payload;
use logtracer_core::types::Sample;
use std::time::Duration;
use tracing::{debug, error, info};
use tungstenite::Message;

/// Frame decodificado recebido do sender.
#[derive(Debug, Clone)]
pub struct NetMessage {
    pub samples: Vec<Sample>,
    pub raw: String,
}

/// Evento enviado da thread de rede para a thread principal.
#[derive(Debug, Clone)]
pub enum NetEvent {
    Connected,
    Frame(NetMessage),
    Disconnected(String),
}

/// Inicia a thread de rede. Retorna o receiver do channel.
pub fn spawn_receiver_thread(url: String, reconnect: Duration) -> Receiver<NetEvent> {
    let (tx, rx) = bounded::<NetEvent>(64); // Buffer de 64 eventos

    std::thread::Builder::new()
        .name("ws-receiver".into())
        .spawn(move || {
            receiver_loop(&tx, &url, reconnect);
        })
        .expect("Falha ao criar thread de rede");

    rx
}

fn receiver_loop(tx: &Sender<NetEvent>, url: &str, reconnect: Duration) {
    loop {
        match tungstenite::connect(url) {
            Ok((mut ws, _)) => {
                info!("Conectado a {url}");
                if tx.send(NetEvent::Connected).is_err() {
                    return;
                }

                let reason = loop {
                    match ws.read() {
                        Ok(Message::Text(text)) => {
                            if !forward_frame(tx, text) {
                                return;
                            }
                        }
                        Ok(Message::Close(_)) => break "conexão fechada pelo sender".to_string(),
                        Ok(_) => {}
                        Err(e) => break e.to_string(),
                    }
                };

                if tx.send(NetEvent::Disconnected(reason)).is_err() {
                    return;
                }
            }
            Err(e) => {
                error!(
                    "Falha ao conectar em {url}: {e}. Tentando novamente em {:.1}s...",
                    reconnect.as_secs_f64()
                );
            }
        }
        std::thread::sleep(reconnect);
    }
}

/// Decodifica e repassa um frame. `false` se a saída foi encerrada.
fn forward_frame(tx: &Sender<NetEvent>, text: String) -> bool {
    let samples = match decode_payload(&text) {
        Ok(samples) => samples,
        Err(e) => {
            debug!("Frame inválido: {e}");
            return true;
        }
    };

    let msg = NetMessage { samples, raw: text };
    match tx.try_send(NetEvent::Frame(msg)) {
        Ok(()) => true,
        // Non-blocking send: se a saída está lenta, descarta o frame
        Err(crossbeam_channel::TrySendError::Full(_)) => {
            debug!("Channel cheio, descartando frame");
            true
        }
        Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
    }
}
