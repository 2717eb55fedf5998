use super::GazeSource;
use crate::error::{CortexError, Result};
use crate::types::{GazeRatio, Source};
use async_trait::async_trait;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{self, Interval, MissedTickBehavior};

/// Figure-8 sweep for headless runs and demos
#[derive(Default)]
pub struct SimulatedGaze {
    step: u64,
    // Created on first use, it needs a running tokio timer
    interval: Option<Interval>,
}

impl SimulatedGaze {
    /// Frames per second of the simulated camera
    pub const FPS: u64 = 20;

    pub fn new() -> Self {
        Self::default()
    }

    /// Ratio at a given frame, without waiting
    pub fn ratio_at(step: u64) -> GazeRatio {
        let t = step as f64 / 50.0;
        GazeRatio::new(0.5 + t.sin() / 3.0, 0.5 + (2.0 * t).sin() / 6.0)
    }
}

#[async_trait]
impl GazeSource for SimulatedGaze {
    async fn next_raw_gaze_ratio(&mut self) -> Result<GazeRatio> {
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval = time::interval(Duration::from_millis(1000 / Self::FPS));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });
        interval.tick().await;

        let ratio = Self::ratio_at(self.step);
        self.step = self.step.wrapping_add(1);
        Ok(ratio)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct JsonGazeMsg {
    x: f64,
    y: f64,
}

/// Parse one gaze datagram.
///
/// Accepts JSON (`{"x":0.5,"y":0.5}`) or whitespace separated `key=value`
/// tokens (`x=0.5 y=0.5`). Unknown keys are ignored.
pub fn parse_gaze_message(msg: &str) -> Option<GazeRatio> {
    let msg = msg.trim();
    if msg.is_empty() {
        return None;
    }

    if msg.starts_with('{') {
        let j = serde_json::from_str::<JsonGazeMsg>(msg).ok()?;
        return finite(j.x, j.y);
    }

    let mut x: Option<f64> = None;
    let mut y: Option<f64> = None;
    for tok in msg.split_whitespace() {
        let (k, v) = tok.split_once('=')?;
        match k {
            "x" => x = v.parse().ok(),
            "y" => y = v.parse().ok(),
            _ => {}
        }
    }

    finite(x?, y?)
}

fn finite(x: f64, y: f64) -> Option<GazeRatio> {
    (x.is_finite() && y.is_finite()).then(|| GazeRatio::new(x, y))
}

/// Raw gaze ratios received as UDP datagrams from an external eye tracker
pub struct UdpGazeSource {
    socket: UdpSocket,
    timeout: Duration,
    buf: Vec<u8>,
}

impl UdpGazeSource {
    /// Bind the listener. `timeout` is how long a silent tracker is tolerated
    /// before the source reports itself unavailable.
    pub async fn bind(addr: SocketAddr, timeout: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        log::info!("UDP gaze listener bound on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            timeout,
            buf: vec![0u8; 2048],
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl GazeSource for UdpGazeSource {
    async fn next_raw_gaze_ratio(&mut self) -> Result<GazeRatio> {
        let deadline = time::Instant::now() + self.timeout;
        loop {
            let received = time::timeout_at(deadline, self.socket.recv_from(&mut self.buf)).await;
            let (len, _src) = match received {
                Ok(Ok(v)) => v,
                Ok(Err(e)) => {
                    return Err(CortexError::unavailable(Source::Gaze, format!("recv failed: {e}")))
                }
                Err(_) => {
                    return Err(CortexError::unavailable(
                        Source::Gaze,
                        format!("no datagram within {} ms", self.timeout.as_millis()),
                    ))
                }
            };

            match std::str::from_utf8(&self.buf[..len]).ok().and_then(parse_gaze_message) {
                Some(ratio) => return Ok(ratio),
                None => log::debug!("Ignoring malformed gaze datagram ({} bytes)", len),
            }
        }
    }
}
