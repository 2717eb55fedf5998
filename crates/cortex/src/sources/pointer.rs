use super::PointerSource;
use crate::types::Coordinate;
use parking_lot::RwLock;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Pointer position pushed in by the host, e.g. from its own input events
#[derive(Debug, Default)]
pub struct SharedPointer {
    position: RwLock<Option<Coordinate>>,
}

impl SharedPointer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, position: Coordinate) {
        *self.position.write() = Some(position);
    }

    pub fn clear(&self) {
        *self.position.write() = None;
    }
}

impl PointerSource for SharedPointer {
    fn current_pointer_position(&self) -> Option<Coordinate> {
        *self.position.read()
    }
}

/// Pointer read on a background thread, so the fusion tick only ever
/// touches the cached position. The thread stops once this is dropped.
#[derive(Debug)]
pub struct PolledPointer {
    latest: Arc<SharedPointer>,
    running: Arc<AtomicBool>,
}

impl PolledPointer {
    pub fn spawn<F>(name: &str, period: Duration, mut read: F) -> std::io::Result<Self>
    where
        F: FnMut() -> Option<Coordinate> + Send + 'static,
    {
        let latest = Arc::new(SharedPointer::new());
        let running = Arc::new(AtomicBool::new(true));

        let cell = Arc::clone(&latest);
        let flag = Arc::clone(&running);
        thread::Builder::new().name(name.to_string()).spawn(move || {
            while flag.load(Ordering::Relaxed) {
                match read() {
                    Some(position) => cell.set(position),
                    None => cell.clear(),
                }
                thread::sleep(period);
            }
            log::debug!("Pointer poller stopped");
        })?;

        Ok(Self { latest, running })
    }
}

impl PointerSource for PolledPointer {
    fn current_pointer_position(&self) -> Option<Coordinate> {
        self.latest.current_pointer_position()
    }
}

impl Drop for PolledPointer {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

/// Reads the X11 pointer through `xdotool getmouselocation --shell`
pub struct XdotoolPointer;

impl XdotoolPointer {
    /// True when `xdotool` can be run on this machine
    pub fn is_available() -> bool {
        Command::new("xdotool")
            .arg("version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    /// Poll `xdotool` every `period` on its own thread
    pub fn spawn(period: Duration) -> std::io::Result<PolledPointer> {
        PolledPointer::spawn("xdotool-pointer", period, Self::read)
    }

    /// One blocking `xdotool` call
    pub fn read() -> Option<Coordinate> {
        let output = Command::new("xdotool")
            .args(["getmouselocation", "--shell"])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let text = String::from_utf8(output.stdout).ok()?;
        parse_mouse_location(&text)
    }
}

/// Parse the `X=..` / `Y=..` lines of `xdotool getmouselocation --shell`
pub(crate) fn parse_mouse_location(text: &str) -> Option<Coordinate> {
    let mut x = None;
    let mut y = None;

    for line in text.lines() {
        if let Some((key, val)) = line.trim().split_once('=') {
            match key {
                "X" => x = val.parse::<f64>().ok(),
                "Y" => y = val.parse::<f64>().ok(),
                _ => {}
            }
        }
    }

    Some(Coordinate::new(x?, y?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_parse_mouse_location() {
        let out = "X=812\nY=433\nSCREEN=0\nWINDOW=62914567\n";
        assert_eq!(parse_mouse_location(out), Some(Coordinate::new(812.0, 433.0)));
        assert_eq!(parse_mouse_location("SCREEN=0\n"), None);
    }

    #[test]
    fn test_shared_pointer() {
        let pointer = SharedPointer::new();
        assert!(pointer.current_pointer_position().is_none());
        pointer.set(Coordinate::new(3.0, 4.0));
        assert_eq!(pointer.current_pointer_position(), Some(Coordinate::new(3.0, 4.0)));
        pointer.clear();
        assert!(pointer.current_pointer_position().is_none());
    }

    #[test]
    fn test_closure_pointer() {
        let pointer = || Some(Coordinate::new(1.0, 2.0));
        assert_eq!(pointer.current_pointer_position(), Some(Coordinate::new(1.0, 2.0)));
    }

    #[test]
    fn test_polled_pointer_caches_reads() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let pointer = PolledPointer::spawn("test-pointer", Duration::from_millis(1), move || {
            let n = counter.fetch_add(1, Ordering::Relaxed);
            Some(Coordinate::new(n as f64, 7.0))
        })
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while pointer.current_pointer_position().is_none() {
            assert!(Instant::now() < deadline, "poller never published");
            thread::sleep(Duration::from_millis(1));
        }

        // The cached value comes from a read that already happened
        let position = pointer.current_pointer_position().unwrap();
        assert_eq!(position.y, 7.0);
        assert!((position.x as usize) < calls.load(Ordering::Relaxed));

        drop(pointer);
        thread::sleep(Duration::from_millis(20));
        let stopped = calls.load(Ordering::Relaxed);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(calls.load(Ordering::Relaxed), stopped);
    }
}
