/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! The UDP receive thread.
//!
//! One thread per socket, blocking in `recv_from` with a read timeout. Each
//! wakeup (datagram or timeout) gives the handler a chance to run periodic
//! work, and the running flag is checked after every receive returns.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use socket2::{Domain, Protocol, Socket, Type};

use crate::config::SocketConfig;

/// Receives everything the socket thread reads. Runs on the receive thread
/// and owns whatever per-socket state it needs.
pub trait DatagramHandler: Send + 'static {
    fn on_datagram(&mut self, datagram: &[u8], now: Instant);

    /// Periodic work, called at least once per read timeout.
    fn tick(&mut self, now: Instant);

    /// Called once on the receive thread after the loop exits.
    fn on_stop(&mut self) {}
}

/// Binds a UDP socket for `config` with address reuse and the requested
/// kernel receive buffer.
pub fn bind_socket(config: &SocketConfig) -> io::Result<UdpSocket> {
    let addr = config.bind_addr;
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    if let Err(e) = socket.set_recv_buffer_size(config.recv_buffer_bytes) {
        warn!(
            "Could not set receive buffer to {} bytes: {e}",
            config.recv_buffer_bytes
        );
    }
    socket.bind(&addr.into())?;

    let socket: UdpSocket = socket.into();
    socket.set_read_timeout(Some(config.read_timeout()))?;
    Ok(socket)
}

pub struct UdpReceiver;

impl UdpReceiver {
    /// Binds according to `config` and starts the receive thread.
    pub fn spawn<H: DatagramHandler>(
        config: &SocketConfig,
        handler: H,
    ) -> io::Result<ReceiverHandle> {
        let socket = bind_socket(config)?;
        Self::spawn_on(socket, config, handler)
    }

    /// Starts the receive thread on an already bound socket.
    pub fn spawn_on<H: DatagramHandler>(
        socket: UdpSocket,
        config: &SocketConfig,
        handler: H,
    ) -> io::Result<ReceiverHandle> {
        socket.set_read_timeout(Some(config.read_timeout()))?;
        let local_addr = socket.local_addr()?;
        let running = Arc::new(AtomicBool::new(true));

        let receive_loop = ReceiveLoop {
            socket,
            running: running.clone(),
            buffer: vec![0u8; config.max_datagram_bytes],
            tick_interval: config.read_timeout(),
            stall_warning: config.stall_warning(),
        };
        let thread = thread::Builder::new()
            .name(format!("blacknode-rx-{}", local_addr.port()))
            .spawn(move || receive_loop.run(handler))?;

        info!("Receiving on {local_addr}");
        Ok(ReceiverHandle {
            running,
            thread: Some(thread),
            local_addr,
        })
    }
}

struct ReceiveLoop {
    socket: UdpSocket,
    running: Arc<AtomicBool>,
    buffer: Vec<u8>,
    tick_interval: Duration,
    stall_warning: Duration,
}

impl ReceiveLoop {
    fn run<H: DatagramHandler>(mut self, mut handler: H) {
        let started = Instant::now();
        let mut last_datagram = started;
        let mut last_tick = started;
        let mut stalled = false;

        while self.running.load(Ordering::SeqCst) {
            match self.socket.recv_from(&mut self.buffer) {
                Ok((len, _peer)) => {
                    let now = Instant::now();
                    if stalled {
                        info!("Data resumed after {:?}", now - last_datagram);
                        stalled = false;
                    }
                    last_datagram = now;
                    handler.on_datagram(&self.buffer[..len], now);
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) => {}
                Err(e) => {
                    error!("Receive failed: {e}");
                    // Keeps a persistently failing socket from spinning.
                    thread::sleep(self.tick_interval);
                }
            }

            let now = Instant::now();
            if now.saturating_duration_since(last_tick) >= self.tick_interval {
                handler.tick(now);
                last_tick = now;
            }
            if !stalled && now.saturating_duration_since(last_datagram) >= self.stall_warning {
                warn!(
                    "No data received for {}s",
                    now.saturating_duration_since(last_datagram).as_secs()
                );
                stalled = true;
            }
        }

        handler.on_stop();
        debug!("Receive loop exited");
    }
}

/// Owns a running receive thread. Dropping the handle stops it.
pub struct ReceiverHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl ReceiverHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Clears the running flag and joins the thread. Returns within one
    /// read timeout.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Receive thread on {} panicked", self.local_addr);
            } else {
                info!("Stopped receiving on {}", self.local_addr);
            }
        }
    }
}

impl Drop for ReceiverHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorded {
        datagrams: Vec<Vec<u8>>,
        ticks: usize,
        stopped: bool,
    }

    struct RecordingHandler(Arc<Mutex<Recorded>>);

    impl DatagramHandler for RecordingHandler {
        fn on_datagram(&mut self, datagram: &[u8], _now: Instant) {
            self.0.lock().unwrap().datagrams.push(datagram.to_vec());
        }

        fn tick(&mut self, _now: Instant) {
            self.0.lock().unwrap().ticks += 1;
        }

        fn on_stop(&mut self) {
            self.0.lock().unwrap().stopped = true;
        }
    }

    fn loopback_config() -> SocketConfig {
        SocketConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            read_timeout_ms: 10,
            ..SocketConfig::default()
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn delivers_datagrams_and_ticks_while_idle() {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let mut handle =
            UdpReceiver::spawn(&loopback_config(), RecordingHandler(recorded.clone())).unwrap();
        assert!(handle.is_running());

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"hello", handle.local_addr()).unwrap();
        sender.send_to(b"world", handle.local_addr()).unwrap();

        wait_for(|| recorded.lock().unwrap().datagrams.len() == 2);
        wait_for(|| recorded.lock().unwrap().ticks >= 3);

        handle.stop();
        assert!(!handle.is_running());
        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.datagrams, vec![b"hello".to_vec(), b"world".to_vec()]);
        assert!(recorded.stopped);
    }

    #[test]
    fn dropping_the_handle_stops_the_thread() {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let handle =
            UdpReceiver::spawn(&loopback_config(), RecordingHandler(recorded.clone())).unwrap();
        drop(handle);
        assert!(recorded.lock().unwrap().stopped);
    }
}
