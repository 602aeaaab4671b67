use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::net::command::parse_command;
use crate::net::dispatch::dispatch;
use crate::net::registry::{Registry, SessionId, SessionState};
use crate::telemetry::logging;
use crate::world::room::RoomState;

const MAX_LINE_BYTES: usize = 1024;
const READ_CHUNK_BYTES: usize = 512;

#[derive(Debug, Clone)]
pub struct RoomServerConfig {
    pub bind_addr: String,
    pub idle_timeout: Option<Duration>,
    pub poll_interval: Duration,
}

impl Default for RoomServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:0".to_string(),
            idle_timeout: None,
            poll_interval: Duration::from_millis(5),
        }
    }
}

#[derive(Debug, Default)]
pub struct ServerControl {
    shutdown: AtomicBool,
}

impl ServerControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::SeqCst)
    }
}

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_interrupt(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// The handler only flips a flag; the event loop owns every cleanup step, so
/// the handler stays async-signal-safe.
pub fn install_interrupt_handler() {
    unsafe {
        libc::signal(libc::SIGINT, on_interrupt as libc::sighandler_t);
    }
}

fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

enum ReadSweep {
    Idle,
    Progress,
    Disconnected(String),
}

/// One room's serving loop: a non-blocking listener plus every session
/// socket, swept on a single thread. The loop owns `RoomState` and the
/// `Registry`, so dispatch needs no locks.
pub struct RoomServer {
    listener: TcpListener,
    room: RoomState,
    registry: Registry,
    config: RoomServerConfig,
}

impl RoomServer {
    pub fn bind(config: RoomServerConfig, room: RoomState) -> Result<Self, String> {
        let listener = TcpListener::bind(&config.bind_addr)
            .map_err(|err| format!("bind {} failed: {}", config.bind_addr, err))?;
        listener
            .set_nonblocking(true)
            .map_err(|err| format!("listener nonblocking set failed: {}", err))?;
        Ok(Self {
            listener,
            room,
            registry: Registry::new(),
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, String> {
        self.listener
            .local_addr()
            .map_err(|err| format!("listener addr failed: {}", err))
    }

    pub fn room(&self) -> &RoomState {
        &self.room
    }

    pub fn run(mut self, control: &ServerControl) -> Result<(), String> {
        while control.is_running() && !interrupted() {
            let mut worked = self.accept_pending();
            worked |= self.pump_sessions();
            worked |= self.flush_outbound();
            self.reap_finished();
            if !worked {
                thread::sleep(self.config.poll_interval);
            }
        }
        for id in self.registry.ids() {
            self.registry.remove(id);
        }
        logging::log_net("listener closed");
        Ok(())
    }

    fn accept_pending(&mut self) -> bool {
        let mut accepted = false;
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(err) = stream.set_nonblocking(true) {
                        logging::log_error(&format!(
                            "stream nonblocking set failed for {}: {}",
                            peer, err
                        ));
                        continue;
                    }
                    let id = self.registry.register(stream, peer);
                    println!("roomd: new socket registered from {}", peer);
                    logging::log_net(&format!("session {} registered from {}", id.0, peer));
                    accepted = true;
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    logging::log_error(&format!("accept failed: {}", err));
                    break;
                }
            }
        }
        accepted
    }

    fn pump_sessions(&mut self) -> bool {
        let mut worked = false;
        for id in self.registry.ids() {
            match self.read_session(id) {
                ReadSweep::Idle => {}
                ReadSweep::Progress => worked = true,
                ReadSweep::Disconnected(reason) => {
                    worked = true;
                    self.drop_session(id, &reason);
                    continue;
                }
            }
            worked |= self.dispatch_lines(id);
        }
        worked
    }

    fn read_session(&mut self, id: SessionId) -> ReadSweep {
        let idle_timeout = self.config.idle_timeout;
        let Some(session) = self.registry.get_mut(id) else {
            return ReadSweep::Idle;
        };
        if session.state == SessionState::Leaving {
            return ReadSweep::Idle;
        }

        let mut progress = false;
        let mut buf = [0u8; READ_CHUNK_BYTES];
        loop {
            match session.stream.read(&mut buf) {
                Ok(0) => return ReadSweep::Disconnected("peer closed".to_string()),
                Ok(read) => {
                    session.recv_buffer.extend_from_slice(&buf[..read]);
                    session.last_activity = Instant::now();
                    progress = true;
                    if line_in_progress_too_long(&session.recv_buffer) {
                        logging::log_error(&format!(
                            "session {} exceeded the {} byte line limit",
                            id.0, MAX_LINE_BYTES
                        ));
                        return ReadSweep::Disconnected("line limit exceeded".to_string());
                    }
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return ReadSweep::Disconnected(format!("read failed: {}", err)),
            }
        }

        if let Some(timeout) = idle_timeout {
            if session.last_activity.elapsed() >= timeout {
                return ReadSweep::Disconnected("idle timeout".to_string());
            }
        }
        if progress {
            ReadSweep::Progress
        } else {
            ReadSweep::Idle
        }
    }

    fn dispatch_lines(&mut self, id: SessionId) -> bool {
        let mut worked = false;
        loop {
            let line = {
                let Some(session) = self.registry.get_mut(id) else {
                    return worked;
                };
                // A closing session's remaining input is discarded.
                if session.state == SessionState::Leaving {
                    return worked;
                }
                let Some(pos) = session.recv_buffer.iter().position(|&byte| byte == b'\n')
                else {
                    return worked;
                };
                let mut line_bytes: Vec<u8> = session.recv_buffer.drain(..=pos).collect();
                line_bytes.pop();
                if line_bytes.last() == Some(&b'\r') {
                    line_bytes.pop();
                }
                line_bytes
            };
            if line.len() > MAX_LINE_BYTES {
                logging::log_error(&format!(
                    "session {} exceeded the {} byte line limit",
                    id.0, MAX_LINE_BYTES
                ));
                self.drop_session(id, "line limit exceeded");
                return true;
            }
            worked = true;

            let command = parse_command(&String::from_utf8_lossy(&line));
            let outcome = dispatch(id, command, &mut self.room, &mut self.registry);
            if let Some(reply) = outcome.reply {
                self.queue_line(id, &reply);
            }
            if let Some(broadcast) = outcome.broadcast {
                self.queue_broadcast(&broadcast, id);
            }
        }
    }

    fn queue_line(&mut self, id: SessionId, text: &str) {
        if let Some(session) = self.registry.get_mut(id) {
            session.send_buffer.extend_from_slice(text.as_bytes());
            session.send_buffer.push(b'\n');
        }
    }

    /// Queues `text` for every joined session except `except`. Pre-join
    /// sockets never receive broadcasts.
    fn queue_broadcast(&mut self, text: &str, except: SessionId) {
        for id in self.registry.ids() {
            if id == except {
                continue;
            }
            let joined = self
                .registry
                .get(id)
                .map_or(false, |session| session.state == SessionState::Active);
            if joined {
                self.queue_line(id, text);
            }
        }
    }

    fn flush_outbound(&mut self) -> bool {
        let mut worked = false;
        for id in self.registry.ids() {
            let result = {
                let Some(session) = self.registry.get_mut(id) else {
                    continue;
                };
                if session.send_buffer.is_empty() {
                    continue;
                }
                match session.stream.write(&session.send_buffer) {
                    Ok(written) => {
                        session.send_buffer.drain(..written);
                        worked = true;
                        Ok(())
                    }
                    Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(()),
                    Err(err) if err.kind() == ErrorKind::Interrupted => Ok(()),
                    Err(err) => Err(format!("write failed: {}", err)),
                }
            };
            if let Err(reason) = result {
                self.drop_session(id, &reason);
                worked = true;
            }
        }
        worked
    }

    /// Closes sessions that finished leaving once their replies have flushed.
    fn reap_finished(&mut self) {
        for id in self.registry.ids() {
            let done = self.registry.get(id).map_or(false, |session| {
                session.state == SessionState::Leaving && session.send_buffer.is_empty()
            });
            if done {
                if let Some(session) = self.registry.remove(id) {
                    logging::log_net(&format!(
                        "session {} from {} closed",
                        session.id.0, session.peer
                    ));
                }
            }
        }
    }

    /// Abrupt removal: peer close, read/write failure, or a protocol
    /// violation. The departure broadcast still goes out for joined players.
    fn drop_session(&mut self, id: SessionId, reason: &str) {
        let Some(session) = self.registry.remove(id) else {
            return;
        };
        logging::log_net(&format!(
            "session {} from {} dropped: {}",
            session.id.0, session.peer, reason
        ));
        if session.state == SessionState::Active {
            if let Some(name) = session.name {
                self.room.remove_occupant(&name);
                logging::log_room(&format!("{} disconnected", name));
                self.queue_broadcast(&format!("User {} has left the server", name), id);
            }
        }
    }
}

fn line_in_progress_too_long(buffer: &[u8]) -> bool {
    let tail_start = buffer
        .iter()
        .rposition(|&byte| byte == b'\n')
        .map_or(0, |pos| pos + 1);
    buffer.len() - tail_start > MAX_LINE_BYTES
}
