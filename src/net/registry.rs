use std::net::{SocketAddr, TcpStream};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u32);

/// Connection lifecycle: a session joins, plays, then leaves. `Leaving` is
/// terminal on the server side; the socket closes once its replies flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Joining,
    Active,
    Leaving,
}

/// One connected player socket and everything the event loop knows about it.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub stream: TcpStream,
    pub peer: SocketAddr,
    pub name: Option<String>,
    pub state: SessionState,
    pub recv_buffer: Vec<u8>,
    pub send_buffer: Vec<u8>,
    pub last_activity: Instant,
}

/// Owns every live session of one room. Lookups return `None` for absent
/// entries; n stays small, so linear scans are fine.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: Vec<Session>,
    next_id: u32,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, stream: TcpStream, peer: SocketAddr) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.sessions.push(Session {
            id,
            stream,
            peer,
            name: None,
            state: SessionState::Joining,
            recv_buffer: Vec::new(),
            send_buffer: Vec::new(),
            last_activity: Instant::now(),
        });
        id
    }

    /// Names the session and marks it Active. The caller checks the occupant
    /// list for conflicts first; activate itself never fails.
    pub fn activate(&mut self, id: SessionId, name: &str) {
        if let Some(session) = self.get_mut(id) {
            session.name = Some(name.to_string());
            session.state = SessionState::Active;
        }
    }

    pub fn mark_leaving(&mut self, id: SessionId) {
        if let Some(session) = self.get_mut(id) {
            session.state = SessionState::Leaving;
        }
    }

    /// Removes and returns the session; dropping it closes the handle.
    /// Idempotent — an absent id is a no-op.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let index = self.sessions.iter().position(|session| session.id == id)?;
        Some(self.sessions.remove(index))
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|session| session.id == id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|session| session.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<SessionId> {
        self.sessions
            .iter()
            .find(|session| session.name.as_deref() == Some(name))
            .map(|session| session.id)
    }

    /// Id snapshot so callers can mutate the registry while iterating.
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|session| session.id).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
