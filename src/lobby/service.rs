//! Lobby service - the single task that owns every room
//!
//! Connections post commands into a bounded channel; timers post events into
//! an unbounded one. The loop applies both in arrival order and then flushes
//! queued messages to each recipient's personal channel.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::LobbyConfig;
use crate::ws::protocol::{ClientMsg, RoomSummary, ServerMsg};

use super::registry::{Outbound, RoomRegistry};
use super::scheduler::{TimerEvent, TokioScheduler};

/// Command queue depth
const INPUT_CAPACITY: usize = 256;

/// Per-connection outgoing queue depth
pub const CONNECTION_CAPACITY: usize = 128;

/// Read-only requests answered by the lobby task
#[derive(Debug)]
pub enum LobbyQuery {
    PublicRooms(oneshot::Sender<Vec<RoomSummary>>),
    Stats(oneshot::Sender<LobbyStats>),
}

/// Everything the lobby task consumes besides timers
#[derive(Debug)]
pub enum LobbyInput {
    Command { conn_id: Uuid, msg: ClientMsg },
    Disconnected { conn_id: Uuid },
    Query(LobbyQuery),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LobbyStats {
    pub rooms: usize,
    pub players_in_rooms: usize,
}

/// Cheap handle for connections and HTTP routes
#[derive(Clone)]
pub struct LobbyHandle {
    input_tx: mpsc::Sender<LobbyInput>,
    connections: Arc<DashMap<Uuid, mpsc::Sender<ServerMsg>>>,
}

impl LobbyHandle {
    /// Register a new connection and get its outgoing message stream
    pub fn register_connection(&self, conn_id: Uuid) -> mpsc::Receiver<ServerMsg> {
        let (tx, rx) = mpsc::channel(CONNECTION_CAPACITY);
        self.connections.insert(conn_id, tx);
        rx
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub async fn send_command(&self, conn_id: Uuid, msg: ClientMsg) -> bool {
        self.input_tx
            .send(LobbyInput::Command { conn_id, msg })
            .await
            .is_ok()
    }

    /// Drop the connection and let the lobby clean up its membership
    pub async fn disconnect(&self, conn_id: Uuid) {
        self.connections.remove(&conn_id);
        if self
            .input_tx
            .send(LobbyInput::Disconnected { conn_id })
            .await
            .is_err()
        {
            warn!(conn_id = %conn_id, "Lobby gone while disconnecting");
        }
    }

    pub async fn public_rooms(&self) -> Option<Vec<RoomSummary>> {
        let (tx, rx) = oneshot::channel();
        self.input_tx
            .send(LobbyInput::Query(LobbyQuery::PublicRooms(tx)))
            .await
            .ok()?;
        rx.await.ok()
    }

    pub async fn stats(&self) -> Option<LobbyStats> {
        let (tx, rx) = oneshot::channel();
        self.input_tx
            .send(LobbyInput::Query(LobbyQuery::Stats(tx)))
            .await
            .ok()?;
        rx.await.ok()
    }
}

/// The lobby task
pub struct Lobby {
    registry: RoomRegistry,
    input_rx: mpsc::Receiver<LobbyInput>,
    timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
    connections: Arc<DashMap<Uuid, mpsc::Sender<ServerMsg>>>,
}

impl Lobby {
    /// Lobby backed by real tokio timers
    pub fn new(config: LobbyConfig) -> (Self, LobbyHandle) {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let registry = RoomRegistry::new(config, Box::new(TokioScheduler::new(timer_tx)));
        Self::with_registry(registry, timer_rx)
    }

    /// Lobby over a caller-built registry; `timer_rx` receives whatever its
    /// scheduler fires
    pub fn with_registry(
        registry: RoomRegistry,
        timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
    ) -> (Self, LobbyHandle) {
        let (input_tx, input_rx) = mpsc::channel(INPUT_CAPACITY);
        let connections = Arc::new(DashMap::new());
        let handle = LobbyHandle {
            input_tx,
            connections: connections.clone(),
        };
        let lobby = Self {
            registry,
            input_rx,
            timer_rx,
            connections,
        };
        (lobby, handle)
    }

    /// Run until every handle is dropped
    pub async fn run(mut self) {
        info!("Lobby started");

        loop {
            tokio::select! {
                input = self.input_rx.recv() => {
                    let Some(input) = input else {
                        break;
                    };
                    self.on_input(input);
                }
                Some(event) = self.timer_rx.recv() => {
                    self.registry.on_timer(event);
                }
            }
            self.flush();
        }

        info!(rooms = self.registry.room_count(), "Lobby stopped");
    }

    fn on_input(&mut self, input: LobbyInput) {
        match input {
            LobbyInput::Command { conn_id, msg } => self.registry.handle(conn_id, msg),
            LobbyInput::Disconnected { conn_id } => {
                debug!(conn_id = %conn_id, "Connection closed");
                self.registry.leave_room(conn_id);
            }
            LobbyInput::Query(LobbyQuery::PublicRooms(reply)) => {
                let _ = reply.send(self.registry.list_public_rooms());
            }
            LobbyInput::Query(LobbyQuery::Stats(reply)) => {
                let _ = reply.send(LobbyStats {
                    rooms: self.registry.room_count(),
                    players_in_rooms: self.registry.connected_players(),
                });
            }
        }
    }

    /// Deliver queued messages. A connection whose queue is full or closed is
    /// disconnected rather than left with a gap in its stream.
    fn flush(&mut self) {
        loop {
            let outgoing = self.registry.drain_outbox();
            if outgoing.is_empty() {
                return;
            }

            let mut stalled = HashSet::new();
            for Outbound { to, msg } in outgoing {
                for conn_id in to {
                    if stalled.contains(&conn_id) {
                        continue;
                    }
                    let Some(tx) = self.connections.get(&conn_id) else {
                        continue;
                    };
                    if let Err(e) = tx.try_send(msg.clone()) {
                        warn!(conn_id = %conn_id, error = %e, "Outgoing queue stalled, disconnecting");
                        stalled.insert(conn_id);
                    }
                }
            }

            // Leaving notifies the rest of the room, so go round again
            for conn_id in stalled {
                self.connections.remove(&conn_id);
                self.registry.leave_room(conn_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::ws::protocol::{RoomSettings, Visibility};

    fn create_msg() -> ClientMsg {
        ClientMsg::CreateRoom(RoomSettings {
            name: "Lobby".into(),
            map: "forest".into(),
            max_players: 2,
            visibility: Visibility::Public,
            round_time: 60,
            nickname: "host".into(),
            character: "Knight_Male".into(),
        })
    }

    #[tokio::test]
    async fn test_commands_reach_their_connection() {
        let (lobby, handle) = Lobby::new(LobbyConfig::default());
        tokio::spawn(lobby.run());

        let conn = Uuid::new_v4();
        let mut rx = handle.register_connection(conn);
        assert!(handle.send_command(conn, create_msg()).await);

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        let first = tokio_test::assert_ok!(first);
        assert!(matches!(first, Some(ServerMsg::RoomCreated { .. })));

        let rooms = handle.public_rooms().await.unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].players, 1);
    }

    #[tokio::test]
    async fn test_disconnect_dissolves_room() {
        let (lobby, handle) = Lobby::new(LobbyConfig::default());
        tokio::spawn(lobby.run());

        let conn = Uuid::new_v4();
        let _rx = handle.register_connection(conn);
        handle.send_command(conn, create_msg()).await;
        handle.disconnect(conn).await;

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats, LobbyStats::default());
        assert_eq!(handle.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_stalled_connection_is_disconnected() {
        let (mut lobby, handle) = Lobby::new(LobbyConfig::default());
        let (host, guest) = (Uuid::new_v4(), Uuid::new_v4());
        // The host never reads its queue
        let _host_rx = handle.register_connection(host);
        let mut guest_rx = handle.register_connection(guest);

        let command = |conn_id, msg| LobbyInput::Command { conn_id, msg };
        lobby.on_input(command(host, create_msg()));
        lobby.flush();
        let room_id = lobby.registry.room_of(&host).cloned().unwrap();
        lobby.on_input(command(
            guest,
            ClientMsg::JoinRoom {
                room_id: room_id.clone(),
                nickname: "guest".into(),
                character: "Elf".into(),
                code: None,
            },
        ));
        lobby.flush();

        // Every toggle broadcasts the roster to both players
        for _ in 0..CONNECTION_CAPACITY * 2 {
            lobby.on_input(command(guest, ClientMsg::ToggleReady));
            lobby.flush();
            while guest_rx.try_recv().is_ok() {}
        }

        assert_eq!(handle.connection_count(), 1);
        assert!(lobby.registry.room_of(&host).is_none());
        assert_eq!(lobby.registry.room_of(&guest), Some(&room_id));
        let room = lobby.registry.room(&room_id).unwrap();
        assert_eq!(room.players.len(), 1);
        assert!(room.is_authority(&guest));
    }
}
