use crate::net::command::Command;
use crate::net::registry::{Registry, SessionId, SessionState};
use crate::telemetry::logging;
use crate::world::direction::Portal;
use crate::world::room::{RoomState, TakeOutcome};

const INVALID_COMMAND: &str = "Invalid command";
const NAME_IN_USE: &str = "Name already in use.";
const ALREADY_JOINED: &str = "You have already joined this room.";
const NOT_JOINED: &str = "You have not joined this room.";
const GOODBYE: &str = "Goodbye";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTransition {
    Stay,
    CloseAfterReply,
}

/// What one dispatch step decided: a reply for the issuer, a message for the
/// other occupants, and whether the issuing session is done.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub reply: Option<String>,
    pub broadcast: Option<String>,
    pub transition: SessionTransition,
}

fn reply_only(text: impl Into<String>) -> DispatchOutcome {
    DispatchOutcome {
        reply: Some(text.into()),
        broadcast: None,
        transition: SessionTransition::Stay,
    }
}

/// One step of the session state machine. Validates the command against the
/// issuer's state, applies the mutation, and describes the messages to send.
/// Runs to completion before the event loop touches the next readiness event,
/// which is what serializes all access to `room` and `registry`.
pub fn dispatch(
    issuer: SessionId,
    command: Command,
    room: &mut RoomState,
    registry: &mut Registry,
) -> DispatchOutcome {
    let (state, name) = match registry.get(issuer) {
        Some(session) => (session.state, session.name.clone()),
        None => {
            return DispatchOutcome {
                reply: None,
                broadcast: None,
                transition: SessionTransition::Stay,
            }
        }
    };

    match &command {
        Command::Invalid(_) | Command::Join(_) => {}
        _ => {
            if state != SessionState::Active {
                return reply_only(NOT_JOINED);
            }
        }
    }
    let name = name.unwrap_or_default();

    match command {
        Command::Invalid(_) => reply_only(INVALID_COMMAND),
        Command::Join(join_name) => {
            if state != SessionState::Joining {
                return reply_only(ALREADY_JOINED);
            }
            if room.has_occupant(&join_name) {
                return reply_only(NAME_IN_USE);
            }
            registry.activate(issuer, &join_name);
            room.add_occupant(&join_name);
            logging::log_room(&format!("{} entered the room", join_name));
            DispatchOutcome {
                reply: Some(room.summary(None)),
                broadcast: Some(format!("User {} entered the room.", join_name)),
                transition: SessionTransition::Stay,
            }
        }
        Command::Exit => {
            room.remove_occupant(&name);
            registry.mark_leaving(issuer);
            logging::log_room(&format!("{} left the room", name));
            DispatchOutcome {
                reply: Some(GOODBYE.to_string()),
                broadcast: Some(format!("User {} has left the server", name)),
                transition: SessionTransition::CloseAfterReply,
            }
        }
        Command::Look => reply_only(room.summary(Some(&name))),
        Command::Take(item) => match room.take(&item) {
            TakeOutcome::Removed => reply_only(format!("{} taken", item)),
            TakeOutcome::NotPresent => {
                reply_only(format!("{} cannot be taken in this room", item))
            }
        },
        Command::Drop(item) => {
            room.drop_item(&item);
            reply_only(format!("{} dropped", item))
        }
        Command::Say(text) => DispatchOutcome {
            reply: Some(format!("You said \"{}\".", text)),
            broadcast: Some(format!("{} said \"{}\"", name, text)),
            transition: SessionTransition::Stay,
        },
        Command::Move(direction) => {
            let Some(neighbor) = room.neighbor(direction).cloned() else {
                return match direction.portal() {
                    Portal::Doorway => {
                        reply_only(format!("There is no door to the {}.", direction.as_str()))
                    }
                    Portal::Hatch => {
                        reply_only(format!("There is no hatch leading {}.", direction.as_str()))
                    }
                };
            };
            // The player has left as soon as the address is handed over; the
            // client owns reconnecting to the neighbor.
            room.remove_occupant(&name);
            registry.mark_leaving(issuer);
            logging::log_room(&format!(
                "{} handed off {} to {}:{}",
                name,
                direction.as_str(),
                neighbor.host,
                neighbor.port
            ));
            DispatchOutcome {
                reply: Some(format!(
                    "{} {} {}",
                    direction.as_upper_str(),
                    neighbor.host,
                    neighbor.port
                )),
                broadcast: Some(format!(
                    "User {} left the room via {}.",
                    name,
                    direction.as_str()
                )),
                transition: SessionTransition::CloseAfterReply,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::command::{parse_command, InvalidReason};
    use crate::world::direction::Direction;
    use crate::world::room::NeighborAddr;
    use std::net::{TcpListener, TcpStream};

    fn test_room(items: &[&str], exits: Vec<(Direction, NeighborAddr)>) -> RoomState {
        RoomState::new(
            "Lantern Room".to_string(),
            "A small room lit by a single lantern.".to_string(),
            items.iter().map(|item| item.to_string()).collect(),
            exits,
        )
    }

    fn test_registry(count: usize) -> (Registry, Vec<SessionId>, Vec<TcpStream>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let mut registry = Registry::new();
        let mut ids = Vec::new();
        let mut clients = Vec::new();
        for _ in 0..count {
            let client = TcpStream::connect(addr).expect("connect test client");
            let (stream, peer) = listener.accept().expect("accept test connection");
            ids.push(registry.register(stream, peer));
            clients.push(client);
        }
        (registry, ids, clients)
    }

    fn join(registry: &mut Registry, room: &mut RoomState, id: SessionId, name: &str) {
        let outcome = dispatch(id, Command::Join(name.to_string()), room, registry);
        assert!(outcome.reply.expect("join reply").contains("Lantern Room"));
    }

    #[test]
    fn join_activates_session_and_broadcasts_entry() {
        let mut room = test_room(&["key"], Vec::new());
        let (mut registry, ids, _clients) = test_registry(1);

        let outcome = dispatch(ids[0], Command::Join("Ann".to_string()), &mut room, &mut registry);
        let reply = outcome.reply.expect("join reply");
        assert!(reply.starts_with("Lantern Room\n\n"));
        assert!(reply.ends_with("In this room, there is:\n  key"));
        assert_eq!(
            outcome.broadcast.as_deref(),
            Some("User Ann entered the room.")
        );
        assert_eq!(outcome.transition, SessionTransition::Stay);
        assert!(room.has_occupant("Ann"));
        assert_eq!(
            registry.get(ids[0]).expect("session").state,
            SessionState::Active
        );
    }

    #[test]
    fn join_with_taken_name_leaves_loser_pre_join() {
        let mut room = test_room(&[], Vec::new());
        let (mut registry, ids, _clients) = test_registry(2);
        join(&mut registry, &mut room, ids[0], "Ann");

        let outcome = dispatch(ids[1], Command::Join("Ann".to_string()), &mut room, &mut registry);
        assert_eq!(outcome.reply.as_deref(), Some("Name already in use."));
        assert!(outcome.broadcast.is_none());
        assert_eq!(
            registry.get(ids[1]).expect("session").state,
            SessionState::Joining
        );
        assert_eq!(room.occupants(), ["Ann"]);

        // The losing session may retry under another name.
        join(&mut registry, &mut room, ids[1], "Ben");
        assert_eq!(room.occupants(), ["Ann", "Ben"]);
    }

    #[test]
    fn join_twice_is_rejected() {
        let mut room = test_room(&[], Vec::new());
        let (mut registry, ids, _clients) = test_registry(1);
        join(&mut registry, &mut room, ids[0], "Ann");

        let outcome = dispatch(ids[0], Command::Join("Ann2".to_string()), &mut room, &mut registry);
        assert_eq!(
            outcome.reply.as_deref(),
            Some("You have already joined this room.")
        );
        assert_eq!(room.occupants(), ["Ann"]);
    }

    #[test]
    fn commands_before_join_are_rejected() {
        let mut room = test_room(&["key"], Vec::new());
        let (mut registry, ids, _clients) = test_registry(1);

        for command in [
            Command::Look,
            Command::Take("key".to_string()),
            Command::Say("hi".to_string()),
            Command::Move(Direction::North),
            Command::Exit,
        ] {
            let outcome = dispatch(ids[0], command, &mut room, &mut registry);
            assert_eq!(
                outcome.reply.as_deref(),
                Some("You have not joined this room.")
            );
        }
        assert_eq!(room.items(), ["key"]);
        assert!(room.occupants().is_empty());
    }

    #[test]
    fn invalid_command_is_reported_to_issuer_only() {
        let mut room = test_room(&[], Vec::new());
        let (mut registry, ids, _clients) = test_registry(1);

        let outcome = dispatch(
            ids[0],
            Command::Invalid(InvalidReason::UnknownCommand),
            &mut room,
            &mut registry,
        );
        assert_eq!(outcome.reply.as_deref(), Some("Invalid command"));
        assert!(outcome.broadcast.is_none());
    }

    #[test]
    fn look_lists_other_occupants_only() {
        let mut room = test_room(&[], Vec::new());
        let (mut registry, ids, _clients) = test_registry(3);
        join(&mut registry, &mut room, ids[0], "Ann");
        join(&mut registry, &mut room, ids[1], "Ben");
        join(&mut registry, &mut room, ids[2], "Cal");

        let outcome = dispatch(ids[1], Command::Look, &mut room, &mut registry);
        let reply = outcome.reply.expect("look reply");
        assert!(reply.ends_with("The other players in this room are:\nAnn\nCal"));
    }

    #[test]
    fn take_follows_room_contents() {
        let mut room = test_room(&["key", "torch"], Vec::new());
        let (mut registry, ids, _clients) = test_registry(1);
        join(&mut registry, &mut room, ids[0], "Ann");

        let outcome = dispatch(ids[0], parse_command("take key"), &mut room, &mut registry);
        assert_eq!(outcome.reply.as_deref(), Some("key taken"));
        assert_eq!(room.items(), ["torch"]);

        let outcome = dispatch(ids[0], parse_command("take key"), &mut room, &mut registry);
        assert_eq!(
            outcome.reply.as_deref(),
            Some("key cannot be taken in this room")
        );
        assert_eq!(room.items(), ["torch"]);
    }

    #[test]
    fn drop_puts_item_back_in_the_room() {
        let mut room = test_room(&[], Vec::new());
        let (mut registry, ids, _clients) = test_registry(1);
        join(&mut registry, &mut room, ids[0], "Ann");

        let outcome = dispatch(ids[0], parse_command("drop key"), &mut room, &mut registry);
        assert_eq!(outcome.reply.as_deref(), Some("key dropped"));
        assert_eq!(room.items(), ["key"]);

        let outcome = dispatch(ids[0], parse_command("take key"), &mut room, &mut registry);
        assert_eq!(outcome.reply.as_deref(), Some("key taken"));
        assert!(room.items().is_empty());
    }

    #[test]
    fn say_echoes_to_issuer_and_broadcasts_to_others() {
        let mut room = test_room(&[], Vec::new());
        let (mut registry, ids, _clients) = test_registry(1);
        join(&mut registry, &mut room, ids[0], "Ann");

        let outcome = dispatch(
            ids[0],
            parse_command("say hello there"),
            &mut room,
            &mut registry,
        );
        assert_eq!(outcome.reply.as_deref(), Some("You said \"hello there\"."));
        assert_eq!(
            outcome.broadcast.as_deref(),
            Some("Ann said \"hello there\"")
        );
    }

    #[test]
    fn exit_removes_occupant_and_closes() {
        let mut room = test_room(&[], Vec::new());
        let (mut registry, ids, _clients) = test_registry(1);
        join(&mut registry, &mut room, ids[0], "Ann");

        let outcome = dispatch(ids[0], Command::Exit, &mut room, &mut registry);
        assert_eq!(outcome.reply.as_deref(), Some("Goodbye"));
        assert_eq!(
            outcome.broadcast.as_deref(),
            Some("User Ann has left the server")
        );
        assert_eq!(outcome.transition, SessionTransition::CloseAfterReply);
        assert!(room.occupants().is_empty());
        assert_eq!(
            registry.get(ids[0]).expect("session").state,
            SessionState::Leaving
        );
    }

    #[test]
    fn move_without_neighbor_keeps_the_player_in_place() {
        let mut room = test_room(&[], Vec::new());
        let (mut registry, ids, _clients) = test_registry(1);
        join(&mut registry, &mut room, ids[0], "Ann");

        let outcome = dispatch(ids[0], parse_command("south"), &mut room, &mut registry);
        assert_eq!(
            outcome.reply.as_deref(),
            Some("There is no door to the south.")
        );
        assert_eq!(outcome.transition, SessionTransition::Stay);
        assert_eq!(room.occupants(), ["Ann"]);

        let outcome = dispatch(ids[0], parse_command("up"), &mut room, &mut registry);
        assert_eq!(
            outcome.reply.as_deref(),
            Some("There is no hatch leading up.")
        );
        assert_eq!(room.occupants(), ["Ann"]);
    }

    #[test]
    fn move_with_neighbor_hands_off_and_releases_the_name() {
        let mut room = test_room(
            &[],
            vec![(
                Direction::North,
                NeighborAddr {
                    host: "host2".to_string(),
                    port: 9000,
                },
            )],
        );
        let (mut registry, ids, _clients) = test_registry(2);
        join(&mut registry, &mut room, ids[0], "Ann");

        let outcome = dispatch(ids[0], parse_command("north"), &mut room, &mut registry);
        assert_eq!(outcome.reply.as_deref(), Some("NORTH host2 9000"));
        assert_eq!(
            outcome.broadcast.as_deref(),
            Some("User Ann left the room via north.")
        );
        assert_eq!(outcome.transition, SessionTransition::CloseAfterReply);
        assert!(room.occupants().is_empty());

        // The name is free again once the hand-off has happened.
        join(&mut registry, &mut room, ids[1], "Ann");
        assert_eq!(room.occupants(), ["Ann"]);
    }

    #[test]
    fn unknown_session_produces_no_messages() {
        let mut room = test_room(&[], Vec::new());
        let mut registry = Registry::new();

        let outcome = dispatch(SessionId(42), Command::Look, &mut room, &mut registry);
        assert!(outcome.reply.is_none());
        assert!(outcome.broadcast.is_none());
    }
}
