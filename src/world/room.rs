use std::fmt::Write as FmtWrite;

use crate::world::direction::{Direction, Portal};

/// Network address of an adjacent room server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborAddr {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeOutcome {
    Removed,
    NotPresent,
}

/// The authoritative state of one location. Owned by the event loop and
/// mutated only from within a dispatch step, which serializes all access.
#[derive(Debug)]
pub struct RoomState {
    name: String,
    description: String,
    items: Vec<String>,
    occupants: Vec<String>,
    exits: Vec<(Direction, NeighborAddr)>,
}

impl RoomState {
    pub fn new(
        name: String,
        description: String,
        items: Vec<String>,
        exits: Vec<(Direction, NeighborAddr)>,
    ) -> Self {
        Self {
            name,
            description,
            items,
            occupants: Vec::new(),
            exits,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    /// Occupant names in join order.
    pub fn occupants(&self) -> &[String] {
        &self.occupants
    }

    pub fn neighbor(&self, direction: Direction) -> Option<&NeighborAddr> {
        self.exits
            .iter()
            .find(|(exit, _)| *exit == direction)
            .map(|(_, addr)| addr)
    }

    /// Removes the first item equal to `item`, if any.
    pub fn take(&mut self, item: &str) -> TakeOutcome {
        match self.items.iter().position(|held| held == item) {
            Some(index) => {
                self.items.remove(index);
                TakeOutcome::Removed
            }
            None => TakeOutcome::NotPresent,
        }
    }

    /// The issuing client is trusted to have been holding the item; the room
    /// only tracks presence, so dropping always succeeds.
    pub fn drop_item(&mut self, item: &str) {
        self.items.push(item.to_string());
    }

    pub fn has_occupant(&self, name: &str) -> bool {
        self.occupants.iter().any(|occupant| occupant == name)
    }

    pub fn add_occupant(&mut self, name: &str) {
        self.occupants.push(name.to_string());
    }

    /// Idempotent; removing an absent name is a no-op.
    pub fn remove_occupant(&mut self, name: &str) {
        if let Some(index) = self.occupants.iter().position(|occupant| occupant == name) {
            self.occupants.remove(index);
        }
    }

    /// Renders the room as text: name, description, exits, items, and, when
    /// `excluding` is given, the other occupants. No trailing newline.
    pub fn summary(&self, excluding: Option<&str>) -> String {
        let mut summary = String::new();
        let _ = write!(summary, "{}\n\n{}\n", self.name, self.description);

        for direction in Direction::ALL {
            if self.neighbor(direction).is_none() {
                continue;
            }
            match direction.portal() {
                Portal::Doorway => {
                    let _ = writeln!(
                        summary,
                        "A doorway leads away from the room to the {}.",
                        direction.as_str()
                    );
                }
                Portal::Hatch => {
                    let _ = writeln!(
                        summary,
                        "A hatch leads out of the room going {}.",
                        direction.as_str()
                    );
                }
            }
        }
        summary.push('\n');

        match self.items.len() {
            0 => summary.push_str("The room is empty."),
            1 => {
                summary.push_str("In this room, there is:\n");
                let _ = write!(summary, "  {}", self.items[0]);
            }
            _ => {
                summary.push_str("In this room, there are:");
                for item in &self.items {
                    let _ = write!(summary, "\n  {}", item);
                }
            }
        }

        if let Some(excluding) = excluding {
            summary.push('\n');
            self.write_other_players(&mut summary, excluding);
        }

        summary
    }

    fn write_other_players(&self, summary: &mut String, excluding: &str) {
        let others: Vec<&str> = self
            .occupants
            .iter()
            .filter(|occupant| occupant.as_str() != excluding)
            .map(String::as_str)
            .collect();
        match others.len() {
            0 => summary.push_str("There are no other players in this room."),
            1 => {
                let _ = write!(
                    summary,
                    "There is one other player in this room: {}.",
                    others[0]
                );
            }
            _ => {
                summary.push_str("The other players in this room are:");
                for name in others {
                    let _ = write!(summary, "\n{}", name);
                }
            }
        }
    }
}
