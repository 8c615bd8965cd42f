use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted chat message. `created_at` is unix milliseconds assigned by
/// the store; within a room it orders messages chronologically, with
/// insertion order breaking ties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub room: String,
    pub username: String,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub reactions: Vec<Reaction>,
    pub created_at: i64,
}

/// One emoji on a message and the users who applied it. `users` stays
/// unique in insertion order; an entry never survives with an empty set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub users: Vec<String>,
}

/// Toggle `username` on the `emoji` entry: absent entry is created, a
/// present user is removed (dropping the entry if it empties), an absent
/// user is added.
pub fn toggle_user(reactions: &mut Vec<Reaction>, emoji: &str, username: &str) {
    match reactions.iter_mut().position(|r| r.emoji == emoji) {
        Some(i) => {
            let entry = &mut reactions[i];
            if entry.users.iter().any(|u| u == username) {
                entry.users.retain(|u| u != username);
                if entry.users.is_empty() {
                    reactions.remove(i);
                }
            } else {
                entry.users.push(username.to_owned());
            }
        }
        None => reactions.push(Reaction {
            emoji: emoji.to_owned(),
            users: vec![username.to_owned()],
        }),
    }
}

/// Add-only variant: adds `username` to the emoji's set if absent,
/// otherwise leaves the reactions untouched.
pub fn add_user(reactions: &mut Vec<Reaction>, emoji: &str, username: &str) {
    match reactions.iter_mut().find(|r| r.emoji == emoji) {
        Some(entry) => {
            if !entry.users.iter().any(|u| u == username) {
                entry.users.push(username.to_owned());
            }
        }
        None => reactions.push(Reaction {
            emoji: emoji.to_owned(),
            users: vec![username.to_owned()],
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reaction(emoji: &str, users: &[&str]) -> Reaction {
        Reaction {
            emoji: emoji.to_owned(),
            users: users.iter().map(|u| (*u).to_owned()).collect(),
        }
    }

    #[test]
    fn toggle_twice_round_trips() {
        let before = vec![reaction("🔥", &["carol"])];
        let mut reactions = before.clone();
        toggle_user(&mut reactions, "👍", "alice");
        toggle_user(&mut reactions, "👍", "alice");
        assert_eq!(reactions, before);
    }

    #[test]
    fn toggle_removes_empty_entry() {
        let mut reactions = vec![reaction("👍", &["alice"])];
        toggle_user(&mut reactions, "👍", "alice");
        assert!(reactions.is_empty());
    }

    #[test]
    fn toggle_keeps_one_entry_per_emoji() {
        let mut reactions = Vec::new();
        toggle_user(&mut reactions, "👍", "alice");
        toggle_user(&mut reactions, "👍", "bob");
        assert_eq!(reactions, vec![reaction("👍", &["alice", "bob"])]);
    }

    #[test]
    fn add_user_is_idempotent() {
        let mut reactions = Vec::new();
        add_user(&mut reactions, "❤️", "alice");
        add_user(&mut reactions, "❤️", "alice");
        assert_eq!(reactions, vec![reaction("❤️", &["alice"])]);
    }

    #[test]
    fn wire_names_are_camel_case() {
        let msg = Message {
            id: Uuid::now_v7(),
            room: "general".to_owned(),
            username: "alice".to_owned(),
            text: Some("hi".to_owned()),
            image_url: None,
            reactions: Vec::new(),
            created_at: 1,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value.get("imageUrl").is_some());
        assert!(value.get("createdAt").is_some());
    }
}
