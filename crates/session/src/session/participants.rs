//! Room roster and speaker labels

use crate::signaling::{Participant, RoomInfo};
use std::collections::HashMap;

/// Speaker key of the local microphone
pub const LOCAL_SPEAKER_KEY: &str = "local";

/// Participants of the current room keyed by peer id
#[derive(Debug, Default)]
pub struct Participants {
    by_peer: HashMap<String, Participant>,
}

impl Participants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the roster with the one carried by `ROOM_INFO`.
    ///
    /// Entries without a peer id cannot be matched to a speaker and are
    /// skipped.
    pub fn replace(&mut self, info: &RoomInfo) {
        self.by_peer = info
            .participants
            .iter()
            .filter_map(|p| {
                let peer_id = p.peer_id.as_deref().filter(|id| !id.is_empty())?;
                Some((peer_id.to_string(), p.clone()))
            })
            .collect();
    }

    pub fn get(&self, peer_id: &str) -> Option<&Participant> {
        self.by_peer.get(peer_id)
    }

    pub fn len(&self) -> usize {
        self.by_peer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_peer.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_peer.clear();
    }

    /// Display label for a speaker key
    pub fn label_for(&self, speaker_key: &str) -> String {
        if speaker_key.is_empty() {
            return "-".to_string();
        }
        if speaker_key == LOCAL_SPEAKER_KEY {
            return "Me".to_string();
        }
        match self.by_peer.get(speaker_key) {
            Some(p) => participant_label(p),
            None => format!("Remote {}", speaker_key.chars().take(8).collect::<String>()),
        }
    }
}

fn participant_label(p: &Participant) -> String {
    let name = match (&p.username, p.user_id) {
        (Some(name), _) if !name.is_empty() => name.clone(),
        (_, Some(id)) if id != 0 => format!("user_{}", id),
        _ => "user".to_string(),
    };
    match p.user_id {
        Some(id) if id != 0 => format!("{} (#{})", name, id),
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(participants: Vec<Participant>) -> RoomInfo {
        RoomInfo {
            session_id: "s-1".into(),
            participants,
            ai_live: None,
        }
    }

    #[test]
    fn test_local_and_empty_keys() {
        let roster = Participants::new();
        assert_eq!(roster.label_for(""), "-");
        assert_eq!(roster.label_for("local"), "Me");
    }

    #[test]
    fn test_known_participant_labels() {
        let mut roster = Participants::new();
        roster.replace(&room(vec![
            Participant {
                user_id: Some(7),
                username: Some("alice".into()),
                peer_id: Some("peer-alice".into()),
                ..Default::default()
            },
            Participant {
                user_id: Some(9),
                peer_id: Some("peer-nine".into()),
                ..Default::default()
            },
            Participant {
                peer_id: Some("peer-anon".into()),
                ..Default::default()
            },
            Participant {
                user_id: Some(3),
                username: Some("ghost".into()),
                ..Default::default()
            },
        ]));

        assert_eq!(roster.len(), 3);
        assert_eq!(roster.label_for("peer-alice"), "alice (#7)");
        assert_eq!(roster.label_for("peer-nine"), "user_9 (#9)");
        assert_eq!(roster.label_for("peer-anon"), "user");
    }

    #[test]
    fn test_unknown_remote_is_truncated() {
        let roster = Participants::new();
        assert_eq!(roster.label_for("0123456789abcdef"), "Remote 01234567");
        assert_eq!(roster.label_for("abc"), "Remote abc");
    }

    #[test]
    fn test_replace_drops_previous_roster() {
        let mut roster = Participants::new();
        roster.replace(&room(vec![Participant {
            user_id: Some(1),
            username: Some("bob".into()),
            peer_id: Some("p-bob".into()),
            ..Default::default()
        }]));
        roster.replace(&room(vec![]));
        assert!(roster.is_empty());
        assert_eq!(roster.label_for("p-bob"), "Remote p-bob");
    }
}
