//! Seat-to-name resolution. The client renders Hero at the bottom of the
//! screen, so visual order and seat numbering are not isomorphic; role
//! markers give exact anchors, rotation from Hero covers the rest.

pub mod aggregate;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

use tracing::{error, warn};

use crate::hands::types::SeatNumber;
use crate::hands::Hand;
use crate::vision::PlayerScan;

pub use aggregate::{aggregate_tables, TableMapping};

const LOG_TARGET: &str = "mapping";

/// Minimum role anchors for the role-based strategy to stand on its own.
const MIN_ROLE_ANCHORS: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MappingStrategy {
    RoleBased,
    Rotation,
}

/// One hand's `anon id -> real name` resolution, with the provenance the
/// aggregator needs for conflict precedence.
#[derive(Clone, Debug)]
pub struct HandMapping {
    pub hand_id: String,
    pub screenshot_id: String,
    pub strategy: MappingStrategy,
    pub roles_populated: usize,
    pub names: BTreeMap<String, String>,
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum MapError {
    /// The same real name landed on two distinct anon ids; the underlying
    /// match is almost certainly wrong and the whole mapping is dropped.
    #[error("duplicate real name `{name}` in hand {hand_id}")]
    DuplicateName { hand_id: String, name: String },
    /// Not enough role anchors and no usable rotation either.
    #[error("insufficient mapping data for hand {hand_id}")]
    InsufficientData { hand_id: String },
}

/// Resolves one matched hand against its screenshot's phase-2 payload.
pub fn map_hand(
    hand: &Hand,
    scan: &PlayerScan,
    screenshot_id: &str,
) -> Result<HandMapping, MapError> {
    let role_based = role_based_assignments(hand, scan);
    let rotation = rotation_assignments(hand, scan);

    let (strategy, assignments) = match (&role_based, &rotation) {
        (Some(roles), Some(rot)) => {
            for (anon, name) in roles {
                if let Some(other) = rot.get(anon) {
                    if other != name {
                        warn!(
                            target: LOG_TARGET,
                            hand_id = %hand.hand_id,
                            screenshot = %screenshot_id,
                            anon = %anon,
                            role_name = %name,
                            rotation_name = %other,
                            "role markers disagree with visual rotation; keeping role-based"
                        );
                    }
                }
            }
            (MappingStrategy::RoleBased, roles.clone())
        }
        (Some(roles), None) => (MappingStrategy::RoleBased, roles.clone()),
        (None, Some(rot)) => (MappingStrategy::Rotation, rot.clone()),
        (None, None) => {
            return Err(MapError::InsufficientData {
                hand_id: hand.hand_id.clone(),
            })
        }
    };

    // duplicate guard: one real name may not cover two anon ids
    let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
    for (anon, name) in &assignments {
        if let Some(previous) = seen.insert(name.as_str(), anon.as_str()) {
            if previous != anon {
                error!(
                    target: LOG_TARGET,
                    hand_id = %hand.hand_id,
                    screenshot = %screenshot_id,
                    name = %name,
                    "duplicate real name across anon ids; discarding hand mapping"
                );
                return Err(MapError::DuplicateName {
                    hand_id: hand.hand_id.clone(),
                    name: name.clone(),
                });
            }
        }
    }

    Ok(HandMapping {
        hand_id: hand.hand_id.clone(),
        screenshot_id: screenshot_id.to_string(),
        strategy,
        roles_populated: scan.roles_populated(),
        names: assignments,
    })
}

/// Pairs role seats in the hand with role names in the scan. When only
/// the dealer marker was read, the blinds are derived clockwise over the
/// visual order before pairing.
fn role_based_assignments(hand: &Hand, scan: &PlayerScan) -> Option<BTreeMap<String, String>> {
    let players = &scan.players;
    if players.is_empty() {
        return None;
    }

    let mut dealer = scan.dealer_player.clone().filter(|n| players.contains(n));
    let mut small_blind = scan
        .small_blind_player
        .clone()
        .filter(|n| players.contains(n));
    let mut big_blind = scan.big_blind_player.clone().filter(|n| players.contains(n));

    if let Some(dealer_name) = &dealer {
        if small_blind.is_none() && big_blind.is_none() {
            if let Some(idx) = players.iter().position(|p| p == dealer_name) {
                small_blind = Some(players[(idx + 1) % players.len()].clone());
                big_blind = Some(players[(idx + 2) % players.len()].clone());
            }
        }
    }

    let given = [&dealer, &small_blind, &big_blind]
        .into_iter()
        .filter(|r| r.is_some())
        .count();
    if given < MIN_ROLE_ANCHORS {
        return None;
    }

    let mut names = BTreeMap::new();
    let pairs: [(Option<SeatNumber>, Option<String>); 3] = [
        (hand.roles.button_seat, dealer),
        (hand.roles.small_blind_seat, small_blind),
        (hand.roles.big_blind_seat, big_blind),
    ];
    let mut anchored = 0usize;
    for (seat, name) in pairs {
        let (Some(seat), Some(name)) = (seat, name) else {
            continue;
        };
        let Some(anon) = hand.alias_at(seat) else {
            continue;
        };
        names.insert(anon.to_string(), name);
        anchored += 1;
    }

    (anchored >= MIN_ROLE_ANCHORS).then_some(names)
}

/// Counter-clockwise rotation anchored at Hero: visual position 1 is the
/// bottom of the screen, position `v` sits at `hero_seat - (v - 1)` with
/// wrap-around over the occupied seats.
fn rotation_assignments(hand: &Hand, scan: &PlayerScan) -> Option<BTreeMap<String, String>> {
    let players = &scan.players;
    if players.is_empty() {
        return None;
    }

    let seats = hand.seat_numbers();
    let hero_idx = seats.iter().position(|&s| s == hand.hero_seat)?;
    let count = seats.len();
    if players.len() != count {
        return None;
    }

    let mut names = BTreeMap::new();
    for (offset, name) in players.iter().enumerate() {
        let seat = seats[(hero_idx + count - (offset % count)) % count];
        let anon = hand.alias_at(seat)?;
        names.insert(anon.to_string(), name.clone());
    }
    Some(names)
}
