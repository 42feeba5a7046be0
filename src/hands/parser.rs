use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use super::errors::ParseError;
use super::normalize::{is_player_alias, parse_amount};
use super::types::{Hand, Roles, Seat, SeatNumber, Stakes, HERO};

const LOG_TARGET: &str = "hands::parser";

const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";
const SUMMARY_MARKER: &str = "*** SUMMARY ***";

static HAND_START_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Poker Hand #").expect("hand start pattern"));

static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^Poker Hand #(?P<id>[A-Z]{2}\d+): .+? \((?P<cur>[$€£]?)(?P<sb>[\d,.]+)/[$€£]?(?P<bb>[\d,.]+)\) - (?P<ts>\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2})",
    )
    .expect("header pattern")
});

static TABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Table '(?P<name>[^']*)'").expect("table pattern"));

static BUTTON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Seat #(?P<n>\d+) is the button").expect("button pattern"));

static SEAT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^Seat (?P<n>\d+): (?P<alias>\S+) \((?P<stack>[^)]+) in chips\)")
        .expect("seat pattern")
});

static SB_POST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(?P<alias>[^\s:]+): posts small blind").expect("sb pattern"));

static BB_POST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(?P<alias>[^\s:]+): posts big blind").expect("bb pattern"));

static DEALT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^Dealt to (?P<alias>\S+) \[(?P<cards>[^\]]+)\]").expect("dealt pattern")
});

static SUMMARY_BOARD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Board \[(?P<cards>[^\]]+)\]").expect("board pattern"));

static STREET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\*\*\* (?P<street>FLOP|TURN|RIVER) \*\*\*(?P<rest>.*)$")
        .expect("street pattern")
});

static BRACKET_GROUP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]").expect("bracket pattern"));

static SUMMARY_SEAT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^Seat (?P<n>\d+): (?P<alias>\S+) (?P<rest>.*)$").expect("summary seat pattern")
});

static ACTION_ALIAS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(?P<alias>[^\s:]+): ").expect("action alias pattern"));

/// One input file after parsing: the hands that survived and a count of
/// the blocks that were skipped with a warning.
#[derive(Clone, Debug)]
pub struct ParsedFile {
    pub file_name: String,
    pub hands: Vec<Hand>,
    pub skipped: Vec<SkippedHand>,
}

#[derive(Clone, Debug)]
pub struct SkippedHand {
    pub hand_id: Option<String>,
    pub reason: &'static str,
}

/// Splits a hand-history file into hands.
///
/// Individual malformed hands are skipped with a WARN; the file fails as
/// a whole only when no hand can be recovered from it.
pub fn parse_file(file_name: &str, text: &str) -> Result<ParsedFile, ParseError> {
    let starts: Vec<usize> = HAND_START_RE.find_iter(text).map(|m| m.start()).collect();
    if starts.is_empty() {
        return Err(ParseError::malformed(file_name, "no hand header found"));
    }

    let mut hands = Vec::with_capacity(starts.len());
    let mut skipped = Vec::new();

    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(text.len());
        let block = text[start..end].trim_end_matches(['\n', '\r']);
        match parse_hand(block, file_name) {
            Ok(hand) => hands.push(hand),
            Err(reason) => {
                let hand_id = header_hand_id(block);
                warn!(
                    target: LOG_TARGET,
                    file = %file_name,
                    hand_id = hand_id.as_deref().unwrap_or("?"),
                    reason,
                    "skipping malformed hand"
                );
                skipped.push(SkippedHand { hand_id, reason });
            }
        }
    }

    if hands.is_empty() {
        return Err(ParseError::malformed(file_name, "no parseable hands"));
    }

    Ok(ParsedFile {
        file_name: file_name.to_string(),
        hands,
        skipped,
    })
}

fn header_hand_id(block: &str) -> Option<String> {
    HEADER_RE
        .captures(block)
        .map(|c| c["id"].to_string())
}

fn parse_hand(block: &str, file_name: &str) -> Result<Hand, &'static str> {
    let header = HEADER_RE.captures(block).ok_or("unrecognized header")?;
    let hand_id = header["id"].to_string();
    let timestamp = NaiveDateTime::parse_from_str(&header["ts"], TIMESTAMP_FORMAT)
        .map_err(|_| "bad header timestamp")?;
    let stakes = Stakes {
        small_blind: parse_amount(&header["sb"]).ok_or("bad small blind amount")?,
        big_blind: parse_amount(&header["bb"]).ok_or("bad big blind amount")?,
        currency: match header.name("cur") {
            Some(c) if !c.as_str().is_empty() => c.as_str().to_string(),
            _ => "$".to_string(),
        },
    };

    let table_name = TABLE_RE
        .captures(block)
        .map(|c| c["name"].to_string())
        .filter(|name| !name.trim().is_empty());

    // Seat declarations precede the summary; the `in chips` suffix keeps
    // them distinct from summary seat lines.
    let prelude = block.split(SUMMARY_MARKER).next().unwrap_or(block);
    let mut seats = Vec::new();
    for caps in SEAT_RE.captures_iter(prelude) {
        let number: SeatNumber = caps["n"].parse().map_err(|_| "bad seat number")?;
        let starting_stack = parse_amount(&caps["stack"]).ok_or("bad seat stack")?;
        seats.push(Seat {
            number,
            alias: caps["alias"].to_string(),
            starting_stack,
        });
    }
    if seats.is_empty() {
        return Err("no seat declarations");
    }

    let hero_seats: Vec<SeatNumber> = seats
        .iter()
        .filter(|s| s.alias == HERO)
        .map(|s| s.number)
        .collect();
    let hero_seat = match hero_seats.as_slice() {
        [seat] => *seat,
        [] => return Err("no hero seat"),
        _ => return Err("duplicate hero seat"),
    };

    let roles = extract_roles(block, &seats);
    let hero_hole_cards = extract_hero_cards(block);
    let board_cards = extract_board(block);

    check_alias_coverage(block, &seats)?;

    Ok(Hand {
        hand_id,
        table_name,
        stakes,
        timestamp,
        seats,
        roles,
        hero_seat,
        hero_hole_cards,
        board_cards,
        raw_text: block.to_string(),
        source_file: file_name.to_string(),
    })
}

/// Button from the table-line marker (or the summary), blinds from the
/// post actions (or the summary markers).
fn extract_roles(block: &str, seats: &[Seat]) -> Roles {
    let seat_of = |alias: &str| -> Option<SeatNumber> {
        seats.iter().find(|s| s.alias == alias).map(|s| s.number)
    };

    let mut roles = Roles {
        button_seat: BUTTON_RE
            .captures(block)
            .and_then(|c| c["n"].parse().ok()),
        small_blind_seat: SB_POST_RE
            .captures(block)
            .and_then(|c| seat_of(&c["alias"])),
        big_blind_seat: BB_POST_RE
            .captures(block)
            .and_then(|c| seat_of(&c["alias"])),
    };

    if let Some(summary) = block.split(SUMMARY_MARKER).nth(1) {
        for caps in SUMMARY_SEAT_RE.captures_iter(summary) {
            let number: Option<SeatNumber> = caps["n"].parse().ok();
            let rest = &caps["rest"];
            if roles.button_seat.is_none() && rest.contains("(button)") {
                roles.button_seat = number;
            }
            if roles.small_blind_seat.is_none() && rest.contains("(small blind)") {
                roles.small_blind_seat = number;
            }
            if roles.big_blind_seat.is_none() && rest.contains("(big blind)") {
                roles.big_blind_seat = number;
            }
        }
    }

    roles
}

fn extract_hero_cards(block: &str) -> Vec<String> {
    for caps in DEALT_RE.captures_iter(block) {
        if &caps["alias"] == HERO {
            let cards: Vec<String> = caps["cards"]
                .split_whitespace()
                .map(str::to_string)
                .collect();
            if cards.len() == 2 {
                return cards;
            }
        }
    }
    Vec::new()
}

/// The summary `Board [..]` line when present, otherwise the board is
/// reassembled from the street markers (`*** TURN *** [..] [..]` carries
/// the new card in its last bracket group).
fn extract_board(block: &str) -> Vec<String> {
    if let Some(caps) = SUMMARY_BOARD_RE.captures(block) {
        return caps["cards"].split_whitespace().map(str::to_string).collect();
    }

    let mut board = Vec::new();
    for caps in STREET_RE.captures_iter(block) {
        let groups: Vec<&str> = BRACKET_GROUP_RE
            .captures_iter(&caps["rest"])
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        let cards = match (&caps["street"], groups.as_slice()) {
            ("FLOP", [first, ..]) => *first,
            (_, [.., last]) => *last,
            _ => continue,
        };
        board.extend(cards.split_whitespace().map(str::to_string));
    }
    board
}

/// Every alias acting in the text must own a declared seat.
fn check_alias_coverage(block: &str, seats: &[Seat]) -> Result<(), &'static str> {
    for caps in ACTION_ALIAS_RE.captures_iter(block) {
        let alias = &caps["alias"];
        if is_player_alias(alias) && !seats.iter().any(|s| s.alias == alias) {
            return Err("action by undeclared alias");
        }
    }
    Ok(())
}
