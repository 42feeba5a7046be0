use chrono::NaiveDateTime;

pub type SeatNumber = u8; // 1..=9 as printed by the client
pub type Chips = f64;     // dollar amounts; input text is never re-rendered

/// The alias the operator assigns to the account owner in every hand.
pub const HERO: &str = "Hero";

#[derive(Clone, Debug, PartialEq)]
pub struct Seat {
    pub number: SeatNumber,
    pub alias: String, // `Hero` or a 6-8 char lowercase hex token
    pub starting_stack: Chips,
}

/// Blind and button positions, as far as the hand text reveals them.
///
/// Three-handed the button may double as the small blind; both fields are
/// set when the text says so.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Roles {
    pub button_seat: Option<SeatNumber>,
    pub small_blind_seat: Option<SeatNumber>,
    pub big_blind_seat: Option<SeatNumber>,
}

impl Roles {
    pub fn populated(&self) -> usize {
        [self.button_seat, self.small_blind_seat, self.big_blind_seat]
            .iter()
            .filter(|r| r.is_some())
            .count()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stakes {
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub currency: String,
}

/// One parsed hand. `raw_text` is the exact source block; every other
/// field is derived from it.
#[derive(Clone, Debug)]
pub struct Hand {
    pub hand_id: String,
    pub table_name: Option<String>,
    pub stakes: Stakes,
    pub timestamp: NaiveDateTime,
    pub seats: Vec<Seat>,
    pub roles: Roles,
    pub hero_seat: SeatNumber,
    pub hero_hole_cards: Vec<String>, // empty or exactly two tokens
    pub board_cards: Vec<String>,     // up to five, street order
    pub raw_text: String,
    pub source_file: String,
}

impl Hand {
    pub fn seat(&self, number: SeatNumber) -> Option<&Seat> {
        self.seats.iter().find(|s| s.number == number)
    }

    pub fn hero(&self) -> &Seat {
        self.seats
            .iter()
            .find(|s| s.alias == HERO)
            .expect("parser guarantees a hero seat")
    }

    pub fn hero_stack(&self) -> Chips {
        self.hero().starting_stack
    }

    pub fn seat_count(&self) -> usize {
        self.seats.len()
    }

    /// Alias sitting at `number`, if occupied.
    pub fn alias_at(&self, number: SeatNumber) -> Option<&str> {
        self.seat(number).map(|s| s.alias.as_str())
    }

    /// Occupied seat numbers in table order.
    pub fn seat_numbers(&self) -> Vec<SeatNumber> {
        let mut numbers: Vec<SeatNumber> = self.seats.iter().map(|s| s.number).collect();
        numbers.sort_unstable();
        numbers
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.seats.iter().map(|s| s.alias.as_str())
    }
}
