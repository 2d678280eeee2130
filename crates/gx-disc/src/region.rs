//! Console region model

/// Console region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Japan (and Taiwan)
    NtscJ,
    /// The Americas
    NtscU,
    /// Europe, Australia, and other PAL territories
    Pal,
    /// South Korea
    NtscK,
    Unknown,
}

impl Region {
    /// Derive the region from the country-code character of a 6-byte
    /// game ID (its fourth character).
    pub fn from_country_code(code: u8) -> Self {
        match code {
            b'J' | b'W' => Region::NtscJ,
            b'E' | b'N' => Region::NtscU,
            b'P' | b'D' | b'F' | b'I' | b'S' | b'H' | b'U' | b'X' | b'Y' | b'Z' => Region::Pal,
            b'K' | b'Q' | b'T' => Region::NtscK,
            _ => Region::Unknown,
        }
    }

    /// Derive the region from a full game ID string
    pub fn from_game_id(game_id: &str) -> Self {
        game_id
            .as_bytes()
            .get(3)
            .map(|&c| Self::from_country_code(c))
            .unwrap_or(Region::Unknown)
    }

    /// NTSC video standard (PAL is the odd one out)
    pub fn is_ntsc(&self) -> bool {
        !matches!(self, Region::Pal)
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Region::NtscJ => write!(f, "NTSC-J"),
            Region::NtscU => write!(f, "NTSC-U"),
            Region::Pal => write!(f, "PAL"),
            Region::NtscK => write!(f, "NTSC-K"),
            Region::Unknown => write!(f, "unknown"),
        }
    }
}
