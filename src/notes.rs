use crate::error::EventError;

const NAMES: [&str; 12] = [
    "c", "c#", "d", "d#", "e", "f", "f#", "g", "g#", "a", "a#", "b",
];

/// Name of a note number, with middle C (60) as `c4`.
pub fn note_name(note: i32) -> String {
    let pitch_class = note.rem_euclid(12) as usize;
    let octave = note.div_euclid(12) - 1;
    format!("{}{}", NAMES[pitch_class], octave)
}

/// Parses names like `c4`, `f#2`, `eb-1` into note numbers.
pub fn note_number(name: &str) -> Result<i32, EventError> {
    let invalid = || EventError::InvalidNoteName(name.to_string());
    let lower = name.trim().to_ascii_lowercase();
    let mut chars = lower.chars();

    let base = match chars.next() {
        Some('c') => 0,
        Some('d') => 2,
        Some('e') => 4,
        Some('f') => 5,
        Some('g') => 7,
        Some('a') => 9,
        Some('b') => 11,
        _ => return Err(invalid()),
    };
    let rest = chars.as_str();
    let (accidental, octave) = if let Some(octave) = rest.strip_prefix('#') {
        (1, octave)
    } else if let Some(octave) = rest.strip_prefix('b').filter(|o| !o.is_empty()) {
        (-1, octave)
    } else {
        (0, rest)
    };

    let octave: i32 = octave.parse().map_err(|_| invalid())?;
    octave
        .checked_add(1)
        .and_then(|o| o.checked_mul(12))
        .and_then(|n| n.checked_add(base + accidental))
        .filter(|note| (0..128).contains(note))
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        assert_eq!(note_name(60), "c4");
        assert_eq!(note_name(0), "c-1");
        assert_eq!(note_name(61), "c#4");
        for note in 0..128 {
            assert_eq!(note_number(&note_name(note)), Ok(note));
        }
    }

    #[test]
    fn parses_flats() {
        assert_eq!(note_number("eb4"), Ok(63));
        assert_eq!(note_number("B3"), Ok(59));
    }

    #[test]
    fn rejects_garbage() {
        assert!(note_number("h4").is_err());
        assert!(note_number("c").is_err());
        assert!(note_number("g#9").is_err());
        assert!(note_number("c2147483647").is_err());
        assert!(note_number("b-2147483648").is_err());
    }
}
