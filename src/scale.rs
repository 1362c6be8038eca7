use crate::types::{NoteSpec, NOTE_NAMES};

/// Semitone offsets of the major (Ionian) scale.
pub const DIATONIC_MAJOR: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];
pub const MINOR_PENTATONIC: [i32; 5] = [0, 3, 5, 7, 10];
pub const CHROMATIC: [i32; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

/// Look up a scale by name, as accepted on the command line.
pub fn named_scale(name: &str) -> Option<&'static [i32]> {
    match name.to_ascii_lowercase().as_str() {
        "major" | "diatonic" => Some(&DIATONIC_MAJOR),
        "pentatonic" => Some(&MINOR_PENTATONIC),
        "chromatic" => Some(&CHROMATIC),
        _ => None,
    }
}

/// Walk the scale degrees upwards from `lowest_note`, octave by octave,
/// until the next pitch would pass `highest_note`.
///
/// The result is ordered by ascending pitch; its length is the number of
/// pitch buckets (grid columns).
pub fn build_scale(lowest_note: i32, highest_note: i32, degrees: &[i32]) -> Vec<NoteSpec> {
    let mut notes = Vec::new();
    if degrees.is_empty() {
        return notes;
    }
    let len = degrees.len();
    for i in 0.. {
        let octave = (i / len) as i32;
        let midi = lowest_note + 12 * octave + degrees[i % len];
        if midi > highest_note {
            break;
        }
        notes.push(NoteSpec {
            midi,
            lowest_note,
            highest_note,
        });
    }
    notes
}

/// MIDI note number to frequency, 12-TET with A4 (69) = 440 Hz.
pub fn mtof(midi: f64) -> f64 {
    440.0 * 2.0f64.powf((midi - 69.0) / 12.0)
}

/// Frequency to (fractional) MIDI note number.
pub fn ftom(hz: f64) -> f64 {
    69.0 + 12.0 * (hz / 440.0).log2()
}

/// "A4", "C#3" etc.
pub fn note_name(midi: i32) -> String {
    let name = NOTE_NAMES[midi.rem_euclid(12) as usize];
    let octave = midi.div_euclid(12) - 1;
    format!("{}{}", name, octave)
}
