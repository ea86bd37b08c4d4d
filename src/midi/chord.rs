//! Chord naming from a set of sounding notes.
//!
//! Notes are reduced to intervals above the lowest one and looked up in a
//! fixed dictionary. Entries whose suffix ends in `/1` or `/2` describe first
//! and second inversions: the root is recovered from the bass by adding the
//! last (first inversion) or second-to-last (second inversion) interval, and
//! the bass is printed after a slash.

use super::NOTE_NAMES;

/// Interval patterns relative to the lowest note, and the chord suffix they name.
const CHORD_PATTERNS: &[(&[u8], &str)] = &[
    // Triads
    (&[0, 4, 7], ""),
    (&[0, 3, 7], "m"),
    (&[0, 3, 6], "dim"),
    (&[0, 4, 8], "aug"),
    (&[0, 2, 7], "sus2"),
    (&[0, 5, 7], "sus4"),
    (&[0, 7], "5"),
    // Triad inversions
    (&[0, 3, 8], "/1"),
    (&[0, 5, 9], "/2"),
    (&[0, 4, 9], "m/1"),
    (&[0, 5, 8], "m/2"),
    (&[0, 3, 9], "dim/1"),
    (&[0, 6, 9], "dim/2"),
    // Sevenths and sixths
    (&[0, 4, 7, 10], "7"),
    (&[0, 4, 7, 11], "maj7"),
    (&[0, 3, 7, 10], "m7"),
    (&[0, 3, 7, 11], "mMaj7"),
    (&[0, 3, 6, 10], "m7b5"),
    (&[0, 3, 6, 9], "dim7"),
    (&[0, 4, 7, 9], "6"),
    (&[0, 3, 7, 9], "m6"),
    (&[0, 4, 10], "7"),
    (&[0, 4, 11], "maj7"),
    (&[0, 3, 10], "m7"),
    // Extensions
    (&[0, 4, 7, 14], "add9"),
    (&[0, 2, 4, 7], "add9"),
    (&[0, 4, 7, 10, 14], "9"),
    (&[0, 4, 7, 11, 14], "maj9"),
    (&[0, 3, 7, 10, 14], "m9"),
    // Seventh inversions
    (&[0, 3, 7, 8], "maj7/1"),
    (&[0, 3, 6, 8], "7/1"),
    (&[0, 3, 5, 9], "7/2"),
    (&[0, 4, 5, 9], "maj7/2"),
];

/// Returns the pitch-class name of a MIDI note ("C", "F#", ...).
fn pitch_class_name(note: u8) -> &'static str {
    NOTE_NAMES[(note % 12) as usize]
}

/// Names the chord formed by `notes`.
///
/// # Arguments
///
/// * `notes` - Sounding note numbers, in any order; duplicates are ignored
///
/// # Returns
///
/// A name such as `"Am"`, `"G7"` or `"C/E"`, or an empty string when the
/// intervals are not in the dictionary.
///
/// # Examples
///
/// ```
/// use midistep::midi::chord_name;
///
/// assert_eq!(chord_name([60, 64, 67]), "C");
/// assert_eq!(chord_name([64, 67, 72]), "C/E");
/// ```
pub fn chord_name(notes: impl IntoIterator<Item = u8>) -> String {
    let mut notes: Vec<u8> = notes.into_iter().collect();
    notes.sort_unstable();
    notes.dedup();

    let Some(&bass) = notes.first() else {
        return String::new();
    };
    let intervals: Vec<u8> = notes.iter().map(|n| n - bass).collect();

    let Some((_, suffix)) = CHORD_PATTERNS
        .iter()
        .find(|(pattern, _)| *pattern == intervals.as_slice())
    else {
        return String::new();
    };

    if let Some(quality) = suffix.strip_suffix("/1") {
        let root = bass.wrapping_add(intervals[intervals.len() - 1]);
        format!(
            "{}{}/{}",
            pitch_class_name(root),
            quality,
            pitch_class_name(bass)
        )
    } else if let Some(quality) = suffix.strip_suffix("/2") {
        let root = bass.wrapping_add(intervals[intervals.len() - 2]);
        format!(
            "{}{}/{}",
            pitch_class_name(root),
            quality,
            pitch_class_name(bass)
        )
    } else {
        format!("{}{}", pitch_class_name(bass), suffix)
    }
}
