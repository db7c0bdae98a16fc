//! # Dosage Patterns
//!
//! Maps a dosage count and a frequency label to the pattern printed on a
//! prescription, and to the number of doses taken per day.
//!
//! ## Slot Templates
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Frequency              Template            dose=2          per day    │
//! │  ─────────────────────  ──────────────────  ──────────────  ───────    │
//! │  Once daily             [●, ○, ○]           2--x--x         1          │
//! │  Twice daily            [●, ○, ●]           2--x--2         2          │
//! │  Thrice daily           [●, ●, ●]           2--2--2         3          │
//! │  Four times in a day    [●, ●, ●, ●]        2--2--2--2      4          │
//! │  Five times in a day    [● × 5]             2--2--2--2--2   5          │
//! │  Six times in a day     [● × 6]             ...             6          │
//! │  Bedtime                [○, ○, ●]           x--x--2         1          │
//! │  Empty Stomach          [●, ○, ○]           2--x--x         1          │
//! │  (anything else)        [●]                 2               0          │
//! │                                                                         │
//! │  ● active slot → dosage count      ○ inactive slot → "x"              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The pattern string is for display only. Stock deduction uses
//! [`daily_multiplier`], never the pattern.

use serde::{Deserialize, Serialize};

/// Joins the slots of a pattern.
pub const PATTERN_DELIMITER: &str = "--";

/// Rendered in place of an inactive slot.
pub const INACTIVE_SLOT: &str = "x";

// =============================================================================
// Frequency
// =============================================================================

/// How often a medicine is taken.
///
/// Unrecognised labels are preserved as [`Frequency::Other`] so that the
/// prescription still prints what the doctor chose.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Frequency {
    #[default]
    OnceDaily,
    TwiceDaily,
    ThriceDaily,
    FourTimesDaily,
    FiveTimesDaily,
    SixTimesDaily,
    Bedtime,
    EmptyStomach,
    Other(String),
}

impl Frequency {
    /// All labels offered in the prescription form, in display order.
    pub const KNOWN: [Frequency; 8] = [
        Frequency::OnceDaily,
        Frequency::TwiceDaily,
        Frequency::ThriceDaily,
        Frequency::FourTimesDaily,
        Frequency::FiveTimesDaily,
        Frequency::SixTimesDaily,
        Frequency::Bedtime,
        Frequency::EmptyStomach,
    ];

    /// Parses a label. Matching ignores case and surrounding whitespace,
    /// so `"Twice Daily"` and `" Empty Stomach"` both resolve.
    pub fn parse(label: &str) -> Self {
        let trimmed = label.trim();
        match trimmed.to_lowercase().as_str() {
            "once daily" => Frequency::OnceDaily,
            "twice daily" => Frequency::TwiceDaily,
            "thrice daily" => Frequency::ThriceDaily,
            "four times in a day" => Frequency::FourTimesDaily,
            "five times in a day" => Frequency::FiveTimesDaily,
            "six times in a day" => Frequency::SixTimesDaily,
            "bedtime" => Frequency::Bedtime,
            "empty stomach" => Frequency::EmptyStomach,
            _ => Frequency::Other(trimmed.to_string()),
        }
    }

    /// Canonical display label.
    pub fn label(&self) -> &str {
        match self {
            Frequency::OnceDaily => "Once daily",
            Frequency::TwiceDaily => "Twice daily",
            Frequency::ThriceDaily => "Thrice daily",
            Frequency::FourTimesDaily => "Four times in a day",
            Frequency::FiveTimesDaily => "Five times in a day",
            Frequency::SixTimesDaily => "Six times in a day",
            Frequency::Bedtime => "Bedtime",
            Frequency::EmptyStomach => "Empty Stomach",
            Frequency::Other(label) => label,
        }
    }

    /// Slot template; `true` marks an active slot.
    pub fn slots(&self) -> &'static [bool] {
        match self {
            Frequency::OnceDaily | Frequency::EmptyStomach => &[true, false, false],
            Frequency::TwiceDaily => &[true, false, true],
            Frequency::ThriceDaily => &[true, true, true],
            Frequency::FourTimesDaily => &[true; 4],
            Frequency::FiveTimesDaily => &[true; 5],
            Frequency::SixTimesDaily => &[true; 6],
            Frequency::Bedtime => &[false, false, true],
            Frequency::Other(_) => &[true],
        }
    }

    /// Returns true for one of the [`Frequency::KNOWN`] labels.
    pub fn is_known(&self) -> bool {
        !matches!(self, Frequency::Other(_))
    }
}

impl From<String> for Frequency {
    fn from(label: String) -> Self {
        Frequency::parse(&label)
    }
}

impl From<&str> for Frequency {
    fn from(label: &str) -> Self {
        Frequency::parse(label)
    }
}

impl From<Frequency> for String {
    fn from(frequency: Frequency) -> Self {
        frequency.label().to_string()
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Pattern + Multiplier
// =============================================================================

/// Builds the display pattern, e.g. `build_pattern(2, &TwiceDaily)` → `2--x--2`.
///
/// A dosage count of zero is shown as `1`.
///
/// ## Example
/// ```rust
/// use clinic_core::dosage::{build_pattern, Frequency};
///
/// assert_eq!(build_pattern(1, &Frequency::OnceDaily), "1--x--x");
/// assert_eq!(build_pattern(2, &Frequency::Bedtime), "x--x--2");
/// assert_eq!(build_pattern(3, &Frequency::parse("as needed")), "3");
/// ```
pub fn build_pattern(dosage_count: u32, frequency: &Frequency) -> String {
    let dose = dosage_count.max(1).to_string();

    frequency
        .slots()
        .iter()
        .map(|&active| if active { dose.as_str() } else { INACTIVE_SLOT })
        .collect::<Vec<_>>()
        .join(PATTERN_DELIMITER)
}

/// Doses per day for stock deduction. Unknown labels return 0, which makes
/// the prescription line a no-op for stock.
pub fn daily_multiplier(frequency: &Frequency) -> u32 {
    match frequency {
        Frequency::OnceDaily => 1,
        Frequency::TwiceDaily => 2,
        Frequency::ThriceDaily => 3,
        Frequency::FourTimesDaily => 4,
        Frequency::FiveTimesDaily => 5,
        Frequency::SixTimesDaily => 6,
        Frequency::Bedtime | Frequency::EmptyStomach => 1,
        Frequency::Other(_) => 0,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
