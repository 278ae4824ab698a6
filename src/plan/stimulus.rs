// Stimulus plan: what the screen device shows for each trigger index

use serde::{Deserialize, Serialize};

/// What the two stimulus fields represent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StimulusKind {
    Time,
    Number,
    Alphabet,
}

/// Which side (if any) is visually emphasized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emphasis {
    Normal,
    Left,
    Right,
}

/// One stimulus shown on the screen device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stimulus {
    pub index: usize,
    pub left: String,
    pub right: String,
    #[serde(rename = "type")]
    pub kind: StimulusKind,
    pub emphasize: Emphasis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<String>,
}

/// Mapping from trigger index to stimulus
///
/// Indices line up with the trigger plan the task device sends.
#[derive(Debug, Clone, PartialEq)]
pub struct StimulusPlan {
    stimuli: Vec<Stimulus>,
}

impl StimulusPlan {
    pub fn new(stimuli: Vec<Stimulus>) -> Self {
        Self { stimuli }
    }

    /// Look up the stimulus for a trigger index
    pub fn get(&self, trigger_index: usize) -> Option<&Stimulus> {
        self.stimuli.get(trigger_index)
    }

    pub fn len(&self) -> usize {
        self.stimuli.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stimuli.is_empty()
    }
}

impl Default for StimulusPlan {
    fn default() -> Self {
        use self::Emphasis::{Left as L, Normal as N, Right as R};
        use self::StimulusKind::{Alphabet as A, Number as Num, Time as T};

        let rows: [(&str, &str, StimulusKind, Emphasis, &str); 50] = [
            ("GH", "JN", A, N, "question"),
            ("MX", "GK", A, N, "27-8"),
            ("57", "12", Num, N, "question"),
            ("QF", "RX", A, L, "ank1"),
            ("13", "58", T, N, "question"),
            ("09", "32", T, L, "question"),
            ("73", "40", Num, R, "18+17"),
            ("28", "13", Num, L, "question"),
            ("15", "27", T, N, "ank2"),
            ("SO", "QM", A, L, "question"),
            ("12", "55", T, R, "32-9"),
            ("07", "41", T, R, "question"),
            ("SA", "TN", A, R, "question"),
            ("62", "19", Num, N, "ank3"),
            ("39", "68", Num, R, "question"),
            ("RJ", "QS", A, L, "16+19"),
            ("15", "27", T, N, "question"),
            ("KL", "WF", A, R, "ank1"),
            ("ZR", "HX", A, N, "question"),
            ("23", "19", Num, N, "question"),
            ("07", "41", T, L, "29-14"),
            ("11", "06", T, L, "question"),
            ("42", "75", Num, R, "ank2"),
            ("TA", "CG", A, L, "question"),
            ("QJ", "LM", A, N, "24+18"),
            ("31", "16", Num, L, "question"),
            ("18", "44", T, N, "question"),
            ("21", "15", T, R, "ank3"),
            ("LX", "BZ", A, N, "question"),
            ("62", "19", Num, L, "31-16"),
            ("65", "30", Num, N, "question"),
            ("ND", "JW", A, N, "ank1"),
            ("16", "19", T, R, "question"),
            ("YT", "NI", A, R, "question"),
            ("14", "08", T, N, "17+26"),
            ("45", "72", Num, R, "question"),
            ("10", "47", T, L, "ank2"),
            ("KC", "BR", A, R, "question"),
            ("HU", "NJ", A, R, "28-13"),
            ("10", "47", T, L, "question"),
            ("34", "17", Num, L, "question"),
            ("DI", "PT", A, L, "ank3"),
            ("57", "12", Num, N, "19+24"),
            ("21", "15", T, R, "question"),
            ("LP", "DZ", A, N, "34-17"),
            ("FO", "UZ", A, L, "question"),
            ("17", "43", T, L, "23+19"),
            ("42", "75", Num, R, "question"),
            ("PY", "MD", A, R, "26-18"),
            ("20", "04", T, L, "21+27"),
        ];

        Self::new(
            rows.iter()
                .enumerate()
                .map(|(index, &(left, right, kind, emphasize, prompt))| Stimulus {
                    index,
                    left: left.to_string(),
                    right: right.to_string(),
                    kind,
                    emphasize,
                    prompt_id: Some(prompt.to_string()),
                })
                .collect(),
        )
    }
}
