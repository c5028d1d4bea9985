use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    De,
}

/// Sentence announcing the given wall-clock time. The minute clause is left
/// out on the full hour.
pub fn time_announcement(language: Language, hour: u32, minute: u32) -> String {
    match (language, minute) {
        (Language::En, 0) => format!("It is {hour} o'clock."),
        (Language::En, _) => format!("It is {hour} o'clock {minute}."),
        (Language::De, 0) => format!("Es ist {hour} Uhr."),
        (Language::De, _) => format!("Es ist {hour} Uhr {minute}."),
    }
}
