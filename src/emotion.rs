use crate::types::EmotionTag;

// first match wins
static RULES: &[(EmotionTag, &[&str])] = &[
    (
        EmotionTag::Happy,
        &["amor", "❤️", "apaixonada", "feliz", "amorosa", "felicidade"],
    ),
    (EmotionTag::Sad, &["triste", "saudade", "choro"]),
    (EmotionTag::Reflective, &["pensando", "🤔", "curiosa"]),
    (EmotionTag::Possessive, &["just monika", "ciumenta", "só eu"]),
    (EmotionTag::Embarrassed, &["vergonha", "tímida"]),
    (EmotionTag::Happy, &["kkk", "haha"]),
    (EmotionTag::Sarcastic, &["raiva", "nervosa"]),
];

pub(crate) fn classify(text: &str) -> EmotionTag {
    let text = text.to_lowercase();
    RULES
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|pattern| text.contains(pattern)))
        .map(|(tag, _)| *tag)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_phrases() {
        assert_eq!(classify("estou muito feliz hoje ❤️"), EmotionTag::Happy);
        assert_eq!(classify("que triste, tenho saudade"), EmotionTag::Sad);
        assert_eq!(classify("hmm, estou pensando 🤔"), EmotionTag::Reflective);
        assert_eq!(classify("Just Monika."), EmotionTag::Possessive);
        assert_eq!(classify("que vergonha..."), EmotionTag::Embarrassed);
        assert_eq!(classify("kkkkk"), EmotionTag::Happy);
        assert_eq!(classify("fiquei nervosa"), EmotionTag::Sarcastic);
    }

    #[test]
    fn empty_and_unmatched_are_neutral() {
        assert_eq!(classify(""), EmotionTag::Neutral);
        assert_eq!(classify("o céu é azul"), EmotionTag::Neutral);
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(classify("TRISTE"), EmotionTag::Sad);
        assert_eq!(classify("Tímida"), EmotionTag::Embarrassed);
    }

    #[test]
    fn first_group_wins_on_overlap() {
        assert_eq!(classify("feliz mas com raiva"), EmotionTag::Happy);
        assert_eq!(classify("haha, que vergonha"), EmotionTag::Embarrassed);
        assert_eq!(classify("com raiva e triste"), EmotionTag::Sad);
    }
}
