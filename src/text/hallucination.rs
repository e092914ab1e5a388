//! Hallucination filtering.
//!
//! Whisper narrates over silence: it parrots YouTube outros, loops short
//! word sequences, and echoes its own prompt back. Everything headed for the
//! keyboard passes through these checks first.

/// Full-text matches that are almost always hallucinated on quiet audio.
///
/// Compared against the lowercased, trimmed text with trailing punctuation
/// stripped.
const PARROT_PHRASES: &[&str] = &[
    "thank you",
    "thank you very much",
    "thank you so much",
    "thank you for watching",
    "thanks for watching",
    "thanks for listening",
    "thank you for listening",
    "thanks",
    "please subscribe",
    "like and subscribe",
    "please like and subscribe",
    "don't forget to subscribe",
    "don't forget to like and subscribe",
    "subscribe to my channel",
    "subscribe to the channel",
    "see you next time",
    "see you in the next video",
    "see you in the next one",
    "see you soon",
    "see you later",
    "bye",
    "bye bye",
    "goodbye",
    "good bye",
    "the end",
    "to be continued",
    "stay tuned",
    "share this video with your friends",
    "subtitles by the amara.org community",
    "subtitles created by the amara.org community",
    "subs by www.zeoranger.co.uk",
    "transcribed by https://otter.ai",
    "transcription by castingwords",
    "www.mooji.org",
    "copyright",
    "all rights reserved",
    "music",
    "applause",
    "laughter",
    "silence",
    "foreign",
    "you",
];

/// Normalize for phrase comparison: trim, lowercase, strip trailing
/// sentence punctuation.
fn normalize(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .trim_end_matches(['.', '!', '?'])
        .trim_end()
        .to_string()
}

/// True if the text, as a whole, is a known parroted phrase.
fn is_parrot_phrase(text: &str) -> bool {
    let normalized = normalize(text);
    PARROT_PHRASES.iter().any(|p| normalized == *p)
}

/// True if any 3-word window repeats three or more times.
///
/// Whisper stuck in a decode loop produces "the the the the" or longer
/// cycles; real dictation essentially never repeats a trigram that often in
/// one utterance.
fn has_repetitive_trigram(text: &str) -> bool {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    if words.len() < 5 {
        return false;
    }

    for i in 0..words.len().saturating_sub(2) {
        let window = &words[i..i + 3];
        let count = words
            .windows(3)
            .filter(|w| *w == window)
            .count();
        if count >= 3 {
            return true;
        }
    }
    false
}

/// True if the text is a substring of the rolling context, i.e. the model
/// returned its prompt instead of the new audio. Only meaningful in
/// continuous mode where a prompt was supplied.
pub fn is_prompt_echo(text: &str, last_context_text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.chars().count() < 10 || last_context_text.is_empty() {
        return false;
    }
    last_context_text
        .to_lowercase()
        .contains(&trimmed.to_lowercase())
}

/// Core hallucination test: length, parrot phrases, repetitive trigrams.
///
/// The confidence-based segment drop happens earlier (on the
/// `TranscriptionResult`), and the prompt-echo check is continuous-only;
/// both compose with this.
pub fn is_hallucination(text: &str) -> bool {
    let non_ws: usize = text.chars().filter(|c| !c.is_whitespace()).count();
    if non_ws < 3 {
        return true;
    }
    if is_parrot_phrase(text) {
        return true;
    }
    has_repetitive_trigram(text)
}

/// Combined acceptance test used by the continuous path.
pub fn accepts_with_context(text: &str, last_context_text: &str) -> bool {
    !is_hallucination(text) && !is_prompt_echo(text, last_context_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_rejected() {
        assert!(is_hallucination(""));
        assert!(is_hallucination("  "));
        assert!(is_hallucination("ab"));
        assert!(is_hallucination(" a b "));
        assert!(!is_hallucination("abc"));
    }

    #[test]
    fn parrot_phrases_are_rejected_case_insensitively() {
        assert!(is_hallucination("Thank you."));
        assert!(is_hallucination("  THANKS FOR WATCHING!  "));
        assert!(is_hallucination("Please subscribe"));
        assert!(is_hallucination("Subtitles by the Amara.org community"));
    }

    #[test]
    fn parrot_match_is_whole_text_only() {
        // A real sentence containing a parrot phrase passes
        assert!(!is_hallucination("I wanted to say thank you for the help"));
        assert!(!is_hallucination("thanks for watching the kids tonight"));
    }

    #[test]
    fn repetitive_trigram_is_rejected() {
        assert!(is_hallucination("the cat sat the cat sat the cat sat"));
        assert!(is_hallucination(
            "one two three one two three one two three four"
        ));
    }

    #[test]
    fn two_repeats_are_allowed() {
        assert!(!is_hallucination("the cat sat the cat sat on a mat"));
    }

    #[test]
    fn normal_dictation_is_accepted() {
        assert!(!is_hallucination(
            "Move the meeting to Thursday and send the notes to everyone."
        ));
    }

    #[test]
    fn trigram_check_ignores_case() {
        assert!(is_hallucination("Go on now Go on now go on now"));
    }

    #[test]
    fn prompt_echo_detects_substring() {
        let context = "we should refactor the audio capture module first";
        assert!(is_prompt_echo("refactor the audio capture", context));
        assert!(is_prompt_echo("Refactor The Audio Capture", context));
    }

    #[test]
    fn prompt_echo_needs_ten_chars() {
        let context = "short bit of text";
        assert!(!is_prompt_echo("short bit", context));
    }

    #[test]
    fn prompt_echo_with_empty_context_is_false() {
        assert!(!is_prompt_echo("anything at all here", ""));
    }

    #[test]
    fn fresh_text_is_not_an_echo() {
        let context = "we should refactor the audio capture module first";
        assert!(!is_prompt_echo("now let's look at the tests", context));
    }

    #[test]
    fn accepts_with_context_combines_rules() {
        let context = "previous transcription text lives here";
        assert!(accepts_with_context("completely new sentence", context));
        assert!(!accepts_with_context("thank you", context));
        assert!(!accepts_with_context("transcription text lives", context));
    }

    #[test]
    fn filter_is_idempotent() {
        let context = "some rolling context string";
        let text = "a perfectly ordinary sentence to type";
        let first = accepts_with_context(text, context);
        let second = accepts_with_context(text, context);
        assert_eq!(first, second);
        assert!(first);
    }
}
