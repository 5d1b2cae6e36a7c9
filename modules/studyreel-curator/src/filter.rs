//! Pre-classification eligibility checks, ordered by cost: duplicate lookup
//! (store read), duration (already hydrated by the quota-bearing metadata
//! fetch), then the language heuristic. A candidate that fails here never
//! reaches the classifier.

use std::collections::HashSet;

use anyhow::Result;
use regex::Regex;

use studyreel_common::{Candidate, RejectReason};

use crate::traits::LibraryStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Pass,
    Reject(RejectReason),
}

pub struct EligibilityFilter {
    min_duration_seconds: u32,
    allowed_languages: Vec<String>,
    word_re: Regex,
}

impl EligibilityFilter {
    pub fn new(min_duration_seconds: u32, allowed_languages: Vec<String>) -> Self {
        Self {
            min_duration_seconds,
            allowed_languages,
            word_re: Regex::new(r"[A-Za-z']+").expect("static regex"),
        }
    }

    /// Check 1, cheapest: already admitted, queued for review, or already
    /// seen earlier in this run. Runs before the quota-bearing duration
    /// fetch so duplicates never spend units.
    pub async fn is_duplicate(
        &self,
        candidate: &Candidate,
        seen_this_run: &HashSet<String>,
        library: &dyn LibraryStore,
    ) -> Result<bool> {
        if seen_this_run.contains(&candidate.external_id) {
            return Ok(true);
        }
        library.exists(&candidate.external_id).await
    }

    /// Full check for a hydrated candidate. A missing duration is a
    /// provider failure upstream and must never reach this point — it is a
    /// bug to conflate it with `TooShort`.
    pub async fn admit(
        &self,
        candidate: &Candidate,
        seen_this_run: &HashSet<String>,
        library: &dyn LibraryStore,
    ) -> Result<FilterDecision> {
        if self.is_duplicate(candidate, seen_this_run, library).await? {
            return Ok(FilterDecision::Reject(RejectReason::Duplicate));
        }

        let duration = candidate
            .duration_seconds
            .ok_or_else(|| anyhow::anyhow!("candidate {} reached the filter without a hydrated duration", candidate.external_id))?;
        if duration < self.min_duration_seconds {
            return Ok(FilterDecision::Reject(RejectReason::TooShort));
        }

        if !self.language_allowed(candidate) {
            return Ok(FilterDecision::Reject(RejectReason::LanguageMismatch));
        }

        Ok(FilterDecision::Pass)
    }

    /// Check 3: language of title + description + channel. Non-Latin scripts
    /// are identified by codepoint range; Latin text is taken as English
    /// when it carries common English stopwords, and given the benefit of
    /// the doubt when it is too short to tell.
    pub fn language_allowed(&self, candidate: &Candidate) -> bool {
        let combined = format!(
            "{} {} {}",
            candidate.title, candidate.description, candidate.source_channel
        );
        match self.detect_language(&combined) {
            Some(code) => self.allowed_languages.iter().any(|l| l == code),
            None => true,
        }
    }

    fn detect_language(&self, text: &str) -> Option<&'static str> {
        let mut latin = 0usize;
        let mut kana = 0usize;
        let mut han = 0usize;
        let mut hangul = 0usize;
        let mut cyrillic = 0usize;
        let mut arabic = 0usize;

        for ch in text.chars() {
            match ch {
                'a'..='z' | 'A'..='Z' | '\u{00C0}'..='\u{024F}' => latin += 1,
                '\u{3040}'..='\u{30FF}' => kana += 1,
                '\u{4E00}'..='\u{9FFF}' => han += 1,
                '\u{AC00}'..='\u{D7AF}' => hangul += 1,
                '\u{0400}'..='\u{04FF}' => cyrillic += 1,
                '\u{0600}'..='\u{06FF}' => arabic += 1,
                _ => {}
            }
        }

        let non_latin_max = [
            (kana + han, if kana > 0 { "ja" } else { "zh" }),
            (hangul, "ko"),
            (cyrillic, "ru"),
            (arabic, "ar"),
        ]
        .into_iter()
        .max_by_key(|(count, _)| *count)
        .filter(|(count, _)| *count > latin)
        .map(|(_, code)| code);

        if let Some(code) = non_latin_max {
            return Some(code);
        }

        // Latin-dominant text: claim English only when stopwords back it up.
        const EN_STOPWORDS: &[&str] = &[
            "the", "and", "with", "from", "how", "this", "for", "you", "your", "of", "to", "in",
        ];
        let lowered = text.to_lowercase();
        let words: Vec<&str> = self.word_re.find_iter(&lowered).map(|m| m.as_str()).collect();
        if words.len() < 8 {
            return None;
        }
        let hits = words.iter().filter(|w| EN_STOPWORDS.contains(w)).count();
        if hits > 0 {
            Some("en")
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLibrary;
    use crate::testing::candidate;
    use crate::traits::LibraryStore as _;

    fn filter() -> EligibilityFilter {
        EligibilityFilter::new(70, vec!["en".to_string()])
    }

    #[tokio::test]
    async fn rejects_duration_below_minimum() {
        let library = MemoryLibrary::new();
        let seen = HashSet::new();
        let c = candidate("vid1", "Armbar from closed guard", 65);

        let decision = filter().admit(&c, &seen, &library).await.unwrap();
        assert_eq!(decision, FilterDecision::Reject(RejectReason::TooShort));
    }

    #[tokio::test]
    async fn passes_duration_at_minimum() {
        let library = MemoryLibrary::new();
        let seen = HashSet::new();
        let c = candidate("vid1", "How to finish the armbar from closed guard", 70);

        let decision = filter().admit(&c, &seen, &library).await.unwrap();
        assert_eq!(decision, FilterDecision::Pass);
    }

    #[tokio::test]
    async fn rejects_store_duplicates_before_anything_else() {
        let library = MemoryLibrary::new();
        library
            .insert(&crate::testing::entry("vid1"))
            .await
            .unwrap();
        let seen = HashSet::new();
        // Duration 10s would also fail, but duplicate wins: it is checked first.
        let c = candidate("vid1", "Armbar", 10);

        let decision = filter().admit(&c, &seen, &library).await.unwrap();
        assert_eq!(decision, FilterDecision::Reject(RejectReason::Duplicate));
    }

    #[tokio::test]
    async fn rejects_candidates_seen_earlier_in_the_run() {
        let library = MemoryLibrary::new();
        let mut seen = HashSet::new();
        seen.insert("vid1".to_string());
        let c = candidate("vid1", "Armbar details", 300);

        assert!(filter().is_duplicate(&c, &seen, &library).await.unwrap());
    }

    #[tokio::test]
    async fn missing_duration_is_an_error_not_too_short() {
        let library = MemoryLibrary::new();
        let seen = HashSet::new();
        let mut c = candidate("vid1", "Armbar details", 300);
        c.duration_seconds = None;

        assert!(filter().admit(&c, &seen, &library).await.is_err());
    }

    #[test]
    fn non_latin_titles_are_language_mismatches() {
        let f = filter();
        let mut c = candidate("vid1", "腕ひしぎ十字固めの基本", 300);
        c.description = "クローズドガードからの腕十字".to_string();
        c.source_channel = "柔術チャンネル".to_string();
        assert!(!f.language_allowed(&c));

        let mut c = candidate("vid2", "Рычаг локтя из гарда", 300);
        c.description = "Подробный разбор техники болевого приёма".to_string();
        c.source_channel = "Грэпплинг".to_string();
        assert!(!f.language_allowed(&c));
    }

    #[test]
    fn english_metadata_passes() {
        let f = filter();
        let mut c = candidate("vid1", "Armbar from closed guard", 300);
        c.description = "A detailed breakdown of how to finish the armbar from the closed guard".to_string();
        assert!(f.language_allowed(&c));
    }

    #[test]
    fn short_latin_titles_get_the_benefit_of_the_doubt() {
        let f = filter();
        let c = candidate("vid1", "Armbar details", 300);
        assert!(f.language_allowed(&c));
    }
}
