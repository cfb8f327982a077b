use std::collections::{HashMap, HashSet};

/// Derives topic keywords from page text.
pub trait KeywordExtractor: Send + Sync {
    /// At most `limit` keywords, lower-cased and without duplicates.
    fn extract(&self, text: &str, limit: usize) -> Vec<String>;
}

const ENGLISH_STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "even",
    "few", "for", "from", "further", "get", "got", "had", "has", "have", "having", "he", "her",
    "here", "hers", "herself", "him", "himself", "his", "how", "however", "i", "if", "in",
    "into", "is", "it", "its", "itself", "just", "like", "made", "make", "many", "may", "me",
    "might", "more", "most", "much", "must", "my", "myself", "new", "no", "nor", "not", "now",
    "of", "off", "on", "once", "one", "only", "or", "other", "our", "ours", "ourselves", "out",
    "over", "own", "said", "same", "says", "she", "should", "since", "so", "some", "still",
    "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then", "there",
    "these", "they", "this", "those", "through", "to", "too", "two", "under", "until", "up",
    "us", "use", "used", "very", "was", "we", "well", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "year", "years", "yet", "you",
    "your", "yours", "yourself", "yourselves",
];

/// Frequency-ranked keywords with English stopwords and digits removed.
///
/// Ties are broken by first occurrence, so the result is deterministic.
pub struct StopwordKeywords {
    stopwords: HashSet<&'static str>,
    min_len: usize,
}

impl StopwordKeywords {
    pub fn new() -> Self {
        Self {
            stopwords: ENGLISH_STOPWORDS.iter().copied().collect(),
            min_len: 3,
        }
    }

    fn tokens<'a>(&'a self, text: &'a str) -> impl Iterator<Item = String> + 'a {
        text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-'))
            .map(|raw| {
                raw.chars()
                    .filter(|c| !c.is_ascii_digit())
                    .flat_map(char::to_lowercase)
                    .collect::<String>()
            })
            .map(|t| t.trim_matches(|c: char| c == '\'' || c == '-').to_string())
            .filter(move |t| t.chars().count() >= self.min_len && !self.stopwords.contains(t.as_str()))
    }
}

impl Default for StopwordKeywords {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordExtractor for StopwordKeywords {
    fn extract(&self, text: &str, limit: usize) -> Vec<String> {
        // word -> (count, first position)
        let mut seen: HashMap<String, (usize, usize)> = HashMap::new();
        for (pos, word) in self.tokens(text).enumerate() {
            seen.entry(word).or_insert((0, pos)).0 += 1;
        }

        let mut ranked: Vec<_> = seen.into_iter().collect();
        ranked.sort_by(|(_, (ca, pa)), (_, (cb, pb))| cb.cmp(ca).then(pa.cmp(pb)));
        ranked.into_iter().take(limit).map(|(w, _)| w).collect()
    }
}
