use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub sentence_aware: bool,
    pub max_sentences: Option<usize>,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            sentence_aware: true,
            max_sentences: None,
        }
    }
}

/// A contiguous span of the source text, before embedding.
///
/// `start..end` are character offsets, half-open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub position: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: SplitterConfig,
}

impl TextSplitter {
    #[must_use]
    pub fn new(config: SplitterConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Split `text` into segments in source order. Same input, same output.
    #[must_use]
    pub fn split(&self, text: &str) -> Vec<Segment> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let chunk_size = self.config.chunk_size.max(1);

        let spans = if self.config.sentence_aware {
            let sentences = split_sentences(&chars);
            let max_sentences = self.config.max_sentences.unwrap_or(usize::MAX).max(1);
            merge_sentences(&sentences, chunk_size, self.config.chunk_overlap, max_sentences)
        } else {
            split_chars(&chars, chunk_size, self.config.chunk_overlap)
        };

        spans
            .into_iter()
            .enumerate()
            .map(|(position, (start, end))| Segment {
                position,
                start,
                end,
                text: chars[start..end].iter().collect(),
            })
            .collect()
    }
}

/// Sentence spans with surrounding whitespace trimmed.
fn split_sentences(chars: &[char]) -> Vec<(usize, usize)> {
    let mut sentences = Vec::new();
    let mut start: Option<usize> = None;
    let mut last_non_ws = 0;

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if !c.is_whitespace() {
            if start.is_none() {
                start = Some(i);
            }
            last_non_ws = i;
        }

        let next = chars.get(i + 1).copied();

        // Paragraph break
        if c == '\n' && next == Some('\n') {
            if let Some(s) = start.take() {
                sentences.push((s, last_non_ws + 1));
            }
            i += 2;
            continue;
        }

        if matches!(c, '.' | '?' | '!')
            && next.is_none_or(char::is_whitespace)
            && let Some(s) = start.take()
        {
            sentences.push((s, i + 1));
        }

        i += 1;
    }

    if let Some(s) = start {
        sentences.push((s, last_non_ws + 1));
    }

    sentences
}

fn sentence_len(sentence: (usize, usize)) -> usize {
    sentence.1 - sentence.0
}

/// Merge sentences into chunk spans, respecting size, overlap and sentence cap.
///
/// Overlap is built from whole trailing sentences of the previous chunk and
/// never includes its first sentence, so every chunk adds at least one new one.
fn merge_sentences(
    sentences: &[(usize, usize)],
    chunk_size: usize,
    chunk_overlap: usize,
    max_sentences: usize,
) -> Vec<(usize, usize)> {
    let mut chunks = Vec::new();
    let mut first = 0;
    let mut fresh = 0;

    while fresh < sentences.len() {
        let span = |from: usize, to: usize| sentences[to].1 - sentences[from].0;

        // Drop overlap sentences from the front until the first new one fits.
        while first < fresh
            && (span(first, fresh) > chunk_size || fresh - first + 1 > max_sentences)
        {
            first += 1;
        }

        let mut last = fresh;
        while last + 1 < sentences.len()
            && last + 2 - first <= max_sentences
            && span(first, last + 1) <= chunk_size
        {
            last += 1;
        }

        chunks.push((sentences[first].0, sentences[last].1));

        let mut overlap_len = 0;
        let mut next_first = last + 1;
        for i in (first + 1..=last).rev() {
            if overlap_len + sentence_len(sentences[i]) > chunk_overlap {
                break;
            }
            overlap_len += sentence_len(sentences[i]);
            next_first = i;
        }

        first = next_first;
        fresh = last + 1;
    }

    chunks
}

fn split_chars(chars: &[char], chunk_size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let mut chunks = Vec::new();
    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        if chars[start..end].iter().any(|c| !c.is_whitespace()) {
            chunks.push((start, end));
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(chunk_size: usize, chunk_overlap: usize, sentence_aware: bool) -> TextSplitter {
        TextSplitter::new(SplitterConfig {
            chunk_size,
            chunk_overlap,
            sentence_aware,
            max_sentences: None,
        })
    }

    fn texts(segments: &[Segment]) -> Vec<&str> {
        segments.iter().map(|s| s.text.as_str()).collect()
    }

    fn sentences(text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        split_sentences(&chars)
            .into_iter()
            .map(|(s, e)| chars[s..e].iter().collect())
            .collect()
    }

    #[test]
    fn empty_document() {
        let splitter = TextSplitter::new(SplitterConfig::default());
        assert!(splitter.split("").is_empty());
        assert!(splitter.split("  \n\n ").is_empty());
    }

    #[test]
    fn single_small_chunk() {
        let segments = TextSplitter::new(SplitterConfig::default()).split("Hello world.");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].position, 0);
        assert_eq!((segments[0].start, segments[0].end), (0, 12));
    }

    #[test]
    fn one_sentence_per_chunk() {
        let splitter = TextSplitter::new(SplitterConfig {
            chunk_size: 1000,
            chunk_overlap: 0,
            sentence_aware: true,
            max_sentences: Some(1),
        });
        let segments = splitter.split("The sky is blue. Water is wet.");
        assert_eq!(texts(&segments), vec!["The sky is blue.", "Water is wet."]);
        assert_eq!((segments[1].start, segments[1].end), (17, 30));
    }

    #[test]
    fn sentence_aware_splitting() {
        let text = "First sentence. Second sentence. Third sentence.";
        let segments = splitter(20, 5, true).split(text);
        assert_eq!(
            texts(&segments),
            vec!["First sentence.", "Second sentence.", "Third sentence."]
        );
        for (i, segment) in segments.iter().enumerate() {
            assert_eq!(segment.position, i);
        }
    }

    #[test]
    fn sentences_are_packed_up_to_chunk_size() {
        let segments = splitter(20, 0, true).split("A b. C d. E f. G h. I j.");
        assert_eq!(texts(&segments), vec!["A b. C d. E f. G h.", "I j."]);
    }

    #[test]
    fn long_sentence_becomes_own_chunk() {
        let text = "Short. This sentence is far longer than the limit. End.";
        let segments = splitter(10, 0, true).split(text);
        assert_eq!(
            texts(&segments),
            vec!["Short.", "This sentence is far longer than the limit.", "End."]
        );
    }

    #[test]
    fn sentence_overlap_repeats_trailing_sentences() {
        let segments = splitter(8, 2, true).split("A. B. C. D. E.");
        assert_eq!(texts(&segments), vec!["A. B. C.", "C. D. E."]);
    }

    #[test]
    fn overlap_never_repeats_whole_chunk() {
        // Each chunk holds one sentence, so no trailing sentence is eligible.
        let segments = splitter(3, 100, true).split("A. B. C.");
        assert_eq!(texts(&segments), vec!["A.", "B.", "C."]);
    }

    #[test]
    fn offsets_index_characters_not_bytes() {
        let text = "Привет мир. Как дела?";
        let segments = splitter(12, 0, true).split(text);
        let chars: Vec<char> = text.chars().collect();
        for segment in &segments {
            let expected: String = chars[segment.start..segment.end].iter().collect();
            assert_eq!(segment.text, expected);
        }
        assert_eq!(texts(&segments), vec!["Привет мир.", "Как дела?"]);
    }

    #[test]
    fn char_splitting_with_overlap() {
        let segments = splitter(10, 3, false).split("abcdefghijklmnopqrstuvwxyz");
        assert!(segments.len() > 1);
        assert_eq!(&segments[0].text[7..10], &segments[1].text[..3]);
        assert_eq!(segments[1].start, 7);
    }

    #[test]
    fn char_split_stops_at_end() {
        let segments = splitter(5, 0, false).split("abcdefghij");
        assert_eq!(texts(&segments), vec!["abcde", "fghij"]);
    }

    #[test]
    fn char_split_full_overlap_makes_progress() {
        let segments = splitter(3, 3, false).split("abcde");
        assert_eq!(texts(&segments), vec!["abc", "bcd", "cde"]);
    }

    #[test]
    fn paragraph_break_splitting() {
        assert_eq!(
            sentences("First paragraph\n\nSecond paragraph"),
            vec!["First paragraph", "Second paragraph"]
        );
    }

    #[test]
    fn single_sentence_no_trailing_space() {
        assert_eq!(sentences("Hello world"), vec!["Hello world"]);
    }

    #[test]
    fn question_and_exclamation_split_sentences() {
        assert_eq!(
            sentences("Is this a question? Yes! It is."),
            vec!["Is this a question?", "Yes!", "It is."]
        );
    }

    #[test]
    fn period_inside_token_does_not_split() {
        assert_eq!(sentences("Version 1.2 is out."), vec!["Version 1.2 is out."]);
    }

    #[test]
    fn split_is_deterministic() {
        let text = "One. Two. Three. Four. Five. Six.";
        let s = splitter(10, 4, true);
        assert_eq!(s.split(text), s.split(text));
    }

    mod proptest_splitter {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(500))]

            #[test]
            fn split_never_panics(
                content in "\\PC{0,3000}",
                chunk_size in 1usize..2000,
                chunk_overlap in 0usize..500,
                sentence_aware in proptest::bool::ANY,
                max_sentences in proptest::option::of(1usize..5),
            ) {
                let splitter = TextSplitter::new(SplitterConfig {
                    chunk_size,
                    chunk_overlap,
                    sentence_aware,
                    max_sentences,
                });
                let _ = splitter.split(&content);
            }

            #[test]
            fn segments_match_their_offsets(
                content in "[a-zé. !?\n]{1,500}",
                chunk_size in 1usize..100,
                chunk_overlap in 0usize..50,
                sentence_aware in proptest::bool::ANY,
            ) {
                let chars: Vec<char> = content.chars().collect();
                let segments = splitter(chunk_size, chunk_overlap, sentence_aware).split(&content);
                for (i, segment) in segments.iter().enumerate() {
                    prop_assert_eq!(segment.position, i);
                    prop_assert!(segment.start < segment.end);
                    let expected: String = chars[segment.start..segment.end].iter().collect();
                    prop_assert_eq!(&segment.text, &expected);
                    prop_assert!(!segment.text.trim().is_empty());
                }
            }

            #[test]
            fn char_chunks_cover_all_content(
                content in "[a-z]{10,500}",
                chunk_size in 10usize..200,
            ) {
                let segments = splitter(chunk_size, 0, false).split(&content);
                let joined: String = segments.iter().map(|s| s.text.as_str()).collect();
                prop_assert_eq!(joined, content);
            }

            #[test]
            fn sentence_chunks_advance(
                content in "[a-z. ]{10,1000}",
                chunk_size in 5usize..100,
                chunk_overlap in 0usize..60,
            ) {
                let segments = splitter(chunk_size, chunk_overlap, true).split(&content);
                for pair in segments.windows(2) {
                    prop_assert!(pair[1].start > pair[0].start);
                    prop_assert!(pair[1].end > pair[0].end);
                }
            }
        }
    }
}
