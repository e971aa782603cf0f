//! Structured decoding of markdown-shaped streams.
//!
//! Groups the parser's events into (header, bullets...) records. The decoder
//! is restartable per stream via [`SectionDecoder::reset`], but a consumed
//! token stream cannot be replayed.

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::stream::{MarkdownHandler, MarkdownParser, TokenStream};

/// One decoded record: a header and the bullets under it. Bullets that arrive
/// before any header land in a level-0 preamble section with an empty title.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub level: u8,
    pub title: String,
    pub bullets: Vec<String>,
}

#[derive(Default)]
struct Collector {
    sections: Vec<Section>,
    current: Option<Section>,
}

impl Collector {
    fn close_current(&mut self) {
        if let Some(section) = self.current.take() {
            self.sections.push(section);
        }
    }
}

impl MarkdownHandler for Collector {
    fn on_header(&mut self, level: u8, text: &str) {
        self.close_current();
        self.current = Some(Section {
            level,
            title: text.to_string(),
            bullets: Vec::new(),
        });
    }

    fn on_bullet(&mut self, text: &str) {
        self.current
            .get_or_insert_with(Section::default)
            .bullets
            .push(text.to_string());
    }

    fn on_finish(&mut self) {
        self.close_current();
    }
}

/// Incremental (header, bullets...) decoder over streamed markdown.
pub struct SectionDecoder {
    parser: MarkdownParser<Collector>,
}

impl Default for SectionDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionDecoder {
    pub fn new() -> Self {
        Self {
            parser: MarkdownParser::new(Collector::default()),
        }
    }

    pub fn feed(&mut self, fragment: &str) {
        self.parser.feed(fragment);
    }

    /// Closes the current stream and returns the decoded sections.
    pub fn finish(&mut self) -> Vec<Section> {
        self.parser.finish();
        std::mem::take(&mut self.parser.handler_mut().sections)
    }

    /// Rearms the decoder for the next stream.
    pub fn reset(&mut self) {
        self.parser = MarkdownParser::new(Collector::default());
    }

    /// Drains a token stream into sections.
    pub async fn decode_stream(
        &mut self,
        mut stream: TokenStream,
    ) -> Result<Vec<Section>, LlmError> {
        while let Some(token) = stream.next_token().await {
            self.feed(&token?);
        }
        Ok(self.finish())
    }
}

impl std::fmt::Debug for SectionDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionDecoder").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: headers group their bullets; arbitrary token splits do
    /// not change the result.
    #[tokio::test]
    async fn decodes_grouped_sections_from_ragged_tokens() {
        let stream = TokenStream::from_tokens([
            "# Fin", "dings\n- fi", "rst\n- second\n## Det", "ails\n- third\n",
        ]);
        let mut decoder = SectionDecoder::new();
        let sections = decoder.decode_stream(stream).await.unwrap();
        assert_eq!(
            sections,
            vec![
                Section {
                    level: 1,
                    title: "Findings".into(),
                    bullets: vec!["first".into(), "second".into()],
                },
                Section {
                    level: 2,
                    title: "Details".into(),
                    bullets: vec!["third".into()],
                },
            ]
        );
    }

    #[test]
    fn leading_bullets_form_a_preamble_section() {
        let mut decoder = SectionDecoder::new();
        decoder.feed("- loose\n# Titled\n- tied\n");
        let sections = decoder.finish();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].level, 0);
        assert_eq!(sections[0].title, "");
        assert_eq!(sections[0].bullets, vec!["loose"]);
        assert_eq!(sections[1].title, "Titled");
    }

    /// **Scenario**: reset rearms the decoder for a new stream.
    #[test]
    fn reset_allows_decoding_a_second_stream() {
        let mut decoder = SectionDecoder::new();
        decoder.feed("# One\n");
        let first = decoder.finish();
        assert_eq!(first.len(), 1);
        decoder.reset();
        decoder.feed("# Two\n- x\n");
        let second = decoder.finish();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].title, "Two");
        assert_eq!(second[0].bullets, vec!["x"]);
    }
}
