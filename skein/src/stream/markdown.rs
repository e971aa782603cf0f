//! Line-buffered markdown event parser for streaming output.
//!
//! Fragments arrive in arbitrary splits; the parser buffers incomplete lines
//! and flushes on newline or on the final close. Three events reach the
//! handler: headers, bullets, and the end of the stream. Everything else is
//! plain text and ignored.

/// Consumer of markdown structure events.
pub trait MarkdownHandler {
    fn on_header(&mut self, level: u8, text: &str);
    fn on_bullet(&mut self, text: &str);
    fn on_finish(&mut self);
}

/// Incremental markdown parser over streamed text fragments.
#[derive(Debug)]
pub struct MarkdownParser<H: MarkdownHandler> {
    handler: H,
    buffer: String,
    finished: bool,
}

impl<H: MarkdownHandler> MarkdownParser<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            buffer: String::new(),
            finished: false,
        }
    }

    /// Feeds one fragment; complete lines are dispatched immediately.
    pub fn feed(&mut self, fragment: &str) {
        if self.finished {
            return;
        }
        self.buffer.push_str(fragment);
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            self.dispatch(line.trim_end_matches(['\n', '\r']));
        }
    }

    /// Flushes any buffered partial line and fires `on_finish`. Idempotent.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.dispatch(line.trim_end_matches('\r'));
        }
        self.finished = true;
        self.handler.on_finish();
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    fn dispatch(&mut self, line: &str) {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix('#') {
            let extra = rest.chars().take_while(|c| *c == '#').count();
            let level = (1 + extra).min(6) as u8;
            let text = rest[extra..].trim();
            if !text.is_empty() {
                self.handler.on_header(level, text);
            }
            return;
        }
        for marker in ["- ", "* "] {
            if let Some(text) = trimmed.strip_prefix(marker) {
                self.handler.on_bullet(text.trim());
                return;
            }
        }
        // Plain text lines carry no structure; dropped.
    }
}
