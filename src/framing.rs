
pub const CONTENT_PREFIX: &str = "{\"content\":";

/// Byte range of the first closed object at [`CONTENT_PREFIX`], if any.
pub fn extract_object(buffer: &str) -> Option<std::ops::Range<usize>> {
    let start = buffer.find(CONTENT_PREFIX)?;

    let mut depth: u32 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in buffer.as_bytes()[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start..start + offset + 1);
                }
            }
            _ => {}
        }
    }

    None
}

pub fn parse_fragment(raw: &str) -> Option<String> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => match value.get("content") {
            Some(serde_json::Value::String(text)) => Some(text.clone()),
            _ => {
                tracing::debug!("Skipping upstream object without string content");
                None
            }
        },
        Err(err) => {
            tracing::debug!("Skipping malformed upstream object: {}", err);
            None
        }
    }
}

pub fn plain_text_fallback(raw: &str) -> String {
    raw.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty() && !line.starts_with(':'))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug)]
pub struct StreamBuffer {
    text: String,
    pending: Vec<u8>,
    cap: usize,
    extracted: usize,
}

impl StreamBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            text: String::new(),
            pending: Vec::new(),
            cap: cap.max(1),
            extracted: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    // Extract first, then trim the unconsumed tail to `cap`.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.decode(chunk);

        let mut objects = Vec::new();
        while let Some(range) = extract_object(&self.text) {
            objects.push(self.text[range.clone()].to_string());
            self.text.drain(..range.end);
        }
        self.extracted += objects.len();

        if self.text.len() > self.cap {
            let mut cut = self.text.len() - self.cap;
            while !self.text.is_char_boundary(cut) {
                cut += 1;
            }
            tracing::warn!(
                "Stream buffer exceeded {} bytes, dropping {} oldest bytes",
                self.cap,
                cut
            );
            self.text.drain(..cut);
        }

        objects
    }

    pub fn finish(mut self) -> Option<String> {
        if !self.pending.is_empty() {
            self.text.push(char::REPLACEMENT_CHARACTER);
        }
        if self.extracted > 0 {
            return None;
        }
        let text = plain_text_fallback(&self.text);
        if text.is_empty() { None } else { Some(text) }
    }

    // Holds back an incomplete trailing UTF-8 sequence until the next chunk.
    fn decode(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        let mut rest: &[u8] = &self.pending;
        let mut decoded = String::new();

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    decoded.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    decoded.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(bad) => {
                            decoded.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        let remainder = rest.to_vec();
        self.text.push_str(&decoded);
        self.pending = remainder;
    }
}

pub fn collect_fragments(raw: &str) -> String {
    let mut rest = raw;
    let mut fragments = Vec::new();
    let mut found = false;

    while let Some(range) = extract_object(rest) {
        found = true;
        if let Some(text) = parse_fragment(&rest[range.clone()]) {
            fragments.push(text);
        }
        rest = &rest[range.end..];
    }

    if found {
        fragments.concat()
    } else {
        plain_text_fallback(raw)
    }
}
