//! Kernel command line editing
//!
//! `/boot/cmdline.txt` is a single line of whitespace-separated tokens, each
//! either `key=value` or a bare flag. Edits work on whole tokens so a key that
//! is a prefix of another (`ip` vs `ipv6.disable`) is never touched by mistake.

/// Tokenized kernel command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootCmdline {
    tokens: Vec<String>,
}

fn token_key(token: &str) -> &str {
    token.split_once('=').map(|(k, _)| k).unwrap_or(token)
}

impl BootCmdline {
    pub fn parse(text: &str) -> Self {
        Self {
            tokens: text.split_whitespace().map(|t| t.to_string()).collect(),
        }
    }

    /// Value of the first `key=value` token for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.tokens
            .iter()
            .find(|t| token_key(t) == key)
            .and_then(|t| t.split_once('=').map(|(_, v)| v))
    }

    /// Set `key=value`, replacing the first existing token for `key` in place
    /// (dropping any later duplicates) or appending at the end.
    /// Returns whether the command line changed.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        let directive = format!("{}={}", key, value);
        let before = self.tokens.clone();

        match self.tokens.iter().position(|t| token_key(t) == key) {
            Some(first) => {
                self.tokens[first] = directive;
                let mut index = 0;
                self.tokens.retain(|t| {
                    let keep = index <= first || token_key(t) != key;
                    index += 1;
                    keep
                });
            }
            None => self.tokens.push(directive),
        }

        self.tokens != before
    }

    /// Apply several directives in order; returns whether any changed
    pub fn merge<'a, I>(&mut self, directives: I) -> bool
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut changed = false;
        for (key, value) in directives {
            changed |= self.set(key, value);
        }
        changed
    }

    /// Render as a single line terminated by a newline
    pub fn render(&self) -> String {
        let mut line = self.tokens.join(" ");
        line.push('\n');
        line
    }
}

/// Append `line` to a line-oriented config file unless an identical line exists.
/// Returns the new content, or `None` when nothing needs to change.
pub fn ensure_line(content: &str, line: &str) -> Option<String> {
    if content.lines().any(|l| l.trim() == line) {
        return None;
    }
    let mut updated = content.to_string();
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(line);
    updated.push('\n');
    Some(updated)
}
