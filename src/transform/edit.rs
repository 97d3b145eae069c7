use oxc_span::Span;

/// Byte-span replacements against one source text.
///
/// Edits are applied back to front. When two edits overlap only the one
/// that starts first (the outer one, for nested nodes) is kept; callers
/// that rewrite nested constructs re-parse and run again until no edits
/// remain.
#[derive(Debug, Default, Clone)]
pub struct Edits {
    replacements: Vec<(u32, u32, String)>,
}

impl Edits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, span: Span, text: impl Into<String>) {
        self.replacements.push((span.start, span.end, text.into()));
    }

    pub fn remove(&mut self, span: Span) {
        self.replace(span, "");
    }

    pub fn insert(&mut self, at: u32, text: impl Into<String>) {
        self.replacements.push((at, at, text.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    pub fn apply(mut self, source: &str) -> String {
        // insertions sort before replacements at the same offset and keep
        // their push order (stable sort); longer replacements win ties
        self.replacements.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| (a.0 != a.1).cmp(&(b.0 != b.1)))
                .then_with(|| b.1.cmp(&a.1))
        });

        let mut kept: Vec<(u32, u32, String)> = Vec::with_capacity(self.replacements.len());
        let mut covered_until = 0u32;
        for (start, end, text) in self.replacements {
            if (end as usize) > source.len() || start > end || start < covered_until {
                continue;
            }
            covered_until = covered_until.max(end);
            kept.push((start, end, text));
        }

        let mut result = source.to_string();
        for (start, end, text) in kept.into_iter().rev() {
            let (start, end) = (start as usize, end as usize);
            let text = pad_identifier_boundaries(&result, start, end, &text);
            result.replace_range(start..end, &text);
        }
        result
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

// `return(0,a)` -> `return a`, not `returna`
fn pad_identifier_boundaries(source: &str, start: usize, end: usize, text: &str) -> String {
    let before = source[..start].chars().next_back();
    let after = source[end..].chars().next();
    let mut padded = String::with_capacity(text.len() + 2);
    if before.is_some_and(is_identifier_char) && text.chars().next().is_some_and(is_identifier_char) {
        padded.push(' ');
    }
    padded.push_str(text);
    if after.is_some_and(is_identifier_char) && text.chars().next_back().is_some_and(is_identifier_char) {
        padded.push(' ');
    }
    padded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edits_apply_back_to_front() {
        let mut edits = Edits::new();
        edits.replace(Span::new(0, 1), "alpha");
        edits.replace(Span::new(4, 5), "beta");
        assert_eq!(edits.apply("a + b;"), "alpha + beta;");
    }

    #[test]
    fn test_overlapping_inner_edit_is_dropped() {
        let mut edits = Edits::new();
        edits.replace(Span::new(2, 4), "X");
        edits.replace(Span::new(0, 6), "outer");
        assert_eq!(edits.apply("(a(b))"), "outer");
    }

    #[test]
    fn test_insertions_keep_order() {
        let mut edits = Edits::new();
        edits.insert(0, "one;");
        edits.insert(0, "two;");
        edits.replace(Span::new(0, 1), "z");
        assert_eq!(edits.apply("a;"), "one;two;z;");
    }

    #[test]
    fn test_identifier_boundaries_get_a_space() {
        let mut edits = Edits::new();
        edits.replace(Span::new(6, 11), "a");
        assert_eq!(edits.apply("return(0,a)"), "return a");

        let mut edits = Edits::new();
        edits.replace(Span::new(0, 2), "true");
        assert_eq!(edits.apply("!0in x"), "true in x");
    }
}
