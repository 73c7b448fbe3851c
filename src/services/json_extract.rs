//! Locates JSON values embedded in free-form model output.
//!
//! Models wrap JSON in prose, markdown fences or both. The scanner walks the
//! text once, tracking string literals so braces inside strings do not count,
//! and records every balanced object/array together with its nested children.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Object,
    Array,
}

/// Byte span of a balanced JSON structure; `end` is inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct JsonSpan {
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) kind: NodeKind,
    pub(crate) children: Vec<JsonSpan>,
}

impl JsonSpan {
    pub(crate) fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..=self.end]
    }
}

struct Frame {
    start: usize,
    kind: NodeKind,
    children: Vec<JsonSpan>,
}

pub(crate) fn find_json_spans(text: &str) -> Vec<JsonSpan> {
    let mut roots = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut in_string = false;
    let mut escape = false;

    for (index, byte) in text.bytes().enumerate() {
        if in_string {
            if escape {
                escape = false;
            } else if byte == b'\\' {
                escape = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        let closing = match byte {
            // Quotes only open a string inside a structure; prose apostrophes
            // and stray quotes outside JSON must not swallow the rest.
            b'"' if !stack.is_empty() => {
                in_string = true;
                continue;
            }
            b'{' => {
                stack.push(Frame { start: index, kind: NodeKind::Object, children: Vec::new() });
                continue;
            }
            b'[' => {
                stack.push(Frame { start: index, kind: NodeKind::Array, children: Vec::new() });
                continue;
            }
            b'}' => NodeKind::Object,
            b']' => NodeKind::Array,
            _ => continue,
        };

        match stack.last() {
            Some(frame) if frame.kind == closing => {}
            // Mismatched closer: drop the broken frame and keep scanning.
            Some(_) => {
                stack.pop();
                continue;
            }
            None => continue,
        }

        if let Some(frame) = stack.pop() {
            let span = JsonSpan { start: frame.start, end: index, kind: frame.kind, children: frame.children };
            match stack.last_mut() {
                Some(parent) => parent.children.push(span),
                None => roots.push(span),
            }
        }
    }

    tracing::trace!(roots = roots.len(), "json spans located");
    roots
}

/// Visits spans outermost first, then their children, returning the first hit.
pub(crate) fn find_map_spans<T>(text: &str, mut f: impl FnMut(&str) -> Option<T>) -> Option<T> {
    fn descend<T>(text: &str, span: &JsonSpan, f: &mut dyn FnMut(&str) -> Option<T>) -> Option<T> {
        if let Some(value) = f(span.slice(text)) {
            return Some(value);
        }
        span.children.iter().find_map(|child| descend(text, child, &mut *f))
    }

    find_json_spans(text).iter().find_map(|span| descend(text, span, &mut f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::de::DeserializeOwned;
    use serde_json::Value;

    fn first_deserializable<T: DeserializeOwned>(text: &str) -> Option<T> {
        find_map_spans(text, |slice| serde_json::from_str::<T>(slice).ok())
    }

    #[test]
    fn finds_object_inside_markdown_fence() {
        let text = "Đây là kết quả:\n```json\n{\"questions\": [{\"question\": \"1+1?\"}]}\n```\nHết.";
        let spans = find_json_spans(text);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].kind, NodeKind::Object);
        let value: Value = serde_json::from_str(spans[0].slice(text)).unwrap();
        assert_eq!(value["questions"][0]["question"], "1+1?");
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let text = r#"{"text": "tập {A} và [B]", "n": 1}"#;
        let spans = find_json_spans(text);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].end, text.len() - 1);
        assert!(spans[0].children.is_empty());
    }

    #[test]
    fn escaped_quotes_do_not_end_strings() {
        let text = r#"prefix {"a": "say \"hi\" {"} suffix"#;
        let value: Value = first_deserializable(text).expect("object");
        assert_eq!(value["a"], "say \"hi\" {");
    }

    #[test]
    fn nested_children_are_tracked() {
        let text = r#"[{"a": [1, 2]}, {"b": {}}]"#;
        let spans = find_json_spans(text);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].kind, NodeKind::Array);
        assert_eq!(spans[0].children.len(), 2);
        assert_eq!(spans[0].children[0].children.len(), 1);
    }

    #[test]
    fn falls_back_to_child_when_outer_does_not_fit() {
        #[derive(serde::Deserialize)]
        struct Only {
            id: u32,
        }

        let text = r#"{"wrapper": true, "inner": {"id": 7}}"#;
        let parsed: Only = first_deserializable(text).expect("child fits");
        assert_eq!(parsed.id, 7);
    }

    #[test]
    fn prose_apostrophes_do_not_hide_json() {
        let text = "Here's the \"list\": [1, 2, 3]";
        let value: Vec<u32> = first_deserializable(text).expect("array");
        assert_eq!(value, vec![1, 2, 3]);
    }

    #[test]
    fn unbalanced_input_yields_nothing() {
        assert!(find_json_spans("{\"a\": [1, 2}").is_empty());
        assert!(first_deserializable::<Value>("no json here").is_none());
    }
}
