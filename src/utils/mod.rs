//! Shared helpers: JSON extraction from LLM text and string truncation.

pub mod json_extraction;

pub use json_extraction::{extract_json_object, find_matching_brace};

/// Cut `s` to at most `max` bytes on a char boundary, marking the cut.
pub fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}... [truncated]", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_string() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_long_string() {
        assert_eq!(truncate("hello world", 5), "hello... [truncated]");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let s = "héllo";
        // 'é' spans bytes 1..3
        assert_eq!(truncate(s, 2), "h... [truncated]");
    }
}
