//! Unified log format: [withdraw][onebot][self_id] key=value ...

const CONTENT_LOG_MAX_LEN: usize = 120;

/// Log prefix for one bot identity.
#[inline]
pub fn prefix(self_id: &str) -> String {
    let self_id = if self_id.is_empty() { "?" } else { self_id };
    format!("[withdraw][onebot][{}]", self_id)
}

/// Truncate message content for logging (avoid huge dumps). Cuts on a char boundary.
#[inline]
pub fn truncate_content(content: &str, max_len: usize) -> std::borrow::Cow<'_, str> {
    if content.len() <= max_len {
        return std::borrow::Cow::Borrowed(content);
    }
    let mut cut = max_len;
    while !content.is_char_boundary(cut) {
        cut -= 1;
    }
    std::borrow::Cow::Owned(format!("{}... ({} bytes)", &content[..cut], content.len()))
}

#[inline]
pub fn truncate_content_default(content: &str) -> std::borrow::Cow<'_, str> {
    truncate_content(content, CONTENT_LOG_MAX_LEN)
}
