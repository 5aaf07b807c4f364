use crate::CoreError;

pub const MAX_TITLE_LEN: usize = 100;

/// Trims `raw` and checks it is a usable todo title (1..=100 characters).
pub fn validate_title(raw: &str) -> Result<String, CoreError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(CoreError::validation("title", "title is required"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(CoreError::validation(
            "title",
            format!("title must be at most {MAX_TITLE_LEN} characters"),
        ));
    }
    Ok(title.to_string())
}
