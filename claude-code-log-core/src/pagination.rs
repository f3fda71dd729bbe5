//! Session-to-page assignment and next-link patching
//!
//! Sessions pack into fixed-size pages whole: a session is never split.
//! A page closes once its running message count reaches the configured
//! page size, so the session that crossed the limit stays as the last
//! one on its page and an oversized session simply gets a page to
//! itself.

use crate::db::SessionCacheData;
use crate::error::Result;
use std::path::Path;

/// Sentinel opening the patchable next-link region.
pub const PAGINATION_NEXT_LINK_START: &str = "<!-- PAGINATION_NEXT_LINK_START -->";
/// Sentinel closing the patchable next-link region.
pub const PAGINATION_NEXT_LINK_END: &str = "<!-- PAGINATION_NEXT_LINK_END -->";

/// Base name of the combined transcript output.
pub const COMBINED_BASE_NAME: &str = "combined_transcripts";

/// One page's worth of sessions, in page order.
#[derive(Debug, Clone, Default)]
pub struct PageAssignment {
    /// 1-based, dense
    pub page_number: i64,
    pub session_ids: Vec<String>,
    pub message_count: i64,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
}

impl PageAssignment {
    pub fn first_session_id(&self) -> Option<&str> {
        self.session_ids.first().map(String::as_str)
    }

    pub fn last_session_id(&self) -> Option<&str> {
        self.session_ids.last().map(String::as_str)
    }
}

/// Output file name for a page: page 1 keeps the conventional combined
/// name, later pages suffix their number.
pub fn page_output_path(page_number: i64, extension: &str) -> String {
    if page_number <= 1 {
        format!("{}.{}", COMBINED_BASE_NAME, extension)
    } else {
        format!("{}_{}.{}", COMBINED_BASE_NAME, page_number, extension)
    }
}

/// Assign sessions to pages.
///
/// Sessions are taken chronologically by first timestamp. Each is
/// appended to the current page; once the page's message count reaches
/// `page_size` the page closes. Sessions are never split, so a single
/// session larger than the page size occupies one page alone.
pub fn assign_sessions_to_pages(
    sessions: &[SessionCacheData],
    page_size: usize,
) -> Vec<PageAssignment> {
    let mut ordered: Vec<&SessionCacheData> = sessions.iter().collect();
    ordered.sort_by(|a, b| {
        let a_key = a.first_timestamp.as_deref().unwrap_or("");
        let b_key = b.first_timestamp.as_deref().unwrap_or("");
        a_key.cmp(b_key).then(a.session_id.cmp(&b.session_id))
    });

    let mut pages: Vec<PageAssignment> = Vec::new();
    let mut current = PageAssignment {
        page_number: 1,
        ..Default::default()
    };

    for session in ordered {
        current.session_ids.push(session.session_id.clone());
        current.message_count += session.message_count;
        if current.first_timestamp.is_none() {
            current.first_timestamp = session.first_timestamp.clone();
        }
        if let Some(last) = &session.last_timestamp {
            let later = current
                .last_timestamp
                .as_ref()
                .map(|existing| last > existing)
                .unwrap_or(true);
            if later {
                current.last_timestamp = Some(last.clone());
            }
        }

        if current.message_count >= page_size as i64 {
            let next_number = current.page_number + 1;
            pages.push(std::mem::take(&mut current));
            current.page_number = next_number;
        }
    }

    if !current.session_ids.is_empty() {
        pages.push(current);
    }

    pages
}

/// Make the "Next" link on page `page_number` visible after its
/// successor page has been generated.
///
/// The renderer brackets the link with sentinel comments so this can
/// rewrite it in place instead of re-rendering the page. Removing the
/// last-page class is all it takes; an already-visible link and a
/// missing file are both no-ops.
pub fn enable_next_link_on_previous_page(
    dir: &Path,
    page_number: i64,
    extension: &str,
) -> Result<bool> {
    if page_number < 1 {
        return Ok(false);
    }
    let path = dir.join(page_output_path(page_number, extension));
    if !path.exists() {
        return Ok(false);
    }

    let content = std::fs::read_to_string(&path)?;
    let Some(start) = content.find(PAGINATION_NEXT_LINK_START) else {
        return Ok(false);
    };
    let Some(end_offset) = content[start..].find(PAGINATION_NEXT_LINK_END) else {
        return Ok(false);
    };
    let end = start + end_offset + PAGINATION_NEXT_LINK_END.len();

    let region = &content[start..end];
    if !region.contains("last-page") {
        return Ok(false);
    }
    let patched_region = region.replace(" last-page", "").replace("last-page", "");

    let mut patched = String::with_capacity(content.len());
    patched.push_str(&content[..start]);
    patched.push_str(&patched_region);
    patched.push_str(&content[end..]);
    std::fs::write(&path, patched)?;
    Ok(true)
}
