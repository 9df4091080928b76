//! Page-window computation for section pagers.
use serde::Serialize;

/// Pages shown on each side of the current page.
const DELTA: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PageLink {
    Page(u32),
    Ellipsis,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagerView {
    pub pages: Vec<PageLink>,
    pub has_prev: bool,
    pub has_next: bool,
}

impl PagerView {
    pub fn new(current: u32, total: u32) -> Self {
        Self {
            pages: visible_pages(current, total),
            has_prev: current > 1,
            has_next: current < total,
        }
    }
}

/// First page, the window around `current`, and the last page, with gaps
/// collapsed into ellipses. Nothing is shown for a single page.
pub fn visible_pages(current: u32, total: u32) -> Vec<PageLink> {
    if total <= 1 {
        return Vec::new();
    }
    let current = current.clamp(1, total);
    let start = current.saturating_sub(DELTA).max(2);
    let end = current.saturating_add(DELTA).min(total - 1);

    let mut pages = vec![PageLink::Page(1)];
    if current.saturating_sub(DELTA) > 2 {
        pages.push(PageLink::Ellipsis);
    }
    pages.extend((start..=end).map(PageLink::Page));
    if current.saturating_add(DELTA) < total - 1 {
        pages.push(PageLink::Ellipsis);
    }
    pages.push(PageLink::Page(total));
    pages
}
