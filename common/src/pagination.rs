/// Page size used by leaderboards and tape lists.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// What to do with a page of results once it arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// Show the received entries; the requested page becomes current.
    Show,
    /// The page came back empty: keep showing the previous entries.
    KeepPrevious,
}

/// Forward/backward navigation state for a paged list.
///
/// Pages are 1-based. A page with fewer entries than the page size marks the
/// end of the list; an empty page past the first keeps the previous page on
/// screen.
#[derive(Debug, Clone)]
pub struct Pager {
    page_size: usize,
    current_page: u32,
    at_end: bool,
    filter_key: Option<String>,
}

impl Pager {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            current_page: 1,
            at_end: false,
            filter_key: None,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn at_end(&self) -> bool {
        self.at_end
    }

    pub fn can_go_back(&self) -> bool {
        self.current_page > 1
    }

    pub fn can_go_forward(&self) -> bool {
        !self.at_end
    }

    pub fn next_page(&self) -> u32 {
        self.current_page + 1
    }

    pub fn previous_page(&self) -> u32 {
        self.current_page.saturating_sub(1).max(1)
    }

    /// Switches to a new filter (e.g. another rule). Returns true when the
    /// filter changed, in which case navigation restarts at page 1.
    pub fn reset_for(&mut self, key: &str) -> bool {
        if self.filter_key.as_deref() == Some(key) {
            return false;
        }
        self.filter_key = Some(key.to_string());
        self.current_page = 1;
        self.at_end = false;
        true
    }

    /// Records the size of the page that came back for `requested_page`.
    pub fn apply(&mut self, requested_page: u32, received: usize) -> PageOutcome {
        if received == 0 && requested_page > 1 {
            self.at_end = true;
            return PageOutcome::KeepPrevious;
        }
        self.at_end = received < self.page_size;
        self.current_page = requested_page.max(1);
        PageOutcome::Show
    }
}

impl Default for Pager {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_page_never_goes_back() {
        let mut pager = Pager::default();
        assert!(!pager.can_go_back());
        pager.apply(1, 10);
        assert!(!pager.can_go_back());
        assert!(pager.can_go_forward());
    }

    #[test]
    fn short_page_marks_end() {
        let mut pager = Pager::new(10);
        assert_eq!(pager.apply(1, 10), PageOutcome::Show);
        assert_eq!(pager.apply(2, 4), PageOutcome::Show);
        assert_eq!(pager.current_page(), 2);
        assert!(pager.at_end());
        assert!(!pager.can_go_forward());
        assert!(pager.can_go_back());
    }

    #[test]
    fn empty_page_keeps_previous_entries() {
        let mut pager = Pager::new(10);
        pager.apply(1, 10);
        pager.apply(2, 10);
        assert_eq!(pager.apply(3, 0), PageOutcome::KeepPrevious);
        assert_eq!(pager.current_page(), 2);
        assert!(!pager.can_go_forward());
    }

    #[test]
    fn empty_first_page_is_shown() {
        let mut pager = Pager::new(10);
        assert_eq!(pager.apply(1, 0), PageOutcome::Show);
        assert!(pager.at_end());
    }

    #[test]
    fn changing_filter_restarts() {
        let mut pager = Pager::new(10);
        assert!(pager.reset_for("rule-a"));
        pager.apply(1, 10);
        pager.apply(2, 3);
        assert!(!pager.reset_for("rule-a"));
        assert_eq!(pager.current_page(), 2);
        assert!(pager.reset_for("rule-b"));
        assert_eq!(pager.current_page(), 1);
        assert!(!pager.at_end());
    }
}
