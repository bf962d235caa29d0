/// Near-bottom distance (in rows) used to resume follow mode.
const AUTO_FOLLOW_RESUME_THRESHOLD: f32 = 2.0;
/// Small delta used to ignore fractional scroll jitter.
const SCROLL_DELTA_EPSILON: f32 = 0.5;

/// Tracks whether the transcript should stick to its latest turn.
///
/// Offsets grow downwards: `0` is the top and `max_offset` is the tail. The view reports
/// what it observed and asks whether to jump to the bottom before drawing.
#[derive(Debug, Clone)]
pub struct ScrollManager {
    pending_scroll_to_bottom: bool,
    follow_bottom: bool,
    last_scroll_offset: f32,
    last_max_offset: f32,
}

impl ScrollManager {
    pub fn new() -> Self {
        Self {
            pending_scroll_to_bottom: false,
            follow_bottom: true,
            last_scroll_offset: 0.0,
            last_max_offset: 0.0,
        }
    }

    pub fn is_following_bottom(&self) -> bool {
        self.follow_bottom
    }

    pub fn has_pending_scroll(&self) -> bool {
        self.pending_scroll_to_bottom
    }

    pub fn request_scroll_to_bottom(&mut self) {
        self.pending_scroll_to_bottom = true;
        self.follow_bottom = true;
    }

    pub fn request_scroll_to_bottom_if_following(&mut self) {
        if self.follow_bottom || self.was_near_bottom() {
            self.pending_scroll_to_bottom = true;
        }
    }

    pub fn reset(&mut self) {
        self.last_scroll_offset = 0.0;
        self.last_max_offset = 0.0;
        self.follow_bottom = true;
        self.pending_scroll_to_bottom = true;
    }

    /// Feeds one viewport observation and updates follow mode.
    pub fn observe_viewport(&mut self, offset: f32, max_offset: f32) {
        let offset_delta = offset - self.last_scroll_offset;
        let content_size_changed = (max_offset - self.last_max_offset).abs() > SCROLL_DELTA_EPSILON;
        let user_scrolled_up = offset_delta < -SCROLL_DELTA_EPSILON && !content_size_changed;
        let user_scrolled_down = offset_delta > SCROLL_DELTA_EPSILON && !content_size_changed;

        if self.pending_scroll_to_bottom || (content_size_changed && self.was_near_bottom()) {
            self.follow_bottom = true;
        } else if self.follow_bottom {
            if user_scrolled_up {
                self.follow_bottom = false;
            }
        } else if user_scrolled_down && is_near_bottom(offset, max_offset) {
            self.follow_bottom = true;
        }

        self.last_scroll_offset = offset;
        self.last_max_offset = max_offset;
    }

    /// Returns whether the view should jump to the tail now, clearing any pending request.
    pub fn take_pending_scroll(&mut self) -> bool {
        let should_scroll = self.follow_bottom || self.pending_scroll_to_bottom;
        self.pending_scroll_to_bottom = false;
        should_scroll
    }

    fn was_near_bottom(&self) -> bool {
        is_near_bottom(self.last_scroll_offset, self.last_max_offset)
    }
}

fn is_near_bottom(offset: f32, max_offset: f32) -> bool {
    if max_offset <= 0.0 {
        return true;
    }
    (max_offset - offset).abs() <= AUTO_FOLLOW_RESUME_THRESHOLD
}

impl Default for ScrollManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_request_always_scrolls_once() {
        let mut scroll = ScrollManager::new();
        scroll.observe_viewport(40.0, 40.0);
        scroll.observe_viewport(10.0, 40.0);
        assert!(!scroll.is_following_bottom());

        scroll.request_scroll_to_bottom();
        assert!(scroll.take_pending_scroll());
        assert!(scroll.is_following_bottom());
        assert!(!scroll.has_pending_scroll());
    }

    #[test]
    fn scrolling_up_pauses_follow_and_returning_resumes_it() {
        let mut scroll = ScrollManager::new();
        scroll.observe_viewport(50.0, 50.0);
        assert!(scroll.is_following_bottom());

        scroll.observe_viewport(20.0, 50.0);
        assert!(!scroll.is_following_bottom());
        scroll.request_scroll_to_bottom_if_following();
        assert!(!scroll.take_pending_scroll());

        scroll.observe_viewport(49.0, 50.0);
        assert!(scroll.is_following_bottom());
    }

    #[test]
    fn growth_at_the_tail_keeps_following() {
        let mut scroll = ScrollManager::new();
        scroll.observe_viewport(30.0, 30.0);
        scroll.observe_viewport(30.0, 45.0);
        assert!(scroll.is_following_bottom());
    }
}
