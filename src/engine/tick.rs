use crate::engine::banner::BannerState;

// A tick result returns the state of the widget after a tick() has been processed
#[derive(Default, Debug, Clone, PartialEq)]
pub struct TickResult {
    /// Current banner state
    pub state: BannerState,
    /// When the next tick is needed. None when no timer is pending
    pub next_tick_in: Option<std::time::Duration>,
    /// Number of toasts removed in this tick
    pub expired_toasts: usize,
    /// Did the debounced preference save fire in this tick
    pub save_fired: bool,
}
