use std::time::Duration;

/// Upper bounds and fixed delays for every wait in the capture pipeline.
#[derive(Debug, Clone)]
pub struct Timings {
    pub navigation: Duration,
    pub fonts: Duration,
    pub scroll_step_px: u32,
    pub scroll_interval: Duration,
    pub scroll_cap: Duration,
    pub image_load: Duration,
    pub network_idle: Duration,
    pub network_poll: Duration,
    /// How long the resource count must stay unchanged to count as idle.
    pub network_quiet: Duration,
    pub probe: Duration,
    pub after_dismiss: Duration,
    pub slide_transition: Duration,
    pub freeze_settle: Duration,
    pub after_slide: Duration,
    pub retop_settle: Duration,
    pub retry_backoff: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(90),
            fonts: Duration::from_secs(10),
            scroll_step_px: 250,
            scroll_interval: Duration::from_millis(100),
            scroll_cap: Duration::from_secs(15),
            image_load: Duration::from_secs(10),
            network_idle: Duration::from_secs(5),
            network_poll: Duration::from_millis(500),
            network_quiet: Duration::from_secs(1),
            probe: Duration::from_millis(1500),
            after_dismiss: Duration::from_millis(300),
            slide_transition: Duration::from_millis(900),
            freeze_settle: Duration::from_millis(150),
            after_slide: Duration::from_millis(250),
            retop_settle: Duration::from_millis(500),
            retry_backoff: Duration::from_secs(5),
        }
    }
}

impl Timings {
    /// All delays zeroed and poll caps kept tiny; for driving the pipeline
    /// against a scripted page.
    pub fn immediate() -> Self {
        Self {
            navigation: Duration::from_secs(1),
            fonts: Duration::ZERO,
            scroll_step_px: 250,
            scroll_interval: Duration::ZERO,
            scroll_cap: Duration::ZERO,
            image_load: Duration::ZERO,
            network_idle: Duration::ZERO,
            network_poll: Duration::ZERO,
            network_quiet: Duration::ZERO,
            probe: Duration::ZERO,
            after_dismiss: Duration::ZERO,
            slide_transition: Duration::ZERO,
            freeze_settle: Duration::ZERO,
            after_slide: Duration::ZERO,
            retop_settle: Duration::ZERO,
            retry_backoff: Duration::ZERO,
        }
    }
}

pub(crate) fn pause(d: Duration) {
    if !d.is_zero() {
        std::thread::sleep(d);
    }
}
