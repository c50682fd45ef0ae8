use serde::Serialize;

/// A viewport size and user-agent pair a page is rendered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceProfile {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub user_agent: &'static str,
    pub mobile: bool,
}

pub const DESKTOP: DeviceProfile = DeviceProfile {
    label: "desktop",
    width: 1920,
    height: 1080,
    user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    mobile: false,
};

pub const MOBILE: DeviceProfile = DeviceProfile {
    label: "mobile",
    width: 375,
    height: 812,
    user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Mobile/15E148 Safari/604.1",
    mobile: true,
};

impl DeviceProfile {
    /// The profiles every job is captured under, in capture order.
    pub fn standard() -> [DeviceProfile; 2] {
        [DESKTOP, MOBILE]
    }

    /// Extraction, cookie dismissal and carousel capture only run on the
    /// primary device.
    pub fn is_primary(&self) -> bool {
        !self.mobile
    }
}
