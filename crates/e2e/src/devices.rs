//! Built-in browser/device profile catalog
//!
//! A static table of the device descriptors projects can reference by name.
//! Values follow Playwright's device registry so the HTTP session and the
//! browser probe present the same identity to the application.

use serde::Serialize;

/// Browser engine behind a device profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Chromium,
    Firefox,
    Webkit,
}

impl Engine {
    /// Name of the Playwright browser type
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Chromium => "chromium",
            Engine::Firefox => "firefox",
            Engine::Webkit => "webkit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Capability descriptor for one named device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub name: &'static str,
    pub user_agent: &'static str,
    pub viewport: Viewport,
    pub device_scale_factor: f64,
    pub is_mobile: bool,
    pub has_touch: bool,
    pub engine: Engine,
}

const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.6099.28 Safari/537.36";
const FIREFOX_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0";
const SAFARI_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15";
const PIXEL_5_UA: &str = "Mozilla/5.0 (Linux; Android 11; Pixel 5) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.6099.28 Mobile Safari/537.36";
const IPHONE_12_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 14_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0.3 Mobile/15E148 Safari/604.1";

static CATALOG: &[Device] = &[
    Device {
        name: "Desktop Chrome",
        user_agent: CHROME_UA,
        viewport: Viewport { width: 1280, height: 720 },
        device_scale_factor: 1.0,
        is_mobile: false,
        has_touch: false,
        engine: Engine::Chromium,
    },
    Device {
        name: "Desktop Firefox",
        user_agent: FIREFOX_UA,
        viewport: Viewport { width: 1280, height: 720 },
        device_scale_factor: 1.0,
        is_mobile: false,
        has_touch: false,
        engine: Engine::Firefox,
    },
    Device {
        name: "Desktop Safari",
        user_agent: SAFARI_UA,
        viewport: Viewport { width: 1280, height: 720 },
        device_scale_factor: 2.0,
        is_mobile: false,
        has_touch: false,
        engine: Engine::Webkit,
    },
    Device {
        name: "Pixel 5",
        user_agent: PIXEL_5_UA,
        viewport: Viewport { width: 393, height: 727 },
        device_scale_factor: 2.75,
        is_mobile: true,
        has_touch: true,
        engine: Engine::Chromium,
    },
    Device {
        name: "iPhone 12",
        user_agent: IPHONE_12_UA,
        viewport: Viewport { width: 390, height: 664 },
        device_scale_factor: 3.0,
        is_mobile: true,
        has_touch: true,
        engine: Engine::Webkit,
    },
];

/// Look up a device by its exact catalog name
pub fn lookup(name: &str) -> Option<&'static Device> {
    CATALOG.iter().find(|d| d.name == name)
}

/// All known devices, in catalog order
pub fn all() -> &'static [Device] {
    CATALOG
}
