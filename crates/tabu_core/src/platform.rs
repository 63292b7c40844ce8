use serde::{Deserialize, Serialize};

use crate::channel::ChannelKind;

/// Runtime environment signals captured by the host shell at the first
/// client-side tick. Standalone-display detection is only meaningful once the
/// runtime is fully available, so callers capture a fresh set per service
/// construction instead of caching one across sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeSignals {
    pub has_native_bridge: bool,
    pub user_agent: String,
    pub standalone_display: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Platform {
    AndroidNative,
    IosNative,
    IosInstalledPwa,
    AndroidBrowserPwa,
    Browser,
}

impl Platform {
    /// Classify the runtime. Absent or unrecognized signals fall back to
    /// plain browser; a native bridge wins over user-agent sniffing.
    pub fn classify(signals: &RuntimeSignals) -> Self {
        let ua = signals.user_agent.to_ascii_lowercase();
        let ios_agent = ua.contains("iphone") || ua.contains("ipad") || ua.contains("ipod");
        let android_agent = ua.contains("android");

        if signals.has_native_bridge {
            if ios_agent {
                return Platform::IosNative;
            }
            return Platform::AndroidNative;
        }
        if ios_agent && signals.standalone_display {
            return Platform::IosInstalledPwa;
        }
        if android_agent {
            return Platform::AndroidBrowserPwa;
        }
        Platform::Browser
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Platform::AndroidNative | Platform::IosNative)
    }

    pub fn is_installed_pwa(&self) -> bool {
        matches!(self, Platform::IosInstalledPwa)
    }

    /// Whether scheduled notifications can fire with the app closed. Native
    /// shells hand delivery to the OS alarm service; an installed PWA keeps a
    /// service-worker registration alive. Everything else needs the page to
    /// stay open.
    pub fn supports_background_delivery(&self) -> bool {
        self.is_native() || self.is_installed_pwa()
    }

    /// Platform to delivery-channel mapping, decided once at startup.
    pub fn channel_kind(&self) -> ChannelKind {
        match self {
            Platform::AndroidNative | Platform::IosNative => ChannelKind::NativeLocal,
            Platform::IosInstalledPwa => ChannelKind::InstalledPwaWeb,
            Platform::AndroidBrowserPwa | Platform::Browser => ChannelKind::BrowserFallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(bridge: bool, ua: &str, standalone: bool) -> RuntimeSignals {
        RuntimeSignals {
            has_native_bridge: bridge,
            user_agent: ua.to_string(),
            standalone_display: standalone,
        }
    }

    #[test]
    fn native_bridge_wins_over_user_agent() {
        let platform = Platform::classify(&signals(true, "Mozilla/5.0 (Linux; Android 14)", false));
        assert_eq!(platform, Platform::AndroidNative);

        let platform = Platform::classify(&signals(true, "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)", true));
        assert_eq!(platform, Platform::IosNative);
    }

    #[test]
    fn ios_standalone_is_installed_pwa() {
        let platform = Platform::classify(&signals(false, "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)", true));
        assert_eq!(platform, Platform::IosInstalledPwa);
        assert!(platform.supports_background_delivery());
    }

    #[test]
    fn ios_browser_without_standalone_falls_back() {
        let platform = Platform::classify(&signals(false, "Mozilla/5.0 (iPad; CPU OS 16_0)", false));
        assert_eq!(platform, Platform::Browser);
        assert_eq!(platform.channel_kind(), ChannelKind::BrowserFallback);
    }

    #[test]
    fn android_browser_is_detected() {
        let platform = Platform::classify(&signals(false, "Mozilla/5.0 (Linux; Android 13)", false));
        assert_eq!(platform, Platform::AndroidBrowserPwa);
        assert!(!platform.supports_background_delivery());
    }

    #[test]
    fn empty_signals_default_to_browser() {
        assert_eq!(Platform::classify(&RuntimeSignals::default()), Platform::Browser);
    }
}
