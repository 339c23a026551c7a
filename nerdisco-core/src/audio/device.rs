//! Audio input device enumeration.

use serde::{Deserialize, Serialize};

/// Metadata about an audio input device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    /// Whether this is the system default input device.
    pub is_default: bool,
    /// Heuristic flag for devices that capture what the machine is playing.
    pub is_loopback_like: bool,
}

const LOOPBACK_KEYWORDS: &[&str] = &[
    "stereo mix",
    "wave out",
    "what u hear",
    "what you hear",
    "loopback",
    "monitor of",
    "blackhole",
    "soundflower",
    "virtual cable",
];

/// Best-effort heuristic for system-output capture devices. These are the
/// usual source when visualising whatever the DJ software is playing.
pub fn is_loopback_like_name(name: &str) -> bool {
    let lowered = name.trim().to_ascii_lowercase();
    LOOPBACK_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// List all available audio input devices: default first, then loopback
/// sources, then the rest by name.
///
/// Returns an empty `Vec` if no devices exist.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    match host.input_devices() {
        Ok(devices) => {
            let mut list = devices
                .enumerate()
                .map(|(idx, device)| {
                    let name = device
                        .name()
                        .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
                    let is_default = default_name.as_deref() == Some(name.as_str());
                    let is_loopback_like = is_loopback_like_name(&name);
                    DeviceInfo {
                        name,
                        is_default,
                        is_loopback_like,
                    }
                })
                .collect::<Vec<_>>();
            sort_devices(&mut list);
            list
        }
        Err(e) => {
            tracing::warn!("failed to enumerate input devices: {e}");
            default_name
                .map(|name| {
                    vec![DeviceInfo {
                        is_loopback_like: is_loopback_like_name(&name),
                        name,
                        is_default: true,
                    }]
                })
                .unwrap_or_default()
        }
    }
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    vec![]
}

#[cfg_attr(not(feature = "audio-cpal"), allow(dead_code))]
fn sort_devices(list: &mut [DeviceInfo]) {
    list.sort_by_key(|d| (!d.is_default, !d.is_loopback_like, d.name.to_ascii_lowercase()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_common_loopback_names() {
        assert!(is_loopback_like_name("Stereo Mix (Realtek Audio)"));
        assert!(is_loopback_like_name("Monitor of Built-in Audio Analog Stereo"));
        assert!(is_loopback_like_name("BlackHole 2ch"));
        assert!(!is_loopback_like_name("USB PnP Microphone"));
    }

    #[test]
    fn default_then_loopback_then_name() {
        let dev = |name: &str, is_default| DeviceInfo {
            name: name.into(),
            is_default,
            is_loopback_like: is_loopback_like_name(name),
        };
        let mut list = vec![
            dev("zeta mic", false),
            dev("Stereo Mix", false),
            dev("Alpha mic", false),
            dev("Headset", true),
        ];
        sort_devices(&mut list);
        let names: Vec<_> = list.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Headset", "Stereo Mix", "Alpha mic", "zeta mic"]);
    }
}
